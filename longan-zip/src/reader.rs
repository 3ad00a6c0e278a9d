//! Container decoding.
//!
//! Local entries are read front to back. Scanning stops at the first central
//! directory or end-of-directory signature; the central directory is only
//! consulted to resolve entries whose sizes were deferred to a data
//! descriptor.

use crate::archive::{Archive, Entry};
use crate::crc::crc32;
use crate::errors::{Error, ErrorKind, Result};
use crate::headers::{
    signature_at, CentralDirectoryHeader, CompressionMethod, EndOfCentralDirectory,
    LocalFileHeader, CENTRAL_DIRECTORY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE,
    END_OF_CENTRAL_DIRECTORY_SIGNATURE, FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED,
    LOCAL_FILE_HEADER_SIGNATURE, ZIP64_SENTINEL,
};
use flate2::{Decompress, FlushDecompress, Status};
use std::collections::HashMap;
use zerocopy::FromBytes;

/// Largest possible end-of-directory search window (record plus maximum comment).
const MAX_EOCD_SEARCH: usize = EndOfCentralDirectory::SIZE + u16::MAX as usize;

/// Decodes a byte buffer into an [`Archive`].
///
/// # Examples
///
/// ```
/// use longan_zip::{ArchiveWriter, Decoder};
///
/// let mut writer = ArchiveWriter::new();
/// writer.add("word/document.xml", b"<w:document/>")?;
/// let bytes = writer.finish()?;
///
/// let archive = Decoder::new().decode(&bytes)?;
/// assert_eq!(archive.read("word/document.xml")?, b"<w:document/>");
/// # Ok::<(), longan_zip::Error>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    verify_checksums: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Create a decoder that verifies CRC-32 values.
    pub fn new() -> Self {
        Self {
            verify_checksums: true,
        }
    }

    /// Enable or disable CRC-32 verification of decompressed payloads.
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Decode every local entry in `data`.
    ///
    /// Returns [`ErrorKind::ArchiveEmpty`] when no local entry is present.
    pub fn decode(&self, data: &[u8]) -> Result<Archive> {
        let mut archive = Archive::new();
        let mut central: Option<HashMap<usize, DeferredSizes>> = None;
        let mut offset = 0;

        while offset < data.len() {
            let signature = signature_at(data, offset)
                .ok_or_else(|| Error::corrupt(offset, "truncated record signature"))?;
            match signature {
                LOCAL_FILE_HEADER_SIGNATURE => {},
                CENTRAL_DIRECTORY_SIGNATURE | END_OF_CENTRAL_DIRECTORY_SIGNATURE => break,
                other => {
                    return Err(Error::corrupt(
                        offset,
                        format!("unexpected signature {other:#010x}"),
                    ));
                },
            }

            let (entry, next) = self.decode_local(data, offset, &mut central)?;
            tracing::trace!(
                name = entry.name(),
                len = entry.data().len(),
                "decoded container entry"
            );
            archive.push(entry)?;
            offset = next;
        }

        if archive.is_empty() {
            return Err(ErrorKind::ArchiveEmpty.into());
        }
        tracing::debug!(entries = archive.len(), "decoded container");
        Ok(archive)
    }

    /// Decode the local entry at `offset`, returning it and the offset of the next record.
    fn decode_local(
        &self,
        data: &[u8],
        offset: usize,
        central: &mut Option<HashMap<usize, DeferredSizes>>,
    ) -> Result<(Entry, usize)> {
        let (header, _) = LocalFileHeader::read_from_prefix(&data[offset..])
            .map_err(|_| Error::corrupt(offset, "truncated local file header"))?;

        let flags = header.flags.get();
        let name_start = offset + LocalFileHeader::SIZE;
        let name_end = name_start + header.file_name_length.get() as usize;
        let payload_start = name_end + header.extra_field_length.get() as usize;
        if payload_start > data.len() {
            return Err(Error::corrupt(offset, "entry name runs past end of buffer"));
        }
        let name = decode_name(&data[name_start..name_end]);

        if flags & FLAG_ENCRYPTED != 0 {
            return Err(ErrorKind::EncryptedEntry(name).into());
        }

        let method_id = header.compression_method.get();
        let method = CompressionMethod::from_id(method_id)
            .ok_or(ErrorKind::UnsupportedCompressionMethod(method_id))?;

        let mut sizes = DeferredSizes {
            crc32: header.crc32.get(),
            compressed: header.compressed_size.get(),
            uncompressed: header.uncompressed_size.get(),
        };
        let deferred = flags & FLAG_DATA_DESCRIPTOR != 0;
        if deferred && sizes.compressed == 0 {
            if central.is_none() {
                *central = Some(read_central_directory(data)?);
            }
            sizes = central
                .as_ref()
                .and_then(|map| map.get(&offset).copied())
                .ok_or_else(|| {
                    Error::corrupt(offset, "data descriptor entry missing from central directory")
                })?;
        }
        if sizes.compressed == ZIP64_SENTINEL || sizes.uncompressed == ZIP64_SENTINEL {
            return Err(ErrorKind::TooLarge(name).into());
        }

        let compressed_len = sizes.compressed as usize;
        let payload_end = payload_start
            .checked_add(compressed_len)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                Error::corrupt(
                    offset,
                    format!(
                        "declared compressed size {} exceeds the {} bytes remaining",
                        compressed_len,
                        data.len() - payload_start
                    ),
                )
            })?;
        let payload = &data[payload_start..payload_end];
        let expected_len = sizes.uncompressed as usize;

        let contents = match method {
            CompressionMethod::Store => {
                if compressed_len != expected_len {
                    return Err(Error::corrupt(
                        offset,
                        format!(
                            "stored entry '{name}' declares {compressed_len} compressed \
                             and {expected_len} uncompressed bytes"
                        ),
                    ));
                }
                payload.to_vec()
            },
            CompressionMethod::Deflate => inflate_entry(&name, payload, expected_len)?,
        };

        if self.verify_checksums {
            let actual = crc32(&contents);
            if actual != sizes.crc32 {
                return Err(ErrorKind::ChecksumMismatch {
                    name,
                    expected: sizes.crc32,
                    actual,
                }
                .into());
            }
        }

        let next = if deferred {
            skip_data_descriptor(data, payload_end)?
        } else {
            payload_end
        };

        Ok((Entry::decoded(name, contents, method), next))
    }
}

/// Decode with default options.
#[inline]
pub fn decode(data: &[u8]) -> Result<Archive> {
    Decoder::new().decode(data)
}

/// CRC and sizes for an entry, either from its local header or the central directory.
#[derive(Debug, Clone, Copy)]
struct DeferredSizes {
    crc32: u32,
    compressed: u32,
    uncompressed: u32,
}

/// Inflate a raw deflate stream that must produce exactly `expected` bytes.
#[inline]
pub fn inflate(compressed: &[u8], expected: usize) -> Result<Vec<u8>> {
    inflate_entry("<stream>", compressed, expected)
}

/// The output buffer is sized one byte past the declared length so an
/// over-long stream is detected rather than silently truncated.
fn inflate_entry(name: &str, compressed: &[u8], expected: usize) -> Result<Vec<u8>> {
    let failed = |reason: String| -> Error {
        ErrorKind::DecompressionFailed {
            name: name.to_string(),
            reason,
        }
        .into()
    };

    let mut output = vec![0u8; expected + 1];
    let mut inflater = Decompress::new(false);
    let status = inflater
        .decompress(compressed, &mut output, FlushDecompress::Finish)
        .map_err(|e| failed(e.to_string()))?;

    let produced = inflater.total_out() as usize;
    if status != Status::StreamEnd {
        return Err(failed(format!(
            "stream did not end after {produced} bytes, header declares {expected}"
        )));
    }
    if produced != expected {
        return Err(failed(format!(
            "inflated to {produced} bytes, header declares {expected}"
        )));
    }
    output.truncate(expected);
    Ok(output)
}

/// Skip the data descriptor following a deferred-size payload.
fn skip_data_descriptor(data: &[u8], offset: usize) -> Result<usize> {
    let len = match signature_at(data, offset) {
        Some(DATA_DESCRIPTOR_SIGNATURE) => 16,
        _ => 12,
    };
    let end = offset + len;
    if end > data.len() {
        return Err(Error::corrupt(offset, "truncated data descriptor"));
    }
    Ok(end)
}

/// Index the central directory by local header offset.
fn read_central_directory(data: &[u8]) -> Result<HashMap<usize, DeferredSizes>> {
    let eocd_offset = find_end_of_central_directory(data)
        .ok_or_else(|| Error::corrupt(data.len(), "end of central directory not found"))?;
    let (eocd, _) = EndOfCentralDirectory::read_from_prefix(&data[eocd_offset..])
        .map_err(|_| Error::corrupt(eocd_offset, "truncated end of central directory"))?;

    let total = eocd.total_entries.get() as usize;
    let mut offset = eocd.central_directory_offset.get() as usize;
    let mut map = HashMap::with_capacity(total);

    for _ in 0..total {
        if signature_at(data, offset) != Some(CENTRAL_DIRECTORY_SIGNATURE) {
            return Err(Error::corrupt(offset, "bad central directory signature"));
        }
        let (header, _) = CentralDirectoryHeader::read_from_prefix(&data[offset..])
            .map_err(|_| Error::corrupt(offset, "truncated central directory header"))?;
        map.insert(
            header.local_header_offset.get() as usize,
            DeferredSizes {
                crc32: header.crc32.get(),
                compressed: header.compressed_size.get(),
                uncompressed: header.uncompressed_size.get(),
            },
        );
        offset += CentralDirectoryHeader::SIZE
            + header.file_name_length.get() as usize
            + header.extra_field_length.get() as usize
            + header.file_comment_length.get() as usize;
    }

    Ok(map)
}

/// Search backwards for the end-of-central-directory record.
fn find_end_of_central_directory(data: &[u8]) -> Option<usize> {
    let last = data.len().checked_sub(EndOfCentralDirectory::SIZE)?;
    let first = data.len().saturating_sub(MAX_EOCD_SEARCH);
    (first..=last)
        .rev()
        .find(|&i| signature_at(data, i) == Some(END_OF_CENTRAL_DIRECTORY_SIGNATURE))
}

/// Entry names are UTF-8 in every container this crate writes; anything else
/// is decoded lossily rather than rejected.
fn decode_name(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(name) => name.to_string(),
        Err(_) => String::from_utf8_lossy(raw).into_owned(),
    }
}

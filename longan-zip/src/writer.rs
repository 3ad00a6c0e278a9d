//! Container encoding.
//!
//! Output is fully deterministic: entries are written in the order they are
//! added, every timestamp is the DOS epoch, and the compression level is fixed
//! for the lifetime of a writer.

use crate::archive::Archive;
use crate::crc::crc32;
use crate::errors::{ErrorKind, Result};
use crate::headers::{
    CentralDirectoryHeader, CompressionMethod, EndOfCentralDirectory, LocalFileHeader,
    CENTRAL_DIRECTORY_SIGNATURE, DOS_EPOCH_DATE, DOS_EPOCH_TIME,
    END_OF_CENTRAL_DIRECTORY_SIGNATURE, FLAG_UTF8, LOCAL_FILE_HEADER_SIGNATURE, VERSION_DEFLATE,
};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::collections::HashSet;
use std::io::Write;
use zerocopy::{IntoBytes, LE, U16, U32};

/// Central directory data remembered for each written entry.
#[derive(Debug)]
struct CentralRecord {
    header: CentralDirectoryHeader,
    name: Vec<u8>,
}

/// Builds a container in memory.
///
/// # Examples
///
/// ```
/// use longan_zip::{ArchiveWriter, CompressionMethod};
///
/// let mut writer = ArchiveWriter::new();
/// let method = writer.add("word/document.xml", "<w:p/>".repeat(100).as_bytes())?;
/// assert_eq!(method, CompressionMethod::Deflate);
/// let bytes = writer.finish()?;
/// assert_eq!(&bytes[..4], b"PK\x03\x04");
/// # Ok::<(), longan_zip::Error>(())
/// ```
#[derive(Debug)]
pub struct ArchiveWriter {
    level: Compression,
    buffer: Vec<u8>,
    central: Vec<CentralRecord>,
    names: HashSet<String>,
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWriter {
    /// Create a writer using the default deflate level (6).
    pub fn new() -> Self {
        Self::with_level(Compression::default().level())
    }

    /// Create a writer using deflate `level` (clamped to 0..=9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
            buffer: Vec::new(),
            central: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Number of entries written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.central.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.central.is_empty()
    }

    /// Add an entry, deflating it unless the deflated form is not strictly smaller.
    ///
    /// Returns the method that was recorded for the entry.
    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<CompressionMethod> {
        let deflated = deflate_with(data, self.level)?;
        if deflated.len() < data.len() {
            self.write_entry(name, data, CompressionMethod::Deflate, &deflated)?;
            Ok(CompressionMethod::Deflate)
        } else {
            self.write_entry(name, data, CompressionMethod::Store, data)?;
            Ok(CompressionMethod::Store)
        }
    }

    /// Add an entry without compression.
    pub fn add_stored(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.write_entry(name, data, CompressionMethod::Store, data)
    }

    fn write_entry(
        &mut self,
        name: &str,
        raw: &[u8],
        method: CompressionMethod,
        payload: &[u8],
    ) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(ErrorKind::DuplicateEntry(name.to_string()).into());
        }

        let name_len = fit_u16(name.len(), name)?;
        let compressed_size = fit_u32(payload.len(), name)?;
        let uncompressed_size = fit_u32(raw.len(), name)?;
        let local_header_offset = fit_u32(self.buffer.len(), name)?;
        let crc = crc32(raw);
        let flags = if name.is_ascii() { 0 } else { FLAG_UTF8 };

        tracing::trace!(
            name,
            ?method,
            raw = raw.len(),
            stored = payload.len(),
            "encoding container entry"
        );

        let local = LocalFileHeader {
            signature: U32::new(LOCAL_FILE_HEADER_SIGNATURE),
            version_needed: U16::new(method.version_needed()),
            flags: U16::new(flags),
            compression_method: U16::new(method.id()),
            last_mod_time: U16::new(DOS_EPOCH_TIME),
            last_mod_date: U16::new(DOS_EPOCH_DATE),
            crc32: U32::new(crc),
            compressed_size: U32::new(compressed_size),
            uncompressed_size: U32::new(uncompressed_size),
            file_name_length: U16::new(name_len),
            extra_field_length: U16::new(0),
        };
        self.buffer.extend_from_slice(local.as_bytes());
        self.buffer.extend_from_slice(name.as_bytes());
        self.buffer.extend_from_slice(payload);

        self.central.push(CentralRecord {
            header: CentralDirectoryHeader {
                signature: U32::new(CENTRAL_DIRECTORY_SIGNATURE),
                version_made_by: U16::new(VERSION_DEFLATE),
                version_needed: U16::new(method.version_needed()),
                flags: U16::new(flags),
                compression_method: U16::new(method.id()),
                last_mod_time: U16::new(DOS_EPOCH_TIME),
                last_mod_date: U16::new(DOS_EPOCH_DATE),
                crc32: U32::new(crc),
                compressed_size: U32::new(compressed_size),
                uncompressed_size: U32::new(uncompressed_size),
                file_name_length: U16::new(name_len),
                extra_field_length: U16::new(0),
                file_comment_length: U16::new(0),
                disk_number_start: U16::new(0),
                internal_attributes: U16::new(0),
                external_attributes: U32::new(0),
                local_header_offset: U32::new(local_header_offset),
            },
            name: name.as_bytes().to_vec(),
        });
        Ok(())
    }

    /// Write the central directory and end record, returning the container bytes.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let total_entries = u16::try_from(self.central.len())
            .map_err(|_| ErrorKind::TooLarge(format!("{} entries", self.central.len())))?;
        let central_directory_offset = fit_u32(self.buffer.len(), "central directory")?;

        for record in &self.central {
            self.buffer.extend_from_slice(record.header.as_bytes());
            self.buffer.extend_from_slice(&record.name);
        }
        let central_directory_size = fit_u32(
            self.buffer.len() - central_directory_offset as usize,
            "central directory",
        )?;

        let end = EndOfCentralDirectory {
            signature: U32::new(END_OF_CENTRAL_DIRECTORY_SIGNATURE),
            disk_number: U16::new(0),
            central_directory_disk: U16::new(0),
            entries_on_disk: U16::<LE>::new(total_entries),
            total_entries: U16::<LE>::new(total_entries),
            central_directory_size: U32::new(central_directory_size),
            central_directory_offset: U32::new(central_directory_offset),
            comment_length: U16::new(0),
        };
        self.buffer.extend_from_slice(end.as_bytes());

        tracing::debug!(
            entries = total_entries,
            bytes = self.buffer.len(),
            "encoded container"
        );
        Ok(self.buffer)
    }
}

/// Encode `(name, bytes)` pairs in order with the given deflate level.
pub fn encode<'a, I>(entries: I, level: u32) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut writer = ArchiveWriter::with_level(level);
    for (name, data) in entries {
        writer.add(name, data)?;
    }
    writer.finish()
}

impl Archive {
    /// Encode every entry in order with the default deflate level.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with_level(Compression::default().level())
    }

    /// Encode every entry in order with deflate `level`.
    pub fn to_bytes_with_level(&self, level: u32) -> Result<Vec<u8>> {
        encode(self.entries().map(|e| (e.name(), e.data())), level)
    }
}

/// Compress `data` into a raw deflate stream at `level` (clamped to 0..=9).
pub fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>> {
    deflate_with(data, Compression::new(level.min(9)))
}

fn deflate_with(data: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2 + 16), level);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[inline]
fn fit_u16(value: usize, what: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| ErrorKind::TooLarge(what.to_string()).into())
}

#[inline]
fn fit_u32(value: usize, what: &str) -> Result<u32> {
    // 0xFFFFFFFF is reserved as the ZIP64 marker
    u32::try_from(value)
        .ok()
        .filter(|&v| v != u32::MAX)
        .ok_or_else(|| ErrorKind::TooLarge(what.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::signature_at;
    use crate::reader::decode;
    use quickcheck_macros::quickcheck;
    use rstest::rstest;
    use zerocopy::FromBytes;

    fn incompressible() -> Vec<u8> {
        (0..=255u8).collect()
    }

    #[rstest]
    #[case::empty(Vec::new(), CompressionMethod::Store)]
    #[case::short(b"abc".to_vec(), CompressionMethod::Store)]
    #[case::no_repeats(incompressible(), CompressionMethod::Store)]
    #[case::markup("<w:p><w:r><w:t>x</w:t></w:r></w:p>".repeat(50).into_bytes(), CompressionMethod::Deflate)]
    fn test_method_choice_and_round_trip(#[case] data: Vec<u8>, #[case] expected: CompressionMethod) {
        let mut writer = ArchiveWriter::new();
        let method = writer.add("part.bin", &data).unwrap();
        assert_eq!(method, expected);

        let bytes = writer.finish().unwrap();
        let archive = decode(&bytes).unwrap();
        let entry = archive.get("part.bin").unwrap();
        assert_eq!(entry.data(), data.as_slice());
        assert_eq!(entry.method(), Some(expected));
    }

    #[test]
    fn test_checksum_written_to_both_headers() {
        let document = b"<w:body><w:p><w:r><w:t>A</w:t></w:r></w:p></w:body>";
        let mut writer = ArchiveWriter::new();
        writer.add("word/document.xml", document).unwrap();
        let bytes = writer.finish().unwrap();

        let (local, _) = LocalFileHeader::read_from_prefix(&bytes).unwrap();
        let (end, _) =
            EndOfCentralDirectory::read_from_prefix(&bytes[bytes.len() - EndOfCentralDirectory::SIZE..])
                .unwrap();
        let cd_offset = end.central_directory_offset.get() as usize;
        let (central, _) = CentralDirectoryHeader::read_from_prefix(&bytes[cd_offset..]).unwrap();

        let expected = crc32(document);
        assert_eq!(local.crc32.get(), expected);
        assert_eq!(central.crc32.get(), expected);
        assert_eq!(central.local_header_offset.get(), 0);
        assert_eq!(end.total_entries.get(), 1);
        assert_eq!(
            end.central_directory_size.get() as usize,
            CentralDirectoryHeader::SIZE + "word/document.xml".len()
        );
    }

    #[test]
    fn test_central_records_point_at_local_headers() {
        let mut writer = ArchiveWriter::new();
        writer.add("[Content_Types].xml", b"<Types/>").unwrap();
        writer.add("word/document.xml", "<w:p/>".repeat(40).as_bytes()).unwrap();
        writer.add_stored("word/media/image1.png", &incompressible()).unwrap();
        let bytes = writer.finish().unwrap();

        let (end, _) =
            EndOfCentralDirectory::read_from_prefix(&bytes[bytes.len() - EndOfCentralDirectory::SIZE..])
                .unwrap();
        let mut offset = end.central_directory_offset.get() as usize;
        for _ in 0..end.total_entries.get() {
            let (central, _) = CentralDirectoryHeader::read_from_prefix(&bytes[offset..]).unwrap();
            let local_offset = central.local_header_offset.get() as usize;
            assert_eq!(signature_at(&bytes, local_offset), Some(LOCAL_FILE_HEADER_SIGNATURE));
            offset += CentralDirectoryHeader::SIZE + central.file_name_length.get() as usize;
        }
    }

    #[test]
    fn test_output_is_deterministic() {
        let entries: [(&str, &[u8]); 2] = [
            ("word/document.xml", b"<w:document><w:body/></w:document>"),
            ("word/settings.xml", b"<w:settings/>"),
        ];
        let first = encode(entries, 6).unwrap();
        let second = encode(entries, 6).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut writer = ArchiveWriter::new();
        writer.add("a.xml", b"1").unwrap();
        let err = writer.add("a.xml", b"2").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::DuplicateEntry(_)));
    }

    #[test]
    fn test_non_ascii_names_flag_utf8() {
        let mut writer = ArchiveWriter::new();
        writer.add("word/médias.xml", b"<x/>").unwrap();
        let bytes = writer.finish().unwrap();
        let (local, _) = LocalFileHeader::read_from_prefix(&bytes).unwrap();
        assert_eq!(local.flags.get() & FLAG_UTF8, FLAG_UTF8);
        assert!(decode(&bytes).unwrap().contains("word/médias.xml"));
    }

    #[test]
    fn test_archive_to_bytes_preserves_order() {
        let mut archive = Archive::new();
        archive.insert("z.xml", b"<z/>".to_vec());
        archive.insert("a.xml", b"<a/>".to_vec());
        let decoded = decode(&archive.to_bytes().unwrap()).unwrap();
        let names: Vec<_> = decoded.names().collect();
        assert_eq!(names, ["z.xml", "a.xml"]);
    }

    #[quickcheck]
    fn prop_round_trip(data: Vec<u8>, level: u8) -> bool {
        let mut writer = ArchiveWriter::with_level(u32::from(level % 10));
        writer.add("entry", &data).unwrap();
        let bytes = writer.finish().unwrap();
        decode(&bytes).unwrap().read("entry").unwrap() == data.as_slice()
    }

    #[quickcheck]
    fn prop_stored_never_larger_than_raw(data: Vec<u8>) -> bool {
        let mut writer = ArchiveWriter::new();
        writer.add("entry", &data).unwrap();
        let bytes = writer.finish().unwrap();
        let (local, _) = LocalFileHeader::read_from_prefix(&bytes).unwrap();
        local.compressed_size.get() as usize <= data.len()
    }
}

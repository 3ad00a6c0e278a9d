//! On-disk ZIP record layouts.
//!
//! Every record is a packed little-endian structure, so the types below use
//! `zerocopy` byte-order wrappers and can be read from any offset without
//! alignment concerns.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LE, U16, U32};

pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x0403_4b50;
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0201_4b50;
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

/// General purpose bit 0: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General purpose bit 3: CRC and sizes follow the payload in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose bit 11: the entry name is UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

/// Value stored in 32-bit size fields when the real value lives in a ZIP64 extra field.
pub const ZIP64_SENTINEL: u32 = 0xFFFF_FFFF;

/// MS-DOS time for 00:00:00.
pub const DOS_EPOCH_TIME: u16 = 0;
/// MS-DOS date for 1980-01-01, the earliest representable date.
pub const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;

pub const VERSION_STORED: u16 = 10;
pub const VERSION_DEFLATE: u16 = 20;

/// Compression method recorded per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// Payload is the raw bytes.
    Store,
    /// Payload is a raw deflate stream.
    Deflate,
}

impl CompressionMethod {
    /// Map a header method id onto a supported method.
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0 => Some(Self::Store),
            8 => Some(Self::Deflate),
            _ => None,
        }
    }

    /// The id written to headers.
    pub const fn id(self) -> u16 {
        match self {
            Self::Store => 0,
            Self::Deflate => 8,
        }
    }

    /// Minimum reader version for this method.
    pub const fn version_needed(self) -> u16 {
        match self {
            Self::Store => VERSION_STORED,
            Self::Deflate => VERSION_DEFLATE,
        }
    }
}

/// Local file header, immediately followed by the name, extra field and payload.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct LocalFileHeader {
    pub signature: U32<LE>,
    pub version_needed: U16<LE>,
    pub flags: U16<LE>,
    pub compression_method: U16<LE>,
    pub last_mod_time: U16<LE>,
    pub last_mod_date: U16<LE>,
    pub crc32: U32<LE>,
    pub compressed_size: U32<LE>,
    pub uncompressed_size: U32<LE>,
    pub file_name_length: U16<LE>,
    pub extra_field_length: U16<LE>,
}

impl LocalFileHeader {
    pub const SIZE: usize = 30;
}

/// Central directory file header, followed by name, extra field and comment.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct CentralDirectoryHeader {
    pub signature: U32<LE>,
    pub version_made_by: U16<LE>,
    pub version_needed: U16<LE>,
    pub flags: U16<LE>,
    pub compression_method: U16<LE>,
    pub last_mod_time: U16<LE>,
    pub last_mod_date: U16<LE>,
    pub crc32: U32<LE>,
    pub compressed_size: U32<LE>,
    pub uncompressed_size: U32<LE>,
    pub file_name_length: U16<LE>,
    pub extra_field_length: U16<LE>,
    pub file_comment_length: U16<LE>,
    pub disk_number_start: U16<LE>,
    pub internal_attributes: U16<LE>,
    pub external_attributes: U32<LE>,
    pub local_header_offset: U32<LE>,
}

impl CentralDirectoryHeader {
    pub const SIZE: usize = 46;
}

/// End of central directory record, followed by the archive comment.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct EndOfCentralDirectory {
    pub signature: U32<LE>,
    pub disk_number: U16<LE>,
    pub central_directory_disk: U16<LE>,
    pub entries_on_disk: U16<LE>,
    pub total_entries: U16<LE>,
    pub central_directory_size: U32<LE>,
    pub central_directory_offset: U32<LE>,
    pub comment_length: U16<LE>,
}

impl EndOfCentralDirectory {
    pub const SIZE: usize = 22;
}

/// Read the 4-byte signature at `offset`, or `None` if fewer than 4 bytes remain.
#[inline]
pub fn signature_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    U32::<LE>::read_from_bytes(bytes).ok().map(|v| v.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_match_layout() {
        assert_eq!(std::mem::size_of::<LocalFileHeader>(), LocalFileHeader::SIZE);
        assert_eq!(
            std::mem::size_of::<CentralDirectoryHeader>(),
            CentralDirectoryHeader::SIZE
        );
        assert_eq!(
            std::mem::size_of::<EndOfCentralDirectory>(),
            EndOfCentralDirectory::SIZE
        );
    }

    #[test]
    fn test_signature_at() {
        let data = [0x50, 0x4B, 0x03, 0x04, 0x00];
        assert_eq!(signature_at(&data, 0), Some(LOCAL_FILE_HEADER_SIGNATURE));
        assert_eq!(signature_at(&data, 2), None);
        assert_eq!(signature_at(&data, usize::MAX), None);
    }

    #[test]
    fn test_dos_epoch_date() {
        // year offset 0 (1980), month 1, day 1
        assert_eq!(DOS_EPOCH_DATE, 0x0021);
    }
}

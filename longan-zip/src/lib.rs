//! Deterministic ZIP container codec for Office document templates.
//!
//! The crate translates between a packaged byte buffer and an ordered list
//! of named, decompressed entries. Decoding walks the local file headers,
//! inflating deflated payloads to exactly their declared length. Encoding
//! deflates each entry independently, falls back to storing it when
//! compression does not help, and writes CRC-32 values to both the local and
//! the central directory records.
//!
//! # Quick Start
//!
//! ```rust
//! use longan_zip::{decode, ArchiveWriter};
//!
//! let mut writer = ArchiveWriter::new();
//! writer.add("word/document.xml", b"<w:document/>")?;
//! let bytes = writer.finish()?;
//!
//! let mut archive = decode(&bytes)?;
//! archive.insert("word/document.xml", b"<w:document><w:body/></w:document>".to_vec());
//! let repacked = archive.to_bytes()?;
//! assert_eq!(
//!     decode(&repacked)?.read("word/document.xml")?,
//!     b"<w:document><w:body/></w:document>"
//! );
//! # Ok::<(), longan_zip::Error>(())
//! ```
#![forbid(unsafe_code)]

mod archive;
mod crc;
mod errors;
pub mod headers;
mod reader;
mod writer;

pub use archive::{Archive, Entry};
pub use crc::crc32;
pub use errors::{Error, ErrorKind, Result};
pub use headers::CompressionMethod;
pub use reader::{decode, inflate, Decoder};
pub use writer::{deflate, encode, ArchiveWriter};

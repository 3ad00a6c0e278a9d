/// Compute the CRC32 (IEEE, reflected polynomial `0xEDB88320`) of a byte slice.
///
/// Uses `crc32fast` which provides hardware-accelerated CRC32 using
/// SIMD/PCLMULQDQ instructions when available, falling back to a
/// table-driven software implementation otherwise. Initial and final XOR
/// are both `0xFFFFFFFF`, matching the value ZIP stores per entry.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

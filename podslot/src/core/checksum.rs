//! Portable 32-bit checksums (CRC-32, IEEE polynomial).
//!
//! Every identifier and layer checksum in the crate goes through these
//! functions, so results never depend on which checksum utility a host ships.

/// Checksum of an arbitrary byte string.
pub fn checksum_of_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Checksum of a 32-bit word, fed as exactly four big-endian bytes.
pub fn checksum_of_word(value: u32) -> u32 {
    crc32fast::hash(&value.to_be_bytes())
}

/// Render a checksum as 8 lowercase, zero-padded hex digits.
pub fn to_hex(value: u32) -> String {
    format!("{value:08x}")
}

/// Parse exactly 8 hex digits back into a checksum.
///
/// Returns `None` for anything that `to_hex` could not have produced.
pub fn parse_hex(s: &str) -> Option<u32> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return None;
    }
    u32::from_str_radix(s, 16).ok()
}

/// Streaming form of `checksum_of_bytes` for multi-part inputs.
#[derive(Debug, Clone, Default)]
pub struct ChecksumBuilder {
    hasher: crc32fast::Hasher,
}

impl ChecksumBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(data);
        self
    }

    pub fn finish(self) -> u32 {
        self.hasher.finalize()
    }
}

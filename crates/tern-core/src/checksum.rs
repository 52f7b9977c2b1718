//! Script checksums stored in the ledger.
//!
//! The checksum is a CRC-32 (IEEE) over the script's lines with line
//! terminators and a leading byte-order mark removed, reinterpreted as a
//! signed 32-bit integer. Line-ending changes therefore do not alter it.

const CRC32_POLY: u32 = 0xEDB8_8320;

const CRC32_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Incremental CRC-32 state.
struct Crc32(u32);

impl Crc32 {
    fn new() -> Self {
        Self(0xFFFF_FFFF)
    }

    fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let idx = ((self.0 ^ byte as u32) & 0xFF) as usize;
            self.0 = (self.0 >> 8) ^ CRC32_TABLE[idx];
        }
    }

    fn finish(self) -> u32 {
        self.0 ^ 0xFFFF_FFFF
    }
}

/// CRC-32 of raw bytes.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finish()
}

/// Compute the ledger checksum for a migration script.
pub fn compute_checksum(content: &str) -> i32 {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut crc = Crc32::new();
    for line in content.split(['\n', '\r']) {
        crc.update(line.as_bytes());
    }
    crc.finish() as i32
}

#[cfg(test)]
#[path = "checksum_test.rs"]
mod tests;

//! Table-driven CRC-32 (IEEE 802.3, reflected polynomial 0xEDB88320).

const POLYNOMIAL: u32 = 0xEDB8_8320;

static TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
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

/// Running checksum over one entry's bytes.
///
/// The register starts at all ones and is complemented only when read, so
/// [`Crc32::finalize`] can be called at any point without disturbing it.
#[derive(Debug, Clone)]
pub struct Crc32 {
    state: u32,
    amount: u64,
}

impl Crc32 {
    pub fn new() -> Self {
        Self {
            state: !0,
            amount: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.state;
        for &byte in data {
            crc = (crc >> 8) ^ TABLE[((crc ^ byte as u32) & 0xFF) as usize];
        }
        self.state = crc;
        self.amount += data.len() as u64;
    }

    pub fn finalize(&self) -> u32 {
        !self.state
    }

    /// Total bytes digested so far.
    pub fn amount(&self) -> u64 {
        self.amount
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC-32 of a complete buffer.
pub fn checksum(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finalize()
}

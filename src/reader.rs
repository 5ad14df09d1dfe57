//! Bounds-checked cursor over the code buffer with rolling window hashes.

use crate::decoder::DecodeError;
use crate::Address;

/// FNV-1a offset basis; every window hash starts from it.
pub const HASH_SEED: u32 = 0x811C_9DC5;

/// FNV-1a 32-bit prime.
pub const HASH_PRIME: u32 = 0x0100_0193;

/// Fold one byte into an FNV-1a hash.
#[inline]
pub fn update_hash(hash: u32, byte: u8) -> u32 {
    (hash ^ byte as u32).wrapping_mul(HASH_PRIME)
}

/// FNV-1a hash of a whole byte slice.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    bytes.iter().fold(HASH_SEED, |hash, &byte| update_hash(hash, byte))
}

/// A position in the code buffer.
///
/// Every consumed byte is folded into two accumulators: `hash1` covers the
/// instruction being decoded, `hash2` covers the previous instruction and the
/// current one. [`Reader::begin_instruction`] shifts the window.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    code: &'a [u8],
    ip: Address,
    hash1: u32,
    hash2: u32,
}

impl<'a> Reader<'a> {
    /// Create a reader positioned at `ip` with both hashes at the seed.
    pub fn new(code: &'a [u8], ip: Address) -> Self {
        Self {
            code,
            ip,
            hash1: HASH_SEED,
            hash2: HASH_SEED,
        }
    }

    /// Current offset.
    pub fn position(&self) -> Address {
        self.ip
    }

    /// Length of the underlying code buffer.
    pub fn code_length(&self) -> Address {
        self.code.len() as Address
    }

    /// True once the cursor sits exactly at the end of the code.
    pub fn at_end(&self) -> bool {
        self.ip as usize >= self.code.len()
    }

    /// Hash of the bytes consumed since the current instruction began.
    pub fn hash1(&self) -> u32 {
        self.hash1
    }

    /// Hash of the bytes consumed since the previous instruction began.
    pub fn hash2(&self) -> u32 {
        self.hash2
    }

    /// Start a new instruction: the single-instruction window becomes the
    /// head of the two-instruction window.
    pub fn begin_instruction(&mut self) {
        self.hash2 = self.hash1;
        self.hash1 = HASH_SEED;
    }

    fn check_code_has(&self, n: u64, what: &'static str) -> Result<(), DecodeError> {
        if self.ip as u64 + n > self.code.len() as u64 {
            return Err(DecodeError::Truncated { what, offset: self.ip });
        }
        Ok(())
    }

    /// Consume `n` bytes, updating both hashes.
    pub fn read(&mut self, n: u32, what: &'static str) -> Result<&'a [u8], DecodeError> {
        self.check_code_has(n as u64, what)?;
        let start = self.ip as usize;
        let bytes = &self.code[start..start + n as usize];
        for &byte in bytes {
            self.hash1 = update_hash(self.hash1, byte);
            self.hash2 = update_hash(self.hash2, byte);
        }
        self.ip += n;
        Ok(bytes)
    }

    /// Consume one byte.
    pub fn next_byte(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        Ok(self.read(1, what)?[0])
    }

    /// Consume a little-endian 32-bit value.
    pub fn next_u32(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        let bytes = self.read(4, what)?;
        Ok(le_u32(bytes))
    }

    /// Look at the next `n` bytes without consuming or hashing them.
    pub fn peek(&self, n: u32, what: &'static str) -> Result<&'a [u8], DecodeError> {
        self.check_code_has(n as u64, what)?;
        let start = self.ip as usize;
        Ok(&self.code[start..start + n as usize])
    }

    /// Look at the little-endian 32-bit value `skip` bytes ahead.
    pub fn peek_u32_at(&self, skip: u32, what: &'static str) -> Result<u32, DecodeError> {
        let bytes = self.peek(skip + 4, what)?;
        Ok(le_u32(&bytes[skip as usize..]))
    }

    /// Ensure `n` more bytes are available; sizes beyond `u32` never fit.
    pub fn require(&self, n: u64, what: &'static str) -> Result<(), DecodeError> {
        self.check_code_has(n, what)
    }
}

/// Decode a little-endian `u32` from the first four bytes of `bytes`.
pub fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

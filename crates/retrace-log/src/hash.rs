//! Hashing utilities for RNG and state checksums.
//!
//! Uses FNV-1a for fast, deterministic hashing. These hashes are not
//! cryptographically secure; they only need to make a replayed state
//! that differs from the recorded one very unlikely to compare equal.
//! Recorder and replayer must agree on them, so simulations are expected
//! to build their checksums with [`Fnv1a`].

/// FNV-1a offset basis for 64-bit.
pub const FNV_OFFSET: u64 = 0xcbf29ce484222325;
/// FNV-1a prime for 64-bit.
const FNV_PRIME: u64 = 0x00000100000001B3;

/// Incremental FNV-1a hasher with little-endian integer folding.
///
/// # Examples
///
/// ```
/// use retrace_log::Fnv1a;
///
/// let a = Fnv1a::new().u64(42).str("orc").finish();
/// let b = Fnv1a::new().u64(42).str("orc").finish();
/// assert_eq!(a, b);
/// assert_ne!(a, Fnv1a::new().u64(43).str("orc").finish());
/// ```
#[derive(Clone, Copy, Debug)]
#[must_use]
pub struct Fnv1a(u64);

impl Fnv1a {
    /// A hasher at the FNV-1a offset basis.
    pub fn new() -> Self {
        Self(FNV_OFFSET)
    }

    /// Feed a single byte.
    #[inline]
    pub fn byte(self, byte: u8) -> Self {
        Self((self.0 ^ byte as u64).wrapping_mul(FNV_PRIME))
    }

    /// Feed a byte slice.
    pub fn bytes(mut self, bytes: &[u8]) -> Self {
        for &b in bytes {
            self = self.byte(b);
        }
        self
    }

    /// Feed a u32 as 4 LE bytes.
    pub fn u32(self, v: u32) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    /// Feed a u64 as 8 LE bytes.
    pub fn u64(self, v: u64) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    /// Feed an i32 as 4 LE bytes.
    pub fn i32(self, v: i32) -> Self {
        self.bytes(&v.to_le_bytes())
    }

    /// Feed a string, length first so `"ab","c"` and `"a","bc"` differ.
    pub fn str(self, s: &str) -> Self {
        self.u32(s.len() as u32).bytes(s.as_bytes())
    }

    /// The final hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash an opaque state image.
pub fn image_hash(image: &[u8]) -> u64 {
    Fnv1a::new().bytes(image).finish()
}

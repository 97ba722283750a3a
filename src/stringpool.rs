//! Deduplicated string storage
//!
//! Strings are stored NUL-terminated in one contiguous buffer and referenced
//! by their byte offset. Offset 0 always holds the empty string, so a zeroed
//! offset field reads back as "".

use crate::error::{LocError, Result};
use rustc_hash::FxHashMap;

/// Builder for the string pool section
#[derive(Debug, Clone)]
pub struct StringPool {
    data: Vec<u8>,
    offsets: FxHashMap<String, u32>,
}

impl StringPool {
    /// Create a pool holding only the empty string
    pub fn new() -> Self {
        let mut offsets = FxHashMap::default();
        offsets.insert(String::new(), 0);
        Self {
            data: vec![0],
            offsets,
        }
    }

    /// Intern a string and return its offset
    ///
    /// Adding the same string twice returns the same offset.
    pub fn add(&mut self, s: &str) -> Result<u32> {
        if let Some(&offset) = self.offsets.get(s) {
            return Ok(offset);
        }
        if s.as_bytes().contains(&0) {
            return Err(LocError::Encoding(format!(
                "string contains NUL byte: {:?}",
                s
            )));
        }

        if self.data.len() + s.len() + 1 > u32::MAX as usize {
            return Err(LocError::Encoding("string pool exceeds 4 GiB".to_string()));
        }
        let offset = self.data.len() as u32;

        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        self.offsets.insert(s.to_string(), offset);
        Ok(offset)
    }

    /// Number of distinct strings, including the empty string
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// True if only the empty string is stored
    pub fn is_empty(&self) -> bool {
        self.offsets.len() == 1
    }

    /// Encoded section
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve an offset inside an encoded pool without copying
pub fn read_string(pool: &[u8], offset: u32) -> Result<&str> {
    let start = offset as usize;
    let tail = pool.get(start..).ok_or_else(|| {
        LocError::Corrupt(format!(
            "string offset {} outside pool of {} bytes",
            offset,
            pool.len()
        ))
    })?;
    let end = memchr::memchr(0, tail).ok_or_else(|| {
        LocError::Corrupt(format!("unterminated string at offset {}", offset))
    })?;
    std::str::from_utf8(&tail[..end])
        .map_err(|e| LocError::Corrupt(format!("invalid UTF-8 at offset {}: {}", offset, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string_at_zero() {
        let mut pool = StringPool::new();
        assert!(pool.is_empty());
        assert_eq!(pool.add("").unwrap(), 0);
        assert_eq!(read_string(pool.as_bytes(), 0).unwrap(), "");
    }

    #[test]
    fn test_interning() {
        let mut pool = StringPool::new();
        let a = pool.add("Example Org").unwrap();
        let b = pool.add("Other Org").unwrap();
        let c = pool.add("Example Org").unwrap();

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 3);
        assert_eq!(read_string(pool.as_bytes(), a).unwrap(), "Example Org");
        assert_eq!(read_string(pool.as_bytes(), b).unwrap(), "Other Org");
    }

    #[test]
    fn test_utf8_strings() {
        let mut pool = StringPool::new();
        let off = pool.add("Société Générale").unwrap();
        assert_eq!(read_string(pool.as_bytes(), off).unwrap(), "Société Générale");
    }

    #[test]
    fn test_rejects_nul() {
        let mut pool = StringPool::new();
        assert!(matches!(pool.add("a\0b"), Err(LocError::Encoding(_))));
    }

    #[test]
    fn test_read_out_of_bounds() {
        let pool = b"\0abc";
        assert!(matches!(read_string(pool, 10), Err(LocError::Corrupt(_))));
        assert!(matches!(read_string(pool, 1), Err(LocError::Corrupt(_))));
    }
}

//! Symmetric payload obfuscation.
//!
//! A repeating-key XOR over the payload bytes. This only keeps casual
//! listeners on the shared medium from reading application data; it offers no
//! integrity and no real confidentiality.

use crate::WireError;
use std::fmt;

/// Longest accepted key
pub const MAX_KEY_LEN: usize = 20;

/// Repeating-key XOR obfuscator, inactive when built from an empty key
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Obfuscator {
    key: [u8; MAX_KEY_LEN],
    len: u8,
}

impl Obfuscator {
    /// Obfuscator that leaves payloads untouched
    pub const NONE: Obfuscator = Obfuscator {
        key: [0; MAX_KEY_LEN],
        len: 0,
    };

    /// Create an obfuscator from key bytes; an empty key disables it
    pub fn new(key: &[u8]) -> Result<Self, WireError> {
        if key.len() > MAX_KEY_LEN {
            return Err(WireError::KeyTooLong(key.len()));
        }
        let mut raw = [0u8; MAX_KEY_LEN];
        raw[..key.len()].copy_from_slice(key);
        Ok(Self {
            key: raw,
            len: key.len() as u8,
        })
    }

    /// Whether a key is configured
    pub fn is_active(&self) -> bool {
        self.len > 0
    }

    /// XOR `data` in place; applying twice restores the input
    pub fn apply(&self, data: &mut [u8]) {
        if !self.is_active() {
            return;
        }
        let key = &self.key[..self.len as usize];
        for (byte, k) in data.iter_mut().zip(key.iter().cycle()) {
            *byte ^= k;
        }
    }
}

impl fmt::Debug for Obfuscator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // never print key material
        f.debug_struct("Obfuscator")
            .field("active", &self.is_active())
            .finish()
    }
}

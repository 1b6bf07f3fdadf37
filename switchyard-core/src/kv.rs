// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-memory key-value storage and its wire encoding.
//!
//! A set request body is laid out as
//! `|u16 LE key length|key bytes|value bytes|`; a get request body is the
//! bare key.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::KvError;

/// Largest accepted key.
pub const MAX_KEY_SIZE: usize = 10_000;

/// Largest accepted value.
pub const MAX_VALUE_SIZE: usize = 100_000;

/// Encode a key and value into one contiguous buffer.
pub fn write_key_and_value(key: &[u8], value: &[u8]) -> Result<Vec<u8>, KvError> {
    if key.len() > MAX_KEY_SIZE {
        return Err(KvError::KeyTooLarge {
            size: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    if value.len() > MAX_VALUE_SIZE {
        return Err(KvError::ValueTooLarge {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }

    let mut out = Vec::with_capacity(2 + key.len() + value.len());
    out.extend_from_slice(&(key.len() as u16).to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(value);
    Ok(out)
}

/// Split an encoded buffer back into key and value.
pub fn extract_key_and_value(input: &[u8]) -> Result<(&[u8], &[u8]), KvError> {
    if input.len() < 2 {
        return Err(KvError::NoSpaceForLength);
    }
    let declared = u16::from_le_bytes([input[0], input[1]]) as usize;
    let rest = &input[2..];
    if declared > rest.len() {
        return Err(KvError::InvalidSize {
            declared,
            remaining: rest.len(),
        });
    }
    Ok(rest.split_at(declared))
}

/// Thread-safe in-memory key-value store, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, KvError> {
        self.data.read().get(key).cloned().ok_or(KvError::NotFound)
    }

    /// Overwrites any existing value. Applies the same size limits as the
    /// wire encoding.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        if key.len() > MAX_KEY_SIZE {
            return Err(KvError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_round_trip() {
        let cases: [(&[u8], &[u8]); 4] = [
            (b"key", b"value"),
            (b"", b""),
            (b"", b"value only"),
            (&[0, 255, 1, 2], &[9; 1000]),
        ];
        for (key, value) in cases {
            let encoded = write_key_and_value(key, value).unwrap();
            let (k, v) = extract_key_and_value(&encoded).unwrap();
            assert_eq!(k, key);
            assert_eq!(v, value);
        }
    }

    #[test]
    fn test_size_limits() {
        assert!(write_key_and_value(&[1; MAX_KEY_SIZE], b"").is_ok());
        assert!(matches!(
            write_key_and_value(&[1; 10_001], b""),
            Err(KvError::KeyTooLarge { size: 10_001, .. })
        ));
        assert!(matches!(
            write_key_and_value(b"k", &[1; 100_001]),
            Err(KvError::ValueTooLarge { size: 100_001, .. })
        ));
    }

    #[test]
    fn test_extract_errors() {
        assert_eq!(extract_key_and_value(&[]), Err(KvError::NoSpaceForLength));
        assert_eq!(extract_key_and_value(&[4]), Err(KvError::NoSpaceForLength));
        assert_eq!(
            extract_key_and_value(&[5, 0, b'a', b'b']),
            Err(KvError::InvalidSize {
                declared: 5,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_store_get_missing() {
        let store = MemoryStore::new();
        assert_eq!(store.get(b"missing"), Err(KvError::NotFound));
    }

    #[test]
    fn test_store_set_then_get() {
        let store = MemoryStore::new();
        store.set(b"key", b"first").unwrap();
        store.set(b"key", b"second").unwrap();
        assert_eq!(store.get(b"key").unwrap(), b"second");
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_store_concurrent_access() {
        use std::thread;

        let store = MemoryStore::new();
        let handles: Vec<_> = (0..10u8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || store.set(&[i], &[i; 8]).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 10);
        assert_eq!(store.get(&[3]).unwrap(), vec![3; 8]);
    }
}

//! Content fingerprints of values using BLAKE3

use super::value::{NodeId, NumberKey, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte BLAKE3 hash of a value's content
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The zero hash (used as a sentinel for "no value")
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Hash(arr))
    }

    /// Get a short prefix for display (first 7 chars, like git)
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl Value {
    /// Content fingerprint
    ///
    /// Deeply equal values hash the same: mapping keys are fed in sorted
    /// order and numbers by numeric value. A back-reference to a container on
    /// the current path hashes as that ancestor's depth. Opaque leaves hash
    /// by address, so their fingerprint is only stable within a process.
    pub fn fingerprint(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        let mut ancestors = Vec::new();
        feed(&mut hasher, self, &mut ancestors);
        Hash(*hasher.finalize().as_bytes())
    }
}

fn feed(hasher: &mut blake3::Hasher, value: &Value, ancestors: &mut Vec<NodeId>) {
    match value {
        Value::Null => {
            hasher.update(b"n");
        }
        Value::Bool(b) => {
            hasher.update(&[b'b', u8::from(*b)]);
        }
        Value::Number(n) => feed_number(hasher, n),
        Value::String(s) => {
            hasher.update(b"s");
            hasher.update(&(s.len() as u64).to_le_bytes());
            hasher.update(s.as_bytes());
        }
        Value::Sequence(seq) => {
            if let Some(depth) = ancestors.iter().position(|id| *id == seq.id()) {
                hasher.update(b"c");
                hasher.update(&(depth as u64).to_le_bytes());
                return;
            }
            ancestors.push(seq.id());
            let items = seq.read();
            hasher.update(b"a");
            hasher.update(&(items.len() as u64).to_le_bytes());
            for item in items.iter() {
                feed(hasher, item, ancestors);
            }
            ancestors.pop();
        }
        Value::Mapping(map) => {
            if let Some(depth) = ancestors.iter().position(|id| *id == map.id()) {
                hasher.update(b"c");
                hasher.update(&(depth as u64).to_le_bytes());
                return;
            }
            ancestors.push(map.id());
            let entries = map.read();
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            hasher.update(b"o");
            hasher.update(&(keys.len() as u64).to_le_bytes());
            for key in keys {
                hasher.update(&(key.len() as u64).to_le_bytes());
                hasher.update(key.as_bytes());
                if let Some(item) = entries.get(key.as_str()) {
                    feed(hasher, item, ancestors);
                }
            }
            ancestors.pop();
        }
        Value::Opaque(opaque) => {
            hasher.update(b"x");
            hasher.update(&(opaque.id().as_usize() as u64).to_le_bytes());
        }
    }
}

// Numbers feed their exact value so hashing agrees with `Value` equality.
fn feed_number(hasher: &mut blake3::Hasher, n: &serde_json::Number) {
    match NumberKey::of(n) {
        NumberKey::Int(i) => {
            hasher.update(b"i");
            hasher.update(&i.to_le_bytes());
        }
        NumberKey::Float(bits) => {
            hasher.update(b"f");
            hasher.update(&bits.to_le_bytes());
        }
    }
}

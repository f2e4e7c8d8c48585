// (c) 2020-2022 ZeroTier, Inc. -- currently propritery pending actual release and licensing. See LICENSE.md.

use std::collections::BTreeMap;

/// A flat key/value store with a deterministic byte encoding, used for netconf metadata
/// and for the persisted/serialized form of a NetworkConfig.
///
/// Encoding is one `key=value` pair per line with `=`, `\\`, and `\n` backslash-escaped in
/// both keys and values. Ordering is deterministic (BTreeMap) so that two dictionaries with
/// the same contents always serialize to the same bytes.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Dictionary(BTreeMap<String, Vec<u8>>);

fn escape_into(raw: &[u8], out: &mut Vec<u8>) {
    for &b in raw {
        match b {
            b'=' | b'\\' | b'\n' | b'\r' => {
                out.push(b'\\');
                out.push(b);
            }
            _ => out.push(b),
        }
    }
}

impl Dictionary {
    #[inline(always)]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn set_str<K: Into<String>>(&mut self, key: K, value: &str) {
        self.0.insert(key.into(), value.as_bytes().to_vec());
    }

    pub fn set_u64<K: Into<String>>(&mut self, key: K, value: u64) {
        self.0.insert(key.into(), value.to_string().into_bytes());
    }

    pub fn set_bytes<K: Into<String>>(&mut self, key: K, value: Vec<u8>) {
        self.0.insert(key.into(), value);
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(|v| v.as_slice())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get_bytes(key).and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get_str(key).and_then(|s| s.parse().ok())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (k, v) in self.0.iter() {
            escape_into(k.as_bytes(), &mut out);
            out.push(b'=');
            escape_into(v.as_slice(), &mut out);
            out.push(b'\n');
        }
        out
    }

    /// Parse a dictionary from its wire encoding. Returns None on malformed input.
    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        let mut d = Self::new();
        let mut key = String::new();
        let mut value: Vec<u8> = Vec::new();
        let mut in_value = false;
        let mut escape = false;
        for &byte in b {
            if escape {
                if in_value {
                    value.push(byte);
                } else {
                    key.push(byte as char);
                }
                escape = false;
                continue;
            }
            match byte {
                b'\\' => escape = true,
                b'=' if !in_value => in_value = true,
                b'\n' => {
                    if in_value {
                        d.0.insert(std::mem::take(&mut key), std::mem::take(&mut value));
                    } else if !key.is_empty() {
                        return None; // line had no '=' separator
                    }
                    in_value = false;
                }
                _ => {
                    if in_value {
                        value.push(byte);
                    } else {
                        key.push(byte as char);
                    }
                }
            }
        }
        if escape || in_value {
            return None; // truncated mid-escape or mid-value (missing trailing newline)
        }
        Some(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_values() {
        let mut d = Dictionary::new();
        d.set_str("name", "test net");
        d.set_u64("revision", 42);
        let b = d.to_bytes();
        let d2 = Dictionary::from_bytes(&b).unwrap();
        assert_eq!(d, d2);
        assert_eq!(d2.get_str("name"), Some("test net"));
        assert_eq!(d2.get_u64("revision"), Some(42));
    }

    #[test]
    fn escapes_special_characters() {
        let mut d = Dictionary::new();
        d.set_str("k", "a=b\\c\nd");
        let b = d.to_bytes();
        let d2 = Dictionary::from_bytes(&b).unwrap();
        assert_eq!(d2.get_str("k"), Some("a=b\\c\nd"));
    }

    #[test]
    fn empty_dictionary_round_trips() {
        let d = Dictionary::new();
        assert!(Dictionary::from_bytes(&d.to_bytes()).unwrap().is_empty());
    }

    #[test]
    fn round_trips_high_bit_bytes() {
        let mut d = Dictionary::new();
        let payload: Vec<u8> = (0u8..=255).collect();
        d.set_bytes("payload", payload.clone());
        let b = d.to_bytes();
        let d2 = Dictionary::from_bytes(&b).unwrap();
        assert_eq!(d2.get_bytes("payload"), Some(payload.as_slice()));
    }
}

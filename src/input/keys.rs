//! Key identifiers and trigger state tracking
//!
//! Keys are identified by name ("q", "f8") and carry the macOS virtual
//! keycode used for state queries and injection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Virtual keycodes (ANSI layout) for the names accepted in configuration
const KEYCODES: &[(&str, u16)] = &[
    ("a", 0),
    ("s", 1),
    ("d", 2),
    ("f", 3),
    ("h", 4),
    ("g", 5),
    ("z", 6),
    ("x", 7),
    ("c", 8),
    ("v", 9),
    ("b", 11),
    ("q", 12),
    ("w", 13),
    ("e", 14),
    ("r", 15),
    ("y", 16),
    ("t", 17),
    ("1", 18),
    ("2", 19),
    ("3", 20),
    ("4", 21),
    ("6", 22),
    ("5", 23),
    ("9", 25),
    ("7", 26),
    ("8", 28),
    ("0", 29),
    ("o", 31),
    ("u", 32),
    ("i", 34),
    ("p", 35),
    ("return", 36),
    ("l", 37),
    ("j", 38),
    ("k", 40),
    ("n", 45),
    ("m", 46),
    ("tab", 48),
    ("space", 49),
    ("escape", 53),
    ("command", 55),
    ("shift", 56),
    ("capslock", 57),
    ("option", 58),
    ("control", 59),
    ("f5", 96),
    ("f6", 97),
    ("f7", 98),
    ("f3", 99),
    ("f8", 100),
    ("f9", 101),
    ("f11", 103),
    ("f10", 109),
    ("f12", 111),
    ("f4", 118),
    ("f2", 120),
    ("f1", 122),
    ("left", 123),
    ("right", 124),
    ("down", 125),
    ("up", 126),
];

/// A named keyboard key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct Key {
    name: &'static str,
    code: u16,
}

impl Key {
    pub const Q: Key = Key { name: "q", code: 12 };
    pub const E: Key = Key { name: "e", code: 14 };
    pub const O: Key = Key { name: "o", code: 31 };
    pub const F8: Key = Key { name: "f8", code: 100 };

    /// Configuration name of the key
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// macOS virtual keycode
    pub fn code(&self) -> u16 {
        self.code
    }
}

/// Error returned when a key name is not in the keycode table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key name '{0}'")]
pub struct UnknownKey(pub String);

impl FromStr for Key {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        KEYCODES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|&(name, code)| Self { name, code })
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

// Written by hand: a derive would borrow `name` from the input
impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.name.to_string()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The two keys whose hold state drives the remap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerKeys {
    pub a: Key,
    pub b: Key,
}

impl TriggerKeys {
    /// Check whether `key` is one of the triggers
    pub fn contains(&self, key: Key) -> bool {
        self.a == key || self.b == key
    }
}

/// Sampled physical state of the trigger keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerState {
    /// First trigger key is held
    pub a: bool,
    /// Second trigger key is held
    pub b: bool,
}

impl TriggerState {
    /// Check if either trigger is held
    pub fn any(&self) -> bool {
        self.a || self.b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_keys() {
        let q: Key = "q".parse().unwrap();
        assert_eq!(q.code(), 12);
        let f8: Key = "F8".parse().unwrap();
        assert_eq!(f8.code(), 100);
        assert_eq!(f8.name(), "f8");
    }

    #[test]
    fn test_parse_unknown_key() {
        let err = "hyper".parse::<Key>().unwrap_err();
        assert_eq!(err, UnknownKey("hyper".to_string()));
    }

    #[test]
    fn test_constants_match_table() {
        for key in [Key::Q, Key::E, Key::O, Key::F8] {
            assert_eq!(key.name().parse::<Key>().unwrap(), key);
        }
    }

    #[test]
    fn test_key_serde_as_name() {
        let key: Key = serde_json::from_str("\"e\"").unwrap();
        assert_eq!(key.code(), 14);
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"e\"");
        assert!(serde_json::from_str::<Key>("\"nope\"").is_err());
    }

    #[test]
    fn test_key_deserializes_inside_owned_structs() {
        #[derive(Deserialize)]
        struct Binding {
            keys: [Key; 2],
            output: Key,
        }

        let raw = String::from(r#"{"keys": ["Q", "e"], "output": "p"}"#);
        let binding: Binding = serde_json::from_str(&raw).unwrap();
        drop(raw);
        assert_eq!(binding.keys, [Key::Q, Key::E]);
        assert_eq!(binding.output.name(), "p");
    }

    #[test]
    fn test_trigger_state() {
        assert!(!TriggerState::default().any());
        assert!(TriggerState { a: true, b: false }.any());
        assert!(TriggerState { a: false, b: true }.any());
    }
}

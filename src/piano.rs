//! The 88-key piano keyboard in ascending pitch order

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of keys on a standard piano
pub const KEY_COUNT: usize = 88;

const KEY_NAMES: [&str; KEY_COUNT] = [
    "A0", "A0sBb0", "B0", "C1", "C1sDb1", "D1", "D1sEb1", "E1",
    "F1", "F1sGb1", "G1", "G1sAb1", "A1", "A1sBb1", "B1", "C2",
    "C2sDb2", "D2", "D2sEb2", "E2", "F2", "F2sGb2", "G2", "G2sAb2",
    "A2", "A2sBb2", "B2", "C3", "C3sDb3", "D3", "D3sEb3", "E3",
    "F3", "F3sGb3", "G3", "G3sAb3", "A3", "A3sBb3", "B3", "C4",
    "C4sDb4", "D4", "D4sEb4", "E4", "F4", "F4sGb4", "G4", "G4sAb4",
    "A4", "A4sBb4", "B4", "C5", "C5sDb5", "D5", "D5sEb5", "E5",
    "F5", "F5sGb5", "G5", "G5sAb5", "A5", "A5sBb5", "B5", "C6",
    "C6sDb6", "D6", "D6sEb6", "E6", "F6", "F6sGb6", "G6", "G6sAb6",
    "A6", "A6sBb6", "B6", "C7", "C7sDb7", "D7", "D7sEb7", "E7",
    "F7", "F7sGb7", "G7", "G7sAb7", "A7", "A7sBb7", "B7", "C8",
];

/// One piano key, identified by its ordinal (A0 = 0 ... C8 = 87)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct PianoKey(u8);

impl PianoKey {
    pub const A0: PianoKey = PianoKey(0);
    pub const MIDDLE_C: PianoKey = PianoKey(39);
    pub const A4: PianoKey = PianoKey(48);
    pub const C8: PianoKey = PianoKey(87);

    /// Look up a key by ordinal; None past C8
    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        if ordinal < KEY_COUNT {
            Some(PianoKey(ordinal as u8))
        } else {
            None
        }
    }

    /// Look up a key by its name (e.g. "C4", "F3sGb3")
    pub fn from_name(name: &str) -> Option<Self> {
        KEY_NAMES
            .iter()
            .position(|&n| n.eq_ignore_ascii_case(name))
            .map(|i| PianoKey(i as u8))
    }

    /// All 88 keys, lowest first
    pub fn all() -> impl Iterator<Item = PianoKey> {
        (0..KEY_COUNT as u8).map(PianoKey)
    }

    pub fn ordinal(&self) -> usize {
        self.0 as usize
    }

    pub fn name(&self) -> &'static str {
        KEY_NAMES[self.0 as usize]
    }

    /// MIDI note number (A0 = 21)
    pub fn midi_note(&self) -> u8 {
        self.0 + 21
    }

    /// Sharps/flats, the raised keys
    pub fn is_black(&self) -> bool {
        matches!((self.0 as usize + 9) % 12, 1 | 3 | 6 | 8 | 10)
    }

    /// Keys from this one up to C8 inclusive
    pub fn keys_from(&self) -> usize {
        KEY_COUNT - self.0 as usize
    }
}

/// Number of keys a segmentation should find when `starting_key` is the leftmost visible key
pub fn expected_key_count(starting_key: PianoKey) -> usize {
    starting_key.keys_from()
}

impl fmt::Display for PianoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for PianoKey {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        PianoKey::from_name(&value).ok_or_else(|| format!("unknown piano key '{}'", value))
    }
}

impl From<PianoKey> for String {
    fn from(key: PianoKey) -> Self {
        key.name().to_string()
    }
}

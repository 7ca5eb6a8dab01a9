//! Shared error enum and byte/hex utilities for transit-core.

use std::fmt::Write as _;

use thiserror::Error;

/// All errors produced by transit-core.
///
/// Structural mismatches are never errors: a decoder that does not recognise a
/// card simply reports `matches() == false`. These variants cover cards that a
/// decoder claimed but could not decode even partially.
#[derive(Debug, Error)]
pub enum TransitError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    #[error("sector {0} is missing or locked")]
    MissingSector(usize),
    #[error("file {file:#04x} missing from application {app:#08x}")]
    MissingFile { app: u32, file: u8 },
    #[error("record {0} is missing")]
    MissingRecord(&'static str),
    #[error("truncated {what}: need {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("unknown {scheme} layout {layout:#x}")]
    UnknownLayout { scheme: &'static str, layout: u32 },
    #[error("decoder {decoder} cannot read a {family} card")]
    WrongFamily {
        decoder: &'static str,
        family: &'static str,
    },
    #[error("invalid card dump: {0}")]
    InvalidDump(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TransitError>;

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Byte separators seen in exported card dumps (`04:A2:1B`, `04 A2 1B`, `04-A2-1B`).
const DUMP_SEPARATORS: &[char] = &[' ', ':', '-', ',', '\n', '\r', '\t'];

/// Decode hex from a card dump. Case-insensitive, with an optional `0x`
/// prefix and any of the dump separators between digits.
pub fn hex_decode(text: &str) -> Result<Vec<u8>> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let nibbles = body
        .chars()
        .filter(|c| !DUMP_SEPARATORS.contains(c))
        .map(|c| {
            c.to_digit(16)
                .ok_or_else(|| TransitError::InvalidHex(format!("bad digit {c:?} in {text:?}")))
        })
        .collect::<Result<Vec<u32>>>()?;
    if !nibbles.len().is_multiple_of(2) {
        return Err(TransitError::InvalidHex(format!(
            "{} digits in {text:?}, expected whole bytes",
            nibbles.len()
        )));
    }
    Ok(nibbles
        .chunks_exact(2)
        .map(|pair| ((pair[0] << 4) | pair[1]) as u8)
        .collect())
}

/// Uppercase hex without separators, the form serials and dumps are written in.
pub fn hex_encode(data: &[u8]) -> String {
    data.iter()
        .fold(String::with_capacity(data.len() * 2), |mut s, b| {
            let _ = write!(s, "{b:02X}");
            s
        })
}

/// True if every byte equals `value` (including the empty slice).
pub fn is_all(data: &[u8], value: u8) -> bool {
    data.iter().all(|&b| b == value)
}

// ---------------------------------------------------------------------------
// Serde adapters: byte buffers travel as hex strings in card dumps
// ---------------------------------------------------------------------------

/// `#[serde(with = "hex_bytes")]` for `Vec<u8>` fields.
pub mod hex_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::hex_encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        super::hex_decode(&text).map_err(D::Error::custom)
    }
}

/// `#[serde(with = "hex_list")]` for `Vec<Vec<u8>>` fields (blocks, pages, records).
pub mod hex_list {
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(data.len()))?;
        for item in data {
            seq.serialize_element(&super::hex_encode(item))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let items = Vec::<String>::deserialize(d)?;
        items
            .iter()
            .map(|text| super::hex_decode(text).map_err(D::Error::custom))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_decode() {
        assert_eq!(hex_decode("4840D6").unwrap(), vec![0x48, 0x40, 0xD6]);
        assert_eq!(hex_decode("48 40:d6").unwrap(), vec![0x48, 0x40, 0xD6]);
        assert_eq!(hex_decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_hex_decode_dump_formats() {
        assert_eq!(hex_decode("04-A2-1B").unwrap(), vec![0x04, 0xA2, 0x1B]);
        assert_eq!(hex_decode(" 0x9011f2\n").unwrap(), vec![0x90, 0x11, 0xF2]);
        assert_eq!(hex_decode("01,02,\r\n03").unwrap(), vec![0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_hex_decode_errors() {
        assert!(matches!(hex_decode("ABC"), Err(TransitError::InvalidHex(_))));
        assert!(matches!(hex_decode("ZZZZ"), Err(TransitError::InvalidHex(_))));
        let err = hex_decode("0102030G").unwrap_err();
        assert!(err.to_string().starts_with("invalid hex string: bad digit 'G'"));
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[0x90, 0x11, 0xF2]), "9011F2");
        assert_eq!(hex_encode(&[]), "");
    }

    #[test]
    fn test_is_all() {
        assert!(is_all(&[0, 0, 0], 0));
        assert!(!is_all(&[0, 1], 0));
        assert!(is_all(&[], 0xFF));
    }

    #[test]
    fn test_error_messages() {
        let err = TransitError::MissingFile { app: 0x9011f2, file: 0x02 };
        assert_eq!(err.to_string(), "file 0x02 missing from application 0x9011f2");
        let err = TransitError::UnknownLayout { scheme: "Troika", layout: 0xd };
        assert_eq!(err.to_string(), "unknown Troika layout 0xd");
        let err = TransitError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, TransitError::Io(_)));
        assert_eq!(err.to_string(), "IO error: gone");
    }
}

//! Text decoding for CSV sources
//!
//! Monthly files have been published as UTF-8, Latin-1 and UTF-16 over the
//! years with no declared charset, so decoding is attempted per encoding.
//! UTF-8 and UTF-16 are strict about byte sequences, so control characters in
//! field values are kept as published. Latin-1 accepts every byte sequence,
//! so its output is only accepted when it has no NUL or other C0 control
//! characters (tab, CR and LF aside): a UTF-16 file read as Latin-1 is full
//! of NULs. A UTF-16 file without a byte-order mark is also valid UTF-8, which
//! is caught by the NULs it leaves in the header line.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    Utf8,
    Latin1,
    Utf16,
}

/// Order in which CSV decoding is attempted
pub const ENCODING_ORDER: [Encoding; 3] = [Encoding::Utf8, Encoding::Latin1, Encoding::Utf16];

impl Encoding {
    pub fn label(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
            Encoding::Utf16 => "utf-16",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid {encoding} byte sequence: {detail}")]
    Invalid { encoding: Encoding, detail: String },

    #[error("decoded {encoding} text contains control character U+{code:04X} at offset {offset}")]
    NotText {
        encoding: Encoding,
        code: u32,
        offset: usize,
    },

    #[error("decoded {encoding} header contains NUL at offset {offset}, likely UTF-16")]
    NulInHeader { encoding: Encoding, offset: usize },
}

/// Decode `bytes` as `encoding`, stripping a byte-order mark when present.
/// UTF-8 text borrows from `bytes`.
pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<Cow<'_, str>, DecodeError> {
    match encoding {
        Encoding::Utf8 => {
            let text = decode_utf8(bytes)?;
            ensure_header_has_no_nul(text, encoding)?;
            Ok(Cow::Borrowed(text))
        },
        Encoding::Latin1 => {
            let text: String = bytes.iter().map(|&b| char::from(b)).collect();
            ensure_text(&text, encoding)?;
            Ok(Cow::Owned(text))
        },
        Encoding::Utf16 => decode_utf16(bytes).map(Cow::Owned),
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<&str, DecodeError> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|e| DecodeError::Invalid {
        encoding: Encoding::Utf8,
        detail: e.to_string(),
    })
}

fn decode_utf16(bytes: &[u8]) -> Result<String, DecodeError> {
    let invalid = |detail: String| DecodeError::Invalid {
        encoding: Encoding::Utf16,
        detail,
    };

    let (body, big_endian) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        _ => (bytes, false),
    };

    if body.len() % 2 != 0 {
        return Err(invalid(format!("odd byte length {}", bytes.len())));
    }

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            let pair = [pair[0], pair[1]];
            if big_endian {
                u16::from_be_bytes(pair)
            } else {
                u16::from_le_bytes(pair)
            }
        })
        .collect();

    String::from_utf16(&units).map_err(|e| invalid(e.to_string()))
}

fn ensure_text(text: &str, encoding: Encoding) -> Result<(), DecodeError> {
    match text
        .char_indices()
        .find(|(_, c)| c.is_ascii_control() && !matches!(c, '\t' | '\r' | '\n' | '\u{7f}'))
    {
        Some((offset, c)) => Err(DecodeError::NotText {
            encoding,
            code: u32::from(c),
            offset,
        }),
        None => Ok(()),
    }
}

fn ensure_header_has_no_nul(text: &str, encoding: Encoding) -> Result<(), DecodeError> {
    let header = text.split('\n').next().unwrap_or_default();
    match header.find('\0') {
        Some(offset) => Err(DecodeError::NulInHeader { encoding, offset }),
        None => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn utf16le(text: &str, bom: bool) -> Vec<u8> {
        let mut out = if bom { vec![0xFF, 0xFE] } else { Vec::new() };
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_utf8_with_bom() {
        let bytes = [&[0xEF, 0xBB, 0xBF][..], "órgão;nome".as_bytes()].concat();
        assert_eq!(decode(&bytes, Encoding::Utf8).unwrap(), "órgão;nome");
    }

    #[test]
    fn test_latin1_bytes_fail_utf8_then_decode() {
        // "São Paulo" in Latin-1
        let bytes = b"S\xe3o Paulo";
        assert!(decode(bytes, Encoding::Utf8).is_err());
        assert_eq!(decode(bytes, Encoding::Latin1).unwrap(), "São Paulo");
    }

    #[test]
    fn test_utf16_rejected_as_latin1() {
        let bytes = utf16le("id;nome\r\n1;Ana", true);
        assert!(matches!(
            decode(&bytes, Encoding::Latin1),
            Err(DecodeError::NotText { .. })
        ));
        assert_eq!(decode(&bytes, Encoding::Utf16).unwrap(), "id;nome\r\n1;Ana");
    }

    #[test]
    fn test_utf16_without_bom_defaults_little_endian() {
        let bytes = utf16le("ação", false);
        assert_eq!(decode(&bytes, Encoding::Utf16).unwrap(), "ação");
    }

    #[test]
    fn test_utf16_big_endian_bom() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "ok".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode(&bytes, Encoding::Utf16).unwrap(), "ok");
    }

    #[test]
    fn test_odd_length_utf16_fails() {
        assert!(decode(&[0x41, 0x00, 0x42], Encoding::Utf16).is_err());
    }

    #[test]
    fn test_utf8_keeps_control_characters_in_fields() {
        let text = "id_terc;nm_terceirizado\n1;MARIA\u{0B}DA SILVA\n";
        assert_eq!(decode(text.as_bytes(), Encoding::Utf8).unwrap(), text);
    }

    #[test]
    fn test_utf8_accepts_trailing_end_of_file_byte() {
        let bytes = b"id_terc;nm_terceirizado\n1;ANA\n\x1a";
        let text = decode(bytes, Encoding::Utf8).unwrap();
        assert!(text.ends_with('\u{1a}'));
    }

    #[test]
    fn test_utf16_without_bom_rejected_as_utf8() {
        let bytes = utf16le("id;nome\r\n1;Ana", false);
        assert!(matches!(
            decode(&bytes, Encoding::Utf8),
            Err(DecodeError::NulInHeader { offset: 1, .. })
        ));
        assert_eq!(decode(&bytes, Encoding::Utf16).unwrap(), "id;nome\r\n1;Ana");
    }

    #[test]
    fn test_latin1_still_rejects_control_characters() {
        assert!(matches!(
            decode(b"id;nome\n1;A\x0bB", Encoding::Latin1),
            Err(DecodeError::NotText { code: 0x0B, .. })
        ));
    }

    #[test]
    fn test_nothing_decodes_garbage() {
        let bytes = [0xFF, 0x00, 0x41];
        for encoding in ENCODING_ORDER {
            assert!(decode(&bytes, encoding).is_err(), "{} accepted garbage", encoding);
        }
    }
}

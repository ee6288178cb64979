//! Base64 envelope for text sent to the repository host
//!
//! Text is encoded as its UTF-8 bytes, so anything outside the basic
//! multilingual plane survives the round trip.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoded content is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub fn encode_text(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode a base64 envelope back into text.
///
/// Embedded whitespace is ignored, since GitHub wraps encoded content at 60
/// columns.
pub fn decode_text(encoded: &str) -> Result<String, DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact)?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_multibyte() {
        let text = "café 🎉";
        assert_eq!(decode_text(&encode_text(text)).unwrap(), text);
    }

    #[test]
    fn test_round_trip_mixed_scripts_and_controls() {
        let text = "fn main() {\r\n\tprintln!(\"日本語 — Ελληνικά 𝄞\");\n}\n\0";
        assert_eq!(decode_text(&encode_text(text)).unwrap(), text);
    }

    #[test]
    fn test_known_encoding() {
        assert_eq!(encode_text("café"), "Y2Fmw6k=");
        assert_eq!(encode_text(""), "");
    }

    #[test]
    fn test_decode_ignores_line_wrapping() {
        let wrapped = "Y2Fm\nw6k=\n";
        assert_eq!(decode_text(wrapped).unwrap(), "café");
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        // 0xff alone is not valid UTF-8
        let err = decode_text("/w==").unwrap_err();
        assert!(matches!(err, DecodeError::Utf8(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_text("not base64!"), Err(DecodeError::Base64(_))));
    }
}

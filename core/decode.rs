use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use log;
use thiserror::Error;

/// Only the first bytes are inspected for control characters.
const SNIFF_LEN: usize = 8 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("content looks binary")]
    Binary,
    #[error("malformed {0} sequence")]
    Malformed(&'static str),
    #[error("no usable text encoding detected")]
    NoUsableEncoding,
}

/// Turns raw file bytes into text, or explains why it could not.
pub trait TextDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError>;
}

impl<F> TextDecoder for F
where
    F: Fn(&[u8]) -> Result<String, DecodeError>,
{
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        self(bytes)
    }
}

/// Strict UTF-8, nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Decoder;

impl TextDecoder for Utf8Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(_) => Err(DecodeError::Malformed("UTF-8")),
        }
    }
}

/// BOM sniffing, then UTF-8, then a single fallback legacy encoding.
///
/// Content containing NUL bytes, or decoding to text with stray C0 control
/// characters, is treated as binary.
#[derive(Debug, Clone, Copy)]
pub struct DetectingDecoder {
    fallback: Option<&'static Encoding>,
}

impl Default for DetectingDecoder {
    fn default() -> Self {
        Self {
            fallback: Some(WINDOWS_1252),
        }
    }
}

impl DetectingDecoder {
    pub fn new(fallback: Option<&'static Encoding>) -> Self {
        Self { fallback }
    }

    /// Looks the fallback up by WHATWG label (`latin1`, `shift_jis`, ...).
    pub fn with_fallback_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.trim().as_bytes()).map(|enc| Self::new(Some(enc)))
    }

    pub fn fallback(&self) -> Option<&'static Encoding> {
        self.fallback
    }
}

impl TextDecoder for DetectingDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
            log::trace!("BOM detected: {}", encoding.name());
            let (text, had_errors) =
                encoding.decode_without_bom_handling(&bytes[bom_len..]);
            if had_errors {
                return Err(DecodeError::Malformed(encoding.name()));
            }
            return reject_control_chars(text.into_owned());
        }

        if bytes.contains(&0) {
            return Err(DecodeError::Binary);
        }

        if let Some(text) = UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
            return reject_control_chars(text.into_owned());
        }

        let encoding = self.fallback.ok_or(DecodeError::NoUsableEncoding)?;
        log::trace!("Not valid UTF-8, falling back to {}", encoding.name());
        match encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            Some(text) => reject_control_chars(text.into_owned()),
            None => Err(DecodeError::NoUsableEncoding),
        }
    }
}

fn reject_control_chars(text: String) -> Result<String, DecodeError> {
    let suspicious = text
        .chars()
        .take(SNIFF_LEN)
        .any(|c| c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r' | '\x0c' | '\x1b' | '\x7f'));
    if suspicious {
        Err(DecodeError::Binary)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_utf8_round_trips() {
        let text = DetectingDecoder::default()
            .decode("fn main() { println!(\"héllo\"); }\n".as_bytes())
            .unwrap();
        assert!(text.contains("héllo"));
    }

    #[test]
    fn utf16_bom_is_honoured() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "print('x')".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let text = DetectingDecoder::default().decode(&bytes).unwrap();
        assert_eq!(text, "print('x')");
    }

    #[test]
    fn nul_bytes_mean_binary() {
        let bytes = [0x7F, b'E', b'L', b'F', 0x02, 0x01, 0x00, 0x00];
        assert_eq!(
            DetectingDecoder::default().decode(&bytes),
            Err(DecodeError::Binary)
        );
    }

    #[test]
    fn latin1_bytes_use_the_fallback() {
        let bytes = b"caf\xE9 = 1";
        let text = DetectingDecoder::default().decode(bytes).unwrap();
        assert_eq!(text, "café = 1");
    }

    #[test]
    fn no_fallback_means_no_usable_encoding() {
        let bytes = b"caf\xE9 = 1";
        assert_eq!(
            DetectingDecoder::new(None).decode(bytes),
            Err(DecodeError::NoUsableEncoding)
        );
    }

    #[test]
    fn stray_control_characters_mean_binary() {
        let bytes = b"header\x01\x02\x03payload";
        assert_eq!(
            DetectingDecoder::default().decode(bytes),
            Err(DecodeError::Binary)
        );
    }

    #[test]
    fn fallback_label_lookup() {
        let decoder = DetectingDecoder::with_fallback_label("latin1").unwrap();
        assert_eq!(decoder.fallback(), Some(WINDOWS_1252));
        assert!(DetectingDecoder::with_fallback_label("klingon").is_none());
    }

    #[test]
    fn utf8_decoder_is_strict() {
        assert_eq!(Utf8Decoder.decode(b"\xEF\xBB\xBFok").unwrap(), "ok");
        assert_eq!(
            Utf8Decoder.decode(b"caf\xE9"),
            Err(DecodeError::Malformed("UTF-8"))
        );
    }

    #[test]
    fn closures_are_decoders() {
        let shouting = |bytes: &[u8]| -> Result<String, DecodeError> {
            Ok(String::from_utf8_lossy(bytes).to_uppercase())
        };
        assert_eq!(shouting.decode(b"abc").unwrap(), "ABC");
    }
}

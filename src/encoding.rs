//! Conversion between Rust strings and the dictionary's byte encoding.

use std::borrow::Cow;

use encoding_rs::{Encoding, EUC_JP, SHIFT_JIS, UTF_16BE, UTF_16LE, UTF_8};

use crate::error::{MecabError, Result};

// Names accepted by MeCab's charset decoder, compared case-insensitively.
fn mecab_charset(label: &str) -> Option<&'static Encoding> {
    let encoding = match label.to_ascii_uppercase().as_str() {
        "UTF8" | "UTF-8" => UTF_8,
        "EUCJP" | "EUC-JP" | "EUC_JP" => EUC_JP,
        "SJIS" | "SHIFT-JIS" | "SHIFT_JIS" | "CP932" => SHIFT_JIS,
        "UTF16" | "UTF-16" | "UTF16LE" | "UTF-16LE" => UTF_16LE,
        "UTF16BE" | "UTF-16BE" => UTF_16BE,
        _ => return None,
    };
    Some(encoding)
}

/// Text codec bound to one dictionary charset.
///
/// The charset label is resolved once, when the session is opened, and every
/// outbound and inbound conversion of that session goes through the same
/// bridge.
#[derive(Debug, Clone, Copy)]
pub struct EncodingBridge {
    encoding: &'static Encoding,
}

impl EncodingBridge {
    /// Builds a bridge for a charset label such as `utf8`, `EUC-JP` or `CP932`.
    ///
    /// MeCab's own charset names are tried first, then WHATWG labels. Charsets
    /// that can be decoded but not encoded (the UTF-16 family) are rejected.
    pub fn for_charset(charset: &str) -> Result<Self> {
        let label = charset.trim();
        if label.is_empty() {
            return Err(MecabError::CharsetUnresolved(
                "empty charset label".to_string(),
            ));
        }
        let encoding = mecab_charset(label)
            .or_else(|| Encoding::for_label(label.as_bytes()))
            .ok_or_else(|| {
                MecabError::CharsetUnresolved(format!("unsupported charset label: {label}"))
            })?;
        if encoding.output_encoding() != encoding {
            return Err(MecabError::CharsetUnresolved(format!(
                "charset {label} ({}) cannot be used for engine input",
                encoding.name()
            )));
        }
        Ok(Self { encoding })
    }

    /// Bridge for UTF-8 dictionaries.
    pub fn utf8() -> Self {
        Self { encoding: UTF_8 }
    }

    /// Canonical name of the bound encoding.
    pub fn charset(&self) -> &'static str {
        self.encoding.name()
    }

    /// Returns whether `text` can be handed to the engine without conversion.
    pub fn is_passthrough(&self, text: &str) -> bool {
        self.encoding == UTF_8 || (self.encoding.is_ascii_compatible() && text.is_ascii())
    }

    /// Encodes `text` into the dictionary charset.
    pub fn to_engine_bytes<'a>(&self, text: &'a str) -> Result<Cow<'a, [u8]>> {
        if self.is_passthrough(text) {
            return Ok(Cow::Borrowed(text.as_bytes()));
        }
        let (bytes, _, had_unmappable) = self.encoding.encode(text);
        if had_unmappable {
            let offending = text
                .chars()
                .find(|ch| {
                    let mut buffer = [0u8; 4];
                    self.encoding.encode(ch.encode_utf8(&mut buffer)).2
                })
                .map(|ch| format!("U+{:04X}", ch as u32))
                .unwrap_or_else(|| "unknown".to_string());
            return Err(MecabError::Encoding {
                charset: self.charset().to_string(),
                message: format!("unmappable character {offending}"),
            });
        }
        Ok(bytes)
    }

    /// Decodes engine bytes, failing on malformed sequences.
    pub fn from_engine_bytes(&self, bytes: &[u8]) -> Result<String> {
        self.encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(Cow::into_owned)
            .ok_or_else(|| MecabError::Decoding {
                charset: self.charset().to_string(),
                message: format!("malformed byte sequence in {} bytes", bytes.len()),
            })
    }
}

impl PartialEq for EncodingBridge {
    fn eq(&self, other: &Self) -> bool {
        self.encoding == other.encoding
    }
}

impl Eq for EncodingBridge {}

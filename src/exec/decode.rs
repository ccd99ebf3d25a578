// src/exec/decode.rs

use std::borrow::Cow;

use encoding_rs::GBK;

/// Decode one raw output line.
///
/// Valid UTF-8 passes through unchanged. Otherwise the bytes are tried as
/// GBK (common for console tools on Chinese Windows); if that fails too,
/// invalid sequences become U+FFFD.
pub fn decode_line(bytes: &[u8]) -> Cow<'_, str> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Cow::Borrowed(text);
    }

    if let Some(text) = GBK.decode_without_bom_handling_and_without_replacement(bytes) {
        return text;
    }

    String::from_utf8_lossy(bytes)
}

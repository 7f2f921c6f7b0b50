//! Ordered-fallback encoding probe: UTF-8, then GBK, then Latin-1.
//!
//! Latin-1 maps every byte to a code point, so the probe always succeeds;
//! it is the terminal fallback, not a detection in any meaningful sense.

pub const UTF_8: &str = "utf-8";
pub const GBK: &str = "gbk";
pub const LATIN_1: &str = "latin-1";

/// Name of the first encoding in the fallback chain that decodes cleanly.
pub fn detect(data: &[u8]) -> &'static str {
    if std::str::from_utf8(data).is_ok() {
        return UTF_8;
    }
    let (_, _, had_errors) = encoding_rs::GBK.decode(data);
    if !had_errors {
        return GBK;
    }
    LATIN_1
}

/// Decode to a UTF-8 string using the fallback chain, returning the text
/// and the encoding that was applied.
pub fn decode(data: &[u8]) -> (String, &'static str) {
    if let Ok(text) = std::str::from_utf8(data) {
        return (text.to_string(), UTF_8);
    }
    let (text, _, had_errors) = encoding_rs::GBK.decode(data);
    if !had_errors {
        return (text.into_owned(), GBK);
    }
    // Latin-1: each byte is its own code point.
    (data.iter().map(|&b| b as char).collect(), LATIN_1)
}

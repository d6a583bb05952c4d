//! Text normalization for decrypted text payloads.
//!
//! Decrypted text is decoded according to its byte order mark (UTF-8 when
//! there is none) and written back out as UTF-8 with a BOM, matching what the
//! encrypting counterpart's text tooling expects. Line endings are left alone.

use encoding_rs::{Encoding, UTF_8};

/// UTF-8 byte order mark.
pub const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

const UTF32_LE_BOM: &[u8] = &[0xFF, 0xFE, 0x00, 0x00];
const UTF32_BE_BOM: &[u8] = &[0x00, 0x00, 0xFE, 0xFF];

/// Re-encodes `bytes` as BOM-prefixed UTF-8.
///
/// A leading UTF-8, UTF-16LE/BE or UTF-32LE/BE BOM selects the decoder and is
/// consumed. Input without a BOM is read as UTF-8. Invalid sequences become
/// U+FFFD. Applying this to its own output returns the same bytes.
///
/// # Example
///
/// ```
/// use encedit::crypto::text::{normalize, UTF8_BOM};
///
/// let once = normalize(b"line one\r\nline two");
/// assert!(once.starts_with(UTF8_BOM));
/// assert_eq!(normalize(&once), once);
///
/// let utf16 = normalize(&[0xFF, 0xFE, b'h', 0, b'i', 0]);
/// assert_eq!(&utf16[UTF8_BOM.len()..], b"hi");
/// ```
pub fn normalize(bytes: &[u8]) -> Vec<u8> {
    let text = decode(bytes);

    let mut out = Vec::with_capacity(UTF8_BOM.len() + text.len());
    out.extend_from_slice(UTF8_BOM);
    out.extend_from_slice(text.as_bytes());
    out
}

fn decode(bytes: &[u8]) -> String {
    // UTF-32LE shares its first two bytes with the UTF-16LE mark.
    if let Some(body) = bytes.strip_prefix(UTF32_LE_BOM) {
        return decode_utf32(body, u32::from_le_bytes);
    }
    if let Some(body) = bytes.strip_prefix(UTF32_BE_BOM) {
        return decode_utf32(body, u32::from_be_bytes);
    }

    let (encoding, bom_len) = Encoding::for_bom(bytes).unwrap_or((UTF_8, 0));
    let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
    text.into_owned()
}

fn decode_utf32(body: &[u8], unit: fn([u8; 4]) -> u32) -> String {
    let mut chunks = body.chunks_exact(4);
    let mut text: String = chunks
        .by_ref()
        .map(|c| {
            char::from_u32(unit([c[0], c[1], c[2], c[3]])).unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect();
    if !chunks.remainder().is_empty() {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    text
}

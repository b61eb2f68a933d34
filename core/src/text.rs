//! Byte-to-text decoding for device-written files.
//!
//! Card readers on older Windows machines write Windows-1252; newer ones write
//! UTF-8. Valid UTF-8 is borrowed as-is, anything else is decoded as 1252.

use std::borrow::Cow;

use encoding_rs::WINDOWS_1252;

pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_is_borrowed() {
        let decoded = decode("Äänekoski".as_bytes());
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(decoded, "Äänekoski");
    }

    #[test]
    fn test_latin1_fallback() {
        // "Mäki" in Windows-1252
        let decoded = decode(&[b'M', 0xE4, b'k', b'i']);
        assert_eq!(decoded, "Mäki");
    }
}

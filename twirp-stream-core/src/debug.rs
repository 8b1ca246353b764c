//! Byte printing helpers for debugging wire data.

use std::fmt::Write;

/// Render bytes as space-separated decimal values, e.g. `"10 3 1 2 3"`.
pub fn print_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte}");
    }
    out
}

/// Render bytes as space-separated hex values, e.g. `"0x0a 0x03"`.
pub fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 5);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "0x{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_bytes() {
        assert_eq!(print_bytes(&[10, 3, 255]), "10 3 255");
        assert_eq!(print_bytes(&[]), "");
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes(&[0x0a, 0x03, 0xff]), "0x0a 0x03 0xff");
        assert_eq!(hex_bytes(&[]), "");
    }
}

//! Converting octet sequences into hex strings.

use std::fmt;


/// Encodes an octet sequence into a newly allocated string.
pub fn encode_string(src: &[u8]) -> String {
    let mut res = String::with_capacity(src.len() * 2);
    for ch in src {
        let [hi, lo] = encode_u8(*ch);
        res.push(hi.into());
        res.push(lo.into());
    }
    res
}

/// Returns the two hex digits of an octet.
pub fn encode_u8(ch: u8) -> [u8; 2] {
    [DIGITS[usize::from(ch >> 4)], DIGITS[usize::from(ch & 0x0F)]]
}

/// Writes an octet sequence as hex digits to a formatter.
pub fn write(src: &[u8], f: &mut fmt::Formatter) -> fmt::Result {
    for ch in src {
        let [hi, lo] = encode_u8(*ch);
        write!(f, "{}{}", char::from(hi), char::from(lo))?;
    }
    Ok(())
}

const DIGITS: &[u8] = b"0123456789abcdef";


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_octets() {
        assert_eq!(encode_string(b"\x01\xab\xff"), "01abff");
        assert_eq!(encode_string(b"\x1a\x2b"), "1a2b");
        assert_eq!(encode_string(b""), "");
    }
}

//! Handling of Base 64-encoded data.
//!
//! Only the flavor used in PEM blocks is needed by this crate.

use std::str;
use base64::Engine;
use base64::engine::general_purpose::{GeneralPurpose, STANDARD};

pub use base64::DecodeError;


//------------ Pem -----------------------------------------------------------

/// The flavor used in the body of PEM blocks.
///
/// This uses the standard alphabet with padding. Encoded data is broken
/// into lines of 64 characters. When decoding, line breaks and other white
/// space are ignored.
pub struct Pem;

impl Pem {
    const ENGINE: GeneralPurpose = STANDARD;

    /// The number of characters in a full line of encoded data.
    pub const LINE_LEN: usize = 64;

    pub fn decode(self, input: &str) -> Result<Vec<u8>, DecodeError> {
        let stripped: Vec<u8> = input.bytes().filter(|ch| {
            !ch.is_ascii_whitespace()
        }).collect();
        Self::ENGINE.decode(stripped)
    }

    /// Encodes the data into lines each terminated by a line feed.
    pub fn encode_lines(self, data: &[u8]) -> String {
        let encoded = Self::ENGINE.encode(data);
        let mut res = String::with_capacity(
            encoded.len() + encoded.len() / Self::LINE_LEN + 1
        );
        for line in encoded.as_bytes().chunks(Self::LINE_LEN) {
            // The engine only ever produces ASCII.
            res.push_str(str::from_utf8(line).unwrap_or_default());
            res.push('\n');
        }
        res
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pem_lines() {
        let data = vec![0xA5u8; 100];
        let encoded = Pem.encode_lines(&data);
        let lines: Vec<_> = encoded.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), Pem::LINE_LEN);
        assert!(encoded.ends_with('\n'));
        assert_eq!(Pem.decode(&encoded).unwrap(), data);
    }

    #[test]
    fn pem_empty() {
        assert_eq!(Pem.encode_lines(b""), "");
        assert_eq!(Pem.decode(" \n").unwrap(), Vec::<u8>::new());
    }
}

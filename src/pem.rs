//! PEM encoded data.
//!
//! Certificates, certification requests, TRCs, and signed requests are
//! stored in files as a sequence of PEM blocks:
//!
//! ```text
//! -----BEGIN CERTIFICATE-----
//! MIIB...
//! -----END CERTIFICATE-----
//! ```

use std::{error, fmt};
use bytes::Bytes;
use crate::util::base64;


//------------ Labels --------------------------------------------------------

pub const CERTIFICATE: &str = "CERTIFICATE";
pub const CERTIFICATE_REQUEST: &str = "CERTIFICATE REQUEST";
pub const CMS: &str = "CMS";
pub const TRC: &str = "TRC";
pub const PRIVATE_KEY: &str = "PRIVATE KEY";


//------------ Pem -----------------------------------------------------------

/// A single PEM block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pem {
    label: String,
    content: Bytes,
}

impl Pem {
    pub fn new(label: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Pem { label: label.into(), content: content.into() }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Parses all PEM blocks in `input`.
    ///
    /// Text outside of blocks is ignored. Returns an error if a block is
    /// not terminated, its end label doesn’t match, or its content isn’t
    /// valid Base 64.
    pub fn parse_all(input: &str) -> Result<Vec<Self>, PemError> {
        let mut res = Vec::new();
        let mut lines = input.lines();
        while let Some(line) = lines.next() {
            let label = match begin_label(line) {
                Some(label) => label,
                None => continue,
            };
            let mut body = String::new();
            loop {
                let line = match lines.next() {
                    Some(line) => line.trim(),
                    None => return Err(PemError::Unterminated)
                };
                if let Some(end) = end_label(line) {
                    if end != label {
                        return Err(PemError::LabelMismatch)
                    }
                    break
                }
                body.push_str(line);
            }
            let content = base64::Pem.decode(&body).map_err(|_| {
                PemError::Base64
            })?;
            res.push(Pem::new(label, content));
        }
        Ok(res)
    }

    /// Parses all blocks and checks that they all have the given label.
    ///
    /// Returns the contents of the blocks. There must be at least one
    /// block.
    pub fn parse_labeled(
        input: &str, label: &str
    ) -> Result<Vec<Bytes>, PemError> {
        let blocks = Self::parse_all(input)?;
        if blocks.is_empty() {
            return Err(PemError::Empty)
        }
        blocks.into_iter().map(|block| {
            if block.label == label {
                Ok(block.content)
            }
            else {
                Err(PemError::UnexpectedLabel(block.label))
            }
        }).collect()
    }

    /// Returns the PEM encoding of the block.
    pub fn encode(&self) -> String {
        encode(&self.label, &self.content)
    }
}

/// Returns the PEM encoding of the content with the given label.
pub fn encode(label: &str, content: &[u8]) -> String {
    format!(
        "-----BEGIN {label}-----\n{}-----END {label}-----\n",
        base64::Pem.encode_lines(content)
    )
}

fn begin_label(line: &str) -> Option<&str> {
    line.trim().strip_prefix("-----BEGIN ")?.strip_suffix("-----")
}

fn end_label(line: &str) -> Option<&str> {
    line.trim().strip_prefix("-----END ")?.strip_suffix("-----")
}


//------------ PemError ------------------------------------------------------

/// PEM encoded data is malformed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PemError {
    /// There were no PEM blocks.
    Empty,

    /// A block wasn’t terminated.
    Unterminated,

    /// The end label of a block differed from the start label.
    LabelMismatch,

    /// The content of a block was not valid Base 64.
    Base64,

    /// A block had an unexpected label.
    UnexpectedLabel(String),
}

impl fmt::Display for PemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PemError::Empty => f.write_str("no PEM blocks found"),
            PemError::Unterminated => f.write_str("unterminated PEM block"),
            PemError::LabelMismatch => {
                f.write_str("mismatched PEM begin and end labels")
            }
            PemError::Base64 => f.write_str("invalid Base 64 in PEM block"),
            PemError::UnexpectedLabel(ref label) => {
                write!(f, "unexpected PEM block '{}'", label)
            }
        }
    }
}

impl error::Error for PemError { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_parse() {
        let mut text = encode(CERTIFICATE, b"first");
        text.push_str("some comment\n");
        text.push_str(&encode(CERTIFICATE, &[0x55; 80]));
        let blocks = Pem::parse_all(&text).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].label(), CERTIFICATE);
        assert_eq!(blocks[0].content().as_ref(), b"first");
        assert_eq!(blocks[1].content().as_ref(), &[0x55; 80]);
        assert_eq!(
            Pem::parse_labeled(&text, CERTIFICATE).unwrap().len(), 2
        );
        assert_eq!(
            Pem::parse_labeled(&text, CMS),
            Err(PemError::UnexpectedLabel(CERTIFICATE.into()))
        );
    }

    #[test]
    fn malformed() {
        assert_eq!(
            Pem::parse_all("-----BEGIN CMS-----\nAAAA\n"),
            Err(PemError::Unterminated)
        );
        assert_eq!(
            Pem::parse_all("-----BEGIN CMS-----\nAAAA\n-----END TRC-----\n"),
            Err(PemError::LabelMismatch)
        );
        assert_eq!(
            Pem::parse_all("-----BEGIN CMS-----\n!!\n-----END CMS-----\n"),
            Err(PemError::Base64)
        );
        assert_eq!(Pem::parse_labeled("", CMS), Err(PemError::Empty));
    }
}

//! Digest algorithm and operations.

use bcder::{decode, encode};
use bcder::{Oid, Tag};
use bcder::decode::DecodeError;
use bcder::encode::PrimitiveContent;
use ring::digest;
use crate::oid;

// Re-export the things from ring for actual digest generation.
pub use ring::digest::Digest;


//------------ DigestAlgorithm -----------------------------------------------

/// The digest algorithms used in CMS signed data.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
}


/// # Creating Digest Values
///
impl DigestAlgorithm {
    /// Returns the digest of `data` using this algorithm.
    pub fn digest(self, data: &[u8]) -> Digest {
        digest::digest(self.ring_algorithm(), data)
    }

    fn ring_algorithm(self) -> &'static digest::Algorithm {
        match self {
            DigestAlgorithm::Sha256 => &digest::SHA256,
            DigestAlgorithm::Sha384 => &digest::SHA384,
        }
    }
}


/// # ASN.1 Values
///
/// Digest algorithms appear in CMS either alone or in sets with the following
/// syntax:
///
/// ```txt
/// DigestAlgorithmIdentifiers ::= SET OF DigestAlgorithmIdentifier
/// DigestAlgorithmIdentifier  ::= AlgorithmIdentifier
/// AlgorithmIdentifier        ::= SEQUENCE {
///      algorithm                 OBJECT IDENTIFIER,
///      parameters                ANY DEFINED BY algorithm OPTIONAL }
/// ```
///
/// The _parameters_ field may either be absent or `NULL`.
impl DigestAlgorithm {
    /// Takes and returns a single digest algorithm identifier.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    /// Takes and returns a set of digest algorithm identifiers.
    ///
    /// The set must contain exactly one identifier.
    pub fn take_set_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_set(Self::take_from)
    }

    /// Parses the algorithm identifier from the contents of its sequence.
    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let alg = Oid::take_from(cons)?;
        let res = if alg == oid::SHA256 {
            DigestAlgorithm::Sha256
        }
        else if alg == oid::SHA384 {
            DigestAlgorithm::Sha384
        }
        else {
            return Err(cons.content_err("invalid digest algorithm"))
        };
        cons.take_opt_primitive_if(Tag::NULL, |_| Ok(()))?;
        Ok(res)
    }

    /// Provides an encoder for a single algorithm identifier.
    pub fn encode(self) -> impl encode::Values {
        encode::sequence(
            match self {
                DigestAlgorithm::Sha256 => oid::SHA256.encode(),
                DigestAlgorithm::Sha384 => oid::SHA384.encode(),
            }
        )
    }

    /// Provides an encoder for a indentifer as the sole value of a set.
    pub fn encode_set(self) -> impl encode::Values {
        encode::set(
            self.encode()
        )
    }
}


//------------ Sha1 ----------------------------------------------------------

/// Returns the SHA-1 digest of the data.
///
/// This is only used for deriving key identifiers.
pub fn sha1_digest(data: &[u8]) -> Digest {
    digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data)
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use bcder::Mode;
    use bcder::encode::Values;

    #[test]
    fn digest_lengths() {
        assert_eq!(DigestAlgorithm::Sha256.digest(b"x").as_ref().len(), 32);
        assert_eq!(DigestAlgorithm::Sha384.digest(b"x").as_ref().len(), 48);
        assert_eq!(sha1_digest(b"x").as_ref().len(), 20);
    }

    #[test]
    fn identifier_set() {
        let encoded = DigestAlgorithm::Sha384.encode_set().to_captured(
            Mode::Der
        );
        let decoded = Mode::Der.decode(
            encoded.as_slice(), DigestAlgorithm::take_set_from
        ).unwrap();
        assert_eq!(decoded, DigestAlgorithm::Sha384);
    }
}

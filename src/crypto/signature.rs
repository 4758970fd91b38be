//! Signature algorithms and operations.

use bcder::{decode, encode};
use bcder::{Oid, Tag};
use bcder::decode::DecodeError;
use bcder::encode::PrimitiveContent;
use bytes::Bytes;
use crate::oid;
use super::digest::DigestAlgorithm;


//------------ SignatureAlgorithm --------------------------------------------

/// The signature algorithms used by the control-plane PKI.
///
/// All signatures are ECDSA signatures. The digest algorithm is chosen to
/// match the size of the curve of the signing key.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SignatureAlgorithm {
    /// ECDSA with SHA-256, used with P-256 keys.
    EcdsaWithSha256,

    /// ECDSA with SHA-384, used with P-384 keys.
    EcdsaWithSha384,
}

impl SignatureAlgorithm {
    /// Returns the digest algorithm used by the signature algorithm.
    pub fn digest_algorithm(self) -> DigestAlgorithm {
        match self {
            SignatureAlgorithm::EcdsaWithSha256 => DigestAlgorithm::Sha256,
            SignatureAlgorithm::EcdsaWithSha384 => DigestAlgorithm::Sha384,
        }
    }
}


/// # ASN.1 Values
///
/// Signature algorithm identifiers appear in certificates, certification
/// requests, and CMS signer infos:
///
/// ```txt
/// AlgorithmIdentifier          ::= SEQUENCE {
///      algorithm                   OBJECT IDENTIFIER,
///      parameters                  ANY DEFINED BY algorithm OPTIONAL }
/// ```
///
/// For ECDSA, [RFC 5758] requires the parameters field to be absent.
///
/// [RFC 5758]: https://tools.ietf.org/html/rfc5758
impl SignatureAlgorithm {
    /// Takes a signature algorithm identifier from X.509 objects.
    pub fn x509_take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    /// Takes a signature algorithm identifier from a CMS signer info.
    ///
    /// This is the same as for X.509 objects.
    pub fn cms_take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let alg = Oid::take_from(cons)?;
        let res = if alg == oid::ECDSA_WITH_SHA256 {
            SignatureAlgorithm::EcdsaWithSha256
        }
        else if alg == oid::ECDSA_WITH_SHA384 {
            SignatureAlgorithm::EcdsaWithSha384
        }
        else {
            return Err(cons.content_err("invalid signature algorithm"))
        };
        // Some encoders add a NULL parameter anyway.
        cons.take_opt_primitive_if(Tag::NULL, |_| Ok(()))?;
        Ok(res)
    }

    /// Provides an encoder for X.509 objects.
    pub fn x509_encode(self) -> impl encode::Values {
        encode::sequence(
            match self {
                SignatureAlgorithm::EcdsaWithSha256 => {
                    oid::ECDSA_WITH_SHA256.encode()
                }
                SignatureAlgorithm::EcdsaWithSha384 => {
                    oid::ECDSA_WITH_SHA384.encode()
                }
            }
        )
    }

    /// Provides an encoder for CMS objects.
    pub fn cms_encode(self) -> impl encode::Values {
        self.x509_encode()
    }
}


//------------ Signature -----------------------------------------------------

/// A signature value together with the algorithm that created it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Signature {
    algorithm: SignatureAlgorithm,
    value: Bytes
}

impl Signature {
    pub fn new(algorithm: SignatureAlgorithm, value: Bytes) -> Self {
        Signature { algorithm, value }
    }

    pub fn algorithm(&self) -> &SignatureAlgorithm {
        &self.algorithm
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn unwrap(self) -> (SignatureAlgorithm, Bytes) {
        (self.algorithm, self.value)
    }
}

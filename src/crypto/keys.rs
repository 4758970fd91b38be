//! Types and parameters of keys.

use std::{error, fmt, io, str};
use std::str::FromStr;
use bcder::{decode, encode};
use bcder::{BitString, Captured, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::encode::{PrimitiveContent, Values};
use bytes::Bytes;
use ring::signature;
use crate::oid;
use crate::util::hex;
use super::digest::sha1_digest;
use super::signature::{Signature, SignatureAlgorithm};


//------------ PublicKeyFormat -----------------------------------------------

/// The formats of public keys supported by the control-plane PKI.
///
/// Only elliptic curve keys on the NIST P-256 and P-384 curves are allowed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PublicKeyFormat {
    /// An ECDSA public key for the P-256 elliptic curve.
    EcdsaP256,

    /// An ECDSA public key for the P-384 elliptic curve.
    EcdsaP384,
}

impl PublicKeyFormat {
    /// Returns the signature algorithm to use when signing with this key.
    pub fn signature_algorithm(self) -> SignatureAlgorithm {
        match self {
            PublicKeyFormat::EcdsaP256 => SignatureAlgorithm::EcdsaWithSha256,
            PublicKeyFormat::EcdsaP384 => SignatureAlgorithm::EcdsaWithSha384,
        }
    }

    /// Returns the ring verification algorithm for the key and signature.
    fn verification_algorithm(
        self, alg: SignatureAlgorithm
    ) -> &'static signature::EcdsaVerificationAlgorithm {
        match (self, alg) {
            (
                PublicKeyFormat::EcdsaP256,
                SignatureAlgorithm::EcdsaWithSha256
            ) => &signature::ECDSA_P256_SHA256_ASN1,
            (
                PublicKeyFormat::EcdsaP256,
                SignatureAlgorithm::EcdsaWithSha384
            ) => &signature::ECDSA_P256_SHA384_ASN1,
            (
                PublicKeyFormat::EcdsaP384,
                SignatureAlgorithm::EcdsaWithSha256
            ) => &signature::ECDSA_P384_SHA256_ASN1,
            (
                PublicKeyFormat::EcdsaP384,
                SignatureAlgorithm::EcdsaWithSha384
            ) => &signature::ECDSA_P384_SHA384_ASN1,
        }
    }
}


/// # ASN.1 Algorithm Identifiers
///
/// The format of the public key is identified in certificates through a
/// algorithm identifier defined with this ASN.1:
///
/// ```txt
/// AlgorithmIdentifier ::= SEQUENCE {
///      algorithm          OBJECT IDENTIFIER,
///      parameters         ANY DEFINED BY algorithm OPTIONAL }
/// ```
///
/// The object identifer needs to be `ecPublicKey` defined in [RFC 5480]
/// with the parameter being the object identifier of the named curve.
///
/// [RFC 5480]: https://tools.ietf.org/html/rfc5480
impl PublicKeyFormat {
    /// Takes and returns a algorithm identifier.
    ///
    /// Returns a malformed error if the algorithm isn’t one of the allowed
    /// algorithms or if the value isn’t correctly encoded.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    /// Parses the algorithm identifier from the contents of its sequence.
    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        oid::EC_PUBLIC_KEY.skip_if(cons)?;
        let curve = Oid::take_from(cons)?;
        if curve == oid::SECP256R1 {
            Ok(PublicKeyFormat::EcdsaP256)
        }
        else if curve == oid::SECP384R1 {
            Ok(PublicKeyFormat::EcdsaP384)
        }
        else {
            Err(cons.content_err("unsupported elliptic curve"))
        }
    }

    /// Provides an encoder for the algorihm identifier.
    pub fn encode(self) -> impl encode::Values {
        encode::sequence((
            oid::EC_PUBLIC_KEY.encode(),
            match self {
                PublicKeyFormat::EcdsaP256 => oid::SECP256R1.encode(),
                PublicKeyFormat::EcdsaP384 => oid::SECP384R1.encode(),
            }
        ))
    }
}


//------------ PublicKey -----------------------------------------------------

/// A public key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicKey {
    algorithm: PublicKeyFormat,

    /// The uncompressed curve point.
    bits: Bytes,
}

impl PublicKey {
    /// Returns the algorithm of this public key.
    pub fn algorithm(&self) -> PublicKeyFormat {
        self.algorithm
    }

    /// Returns the bits of this public key.
    pub fn bits(&self) -> &[u8] {
        self.bits.as_ref()
    }

    /// Returns a key identifier for this key.
    ///
    /// The identifier will be the SHA1 hash of the key’s bits.
    pub fn key_identifier(&self) -> KeyIdentifier {
        let digest = sha1_digest(self.bits());
        let mut res = [0u8; 20];
        res.copy_from_slice(digest.as_ref());
        KeyIdentifier(res)
    }

    /// Verifies a signature using this public key.
    pub fn verify(
        &self, message: &[u8], signature: &Signature
    ) -> Result<(), SignatureVerificationError> {
        signature::UnparsedPublicKey::new(
            self.algorithm.verification_algorithm(*signature.algorithm()),
            self.bits()
        ).verify(
            message, signature.value().as_ref()
        ).map_err(|_| SignatureVerificationError(()))
    }
}


/// # As `SubjectPublicKeyInfo`
///
/// Public keys are included in X.509 certificates as `SubjectPublicKeyInfo`
/// structures. As these contain the same information as `PublicKey`,
/// it can be decoded from and encoded to such sequences.
impl PublicKey {
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let algorithm = PublicKeyFormat::take_from(cons)?;
            let bits = BitString::take_from(cons)?;
            if bits.unused() != 0 {
                return Err(cons.content_err("invalid public key bits"))
            }
            Ok(PublicKey { algorithm, bits: bits.octet_bytes() })
        })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            self.algorithm.encode(),
            BitString::new(0, self.bits.clone()).encode()
        ))
    }

    pub fn to_captured(&self) -> Captured {
        self.encode_ref().to_captured(Mode::Der)
    }
}


//------------ KeyIdentifier -------------------------------------------------

/// A key identifier.
///
/// This is the SHA-1 hash over the public key’s bits.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct KeyIdentifier([u8; 20]);

impl KeyIdentifier {
    /// Returns an octet slice of the key identifer’s value.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Takes an encoded key identifier from a constructed value.
    ///
    /// ```text
    /// KeyIdentifier ::= OCTET STRING
    /// ```
    ///
    /// The content of the octet string needs to be a SHA-1 hash, so it must
    /// be exactly 20 octets long.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_value_if(Tag::OCTET_STRING, Self::from_content)
    }

    /// Parses an encoded key identifer from a encoded content.
    pub fn from_content<S: decode::Source>(
        content: &mut decode::Content<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let octets = OctetString::from_content(content)?.into_bytes();
        Self::try_from(octets.as_ref()).map_err(|_| {
            content.content_err("invalid key identifier")
        })
    }
}

//--- From, TryFrom and FromStr

impl From<[u8; 20]> for KeyIdentifier {
    fn from(value: [u8; 20]) -> Self {
        KeyIdentifier(value)
    }
}

impl<'a> TryFrom<&'a [u8]> for KeyIdentifier {
    type Error = KeyIdentifierError;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        value.try_into().map(KeyIdentifier).map_err(|_| KeyIdentifierError)
    }
}

impl FromStr for KeyIdentifier {
    type Err = KeyIdentifierError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.len() != 40 || !value.is_ascii() {
            return Err(KeyIdentifierError)
        }
        let mut res = KeyIdentifier(Default::default());
        for (pos, ch) in value.as_bytes().chunks(2).enumerate() {
            let ch = str::from_utf8(ch).map_err(|_| KeyIdentifierError)?;
            res.0[pos] = u8::from_str_radix(ch, 16)
                            .map_err(|_| KeyIdentifierError)?;
        }
        Ok(res)
    }
}

//--- AsRef

impl AsRef<[u8]> for KeyIdentifier {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

//--- Display and Debug

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        hex::write(self.as_slice(), f)
    }
}

impl fmt::Debug for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyIdentifier({})", self)
    }
}

//--- PrimitiveContent

impl PrimitiveContent for KeyIdentifier {
    const TAG: Tag = Tag::OCTET_STRING;

    fn encoded_len(&self, _mode: Mode) -> usize {
        20
    }

    fn write_encoded<W: io::Write>(
        &self,
        _mode: Mode,
        target: &mut W
    ) -> Result<(), io::Error> {
        target.write_all(&self.0)
    }
}

//--- Deserialize and Serialize

impl serde::Serialize for KeyIdentifier {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for KeyIdentifier {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        KeyIdentifier::from_str(&s).map_err(serde::de::Error::custom)
    }
}


//------------ KeyIdentifierError --------------------------------------------

/// A value cannot be converted into a key identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyIdentifierError;

impl fmt::Display for KeyIdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid key identifier")
    }
}

impl error::Error for KeyIdentifierError { }


//------------ SignatureVerificationError ------------------------------------

/// An error happened while verifying a signature.
///
/// No further information is provided. This is on purpose.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SignatureVerificationError(());

impl fmt::Display for SignatureVerificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("signature verification failed")
    }
}

impl error::Error for SignatureVerificationError { }


//============ Tests =========================================================

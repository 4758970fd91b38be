//! The legacy signed envelope.
//!
//! Before CMS was used, renewal messages were wrapped into a simple signed
//! envelope:
//!
//! ```text
//! SignedMessage ::= SEQUENCE {
//!     headerAndBody   OCTET STRING,   -- DER of HeaderAndBody
//!     signature       OCTET STRING }
//!
//! HeaderAndBody ::= SEQUENCE {
//!     header          Header,
//!     body            OCTET STRING }
//!
//! Header ::= SEQUENCE {
//!     signatureAlgorithm  AlgorithmIdentifier,
//!     verificationKeyId   KeyId,
//!     timestamp           GeneralizedTime }
//!
//! KeyId ::= SEQUENCE {
//!     isdAs           UTF8String,
//!     subjectKeyId    OCTET STRING,
//!     trcBase         INTEGER,
//!     trcSerial       INTEGER }
//! ```
//!
//! The signature is calculated over the content of the `headerAndBody`
//! octet string. The key ID names the AS certificate of the signer and the
//! TRC its chain is verifiable with.

use std::str::FromStr;
use bcder::{decode, encode};
use bcder::{Captured, Mode, OctetString, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::encode::{PrimitiveContent, Values};
use bytes::Bytes;
use crate::crypto::{
    KeyIdentifier, PublicKey, Signature, SignatureAlgorithm,
    SignatureVerificationError, Signer, SigningError,
};
use crate::ia::Ia;
use crate::x509::Time;


//------------ SignedMessage -------------------------------------------------

/// A message in the legacy signed envelope.
#[derive(Clone, Debug)]
pub struct SignedMessage {
    /// The encoded header and body.
    header_and_body: Bytes,

    /// The decoded header.
    header: Header,

    /// The body.
    body: Bytes,

    /// The signature value.
    signature: Bytes,
}

impl SignedMessage {
    /// Creates a message by signing the header and body.
    pub fn sign<S: Signer>(
        header: Header,
        body: Bytes,
        signer: &S,
        key: &S::KeyId,
    ) -> Result<Self, SigningError<S::Error>> {
        let header_and_body = encode::sequence((
            header.encode_ref(),
            OctetString::encode_slice(body.as_ref()),
        )).to_captured(Mode::Der).into_bytes();
        let signature = signer.sign(
            key, header.algorithm, header_and_body.as_ref()
        )?;
        Ok(SignedMessage {
            header_and_body,
            header,
            body,
            signature: signature.unwrap().1,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the body without checking the signature.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Verifies the signature with the given public key.
    pub fn verify(
        &self, public_key: &PublicKey
    ) -> Result<(), SignatureVerificationError> {
        public_key.verify(
            self.header_and_body.as_ref(),
            &Signature::new(self.header.algorithm, self.signature.clone())
        )
    }

    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let (header_and_body, signature) = cons.take_sequence(|cons| {
            Ok((
                OctetString::take_from(cons)?.into_bytes(),
                OctetString::take_from(cons)?.into_bytes(),
            ))
        })?;
        let (header, body) = Mode::Der.decode(
            header_and_body.clone(), |cons| {
                cons.take_sequence(|cons| {
                    Ok((
                        Header::take_from(cons)?,
                        OctetString::take_from(cons)?.into_bytes(),
                    ))
                })
            }
        ).map_err(DecodeError::convert)?;
        Ok(SignedMessage { header_and_body, header, body, signature })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            OctetString::encode_slice(self.header_and_body.as_ref()),
            OctetString::encode_slice(self.signature.as_ref()),
        ))
    }

    pub fn to_captured(&self) -> Captured {
        Captured::from_values(Mode::Der, self.encode_ref())
    }
}

/// Returns the body of an encoded message without checking the signature.
pub fn extract_unverified_body(
    message: &[u8]
) -> Result<Bytes, DecodeError<std::convert::Infallible>> {
    SignedMessage::decode(message).map(|msg| msg.body)
}


//------------ Header --------------------------------------------------------

/// The header of a legacy signed message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub algorithm: SignatureAlgorithm,
    pub key_id: KeyId,
    pub timestamp: Time,
}

impl Header {
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            Ok(Header {
                algorithm: SignatureAlgorithm::x509_take_from(cons)?,
                key_id: KeyId::take_from(cons)?,
                timestamp: Time::take_from(cons)?,
            })
        })
    }

    fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            self.algorithm.x509_encode(),
            self.key_id.encode_ref(),
            self.timestamp.encode_generalized_time(),
        ))
    }
}


//------------ KeyId ---------------------------------------------------------

/// Identifies the key a legacy message was signed with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyId {
    /// The ISD-AS of the signer.
    pub ia: Ia,

    /// The subject key identifier of the signer’s AS certificate.
    pub subject_key_id: KeyIdentifier,

    /// The base number of the TRC the signer’s chain verifies with.
    pub trc_base: u64,

    /// The serial number of the TRC the signer’s chain verifies with.
    pub trc_serial: u64,
}

impl KeyId {
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let ia = cons.take_value_if(Tag::UTF8_STRING, |content| {
                let bytes = OctetString::from_content(content)?.into_bytes();
                std::str::from_utf8(bytes.as_ref()).ok().and_then(|s| {
                    Ia::from_str(s).ok()
                }).ok_or_else(|| content.content_err("invalid ISD-AS"))
            })?;
            Ok(KeyId {
                ia,
                subject_key_id: KeyIdentifier::take_from(cons)?,
                trc_base: cons.take_u64()?,
                trc_serial: cons.take_u64()?,
            })
        })
    }

    fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            Captured::from_values(
                Mode::Der,
                self.ia.to_string().as_bytes().encode_as(Tag::UTF8_STRING)
            ),
            self.subject_key_id.encode_ref(),
            self.trc_base.encode(),
            self.trc_serial.encode(),
        ))
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::softsigner;
    use crate::test::{self, Pki};

    fn header(
        pki: &Pki, now: Time
    ) -> (softsigner::KeyId, Header, PublicKey) {
        let (key, chain) = pki.issue_as(test::as_ia());
        let header = Header {
            algorithm: SignatureAlgorithm::EcdsaWithSha256,
            key_id: KeyId {
                ia: test::as_ia(),
                subject_key_id: chain.as_cert().subject_key_identifier()
                    .unwrap(),
                trc_base: 1,
                trc_serial: 1,
            },
            timestamp: now,
        };
        (key, header, chain.as_cert().subject_public_key_info().clone())
    }

    #[test]
    fn sign_decode_verify() {
        let now = test::now();
        let pki = Pki::new(now);
        let (key, header, public_key) = header(&pki, now);
        let msg = SignedMessage::sign(
            header.clone(), Bytes::from_static(b"body"), &pki.signer, &key
        ).unwrap();
        let encoded = msg.to_captured();
        let decoded = SignedMessage::decode(encoded.as_slice()).unwrap();
        assert_eq!(decoded.header(), &header);
        assert_eq!(decoded.body().as_ref(), b"body");
        decoded.verify(&public_key).unwrap();
        assert_eq!(
            extract_unverified_body(encoded.as_slice()).unwrap().as_ref(),
            b"body"
        );
    }

    #[test]
    fn reject_wrong_key() {
        let now = test::now();
        let pki = Pki::new(now);
        let (key, header, _) = header(&pki, now);
        let msg = SignedMessage::sign(
            header, Bytes::from_static(b"body"), &pki.signer, &key
        ).unwrap();
        assert!(
            msg.verify(pki.ca.subject_public_key_info()).is_err()
        );
    }
}

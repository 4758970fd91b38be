//! CMS signed renewal messages.
//!
//! The current encoding of renewal requests and responses wraps the
//! payload into CMS signed data as defined in RFC 5652. The payload is
//! encapsulated as `id-data` and the signer’s certificate chain is included
//! in the certificates field. There is exactly one signer info which
//! identifies the signer certificate through its issuer and serial number
//! and carries the signed attributes content type, message digest, and
//! signing time.
//!
//! For a request, the payload is the DER encoded certification request. For
//! a response, it is the DER encoding of the AS certificate followed by the
//! DER encoding of the CA certificate.

use bcder::{decode, encode};
use bcder::{Captured, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::encode::{PrimitiveContent, Values};
use bytes::Bytes;
use crate::oid;
use crate::cert::Cert;
use crate::crypto::{
    DigestAlgorithm, Signature, SignatureAlgorithm, Signer, SigningError,
};
use crate::error::VerificationError;
use crate::x509::{Name, Serial, Time};


//------------ SignedMessage -------------------------------------------------

/// A CMS signed-data message.
#[derive(Clone, Debug)]
pub struct SignedMessage {
    //--- From SignedData
    //
    digest_algorithm: DigestAlgorithm,
    content: OctetString,
    certificates: Vec<Cert>,

    //--- From SignerInfo
    //
    sid_issuer: Name,
    sid_serial: Serial,
    signed_attrs: SignedAttrs,
    signature: Signature,

    //--- SignedAttributes
    //
    message_digest: Bytes,
    signing_time: Time,
}

/// # Data Access
///
impl SignedMessage {
    /// Returns the encapsulated content.
    pub fn content(&self) -> Bytes {
        self.content.clone().into_bytes()
    }

    /// Returns the certificates included with the message.
    pub fn certificates(&self) -> &[Cert] {
        &self.certificates
    }

    pub fn signing_time(&self) -> Time {
        self.signing_time
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Returns the certificate identified by the signer info.
    pub fn signer_cert(&self) -> Option<&Cert> {
        self.certificates.iter().find(|cert| {
            cert.issuer() == &self.sid_issuer
                && cert.serial_number() == self.sid_serial
        })
    }
}

/// # Creation
///
impl SignedMessage {
    /// Signs content with the key of the first certificate of `certificates`.
    pub fn sign<S: Signer>(
        content: Bytes,
        certificates: Vec<Cert>,
        signing_time: Time,
        signer: &S,
        key: &S::KeyId,
    ) -> Result<Self, SigningError<S::Error>> {
        let signer_cert = certificates.first().ok_or(
            SigningError::IncompatibleKey
        )?;
        let key_info = signer.get_key_info(key)?;
        if signer_cert.subject_public_key_info() != &key_info {
            return Err(SigningError::IncompatibleKey)
        }
        let algorithm = key_info.algorithm().signature_algorithm();
        let digest_algorithm = algorithm.digest_algorithm();
        let message_digest = Bytes::copy_from_slice(
            digest_algorithm.digest(&content).as_ref()
        );
        let signing_time = signing_time.trunc();
        let signed_attrs = SignedAttrs::new(&message_digest, signing_time);
        let signature = signer.sign(
            key, algorithm, signed_attrs.encode_verify().as_slice()
        )?;
        Ok(SignedMessage {
            digest_algorithm,
            content: OctetString::new(content),
            sid_issuer: signer_cert.issuer().clone(),
            sid_serial: signer_cert.serial_number(),
            certificates,
            signed_attrs,
            signature,
            message_digest,
            signing_time,
        })
    }
}

/// # Decoding, Verification, and Encoding
///
impl SignedMessage {
    /// Decodes a message from the given source.
    pub fn decode<S: IntoSource>(
        source: S,
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    /// Takes a message from an encoded constructed value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| { // ContentInfo
            oid::SIGNED_DATA.skip_if(cons)?; // contentType
            cons.take_constructed_if(Tag::CTX_0, |cons| { // content
                cons.take_sequence(|cons| { // SignedData
                    cons.skip_u8_if(1)?; // version
                    let digest_algorithm =
                        DigestAlgorithm::take_set_from(cons)?;
                    let content = cons.take_sequence(|cons| {
                        oid::DATA.skip_if(cons)?;
                        cons.take_constructed_if(
                            Tag::CTX_0, OctetString::take_from
                        )
                    })?;
                    let certificates = cons.take_constructed_if(
                        Tag::CTX_0, |cons| {
                            let mut res = Vec::new();
                            while let Some(cert) = Cert::take_opt_from(cons)? {
                                res.push(cert)
                            }
                            Ok(res)
                        }
                    )?;
                    // no crls
                    cons.take_set(|cons| { // signerInfos
                        cons.take_sequence(|cons| {
                            cons.skip_u8_if(1)?;
                            let (sid_issuer, sid_serial) = cons.take_sequence(
                                |cons| {
                                    Ok((
                                        Name::take_from(cons)?,
                                        Serial::take_from(cons)?,
                                    ))
                                }
                            )?;
                            let alg = DigestAlgorithm::take_from(cons)?;
                            if alg != digest_algorithm {
                                return Err(cons.content_err(
                                    "digest algorithm mismatch"
                                ))
                            }
                            let (signed_attrs, message_digest, signing_time) =
                                SignedAttrs::take_from(cons)?;
                            let signature = Signature::new(
                                SignatureAlgorithm::cms_take_from(cons)?,
                                OctetString::take_from(cons)?.into_bytes()
                            );
                            // no unsignedAttributes
                            Ok(SignedMessage {
                                digest_algorithm,
                                content,
                                certificates,
                                sid_issuer,
                                sid_serial,
                                signed_attrs,
                                signature,
                                message_digest,
                                signing_time,
                            })
                        })
                    })
                })
            })
        })
    }

    /// Verifies the signature against the signer certificate.
    ///
    /// Only checks that the message was signed with the key of the
    /// included signer certificate. Whether that certificate can be trusted
    /// needs to be checked separately. Returns the signer certificate.
    pub fn verify(&self) -> Result<&Cert, VerificationError> {
        let cert = self.signer_cert().ok_or_else(|| {
            VerificationError::new("signer certificate not included")
        })?;
        let digest = self.digest_algorithm.digest(&self.content.to_bytes());
        if digest.as_ref() != self.message_digest.as_ref() {
            return Err(VerificationError::new(
                "message digest mismatch in signed message"
            ))
        }
        cert.subject_public_key_info().verify(
            self.signed_attrs.encode_verify().as_slice(), &self.signature
        )?;
        Ok(cert)
    }

    /// Returns a value encoder for a reference to the message.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            oid::SIGNED_DATA.encode(), // contentType
            encode::sequence_as(Tag::CTX_0, // content
                encode::sequence((
                    1u8.encode(), // version
                    self.digest_algorithm.encode_set(), // digestAlgorithms
                    encode::sequence(( // encapContentInfo
                        oid::DATA.encode(),
                        encode::sequence_as(Tag::CTX_0,
                            self.content.encode_ref()
                        ),
                    )),
                    encode::sequence_as(Tag::CTX_0, // certificates
                        encode::iter(
                            self.certificates.iter().map(|cert| {
                                cert.encode_ref()
                            })
                        )
                    ),
                    // crl -- omitted
                    encode::set( // signerInfos
                        encode::sequence(( // SignerInfo
                            1u8.encode(), // version
                            encode::sequence(( // issuerAndSerialNumber
                                self.sid_issuer.encode_ref(),
                                self.sid_serial.encode(),
                            )),
                            self.digest_algorithm.encode(),
                            self.signed_attrs.encode_ref(),
                            self.signature.algorithm().cms_encode(),
                            OctetString::encode_slice(
                                self.signature.value().as_ref()
                            ),
                        ))
                    ),
                ))
            ),
        ))
    }

    /// Returns a captured encoding of the message.
    pub fn to_captured(&self) -> Captured {
        Captured::from_values(Mode::Der, self.encode_ref())
    }
}


//------------ SignedAttrs ---------------------------------------------------

/// The raw content of the signed attributes.
///
/// The signature is calculated over the DER encoding of the attributes as
/// a SET OF rather than with the `[0]` tag used in the signer info. The
/// value keeps the content of the set only.
#[derive(Clone, Debug)]
struct SignedAttrs(Captured);

impl SignedAttrs {
    fn new(message_digest: &[u8], signing_time: Time) -> Self {
        // DER orders the values of a SET OF by their encoding.
        let mut attrs = [
            Captured::from_values(Mode::Der, encode::sequence((
                oid::CONTENT_TYPE.encode(),
                encode::set(oid::DATA.encode()),
            ))),
            Captured::from_values(Mode::Der, encode::sequence((
                oid::SIGNING_TIME.encode(),
                encode::set(signing_time.encode_varied()),
            ))),
            Captured::from_values(Mode::Der, encode::sequence((
                oid::MESSAGE_DIGEST.encode(),
                encode::set(OctetString::encode_slice(message_digest)),
            ))),
        ];
        attrs.sort_by(|left, right| left.as_slice().cmp(right.as_slice()));
        let mut res = Captured::builder(Mode::Der);
        for attr in attrs {
            res.extend(attr)
        }
        SignedAttrs(res.freeze())
    }

    /// Takes the signed attributes from the beginning of a constructed value.
    ///
    /// Returns the raw attributes, the message digest, and the signing
    /// time. The content type must be `id-data`. Unknown attributes are
    /// ignored.
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<(Self, Bytes, Time), DecodeError<S::Error>> {
        let mut content_type = None;
        let mut message_digest = None;
        let mut signing_time = None;
        let raw = cons.take_constructed_if(Tag::CTX_0, |cons| {
            cons.capture(|cons| {
                while let Some(()) = cons.take_opt_sequence(|cons| {
                    let id = Oid::take_from(cons)?;
                    if id == oid::CONTENT_TYPE {
                        if content_type.is_some() {
                            return Err(cons.content_err(
                                "duplicate Content Type attribute"
                            ))
                        }
                        content_type = Some(cons.take_set(Oid::take_from)?);
                    }
                    else if id == oid::MESSAGE_DIGEST {
                        if message_digest.is_some() {
                            return Err(cons.content_err(
                                "duplicate Message Digest attribute"
                            ))
                        }
                        message_digest = Some(
                            cons.take_set(OctetString::take_from)?
                        );
                    }
                    else if id == oid::SIGNING_TIME {
                        if signing_time.is_some() {
                            return Err(cons.content_err(
                                "duplicate Signing Time attribute"
                            ))
                        }
                        signing_time = Some(cons.take_set(Time::take_from)?);
                    }
                    else {
                        cons.skip_all()?;
                    }
                    Ok(())
                })? { }
                Ok(())
            })
        })?;
        match content_type {
            Some(content_type) if content_type == oid::DATA => { }
            Some(_) => {
                return Err(cons.content_err(
                    "unexpected content type in signed attributes"
                ))
            }
            None => {
                return Err(cons.content_err(
                    "missing content type in signed attributes"
                ))
            }
        }
        let Some(message_digest) = message_digest else {
            return Err(cons.content_err(
                "missing message digest in signed attributes"
            ))
        };
        let Some(signing_time) = signing_time else {
            return Err(cons.content_err(
                "missing signing time in signed attributes"
            ))
        };
        Ok((SignedAttrs(raw), message_digest.into_bytes(), signing_time))
    }

    fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence_as(Tag::CTX_0, &self.0)
    }

    /// Creates the message the signature is calculated over.
    fn encode_verify(&self) -> Captured {
        encode::set(&self.0).to_captured(Mode::Der)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::{self, Pki};

    #[test]
    fn sign_decode_verify() {
        let now = test::now();
        let pki = Pki::new(now);
        let (key, chain) = pki.issue_as(test::as_ia());
        let msg = SignedMessage::sign(
            Bytes::from_static(b"payload"),
            vec![chain.as_cert().clone(), chain.ca_cert().clone()],
            now, &pki.signer, &key,
        ).unwrap();
        let decoded = SignedMessage::decode(
            msg.to_captured().as_slice()
        ).unwrap();
        assert_eq!(decoded.content().as_ref(), b"payload");
        assert_eq!(decoded.certificates().len(), 2);
        assert_eq!(decoded.signing_time(), now);
        assert_eq!(decoded.verify().unwrap(), chain.as_cert());
        assert_eq!(
            decoded.to_captured().as_slice(), msg.to_captured().as_slice()
        );
    }

    #[test]
    fn reject_tampered_content() {
        let now = test::now();
        let pki = Pki::new(now);
        let (key, chain) = pki.issue_as(test::as_ia());
        let mut msg = SignedMessage::sign(
            Bytes::from_static(b"payload"),
            vec![chain.as_cert().clone()],
            now, &pki.signer, &key,
        ).unwrap();
        msg.content = OctetString::new(Bytes::from_static(b"other"));
        assert!(msg.verify().is_err());
    }

    #[test]
    fn reject_wrong_key() {
        let now = test::now();
        let pki = Pki::new(now);
        let (_, chain) = pki.issue_as(test::as_ia());
        assert!(
            SignedMessage::sign(
                Bytes::from_static(b"payload"),
                vec![chain.as_cert().clone()],
                now, &pki.signer, &pki.ca_key,
            ).is_err()
        );
    }
}

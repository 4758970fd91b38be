//! Certification requests.
//!
//! An AS asks its CA for a new certificate by sending a PKCS#10
//! certification request as defined in RFC 2986. The request carries the
//! desired subject, the public key and, in an extension request attribute,
//! the extensions of an AS certificate:
//!
//! - key usage (critical) with digitalSignature,
//! - extended key usage with serverAuth, clientAuth, and timeStamping,
//! - the subject key identifier.
//!
//! The request is signed with the private key belonging to the public key
//! which proves possession of that key.

use std::fmt;
use bcder::{decode, encode};
use bcder::{Captured, Mode, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::encode::PrimitiveContent;
use crate::oid;
use crate::cert::{CertProfile, Extensions};
use crate::crypto::{
    PublicKey, SignatureVerificationError, Signer, SigningError,
};
use crate::pem;
use crate::x509::{Name, SignedData};


//------------ Csr -----------------------------------------------------------

/// A certification request for an AS certificate.
#[derive(Clone, Debug)]
pub struct Csr {
    /// The outer structure of the request.
    signed_data: SignedData,

    /// The content of the request.
    content: CsrContent,
}

/// # Data Access
///
impl Csr {
    /// The subject the certificate is requested for.
    pub fn subject(&self) -> &Name {
        &self.content.subject
    }

    /// Returns the public key for the requested certificate.
    ///
    /// Call [`verify_signature`][Self::verify_signature] to ensure that the
    /// requester is in possession of the private key.
    pub fn public_key(&self) -> &PublicKey {
        &self.content.public_key
    }

    /// Returns the requested extensions.
    pub fn extensions(&self) -> &Extensions {
        &self.content.extensions
    }
}

/// # Construct
///
impl Csr {
    /// Builds a signed request for an AS certificate.
    pub fn construct<S: Signer>(
        signer: &S,
        key: &S::KeyId,
        subject: Name,
    ) -> Result<Self, SigningError<S::Error>> {
        let public_key = signer.get_key_info(key)?;
        let extensions = CertProfile::As.extensions(&public_key);
        let algorithm = public_key.algorithm().signature_algorithm();
        let content = CsrContent { subject, public_key, extensions };
        let signed_data = SignedData::sign(
            Captured::from_values(Mode::Der, content.encode_ref()),
            algorithm, signer, key,
        )?;
        Ok(Csr { signed_data, content })
    }
}

/// # Decode, Encode, and Verify
///
impl Csr {
    /// Parses a source as a certification request.
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    /// Takes an encoded request from the beginning of a constructed value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let signed_data = SignedData::from_constructed(cons)?;
            let content = signed_data.data().clone().decode(
                CsrContent::take_from
            ).map_err(DecodeError::convert)?;
            Ok(Self { signed_data, content })
        })
    }

    /// Verifies the request against its own public key.
    pub fn verify_signature(&self) -> Result<(), SignatureVerificationError> {
        self.signed_data.verify_signature(self.public_key())
    }

    /// Returns a value encoder for a reference to the request.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        self.signed_data.encode_ref()
    }

    /// Returns a captured encoding of the request.
    pub fn to_captured(&self) -> Captured {
        Captured::from_values(Mode::Der, self.encode_ref())
    }

    /// Returns the request as a PEM `CERTIFICATE REQUEST` block.
    pub fn to_pem(&self) -> String {
        pem::encode(pem::CERTIFICATE_REQUEST, self.to_captured().as_slice())
    }
}

impl PartialEq for Csr {
    fn eq(&self, other: &Self) -> bool {
        self.signed_data == other.signed_data
    }
}

impl Eq for Csr { }

//--- Display

impl fmt::Display for Csr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "certification request for '{}' (key {})",
            self.subject(), self.public_key().key_identifier()
        )
    }
}


//------------ CsrContent ----------------------------------------------------

/// The content of a certification request.
///
/// ```text
/// CertificationRequestInfo ::= SEQUENCE {
///     version       INTEGER { v1(0) },
///     subject       Name,
///     subjectPKInfo SubjectPublicKeyInfo,
///     attributes    [0] IMPLICIT SET OF Attribute }
/// ```
#[derive(Clone, Debug)]
struct CsrContent {
    subject: Name,
    public_key: PublicKey,
    extensions: Extensions,
}

impl CsrContent {
    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            cons.skip_u8_if(0)?; // version MUST be 0, cause v1
            let subject = Name::take_from(cons)?;
            let public_key = PublicKey::take_from(cons)?;
            let mut extensions = None;
            cons.take_constructed_if(Tag::CTX_0, |cons| {
                while let Some(()) = cons.take_opt_sequence(|cons| {
                    let id = Oid::take_from(cons)?;
                    if id == oid::EXTENSION_REQUEST {
                        if extensions.is_some() {
                            return Err(cons.content_err(
                                "duplicate extension request attribute"
                            ))
                        }
                        extensions = Some(
                            cons.take_set(Extensions::take_from)?
                        );
                        Ok(())
                    }
                    else {
                        // Other attributes carry nothing we need.
                        cons.skip_all()
                    }
                })? { }
                Ok(())
            })?;
            let extensions = extensions.ok_or_else(|| {
                cons.content_err("missing extension request attribute")
            })?;
            Ok(CsrContent { subject, public_key, extensions })
        })
    }

    fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            0u8.encode(),
            self.subject.encode_ref(),
            self.public_key.encode_ref(),
            encode::sequence_as(Tag::CTX_0,
                encode::sequence((
                    oid::EXTENSION_REQUEST.encode(),
                    encode::set(self.extensions.encode_ref()),
                ))
            ),
        ))
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::PublicKeyFormat;
    use crate::crypto::softsigner::OpenSslSigner;
    use crate::test;

    #[test]
    fn build_and_decode() {
        let signer = OpenSslSigner::new();
        let key = signer.create_key(PublicKeyFormat::EcdsaP256).unwrap();
        let subject = test::name(test::as_ia(), "1-ff00:0:110 AS");
        let csr = Csr::construct(&signer, &key, subject.clone()).unwrap();

        let decoded = Csr::decode(csr.to_captured().as_slice()).unwrap();
        decoded.verify_signature().unwrap();
        assert_eq!(decoded, csr);
        assert_eq!(decoded.subject(), &subject);
        assert_eq!(
            decoded.public_key(), &signer.get_key_info(&key).unwrap()
        );

        let ext = decoded.extensions();
        assert!(ext.key_usage().unwrap().has_digital_signature());
        assert!(ext.has_key_purpose(&oid::KP_SERVER_AUTH));
        assert!(ext.has_key_purpose(&oid::KP_CLIENT_AUTH));
        assert!(ext.has_key_purpose(&oid::KP_TIME_STAMPING));
        assert_eq!(
            ext.subject_key_id(),
            Some(decoded.public_key().key_identifier())
        );
        assert!(!ext.is_ca());
    }

    #[test]
    fn reject_wrong_key() {
        let signer = OpenSslSigner::new();
        let key = signer.create_key(PublicKeyFormat::EcdsaP256).unwrap();
        let other = signer.create_key(PublicKeyFormat::EcdsaP384).unwrap();
        let csr = Csr::construct(
            &signer, &key, test::name(test::as_ia(), "AS")
        ).unwrap();
        let forged = Csr {
            signed_data: SignedData::sign(
                csr.signed_data.data().clone(),
                crate::crypto::SignatureAlgorithm::EcdsaWithSha384,
                &signer, &other,
            ).unwrap(),
            content: csr.content.clone(),
        };
        assert!(forged.verify_signature().is_err());
    }

    #[test]
    fn pem_label() {
        let signer = OpenSslSigner::new();
        let key = signer.create_key(PublicKeyFormat::EcdsaP256).unwrap();
        let csr = Csr::construct(
            &signer, &key, test::name(test::as_ia(), "AS")
        ).unwrap();
        let blocks = pem::Pem::parse_labeled(
            &csr.to_pem(), pem::CERTIFICATE_REQUEST
        ).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(Csr::decode(blocks[0].clone()).unwrap(), csr);
    }
}

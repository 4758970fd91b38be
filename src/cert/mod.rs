//! Certificates of the control-plane PKI.
//!
//! The control-plane PKI uses X.509 version 3 certificates with a narrow
//! profile. There are five kinds of certificates:
//!
//! * _Root certificates_ are self-signed and included in a TRC. They anchor
//!   trust for an ISD.
//! * _CA certificates_ are issued by a root certificate. They are used by
//!   the certificate authority to issue AS certificates.
//! * _AS certificates_ are issued by a CA certificate and form the identity
//!   of an AS in the control plane.
//! * _Sensitive_ and _regular voting certificates_ are only used for
//!   updating TRCs and appear in the TRC itself.
//!
//! The type [`Cert`] represents a decoded certificate of any of these kinds.
//! Its kind can be determined via [`Cert::cert_type`]. New certificates are
//! created from a [`TbsCert`] built for one of the issuing profiles in
//! [`CertProfile`].

pub use self::ext::{
    BasicConstraints, ExtendedKeyUsage, Extensions, KeyUsage
};

pub mod ext;

use std::{fmt, ops};
use bcder::{decode, encode};
use bcder::{Captured, Mode, Tag};
use bcder::decode::{ContentError, DecodeError, IntoSource, Source};
use bcder::encode::PrimitiveContent;
use crate::oid;
use crate::crypto::{
    KeyIdentifier, PublicKey, SignatureAlgorithm, Signer, SigningError,
};
use crate::error::{InspectionError, VerificationError};
use crate::x509::{Name, Serial, SignedData, Time, Validity};


//------------ Cert ----------------------------------------------------------

/// A certificate of the control-plane PKI.
///
/// A certificate can be decoded from its DER encoding via [`decode`] or
/// taken from inside some other structure via [`take_from`]. The
/// certificate derefs to its [`TbsCert`] for access to its content.
///
/// [`decode`]: Cert::decode
/// [`take_from`]: Cert::take_from
#[derive(Clone, Debug)]
pub struct Cert {
    /// The outer structure of the certificate.
    signed_data: SignedData,

    /// The actual data of the certificate.
    tbs: TbsCert,
}


/// # Decoding and Encoding
///
impl Cert {
    /// Decodes a source as a certificate.
    pub fn decode<S: IntoSource>(
        source: S,
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    /// Takes an encoded certificate from the beginning of a value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    /// Takes an optional certificate from the beginning of a value.
    pub fn take_opt_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(Self::from_constructed)
    }

    /// Parses the content of a Certificate sequence.
    pub fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let signed_data = SignedData::from_constructed(cons)?;
        let tbs = signed_data.data().clone().decode(
            TbsCert::take_from
        ).map_err(DecodeError::convert)?;
        if tbs.signature != *signed_data.signature().algorithm() {
            return Err(cons.content_err(
                "signature algorithm mismatch in certificate"
            ))
        }
        Ok(Self { signed_data, tbs })
    }

    /// Returns a value encoder for a reference to the certificate.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        self.signed_data.encode_ref()
    }

    /// Returns a captured encoding of the certificate.
    pub fn to_captured(&self) -> Captured {
        Captured::from_values(Mode::Der, self.encode_ref())
    }

    /// Returns a reference to the to-be-signed part of the certificate.
    pub fn tbs(&self) -> &TbsCert {
        &self.tbs
    }
}


/// # Inspection and Verification
///
/// Following the convention of the crate, _inspection_ checks that the
/// certificate follows its profile while _verification_ checks it against
/// its issuer or a point in time.
impl Cert {
    /// Classifies the certificate.
    ///
    /// Returns an error if the certificate doesn’t follow the profile of any
    /// of the known certificate types.
    pub fn cert_type(&self) -> Result<CertType, InspectionError> {
        let ext = &self.tbs.extensions;
        if ext.is_ca() {
            let key_usage = ext.key_usage().ok_or_else(|| {
                InspectionError::new("CA certificate without Key Usage")
            })?;
            if !key_usage.has_key_cert_sign() {
                return Err(InspectionError::new(
                    "CA certificate without keyCertSign key usage"
                ))
            }
            if ext.subject_key_id().is_none() {
                return Err(InspectionError::new(
                    "CA certificate without Subject Key Identifier"
                ))
            }
            if ext.has_key_purpose(&oid::KP_ROOT) {
                if !self.is_self_signed() {
                    return Err(InspectionError::new(
                        "root certificate is not self-signed"
                    ))
                }
                return Ok(CertType::Root)
            }
            if ext.authority_key_id().is_none() {
                return Err(InspectionError::new(
                    "CA certificate without Authority Key Identifier"
                ))
            }
            return Ok(CertType::Ca)
        }
        if ext.has_key_purpose(&oid::KP_SENSITIVE_VOTING) {
            return Ok(CertType::SensitiveVoting)
        }
        if ext.has_key_purpose(&oid::KP_REGULAR_VOTING) {
            return Ok(CertType::RegularVoting)
        }
        self.inspect_as_profile()?;
        Ok(CertType::As)
    }

    /// Checks the profile of an AS certificate.
    fn inspect_as_profile(&self) -> Result<(), InspectionError> {
        let ext = &self.tbs.extensions;
        if !ext.key_usage().map(|ku| {
            ku.has_digital_signature()
        }).unwrap_or(false) {
            return Err(InspectionError::new(
                "AS certificate without digitalSignature key usage"
            ))
        }
        for purpose in [
            &oid::KP_SERVER_AUTH, &oid::KP_CLIENT_AUTH, &oid::KP_TIME_STAMPING
        ] {
            if !ext.has_key_purpose(purpose) {
                return Err(InspectionError::new(
                    "AS certificate without required extended key usage"
                ))
            }
        }
        match ext.subject_key_id() {
            Some(id) if id == self.tbs.subject_public_key_info.key_identifier()
            => { }
            Some(_) => {
                return Err(InspectionError::new(
                    "Subject Key Identifier does not match public key"
                ))
            }
            None => {
                return Err(InspectionError::new(
                    "AS certificate without Subject Key Identifier"
                ))
            }
        }
        if ext.authority_key_id().is_none() {
            return Err(InspectionError::new(
                "AS certificate without Authority Key Identifier"
            ))
        }
        Ok(())
    }

    /// Checks that the certificate is of the given type.
    pub fn inspect_type(
        &self, expected: CertType
    ) -> Result<(), InspectionError> {
        let found = self.cert_type()?;
        if found == expected {
            Ok(())
        }
        else {
            Err(InspectionError::new(UnexpectedCertType { expected, found }))
        }
    }

    /// Returns whether the certificate’s issuer is its subject.
    pub fn is_self_signed(&self) -> bool {
        self.tbs.issuer == self.tbs.subject
    }

    /// Verifies the certificate’s signature with the given public key.
    pub fn verify_signature(
        &self, public_key: &PublicKey
    ) -> Result<(), VerificationError> {
        self.signed_data.verify_signature(public_key).map_err(Into::into)
    }

    /// Verifies that the certificate was issued by `issuer`.
    ///
    /// Checks that the issuer name matches the issuer’s subject, that the
    /// authority key identifier matches the issuer’s subject key
    /// identifier, and that the signature was made by the issuer’s key.
    pub fn verify_issued_by(
        &self, issuer: &Cert
    ) -> Result<(), VerificationError> {
        if self.tbs.issuer != issuer.tbs.subject {
            return Err(VerificationError::new(
                "issuer name does not match issuer certificate"
            ))
        }
        match (
            self.tbs.extensions.authority_key_id(),
            issuer.tbs.extensions.subject_key_id()
        ) {
            (Some(aki), Some(ski)) if aki == ski => { }
            _ => {
                return Err(VerificationError::new(
                    "authority key identifier does not match issuer"
                ))
            }
        }
        self.verify_signature(&issuer.tbs.subject_public_key_info)
    }

    /// Verifies that the certificate is valid at the given time.
    pub fn verify_validity(&self, now: Time) -> Result<(), VerificationError> {
        self.tbs.validity.verify_at(now).map_err(Into::into)
    }
}


//--- Deref and AsRef

impl ops::Deref for Cert {
    type Target = TbsCert;

    fn deref(&self) -> &Self::Target {
        &self.tbs
    }
}

impl AsRef<TbsCert> for Cert {
    fn as_ref(&self) -> &TbsCert {
        &self.tbs
    }
}

//--- PartialEq and Eq

impl PartialEq for Cert {
    fn eq(&self, other: &Self) -> bool {
        self.signed_data == other.signed_data
    }
}

impl Eq for Cert { }


//------------ TbsCert -------------------------------------------------------

/// The data of a certificate.
///
/// ```text
/// TBSCertificate  ::=  SEQUENCE  {
///      version         [0]  EXPLICIT Version DEFAULT v1,
///      serialNumber         CertificateSerialNumber,
///      signature            AlgorithmIdentifier,
///      issuer               Name,
///      validity             Validity,
///      subject              Name,
///      subjectPublicKeyInfo SubjectPublicKeyInfo,
///      issuerUniqueID  [1]  IMPLICIT UniqueIdentifier OPTIONAL,
///      subjectUniqueID [2]  IMPLICIT UniqueIdentifier OPTIONAL,
///      extensions      [3]  EXPLICIT Extensions OPTIONAL }
/// ```
#[derive(Clone, Debug)]
pub struct TbsCert {
    /// The serial number.
    serial_number: Serial,

    /// The algorithm used for signing the certificate.
    signature: SignatureAlgorithm,

    /// The name of the issuer.
    issuer: Name,

    /// The validity of the certificate.
    validity: Validity,

    /// The name of the subject of this certificate.
    subject: Name,

    /// Information about the public key of this certificate.
    subject_public_key_info: PublicKey,

    /// The certificate extensions.
    extensions: Extensions,
}


/// # Creation and Conversion
///
impl TbsCert {
    /// Creates a new value for the given profile.
    ///
    /// The extensions are derived from the profile and the public key. The
    /// subject key identifier is always computed from the key. For CA and
    /// AS certificates, the authority key identifier still needs to be
    /// set via [`set_authority_key_identifier`].
    ///
    /// [`set_authority_key_identifier`]:
    ///     TbsCert::set_authority_key_identifier
    pub fn new(
        profile: CertProfile,
        serial_number: Serial,
        issuer: Name,
        validity: Validity,
        subject: Name,
        subject_public_key_info: PublicKey,
    ) -> Self {
        let extensions = profile.extensions(&subject_public_key_info);
        Self {
            serial_number,
            signature: subject_public_key_info.algorithm()
                .signature_algorithm(),
            issuer,
            validity,
            subject,
            subject_public_key_info,
            extensions,
        }
    }

    /// Converts the value into a signed certificate.
    ///
    /// The signature algorithm is chosen to match the signing key.
    pub fn into_cert<S: Signer>(
        mut self,
        signer: &S,
        key: &S::KeyId,
    ) -> Result<Cert, SigningError<S::Error>> {
        self.signature = signer.get_key_info(key)?.algorithm()
            .signature_algorithm();
        let data = Captured::from_values(Mode::Der, self.encode_ref());
        let signature = signer.sign(key, self.signature, &data)?;
        Ok(Cert {
            signed_data: SignedData::new(data, signature),
            tbs: self
        })
    }
}


/// # Data Access
///
impl TbsCert {
    pub fn serial_number(&self) -> Serial {
        self.serial_number
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature
    }

    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    pub fn subject(&self) -> &Name {
        &self.subject
    }

    pub fn subject_public_key_info(&self) -> &PublicKey {
        &self.subject_public_key_info
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn subject_key_identifier(&self) -> Option<KeyIdentifier> {
        self.extensions.subject_key_id()
    }

    pub fn authority_key_identifier(&self) -> Option<KeyIdentifier> {
        self.extensions.authority_key_id()
    }

    pub fn set_authority_key_identifier(
        &mut self, id: Option<KeyIdentifier>
    ) {
        self.extensions.authority_key_id = id
    }
}


/// # Decoding and Encoding
///
impl TbsCert {
    /// Takes the to-be-signed certificate sequence.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            // version [0] EXPLICIT Version DEFAULT v1.
            //  -- we need extensions so this must be v3 which is 2.
            cons.take_constructed_if(Tag::CTX_0, |c| c.skip_u8_if(2))?;

            let serial_number = Serial::take_from(cons)?;
            let signature = SignatureAlgorithm::x509_take_from(cons)?;
            let issuer = Name::take_from(cons)?;
            let validity = Validity::take_from(cons)?;
            let subject = Name::take_from(cons)?;
            let subject_public_key_info = PublicKey::take_from(cons)?;

            // issuerUniqueID and subjectUniqueID are not used.
            let extensions = cons.take_opt_constructed_if(
                Tag::CTX_3, Extensions::take_from
            )?.unwrap_or_default();

            Ok(Self {
                serial_number,
                signature,
                issuer,
                validity,
                subject,
                subject_public_key_info,
                extensions,
            })
        })
    }

    /// Returns an encoder for the value.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            encode::sequence_as(Tag::CTX_0, 2.encode()), // version
            self.serial_number.encode(),
            self.signature.x509_encode(),
            self.issuer.encode_ref(),
            self.validity.encode(),
            self.subject.encode_ref(),
            self.subject_public_key_info.encode_ref(),
            encode::sequence_as(Tag::CTX_3, self.extensions.encode_ref()),
        ))
    }
}


//------------ CertType ------------------------------------------------------

/// The kind of a certificate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CertType {
    Root,
    Ca,
    As,
    SensitiveVoting,
    RegularVoting,
}

impl fmt::Display for CertType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            CertType::Root => "root",
            CertType::Ca => "ca",
            CertType::As => "as",
            CertType::SensitiveVoting => "sensitive-voting",
            CertType::RegularVoting => "regular-voting",
        })
    }
}


//------------ CertProfile ---------------------------------------------------

/// The kinds of certificates that can be created.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CertProfile {
    /// A self-signed root certificate.
    Root,

    /// A CA certificate issued by a root certificate.
    Ca,

    /// An AS certificate issued by a CA certificate.
    As,
}

impl CertProfile {
    /// Returns the extensions of the profile for the given key.
    pub fn extensions(self, key: &PublicKey) -> Extensions {
        let subject_key_id = Some(key.key_identifier());
        match self {
            CertProfile::Root => Extensions {
                basic_constraints: Some(BasicConstraints::new(true, Some(1))),
                key_usage: Some(KeyUsage::cert_sign()),
                extended_key_usage: Some(ExtendedKeyUsage::new([
                    &oid::KP_ROOT, &oid::KP_TIME_STAMPING
                ])),
                subject_key_id,
                authority_key_id: None,
            },
            CertProfile::Ca => Extensions {
                basic_constraints: Some(BasicConstraints::new(true, Some(0))),
                key_usage: Some(KeyUsage::cert_sign()),
                extended_key_usage: None,
                subject_key_id,
                authority_key_id: None,
            },
            CertProfile::As => Extensions {
                basic_constraints: None,
                key_usage: Some(KeyUsage::digital_signature()),
                extended_key_usage: Some(ExtendedKeyUsage::as_cert()),
                subject_key_id,
                authority_key_id: None,
            },
        }
    }
}


//============ Error Types ===================================================

//------------ UnexpectedCertType --------------------------------------------

/// A certificate was of a different type than expected.
#[derive(Clone, Copy, Debug)]
struct UnexpectedCertType {
    expected: CertType,
    found: CertType,
}

impl From<UnexpectedCertType> for ContentError {
    fn from(err: UnexpectedCertType) -> Self {
        ContentError::from_boxed(Box::new(err))
    }
}

impl fmt::Display for UnexpectedCertType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "expected {} certificate, found {} certificate",
            self.expected, self.found
        )
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::softsigner::OpenSslSigner;
    use crate::test::{self, Pki};

    #[test]
    fn classify_profiles() {
        let pki = Pki::new(test::now());
        assert_eq!(pki.root.cert_type().unwrap(), CertType::Root);
        assert_eq!(pki.ca.cert_type().unwrap(), CertType::Ca);
        let (_, chain) = pki.issue_as(test::as_ia());
        assert_eq!(chain.as_cert().cert_type().unwrap(), CertType::As);
        assert!(chain.as_cert().inspect_type(CertType::Ca).is_err());
    }

    #[test]
    fn decode_encode() {
        let pki = Pki::new(test::now());
        let der = pki.ca.to_captured();
        let decoded = Cert::decode(der.as_slice()).unwrap();
        assert_eq!(decoded, pki.ca);
        assert_eq!(decoded.subject(), pki.ca.subject());
        assert_eq!(
            decoded.authority_key_identifier(),
            pki.root.subject_key_identifier()
        );
        assert_eq!(decoded.validity(), pki.ca.validity());
    }

    #[test]
    fn verify_issued_by() {
        let pki = Pki::new(test::now());
        pki.ca.verify_issued_by(&pki.root).unwrap();
        pki.root.verify_issued_by(&pki.root).unwrap();
        assert!(pki.root.verify_issued_by(&pki.ca).is_err());

        // A CA certificate with the right names but signed by another key.
        let signer = OpenSslSigner::new();
        let key = signer.create_key(
            crate::crypto::PublicKeyFormat::EcdsaP256
        ).unwrap();
        let mut tbs = TbsCert::new(
            CertProfile::Ca,
            Serial::from(7u64),
            pki.root.subject().clone(),
            pki.ca.validity(),
            pki.ca.subject().clone(),
            signer.get_key_info(&key).unwrap(),
        );
        tbs.set_authority_key_identifier(pki.root.subject_key_identifier());
        let forged = tbs.into_cert(&signer, &key).unwrap();
        assert!(forged.verify_issued_by(&pki.root).is_err());
    }

    #[test]
    fn as_cert_wrong_key_id() {
        let pki = Pki::new(test::now());
        let (_, chain) = pki.issue_as(test::as_ia());
        let mut tbs = chain.as_cert().tbs().clone();
        tbs.extensions.subject_key_id = Some(KeyIdentifier::from([0; 20]));
        let cert = tbs.into_cert(&pki.signer, &pki.ca_key).unwrap();
        assert!(cert.cert_type().is_err());
    }

    #[test]
    fn verify_validity() {
        let pki = Pki::new(test::now());
        let validity = pki.ca.validity();
        pki.ca.verify_validity(validity.not_before()).unwrap();
        assert!(
            pki.ca.verify_validity(
                validity.not_after() + chrono::TimeDelta::seconds(1)
            ).is_err()
        );
    }
}

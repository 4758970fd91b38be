//! Certificate extensions.
//!
//! Only the extensions used by the control-plane PKI are understood. Any
//! other extension is ignored unless it is marked critical in which case
//! the certificate is rejected.

use std::fmt;
use bcder::{decode, encode};
use bcder::{BitString, ConstOid, Mode, OctetString, Oid, Tag};
use bcder::decode::{ContentError, DecodeError};
use bcder::encode::PrimitiveContent;
use bytes::Bytes;
use crate::oid;
use crate::crypto::KeyIdentifier;
use crate::x509::encode_extension;


//------------ Extensions ----------------------------------------------------

/// The extensions of a certificate.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Extensions {
    /// Basic Constraints.
    pub(super) basic_constraints: Option<BasicConstraints>,

    /// Key Usage.
    pub(super) key_usage: Option<KeyUsage>,

    /// Extended Key Usage.
    pub(super) extended_key_usage: Option<ExtendedKeyUsage>,

    /// Subject Key Identifier.
    pub(super) subject_key_id: Option<KeyIdentifier>,

    /// The key identifier of the Authority Key Identifier extension.
    pub(super) authority_key_id: Option<KeyIdentifier>,
}

impl Extensions {
    /// Takes the extensions from the content of the `[3]` wrapper.
    ///
    /// ```text
    /// Extensions  ::=  SEQUENCE SIZE (1..MAX) OF Extension
    ///
    /// Extension  ::=  SEQUENCE  {
    ///      extnID      OBJECT IDENTIFIER,
    ///      critical    BOOLEAN DEFAULT FALSE,
    ///      extnValue   OCTET STRING  }
    /// ```
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let mut res = Extensions::default();
        cons.take_sequence(|cons| {
            while let Some(()) = cons.take_opt_sequence(|cons| {
                let id = Oid::take_from(cons)?;
                let critical = cons.take_opt_bool()?.unwrap_or(false);
                let value = OctetString::take_from(cons)?;
                Mode::Der.decode(value, |content| {
                    if id == oid::CE_BASIC_CONSTRAINTS {
                        BasicConstraints::take_into(
                            content, &mut res.basic_constraints
                        )
                    } else if id == oid::CE_KEY_USAGE {
                        KeyUsage::take_into(content, &mut res.key_usage)
                    } else if id == oid::CE_EXTENDED_KEY_USAGE {
                        ExtendedKeyUsage::take_into(
                            content, &mut res.extended_key_usage
                        )
                    } else if id == oid::CE_SUBJECT_KEY_IDENTIFIER {
                        take_subject_key_identifier(
                            content, &mut res.subject_key_id
                        )
                    } else if id == oid::CE_AUTHORITY_KEY_IDENTIFIER {
                        take_authority_key_identifier(
                            content, &mut res.authority_key_id
                        )
                    } else if critical {
                        Err(content.content_err(
                            UnexpectedCriticalExtension::new(id)
                        ))
                    } else {
                        // Non-critical extensions we don’t know of can
                        // be ignored.
                        Ok(())
                    }
                }).map_err(DecodeError::convert)?;
                Ok(())
            })? { }
            Ok(())
        })?;
        Ok(res)
    }

    /// Returns an encoder for the extensions.
    ///
    /// The extensions are always written in the same order: basic
    /// constraints, key usage, extended key usage, subject key identifier,
    /// and authority key identifier. Absent extensions are skipped.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            self.basic_constraints.as_ref().map(|bc| {
                encode_extension(&oid::CE_BASIC_CONSTRAINTS, true, bc.encode())
            }),
            self.key_usage.map(|ku| {
                encode_extension(&oid::CE_KEY_USAGE, true, ku.encode())
            }),
            self.extended_key_usage.as_ref().map(|eku| {
                encode_extension(
                    &oid::CE_EXTENDED_KEY_USAGE, false, eku.encode_ref()
                )
            }),
            self.subject_key_id.as_ref().map(|id| {
                encode_extension(
                    &oid::CE_SUBJECT_KEY_IDENTIFIER, false, id.encode_ref()
                )
            }),
            self.authority_key_id.as_ref().map(|id| {
                encode_extension(
                    &oid::CE_AUTHORITY_KEY_IDENTIFIER, false,
                    encode::sequence(id.encode_ref_as(Tag::CTX_0))
                )
            }),
        ))
    }

    pub fn basic_constraints(&self) -> Option<BasicConstraints> {
        self.basic_constraints
    }

    /// Returns whether the basic constraints mark a CA certificate.
    pub fn is_ca(&self) -> bool {
        self.basic_constraints.map(|bc| bc.ca).unwrap_or(false)
    }

    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.key_usage
    }

    pub fn extended_key_usage(&self) -> Option<&ExtendedKeyUsage> {
        self.extended_key_usage.as_ref()
    }

    /// Returns whether the extended key usage contains the given purpose.
    pub fn has_key_purpose(&self, purpose: &ConstOid) -> bool {
        self.extended_key_usage.as_ref().map(|eku| {
            eku.contains(purpose)
        }).unwrap_or(false)
    }

    pub fn subject_key_id(&self) -> Option<KeyIdentifier> {
        self.subject_key_id
    }

    pub fn authority_key_id(&self) -> Option<KeyIdentifier> {
        self.authority_key_id
    }
}

/// Parses the Subject Key Identifier extension.
///
/// ```text
/// SubjectKeyIdentifier ::= KeyIdentifier
/// ```
fn take_subject_key_identifier<S: decode::Source>(
    cons: &mut decode::Constructed<S>,
    subject_key_id: &mut Option<KeyIdentifier>,
) -> Result<(), DecodeError<S::Error>> {
    if subject_key_id.is_some() {
        return Err(cons.content_err(
            "duplicate Subject Key Identifier extension"
        ))
    }
    *subject_key_id = Some(KeyIdentifier::take_from(cons)?);
    Ok(())
}

/// Parses the Authority Key Identifier extension.
///
/// ```text
/// AuthorityKeyIdentifier ::= SEQUENCE {
///   keyIdentifier             [0] KeyIdentifier           OPTIONAL,
///   authorityCertIssuer       [1] GeneralNames            OPTIONAL,
///   authorityCertSerialNumber [2] CertificateSerialNumber OPTIONAL  }
/// ```
///
/// Only the keyIdentifier field is supported and it must be present.
fn take_authority_key_identifier<S: decode::Source>(
    cons: &mut decode::Constructed<S>,
    authority_key_id: &mut Option<KeyIdentifier>,
) -> Result<(), DecodeError<S::Error>> {
    if authority_key_id.is_some() {
        return Err(cons.content_err(
            "duplicate Authority Key Identifier extension"
        ))
    }
    *authority_key_id = Some(cons.take_sequence(|cons| {
        cons.take_value_if(Tag::CTX_0, KeyIdentifier::from_content)
    })?);
    Ok(())
}


//------------ BasicConstraints ----------------------------------------------

/// The Basic Constraints extension.
///
/// ```text
/// BasicConstraints        ::= SEQUENCE {
///     cA                      BOOLEAN DEFAULT FALSE,
///     pathLenConstraint       INTEGER (0..MAX) OPTIONAL
/// }
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BasicConstraints {
    ca: bool,
    path_len: Option<u64>,
}

impl BasicConstraints {
    pub fn new(ca: bool, path_len: Option<u64>) -> Self {
        BasicConstraints { ca, path_len }
    }

    pub fn ca(self) -> bool {
        self.ca
    }

    pub fn path_len(self) -> Option<u64> {
        self.path_len
    }

    fn take_into<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        basic_constraints: &mut Option<Self>,
    ) -> Result<(), DecodeError<S::Error>> {
        if basic_constraints.is_some() {
            return Err(cons.content_err(
                "duplicate Basic Constraints extension"
            ))
        }
        *basic_constraints = Some(cons.take_sequence(|cons| {
            let ca = cons.take_opt_bool()?.unwrap_or(false);
            let path_len = cons.take_opt_u64()?;
            if path_len.is_some() && !ca {
                return Err(cons.content_err(
                    "pathLenConstraint in non-CA Basic Constraints"
                ))
            }
            Ok(BasicConstraints { ca, path_len })
        })?);
        Ok(())
    }

    fn encode(self) -> impl encode::Values {
        encode::sequence((
            if self.ca { Some(true.encode()) } else { None },
            self.path_len.map(|len| len.encode()),
        ))
    }
}


//------------ KeyUsage ------------------------------------------------------

/// The key usage bits relevant to the control-plane PKI.
///
/// ```text
/// KeyUsage ::= BIT STRING {
///      digitalSignature        (0),
///      nonRepudiation          (1),
///      keyEncipherment         (2),
///      dataEncipherment        (3),
///      keyAgreement            (4),
///      keyCertSign             (5),
///      cRLSign                 (6),
///      encipherOnly            (7),
///      decipherOnly            (8) }
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KeyUsage {
    digital_signature: bool,
    key_cert_sign: bool,
    crl_sign: bool,
}

impl KeyUsage {
    /// The key usage of AS and voting certificates.
    pub fn digital_signature() -> Self {
        KeyUsage { digital_signature: true, ..Default::default() }
    }

    /// The key usage of root and CA certificates.
    pub fn cert_sign() -> Self {
        KeyUsage {
            key_cert_sign: true, crl_sign: true, ..Default::default()
        }
    }

    pub fn has_digital_signature(self) -> bool {
        self.digital_signature
    }

    pub fn has_key_cert_sign(self) -> bool {
        self.key_cert_sign
    }

    fn take_into<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        key_usage: &mut Option<Self>,
    ) -> Result<(), DecodeError<S::Error>> {
        if key_usage.is_some() {
            return Err(cons.content_err("duplicate Key Usage extension"))
        }
        let bits = BitString::take_from(cons)?;
        *key_usage = Some(KeyUsage {
            digital_signature: bits.bit(0),
            key_cert_sign: bits.bit(5),
            crl_sign: bits.bit(6),
        });
        Ok(())
    }

    /// Returns the single content octet of the DER bit string.
    fn octet(self) -> u8 {
        let mut res = 0;
        if self.digital_signature {
            res |= 0x80;
        }
        if self.key_cert_sign {
            res |= 0x04;
        }
        if self.crl_sign {
            res |= 0x02;
        }
        res
    }

    /// Returns a value encoder for the key usage.
    ///
    /// DER requires trailing zero bits to be removed.
    pub fn encode(self) -> impl encode::Values {
        let octet = self.octet();
        if octet == 0 {
            BitString::new(0, Bytes::new()).encode()
        }
        else {
            BitString::new(
                octet.trailing_zeros() as u8,
                Bytes::copy_from_slice(&[octet])
            ).encode()
        }
    }
}


//------------ ExtendedKeyUsage ----------------------------------------------

/// The key purposes of a certificate.
///
/// ```text
/// ExtKeyUsageSyntax ::= SEQUENCE SIZE (1..MAX) OF KeyPurposeId
/// KeyPurposeId ::= OBJECT IDENTIFIER
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExtendedKeyUsage {
    purposes: Vec<Oid<Bytes>>,
}

impl ExtendedKeyUsage {
    /// Creates the extension from a list of key purposes.
    pub fn new<'a>(purposes: impl IntoIterator<Item = &'a ConstOid>) -> Self {
        ExtendedKeyUsage {
            purposes: purposes.into_iter().map(|id| {
                Oid(Bytes::from_static(id.0))
            }).collect()
        }
    }

    /// The key purposes of an AS certificate.
    pub fn as_cert() -> Self {
        Self::new([
            &oid::KP_SERVER_AUTH, &oid::KP_CLIENT_AUTH,
            &oid::KP_TIME_STAMPING,
        ])
    }

    pub fn contains(&self, purpose: &ConstOid) -> bool {
        self.purposes.iter().any(|id| id == purpose)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Oid<Bytes>> + '_ {
        self.purposes.iter()
    }

    fn take_into<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        extended_key_usage: &mut Option<Self>
    ) -> Result<(), DecodeError<S::Error>> {
        if extended_key_usage.is_some() {
            return Err(cons.content_err(
                "duplicate Extended Key Usage extension"
            ))
        }
        let purposes = cons.take_sequence(|cons| {
            let mut res = Vec::new();
            while let Some(id) = Oid::take_opt_from(cons)? {
                res.push(id);
            }
            if res.is_empty() {
                return Err(cons.content_err(
                    "empty Extended Key Usage extension"
                ))
            }
            Ok(res)
        })?;
        *extended_key_usage = Some(ExtendedKeyUsage { purposes });
        Ok(())
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence(
            encode::iter(self.purposes.iter().map(|id| id.encode_ref()))
        )
    }
}


//============ Error Types ===================================================

//------------ UnexpectedCriticalExtension -----------------------------------

/// An unknown extension was marked critical.
#[derive(Clone, Debug)]
struct UnexpectedCriticalExtension {
    oid: Oid<Bytes>,
}

impl UnexpectedCriticalExtension {
    fn new(oid: Oid<Bytes>) -> Self {
       UnexpectedCriticalExtension { oid }
    }
}

impl From<UnexpectedCriticalExtension> for ContentError {
    fn from(err: UnexpectedCriticalExtension) -> Self {
        ContentError::from_boxed(Box::new(err))
    }
}

impl fmt::Display for UnexpectedCriticalExtension {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unexpected critical extension {}", self.oid)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use bcder::Captured;
    use bcder::encode::Values;

    fn round_trip(ext: &Extensions) -> Extensions {
        let captured = Captured::from_values(Mode::Der, ext.encode_ref());
        Mode::Der.decode(captured.as_slice(), Extensions::take_from).unwrap()
    }

    #[test]
    fn key_usage_octets() {
        let der = KeyUsage::digital_signature().encode().to_captured(
            Mode::Der
        );
        assert_eq!(der.as_slice(), b"\x03\x02\x07\x80");
        let der = KeyUsage::cert_sign().encode().to_captured(Mode::Der);
        assert_eq!(der.as_slice(), b"\x03\x02\x01\x06");
    }

    #[test]
    fn as_extensions() {
        let ext = Extensions {
            key_usage: Some(KeyUsage::digital_signature()),
            extended_key_usage: Some(ExtendedKeyUsage::as_cert()),
            subject_key_id: Some(KeyIdentifier::from([1; 20])),
            authority_key_id: Some(KeyIdentifier::from([2; 20])),
            .. Default::default()
        };
        let decoded = round_trip(&ext);
        assert_eq!(decoded, ext);
        assert!(!decoded.is_ca());
        assert!(decoded.has_key_purpose(&oid::KP_TIME_STAMPING));
        assert!(!decoded.has_key_purpose(&oid::KP_ROOT));
    }

    #[test]
    fn ca_extensions() {
        let ext = Extensions {
            basic_constraints: Some(BasicConstraints::new(true, Some(0))),
            key_usage: Some(KeyUsage::cert_sign()),
            subject_key_id: Some(KeyIdentifier::from([3; 20])),
            .. Default::default()
        };
        let decoded = round_trip(&ext);
        assert!(decoded.is_ca());
        assert_eq!(
            decoded.basic_constraints().and_then(|bc| bc.path_len()),
            Some(0)
        );
        assert!(decoded.key_usage().unwrap().has_key_cert_sign());
    }

    #[test]
    fn reject_unknown_critical() {
        let captured = Captured::from_values(Mode::Der, encode::sequence(
            encode_extension(&oid::AT_COMMON_NAME, true, true.encode())
        ));
        assert!(
            Mode::Der.decode(
                captured.as_slice(), Extensions::take_from
            ).is_err()
        );
        let captured = Captured::from_values(Mode::Der, encode::sequence(
            encode_extension(&oid::AT_COMMON_NAME, false, true.encode())
        ));
        assert!(
            Mode::Der.decode(
                captured.as_slice(), Extensions::take_from
            ).is_ok()
        );
    }
}

//! Certificate chains.
//!
//! An AS proves its identity in the control plane through a chain of two
//! certificates: its own AS certificate and the CA certificate that issued
//! it. The CA certificate in turn is issued by one of the root certificates
//! contained in a TRC of the ISD.
//!
//! A [`Chain`] can only be created from certificates that form a
//! structurally valid chain. Whether the chain is trusted is determined by
//! verifying it against one or more TRCs via [`Chain::verify`].

use std::{error, fmt};
use std::convert::Infallible;
use bcder::{encode, Mode};
use bcder::decode::DecodeError;
use bytes::{Bytes, BytesMut};
use log::debug;
use crate::cert::{Cert, CertType};
use crate::error::{InspectionError, VerificationError};
use crate::ia::Ia;
use crate::pem::{self, Pem, PemError};
use crate::trc::{Trc, TrcId};
use crate::x509::Time;


//------------ Chain ---------------------------------------------------------

/// An AS certificate together with its issuing CA certificate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chain {
    as_cert: Cert,
    ca_cert: Cert,

    /// The ISD-AS of the subject of the AS certificate.
    as_ia: Ia,

    /// The ISD-AS of the subject of the CA certificate.
    ca_ia: Ia,
}

impl Chain {
    /// Creates a chain from an AS certificate and its CA certificate.
    ///
    /// Checks that the certificates follow their profiles and that they
    /// form a chain: the AS certificate’s issuer must be the CA
    /// certificate’s subject, its authority key identifier must be the CA
    /// certificate’s subject key identifier, and its validity must be
    /// covered by that of the CA certificate. Both certificates must carry
    /// an ISD-AS in their names and belong to the same ISD.
    ///
    /// Signatures are not checked.
    pub fn new(as_cert: Cert, ca_cert: Cert) -> Result<Self, InspectionError> {
        as_cert.inspect_type(CertType::As)?;
        ca_cert.inspect_type(CertType::Ca)?;

        let as_ia = as_cert.subject().ia().map_err(InspectionError::new)?;
        let ca_ia = ca_cert.subject().ia().map_err(InspectionError::new)?;
        let issuer_ia = as_cert.issuer().ia().map_err(InspectionError::new)?;
        if as_cert.issuer() != ca_cert.subject() || issuer_ia != ca_ia {
            return Err(InspectionError::new(
                "AS certificate issuer does not match CA certificate subject"
            ))
        }
        if as_ia.isd() != ca_ia.isd() {
            return Err(InspectionError::new(
                "AS and CA certificates are for different ISDs"
            ))
        }
        if as_cert.authority_key_identifier()
            != ca_cert.subject_key_identifier()
        {
            return Err(InspectionError::new(
                "AS certificate authority key identifier does not match \
                 CA certificate"
            ))
        }
        if !ca_cert.validity().covers(as_cert.validity()) {
            return Err(InspectionError::new(
                "AS certificate validity not covered by CA certificate"
            ))
        }
        Ok(Chain { as_cert, ca_cert, as_ia, ca_ia })
    }

    /// Creates a chain from a list of certificates.
    ///
    /// There must be exactly two certificates, the AS certificate first.
    pub fn from_certs(
        certs: impl IntoIterator<Item = Cert>
    ) -> Result<Self, ParseChainError> {
        let mut certs = certs.into_iter();
        match (certs.next(), certs.next(), certs.next()) {
            (Some(as_cert), Some(ca_cert), None) => {
                Chain::new(as_cert, ca_cert).map_err(Into::into)
            }
            (None, _, _) => Err(ParseChainError::CertCount(0)),
            (Some(_), None, _) => Err(ParseChainError::CertCount(1)),
            (Some(_), Some(_), Some(_)) => {
                Err(ParseChainError::CertCount(3 + certs.count()))
            }
        }
    }

    pub fn as_cert(&self) -> &Cert {
        &self.as_cert
    }

    pub fn ca_cert(&self) -> &Cert {
        &self.ca_cert
    }

    /// Returns the ISD-AS of the AS the chain was issued to.
    pub fn as_ia(&self) -> Ia {
        self.as_ia
    }

    /// Returns the ISD-AS of the CA that issued the AS certificate.
    pub fn ca_ia(&self) -> Ia {
        self.ca_ia
    }

    pub fn certs(&self) -> [&Cert; 2] {
        [&self.as_cert, &self.ca_cert]
    }
}


/// # Verification
///
impl Chain {
    /// Verifies that the CA certificate issued the AS certificate.
    ///
    /// Checks the AS certificate’s signature and that both certificates are
    /// valid at the given time.
    pub fn verify_issued(&self, now: Time) -> Result<(), VerificationError> {
        self.as_cert.verify_validity(now)?;
        self.ca_cert.verify_validity(now)?;
        self.as_cert.verify_issued_by(&self.ca_cert)
    }

    /// Verifies the chain against a set of TRCs.
    ///
    /// The chain is trusted if it verifies against at least one of the
    /// TRCs. On success, returns the ISD-AS of the AS the chain was issued
    /// to. Otherwise the error contains the reason for each TRC.
    pub fn verify(&self, trcs: &[Trc], now: Time) -> Result<Ia, VerifyError> {
        let mut errors = Vec::new();
        for trc in trcs {
            match self.verify_with_trc(trc, now) {
                Ok(()) => return Ok(self.as_ia),
                Err(err) => {
                    debug!(
                        "Chain for {} does not verify against TRC {}: {}",
                        self.as_ia, trc.id(), err
                    );
                    errors.push(TrcVerifyError { trc: trc.id(), error: err })
                }
            }
        }
        Err(VerifyError { errors })
    }

    fn verify_with_trc(
        &self, trc: &Trc, now: Time
    ) -> Result<(), VerificationError> {
        if trc.id().isd() != self.as_ia.isd() {
            return Err(VerificationError::new(
                "TRC is for a different ISD"
            ))
        }
        self.verify_issued(now)?;
        let mut expired = None;
        for root in trc.root_certs() {
            if self.ca_cert.verify_issued_by(root).is_err() {
                continue
            }
            match root.verify_validity(now) {
                Ok(()) => return Ok(()),
                Err(err) => expired = Some(err),
            }
        }
        Err(expired.unwrap_or_else(|| VerificationError::new(
            "CA certificate not issued by a root certificate of the TRC"
        )))
    }
}


/// # Decoding and Encoding
///
impl Chain {
    /// Decodes a chain from concatenated DER encoded certificates.
    pub fn from_der(der: &[u8]) -> Result<Self, ParseChainError> {
        let certs = Mode::Der.decode(der, |cons| {
            let mut res = Vec::new();
            while let Some(cert) = Cert::take_opt_from(cons)? {
                res.push(cert)
            }
            Ok(res)
        })?;
        Self::from_certs(certs)
    }

    /// Decodes a chain from a sequence of PEM `CERTIFICATE` blocks.
    pub fn from_pem(pem: &str) -> Result<Self, ParseChainError> {
        let blocks = Pem::parse_labeled(pem, pem::CERTIFICATE)?;
        let certs = blocks.into_iter().map(|block| {
            Cert::decode(block.as_ref())
        }).collect::<Result<Vec<_>, _>>()?;
        Self::from_certs(certs)
    }

    /// Returns the concatenated DER encoding of both certificates.
    pub fn to_der(&self) -> Bytes {
        let mut res = BytesMut::new();
        for cert in self.certs() {
            res.extend_from_slice(cert.to_captured().as_slice());
        }
        res.freeze()
    }

    /// Returns the PEM encoding of the chain, AS certificate first.
    pub fn to_pem(&self) -> String {
        let mut res = String::new();
        for cert in self.certs() {
            res.push_str(
                &pem::encode(pem::CERTIFICATE, cert.to_captured().as_slice())
            );
        }
        res
    }

    /// Returns an encoder for both certificates in a sequence.
    ///
    /// ```text
    /// CertificateChain ::= SEQUENCE {
    ///     asCert  Certificate,
    ///     caCert  Certificate }
    /// ```
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            self.as_cert.encode_ref(),
            self.ca_cert.encode_ref(),
        ))
    }
}


//------------ ParseChainError -----------------------------------------------

/// A chain could not be parsed.
#[derive(Debug)]
pub enum ParseChainError {
    /// The PEM encoding was malformed.
    Pem(PemError),

    /// A certificate could not be decoded.
    Decode(DecodeError<Infallible>),

    /// The number of certificates was not two.
    CertCount(usize),

    /// The certificates don’t form a valid chain.
    Invalid(InspectionError),
}

impl From<PemError> for ParseChainError {
    fn from(err: PemError) -> Self {
        ParseChainError::Pem(err)
    }
}

impl From<DecodeError<Infallible>> for ParseChainError {
    fn from(err: DecodeError<Infallible>) -> Self {
        ParseChainError::Decode(err)
    }
}

impl From<InspectionError> for ParseChainError {
    fn from(err: InspectionError) -> Self {
        ParseChainError::Invalid(err)
    }
}

impl fmt::Display for ParseChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ParseChainError::Pem(ref err) => err.fmt(f),
            ParseChainError::Decode(ref err) => {
                write!(f, "invalid certificate: {}", err)
            }
            ParseChainError::CertCount(count) => {
                write!(f, "expected 2 certificates in chain, found {}", count)
            }
            ParseChainError::Invalid(ref err) => {
                write!(f, "invalid chain: {}", err)
            }
        }
    }
}

impl error::Error for ParseChainError { }


//------------ VerifyError ---------------------------------------------------

/// A chain did not verify against any of the given TRCs.
#[derive(Debug)]
pub struct VerifyError {
    errors: Vec<TrcVerifyError>,
}

impl VerifyError {
    /// Returns the verification error for each attempted TRC.
    pub fn errors(&self) -> &[TrcVerifyError] {
        &self.errors
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("no TRC to verify against")
        }
        let mut first = true;
        for err in &self.errors {
            if first {
                first = false
            }
            else {
                f.write_str("; ")?;
            }
            err.fmt(f)?;
        }
        Ok(())
    }
}

impl error::Error for VerifyError { }


//------------ TrcVerifyError ------------------------------------------------

/// A chain did not verify against a specific TRC.
#[derive(Debug)]
pub struct TrcVerifyError {
    trc: TrcId,
    error: VerificationError,
}

impl TrcVerifyError {
    pub fn trc(&self) -> TrcId {
        self.trc
    }

    pub fn error(&self) -> &VerificationError {
        &self.error
    }
}

impl fmt::Display for TrcVerifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TRC {}: {}", self.trc, self.error)
    }
}

impl error::Error for TrcVerifyError { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeDelta;
    use crate::test::{self, Pki};

    #[test]
    fn verify_against_trc() {
        let now = test::now();
        let pki = Pki::new(now);
        let (_, chain) = pki.issue_as(test::as_ia());
        assert_eq!(
            chain.verify(&[pki.trc.clone()], now).unwrap(),
            test::as_ia()
        );
        assert_eq!(chain.ca_ia(), test::ca_ia());
    }

    #[test]
    fn verify_collects_errors() {
        let now = test::now();
        let pki = Pki::new(now);
        let other = Pki::new(now);
        let (_, chain) = pki.issue_as(test::as_ia());

        let err = chain.verify(&[other.trc.clone()], now).unwrap_err();
        assert_eq!(err.errors().len(), 1);
        assert_eq!(err.errors()[0].trc(), other.trc.id());

        // The second TRC contains the right root.
        let renamed = Trc::new(
            TrcId::new(other.trc.id().isd(), 1, 2),
            other.trc.validity(),
            other.trc.certificates().to_vec(),
        );
        assert!(
            chain.verify(&[renamed.clone(), pki.trc.clone()], now).is_ok()
        );
        let err = chain.verify(
            &[renamed, other.trc.clone()], now
        ).unwrap_err();
        assert_eq!(err.errors().len(), 2);

        assert!(chain.verify(&[], now).is_err());
    }

    #[test]
    fn skip_expired_root() {
        use crate::cert::{CertProfile, TbsCert};
        use crate::crypto::Signer;
        use crate::x509::{Serial, Validity};

        let now = test::now();
        let pki = Pki::new(now);
        let (_, chain) = pki.issue_as(test::as_ia());
        let expired = TbsCert::new(
            CertProfile::Root,
            Serial::random(&pki.signer).unwrap(),
            pki.root.subject().clone(),
            Validity::new(now - TimeDelta::days(10), now - TimeDelta::days(1)),
            pki.root.subject().clone(),
            pki.signer.get_key_info(&pki.root_key).unwrap(),
        ).into_cert(&pki.signer, &pki.root_key).unwrap();

        let trc = |roots: Vec<Cert>| Trc::new(
            pki.trc.id(), pki.trc.validity(), roots
        );
        assert_eq!(
            chain.verify(
                &[trc(vec![expired.clone(), pki.root.clone()])], now
            ).unwrap(),
            test::as_ia()
        );
        let err = chain.verify(&[trc(vec![expired])], now).unwrap_err();
        assert_eq!(err.errors().len(), 1);
    }

    #[test]
    fn verify_expired() {
        let now = test::now();
        let pki = Pki::new(now);
        let (_, chain) = pki.issue_as(test::as_ia());
        let later = chain.as_cert().validity().not_after()
            + TimeDelta::seconds(1);
        assert!(chain.verify_issued(later).is_err());
        assert!(chain.verify(&[pki.trc.clone()], later).is_err());
    }

    #[test]
    fn reject_wrong_order() {
        let pki = Pki::new(test::now());
        let (_, chain) = pki.issue_as(test::as_ia());
        assert!(
            Chain::new(chain.ca_cert().clone(), chain.as_cert().clone())
                .is_err()
        );
        assert!(
            Chain::new(chain.as_cert().clone(), pki.root.clone()).is_err()
        );
    }

    #[test]
    fn pem_and_der() {
        let pki = Pki::new(test::now());
        let (_, chain) = pki.issue_as(test::as_ia());
        assert_eq!(Chain::from_pem(&chain.to_pem()).unwrap(), chain);
        assert_eq!(Chain::from_der(&chain.to_der()).unwrap(), chain);
        assert!(matches!(
            Chain::from_pem(&pem::encode(
                pem::CERTIFICATE, chain.ca_cert().to_captured().as_slice()
            )),
            Err(ParseChainError::CertCount(1))
        ));
    }
}

//! Issuing AS certificates.
//!
//! A CA issues new AS certificates for certification requests according to
//! a [`CaPolicy`]. The policy binds the CA certificate, its signing key,
//! and the validity period of issued certificates.

use std::{error, fmt};
use chrono::TimeDelta;
use log::{debug, info};
use crate::cert::{Cert, CertProfile, TbsCert};
use crate::chain::Chain;
use crate::crypto::{Signer, SigningError};
use crate::csr::Csr;
use crate::error::VerificationError;
use crate::x509::{Serial, Time, Validity};


//------------ CaPolicy ------------------------------------------------------

/// The policy for issuing AS certificates.
pub struct CaPolicy<S: Signer> {
    /// The validity period of issued certificates.
    pub validity: TimeDelta,

    /// The CA certificate.
    pub certificate: Cert,

    /// The signer holding the key of the CA certificate.
    pub signer: S,

    /// The key of the CA certificate.
    pub key: S::KeyId,

    /// The time to use instead of the current time.
    pub current_time: Option<Time>,
}

impl<S: Signer> CaPolicy<S> {
    pub fn new(
        validity: TimeDelta, certificate: Cert, signer: S, key: S::KeyId
    ) -> Self {
        CaPolicy { validity, certificate, signer, key, current_time: None }
    }

    /// Returns the time issued certificates start to be valid.
    pub fn now(&self) -> Time {
        self.current_time.unwrap_or_else(Time::now).trunc()
    }

    /// Issues a new chain for a certification request.
    ///
    /// The issued certificate is valid from now for the policy’s validity
    /// period which needs to be covered by the validity of the CA
    /// certificate. The certificate gets a random serial number, the
    /// subject and public key of the request, and the extensions of an AS
    /// certificate. Before it is returned, the chain is checked.
    pub fn create_chain(
        &self, csr: &Csr
    ) -> Result<Chain, IssuanceError<S::Error>> {
        csr.verify_signature().map_err(|err| {
            IssuanceError::InvalidCsr(err.into())
        })?;
        let ia = csr.subject().ia().map_err(|err| {
            IssuanceError::InvalidCsr(VerificationError::new(err))
        })?;
        if ia.is_zero() {
            return Err(IssuanceError::InvalidCsr(
                VerificationError::new("zero ISD-AS in subject")
            ))
        }

        let now = self.now();
        let validity = match Validity::from_duration(now, self.validity) {
            Some(validity) if self.certificate.validity().covers(validity) => {
                validity
            }
            _ => {
                return Err(IssuanceError::ValidityNotCovered {
                    ca: self.certificate.validity(),
                    not_before: now,
                    duration: self.validity,
                })
            }
        };

        let serial = Serial::random(&self.signer).map_err(|err| {
            IssuanceError::Signing(SigningError::Signer(err))
        })?;
        let mut tbs = TbsCert::new(
            CertProfile::As,
            serial,
            self.certificate.subject().clone(),
            validity,
            csr.subject().clone(),
            csr.public_key().clone(),
        );
        tbs.set_authority_key_identifier(
            self.certificate.subject_key_identifier()
        );
        let cert = tbs.into_cert(&self.signer, &self.key)?;
        debug!("Issued certificate {} for {}", serial, ia);

        let chain = Chain::new(cert, self.certificate.clone()).map_err(|err| {
            IssuanceError::SelfCheckFailed(err.into())
        })?;
        chain.verify_issued(now).map_err(IssuanceError::SelfCheckFailed)?;
        info!(
            "Issued chain for {} with serial {}, valid {}",
            ia, serial, validity
        );
        Ok(chain)
    }
}


//------------ IssuanceError -------------------------------------------------

/// A chain could not be issued.
#[derive(Debug)]
pub enum IssuanceError<E> {
    /// The CA certificate does not cover the validity of the new certificate.
    ValidityNotCovered {
        ca: Validity,
        not_before: Time,
        duration: TimeDelta,
    },

    /// The certification request is invalid.
    InvalidCsr(VerificationError),

    /// Signing the certificate failed.
    Signing(SigningError<E>),

    /// The issued chain did not pass the check.
    SelfCheckFailed(VerificationError),
}

impl<E> From<SigningError<E>> for IssuanceError<E> {
    fn from(err: SigningError<E>) -> Self {
        IssuanceError::Signing(err)
    }
}

impl<E: fmt::Display> fmt::Display for IssuanceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            IssuanceError::ValidityNotCovered { ca, not_before, duration } => {
                write!(
                    f,
                    "CA certificate validity {} does not cover {}s from {}",
                    ca, duration.num_seconds(), not_before
                )
            }
            IssuanceError::InvalidCsr(ref err) => {
                write!(f, "invalid certification request: {}", err)
            }
            IssuanceError::Signing(ref err) => {
                write!(f, "signing certificate failed: {}", err)
            }
            IssuanceError::SelfCheckFailed(ref err) => {
                write!(f, "issued chain failed verification: {}", err)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> error::Error for IssuanceError<E> { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use super::*;
    use crate::crypto::PublicKeyFormat;
    use crate::crypto::softsigner::OpenSslSigner;
    use crate::test::{self, FixedRand, Pki};

    fn policy(pki: &Pki, validity: TimeDelta) -> CaPolicy<Arc<OpenSslSigner>> {
        let mut res = CaPolicy::new(
            validity, pki.ca.clone(), pki.signer.clone(), pki.ca_key
        );
        res.current_time = Some(test::now());
        res
    }

    fn csr(pki: &Pki) -> Csr {
        let key = pki.signer.create_key(PublicKeyFormat::EcdsaP256).unwrap();
        Csr::construct(
            &pki.signer, &key, test::name(test::as_ia(), "1-ff00:0:110 AS")
        ).unwrap()
    }

    #[test]
    fn create_and_verify() {
        let pki = Pki::new(test::now());
        let policy = policy(&pki, TimeDelta::days(365));
        let csr = csr(&pki);
        let chain = policy.create_chain(&csr).unwrap();
        assert_eq!(
            chain.verify(&[pki.trc.clone()], test::now()).unwrap(),
            test::as_ia()
        );
        assert_eq!(chain.as_cert().subject(), csr.subject());
        assert_eq!(
            chain.as_cert().subject_key_identifier(),
            Some(csr.public_key().key_identifier())
        );
        assert_eq!(
            chain.as_cert().validity().not_before(), policy.now()
        );
    }

    #[test]
    fn validity_not_covered() {
        let pki = Pki::new(test::now());
        let policy = policy(&pki, TimeDelta::days(3 * 365));
        assert!(matches!(
            policy.create_chain(&csr(&pki)),
            Err(IssuanceError::ValidityNotCovered { .. })
        ));
    }

    #[test]
    fn validity_out_of_range() {
        let pki = Pki::new(test::now());
        let policy = policy(&pki, TimeDelta::try_days(200_000_000).unwrap());
        assert!(matches!(
            policy.create_chain(&csr(&pki)),
            Err(IssuanceError::ValidityNotCovered { .. })
        ));
    }

    #[test]
    fn reject_csr_without_ia() {
        let pki = Pki::new(test::now());
        let policy = policy(&pki, TimeDelta::days(3));
        let key = pki.signer.create_key(PublicKeyFormat::EcdsaP256).unwrap();
        let csr = Csr::construct(
            &pki.signer, &key,
            crate::x509::Name::from_attributes([
                (crate::oid::AT_COMMON_NAME, "no ISD-AS")
            ]),
        ).unwrap();
        assert!(matches!(
            policy.create_chain(&csr),
            Err(IssuanceError::InvalidCsr(_))
        ));
    }

    #[test]
    fn fixed_serial() {
        let pki = Pki::new(test::now());
        let mut policy = CaPolicy::new(
            TimeDelta::days(3),
            pki.ca.clone(),
            FixedRand { signer: pki.signer.clone(), pattern: &[0x1a, 0x2b] },
            pki.ca_key,
        );
        policy.current_time = Some(test::now());
        let chain = policy.create_chain(&csr(&pki)).unwrap();
        assert_eq!(chain.as_cert().serial_number().to_hex(), "1a2b");
    }
}

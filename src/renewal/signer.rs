//! The signer for renewal messages.
//!
//! Renewal messages are signed with the key of the AS certificate the
//! signer currently holds. A [`RenewalSigner`] binds that key to its chain
//! and to the TRC the chain verifies with. It is short lived: it is created
//! for a single renewal and refuses to sign after it expired.

use std::{error, fmt};
use bytes::Bytes;
use chrono::TimeDelta;
use log::debug;
use crate::chain::Chain;
use crate::crypto::{KeyIdentifier, SignatureAlgorithm, Signer, SigningError};
use crate::ia::Ia;
use crate::trc::{Trc, TrcId};
use crate::x509::{Name, Time, Validity};
use super::{cms, legacy};


//------------ RenewalSigner -------------------------------------------------

/// Signs renewal messages with the key of an AS certificate.
pub struct RenewalSigner<S: Signer> {
    signer: S,
    key: S::KeyId,
    algorithm: SignatureAlgorithm,
    ia: Ia,
    trc_id: TrcId,
    subject_key_id: KeyIdentifier,
    expiration: Time,
    chain_validity: Validity,
    subject: Name,
    chain: Chain,
}

impl<S: Signer> RenewalSigner<S> {
    /// Creates a new signer.
    ///
    /// The key must be the key of the AS certificate of `chain` which must
    /// verify with `trc`. The signer expires two hours after `now`.
    pub fn new(
        signer: S,
        key: S::KeyId,
        trc: &Trc,
        chain: Chain,
        now: Time,
    ) -> Result<Self, SignerError<S::Error>> {
        let key_info = signer.get_key_info(&key).map_err(|err| {
            SignerError::Signing(err.into())
        })?;
        let as_cert = chain.as_cert();
        if &key_info != as_cert.subject_public_key_info() {
            return Err(SignerError::KeyMismatch)
        }
        let res = RenewalSigner {
            algorithm: key_info.algorithm().signature_algorithm(),
            ia: chain.as_ia(),
            trc_id: trc.id(),
            subject_key_id: as_cert.subject_key_identifier().unwrap_or_else(
                || key_info.key_identifier()
            ),
            expiration: now + TimeDelta::hours(2),
            chain_validity: as_cert.validity(),
            subject: as_cert.subject().clone(),
            signer,
            key,
            chain,
        };
        debug!(
            "Created renewal signer for {} with TRC {}, expires {}",
            res.ia, res.trc_id, res.expiration
        );
        Ok(res)
    }

    pub fn ia(&self) -> Ia {
        self.ia
    }

    pub fn trc_id(&self) -> TrcId {
        self.trc_id
    }

    pub fn subject_key_id(&self) -> KeyIdentifier {
        self.subject_key_id
    }

    pub fn expiration(&self) -> Time {
        self.expiration
    }

    /// Changes the time after which the signer refuses to sign.
    ///
    /// Long running signers, such as the one of a CA answering requests,
    /// use the end of the chain validity instead.
    pub fn set_expiration(&mut self, expiration: Time) {
        self.expiration = expiration
    }

    /// Returns the validity of the AS certificate.
    pub fn chain_validity(&self) -> Validity {
        self.chain_validity
    }

    pub fn subject(&self) -> &Name {
        &self.subject
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    fn check_expiration(
        &self, now: Time
    ) -> Result<(), SignerError<S::Error>> {
        if now > self.expiration {
            Err(SignerError::Expired { expiration: self.expiration })
        }
        else {
            Ok(())
        }
    }

    /// Signs a body into a legacy signed message.
    pub fn sign_legacy(
        &self, body: Bytes, now: Time
    ) -> Result<legacy::SignedMessage, SignerError<S::Error>> {
        self.check_expiration(now)?;
        let header = legacy::Header {
            algorithm: self.algorithm,
            key_id: legacy::KeyId {
                ia: self.ia,
                subject_key_id: self.subject_key_id,
                trc_base: self.trc_id.base(),
                trc_serial: self.trc_id.serial(),
            },
            timestamp: now.trunc(),
        };
        legacy::SignedMessage::sign(
            header, body, &self.signer, &self.key
        ).map_err(Into::into)
    }

    /// Signs content into a CMS signed message including the chain.
    pub fn sign_cms(
        &self, content: Bytes, now: Time
    ) -> Result<cms::SignedMessage, SignerError<S::Error>> {
        self.check_expiration(now)?;
        cms::SignedMessage::sign(
            content,
            vec![self.chain.as_cert().clone(), self.chain.ca_cert().clone()],
            now, &self.signer, &self.key,
        ).map_err(Into::into)
    }
}


//------------ SignerError ---------------------------------------------------

/// A renewal message could not be signed.
#[derive(Debug)]
pub enum SignerError<E> {
    /// The signer has expired.
    Expired { expiration: Time },

    /// The key does not belong to the AS certificate.
    KeyMismatch,

    /// The underlying signer failed.
    Signing(SigningError<E>),
}

impl<E> From<SigningError<E>> for SignerError<E> {
    fn from(err: SigningError<E>) -> Self {
        SignerError::Signing(err)
    }
}

impl<E: fmt::Display> fmt::Display for SignerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SignerError::Expired { expiration } => {
                write!(f, "signer expired at {}", expiration)
            }
            SignerError::KeyMismatch => {
                f.write_str("key does not match AS certificate")
            }
            SignerError::Signing(ref err) => {
                write!(f, "signing failed: {}", err)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> error::Error for SignerError<E> { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::{self, Pki};

    #[test]
    fn sign_both() {
        let now = test::now();
        let pki = Pki::new(now);
        let (key, chain) = pki.issue_as(test::as_ia());
        let signer = RenewalSigner::new(
            pki.signer.clone(), key, &pki.trc, chain.clone(), now
        ).unwrap();
        assert_eq!(signer.ia(), test::as_ia());
        assert_eq!(signer.expiration(), now + TimeDelta::hours(2));

        let msg = signer.sign_legacy(Bytes::from_static(b"body"), now)
            .unwrap();
        assert_eq!(msg.header().key_id.trc_base, 1);
        assert_eq!(msg.header().key_id.ia, test::as_ia());
        msg.verify(chain.as_cert().subject_public_key_info()).unwrap();

        let msg = signer.sign_cms(Bytes::from_static(b"content"), now)
            .unwrap();
        assert_eq!(msg.verify().unwrap(), chain.as_cert());
        assert_eq!(msg.certificates().len(), 2);
    }

    #[test]
    fn expired() {
        let now = test::now();
        let pki = Pki::new(now);
        let (key, chain) = pki.issue_as(test::as_ia());
        let signer = RenewalSigner::new(
            pki.signer.clone(), key, &pki.trc, chain, now
        ).unwrap();
        assert!(matches!(
            signer.sign_cms(
                Bytes::from_static(b"late"), now + TimeDelta::hours(3)
            ),
            Err(SignerError::Expired { .. })
        ));
    }

    #[test]
    fn key_mismatch() {
        let now = test::now();
        let pki = Pki::new(now);
        let (_, chain) = pki.issue_as(test::as_ia());
        assert!(matches!(
            RenewalSigner::new(
                pki.signer.clone(), pki.ca_key, &pki.trc, chain, now
            ),
            Err(SignerError::KeyMismatch)
        ));
    }
}

//! The CA side of renewal.
//!
//! A [`RenewalServer`] accepts renewal requests, authenticates the requester
//! through its existing chain, issues a new chain for the certification
//! request via the [`CaPolicy`], and answers in the encodings the request
//! used.
//!
//! For CMS requests, the requester’s chain is included in the message. For
//! legacy requests, it is only referenced by ISD-AS and subject key
//! identifier and has to be known already. The server keeps the chains it
//! has issued in a [`ChainStore`] for this purpose.

use std::{error, fmt};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use bcder::decode::DecodeError;
use bytes::Bytes;
use log::{debug, info, warn};
use crate::ca::{CaPolicy, IssuanceError};
use crate::chain::{Chain, ParseChainError, VerifyError};
use crate::crypto::{KeyIdentifier, Signer};
use crate::crypto::softsigner::OpenSslSigner;
use crate::csr::Csr;
use crate::error::VerificationError;
use crate::ia::Ia;
use crate::transport::Handler;
use crate::trc::{Trc, TrcStore};
use crate::x509::Time;
use super::{cms, legacy, load_cert, load_chain, load_key, load_trcs};
use super::config::{ConfigError, ServerConfig};
use super::msg::{
    encode_legacy_chain, ChainRenewalRequest, ChainRenewalResponse,
};
use super::signer::{RenewalSigner, SignerError};
use super::LoadError;


//------------ ChainStore ----------------------------------------------------

/// A store for chains known to the CA.
pub trait ChainStore: Send + Sync {
    /// Returns the chain for the given AS and subject key identifier.
    fn get(&self, ia: Ia, subject_key_id: KeyIdentifier) -> Option<Chain>;

    /// Adds a chain to the store.
    fn insert(&self, chain: Chain);
}

impl<T: ChainStore + ?Sized> ChainStore for Arc<T> {
    fn get(&self, ia: Ia, subject_key_id: KeyIdentifier) -> Option<Chain> {
        T::get(self, ia, subject_key_id)
    }

    fn insert(&self, chain: Chain) {
        T::insert(self, chain)
    }
}


//------------ MemoryChainStore ----------------------------------------------

/// A chain store keeping chains in memory.
#[derive(Debug, Default)]
pub struct MemoryChainStore {
    chains: RwLock<HashMap<(Ia, KeyIdentifier), Chain>>,
}

impl MemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryChainStore {
    fn get(&self, ia: Ia, subject_key_id: KeyIdentifier) -> Option<Chain> {
        let chains = match self.chains.read() {
            Ok(chains) => chains,
            Err(err) => err.into_inner(),
        };
        chains.get(&(ia, subject_key_id)).cloned()
    }

    fn insert(&self, chain: Chain) {
        let Some(key_id) = chain.as_cert().subject_key_identifier() else {
            return
        };
        let mut chains = match self.chains.write() {
            Ok(chains) => chains,
            Err(err) => err.into_inner(),
        };
        chains.insert((chain.as_ia(), key_id), chain);
    }
}


//------------ RenewalServer -------------------------------------------------

/// Answers renewal requests.
pub struct RenewalServer<S: Signer, C> {
    /// The policy for issuing new chains.
    pub ca: CaPolicy<S>,

    /// The signer for responses.
    pub signer: RenewalSigner<S>,

    /// The TRCs requester chains are verified against.
    pub trcs: TrcStore,

    /// The chains known to the server.
    pub chains: C,
}

impl<S: Signer, C: ChainStore> RenewalServer<S, C> {
    pub fn new(
        ca: CaPolicy<S>,
        signer: RenewalSigner<S>,
        trcs: TrcStore,
        chains: C,
    ) -> Self {
        RenewalServer { ca, signer, trcs, chains }
    }

    /// Processes an encoded renewal request.
    pub fn handle(
        &self, request: &[u8], now: Time
    ) -> Result<ChainRenewalResponse, ServerError<S::Error>> {
        let request = ChainRenewalRequest::decode(request)?;
        let trcs: Vec<Trc> = self.trcs.active(now).into_iter().cloned()
            .collect();

        let (requester, csr) = match request.cms {
            Some(ref cms) => self.authenticate_cms(cms, &trcs, now)?,
            None => match request.legacy {
                Some(ref legacy) => {
                    self.authenticate_legacy(legacy, &trcs, now)?
                }
                None => return Err(ServerError::EmptyRequest)
            }
        };

        let csr_ia = csr.subject().ia().map_err(|err| {
            ServerError::InvalidCsr(VerificationError::new(err))
        })?;
        if csr_ia != requester {
            return Err(ServerError::IaMismatch { requester, csr: csr_ia })
        }

        let chain = self.ca.create_chain(&csr)?;
        self.chains.insert(chain.clone());

        let legacy = match request.legacy {
            Some(_) => Some(
                self.signer.sign_legacy(encode_legacy_chain(&chain), now)?
                    .to_captured().into_bytes()
            ),
            None => None,
        };
        let cms = match request.cms {
            Some(_) => Some(
                self.signer.sign_cms(chain.to_der(), now)?
                    .to_captured().into_bytes()
            ),
            None => None,
        };
        info!(
            "Renewed chain for {}, new serial {}",
            requester, chain.as_cert().serial_number()
        );
        Ok(ChainRenewalResponse { legacy, cms })
    }

    /// Authenticates a CMS request.
    ///
    /// Returns the ISD-AS of the requester and the certification request.
    fn authenticate_cms(
        &self, data: &[u8], trcs: &[Trc], now: Time,
    ) -> Result<(Ia, Csr), ServerError<S::Error>> {
        let msg = cms::SignedMessage::decode(data)?;
        let signer_cert = msg.verify().map_err(
            ServerError::InvalidSignature
        )?;
        let chain = Chain::from_certs(msg.certificates().iter().cloned())?;
        if chain.as_cert() != signer_cert {
            return Err(ServerError::InvalidSignature(VerificationError::new(
                "signer certificate is not the first certificate of chain"
            )))
        }
        let ia = chain.verify(trcs, now)?;
        debug!("Authenticated CMS request from {}", ia);
        Ok((ia, Csr::decode(msg.content())?))
    }

    /// Authenticates a legacy request.
    fn authenticate_legacy(
        &self, data: &[u8], trcs: &[Trc], now: Time,
    ) -> Result<(Ia, Csr), ServerError<S::Error>> {
        let msg = legacy::SignedMessage::decode(data)?;
        let key_id = msg.header().key_id;
        let chain = self.chains.get(
            key_id.ia, key_id.subject_key_id
        ).ok_or(ServerError::UnknownRequester {
            ia: key_id.ia, subject_key_id: key_id.subject_key_id
        })?;
        let ia = chain.verify(trcs, now)?;
        msg.verify(chain.as_cert().subject_public_key_info()).map_err(|err| {
            ServerError::InvalidSignature(err.into())
        })?;
        debug!("Authenticated legacy request from {}", ia);
        Ok((ia, Csr::decode(msg.body().clone())?))
    }
}

impl RenewalServer<Arc<OpenSslSigner>, MemoryChainStore> {
    /// Creates a server from its configuration.
    ///
    /// The chain of the server is added to the chain store so that the
    /// CA’s own AS can renew through the legacy request, too.
    pub fn from_config(
        config: &ServerConfig, now: Time
    ) -> Result<Self, ServerSetupError> {
        let validity = config.validity()?;
        let signer = Arc::new(OpenSslSigner::new());
        let trcs = TrcStore::from_trcs(
            load_trcs(&config.trcs)?
        ).map_err(|err| ServerSetupError::Trc(err.to_string()))?;
        let ca_cert = load_cert(&config.ca_cert)?;
        let ca_key = load_key(&signer, &config.ca_key)?;
        let chain = load_chain(&config.chain)?;
        let key = load_key(&signer, &config.key)?;

        let trc = trcs.latest().ok_or_else(|| {
            ServerSetupError::Trc("no TRC".into())
        })?;
        let mut response_signer = RenewalSigner::new(
            signer.clone(), key, trc, chain.clone(), now
        ).map_err(ServerSetupError::Signer)?;
        response_signer.set_expiration(chain.as_cert().validity().not_after());

        let chains = MemoryChainStore::new();
        chains.insert(chain);
        Ok(RenewalServer::new(
            CaPolicy::new(validity, ca_cert, signer, ca_key),
            response_signer, trcs, chains,
        ))
    }
}

impl<S, C> Handler for RenewalServer<S, C>
where
    S: Signer + Send + Sync + 'static,
    S::KeyId: Send + Sync + 'static,
    C: ChainStore + 'static,
{
    fn handle(&self, request: Bytes) -> Option<Bytes> {
        match RenewalServer::handle(self, request.as_ref(), Time::now()) {
            Ok(response) => Some(response.to_captured().into_bytes()),
            Err(err) => {
                warn!("Rejected renewal request: {}", err);
                None
            }
        }
    }
}


//------------ ServerError ---------------------------------------------------

/// A renewal request was rejected.
#[derive(Debug)]
pub enum ServerError<E> {
    /// The request is malformed.
    Decode(DecodeError<Infallible>),

    /// The request contains neither encoding.
    EmptyRequest,

    /// The included chain is malformed.
    InvalidChain(ParseChainError),

    /// The requester chain does not verify against the TRCs.
    Untrusted(VerifyError),

    /// The signature of the request is invalid.
    InvalidSignature(VerificationError),

    /// The chain referenced by a legacy request is unknown.
    UnknownRequester { ia: Ia, subject_key_id: KeyIdentifier },

    /// The certification request lacks a valid ISD-AS.
    InvalidCsr(VerificationError),

    /// The certification request is for a different AS than the requester.
    IaMismatch { requester: Ia, csr: Ia },

    /// Issuing the new chain failed.
    Issuance(IssuanceError<E>),

    /// Signing the response failed.
    Signing(SignerError<E>),
}

impl<E> From<DecodeError<Infallible>> for ServerError<E> {
    fn from(err: DecodeError<Infallible>) -> Self {
        ServerError::Decode(err)
    }
}

impl<E> From<ParseChainError> for ServerError<E> {
    fn from(err: ParseChainError) -> Self {
        ServerError::InvalidChain(err)
    }
}

impl<E> From<VerifyError> for ServerError<E> {
    fn from(err: VerifyError) -> Self {
        ServerError::Untrusted(err)
    }
}

impl<E> From<IssuanceError<E>> for ServerError<E> {
    fn from(err: IssuanceError<E>) -> Self {
        ServerError::Issuance(err)
    }
}

impl<E> From<SignerError<E>> for ServerError<E> {
    fn from(err: SignerError<E>) -> Self {
        ServerError::Signing(err)
    }
}

impl<E: fmt::Display> fmt::Display for ServerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ServerError::Decode(ref err) => {
                write!(f, "malformed request: {}", err)
            }
            ServerError::EmptyRequest => f.write_str("empty request"),
            ServerError::InvalidChain(ref err) => {
                write!(f, "malformed requester chain: {}", err)
            }
            ServerError::Untrusted(ref err) => {
                write!(f, "requester chain not trusted: {}", err)
            }
            ServerError::InvalidSignature(ref err) => {
                write!(f, "invalid request signature: {}", err)
            }
            ServerError::UnknownRequester { ia, subject_key_id } => {
                write!(
                    f, "unknown chain for {} with key {}", ia, subject_key_id
                )
            }
            ServerError::InvalidCsr(ref err) => {
                write!(f, "invalid certification request: {}", err)
            }
            ServerError::IaMismatch { requester, csr } => {
                write!(
                    f, "requester {} asked for certificate for {}",
                    requester, csr
                )
            }
            ServerError::Issuance(ref err) => err.fmt(f),
            ServerError::Signing(ref err) => {
                write!(f, "cannot sign response: {}", err)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> error::Error for ServerError<E> { }


//------------ ServerSetupError ----------------------------------------------

/// A server could not be created from its configuration.
#[derive(Debug)]
pub enum ServerSetupError {
    Config(ConfigError),
    Load(LoadError),
    Trc(String),
    Signer(SignerError<std::io::Error>),
}

impl From<ConfigError> for ServerSetupError {
    fn from(err: ConfigError) -> Self {
        ServerSetupError::Config(err)
    }
}

impl From<LoadError> for ServerSetupError {
    fn from(err: LoadError) -> Self {
        ServerSetupError::Load(err)
    }
}

impl fmt::Display for ServerSetupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ServerSetupError::Config(ref err) => err.fmt(f),
            ServerSetupError::Load(ref err) => err.fmt(f),
            ServerSetupError::Trc(ref err) => write!(f, "invalid TRCs: {}", err),
            ServerSetupError::Signer(ref err) => {
                write!(f, "invalid server chain: {}", err)
            }
        }
    }
}

impl error::Error for ServerSetupError { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use chrono::TimeDelta;
    use crate::crypto::PublicKeyFormat;
    use crate::crypto::softsigner::KeyId;
    use crate::renewal::msg::decode_legacy_chain;
    use crate::test::{self, Pki};
    use super::*;

    struct Setup {
        pki: Pki,
        server: RenewalServer<Arc<OpenSslSigner>, MemoryChainStore>,
        requester: RenewalSigner<Arc<OpenSslSigner>>,
    }

    fn setup() -> Setup {
        let now = test::now();
        let pki = Pki::new(now);
        let (server_key, server_chain) = pki.issue_as(test::ca_ia());
        let (key, chain) = pki.issue_as(test::as_ia());
        let mut ca = CaPolicy::new(
            TimeDelta::days(3), pki.ca.clone(), pki.signer.clone(), pki.ca_key
        );
        ca.current_time = Some(now);
        let chains = MemoryChainStore::new();
        chains.insert(chain.clone());
        let server = RenewalServer::new(
            ca,
            RenewalSigner::new(
                pki.signer.clone(), server_key, &pki.trc, server_chain, now
            ).unwrap(),
            TrcStore::from_trcs([pki.trc.clone()]).unwrap(),
            chains,
        );
        let requester = RenewalSigner::new(
            pki.signer.clone(), key, &pki.trc, chain, now
        ).unwrap();
        Setup { pki, server, requester }
    }

    fn csr(pki: &Pki, ia: Ia) -> (KeyId, Csr) {
        let key = pki.signer.create_key(PublicKeyFormat::EcdsaP256).unwrap();
        let csr = Csr::construct(
            &pki.signer, &key, test::name(ia, "New AS Certificate")
        ).unwrap();
        (key, csr)
    }

    #[test]
    fn cms_request() {
        let now = test::now();
        let setup = setup();
        let (key, csr) = csr(&setup.pki, test::as_ia());
        let request = ChainRenewalRequest {
            legacy: None,
            cms: Some(
                setup.requester.sign_cms(
                    csr.to_captured().into_bytes(), now
                ).unwrap().to_captured().into_bytes()
            ),
        };
        let response = setup.server.handle(
            request.to_captured().as_slice(), now
        ).unwrap();
        assert!(response.legacy.is_none());
        let msg = cms::SignedMessage::decode(response.cms.unwrap()).unwrap();
        let chain = Chain::from_der(&msg.content()).unwrap();
        assert_eq!(
            chain.verify(&[setup.pki.trc.clone()], now).unwrap(),
            test::as_ia()
        );
        assert_eq!(
            chain.as_cert().subject_public_key_info(),
            &setup.pki.signer.get_key_info(&key).unwrap()
        );
        let key_id = chain.as_cert().subject_key_identifier().unwrap();
        assert_eq!(
            setup.server.chains.get(test::as_ia(), key_id), Some(chain)
        );
    }

    #[test]
    fn legacy_request() {
        let now = test::now();
        let setup = setup();
        let (_, csr) = csr(&setup.pki, test::as_ia());
        let body = csr.to_captured().into_bytes();
        let request = ChainRenewalRequest {
            legacy: Some(
                setup.requester.sign_legacy(body.clone(), now).unwrap()
                    .to_captured().into_bytes()
            ),
            cms: Some(
                setup.requester.sign_cms(body, now).unwrap()
                    .to_captured().into_bytes()
            ),
        };
        let response = setup.server.handle(
            request.to_captured().as_slice(), now
        ).unwrap();
        assert!(response.cms.is_some());
        let msg = legacy::SignedMessage::decode(
            response.legacy.unwrap()
        ).unwrap();
        msg.verify(
            setup.server.signer.chain().as_cert().subject_public_key_info()
        ).unwrap();
        let chain = decode_legacy_chain(msg.body()).unwrap();
        assert_eq!(chain.as_ia(), test::as_ia());
    }

    #[test]
    fn reject_unknown_legacy_requester() {
        let now = test::now();
        let setup = setup();
        let (_, csr) = csr(&setup.pki, test::as_ia());
        let (key, chain) = setup.pki.issue_as(test::as_ia());
        let stranger = RenewalSigner::new(
            setup.pki.signer.clone(), key, &setup.pki.trc, chain, now
        ).unwrap();
        let request = ChainRenewalRequest {
            legacy: Some(
                stranger.sign_legacy(csr.to_captured().into_bytes(), now)
                    .unwrap().to_captured().into_bytes()
            ),
            cms: None,
        };
        assert!(matches!(
            setup.server.handle(request.to_captured().as_slice(), now),
            Err(ServerError::UnknownRequester { .. })
        ));
    }

    #[test]
    fn reject_foreign_csr() {
        let now = test::now();
        let setup = setup();
        let (_, csr) = csr(&setup.pki, "1-ff00:0:112".parse().unwrap());
        let request = ChainRenewalRequest {
            legacy: None,
            cms: Some(
                setup.requester.sign_cms(csr.to_captured().into_bytes(), now)
                    .unwrap().to_captured().into_bytes()
            ),
        };
        assert!(matches!(
            setup.server.handle(request.to_captured().as_slice(), now),
            Err(ServerError::IaMismatch { .. })
        ));
    }

    #[test]
    fn reject_untrusted_chain() {
        let now = test::now();
        let setup = setup();
        let other = Pki::with_signer(setup.pki.signer.clone(), now);
        let (key, chain) = other.issue_as(test::as_ia());
        let stranger = RenewalSigner::new(
            other.signer.clone(), key, &other.trc, chain, now
        ).unwrap();
        let (_, csr) = csr(&setup.pki, test::as_ia());
        let request = ChainRenewalRequest {
            legacy: None,
            cms: Some(
                stranger.sign_cms(csr.to_captured().into_bytes(), now)
                    .unwrap().to_captured().into_bytes()
            ),
        };
        assert!(matches!(
            setup.server.handle(request.to_captured().as_slice(), now),
            Err(ServerError::Untrusted(_))
        ));
    }
}

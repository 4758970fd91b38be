//! The requesting side of renewal.
//!
//! The [`RenewalClient`] runs a single renewal: It loads the TRCs and the
//! current chain, builds a certification request for the new key, sends it
//! to the CA signed with the current key, and verifies and stores the chain
//! it receives in return.
//!
//! The signature of the response itself is not checked. The new chain is
//! only accepted if it verifies against the TRCs.

use std::{error, fmt, fs, io};
use std::convert::Infallible;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use bcder::decode::DecodeError;
use bytes::Bytes;
use chrono::TimeDelta;
use futures_util::future;
use futures_util::future::Either;
use futures_util::pin_mut;
use log::{info, warn};
use tokio::time::{timeout, Instant};
use crate::chain::{Chain, ParseChainError, VerifyError};
use crate::crypto::{Signer, SigningError};
use crate::crypto::softsigner::OpenSslSigner;
use crate::csr::Csr;
use crate::ia::Ia;
use crate::pem;
use crate::transport::{round_trip, Transport, TransportError};
use crate::trc::{Trc, TrcStore};
use crate::x509::Time;
use super::{cms, legacy, load_chain, load_key, load_trcs, LoadError};
use super::config::{ConfigError, Features, RenewalConfig};
use super::msg::{decode_legacy_chain, ChainRenewalRequest, ChainRenewalResponse};
use super::signer::{RenewalSigner, SignerError};
use super::template::{SubjectTemplate, TemplateError};


//------------ RenewalClient -------------------------------------------------

/// A client renewing the chain of an AS.
pub struct RenewalClient<T> {
    config: RenewalConfig,
    transport: T,
    signer: Arc<OpenSslSigner>,
}

impl<T: Transport> RenewalClient<T> {
    pub fn new(
        config: RenewalConfig, transport: T, signer: Arc<OpenSslSigner>
    ) -> Self {
        RenewalClient { config, transport, signer }
    }

    pub fn config(&self) -> &RenewalConfig {
        &self.config
    }

    /// Renews the chain.
    pub async fn renew(
        &self, now: Time
    ) -> Result<RenewalReport, RenewalError> {
        self.renew_with_cancel(now, future::pending()).await
    }

    /// Renews the chain unless `cancel` resolves first.
    ///
    /// The time `now` is when the renewal starts. The new chain is verified
    /// at `now` plus the time the renewal has taken until then.
    ///
    /// Cancellation only affects the exchange with the CA. Files written
    /// before are kept.
    pub async fn renew_with_cancel(
        &self, now: Time, cancel: impl Future<Output = ()>
    ) -> Result<RenewalReport, RenewalError> {
        let started = Instant::now();
        let config = &self.config;
        config.validate()?;

        // Trust material.
        let trcs = select_trcs(load_trcs(&config.trcs)?, now)?;
        let transport_chain = load_chain(&config.transport_cert)?;
        if let Err(err) = transport_chain.verify(&trcs, now) {
            let guidance = maybe_missing_trc_in_grace(&trcs, now);
            if let Some(guidance) = guidance {
                warn!("{}", guidance);
            }
            return Err(RenewalError::TransportChain { guidance, source: err })
        }
        let remote = match config.ca {
            Some(ca) => ca,
            None => {
                let ca = transport_chain.ca_ia();
                info!(
                    "Extracted remote from transport certificate chain: {}",
                    ca
                );
                ca
            }
        };

        // Certification request.
        let key = load_key(&self.signer, &config.key)?;
        let subject = match config.template {
            Some(ref path) => SubjectTemplate::load(path)?.to_name(),
            None => transport_chain.as_cert().subject().clone(),
        };
        let csr = Csr::construct(&self.signer, &key, subject)?;
        if let Some(ref path) = config.csr_out {
            match fs::write(path, csr.to_pem()) {
                Ok(()) => info!("CSR written to {}", path.display()),
                Err(err) => {
                    warn!(
                        "Failed to write CSR to {}: {}", path.display(), err
                    )
                }
            }
        }

        // Renewal request.
        let transport_key = load_key(&self.signer, &config.transport_key)?;
        let signer = RenewalSigner::new(
            self.signer.clone(), transport_key, &trcs[0],
            transport_chain, now,
        )?;
        let request = build_request(&signer, &csr, config.features, now)?;
        if let Some(ref path) = config.req_out {
            let cms = request.cms.as_ref().ok_or_else(|| {
                ConfigError::Invalid(
                    "cannot write request to file: no request created".into()
                )
            })?;
            match fs::write(path, pem::encode(pem::CMS, cms.as_ref())) {
                Ok(()) => info!("Request written to {}", path.display()),
                Err(err) => {
                    warn!(
                        "Failed to write request to {}: {}",
                        path.display(), err
                    )
                }
            }
        }

        // Exchange.
        let reply = self.exchange(
            remote, request.to_captured().into_bytes(), cancel
        ).await?;
        let response = ChainRenewalResponse::decode(reply).map_err(|err| {
            RenewalError::Response(ResponseError::Decode(err))
        })?;
        let chain = extract_chain(&response)?;

        // Verification.
        let now = advance(now, started);
        let path = match config.out {
            Some(ref path) => path.clone(),
            None => out_file_from_subject(&chain, &config.transport_cert),
        };
        if let Err(err) = chain.verify(&trcs, now) {
            let mut unverified = path.into_os_string();
            unverified.push(".unverified");
            let unverified = PathBuf::from(unverified);
            match write_chain(&unverified, &chain) {
                Ok(()) => {
                    warn!(
                        "Verification failed, writing chain: {}",
                        unverified.display()
                    )
                }
                Err(err) => {
                    warn!(
                        "Failed to write unverified chain to {}: {}",
                        unverified.display(), err
                    )
                }
            }
            let guidance = maybe_missing_trc_in_grace(&trcs, now);
            if let Some(guidance) = guidance {
                warn!("{}", guidance);
            }
            return Err(RenewalError::Verification {
                path: unverified, guidance, source: err
            })
        }

        write_chain(&path, &chain).map_err(|err| {
            RenewalError::Io(path.clone(), err)
        })?;
        info!("Successfully wrote new chain at {}", path.display());
        Ok(RenewalReport { path, chain, remote })
    }

    /// Sends the request to the CA and returns the reply.
    async fn exchange(
        &self,
        remote: Ia,
        payload: Bytes,
        cancel: impl Future<Output = ()>,
    ) -> Result<Bytes, TransportError> {
        let exchange = async {
            match timeout(self.config.timeout(), async {
                let mut conn = self.transport.dial(
                    remote, self.config.local
                ).await?;
                round_trip(&mut conn, payload.as_ref()).await
            }).await {
                Ok(res) => res,
                Err(_) => Err(TransportError::Timeout),
            }
        };
        pin_mut!(exchange);
        pin_mut!(cancel);
        match future::select(exchange, cancel).await {
            Either::Left((res, _)) => res,
            Either::Right(_) => Err(TransportError::Cancelled),
        }
    }
}


//------------ RenewalReport -------------------------------------------------

/// The outcome of a successful renewal.
#[derive(Clone, Debug)]
pub struct RenewalReport {
    /// Where the new chain was written to.
    pub path: PathBuf,

    /// The new chain.
    pub chain: Chain,

    /// The CA that issued the chain.
    pub remote: Ia,
}


//------------ Helpers -------------------------------------------------------

/// Selects the TRCs to verify chains against.
///
/// Up to two TRCs are used as given. Of more TRCs, only the active TRCs
/// of the highest base are used.
pub fn select_trcs(
    trcs: Vec<Trc>, now: Time
) -> Result<Vec<Trc>, RenewalError> {
    if trcs.is_empty() {
        return Err(ConfigError::Invalid("no TRC configured".into()).into())
    }
    if trcs.len() <= 2 {
        return Ok(trcs)
    }
    let store = TrcStore::from_trcs(trcs).map_err(|err| {
        ConfigError::Invalid(err.to_string())
    })?;
    Ok(store.active(now).into_iter().cloned().collect())
}

/// Builds a renewal request for a certification request.
pub fn build_request<S: Signer>(
    signer: &RenewalSigner<S>,
    csr: &Csr,
    features: Features,
    now: Time,
) -> Result<ChainRenewalRequest, SignerError<S::Error>> {
    let body = csr.to_captured().into_bytes();
    let legacy = if features.disable_legacy_request {
        None
    }
    else {
        Some(signer.sign_legacy(body.clone(), now)?.to_captured().into_bytes())
    };
    let cms = if features.disable_cms_request {
        None
    }
    else {
        Some(signer.sign_cms(body, now)?.to_captured().into_bytes())
    };
    Ok(ChainRenewalRequest { legacy, cms })
}

/// Extracts the new chain from a response.
///
/// The CMS encoding is preferred if present. The signature of the response
/// is not verified.
pub fn extract_chain(
    response: &ChainRenewalResponse
) -> Result<Chain, RenewalError> {
    if let Some(ref data) = response.cms {
        let msg = cms::SignedMessage::decode(data.clone()).map_err(|err| {
            RenewalError::Response(ResponseError::Decode(err))
        })?;
        return Chain::from_der(&msg.content()).map_err(|err| {
            RenewalError::Response(ResponseError::Chain(err))
        })
    }
    if let Some(ref data) = response.legacy {
        let body = legacy::extract_unverified_body(data).map_err(|err| {
            RenewalError::Response(ResponseError::Decode(err))
        })?;
        return decode_legacy_chain(&body).map_err(|err| {
            RenewalError::Response(ResponseError::Chain(err))
        })
    }
    Err(RenewalError::Response(ResponseError::Empty))
}

/// Returns the default path for a new chain.
///
/// The file is placed in the directory of the transport certificate and
/// named after the ISD-AS and serial number of the new AS certificate.
pub fn out_file_from_subject(chain: &Chain, transport_cert: &Path) -> PathBuf {
    let ia = chain.as_ia();
    let name = format!(
        "ISD{}-AS{}.{}.pem",
        ia.isd(), ia.asn().file_fmt(),
        chain.as_cert().serial_number().to_hex()
    );
    match transport_cert.parent() {
        Some(dir) => dir.join(name),
        None => name.into(),
    }
}

/// Returns guidance if a missing predecessor TRC may be the problem.
///
/// This is the case if exactly one TRC was used and it is in its grace
/// period. Chains issued under the predecessor are still valid then.
pub fn maybe_missing_trc_in_grace(
    trcs: &[Trc], now: Time
) -> Option<GraceGuidance> {
    match trcs {
        [trc] if trc.in_grace_period(now) => {
            trc.id().predecessor().map(|id| GraceGuidance {
                base: id.base(),
                serial: id.serial(),
            })
        }
        _ => None
    }
}

/// Returns `start` moved forward by the time passed since `started`.
fn advance(start: Time, started: Instant) -> Time {
    TimeDelta::from_std(started.elapsed()).ok().and_then(|elapsed| {
        start.checked_add(elapsed)
    }).unwrap_or(start)
}

/// Writes a chain as PEM to a file.
pub fn write_chain(path: &Path, chain: &Chain) -> Result<(), io::Error> {
    fs::write(path, chain.to_pem())
}


//------------ GraceGuidance -------------------------------------------------

/// Identifies the predecessor TRC that should be tried.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GraceGuidance {
    pub base: u64,
    pub serial: u64,
}

impl fmt::Display for GraceGuidance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "Try to verify with the predecessor TRC: \
                (Base = {}, Serial = {})",
            self.base, self.serial
        )
    }
}


//------------ RenewalError --------------------------------------------------

/// Renewing a chain failed.
#[derive(Debug)]
pub enum RenewalError {
    /// The configuration is invalid.
    Config(ConfigError),

    /// The subject template is invalid.
    Template(TemplateError),

    /// Loading a file failed.
    Load(LoadError),

    /// The current chain does not verify against the TRCs.
    TransportChain {
        /// Which TRC to try instead.
        guidance: Option<GraceGuidance>,

        source: VerifyError,
    },

    /// Creating the request failed.
    Signing(SignerError<io::Error>),

    /// The exchange with the CA failed.
    Transport(TransportError),

    /// The response is malformed.
    Response(ResponseError),

    /// The new chain does not verify against the TRCs.
    Verification {
        /// Where the unverified chain was written to.
        path: PathBuf,

        /// Which TRC to try instead.
        guidance: Option<GraceGuidance>,

        source: VerifyError,
    },

    /// Writing the new chain failed.
    Io(PathBuf, io::Error),
}

impl From<ConfigError> for RenewalError {
    fn from(err: ConfigError) -> Self {
        RenewalError::Config(err)
    }
}

impl From<TemplateError> for RenewalError {
    fn from(err: TemplateError) -> Self {
        RenewalError::Template(err)
    }
}

impl From<LoadError> for RenewalError {
    fn from(err: LoadError) -> Self {
        RenewalError::Load(err)
    }
}

impl From<SignerError<io::Error>> for RenewalError {
    fn from(err: SignerError<io::Error>) -> Self {
        RenewalError::Signing(err)
    }
}

impl From<SigningError<io::Error>> for RenewalError {
    fn from(err: SigningError<io::Error>) -> Self {
        RenewalError::Signing(err.into())
    }
}

impl From<TransportError> for RenewalError {
    fn from(err: TransportError) -> Self {
        RenewalError::Transport(err)
    }
}

impl fmt::Display for RenewalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RenewalError::Config(ref err) => err.fmt(f),
            RenewalError::Template(ref err) => err.fmt(f),
            RenewalError::Load(ref err) => err.fmt(f),
            RenewalError::TransportChain { ref source, .. } => {
                write!(f, "verifying transport chain: {}", source)
            }
            RenewalError::Signing(ref err) => {
                write!(f, "creating request: {}", err)
            }
            RenewalError::Transport(ref err) => {
                write!(f, "requesting chain: {}", err)
            }
            RenewalError::Response(ref err) => {
                write!(f, "parsing response: {}", err)
            }
            RenewalError::Verification { ref source, .. } => {
                write!(f, "verification failed: {}", source)
            }
            RenewalError::Io(ref path, ref err) => {
                write!(f, "writing {}: {}", path.display(), err)
            }
        }
    }
}

impl error::Error for RenewalError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            RenewalError::TransportChain { ref source, .. } => Some(source),
            RenewalError::Verification { ref source, .. } => Some(source),
            RenewalError::Transport(ref err) => Some(err),
            _ => None
        }
    }
}


//------------ ResponseError -------------------------------------------------

/// A response could not be parsed.
#[derive(Debug)]
pub enum ResponseError {
    Decode(DecodeError<Infallible>),
    Chain(ParseChainError),
    Empty,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ResponseError::Decode(ref err) => err.fmt(f),
            ResponseError::Chain(ref err) => err.fmt(f),
            ResponseError::Empty => f.write_str("no chain in response"),
        }
    }
}

impl error::Error for ResponseError { }


//============ Tests =========================================================

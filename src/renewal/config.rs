//! Configuration of the renewal client and server.
//!
//! Both sides are configured through TOML files. A minimal client
//! configuration looks like this:
//!
//! ```toml
//! trcs = ["ISD1-B1-S1.trc"]
//! transport_cert = "certs/ISD1-ASff00_0_110.pem"
//! transport_key = "keys/cp-as.key"
//! key = "keys/cp-as-new.key"
//!
//! [remotes]
//! "1-ff00:0:111" = "127.0.0.1:30252"
//! ```

use std::{error, fmt, fs, io};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use chrono::TimeDelta;
use serde::Deserialize;
use crate::ia::Ia;


// Defaults
const DFLT_TIMEOUT_SECS: u64 = 5;
const DFLT_VALIDITY_DAYS: i64 = 3;


//------------ Features ------------------------------------------------------

/// Optional behaviour of the renewal client.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(try_from = "Vec<String>")]
pub struct Features {
    /// Do not include the legacy encoding in requests.
    pub disable_legacy_request: bool,

    /// Do not include the CMS encoding in requests.
    pub disable_cms_request: bool,
}

impl Features {
    pub const DISABLE_LEGACY_REQUEST: &'static str = "disable_legacy_request";
    pub const DISABLE_CMS_REQUEST: &'static str = "disable_cms_request";

    /// Parses a list of feature names.
    pub fn parse<'a>(
        names: impl IntoIterator<Item = &'a str>
    ) -> Result<Self, ConfigError> {
        let mut res = Features::default();
        for name in names {
            match name.trim() {
                "" => { }
                Self::DISABLE_LEGACY_REQUEST => {
                    res.disable_legacy_request = true
                }
                Self::DISABLE_CMS_REQUEST => res.disable_cms_request = true,
                other => {
                    return Err(ConfigError::UnknownFeature(other.into()))
                }
            }
        }
        res.validate()?;
        Ok(res)
    }

    /// Checks that at least one request encoding is enabled.
    pub fn validate(self) -> Result<(), ConfigError> {
        if self.disable_legacy_request && self.disable_cms_request {
            Err(ConfigError::BothRequestsDisabled)
        }
        else {
            Ok(())
        }
    }
}

impl TryFrom<Vec<String>> for Features {
    type Error = ConfigError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::parse(names.iter().map(String::as_str))
    }
}


//------------ RenewalConfig -------------------------------------------------

/// The configuration of a renewal client.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenewalConfig {
    /// The TRC files to verify chains against.
    pub trcs: Vec<PathBuf>,

    /// The current chain used to authenticate against the CA.
    pub transport_cert: PathBuf,

    /// The private key of the current AS certificate.
    pub transport_key: PathBuf,

    /// The private key for the new certificate.
    pub key: PathBuf,

    /// Where to write the new chain.
    ///
    /// If missing, a name is derived from the new certificate and the file
    /// is placed next to the transport certificate.
    #[serde(default)]
    pub out: Option<PathBuf>,

    /// The ISD-AS of the CA.
    ///
    /// If missing, the issuer of the transport chain is used.
    #[serde(default)]
    pub ca: Option<Ia>,

    /// A JSON file with the subject template.
    #[serde(default)]
    pub template: Option<PathBuf>,

    /// Where to write the certification request.
    #[serde(default)]
    pub csr_out: Option<PathBuf>,

    /// Where to write the CMS request.
    #[serde(default)]
    pub req_out: Option<PathBuf>,

    /// The timeout for the exchange with the CA in seconds.
    #[serde(default = "RenewalConfig::dflt_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub features: Features,

    /// The local address to connect from.
    #[serde(default)]
    pub local: Option<SocketAddr>,

    /// Addresses of the control services of remote ASes.
    #[serde(default)]
    pub remotes: HashMap<Ia, SocketAddr>,
}

impl RenewalConfig {
    fn dflt_timeout_secs() -> u64 {
        DFLT_TIMEOUT_SECS
    }

    /// Creates a configuration with default values.
    pub fn new(
        trcs: Vec<PathBuf>,
        transport_cert: PathBuf,
        transport_key: PathBuf,
        key: PathBuf,
    ) -> Self {
        RenewalConfig {
            trcs, transport_cert, transport_key, key,
            out: None,
            ca: None,
            template: None,
            csr_out: None,
            req_out: None,
            timeout_secs: DFLT_TIMEOUT_SECS,
            features: Features::default(),
            local: None,
            remotes: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Loads the configuration from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_str(&read_file(path.as_ref())?)
    }

    /// Checks the configuration for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trcs.is_empty() {
            return Err(ConfigError::Invalid("no TRC configured".into()))
        }
        self.features.validate()
    }
}

impl FromStr for RenewalConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let res: Self = toml::from_str(s)?;
        res.validate()?;
        Ok(res)
    }
}


//------------ ServerConfig --------------------------------------------------

/// The configuration of the CA side.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// The address to listen on.
    pub listen: SocketAddr,

    /// The TRC files requester chains are verified against.
    pub trcs: Vec<PathBuf>,

    /// The CA certificate.
    pub ca_cert: PathBuf,

    /// The private key of the CA certificate.
    pub ca_key: PathBuf,

    /// The chain responses are signed with.
    pub chain: PathBuf,

    /// The private key of the AS certificate of `chain`.
    pub key: PathBuf,

    /// The validity of issued certificates in days.
    #[serde(default = "ServerConfig::dflt_validity_days")]
    pub validity_days: i64,
}

impl ServerConfig {
    fn dflt_validity_days() -> i64 {
        DFLT_VALIDITY_DAYS
    }

    /// Returns the validity of issued certificates.
    pub fn validity(&self) -> Result<TimeDelta, ConfigError> {
        if self.validity_days <= 0 {
            return Err(ConfigError::Invalid(
                "validity_days must be positive".into()
            ))
        }
        TimeDelta::try_days(self.validity_days).ok_or_else(|| {
            ConfigError::Invalid("validity_days out of range".into())
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_str(&read_file(path.as_ref())?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trcs.is_empty() {
            return Err(ConfigError::Invalid("no TRC configured".into()))
        }
        self.validity()?;
        Ok(())
    }
}

impl FromStr for ServerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let res: Self = toml::from_str(s)?;
        res.validate()?;
        Ok(res)
    }
}


//------------ Helpers -------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|err| {
        ConfigError::Io(path.into(), err)
    })
}


//------------ ConfigError ---------------------------------------------------

/// The configuration is invalid.
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    Io(PathBuf, io::Error),

    /// The configuration file is not valid TOML.
    Toml(toml::de::Error),

    /// An unknown feature was requested.
    UnknownFeature(String),

    /// Both the legacy and the CMS request are disabled.
    BothRequestsDisabled,

    /// Some other setting is invalid.
    Invalid(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Toml(err)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::Io(ref path, ref err) => {
                write!(f, "cannot read {}: {}", path.display(), err)
            }
            ConfigError::Toml(ref err) => {
                write!(f, "invalid configuration: {}", err)
            }
            ConfigError::UnknownFeature(ref name) => {
                write!(f, "unknown feature '{}'", name)
            }
            ConfigError::BothRequestsDisabled => {
                f.write_str("both legacy and CMS request disabled")
            }
            ConfigError::Invalid(ref msg) => f.write_str(msg),
        }
    }
}

impl error::Error for ConfigError { }


//============ Tests =========================================================

//! Renewal of AS certificates.
//!
//! An AS renews its certificate by sending a certification request to its
//! CA. The request is signed with the key of the AS certificate the AS
//! currently holds, so the CA can authenticate the requester through its
//! existing chain. The CA answers with a new chain.
//!
//! Requests and responses exist in two encodings, the [legacy] signed
//! envelope and [CMS][cms] signed data. Both are carried side by side in
//! the containers defined in [msg] so that peers of different ages can
//! talk to each other.
//!
//! The requesting side is implemented by the [`RenewalClient`], the CA side
//! by the [`RenewalServer`].
//!
//! [`RenewalClient`]: client::RenewalClient
//! [`RenewalServer`]: server::RenewalServer

use std::{error, fmt, fs, io};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use bcder::decode::DecodeError;
use crate::cert::Cert;
use crate::chain::{Chain, ParseChainError};
use crate::crypto::softsigner::{KeyId, KeyLoadError, OpenSslSigner};
use crate::pem::{self, Pem, PemError};
use crate::trc::Trc;

pub mod client;
pub mod cms;
pub mod config;
pub mod legacy;
pub mod msg;
pub mod server;
pub mod signer;
pub mod template;


//------------ Loading Files -------------------------------------------------

/// Loads TRCs from files.
///
/// The files may contain the DER encoding of the TRC or a PEM `TRC` block.
pub fn load_trcs<P: AsRef<Path>>(
    paths: impl IntoIterator<Item = P>
) -> Result<Vec<Trc>, LoadError> {
    paths.into_iter().map(|path| load_trc(path.as_ref())).collect()
}

/// Loads a single TRC from a file.
pub fn load_trc(path: &Path) -> Result<Trc, LoadError> {
    let data = fs::read(path).map_err(|err| LoadError::io(path, err))?;
    let der = if data.starts_with(b"-----BEGIN") {
        let text = String::from_utf8_lossy(&data);
        let mut blocks = Pem::parse_labeled(&text, pem::TRC).map_err(|err| {
            LoadError::new(path, err)
        })?;
        if blocks.len() != 1 {
            return Err(LoadError::new(path, LoadErrorKind::Count(blocks.len())))
        }
        blocks.remove(0)
    }
    else {
        data.into()
    };
    Trc::decode(der).map_err(|err| LoadError::new(path, err))
}

/// Loads a chain from a PEM file.
pub fn load_chain(path: &Path) -> Result<Chain, LoadError> {
    let text = fs::read_to_string(path).map_err(|err| {
        LoadError::io(path, err)
    })?;
    Chain::from_pem(&text).map_err(|err| LoadError::new(path, err))
}

/// Loads a single certificate from a PEM file.
pub fn load_cert(path: &Path) -> Result<Cert, LoadError> {
    let text = fs::read_to_string(path).map_err(|err| {
        LoadError::io(path, err)
    })?;
    let blocks = Pem::parse_labeled(&text, pem::CERTIFICATE).map_err(|err| {
        LoadError::new(path, err)
    })?;
    match blocks.as_slice() {
        [block] => {
            Cert::decode(block.clone()).map_err(|err| LoadError::new(path, err))
        }
        _ => Err(LoadError::new(path, LoadErrorKind::Count(blocks.len())))
    }
}

/// Loads a PEM encoded private key into a signer.
pub fn load_key(
    signer: &OpenSslSigner, path: &Path
) -> Result<KeyId, LoadError> {
    let data = fs::read(path).map_err(|err| LoadError::io(path, err))?;
    signer.key_from_pem(&data).map_err(|err| LoadError::new(path, err))
}


//------------ LoadError -----------------------------------------------------

/// A file could not be loaded.
#[derive(Debug)]
pub struct LoadError {
    path: PathBuf,
    kind: LoadErrorKind,
}

/// The reason loading a file failed.
#[derive(Debug)]
pub enum LoadErrorKind {
    Io(io::Error),
    Pem(PemError),
    Count(usize),
    Decode(DecodeError<Infallible>),
    Chain(ParseChainError),
    Key(KeyLoadError),
}

impl LoadError {
    fn new(path: &Path, kind: impl Into<LoadErrorKind>) -> Self {
        LoadError { path: path.into(), kind: kind.into() }
    }

    fn io(path: &Path, err: io::Error) -> Self {
        Self::new(path, LoadErrorKind::Io(err))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> &LoadErrorKind {
        &self.kind
    }
}

impl From<PemError> for LoadErrorKind {
    fn from(err: PemError) -> Self {
        LoadErrorKind::Pem(err)
    }
}

impl From<DecodeError<Infallible>> for LoadErrorKind {
    fn from(err: DecodeError<Infallible>) -> Self {
        LoadErrorKind::Decode(err)
    }
}

impl From<ParseChainError> for LoadErrorKind {
    fn from(err: ParseChainError) -> Self {
        LoadErrorKind::Chain(err)
    }
}

impl From<KeyLoadError> for LoadErrorKind {
    fn from(err: KeyLoadError) -> Self {
        LoadErrorKind::Key(err)
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: ", self.path.display())?;
        match self.kind {
            LoadErrorKind::Io(ref err) => err.fmt(f),
            LoadErrorKind::Pem(ref err) => err.fmt(f),
            LoadErrorKind::Count(count) => {
                write!(f, "expected one PEM block, found {}", count)
            }
            LoadErrorKind::Decode(ref err) => err.fmt(f),
            LoadErrorKind::Chain(ref err) => err.fmt(f),
            LoadErrorKind::Key(ref err) => err.fmt(f),
        }
    }
}

impl error::Error for LoadError { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::{self, Pki};

    #[test]
    fn load_files() {
        let dir = tempfile::tempdir().unwrap();
        let pki = Pki::new(test::now());
        let (key, chain) = pki.issue_as(test::as_ia());

        let trc_der = dir.path().join("ISD1-B1-S1.trc");
        fs::write(&trc_der, test::wrap_trc(&pki.trc).as_slice()).unwrap();
        let trc_pem = dir.path().join("ISD1-B1-S1.pem.trc");
        fs::write(
            &trc_pem, pem::encode(pem::TRC, pki.trc.to_captured().as_slice())
        ).unwrap();
        let trcs = load_trcs([&trc_der, &trc_pem]).unwrap();
        assert_eq!(trcs.len(), 2);
        assert_eq!(trcs[0].id(), pki.trc.id());
        assert_eq!(trcs[1].id(), pki.trc.id());

        let chain_path = dir.path().join("chain.pem");
        fs::write(&chain_path, chain.to_pem()).unwrap();
        assert_eq!(load_chain(&chain_path).unwrap(), chain);
        assert!(load_cert(&chain_path).is_err());

        let ca_path = dir.path().join("ca.pem");
        fs::write(
            &ca_path,
            pem::encode(pem::CERTIFICATE, pki.ca.to_captured().as_slice())
        ).unwrap();
        assert_eq!(load_cert(&ca_path).unwrap(), pki.ca);

        let key_path = dir.path().join("as.key");
        fs::write(&key_path, pki.signer.key_to_pem(&key).unwrap()).unwrap();
        let signer = OpenSslSigner::new();
        let loaded = load_key(&signer, &key_path).unwrap();
        assert_eq!(
            crate::crypto::Signer::get_key_info(&signer, &loaded).unwrap(),
            *chain.as_cert().subject_public_key_info()
        );

        let missing = dir.path().join("missing.trc");
        assert_eq!(load_trc(&missing).unwrap_err().path(), missing);
    }
}

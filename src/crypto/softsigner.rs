//! A signer atop the OpenSSL library.
//!
//! The signer keeps elliptic curve keys in memory. Keys are either created
//! fresh or loaded from PEM or DER encoded private key files.

use std::{error, fmt, io};
use std::sync::{Arc, RwLock};
use openssl::ec::{EcGroup, EcKey};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, Private};
use ring::rand;
use ring::rand::SecureRandom;
use super::keys::{PublicKey, PublicKeyFormat};
use super::signer::{KeyError, Signer, SigningError};
use super::signature::{Signature, SignatureAlgorithm};


//------------ OpenSslSigner -------------------------------------------------

/// An OpenSSL based signer.
///
/// Keeps the keys in memory.
pub struct OpenSslSigner {
    keys: RwLock<Vec<Option<Arc<KeyPair>>>>,
    rng: rand::SystemRandom,
}

impl OpenSslSigner {
    pub fn new() -> OpenSslSigner {
        OpenSslSigner {
            keys: Default::default(),
            rng: rand::SystemRandom::new(),
        }
    }

    /// Loads a PEM encoded private key.
    ///
    /// Both PKCS#8 and SEC1 encoded keys are accepted. The key must be an
    /// elliptic curve key on one of the supported curves.
    pub fn key_from_pem(&self, pem: &[u8]) -> Result<KeyId, KeyLoadError> {
        self.insert_key(KeyPair::from_pkey(
            PKey::private_key_from_pem(pem)?
        )?).map_err(KeyLoadError::Store)
    }

    /// Returns the PKCS#8 PEM encoding of a private key.
    pub fn key_to_pem(
        &self, id: &KeyId
    ) -> Result<Vec<u8>, KeyError<io::Error>> {
        self.get_key(*id)?.0.private_key_to_pem_pkcs8().map_err(|err| {
            KeyError::Signer(err.into())
        })
    }

    /// Removes a key from the signer.
    pub fn destroy_key(&self, id: &KeyId) -> Result<(), KeyError<io::Error>> {
        let mut keys = self.keys.write().map_err(|_| poisoned())?;
        match keys.get_mut(id.0) {
            Some(key) if key.is_some() => {
                *key = None;
                Ok(())
            }
            _ => Err(KeyError::KeyNotFound)
        }
    }

    fn insert_key(&self, key: KeyPair) -> Result<KeyId, io::Error> {
        let mut keys = self.keys.write().map_err(|_| poisoned())?;
        let res = keys.len();
        keys.push(Some(key.into()));
        Ok(KeyId(res))
    }

    fn get_key(
        &self, id: KeyId
    ) -> Result<Arc<KeyPair>, KeyError<io::Error>> {
        self.keys.read().map_err(|_| poisoned())?.get(id.0).and_then(|key| {
            key.as_ref().cloned()
        }).ok_or(KeyError::KeyNotFound)
    }
}

impl Signer for OpenSslSigner {
    type KeyId = KeyId;
    type Error = io::Error;

    fn create_key(
        &self, algorithm: PublicKeyFormat
    ) -> Result<Self::KeyId, Self::Error> {
        self.insert_key(KeyPair::new(algorithm)?)
    }

    fn get_key_info(
        &self,
        id: &Self::KeyId
    ) -> Result<PublicKey, KeyError<Self::Error>> {
        self.get_key(*id)?.get_key_info().map_err(KeyError::Signer)
    }

    fn sign<D: AsRef<[u8]> + ?Sized>(
        &self,
        key: &Self::KeyId,
        algorithm: SignatureAlgorithm,
        data: &D
    ) -> Result<Signature, SigningError<Self::Error>> {
        self.get_key(*key)?.sign(algorithm, data.as_ref()).map_err(Into::into)
    }

    fn rand(&self, target: &mut [u8]) -> Result<(), Self::Error> {
        self.rng.fill(target).map_err(|_|
            io::Error::new(io::ErrorKind::Other, "rng error")
        )
    }
}

impl Default for OpenSslSigner {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "key store lock poisoned")
}


//------------ KeyId ---------------------------------------------------------

/// This signer’s key identifier.
//
//  We wrap this in a newtype so that people won’t start mucking about with
//  the integers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct KeyId(usize);


//------------ KeyPair -------------------------------------------------------

/// A key pair kept by the signer.
struct KeyPair(PKey<Private>);

impl KeyPair {
    fn new(algorithm: PublicKeyFormat) -> Result<Self, io::Error> {
        let group = EcGroup::from_curve_name(curve_nid(algorithm))?;
        let key = EcKey::generate(&group)?;
        Ok(KeyPair(PKey::from_ec_key(key)?))
    }

    fn from_pkey(pkey: PKey<Private>) -> Result<Self, KeyLoadError> {
        if pkey.id() != Id::EC {
            return Err(KeyLoadError::UnsupportedKeyType)
        }
        let curve = pkey.ec_key()?.group().curve_name();
        match curve {
            Some(Nid::X9_62_PRIME256V1) | Some(Nid::SECP384R1) => {
                Ok(KeyPair(pkey))
            }
            _ => Err(KeyLoadError::UnsupportedKeyType)
        }
    }

    fn get_key_info(&self) -> Result<PublicKey, io::Error> {
        let der = self.0.public_key_to_der()?;
        PublicKey::decode(der.as_slice()).map_err(|err| {
            io::Error::new(io::ErrorKind::InvalidData, err.to_string())
        })
    }

    fn sign(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8]
    ) -> Result<Signature, io::Error> {
        let digest = match algorithm {
            SignatureAlgorithm::EcdsaWithSha256 => MessageDigest::sha256(),
            SignatureAlgorithm::EcdsaWithSha384 => MessageDigest::sha384(),
        };
        let mut signer = ::openssl::sign::Signer::new(digest, &self.0)?;
        signer.update(data)?;
        Ok(Signature::new(algorithm, signer.sign_to_vec()?.into()))
    }
}

fn curve_nid(algorithm: PublicKeyFormat) -> Nid {
    match algorithm {
        PublicKeyFormat::EcdsaP256 => Nid::X9_62_PRIME256V1,
        PublicKeyFormat::EcdsaP384 => Nid::SECP384R1,
    }
}


//------------ KeyLoadError --------------------------------------------------

/// A private key could not be loaded into the signer.
#[derive(Debug)]
pub enum KeyLoadError {
    /// The key data could not be parsed.
    Malformed(ErrorStack),

    /// The key is not an elliptic curve key on a supported curve.
    UnsupportedKeyType,

    /// The key could not be stored.
    Store(io::Error),
}

impl From<ErrorStack> for KeyLoadError {
    fn from(err: ErrorStack) -> Self {
        KeyLoadError::Malformed(err)
    }
}

impl fmt::Display for KeyLoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            KeyLoadError::Malformed(ref err) => {
                write!(f, "cannot parse private key: {}", err)
            }
            KeyLoadError::UnsupportedKeyType => {
                f.write_str("only ecdsa keys are supported")
            }
            KeyLoadError::Store(ref err) => err.fmt(f),
        }
    }
}

impl error::Error for KeyLoadError { }


//============ Tests =========================================================

//! Signing related implementations.
//!
//! The control-plane PKI only uses ECDSA keys on the P-256 and P-384
//! curves. Signature verification is done via _ring_ while keys are created
//! and used through the [`Signer`] trait.

pub use self::digest::{Digest, DigestAlgorithm};
pub use self::keys::{
    KeyIdentifier, KeyIdentifierError, PublicKey, PublicKeyFormat,
    SignatureVerificationError,
};
pub use self::signer::{KeyError, Signer, SigningError};
pub use self::signature::{Signature, SignatureAlgorithm};

pub mod digest;
pub mod keys;
pub mod signer;
pub mod signature;
pub mod softsigner;

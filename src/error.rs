//! Error types shared by the certificate modules.
//!
//! Checking an object happens in two steps. _Inspection_ checks that the
//! object itself follows the certificate profiles. _Verification_ checks
//! it against other objects, such as the signature against its issuer.

use std::{error, fmt};
use bcder::decode::ContentError;
use crate::crypto::SignatureVerificationError;


//------------ InspectionError -----------------------------------------------

/// An object does not follow its profile.
#[derive(Debug)]
pub struct InspectionError {
    inner: ContentError,
}

impl InspectionError {
    pub fn new(err: impl Into<ContentError>) -> Self {
        InspectionError { inner: err.into() }
    }
}

impl From<ContentError> for InspectionError {
    fn from(err: ContentError) -> InspectionError {
        InspectionError { inner: err }
    }
}

impl fmt::Display for InspectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl error::Error for InspectionError { }


//------------ VerificationError ---------------------------------------------

/// An object could not be verified against another object.
#[derive(Debug)]
pub struct VerificationError {
    inner: ContentError,
}

impl VerificationError {
    pub fn new(err: impl Into<ContentError>) -> Self {
        VerificationError { inner: err.into() }
    }
}

impl From<ContentError> for VerificationError {
    fn from(err: ContentError) -> VerificationError {
        VerificationError { inner: err }
    }
}

impl From<SignatureVerificationError> for VerificationError {
    fn from(_: SignatureVerificationError) -> Self {
        VerificationError::new("signature verification failed")
    }
}

impl From<InspectionError> for VerificationError {
    fn from(err: InspectionError) -> Self {
        VerificationError { inner: err.inner }
    }
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl error::Error for VerificationError { }

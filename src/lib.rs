//! All things control-plane PKI.
//!
//! In a SCION-style network, every AS holds a certificate chain that binds
//! its ISD-AS identifier to a signing key. The chain consists of the AS
//! certificate and the certificate of the CA that issued it. The CA
//! certificate in turn is issued by one of the root certificates listed in
//! the _trust root configuration_ (TRC) of the isolation domain.
//!
//! This crate contains the types and functionality to work with this PKI:
//!
//! * decoding and encoding of [certificates][cert], [certification
//!   requests][csr], and [TRCs][trc],
//! * verifying a [chain] against TRCs,
//! * issuing new chains according to a [CA policy][ca], and
//! * [renewing][renewal] chains over a [transport] to the CA.
extern crate bcder;
extern crate bytes;
extern crate chrono;

pub mod ca;
pub mod cert;
pub mod chain;
pub mod crypto;
pub mod csr;
pub mod error;
pub mod ia;
pub mod oid;
pub mod pem;
pub mod renewal;
pub mod transport;
pub mod trc;
pub mod x509;

mod util;

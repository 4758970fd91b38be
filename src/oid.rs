//! The object identifiers used in this crate.
//!
//! This module collects all the object indentifiers used at various places
//! in this crate in one central place. They are public so you can refer to
//! them should that ever become necessary.

use bcder::{ConstOid, Oid};


//------------ Algorithms ----------------------------------------------------

/// [RFC 4055](https://tools.ietf.org/html/rfc4055) `id-sha256`
///
/// Identifies the SHA-256 one-way hash function.
pub const SHA256: ConstOid
    = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 1]);

/// [RFC 4055](https://tools.ietf.org/html/rfc4055) `id-sha384`
pub const SHA384: ConstOid
    = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 2]);

/// [RFC 5480](https://tools.ietf.org/html/rfc5480) `id-ecPublicKey`
///
/// Identifies an elliptic curve public key. The parameters of the
/// algorithm identifier name the curve.
pub const EC_PUBLIC_KEY: ConstOid
    = Oid(&[42, 134, 72, 206, 61, 2, 1]);

/// [RFC 5480](https://tools.ietf.org/html/rfc5480) `secp256r1`
pub const SECP256R1: ConstOid
    = Oid(&[42, 134, 72, 206, 61, 3, 1, 7]);

/// [RFC 5480](https://tools.ietf.org/html/rfc5480) `secp384r1`
pub const SECP384R1: ConstOid = Oid(&[43, 129, 4, 0, 34]);

/// [RFC 5758](https://tools.ietf.org/html/rfc5758) `ecdsa-with-SHA256`
pub const ECDSA_WITH_SHA256: ConstOid
    = Oid(&[42, 134, 72, 206, 61, 4, 3, 2]);

/// [RFC 5758](https://tools.ietf.org/html/rfc5758) `ecdsa-with-SHA384`
pub const ECDSA_WITH_SHA384: ConstOid
    = Oid(&[42, 134, 72, 206, 61, 4, 3, 3]);


//------------ CMS -----------------------------------------------------------

pub const DATA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 1]);
pub const SIGNED_DATA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 2]);
pub const CONTENT_TYPE: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 3]);
pub const MESSAGE_DIGEST: ConstOid
    = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 4]);
pub const SIGNING_TIME: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 5]);

/// [RFC 2985](https://tools.ietf.org/html/rfc2985) `extensionRequest`
pub const EXTENSION_REQUEST: ConstOid
    = Oid(&[42, 134, 72, 134, 247, 13, 1, 9, 14]);


//------------ Name Attributes -----------------------------------------------

pub const AT_COMMON_NAME: ConstOid = Oid(&[85, 4, 3]); // 2 5 4 3
pub const AT_SERIAL_NUMBER: ConstOid = Oid(&[85, 4, 5]); // 2 5 4 5
pub const AT_COUNTRY_NAME: ConstOid = Oid(&[85, 4, 6]);
pub const AT_LOCALITY_NAME: ConstOid = Oid(&[85, 4, 7]);
pub const AT_STATE_OR_PROVINCE_NAME: ConstOid = Oid(&[85, 4, 8]);
pub const AT_STREET_ADDRESS: ConstOid = Oid(&[85, 4, 9]);
pub const AT_ORGANIZATION_NAME: ConstOid = Oid(&[85, 4, 10]);
pub const AT_ORGANIZATIONAL_UNIT_NAME: ConstOid = Oid(&[85, 4, 11]);
pub const AT_POSTAL_CODE: ConstOid = Oid(&[85, 4, 17]);

/// The ISD-AS name attribute, `1.3.6.1.4.1.55324.1.2.1`.
///
/// Its value is the text form of the ISD-AS identifier of the subject or
/// issuer.
pub const AT_ISD_AS: ConstOid
    = Oid(&[43, 6, 1, 4, 1, 131, 176, 28, 1, 2, 1]);


//------------ Certificate Extensions ----------------------------------------

pub const CE_AUTHORITY_KEY_IDENTIFIER: ConstOid = Oid(&[85, 29, 35]);
pub const CE_BASIC_CONSTRAINTS: ConstOid = Oid(&[85, 29, 19]);
pub const CE_EXTENDED_KEY_USAGE: ConstOid = Oid(&[85, 29, 37]);
pub const CE_KEY_USAGE: ConstOid = Oid(&[85, 29, 15]);
pub const CE_SUBJECT_KEY_IDENTIFIER: ConstOid = Oid(&[85, 29, 14]);


//------------ Key Purposes --------------------------------------------------

pub const KP_SERVER_AUTH: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 1]);
pub const KP_CLIENT_AUTH: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 2]);
pub const KP_TIME_STAMPING: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 3, 8]);

/// Key purpose of sensitive voting certificates, `1.3.6.1.4.1.55324.1.3.1`.
pub const KP_SENSITIVE_VOTING: ConstOid
    = Oid(&[43, 6, 1, 4, 1, 131, 176, 28, 1, 3, 1]);

/// Key purpose of regular voting certificates, `1.3.6.1.4.1.55324.1.3.2`.
pub const KP_REGULAR_VOTING: ConstOid
    = Oid(&[43, 6, 1, 4, 1, 131, 176, 28, 1, 3, 2]);

/// Key purpose of root certificates, `1.3.6.1.4.1.55324.1.3.3`.
pub const KP_ROOT: ConstOid
    = Oid(&[43, 6, 1, 4, 1, 131, 176, 28, 1, 3, 3]);

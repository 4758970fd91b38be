//! Renewal request and response containers.
//!
//! Both requests and responses can carry the same logical payload in two
//! encodings at once so that peers of different ages can pick the one they
//! understand:
//!
//! ```text
//! ChainRenewalRequest ::= SEQUENCE {
//!     legacy  [0] EXPLICIT OCTET STRING OPTIONAL,  -- legacy SignedMessage
//!     cms     [1] EXPLICIT OCTET STRING OPTIONAL } -- CMS ContentInfo
//!
//! ChainRenewalResponse ::= SEQUENCE {
//!     legacy  [0] EXPLICIT OCTET STRING OPTIONAL,
//!     cms     [1] EXPLICIT OCTET STRING OPTIONAL }
//! ```
//!
//! At least one of the two fields must be present.

use std::convert::Infallible;
use bcder::{decode, encode};
use bcder::{Captured, Mode, OctetString, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bytes::Bytes;
use crate::cert::Cert;
use crate::chain::{Chain, ParseChainError};


//------------ ChainRenewalRequest -------------------------------------------

/// A request for a new chain.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChainRenewalRequest {
    /// The encoded legacy signed message.
    pub legacy: Option<Bytes>,

    /// The encoded CMS signed data.
    pub cms: Option<Bytes>,
}

impl ChainRenewalRequest {
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, |cons| {
            take_pair(cons).map(|(legacy, cms)| {
                ChainRenewalRequest { legacy, cms }
            })
        })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode_pair(self.legacy.as_ref(), self.cms.as_ref())
    }

    pub fn to_captured(&self) -> Captured {
        Captured::from_values(Mode::Der, self.encode_ref())
    }
}


//------------ ChainRenewalResponse ------------------------------------------

/// A response carrying the new chain.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChainRenewalResponse {
    /// The encoded legacy signed message.
    pub legacy: Option<Bytes>,

    /// The encoded CMS signed data.
    pub cms: Option<Bytes>,
}

impl ChainRenewalResponse {
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, |cons| {
            take_pair(cons).map(|(legacy, cms)| {
                ChainRenewalResponse { legacy, cms }
            })
        })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode_pair(self.legacy.as_ref(), self.cms.as_ref())
    }

    pub fn to_captured(&self) -> Captured {
        Captured::from_values(Mode::Der, self.encode_ref())
    }
}


//------------ Helpers -------------------------------------------------------

fn take_pair<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<(Option<Bytes>, Option<Bytes>), DecodeError<S::Error>> {
    cons.take_sequence(|cons| {
        let legacy = cons.take_opt_constructed_if(
            Tag::CTX_0, OctetString::take_from
        )?.map(OctetString::into_bytes);
        let cms = cons.take_opt_constructed_if(
            Tag::CTX_1, OctetString::take_from
        )?.map(OctetString::into_bytes);
        if legacy.is_none() && cms.is_none() {
            return Err(cons.content_err(
                "neither legacy nor CMS message present"
            ))
        }
        Ok((legacy, cms))
    })
}

fn encode_pair<'a>(
    legacy: Option<&'a Bytes>, cms: Option<&'a Bytes>
) -> impl encode::Values + 'a {
    encode::sequence((
        legacy.map(|legacy| {
            encode::sequence_as(Tag::CTX_0,
                OctetString::encode_slice(legacy.as_ref())
            )
        }),
        cms.map(|cms| {
            encode::sequence_as(Tag::CTX_1,
                OctetString::encode_slice(cms.as_ref())
            )
        }),
    ))
}

/// Returns the body of a legacy response for a chain.
///
/// ```text
/// CertificateChain ::= SEQUENCE {
///     asCert  Certificate,
///     caCert  Certificate }
/// ```
pub fn encode_legacy_chain(chain: &Chain) -> Bytes {
    Captured::from_values(Mode::Der, chain.encode_ref()).into_bytes()
}

/// Parses the body of a legacy response.
pub fn decode_legacy_chain(body: &[u8]) -> Result<Chain, ParseChainError> {
    let (as_cert, ca_cert) = Mode::Der.decode(body, |cons| {
        cons.take_sequence(|cons| {
            Ok((Cert::take_from(cons)?, Cert::take_from(cons)?))
        })
    }).map_err(|err: DecodeError<Infallible>| ParseChainError::from(err))?;
    Chain::new(as_cert, ca_cert).map_err(Into::into)
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::{self, Pki};

    #[test]
    fn request_round_trip() {
        let req = ChainRenewalRequest {
            legacy: None,
            cms: Some(Bytes::from_static(b"cms")),
        };
        let decoded = ChainRenewalRequest::decode(
            req.to_captured().as_slice()
        ).unwrap();
        assert_eq!(decoded, req);

        let both = ChainRenewalResponse {
            legacy: Some(Bytes::from_static(b"legacy")),
            cms: Some(Bytes::from_static(b"cms")),
        };
        assert_eq!(
            ChainRenewalResponse::decode(both.to_captured().as_slice())
                .unwrap(),
            both
        );
    }

    #[test]
    fn reject_empty() {
        let empty = ChainRenewalRequest::default();
        assert!(
            ChainRenewalRequest::decode(empty.to_captured().as_slice())
                .is_err()
        );
    }

    #[test]
    fn legacy_chain() {
        let pki = Pki::new(test::now());
        let (_, chain) = pki.issue_as(test::as_ia());
        let body = encode_legacy_chain(&chain);
        assert_eq!(decode_legacy_chain(body.as_ref()).unwrap(), chain);
        assert!(decode_legacy_chain(&chain.to_der()).is_err());
    }
}

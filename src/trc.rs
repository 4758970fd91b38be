//! Trust Root Configurations.
//!
//! A TRC anchors trust for an ISD. It is identified by the ISD and two
//! version numbers: the _base_ number changes only with a trust reset while
//! the _serial_ number increases with every update. Each TRC carries the
//! root certificates of the ISD alongside the voting certificates used for
//! updates.
//!
//! TRCs are treated as trusted input. This module decodes them, either as
//! the bare payload or wrapped in CMS signed data, but does not check the
//! votes on them.
//!
//! The payload has the following syntax:
//!
//! ```text
//! TRCPayload ::= SEQUENCE {
//!     version             INTEGER (0),
//!     iD                  SEQUENCE {
//!         iSD                 INTEGER,
//!         serialNumber        INTEGER,
//!         baseNumber          INTEGER },
//!     validity            Validity,
//!     gracePeriod         INTEGER,
//!     noTrustReset        BOOLEAN DEFAULT FALSE,
//!     votes               SEQUENCE OF INTEGER,
//!     votingQuorum        INTEGER,
//!     coreASes            SEQUENCE OF UTF8String,
//!     authoritativeASes   SEQUENCE OF UTF8String,
//!     description         UTF8String,
//!     certificates        SEQUENCE OF Certificate }
//! ```

use std::{error, fmt};
use std::collections::BTreeMap;
use std::str::FromStr;
use bcder::{decode, encode};
use bcder::{Captured, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::encode::PrimitiveContent;
use chrono::TimeDelta;
use crate::oid;
use crate::cert::{Cert, CertType};
use crate::ia::{Asn, Isd};
use crate::x509::{Time, Validity};


//------------ TrcId ---------------------------------------------------------

/// The identifier of a TRC.
///
/// Identifiers are ordered by ISD, then base, then serial number.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TrcId {
    isd: Isd,
    base: u64,
    serial: u64,
}

impl TrcId {
    pub fn new(isd: Isd, base: u64, serial: u64) -> Self {
        TrcId { isd, base, serial }
    }

    pub fn isd(self) -> Isd {
        self.isd
    }

    pub fn base(self) -> u64 {
        self.base
    }

    pub fn serial(self) -> u64 {
        self.serial
    }

    /// Returns whether this is the identifier of a base TRC.
    pub fn is_base(self) -> bool {
        self.base == self.serial
    }

    /// Returns the identifier of the preceding TRC in the same base.
    ///
    /// Returns `None` for a base TRC.
    pub fn predecessor(self) -> Option<Self> {
        if self.is_base() {
            None
        }
        else {
            Some(TrcId::new(self.isd, self.base, self.serial - 1))
        }
    }

    fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let isd = cons.take_u64()?;
            let isd = u16::try_from(isd).map_err(|_| {
                cons.content_err("invalid ISD in TRC identifier")
            })?;
            let serial = cons.take_u64()?;
            let base = cons.take_u64()?;
            if serial < base {
                return Err(cons.content_err(
                    "TRC serial number smaller than base number"
                ))
            }
            Ok(TrcId::new(Isd::from(isd), base, serial))
        })
    }

    fn encode(self) -> impl encode::Values {
        encode::sequence((
            u64::from(self.isd.into_u16()).encode(),
            self.serial.encode(),
            self.base.encode(),
        ))
    }
}

impl fmt::Display for TrcId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ISD{}-B{}-S{}", self.isd, self.base, self.serial)
    }
}


//------------ Trc -----------------------------------------------------------

/// A Trust Root Configuration.
#[derive(Clone, Debug)]
pub struct Trc {
    id: TrcId,
    validity: Validity,
    grace_period: TimeDelta,
    no_trust_reset: bool,
    votes: Vec<u64>,
    voting_quorum: u64,
    core_ases: Vec<Asn>,
    authoritative_ases: Vec<Asn>,
    description: String,
    certificates: Vec<Cert>,
}


/// # Creation and Data Access
///
impl Trc {
    /// Creates a new TRC payload.
    ///
    /// The TRC has no grace period, no votes, a voting quorum of one, and
    /// no core or authoritative ASes. These can be changed via the setters.
    pub fn new(id: TrcId, validity: Validity, certificates: Vec<Cert>) -> Self {
        Trc {
            id,
            validity,
            grace_period: TimeDelta::zero(),
            no_trust_reset: false,
            votes: Vec::new(),
            voting_quorum: 1,
            core_ases: Vec::new(),
            authoritative_ases: Vec::new(),
            description: String::new(),
            certificates,
        }
    }

    pub fn id(&self) -> TrcId {
        self.id
    }

    pub fn validity(&self) -> Validity {
        self.validity
    }

    pub fn grace_period(&self) -> TimeDelta {
        self.grace_period
    }

    /// Sets the grace period.
    ///
    /// Only whole seconds are kept.
    pub fn set_grace_period(&mut self, grace_period: TimeDelta) {
        self.grace_period = TimeDelta::seconds(grace_period.num_seconds())
    }

    pub fn no_trust_reset(&self) -> bool {
        self.no_trust_reset
    }

    pub fn set_no_trust_reset(&mut self, value: bool) {
        self.no_trust_reset = value
    }

    /// Returns the indexes of the certificates of the predecessor that
    /// voted for this TRC.
    pub fn votes(&self) -> &[u64] {
        &self.votes
    }

    pub fn set_votes(&mut self, votes: Vec<u64>) {
        self.votes = votes
    }

    pub fn voting_quorum(&self) -> u64 {
        self.voting_quorum
    }

    pub fn set_voting_quorum(&mut self, quorum: u64) {
        self.voting_quorum = quorum
    }

    pub fn core_ases(&self) -> &[Asn] {
        &self.core_ases
    }

    pub fn set_core_ases(&mut self, ases: Vec<Asn>) {
        self.core_ases = ases
    }

    pub fn authoritative_ases(&self) -> &[Asn] {
        &self.authoritative_ases
    }

    pub fn set_authoritative_ases(&mut self, ases: Vec<Asn>) {
        self.authoritative_ases = ases
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into()
    }

    pub fn certificates(&self) -> &[Cert] {
        &self.certificates
    }

    /// Returns an iterator over the root certificates of the TRC.
    pub fn root_certs(&self) -> impl Iterator<Item = &Cert> + '_ {
        self.certs_of_type(|cert_type| cert_type == CertType::Root)
    }

    /// Returns an iterator over the sensitive and regular voting
    /// certificates of the TRC.
    pub fn voting_certs(&self) -> impl Iterator<Item = &Cert> + '_ {
        self.certs_of_type(|cert_type| {
            matches!(
                cert_type,
                CertType::SensitiveVoting | CertType::RegularVoting
            )
        })
    }

    fn certs_of_type(
        &self, op: impl Fn(CertType) -> bool + 'static
    ) -> impl Iterator<Item = &Cert> + '_ {
        self.certificates.iter().filter(move |cert| {
            cert.cert_type().map(&op).unwrap_or(false)
        })
    }

    /// Returns whether the TRC is in its grace period at the given time.
    ///
    /// This is the case if the TRC has a non-zero grace period, the time is
    /// within the TRC’s validity, and less than the grace period has passed
    /// since the start of the validity.
    pub fn in_grace_period(&self, now: Time) -> bool {
        if self.grace_period <= TimeDelta::zero() {
            return false
        }
        if !self.validity.contains(now) {
            return false
        }
        match self.validity.not_before().checked_add(self.grace_period) {
            Some(end) => now < end,
            None => true,
        }
    }
}


/// # Decoding and Encoding
///
impl Trc {
    /// Decodes a TRC.
    ///
    /// The source may contain either the bare TRC payload or the payload
    /// wrapped in a CMS signed-data content info. In the latter case, the
    /// signatures are not checked.
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, |cons| {
            cons.take_sequence(|cons| {
                match Oid::take_opt_from(cons)? {
                    Some(content_type) => {
                        if content_type != oid::SIGNED_DATA {
                            return Err(cons.content_err(
                                "TRC is not CMS signed data"
                            ))
                        }
                        let payload = cons.take_constructed_if(
                            Tag::CTX_0, Self::take_signed_data_payload
                        )?;
                        Mode::Der.decode(
                            payload, Self::take_from
                        ).map_err(DecodeError::convert)
                    }
                    None => Self::from_constructed(cons)
                }
            })
        })
    }

    /// Takes the encapsulated payload out of CMS signed data.
    ///
    /// ```text
    /// SignedData ::= SEQUENCE {
    ///     version CMSVersion,
    ///     digestAlgorithms DigestAlgorithmIdentifiers,
    ///     encapContentInfo EncapsulatedContentInfo,
    ///     certificates [0] IMPLICIT CertificateSet OPTIONAL,
    ///     crls [1] IMPLICIT RevocationInfoChoices OPTIONAL,
    ///     signerInfos SignerInfos }
    /// ```
    fn take_signed_data_payload<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<OctetString, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            cons.take_u8()?;
            cons.take_set(|cons| cons.skip_all())?;
            let payload = cons.take_sequence(|cons| {
                oid::DATA.skip_if(cons)?;
                cons.take_constructed_if(Tag::CTX_0, OctetString::take_from)
            })?;
            cons.skip_all()?;
            Ok(payload)
        })
    }

    /// Takes an encoded bare TRC payload.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.skip_u8_if(0)?;
        let id = TrcId::take_from(cons)?;
        let validity = Validity::take_from(cons)?;
        let grace_period = cons.take_u64()?;
        let grace_period = i64::try_from(grace_period).ok().and_then(
            TimeDelta::try_seconds
        ).ok_or_else(|| {
            cons.content_err("invalid TRC grace period")
        })?;
        let no_trust_reset = cons.take_opt_bool()?.unwrap_or(false);
        let votes = cons.take_sequence(|cons| {
            let mut res = Vec::new();
            while let Some(vote) = cons.take_opt_u64()? {
                res.push(vote);
            }
            Ok(res)
        })?;
        let voting_quorum = cons.take_u64()?;
        if voting_quorum == 0 {
            return Err(cons.content_err("TRC voting quorum is zero"))
        }
        if id.is_base() && !votes.is_empty() {
            return Err(cons.content_err("votes in base TRC"))
        }
        let core_ases = take_as_list(cons)?;
        let authoritative_ases = take_as_list(cons)?;
        let description = take_utf8_string(cons)?;
        let certificates = cons.take_sequence(|cons| {
            let mut res = Vec::new();
            while let Some(cert) = Cert::take_opt_from(cons)? {
                res.push(cert);
            }
            Ok(res)
        })?;
        if certificates.is_empty() {
            return Err(cons.content_err("TRC without certificates"))
        }
        Ok(Trc {
            id,
            validity,
            grace_period,
            no_trust_reset,
            votes,
            voting_quorum,
            core_ases,
            authoritative_ases,
            description,
            certificates,
        })
    }

    /// Returns an encoder for the bare TRC payload.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            0u8.encode(),
            self.id.encode(),
            self.validity.encode(),
            // Negative grace periods can’t be constructed.
            (self.grace_period.num_seconds() as u64).encode(),
            if self.no_trust_reset { Some(true.encode()) } else { None },
            encode::sequence(
                encode::iter(self.votes.iter().map(|vote| vote.encode()))
            ),
            self.voting_quorum.encode(),
            encode_as_list(&self.core_ases),
            encode_as_list(&self.authoritative_ases),
            self.description.as_bytes().encode_as(Tag::UTF8_STRING),
            encode::sequence(
                encode::iter(self.certificates.iter().map(|cert| cert.encode_ref()))
            ),
        ))
    }

    /// Returns a captured encoding of the bare TRC payload.
    pub fn to_captured(&self) -> Captured {
        Captured::from_values(Mode::Der, self.encode_ref())
    }
}

fn take_as_list<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<Vec<Asn>, DecodeError<S::Error>> {
    cons.take_sequence(|cons| {
        let mut res = Vec::new();
        while let Some(value) = take_opt_utf8_string(cons)? {
            res.push(Asn::from_str(&value).map_err(|_| {
                cons.content_err("invalid AS number in TRC")
            })?);
        }
        Ok(res)
    })
}

fn encode_as_list(list: &[Asn]) -> impl encode::Values + '_ {
    encode::sequence(
        encode::iter(list.iter().map(|asn| {
            Captured::from_values(
                Mode::Der,
                asn.to_string().as_bytes().encode_as(Tag::UTF8_STRING)
            )
        }))
    )
}

fn take_utf8_string<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<String, DecodeError<S::Error>> {
    match take_opt_utf8_string(cons)? {
        Some(value) => Ok(value),
        None => Err(cons.content_err("missing UTF8String"))
    }
}

fn take_opt_utf8_string<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<Option<String>, DecodeError<S::Error>> {
    cons.take_opt_value_if(Tag::UTF8_STRING, |content| {
        let bytes = OctetString::from_content(content)?.into_bytes();
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            content.content_err("invalid UTF8String")
        })
    })
}


//------------ TrcStore ------------------------------------------------------

/// An ordered set of trusted TRCs of a single ISD.
#[derive(Clone, Debug, Default)]
pub struct TrcStore {
    trcs: BTreeMap<TrcId, Trc>,
}

impl TrcStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from a list of TRCs.
    pub fn from_trcs(
        trcs: impl IntoIterator<Item = Trc>
    ) -> Result<Self, TrcStoreError> {
        let mut res = Self::new();
        for trc in trcs {
            res.insert(trc)?;
        }
        Ok(res)
    }

    /// Adds a TRC to the store.
    ///
    /// Fails if the TRC is for a different ISD than the TRCs already in
    /// the store. Adding a TRC with an identifier already present replaces
    /// the previous TRC.
    pub fn insert(&mut self, trc: Trc) -> Result<(), TrcStoreError> {
        if let Some(latest) = self.latest() {
            if latest.id().isd() != trc.id().isd() {
                return Err(TrcStoreError {
                    expected: latest.id().isd(),
                    found: trc.id().isd()
                })
            }
        }
        self.trcs.insert(trc.id(), trc);
        Ok(())
    }

    pub fn get(&self, id: TrcId) -> Option<&Trc> {
        self.trcs.get(&id)
    }

    /// Returns the TRC with the highest base and serial number.
    pub fn latest(&self) -> Option<&Trc> {
        self.trcs.values().next_back()
    }

    /// Returns the TRCs that are active at the given time.
    ///
    /// This is the latest TRC and, while the latest TRC is in its grace
    /// period, its immediate predecessor if present in the store.
    pub fn active(&self, now: Time) -> Vec<&Trc> {
        let latest = match self.latest() {
            Some(latest) => latest,
            None => return Vec::new()
        };
        let mut res = vec![latest];
        if latest.in_grace_period(now) {
            if let Some(prev) = latest.id().predecessor().and_then(|id| {
                self.get(id)
            }) {
                res.push(prev)
            }
        }
        res
    }

    pub fn len(&self) -> usize {
        self.trcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trcs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trc> + '_ {
        self.trcs.values()
    }
}


//------------ TrcStoreError -------------------------------------------------

/// A TRC for a different ISD was added to a store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TrcStoreError {
    expected: Isd,
    found: Isd,
}

impl fmt::Display for TrcStoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "TRC for ISD {} added to store for ISD {}",
            self.found, self.expected
        )
    }
}

impl error::Error for TrcStoreError { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::{self, Pki};

    fn secs(value: i64) -> TimeDelta {
        TimeDelta::seconds(value)
    }

    fn isd1(base: u64, serial: u64) -> TrcId {
        TrcId::new(Isd::from_u16(1), base, serial)
    }

    #[test]
    fn decode_encode() {
        let pki = Pki::new(test::now());
        let mut trc = pki.trc.clone();
        trc.set_core_ases(vec!["ff00:0:110".parse().unwrap()]);
        trc.set_authoritative_ases(vec![Asn::from(64512u32)]);
        trc.set_description("Test ISD");
        trc.set_grace_period(secs(3600));
        let der = trc.to_captured();
        let decoded = Trc::decode(der.as_slice()).unwrap();
        assert_eq!(decoded.id(), trc.id());
        assert_eq!(decoded.validity(), trc.validity());
        assert_eq!(decoded.grace_period(), secs(3600));
        assert_eq!(decoded.core_ases(), trc.core_ases());
        assert_eq!(decoded.authoritative_ases(), trc.authoritative_ases());
        assert_eq!(decoded.description(), "Test ISD");
        assert_eq!(decoded.root_certs().count(), 1);
        assert_eq!(decoded.voting_certs().count(), 0);
        assert_eq!(decoded.to_captured().as_slice(), der.as_slice());
    }

    #[test]
    fn decode_cms_wrapped() {
        let pki = Pki::new(test::now());
        let wrapped = test::wrap_trc(&pki.trc);
        let decoded = Trc::decode(wrapped.as_slice()).unwrap();
        assert_eq!(decoded.id(), pki.trc.id());
        assert_eq!(decoded.certificates(), pki.trc.certificates());
    }

    #[test]
    fn grace_period() {
        let now = test::now();
        let validity = Validity::new(now, now + secs(1000));
        let mut trc = Trc::new(isd1(1, 2), validity, vec![]);
        assert!(!trc.in_grace_period(now));
        trc.set_grace_period(secs(100));
        assert!(trc.in_grace_period(now));
        assert!(trc.in_grace_period(now + secs(99)));
        assert!(!trc.in_grace_period(now + secs(100)));
        assert!(!trc.in_grace_period(now - secs(1)));
    }

    #[test]
    fn store_active() {
        let now = test::now();
        let validity = Validity::new(now, now + secs(1000));
        let trc = |base, serial, grace| {
            let mut res = Trc::new(isd1(base, serial), validity, vec![]);
            res.set_grace_period(secs(grace));
            res
        };
        let mut store = TrcStore::from_trcs([
            trc(1, 1, 0), trc(1, 2, 100), trc(1, 3, 100)
        ]).unwrap();
        assert_eq!(store.latest().unwrap().id(), isd1(1, 3));
        let active: Vec<_> = store.active(now).iter().map(|t| t.id()).collect();
        assert_eq!(active, [isd1(1, 3), isd1(1, 2)]);
        assert_eq!(store.active(now + secs(200)).len(), 1);

        // A new base TRC has no predecessor.
        store.insert(trc(4, 4, 100)).unwrap();
        assert_eq!(store.active(now).len(), 1);

        assert!(
            store.insert(
                Trc::new(TrcId::new(Isd::from_u16(2), 1, 1), validity, vec![])
            ).is_err()
        );
    }

    #[test]
    fn reject_bad_payloads() {
        let pki = Pki::new(test::now());
        let mut trc = pki.trc.clone();
        trc.set_voting_quorum(0);
        assert!(Trc::decode(trc.to_captured().as_slice()).is_err());

        let trc = Trc::new(pki.trc.id(), pki.trc.validity(), vec![]);
        assert!(Trc::decode(trc.to_captured().as_slice()).is_err());
    }
}

//! Types common to all things X.509.

use std::{error, fmt, io, ops, str};
use std::str::FromStr;
use bcder::{decode, encode};
use bcder::{BitString, Captured, ConstOid, Mode, OctetString, Oid, Tag};
use bcder::decode::{ContentError, DecodeError, IntoSource, Source};
use bcder::encode::PrimitiveContent;
use bcder::Unsigned;
use bytes::Bytes;
use chrono::{
    Datelike, DateTime, LocalResult, SubsecRound, TimeDelta, Timelike,
    TimeZone, Utc
};
use std::convert::Infallible;
use crate::oid;
use crate::crypto::{
    PublicKey, Signature, SignatureAlgorithm, SignatureVerificationError,
    Signer,
};
use crate::error::VerificationError;
use crate::ia::Ia;
use crate::util::hex;


//------------ Functions -----------------------------------------------------

/// Returns an encoder for a single certificate extension.
pub fn encode_extension<V: encode::Values>(
    oid: &'static ConstOid,
    critical: bool,
    content: V
) -> impl encode::Values {
    encode::sequence((
        oid.encode_ref(),
        if critical {
            Some(critical.encode())
        }
        else {
            None
        },
        OctetString::encode_wrapped(Mode::Der, content)
    ))
}


//------------ Name ----------------------------------------------------------

/// A distinguished name used as the subject or issuer of a certificate.
///
/// The name is kept in its encoded form. Two names are equal if their
/// encodings are identical.
#[derive(Clone, Debug)]
pub struct Name(Captured);

impl Name {
    /// Creates a name with one relative distinguished name per attribute.
    ///
    /// The attributes are encoded in the order given. Values are encoded as
    /// a PrintableString if possible and as a UTF8String otherwise.
    pub fn from_attributes<'a>(
        attrs: impl IntoIterator<Item = (ConstOid, &'a str)>
    ) -> Self {
        let attrs: Vec<_> = attrs.into_iter().collect();
        Name(Captured::from_values(Mode::Der, encode::sequence(
            encode::iter(attrs.iter().map(|(id, value)| {
                encode::set(
                    encode::sequence((
                        id.encode_ref(),
                        value.as_bytes().encode_as(
                            if is_printable(value) {
                                Tag::PRINTABLE_STRING
                            }
                            else {
                                Tag::UTF8_STRING
                            }
                        )
                    ))
                )
            }))
        )))
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.capture(|cons| {
            cons.take_sequence(|cons| { // RDNSequence
                let mut empty_sequence = true;
                while let Some(()) = cons.take_opt_set(|cons| {
                    empty_sequence = false;
                    let mut empty_set = true;
                    while let Some(()) = cons.take_opt_sequence(|cons| {
                        empty_set = false;
                        Oid::skip_in(cons)?;
                        if cons.skip_one()?.is_none() {
                            return Err(cons.content_err(
                                "invalid name"
                            ))
                        }
                        Ok(())
                    })? { }
                    if empty_set {
                        return Err(cons.content_err(
                            "empty relative distinguished name"
                        ));
                    }
                    Ok(())
                })? { }
                if empty_sequence {
                    return Err(cons.content_err(
                        "empty distinguished name"
                    ))
                }
                Ok(())
            })
        }).map(Name)
    }

    /// Returns all attributes of the name with their string values.
    ///
    /// Attributes are returned in encoding order. Only PrintableString,
    /// UTF8String, and IA5String values are supported.
    pub fn attributes(
        &self
    ) -> Result<Vec<(Oid<Bytes>, String)>, DecodeError<Infallible>> {
        self.0.clone().decode(|cons| {
            let mut res = Vec::new();
            cons.take_sequence(|cons| {
                while let Some(()) = cons.take_opt_set(|cons| {
                    while let Some(()) = cons.take_opt_sequence(|cons| {
                        let id = Oid::take_from(cons)?;
                        let value = take_string(cons)?;
                        res.push((id, value));
                        Ok(())
                    })? { }
                    Ok(())
                })? { }
                Ok(())
            })?;
            Ok(res)
        })
    }

    /// Returns the value of the ISD-AS attribute.
    ///
    /// The attribute must be present exactly once and contain a valid
    /// ISD-AS identifier.
    pub fn ia(&self) -> Result<Ia, NameIaError> {
        let attrs = self.attributes().map_err(|_| NameIaError::Malformed)?;
        let mut res = None;
        for (id, value) in attrs {
            if id != oid::AT_ISD_AS {
                continue
            }
            if res.is_some() {
                return Err(NameIaError::Multiple)
            }
            res = Some(
                Ia::from_str(&value).map_err(|_| NameIaError::Malformed)?
            );
        }
        res.ok_or(NameIaError::Missing)
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        &self.0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

//--- PartialEq and Eq

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl Eq for Name {}

//--- Display

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let attrs = match self.attributes() {
            Ok(attrs) => attrs,
            Err(_) => return f.write_str("<unprintable name>"),
        };
        let mut first = true;
        for (id, value) in attrs {
            if first {
                first = false;
            }
            else {
                f.write_str(", ")?;
            }
            match attribute_label(&id) {
                Some(label) => write!(f, "{}={}", label, value)?,
                None => write!(f, "{}={}", id, value)?,
            }
        }
        Ok(())
    }
}

/// Returns the short label for well known name attributes.
fn attribute_label(id: &Oid<Bytes>) -> Option<&'static str> {
    [
        (oid::AT_COUNTRY_NAME, "C"),
        (oid::AT_STATE_OR_PROVINCE_NAME, "ST"),
        (oid::AT_LOCALITY_NAME, "L"),
        (oid::AT_STREET_ADDRESS, "STREET"),
        (oid::AT_POSTAL_CODE, "POSTALCODE"),
        (oid::AT_ORGANIZATION_NAME, "O"),
        (oid::AT_ORGANIZATIONAL_UNIT_NAME, "OU"),
        (oid::AT_COMMON_NAME, "CN"),
        (oid::AT_SERIAL_NUMBER, "SERIALNUMBER"),
        (oid::AT_ISD_AS, "ISD-AS"),
    ].into_iter().find_map(|(known, label)| {
        if *id == known { Some(label) } else { None }
    })
}

/// Takes a directory string value.
fn take_string<S: decode::Source>(
    cons: &mut decode::Constructed<S>
) -> Result<String, DecodeError<S::Error>> {
    cons.take_value(|tag, content| {
        if tag != Tag::PRINTABLE_STRING
            && tag != Tag::UTF8_STRING
            && tag != Tag::IA5_STRING
        {
            return Err(content.content_err(
                "unsupported string type in name"
            ))
        }
        let bytes = OctetString::from_content(content)?.into_bytes();
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            content.content_err("invalid string in name")
        })
    })
}

/// Returns whether a string can be encoded as a PrintableString.
fn is_printable(s: &str) -> bool {
    s.bytes().all(|ch| {
        ch.is_ascii_alphanumeric() || b" '()+,-./:=?".contains(&ch)
    })
}


//------------ Serial --------------------------------------------------------

/// A certificate serial number.
//
//  We encode the serial number in 20 octets left padded.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Serial([u8; 20]);

impl Serial {
    /// Creates a serial number from an octet slice.
    pub fn from_slice(s: &[u8]) -> Result<Self, SerialSliceError> {
        if s.is_empty() {
            return Err(SerialSliceError::empty())
        }
        // Strip a leading sign octet so that 20 octet values fit.
        let s = match s.split_first() {
            Some((&0, rest)) if !rest.is_empty() => rest,
            _ => s
        };
        if s.len() > 20 {
            return Err(SerialSliceError::long())
        }
        let mut res = <[u8; 20]>::default();
        res[20 - s.len()..].copy_from_slice(s);
        Self::from_array(res)
    }

    /// Creates a serial number from an array.
    pub fn from_array(array: [u8; 20]) -> Result<Self, SerialSliceError> {
        // The left-most bit must be 0 to indicate an unsigned integer.
        if array[0] & 0x80 != 0 {
            return Err(SerialSliceError::long())
        }
        Ok(Self(array))
    }

    /// Creates a random new serial number.
    ///
    /// The serial has 159 bits of randomness taken from the signer.
    pub fn random<S: Signer>(signer: &S) -> Result<Self, S::Error> {
        let mut res = <[u8; 20]>::default();
        signer.rand(&mut res)?;
        res[0] &= 0x7F;
        Ok(Self(res))
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        Unsigned::take_from(cons).and_then(|s| {
            Self::from_slice(s.as_ref()).map_err(|err| cons.content_err(err))
        })
    }

    /// Returns the serial number as minimal big-endian octets.
    ///
    /// Leading zero octets are removed. A serial number of zero results in
    /// an empty slice.
    pub fn as_minimal_slice(&self) -> &[u8] {
        let start = self.0.iter().position(|&ch| ch != 0).unwrap_or(20);
        &self.0[start..]
    }

    /// Returns the minimal octets as a string of lowercase hex digits.
    pub fn to_hex(&self) -> String {
        hex::encode_string(self.as_minimal_slice())
    }

    /// Returns the index of the first octet to encode.
    fn start(self) -> usize {
        let start = self.0.iter().position(|&ch| ch != 0).unwrap_or(19);
        if self.0[start] & 0x80 != 0 {
            start - 1
        }
        else {
            start
        }
    }
}

//--- From

impl From<u64> for Serial {
    fn from(value: u64) -> Self {
        let mut res = <[u8; 20]>::default();
        res[12..].copy_from_slice(&value.to_be_bytes());
        Serial(res)
    }
}

impl From<Serial> for [u8; 20] {
    fn from(serial: Serial) -> Self {
        serial.0
    }
}

//--- Display and Debug

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        hex::write(self.as_minimal_slice(), f)
    }
}

impl fmt::Debug for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Serial({})", self)
    }
}

//--- PrimitiveContent

impl PrimitiveContent for Serial {
    const TAG: Tag = Tag::INTEGER;

    fn encoded_len(&self, _mode: Mode) -> usize {
        20 - self.start()
    }

    fn write_encoded<W: io::Write>(
        &self,
        _mode: Mode,
        target: &mut W
    ) -> Result<(), io::Error> {
        target.write_all(&self.0[self.start()..])
    }
}


//------------ SignedData ----------------------------------------------------

/// The outer structure of certificates and certification requests.
///
/// ```text
/// SEQUENCE {
///     tbsData             ANY,
///     signatureAlgorithm  AlgorithmIdentifier,
///     signatureValue      BIT STRING }
/// ```
#[derive(Clone, Debug)]
pub struct SignedData {
    data: Captured,
    signature: Signature,
}

impl SignedData {
    pub fn new(data: Captured, signature: Signature) -> Self {
        Self { data, signature }
    }

    /// Signs the encoded data with the given key.
    pub fn sign<S: Signer>(
        data: Captured,
        algorithm: SignatureAlgorithm,
        signer: &S,
        key: &S::KeyId,
    ) -> Result<Self, crate::crypto::SigningError<S::Error>> {
        let signature = signer.sign(key, algorithm, &data)?;
        Ok(Self { data, signature })
    }

    pub fn data(&self) -> &Captured {
        &self.data
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(Self::from_constructed)
    }

    pub fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let data = cons.capture_one()?;
        let algorithm = SignatureAlgorithm::x509_take_from(cons)?;
        let bits = BitString::take_from(cons)?;
        if bits.unused() != 0 {
            return Err(cons.content_err("invalid signature value"))
        }
        Ok(SignedData {
            data,
            signature: Signature::new(algorithm, bits.octet_bytes()),
        })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            &self.data,
            self.signature.algorithm().x509_encode(),
            BitString::new(0, self.signature.value().clone()).encode(),
        ))
    }

    pub fn verify_signature(
        &self,
        public_key: &PublicKey
    ) -> Result<(), SignatureVerificationError> {
        public_key.verify(self.data.as_ref(), &self.signature)
    }
}

//--- PartialEq and Eq

impl PartialEq for SignedData {
    fn eq(&self, other: &Self) -> bool {
        self.data.as_slice() == other.data.as_slice() &&
            self.signature == other.signature
    }
}

impl Eq for SignedData {}


//------------ Time ----------------------------------------------------------

/// A point in time with second precision as used by X.509.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Time(DateTime<Utc>);

impl Time {
    pub fn new(dt: DateTime<Utc>) -> Self {
        Time(dt)
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Creates a time from a Unix timestamp in seconds.
    pub fn from_timestamp(secs: i64) -> Option<Self> {
        DateTime::from_timestamp(secs, 0).map(Time)
    }

    /// Returns the time with the sub-second part removed.
    ///
    /// This is the precision that survives encoding.
    pub fn trunc(self) -> Self {
        Time(self.0.trunc_subsecs(0))
    }

    /// Adds a duration, returning `None` if the result is out of range.
    pub fn checked_add(self, duration: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(duration).map(Time)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_primitive(|tag, prim| {
            let year = match tag {
                Tag::UTC_TIME => {
                    // RFC 5280 requires the format YYMMDDHHMMSSZ
                    let year = read_two_char(prim)? as i32;
                    if year >= 50 { year + 1900 } else { year + 2000 }
                }
                Tag::GENERALIZED_TIME => {
                    // RFC 5280 requires the format YYYYMMDDHHMMSSZ
                    read_four_char(prim)? as i32
                }
                _ => {
                    return Err(prim.content_err("malformed time value"))
                }
            };
            let res = (
                year,
                read_two_char(prim)?,
                read_two_char(prim)?,
                read_two_char(prim)?,
                read_two_char(prim)?,
                read_two_char(prim)?,
            );
            if prim.take_u8()? != b'Z' {
                return Err(prim.content_err("malformed time value"))
            }
            Self::from_parts(res).map_err(|err| prim.content_err(err))
        })
    }

    fn from_parts(
        parts: (i32, u32, u32, u32, u32, u32)
    ) -> Result<Self, ContentError> {
        match Utc.with_ymd_and_hms(
            parts.0, parts.1, parts.2, parts.3, parts.4, parts.5
        ) {
            LocalResult::Single(dt) => Ok(Time(dt)),
            _ => Err(ContentError::from_static("malformed time value"))
        }
    }

    pub fn verify_not_before(
        &self,
        now: Time
    ) -> Result<(), ValidityPeriodError> {
        if now.0 < self.0 {
            Err(ValidityPeriodError::too_new())
        }
        else {
            Ok(())
        }
    }

    pub fn verify_not_after(
        &self,
        now: Time
    ) -> Result<(), ValidityPeriodError> {
        if now.0 > self.0 {
            Err(ValidityPeriodError::too_old())
        }
        else {
            Ok(())
        }
    }

    pub fn encode_utc_time(self) -> impl encode::Values {
        UtcTime(self).encode()
    }

    pub fn encode_generalized_time(self) -> impl encode::Values {
        GeneralizedTime(self).encode()
    }

    /// Encodes as UTCTime through 2049 and as GeneralizedTime after.
    pub fn encode_varied(self) -> impl encode::Values {
        if self.year() < 1950 || self.year() > 2049 {
            (None, Some(self.encode_generalized_time()))
        }
        else {
            (Some(self.encode_utc_time()), None)
        }
    }
}

//--- Deref and AsRef

impl ops::Deref for Time {
    type Target = DateTime<Utc>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<DateTime<Utc>> for Time {
    fn as_ref(&self) -> &DateTime<Utc> {
        &self.0
    }
}

//--- From

impl From<DateTime<Utc>> for Time {
    fn from(time: DateTime<Utc>) -> Self {
        Time(time)
    }
}

impl From<Time> for DateTime<Utc> {
    fn from(time: Time) -> Self {
        time.0
    }
}

//--- Add and Sub

impl ops::Add<TimeDelta> for Time {
    type Output = Self;

    fn add(self, duration: TimeDelta) -> Self::Output {
        Self::new(self.0 + duration)
    }
}

impl ops::Sub<TimeDelta> for Time {
    type Output = Self;

    fn sub(self, duration: TimeDelta) -> Self::Output {
        Self::new(self.0 - duration)
    }
}

//--- Display

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}


fn read_two_char<S: decode::Source>(
    source: &mut S
) -> Result<u32, DecodeError<S::Error>> {
    let mut s = [0u8; 2];
    s[0] = source.take_u8()?;
    s[1] = source.take_u8()?;
    read_digits(source, &s)
}

fn read_four_char<S: decode::Source>(
    source: &mut S
) -> Result<u32, DecodeError<S::Error>> {
    let mut s = [0u8; 4];
    for ch in &mut s {
        *ch = source.take_u8()?;
    }
    read_digits(source, &s)
}

fn read_digits<S: decode::Source>(
    source: &S, s: &[u8]
) -> Result<u32, DecodeError<S::Error>> {
    if !s.iter().all(u8::is_ascii_digit) {
        return Err(source.content_err("malformed time value"))
    }
    str::from_utf8(s).ok().and_then(|s| u32::from_str(s).ok()).ok_or_else(|| {
        source.content_err("malformed time value")
    })
}


//------------ UtcTime -------------------------------------------------------

pub struct UtcTime(Time);

impl PrimitiveContent for UtcTime {
    const TAG: Tag = Tag::UTC_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        13 // yyMMddhhmmssZ
    }

    fn write_encoded<W: io::Write>(
        &self, _: Mode, target: &mut W
    ) -> Result<(), io::Error> {
        write!(
            target, "{:02}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year() % 100, self.0.month(), self.0.day(),
            self.0.hour(), self.0.minute(), self.0.second()
        )
    }
}


//------------ GeneralizedTime -----------------------------------------------

pub struct GeneralizedTime(Time);

impl PrimitiveContent for GeneralizedTime {
    const TAG: Tag = Tag::GENERALIZED_TIME;

    fn encoded_len(&self, _: Mode) -> usize {
        15 // yyyyMMddhhmmssZ
    }

    fn write_encoded<W: io::Write>(
        &self, _: Mode, target: &mut W
    ) -> Result<(), io::Error> {
        write!(
            target, "{:04}{:02}{:02}{:02}{:02}{:02}Z",
            self.0.year(), self.0.month(), self.0.day(),
            self.0.hour(), self.0.minute(), self.0.second()
        )
    }
}


//------------ Validity ------------------------------------------------------

/// A closed time interval.
#[derive(Clone, Debug, Copy, Eq, Hash, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Validity {
    not_before: Time,
    not_after: Time,
}

impl Validity {
    pub fn new(not_before: Time, not_after: Time) -> Self {
        Validity { not_before, not_after }
    }

    /// Creates a validity starting at `start` and lasting `duration`.
    ///
    /// Both ends are truncated to whole seconds. Returns `None` if the end
    /// is beyond the range of time values.
    pub fn from_duration(start: Time, duration: TimeDelta) -> Option<Self> {
        let not_before = start.trunc();
        not_before.checked_add(duration).map(|not_after| {
            Validity::new(not_before, not_after.trunc())
        })
    }

    pub fn not_before(self) -> Time {
        self.not_before
    }

    pub fn not_after(self) -> Time {
        self.not_after
    }

    /// Returns whether this validity covers the other one completely.
    ///
    /// Both ends are inclusive, so a validity covers itself.
    pub fn covers(self, other: Validity) -> bool {
        self.not_before <= other.not_before
            && other.not_after <= self.not_after
    }

    /// Returns whether the given time is inside the validity.
    pub fn contains(self, time: Time) -> bool {
        self.not_before <= time && time <= self.not_after
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            Ok(Validity::new(
                Time::take_from(cons)?,
                Time::take_from(cons)?,
            ))
        })
    }

    pub fn verify_at(self, now: Time) -> Result<(), ValidityPeriodError> {
        self.not_before.verify_not_before(now)?;
        self.not_after.verify_not_after(now)?;
        Ok(())
    }

    pub fn encode(self) -> impl encode::Values {
        encode::sequence((
            self.not_before.encode_varied(),
            self.not_after.encode_varied(),
        ))
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}]", self.not_before, self.not_after)
    }
}


//------------ NameIaError ---------------------------------------------------

/// A name does not carry a usable ISD-AS attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NameIaError {
    Missing,
    Multiple,
    Malformed,
}

impl From<NameIaError> for ContentError {
    fn from(err: NameIaError) -> Self {
        ContentError::from_static(match err {
            NameIaError::Missing => "ISD-AS attribute missing",
            NameIaError::Multiple => "multiple ISD-AS attributes",
            NameIaError::Malformed => "invalid ISD-AS attribute",
        })
    }
}

impl fmt::Display for NameIaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            NameIaError::Missing => "ISD-AS attribute missing",
            NameIaError::Multiple => "multiple ISD-AS attributes",
            NameIaError::Malformed => "invalid ISD-AS attribute",
        })
    }
}

impl error::Error for NameIaError { }


//------------ SerialSliceError ----------------------------------------------

/// A serial number’s slice is empty or too long.
#[derive(Clone, Copy, Debug)]
pub struct SerialSliceError(SerialSliceErrorKind);

#[derive(Clone, Copy, Debug)]
enum SerialSliceErrorKind {
    Empty,
    Long,
}

impl SerialSliceError {
    fn empty() -> Self {
        SerialSliceError(SerialSliceErrorKind::Empty)
    }

    fn long() -> Self {
        SerialSliceError(SerialSliceErrorKind::Long)
    }
}

impl From<SerialSliceError> for ContentError {
    fn from(err: SerialSliceError) -> Self {
        ContentError::from_static(match err.0 {
            SerialSliceErrorKind::Empty => "empty serial number",
            SerialSliceErrorKind::Long => "serial number longer than 20 bytes"
        })
    }
}

impl fmt::Display for SerialSliceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(
            match self.0 {
                SerialSliceErrorKind::Empty => "empty serial number",
                SerialSliceErrorKind::Long => {
                    "serial number longer than 20 bytes"
                }
            }
        )
    }
}

impl error::Error for SerialSliceError { }


//------------ ValidityPeriodError -------------------------------------------

/// An object is outside of its period of validity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValidityPeriodError {
    /// Is the object too new?
    ///
    /// It is too old otherwise.
    too_new: bool,
}

impl ValidityPeriodError {
    fn too_new() -> Self {
        ValidityPeriodError { too_new: true }
    }

    fn too_old() -> Self {
        ValidityPeriodError { too_new: false }
    }

    pub fn is_too_new(self) -> bool {
        self.too_new
    }
}

impl From<ValidityPeriodError> for VerificationError {
    fn from(err: ValidityPeriodError) -> Self {
        VerificationError::new(
            if err.too_new {
                "certificate is not yet valid"
            }
            else {
                "certificate has expired"
            }
        )
    }
}

impl fmt::Display for ValidityPeriodError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(
            if self.too_new {
                "object is not yet valid"
            }
            else {
                "object has expired"
            }
        )
    }
}

impl error::Error for ValidityPeriodError { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use bcder::encode::Values;

    fn time(secs: i64) -> Time {
        Time::from_timestamp(secs).unwrap()
    }

    #[test]
    fn validity_covers() {
        let outer = Validity::new(time(100), time(200));
        assert!(outer.covers(outer));
        assert!(outer.covers(Validity::new(time(100), time(150))));
        assert!(outer.covers(Validity::new(time(150), time(200))));
        assert!(!outer.covers(Validity::new(time(99), time(150))));
        assert!(!outer.covers(Validity::new(time(150), time(201))));
        assert!(!outer.covers(Validity::new(time(50), time(250))));
    }

    #[test]
    fn validity_contains() {
        let validity = Validity::new(time(100), time(200));
        assert!(validity.contains(time(100)));
        assert!(validity.contains(time(200)));
        assert!(!validity.contains(time(201)));
        assert!(validity.verify_at(time(150)).is_ok());
        assert!(validity.verify_at(time(99)).unwrap_err().is_too_new());
        assert!(!validity.verify_at(time(201)).unwrap_err().is_too_new());
    }

    #[test]
    fn validity_decode_then_encode() {
        let validity = Validity::new(
            Time::new(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            Time::new(Utc.with_ymd_and_hms(2051, 6, 7, 8, 9, 10).unwrap()),
        );
        let encoded = validity.encode().to_captured(Mode::Der);
        // The first time is a UTCTime, the second one a GeneralizedTime.
        assert_eq!(encoded.as_slice()[2], 0x17);
        assert_eq!(encoded.as_slice()[2 + 15], 0x18);
        let decoded = Mode::Der.decode(
            encoded.as_slice(), Validity::take_from
        ).unwrap();
        assert_eq!(decoded, validity);
    }

    #[test]
    fn from_duration_truncates() {
        let start = Time::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        ) + TimeDelta::try_milliseconds(700).unwrap();
        let validity = Validity::from_duration(
            start, TimeDelta::try_days(3).unwrap()
        ).unwrap();
        assert_eq!(validity.not_before().timestamp_subsec_nanos(), 0);
        assert_eq!(
            validity.not_after().timestamp() - validity.not_before().timestamp(),
            3 * 86400
        );
    }

    #[test]
    fn from_duration_out_of_range() {
        let start = Time::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
        );
        assert!(Validity::from_duration(
            start, TimeDelta::try_days(200_000_000).unwrap()
        ).is_none());
        assert!(start.checked_add(
            TimeDelta::try_days(200_000_000).unwrap()
        ).is_none());
        assert_eq!(
            start.checked_add(TimeDelta::try_seconds(1).unwrap()),
            Some(start + TimeDelta::try_seconds(1).unwrap())
        );
    }

    #[test]
    fn serial_hex() {
        let serial = Serial::from_slice(b"\x1a\x2b").unwrap();
        assert_eq!(serial.to_hex(), "1a2b");
        assert_eq!(serial.to_string(), "1a2b");
        assert_eq!(Serial::from(10u64).to_hex(), "0a");
        assert_eq!(Serial::default().to_hex(), "");
    }

    #[test]
    fn serial_encode() {
        let serial = Serial::from_slice(b"\x00\x80\x01").unwrap();
        let encoded = serial.encode().to_captured(Mode::Der);
        assert_eq!(encoded.as_slice(), b"\x02\x03\x00\x80\x01");
        let decoded = Mode::Der.decode(
            encoded.as_slice(), Serial::take_from
        ).unwrap();
        assert_eq!(decoded, serial);
        assert!(Serial::from_slice(b"").is_err());
        assert!(Serial::from_slice(&[1u8; 21]).is_err());
    }

    #[test]
    fn name_ia() {
        let name = Name::from_attributes([
            (oid::AT_COMMON_NAME, "1-ff00:0:110 AS Certificate"),
            (oid::AT_ISD_AS, "1-ff00:0:110"),
        ]);
        assert_eq!(name.ia().unwrap().to_string(), "1-ff00:0:110");
        assert_eq!(
            name.to_string(),
            "CN=1-ff00:0:110 AS Certificate, ISD-AS=1-ff00:0:110"
        );

        let name = Name::from_attributes([(oid::AT_COMMON_NAME, "x")]);
        assert_eq!(name.ia(), Err(NameIaError::Missing));

        let name = Name::from_attributes([
            (oid::AT_ISD_AS, "1-ff00:0:110"),
            (oid::AT_ISD_AS, "1-ff00:0:111"),
        ]);
        assert_eq!(name.ia(), Err(NameIaError::Multiple));

        let name = Name::from_attributes([(oid::AT_ISD_AS, "garbage")]);
        assert_eq!(name.ia(), Err(NameIaError::Malformed));
    }

    #[test]
    fn name_string_types() {
        let name = Name::from_attributes([
            (oid::AT_ORGANIZATION_NAME, "Zürich AG"),
            (oid::AT_COUNTRY_NAME, "CH"),
        ]);
        let decoded = Mode::Der.decode(
            name.as_slice(), Name::take_from
        ).unwrap();
        assert_eq!(decoded, name);
        let attrs = name.attributes().unwrap();
        assert_eq!(attrs[0].1, "Zürich AG");
        assert_eq!(attrs[1].1, "CH");
    }

    #[test]
    fn empty_name_rejected() {
        assert!(
            Mode::Der.decode(b"\x30\x00".as_ref(), Name::take_from).is_err()
        );
    }
}

//! Isolation domain and autonomous system identifiers.
//!
//! Every AS is identified by the pair of the isolation domain (ISD) it
//! belongs to and its AS number. The combination is called an ISD-AS and
//! written as `<isd>-<as>`, for instance `1-ff00:0:110`.

use std::{error, fmt};
use std::str::FromStr;


//------------ Isd -----------------------------------------------------------

/// An isolation domain number.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Isd(u16);

impl Isd {
    pub const fn from_u16(value: u16) -> Self {
        Isd(value)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }
}

impl From<u16> for Isd {
    fn from(value: u16) -> Self {
        Isd(value)
    }
}

impl FromStr for Isd {
    type Err = ParseIaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u16::from_str(s).map(Isd).map_err(|_| ParseIaError::Isd)
    }
}

impl fmt::Display for Isd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}


//------------ Asn -----------------------------------------------------------

/// An AS number.
///
/// AS numbers are 48 bit wide. Those that fit into 32 bits are the
/// traditional BGP AS numbers and are written in decimal. All others are
/// written as three groups of 16 bit in hex separated by colons.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Asn(u64);

impl Asn {
    /// The largest AS number.
    pub const MAX: Asn = Asn((1 << 48) - 1);

    /// The largest AS number written in decimal notation.
    const MAX_BGP: u64 = u32::MAX as u64;

    /// Creates an AS number from a `u64`.
    ///
    /// Returns `None` if the value is wider than 48 bits.
    pub const fn from_u64(value: u64) -> Option<Self> {
        if value > Self::MAX.0 {
            None
        }
        else {
            Some(Asn(value))
        }
    }

    pub const fn into_u64(self) -> u64 {
        self.0
    }

    /// Returns a value that displays the AS number for use in file names.
    ///
    /// This is the regular text form with colons replaced by underscores.
    pub fn file_fmt(self) -> FileFmt {
        FileFmt(self)
    }

    fn parse_group(s: &str) -> Result<u64, ParseIaError> {
        if s.is_empty() || s.len() > 4 {
            return Err(ParseIaError::Asn)
        }
        u64::from_str_radix(s, 16).map_err(|_| ParseIaError::Asn)
    }

    fn write(self, sep: char, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0 <= Self::MAX_BGP {
            write!(f, "{}", self.0)
        }
        else {
            write!(f, "{:x}{}{:x}{}{:x}",
                (self.0 >> 32) & 0xffff, sep,
                (self.0 >> 16) & 0xffff, sep,
                self.0 & 0xffff
            )
        }
    }
}

impl From<u32> for Asn {
    fn from(value: u32) -> Self {
        Asn(value.into())
    }
}

impl FromStr for Asn {
    type Err = ParseIaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.contains(':') {
            let value = u64::from_str(s).map_err(|_| ParseIaError::Asn)?;
            if value > Self::MAX_BGP {
                return Err(ParseIaError::Asn)
            }
            return Ok(Asn(value))
        }
        let mut res = 0;
        let mut groups = 0;
        for group in s.split(':') {
            res = (res << 16) | Self::parse_group(group)?;
            groups += 1;
        }
        if groups != 3 {
            return Err(ParseIaError::Asn)
        }
        Ok(Asn(res))
    }
}

impl fmt::Display for Asn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write(':', f)
    }
}


//------------ FileFmt -------------------------------------------------------

/// Displays an AS number in a form usable in file names.
#[derive(Clone, Copy, Debug)]
pub struct FileFmt(Asn);

impl fmt::Display for FileFmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.write('_', f)
    }
}


//------------ Ia ------------------------------------------------------------

/// An ISD-AS identifier.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Ia {
    isd: Isd,
    asn: Asn,
}

impl Ia {
    pub const fn new(isd: Isd, asn: Asn) -> Self {
        Ia { isd, asn }
    }

    pub fn isd(self) -> Isd {
        self.isd
    }

    pub fn asn(self) -> Asn {
        self.asn
    }

    /// Returns whether both the ISD and the AS number are zero.
    pub fn is_zero(self) -> bool {
        self.isd.0 == 0 && self.asn.0 == 0
    }
}

impl FromStr for Ia {
    type Err = ParseIaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (isd, asn) = s.split_once('-').ok_or(ParseIaError::Separator)?;
        Ok(Ia {
            isd: Isd::from_str(isd)?,
            asn: Asn::from_str(asn)?,
        })
    }
}

impl fmt::Display for Ia {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.isd, self.asn)
    }
}


//--- Serialize and Deserialize

impl serde::Serialize for Ia {
    fn serialize<S: serde::Serializer>(
        &self, serializer: S
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Ia {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D
    ) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ia::from_str(&s).map_err(serde::de::Error::custom)
    }
}


//------------ ParseIaError --------------------------------------------------

/// A string does not contain a valid ISD-AS identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseIaError {
    Separator,
    Isd,
    Asn,
}

impl fmt::Display for ParseIaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ParseIaError::Separator => "missing ISD-AS separator",
            ParseIaError::Isd => "invalid ISD number",
            ParseIaError::Asn => "invalid AS number",
        })
    }
}

impl error::Error for ParseIaError { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_and_display() {
        let ia = Ia::from_str("1-ff00:0:110").unwrap();
        assert_eq!(ia.isd(), Isd::from(1));
        assert_eq!(ia.asn().into_u64(), 0xff00_0000_0110);
        assert_eq!(ia.to_string(), "1-ff00:0:110");

        let ia = Ia::from_str("64-559").unwrap();
        assert_eq!(ia.asn(), Asn::from(559));
        assert_eq!(ia.to_string(), "64-559");

        // Small values in colon notation are shown in decimal.
        assert_eq!(Ia::from_str("1-0:0:1").unwrap().to_string(), "1-1");
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Ia::from_str("1ff00:0:110"), Err(ParseIaError::Separator));
        assert_eq!(Ia::from_str("65536-1"), Err(ParseIaError::Isd));
        assert_eq!(Ia::from_str("1-ff00:0"), Err(ParseIaError::Asn));
        assert_eq!(Ia::from_str("1-1:2:3:4"), Err(ParseIaError::Asn));
        assert_eq!(Ia::from_str("1-10000:0:0"), Err(ParseIaError::Asn));
        assert_eq!(Ia::from_str("1-4294967296"), Err(ParseIaError::Asn));
        assert_eq!(Ia::from_str("1-"), Err(ParseIaError::Asn));
    }

    #[test]
    fn file_fmt() {
        let ia = Ia::from_str("1-ff00:0:110").unwrap();
        assert_eq!(ia.asn().file_fmt().to_string(), "ff00_0_110");
        assert_eq!(Asn::from(42).file_fmt().to_string(), "42");
    }

    #[test]
    fn zero() {
        assert!(Ia::default().is_zero());
        assert!(Ia::from_str("0-0").unwrap().is_zero());
        assert!(!Ia::from_str("0-1").unwrap().is_zero());
    }

    #[test]
    fn serde() {
        let ia: Ia = serde_json::from_str("\"1-ff00:0:110\"").unwrap();
        assert_eq!(serde_json::to_string(&ia).unwrap(), "\"1-ff00:0:110\"");
    }

    #[test]
    fn max() {
        assert!(Asn::from_u64(1 << 48).is_none());
        assert_eq!(Asn::MAX.to_string(), "ffff:ffff:ffff");
    }
}

//! Subject templates.
//!
//! Instead of copying the subject of the current AS certificate, the
//! subject of a renewed certificate can be described by a JSON template:
//!
//! ```json
//! {
//!     "common_name": "1-ff00:0:110 AS Certificate",
//!     "country": "CH",
//!     "isd_as": "1-ff00:0:110"
//! }
//! ```
//!
//! All fields are optional strings except for `isd_as` which must be
//! present and not zero.

use std::{error, fmt, fs, io};
use std::path::Path;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::oid;
use crate::ia::Ia;
use crate::x509::Name;


//------------ SubjectTemplate -----------------------------------------------

/// A template for the subject of a certificate.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    pub isd_as: Ia,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
}

impl SubjectTemplate {
    /// Creates a template that only contains the ISD-AS.
    pub fn new(isd_as: Ia) -> Self {
        SubjectTemplate {
            common_name: None,
            country: None,
            isd_as,
            locality: None,
            organization: None,
            organizational_unit: None,
            postal_code: None,
            province: None,
            serial_number: None,
            street_address: None,
        }
    }

    /// Parses a template from a reader.
    pub fn from_reader(reader: impl io::Read) -> Result<Self, TemplateError> {
        serde_json::from_reader(reader).map_err(TemplateError::Json)
            .and_then(Self::checked)
    }

    /// Loads a template from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let file = fs::File::open(path).map_err(TemplateError::Io)?;
        Self::from_reader(io::BufReader::new(file))
    }

    fn checked(self) -> Result<Self, TemplateError> {
        if self.isd_as.is_zero() {
            Err(TemplateError::ZeroIa)
        }
        else {
            Ok(self)
        }
    }

    /// Converts the template into a distinguished name.
    pub fn to_name(&self) -> Name {
        let ia = self.isd_as.to_string();
        Name::from_attributes(
            [
                (oid::AT_COUNTRY_NAME, self.country.as_deref()),
                (oid::AT_STATE_OR_PROVINCE_NAME, self.province.as_deref()),
                (oid::AT_LOCALITY_NAME, self.locality.as_deref()),
                (oid::AT_STREET_ADDRESS, self.street_address.as_deref()),
                (oid::AT_POSTAL_CODE, self.postal_code.as_deref()),
                (oid::AT_ORGANIZATION_NAME, self.organization.as_deref()),
                (
                    oid::AT_ORGANIZATIONAL_UNIT_NAME,
                    self.organizational_unit.as_deref()
                ),
                (oid::AT_COMMON_NAME, self.common_name.as_deref()),
                (oid::AT_SERIAL_NUMBER, self.serial_number.as_deref()),
                (oid::AT_ISD_AS, Some(ia.as_str())),
            ].into_iter().filter_map(|(id, value)| value.map(|v| (id, v)))
        )
    }
}

impl FromStr for SubjectTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s).map_err(TemplateError::Json)
            .and_then(Self::checked)
    }
}


//------------ TemplateError -------------------------------------------------

/// A subject template could not be loaded.
#[derive(Debug)]
pub enum TemplateError {
    /// Reading the file failed.
    Io(io::Error),

    /// The template is not valid JSON or lacks the ISD-AS.
    Json(serde_json::Error),

    /// The template contains the zero ISD-AS.
    ZeroIa,
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TemplateError::Io(ref err) => err.fmt(f),
            TemplateError::Json(ref err) => {
                write!(f, "invalid subject template: {}", err)
            }
            TemplateError::ZeroIa => f.write_str("isd_as required in template"),
        }
    }
}

impl error::Error for TemplateError { }


//============ Tests =========================================================

//! Numeric (arbitrary-precision decimal) conversions.
//!
//! Postgres `numeric` allows `NaN`, which `BigDecimal` cannot represent, so
//! the value type is a two-variant wrapper. BigDecimal keeps the scale, so
//! "1.20" survives a round trip with its trailing zero.

use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::error::{Error, Result};

use super::{FromPgText, ToPgText};

/// A Postgres numeric value.
#[derive(Debug, Clone, PartialEq)]
pub enum PgNumeric {
    NotANumber,
    Value(BigDecimal),
}

impl PgNumeric {
    /// The contained decimal, or `None` for NaN.
    pub fn as_bigdecimal(&self) -> Option<&BigDecimal> {
        match self {
            PgNumeric::NotANumber => None,
            PgNumeric::Value(d) => Some(d),
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, PgNumeric::NotANumber)
    }
}

impl From<BigDecimal> for PgNumeric {
    fn from(value: BigDecimal) -> Self {
        PgNumeric::Value(value)
    }
}

impl FromPgText for PgNumeric {
    fn from_pg_text(s: &str) -> Result<Self> {
        if s == "NaN" {
            return Ok(PgNumeric::NotANumber);
        }
        BigDecimal::from_str(s)
            .map(PgNumeric::Value)
            .map_err(|e| Error::conversion("PgNumeric", s, format!("{}", e)))
    }
}

impl ToPgText for PgNumeric {
    fn to_pg_text(&self) -> Option<String> {
        Some(match self {
            PgNumeric::NotANumber => "NaN".to_string(),
            PgNumeric::Value(d) => d.to_string(),
        })
    }
}

impl FromPgText for BigDecimal {
    fn from_pg_text(s: &str) -> Result<Self> {
        BigDecimal::from_str(s).map_err(|e| Error::conversion("BigDecimal", s, format!("{}", e)))
    }
}

impl ToPgText for BigDecimal {
    fn to_pg_text(&self) -> Option<String> {
        Some(self.to_string())
    }
}

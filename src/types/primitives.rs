//! Primitive type conversions (bool, integers, floats).

use crate::error::{Error, Result};

use super::{FromPgText, ToPgText};

impl FromPgText for bool {
    fn from_pg_text(s: &str) -> Result<Self> {
        match s {
            "t" | "true" | "TRUE" | "T" | "1" => Ok(true),
            "f" | "false" | "FALSE" | "F" | "0" => Ok(false),
            _ => Err(Error::conversion("bool", s, "not a boolean literal")),
        }
    }
}

impl ToPgText for bool {
    fn to_pg_text(&self) -> Option<String> {
        Some(if *self { "t" } else { "f" }.to_string())
    }
}

macro_rules! impl_integer {
    ($t:ty, $name:expr) => {
        impl FromPgText for $t {
            fn from_pg_text(s: &str) -> Result<Self> {
                s.parse()
                    .map_err(|e| Error::conversion($name, s, format!("{}", e)))
            }
        }

        impl ToPgText for $t {
            fn to_pg_text(&self) -> Option<String> {
                Some(self.to_string())
            }
        }
    };
}

impl_integer!(i16, "i16");
impl_integer!(i32, "i32");
impl_integer!(i64, "i64");

macro_rules! impl_float {
    ($t:ty, $name:expr) => {
        impl FromPgText for $t {
            fn from_pg_text(s: &str) -> Result<Self> {
                // f32/f64 from_str accepts NaN, Infinity and -Infinity
                // (case-insensitively), matching the Postgres output forms.
                s.parse()
                    .map_err(|e| Error::conversion($name, s, format!("{}", e)))
            }
        }

        impl ToPgText for $t {
            fn to_pg_text(&self) -> Option<String> {
                Some(if self.is_nan() {
                    "NaN".to_string()
                } else if self.is_infinite() {
                    if *self > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
                } else {
                    self.to_string()
                })
            }
        }
    };
}

impl_float!(f32, "f32");
impl_float!(f64, "f64");

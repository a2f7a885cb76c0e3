//! Column values and their typed accessors.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{Error, Result};
use crate::types::{FromPgText, PgInterval, PgNumeric, PgTimeTz};

/// One column value: the raw Postgres text, or NULL.
///
/// Conversions are explicit and lazy; the raw text is kept verbatim so
/// anything the server sent can be recovered even if no accessor fits.
/// Non-optional accessors fail on NULL with [`Error::ValueIsNull`]; the
/// `opt_*` variants map NULL to `None` and fail only on malformed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgValue {
    raw: Option<String>,
}

impl PgValue {
    pub fn null() -> Self {
        Self { raw: None }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            raw: Some(text.into()),
        }
    }

    /// The raw Postgres text, or `None` for NULL.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// Convert to any [`FromPgText`] type; NULL is an error.
    pub fn get<T: FromPgText>(&self) -> Result<T> {
        match &self.raw {
            None => Err(Error::ValueIsNull),
            Some(text) => T::from_pg_text(text),
        }
    }

    /// Convert to any [`FromPgText`] type; NULL becomes `None`.
    pub fn opt<T: FromPgText>(&self) -> Result<Option<T>> {
        match &self.raw {
            None => Ok(None),
            Some(text) => T::from_pg_text(text).map(Some),
        }
    }

    pub fn string(&self) -> Result<String> {
        self.get()
    }

    pub fn opt_string(&self) -> Result<Option<String>> {
        self.opt()
    }

    pub fn int(&self) -> Result<i64> {
        self.get()
    }

    pub fn opt_int(&self) -> Result<Option<i64>> {
        self.opt()
    }

    pub fn double(&self) -> Result<f64> {
        self.get()
    }

    pub fn opt_double(&self) -> Result<Option<f64>> {
        self.opt()
    }

    pub fn decimal(&self) -> Result<PgNumeric> {
        self.get()
    }

    pub fn opt_decimal(&self) -> Result<Option<PgNumeric>> {
        self.opt()
    }

    pub fn bool(&self) -> Result<bool> {
        self.get()
    }

    pub fn opt_bool(&self) -> Result<Option<bool>> {
        self.opt()
    }

    pub fn bytes(&self) -> Result<Vec<u8>> {
        self.get()
    }

    pub fn opt_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.opt()
    }

    pub fn date(&self) -> Result<NaiveDate> {
        self.get()
    }

    pub fn opt_date(&self) -> Result<Option<NaiveDate>> {
        self.opt()
    }

    pub fn time(&self) -> Result<NaiveTime> {
        self.get()
    }

    pub fn opt_time(&self) -> Result<Option<NaiveTime>> {
        self.opt()
    }

    pub fn time_tz(&self) -> Result<PgTimeTz> {
        self.get()
    }

    pub fn opt_time_tz(&self) -> Result<Option<PgTimeTz>> {
        self.opt()
    }

    pub fn timestamp(&self) -> Result<NaiveDateTime> {
        self.get()
    }

    pub fn opt_timestamp(&self) -> Result<Option<NaiveDateTime>> {
        self.opt()
    }

    pub fn timestamptz(&self) -> Result<DateTime<FixedOffset>> {
        self.get()
    }

    pub fn opt_timestamptz(&self) -> Result<Option<DateTime<FixedOffset>>> {
        self.opt()
    }

    pub fn interval(&self) -> Result<PgInterval> {
        self.get()
    }

    pub fn opt_interval(&self) -> Result<Option<PgInterval>> {
        self.opt()
    }
}

impl From<Option<String>> for PgValue {
    fn from(raw: Option<String>) -> Self {
        Self { raw }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_semantics() {
        let value = PgValue::null();
        assert!(value.is_null());
        assert!(matches!(value.int().unwrap_err(), Error::ValueIsNull));
        assert_eq!(value.opt_int().unwrap(), None);
    }

    #[test]
    fn typed_accessors() {
        assert_eq!(PgValue::from_text("42").int().unwrap(), 42);
        assert_eq!(PgValue::from_text("42").opt_int().unwrap(), Some(42));
        assert_eq!(PgValue::from_text("1.5").double().unwrap(), 1.5);
        assert!(PgValue::from_text("t").bool().unwrap());
        assert_eq!(
            PgValue::from_text("hello").string().unwrap(),
            "hello".to_string()
        );
    }

    #[test]
    fn no_silent_coercion() {
        // a double never converts to int
        let value = PgValue::from_text("1.5");
        assert!(matches!(
            value.int().unwrap_err(),
            Error::ValueConversion { .. }
        ));
        // and the opt variant still fails on parse errors
        assert!(value.opt_int().is_err());
    }

    #[test]
    fn raw_is_verbatim() {
        let value = PgValue::from_text("007");
        assert_eq!(value.raw(), Some("007"));
        assert_eq!(value.int().unwrap(), 7);
    }
}

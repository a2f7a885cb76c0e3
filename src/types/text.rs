//! Character type conversions (text, varchar, char, name, bpchar).

use crate::error::Result;

use super::{FromPgText, ToPgText};

impl FromPgText for String {
    fn from_pg_text(s: &str) -> Result<Self> {
        Ok(s.to_owned())
    }
}

impl ToPgText for String {
    fn to_pg_text(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl ToPgText for str {
    fn to_pg_text(&self) -> Option<String> {
        Some(self.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_verbatim() {
        assert_eq!(String::from_pg_text("Grüße, 世界").unwrap(), "Grüße, 世界");
        assert_eq!("it's".to_pg_text().unwrap(), "it's");
    }
}

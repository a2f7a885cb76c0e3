//! Text codec between Rust values and PostgreSQL representations.
//!
//! This client speaks the default text format exclusively, so every
//! conversion goes through the Postgres textual form. Conversions are
//! explicit and every failure is reported; nothing is silently coerced.

mod bytes;
mod datetime;
mod interval;
mod numeric;
mod primitives;
mod text;

pub use datetime::PgTimeTz;
pub use interval::PgInterval;
pub use numeric::PgNumeric;

use crate::error::Result;

/// Parse a value from its Postgres text representation.
pub trait FromPgText: Sized {
    fn from_pg_text(s: &str) -> Result<Self>;
}

/// Produce the Postgres text representation of a value.
///
/// `None` represents SQL NULL; only the `Option` impl produces it.
pub trait ToPgText {
    fn to_pg_text(&self) -> Option<String>;
}

impl<T: ToPgText> ToPgText for Option<T> {
    fn to_pg_text(&self) -> Option<String> {
        self.as_ref().and_then(|v| v.to_pg_text())
    }
}

impl<T: ToPgText + ?Sized> ToPgText for &T {
    fn to_pg_text(&self) -> Option<String> {
        (*self).to_pg_text()
    }
}

/// A set of bind parameters for one execute.
///
/// `encode` writes each parameter as a 4-byte length followed by the text
/// bytes, or -1 for NULL, which is exactly the value section of a Bind
/// message.
pub trait Params {
    fn count(&self) -> usize;
    fn encode(&self, buf: &mut Vec<u8>);
}

fn encode_param<T: ToPgText>(value: &T, buf: &mut Vec<u8>) {
    match value.to_pg_text() {
        Some(text) => {
            buf.extend_from_slice(&(text.len() as i32).to_be_bytes());
            buf.extend_from_slice(text.as_bytes());
        }
        None => buf.extend_from_slice(&(-1_i32).to_be_bytes()),
    }
}

impl Params for () {
    fn count(&self) -> usize {
        0
    }

    fn encode(&self, _buf: &mut Vec<u8>) {}
}

impl<T: Params + ?Sized> Params for &T {
    fn count(&self) -> usize {
        (*self).count()
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        (*self).encode(buf)
    }
}

impl<T: ToPgText> Params for [T] {
    fn count(&self) -> usize {
        self.len()
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        for value in self {
            encode_param(value, buf);
        }
    }
}

impl<T: ToPgText> Params for Vec<T> {
    fn count(&self) -> usize {
        self.len()
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        self.as_slice().encode(buf)
    }
}

macro_rules! impl_params_for_tuple {
    ($count:expr, $($idx:tt: $T:ident),+) => {
        impl<$($T: ToPgText),+> Params for ($($T,)+) {
            fn count(&self) -> usize {
                $count
            }

            fn encode(&self, buf: &mut Vec<u8>) {
                $(encode_param(&self.$idx, buf);)+
            }
        }
    };
}

impl_params_for_tuple!(1, 0: T0);
impl_params_for_tuple!(2, 0: T0, 1: T1);
impl_params_for_tuple!(3, 0: T0, 1: T1, 2: T2);
impl_params_for_tuple!(4, 0: T0, 1: T1, 2: T2, 3: T3);
impl_params_for_tuple!(5, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_params_for_tuple!(6, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_params_for_tuple!(7, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_params_for_tuple!(8, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
impl_params_for_tuple!(9, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8);
impl_params_for_tuple!(10, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9);
impl_params_for_tuple!(11, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10);
impl_params_for_tuple!(12, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7, 8: T8, 9: T9, 10: T10, 11: T11);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_params_encode() {
        let mut buf = Vec::new();
        let params = (7_i32, Option::<String>::None, "hi");
        params.encode(&mut buf);

        assert_eq!(params.count(), 3);
        assert_eq!(&buf[0..4], &1_i32.to_be_bytes());
        assert_eq!(&buf[4..5], b"7");
        assert_eq!(&buf[5..9], &(-1_i32).to_be_bytes());
        assert_eq!(&buf[9..13], &2_i32.to_be_bytes());
        assert_eq!(&buf[13..15], b"hi");
    }

    #[test]
    fn slice_params_encode() {
        let values = vec![Some(1_i64), None, Some(3_i64)];
        assert_eq!(values.count(), 3);

        let mut buf = Vec::new();
        values.encode(&mut buf);
        assert_eq!(&buf[0..4], &1_i32.to_be_bytes());
        assert_eq!(&buf[4..5], b"1");
        assert_eq!(&buf[5..9], &(-1_i32).to_be_bytes());
    }

    #[test]
    fn empty_params() {
        let mut buf = Vec::new();
        ().encode(&mut buf);
        assert!(buf.is_empty());
        assert_eq!(().count(), 0);
    }
}

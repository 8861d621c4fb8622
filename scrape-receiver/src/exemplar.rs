//! Conversion of scraped exemplars.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::labels::Labels;
use crate::utils::millis_to_nanos;

/// Exemplar label carrying the trace identifier as hex.
pub const TRACE_ID_LABEL: &str = "trace_id";
/// Exemplar label carrying the span identifier as hex.
pub const SPAN_ID_LABEL: &str = "span_id";

/// Decodes a hex string into a fixed-width identifier.
///
/// Decoding is permissive: the longest leading run of valid hex digit pairs is decoded and
/// everything after it is ignored. The decoded bytes are right-aligned in the identifier, so short
/// inputs are padded with leading zero bytes and long inputs keep their trailing bytes.
fn decode_lower_bytes<const N: usize>(hex_str: &str) -> [u8; N] {
    let valid = hex_str
        .bytes()
        .take_while(u8::is_ascii_hexdigit)
        .count()
        & !1;

    let mut id = [0; N];
    // The prefix consists of ASCII hex digits only, so decoding cannot fail.
    let decoded = hex::decode(&hex_str[..valid]).unwrap_or_default();
    let src = &decoded[decoded.len().saturating_sub(N)..];
    id[N - src.len()..].copy_from_slice(src);
    id
}

macro_rules! impl_id {
    ($name:ident, $len:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Decodes the identifier from a hex string.
            ///
            /// Invalid input never fails. Decoding stops at the first invalid digit pair and
            /// the result is padded with leading zero bytes.
            pub fn from_hex(hex_str: &str) -> Self {
                Self(decode_lower_bytes(hex_str))
            }

            /// Returns `true` if all bytes are zero.
            pub fn is_empty(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Returns the identifier as lowercase hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Returns the raw bytes of the identifier.
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }
    };
}

impl_id!(TraceId, 16, "A 16 byte trace identifier.");
impl_id!(SpanId, 8, "An 8 byte span identifier.");

/// An exemplar as supplied by the scraper.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawExemplar {
    /// Timestamp in milliseconds since the UNIX epoch.
    pub timestamp_ms: i64,
    /// The observed value.
    pub value: f64,
    /// Exemplar labels, including `trace_id` and `span_id`.
    pub labels: Labels,
}

/// A converted exemplar attached to a data point.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Exemplar {
    /// Timestamp in nanoseconds since the UNIX epoch.
    pub time_unix_nano: u64,
    /// The observed value.
    pub value: f64,
    /// The trace this exemplar was recorded in, all zero if absent.
    pub trace_id: TraceId,
    /// The span this exemplar was recorded in, all zero if absent.
    pub span_id: SpanId,
    /// All labels except for the trace and span identifiers.
    pub filtered_attributes: BTreeMap<String, String>,
}

impl From<RawExemplar> for Exemplar {
    fn from(raw: RawExemplar) -> Self {
        let mut exemplar = Exemplar {
            time_unix_nano: millis_to_nanos(raw.timestamp_ms),
            value: raw.value,
            ..Default::default()
        };

        for label in raw.labels {
            if label.name.eq_ignore_ascii_case(TRACE_ID_LABEL) {
                exemplar.trace_id = TraceId::from_hex(&label.value);
            } else if label.name.eq_ignore_ascii_case(SPAN_ID_LABEL) {
                exemplar.span_id = SpanId::from_hex(&label.value);
            } else {
                exemplar.filtered_attributes.insert(label.name, label.value);
            }
        }

        exemplar
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::labels;

    #[test]
    fn test_decode_stops_at_invalid_digit() {
        let trace_id = TraceId::from_hex("0000a5bc3defg93h");
        assert_eq!(trace_id.to_hex(), "000000000000000000000000a5bc3def");

        let span_id = SpanId::from_hex("0000a5bc3defg93h");
        assert_eq!(span_id.to_hex(), "00000000a5bc3def");
    }

    #[test]
    fn test_decode_full_width() {
        let trace_id = TraceId::from_hex("5B8EFFF798038103D269B633813FC60C");
        assert_eq!(trace_id.to_hex(), "5b8efff798038103d269b633813fc60c");

        let span_id = SpanId::from_hex("eee19b7ec3c1b174");
        assert_eq!(span_id.0, [0xee, 0xe1, 0x9b, 0x7e, 0xc3, 0xc1, 0xb1, 0x74]);
    }

    #[test]
    fn test_decode_odd_length_drops_last_nibble() {
        assert_eq!(SpanId::from_hex("abc").to_hex(), "00000000000000ab");
    }

    #[test]
    fn test_decode_too_long_keeps_lower_bytes() {
        assert_eq!(
            SpanId::from_hex("0102030405060708090a").to_hex(),
            "030405060708090a"
        );
    }

    #[test]
    fn test_decode_garbage() {
        assert!(TraceId::from_hex("").is_empty());
        assert!(TraceId::from_hex("zz").is_empty());
        assert!(SpanId::from_hex("ü1234").is_empty());
    }

    #[test]
    fn test_convert_exemplar() {
        let exemplar = Exemplar::from(RawExemplar {
            timestamp_ms: 1660233371385,
            value: 0.012,
            labels: labels! {
                "instance" => "localhost:8080",
                "job" => "test",
                "Trace_ID" => "0000a5bc3defg93h",
                "span_id" => "0000a5bc3defg93h",
            },
        });

        assert_eq!(exemplar.time_unix_nano, 1_660_233_371_385_000_000);
        assert_eq!(exemplar.value, 0.012);
        assert_eq!(exemplar.trace_id, TraceId::from_hex("0000a5bc3def"));
        assert_eq!(exemplar.span_id, SpanId::from_hex("0000a5bc3def"));
        assert_eq!(
            exemplar.filtered_attributes,
            BTreeMap::from([
                ("instance".to_owned(), "localhost:8080".to_owned()),
                ("job".to_owned(), "test".to_owned()),
            ])
        );
    }
}

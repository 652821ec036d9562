//! Normalized decoded parameter values.
//!
//! ABI decoding produces machine-native values where they fit and decimal
//! strings where they do not, so downstream consumers (classifiers, stores,
//! JSON output) never see raw 256-bit words.

use serde::{Deserialize, Serialize};

/// A decoded event parameter value in normalized form.
///
/// Unsigned and signed integers that fit in 128 bits are kept native;
/// anything wider is carried as a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Uint(u128),
    BigUint(String),
    Int(i128),
    BigInt(String),
    Bool(bool),
    /// Raw bytes, hex-encoded with a `0x` prefix.
    Bytes(String),
    String(String),
    /// Checksummed `0x`-prefixed address.
    Address(String),
    Array(Vec<ParamValue>),
    Tuple(Vec<ParamValue>),
    Null,
}

impl ParamValue {
    /// Numeric view of the value, if it has one.
    ///
    /// Big integers carried as decimal strings are parsed; precision loss
    /// beyond f64 range is accepted (amounts are scaled to floats anyway).
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Uint(v) => Some(*v as f64),
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::BigUint(s) | ParamValue::BigInt(s) => s.parse::<f64>().ok(),
            ParamValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Unsigned integer view, when the value is a uint that fits.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ParamValue::Uint(v) => u64::try_from(*v).ok(),
            ParamValue::BigUint(s) => s.parse::<u64>().ok(),
            _ => None,
        }
    }

    /// Address view.
    pub fn as_address(&self) -> Option<&str> {
        match self {
            ParamValue::Address(a) => Some(a.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_shape_is_tagged() {
        let v = ParamValue::Uint(42);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"type":"uint","value":42}"#);
    }

    #[test]
    fn big_uint_round_trips_through_f64() {
        let v = ParamValue::BigUint("340282366920938463463374607431768211456".into());
        let f = v.to_f64().unwrap();
        assert!(f > 3.4e38);
    }

    #[test]
    fn address_accessor() {
        let v = ParamValue::Address("0x00000000000000000000000000000000000000aa".into());
        assert_eq!(v.as_address().unwrap().len(), 42);
        assert!(ParamValue::Bool(true).as_address().is_none());
    }
}

//! Normalization of ABI-decoded values.

use alloy_core::dyn_abi::DynSolValue;

use chainsink_core::value::ParamValue;

/// Convert a dynamically decoded ABI value into the pipeline's normalized
/// form. Integers that fit in 128 bits stay native; wider values fall back
/// to decimal strings.
pub fn normalize(value: &DynSolValue) -> ParamValue {
    match value {
        DynSolValue::Bool(b) => ParamValue::Bool(*b),
        DynSolValue::Uint(v, _bits) => match u128::try_from(*v) {
            Ok(narrow) => ParamValue::Uint(narrow),
            Err(_) => ParamValue::BigUint(v.to_string()),
        },
        DynSolValue::Int(v, _bits) => match i128::try_from(*v) {
            Ok(narrow) => ParamValue::Int(narrow),
            Err(_) => ParamValue::BigInt(v.to_string()),
        },
        DynSolValue::Address(a) => ParamValue::Address(format!("{a}")),
        DynSolValue::Function(f) => ParamValue::Bytes(format!("0x{}", hex::encode(f.as_slice()))),
        DynSolValue::FixedBytes(word, size) => {
            ParamValue::Bytes(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Bytes(bytes) => ParamValue::Bytes(format!("0x{}", hex::encode(bytes))),
        DynSolValue::String(s) => ParamValue::String(s.clone()),
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) => {
            ParamValue::Array(values.iter().map(normalize).collect())
        }
        DynSolValue::Tuple(values) => ParamValue::Tuple(values.iter().map(normalize).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, I256, U256};

    #[test]
    fn small_uint_stays_native() {
        let v = DynSolValue::Uint(U256::from(1_000u64), 256);
        assert_eq!(normalize(&v), ParamValue::Uint(1_000));
    }

    #[test]
    fn wide_uint_becomes_decimal_string() {
        let v = DynSolValue::Uint(U256::MAX, 256);
        match normalize(&v) {
            ParamValue::BigUint(s) => assert!(s.starts_with("115792089237316195423570985008687")),
            other => panic!("expected big uint, got {other:?}"),
        }
    }

    #[test]
    fn negative_int_keeps_sign() {
        let v = DynSolValue::Int(I256::try_from(-42i64).unwrap(), 256);
        assert_eq!(normalize(&v), ParamValue::Int(-42));
    }

    #[test]
    fn address_is_checksummed_string() {
        let addr: Address = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2".parse().unwrap();
        match normalize(&DynSolValue::Address(addr)) {
            ParamValue::Address(s) => {
                assert_eq!(s.to_lowercase(), "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
            }
            other => panic!("expected address, got {other:?}"),
        }
    }

    #[test]
    fn nested_tuple_normalizes_recursively() {
        let v = DynSolValue::Tuple(vec![
            DynSolValue::Bool(true),
            DynSolValue::Array(vec![DynSolValue::Uint(U256::from(7u64), 8)]),
        ]);
        assert_eq!(
            normalize(&v),
            ParamValue::Tuple(vec![
                ParamValue::Bool(true),
                ParamValue::Array(vec![ParamValue::Uint(7)]),
            ])
        );
    }
}

//! Pool fee-change event shapes.

use std::collections::HashMap;
use std::sync::OnceLock;

use indexmap::IndexMap;

use chainsink_core::event::DecodedParam;
use chainsink_core::value::ParamValue;

use crate::signature::keccak256_signature;

#[derive(Debug, Clone)]
pub(crate) struct RawFeeChange {
    /// The pool whose fee changed (the emitter is usually the factory).
    pub pool: Option<String>,
    pub fee: u64,
}

fn shapes() -> &'static HashMap<String, ()> {
    static SHAPES: OnceLock<HashMap<String, ()>> = OnceLock::new();
    SHAPES.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert(keccak256_signature("SetCustomFee", &["address", "uint256"]), ());
        map
    })
}

pub(crate) fn is_known(signature: &str) -> bool {
    shapes().contains_key(signature)
}

pub(crate) fn extract(parameters: &IndexMap<String, DecodedParam>) -> Option<RawFeeChange> {
    let pool = super::param(parameters, &["pool", "pair", "address"])
        .and_then(ParamValue::as_address)
        .map(str::to_lowercase);
    let fee = super::param(parameters, &["fee", "newFee", "customFee"])?.as_u64()?;
    Some(RawFeeChange { pool, fee })
}

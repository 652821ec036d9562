//! Reserve-sync event shapes and the factory fee table.

use std::collections::HashMap;
use std::sync::OnceLock;

use indexmap::IndexMap;

use chainsink_core::event::DecodedParam;

use super::param_f64;
use crate::signature::keccak256_signature;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RawSync {
    pub reserve0: f64,
    pub reserve1: f64,
}

fn shapes() -> &'static HashMap<String, ()> {
    static SHAPES: OnceLock<HashMap<String, ()>> = OnceLock::new();
    SHAPES.get_or_init(|| {
        let mut map = HashMap::new();
        // Uniswap V2 pairs
        map.insert(keccak256_signature("Sync", &["uint112", "uint112"]), ());
        // Solidly-style pairs widen the reserves
        map.insert(keccak256_signature("Sync", &["uint256", "uint256"]), ());
        map
    })
}

pub(crate) fn is_known(signature: &str) -> bool {
    shapes().contains_key(signature)
}

pub(crate) fn extract(parameters: &IndexMap<String, DecodedParam>) -> Option<RawSync> {
    let reserve0 = param_f64(parameters, &["reserve0", "_reserve0"])?;
    let reserve1 = param_f64(parameters, &["reserve1", "_reserve1"])?;
    Some(RawSync { reserve0, reserve1 })
}

/// Swap fee fraction charged by pools of a known factory.
pub(crate) fn factory_fee(factory: &str) -> Option<f64> {
    match factory.to_lowercase().as_str() {
        // Uniswap V2
        "0x5c69bee701ef814a2b6a3edd4b1652cb9cc5aa6f" => Some(0.003),
        // SushiSwap
        "0xc0aee478e3658e2610c5f7a4a2e1777ce9e4f2ac" => Some(0.003),
        // PancakeSwap V2
        "0xca143ce32fe78f1f7019d7d551a6402fc5350c73" => Some(0.0025),
        _ => None,
    }
}

//! Swap event shapes.
//!
//! Keyed by the canonical declaration hash, i.e. the log's `topics[0]`,
//! so routing works even when a log only partially decodes.

use std::collections::HashMap;
use std::sync::OnceLock;

use indexmap::IndexMap;

use chainsink_core::event::DecodedParam;

use super::param_f64;
use crate::signature::keccak256_signature;

#[derive(Debug, Clone, Copy)]
pub(crate) enum SwapShape {
    /// `amount0In/amount1In/amount0Out/amount1Out`, V2 pair style.
    InOutPairs,
    /// Signed `amount0/amount1`, V3 style (positive flows into the pool).
    SignedPair,
}

/// Amounts straight off the event, unscaled and unsigned.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RawSwap {
    pub amount0: f64,
    pub amount1: f64,
    pub amount0_is_in: bool,
}

fn shapes() -> &'static HashMap<String, SwapShape> {
    static SHAPES: OnceLock<HashMap<String, SwapShape>> = OnceLock::new();
    SHAPES.get_or_init(|| {
        let mut map = HashMap::new();
        // V2 pairs and forks: indexed sender leads, indexed `to` trails
        map.insert(
            keccak256_signature(
                "Swap",
                &["address", "uint256", "uint256", "uint256", "uint256", "address"],
            ),
            SwapShape::InOutPairs,
        );
        // forks indexing only the sender
        map.insert(
            keccak256_signature("Swap", &["address", "uint256", "uint256", "uint256", "uint256"]),
            SwapShape::InOutPairs,
        );
        // Uniswap V3
        map.insert(
            keccak256_signature(
                "Swap",
                &["address", "address", "int256", "int256", "uint160", "uint128", "int24"],
            ),
            SwapShape::SignedPair,
        );
        // Pancake V3 carries protocol fee amounts after the tick
        map.insert(
            keccak256_signature(
                "Swap",
                &[
                    "address", "address", "int256", "int256", "uint160", "uint128", "int24",
                    "uint128", "uint128",
                ],
            ),
            SwapShape::SignedPair,
        );
        map
    })
}

pub(crate) fn shape_for(signature: &str) -> Option<SwapShape> {
    shapes().get(signature).copied()
}

pub(crate) fn extract(
    shape: SwapShape,
    parameters: &IndexMap<String, DecodedParam>,
) -> Option<RawSwap> {
    match shape {
        SwapShape::InOutPairs => {
            let amount0_in = param_f64(parameters, &["amount0In", "amount0in"])?;
            let amount1_in = param_f64(parameters, &["amount1In", "amount1in"])?;
            let amount0_out = param_f64(parameters, &["amount0Out", "amount0out"])?;
            let amount1_out = param_f64(parameters, &["amount1Out", "amount1out"])?;
            let amount0_is_in = amount0_in > 0.0;
            Some(if amount0_is_in {
                RawSwap { amount0: amount0_in, amount1: amount1_out, amount0_is_in }
            } else {
                RawSwap { amount0: amount0_out, amount1: amount1_in, amount0_is_in }
            })
        }
        SwapShape::SignedPair => {
            let amount0 = param_f64(parameters, &["amount0", "amount0Delta"])?;
            let amount1 = param_f64(parameters, &["amount1", "amount1Delta"])?;
            Some(RawSwap {
                amount0: amount0.abs(),
                amount1: amount1.abs(),
                amount0_is_in: amount0 > 0.0,
            })
        }
    }
}

//! Chain identifiers.
//!
//! Chains are addressed by a lowercase slug throughout the pipeline; the
//! numeric id is only needed where a transaction omits its `chainId` field
//! and a default has to be filled in.

/// Well-known numeric chain ids, keyed by chain slug.
pub fn numeric_chain_id(chain: &str) -> Option<u64> {
    match chain {
        "ethereum" => Some(1),
        "optimism" => Some(10),
        "bnb" => Some(56),
        "polygon" => Some(137),
        "zksync" => Some(324),
        "mantle" => Some(5000),
        "base" => Some(8453),
        "arbitrum" => Some(42161),
        "avalanche" => Some(43114),
        "linea" => Some(59144),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_chains_resolve() {
        assert_eq!(numeric_chain_id("ethereum"), Some(1));
        assert_eq!(numeric_chain_id("base"), Some(8453));
        assert_eq!(numeric_chain_id("arbitrum"), Some(42161));
    }

    #[test]
    fn unknown_chain_is_none() {
        assert_eq!(numeric_chain_id("dogechain"), None);
    }
}

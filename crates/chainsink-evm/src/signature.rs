//! Event signature hashing.
//!
//! An event's signature hash is the keccak256 of its canonical declaration,
//! `Name(type0,type1,...)` with parameter types in declaration order.

use alloy_json_abi::{Event, JsonAbi};
use tiny_keccak::{Hasher, Keccak};

use chainsink_core::error::DecodeError;
use chainsink_core::event::{EventInput, EventSignature};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// `0x`-prefixed keccak256 of the canonical event declaration.
pub fn keccak256_signature(name: &str, types: &[&str]) -> String {
    let canonical = format!("{}({})", name, types.join(","));
    format!("0x{}", hex::encode(keccak256(canonical.as_bytes())))
}

/// Build an [`EventSignature`] from a parsed ABI event entry.
///
/// Tuple parameters are flattened to their canonical selector type so the
/// stored types reproduce the hash.
pub fn signature_from_event(event: &Event) -> EventSignature {
    let inputs: Vec<EventInput> = event
        .inputs
        .iter()
        .map(|param| EventInput {
            name: param.name.clone(),
            ty: param.selector_type().into_owned(),
            indexed: param.indexed,
        })
        .collect();
    let types: Vec<&str> = inputs.iter().map(|i| i.ty.as_str()).collect();
    EventSignature {
        signature_hash: format!("0x{}", hex::encode(event.selector())),
        name: event.name.clone(),
        full_signature: format!("{}({})", event.name, types.join(",")),
        contract_address: None,
        inputs,
    }
}

/// All event signatures declared by an ABI.
pub fn signatures_from_abi(abi_json: &str) -> Result<Vec<EventSignature>, DecodeError> {
    let abi: JsonAbi = serde_json::from_str(abi_json)
        .map_err(|e| DecodeError::AbiParse { reason: e.to_string() })?;
    Ok(abi.events().map(signature_from_event).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erc20_transfer_hash() {
        let hash = keccak256_signature("Transfer", &["address", "address", "uint256"]);
        assert_eq!(
            hash,
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn uniswap_v2_swap_hash() {
        let hash = keccak256_signature(
            "Swap",
            &["address", "uint256", "uint256", "uint256", "uint256", "address"],
        );
        assert_eq!(
            hash,
            "0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822"
        );
    }

    #[test]
    fn uniswap_v3_swap_hash() {
        let hash = keccak256_signature(
            "Swap",
            &["address", "address", "int256", "int256", "uint160", "uint128", "int24"],
        );
        assert_eq!(
            hash,
            "0xc42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67"
        );
    }

    #[test]
    fn uniswap_v2_sync_hash() {
        let hash = keccak256_signature("Sync", &["uint112", "uint112"]);
        assert_eq!(
            hash,
            "0x1c411e9a96e071241c2f21f7726b17ae89e3cab4c78be50e062b03a9fffbbad1"
        );
    }

    #[test]
    fn signatures_extracted_from_abi_json() {
        let abi = r#"[
            {"type":"event","name":"Transfer","inputs":[
                {"name":"from","type":"address","indexed":true},
                {"name":"to","type":"address","indexed":true},
                {"name":"value","type":"uint256","indexed":false}
            ]},
            {"type":"function","name":"decimals","inputs":[],"outputs":[{"name":"","type":"uint8"}],"stateMutability":"view"}
        ]"#;
        let sigs = signatures_from_abi(abi).unwrap();
        assert_eq!(sigs.len(), 1);
        let sig = &sigs[0];
        assert_eq!(sig.name, "Transfer");
        assert_eq!(sig.full_signature, "Transfer(address,address,uint256)");
        assert_eq!(
            sig.signature_hash,
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
        assert_eq!(sig.indexed_flags(), vec![true, true, false]);
    }

    #[test]
    fn malformed_abi_is_a_parse_error() {
        assert!(matches!(
            signatures_from_abi("not json"),
            Err(DecodeError::AbiParse { .. })
        ));
    }
}

//! Common ABI encoding utilities

use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256 as ethers_keccak256;

/// Compute function selector (first 4 bytes of keccak256 hash)
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = ethers_keccak256(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

/// Event topic0 for an event signature
pub fn event_topic(signature: &str) -> H256 {
    H256::from(ethers_keccak256(signature.as_bytes()))
}

/// Selector followed by already-encoded arguments
pub fn with_selector(selector: [u8; 4], encoded_args: Vec<u8>) -> Vec<u8> {
    let mut calldata = Vec::with_capacity(4 + encoded_args.len());
    calldata.extend_from_slice(&selector);
    calldata.extend(encoded_args);
    calldata
}

/// Decode a uint256 word (topic or data slot)
pub fn decode_uint256_word(word: &[u8]) -> Option<U256> {
    if word.len() < 32 {
        return None;
    }
    Some(U256::from_big_endian(&word[..32]))
}

/// Decode a left-padded address word. Rejects dirty upper bytes.
pub fn decode_address_word(word: &[u8]) -> Option<Address> {
    if word.len() < 32 || word[..12].iter().any(|b| *b != 0) {
        return None;
    }
    Some(Address::from_slice(&word[12..32]))
}

/// Compute keccak256 hash
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    ethers_keccak256(data)
}

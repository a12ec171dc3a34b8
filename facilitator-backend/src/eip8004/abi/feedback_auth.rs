//! Feedback authorization struct layout
//!
//! `abi.encode(uint256 agentId, address clientAddress, uint64 indexLimit,
//! uint256 expiry, uint256 chainId, address identityRegistry, address signerAddress)`
//!
//! All seven fields are static, so the encoding is seven 32-byte words.

use ethers::abi::{ParamType, Token};
use ethers::types::U256;

use crate::eip8004::types::FeedbackAuthFields;

pub const FEEDBACK_AUTH_STRUCT_LEN: usize = 7 * 32;

fn param_types() -> [ParamType; 7] {
    [
        ParamType::Uint(256),
        ParamType::Address,
        ParamType::Uint(64),
        ParamType::Uint(256),
        ParamType::Uint(256),
        ParamType::Address,
        ParamType::Address,
    ]
}

pub fn encode_feedback_auth(fields: &FeedbackAuthFields) -> Vec<u8> {
    ethers::abi::encode(&[
        Token::Uint(fields.agent_id),
        Token::Address(fields.client_address),
        Token::Uint(U256::from(fields.index_limit)),
        Token::Uint(fields.expiry),
        Token::Uint(fields.chain_id),
        Token::Address(fields.identity_registry),
        Token::Address(fields.signer_address),
    ])
}

pub fn decode_feedback_auth(encoded: &[u8]) -> Result<FeedbackAuthFields, String> {
    if encoded.len() != FEEDBACK_AUTH_STRUCT_LEN {
        return Err(format!(
            "Feedback auth struct must be {} bytes, got {}",
            FEEDBACK_AUTH_STRUCT_LEN,
            encoded.len()
        ));
    }

    let tokens = ethers::abi::decode(&param_types(), encoded)
        .map_err(|e| format!("Failed to decode feedback auth struct: {}", e))?;

    let uint_at = |i: usize| -> Result<U256, String> {
        tokens[i]
            .clone()
            .into_uint()
            .ok_or_else(|| format!("Feedback auth field {} is not a uint", i))
    };
    let address_at = |i: usize| {
        tokens[i]
            .clone()
            .into_address()
            .ok_or_else(|| format!("Feedback auth field {} is not an address", i))
    };

    let index_limit = uint_at(2)?;
    if index_limit > U256::from(u64::MAX) {
        return Err(format!("indexLimit out of uint64 range: {}", index_limit));
    }

    Ok(FeedbackAuthFields {
        agent_id: uint_at(0)?,
        client_address: address_at(1)?,
        index_limit: index_limit.as_u64(),
        expiry: uint_at(3)?,
        chain_id: uint_at(4)?,
        identity_registry: address_at(5)?,
        signer_address: address_at(6)?,
    })
}

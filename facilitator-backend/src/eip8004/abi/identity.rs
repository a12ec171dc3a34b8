//! Identity Registry ABI encoding
//!
//! ERC-721 based agent identity registry. Registration goes through one of
//! three `register` overloads; the minted id is read back from receipt logs.

use ethers::abi::Token;
use ethers::types::{Address, H256, U256};
use once_cell::sync::Lazy;

use super::common::*;
use crate::chain::TxLog;
use crate::eip8004::types::RegistrationIntent;

pub const OWNER_OF_SELECTOR: [u8; 4] = [0x63, 0x52, 0x21, 0x1e]; // ownerOf(uint256)

pub const REGISTER_BARE_SIGNATURE: &str = "register()";
pub const REGISTER_URI_SIGNATURE: &str = "register(string)";
pub const REGISTER_METADATA_SIGNATURE: &str = "register(string,(string,bytes)[])";

pub const REGISTERED_EVENT_SIGNATURE: &str = "Registered(uint256,string,address)";
pub const TRANSFER_EVENT_SIGNATURE: &str = "Transfer(address,address,uint256)";

static REGISTERED_TOPIC: Lazy<H256> = Lazy::new(|| event_topic(REGISTERED_EVENT_SIGNATURE));
static TRANSFER_TOPIC: Lazy<H256> = Lazy::new(|| event_topic(TRANSFER_EVENT_SIGNATURE));

/// Calldata for the `register` overload the intent selects
pub fn encode_register(intent: &RegistrationIntent) -> Vec<u8> {
    match intent {
        RegistrationIntent::Bare => function_selector(REGISTER_BARE_SIGNATURE).to_vec(),
        RegistrationIntent::WithUri { token_uri } => with_selector(
            function_selector(REGISTER_URI_SIGNATURE),
            ethers::abi::encode(&[Token::String(token_uri.clone())]),
        ),
        RegistrationIntent::WithMetadata { token_uri, metadata } => {
            let entries = metadata
                .iter()
                .map(|entry| {
                    Token::Tuple(vec![
                        Token::String(entry.key.clone()),
                        Token::Bytes(entry.value.clone()),
                    ])
                })
                .collect();

            with_selector(
                function_selector(REGISTER_METADATA_SIGNATURE),
                ethers::abi::encode(&[Token::String(token_uri.clone()), Token::Array(entries)]),
            )
        }
    }
}

/// Encode ownerOf(uint256 tokenId) call
pub fn encode_owner_of(agent_id: U256) -> Vec<u8> {
    with_selector(OWNER_OF_SELECTOR, ethers::abi::encode(&[Token::Uint(agent_id)]))
}

/// Decode the address returned by ownerOf
pub fn decode_owner_of(returned: &[u8]) -> Result<Address, String> {
    decode_address_word(returned).ok_or_else(|| {
        format!(
            "Unexpected ownerOf return data: 0x{}",
            hex::encode(returned)
        )
    })
}

/// Where a decoded agent id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentIdSource {
    RegisteredEvent,
    MintTransfer,
}

impl AgentIdSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentIdSource::RegisteredEvent => "registered_event",
            AgentIdSource::MintTransfer => "mint_transfer",
        }
    }
}

/// `Registered(uint256 indexed agentId, string tokenURI, address indexed owner)`
/// emitted by `registry`.
pub fn decode_registered_agent_id(logs: &[TxLog], registry: Address) -> Option<U256> {
    logs.iter()
        .filter(|log| log.address == registry)
        .find(|log| log.topics.len() >= 2 && log.topics[0] == *REGISTERED_TOPIC)
        .and_then(|log| decode_uint256_word(log.topics[1].as_bytes()))
}

/// ERC-721 mint: `Transfer(0x0, to, tokenId)` emitted by `registry`.
pub fn decode_minted_token_id(logs: &[TxLog], registry: Address) -> Option<U256> {
    logs.iter()
        .filter(|log| log.address == registry)
        .find(|log| {
            log.topics.len() == 4
                && log.topics[0] == *TRANSFER_TOPIC
                && log.topics[1] == H256::zero()
        })
        .and_then(|log| decode_uint256_word(log.topics[3].as_bytes()))
}

/// Registered event first, mint transfer as fallback.
pub fn extract_agent_id(logs: &[TxLog], registry: Address) -> Option<(U256, AgentIdSource)> {
    decode_registered_agent_id(logs, registry)
        .map(|id| (id, AgentIdSource::RegisteredEvent))
        .or_else(|| {
            decode_minted_token_id(logs, registry).map(|id| (id, AgentIdSource::MintTransfer))
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::eip8004::types::MetadataEntry;
    use ethers::abi::ParamType;

    pub fn registered_log(registry: Address, agent_id: u64, owner: Address) -> TxLog {
        TxLog {
            address: registry,
            topics: vec![
                event_topic(REGISTERED_EVENT_SIGNATURE),
                H256::from_low_u64_be(agent_id),
                H256::from(owner),
            ],
            data: ethers::abi::encode(&[Token::String("ipfs://x".into())]),
        }
    }

    pub fn mint_log(emitter: Address, to: Address, token_id: u64) -> TxLog {
        TxLog {
            address: emitter,
            topics: vec![
                event_topic(TRANSFER_EVENT_SIGNATURE),
                H256::zero(),
                H256::from(to),
                H256::from_low_u64_be(token_id),
            ],
            data: vec![],
        }
    }

    #[test]
    fn test_owner_of_selector_matches_signature() {
        assert_eq!(OWNER_OF_SELECTOR, function_selector("ownerOf(uint256)"));
        let calldata = encode_owner_of(U256::from(42u64));
        assert_eq!(calldata.len(), 36);
        assert_eq!(calldata[35], 42);
    }

    #[test]
    fn test_encode_register_overloads() {
        let bare = encode_register(&RegistrationIntent::Bare);
        assert_eq!(bare, function_selector("register()").to_vec());

        let with_uri = encode_register(&RegistrationIntent::WithUri {
            token_uri: "ipfs://x".into(),
        });
        assert_eq!(with_uri[..4], function_selector("register(string)"));
        let decoded = ethers::abi::decode(&[ParamType::String], &with_uri[4..]).unwrap();
        assert_eq!(decoded, vec![Token::String("ipfs://x".into())]);
    }

    #[test]
    fn test_encode_register_with_metadata_round_trips_values() {
        let intent = RegistrationIntent::WithMetadata {
            token_uri: "ipfs://agent".into(),
            metadata: vec![
                MetadataEntry::from_input("name", "my agent").unwrap(),
                MetadataEntry::from_input("wallet", "0xdeadbeef").unwrap(),
            ],
        };
        let calldata = encode_register(&intent);
        assert_eq!(calldata[..4], function_selector(REGISTER_METADATA_SIGNATURE));

        let entry_type = ParamType::Tuple(vec![ParamType::String, ParamType::Bytes]);
        let decoded = ethers::abi::decode(
            &[ParamType::String, ParamType::Array(Box::new(entry_type))],
            &calldata[4..],
        )
        .unwrap();

        assert_eq!(decoded[0], Token::String("ipfs://agent".into()));
        let Token::Array(entries) = &decoded[1] else {
            panic!("expected array, got {:?}", decoded[1]);
        };
        assert_eq!(
            entries[0],
            Token::Tuple(vec![Token::String("name".into()), Token::Bytes(b"my agent".to_vec())])
        );
        assert_eq!(
            entries[1],
            Token::Tuple(vec![
                Token::String("wallet".into()),
                Token::Bytes(vec![0xde, 0xad, 0xbe, 0xef])
            ])
        );
    }

    #[test]
    fn test_registered_event_is_preferred() {
        let registry = Address::repeat_byte(0x80);
        let owner = Address::repeat_byte(0x11);
        let logs = vec![mint_log(registry, owner, 7), registered_log(registry, 9, owner)];
        assert_eq!(
            extract_agent_id(&logs, registry),
            Some((U256::from(9u64), AgentIdSource::RegisteredEvent))
        );
    }

    #[test]
    fn test_mint_fallback_only_from_registry() {
        let registry = Address::repeat_byte(0x80);
        let other = Address::repeat_byte(0x99);
        let owner = Address::repeat_byte(0x11);

        let foreign = vec![mint_log(other, owner, 5), registered_log(other, 6, owner)];
        assert_eq!(extract_agent_id(&foreign, registry), None);

        let logs = vec![mint_log(other, owner, 5), mint_log(registry, owner, 12)];
        assert_eq!(
            extract_agent_id(&logs, registry),
            Some((U256::from(12u64), AgentIdSource::MintTransfer))
        );
    }

    #[test]
    fn test_non_mint_transfer_is_ignored() {
        let registry = Address::repeat_byte(0x80);
        let mut log = mint_log(registry, Address::repeat_byte(0x11), 3);
        log.topics[1] = H256::from(Address::repeat_byte(0x22));
        assert_eq!(decode_minted_token_id(&[log], registry), None);
    }

    #[test]
    fn test_decode_owner_of() {
        let owner = Address::repeat_byte(0xbe);
        let returned = ethers::abi::encode(&[Token::Address(owner)]);
        assert_eq!(decode_owner_of(&returned).unwrap(), owner);
        assert!(decode_owner_of(&[0u8; 4]).is_err());
    }
}

//! EIP-7702 set-code transactions (type 0x04)
//!
//! ethers 2 has no typed-transaction variant for these, so the envelope is
//! built by hand:
//!
//!   0x04 ++ rlp([chain_id, nonce, max_priority_fee, max_fee, gas, to, value,
//!                data, access_list, authorization_list, y_parity, r, s])
//!
//! with each authorization encoded as `[chain_id, address, nonce, y_parity, r, s]`.

use ethers::types::{Address, Bytes, Signature, H256, U256};
use ethers::utils::{keccak256, rlp::RlpStream};

use crate::eip8004::delegation::DelegationAuthorization;

pub const SET_CODE_TX_TYPE: u8 = 0x04;

const UNSIGNED_FIELD_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCodeTransaction {
    pub chain_id: u64,
    pub nonce: U256,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: U256,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub authorization_list: Vec<DelegationAuthorization>,
}

impl SetCodeTransaction {
    fn append_unsigned_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.chain_id);
        stream.append(&self.nonce);
        stream.append(&self.max_priority_fee_per_gas);
        stream.append(&self.max_fee_per_gas);
        stream.append(&self.gas_limit);
        stream.append(&self.to);
        stream.append(&self.value);
        stream.append(&self.data.as_ref());
        // Empty access list
        stream.begin_list(0);

        stream.begin_list(self.authorization_list.len());
        for auth in &self.authorization_list {
            stream.begin_list(6);
            stream.append(&auth.chain_id);
            stream.append(&auth.delegate_address);
            stream.append(&auth.account_nonce);
            stream.append(&auth.signature.y_parity);
            stream.append(&auth.signature.r);
            stream.append(&auth.signature.s);
        }
    }

    /// Hash the gas payer signs: keccak256(0x04 || rlp(unsigned fields))
    pub fn signing_hash(&self) -> H256 {
        let mut stream = RlpStream::new_list(UNSIGNED_FIELD_COUNT);
        self.append_unsigned_fields(&mut stream);

        let mut preimage = vec![SET_CODE_TX_TYPE];
        preimage.extend_from_slice(&stream.out());
        H256::from(keccak256(preimage))
    }

    /// Raw signed envelope ready for `eth_sendRawTransaction`.
    pub fn encode_signed(&self, signature: &Signature) -> Result<Bytes, String> {
        let y_parity: u8 = match signature.v {
            0 | 27 => 0,
            1 | 28 => 1,
            other => return Err(format!("Unsupported signature v for typed tx: {}", other)),
        };

        let mut stream = RlpStream::new_list(UNSIGNED_FIELD_COUNT + 3);
        self.append_unsigned_fields(&mut stream);
        stream.append(&y_parity);
        stream.append(&signature.r);
        stream.append(&signature.s);

        let mut raw = vec![SET_CODE_TX_TYPE];
        raw.extend_from_slice(&stream.out());
        Ok(Bytes::from(raw))
    }

    /// Transaction hash of the signed envelope
    pub fn hash_signed(raw: &Bytes) -> H256 {
        H256::from(keccak256(raw.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eip8004::delegation::tests::{sample_authorization, DELEGATE_CHECKSUMMED};
    use ethers::signers::{LocalWallet, Signer};
    use ethers::utils::rlp::Rlp;

    fn sample_tx() -> SetCodeTransaction {
        SetCodeTransaction {
            chain_id: 84532,
            nonce: U256::from(3u64),
            max_priority_fee_per_gas: U256::from(1_000_000u64),
            max_fee_per_gas: U256::from(2_000_000_000u64),
            gas_limit: U256::from(500_000u64),
            to: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap(),
            value: U256::zero(),
            data: Bytes::from(vec![0x12, 0x34, 0x56, 0x78]),
            authorization_list: vec![sample_authorization(84532, DELEGATE_CHECKSUMMED, 0)],
        }
    }

    #[test]
    fn test_signed_envelope_layout() {
        let wallet: LocalWallet = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
            .parse()
            .unwrap();
        let tx = sample_tx();
        let signature = wallet.sign_hash(tx.signing_hash()).unwrap();
        let raw = tx.encode_signed(&signature).unwrap();

        assert_eq!(raw[0], SET_CODE_TX_TYPE);
        let rlp = Rlp::new(&raw[1..]);
        assert_eq!(rlp.item_count().unwrap(), 13);

        let chain_id: u64 = rlp.val_at(0).unwrap();
        assert_eq!(chain_id, 84532);
        let to: Address = rlp.val_at(5).unwrap();
        assert_eq!(to, tx.to);
        assert_eq!(rlp.at(8).unwrap().item_count().unwrap(), 0);

        let auths = rlp.at(9).unwrap();
        assert_eq!(auths.item_count().unwrap(), 1);
        let auth = auths.at(0).unwrap();
        assert_eq!(auth.item_count().unwrap(), 6);
        let delegate: Address = auth.val_at(1).unwrap();
        assert_eq!(delegate, tx.authorization_list[0].delegate_address);

        let y_parity: u8 = rlp.val_at(10).unwrap();
        assert_eq!(y_parity as u64, signature.v - 27);

        let recovered = signature.recover(tx.signing_hash()).unwrap();
        assert_eq!(recovered, wallet.address());
    }

    #[test]
    fn test_signing_hash_covers_authorizations() {
        let base = sample_tx();
        let mut other = base.clone();
        other.authorization_list[0].account_nonce = 1;
        assert_ne!(base.signing_hash(), other.signing_hash());
    }

    #[test]
    fn test_rejects_eip155_v() {
        let sig = Signature { r: U256::one(), s: U256::one(), v: 168_000 };
        assert!(sample_tx().encode_signed(&sig).is_err());
    }
}

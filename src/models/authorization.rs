//! ERC-3009 `TransferWithAuthorization` payloads and their EIP-712 form.

use ethers::types::{
    transaction::eip712::{Eip712, TypedData},
    Address, Signature, H256, U256,
};
use serde::{Deserialize, Serialize};

/// EIP-712 domain of the token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAuthorization {
    pub from: Address,
    pub to: Address,
    #[serde(with = "decimal_u256")]
    pub value: U256,
    pub valid_after: u64,
    pub valid_before: u64,
    pub nonce: H256,
}

impl TransferAuthorization {
    pub fn typed_data(&self, domain: &TokenDomain) -> Result<TypedData, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" }
                ],
                "TransferWithAuthorization": [
                    { "name": "from", "type": "address" },
                    { "name": "to", "type": "address" },
                    { "name": "value", "type": "uint256" },
                    { "name": "validAfter", "type": "uint256" },
                    { "name": "validBefore", "type": "uint256" },
                    { "name": "nonce", "type": "bytes32" }
                ]
            },
            "primaryType": "TransferWithAuthorization",
            "domain": {
                "name": domain.name,
                "version": domain.version,
                "chainId": domain.chain_id,
                "verifyingContract": format!("{:?}", domain.verifying_contract)
            },
            "message": {
                "from": format!("{:?}", self.from),
                "to": format!("{:?}", self.to),
                "value": self.value.to_string(),
                "validAfter": self.valid_after.to_string(),
                "validBefore": self.valid_before.to_string(),
                "nonce": format!("{:?}", self.nonce)
            }
        }))
    }

    /// Address that produced `signature` over this authorization.
    pub fn recover_signer(&self, domain: &TokenDomain, signature: &Signature) -> Option<Address> {
        let typed = self.typed_data(domain).ok()?;
        let digest = typed.encode_eip712().ok()?;
        signature.recover(H256::from(digest)).ok()
    }

    pub fn is_within_window(&self, now: u64) -> bool {
        // Six seconds of headroom for the relay to land.
        self.valid_after <= now && self.valid_before >= now + 6
    }
}

/// `v`, `r`, `s` as the token contract expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParts {
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl From<&Signature> for SignatureParts {
    fn from(sig: &Signature) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        sig.r.to_big_endian(&mut r);
        sig.s.to_big_endian(&mut s);
        Self {
            v: sig.v as u8,
            r,
            s,
        }
    }
}

/// Parses a 65-byte hex signature, normalising `v` to 27/28.
///
/// Any other `v` (e.g. EIP-155 style 37/38) is rejected; the token contract
/// only accepts 27 or 28.
pub fn parse_signature(hex_sig: &str) -> Option<Signature> {
    let trimmed = hex_sig.trim();
    let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed)).ok()?;
    if bytes.len() != 65 {
        return None;
    }
    let mut sig = Signature::try_from(bytes.as_slice()).ok()?;
    if sig.v < 27 {
        sig.v += 27;
    }
    matches!(sig.v, 27 | 28).then_some(sig)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub facilitator_id: String,
    pub authorization: TransferAuthorization,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    pub tx_hash: String,
    pub facilitator_id: String,
    pub payer: Address,
    pub recipient: Address,
    pub amount: String,
}

mod decimal_u256 {
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_dec_str(raw.trim()).map_err(|e| D::Error::custom(format!("invalid amount {}: {}", raw, e)))
    }
}

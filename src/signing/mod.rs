//! Signing coordinator.
//!
//! Transactions, personal messages, and EIP-712 payloads all follow the same
//! shape: resolve the signing path for the address, forward the request over
//! the bridge, then verify the returned signature actually belongs to the
//! requested address before handing it back. A device that signs with the
//! wrong key produces [`KeyringError::SignatureMismatch`], never a silently
//! wrong signature.

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::transaction::eip712::{Eip712, TypedData};
use ethers::types::{
    Address, Bytes, Eip1559TransactionRequest, NameOrAddress, RecoveryMessage,
    Signature as EcdsaSignature, TransactionRequest, U256, U64,
};
use tracing::debug;

use crate::bridge::{EthereumTxRequest, SignedTxPayload};
use crate::core::derive::{is_same_address, to_checksum_address};
use crate::core::errors::KeyringError;
use crate::keyring::Keyring;

/// EIP-712 revision; V4 adds arrays and recursive structs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedDataVersion {
    V3,
    V4,
}

/// Raw ECDSA signature components as returned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSignature {
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl TryFrom<&SignedTxPayload> for TxSignature {
    type Error = KeyringError;

    fn try_from(payload: &SignedTxPayload) -> Result<Self, Self::Error> {
        Ok(Self {
            v: parse_v(&payload.v)?,
            r: parse_quantity(&payload.r)?,
            s: parse_quantity(&payload.s)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTx {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: u64,
    pub signature: Option<TxSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Tx {
    pub nonce: U256,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: U256,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: u64,
    pub signature: Option<TxSignature>,
}

/// Transaction record the coordinator signs. Construction and gas semantics
/// are the caller's business; the keyring only needs the signable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxRecord {
    Legacy(LegacyTx),
    Eip1559(Eip1559Tx),
}

impl TxRecord {
    pub fn chain_id(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.chain_id,
            Self::Eip1559(tx) => tx.chain_id,
        }
    }

    pub fn signature(&self) -> Option<&TxSignature> {
        match self {
            Self::Legacy(tx) => tx.signature.as_ref(),
            Self::Eip1559(tx) => tx.signature.as_ref(),
        }
    }

    pub fn with_signature(self, signature: TxSignature) -> Self {
        match self {
            Self::Legacy(tx) => Self::Legacy(LegacyTx { signature: Some(signature), ..tx }),
            Self::Eip1559(tx) => Self::Eip1559(Eip1559Tx { signature: Some(signature), ..tx }),
        }
    }

    /// Bridge-neutral wire record, quantities as 0x-prefixed hex.
    pub fn to_bridge_request(&self) -> EthereumTxRequest {
        match self {
            Self::Legacy(tx) => EthereumTxRequest {
                to: tx.to.map(format_address),
                value: format_quantity(tx.value),
                data: format_data(&tx.data),
                chain_id: tx.chain_id,
                nonce: format_quantity(tx.nonce),
                gas_limit: format_quantity(tx.gas_limit),
                gas_price: Some(format_quantity(tx.gas_price)),
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
            },
            Self::Eip1559(tx) => EthereumTxRequest {
                to: tx.to.map(format_address),
                value: format_quantity(tx.value),
                data: format_data(&tx.data),
                chain_id: tx.chain_id,
                nonce: format_quantity(tx.nonce),
                gas_limit: format_quantity(tx.gas_limit),
                gas_price: None,
                max_fee_per_gas: Some(format_quantity(tx.max_fee_per_gas)),
                max_priority_fee_per_gas: Some(format_quantity(tx.max_priority_fee_per_gas)),
            },
        }
    }

    fn to_typed_transaction(&self) -> TypedTransaction {
        match self {
            Self::Legacy(tx) => TransactionRequest {
                to: tx.to.map(NameOrAddress::Address),
                gas: Some(tx.gas_limit),
                gas_price: Some(tx.gas_price),
                value: Some(tx.value),
                data: Some(tx.data.clone()),
                nonce: Some(tx.nonce),
                chain_id: Some(U64::from(tx.chain_id)),
                ..Default::default()
            }
            .into(),
            Self::Eip1559(tx) => Eip1559TransactionRequest {
                to: tx.to.map(NameOrAddress::Address),
                gas: Some(tx.gas_limit),
                value: Some(tx.value),
                data: Some(tx.data.clone()),
                nonce: Some(tx.nonce),
                max_priority_fee_per_gas: Some(tx.max_priority_fee_per_gas),
                max_fee_per_gas: Some(tx.max_fee_per_gas),
                chain_id: Some(U64::from(tx.chain_id)),
                ..Default::default()
            }
            .into(),
        }
    }
}

fn format_quantity(value: U256) -> String {
    format!("0x{:x}", value)
}

fn format_data(data: &Bytes) -> String {
    format!("0x{}", hex::encode(data))
}

fn format_address(address: Address) -> String {
    to_checksum_address(&format!("0x{:x}", address))
}

fn parse_quantity(value: &str) -> Result<U256, KeyringError> {
    U256::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| KeyringError::Device(format!("bad signature component {:?}: {}", value, e)))
}

fn parse_v(value: &str) -> Result<u64, KeyringError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| KeyringError::Device(format!("bad recovery value {:?}: {}", value, e)))
}

/// Recover the checksummed signer address from a signed record. Handles all
/// three v encodings: raw parity, 27/28, and EIP-155.
pub fn recover_tx_signer(record: &TxRecord) -> Result<String, KeyringError> {
    let signature = record.signature().ok_or_else(|| {
        KeyringError::SignatureMismatch("transaction carries no signature".to_string())
    })?;
    let sighash = record.to_typed_transaction().sighash();
    let signature = EcdsaSignature { r: signature.r, s: signature.s, v: signature.v };
    let signer = signature
        .recover(RecoveryMessage::Hash(sighash))
        .map_err(|e| KeyringError::SignatureMismatch(format!("cannot recover signer: {}", e)))?;
    Ok(format_address(signer))
}

impl Keyring {
    /// Sign a transaction for `address`. The returned record carries the
    /// device signature, already verified to recover to `address`.
    pub async fn sign_transaction(
        &mut self,
        address: &str,
        tx: TxRecord,
    ) -> Result<TxRecord, KeyringError> {
        let path = self.get_hd_path(address).await?;
        debug!(address = %address, path = %path, chain_id = tx.chain_id(), "signing transaction");

        let request = tx.to_bridge_request();
        let payload = self
            .bridge()
            .ethereum_sign_transaction(&path, &request)
            .await
            .into_result()?;
        let signed = tx.with_signature(TxSignature::try_from(&payload)?);

        let signer = recover_tx_signer(&signed)?;
        if !is_same_address(&signer, address) {
            return Err(KeyringError::SignatureMismatch(format!(
                "signature was produced by {} instead of {}",
                signer, address
            )));
        }
        Ok(signed)
    }

    /// EIP-191 personal message. `message` is the hex-encoded payload, with
    /// or without the 0x prefix. Returns the 0x-prefixed 65-byte signature.
    pub async fn sign_personal_message(
        &mut self,
        address: &str,
        message: &str,
    ) -> Result<String, KeyringError> {
        let path = self.get_hd_path(address).await?;
        let hex_message = message.strip_prefix("0x").unwrap_or(message);

        let payload = self
            .bridge()
            .ethereum_sign_message(&path, hex_message, true)
            .await
            .into_result()?;
        self.check_reported_signer(address, &payload.address)?;
        Ok(format!("0x{}", payload.signature))
    }

    pub async fn sign_message(
        &mut self,
        address: &str,
        message: &str,
    ) -> Result<String, KeyringError> {
        self.sign_personal_message(address, message).await
    }

    /// EIP-712. The domain and struct hashes are computed locally and sent
    /// alongside the full payload, so constrained devices can sign blind.
    pub async fn sign_typed_data(
        &mut self,
        address: &str,
        data: &TypedData,
        version: TypedDataVersion,
    ) -> Result<String, KeyringError> {
        let path = self.get_hd_path(address).await?;

        let domain_hash = data.domain_separator().map_err(|e| {
            KeyringError::SerializationError(format!("EIP-712 domain hashing failed: {}", e))
        })?;
        let message_hash = data.struct_hash().map_err(|e| {
            KeyringError::SerializationError(format!("EIP-712 struct hashing failed: {}", e))
        })?;

        let payload = self
            .bridge()
            .ethereum_sign_typed_data(
                &path,
                data,
                &hex::encode(domain_hash),
                &hex::encode(message_hash),
                version == TypedDataVersion::V4,
            )
            .await
            .into_result()?;
        self.check_reported_signer(address, &payload.address)?;
        Ok(format!("0x{}", payload.signature))
    }

    fn check_reported_signer(&self, expected: &str, reported: &str) -> Result<(), KeyringError> {
        if is_same_address(expected, reported) {
            return Ok(());
        }
        Err(KeyringError::SignatureMismatch(format!(
            "signature was produced by {} instead of {}",
            reported, expected
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::MockBridge;
    use crate::core::session::KeyringSnapshot;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;
    use std::sync::Arc;

    fn sample_legacy(chain_id: u64) -> TxRecord {
        TxRecord::Legacy(LegacyTx {
            nonce: U256::from(7u64),
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: U256::from(21_000u64),
            to: Some(Address::from_str("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap()),
            value: U256::from(1_000_000u64),
            data: Bytes::default(),
            chain_id,
            signature: None,
        })
    }

    fn sample_eip1559(chain_id: u64) -> TxRecord {
        TxRecord::Eip1559(Eip1559Tx {
            nonce: U256::zero(),
            max_priority_fee_per_gas: U256::from(1_500_000_000u64),
            max_fee_per_gas: U256::from(30_000_000_000u64),
            gas_limit: U256::from(50_000u64),
            to: Some(Address::from_str("0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359").unwrap()),
            value: U256::from(42u64),
            data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
            chain_id,
            signature: None,
        })
    }

    fn mail_typed_data() -> TypedData {
        serde_json::from_value(serde_json::json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" }
                ],
                "Mail": [
                    { "name": "contents", "type": "string" }
                ]
            },
            "primaryType": "Mail",
            "domain": {
                "name": "Ether Mail",
                "version": "1",
                "chainId": 1,
                "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
            },
            "message": { "contents": "Hello" }
        }))
        .unwrap()
    }

    async fn keyring_with_account() -> (Arc<MockBridge>, Keyring, String) {
        let bridge = Arc::new(MockBridge::new());
        let mut keyring = Keyring::new(bridge.clone(), None);
        let accounts = keyring.add_accounts(1).await.unwrap();
        let address = accounts[0].clone();
        (bridge, keyring, address)
    }

    #[test]
    fn test_signature_payload_parsing() {
        let payload = SignedTxPayload {
            v: "0x26".to_string(),
            r: "0x0102".to_string(),
            s: "ff".to_string(),
        };
        let signature = TxSignature::try_from(&payload).unwrap();
        assert_eq!(signature.v, 0x26);
        assert_eq!(signature.r, U256::from(0x0102u64));
        assert_eq!(signature.s, U256::from(0xffu64));

        let bad = SignedTxPayload {
            v: "0xzz".to_string(),
            r: "0x01".to_string(),
            s: "0x01".to_string(),
        };
        assert!(TxSignature::try_from(&bad).is_err());
    }

    #[test]
    fn test_recover_rejects_unsigned_record() {
        let err = recover_tx_signer(&sample_legacy(1)).unwrap_err();
        assert!(matches!(err, KeyringError::SignatureMismatch(_)));
    }

    #[test]
    fn test_bridge_request_shapes() {
        let legacy = sample_legacy(1).to_bridge_request();
        assert_eq!(legacy.gas_price.as_deref(), Some("0x4a817c800"));
        assert!(legacy.max_fee_per_gas.is_none());
        assert_eq!(legacy.nonce, "0x7");
        assert_eq!(legacy.data, "0x");

        let dynamic = sample_eip1559(5).to_bridge_request();
        assert!(dynamic.gas_price.is_none());
        assert_eq!(dynamic.max_fee_per_gas.as_deref(), Some("0x6fc23ac00"));
        assert_eq!(dynamic.data, "0xdeadbeef");
        assert_eq!(dynamic.chain_id, 5);
    }

    #[tokio::test]
    async fn test_sign_legacy_transaction_recovers_to_signer() {
        let (_, mut keyring, address) = keyring_with_account().await;
        let signed = keyring.sign_transaction(&address, sample_legacy(1)).await.unwrap();

        let signature = signed.signature().unwrap();
        // EIP-155 parity for chain id 1 lands on 37 or 38.
        assert!(signature.v == 37 || signature.v == 38);
        assert_eq!(recover_tx_signer(&signed).unwrap(), address);
    }

    #[tokio::test]
    async fn test_sign_eip1559_transaction_recovers_to_signer() {
        let (_, mut keyring, address) = keyring_with_account().await;
        let signed = keyring.sign_transaction(&address, sample_eip1559(1)).await.unwrap();

        let signature = signed.signature().unwrap();
        assert!(signature.v <= 1);
        assert_eq!(recover_tx_signer(&signed).unwrap(), address);
    }

    #[tokio::test]
    async fn test_rogue_signer_is_rejected() {
        let (bridge, mut keyring, address) = keyring_with_account().await;
        bridge.set_rogue_signer(true);

        let err = keyring.sign_transaction(&address, sample_legacy(1)).await.unwrap_err();
        assert!(matches!(err, KeyringError::SignatureMismatch(_)));

        let err = keyring.sign_transaction(&address, sample_eip1559(1)).await.unwrap_err();
        assert!(matches!(err, KeyringError::SignatureMismatch(_)));

        let err = keyring.sign_personal_message(&address, "0xdeadbeef").await.unwrap_err();
        assert!(matches!(err, KeyringError::SignatureMismatch(_)));
    }

    #[tokio::test]
    async fn test_sign_personal_message() {
        let (_, mut keyring, address) = keyring_with_account().await;
        let signature = keyring
            .sign_personal_message(&address, "0x48656c6c6f")
            .await
            .unwrap();
        assert!(signature.starts_with("0x"));
        assert_eq!(signature.len(), 2 + 65 * 2);

        // Prefix handling: the same payload without 0x signs identically.
        let bare = keyring.sign_message(&address, "48656c6c6f").await.unwrap();
        assert_eq!(bare, signature);
    }

    #[tokio::test]
    async fn test_sign_typed_data_versions() {
        let (_, mut keyring, address) = keyring_with_account().await;
        let data = mail_typed_data();

        let v4 = keyring
            .sign_typed_data(&address, &data, TypedDataVersion::V4)
            .await
            .unwrap();
        assert!(v4.starts_with("0x"));
        assert_eq!(v4.len(), 2 + 65 * 2);

        // Same hashes either way for a payload with no arrays.
        let v3 = keyring
            .sign_typed_data(&address, &data, TypedDataVersion::V3)
            .await
            .unwrap();
        assert_eq!(v3, v4);
    }

    #[tokio::test]
    async fn test_device_failure_propagates() {
        let (bridge, mut keyring, address) = keyring_with_account().await;
        bridge.fail_next(Some("Cancelled"));
        let err = keyring.sign_transaction(&address, sample_legacy(1)).await.unwrap_err();
        assert_eq!(format!("{}", err), "Device error: Cancelled");
    }

    #[tokio::test]
    async fn test_signing_restores_path_for_legacy_snapshots() {
        // An account persisted with no detail at all forces the BIP44
        // fallback inside get_hd_path.
        let bridge = Arc::new(MockBridge::new());
        let mut keyring = Keyring::new(bridge.clone(), None);
        let address = keyring.add_accounts(1).await.unwrap()[0].clone();

        let snapshot = KeyringSnapshot {
            accounts: vec![address.clone()],
            ..Default::default()
        };
        let mut revived = Keyring::new(bridge, Some(snapshot));
        let signed = revived.sign_transaction(&address, sample_legacy(1)).await.unwrap();
        assert_eq!(recover_tx_signer(&signed).unwrap(), address);
    }
}

//! Signing bridge contract.
//!
//! The keyring never speaks USB/WebUSB itself; everything that touches the
//! physical device goes through [`SigningBridge`]. The bridge also surfaces
//! connect/disconnect notifications over an explicit channel — consumers pump
//! them into [`crate::Keyring::handle_device_event`] so an ambiguous device
//! set invalidates cached keys.

pub mod mock;

use async_trait::async_trait;
use ethers::types::transaction::eip712::TypedData;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::errors::KeyringError;

/// One-time bridge session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    pub manifest: Manifest,
    pub lazy_load: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub email: String,
    pub app_url: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            manifest: Manifest {
                email: "support@example.org".to_string(),
                app_url: "https://example.org".to_string(),
            },
            lazy_load: true,
        }
    }
}

/// Request for one derived public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKeyRequest {
    pub path: String,
    pub coin: String,
}

impl PublicKeyRequest {
    pub fn ethereum(path: impl Into<String>) -> Self {
        Self { path: path.into(), coin: "ETH".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedPublicKey {
    pub path: String,
    pub public_key: String,
    pub chain_code: String,
}

/// Signature components for a transaction, hex-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTxPayload {
    pub v: String,
    pub r: String,
    pub s: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedMessagePayload {
    pub address: String,
    pub signature: String,
}

/// Bridge-neutral transaction record: numeric fields as 0x-prefixed hex
/// strings, chain id explicit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthereumTxRequest {
    pub to: Option<String>,
    pub value: String,
    pub data: String,
    pub chain_id: u64,
    pub nonce: String,
    pub gas_limit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
}

/// Raw bridge outcome. The wire contract reports failure explicitly rather
/// than through transport errors, so the error text is optional.
#[derive(Debug, Clone)]
pub enum BridgeResponse<T> {
    Success(T),
    Failure { error: Option<String> },
}

impl<T> BridgeResponse<T> {
    pub fn into_result(self) -> Result<T, KeyringError> {
        match self {
            BridgeResponse::Success(payload) => Ok(payload),
            BridgeResponse::Failure { error } => Err(KeyringError::device(error)),
        }
    }
}

/// Device attach/detach notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected { device_id: String },
    Disconnected { device_id: String },
}

/// Defines the interface to the hardware signing device.
#[async_trait]
pub trait SigningBridge: Send + Sync {
    /// One-time session setup; implementations skip when already initialized.
    async fn init(&self, config: &BridgeConfig) -> Result<(), KeyringError>;

    /// Tear down session resources.
    async fn dispose(&self) -> Result<(), KeyringError>;

    /// Fetch extended public keys for every path in the bundle, atomically.
    async fn get_public_key(
        &self,
        bundle: &[PublicKeyRequest],
    ) -> BridgeResponse<Vec<DerivedPublicKey>>;

    /// Sign a transaction at `path`, returning raw v/r/s.
    async fn ethereum_sign_transaction(
        &self,
        path: &str,
        tx: &EthereumTxRequest,
    ) -> BridgeResponse<SignedTxPayload>;

    /// Sign a personal message; `hex_mode` means `message` is hex-encoded bytes.
    async fn ethereum_sign_message(
        &self,
        path: &str,
        message: &str,
        hex_mode: bool,
    ) -> BridgeResponse<SignedMessagePayload>;

    /// EIP-712. Both the structured payload and its precomputed hashes are
    /// forwarded; constrained devices sign the hashes blindly.
    async fn ethereum_sign_typed_data(
        &self,
        path: &str,
        data: &TypedData,
        domain_hash: &str,
        message_hash: &str,
        v4_compat: bool,
    ) -> BridgeResponse<SignedMessagePayload>;

    /// Number of physical devices currently attached.
    fn connected_devices(&self) -> usize;

    /// Device model, if the bridge has seen it.
    fn model(&self) -> Option<String>;

    /// Connect/disconnect notifications.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceEvent>;
}

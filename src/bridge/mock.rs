//! In-process mock device for tests and examples.
//!
//! Holds a fixed seed and performs real BIP32 derivation and real recoverable
//! ECDSA, so unlock/derive/sign round trips through the keyring behave exactly
//! like a healthy device. Failure injection and device attach/detach are
//! scriptable.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{
    Address, Bytes, Eip1559TransactionRequest, NameOrAddress, TransactionRequest, U256, U64,
};
use hmac::{Hmac, Mac};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::Field;
use parking_lot::Mutex;
use sha2::Sha512;
use sha3::{Digest, Keccak256};
use tokio::sync::mpsc;
use tracing::debug;
use zeroize::Zeroizing;

use super::{
    BridgeConfig, BridgeResponse, DerivedPublicKey, DeviceEvent, EthereumTxRequest,
    PublicKeyRequest, SignedMessagePayload, SignedTxPayload, SigningBridge,
};
use crate::core::derive::to_checksum_address;
use crate::core::errors::KeyringError;
use crate::core::paths::parse_path;

type HmacSha512 = Hmac<Sha512>;

const HARDENED_OFFSET: u32 = 0x8000_0000;
const DEFAULT_SEED: [u8; 64] = [0x5e; 64];
const ROGUE_KEY: [u8; 32] = [0x77; 32];

/// Private BIP32 node. Mock-side only; the keyring itself never sees private
/// key material.
struct Bip32Node {
    key: Zeroizing<[u8; 32]>,
    chain_code: [u8; 32],
}

impl Bip32Node {
    fn master(seed: &[u8]) -> Result<Self, KeyringError> {
        let mut mac = HmacSha512::new_from_slice(b"Bitcoin seed")
            .map_err(|e| KeyringError::InvalidKey(format!("HMAC initialization failed: {}", e)))?;
        mac.update(seed);
        let digest = mac.finalize().into_bytes();

        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&digest[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);
        Ok(Self { key, chain_code })
    }

    fn signing_key(&self) -> Result<SigningKey, KeyringError> {
        SigningKey::from_slice(&self.key[..])
            .map_err(|e| KeyringError::InvalidKey(format!("invalid private key: {}", e)))
    }

    fn derive(&self, index: u32) -> Result<Self, KeyringError> {
        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| KeyringError::InvalidKey(format!("HMAC initialization failed: {}", e)))?;
        if index >= HARDENED_OFFSET {
            mac.update(&[0u8]);
            mac.update(&self.key[..]);
        } else {
            let public = self.signing_key()?.verifying_key().to_encoded_point(true);
            mac.update(public.as_bytes());
        }
        mac.update(&index.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        // child = (IL + k) mod n
        let il = k256::SecretKey::from_slice(&digest[..32])
            .map_err(|e| KeyringError::InvalidKey(format!("derived tweak out of range: {}", e)))?;
        let parent = k256::SecretKey::from_slice(&self.key[..])
            .map_err(|e| KeyringError::InvalidKey(format!("invalid parent key: {}", e)))?;
        let child_scalar = *il.to_nonzero_scalar() + *parent.to_nonzero_scalar();
        if bool::from(child_scalar.is_zero()) {
            return Err(KeyringError::InvalidKey("derived child scalar is zero".to_string()));
        }

        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&child_scalar.to_bytes());
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);
        Ok(Self { key, chain_code })
    }

    fn derive_path(&self, components: &[u32]) -> Result<Self, KeyringError> {
        let mut node = Self { key: self.key.clone(), chain_code: self.chain_code };
        for index in components {
            node = node.derive(*index)?;
        }
        Ok(node)
    }
}

/// Deterministic in-process signing device.
pub struct MockBridge {
    seed: Zeroizing<Vec<u8>>,
    initialized: AtomicBool,
    devices: Mutex<HashSet<String>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<DeviceEvent>>>,
    fail_next: Mutex<Option<Option<String>>>,
    rogue_signer: AtomicBool,
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBridge {
    pub fn new() -> Self {
        Self::with_seed(&DEFAULT_SEED)
    }

    pub fn with_seed(seed: &[u8]) -> Self {
        let mut devices = HashSet::new();
        devices.insert("mock-device-0".to_string());
        Self {
            seed: Zeroizing::new(seed.to_vec()),
            initialized: AtomicBool::new(false),
            devices: Mutex::new(devices),
            subscribers: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
            rogue_signer: AtomicBool::new(false),
        }
    }

    /// Make the next bridge call fail with the given error text (or none).
    pub fn fail_next(&self, error: Option<&str>) {
        *self.fail_next.lock() = Some(error.map(str::to_string));
    }

    /// Sign subsequent requests with an unrelated key, so address validation
    /// in the coordinator must reject the result.
    pub fn set_rogue_signer(&self, rogue: bool) {
        self.rogue_signer.store(rogue, Ordering::SeqCst);
    }

    pub fn connect_device(&self, device_id: &str) {
        self.devices.lock().insert(device_id.to_string());
        self.emit(DeviceEvent::Connected { device_id: device_id.to_string() });
    }

    pub fn disconnect_device(&self, device_id: &str) {
        self.devices.lock().remove(device_id);
        self.emit(DeviceEvent::Disconnected { device_id: device_id.to_string() });
    }

    fn emit(&self, event: DeviceEvent) {
        self.subscribers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn scripted_failure<T>(&self) -> Option<BridgeResponse<T>> {
        self.fail_next.lock().take().map(|error| BridgeResponse::Failure { error })
    }

    fn node_for(&self, path: &str) -> Result<Bip32Node, KeyringError> {
        let components = parse_path(path)?;
        Bip32Node::master(&self.seed)?.derive_path(&components)
    }

    fn signing_key_for(&self, path: &str) -> Result<SigningKey, KeyringError> {
        if self.rogue_signer.load(Ordering::SeqCst) {
            return SigningKey::from_slice(&ROGUE_KEY)
                .map_err(|e| KeyringError::InvalidKey(format!("invalid rogue key: {}", e)));
        }
        self.node_for(path)?.signing_key()
    }

    fn sign_digest(
        &self,
        path: &str,
        digest: &[u8; 32],
    ) -> Result<SignedMessagePayload, KeyringError> {
        let key = self.signing_key_for(path)?;
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(digest)
            .map_err(|e| KeyringError::Device(format!("signing failed: {}", e)))?;

        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(27 + recovery_id.to_byte());
        Ok(SignedMessagePayload {
            address: address_of(&key),
            signature: hex::encode(bytes),
        })
    }
}

fn address_of(key: &SigningKey) -> String {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    to_checksum_address(&format!("0x{}", hex::encode(&hash[12..])))
}

fn parse_quantity(value: &str) -> Result<U256, KeyringError> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| KeyringError::InvalidKey(format!("bad quantity {:?}: {}", value, e)))
}

fn parse_data(value: &str) -> Result<Bytes, KeyringError> {
    let digits = value.trim_start_matches("0x");
    let bytes = hex::decode(digits)
        .map_err(|e| KeyringError::InvalidKey(format!("bad data hex: {}", e)))?;
    Ok(Bytes::from(bytes))
}

/// Rebuild the signable transaction from the wire record, the same way real
/// device firmware re-assembles it before hashing.
fn to_typed_transaction(tx: &EthereumTxRequest) -> Result<TypedTransaction, KeyringError> {
    let to = match &tx.to {
        Some(address) => Some(NameOrAddress::Address(Address::from_str(address).map_err(
            |e| KeyringError::InvalidKey(format!("bad to address {:?}: {}", address, e)),
        )?)),
        None => None,
    };
    let value = Some(parse_quantity(&tx.value)?);
    let data = Some(parse_data(&tx.data)?);
    let nonce = Some(parse_quantity(&tx.nonce)?);
    let gas = Some(parse_quantity(&tx.gas_limit)?);
    let chain_id = Some(U64::from(tx.chain_id));

    if let Some(gas_price) = &tx.gas_price {
        Ok(TransactionRequest {
            to,
            value,
            data,
            nonce,
            gas,
            chain_id,
            gas_price: Some(parse_quantity(gas_price)?),
            ..Default::default()
        }
        .into())
    } else {
        let max_fee = tx.max_fee_per_gas.as_deref().map(parse_quantity).transpose()?;
        let max_priority =
            tx.max_priority_fee_per_gas.as_deref().map(parse_quantity).transpose()?;
        Ok(Eip1559TransactionRequest {
            to,
            value,
            data,
            nonce,
            gas,
            chain_id,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: max_priority,
            ..Default::default()
        }
        .into())
    }
}

#[async_trait]
impl SigningBridge for MockBridge {
    async fn init(&self, _config: &BridgeConfig) -> Result<(), KeyringError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("mock bridge already initialized");
        }
        Ok(())
    }

    async fn dispose(&self) -> Result<(), KeyringError> {
        self.initialized.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn get_public_key(
        &self,
        bundle: &[PublicKeyRequest],
    ) -> BridgeResponse<Vec<DerivedPublicKey>> {
        if let Some(failure) = self.scripted_failure() {
            return failure;
        }

        let mut payload = Vec::with_capacity(bundle.len());
        for request in bundle {
            let node = match self.node_for(&request.path) {
                Ok(node) => node,
                Err(e) => return BridgeResponse::Failure { error: Some(e.to_string()) },
            };
            let key = match node.signing_key() {
                Ok(key) => key,
                Err(e) => return BridgeResponse::Failure { error: Some(e.to_string()) },
            };
            payload.push(DerivedPublicKey {
                path: request.path.clone(),
                public_key: hex::encode(key.verifying_key().to_encoded_point(true).as_bytes()),
                chain_code: hex::encode(node.chain_code),
            });
        }
        BridgeResponse::Success(payload)
    }

    async fn ethereum_sign_transaction(
        &self,
        path: &str,
        tx: &EthereumTxRequest,
    ) -> BridgeResponse<SignedTxPayload> {
        if let Some(failure) = self.scripted_failure() {
            return failure;
        }

        let result = (|| -> Result<SignedTxPayload, KeyringError> {
            let sighash = to_typed_transaction(tx)?.sighash();
            let key = self.signing_key_for(path)?;
            let (signature, recovery_id) = key
                .sign_prehash_recoverable(sighash.as_bytes())
                .map_err(|e| KeyringError::Device(format!("signing failed: {}", e)))?;

            let v = if tx.gas_price.is_some() {
                // EIP-155 encoding for legacy transactions.
                35 + 2 * tx.chain_id + u64::from(recovery_id.to_byte())
            } else {
                u64::from(recovery_id.to_byte())
            };
            let bytes = signature.to_bytes();
            Ok(SignedTxPayload {
                v: format!("0x{:x}", v),
                r: format!("0x{}", hex::encode(&bytes[..32])),
                s: format!("0x{}", hex::encode(&bytes[32..])),
            })
        })();

        match result {
            Ok(payload) => BridgeResponse::Success(payload),
            Err(e) => BridgeResponse::Failure { error: Some(e.to_string()) },
        }
    }

    async fn ethereum_sign_message(
        &self,
        path: &str,
        message: &str,
        hex_mode: bool,
    ) -> BridgeResponse<SignedMessagePayload> {
        if let Some(failure) = self.scripted_failure() {
            return failure;
        }

        let result = (|| -> Result<SignedMessagePayload, KeyringError> {
            let bytes = if hex_mode {
                hex::decode(message.trim_start_matches("0x"))
                    .map_err(|e| KeyringError::InvalidKey(format!("bad message hex: {}", e)))?
            } else {
                message.as_bytes().to_vec()
            };
            let mut hasher = Keccak256::new();
            hasher.update(format!("\x19Ethereum Signed Message:\n{}", bytes.len()).as_bytes());
            hasher.update(&bytes);
            let digest: [u8; 32] = hasher.finalize().into();
            self.sign_digest(path, &digest)
        })();

        match result {
            Ok(payload) => BridgeResponse::Success(payload),
            Err(e) => BridgeResponse::Failure { error: Some(e.to_string()) },
        }
    }

    async fn ethereum_sign_typed_data(
        &self,
        path: &str,
        _data: &TypedData,
        domain_hash: &str,
        message_hash: &str,
        _v4_compat: bool,
    ) -> BridgeResponse<SignedMessagePayload> {
        if let Some(failure) = self.scripted_failure() {
            return failure;
        }

        let result = (|| -> Result<SignedMessagePayload, KeyringError> {
            let domain = hex::decode(domain_hash.trim_start_matches("0x"))
                .map_err(|e| KeyringError::InvalidKey(format!("bad domain hash: {}", e)))?;
            let message = hex::decode(message_hash.trim_start_matches("0x"))
                .map_err(|e| KeyringError::InvalidKey(format!("bad message hash: {}", e)))?;
            let mut hasher = Keccak256::new();
            hasher.update([0x19, 0x01]);
            hasher.update(&domain);
            hasher.update(&message);
            let digest: [u8; 32] = hasher.finalize().into();
            self.sign_digest(path, &digest)
        })();

        match result {
            Ok(payload) => BridgeResponse::Success(payload),
            Err(e) => BridgeResponse::Failure { error: Some(e.to_string()) },
        }
    }

    fn connected_devices(&self) -> usize {
        self.devices.lock().len()
    }

    fn model(&self) -> Option<String> {
        Some("T".to_string())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<DeviceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_public_key_is_deterministic() {
        let bridge = MockBridge::new();
        let bundle = vec![PublicKeyRequest::ethereum("m/44'/60'/0'/0")];

        let first = bridge.get_public_key(&bundle).await.into_result().unwrap();
        let second = bridge.get_public_key(&bundle).await.into_result().unwrap();
        assert_eq!(first[0].public_key, second[0].public_key);
        assert_eq!(first[0].chain_code, second[0].chain_code);
        assert_eq!(first[0].public_key.len(), 66);
    }

    #[tokio::test]
    async fn test_different_paths_different_keys() {
        let bridge = MockBridge::new();
        let bundle = vec![
            PublicKeyRequest::ethereum("m/44'/60'/0'/0"),
            PublicKeyRequest::ethereum("m/44'/60'/0'"),
        ];
        let payload = bridge.get_public_key(&bundle).await.into_result().unwrap();
        assert_ne!(payload[0].public_key, payload[1].public_key);
    }

    #[tokio::test]
    async fn test_scripted_failure_consumed_once() {
        let bridge = MockBridge::new();
        bridge.fail_next(Some("Popup closed"));
        let bundle = vec![PublicKeyRequest::ethereum("m/44'/60'/0'/0")];

        let err = bridge.get_public_key(&bundle).await.into_result().unwrap_err();
        assert_eq!(format!("{}", err), "Device error: Popup closed");

        assert!(bridge.get_public_key(&bundle).await.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_device_events_reach_subscribers() {
        let bridge = MockBridge::new();
        let mut rx = bridge.subscribe();

        bridge.connect_device("mock-device-1");
        assert_eq!(bridge.connected_devices(), 2);
        assert_eq!(
            rx.recv().await.unwrap(),
            DeviceEvent::Connected { device_id: "mock-device-1".to_string() }
        );

        bridge.disconnect_device("mock-device-1");
        assert_eq!(bridge.connected_devices(), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            DeviceEvent::Disconnected { device_id: "mock-device-1".to_string() }
        );
    }

    #[tokio::test]
    async fn test_sign_message_reports_signer_address() {
        let bridge = MockBridge::new();
        let path = "m/44'/60'/0'/0/0";
        let payload = bridge
            .ethereum_sign_message(path, "deadbeef", true)
            .await
            .into_result()
            .unwrap();

        let expected = address_of(&bridge.signing_key_for(path).unwrap());
        assert_eq!(payload.address, expected);
        // r || s || v
        assert_eq!(payload.signature.len(), 130);
    }
}

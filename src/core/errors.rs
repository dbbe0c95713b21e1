use std::fmt;

/// Custom error type for keyring operations.
#[derive(Debug)]
pub enum KeyringError {
    /// Setting a base path outside the allow-list.
    UnsupportedPath(String),
    /// Bridge/device reported failure, surfaced verbatim and never retried here.
    Device(String),
    /// The signature's recovered or reported signer differs from the requested address.
    SignatureMismatch(String),
    /// Index resolution exhausted every source.
    UnknownAddress(String),
    /// Removing an address that was never added.
    AddressNotFound(String),
    /// Derivation attempted before the relevant keys were unlocked.
    Locked(String),
    /// Malformed public key, chain code or signature material.
    InvalidKey(String),
    /// Snapshot or wire (de)serialization errors.
    SerializationError(String),
}

impl fmt::Display for KeyringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyringError::UnsupportedPath(msg) => write!(f, "Unsupported HD path: {}", msg),
            KeyringError::Device(msg) => write!(f, "Device error: {}", msg),
            KeyringError::SignatureMismatch(msg) => write!(f, "Signature mismatch: {}", msg),
            KeyringError::UnknownAddress(msg) => write!(f, "Unknown address: {}", msg),
            KeyringError::AddressNotFound(msg) => write!(f, "Address not found: {}", msg),
            KeyringError::Locked(msg) => write!(f, "Keys locked: {}", msg),
            KeyringError::InvalidKey(msg) => write!(f, "Invalid key material: {}", msg),
            KeyringError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for KeyringError {}

impl KeyringError {
    /// Wrap a bridge failure, defaulting missing error text to "Unknown error".
    pub fn device(message: Option<String>) -> Self {
        KeyringError::Device(message.unwrap_or_else(|| "Unknown error".to_string()))
    }
}

impl From<anyhow::Error> for KeyringError {
    fn from(err: anyhow::Error) -> Self {
        KeyringError::Device(err.to_string())
    }
}

impl From<serde_json::Error> for KeyringError {
    fn from(err: serde_json::Error) -> Self {
        KeyringError::SerializationError(err.to_string())
    }
}

//! HD path registry.
//!
//! The same device answers under three mutually incompatible path
//! conventions. Legacy and BIP44 are fixed bases whose account index is a
//! non-hardened child; LedgerLive-style paths embed the index as a hardened
//! account component, so every index is its own device path.

use serde::{Deserialize, Serialize};

use crate::core::errors::KeyringError;

pub const LEGACY_BASE: &str = "m/44'/60'/0'";
pub const BIP44_BASE: &str = "m/44'/60'/0'/0";
pub const LEDGER_LIVE_BASE: &str = "m/44'/60'/0'/0/0";
/// SLIP-0044 testnet path, allowed but outside the three conventions.
pub const SLIP0044_TESTNET_PATH: &str = "m/44'/1'/0'/0";

/// Upper bound for the fallback linear scan in index resolution.
pub const MAX_INDEX: u32 = 1000;
pub const DEFAULT_PER_PAGE: usize = 5;

const HARDENED_OFFSET: u32 = 0x8000_0000;

/// The three path conventions a device can be addressed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HdPathType {
    Legacy,
    #[serde(rename = "BIP44")]
    Bip44,
    LedgerLive,
}

/// Base derivation path for a convention. Total and bidirectional with
/// [`path_type`].
pub fn base_path(path_type: HdPathType) -> &'static str {
    match path_type {
        HdPathType::Legacy => LEGACY_BASE,
        HdPathType::Bip44 => BIP44_BASE,
        HdPathType::LedgerLive => LEDGER_LIVE_BASE,
    }
}

/// Convention for a base path, `None` for anything outside the three bases.
pub fn path_type(base: &str) -> Option<HdPathType> {
    match base {
        LEGACY_BASE => Some(HdPathType::Legacy),
        BIP44_BASE => Some(HdPathType::Bip44),
        LEDGER_LIVE_BASE => Some(HdPathType::LedgerLive),
        _ => None,
    }
}

/// Whether a base path may be activated: the three bases plus the testnet path.
pub fn is_allowed_path(path: &str) -> bool {
    path_type(path).is_some() || path == SLIP0044_TESTNET_PATH
}

pub fn is_ledger_live_path(path: &str) -> bool {
    path == LEDGER_LIVE_BASE
}

/// Concrete device path for an account index under the given base.
pub fn path_for_index(base: &str, index: u32) -> String {
    if is_ledger_live_path(base) {
        format!("m/44'/60'/{}'/0/0", index)
    } else {
        format!("{}/{}", base, index)
    }
}

/// Parse a path string into BIP32 components, hardened bit included.
pub fn parse_path(path: &str) -> Result<Vec<u32>, KeyringError> {
    let mut parts = path.split('/');
    if parts.next() != Some("m") {
        return Err(KeyringError::UnsupportedPath(format!(
            "path must start with m: {}",
            path
        )));
    }

    let mut components = Vec::new();
    for part in parts {
        let (digits, hardened) = match part.strip_suffix('\'') {
            Some(digits) => (digits, true),
            None => (part, false),
        };
        let index: u32 = digits.parse().map_err(|_| {
            KeyringError::UnsupportedPath(format!("bad path component {:?} in {}", part, path))
        })?;
        components.push(if hardened { index | HARDENED_OFFSET } else { index });
    }
    Ok(components)
}

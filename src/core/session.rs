//! Ledger entries and the persisted session snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::paths::{HdPathType, BIP44_BASE, DEFAULT_PER_PAGE};

/// Enumeration row. `index` is the 1-based display index; the stored
/// derivation index is always `index - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub index: u32,
}

/// Ledger entry, keyed by checksummed address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDetail {
    pub hd_path: String,
    /// `None` when the entry was recorded under the testnet path, which is
    /// outside the three conventions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hd_path_type: Option<HdPathType>,
    /// Base-key fingerprint at recording time. Absent for entries created
    /// before the public key was unlocked; those are eligible for repair.
    #[serde(
        default,
        rename = "hdPathBasePublicKey",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_public_key: Option<String>,
    /// 0-based derivation index.
    pub index: u32,
}

impl AccountDetail {
    /// A fixed entry carries both its path and its base-key fingerprint and
    /// must never be overwritten by reconciliation.
    pub fn is_fixed(&self) -> bool {
        self.base_public_key.is_some() && !self.hd_path.is_empty()
    }
}

/// Per-account provenance view returned by [`crate::Keyring::account_info`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub address: String,
    /// 1-based display index.
    pub index: u32,
    pub hd_path_type: Option<HdPathType>,
    pub base_public_key: Option<String>,
}

fn default_hd_path() -> String {
    BIP44_BASE.to_string()
}

fn default_per_page() -> usize {
    DEFAULT_PER_PAGE
}

/// Serializable session state. Every field defaults so snapshots written by
/// older sessions still deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringSnapshot {
    #[serde(default = "default_hd_path")]
    pub hd_path: String,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default)]
    pub unlocked_account: u32,
    #[serde(default)]
    pub account_details: HashMap<String, AccountDetail>,
}

impl Default for KeyringSnapshot {
    fn default() -> Self {
        Self {
            hd_path: default_hd_path(),
            accounts: Vec::new(),
            page: 0,
            per_page: default_per_page(),
            unlocked_account: 0,
            account_details: HashMap::new(),
        }
    }
}

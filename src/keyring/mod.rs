//! Hardware keyring session.
//!
//! [`Keyring`] owns the whole session aggregate: the active path convention,
//! the unlocked-key cache, the account list and its ledger of
//! [`AccountDetail`] entries, and the transient path map populated during
//! pagination. All device interaction goes through the [`SigningBridge`]; the
//! keyring takes `&mut self` for every device-reaching call, so one session
//! can never have two requests in flight.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::bridge::{BridgeConfig, DeviceEvent, PublicKeyRequest, SigningBridge};
use crate::core::derive::{is_same_address, to_checksum_address, ExtendedPublicKey};
use crate::core::errors::KeyringError;
use crate::core::paths::{
    self, HdPathType, BIP44_BASE, DEFAULT_PER_PAGE, LEDGER_LIVE_BASE, MAX_INDEX,
};
use crate::core::session::{Account, AccountDetail, AccountInfo, KeyringSnapshot};

/// Reconciliation needs fingerprints for the base key plus enough
/// LedgerLive-style indices to cover realistic account lists.
const DEFAULT_UNLOCK_SPAN: u32 = 51;

/// Outcome of [`Keyring::unlock`]; an already-warm cache is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockStatus {
    AlreadyUnlocked,
    JustUnlocked,
}

pub struct Keyring {
    bridge: Arc<dyn SigningBridge>,
    hd_path: String,
    accounts: Vec<String>,
    /// Unlocked extended public keys, keyed by concrete derivation path.
    key_cache: HashMap<String, ExtendedPublicKey>,
    page: i64,
    per_page: usize,
    unlocked_account: u32,
    /// Transient address-to-index map for addresses seen during pagination
    /// but not yet added.
    paths: HashMap<String, u32>,
    /// Persistent ledger, keyed by checksummed address.
    account_details: HashMap<String, AccountDetail>,
}

impl Keyring {
    pub fn new(bridge: Arc<dyn SigningBridge>, snapshot: Option<KeyringSnapshot>) -> Self {
        let mut keyring = Self {
            bridge,
            hd_path: BIP44_BASE.to_string(),
            accounts: Vec::new(),
            key_cache: HashMap::new(),
            page: 0,
            per_page: DEFAULT_PER_PAGE,
            unlocked_account: 0,
            paths: HashMap::new(),
            account_details: HashMap::new(),
        };
        if let Some(snapshot) = snapshot {
            keyring.restore(snapshot);
        }
        keyring
    }

    /// One-time bridge session setup; forward to the bridge.
    pub async fn init(&self, config: &BridgeConfig) -> Result<(), KeyringError> {
        self.bridge.init(config).await
    }

    pub async fn dispose(&self) -> Result<(), KeyringError> {
        self.bridge.dispose().await
    }

    /// Device model, if known yet.
    pub fn model(&self) -> Option<String> {
        self.bridge.model()
    }

    pub(crate) fn bridge(&self) -> &Arc<dyn SigningBridge> {
        &self.bridge
    }

    pub fn serialize(&self) -> KeyringSnapshot {
        KeyringSnapshot {
            hd_path: self.hd_path.clone(),
            accounts: self.accounts.clone(),
            page: self.page,
            per_page: self.per_page,
            unlocked_account: self.unlocked_account,
            account_details: self.account_details.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: KeyringSnapshot) {
        self.hd_path = snapshot.hd_path;
        self.accounts = snapshot.accounts;
        self.page = snapshot.page;
        self.per_page = snapshot.per_page;
        self.unlocked_account = snapshot.unlocked_account;
        self.account_details = snapshot.account_details;
    }

    /// Active base path.
    pub fn hd_path(&self) -> &str {
        &self.hd_path
    }

    /// Convention of the active base path; `None` for the testnet path.
    pub fn current_path_type(&self) -> Option<HdPathType> {
        paths::path_type(&self.hd_path)
    }

    /// Set the active base path. Only allow-listed paths are accepted; setting
    /// the already-active path is a no-op. Switching conventions wipes the key
    /// cache — keys cached under another base are cryptographically unrelated.
    pub fn set_hd_path(&mut self, hd_path: &str) -> Result<(), KeyringError> {
        if !paths::is_allowed_path(hd_path) {
            return Err(KeyringError::UnsupportedPath(format!(
                "setting the HD path to {} is not supported",
                hd_path
            )));
        }

        if self.hd_path != hd_path {
            debug!(from = %self.hd_path, to = %hd_path, "switching HD path, resetting session");
            self.key_cache.clear();
            self.page = 0;
            self.per_page = DEFAULT_PER_PAGE;
            self.unlocked_account = 0;
        }
        self.hd_path = hd_path.to_string();
        Ok(())
    }

    pub fn set_hd_path_type(&mut self, path_type: HdPathType) -> Result<(), KeyringError> {
        self.set_hd_path(paths::base_path(path_type))
    }

    fn path_for_index(&self, index: u32) -> String {
        paths::path_for_index(&self.hd_path, index)
    }

    fn is_ledger_live(&self) -> bool {
        self.hd_path == LEDGER_LIVE_BASE
    }

    /// Whether the public keys needed for derivation are cached. Fixed-base
    /// conventions need only the base entry; LedgerLive-style paths need one
    /// entry per index in `[start, start + len)` when a range is given.
    pub fn is_unlocked(&self, start: Option<u32>, len: u32) -> bool {
        if !self.is_ledger_live() {
            return self.key_cache.contains_key(&self.hd_path);
        }
        match start {
            None => !self.key_cache.is_empty(),
            Some(start) => (start..start.saturating_add(len))
                .all(|i| self.key_cache.contains_key(&self.path_for_index(i))),
        }
    }

    /// Fetch public keys from the device for the active base path, plus — for
    /// LedgerLive-style paths with an explicit range — each index in range.
    /// The batch is sent atomically; a bridge failure caches nothing.
    pub async fn unlock(
        &mut self,
        start: Option<u32>,
        len: Option<u32>,
    ) -> Result<UnlockStatus, KeyringError> {
        if self.is_unlocked(start, len.unwrap_or(1)) {
            return Ok(UnlockStatus::AlreadyUnlocked);
        }

        let mut hd_paths = vec![self.hd_path.clone()];
        if let (Some(start), Some(len)) = (start, len) {
            if self.is_ledger_live() {
                for i in start..start.saturating_add(len) {
                    hd_paths.push(self.path_for_index(i));
                }
            }
        }
        let bundle: Vec<PublicKeyRequest> =
            hd_paths.into_iter().map(PublicKeyRequest::ethereum).collect();

        debug!(paths = bundle.len(), "requesting public keys from device");
        let payload = self.bridge.get_public_key(&bundle).await.into_result()?;
        for item in payload {
            let key = ExtendedPublicKey::from_hex(&item.public_key, &item.chain_code)?;
            self.key_cache.insert(item.path, key);
        }
        Ok(UnlockStatus::JustUnlocked)
    }

    /// First derivation index the next [`Self::add_accounts`] will use.
    pub fn set_account_to_unlock(&mut self, index: u32) {
        self.unlocked_account = index;
    }

    /// Derive the checksummed address at `index` under the active convention.
    /// Pure given cache state; requires a preceding [`Self::unlock`].
    pub fn address_from_index(&self, index: u32) -> Result<String, KeyringError> {
        let key = if self.is_ledger_live() {
            let path = self.path_for_index(index);
            self.key_cache
                .get(&path)
                .cloned()
                .ok_or_else(|| KeyringError::Locked(format!("no cached key for {}", path)))?
        } else {
            let base = self
                .key_cache
                .get(&self.hd_path)
                .ok_or_else(|| KeyringError::Locked(format!("no cached key for {}", self.hd_path)))?;
            base.derive_child(index)?
        };
        key.address()
    }

    /// Fingerprint of the active base key: the fixed base entry, or the
    /// index-0 entry for LedgerLive-style paths (always cached by `unlock`,
    /// since the LedgerLive base path is the index-0 path).
    fn path_base_public_key(&self) -> Result<String, KeyringError> {
        let path = if self.is_ledger_live() {
            self.path_for_index(0)
        } else {
            self.hd_path.clone()
        };
        self.key_cache
            .get(&path)
            .map(ExtendedPublicKey::public_key_hex)
            .ok_or_else(|| KeyringError::Locked(format!("no cached key for {}", path)))
    }

    /// Unlock and append the next `n` accounts starting at the selected unlock
    /// index, recording a complete ledger entry for each new address.
    pub async fn add_accounts(&mut self, n: u32) -> Result<Vec<String>, KeyringError> {
        self.unlock(Some(self.unlocked_account), Some(n)).await?;

        let from = self.unlocked_account;
        for i in from..from.saturating_add(n) {
            let address = self.address_from_index(i)?;
            if !self.accounts.iter().any(|a| is_same_address(a, &address)) {
                self.accounts.push(address.clone());
                let detail = AccountDetail {
                    hd_path: self.path_for_index(i),
                    hd_path_type: self.current_path_type(),
                    base_public_key: Some(self.path_base_public_key()?),
                    index: i,
                };
                self.account_details.insert(to_checksum_address(&address), detail);
            }
            self.page = 0;
        }
        Ok(self.accounts.clone())
    }

    pub async fn get_first_page(&mut self) -> Result<Vec<Account>, KeyringError> {
        self.page = 0;
        self.turn_page(1).await
    }

    pub async fn get_next_page(&mut self) -> Result<Vec<Account>, KeyringError> {
        self.turn_page(1).await
    }

    pub async fn get_previous_page(&mut self) -> Result<Vec<Account>, KeyringError> {
        self.turn_page(-1).await
    }

    async fn turn_page(&mut self, increment: i64) -> Result<Vec<Account>, KeyringError> {
        self.page += increment;
        if self.page <= 0 {
            self.page = 1;
        }

        // Under LedgerLive every index on the page is its own device path,
        // so the whole page range has to be unlocked, not just the base.
        let from = (self.page - 1) as u32 * self.per_page as u32;
        self.unlock(Some(from), Some(self.per_page as u32)).await?;
        let mut accounts = Vec::with_capacity(self.per_page);
        for i in from..from + self.per_page as u32 {
            let address = self.address_from_index(i)?;
            self.paths.insert(to_checksum_address(&address), i);
            accounts.push(Account { address, index: i + 1 });
        }
        Ok(accounts)
    }

    /// Derive the half-open display range `[start, end)`, unlocking exactly
    /// that range first, and record each address in the transient path map.
    pub async fn get_addresses(&mut self, start: u32, end: u32) -> Result<Vec<Account>, KeyringError> {
        self.unlock(Some(start), Some(end.saturating_sub(start))).await?;

        let mut accounts = Vec::new();
        for i in start..end {
            let address = self.address_from_index(i)?;
            self.paths.insert(to_checksum_address(&address), i);
            accounts.push(Account { address, index: i + 1 });
        }
        Ok(accounts)
    }

    pub fn get_accounts(&self) -> Vec<String> {
        self.accounts.clone()
    }

    /// Remove an added account and its ledger/transient entries.
    pub fn remove_account(&mut self, address: &str) -> Result<(), KeyringError> {
        if !self.accounts.iter().any(|a| is_same_address(a, address)) {
            return Err(KeyringError::AddressNotFound(format!(
                "address {} not found in this keyring",
                address
            )));
        }

        self.accounts.retain(|a| !is_same_address(a, address));
        let checksummed = to_checksum_address(address);
        self.account_details.remove(&checksummed);
        self.paths.remove(&checksummed);
        Ok(())
    }

    /// Hard reset short of destroying the `AccountDetail` history.
    pub fn forget_device(&mut self) {
        self.accounts.clear();
        self.key_cache.clear();
        self.page = 0;
        self.unlocked_account = 0;
        self.paths.clear();
    }

    /// Drop cached keys when forced, or when more than one physical device is
    /// attached and the cache can no longer be pinned to a single target.
    pub fn clean_up(&mut self, force: bool) {
        if self.key_cache.is_empty() {
            return;
        }
        if force || self.bridge.connected_devices() > 1 {
            debug!("clearing unlocked key cache");
            self.key_cache.clear();
        }
    }

    /// Out-of-band connect/disconnect signal from the bridge channel.
    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        debug!(?event, "device event");
        self.clean_up(true);
    }

    /// Resolve an address to its 0-based derivation index: transient path map
    /// first, then the ledger, then a bounded linear scan under the active
    /// convention. The scan covers addresses persisted by very old sessions
    /// that recorded no index at all.
    pub fn index_from_address(&self, address: &str) -> Result<u32, KeyringError> {
        let checksummed = to_checksum_address(address);
        if let Some(index) = self.paths.get(&checksummed) {
            return Ok(*index);
        }
        if let Some(detail) = self.account_details.get(&checksummed) {
            return Ok(detail.index);
        }

        for i in 0..MAX_INDEX {
            if self.address_from_index(i)? == checksummed {
                return Ok(i);
            }
        }
        Err(KeyringError::UnknownAddress(checksummed))
    }

    /// Provenance view for an added account.
    pub fn account_info(&self, address: &str) -> Result<Option<AccountInfo>, KeyringError> {
        let checksummed = to_checksum_address(address);
        let Some(detail) = self.account_details.get(&checksummed) else {
            return Ok(None);
        };
        Ok(Some(AccountInfo {
            address: address.to_string(),
            index: self.index_from_address(address)? + 1,
            hd_path_type: detail.hd_path_type,
            base_public_key: detail.base_public_key.clone(),
        }))
    }

    /// Return the historical accounts still valid under the active convention,
    /// each with its current display index. Individual addresses that fail to
    /// resolve are logged and skipped; one bad entry never aborts the rest.
    pub async fn get_current_accounts(&mut self) -> Result<Vec<Account>, KeyringError> {
        self.unlock(Some(0), Some(DEFAULT_UNLOCK_SPAN)).await?;

        let addresses = self.get_accounts();
        let current_key = self.path_base_public_key()?;

        let mut accounts = Vec::new();
        for address in addresses {
            match self.reconcile_account(&address, &current_key) {
                Ok(Some(account)) => accounts.push(account),
                Ok(None) => {}
                Err(e) => {
                    warn!(address = %address, error = %e, "skipping account during reconciliation");
                }
            }
        }
        Ok(accounts)
    }

    fn reconcile_account(
        &mut self,
        address: &str,
        current_key: &str,
    ) -> Result<Option<Account>, KeyringError> {
        self.fix_account_detail(address)?;

        let checksummed = to_checksum_address(address);
        let detail = match self.account_details.get(&checksummed) {
            Some(detail) => detail.clone(),
            None => return Err(KeyringError::UnknownAddress(checksummed)),
        };

        if detail.base_public_key.as_deref() == Some(current_key) {
            let index = self.index_from_address(address)?;
            return Ok(Some(Account { address: address.to_string(), index: index + 1 }));
        }

        // LedgerLive-style and BIP44 derive the same address at index 0, so
        // the first account recorded under one convention is still reachable
        // under the other. Deliberately restricted to display index 1.
        let active = self.current_path_type();
        if active != Some(HdPathType::Legacy)
            && matches!(
                detail.hd_path_type,
                Some(HdPathType::LedgerLive) | Some(HdPathType::Bip44)
            )
        {
            let display_index = self.index_from_address(address)? + 1;
            if display_index == 1 {
                let first = self.address_from_index(0)?;
                if is_same_address(&first, address) {
                    return Ok(Some(Account {
                        address: address.to_string(),
                        index: display_index,
                    }));
                }
            }
        }

        Ok(None)
    }

    /// Repair an incomplete ledger entry. A fixed entry is never touched; an
    /// entry whose re-derived address does not match is left alone rather than
    /// overwritten with wrong data.
    fn fix_account_detail(&mut self, address: &str) -> Result<(), KeyringError> {
        let checksummed = to_checksum_address(address);
        if let Some(detail) = self.account_details.get(&checksummed) {
            if detail.is_fixed() {
                return Ok(());
            }
        }

        let index = match self.index_from_address(address) {
            Ok(index) => index,
            Err(e) => {
                warn!(address = %address, error = %e, "cannot resolve index while repairing ledger entry");
                return Ok(());
            }
        };
        let derived = match self.address_from_index(index) {
            Ok(derived) => derived,
            Err(e) => {
                warn!(address = %address, error = %e, "cannot re-derive address while repairing ledger entry");
                return Ok(());
            }
        };
        if !is_same_address(address, &derived) {
            return Ok(());
        }

        let detail = AccountDetail {
            hd_path: self.path_for_index(index),
            hd_path_type: self.current_path_type(),
            base_public_key: Some(self.path_base_public_key()?),
            index,
        };
        self.account_details.insert(checksummed, detail);
        Ok(())
    }

    /// Signing path for an address: the recorded ledger path, then the
    /// transient path map, then the BIP44 fallback for accounts persisted
    /// before paths were recorded at all.
    pub async fn get_hd_path(&mut self, address: &str) -> Result<String, KeyringError> {
        let checksummed = to_checksum_address(address);
        if let Some(detail) = self.account_details.get(&checksummed) {
            if !detail.hd_path.is_empty() {
                return Ok(detail.hd_path.clone());
            }
        }
        if let Some(index) = self.paths.get(&checksummed) {
            return Ok(self.path_for_index(*index));
        }

        // Accounts that predate the ledger only ever used BIP44.
        self.set_hd_path(BIP44_BASE)?;
        self.unlock(None, None).await?;
        let index = self.index_from_address(address)?;
        Ok(format!("{}/{}", self.hd_path, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::MockBridge;
    use pretty_assertions::assert_eq;

    fn keyring_with_mock() -> (Arc<MockBridge>, Keyring) {
        let bridge = Arc::new(MockBridge::new());
        let keyring = Keyring::new(bridge.clone(), None);
        (bridge, keyring)
    }

    #[test]
    fn test_defaults() {
        let (_, keyring) = keyring_with_mock();
        assert_eq!(keyring.hd_path(), BIP44_BASE);
        assert_eq!(keyring.current_path_type(), Some(HdPathType::Bip44));
        assert!(keyring.get_accounts().is_empty());
        assert!(!keyring.is_unlocked(None, 1));
    }

    #[test]
    fn test_set_hd_path_rejects_unknown_path() {
        let (_, mut keyring) = keyring_with_mock();
        let err = keyring.set_hd_path("m/0/1").unwrap_err();
        assert!(matches!(err, KeyringError::UnsupportedPath(_)));
        assert_eq!(keyring.hd_path(), BIP44_BASE);
    }

    #[tokio::test]
    async fn test_unlock_reports_noop_when_cached() {
        let (_, mut keyring) = keyring_with_mock();
        assert_eq!(keyring.unlock(None, None).await.unwrap(), UnlockStatus::JustUnlocked);
        assert_eq!(keyring.unlock(None, None).await.unwrap(), UnlockStatus::AlreadyUnlocked);
    }

    #[tokio::test]
    async fn test_unlock_failure_carries_bridge_error() {
        let (bridge, mut keyring) = keyring_with_mock();
        bridge.fail_next(Some("Permissions not granted"));
        let err = keyring.unlock(None, None).await.unwrap_err();
        assert_eq!(format!("{}", err), "Device error: Permissions not granted");

        bridge.fail_next(None);
        let err = keyring.unlock(None, None).await.unwrap_err();
        assert_eq!(format!("{}", err), "Device error: Unknown error");
        assert!(!keyring.is_unlocked(None, 1));
    }

    #[tokio::test]
    async fn test_address_from_index_requires_unlock() {
        let (_, mut keyring) = keyring_with_mock();
        assert!(matches!(
            keyring.address_from_index(0).unwrap_err(),
            KeyringError::Locked(_)
        ));
        keyring.unlock(None, None).await.unwrap();
        let address = keyring.address_from_index(0).unwrap();
        assert_eq!(address, to_checksum_address(&address));
    }

    #[tokio::test]
    async fn test_address_derivation_is_deterministic() {
        let (_, mut keyring) = keyring_with_mock();
        keyring.unlock(None, None).await.unwrap();
        let first = keyring.address_from_index(3).unwrap();
        let second = keyring.address_from_index(3).unwrap();
        assert_eq!(first, second);

        // A fresh session over the same device yields the same address.
        let (_, mut other) = keyring_with_mock();
        other.unlock(None, None).await.unwrap();
        assert_eq!(other.address_from_index(3).unwrap(), first);
    }

    #[tokio::test]
    async fn test_ledger_live_range_unlock() {
        let (_, mut keyring) = keyring_with_mock();
        keyring.set_hd_path_type(HdPathType::LedgerLive).unwrap();

        keyring.unlock(Some(0), Some(3)).await.unwrap();
        assert!(keyring.is_unlocked(Some(0), 3));
        assert!(!keyring.is_unlocked(Some(0), 4));

        keyring.unlock(Some(3), Some(1)).await.unwrap();
        assert!(keyring.is_unlocked(Some(0), 4));
    }

    #[tokio::test]
    async fn test_ledger_live_addresses_differ_from_bip44() {
        let (_, mut keyring) = keyring_with_mock();
        keyring.unlock(None, None).await.unwrap();
        let bip44_first = keyring.address_from_index(0).unwrap();
        let bip44_second = keyring.address_from_index(1).unwrap();

        keyring.set_hd_path_type(HdPathType::LedgerLive).unwrap();
        keyring.unlock(Some(0), Some(2)).await.unwrap();
        // Index 0 is shared between the conventions; deeper indices are not.
        assert_eq!(keyring.address_from_index(0).unwrap(), bip44_first);
        assert_ne!(keyring.address_from_index(1).unwrap(), bip44_second);
    }

    #[tokio::test]
    async fn test_path_switch_resets_cache_and_counters() {
        let (_, mut keyring) = keyring_with_mock();
        keyring.unlock(None, None).await.unwrap();
        keyring.get_first_page().await.unwrap();
        keyring.set_account_to_unlock(4);
        assert!(keyring.is_unlocked(None, 1));

        // Same path: a no-op.
        keyring.set_hd_path(BIP44_BASE).unwrap();
        assert!(keyring.is_unlocked(None, 1));
        assert_eq!(keyring.unlocked_account, 4);

        // Different path: cache gone, counters reset.
        keyring.set_hd_path_type(HdPathType::Legacy).unwrap();
        assert!(!keyring.is_unlocked(None, 1));
        assert_eq!(keyring.page, 0);
        assert_eq!(keyring.unlocked_account, 0);
        assert!(matches!(
            keyring.address_from_index(0).unwrap_err(),
            KeyringError::Locked(_)
        ));

        keyring.unlock(None, None).await.unwrap();
        assert!(keyring.address_from_index(0).is_ok());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_through_json() {
        let (bridge, mut keyring) = keyring_with_mock();
        keyring.add_accounts(2).await.unwrap();
        keyring.set_account_to_unlock(2);

        let snapshot = keyring.serialize();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: KeyringSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);

        let revived = Keyring::new(bridge, Some(restored));
        assert_eq!(revived.serialize(), snapshot);
        assert_eq!(revived.get_accounts(), keyring.get_accounts());
    }

    #[tokio::test]
    async fn test_clean_up_on_ambiguous_device_set() {
        let (bridge, mut keyring) = keyring_with_mock();
        keyring.unlock(None, None).await.unwrap();

        // One device attached: a non-forced clean-up keeps the cache.
        keyring.clean_up(false);
        assert!(keyring.is_unlocked(None, 1));

        bridge.connect_device("mock-device-1");
        keyring.clean_up(false);
        assert!(!keyring.is_unlocked(None, 1));
    }

    #[tokio::test]
    async fn test_device_event_forces_clean_up() {
        let (bridge, mut keyring) = keyring_with_mock();
        let mut events = bridge.subscribe();
        keyring.unlock(None, None).await.unwrap();

        bridge.disconnect_device("mock-device-0");
        let event = events.recv().await.unwrap();
        keyring.handle_device_event(&event);
        assert!(!keyring.is_unlocked(None, 1));
    }

    #[tokio::test]
    async fn test_forget_device_preserves_details() {
        let (_, mut keyring) = keyring_with_mock();
        let accounts = keyring.add_accounts(1).await.unwrap();
        keyring.forget_device();

        assert!(keyring.get_accounts().is_empty());
        assert!(!keyring.is_unlocked(None, 1));
        let checksummed = to_checksum_address(&accounts[0]);
        assert!(keyring.account_details.contains_key(&checksummed));
    }

    #[tokio::test]
    async fn test_index_from_address_falls_back_to_scan() {
        let (_, mut keyring) = keyring_with_mock();
        keyring.unlock(None, None).await.unwrap();
        let address = keyring.address_from_index(7).unwrap();

        // No transient entry, no ledger entry: only the scan can find it.
        assert!(keyring.paths.is_empty());
        assert!(keyring.account_details.is_empty());
        assert_eq!(keyring.index_from_address(&address).unwrap(), 7);
    }

    #[tokio::test]
    async fn test_index_from_address_unknown() {
        let (_, mut keyring) = keyring_with_mock();
        keyring.unlock(None, None).await.unwrap();
        let err = keyring
            .index_from_address("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed")
            .unwrap_err();
        assert!(matches!(err, KeyringError::UnknownAddress(_)));
    }
}

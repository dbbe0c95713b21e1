// src/lib.rs

pub mod bridge;
pub mod core;
pub mod keyring;
pub mod signing;

pub use crate::core::errors::KeyringError;
pub use crate::core::paths::HdPathType;
pub use crate::core::session::{Account, AccountDetail, AccountInfo, KeyringSnapshot};
pub use crate::keyring::{Keyring, UnlockStatus};
pub use crate::signing::{Eip1559Tx, LegacyTx, TxRecord, TxSignature, TypedDataVersion};

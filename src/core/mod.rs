pub mod derive;
pub mod errors;
pub mod paths;
pub mod session;

pub use derive::ExtendedPublicKey;
pub use errors::KeyringError;
pub use paths::HdPathType;
pub use session::{Account, AccountDetail, AccountInfo, KeyringSnapshot};

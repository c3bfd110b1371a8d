pub mod backup;
pub mod config;
pub mod error;
pub mod ledger;
pub mod recording;
pub mod sharepoint;
pub mod transfer;
pub mod zoom;

pub use error::{BackupError, Result};

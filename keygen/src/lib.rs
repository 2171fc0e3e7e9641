//! Provisioning of update-signing key pairs
//!
//! Produces `<path>` and `<path>.pub` for an application's auto-updater,
//! either through an external signer CLI or with an in-process Ed25519 pair.

pub mod check;
pub mod config;
pub mod error;
pub mod generator;
pub mod keypair;
pub mod provision;

pub use config::{Config, Generator};
pub use error::{KeygenError, Result};
pub use provision::{provision, ProvisionReport, ProvisionRequest};

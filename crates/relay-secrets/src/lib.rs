//! # Relay Secrets
//!
//! Secret lookup for the alarm relay:
//!
//! - **Validated identifiers**: [`SecretId`] follows the naming rules of managed secret stores
//! - **Redacted values**: [`SecretValue`] never prints its contents and zeroizes on drop
//! - **Pluggable sources**: anything implementing [`SecretSource`] can back the relay
//!
//! ## Example
//!
//! ```rust
//! use relay_secrets::{MemorySecretSource, SecretId, SecretSource};
//!
//! let source = MemorySecretSource::new();
//! let id = SecretId::new("prod/teams-webhook").expect("valid id");
//! source.put(&id, "https://example.webhook.office.com/hook");
//!
//! let value = source.fetch(&id).expect("secret present");
//! assert_eq!(value.expose(), "https://example.webhook.office.com/hook");
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod source;
pub mod types;

pub use error::{Error, Result};
pub use source::{FileSecretSource, MemorySecretSource, SecretSource};
pub use types::{SecretId, SecretValue};

//! Core types and utilities for tether.
//!
//! This crate provides the foundational types used throughout the tether
//! connection service:
//!
//! - **Identifiers**: Strongly-typed IDs for users, broker accounts, and apps
//! - **Validation**: [`IdError`] for malformed identifiers
//!
//! # Example
//!
//! ```
//! use tether_core::{AccountId, AppName, UserId};
//!
//! let user_id: UserId = "U024BE7LH".parse().unwrap();
//! let app: AppName = "Google Drive".parse().unwrap();
//! let account: AccountId = "apn_x7hqL2".parse().unwrap();
//!
//! assert_eq!(app.as_str(), "google_drive");
//! # let _ = (user_id, account);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;

pub use ids::{AccountId, AppName, ExternalUserId, IdError, UserId, MAX_ID_LEN};

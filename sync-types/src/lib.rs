//! # sync-types
//!
//! Domain types for the stride offline-first run sync engine.
//!
//! This crate provides the foundational types used across all stride-sync crates:
//! - [`RunId`], [`UserId`] - Identity types
//! - [`Run`], [`Location`] - The synchronized record
//! - [`AuthInfo`] - Session data of the signed-in user
//! - [`DataError`], [`NetworkError`], [`LocalError`] - Error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod run;
mod session;

pub use error::{DataError, LocalError, NetworkError};
pub use ids::{RunId, UserId};
pub use run::{Location, Run};
pub use session::AuthInfo;

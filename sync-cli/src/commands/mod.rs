//! CLI command implementations.

pub mod runs;
pub mod session;
pub mod status;
pub mod sync;

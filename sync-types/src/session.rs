//! Authenticated session data.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::UserId;

/// Tokens and owner id of the signed-in user.
///
/// Token strings are wiped from memory on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AuthInfo {
    /// Bearer token sent with every remote call.
    pub access_token: String,
    /// Token used to obtain a new access token.
    pub refresh_token: String,
    /// Owner of all runs and pending operations in this session.
    #[zeroize(skip)]
    pub user_id: UserId,
}

impl AuthInfo {
    /// Create session data for a signed-in user.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user_id: UserId,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user_id,
        }
    }
}

impl std::fmt::Debug for AuthInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInfo")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

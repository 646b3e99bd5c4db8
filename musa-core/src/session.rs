//! Signed-in session
//!
//! The session is an explicit value handed to whatever needs auth, loaded
//! from and saved to the [`LocalStore`] in one place.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::fingerprint;
use crate::store::{keys, LocalStore};

/// Role of a signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Farmer,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "ADMIN",
            Role::Farmer => "FARMER",
            Role::Other(s) => s,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Role::Admin,
            "FARMER" | "USER" => Role::Farmer,
            _ => Role::Other(s.trim().to_string()),
        })
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Auth state of the signed-in user
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub role: Role,
}

// Token stays out of debug output.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &fingerprint(&self.token))
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .finish()
    }
}

impl Session {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>, role: Role) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            role,
        }
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Load the stored session; `None` unless both token and user id are present
    pub fn load(store: &LocalStore) -> Result<Option<Self>> {
        let token = store.get(keys::AUTH_TOKEN)?.filter(|t| !t.is_empty());
        let user_id = store.get(keys::USER_ID)?.filter(|u| !u.is_empty());

        let (Some(token), Some(user_id)) = (token, user_id) else {
            return Ok(None);
        };

        let role = store
            .get(keys::USER_ROLE)?
            .and_then(|r| r.parse().ok())
            .unwrap_or(Role::Farmer);

        Ok(Some(Self {
            token,
            user_id,
            role,
        }))
    }

    /// Load the stored session or fail with [`Error::Unauthorized`]
    pub fn require(store: &LocalStore) -> Result<Self> {
        Self::load(store)?.ok_or(Error::Unauthorized)
    }

    /// Persist this session, replacing any previous one
    pub fn save(&self, store: &LocalStore) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(Error::Validation("token must not be empty".to_string()));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::Validation("user id must not be empty".to_string()));
        }

        store.set(keys::AUTH_TOKEN, &self.token)?;
        store.set(keys::USER_ID, &self.user_id)?;
        store.set(keys::USER_ROLE, self.role.as_str())?;
        tracing::info!(
            user_id = %self.user_id,
            token = %fingerprint(&self.token),
            "Session saved"
        );
        Ok(())
    }

    /// Forget the stored session. The guest device id is kept.
    pub fn clear(store: &LocalStore) -> Result<()> {
        store.remove(keys::AUTH_TOKEN)?;
        store.remove(keys::USER_ID)?;
        store.remove(keys::USER_ROLE)?;
        tracing::info!("Session cleared");
        Ok(())
    }
}

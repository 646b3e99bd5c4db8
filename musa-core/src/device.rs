//! Guest device identity
//!
//! Guests are identified across requests by a random UUID v4 generated on
//! first use and kept in the local store forever. It is never rotated.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::store::{keys, LocalStore};

/// Opaque per-profile guest identifier (lowercase hyphenated UUID v4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Generate a new random identifier
    ///
    /// Version nibble is `4`, variant nibble one of `8`, `9`, `a`, `b`.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks the `xxxxxxxx-xxxx-4xxx-[89ab]xxx-xxxxxxxxxxxx` shape
    pub fn is_well_formed(&self) -> bool {
        is_v4_shape(&self.0)
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_v4_shape(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, &b)| match i {
        8 | 13 | 18 | 23 => b == b'-',
        14 => b == b'4',
        19 => matches!(b, b'8' | b'9' | b'a' | b'b'),
        _ => b.is_ascii_digit() || (b'a'..=b'f').contains(&b),
    })
}

/// Return the stored device id, creating and persisting one if absent.
///
/// A stored value that is not a well-formed id is replaced.
pub fn get_or_create_device_id(store: &LocalStore) -> Result<DeviceIdentity> {
    if let Some(existing) = store.get(keys::DEVICE_ID)? {
        let identity = DeviceIdentity(existing);
        if identity.is_well_formed() {
            return Ok(identity);
        }
        tracing::warn!(value = %identity, "Replacing malformed stored device id");
    }

    let identity = DeviceIdentity::generate();
    store.set(keys::DEVICE_ID, identity.as_str())?;
    tracing::info!(device_id = %identity, "Created guest device id");
    Ok(identity)
}

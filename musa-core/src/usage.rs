//! Guest usage tracking
//!
//! Usage lookups fail open: a tracker outage never blocks a guest. Only an
//! explicit signal from the backend (`limitReached`, `requiresSignup`, the
//! limit check, or a 400 from the analyze endpoint) does.

use crate::api::BackendClient;
use crate::device::DeviceIdentity;
use crate::error::Error;
use crate::types::{AnalysisCategory, GuestUsageState};

/// Reads guest usage from the backend
#[derive(Debug, Clone)]
pub struct GuestUsageTracker {
    client: BackendClient,
}

impl GuestUsageTracker {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }

    /// Current usage of `device` for `category`.
    ///
    /// 404 means a new device. Any other failure is logged and reported as
    /// zero attempts with the limit not reached.
    pub async fn check_usage(
        &self,
        device: &DeviceIdentity,
        category: AnalysisCategory,
    ) -> GuestUsageState {
        match self.client.guest_usage(device).await {
            Ok(Some(record)) => GuestUsageState {
                device_id: device.to_string(),
                category,
                attempts: record.attempts_for(category),
                limit_reached: record.limit_reached,
                requires_signup: record.requires_signup,
            },
            Ok(None) => {
                tracing::debug!(device_id = %device, "No usage recorded for device");
                GuestUsageState::fresh(device.as_str(), category)
            }
            Err(e) => {
                log_soft_failure("usage lookup", device, &e);
                GuestUsageState::fresh(device.as_str(), category)
            }
        }
    }

    /// Dedicated limit check. `true` means the sign-up prompt must be shown.
    pub async fn check_limit(&self, device: &DeviceIdentity, category: AnalysisCategory) -> bool {
        match self.client.guest_limit_reached(device, category).await {
            Ok(reached) => reached,
            Err(e) => {
                log_soft_failure("limit check", device, &e);
                false
            }
        }
    }
}

fn log_soft_failure(what: &str, device: &DeviceIdentity, error: &Error) {
    tracing::warn!(
        device_id = %device,
        error = %error,
        "Guest {} failed, treating device as unrestricted",
        what
    );
}

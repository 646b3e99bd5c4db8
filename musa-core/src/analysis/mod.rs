//! Image analysis submission
//!
//! Each submission runs `Idle -> Submitting -> {Success | Limited | Error}`.
//! Guests post straight to the analyze endpoint and get their counters in
//! the response. Signed-in users post to the create endpoint, which returns
//! nothing useful, then read their history and show its last entry. If two
//! of the user's analyses are in flight at once the wrong one can be shown;
//! the backend offers no id to correlate them.

mod result;

pub use result::{AnalysisResult, SecondaryFindings, Severity};

use std::path::Path;

use crate::api::BackendClient;
use crate::device::DeviceIdentity;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::types::{AnalysisCategory, GUEST_ATTEMPT_LIMIT};
use crate::usage::GuestUsageTracker;

/// An image chosen for analysis
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file, guessing its MIME type from the extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }

    /// Only the MIME type is checked; size and dimensions are not.
    pub fn validate(&self) -> Result<()> {
        if self.mime_type.starts_with("image/") {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "Please select an image file ({} is {})",
                self.file_name, self.mime_type
            )))
        }
    }
}

/// Who is submitting
#[derive(Debug, Clone)]
pub enum Submitter {
    Guest(DeviceIdentity),
    User(Session),
}

/// State of the current submission
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionState {
    Idle,
    Submitting,
    Success(AnalysisResult),
    /// Guest limit reached; the sign-up prompt is shown instead of an error
    Limited,
    /// User-visible error message
    Error(String),
}

/// Analysis screen state for one category
#[derive(Debug)]
pub struct AnalysisSession {
    category: AnalysisCategory,
    submitter: Submitter,
    /// Guest attempts used so far
    pub attempts: u32,
    pub limit_reached: bool,
    /// Blocking sign-in/sign-up prompt
    pub show_signup_modal: bool,
    state: SubmissionState,
}

impl AnalysisSession {
    pub fn new(category: AnalysisCategory, submitter: Submitter) -> Self {
        Self {
            category,
            submitter,
            attempts: 0,
            limit_reached: false,
            show_signup_modal: false,
            state: SubmissionState::Idle,
        }
    }

    pub fn category(&self) -> AnalysisCategory {
        self.category
    }

    pub fn is_guest(&self) -> bool {
        matches!(self.submitter, Submitter::Guest(_))
    }

    pub fn state(&self) -> &SubmissionState {
        &self.state
    }

    /// Whether the submit control is enabled
    pub fn can_submit(&self) -> bool {
        !self.limit_reached && self.state != SubmissionState::Submitting
    }

    pub fn remaining_attempts(&self) -> u32 {
        GUEST_ATTEMPT_LIMIT.saturating_sub(self.attempts)
    }

    pub fn dismiss_modal(&mut self) {
        self.show_signup_modal = false;
    }

    /// Load guest counters from the backend. No-op for signed-in users.
    pub async fn refresh_usage(&mut self, tracker: &GuestUsageTracker) {
        let Submitter::Guest(device) = &self.submitter else {
            return;
        };

        let usage = tracker.check_usage(device, self.category).await;
        let limited = tracker.check_limit(device, self.category).await;

        self.attempts = usage.attempts;
        self.limit_reached = usage.limit_reached || usage.requires_signup || limited;
        if limited || usage.requires_signup {
            self.show_signup_modal = true;
        }
    }

    /// Submit an image and return the resulting state.
    ///
    /// Validation runs before any request. Nothing is retried.
    pub async fn submit(&mut self, client: &BackendClient, image: &ImageUpload) -> &SubmissionState {
        if let Err(e) = image.validate() {
            self.state = SubmissionState::Error(e.user_message());
            return &self.state;
        }

        if self.limit_reached {
            self.show_signup_modal = true;
            self.state = SubmissionState::Limited;
            return &self.state;
        }

        self.state = SubmissionState::Submitting;

        let outcome = match &self.submitter {
            Submitter::Guest(device) => client.analyze_as_guest(self.category, image, device).await,
            Submitter::User(session) => {
                submit_authenticated(client, self.category, image, session).await
            }
        };

        self.state = match outcome {
            Ok(result) => {
                self.apply_counters(&result);
                SubmissionState::Success(result)
            }
            Err(Error::LimitReached) => {
                self.limit_reached = true;
                self.show_signup_modal = true;
                SubmissionState::Limited
            }
            Err(e) => {
                tracing::warn!(category = %self.category, error = %e, "Analysis submission failed");
                SubmissionState::Error(e.user_message())
            }
        };

        &self.state
    }

    /// Apply the counters a response carries, on either path.
    pub fn apply_counters(&mut self, result: &AnalysisResult) {
        if let Some(remaining) = result.remaining_attempts {
            self.attempts = GUEST_ATTEMPT_LIMIT.saturating_sub(remaining);
        }
        if result.requires_signup == Some(true) {
            self.limit_reached = true;
            self.show_signup_modal = true;
        }
    }
}

/// Create, then read back the newest entry of the user's history.
async fn submit_authenticated(
    client: &BackendClient,
    category: AnalysisCategory,
    image: &ImageUpload,
    session: &Session,
) -> Result<AnalysisResult> {
    client.create_analysis(category, image, session).await?;

    let mut history = client.user_results(category, session).await?;
    history
        .pop()
        .ok_or_else(|| Error::Decode("analysis history is empty after create".to_string()))
}

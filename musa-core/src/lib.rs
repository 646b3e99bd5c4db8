//! # musa-core
//!
//! Core library for musa, a banana-farm assistant.
//!
//! This library provides:
//! - A guest device identity and guest usage limits for image analysis
//! - Disease and variety analysis submission, for guests and signed-in users
//! - Planting task boards with optimistic task completion and stage advance
//! - An authenticated proxy for the task and planting routes
//! - Configuration, logging, and a small local store
//!
//! ## Architecture
//!
//! The farm backend owns all data. Locally only the device id and the
//! signed-in session are kept, in a SQLite key/value store. Guest usage is
//! recomputed from the backend on demand and never cached.
//!
//! ## Example
//!
//! ```rust,no_run
//! use musa_core::{device, Config, LocalStore};
//!
//! let config = Config::load().expect("failed to load config");
//! let store = LocalStore::open(&Config::store_path()).expect("failed to open store");
//! let device_id = device::get_or_create_device_id(&store).expect("failed to read device id");
//! println!("{} -> {:?}", device_id, config.backend.url);
//! ```

// Re-export commonly used items at the crate root
pub use analysis::{AnalysisResult, AnalysisSession, ImageUpload, SubmissionState, Submitter};
pub use api::BackendClient;
pub use config::Config;
pub use device::DeviceIdentity;
pub use error::{Error, ErrorClass, Result};
pub use session::{Role, Session};
pub use stage::{Actionability, Stage, StageKey};
pub use store::LocalStore;
pub use tasks::{CompletionReport, InFlight, TaskBackend, TaskBoard};
pub use types::*;
pub use usage::GuestUsageTracker;

// Public modules
pub mod access;
pub mod analysis;
pub mod api;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod mutation;
pub mod proxy;
pub mod session;
pub mod stage;
pub mod store;
pub mod tasks;
pub mod types;
pub mod usage;

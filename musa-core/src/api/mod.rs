//! Farm backend API
//!
//! Requests and response decoding for every backend endpoint the client
//! uses. Heterogeneous response shapes are normalized here, at the network
//! boundary, so callers only ever see typed values.

mod client;

pub use client::{BackendClient, GuestUsageRecord};

//! Data Transfer Objects for talking to the upscaling service
//!
//! These mirror the JSON shapes the service sends and accepts. They are
//! deliberately lenient (most fields optional) so that the status
//! normalizer, not serde, decides what a missing field means.

pub mod task;

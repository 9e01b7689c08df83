//! Upscale Core
//!
//! Core types and pure logic for the upscale comparison client.
//!
//! This crate contains:
//! - Domain types: Job, per-method results and metric values
//! - DTOs: wire shapes exchanged with the upscaling service
//! - Status normalization: raw transport payloads to canonical status tags
//! - Result reconciliation: best-method-per-metric selection and ranking
//! - Upstream validation of submissions
//!
//! Nothing in here performs I/O.

pub mod domain;
pub mod dto;
pub mod reconcile;
pub mod status;
pub mod validation;

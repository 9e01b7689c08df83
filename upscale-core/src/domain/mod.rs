//! Core domain types
//!
//! This module contains the structures shared by the transports, the
//! lifecycle tracker and presentation code. A [`job::Job`] is mutated only
//! through its transition methods; the fields themselves are private.

pub mod job;
pub mod method;

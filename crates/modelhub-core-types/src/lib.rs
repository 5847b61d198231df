//! Core types shared across ModelHub facilities
//!
//! This crate provides foundational types used by the error, logging and
//! session facilities:
//!
//! - **Correlation types**: RequestId, SessionId
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{RequestId, SessionId};

//! Shared types and error types for TallyBridge

pub mod errors;

pub use errors::{AppError, AppResult};

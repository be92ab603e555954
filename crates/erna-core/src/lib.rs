//! `erna-core`: shared vocabulary for the erna workspace.
//!
//! Holds the validated key types ([`Location`], [`UserId`], [`Timestamp`]),
//! the validation and configuration errors, and the figment-backed
//! [`config::ErnaConfig`].

pub mod config;
pub mod error;
pub mod types;

pub use error::{ErnaError, Result, ValidationError};
pub use types::{Location, Timestamp, UserId};

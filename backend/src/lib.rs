//! Doc Vault - Backend Library
//!
//! Document storage with JWT sessions, role grants and ownership-based
//! access control.

#[macro_use]
mod macros;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};

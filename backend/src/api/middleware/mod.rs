//! API middleware.

pub mod auth;
pub mod authorize;

//! Database models (SQLx).

pub mod document;
pub mod role;
pub mod user;

//! Business logic services.

pub mod auth_service;
pub mod document_service;
pub mod permission_service;
pub mod token_service;
pub mod user_service;

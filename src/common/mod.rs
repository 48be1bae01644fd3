//! Shared error, domain and collaborator types

pub mod errors;
pub mod retry;
pub mod traits;
pub mod types;

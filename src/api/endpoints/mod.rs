//! Endpoint handlers, one module per resource.

pub mod documents;
pub mod extraction;
pub mod health;
pub mod reports;

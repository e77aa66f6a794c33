//! Core use-case services.
//!
//! # Responsibility
//! - Validate document invariants and orchestrate repository calls.
//! - Keep the async engine and sync layer decoupled from storage details.

pub mod cascade_service;
pub mod document_service;

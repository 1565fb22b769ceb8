//! Shared utilities for the workforce tracker backend.
//!
//! This crate provides functionality used across the other crates:
//! - Credential handling (Argon2id password hashing, session tokens)
//! - Common validation logic for location samples and account forms

pub mod credentials;
pub mod validation;

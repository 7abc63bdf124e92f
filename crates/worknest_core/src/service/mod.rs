//! Core use-case services.
//!
//! # Responsibility
//! - Own repositories for the lifetime of a signed-in session.
//! - Keep UI/FFI layers decoupled from store and auth wiring.

pub mod session;

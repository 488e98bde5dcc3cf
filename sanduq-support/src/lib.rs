//! # Sanduq Support
//!
//! Helpers shared between the sanduq crates. Currently this is the text
//! rendering used by error messages.

pub mod rendering;

//! Common types and utilities for the tsr structural type resolver.
//!
//! This crate provides foundational types used across all tsr crates:
//! - String interning (`Atom`, `ShardedInterner`)
//! - Opaque source locations (`SourceTag`)
//! - The diagnostic model (`Diagnostic`, `DiagnosticKind`, message table)
//! - Resolver limits and thresholds

// String interning for property names, alias names and string literals
pub mod interner;
pub use interner::{Atom, ShardedInterner};

// Opaque location tags threaded through for diagnostics
pub mod span;
pub use span::SourceTag;

// Diagnostics collected by every component
pub mod diagnostics;
pub use diagnostics::{
    Diagnostic, DiagnosticCategory, DiagnosticKind, RelatedLocation, diagnostic_codes,
    format_message,
};

// Centralized limits and thresholds
pub mod limits;

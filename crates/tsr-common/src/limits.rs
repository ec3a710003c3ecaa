//! Centralized limits and thresholds for the resolver.
//!
//! Recursion limits for evaluation and assignability live in the solver's
//! `RecursionProfile`; this module holds the size caps shared by the
//! normalizer, the narrowing engine and the session.

/// Maximum number of members produced when an intersection is distributed
/// over union members.
///
/// `(A | B | C) & (D | E | F) & ...` grows multiplicatively. Past this size
/// the intersection is kept undistributed instead.
pub const MAX_DISTRIBUTION_SIZE: usize = 64;

/// Maximum number of characters a template literal may concatenate into a
/// single string literal.
pub const MAX_TEMPLATE_LITERAL_LENGTH: usize = 4096;

/// Default bound on nested conditional/mapped evaluation.
pub const DEFAULT_EVALUATION_DEPTH: u32 = 50;

/// Default bound on nested assignability checks.
pub const DEFAULT_SUBTYPE_DEPTH: u32 = 100;

/// Default cap on total recursive steps in one request.
pub const DEFAULT_MAX_ITERATIONS: u32 = 100_000;

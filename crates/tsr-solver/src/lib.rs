//! Structural type resolution.
//!
//! An interned, structural type graph with the algebra that operates on it:
//!
//! - **Interning**: every type is a `TypeId` into a sharded hash-consing
//!   arena, so equality is an integer compare.
//! - **Normalization**: unions and intersections are flattened, deduplicated
//!   and absorbed; object intersections are merged field by field.
//! - **Inference**: generic bindings are unified with `ena`.
//! - **Evaluation**: aliases, conditional, mapped, index access and template
//!   literal types are computed, with distribution over unions.
//! - **Narrowing**: type guards refine a type for each branch.
//! - **Assignability**: structural, with coinductive handling of recursion.
//!
//! Everything hangs off a [`ResolutionContext`], which carries the interner,
//! alias environment, options, cancellation token and diagnostic sink.

mod context;
mod evaluate;
pub mod evaluate_rules;
mod format;
mod infer;
mod instantiate;
mod intern;
mod lower;
mod narrowing;
mod normalize;
pub mod recursion;
mod subtype;
pub mod type_queries;
mod types;

pub use context::*;
pub use evaluate::*;
pub use format::*;
pub use infer::*;
pub use instantiate::*;
pub use intern::*;
pub use lower::*;
pub use narrowing::*;
pub use normalize::*;
pub use recursion::{RecursionGuard, RecursionProfile, RecursionResult};
pub use subtype::*;
pub use types::*;

pub use tsr_common::{Atom, Diagnostic, DiagnosticCategory, DiagnosticKind, SourceTag};

#[cfg(test)]
#[path = "tests/scenario_tests.rs"]
mod scenario_tests;
#[cfg(test)]
#[path = "tests/property_tests.rs"]
mod property_tests;
#[cfg(test)]
#[path = "tests/concurrent_tests.rs"]
mod concurrent_tests;

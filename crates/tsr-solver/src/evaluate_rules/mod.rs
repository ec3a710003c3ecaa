//! Evaluation rules for the individual meta-type kinds.
//!
//! Each file extends [`TypeEvaluator`](super::evaluate::TypeEvaluator) with
//! the resolution logic for one node kind.

pub mod conditional;
pub mod index_access;
pub mod mapped;
pub mod template_literal;

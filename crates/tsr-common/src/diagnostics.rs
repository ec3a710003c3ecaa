//! Diagnostic types and message lookup for the resolver.
//!
//! Every error condition the engine can hit is recoverable: components keep
//! producing a structurally valid type and push a `Diagnostic` describing
//! what went wrong. Messages are templates with `{0}`, `{1}`, ... holes
//! filled by `format_message`.

use crate::span::SourceTag;
use serde::Serialize;

/// Diagnostic category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DiagnosticCategory {
    Warning = 0,
    Error = 1,
    Suggestion = 2,
    Message = 3,
}

/// The closed set of conditions the resolver reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum DiagnosticKind {
    /// A named alias or generic has no binding in scope.
    UnresolvedReference,
    /// An intersection normalized a property to `never`.
    IncompatibleIntersection,
    /// An alias expands to itself without an intervening object/array/function.
    CyclicTypeAlias,
    /// Recursive conditional/mapped evaluation hit the configured bound.
    EvaluationDepthExceeded,
    /// Two incompatible bindings for one inference variable.
    InferenceConflict,
    /// Two mapped-type source keys produced the same output key.
    KeyRemapCollision,
    /// A predicate's false branch could not be subtracted exactly.
    NarrowingAmbiguous,
    /// Modules import each other in a cycle.
    CyclicModuleDependency,
    /// An assignability query failed; carried as the failure reason.
    NotAssignable,
}

pub mod diagnostic_codes {
    pub const UNRESOLVED_REFERENCE: u32 = 9001;
    pub const INCOMPATIBLE_INTERSECTION: u32 = 9002;
    pub const CYCLIC_TYPE_ALIAS: u32 = 9003;
    pub const EVALUATION_DEPTH_EXCEEDED: u32 = 9004;
    pub const INFERENCE_CONFLICT: u32 = 9005;
    pub const KEY_REMAP_COLLISION: u32 = 9006;
    pub const NARROWING_AMBIGUOUS: u32 = 9007;
    pub const CYCLIC_MODULE_DEPENDENCY: u32 = 9008;
    pub const NOT_ASSIGNABLE: u32 = 9009;
}

/// A diagnostic message definition with code, category, and message template.
#[derive(Clone, Copy, Debug)]
pub struct DiagnosticMessage {
    pub kind: DiagnosticKind,
    pub code: u32,
    pub category: DiagnosticCategory,
    pub message: &'static str,
}

pub const DIAGNOSTIC_MESSAGES: &[DiagnosticMessage] = &[
    DiagnosticMessage {
        kind: DiagnosticKind::UnresolvedReference,
        code: diagnostic_codes::UNRESOLVED_REFERENCE,
        category: DiagnosticCategory::Error,
        message: "Cannot find type '{0}'.",
    },
    DiagnosticMessage {
        kind: DiagnosticKind::IncompatibleIntersection,
        code: diagnostic_codes::INCOMPATIBLE_INTERSECTION,
        category: DiagnosticCategory::Error,
        message: "Property '{0}' has conflicting types '{1}' and '{2}' in intersection and was reduced to 'never'.",
    },
    DiagnosticMessage {
        kind: DiagnosticKind::CyclicTypeAlias,
        code: diagnostic_codes::CYCLIC_TYPE_ALIAS,
        category: DiagnosticCategory::Error,
        message: "Type alias '{0}' circularly references itself.",
    },
    DiagnosticMessage {
        kind: DiagnosticKind::EvaluationDepthExceeded,
        code: diagnostic_codes::EVALUATION_DEPTH_EXCEEDED,
        category: DiagnosticCategory::Error,
        message: "Type instantiation is excessively deep and possibly infinite (limit {0}).",
    },
    DiagnosticMessage {
        kind: DiagnosticKind::InferenceConflict,
        code: diagnostic_codes::INFERENCE_CONFLICT,
        category: DiagnosticCategory::Error,
        message: "Type parameter '{0}' has conflicting candidates '{1}' and '{2}'.",
    },
    DiagnosticMessage {
        kind: DiagnosticKind::KeyRemapCollision,
        code: diagnostic_codes::KEY_REMAP_COLLISION,
        category: DiagnosticCategory::Error,
        message: "Keys '{0}' and '{1}' are both remapped to '{2}'.",
    },
    DiagnosticMessage {
        kind: DiagnosticKind::NarrowingAmbiguous,
        code: diagnostic_codes::NARROWING_AMBIGUOUS,
        category: DiagnosticCategory::Warning,
        message: "Cannot exclude '{0}' from '{1}'; the type was left unnarrowed.",
    },
    DiagnosticMessage {
        kind: DiagnosticKind::CyclicModuleDependency,
        code: diagnostic_codes::CYCLIC_MODULE_DEPENDENCY,
        category: DiagnosticCategory::Error,
        message: "Module '{0}' is part of an import cycle: {1}.",
    },
    DiagnosticMessage {
        kind: DiagnosticKind::NotAssignable,
        code: diagnostic_codes::NOT_ASSIGNABLE,
        category: DiagnosticCategory::Error,
        message: "Type '{0}' is not assignable to type '{1}'.",
    },
];

impl DiagnosticKind {
    fn definition(self) -> &'static DiagnosticMessage {
        DIAGNOSTIC_MESSAGES
            .iter()
            .find(|m| m.kind == self)
            .unwrap_or(&DIAGNOSTIC_MESSAGES[0])
    }

    #[inline]
    pub fn code(self) -> u32 {
        self.definition().code
    }

    #[inline]
    pub fn category(self) -> DiagnosticCategory {
        self.definition().category
    }

    #[inline]
    pub fn template(self) -> &'static str {
        self.definition().message
    }
}

/// A secondary location attached to a diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelatedLocation {
    pub location: Option<SourceTag>,
    pub message: String,
}

/// A resolver diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub code: u32,
    pub category: DiagnosticCategory,
    pub message: String,
    pub location: Option<SourceTag>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedLocation>,
}

impl Diagnostic {
    /// Build a diagnostic of `kind`, filling the kind's template with `args`.
    #[must_use]
    pub fn new(kind: DiagnosticKind, args: &[&str]) -> Self {
        Diagnostic {
            kind,
            code: kind.code(),
            category: kind.category(),
            message: format_message(kind.template(), args),
            location: None,
            related: Vec::new(),
        }
    }

    #[must_use]
    pub fn at(mut self, location: Option<SourceTag>) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn with_related(mut self, location: Option<SourceTag>, message: impl Into<String>) -> Self {
        self.related.push(RelatedLocation {
            location,
            message: message.into(),
        });
        self
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.category == DiagnosticCategory::Error
    }
}

/// Format a diagnostic message by replacing {0}, {1}, etc. with arguments.
#[must_use]
pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut result = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        result = result.replace(&format!("{{{i}}}"), arg);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_unique_code() {
        let mut codes: Vec<u32> = DIAGNOSTIC_MESSAGES.iter().map(|m| m.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), DIAGNOSTIC_MESSAGES.len());
    }

    #[test]
    fn message_is_formatted() {
        let diag = Diagnostic::new(DiagnosticKind::UnresolvedReference, &["Foo"]);
        assert_eq!(diag.message, "Cannot find type 'Foo'.");
        assert_eq!(diag.code, diagnostic_codes::UNRESOLVED_REFERENCE);
        assert!(diag.is_error());
    }

    #[test]
    fn narrowing_ambiguity_is_a_warning() {
        let diag = Diagnostic::new(DiagnosticKind::NarrowingAmbiguous, &["A", "B"]);
        assert_eq!(diag.category, DiagnosticCategory::Warning);
        assert!(!diag.is_error());
    }

    #[test]
    fn related_locations_serialize() {
        let diag = Diagnostic::new(DiagnosticKind::KeyRemapCollision, &["a", "b", "c"])
            .at(Some(SourceTag::new(1, 10, 3)))
            .with_related(Some(SourceTag::new(1, 20, 1)), "first key");
        let json = serde_json::to_string(&diag).expect("diagnostic serializes");
        assert!(json.contains("\"related\""));
        assert!(json.contains("KeyRemapCollision"));
    }
}

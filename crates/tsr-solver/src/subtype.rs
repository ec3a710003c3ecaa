//! Structural assignability.
//!
//! `SubtypeChecker` answers "is a value of `source` usable where `target` is
//! expected". Objects compare by fields, functions by parameters
//! (contravariant) and return (covariant), unions and intersections by their
//! members. Meta-types are evaluated before comparison.
//!
//! Recursive pairs are assumed related while being checked (coinduction),
//! so `type Node = { next: Node }` is assignable to itself.

use crate::context::{NoopResolver, ResolutionOptions, TypeResolver};
use crate::evaluate::TypeEvaluator;
use crate::format::TypeFormatter;
use crate::intern::TypeInterner;
use crate::recursion::{RecursionGuard, RecursionProfile, RecursionResult};
use crate::types::*;
use rustc_hash::FxHashSet;
use tracing::trace;
use tsr_common::diagnostics::{Diagnostic, DiagnosticKind};
use tsr_common::interner::Atom;

/// Why the last failing check failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubtypeFailureReason {
    MissingProperty { name: Atom },
    OptionalProperty { name: Atom },
    PropertyTypeMismatch { name: Atom, source: TypeId, target: TypeId },
    ExcessProperty { name: Atom },
    TooManyParameters { source: usize, target: usize },
    ReturnTypeMismatch { source: TypeId, target: TypeId },
    NoMatchingUnionMember { source: TypeId },
    TypeMismatch { source: TypeId, target: TypeId },
}

impl SubtypeFailureReason {
    pub fn message(&self, interner: &TypeInterner) -> String {
        let mut formatter = TypeFormatter::new(interner);
        match *self {
            SubtypeFailureReason::MissingProperty { name } => format!(
                "Property '{}' is missing in the source type.",
                interner.resolve_atom_ref(name)
            ),
            SubtypeFailureReason::OptionalProperty { name } => format!(
                "Property '{}' is optional in the source type but required in the target type.",
                interner.resolve_atom_ref(name)
            ),
            SubtypeFailureReason::PropertyTypeMismatch { name, source, target } => format!(
                "Types of property '{}' are incompatible: '{}' is not assignable to '{}'.",
                interner.resolve_atom_ref(name),
                formatter.format(source),
                formatter.format(target)
            ),
            SubtypeFailureReason::ExcessProperty { name } => format!(
                "Object literal may only specify known properties, and '{}' does not exist in the target type.",
                interner.resolve_atom_ref(name)
            ),
            SubtypeFailureReason::TooManyParameters { source, target } => format!(
                "Source expects {source} parameters but the target provides only {target}."
            ),
            SubtypeFailureReason::ReturnTypeMismatch { source, target } => format!(
                "Return type '{}' is not assignable to '{}'.",
                formatter.format(source),
                formatter.format(target)
            ),
            SubtypeFailureReason::NoMatchingUnionMember { source } => format!(
                "'{}' is not assignable to any member of the target union.",
                formatter.format(source)
            ),
            SubtypeFailureReason::TypeMismatch { source, target } => format!(
                "'{}' is not assignable to '{}'.",
                formatter.format(source),
                formatter.format(target)
            ),
        }
    }
}

/// Outcome of [`SubtypeChecker::check_assignable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssignabilityResult {
    pub assignable: bool,
    pub reason: Option<Diagnostic>,
}

pub struct SubtypeChecker<'a, R: TypeResolver = NoopResolver> {
    interner: &'a TypeInterner,
    resolver: &'a R,
    options: ResolutionOptions,
    guard: RecursionGuard<(TypeId, TypeId)>,
    /// Evaluation nesting of the caller, carried into nested evaluators.
    evaluation_depth: u32,
    excess_property_check: bool,
    failures: FxHashSet<(TypeId, TypeId)>,
    failure: Option<SubtypeFailureReason>,
    depth_reported: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> SubtypeChecker<'a, NoopResolver> {
    pub fn new(interner: &'a TypeInterner) -> SubtypeChecker<'a, NoopResolver> {
        static NOOP: NoopResolver = NoopResolver;
        SubtypeChecker::with_resolver(interner, &NOOP)
    }
}

impl<'a, R: TypeResolver> SubtypeChecker<'a, R> {
    pub fn with_resolver(interner: &'a TypeInterner, resolver: &'a R) -> Self {
        SubtypeChecker {
            interner,
            resolver,
            options: ResolutionOptions::default(),
            guard: RecursionGuard::with_profile(RecursionProfile::SubtypeCheck),
            evaluation_depth: 0,
            excess_property_check: false,
            failures: FxHashSet::default(),
            failure: None,
            depth_reported: false,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: &ResolutionOptions) -> Self {
        self.options = options.clone();
        self.excess_property_check = options.excess_property_check;
        self.guard = RecursionGuard::with_profile(RecursionProfile::Custom {
            max_depth: options.max_subtype_depth,
            max_iterations: options.max_iterations,
        });
        self
    }

    pub fn with_evaluation_depth(mut self, depth: u32) -> Self {
        self.evaluation_depth = depth;
        self
    }

    /// Reject source object fields the target does not declare.
    pub fn set_excess_property_check(&mut self, enabled: bool) {
        if self.excess_property_check != enabled {
            self.excess_property_check = enabled;
            self.failures.clear();
        }
    }

    pub fn failure_reason(&self) -> Option<&SubtypeFailureReason> {
        self.failure.as_ref()
    }

    /// Diagnostics raised while evaluating meta-types or hitting limits.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }

    fn report_depth_exceeded(&mut self, source: TypeId) {
        if self.depth_reported {
            return;
        }
        self.depth_reported = true;
        let limit = self.guard.max_depth().to_string();
        let diagnostic = Diagnostic::new(DiagnosticKind::EvaluationDepthExceeded, &[&limit])
            .at(self.interner.type_origin(source));
        self.report(diagnostic);
    }

    pub fn is_assignable(&mut self, source: TypeId, target: TypeId) -> bool {
        self.failure = None;
        self.is_subtype_of(source, target)
    }

    /// Like [`Self::is_assignable`], with a diagnostic explaining a failure.
    pub fn check_assignable(&mut self, source: TypeId, target: TypeId) -> AssignabilityResult {
        if self.is_assignable(source, target) {
            return AssignabilityResult {
                assignable: true,
                reason: None,
            };
        }
        let mut formatter = TypeFormatter::new(self.interner);
        let source_text = formatter.format(source);
        let target_text = formatter.format(target);
        let mut diagnostic =
            Diagnostic::new(DiagnosticKind::NotAssignable, &[&source_text, &target_text])
                .at(self.interner.type_origin(source));
        if let Some(reason) = &self.failure {
            let location = match *reason {
                SubtypeFailureReason::MissingProperty { name }
                | SubtypeFailureReason::OptionalProperty { name }
                | SubtypeFailureReason::PropertyTypeMismatch { name, .. } => {
                    self.interner.property_origin(target, name)
                }
                SubtypeFailureReason::ExcessProperty { name } => {
                    self.interner.property_origin(source, name)
                }
                _ => None,
            };
            diagnostic = diagnostic.with_related(location, reason.message(self.interner));
        }
        AssignabilityResult {
            assignable: false,
            reason: Some(diagnostic),
        }
    }

    fn fail(&mut self, reason: SubtypeFailureReason) -> bool {
        if self.failure.is_none() {
            self.failure = Some(reason);
        }
        false
    }

    /// Evaluate a meta-type so it can be compared structurally.
    fn resolve(&mut self, type_id: TypeId) -> TypeId {
        if !self.interner.lookup(type_id).is_some_and(|key| key.is_meta()) {
            return type_id;
        }
        let mut evaluator = TypeEvaluator::with_resolver(self.interner, self.resolver)
            .with_options(&self.options)
            .with_base_depth(self.evaluation_depth);
        let resolved = evaluator.evaluate(type_id).unwrap_or(type_id);
        for diagnostic in evaluator.take_diagnostics() {
            self.report(diagnostic);
        }
        resolved
    }

    pub fn is_subtype_of(&mut self, source: TypeId, target: TypeId) -> bool {
        if source == target {
            return true;
        }
        if self.failures.contains(&(source, target)) {
            return self.fail(SubtypeFailureReason::TypeMismatch { source, target });
        }

        match self.guard.enter((source, target)) {
            RecursionResult::Entered => {}
            RecursionResult::Cycle => return true,
            RecursionResult::DepthExceeded | RecursionResult::IterationExceeded => {
                trace!(source = source.0, target = target.0, "subtype depth exceeded");
                self.report_depth_exceeded(source);
                return self.fail(SubtypeFailureReason::TypeMismatch { source, target });
            }
        }
        let result = self.check_subtype_inner(source, target);
        self.guard.leave((source, target));

        if !result {
            self.failures.insert((source, target));
        }
        result
    }

    fn check_subtype_inner(&mut self, source: TypeId, target: TypeId) -> bool {
        if target == TypeId::ANY || target == TypeId::UNKNOWN || target == TypeId::ERROR {
            return true;
        }
        if source == TypeId::NEVER || source == TypeId::ERROR {
            return true;
        }
        if source == TypeId::ANY {
            return target != TypeId::NEVER
                || self.fail(SubtypeFailureReason::TypeMismatch { source, target });
        }
        if target == TypeId::NEVER {
            return self.fail(SubtypeFailureReason::TypeMismatch { source, target });
        }

        let resolved_source = self.resolve(source);
        let resolved_target = self.resolve(target);
        if resolved_source != source || resolved_target != target {
            return self.is_subtype_of(resolved_source, resolved_target);
        }

        let source_key = self.interner.lookup(source);
        let target_key = self.interner.lookup(target);

        if let Some(TypeData::Union(list_id)) = &source_key {
            let members = self.interner.type_list(*list_id);
            return members.iter().all(|&member| self.is_subtype_of(member, target));
        }
        if source == TypeId::BOOLEAN && matches!(target_key, Some(TypeData::Union(_))) {
            return self.is_subtype_of(TypeId::BOOLEAN_TRUE, target)
                && self.is_subtype_of(TypeId::BOOLEAN_FALSE, target);
        }
        if let Some(TypeData::Union(list_id)) = &target_key {
            return self.check_union_target(source, *list_id);
        }
        if let Some(TypeData::Intersection(list_id)) = &target_key {
            let members = self.interner.type_list(*list_id);
            return members.iter().all(|&member| self.is_subtype_of(source, member));
        }
        if let Some(TypeData::Intersection(list_id)) = &source_key {
            let members = self.interner.type_list(*list_id);
            let saved = self.failure.take();
            if members.iter().any(|&member| self.is_subtype_of(member, target)) {
                self.failure = saved;
                return true;
            }
            return self.fail(SubtypeFailureReason::TypeMismatch { source, target });
        }

        match (source_key, target_key) {
            (Some(TypeData::Literal(value)), _) => {
                if value.primitive() == target {
                    return true;
                }
                if let (LiteralValue::String(atom), Some(TypeData::TemplateLiteral(list_id))) =
                    (value, self.interner.lookup(target))
                {
                    let text = self.interner.resolve_atom(atom);
                    if self.matches_template(&text, list_id) {
                        return true;
                    }
                }
                self.check_against_empty_object(source, target)
            }
            (Some(TypeData::Intrinsic(kind)), _) => {
                if kind == IntrinsicKind::Undefined && target == TypeId::VOID {
                    return true;
                }
                self.check_against_empty_object(source, target)
            }
            (Some(TypeData::TemplateLiteral(_)), _) if target == TypeId::STRING => true,
            (Some(TypeData::TypeParameter(info)), _) => {
                let constraint = info.constraint.unwrap_or(TypeId::UNKNOWN);
                if constraint != TypeId::UNKNOWN && self.is_subtype_of(constraint, target) {
                    return true;
                }
                self.fail(SubtypeFailureReason::TypeMismatch { source, target })
            }
            (Some(TypeData::Object(s)), Some(TypeData::Object(t))) => {
                self.check_object(source, s, t)
            }
            (Some(TypeData::Function(s)), Some(TypeData::Function(t))) => self.check_function(s, t),
            (Some(TypeData::Array(s)), Some(TypeData::Array(t))) => {
                self.is_subtype_of(s, t)
                    || self.fail(SubtypeFailureReason::TypeMismatch { source, target })
            }
            (Some(TypeData::Array(_) | TypeData::Function(_)), _) => {
                self.check_against_empty_object(source, target)
            }
            _ => self.fail(SubtypeFailureReason::TypeMismatch { source, target }),
        }
    }

    fn check_union_target(&mut self, source: TypeId, list_id: TypeListId) -> bool {
        let members = self.interner.type_list(list_id);
        if members.contains(&source) {
            return true;
        }
        let saved = self.failure.take();
        for &member in members.iter() {
            if self.is_subtype_of(source, member) {
                self.failure = saved;
                return true;
            }
        }
        self.failure = saved;
        self.fail(SubtypeFailureReason::NoMatchingUnionMember { source })
    }

    /// Everything except `null`, `undefined`, `void` and `unknown` fits `{}`.
    fn check_against_empty_object(&mut self, source: TypeId, target: TypeId) -> bool {
        let is_empty_object = match self.interner.lookup(target) {
            Some(TypeData::Object(shape_id)) => {
                let shape = self.interner.object_shape(shape_id);
                shape.properties.is_empty() && shape.string_index.is_none()
            }
            _ => false,
        };
        if is_empty_object && !source.is_nullish() && source != TypeId::VOID && source != TypeId::UNKNOWN
        {
            return true;
        }
        self.fail(SubtypeFailureReason::TypeMismatch { source, target })
    }

    fn check_object(
        &mut self,
        source: TypeId,
        source_shape: ObjectShapeId,
        target_shape: ObjectShapeId,
    ) -> bool {
        let source_shape = self.interner.object_shape(source_shape);
        let target_shape = self.interner.object_shape(target_shape);

        for target_prop in &target_shape.properties {
            match source_shape.find(target_prop.name) {
                Some(source_prop) => {
                    if source_prop.optional && !target_prop.optional {
                        return self.fail(SubtypeFailureReason::OptionalProperty {
                            name: target_prop.name,
                        });
                    }
                    if !self.is_subtype_of(source_prop.type_id, target_prop.type_id) {
                        // The outermost field names the failure.
                        self.failure = Some(SubtypeFailureReason::PropertyTypeMismatch {
                            name: target_prop.name,
                            source: source_prop.type_id,
                            target: target_prop.type_id,
                        });
                        return false;
                    }
                }
                None if target_prop.optional => {}
                None => {
                    return self.fail(SubtypeFailureReason::MissingProperty {
                        name: target_prop.name,
                    });
                }
            }
        }

        if let Some(target_index) = target_shape.string_index {
            for source_prop in &source_shape.properties {
                if !self.is_subtype_of(source_prop.type_id, target_index) {
                    return self.fail(SubtypeFailureReason::PropertyTypeMismatch {
                        name: source_prop.name,
                        source: source_prop.type_id,
                        target: target_index,
                    });
                }
            }
            if let Some(source_index) = source_shape.string_index
                && !self.is_subtype_of(source_index, target_index)
            {
                return self.fail(SubtypeFailureReason::TypeMismatch {
                    source: source_index,
                    target: target_index,
                });
            }
        } else if self.excess_property_check {
            if let Some(extra) = source_shape
                .properties
                .iter()
                .find(|prop| target_shape.find(prop.name).is_none())
            {
                trace!(source = source.0, "excess property");
                return self.fail(SubtypeFailureReason::ExcessProperty { name: extra.name });
            }
        }
        true
    }

    fn check_function(&mut self, source: FunctionShapeId, target: FunctionShapeId) -> bool {
        let source = self.interner.function_shape(source);
        let target = self.interner.function_shape(target);

        if source.params.len() > target.params.len() {
            return self.fail(SubtypeFailureReason::TooManyParameters {
                source: source.params.len(),
                target: target.params.len(),
            });
        }
        for (&source_param, &target_param) in source.params.iter().zip(target.params.iter()) {
            if !self.is_subtype_of(target_param, source_param) {
                return self.fail(SubtypeFailureReason::TypeMismatch {
                    source: target_param,
                    target: source_param,
                });
            }
        }
        if target.return_type == TypeId::VOID {
            return true;
        }
        if !self.is_subtype_of(source.return_type, target.return_type) {
            self.failure = Some(SubtypeFailureReason::ReturnTypeMismatch {
                source: source.return_type,
                target: target.return_type,
            });
            return false;
        }
        true
    }

    /// Whether `text` is one of the strings the template describes.
    fn matches_template(&self, text: &str, list_id: TemplateListId) -> bool {
        let spans = self.interner.template_list(list_id);
        self.match_spans(text, &spans)
    }

    fn match_spans(&self, text: &str, spans: &[TemplateSpan]) -> bool {
        let Some((first, rest)) = spans.split_first() else {
            return text.is_empty();
        };
        match *first {
            TemplateSpan::Text(atom) => {
                let literal = self.interner.resolve_atom_ref(atom);
                text.strip_prefix(literal.as_ref())
                    .is_some_and(|remaining| self.match_spans(remaining, rest))
            }
            TemplateSpan::Type(hole) => (0..=text.len())
                .filter(|&end| text.is_char_boundary(end))
                .any(|end| self.hole_accepts(&text[..end], hole) && self.match_spans(&text[end..], rest)),
        }
    }

    fn hole_accepts(&self, piece: &str, hole: TypeId) -> bool {
        match hole {
            TypeId::STRING | TypeId::ANY => true,
            TypeId::NUMBER => !piece.is_empty() && piece.trim().parse::<f64>().is_ok(),
            TypeId::BOOLEAN => piece == "true" || piece == "false",
            _ => match self.interner.lookup(hole) {
                Some(TypeData::Literal(LiteralValue::String(atom))) => {
                    self.interner.resolve_atom_ref(atom).as_ref() == piece
                }
                Some(TypeData::Union(list_id)) => self
                    .interner
                    .type_list(list_id)
                    .iter()
                    .any(|&member| self.hole_accepts(piece, member)),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
#[path = "tests/subtype_tests.rs"]
mod tests;

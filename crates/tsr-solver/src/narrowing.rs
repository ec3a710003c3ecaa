//! Type narrowing for discriminated unions and type guards.
//!
//! Discriminated unions are unions where each member has a common
//! "discriminant" field whose literal type identifies the member:
//!
//! ```text
//! type Shape =
//!   | { kind: "circle", radius: number }
//!   | { kind: "square", side: number };
//!
//! shape.kind === "circle"   // true branch: { kind: "circle", radius: number }
//! ```
//!
//! A [`TypeGuard`] is a syntax-free description of a condition. The context
//! applies it to a type for one [`Branch`] of the condition; the two branch
//! results joined back together give the original type.

use crate::context::{NoopResolver, ResolutionOptions, TypeResolver};
use crate::evaluate::TypeEvaluator;
use crate::format::TypeFormatter;
use crate::intern::TypeInterner;
use crate::normalize::Normalizer;
use crate::subtype::SubtypeChecker;
use crate::type_queries::union_members;
use crate::types::*;
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, span, trace};
use tsr_common::diagnostics::{Diagnostic, DiagnosticKind};
use tsr_common::interner::Atom;

/// Result strings of the `typeof` operator that narrowing understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeofKind {
    String,
    Number,
    Boolean,
    Undefined,
    Object,
    Function,
}

impl TypeofKind {
    pub fn from_name(name: &str) -> Option<TypeofKind> {
        match name {
            "string" => Some(TypeofKind::String),
            "number" => Some(TypeofKind::Number),
            "boolean" => Some(TypeofKind::Boolean),
            "undefined" => Some(TypeofKind::Undefined),
            "object" => Some(TypeofKind::Object),
            "function" => Some(TypeofKind::Function),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TypeofKind::String => "string",
            TypeofKind::Number => "number",
            TypeofKind::Boolean => "boolean",
            TypeofKind::Undefined => "undefined",
            TypeofKind::Object => "object",
            TypeofKind::Function => "function",
        }
    }
}

/// A narrowing condition, independent of any syntax tree.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeGuard {
    /// `typeof x === "kind"`
    Typeof(TypeofKind),
    /// `x === literal`
    LiteralEquality(TypeId),
    /// `x == null`, matching both `null` and `undefined`.
    NullishEquality,
    /// `if (x)`
    Truthy,
    /// `x.prop === literal`
    Discriminant { property_name: Atom, value_type: TypeId },
    /// `"prop" in x`
    InProperty(Atom),
    /// `isT(x)` for a predicate `x is T`.
    Predicate { asserts_to: TypeId },
}

/// Which side of a condition is being narrowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    True,
    False,
}

impl Branch {
    #[inline]
    pub fn is_true(self) -> bool {
        self == Branch::True
    }
}

/// A discriminant field found in a union.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscriminantInfo {
    pub property_name: Atom,
    /// `(literal type, union member)` pairs.
    pub variants: Vec<(TypeId, TypeId)>,
}

/// How a member relates to a guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GuardMatch {
    Yes,
    No,
    Maybe,
}

pub struct NarrowingContext<'a, R: TypeResolver = NoopResolver> {
    interner: &'a TypeInterner,
    resolver: &'a R,
    options: ResolutionOptions,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> NarrowingContext<'a, NoopResolver> {
    pub fn new(interner: &'a TypeInterner) -> NarrowingContext<'a, NoopResolver> {
        static NOOP: NoopResolver = NoopResolver;
        NarrowingContext::with_resolver(interner, &NOOP)
    }
}

impl<'a, R: TypeResolver> NarrowingContext<'a, R> {
    pub fn with_resolver(interner: &'a TypeInterner, resolver: &'a R) -> Self {
        NarrowingContext {
            interner,
            resolver,
            options: ResolutionOptions::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: &ResolutionOptions) -> Self {
        self.options = options.clone();
        self
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn resolve_type(&mut self, type_id: TypeId) -> TypeId {
        if type_id.is_intrinsic() {
            return type_id;
        }
        let mut evaluator =
            TypeEvaluator::with_resolver(self.interner, self.resolver).with_options(&self.options);
        let result = evaluator.evaluate(type_id).unwrap_or(type_id);
        self.diagnostics.extend(evaluator.take_diagnostics());
        result
    }

    fn is_assignable(&mut self, source: TypeId, target: TypeId) -> bool {
        let mut checker = SubtypeChecker::with_resolver(self.interner, self.resolver).with_options(
            &ResolutionOptions {
                excess_property_check: false,
                ..self.options.clone()
            },
        );
        let result = checker.is_assignable(source, target);
        for diagnostic in checker.take_diagnostics() {
            if !self.diagnostics.contains(&diagnostic) {
                self.diagnostics.push(diagnostic);
            }
        }
        result
    }

    fn rebuild(&self, members: Vec<TypeId>) -> TypeId {
        if members.is_empty() {
            return TypeId::NEVER;
        }
        Normalizer::new(self.interner).union(members)
    }

    /// Merge the types flowing out of two branches.
    pub fn join(&self, left: TypeId, right: TypeId) -> TypeId {
        self.rebuild(vec![left, right])
    }

    /// Narrow `type_id` under `guard` for one side of the condition.
    pub fn narrow(&mut self, type_id: TypeId, guard: &TypeGuard, branch: Branch) -> TypeId {
        let _span = span!(Level::TRACE, "narrow", type_id = type_id.0, ?branch).entered();
        let resolved = self.resolve_type(type_id);
        let result = match guard {
            TypeGuard::Typeof(kind) => self.narrow_by_typeof(resolved, *kind, branch),
            TypeGuard::LiteralEquality(literal) => {
                self.narrow_by_literal(resolved, *literal, branch)
            }
            TypeGuard::NullishEquality => self.narrow_by_nullish(resolved, branch),
            TypeGuard::Truthy => self.narrow_by_truthiness(resolved, branch),
            TypeGuard::Discriminant {
                property_name,
                value_type,
            } => self.narrow_by_discriminant(resolved, *property_name, *value_type, branch),
            TypeGuard::InProperty(name) => self.narrow_by_property_presence(resolved, *name, branch),
            TypeGuard::Predicate { asserts_to } => {
                let asserts_to = self.resolve_type(*asserts_to);
                self.narrow_by_predicate(resolved, asserts_to, branch)
            }
        };
        trace!(result = result.0, "narrowed");
        result
    }

    /// Find discriminant fields: present in every member with a distinct
    /// literal type each.
    pub fn find_discriminants(&mut self, union_type: TypeId) -> Vec<DiscriminantInfo> {
        let _span = span!(Level::TRACE, "find_discriminants", union_type = union_type.0).entered();
        let resolved = self.resolve_type(union_type);
        let members = match self.interner.lookup(resolved) {
            Some(TypeData::Union(list_id)) => self.interner.type_list(list_id),
            _ => return Vec::new(),
        };
        if members.len() < 2 {
            return Vec::new();
        }

        let mut shapes = Vec::with_capacity(members.len());
        for &member in members.iter() {
            match self.interner.lookup(member) {
                Some(TypeData::Object(shape_id)) => shapes.push(self.interner.object_shape(shape_id)),
                _ => {
                    trace!("non-object member, no discriminants");
                    return Vec::new();
                }
            }
        }

        let mut discriminants = Vec::new();
        for candidate in &shapes[0].properties {
            let mut variants = Vec::with_capacity(members.len());
            let is_discriminant = shapes.iter().zip(members.iter()).all(|(shape, &member)| {
                let Some(prop) = shape.find(candidate.name) else {
                    return false;
                };
                let is_literal = matches!(self.interner.lookup(prop.type_id), Some(TypeData::Literal(_)))
                    || prop.type_id == TypeId::NULL
                    || prop.type_id == TypeId::UNDEFINED;
                if !is_literal || variants.iter().any(|&(seen, _)| seen == prop.type_id) {
                    return false;
                }
                variants.push((prop.type_id, member));
                true
            });
            if is_discriminant {
                discriminants.push(DiscriminantInfo {
                    property_name: candidate.name,
                    variants,
                });
            }
        }
        debug!(count = discriminants.len(), "discriminants found");
        discriminants
    }

    fn narrow_by_typeof(&mut self, type_id: TypeId, kind: TypeofKind, branch: Branch) -> TypeId {
        if type_id.is_any_or_unknown() {
            if !branch.is_true() {
                return type_id;
            }
            return match kind {
                TypeofKind::String => TypeId::STRING,
                TypeofKind::Number => TypeId::NUMBER,
                TypeofKind::Boolean => TypeId::BOOLEAN,
                TypeofKind::Undefined => TypeId::UNDEFINED,
                TypeofKind::Object => {
                    let empty = self.interner.object(Vec::new());
                    self.rebuild(vec![empty, TypeId::NULL])
                }
                TypeofKind::Function => type_id,
            };
        }

        let mut kept = Vec::new();
        for member in union_members(self.interner, type_id) {
            match (self.typeof_match(member, kind), branch) {
                (GuardMatch::Yes, Branch::True) | (GuardMatch::No, Branch::False) => kept.push(member),
                (GuardMatch::Maybe, Branch::False) => kept.push(member),
                (GuardMatch::Maybe, Branch::True) => {
                    let narrowed = match kind {
                        TypeofKind::String => Some(TypeId::STRING),
                        TypeofKind::Number => Some(TypeId::NUMBER),
                        TypeofKind::Boolean => Some(TypeId::BOOLEAN),
                        TypeofKind::Undefined => Some(TypeId::UNDEFINED),
                        TypeofKind::Object | TypeofKind::Function => None,
                    };
                    kept.push(match narrowed {
                        Some(primitive) => self.interner.intersection_raw(vec![member, primitive]),
                        None => member,
                    });
                }
                _ => {}
            }
        }
        self.rebuild(kept)
    }

    fn typeof_match(&self, member: TypeId, kind: TypeofKind) -> GuardMatch {
        let member_kind = match member {
            TypeId::STRING => Some(TypeofKind::String),
            TypeId::NUMBER => Some(TypeofKind::Number),
            TypeId::BOOLEAN | TypeId::BOOLEAN_TRUE | TypeId::BOOLEAN_FALSE => Some(TypeofKind::Boolean),
            TypeId::UNDEFINED | TypeId::VOID => Some(TypeofKind::Undefined),
            TypeId::NULL => Some(TypeofKind::Object),
            TypeId::ANY | TypeId::UNKNOWN => None,
            _ => match self.interner.lookup(member) {
                Some(TypeData::Literal(LiteralValue::String(_))) => Some(TypeofKind::String),
                Some(TypeData::Literal(LiteralValue::Number(_))) => Some(TypeofKind::Number),
                Some(TypeData::Literal(LiteralValue::Boolean(_))) => Some(TypeofKind::Boolean),
                Some(TypeData::TemplateLiteral(_) | TypeData::StringIntrinsic { .. }) => {
                    Some(TypeofKind::String)
                }
                Some(TypeData::Object(_) | TypeData::Array(_)) => Some(TypeofKind::Object),
                Some(TypeData::Function(_)) => Some(TypeofKind::Function),
                Some(TypeData::TypeParameter(info)) => {
                    return match info.constraint {
                        Some(constraint) => self.typeof_match(constraint, kind),
                        None => GuardMatch::Maybe,
                    };
                }
                _ => None,
            },
        };
        match member_kind {
            Some(found) if found == kind => GuardMatch::Yes,
            Some(_) => GuardMatch::No,
            None => GuardMatch::Maybe,
        }
    }

    fn narrow_by_literal(&mut self, type_id: TypeId, literal: TypeId, branch: Branch) -> TypeId {
        if type_id.is_any_or_unknown() {
            return if branch.is_true() { literal } else { type_id };
        }
        let mut kept = Vec::new();
        for member in union_members(self.interner, type_id) {
            if branch.is_true() {
                if member == literal {
                    kept.push(member);
                } else if self.is_assignable(literal, member) {
                    kept.push(literal);
                }
                continue;
            }
            if member == literal {
                continue;
            }
            // `boolean` minus one boolean literal is the other.
            if member == TypeId::BOOLEAN && literal == TypeId::BOOLEAN_TRUE {
                kept.push(TypeId::BOOLEAN_FALSE);
            } else if member == TypeId::BOOLEAN && literal == TypeId::BOOLEAN_FALSE {
                kept.push(TypeId::BOOLEAN_TRUE);
            } else {
                kept.push(member);
            }
        }
        self.rebuild(kept)
    }

    fn narrow_by_nullish(&mut self, type_id: TypeId, branch: Branch) -> TypeId {
        if type_id.is_any_or_unknown() {
            return if branch.is_true() {
                self.rebuild(vec![TypeId::NULL, TypeId::UNDEFINED])
            } else {
                type_id
            };
        }
        let kept = union_members(self.interner, type_id)
            .into_iter()
            .filter(|&member| {
                let nullish = member.is_nullish() || member == TypeId::VOID;
                nullish == branch.is_true()
            })
            .collect();
        self.rebuild(kept)
    }

    fn narrow_by_truthiness(&mut self, type_id: TypeId, branch: Branch) -> TypeId {
        let mut kept = Vec::new();
        for member in union_members(self.interner, type_id) {
            match (self.truthiness(member), branch) {
                (Some(true), Branch::True) | (Some(false), Branch::False) => kept.push(member),
                (Some(_), _) => {}
                (None, Branch::True) => kept.push(if member == TypeId::BOOLEAN {
                    TypeId::BOOLEAN_TRUE
                } else {
                    member
                }),
                (None, Branch::False) => kept.push(match member {
                    TypeId::STRING => self.interner.literal_string(""),
                    TypeId::NUMBER => self.interner.literal_number(0.0),
                    TypeId::BOOLEAN => TypeId::BOOLEAN_FALSE,
                    _ => member,
                }),
            }
        }
        self.rebuild(kept)
    }

    /// `Some(truthy)` when the member's truthiness is fixed.
    fn truthiness(&self, member: TypeId) -> Option<bool> {
        match member {
            TypeId::NULL | TypeId::UNDEFINED | TypeId::VOID | TypeId::NEVER => Some(false),
            TypeId::STRING | TypeId::NUMBER | TypeId::BOOLEAN | TypeId::ANY | TypeId::UNKNOWN => None,
            _ => match self.interner.lookup(member) {
                Some(TypeData::Literal(value)) => Some(!value.is_falsy()),
                Some(TypeData::Object(_) | TypeData::Array(_) | TypeData::Function(_)) => Some(true),
                _ => None,
            },
        }
    }

    fn narrow_by_discriminant(
        &mut self,
        type_id: TypeId,
        property_name: Atom,
        value_type: TypeId,
        branch: Branch,
    ) -> TypeId {
        let mut kept = Vec::new();
        for member in union_members(self.interner, type_id) {
            let field = match self.interner.lookup(member) {
                Some(TypeData::Object(shape_id)) => self
                    .interner
                    .object_shape(shape_id)
                    .find(property_name)
                    .map(|prop| prop.type_id),
                _ => None,
            };
            let Some(field) = field else {
                if !branch.is_true() {
                    kept.push(member);
                }
                continue;
            };
            let field = self.resolve_type(field);
            let constituents = union_members(self.interner, field);
            let mut matching = Vec::with_capacity(constituents.len());
            for &c in &constituents {
                let matches = if branch.is_true() {
                    c == value_type
                        || self.is_assignable(value_type, c)
                        || self.is_assignable(c, value_type)
                } else {
                    c != value_type
                };
                if matches {
                    matching.push(c);
                }
            }
            if matching.is_empty() {
                continue;
            }
            if matching.len() == constituents.len() {
                kept.push(member);
            } else {
                // `{ kind: "a" | "b" }` checked against "a" keeps `{ kind: "a" }`.
                let narrowed = self.rebuild(matching);
                kept.push(self.with_field_type(member, property_name, narrowed));
            }
        }
        self.rebuild(kept)
    }

    fn with_field_type(&self, object: TypeId, name: Atom, field: TypeId) -> TypeId {
        let Some(TypeData::Object(shape_id)) = self.interner.lookup(object) else {
            return object;
        };
        let shape = self.interner.object_shape(shape_id);
        let properties = shape
            .properties
            .iter()
            .map(|prop| PropertyInfo {
                type_id: if prop.name == name { field } else { prop.type_id },
                ..prop.clone()
            })
            .collect();
        self.interner.object_with_index(ObjectShape {
            properties,
            string_index: shape.string_index,
        })
    }

    fn narrow_by_property_presence(&mut self, type_id: TypeId, name: Atom, branch: Branch) -> TypeId {
        if type_id.is_any_or_unknown() {
            return type_id;
        }
        let mut kept = Vec::new();
        for member in union_members(self.interner, type_id) {
            let presence = match self.interner.lookup(member) {
                Some(TypeData::Object(shape_id)) => {
                    let shape = self.interner.object_shape(shape_id);
                    match shape.find(name) {
                        Some(prop) if prop.optional => GuardMatch::Maybe,
                        Some(_) => GuardMatch::Yes,
                        None if shape.string_index.is_some() => GuardMatch::Maybe,
                        None => GuardMatch::No,
                    }
                }
                Some(TypeData::TypeParameter(_) | TypeData::Intersection(_)) => GuardMatch::Maybe,
                _ => GuardMatch::No,
            };
            let keep = match presence {
                GuardMatch::Yes => branch.is_true(),
                GuardMatch::No => !branch.is_true(),
                GuardMatch::Maybe => true,
            };
            if keep {
                kept.push(member);
            }
        }
        self.rebuild(kept)
    }

    fn narrow_by_predicate(&mut self, type_id: TypeId, asserts_to: TypeId, branch: Branch) -> TypeId {
        if type_id.is_any_or_unknown() {
            return if branch.is_true() { asserts_to } else { type_id };
        }
        let members = union_members(self.interner, type_id);

        if branch.is_true() {
            let mut kept = Vec::with_capacity(members.len());
            for member in members {
                if self.is_assignable(member, asserts_to) {
                    kept.push(member);
                } else if self.is_assignable(asserts_to, member) {
                    kept.push(asserts_to);
                } else if self.may_overlap(member, asserts_to) {
                    kept.push(Normalizer::new(self.interner).intersection(vec![member, asserts_to]));
                }
            }
            return self.rebuild(kept);
        }

        let mut kept = Vec::with_capacity(members.len());
        for member in members {
            if self.is_assignable(member, asserts_to) {
                continue;
            }
            if !self.may_overlap(member, asserts_to) {
                kept.push(member);
                continue;
            }
            // Partial overlap: removing it is not expressible.
            let mut formatter = TypeFormatter::new(self.interner);
            let excluded = formatter.format(asserts_to);
            let original = formatter.format(type_id);
            debug!(%excluded, %original, "predicate exclusion is ambiguous");
            let diagnostic =
                Diagnostic::new(DiagnosticKind::NarrowingAmbiguous, &[&excluded, &original])
                    .at(self.interner.type_origin(type_id));
            self.diagnostics.push(diagnostic);
            return type_id;
        }
        self.rebuild(kept)
    }

    /// Whether some value could inhabit both types.
    fn may_overlap(&self, left: TypeId, right: TypeId) -> bool {
        let intersection = Normalizer::new(self.interner).intersection(vec![left, right]);
        if intersection == TypeId::NEVER {
            return false;
        }
        // A required field reduced to `never` has no values either.
        match self.interner.lookup(intersection) {
            Some(TypeData::Object(shape_id)) => !self
                .interner
                .object_shape(shape_id)
                .properties
                .iter()
                .any(|prop| prop.type_id == TypeId::NEVER && !prop.optional),
            _ => true,
        }
    }
}

#[cfg(test)]
#[path = "tests/narrowing_tests.rs"]
mod tests;

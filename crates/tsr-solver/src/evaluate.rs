//! Type evaluation for meta-types.
//!
//! Meta-types are type-level functions that compute an output type from
//! their inputs:
//! - alias references: `Name<Args>`
//! - conditional types: `T extends U ? X : Y`, distributive over unions
//! - mapped types: `{ [K in keyof T as N]: V }`
//! - index access: `T[K]`
//! - template literals and string intrinsics
//!
//! The evaluator walks a type, resolves every meta node it can and
//! normalizes the result. A node that still depends on an unbound generic
//! is deferred: it comes back as a raw node with its known parts evaluated.
//!
//! Recursive aliases are expanded lazily. When an alias is re-entered with
//! the same arguments through an object, array or function, the inner
//! occurrence is left as a `Reference`; re-entry without such a wrapper is a
//! `CyclicTypeAlias` and resolves to `any`.

use crate::context::{
    CancellationToken, Cancelled, NoopResolver, ResolutionOptions, TypeResolver,
};
use crate::instantiate::{TypeSubstitution, instantiate_type};
use crate::intern::TypeInterner;
use crate::normalize::Normalizer;
use crate::recursion::{RecursionGuard, RecursionProfile, RecursionResult};
use crate::subtype::SubtypeChecker;
use crate::types::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};
use tsr_common::diagnostics::{Diagnostic, DiagnosticKind};
use tsr_common::interner::Atom;
use tsr_common::span::SourceTag;

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROWTH: usize = 1024 * 1024;

/// Evaluation result; cancellation is the only way out early.
pub type EvalResult = Result<TypeId, Cancelled>;

/// One alias expansion in progress.
#[derive(Clone, Copy, Debug)]
struct AliasFrame {
    name: Atom,
    args: TypeListId,
    /// Object/array/function nesting when the expansion started.
    productive_depth: u32,
}

/// Type evaluator for meta-types.
///
/// Uses `&mut self` throughout; create one per request (or per worker).
pub struct TypeEvaluator<'a, R: TypeResolver = NoopResolver> {
    interner: &'a TypeInterner,
    resolver: &'a R,
    options: ResolutionOptions,
    cancel: Option<CancellationToken>,
    guard: RecursionGuard<TypeId>,
    cache: FxHashMap<TypeId, TypeId>,
    alias_stack: Vec<AliasFrame>,
    productive_depth: u32,
    reported_cycles: FxHashSet<Atom>,
    depth_reported: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> TypeEvaluator<'a, NoopResolver> {
    /// Create a new evaluator without a resolver.
    pub fn new(interner: &'a TypeInterner) -> TypeEvaluator<'a, NoopResolver> {
        static NOOP: NoopResolver = NoopResolver;
        TypeEvaluator::with_resolver(interner, &NOOP)
    }
}

impl<'a, R: TypeResolver> TypeEvaluator<'a, R> {
    /// Create a new evaluator with a custom resolver.
    pub fn with_resolver(interner: &'a TypeInterner, resolver: &'a R) -> Self {
        TypeEvaluator {
            interner,
            resolver,
            options: ResolutionOptions::default(),
            cancel: None,
            guard: RecursionGuard::with_profile(RecursionProfile::TypeEvaluation),
            cache: FxHashMap::default(),
            alias_stack: Vec::new(),
            productive_depth: 0,
            reported_cycles: FxHashSet::default(),
            depth_reported: false,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: &ResolutionOptions) -> Self {
        self.options = options.clone();
        let base = self.guard.depth();
        self.guard = RecursionGuard::with_profile(RecursionProfile::Custom {
            max_depth: options.max_evaluation_depth,
            max_iterations: options.max_iterations,
        })
        .with_base_depth(base);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Start the depth count at `depth` (for evaluators nested in a check).
    pub fn with_base_depth(mut self, depth: u32) -> Self {
        self.guard = RecursionGuard::with_profile(RecursionProfile::Custom {
            max_depth: self.options.max_evaluation_depth,
            max_iterations: self.options.max_iterations,
        })
        .with_base_depth(depth);
        self
    }

    // =========================================================================
    // Accessor methods for evaluate_rules modules
    // =========================================================================

    #[inline]
    pub(crate) fn interner(&self) -> &'a TypeInterner {
        self.interner
    }

    #[inline]
    pub(crate) fn resolver(&self) -> &'a R {
        self.resolver
    }

    #[inline]
    pub(crate) fn options(&self) -> &ResolutionOptions {
        &self.options
    }

    /// Current evaluation nesting.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.guard.depth()
    }

    #[inline]
    pub fn is_depth_exceeded(&self) -> bool {
        self.guard.is_exceeded()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }

    #[inline]
    pub(crate) fn check_cancelled(&self) -> Result<(), Cancelled> {
        match &self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }

    pub(crate) fn origin(&self, type_id: TypeId) -> Option<SourceTag> {
        self.interner.type_origin(type_id)
    }

    // =========================================================================
    // Normalization helpers
    // =========================================================================

    pub(crate) fn normalize_union(&mut self, members: Vec<TypeId>) -> TypeId {
        let mut normalizer = Normalizer::new(self.interner);
        let result = normalizer.union(members);
        for diagnostic in normalizer.take_diagnostics() {
            self.report(diagnostic);
        }
        result
    }

    pub(crate) fn normalize_intersection(
        &mut self,
        members: Vec<TypeId>,
        site: Option<SourceTag>,
    ) -> TypeId {
        let mut normalizer = Normalizer::new(self.interner).with_site(site);
        let result = normalizer.intersection(members);
        for diagnostic in normalizer.take_diagnostics() {
            self.report(diagnostic);
        }
        result
    }

    /// Structural assignability as seen from inside an evaluation.
    pub(crate) fn is_assignable(&mut self, source: TypeId, target: TypeId) -> bool {
        let mut checker = SubtypeChecker::with_resolver(self.interner, self.resolver)
            .with_options(&self.options)
            .with_evaluation_depth(self.guard.depth());
        let result = checker.is_assignable(source, target);
        for diagnostic in checker.take_diagnostics() {
            self.report(diagnostic);
        }
        result
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Evaluate a type, resolving any meta-types if possible.
    /// Returns the evaluated type (the same id if nothing needed evaluation).
    pub fn evaluate(&mut self, type_id: TypeId) -> EvalResult {
        if type_id.is_intrinsic() {
            return Ok(type_id);
        }
        self.check_cancelled()?;

        if let Some(&cached) = self.cache.get(&type_id) {
            return Ok(cached);
        }
        // Once the limit was hit, unwind without further expansion.
        if self.guard.is_exceeded() {
            return Ok(type_id);
        }

        match self.guard.enter(type_id) {
            RecursionResult::Entered => {}
            RecursionResult::Cycle => return Ok(self.reenter_cycle(type_id)),
            RecursionResult::DepthExceeded | RecursionResult::IterationExceeded => {
                self.report_depth_exceeded(type_id);
                return Ok(type_id);
            }
        }

        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
            self.evaluate_inner(type_id)
        });
        self.guard.leave(type_id);
        let result = result?;

        if !self.guard.is_exceeded() {
            self.cache.insert(type_id, result);
        }
        Ok(result)
    }

    /// Evaluate, then normalize what came out.
    pub fn evaluate_normalized(&mut self, type_id: TypeId) -> EvalResult {
        let evaluated = self.evaluate(type_id)?;
        let mut normalizer = Normalizer::new(self.interner).with_site(self.origin(type_id));
        let result = normalizer.normalize(evaluated);
        for diagnostic in normalizer.take_diagnostics() {
            self.report(diagnostic);
        }
        Ok(result)
    }

    /// Evaluate `conditional` under `subst`.
    ///
    /// A check type that is a generic bound to a union distributes over the
    /// union's members; an unbound generic defers.
    pub fn evaluate_conditional(
        &mut self,
        conditional: &ConditionalType,
        subst: &TypeSubstitution,
    ) -> EvalResult {
        let raw = self.interner.conditional(conditional.clone());
        let instantiated = instantiate_type(self.interner, raw, subst);
        self.evaluate(instantiated)
    }

    /// Evaluate `mapped` under `subst`.
    pub fn evaluate_mapped(&mut self, mapped: &MappedType, subst: &TypeSubstitution) -> EvalResult {
        let raw = self.interner.mapped(mapped.clone());
        let instantiated = instantiate_type(self.interner, raw, subst);
        self.evaluate(instantiated)
    }

    fn evaluate_inner(&mut self, type_id: TypeId) -> EvalResult {
        let Some(key) = self.interner.lookup(type_id) else {
            return Ok(type_id);
        };

        match key {
            TypeData::Intrinsic(_)
            | TypeData::Literal(_)
            | TypeData::TypeParameter(_)
            | TypeData::Error => Ok(type_id),
            TypeData::Union(list_id) => {
                let members = self.evaluate_list(list_id)?;
                Ok(self.normalize_union(members))
            }
            TypeData::Intersection(list_id) => {
                let members = self.evaluate_list(list_id)?;
                let site = self.origin(type_id);
                Ok(self.normalize_intersection(members, site))
            }
            TypeData::Object(shape_id) => {
                self.productive_depth += 1;
                let result = self.evaluate_object(type_id, shape_id);
                self.productive_depth -= 1;
                result
            }
            TypeData::Function(shape_id) => {
                self.productive_depth += 1;
                let result = self.evaluate_function(type_id, shape_id);
                self.productive_depth -= 1;
                result
            }
            TypeData::Array(element) => {
                self.productive_depth += 1;
                let result = self.evaluate(element);
                self.productive_depth -= 1;
                let element_eval = result?;
                Ok(if element_eval == element {
                    type_id
                } else {
                    self.interner.array(element_eval)
                })
            }
            TypeData::Reference(name, args) => self.evaluate_reference(type_id, name, args),
            TypeData::Conditional(cond_id) => {
                let cond = self.interner.conditional_type(cond_id);
                self.resolve_conditional(type_id, &cond)
            }
            TypeData::Mapped(mapped_id) => {
                let mapped = self.interner.mapped_type(mapped_id);
                self.resolve_mapped(type_id, &mapped)
            }
            TypeData::IndexAccess(object, key) => self.evaluate_index_access(type_id, object, key),
            TypeData::TemplateLiteral(list_id) => self.evaluate_template_literal(type_id, list_id),
            TypeData::StringIntrinsic { kind, type_arg } => {
                self.evaluate_string_intrinsic(type_id, kind, type_arg)
            }
        }
    }

    fn evaluate_list(&mut self, list_id: TypeListId) -> Result<Vec<TypeId>, Cancelled> {
        let members = self.interner.type_list(list_id);
        let mut evaluated = Vec::with_capacity(members.len());
        for &member in members.iter() {
            evaluated.push(self.evaluate(member)?);
        }
        Ok(evaluated)
    }

    fn evaluate_object(&mut self, type_id: TypeId, shape_id: ObjectShapeId) -> EvalResult {
        let shape = self.interner.object_shape(shape_id);
        let mut changed = false;
        let mut properties = Vec::with_capacity(shape.properties.len());
        for prop in &shape.properties {
            let evaluated = self.evaluate(prop.type_id)?;
            changed |= evaluated != prop.type_id;
            properties.push(PropertyInfo {
                type_id: evaluated,
                ..prop.clone()
            });
        }
        let string_index = match shape.string_index {
            Some(index) => {
                let evaluated = self.evaluate(index)?;
                changed |= evaluated != index;
                Some(evaluated)
            }
            None => None,
        };
        if !changed {
            return Ok(type_id);
        }
        let names: Vec<Atom> = properties.iter().map(|p| p.name).collect();
        let rebuilt = self.interner.object_with_index(ObjectShape {
            properties,
            string_index,
        });
        self.interner.copy_property_origins(type_id, rebuilt, &names);
        Ok(rebuilt)
    }

    fn evaluate_function(&mut self, type_id: TypeId, shape_id: FunctionShapeId) -> EvalResult {
        let shape = self.interner.function_shape(shape_id);
        let mut params = Vec::with_capacity(shape.params.len());
        for &param in &shape.params {
            params.push(self.evaluate(param)?);
        }
        let return_type = self.evaluate(shape.return_type)?;
        if params == shape.params && return_type == shape.return_type {
            return Ok(type_id);
        }
        Ok(self.interner.function(params, return_type))
    }

    /// Expand `Name<Args>` through the resolver.
    fn evaluate_reference(&mut self, type_id: TypeId, name: Atom, args: TypeListId) -> EvalResult {
        let Some(alias) = self.resolver.resolve_alias(name) else {
            let text = self.interner.resolve_atom(name);
            debug!(name = %text, "unresolved type reference");
            let diagnostic = Diagnostic::new(DiagnosticKind::UnresolvedReference, &[&text])
                .at(self.origin(type_id));
            self.report(diagnostic);
            return Ok(TypeId::UNKNOWN);
        };

        let evaluated = self.evaluate_list(args)?;
        let key = self.interner.intern_type_list(evaluated.clone());

        if let Some(frame) = self
            .alias_stack
            .iter()
            .rev()
            .find(|frame| frame.name == name && frame.args == key)
            .copied()
        {
            let lazy = self.interner.reference(name, evaluated);
            let origin = alias.origin.or_else(|| self.origin(type_id));
            return Ok(self.reenter_alias(frame, lazy, origin));
        }

        let subst = TypeSubstitution::from_args(&alias.params, &evaluated);
        let body = instantiate_type(self.interner, alias.body, &subst);

        self.alias_stack.push(AliasFrame {
            name,
            args: key,
            productive_depth: self.productive_depth,
        });
        let result = self.evaluate(body);
        self.alias_stack.pop();
        result
    }

    /// A type already on the evaluation stack was reached again. Only alias
    /// references get special treatment; anything else is returned as is.
    fn reenter_cycle(&mut self, type_id: TypeId) -> TypeId {
        let Some(TypeData::Reference(name, _)) = self.interner.lookup(type_id) else {
            return type_id;
        };
        let Some(frame) = self.alias_stack.iter().rev().find(|f| f.name == name).copied() else {
            return type_id;
        };
        let origin = self
            .resolver
            .resolve_alias(name)
            .and_then(|alias| alias.origin)
            .or_else(|| self.origin(type_id));
        self.reenter_alias(frame, type_id, origin)
    }

    /// Re-entry of an alias under expansion: lazy when an object, array or
    /// function sits in between, a cycle otherwise.
    fn reenter_alias(&mut self, frame: AliasFrame, lazy: TypeId, origin: Option<SourceTag>) -> TypeId {
        if self.productive_depth > frame.productive_depth {
            trace!(alias = frame.name.0, "recursive alias kept lazy");
            return lazy;
        }
        if self.reported_cycles.insert(frame.name) {
            let text = self.interner.resolve_atom(frame.name);
            let diagnostic = Diagnostic::new(DiagnosticKind::CyclicTypeAlias, &[&text]).at(origin);
            self.report(diagnostic);
        }
        TypeId::ANY
    }

    fn report_depth_exceeded(&mut self, type_id: TypeId) {
        if self.depth_reported {
            return;
        }
        self.depth_reported = true;
        let limit = self.guard.max_depth().to_string();
        debug!(limit = %limit, type_id = type_id.0, "evaluation depth exceeded");
        let diagnostic = Diagnostic::new(DiagnosticKind::EvaluationDepthExceeded, &[&limit])
            .at(self.origin(type_id));
        self.report(diagnostic);
    }
}

/// Convenience: evaluate with no aliases in scope, discarding diagnostics.
pub fn evaluate_type(interner: &TypeInterner, type_id: TypeId) -> TypeId {
    let mut evaluator = TypeEvaluator::new(interner);
    evaluator.evaluate(type_id).unwrap_or(type_id)
}

#[cfg(test)]
#[path = "tests/evaluate_tests.rs"]
mod tests;

//! Shared state for one resolution request.
//!
//! Every component takes the same four things: the interner, a resolver for
//! named aliases, the limits in `ResolutionOptions` and a cancellation token.
//! `ResolutionContext` bundles them, owns the diagnostic sink and exposes the
//! engine operations as methods so a host does not need to wire evaluators
//! and checkers together itself.

use crate::evaluate::TypeEvaluator;
use crate::infer::{InferenceConflict, InferenceContext};
use crate::intern::TypeInterner;
use crate::instantiate::TypeSubstitution;
use crate::narrowing::{Branch, NarrowingContext, TypeGuard};
use crate::normalize::Normalizer;
use crate::subtype::{AssignabilityResult, SubtypeChecker};
use crate::types::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tsr_common::diagnostics::Diagnostic;
use tsr_common::interner::Atom;
use tsr_common::limits;
use tsr_common::span::SourceTag;

/// Tunable limits and flags for a resolution request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolutionOptions {
    /// Nesting bound for conditional/mapped/alias evaluation.
    pub max_evaluation_depth: u32,
    /// Nesting bound for assignability checks.
    pub max_subtype_depth: u32,
    /// Total recursive steps allowed in one walk.
    pub max_iterations: u32,
    /// Reject source object fields the target does not declare.
    pub excess_property_check: bool,
    /// Keep literal types when inferring every type parameter, as if each
    /// one were declared `const`.
    pub preserve_literals: bool,
}

impl Default for ResolutionOptions {
    fn default() -> Self {
        ResolutionOptions {
            max_evaluation_depth: limits::DEFAULT_EVALUATION_DEPTH,
            max_subtype_depth: limits::DEFAULT_SUBTYPE_DEPTH,
            max_iterations: limits::DEFAULT_MAX_ITERATIONS,
            excess_property_check: false,
            preserve_literals: false,
        }
    }
}

/// Cooperative cancellation flag shared between a host and its workers.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once the token was tripped.
    #[inline]
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The request was cancelled; partial results were discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("type resolution was cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// A named type alias: `type Name<Params> = body`.
#[derive(Clone, Debug)]
pub struct AliasDef {
    pub name: Atom,
    pub params: Vec<TypeParamInfo>,
    pub body: TypeId,
    pub origin: Option<SourceTag>,
}

/// Resolves alias names encountered in `Reference` nodes.
pub trait TypeResolver {
    fn resolve_alias(&self, name: Atom) -> Option<Arc<AliasDef>>;
}

/// Resolver with no aliases in scope.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopResolver;

impl TypeResolver for NoopResolver {
    fn resolve_alias(&self, _name: Atom) -> Option<Arc<AliasDef>> {
        None
    }
}

/// Alias table for one scope (usually one module plus its imports).
#[derive(Clone, Debug, Default)]
pub struct TypeEnvironment {
    aliases: FxHashMap<Atom, Arc<AliasDef>>,
}

impl TypeEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an alias, replacing any earlier alias of the same name.
    pub fn insert(&mut self, alias: Arc<AliasDef>) {
        self.aliases.insert(alias.name, alias);
    }

    pub fn define(&mut self, name: Atom, params: Vec<TypeParamInfo>, body: TypeId) {
        self.insert(Arc::new(AliasDef {
            name,
            params,
            body,
            origin: None,
        }));
    }

    pub fn get(&self, name: Atom) -> Option<&Arc<AliasDef>> {
        self.aliases.get(&name)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    pub fn aliases(&self) -> impl Iterator<Item = &Arc<AliasDef>> {
        self.aliases.values()
    }
}

impl TypeResolver for TypeEnvironment {
    fn resolve_alias(&self, name: Atom) -> Option<Arc<AliasDef>> {
        self.aliases.get(&name).cloned()
    }
}

/// A normalized result together with the diagnostics produced computing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedType {
    pub type_id: TypeId,
    pub diagnostics: Vec<Diagnostic>,
}

/// Interner, resolver, options, cancellation and diagnostic sink for one
/// request.
pub struct ResolutionContext<'a, R: TypeResolver = NoopResolver> {
    interner: &'a TypeInterner,
    resolver: &'a R,
    options: ResolutionOptions,
    cancel: CancellationToken,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> ResolutionContext<'a, NoopResolver> {
    pub fn new(interner: &'a TypeInterner) -> Self {
        static NOOP: NoopResolver = NoopResolver;
        ResolutionContext::with_resolver(interner, &NOOP)
    }
}

impl<'a, R: TypeResolver> ResolutionContext<'a, R> {
    pub fn with_resolver(interner: &'a TypeInterner, resolver: &'a R) -> Self {
        ResolutionContext {
            interner,
            resolver,
            options: ResolutionOptions::default(),
            cancel: CancellationToken::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: ResolutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[inline]
    pub fn interner(&self) -> &'a TypeInterner {
        self.interner
    }

    #[inline]
    pub fn resolver(&self) -> &'a R {
        self.resolver
    }

    #[inline]
    pub fn options(&self) -> &ResolutionOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn evaluator(&self) -> TypeEvaluator<'a, R> {
        TypeEvaluator::with_resolver(self.interner, self.resolver)
            .with_options(&self.options)
            .with_cancellation(self.cancel.clone())
    }

    fn checker(&self) -> SubtypeChecker<'a, R> {
        SubtypeChecker::with_resolver(self.interner, self.resolver).with_options(&self.options)
    }

    /// Canonicalize a type without evaluating meta nodes.
    pub fn normalize(&mut self, type_id: TypeId) -> TypeId {
        let mut normalizer = Normalizer::new(self.interner);
        let result = normalizer.normalize(type_id);
        self.diagnostics.extend(normalizer.take_diagnostics());
        result
    }

    /// Fully evaluate a type: expand aliases, resolve conditional/mapped
    /// nodes, then normalize.
    pub fn evaluate(&mut self, type_id: TypeId) -> Result<TypeId, Cancelled> {
        let mut evaluator = self.evaluator();
        let result = evaluator.evaluate_normalized(type_id);
        self.diagnostics.extend(evaluator.take_diagnostics());
        result
    }

    pub fn evaluate_conditional(
        &mut self,
        conditional: &ConditionalType,
        subst: &TypeSubstitution,
    ) -> Result<TypeId, Cancelled> {
        let mut evaluator = self.evaluator();
        let result = evaluator.evaluate_conditional(conditional, subst);
        self.diagnostics.extend(evaluator.take_diagnostics());
        result
    }

    pub fn evaluate_mapped(
        &mut self,
        mapped: &MappedType,
        subst: &TypeSubstitution,
    ) -> Result<TypeId, Cancelled> {
        let mut evaluator = self.evaluator();
        let result = evaluator.evaluate_mapped(mapped, subst);
        self.diagnostics.extend(evaluator.take_diagnostics());
        result
    }

    /// Strict unification: any conflicting binding is an error.
    pub fn unify(
        &mut self,
        type_params: &[TypeParamInfo],
        params: &[TypeId],
        args: &[TypeId],
    ) -> Result<TypeSubstitution, InferenceConflict> {
        let mut infer = InferenceContext::with_resolver(self.interner, self.resolver)
            .with_options(&self.options);
        infer.unify(type_params, params, args)
    }

    /// Best-effort inference: conflicts become `unknown` plus a diagnostic,
    /// missing bindings fall back to default, then constraint, then `unknown`.
    pub fn infer_type_arguments(
        &mut self,
        type_params: &[TypeParamInfo],
        params: &[TypeId],
        args: &[TypeId],
    ) -> Vec<TypeId> {
        let mut infer = InferenceContext::with_resolver(self.interner, self.resolver)
            .with_options(&self.options);
        let result = infer.infer_type_arguments(type_params, params, args);
        self.diagnostics.extend(infer.take_diagnostics());
        result
    }

    pub fn is_assignable(&mut self, source: TypeId, target: TypeId) -> bool {
        let mut checker = self.checker();
        let result = checker.is_assignable(source, target);
        self.diagnostics.extend(checker.take_diagnostics());
        result
    }

    pub fn check_assignable(&mut self, source: TypeId, target: TypeId) -> AssignabilityResult {
        let mut checker = self.checker();
        let result = checker.check_assignable(source, target);
        self.diagnostics.extend(checker.take_diagnostics());
        result
    }

    pub fn narrow(&mut self, type_id: TypeId, guard: &TypeGuard, branch: Branch) -> TypeId {
        let mut narrowing =
            NarrowingContext::with_resolver(self.interner, self.resolver).with_options(&self.options);
        let result = narrowing.narrow(type_id, guard, branch);
        self.diagnostics.extend(narrowing.take_diagnostics());
        result
    }

    /// Merge the types flowing out of two branches.
    pub fn join(&mut self, left: TypeId, right: TypeId) -> TypeId {
        let mut normalizer = Normalizer::new(self.interner);
        normalizer.union(vec![left, right])
    }

    /// Evaluate and package the result with the diagnostics it produced.
    pub fn resolve(&mut self, type_id: TypeId) -> Result<ResolvedType, Cancelled> {
        let before = self.diagnostics.len();
        let resolved = self.evaluate(type_id)?;
        Ok(ResolvedType {
            type_id: resolved,
            diagnostics: self.diagnostics[before..].to_vec(),
        })
    }
}

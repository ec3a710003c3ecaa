//! Multi-module checking sessions.
//!
//! Every module of a session is checked by its own scoped worker thread. All
//! workers share one `Arc<TypeInterner>`, so a type built in one module has
//! the same `TypeId` everywhere. A module's aliases are lowered and published
//! through a one-shot `OnceCell` before the worker blocks on its imports,
//! which is the only place a worker waits. Import cycles are found up front
//! with Tarjan's SCC; members of a cycle never wait on each other and see
//! references into the cycle as unresolved.

use crate::config::SessionConfig;
use crate::module_graph::{ModuleGraph, ModuleId};
use anyhow::Context;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{Level, debug, span, trace};
use tsr_common::{Diagnostic, DiagnosticKind};
use tsr_solver::{
    AliasDecl, AliasDef, Branch, CancellationToken, Cancelled, ResolutionContext,
    ResolutionOptions, TypeEnvironment, TypeExpr, TypeFormatter, TypeGuard, TypeId, TypeInterner,
    TypeLowering, TypeParamExpr, TypeofKind,
};

/// Aliases a module makes visible to its importers.
type Exports = Arc<[Arc<AliasDef>]>;

/// One module: its imports, alias declarations and the queries to answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSource {
    pub name: String,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<AliasDecl>,
    #[serde(default)]
    pub queries: Vec<Query>,
}

impl ModuleSource {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleSource {
            name: name.into(),
            imports: Vec::new(),
            aliases: Vec::new(),
            queries: Vec::new(),
        }
    }

    #[must_use]
    pub fn import(mut self, module: impl Into<String>) -> Self {
        self.imports.push(module.into());
        self
    }

    #[must_use]
    pub fn alias(mut self, decl: AliasDecl) -> Self {
        self.aliases.push(decl);
        self
    }

    #[must_use]
    pub fn query(mut self, query: Query) -> Self {
        self.queries.push(query);
        self
    }
}

/// A question asked about types in a module's scope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Query {
    /// Fully evaluate and normalize a type.
    Evaluate {
        #[serde(rename = "type")]
        ty: TypeExpr,
    },
    /// Is `source` assignable to `target`? `excess_property_check`
    /// overrides the session setting for this query.
    Assignable {
        source: TypeExpr,
        target: TypeExpr,
        #[serde(default)]
        excess_property_check: Option<bool>,
    },
    /// Narrow a type under a guard.
    Narrow {
        #[serde(rename = "type")]
        ty: TypeExpr,
        guard: GuardExpr,
        branch: Branch,
    },
    /// Infer the type arguments of a generic call.
    InferCall {
        #[serde(default)]
        type_params: Vec<TypeParamExpr>,
        params: Vec<TypeExpr>,
        args: Vec<TypeExpr>,
    },
}

/// A `TypeGuard` written with type expressions and plain names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GuardExpr {
    Typeof { name: TypeofKind },
    LiteralEquality { value: TypeExpr },
    NullishEquality,
    Truthy,
    Discriminant { property: String, value: TypeExpr },
    InProperty { property: String },
    Predicate { asserts: TypeExpr },
}

/// Answer to one `Query`, in query order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum QueryResult {
    Evaluated { type_id: TypeId, display: String },
    Assignable { assignable: bool },
    Narrowed { type_id: TypeId, display: String },
    Inferred { type_ids: Vec<TypeId>, display: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReport {
    pub name: String,
    pub results: Vec<QueryResult>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-module reports in the order the modules were given.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionReport {
    pub modules: Vec<ModuleReport>,
}

impl SessionReport {
    pub fn module(&self, name: &str) -> Option<&ModuleReport> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.modules.iter().flat_map(|m| m.diagnostics.iter())
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics().filter(|d| d.is_error()).count()
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize session report")
    }
}

/// Publishes an empty export list if a worker exits before publishing, so
/// importers never wait forever.
struct PublishGuard<'a>(&'a OnceCell<Exports>);

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        let _ = self.0.set(Arc::from(Vec::new()));
    }
}

/// Checks a set of modules against one shared interner.
pub struct CheckSession {
    interner: Arc<TypeInterner>,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl CheckSession {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_interner(Arc::new(TypeInterner::new()), config)
    }

    pub fn with_interner(interner: Arc<TypeInterner>, config: SessionConfig) -> Self {
        CheckSession {
            interner,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn interner(&self) -> &Arc<TypeInterner> {
        &self.interner
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Token that cancels every in-flight and future check of this session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Check every module and collect one report per module.
    pub fn check(&self, modules: &[ModuleSource]) -> Result<SessionReport, Cancelled> {
        let _span = span!(Level::DEBUG, "check_session", modules = modules.len()).entered();
        let pairs: Vec<(&str, &[String])> = modules
            .iter()
            .map(|m| (m.name.as_str(), m.imports.as_slice()))
            .collect();
        let mut graph = ModuleGraph::from_imports(&pairs);
        let cycles = graph.detect_circular_dependencies().len();
        debug!(modules = graph.len(), cycles, "module graph built");

        let exports: Vec<OnceCell<Exports>> = (0..graph.len()).map(|_| OnceCell::new()).collect();
        let reports = if self.config.parallel {
            self.check_parallel(&graph, modules, &exports)
        } else {
            self.check_sequential(&graph, modules, &exports)
        };
        Ok(SessionReport {
            modules: reports.into_iter().collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn check_parallel(
        &self,
        graph: &ModuleGraph,
        modules: &[ModuleSource],
        exports: &[OnceCell<Exports>],
    ) -> Vec<Result<ModuleReport, Cancelled>> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = modules
                .iter()
                .map(|module| scope.spawn(move || self.check_module(graph, module, exports, true)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        })
    }

    /// Dependency-first on the calling thread; every import outside the
    /// module's own cycle is published before the module runs.
    fn check_sequential(
        &self,
        graph: &ModuleGraph,
        modules: &[ModuleSource],
        exports: &[OnceCell<Exports>],
    ) -> Vec<Result<ModuleReport, Cancelled>> {
        let mut slots: Vec<Option<Result<ModuleReport, Cancelled>>> =
            (0..modules.len()).map(|_| None).collect();
        for id in graph.topological_order() {
            for (index, module) in modules.iter().enumerate() {
                if graph.module_id(&module.name) == Some(id) {
                    slots[index] = Some(self.check_module(graph, module, exports, false));
                }
            }
        }
        slots.into_iter().flatten().collect()
    }

    fn check_module(
        &self,
        graph: &ModuleGraph,
        module: &ModuleSource,
        exports: &[OnceCell<Exports>],
        wait_for_imports: bool,
    ) -> Result<ModuleReport, Cancelled> {
        let _span = span!(Level::DEBUG, "check_module", name = %module.name).entered();
        let Some(id) = graph.module_id(&module.name) else {
            return Ok(ModuleReport {
                name: module.name.clone(),
                results: Vec::new(),
                diagnostics: Vec::new(),
            });
        };
        let interner: &TypeInterner = &self.interner;
        let lowering = TypeLowering::new(interner);

        let own: Vec<Arc<AliasDef>> = {
            let _publish = PublishGuard(&exports[id.index()]);
            let own: Vec<Arc<AliasDef>> =
                module.aliases.iter().map(|decl| lowering.lower_alias(decl)).collect();
            if exports[id.index()].set(Arc::from(own.clone())).is_err() {
                trace!("exports already published by a module of the same name");
            }
            own
        };

        let mut diagnostics = Vec::new();
        if let Some(cycle) = graph.cycle_of(id) {
            let path = cycle.describe();
            debug!(cycle = %path, "module is part of an import cycle");
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::CyclicModuleDependency,
                &[&module.name, &path],
            ));
        }
        if let Some(info) = graph.module(id) {
            for missing in &info.unresolved_imports {
                debug!(import = %missing, "import names no module in this session");
            }
        }

        let env = self.import_environment(graph, id, &own, exports, wait_for_imports);
        let mut ctx = ResolutionContext::with_resolver(interner, &env)
            .with_options(self.config.resolution.clone())
            .with_cancellation(self.cancel.clone());

        // Surface problems in non-generic alias bodies even without queries.
        for alias in own.iter().filter(|alias| alias.params.is_empty()) {
            ctx.evaluate(interner.reference(alias.name, Vec::new()))?;
        }

        let mut results = Vec::with_capacity(module.queries.len());
        for query in &module.queries {
            self.cancel.check()?;
            results.push(run_query(&lowering, &mut ctx, query)?);
        }

        diagnostics.extend(ctx.take_diagnostics());
        dedup_diagnostics(&mut diagnostics);
        debug!(
            results = results.len(),
            diagnostics = diagnostics.len(),
            "module checked"
        );
        Ok(ModuleReport {
            name: module.name.clone(),
            results,
            diagnostics,
        })
    }

    /// Imported aliases first, then the module's own, which shadow them.
    fn import_environment(
        &self,
        graph: &ModuleGraph,
        id: ModuleId,
        own: &[Arc<AliasDef>],
        exports: &[OnceCell<Exports>],
        wait_for_imports: bool,
    ) -> TypeEnvironment {
        let mut env = TypeEnvironment::new();
        for &dep in graph.dependencies(id) {
            if graph.in_same_cycle(id, dep) {
                trace!(dep = dep.0, "import inside the module's own cycle skipped");
                continue;
            }
            let cell = &exports[dep.index()];
            let imported = if wait_for_imports {
                trace!(dep = dep.0, "waiting for imported exports");
                Some(cell.wait())
            } else {
                cell.get()
            };
            for alias in imported.into_iter().flat_map(|aliases| aliases.iter()) {
                env.insert(Arc::clone(alias));
            }
        }
        for alias in own {
            env.insert(Arc::clone(alias));
        }
        env
    }
}

fn run_query(
    lowering: &TypeLowering<'_>,
    ctx: &mut ResolutionContext<'_, TypeEnvironment>,
    query: &Query,
) -> Result<QueryResult, Cancelled> {
    let interner = ctx.interner();
    match query {
        Query::Evaluate { ty } => {
            let type_id = ctx.evaluate(lowering.lower(ty))?;
            Ok(QueryResult::Evaluated {
                type_id,
                display: TypeFormatter::new(interner).format(type_id),
            })
        }
        Query::Assignable {
            source,
            target,
            excess_property_check,
        } => {
            let source = lowering.lower(source);
            let target = lowering.lower(target);
            let result = match excess_property_check {
                Some(flag) => {
                    let options = ResolutionOptions {
                        excess_property_check: *flag,
                        ..ctx.options().clone()
                    };
                    let mut scoped =
                        ResolutionContext::with_resolver(interner, ctx.resolver()).with_options(options);
                    let result = scoped.check_assignable(source, target);
                    for diagnostic in scoped.take_diagnostics() {
                        ctx.report(diagnostic);
                    }
                    result
                }
                None => ctx.check_assignable(source, target),
            };
            if let Some(reason) = result.reason {
                ctx.report(reason);
            }
            Ok(QueryResult::Assignable {
                assignable: result.assignable,
            })
        }
        Query::Narrow { ty, guard, branch } => {
            let guard = lower_guard(interner, lowering, guard);
            let type_id = ctx.narrow(lowering.lower(ty), &guard, *branch);
            Ok(QueryResult::Narrowed {
                type_id,
                display: TypeFormatter::new(interner).format(type_id),
            })
        }
        Query::InferCall {
            type_params,
            params,
            args,
        } => {
            let (infos, params) = lowering.with_type_params(type_params, |lowering, _| {
                params.iter().map(|param| lowering.lower(param)).collect::<Vec<_>>()
            });
            let args: Vec<TypeId> = args.iter().map(|arg| lowering.lower(arg)).collect();
            let type_ids = ctx.infer_type_arguments(&infos, &params, &args);
            let mut formatter = TypeFormatter::new(interner);
            let display = type_ids.iter().map(|&id| formatter.format(id)).collect();
            Ok(QueryResult::Inferred { type_ids, display })
        }
    }
}

fn lower_guard(interner: &TypeInterner, lowering: &TypeLowering<'_>, guard: &GuardExpr) -> TypeGuard {
    match guard {
        GuardExpr::Typeof { name } => TypeGuard::Typeof(*name),
        GuardExpr::LiteralEquality { value } => TypeGuard::LiteralEquality(lowering.lower(value)),
        GuardExpr::NullishEquality => TypeGuard::NullishEquality,
        GuardExpr::Truthy => TypeGuard::Truthy,
        GuardExpr::Discriminant { property, value } => TypeGuard::Discriminant {
            property_name: interner.intern_string(property),
            value_type: lowering.lower(value),
        },
        GuardExpr::InProperty { property } => TypeGuard::InProperty(interner.intern_string(property)),
        GuardExpr::Predicate { asserts } => TypeGuard::Predicate {
            asserts_to: lowering.lower(asserts),
        },
    }
}

/// The same alias problem can surface from several queries.
fn dedup_diagnostics(diagnostics: &mut Vec<Diagnostic>) {
    let mut unique: Vec<Diagnostic> = Vec::with_capacity(diagnostics.len());
    for diagnostic in diagnostics.drain(..) {
        if !unique.contains(&diagnostic) {
            unique.push(diagnostic);
        }
    }
    *diagnostics = unique;
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;

//! Conditional type evaluation.
//!
//! `T extends U ? X : Y`, with `infer` bindings in `U` and distribution over
//! a union check type.

use crate::context::{Cancelled, TypeResolver};
use crate::infer::InferenceContext;
use crate::instantiate::{TypeSubstitution, instantiate_type};
use crate::type_queries::{contains_type_parameters, contains_type_parameters_except, references_type_param};
use crate::types::*;
use tracing::{Level, span, trace};
use tsr_common::diagnostics::{Diagnostic, DiagnosticKind};

use super::super::evaluate::TypeEvaluator;

impl<'a, R: TypeResolver> TypeEvaluator<'a, R> {
    /// Resolve an already-instantiated conditional node.
    pub(crate) fn resolve_conditional(
        &mut self,
        type_id: TypeId,
        cond: &ConditionalType,
    ) -> Result<TypeId, Cancelled> {
        let _span = span!(Level::TRACE, "conditional", type_id = type_id.0).entered();
        let interner = self.interner();
        let check = self.evaluate(cond.check_type)?;

        if check == TypeId::ANY {
            let mut bindings = TypeSubstitution::new();
            for &name in &cond.infer_params {
                bindings.insert(name, TypeId::UNKNOWN);
            }
            let true_branch = instantiate_type(interner, cond.true_type, &bindings);
            let true_branch = self.evaluate(true_branch)?;
            let false_branch = self.evaluate(cond.false_type)?;
            return Ok(self.normalize_union(vec![true_branch, false_branch]));
        }

        if cond.is_distributive {
            if check == TypeId::NEVER {
                return Ok(TypeId::NEVER);
            }
            if let Some(TypeData::Union(list_id)) = interner.lookup(check) {
                let members = interner.type_list(list_id);
                trace!(members = members.len(), "distributing conditional");
                let mut results = Vec::with_capacity(members.len());
                for &member in members.iter() {
                    let split = interner.conditional(ConditionalType {
                        check_type: member,
                        ..cond.clone()
                    });
                    results.push(self.evaluate(split)?);
                }
                return Ok(self.normalize_union(results));
            }
        }

        let extends = self.evaluate(cond.extends_type)?;

        if contains_type_parameters(interner, check)
            || contains_type_parameters_except(interner, extends, &cond.infer_params)
        {
            trace!("conditional deferred on generic input");
            if check == cond.check_type && extends == cond.extends_type {
                return Ok(type_id);
            }
            return Ok(interner.conditional(ConditionalType {
                check_type: check,
                extends_type: extends,
                ..cond.clone()
            }));
        }

        let bindings = if cond.infer_params.is_empty() {
            Some(TypeSubstitution::new())
        } else {
            let mut infer = InferenceContext::with_resolver(interner, self.resolver())
                .with_options(self.options());
            infer.match_infer_pattern(check, extends, &cond.infer_params)
        };

        let matched = match &bindings {
            Some(bindings) if bindings.is_empty() => self.is_assignable(check, extends),
            Some(bindings) => {
                let pattern = instantiate_type(interner, extends, bindings);
                let pattern = self.evaluate(pattern)?;
                self.is_assignable(check, pattern)
            }
            None => false,
        };
        trace!(matched, "conditional check");

        if matched {
            let bindings = bindings.unwrap_or_default();
            let true_branch = instantiate_type(interner, cond.true_type, &bindings);
            return self.evaluate(true_branch);
        }

        // `infer` names are only in scope in the true branch.
        let mut unbound = TypeSubstitution::new();
        for &name in &cond.infer_params {
            if references_type_param(interner, cond.false_type, name) {
                let text = interner.resolve_atom(name);
                let diagnostic = Diagnostic::new(DiagnosticKind::UnresolvedReference, &[&text])
                    .at(self.origin(type_id));
                self.report(diagnostic);
                unbound.insert(name, TypeId::UNKNOWN);
            }
        }
        let false_branch = if unbound.is_empty() {
            cond.false_type
        } else {
            instantiate_type(interner, cond.false_type, &unbound)
        };
        self.evaluate(false_branch)
    }
}

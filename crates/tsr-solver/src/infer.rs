//! Type inference engine using Union-Find.
//!
//! Generic parameters of a call and `infer X` captures of a conditional
//! pattern are both solved here. Each name becomes an inference variable in
//! an `ena` unification table; walking a parameter/argument pair (or a
//! pattern/source pair) structurally records candidate types for the
//! variables it reaches. Two variables that meet are unified, pooling their
//! candidates.
//!
//! Candidates for one variable are folded left to right: a later candidate
//! is unioned with the earlier ones unless both are primitives of different
//! classes (`string` vs `number`), which is an `InferenceConflict`.

use crate::context::{NoopResolver, ResolutionOptions, TypeResolver};
use crate::format::TypeFormatter;
use crate::instantiate::{TypeSubstitution, instantiate_type};
use crate::intern::TypeInterner;
use crate::types::*;
use ena::unify::{InPlaceUnificationTable, NoError, UnifyKey, UnifyValue};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::fmt;
use tracing::{debug, trace};
use tsr_common::diagnostics::{Diagnostic, DiagnosticKind};
use tsr_common::interner::Atom;
use tsr_common::limits::MAX_TEMPLATE_LITERAL_LENGTH;

const MAX_INFER_DEPTH: u32 = 64;
const MAX_ALIAS_EXPANSION: u32 = 8;

/// An inference variable standing for one generic or `infer` name.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct InferenceVar(pub u32);

/// Candidates collected for a variable (wrapper to satisfy the orphan rule).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InferenceValue(pub SmallVec<[TypeId; 2]>);

impl UnifyKey for InferenceVar {
    type Value = InferenceValue;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        InferenceVar(u)
    }

    fn tag() -> &'static str {
        "InferenceVar"
    }
}

impl UnifyValue for InferenceValue {
    type Error = NoError;

    fn unify_values(a: &Self, b: &Self) -> Result<Self, Self::Error> {
        let mut merged = a.0.clone();
        for &candidate in &b.0 {
            if !merged.contains(&candidate) {
                merged.push(candidate);
            }
        }
        Ok(InferenceValue(merged))
    }
}

/// Two candidates for one variable that cannot both hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InferenceConflict {
    pub name: Atom,
    pub first: TypeId,
    pub second: TypeId,
}

impl InferenceConflict {
    pub fn to_diagnostic(&self, interner: &TypeInterner) -> Diagnostic {
        let name = interner.resolve_atom(self.name);
        let mut formatter = TypeFormatter::new(interner);
        let first = formatter.format(self.first);
        let second = formatter.format(self.second);
        Diagnostic::new(DiagnosticKind::InferenceConflict, &[&name, &first, &second])
    }
}

impl fmt::Display for InferenceConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conflicting inference candidates {:?} and {:?} for type parameter {:?}",
            self.first, self.second, self.name
        )
    }
}

impl std::error::Error for InferenceConflict {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PrimitiveClass {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Void,
}

/// Inference state for a single call or conditional pattern.
pub struct InferenceContext<'a, R: TypeResolver = NoopResolver> {
    interner: &'a TypeInterner,
    resolver: &'a R,
    table: InPlaceUnificationTable<InferenceVar>,
    type_params: Vec<(TypeParamInfo, InferenceVar)>,
    preserve_literals: bool,
    /// Pattern mode: a structural mismatch fails the match.
    strict: bool,
    visiting: FxHashSet<(TypeId, TypeId)>,
    depth: u32,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> InferenceContext<'a, NoopResolver> {
    pub fn new(interner: &'a TypeInterner) -> Self {
        static NOOP: NoopResolver = NoopResolver;
        InferenceContext::with_resolver(interner, &NOOP)
    }
}

impl<'a, R: TypeResolver> InferenceContext<'a, R> {
    pub fn with_resolver(interner: &'a TypeInterner, resolver: &'a R) -> Self {
        InferenceContext {
            interner,
            resolver,
            table: InPlaceUnificationTable::new(),
            type_params: Vec::new(),
            preserve_literals: false,
            strict: false,
            visiting: FxHashSet::default(),
            depth: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: &ResolutionOptions) -> Self {
        self.preserve_literals = options.preserve_literals;
        self
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Create an inference variable for a type parameter.
    pub fn fresh_type_param(&mut self, info: TypeParamInfo) -> InferenceVar {
        if let Some(existing) = self.find_type_param(info.name) {
            return existing;
        }
        let var = self.table.new_key(InferenceValue::default());
        self.type_params.push((info, var));
        var
    }

    pub fn find_type_param(&self, name: Atom) -> Option<InferenceVar> {
        self.type_params
            .iter()
            .find(|(info, _)| info.name == name)
            .map(|(_, var)| *var)
    }

    fn param_info(&self, var: InferenceVar) -> Option<TypeParamInfo> {
        self.type_params
            .iter()
            .find(|(_, v)| *v == var)
            .map(|(info, _)| *info)
    }

    /// Candidates currently recorded for `var` (after unification).
    pub fn candidates(&mut self, var: InferenceVar) -> SmallVec<[TypeId; 2]> {
        self.table.probe_value(var).0
    }

    fn add_candidate(&mut self, var: InferenceVar, ty: TypeId) {
        let keep_literal = self.strict
            || self.preserve_literals
            || self.param_info(var).is_some_and(|info| info.is_const);
        let candidate = if keep_literal { ty } else { self.widen(ty) };
        trace!(var = var.0, candidate = candidate.0, "inference candidate");
        self.table
            .union_value(var, InferenceValue(SmallVec::from_slice(&[candidate])));
    }

    /// Literal types widen to their primitive, including literals nested in
    /// mutable object fields, array elements and function returns.
    fn widen(&self, ty: TypeId) -> TypeId {
        match self.interner.lookup(ty) {
            Some(TypeData::Literal(value)) => value.primitive(),
            Some(TypeData::Union(list_id)) => {
                let members = self.interner.type_list(list_id);
                let widened: Vec<TypeId> = members.iter().map(|&m| self.widen(m)).collect();
                self.interner.union(widened)
            }
            Some(TypeData::Object(shape_id)) => {
                let shape = self.interner.object_shape(shape_id);
                let properties: Vec<PropertyInfo> = shape
                    .properties
                    .iter()
                    .map(|prop| PropertyInfo {
                        type_id: if prop.readonly {
                            prop.type_id
                        } else {
                            self.widen(prop.type_id)
                        },
                        ..prop.clone()
                    })
                    .collect();
                if properties == shape.properties {
                    return ty;
                }
                self.interner.object_with_index(ObjectShape {
                    properties,
                    string_index: shape.string_index,
                })
            }
            Some(TypeData::Array(element)) => {
                let widened = self.widen(element);
                if widened == element {
                    ty
                } else {
                    self.interner.array(widened)
                }
            }
            Some(TypeData::Function(shape_id)) => {
                let shape = self.interner.function_shape(shape_id);
                let return_type = self.widen(shape.return_type);
                if return_type == shape.return_type {
                    ty
                } else {
                    self.interner.function(shape.params.clone(), return_type)
                }
            }
            _ => ty,
        }
    }

    // =========================================================================
    // Structural walk
    // =========================================================================

    /// Expand alias references so both sides can be compared structurally.
    fn expand(&self, ty: TypeId) -> TypeId {
        let mut current = ty;
        for _ in 0..MAX_ALIAS_EXPANSION {
            let Some(TypeData::Reference(name, args)) = self.interner.lookup(current) else {
                break;
            };
            let Some(alias) = self.resolver.resolve_alias(name) else {
                break;
            };
            let args = self.interner.type_list(args);
            let subst = TypeSubstitution::from_args(&alias.params, &args);
            current = instantiate_type(self.interner, alias.body, &subst);
        }
        current
    }

    /// Does `ty` mention any registered variable?
    fn contains_inference_vars(&self, ty: TypeId) -> bool {
        self.contains_vars_inner(ty, 0)
    }

    fn contains_vars_inner(&self, ty: TypeId, depth: u32) -> bool {
        if ty.is_intrinsic() || depth > MAX_INFER_DEPTH {
            return false;
        }
        let Some(key) = self.interner.lookup(ty) else {
            return false;
        };
        let walk = |t: TypeId| self.contains_vars_inner(t, depth + 1);
        match key {
            TypeData::TypeParameter(info) => self.find_type_param(info.name).is_some(),
            TypeData::Union(list) | TypeData::Intersection(list) | TypeData::Reference(_, list) => {
                self.interner.type_list(list).iter().any(|&m| walk(m))
            }
            TypeData::Object(shape_id) => {
                let shape = self.interner.object_shape(shape_id);
                shape.properties.iter().any(|p| walk(p.type_id))
                    || shape.string_index.is_some_and(walk)
            }
            TypeData::Function(shape_id) => {
                let shape = self.interner.function_shape(shape_id);
                shape.params.iter().any(|&p| walk(p)) || walk(shape.return_type)
            }
            TypeData::Array(element) => walk(element),
            TypeData::IndexAccess(object, key) => walk(object) || walk(key),
            TypeData::TemplateLiteral(list) => {
                self.interner.template_list(list).iter().any(|span| match *span {
                    TemplateSpan::Type(inner) => walk(inner),
                    TemplateSpan::Text(_) => false,
                })
            }
            TypeData::StringIntrinsic { type_arg, .. } => walk(type_arg),
            TypeData::Conditional(cond_id) => {
                let cond = self.interner.conditional_type(cond_id);
                walk(cond.check_type)
                    || walk(cond.extends_type)
                    || walk(cond.true_type)
                    || walk(cond.false_type)
            }
            TypeData::Mapped(mapped_id) => {
                let mapped = self.interner.mapped_type(mapped_id);
                walk(mapped.source) || walk(mapped.template)
            }
            TypeData::Intrinsic(_) | TypeData::Literal(_) | TypeData::Error => false,
        }
    }

    /// Record candidates found by matching `source` against `target`.
    ///
    /// Returns `false` only on a structural mismatch at a position that
    /// mentions an inference variable; callers outside pattern matching
    /// ignore the result.
    pub fn infer_from(&mut self, target: TypeId, source: TypeId) -> bool {
        if target == source || !self.contains_inference_vars(target) {
            return true;
        }
        if self.depth >= MAX_INFER_DEPTH || !self.visiting.insert((target, source)) {
            return true;
        }
        self.depth += 1;
        let matched = self.infer_from_inner(target, source);
        self.depth -= 1;
        self.visiting.remove(&(target, source));
        matched
    }

    fn infer_from_inner(&mut self, target: TypeId, source: TypeId) -> bool {
        let target = self.expand(target);
        let source = self.expand(source);

        let Some(target_key) = self.interner.lookup(target) else {
            return !self.strict;
        };

        if let TypeData::TypeParameter(info) = &target_key
            && let Some(var) = self.find_type_param(info.name)
        {
            if let Some(TypeData::TypeParameter(source_info)) = self.interner.lookup(source)
                && let Some(source_var) = self.find_type_param(source_info.name)
            {
                self.table.union(var, source_var);
            } else {
                self.add_candidate(var, source);
            }
            return true;
        }

        let source_key = self.interner.lookup(source);

        // A union source matches member by member against a non-union target.
        if let Some(TypeData::Union(list_id)) = source_key
            && !matches!(target_key, TypeData::Union(_))
        {
            let members = self.interner.type_list(list_id);
            let mut all = true;
            for &member in members.iter() {
                all &= self.infer_from(target, member);
            }
            return all;
        }

        match (target_key, source_key) {
            (TypeData::Union(list_id), _) => self.infer_to_union(list_id, source),
            (TypeData::Intersection(list_id), _) => {
                let members = self.interner.type_list(list_id);
                let mut all = true;
                for &member in members.iter() {
                    all &= self.infer_from(member, source);
                }
                all
            }
            (TypeData::Object(t_shape), Some(TypeData::Object(s_shape))) => {
                self.infer_objects(t_shape, s_shape)
            }
            (TypeData::Function(t_shape), Some(TypeData::Function(s_shape))) => {
                let t = self.interner.function_shape(t_shape);
                let s = self.interner.function_shape(s_shape);
                let mut all = true;
                for (&t_param, &s_param) in t.params.iter().zip(s.params.iter()) {
                    all &= self.infer_from(t_param, s_param);
                }
                all &= self.infer_from(t.return_type, s.return_type);
                all
            }
            (TypeData::Array(t_elem), Some(TypeData::Array(s_elem))) => {
                self.infer_from(t_elem, s_elem)
            }
            (TypeData::Reference(t_name, t_args), Some(TypeData::Reference(s_name, s_args)))
                if t_name == s_name =>
            {
                let t_args = self.interner.type_list(t_args);
                let s_args = self.interner.type_list(s_args);
                let mut all = true;
                for (&t_arg, &s_arg) in t_args.iter().zip(s_args.iter()) {
                    all &= self.infer_from(t_arg, s_arg);
                }
                all
            }
            (TypeData::TemplateLiteral(list_id), Some(TypeData::Literal(LiteralValue::String(atom)))) => {
                self.infer_from_template(list_id, atom)
            }
            _ => !self.strict,
        }
    }

    /// Matching against `Fixed | G`: the source members not covered by the
    /// fixed members are what `G` stands for.
    fn infer_to_union(&mut self, list_id: TypeListId, source: TypeId) -> bool {
        let members = self.interner.type_list(list_id);
        let (generic, fixed): (Vec<TypeId>, Vec<TypeId>) = members
            .iter()
            .copied()
            .partition(|&m| self.contains_inference_vars(m));

        let source_members: Vec<TypeId> = match self.interner.lookup(source) {
            Some(TypeData::Union(source_list)) => self.interner.type_list(source_list).to_vec(),
            _ => vec![source],
        };
        let leftover: Vec<TypeId> = source_members
            .into_iter()
            .filter(|&m| !fixed.iter().any(|&f| self.covers(f, m)))
            .collect();

        match generic.as_slice() {
            [] => true,
            _ if leftover.is_empty() => true,
            [single] => {
                let rest = self.interner.union(leftover);
                self.infer_from(*single, rest)
            }
            many => {
                let mut any = false;
                for &target in many {
                    for &member in &leftover {
                        let saved_strict = self.strict;
                        self.strict = true;
                        any |= self.infer_from(target, member);
                        self.strict = saved_strict;
                    }
                }
                any || !self.strict
            }
        }
    }

    /// Cheap containment used to split union sources: identity or literal
    /// under its own primitive.
    fn covers(&self, fixed: TypeId, member: TypeId) -> bool {
        if fixed == member {
            return true;
        }
        match self.interner.lookup(member) {
            Some(TypeData::Literal(value)) => value.primitive() == fixed,
            _ => false,
        }
    }

    fn infer_objects(&mut self, t_shape: ObjectShapeId, s_shape: ObjectShapeId) -> bool {
        let target = self.interner.object_shape(t_shape);
        let source = self.interner.object_shape(s_shape);
        let mut all = true;
        for t_prop in &target.properties {
            match source.find(t_prop.name) {
                Some(s_prop) => all &= self.infer_from(t_prop.type_id, s_prop.type_id),
                None => {
                    if !t_prop.optional && self.contains_inference_vars(t_prop.type_id) {
                        all &= !self.strict;
                    }
                }
            }
        }
        if let Some(t_index) = target.string_index {
            if let Some(s_index) = source.string_index {
                all &= self.infer_from(t_index, s_index);
            }
            for s_prop in &source.properties {
                all &= self.infer_from(t_index, s_prop.type_id);
            }
        }
        all
    }

    /// `prefix${infer A}mid${infer B}` against a string literal. Each type
    /// hole takes the shortest text up to the next literal span; the last
    /// hole takes the rest.
    fn infer_from_template(&mut self, list_id: TemplateListId, atom: Atom) -> bool {
        let spans = self.interner.template_list(list_id);
        let text = self.interner.resolve_atom(atom);
        if text.len() > MAX_TEMPLATE_LITERAL_LENGTH {
            return !self.strict;
        }
        let mut rest: &str = &text;
        let mut captures: Vec<(TypeId, String)> = Vec::new();
        let mut i = 0;
        while i < spans.len() {
            match spans[i] {
                TemplateSpan::Text(literal) => {
                    let literal = self.interner.resolve_atom(literal);
                    let Some(stripped) = rest.strip_prefix(literal.as_str()) else {
                        return false;
                    };
                    rest = stripped;
                }
                TemplateSpan::Type(hole) => {
                    let captured = match spans.get(i + 1) {
                        Some(TemplateSpan::Text(next)) => {
                            let next = self.interner.resolve_atom(*next);
                            let Some(pos) = rest.find(next.as_str()) else {
                                return false;
                            };
                            let (head, tail) = rest.split_at(pos);
                            rest = tail;
                            head.to_string()
                        }
                        Some(TemplateSpan::Type(_)) => {
                            // Adjacent holes: the first takes one character.
                            let mut chars = rest.chars();
                            let Some(first) = chars.next() else {
                                return false;
                            };
                            rest = chars.as_str();
                            first.to_string()
                        }
                        None => {
                            let all = rest.to_string();
                            rest = "";
                            all
                        }
                    };
                    captures.push((hole, captured));
                }
            }
            i += 1;
        }
        if !rest.is_empty() {
            return false;
        }
        let mut all = true;
        for (hole, captured) in captures {
            let literal = self.interner.literal_string(&captured);
            all &= self.infer_from(hole, literal);
        }
        all
    }

    // =========================================================================
    // Solving
    // =========================================================================

    fn primitive_classes(&self, ty: TypeId) -> Option<SmallVec<[PrimitiveClass; 2]>> {
        let single = |t: TypeId| -> Option<PrimitiveClass> {
            match t {
                TypeId::STRING => Some(PrimitiveClass::String),
                TypeId::NUMBER => Some(PrimitiveClass::Number),
                TypeId::BOOLEAN | TypeId::BOOLEAN_TRUE | TypeId::BOOLEAN_FALSE => {
                    Some(PrimitiveClass::Boolean)
                }
                TypeId::NULL => Some(PrimitiveClass::Null),
                TypeId::UNDEFINED => Some(PrimitiveClass::Undefined),
                TypeId::VOID => Some(PrimitiveClass::Void),
                _ => match self.interner.lookup(t) {
                    Some(TypeData::Literal(LiteralValue::String(_))) => Some(PrimitiveClass::String),
                    Some(TypeData::Literal(LiteralValue::Number(_))) => Some(PrimitiveClass::Number),
                    _ => None,
                },
            }
        };
        match self.interner.lookup(ty) {
            Some(TypeData::Union(list_id)) => {
                let mut classes = SmallVec::new();
                for &member in self.interner.type_list(list_id).iter() {
                    let class = single(member)?;
                    if !classes.contains(&class) {
                        classes.push(class);
                    }
                }
                Some(classes)
            }
            _ => single(ty).map(|class| SmallVec::from_slice(&[class])),
        }
    }

    /// Both sides are primitives and share no primitive class.
    fn mutually_exclusive(&self, a: TypeId, b: TypeId) -> bool {
        match (self.primitive_classes(a), self.primitive_classes(b)) {
            (Some(left), Some(right)) => !left.iter().any(|class| right.contains(class)),
            _ => false,
        }
    }

    /// Fold the candidates of `var` into one binding.
    pub fn resolve_var(&mut self, var: InferenceVar, name: Atom) -> Result<Option<TypeId>, InferenceConflict> {
        let candidates = self.candidates(var);
        let Some((&first, rest)) = candidates.split_first() else {
            return Ok(None);
        };
        let mut current = first;
        for &next in rest {
            if !self.strict && self.mutually_exclusive(current, next) {
                debug!(name = name.0, first = current.0, second = next.0, "inference conflict");
                return Err(InferenceConflict {
                    name,
                    first: current,
                    second: next,
                });
            }
            current = self.interner.union(vec![current, next]);
        }
        Ok(Some(current))
    }

    fn collect_candidates(&mut self, params: &[TypeId], args: &[TypeId]) {
        for (&param, &arg) in params.iter().zip(args.iter()) {
            self.infer_from(param, arg);
        }
    }

    /// Bind every generic in `type_params` from parameter/argument pairs.
    ///
    /// Generics that received no candidate are absent from the result.
    pub fn unify(
        &mut self,
        type_params: &[TypeParamInfo],
        params: &[TypeId],
        args: &[TypeId],
    ) -> Result<TypeSubstitution, InferenceConflict> {
        for &info in type_params {
            self.fresh_type_param(info);
        }
        self.collect_candidates(params, args);

        let mut subst = TypeSubstitution::new();
        for &info in type_params {
            let Some(var) = self.find_type_param(info.name) else {
                continue;
            };
            if let Some(bound) = self.resolve_var(var, info.name)? {
                subst.insert(info.name, bound);
            }
        }
        Ok(subst)
    }

    /// Best-effort inference of one type argument per generic.
    pub fn infer_type_arguments(
        &mut self,
        type_params: &[TypeParamInfo],
        params: &[TypeId],
        args: &[TypeId],
    ) -> Vec<TypeId> {
        for &info in type_params {
            self.fresh_type_param(info);
        }
        self.collect_candidates(params, args);

        let mut result = Vec::with_capacity(type_params.len());
        for &info in type_params {
            let Some(var) = self.find_type_param(info.name) else {
                result.push(TypeId::UNKNOWN);
                continue;
            };
            let inferred = match self.resolve_var(var, info.name) {
                Ok(Some(bound)) => bound,
                Ok(None) => info.default.or(info.constraint).unwrap_or(TypeId::UNKNOWN),
                Err(conflict) => {
                    self.diagnostics.push(conflict.to_diagnostic(self.interner));
                    TypeId::UNKNOWN
                }
            };
            result.push(inferred);
        }
        result
    }

    /// Bind the `infer` names of a conditional pattern from `source`.
    ///
    /// Returns `None` when the source does not have the pattern's shape.
    /// Names the pattern mentions but the source never reached are bound to
    /// `unknown`.
    pub fn match_infer_pattern(
        &mut self,
        source: TypeId,
        pattern: TypeId,
        infer_names: &[Atom],
    ) -> Option<TypeSubstitution> {
        let saved_strict = self.strict;
        self.strict = true;
        for &name in infer_names {
            self.fresh_type_param(TypeParamInfo::new(name));
        }
        let matched = self.infer_from(pattern, source);

        let mut subst = TypeSubstitution::new();
        if matched {
            for &name in infer_names {
                let bound = match self.find_type_param(name) {
                    Some(var) => self.resolve_var(var, name).ok().flatten(),
                    None => None,
                };
                subst.insert(name, bound.unwrap_or(TypeId::UNKNOWN));
            }
        }
        self.strict = saved_strict;
        matched.then_some(subst)
    }
}

#[cfg(test)]
#[path = "tests/infer_tests.rs"]
mod tests;

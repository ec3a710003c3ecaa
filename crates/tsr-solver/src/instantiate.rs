//! Generic instantiation: substituting bound type parameters through a type.
//!
//! Substitution is by name. Names introduced inside a node (a conditional's
//! `infer` names, a mapped type's key parameter) shadow outer bindings while
//! the node's own parts are instantiated.
//!
//! A distributive conditional whose check type is a substituted generic is
//! split per union member here, the same way it would be split during
//! evaluation, so deferring evaluation never loses distribution.
//!
//! Results are built with the raw union/intersection constructors; the
//! evaluator normalizes them later, which is where intersection conflicts
//! get reported.

use crate::intern::TypeInterner;
use crate::types::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tsr_common::interner::Atom;

/// Maximum nesting for a single instantiation walk.
const MAX_INSTANTIATION_DEPTH: u32 = 200;

/// Bindings from generic names to types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeSubstitution {
    map: FxHashMap<Atom, TypeId>,
}

impl TypeSubstitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `params[i]` to `args[i]`; missing arguments use the parameter's
    /// default, then `unknown`.
    pub fn from_args(params: &[TypeParamInfo], args: &[TypeId]) -> Self {
        let mut subst = Self::new();
        for (i, param) in params.iter().enumerate() {
            let arg = args
                .get(i)
                .copied()
                .or(param.default)
                .unwrap_or(TypeId::UNKNOWN);
            subst.insert(param.name, arg);
        }
        subst
    }

    pub fn insert(&mut self, name: Atom, type_id: TypeId) {
        self.map.insert(name, type_id);
    }

    pub fn get(&self, name: Atom) -> Option<TypeId> {
        self.map.get(&name).copied()
    }

    pub fn contains(&self, name: Atom) -> bool {
        self.map.contains_key(&name)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Atom, TypeId)> + '_ {
        self.map.iter().map(|(&name, &ty)| (name, ty))
    }

    /// Copy every binding of `other` into `self`, overwriting on conflict.
    pub fn extend(&mut self, other: &TypeSubstitution) {
        for (name, ty) in other.iter() {
            self.map.insert(name, ty);
        }
    }
}

/// Substitute `subst` through `type_id`.
pub fn instantiate_type(interner: &TypeInterner, type_id: TypeId, subst: &TypeSubstitution) -> TypeId {
    if subst.is_empty() || type_id.is_intrinsic() {
        return type_id;
    }
    let mut instantiator = TypeInstantiator::new(interner, subst);
    instantiator.instantiate(type_id)
}

struct TypeInstantiator<'a> {
    interner: &'a TypeInterner,
    subst: &'a TypeSubstitution,
    /// Names currently shadowed by an enclosing binder.
    shadowed: SmallVec<[Atom; 4]>,
    cache: FxHashMap<TypeId, TypeId>,
    depth: u32,
}

impl<'a> TypeInstantiator<'a> {
    fn new(interner: &'a TypeInterner, subst: &'a TypeSubstitution) -> Self {
        TypeInstantiator {
            interner,
            subst,
            shadowed: SmallVec::new(),
            cache: FxHashMap::default(),
            depth: 0,
        }
    }

    fn lookup(&self, name: Atom) -> Option<TypeId> {
        if self.shadowed.contains(&name) {
            None
        } else {
            self.subst.get(name)
        }
    }

    fn instantiate(&mut self, type_id: TypeId) -> TypeId {
        if type_id.is_intrinsic() {
            return type_id;
        }
        // The cache is only valid while no binder shadows anything.
        let cacheable = self.shadowed.is_empty();
        if cacheable && let Some(&cached) = self.cache.get(&type_id) {
            return cached;
        }
        if self.depth >= MAX_INSTANTIATION_DEPTH {
            return type_id;
        }

        self.depth += 1;
        let result = self.instantiate_inner(type_id);
        self.depth -= 1;

        if cacheable {
            self.cache.insert(type_id, result);
        }
        result
    }

    fn instantiate_list(&mut self, members: &[TypeId]) -> Vec<TypeId> {
        members.iter().map(|&member| self.instantiate(member)).collect()
    }

    fn with_shadowed<T>(&mut self, names: &[Atom], f: impl FnOnce(&mut Self) -> T) -> T {
        let before = self.shadowed.len();
        self.shadowed.extend(names.iter().copied());
        let result = f(self);
        self.shadowed.truncate(before);
        result
    }

    fn instantiate_inner(&mut self, type_id: TypeId) -> TypeId {
        let Some(key) = self.interner.lookup(type_id) else {
            return type_id;
        };

        match key {
            TypeData::Intrinsic(_) | TypeData::Literal(_) | TypeData::Error => type_id,
            TypeData::TypeParameter(info) => self.lookup(info.name).unwrap_or(type_id),
            TypeData::Union(list_id) => {
                let members = self.interner.type_list(list_id);
                let members = self.instantiate_list(&members);
                self.interner.union_raw(members)
            }
            TypeData::Intersection(list_id) => {
                let members = self.interner.type_list(list_id);
                let members = self.instantiate_list(&members);
                self.interner.intersection_raw(members)
            }
            TypeData::Object(shape_id) => {
                let shape = self.interner.object_shape(shape_id);
                let properties: Vec<PropertyInfo> = shape
                    .properties
                    .iter()
                    .map(|prop| PropertyInfo {
                        type_id: self.instantiate(prop.type_id),
                        ..prop.clone()
                    })
                    .collect();
                let string_index = shape.string_index.map(|index| self.instantiate(index));
                let names: Vec<Atom> = properties.iter().map(|p| p.name).collect();
                let rebuilt = self.interner.object_with_index(ObjectShape {
                    properties,
                    string_index,
                });
                self.interner.copy_property_origins(type_id, rebuilt, &names);
                rebuilt
            }
            TypeData::Function(shape_id) => {
                let shape = self.interner.function_shape(shape_id);
                let params = self.instantiate_list(&shape.params);
                let return_type = self.instantiate(shape.return_type);
                self.interner.function(params, return_type)
            }
            TypeData::Array(element) => {
                let element = self.instantiate(element);
                self.interner.array(element)
            }
            TypeData::Reference(name, args) => {
                let args = self.interner.type_list(args);
                let args = self.instantiate_list(&args);
                self.interner.reference(name, args)
            }
            TypeData::IndexAccess(object, key) => {
                let object = self.instantiate(object);
                let key = self.instantiate(key);
                self.interner.index_access(object, key)
            }
            TypeData::TemplateLiteral(list_id) => {
                let spans: Vec<TemplateSpan> = self
                    .interner
                    .template_list(list_id)
                    .iter()
                    .map(|span| match *span {
                        TemplateSpan::Text(atom) => TemplateSpan::Text(atom),
                        TemplateSpan::Type(inner) => TemplateSpan::Type(self.instantiate(inner)),
                    })
                    .collect();
                self.interner.template_literal(spans)
            }
            TypeData::StringIntrinsic { kind, type_arg } => {
                let type_arg = self.instantiate(type_arg);
                self.interner.string_intrinsic(kind, type_arg)
            }
            TypeData::Conditional(cond_id) => {
                let cond = self.interner.conditional_type(cond_id);
                self.instantiate_conditional(&cond)
            }
            TypeData::Mapped(mapped_id) => {
                let mapped = self.interner.mapped_type(mapped_id);
                self.instantiate_mapped(&mapped)
            }
        }
    }

    fn instantiate_mapped(&mut self, mapped: &MappedType) -> TypeId {
        // `{ [K in keyof T]: ... }` with `T := A | B` maps each member on its own.
        if let Some(TypeData::TypeParameter(info)) = self.interner.lookup(mapped.source)
            && let Some(replacement) = self.lookup(info.name)
            && let Some(TypeData::Union(list_id)) = self.interner.lookup(replacement)
        {
            let members = self.interner.type_list(list_id);
            let mut results = Vec::with_capacity(members.len());
            for &member in members.iter() {
                let mut member_subst = self.subst.clone();
                member_subst.insert(info.name, member);
                let mut nested = TypeInstantiator::new(self.interner, &member_subst);
                nested.shadowed = self.shadowed.clone();
                nested.depth = self.depth;
                results.push(nested.instantiate_mapped_parts(mapped));
            }
            return self.interner.union_raw(results);
        }
        self.instantiate_mapped_parts(mapped)
    }

    fn instantiate_mapped_parts(&mut self, mapped: &MappedType) -> TypeId {
        let source = self.instantiate(mapped.source);
        let key_param = [mapped.key_param];
        let (key_filter, template, name_type) = self.with_shadowed(&key_param, |this| {
            (
                mapped.key_filter.map(|f| this.instantiate(f)),
                this.instantiate(mapped.template),
                mapped.name_type.map(|n| this.instantiate(n)),
            )
        });
        self.interner.mapped(MappedType {
            key_param: mapped.key_param,
            source,
            key_filter,
            template,
            name_type,
            optional_modifier: mapped.optional_modifier,
            readonly_modifier: mapped.readonly_modifier,
        })
    }

    fn instantiate_conditional(&mut self, cond: &ConditionalType) -> TypeId {
        // `T extends U ? X : Y` with `T := A | B` becomes one conditional per member.
        if cond.is_distributive
            && let Some(TypeData::TypeParameter(info)) = self.interner.lookup(cond.check_type)
            && let Some(replacement) = self.lookup(info.name)
        {
            if replacement == TypeId::NEVER {
                return TypeId::NEVER;
            }
            if let Some(TypeData::Union(list_id)) = self.interner.lookup(replacement) {
                let members = self.interner.type_list(list_id);
                let mut results = Vec::with_capacity(members.len());
                for &member in members.iter() {
                    let mut member_subst = self.subst.clone();
                    member_subst.insert(info.name, member);
                    let mut nested = TypeInstantiator::new(self.interner, &member_subst);
                    nested.shadowed = self.shadowed.clone();
                    nested.depth = self.depth;
                    results.push(nested.instantiate_conditional_parts(cond));
                }
                return self.interner.union_raw(results);
            }
        }
        self.instantiate_conditional_parts(cond)
    }

    fn instantiate_conditional_parts(&mut self, cond: &ConditionalType) -> TypeId {
        let check_type = self.instantiate(cond.check_type);
        let (extends_type, true_type) = self.with_shadowed(&cond.infer_params, |this| {
            (
                this.instantiate(cond.extends_type),
                this.instantiate(cond.true_type),
            )
        });
        let false_type = self.instantiate(cond.false_type);
        self.interner.conditional(ConditionalType {
            check_type,
            extends_type,
            infer_params: cond.infer_params.clone(),
            true_type,
            false_type,
            is_distributive: cond.is_distributive,
        })
    }
}

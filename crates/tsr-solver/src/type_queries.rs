//! Small structural queries shared by the evaluator, checker and narrowing.

use crate::intern::TypeInterner;
use crate::types::*;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tsr_common::interner::Atom;

const MAX_WALK_DEPTH: u32 = 64;

/// Union members of `type_id`, or just `type_id` itself.
pub fn union_members(interner: &TypeInterner, type_id: TypeId) -> Vec<TypeId> {
    match interner.lookup(type_id) {
        Some(TypeData::Union(list_id)) => interner.type_list(list_id).to_vec(),
        _ => vec![type_id],
    }
}

/// The atom of a string literal type.
pub fn string_literal(interner: &TypeInterner, type_id: TypeId) -> Option<Atom> {
    match interner.lookup(type_id) {
        Some(TypeData::Literal(LiteralValue::String(atom))) => Some(atom),
        _ => None,
    }
}

/// Objects, arrays and functions.
pub fn is_object_like(interner: &TypeInterner, type_id: TypeId) -> bool {
    matches!(
        interner.lookup(type_id),
        Some(TypeData::Object(_) | TypeData::Array(_) | TypeData::Function(_))
    )
}

/// Whether `type_id` mentions a generic that is not bound inside it.
pub fn contains_type_parameters(interner: &TypeInterner, type_id: TypeId) -> bool {
    FreeParamWalker::new(interner, |_| true).walk(type_id)
}

/// Like [`contains_type_parameters`], ignoring the names in `except`.
pub fn contains_type_parameters_except(
    interner: &TypeInterner,
    type_id: TypeId,
    except: &[Atom],
) -> bool {
    FreeParamWalker::new(interner, |name| !except.contains(&name)).walk(type_id)
}

/// Whether the generic `name` occurs free in `type_id`.
pub fn references_type_param(interner: &TypeInterner, type_id: TypeId, name: Atom) -> bool {
    FreeParamWalker::new(interner, |candidate| candidate == name).walk(type_id)
}

struct FreeParamWalker<'a, F: Fn(Atom) -> bool> {
    interner: &'a TypeInterner,
    wanted: F,
    bound: SmallVec<[Atom; 4]>,
    visited: FxHashSet<TypeId>,
    depth: u32,
}

impl<'a, F: Fn(Atom) -> bool> FreeParamWalker<'a, F> {
    fn new(interner: &'a TypeInterner, wanted: F) -> Self {
        FreeParamWalker {
            interner,
            wanted,
            bound: SmallVec::new(),
            visited: FxHashSet::default(),
            depth: 0,
        }
    }

    fn walk(&mut self, type_id: TypeId) -> bool {
        if type_id.is_intrinsic() || self.depth >= MAX_WALK_DEPTH {
            return false;
        }
        // Revisits only matter while names are shadowed.
        if self.bound.is_empty() && !self.visited.insert(type_id) {
            return false;
        }
        self.depth += 1;
        let found = self.walk_inner(type_id);
        self.depth -= 1;
        found
    }

    fn walk_all(&mut self, members: &[TypeId]) -> bool {
        members.iter().any(|&member| self.walk(member))
    }

    fn walk_inner(&mut self, type_id: TypeId) -> bool {
        let Some(key) = self.interner.lookup(type_id) else {
            return false;
        };
        match key {
            TypeData::TypeParameter(info) => {
                !self.bound.contains(&info.name) && (self.wanted)(info.name)
            }
            TypeData::Intrinsic(_) | TypeData::Literal(_) | TypeData::Error => false,
            TypeData::Union(list_id)
            | TypeData::Intersection(list_id)
            | TypeData::Reference(_, list_id) => {
                let members = self.interner.type_list(list_id);
                self.walk_all(&members)
            }
            TypeData::Object(shape_id) => {
                let shape = self.interner.object_shape(shape_id);
                shape.properties.iter().any(|p| self.walk(p.type_id))
                    || shape.string_index.is_some_and(|index| self.walk(index))
            }
            TypeData::Function(shape_id) => {
                let shape = self.interner.function_shape(shape_id);
                self.walk_all(&shape.params) || self.walk(shape.return_type)
            }
            TypeData::Array(element) => self.walk(element),
            TypeData::IndexAccess(object, key) => self.walk(object) || self.walk(key),
            TypeData::StringIntrinsic { type_arg, .. } => self.walk(type_arg),
            TypeData::TemplateLiteral(list_id) => {
                let spans = self.interner.template_list(list_id);
                spans.iter().any(|span| match *span {
                    TemplateSpan::Type(inner) => self.walk(inner),
                    TemplateSpan::Text(_) => false,
                })
            }
            TypeData::Conditional(cond_id) => {
                let cond = self.interner.conditional_type(cond_id);
                if self.walk(cond.check_type) || self.walk(cond.false_type) {
                    return true;
                }
                let mark = self.bound.len();
                self.bound.extend(cond.infer_params.iter().copied());
                let found = self.walk(cond.extends_type) || self.walk(cond.true_type);
                self.bound.truncate(mark);
                found
            }
            TypeData::Mapped(mapped_id) => {
                let mapped = self.interner.mapped_type(mapped_id);
                if self.walk(mapped.source) {
                    return true;
                }
                self.bound.push(mapped.key_param);
                let found = mapped.key_filter.is_some_and(|f| self.walk(f))
                    || self.walk(mapped.template)
                    || mapped.name_type.is_some_and(|n| self.walk(n));
                self.bound.pop();
                found
            }
        }
    }
}

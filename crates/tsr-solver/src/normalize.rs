//! Canonicalization of union and intersection types.
//!
//! The normalizer flattens nested unions/intersections, removes duplicates,
//! applies the absorption rules for `never`/`unknown`/`any`, folds literals
//! into their primitive, distributes intersections over unions and merges
//! object shapes that meet in an intersection. It recurses through object
//! fields, function signatures and array elements, but leaves conditional,
//! mapped and reference nodes alone: those are only resolved by an explicit
//! evaluation.
//!
//! Running the normalizer on its own output returns the same `TypeId`.

use crate::format::TypeFormatter;
use crate::intern::{TypeInterner, TypeListBuffer};
use crate::types::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;
use tsr_common::diagnostics::{Diagnostic, DiagnosticKind};
use tsr_common::interner::Atom;
use tsr_common::limits::MAX_DISTRIBUTION_SIZE;
use tsr_common::span::SourceTag;

const MAX_NORMALIZE_DEPTH: u32 = 200;
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROWTH: usize = 1024 * 1024;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PrimitiveClass {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Void,
}

pub struct Normalizer<'a> {
    interner: &'a TypeInterner,
    /// Location reported for intersection conflicts.
    site: Option<SourceTag>,
    diagnostics: Vec<Diagnostic>,
    cache: FxHashMap<TypeId, TypeId>,
    depth: u32,
}

impl<'a> Normalizer<'a> {
    pub fn new(interner: &'a TypeInterner) -> Self {
        Normalizer {
            interner,
            site: None,
            diagnostics: Vec::new(),
            cache: FxHashMap::default(),
            depth: 0,
        }
    }

    pub fn with_site(mut self, site: Option<SourceTag>) -> Self {
        self.site = site;
        self
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Normalize a type to its canonical form.
    pub fn normalize(&mut self, type_id: TypeId) -> TypeId {
        if type_id.is_intrinsic() {
            return type_id;
        }
        if let Some(&cached) = self.cache.get(&type_id) {
            return cached;
        }
        if self.depth >= MAX_NORMALIZE_DEPTH {
            return type_id;
        }

        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
            self.normalize_inner(type_id)
        });
        self.depth -= 1;

        self.cache.insert(type_id, result);
        self.cache.insert(result, result);
        result
    }

    fn normalize_inner(&mut self, type_id: TypeId) -> TypeId {
        let Some(key) = self.interner.lookup(type_id) else {
            return type_id;
        };

        match key {
            TypeData::Union(list_id) => {
                let members: Vec<TypeId> = self
                    .interner
                    .type_list(list_id)
                    .iter()
                    .map(|&member| self.normalize(member))
                    .collect();
                self.union(members)
            }
            TypeData::Intersection(list_id) => {
                let previous = self.site;
                if let Some(tag) = self.interner.type_origin(type_id) {
                    self.site = Some(tag);
                }
                let members: Vec<TypeId> = self
                    .interner
                    .type_list(list_id)
                    .iter()
                    .map(|&member| self.normalize(member))
                    .collect();
                let result = self.intersection(members);
                self.site = previous;
                result
            }
            TypeData::Object(shape_id) => {
                let shape = self.interner.object_shape(shape_id);
                let mut changed = false;
                let mut properties = Vec::with_capacity(shape.properties.len());
                for prop in &shape.properties {
                    let normalized = self.normalize(prop.type_id);
                    changed |= normalized != prop.type_id;
                    properties.push(PropertyInfo {
                        type_id: normalized,
                        ..prop.clone()
                    });
                }
                let string_index = shape.string_index.map(|index| {
                    let normalized = self.normalize(index);
                    changed |= normalized != index;
                    normalized
                });
                if !changed {
                    return type_id;
                }
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
                let params: Vec<TypeId> =
                    shape.params.iter().map(|&p| self.normalize(p)).collect();
                let return_type = self.normalize(shape.return_type);
                if params == shape.params && return_type == shape.return_type {
                    return type_id;
                }
                self.interner.function(params, return_type)
            }
            TypeData::Array(element) => {
                let normalized = self.normalize(element);
                if normalized == element {
                    type_id
                } else {
                    self.interner.array(normalized)
                }
            }
            _ => type_id,
        }
    }

    // =========================================================================
    // Unions
    // =========================================================================

    /// Build a canonical union from already-normalized members.
    pub fn union(&mut self, members: Vec<TypeId>) -> TypeId {
        let mut flat: TypeListBuffer = SmallVec::new();
        for member in members {
            self.push_union_member(&mut flat, member);
        }
        self.normalize_union(flat)
    }

    fn push_union_member(&self, flat: &mut TypeListBuffer, member: TypeId) {
        if let Some(TypeData::Union(inner)) = self.interner.lookup(member) {
            for &nested in self.interner.type_list(inner).iter() {
                self.push_union_member(flat, nested);
            }
        } else {
            flat.push(member);
        }
    }

    fn normalize_union(&self, mut flat: TypeListBuffer) -> TypeId {
        flat.sort_unstable();
        flat.dedup();

        if flat.contains(&TypeId::ERROR) {
            return TypeId::ERROR;
        }
        if flat.contains(&TypeId::ANY) {
            return TypeId::ANY;
        }
        if flat.contains(&TypeId::UNKNOWN) {
            return TypeId::UNKNOWN;
        }
        flat.retain(|id| *id != TypeId::NEVER);

        self.absorb_literals_into_primitives(&mut flat);

        match flat.len() {
            0 => TypeId::NEVER,
            1 => flat[0],
            _ => {
                let list_id = self.interner.intern_type_list(flat.into_vec());
                self.interner.intern(TypeData::Union(list_id))
            }
        }
    }

    /// `"a" | string` => `string`, `true | false` => `boolean`.
    fn absorb_literals_into_primitives(&self, flat: &mut TypeListBuffer) {
        let has_string = flat.contains(&TypeId::STRING);
        let has_number = flat.contains(&TypeId::NUMBER);
        let mut has_boolean = flat.contains(&TypeId::BOOLEAN);

        if !has_boolean
            && flat.contains(&TypeId::BOOLEAN_TRUE)
            && flat.contains(&TypeId::BOOLEAN_FALSE)
        {
            flat.push(TypeId::BOOLEAN);
            flat.sort_unstable();
            has_boolean = true;
        }

        if !(has_string || has_number || has_boolean) {
            return;
        }

        flat.retain(|id| match self.interner.lookup(*id) {
            Some(TypeData::Literal(LiteralValue::String(_))) => !has_string,
            Some(TypeData::Literal(LiteralValue::Number(_))) => !has_number,
            Some(TypeData::Literal(LiteralValue::Boolean(_))) => !has_boolean,
            _ => true,
        });
    }

    // =========================================================================
    // Intersections
    // =========================================================================

    /// Build a canonical intersection from already-normalized members.
    pub fn intersection(&mut self, members: Vec<TypeId>) -> TypeId {
        let mut flat: TypeListBuffer = SmallVec::new();
        for member in members {
            self.push_intersection_member(&mut flat, member);
        }
        self.normalize_intersection(flat)
    }

    fn push_intersection_member(&self, flat: &mut TypeListBuffer, member: TypeId) {
        if let Some(TypeData::Intersection(inner)) = self.interner.lookup(member) {
            for &nested in self.interner.type_list(inner).iter() {
                self.push_intersection_member(flat, nested);
            }
        } else {
            flat.push(member);
        }
    }

    fn normalize_intersection(&mut self, mut flat: TypeListBuffer) -> TypeId {
        flat.sort_unstable();
        flat.dedup();

        if flat.contains(&TypeId::ERROR) {
            return TypeId::ERROR;
        }
        if flat.contains(&TypeId::NEVER) {
            return TypeId::NEVER;
        }
        if flat.contains(&TypeId::ANY) {
            return TypeId::ANY;
        }
        flat.retain(|id| *id != TypeId::UNKNOWN);
        match flat.len() {
            0 => return TypeId::UNKNOWN,
            1 => return flat[0],
            _ => {}
        }

        if let Some(distributed) = self.distribute_over_unions(&flat) {
            return distributed;
        }

        if !self.reduce_primitives(&mut flat) {
            return TypeId::NEVER;
        }

        let objects: SmallVec<[TypeId; 4]> = flat
            .iter()
            .copied()
            .filter(|&id| matches!(self.interner.lookup(id), Some(TypeData::Object(_))))
            .collect();
        if objects.len() > 1 {
            let merged = self.merge_objects(&objects);
            flat.retain(|id| !objects.contains(id));
            flat.push(merged);
            flat.sort_unstable();
            flat.dedup();
        }

        match flat.len() {
            0 => TypeId::UNKNOWN,
            1 => flat[0],
            _ => {
                let list_id = self.interner.intern_type_list(flat.into_vec());
                self.interner.intern(TypeData::Intersection(list_id))
            }
        }
    }

    /// `A & (B | C)` => `(A & B) | (A & C)`, unless the product is too large.
    fn distribute_over_unions(&mut self, flat: &[TypeId]) -> Option<TypeId> {
        let mut fixed: Vec<TypeId> = Vec::new();
        let mut unions: Vec<std::sync::Arc<[TypeId]>> = Vec::new();
        for &member in flat {
            match self.interner.lookup(member) {
                Some(TypeData::Union(list_id)) => unions.push(self.interner.type_list(list_id)),
                _ => fixed.push(member),
            }
        }
        if unions.is_empty() {
            return None;
        }

        let product = unions
            .iter()
            .try_fold(1usize, |acc, members| acc.checked_mul(members.len()));
        match product {
            Some(size) if size <= MAX_DISTRIBUTION_SIZE => {}
            _ => {
                trace!(unions = unions.len(), "intersection too large to distribute");
                return None;
            }
        }

        let mut combinations: Vec<Vec<TypeId>> = vec![fixed];
        for members in &unions {
            let mut next = Vec::with_capacity(combinations.len() * members.len());
            for combination in &combinations {
                for &member in members.iter() {
                    let mut extended = combination.clone();
                    extended.push(member);
                    next.push(extended);
                }
            }
            combinations = next;
        }

        let results: Vec<TypeId> = combinations
            .into_iter()
            .map(|combination| self.intersection(combination))
            .collect();
        Some(self.union(results))
    }

    fn primitive_class(&self, type_id: TypeId) -> Option<PrimitiveClass> {
        match type_id {
            TypeId::STRING => return Some(PrimitiveClass::String),
            TypeId::NUMBER => return Some(PrimitiveClass::Number),
            TypeId::BOOLEAN | TypeId::BOOLEAN_TRUE | TypeId::BOOLEAN_FALSE => {
                return Some(PrimitiveClass::Boolean);
            }
            TypeId::NULL => return Some(PrimitiveClass::Null),
            TypeId::UNDEFINED => return Some(PrimitiveClass::Undefined),
            TypeId::VOID => return Some(PrimitiveClass::Void),
            _ => {}
        }
        match self.interner.lookup(type_id) {
            Some(TypeData::Literal(LiteralValue::String(_))) => Some(PrimitiveClass::String),
            Some(TypeData::Literal(LiteralValue::Number(_))) => Some(PrimitiveClass::Number),
            _ => None,
        }
    }

    fn is_object_like(&self, type_id: TypeId) -> bool {
        matches!(
            self.interner.lookup(type_id),
            Some(TypeData::Object(_) | TypeData::Array(_) | TypeData::Function(_))
        )
    }

    fn is_empty_object(&self, type_id: TypeId) -> bool {
        match self.interner.lookup(type_id) {
            Some(TypeData::Object(shape_id)) => {
                let shape = self.interner.object_shape(shape_id);
                shape.properties.is_empty() && shape.string_index.is_none()
            }
            _ => false,
        }
    }

    fn is_literal(&self, type_id: TypeId) -> bool {
        matches!(self.interner.lookup(type_id), Some(TypeData::Literal(_)))
    }

    /// Apply the primitive rules in place. Returns `false` when the
    /// intersection is empty.
    fn reduce_primitives(&self, flat: &mut TypeListBuffer) -> bool {
        let mut classes: SmallVec<[PrimitiveClass; 4]> = SmallVec::new();
        let mut literals: SmallVec<[TypeId; 4]> = SmallVec::new();
        let mut has_object_like = false;

        for &member in flat.iter() {
            if let Some(class) = self.primitive_class(member) {
                if !classes.contains(&class) {
                    classes.push(class);
                }
                if self.is_literal(member) {
                    literals.push(member);
                }
            } else if self.is_object_like(member) {
                has_object_like = true;
            }
        }

        if classes.is_empty() {
            return true;
        }
        if has_object_like {
            let nullish = classes.iter().any(|class| {
                matches!(
                    class,
                    PrimitiveClass::Null | PrimitiveClass::Undefined | PrimitiveClass::Void
                )
            });
            if nullish {
                return false;
            }
            // `string & {}` is `string`; non-empty objects brand the primitive.
            flat.retain(|id| !self.is_empty_object(*id));
        }

        // `void & undefined` is `undefined`.
        if classes.len() == 2
            && classes.contains(&PrimitiveClass::Void)
            && classes.contains(&PrimitiveClass::Undefined)
        {
            flat.retain(|id| *id != TypeId::VOID);
            return true;
        }
        if classes.len() > 1 {
            return false;
        }
        if literals.len() > 1 {
            return false;
        }
        if let Some(&literal) = literals.first() {
            // `"a" & string` => `"a"`
            let primitive = match self.interner.lookup(literal) {
                Some(TypeData::Literal(value)) => value.primitive(),
                _ => TypeId::NONE,
            };
            flat.retain(|id| *id != primitive);
        }
        true
    }

    /// Merge object shapes meeting in an intersection.
    ///
    /// A field present in one parent is copied; a field present in several
    /// becomes the intersection of their types. Optional only if optional in
    /// all parents, readonly if readonly in any.
    fn merge_objects(&mut self, objects: &[TypeId]) -> TypeId {
        let mut properties: Vec<PropertyInfo> = Vec::new();
        let mut owners: Vec<TypeId> = Vec::new();
        let mut string_index: Option<TypeId> = None;

        for &object in objects {
            let Some(TypeData::Object(shape_id)) = self.interner.lookup(object) else {
                continue;
            };
            let shape = self.interner.object_shape(shape_id);
            for prop in &shape.properties {
                let Some(idx) = properties.iter().position(|p| p.name == prop.name) else {
                    properties.push(prop.clone());
                    owners.push(object);
                    continue;
                };
                let existing_type = properties[idx].type_id;
                let merged = if existing_type == prop.type_id {
                    existing_type
                } else {
                    self.intersection(vec![existing_type, prop.type_id])
                };
                if merged == TypeId::NEVER
                    && existing_type != TypeId::NEVER
                    && prop.type_id != TypeId::NEVER
                {
                    self.report_conflict(prop.name, (owners[idx], existing_type), (object, prop.type_id));
                }
                let existing = &mut properties[idx];
                existing.type_id = merged;
                existing.optional = existing.optional && prop.optional;
                existing.readonly = existing.readonly || prop.readonly;
            }
            string_index = match (string_index, shape.string_index) {
                (None, other) | (other, None) => other,
                (Some(a), Some(b)) => Some(self.intersection(vec![a, b])),
            };
        }

        let merged = self.interner.object_with_index(ObjectShape {
            properties: properties.clone(),
            string_index,
        });
        for (prop, owner) in properties.iter().zip(owners) {
            self.interner.copy_property_origins(owner, merged, &[prop.name]);
        }
        merged
    }

    fn report_conflict(&mut self, name: Atom, first: (TypeId, TypeId), second: (TypeId, TypeId)) {
        let name_text = self.interner.resolve_atom(name);
        let mut formatter = TypeFormatter::new(self.interner);
        let first_text = formatter.format(first.1);
        let second_text = formatter.format(second.1);
        trace!(
            property = %name_text,
            first = %first_text,
            second = %second_text,
            "intersection field reduced to never"
        );
        let declared = format!("'{name_text}' is declared here.");
        let diagnostic = Diagnostic::new(
            DiagnosticKind::IncompatibleIntersection,
            &[&name_text, &first_text, &second_text],
        )
        .at(self.site)
        .with_related(self.interner.property_origin(first.0, name), declared.clone())
        .with_related(self.interner.property_origin(second.0, name), declared);
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
#[path = "tests/normalize_tests.rs"]
mod tests;

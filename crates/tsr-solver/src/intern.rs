//! Hash-consed type storage.
//!
//! `TypeInterner` hash-conses `TypeData` values into `TypeId` handles:
//! - O(1) type equality (compare ids)
//! - each unique structure is stored once
//! - composite payloads live in side interners keyed by small ids
//!
//! Storage is split into 64 shards. Lookups of an existing type take a read
//! lock on one shard; inserting a new type takes that shard's write lock
//! briefly, so worker threads that build types for different modules rarely
//! contend.
//!
//! `union`/`intersection` here are the normalizing constructors (they run the
//! `Normalizer` without a diagnostic sink). `union_raw`/`intersection_raw`
//! only sort and deduplicate, which is what instantiation uses to keep nodes
//! lazy until evaluation.

use crate::normalize::Normalizer;
use crate::types::*;
use dashmap::DashMap;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHasher};
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};
use tsr_common::interner::{Atom, ShardedInterner};
use tsr_common::span::SourceTag;

const SHARD_BITS: u32 = 6;
const SHARD_COUNT: usize = 1 << SHARD_BITS; // 64 shards
const SHARD_MASK: u32 = (SHARD_COUNT as u32) - 1;
const TYPE_LIST_INLINE: usize = 8;

pub(crate) type TypeListBuffer = SmallVec<[TypeId; TYPE_LIST_INLINE]>;

struct TypeShard {
    key_to_index: RwLock<FxHashMap<TypeData, u32>>,
    index_to_key: RwLock<Vec<TypeData>>,
}

impl TypeShard {
    fn new() -> Self {
        TypeShard {
            key_to_index: RwLock::new(FxHashMap::default()),
            index_to_key: RwLock::new(Vec::new()),
        }
    }
}

struct SliceInterner<T> {
    items: Vec<Arc<[T]>>,
    map: FxHashMap<Arc<[T]>, u32>,
}

impl<T> SliceInterner<T>
where
    T: Eq + Hash,
{
    fn new() -> Self {
        let empty: Arc<[T]> = Arc::from(Vec::new());
        let mut map = FxHashMap::default();
        map.insert(empty.clone(), 0);
        SliceInterner {
            items: vec![empty],
            map,
        }
    }

    fn intern(&mut self, items: Vec<T>) -> u32 {
        if items.is_empty() {
            return 0;
        }

        if let Some(&id) = self.map.get(items.as_slice()) {
            return id;
        }

        let arc: Arc<[T]> = items.into();
        let id = self.items.len() as u32;
        self.items.push(arc.clone());
        self.map.insert(arc, id);
        id
    }

    fn get(&self, id: u32) -> Option<Arc<[T]>> {
        self.items.get(id as usize).cloned()
    }

    fn empty(&self) -> Arc<[T]> {
        self.items[0].clone()
    }
}

struct ValueInterner<T> {
    items: Vec<Arc<T>>,
    map: FxHashMap<Arc<T>, u32>,
}

impl<T> ValueInterner<T>
where
    T: Eq + Hash,
{
    fn new() -> Self {
        ValueInterner {
            items: Vec::new(),
            map: FxHashMap::default(),
        }
    }

    fn intern(&mut self, value: T) -> u32 {
        if let Some(&id) = self.map.get(&value) {
            return id;
        }

        let arc = Arc::new(value);
        let id = self.items.len() as u32;
        self.items.push(arc.clone());
        self.map.insert(arc, id);
        id
    }

    fn get(&self, id: u32) -> Option<Arc<T>> {
        self.items.get(id as usize).cloned()
    }
}

/// Type interning table.
/// Thread-safe; share it behind an `Arc` between workers.
pub struct TypeInterner {
    /// Per-shard key table and id-ordered storage.
    shards: [TypeShard; SHARD_COUNT],
    /// String interner for property names, alias names and string literals
    pub string_interner: ShardedInterner,
    type_lists: RwLock<SliceInterner<TypeId>>,
    template_lists: RwLock<SliceInterner<TemplateSpan>>,
    object_shapes: RwLock<ValueInterner<ObjectShape>>,
    function_shapes: RwLock<ValueInterner<FunctionShape>>,
    conditional_types: RwLock<ValueInterner<ConditionalType>>,
    mapped_types: RwLock<ValueInterner<MappedType>>,
    /// Source locations; never part of type identity. First writer wins.
    origins: DashMap<OriginKey, SourceTag, FxBuildHasher>,
}

impl TypeInterner {
    /// An interner holding just the fixed intrinsic ids.
    pub fn new() -> Self {
        TypeInterner {
            shards: std::array::from_fn(|_| TypeShard::new()),
            string_interner: {
                let interner = ShardedInterner::new();
                interner.intern_common();
                interner
            },
            type_lists: RwLock::new(SliceInterner::new()),
            template_lists: RwLock::new(SliceInterner::new()),
            object_shapes: RwLock::new(ValueInterner::new()),
            function_shapes: RwLock::new(ValueInterner::new()),
            conditional_types: RwLock::new(ValueInterner::new()),
            mapped_types: RwLock::new(ValueInterner::new()),
            origins: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Shared string table used for names and string literals.
    pub fn intern_string(&self, s: &str) -> Atom {
        self.string_interner.intern(s)
    }

    /// Owned text of an atom.
    pub fn resolve_atom(&self, atom: Atom) -> String {
        self.string_interner.resolve(atom).to_string()
    }

    /// Borrowed text of an atom.
    pub fn resolve_atom_ref(&self, atom: Atom) -> Arc<str> {
        self.string_interner.resolve(atom)
    }

    pub fn type_list(&self, id: TypeListId) -> Arc<[TypeId]> {
        let lists = self.type_lists.read().expect("type_lists lock poisoned");
        lists.get(id.0).unwrap_or_else(|| lists.empty())
    }

    pub fn template_list(&self, id: TemplateListId) -> Arc<[TemplateSpan]> {
        let lists = self.template_lists.read().expect("template_lists lock poisoned");
        lists.get(id.0).unwrap_or_else(|| lists.empty())
    }

    pub fn object_shape(&self, id: ObjectShapeId) -> Arc<ObjectShape> {
        self.object_shapes
            .read()
            .expect("object_shapes lock poisoned")
            .get(id.0)
            .unwrap_or_else(|| Arc::new(ObjectShape::default()))
    }

    pub fn function_shape(&self, id: FunctionShapeId) -> Arc<FunctionShape> {
        self.function_shapes
            .read()
            .expect("function_shapes lock poisoned")
            .get(id.0)
            .unwrap_or_else(|| {
                Arc::new(FunctionShape {
                    params: Vec::new(),
                    return_type: TypeId::ERROR,
                })
            })
    }

    pub fn conditional_type(&self, id: ConditionalTypeId) -> Arc<ConditionalType> {
        self.conditional_types
            .read()
            .expect("conditional_types lock poisoned")
            .get(id.0)
            .unwrap_or_else(|| {
                Arc::new(ConditionalType {
                    check_type: TypeId::ERROR,
                    extends_type: TypeId::ERROR,
                    infer_params: Vec::new(),
                    true_type: TypeId::ERROR,
                    false_type: TypeId::ERROR,
                    is_distributive: false,
                })
            })
    }

    pub fn mapped_type(&self, id: MappedTypeId) -> Arc<MappedType> {
        self.mapped_types
            .read()
            .expect("mapped_types lock poisoned")
            .get(id.0)
            .unwrap_or_else(|| {
                Arc::new(MappedType {
                    key_param: Atom::NONE,
                    source: TypeId::ERROR,
                    key_filter: None,
                    template: TypeId::ERROR,
                    name_type: None,
                    optional_modifier: None,
                    readonly_modifier: None,
                })
            })
    }

    /// Hash-cons `key` into its shard.
    /// Structurally equal keys always map to the same id.
    pub fn intern(&self, key: TypeData) -> TypeId {
        if let Some(id) = self.get_intrinsic_id(&key) {
            return id;
        }

        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        let shard_idx = (hasher.finish() as usize) & (SHARD_COUNT - 1);
        let shard = &self.shards[shard_idx];

        {
            let map = shard.key_to_index.read().expect("shard key_to_index lock poisoned");
            if let Some(&local_index) = map.get(&key) {
                return self.make_id(local_index, shard_idx as u32);
            }
        }

        let mut map = shard.key_to_index.write().expect("shard key_to_index lock poisoned");
        let mut storage = shard.index_to_key.write().expect("shard index_to_key lock poisoned");

        // Another worker may have inserted between the two locks.
        if let Some(&local_index) = map.get(&key) {
            return self.make_id(local_index, shard_idx as u32);
        }

        let local_index = storage.len() as u32;
        if local_index > ((u32::MAX - TypeId::FIRST_USER) >> SHARD_BITS) {
            return TypeId::ERROR;
        }

        storage.push(key.clone());
        map.insert(key, local_index);

        self.make_id(local_index, shard_idx as u32)
    }

    /// Look up the TypeData for a given TypeId
    pub fn lookup(&self, id: TypeId) -> Option<TypeData> {
        if id.is_intrinsic() {
            return self.get_intrinsic_key(id);
        }

        let raw_val = id.0.checked_sub(TypeId::FIRST_USER)?;
        let shard_idx = (raw_val & SHARD_MASK) as usize;
        let local_index = raw_val >> SHARD_BITS;

        let shard = self.shards.get(shard_idx)?;
        let storage = shard.index_to_key.read().expect("shard index_to_key lock poisoned");
        storage.get(local_index as usize).cloned()
    }

    pub(crate) fn intern_type_list(&self, members: Vec<TypeId>) -> TypeListId {
        let mut lists = self.type_lists.write().expect("type_lists lock poisoned");
        TypeListId(lists.intern(members))
    }

    fn intern_template_list(&self, spans: Vec<TemplateSpan>) -> TemplateListId {
        let mut lists = self.template_lists.write().expect("template_lists lock poisoned");
        TemplateListId(lists.intern(spans))
    }

    fn intern_object_shape(&self, shape: ObjectShape) -> ObjectShapeId {
        let mut shapes = self.object_shapes.write().expect("object_shapes lock poisoned");
        ObjectShapeId(shapes.intern(shape))
    }

    fn intern_function_shape(&self, shape: FunctionShape) -> FunctionShapeId {
        let mut shapes = self.function_shapes.write().expect("function_shapes lock poisoned");
        FunctionShapeId(shapes.intern(shape))
    }

    fn intern_conditional_type(&self, conditional: ConditionalType) -> ConditionalTypeId {
        let mut types = self.conditional_types.write().expect("conditional_types lock poisoned");
        ConditionalTypeId(types.intern(conditional))
    }

    fn intern_mapped_type(&self, mapped: MappedType) -> MappedTypeId {
        let mut types = self.mapped_types.write().expect("mapped_types lock poisoned");
        MappedTypeId(types.intern(mapped))
    }

    /// Get the number of interned types, counting the reserved intrinsic range.
    pub fn len(&self) -> usize {
        let mut total = TypeId::FIRST_USER as usize;
        for shard in &self.shards {
            total += shard.index_to_key.read().expect("shard index_to_key lock poisoned").len();
        }
        total
    }

    /// True while only the pre-registered intrinsics exist.
    pub fn is_empty(&self) -> bool {
        self.len() <= TypeId::FIRST_USER as usize
    }

    #[inline]
    fn make_id(&self, local_index: u32, shard_idx: u32) -> TypeId {
        let raw_val = (local_index << SHARD_BITS) | (shard_idx & SHARD_MASK);
        TypeId(TypeId::FIRST_USER + raw_val)
    }

    fn get_intrinsic_id(&self, key: &TypeData) -> Option<TypeId> {
        match key {
            TypeData::Intrinsic(kind) => Some(kind.to_type_id()),
            TypeData::Literal(LiteralValue::Boolean(true)) => Some(TypeId::BOOLEAN_TRUE),
            TypeData::Literal(LiteralValue::Boolean(false)) => Some(TypeId::BOOLEAN_FALSE),
            TypeData::Error => Some(TypeId::ERROR),
            _ => None,
        }
    }

    fn get_intrinsic_key(&self, id: TypeId) -> Option<TypeData> {
        match id {
            TypeId::NONE | TypeId::ERROR => Some(TypeData::Error),
            TypeId::NEVER => Some(TypeData::Intrinsic(IntrinsicKind::Never)),
            TypeId::UNKNOWN => Some(TypeData::Intrinsic(IntrinsicKind::Unknown)),
            TypeId::ANY => Some(TypeData::Intrinsic(IntrinsicKind::Any)),
            TypeId::VOID => Some(TypeData::Intrinsic(IntrinsicKind::Void)),
            TypeId::UNDEFINED => Some(TypeData::Intrinsic(IntrinsicKind::Undefined)),
            TypeId::NULL => Some(TypeData::Intrinsic(IntrinsicKind::Null)),
            TypeId::BOOLEAN => Some(TypeData::Intrinsic(IntrinsicKind::Boolean)),
            TypeId::NUMBER => Some(TypeData::Intrinsic(IntrinsicKind::Number)),
            TypeId::STRING => Some(TypeData::Intrinsic(IntrinsicKind::String)),
            TypeId::BOOLEAN_TRUE => Some(TypeData::Literal(LiteralValue::Boolean(true))),
            TypeId::BOOLEAN_FALSE => Some(TypeData::Literal(LiteralValue::Boolean(false))),
            _ => None,
        }
    }

    // =========================================================================
    // Origins
    // =========================================================================

    /// Record where a type or field came from. The first tag recorded wins.
    pub fn record_origin(&self, key: OriginKey, tag: SourceTag) {
        self.origins.entry(key).or_insert(tag);
    }

    pub fn origin(&self, key: OriginKey) -> Option<SourceTag> {
        self.origins.get(&key).map(|tag| *tag)
    }

    pub fn type_origin(&self, type_id: TypeId) -> Option<SourceTag> {
        self.origin(OriginKey::Type(type_id))
    }

    pub fn property_origin(&self, object: TypeId, name: Atom) -> Option<SourceTag> {
        self.origin(OriginKey::Property(object, name))
    }

    /// Carry field origins from `from` over to a rebuilt object `to`.
    pub(crate) fn copy_property_origins(&self, from: TypeId, to: TypeId, names: &[Atom]) {
        if from == to {
            return;
        }
        for &name in names {
            if let Some(tag) = self.property_origin(from, name) {
                self.record_origin(OriginKey::Property(to, name), tag);
            }
        }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Intern an intrinsic type
    pub fn intrinsic(&self, kind: IntrinsicKind) -> TypeId {
        kind.to_type_id()
    }

    /// String literal type.
    pub fn literal_string(&self, value: &str) -> TypeId {
        let atom = self.intern_string(value);
        self.intern(TypeData::Literal(LiteralValue::String(atom)))
    }

    pub fn literal_string_atom(&self, atom: Atom) -> TypeId {
        self.intern(TypeData::Literal(LiteralValue::String(atom)))
    }

    /// Number literal type.
    pub fn literal_number(&self, value: f64) -> TypeId {
        self.intern(TypeData::Literal(LiteralValue::Number(OrderedFloat(value))))
    }

    /// `true` / `false` literal; these have fixed ids.
    pub fn literal_boolean(&self, value: bool) -> TypeId {
        if value {
            TypeId::BOOLEAN_TRUE
        } else {
            TypeId::BOOLEAN_FALSE
        }
    }

    /// Normalized union of `members`.
    pub fn union(&self, members: Vec<TypeId>) -> TypeId {
        Normalizer::new(self).union(members)
    }

    /// Normalized intersection of `members`; object members are merged.
    pub fn intersection(&self, members: Vec<TypeId>) -> TypeId {
        Normalizer::new(self).intersection(members)
    }

    /// Union node with members sorted and deduplicated but otherwise untouched.
    pub fn union_raw(&self, members: Vec<TypeId>) -> TypeId {
        let mut flat: TypeListBuffer = members.into_iter().collect();
        flat.sort_unstable();
        flat.dedup();
        match flat.len() {
            0 => TypeId::NEVER,
            1 => flat[0],
            _ => {
                let list_id = self.intern_type_list(flat.into_vec());
                self.intern(TypeData::Union(list_id))
            }
        }
    }

    /// Intersection node with members sorted and deduplicated but otherwise untouched.
    pub fn intersection_raw(&self, members: Vec<TypeId>) -> TypeId {
        let mut flat: TypeListBuffer = members.into_iter().collect();
        flat.sort_unstable();
        flat.dedup();
        match flat.len() {
            0 => TypeId::UNKNOWN,
            1 => flat[0],
            _ => {
                let list_id = self.intern_type_list(flat.into_vec());
                self.intern(TypeData::Intersection(list_id))
            }
        }
    }

    /// Intern an object type with properties.
    pub fn object(&self, properties: Vec<PropertyInfo>) -> TypeId {
        self.object_with_index(ObjectShape::new(properties))
    }

    /// Intern an object type from a full shape (properties + index signature).
    pub fn object_with_index(&self, shape: ObjectShape) -> TypeId {
        let shape_id = self.intern_object_shape(shape);
        self.intern(TypeData::Object(shape_id))
    }

    pub fn function(&self, params: Vec<TypeId>, return_type: TypeId) -> TypeId {
        let shape_id = self.intern_function_shape(FunctionShape {
            params,
            return_type,
        });
        self.intern(TypeData::Function(shape_id))
    }

    pub fn array(&self, element: TypeId) -> TypeId {
        self.intern(TypeData::Array(element))
    }

    pub fn type_param(&self, info: TypeParamInfo) -> TypeId {
        self.intern(TypeData::TypeParameter(info))
    }

    /// Unconstrained type parameter named `name`.
    pub fn type_param_named(&self, name: &str) -> TypeId {
        self.type_param(TypeParamInfo::new(self.intern_string(name)))
    }

    pub fn reference(&self, name: Atom, args: Vec<TypeId>) -> TypeId {
        let list_id = self.intern_type_list(args);
        self.intern(TypeData::Reference(name, list_id))
    }

    pub fn conditional(&self, conditional: ConditionalType) -> TypeId {
        let cond_id = self.intern_conditional_type(conditional);
        self.intern(TypeData::Conditional(cond_id))
    }

    pub fn mapped(&self, mapped: MappedType) -> TypeId {
        let mapped_id = self.intern_mapped_type(mapped);
        self.intern(TypeData::Mapped(mapped_id))
    }

    pub fn index_access(&self, object: TypeId, key: TypeId) -> TypeId {
        self.intern(TypeData::IndexAccess(object, key))
    }

    /// Intern a template literal. Adjacent text spans are merged and empty
    /// text spans dropped so equal templates share an id.
    pub fn template_literal(&self, spans: Vec<TemplateSpan>) -> TypeId {
        let mut merged: Vec<TemplateSpan> = Vec::with_capacity(spans.len());
        for span in spans {
            match span {
                TemplateSpan::Text(atom) if atom.is_none() => {}
                TemplateSpan::Text(next) => {
                    if let Some(TemplateSpan::Text(prev)) = merged.last_mut() {
                        let joined = format!(
                            "{}{}",
                            self.resolve_atom_ref(*prev),
                            self.resolve_atom_ref(next)
                        );
                        *prev = self.intern_string(&joined);
                        continue;
                    }
                    merged.push(span);
                }
                TemplateSpan::Type(_) => merged.push(span),
            }
        }
        if merged.is_empty() {
            return self.literal_string("");
        }
        if let [TemplateSpan::Text(atom)] = merged.as_slice() {
            return self.literal_string_atom(*atom);
        }
        let list_id = self.intern_template_list(merged);
        self.intern(TypeData::TemplateLiteral(list_id))
    }

    pub fn string_intrinsic(&self, kind: StringIntrinsicKind, type_arg: TypeId) -> TypeId {
        self.intern(TypeData::StringIntrinsic { kind, type_arg })
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/intern_tests.rs"]
mod tests;

//! Core type representation.
//!
//! Every type the engine reasons about is a `TypeData` value interned into a
//! `TypeId`. Composite payloads (member lists, object shapes, conditional and
//! mapped nodes) live in side interners and are referenced by their own ids,
//! so a `TypeData` is always small, `Copy`-cheap to clone and hashable.

use serde::Serialize;
use std::hash::{Hash, Hasher};
use tsr_common::interner::Atom;

/// Handle to an interned type.
///
/// Intrinsics occupy fixed ids below `FIRST_USER`; everything else is
/// allocated by the interner's shards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Placeholder for "no type".
    pub const NONE: TypeId = TypeId(0);
    /// Internal recovery sentinel; never produced for valid input.
    pub const ERROR: TypeId = TypeId(1);
    pub const NEVER: TypeId = TypeId(2);
    pub const UNKNOWN: TypeId = TypeId(3);
    pub const ANY: TypeId = TypeId(4);
    pub const VOID: TypeId = TypeId(5);
    pub const UNDEFINED: TypeId = TypeId(6);
    pub const NULL: TypeId = TypeId(7);
    pub const BOOLEAN: TypeId = TypeId(8);
    pub const NUMBER: TypeId = TypeId(9);
    pub const STRING: TypeId = TypeId(10);
    /// `true` literal.
    pub const BOOLEAN_TRUE: TypeId = TypeId(11);
    /// `false` literal.
    pub const BOOLEAN_FALSE: TypeId = TypeId(12);

    /// First id handed out to non-intrinsic types.
    pub const FIRST_USER: u32 = 100;

    #[inline]
    pub fn is_intrinsic(self) -> bool {
        self.0 < Self::FIRST_USER
    }

    #[inline]
    pub fn is_error(self) -> bool {
        self == Self::ERROR
    }

    #[inline]
    pub fn is_any_or_unknown(self) -> bool {
        self == Self::ANY || self == Self::UNKNOWN
    }

    #[inline]
    pub fn is_nullish(self) -> bool {
        self == Self::NULL || self == Self::UNDEFINED || self == Self::VOID
    }
}

/// Built-in primitive and special types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub enum IntrinsicKind {
    Never,
    Unknown,
    Any,
    Void,
    Undefined,
    Null,
    Boolean,
    Number,
    String,
}

impl IntrinsicKind {
    #[inline]
    pub fn to_type_id(self) -> TypeId {
        match self {
            IntrinsicKind::Never => TypeId::NEVER,
            IntrinsicKind::Unknown => TypeId::UNKNOWN,
            IntrinsicKind::Any => TypeId::ANY,
            IntrinsicKind::Void => TypeId::VOID,
            IntrinsicKind::Undefined => TypeId::UNDEFINED,
            IntrinsicKind::Null => TypeId::NULL,
            IntrinsicKind::Boolean => TypeId::BOOLEAN,
            IntrinsicKind::Number => TypeId::NUMBER,
            IntrinsicKind::String => TypeId::STRING,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IntrinsicKind::Never => "never",
            IntrinsicKind::Unknown => "unknown",
            IntrinsicKind::Any => "any",
            IntrinsicKind::Void => "void",
            IntrinsicKind::Undefined => "undefined",
            IntrinsicKind::Null => "null",
            IntrinsicKind::Boolean => "boolean",
            IntrinsicKind::Number => "number",
            IntrinsicKind::String => "string",
        }
    }
}

/// `f64` with bitwise equality so number literals can be hashed.
///
/// `-0.0` is folded into `0.0` and every NaN into one canonical NaN.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct OrderedFloat(pub f64);

impl OrderedFloat {
    #[inline]
    fn canonical_bits(self) -> u64 {
        if self.0 == 0.0 {
            0.0f64.to_bits()
        } else if self.0.is_nan() {
            f64::NAN.to_bits()
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bits() == other.canonical_bits()
    }
}

impl Eq for OrderedFloat {}

impl Hash for OrderedFloat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bits().hash(state);
    }
}

/// Payload of a literal type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum LiteralValue {
    String(Atom),
    Number(OrderedFloat),
    Boolean(bool),
}

impl LiteralValue {
    /// The primitive a literal widens to.
    pub fn primitive(self) -> TypeId {
        match self {
            LiteralValue::String(_) => TypeId::STRING,
            LiteralValue::Number(_) => TypeId::NUMBER,
            LiteralValue::Boolean(_) => TypeId::BOOLEAN,
        }
    }

    /// Whether the literal is falsy at runtime (`""`, `0`, `false`).
    pub fn is_falsy(self) -> bool {
        match self {
            LiteralValue::String(atom) => atom.is_none(),
            LiteralValue::Number(n) => n.0 == 0.0 || n.0.is_nan(),
            LiteralValue::Boolean(b) => !b,
        }
    }
}

/// A single field of an object shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PropertyInfo {
    pub name: Atom,
    pub type_id: TypeId,
    pub optional: bool,
    pub readonly: bool,
}

impl PropertyInfo {
    pub fn new(name: Atom, type_id: TypeId) -> Self {
        PropertyInfo {
            name,
            type_id,
            optional: false,
            readonly: false,
        }
    }

    pub fn opt(name: Atom, type_id: TypeId) -> Self {
        PropertyInfo {
            optional: true,
            ..Self::new(name, type_id)
        }
    }

    pub fn readonly(name: Atom, type_id: TypeId) -> Self {
        PropertyInfo {
            readonly: true,
            ..Self::new(name, type_id)
        }
    }
}

/// Object shape: fields in declaration order plus an optional string index
/// signature.
///
/// Field order is kept for display only. Equality and hashing look at the
/// fields sorted by name, so `{a, b}` and `{b, a}` intern to the same id and
/// the first-interned order is the one shown.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ObjectShape {
    pub properties: Vec<PropertyInfo>,
    pub string_index: Option<TypeId>,
}

impl ObjectShape {
    pub fn new(properties: Vec<PropertyInfo>) -> Self {
        ObjectShape {
            properties,
            string_index: None,
        }
    }

    pub fn find(&self, name: Atom) -> Option<&PropertyInfo> {
        self.properties.iter().find(|p| p.name == name)
    }

    fn sorted(&self) -> Vec<&PropertyInfo> {
        let mut props: Vec<&PropertyInfo> = self.properties.iter().collect();
        props.sort_by_key(|p| p.name);
        props
    }
}

impl PartialEq for ObjectShape {
    fn eq(&self, other: &Self) -> bool {
        self.string_index == other.string_index
            && self.properties.len() == other.properties.len()
            && self.sorted() == other.sorted()
    }
}

impl Eq for ObjectShape {}

impl Hash for ObjectShape {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.string_index.hash(state);
        self.sorted().hash(state);
    }
}

/// Function signature: positional parameters and return type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionShape {
    pub params: Vec<TypeId>,
    pub return_type: TypeId,
}

/// A named, not-yet-bound generic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TypeParamInfo {
    pub name: Atom,
    pub constraint: Option<TypeId>,
    pub default: Option<TypeId>,
    /// Preserve literal types when this parameter is inferred.
    pub is_const: bool,
}

impl TypeParamInfo {
    pub fn new(name: Atom) -> Self {
        TypeParamInfo {
            name,
            constraint: None,
            default: None,
            is_const: false,
        }
    }
}

/// `check extends pattern ? true_type : false_type`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ConditionalType {
    pub check_type: TypeId,
    pub extends_type: TypeId,
    /// Names introduced by `infer X` inside `extends_type`.
    pub infer_params: Vec<Atom>,
    pub true_type: TypeId,
    pub false_type: TypeId,
    pub is_distributive: bool,
}

/// Modifier delta applied by a mapped type (`+?`, `-readonly`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub enum MappedModifier {
    Add,
    Remove,
}

impl MappedModifier {
    /// Apply the delta to a field's current flag.
    #[inline]
    pub fn apply(modifier: Option<MappedModifier>, current: bool) -> bool {
        match modifier {
            Some(MappedModifier::Add) => true,
            Some(MappedModifier::Remove) => false,
            None => current,
        }
    }
}

/// `{ [K in keyof source as name_type]: template }`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct MappedType {
    /// Name bound to each key's string literal while evaluating the parts below.
    pub key_param: Atom,
    pub source: TypeId,
    /// Keys for which this evaluates to `never` are dropped.
    pub key_filter: Option<TypeId>,
    pub template: TypeId,
    /// Key remap; must evaluate to a string literal.
    pub name_type: Option<TypeId>,
    pub optional_modifier: Option<MappedModifier>,
    pub readonly_modifier: Option<MappedModifier>,
}

/// One span of a template literal type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TemplateSpan {
    Text(Atom),
    Type(TypeId),
}

/// Built-in string transforms applied to literal types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub enum StringIntrinsicKind {
    Uppercase,
    Lowercase,
    Capitalize,
    Uncapitalize,
}

impl StringIntrinsicKind {
    pub fn name(self) -> &'static str {
        match self {
            StringIntrinsicKind::Uppercase => "Uppercase",
            StringIntrinsicKind::Lowercase => "Lowercase",
            StringIntrinsicKind::Capitalize => "Capitalize",
            StringIntrinsicKind::Uncapitalize => "Uncapitalize",
        }
    }

    pub fn apply(self, text: &str) -> String {
        match self {
            StringIntrinsicKind::Uppercase => text.to_uppercase(),
            StringIntrinsicKind::Lowercase => text.to_lowercase(),
            StringIntrinsicKind::Capitalize => {
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
            StringIntrinsicKind::Uncapitalize => {
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_lowercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TypeListId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TemplateListId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectShapeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionShapeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ConditionalTypeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct MappedTypeId(pub u32);

/// The structural key of an interned type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TypeData {
    Intrinsic(IntrinsicKind),
    Literal(LiteralValue),
    Object(ObjectShapeId),
    /// Members sorted by `TypeId` and deduplicated.
    Union(TypeListId),
    /// Members sorted by `TypeId` and deduplicated.
    Intersection(TypeListId),
    TypeParameter(TypeParamInfo),
    Conditional(ConditionalTypeId),
    Mapped(MappedTypeId),
    Function(FunctionShapeId),
    Array(TypeId),
    /// Named alias applied to type arguments.
    Reference(Atom, TypeListId),
    /// `object[key]`
    IndexAccess(TypeId, TypeId),
    TemplateLiteral(TemplateListId),
    StringIntrinsic {
        kind: StringIntrinsicKind,
        type_arg: TypeId,
    },
    Error,
}

impl TypeData {
    /// Nodes that only mean something after evaluation.
    pub fn is_meta(&self) -> bool {
        matches!(
            self,
            TypeData::Reference(..)
                | TypeData::Conditional(_)
                | TypeData::Mapped(_)
                | TypeData::IndexAccess(..)
                | TypeData::TemplateLiteral(_)
                | TypeData::StringIntrinsic { .. }
        )
    }
}

/// Where a diagnostic-relevant type or field came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OriginKey {
    Type(TypeId),
    Property(TypeId, Atom),
}

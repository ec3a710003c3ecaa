//! Type lowering: `TypeExpr` trees → `TypeId`
//!
//! `TypeExpr` is the host-facing vocabulary: a parsed type expression with
//! boxed children and an optional `SourceTag` on every node. Lowering interns
//! it, turning names of in-scope generics (alias parameters, `infer` names,
//! mapped key parameters) into `TypeParameter` nodes and every other name
//! into an alias `Reference`. Source tags are recorded in the interner's
//! origin table so diagnostics can point back at them.

use crate::context::AliasDef;
use crate::intern::TypeInterner;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use tracing::debug;
use tsr_common::interner::Atom;
use tsr_common::span::SourceTag;

/// Maximum number of type lowering operations to prevent runaway input.
pub const MAX_LOWERING_OPERATIONS: u32 = 100_000;

/// A parsed type expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceTag>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeExprKind {
    Intrinsic(IntrinsicKind),
    Literal(LiteralExpr),
    Object {
        fields: Vec<FieldExpr>,
        #[serde(default)]
        index_signature: Option<Box<TypeExpr>>,
    },
    Union(Vec<TypeExpr>),
    Intersection(Vec<TypeExpr>),
    Function {
        params: Vec<TypeExpr>,
        return_type: Box<TypeExpr>,
    },
    Array(Box<TypeExpr>),
    /// A name: an in-scope generic, `Array<T>`, a string intrinsic or an alias.
    Reference {
        name: String,
        #[serde(default)]
        args: Vec<TypeExpr>,
    },
    Conditional {
        check: Box<TypeExpr>,
        extends: Box<TypeExpr>,
        #[serde(default)]
        infer: Vec<String>,
        then_branch: Box<TypeExpr>,
        else_branch: Box<TypeExpr>,
        /// Defaults to "check is a bare generic".
        #[serde(default)]
        distributive: Option<bool>,
    },
    Mapped {
        key_param: String,
        source: Box<TypeExpr>,
        #[serde(default)]
        key_filter: Option<Box<TypeExpr>>,
        template: Box<TypeExpr>,
        #[serde(default)]
        name_type: Option<Box<TypeExpr>>,
        #[serde(default)]
        optional: Option<MappedModifier>,
        #[serde(default)]
        readonly: Option<MappedModifier>,
    },
    IndexAccess {
        object: Box<TypeExpr>,
        index: Box<TypeExpr>,
    },
    TemplateLiteral(Vec<TemplateExprSpan>),
    StringIntrinsic {
        kind: StringIntrinsicKind,
        argument: Box<TypeExpr>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LiteralExpr {
    String(String),
    Number(f64),
    Boolean(bool),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldExpr {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceTag>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateExprSpan {
    Text(String),
    Type(TypeExpr),
}

/// `<Name extends Constraint = Default>`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeParamExpr {
    pub name: String,
    #[serde(default)]
    pub constraint: Option<TypeExpr>,
    #[serde(default)]
    pub default: Option<TypeExpr>,
    #[serde(default)]
    pub is_const: bool,
}

impl TypeParamExpr {
    pub fn new(name: impl Into<String>) -> Self {
        TypeParamExpr {
            name: name.into(),
            constraint: None,
            default: None,
            is_const: false,
        }
    }
}

/// `type Name<Params> = Body`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AliasDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<TypeParamExpr>,
    pub body: TypeExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceTag>,
}

// Builders used by hosts and tests.
impl TypeExpr {
    pub fn new(kind: TypeExprKind) -> Self {
        TypeExpr {
            kind,
            location: None,
        }
    }

    #[must_use]
    pub fn at(mut self, location: SourceTag) -> Self {
        self.location = Some(location);
        self
    }

    pub fn intrinsic(kind: IntrinsicKind) -> Self {
        Self::new(TypeExprKind::Intrinsic(kind))
    }

    pub fn string() -> Self {
        Self::intrinsic(IntrinsicKind::String)
    }

    pub fn number() -> Self {
        Self::intrinsic(IntrinsicKind::Number)
    }

    pub fn boolean() -> Self {
        Self::intrinsic(IntrinsicKind::Boolean)
    }

    pub fn string_literal(value: impl Into<String>) -> Self {
        Self::new(TypeExprKind::Literal(LiteralExpr::String(value.into())))
    }

    pub fn number_literal(value: f64) -> Self {
        Self::new(TypeExprKind::Literal(LiteralExpr::Number(value)))
    }

    pub fn boolean_literal(value: bool) -> Self {
        Self::new(TypeExprKind::Literal(LiteralExpr::Boolean(value)))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::reference(name, Vec::new())
    }

    pub fn reference(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        Self::new(TypeExprKind::Reference {
            name: name.into(),
            args,
        })
    }

    pub fn object(fields: Vec<FieldExpr>) -> Self {
        Self::new(TypeExprKind::Object {
            fields,
            index_signature: None,
        })
    }

    pub fn union(members: Vec<TypeExpr>) -> Self {
        Self::new(TypeExprKind::Union(members))
    }

    pub fn intersection(members: Vec<TypeExpr>) -> Self {
        Self::new(TypeExprKind::Intersection(members))
    }

    pub fn array(element: TypeExpr) -> Self {
        Self::new(TypeExprKind::Array(Box::new(element)))
    }

    pub fn function(params: Vec<TypeExpr>, return_type: TypeExpr) -> Self {
        Self::new(TypeExprKind::Function {
            params,
            return_type: Box::new(return_type),
        })
    }

    pub fn index_access(object: TypeExpr, index: TypeExpr) -> Self {
        Self::new(TypeExprKind::IndexAccess {
            object: Box::new(object),
            index: Box::new(index),
        })
    }
}

impl FieldExpr {
    pub fn new(name: impl Into<String>, ty: TypeExpr) -> Self {
        FieldExpr {
            name: name.into(),
            ty,
            optional: false,
            readonly: false,
            location: None,
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn at(mut self, location: SourceTag) -> Self {
        self.location = Some(location);
        self
    }
}

/// Type lowering context.
/// Converts `TypeExpr` trees into interned `TypeId`s.
pub struct TypeLowering<'a> {
    interner: &'a TypeInterner,
    type_param_scopes: RefCell<Vec<Vec<(Atom, TypeId)>>>,
    operations: Cell<u32>,
    limit_exceeded: Cell<bool>,
}

impl<'a> TypeLowering<'a> {
    pub fn new(interner: &'a TypeInterner) -> Self {
        TypeLowering {
            interner,
            type_param_scopes: RefCell::new(Vec::new()),
            operations: Cell::new(0),
            limit_exceeded: Cell::new(false),
        }
    }

    pub fn is_limit_exceeded(&self) -> bool {
        self.limit_exceeded.get()
    }

    /// Lower an alias declaration; its parameters are in scope in the body.
    pub fn lower_alias(&self, decl: &AliasDecl) -> Arc<AliasDef> {
        let name = self.interner.intern_string(&decl.name);
        let (params, body) = self.with_type_params(&decl.params, |lowering, _| lowering.lower(&decl.body));
        Arc::new(AliasDef {
            name,
            params,
            body,
            origin: decl.location,
        })
    }

    /// Lower `params`, then run `f` with them in scope.
    pub fn with_type_params<T>(
        &self,
        params: &[TypeParamExpr],
        f: impl FnOnce(&Self, &[TypeParamInfo]) -> T,
    ) -> (Vec<TypeParamInfo>, T) {
        self.type_param_scopes.borrow_mut().push(Vec::with_capacity(params.len()));

        // Register names first so constraints may mention later parameters.
        let mut infos = Vec::with_capacity(params.len());
        for param in params {
            let info = TypeParamInfo::new(self.interner.intern_string(&param.name));
            self.bind_in_scope(info.name, self.interner.type_param(info));
            infos.push(info);
        }
        for (info, param) in infos.iter_mut().zip(params) {
            info.constraint = param.constraint.as_ref().map(|c| self.lower(c));
            info.default = param.default.as_ref().map(|d| self.lower(d));
            info.is_const = param.is_const;
        }
        // Rebind with the full info so constraints are visible at use sites.
        for info in &infos {
            self.bind_in_scope(info.name, self.interner.type_param(*info));
        }

        let result = f(self, &infos);
        self.type_param_scopes.borrow_mut().pop();
        (infos, result)
    }

    fn bind_in_scope(&self, name: Atom, type_id: TypeId) {
        let mut scopes = self.type_param_scopes.borrow_mut();
        if let Some(scope) = scopes.last_mut() {
            scope.retain(|(bound, _)| *bound != name);
            scope.push((name, type_id));
        }
    }

    fn lookup_type_param(&self, name: Atom) -> Option<TypeId> {
        let scopes = self.type_param_scopes.borrow();
        scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().find(|(bound, _)| *bound == name).map(|(_, id)| *id))
    }

    fn with_names<T>(&self, names: &[Atom], f: impl FnOnce() -> T) -> T {
        self.type_param_scopes.borrow_mut().push(Vec::with_capacity(names.len()));
        for &name in names {
            self.bind_in_scope(name, self.interner.type_param(TypeParamInfo::new(name)));
        }
        let result = f();
        self.type_param_scopes.borrow_mut().pop();
        result
    }

    fn bump_operations(&self) -> bool {
        let count = self.operations.get() + 1;
        self.operations.set(count);
        if count > MAX_LOWERING_OPERATIONS {
            if !self.limit_exceeded.replace(true) {
                debug!(limit = MAX_LOWERING_OPERATIONS, "type lowering limit exceeded");
            }
            return false;
        }
        true
    }

    /// Lower one expression.
    pub fn lower(&self, expr: &TypeExpr) -> TypeId {
        if !self.bump_operations() {
            return TypeId::ERROR;
        }
        let type_id = self.lower_kind(&expr.kind);
        if let Some(tag) = expr.location {
            self.interner.record_origin(OriginKey::Type(type_id), tag);
        }
        type_id
    }

    fn lower_all(&self, exprs: &[TypeExpr]) -> Vec<TypeId> {
        exprs.iter().map(|expr| self.lower(expr)).collect()
    }

    fn lower_kind(&self, kind: &TypeExprKind) -> TypeId {
        let interner = self.interner;
        match kind {
            TypeExprKind::Intrinsic(kind) => kind.to_type_id(),
            TypeExprKind::Literal(LiteralExpr::String(value)) => interner.literal_string(value),
            TypeExprKind::Literal(LiteralExpr::Number(value)) => interner.literal_number(*value),
            TypeExprKind::Literal(LiteralExpr::Boolean(value)) => interner.literal_boolean(*value),
            TypeExprKind::Object {
                fields,
                index_signature,
            } => self.lower_object(fields, index_signature.as_deref()),
            TypeExprKind::Union(members) => interner.union_raw(self.lower_all(members)),
            TypeExprKind::Intersection(members) => {
                interner.intersection_raw(self.lower_all(members))
            }
            TypeExprKind::Function {
                params,
                return_type,
            } => {
                let params = self.lower_all(params);
                interner.function(params, self.lower(return_type))
            }
            TypeExprKind::Array(element) => interner.array(self.lower(element)),
            TypeExprKind::Reference { name, args } => self.lower_reference(name, args),
            TypeExprKind::Conditional {
                check,
                extends,
                infer,
                then_branch,
                else_branch,
                distributive,
            } => {
                let check_type = self.lower(check);
                let is_distributive = distributive.unwrap_or_else(|| {
                    matches!(interner.lookup(check_type), Some(TypeData::TypeParameter(_)))
                });
                let infer_params: Vec<Atom> =
                    infer.iter().map(|name| interner.intern_string(name)).collect();
                let (extends_type, true_type, false_type) = self.with_names(&infer_params, || {
                    (
                        self.lower(extends),
                        self.lower(then_branch),
                        self.lower(else_branch),
                    )
                });
                interner.conditional(ConditionalType {
                    check_type,
                    extends_type,
                    infer_params,
                    true_type,
                    false_type,
                    is_distributive,
                })
            }
            TypeExprKind::Mapped {
                key_param,
                source,
                key_filter,
                template,
                name_type,
                optional,
                readonly,
            } => {
                let key_param = interner.intern_string(key_param);
                let source = self.lower(source);
                let (key_filter, template, name_type) = self.with_names(&[key_param], || {
                    (
                        key_filter.as_deref().map(|f| self.lower(f)),
                        self.lower(template),
                        name_type.as_deref().map(|n| self.lower(n)),
                    )
                });
                interner.mapped(MappedType {
                    key_param,
                    source,
                    key_filter,
                    template,
                    name_type,
                    optional_modifier: *optional,
                    readonly_modifier: *readonly,
                })
            }
            TypeExprKind::IndexAccess { object, index } => {
                interner.index_access(self.lower(object), self.lower(index))
            }
            TypeExprKind::TemplateLiteral(spans) => {
                let spans = spans
                    .iter()
                    .map(|span| match span {
                        TemplateExprSpan::Text(text) => {
                            TemplateSpan::Text(interner.intern_string(text))
                        }
                        TemplateExprSpan::Type(expr) => TemplateSpan::Type(self.lower(expr)),
                    })
                    .collect();
                interner.template_literal(spans)
            }
            TypeExprKind::StringIntrinsic { kind, argument } => {
                interner.string_intrinsic(*kind, self.lower(argument))
            }
        }
    }

    fn lower_object(&self, fields: &[FieldExpr], index_signature: Option<&TypeExpr>) -> TypeId {
        let interner = self.interner;
        let mut properties: Vec<PropertyInfo> = Vec::with_capacity(fields.len());
        for field in fields {
            let name = interner.intern_string(&field.name);
            let prop = PropertyInfo {
                name,
                type_id: self.lower(&field.ty),
                optional: field.optional,
                readonly: field.readonly,
            };
            // A repeated field keeps its first position and last type.
            match properties.iter_mut().find(|existing| existing.name == name) {
                Some(existing) => *existing = prop,
                None => properties.push(prop),
            }
        }
        let string_index = index_signature.map(|index| self.lower(index));
        let object = interner.object_with_index(ObjectShape {
            properties,
            string_index,
        });
        for field in fields {
            if let Some(tag) = field.location.or(field.ty.location) {
                let name = interner.intern_string(&field.name);
                interner.record_origin(OriginKey::Property(object, name), tag);
            }
        }
        object
    }

    fn lower_reference(&self, name: &str, args: &[TypeExpr]) -> TypeId {
        let interner = self.interner;
        let atom = interner.intern_string(name);
        if args.is_empty()
            && let Some(param) = self.lookup_type_param(atom)
        {
            return param;
        }
        match (name, args) {
            ("Array", [element]) => return interner.array(self.lower(element)),
            ("Uppercase", [arg]) => {
                return interner.string_intrinsic(StringIntrinsicKind::Uppercase, self.lower(arg));
            }
            ("Lowercase", [arg]) => {
                return interner.string_intrinsic(StringIntrinsicKind::Lowercase, self.lower(arg));
            }
            ("Capitalize", [arg]) => {
                return interner.string_intrinsic(StringIntrinsicKind::Capitalize, self.lower(arg));
            }
            ("Uncapitalize", [arg]) => {
                return interner
                    .string_intrinsic(StringIntrinsicKind::Uncapitalize, self.lower(arg));
            }
            _ => {}
        }
        let args = self.lower_all(args);
        interner.reference(atom, args)
    }
}

#[cfg(test)]
#[path = "tests/lower_tests.rs"]
mod tests;

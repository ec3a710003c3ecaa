//! Type formatting for diagnostic messages.

use crate::intern::TypeInterner;
use crate::types::*;
use std::fmt::Write;

const MAX_FORMAT_DEPTH: u32 = 12;

/// Renders a `TypeId` as readable text.
pub struct TypeFormatter<'a> {
    interner: &'a TypeInterner,
    depth: u32,
}

impl<'a> TypeFormatter<'a> {
    pub fn new(interner: &'a TypeInterner) -> Self {
        TypeFormatter { interner, depth: 0 }
    }

    pub fn format(&mut self, type_id: TypeId) -> String {
        if self.depth >= MAX_FORMAT_DEPTH {
            return "...".to_string();
        }
        self.depth += 1;
        let text = self.format_inner(type_id);
        self.depth -= 1;
        text
    }

    fn format_inner(&mut self, type_id: TypeId) -> String {
        let Some(key) = self.interner.lookup(type_id) else {
            return "error".to_string();
        };
        match key {
            TypeData::Intrinsic(kind) => kind.name().to_string(),
            TypeData::Error => "error".to_string(),
            TypeData::Literal(value) => self.format_literal(value),
            TypeData::Object(shape_id) => {
                let shape = self.interner.object_shape(shape_id);
                if shape.properties.is_empty() && shape.string_index.is_none() {
                    return "{}".to_string();
                }
                let mut parts = Vec::with_capacity(shape.properties.len() + 1);
                if let Some(index) = shape.string_index {
                    parts.push(format!("[key: string]: {}", self.format(index)));
                }
                for prop in &shape.properties {
                    let mut part = String::new();
                    if prop.readonly {
                        part.push_str("readonly ");
                    }
                    part.push_str(&self.interner.resolve_atom_ref(prop.name));
                    if prop.optional {
                        part.push('?');
                    }
                    let _ = write!(part, ": {}", self.format(prop.type_id));
                    parts.push(part);
                }
                format!("{{ {} }}", parts.join("; "))
            }
            TypeData::Union(list_id) => self.format_list(list_id, " | "),
            TypeData::Intersection(list_id) => self.format_list(list_id, " & "),
            TypeData::TypeParameter(info) => self.interner.resolve_atom(info.name),
            TypeData::Conditional(cond_id) => {
                let cond = self.interner.conditional_type(cond_id);
                format!(
                    "{} extends {} ? {} : {}",
                    self.format(cond.check_type),
                    self.format(cond.extends_type),
                    self.format(cond.true_type),
                    self.format(cond.false_type)
                )
            }
            TypeData::Mapped(mapped_id) => {
                let mapped = self.interner.mapped_type(mapped_id);
                let key = self.interner.resolve_atom(mapped.key_param);
                let readonly = match mapped.readonly_modifier {
                    Some(MappedModifier::Add) => "readonly ",
                    Some(MappedModifier::Remove) => "-readonly ",
                    None => "",
                };
                let optional = match mapped.optional_modifier {
                    Some(MappedModifier::Add) => "?",
                    Some(MappedModifier::Remove) => "-?",
                    None => "",
                };
                let remap = match mapped.name_type {
                    Some(name_type) => format!(" as {}", self.format(name_type)),
                    None => String::new(),
                };
                format!(
                    "{{ {readonly}[{key} in keyof {}{remap}]{optional}: {} }}",
                    self.format(mapped.source),
                    self.format(mapped.template)
                )
            }
            TypeData::Function(shape_id) => {
                let shape = self.interner.function_shape(shape_id);
                let params: Vec<String> = shape
                    .params
                    .iter()
                    .enumerate()
                    .map(|(i, &param)| format!("arg{i}: {}", self.format(param)))
                    .collect();
                format!("({}) => {}", params.join(", "), self.format(shape.return_type))
            }
            TypeData::Array(element) => {
                let inner = self.format(element);
                if matches!(
                    self.interner.lookup(element),
                    Some(TypeData::Union(_) | TypeData::Intersection(_) | TypeData::Function(_))
                ) {
                    format!("({inner})[]")
                } else {
                    format!("{inner}[]")
                }
            }
            TypeData::Reference(name, args) => {
                let name = self.interner.resolve_atom(name);
                let args = self.interner.type_list(args);
                if args.is_empty() {
                    return name;
                }
                let args: Vec<String> = args.iter().map(|&arg| self.format(arg)).collect();
                format!("{name}<{}>", args.join(", "))
            }
            TypeData::IndexAccess(object, key) => {
                format!("{}[{}]", self.format(object), self.format(key))
            }
            TypeData::TemplateLiteral(list_id) => {
                let mut text = String::from("`");
                for span in self.interner.template_list(list_id).iter() {
                    match *span {
                        TemplateSpan::Text(atom) => text.push_str(&self.interner.resolve_atom_ref(atom)),
                        TemplateSpan::Type(inner) => {
                            let _ = write!(text, "${{{}}}", self.format(inner));
                        }
                    }
                }
                text.push('`');
                text
            }
            TypeData::StringIntrinsic { kind, type_arg } => {
                format!("{}<{}>", kind.name(), self.format(type_arg))
            }
        }
    }

    fn format_literal(&self, value: LiteralValue) -> String {
        match value {
            LiteralValue::String(atom) => format!("\"{}\"", self.interner.resolve_atom_ref(atom)),
            LiteralValue::Number(n) => format_number(n.0),
            LiteralValue::Boolean(b) => b.to_string(),
        }
    }

    fn format_list(&mut self, list_id: TypeListId, separator: &str) -> String {
        let members = self.interner.type_list(list_id);
        let parts: Vec<String> = members
            .iter()
            .map(|&member| {
                let text = self.format(member);
                if matches!(
                    self.interner.lookup(member),
                    Some(TypeData::Union(_) | TypeData::Intersection(_) | TypeData::Function(_))
                ) {
                    format!("({text})")
                } else {
                    text
                }
            })
            .collect();
        parts.join(separator)
    }
}

/// Render a number the way it appears in source (`1`, not `1.0`).
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{}", value as i64)
    } else if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else {
        format!("{value}")
    }
}

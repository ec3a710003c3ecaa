//! Mapped type evaluation.
//!
//! `{ [K in keyof T as N]: V }` over an object source, keeping the source's
//! property order and modifiers unless the mapped type overrides them.

use crate::context::{Cancelled, TypeResolver};
use crate::instantiate::{TypeSubstitution, instantiate_type};
use crate::type_queries::string_literal;
use crate::types::*;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use tracing::{Level, span, trace};
use tsr_common::diagnostics::{Diagnostic, DiagnosticKind};
use tsr_common::interner::Atom;

use super::super::evaluate::TypeEvaluator;

/// An output property and the source key that produced it.
struct MappedEntry {
    property: PropertyInfo,
    source_key: Atom,
}

impl<'a, R: TypeResolver> TypeEvaluator<'a, R> {
    /// Resolve an already-instantiated mapped node.
    pub(crate) fn resolve_mapped(
        &mut self,
        type_id: TypeId,
        mapped: &MappedType,
    ) -> Result<TypeId, Cancelled> {
        let _span = span!(Level::TRACE, "mapped", type_id = type_id.0).entered();
        let interner = self.interner();
        let source = self.evaluate(mapped.source)?;

        match interner.lookup(source) {
            Some(TypeData::Union(list_id)) => {
                let members = interner.type_list(list_id);
                let mut results = Vec::with_capacity(members.len());
                for &member in members.iter() {
                    let split = interner.mapped(MappedType {
                        source: member,
                        ..mapped.clone()
                    });
                    results.push(self.evaluate(split)?);
                }
                Ok(self.normalize_union(results))
            }
            Some(TypeData::Object(shape_id)) => {
                let shape = interner.object_shape(shape_id);
                self.map_object_fields(mapped, source, &shape)
            }
            Some(
                TypeData::Intrinsic(_)
                | TypeData::Literal(_)
                | TypeData::Array(_)
                | TypeData::Function(_)
                | TypeData::Error,
            )
            | None => Ok(source),
            _ => {
                trace!("mapped type deferred on generic source");
                if source == mapped.source {
                    Ok(type_id)
                } else {
                    Ok(interner.mapped(MappedType {
                        source,
                        ..mapped.clone()
                    }))
                }
            }
        }
    }

    fn map_object_fields(
        &mut self,
        mapped: &MappedType,
        source: TypeId,
        shape: &ObjectShape,
    ) -> Result<TypeId, Cancelled> {
        let interner = self.interner();
        let mut entries: IndexMap<Atom, MappedEntry, FxBuildHasher> = IndexMap::default();

        for prop in &shape.properties {
            self.check_cancelled()?;
            let mut subst = TypeSubstitution::new();
            subst.insert(mapped.key_param, interner.literal_string_atom(prop.name));

            if let Some(filter) = mapped.key_filter {
                let kept = self.evaluate(instantiate_type(interner, filter, &subst))?;
                if kept == TypeId::NEVER {
                    trace!(key = prop.name.0, "key filtered out");
                    continue;
                }
            }

            let name = match mapped.name_type {
                None => prop.name,
                Some(name_type) => {
                    let remapped = self.evaluate(instantiate_type(interner, name_type, &subst))?;
                    if remapped == TypeId::NEVER {
                        continue;
                    }
                    string_literal(interner, remapped).unwrap_or(prop.name)
                }
            };

            let value = self.evaluate(instantiate_type(interner, mapped.template, &subst))?;
            let property = PropertyInfo {
                name,
                type_id: value,
                optional: MappedModifier::apply(mapped.optional_modifier, prop.optional),
                readonly: MappedModifier::apply(mapped.readonly_modifier, prop.readonly),
            };

            if let Some(existing) = entries.get(&name) {
                let previous = existing.source_key;
                self.report_key_collision(source, previous, prop.name, name);
            }
            // Later keys win; the first one keeps its position.
            entries.insert(
                name,
                MappedEntry {
                    property,
                    source_key: prop.name,
                },
            );
        }

        let string_index = match shape.string_index {
            Some(_) if mapped.name_type.is_none() => {
                let mut subst = TypeSubstitution::new();
                subst.insert(mapped.key_param, TypeId::STRING);
                Some(self.evaluate(instantiate_type(interner, mapped.template, &subst))?)
            }
            _ => None,
        };

        let properties: Vec<PropertyInfo> =
            entries.values().map(|entry| entry.property.clone()).collect();
        let result = interner.object_with_index(ObjectShape {
            properties,
            string_index,
        });
        for (&name, entry) in &entries {
            if let Some(tag) = interner.property_origin(source, entry.source_key) {
                interner.record_origin(OriginKey::Property(result, name), tag);
            }
        }
        Ok(result)
    }

    fn report_key_collision(&mut self, source: TypeId, first: Atom, second: Atom, target: Atom) {
        let interner = self.interner();
        let first_text = interner.resolve_atom(first);
        let second_text = interner.resolve_atom(second);
        let target_text = interner.resolve_atom(target);
        trace!(key = %target_text, "mapped key collision");
        let mut diagnostic = Diagnostic::new(
            DiagnosticKind::KeyRemapCollision,
            &[&first_text, &second_text, &target_text],
        )
        .at(interner.property_origin(source, second));
        if let Some(tag) = interner.property_origin(source, first) {
            diagnostic =
                diagnostic.with_related(Some(tag), format!("'{first_text}' is declared here."));
        }
        self.report(diagnostic);
    }
}

//! Index access evaluation: `T[K]`.

use crate::context::{Cancelled, TypeResolver};
use crate::type_queries::contains_type_parameters;
use crate::types::*;
use tracing::trace;

use super::super::evaluate::TypeEvaluator;

impl<'a, R: TypeResolver> TypeEvaluator<'a, R> {
    pub(crate) fn evaluate_index_access(
        &mut self,
        type_id: TypeId,
        object: TypeId,
        key: TypeId,
    ) -> Result<TypeId, Cancelled> {
        let interner = self.interner();
        let object_eval = self.evaluate(object)?;
        let key_eval = self.evaluate(key)?;

        if object_eval == TypeId::ANY {
            return Ok(TypeId::ANY);
        }
        if key_eval == TypeId::NEVER {
            return Ok(TypeId::NEVER);
        }

        // Distribute over union keys, then over union objects.
        if let Some(TypeData::Union(list_id)) = interner.lookup(key_eval) {
            let keys = interner.type_list(list_id);
            let mut results = Vec::with_capacity(keys.len());
            for &member in keys.iter() {
                let access = interner.index_access(object_eval, member);
                results.push(self.evaluate(access)?);
            }
            return Ok(self.normalize_union(results));
        }

        match interner.lookup(object_eval) {
            Some(TypeData::Union(list_id)) => {
                let objects = interner.type_list(list_id);
                let mut results = Vec::with_capacity(objects.len());
                for &member in objects.iter() {
                    let access = interner.index_access(member, key_eval);
                    results.push(self.evaluate(access)?);
                }
                Ok(self.normalize_union(results))
            }
            Some(TypeData::Intersection(list_id)) => {
                let objects = interner.type_list(list_id);
                let mut results = Vec::new();
                for &member in objects.iter() {
                    let access = interner.index_access(member, key_eval);
                    let found = self.evaluate(access)?;
                    if found != TypeId::UNKNOWN {
                        results.push(found);
                    }
                }
                if results.is_empty() {
                    return Ok(TypeId::UNKNOWN);
                }
                let site = self.origin(type_id);
                Ok(self.normalize_intersection(results, site))
            }
            Some(TypeData::Object(shape_id)) => {
                let shape = interner.object_shape(shape_id);
                match interner.lookup(key_eval) {
                    Some(TypeData::Literal(LiteralValue::String(name))) => Ok(shape
                        .find(name)
                        .map(|prop| prop.type_id)
                        .or(shape.string_index)
                        .unwrap_or(TypeId::UNKNOWN)),
                    _ if key_eval == TypeId::STRING => {
                        Ok(shape.string_index.unwrap_or(TypeId::UNKNOWN))
                    }
                    _ if contains_type_parameters(interner, key_eval) => {
                        Ok(self.deferred_index_access(type_id, object, key, object_eval, key_eval))
                    }
                    _ => {
                        trace!(key = key_eval.0, "no property for index access");
                        Ok(TypeId::UNKNOWN)
                    }
                }
            }
            Some(TypeData::Array(element)) => {
                let is_number_key = key_eval == TypeId::NUMBER
                    || matches!(
                        interner.lookup(key_eval),
                        Some(TypeData::Literal(LiteralValue::Number(_)))
                    );
                if is_number_key {
                    return Ok(element);
                }
                if let Some(TypeData::Literal(LiteralValue::String(name))) =
                    interner.lookup(key_eval)
                    && interner.resolve_atom_ref(name).as_ref() == "length"
                {
                    return Ok(TypeId::NUMBER);
                }
                if contains_type_parameters(interner, key_eval) {
                    return Ok(self.deferred_index_access(type_id, object, key, object_eval, key_eval));
                }
                Ok(TypeId::UNKNOWN)
            }
            _ if contains_type_parameters(interner, object_eval)
                || contains_type_parameters(interner, key_eval) =>
            {
                Ok(self.deferred_index_access(type_id, object, key, object_eval, key_eval))
            }
            _ => Ok(TypeId::UNKNOWN),
        }
    }

    fn deferred_index_access(
        &mut self,
        type_id: TypeId,
        object: TypeId,
        key: TypeId,
        object_eval: TypeId,
        key_eval: TypeId,
    ) -> TypeId {
        if object == object_eval && key == key_eval {
            type_id
        } else {
            self.interner().index_access(object_eval, key_eval)
        }
    }
}

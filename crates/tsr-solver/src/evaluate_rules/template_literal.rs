//! Template literal and string intrinsic evaluation.
//!
//! A template whose holes are all literal (or unions of literals) collapses
//! to a string literal, or to a union of them. Anything else keeps the
//! template with its holes evaluated.

use crate::context::{Cancelled, TypeResolver};
use crate::format::format_number;
use crate::types::*;
use tracing::trace;
use tsr_common::limits::{MAX_DISTRIBUTION_SIZE, MAX_TEMPLATE_LITERAL_LENGTH};

use super::super::evaluate::TypeEvaluator;

impl<'a, R: TypeResolver> TypeEvaluator<'a, R> {
    pub(crate) fn evaluate_template_literal(
        &mut self,
        type_id: TypeId,
        list_id: TemplateListId,
    ) -> Result<TypeId, Cancelled> {
        let interner = self.interner();
        let spans = interner.template_list(list_id);

        let mut evaluated = Vec::with_capacity(spans.len());
        let mut texts: Option<Vec<String>> = Some(vec![String::new()]);
        let mut changed = false;

        for span in spans.iter() {
            match *span {
                TemplateSpan::Text(atom) => {
                    evaluated.push(TemplateSpan::Text(atom));
                    if let Some(combos) = texts.as_mut() {
                        let text = interner.resolve_atom_ref(atom);
                        for combo in combos.iter_mut() {
                            combo.push_str(&text);
                        }
                    }
                }
                TemplateSpan::Type(inner) => {
                    let value = self.evaluate(inner)?;
                    if value == TypeId::NEVER {
                        return Ok(TypeId::NEVER);
                    }
                    changed |= value != inner;
                    evaluated.push(TemplateSpan::Type(value));
                    texts = match (texts, self.literal_texts(value)) {
                        (Some(combos), Some(options))
                            if combos.len() * options.len() <= MAX_DISTRIBUTION_SIZE =>
                        {
                            let mut next = Vec::with_capacity(combos.len() * options.len());
                            for combo in &combos {
                                for option in &options {
                                    next.push(format!("{combo}{option}"));
                                }
                            }
                            Some(next)
                        }
                        _ => None,
                    };
                }
            }
        }

        if let Some(combos) = texts
            && combos.iter().all(|text| text.len() <= MAX_TEMPLATE_LITERAL_LENGTH)
        {
            trace!(count = combos.len(), "template literal collapsed");
            let literals = combos
                .iter()
                .map(|text| interner.literal_string(text))
                .collect();
            return Ok(self.normalize_union(literals));
        }

        if !changed {
            return Ok(type_id);
        }
        Ok(interner.template_literal(evaluated))
    }

    /// The texts a hole can take, when they are finitely many.
    fn literal_texts(&self, type_id: TypeId) -> Option<Vec<String>> {
        let interner = self.interner();
        match type_id {
            TypeId::BOOLEAN => return Some(vec!["false".to_string(), "true".to_string()]),
            TypeId::NULL => return Some(vec!["null".to_string()]),
            TypeId::UNDEFINED => return Some(vec!["undefined".to_string()]),
            _ => {}
        }
        match interner.lookup(type_id)? {
            TypeData::Literal(LiteralValue::String(atom)) => Some(vec![interner.resolve_atom(atom)]),
            TypeData::Literal(LiteralValue::Number(n)) => Some(vec![format_number(n.0)]),
            TypeData::Literal(LiteralValue::Boolean(b)) => Some(vec![b.to_string()]),
            TypeData::Union(list_id) => {
                let mut all = Vec::new();
                for &member in interner.type_list(list_id).iter() {
                    all.extend(self.literal_texts(member)?);
                }
                Some(all)
            }
            _ => None,
        }
    }

    pub(crate) fn evaluate_string_intrinsic(
        &mut self,
        type_id: TypeId,
        kind: StringIntrinsicKind,
        type_arg: TypeId,
    ) -> Result<TypeId, Cancelled> {
        let interner = self.interner();
        let arg = self.evaluate(type_arg)?;
        match interner.lookup(arg) {
            Some(TypeData::Literal(LiteralValue::String(atom))) => {
                let text = interner.resolve_atom_ref(atom);
                Ok(interner.literal_string(&kind.apply(&text)))
            }
            Some(TypeData::Union(list_id)) => {
                let members = interner.type_list(list_id);
                let mut results = Vec::with_capacity(members.len());
                for &member in members.iter() {
                    let applied = interner.string_intrinsic(kind, member);
                    results.push(self.evaluate(applied)?);
                }
                Ok(self.normalize_union(results))
            }
            _ if arg == TypeId::NEVER => Ok(TypeId::NEVER),
            _ if arg == TypeId::ANY => Ok(TypeId::ANY),
            _ if arg == type_arg => Ok(type_id),
            _ => Ok(interner.string_intrinsic(kind, arg)),
        }
    }
}

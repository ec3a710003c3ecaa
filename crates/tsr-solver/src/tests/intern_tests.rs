use super::*;
use crate::types::*;
use tsr_common::span::SourceTag;

#[test]
fn test_interner_intrinsics() {
    let interner = TypeInterner::new();

    assert!(interner.lookup(TypeId::STRING).is_some());
    assert!(interner.lookup(TypeId::NUMBER).is_some());
    assert!(interner.lookup(TypeId::ANY).is_some());
    assert_eq!(interner.intrinsic(IntrinsicKind::String), TypeId::STRING);
    assert_eq!(
        interner.intern(TypeData::Intrinsic(IntrinsicKind::Never)),
        TypeId::NEVER
    );
    assert!(interner.is_empty());
}

#[test]
fn test_interner_deduplication() {
    let interner = TypeInterner::new();

    let id1 = interner.literal_string("hello");
    let id2 = interner.literal_string("hello");
    let id3 = interner.literal_string("world");

    assert_eq!(id1, id2);
    assert_ne!(id1, id3);
    assert!(!id1.is_intrinsic());
}

#[test]
fn test_interner_boolean_literals_are_reserved() {
    let interner = TypeInterner::new();

    assert_eq!(interner.literal_boolean(true), TypeId::BOOLEAN_TRUE);
    assert_eq!(interner.literal_boolean(false), TypeId::BOOLEAN_FALSE);
    assert_eq!(
        interner.lookup(TypeId::BOOLEAN_TRUE),
        Some(TypeData::Literal(LiteralValue::Boolean(true)))
    );
}

#[test]
fn test_interner_negative_zero_matches_zero() {
    let interner = TypeInterner::new();

    assert_eq!(interner.literal_number(0.0), interner.literal_number(-0.0));
    assert_ne!(interner.literal_number(1.0), interner.literal_number(2.0));
}

#[test]
fn test_interner_object_identity_ignores_property_order() {
    let interner = TypeInterner::new();
    let a = interner.intern_string("a");
    let b = interner.intern_string("b");

    let first = interner.object(vec![
        PropertyInfo::new(a, TypeId::STRING),
        PropertyInfo::new(b, TypeId::NUMBER),
    ]);
    let second = interner.object(vec![
        PropertyInfo::new(b, TypeId::NUMBER),
        PropertyInfo::new(a, TypeId::STRING),
    ]);

    assert_eq!(first, second);
}

#[test]
fn test_interner_object_modifiers_are_structural() {
    let interner = TypeInterner::new();
    let a = interner.intern_string("a");

    let required = interner.object(vec![PropertyInfo::new(a, TypeId::STRING)]);
    let optional = interner.object(vec![PropertyInfo::opt(a, TypeId::STRING)]);
    let readonly = interner.object(vec![PropertyInfo::readonly(a, TypeId::STRING)]);

    assert_ne!(required, optional);
    assert_ne!(required, readonly);
    assert_ne!(optional, readonly);
}

#[test]
fn test_interner_union_is_order_independent() {
    let interner = TypeInterner::new();
    let hello = interner.literal_string("hello");

    let ab = interner.union(vec![hello, TypeId::NUMBER]);
    let ba = interner.union(vec![TypeId::NUMBER, hello]);

    assert_eq!(ab, ba);
    match interner.lookup(ab) {
        Some(TypeData::Union(list_id)) => assert_eq!(interner.type_list(list_id).len(), 2),
        other => panic!("expected union, got {other:?}"),
    }
}

#[test]
fn test_interner_single_member_union_collapses() {
    let interner = TypeInterner::new();

    assert_eq!(interner.union(vec![TypeId::STRING]), TypeId::STRING);
    assert_eq!(interner.union(vec![]), TypeId::NEVER);
    assert_eq!(interner.union_raw(vec![TypeId::STRING, TypeId::STRING]), TypeId::STRING);
    assert_eq!(interner.intersection_raw(vec![]), TypeId::UNKNOWN);
}

#[test]
fn test_interner_template_literal_merges_text() {
    let interner = TypeInterner::new();
    let get = interner.intern_string("get");
    let name = interner.intern_string("Name");

    let all_text = interner.template_literal(vec![TemplateSpan::Text(get), TemplateSpan::Text(name)]);
    assert_eq!(all_text, interner.literal_string("getName"));

    let with_hole = interner.template_literal(vec![
        TemplateSpan::Text(get),
        TemplateSpan::Type(TypeId::STRING),
    ]);
    let same = interner.template_literal(vec![
        TemplateSpan::Text(interner.intern_string("ge")),
        TemplateSpan::Text(interner.intern_string("t")),
        TemplateSpan::Type(TypeId::STRING),
    ]);
    assert_eq!(with_hole, same);

    assert_eq!(interner.template_literal(vec![]), interner.literal_string(""));
}

#[test]
fn test_interner_type_param_identity_includes_constraint() {
    let interner = TypeInterner::new();
    let t = interner.intern_string("T");

    let plain = interner.type_param(TypeParamInfo::new(t));
    let constrained = interner.type_param(TypeParamInfo {
        constraint: Some(TypeId::STRING),
        ..TypeParamInfo::new(t)
    });

    assert_eq!(plain, interner.type_param_named("T"));
    assert_ne!(plain, constrained);
}

#[test]
fn test_interner_origins_first_writer_wins() {
    let interner = TypeInterner::new();
    let id = interner.literal_string("x");
    let first = SourceTag::new(1, 10, 3);
    let second = SourceTag::new(2, 20, 3);

    assert_eq!(interner.type_origin(id), None);
    interner.record_origin(OriginKey::Type(id), first);
    interner.record_origin(OriginKey::Type(id), second);
    assert_eq!(interner.type_origin(id), Some(first));
}

#[test]
fn test_interner_origins_do_not_affect_identity() {
    let interner = TypeInterner::new();
    let a = interner.intern_string("a");
    let object = interner.object(vec![PropertyInfo::new(a, TypeId::STRING)]);
    interner.record_origin(OriginKey::Property(object, a), SourceTag::new(0, 4, 1));

    let again = interner.object(vec![PropertyInfo::new(a, TypeId::STRING)]);
    assert_eq!(object, again);
    assert_eq!(interner.property_origin(again, a), Some(SourceTag::new(0, 4, 1)));
}

#[test]
fn test_interner_lookup_unknown_id() {
    let interner = TypeInterner::new();

    assert_eq!(interner.lookup(TypeId(TypeId::FIRST_USER + 5000)), None);
    assert_eq!(interner.lookup(TypeId(50)), None);
}

#[test]
fn test_interner_len_counts_user_types() {
    let interner = TypeInterner::new();
    let before = interner.len();

    interner.literal_string("one");
    interner.literal_string("two");
    interner.literal_string("one");

    assert_eq!(interner.len(), before + 2);
    assert!(!interner.is_empty());
}

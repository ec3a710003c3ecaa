use super::*;
use crate::context::TypeEnvironment;
use crate::types::*;
use tsr_common::diagnostics::DiagnosticCategory;

/// `{ kind: "circle", radius: number } | { kind: "square", side: number }`
fn shapes(interner: &TypeInterner) -> (TypeId, TypeId, TypeId) {
    let kind = interner.intern_string("kind");
    let circle = interner.object(vec![
        PropertyInfo::new(kind, interner.literal_string("circle")),
        PropertyInfo::new(interner.intern_string("radius"), TypeId::NUMBER),
    ]);
    let square = interner.object(vec![
        PropertyInfo::new(kind, interner.literal_string("square")),
        PropertyInfo::new(interner.intern_string("side"), TypeId::NUMBER),
    ]);
    (interner.union(vec![circle, square]), circle, square)
}

#[test]
fn test_typeof_splits_primitives() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let value = interner.union(vec![TypeId::STRING, TypeId::NUMBER, TypeId::UNDEFINED]);
    let guard = TypeGuard::Typeof(TypeofKind::String);

    assert_eq!(ctx.narrow(value, &guard, Branch::True), TypeId::STRING);
    assert_eq!(
        ctx.narrow(value, &guard, Branch::False),
        interner.union(vec![TypeId::NUMBER, TypeId::UNDEFINED])
    );
}

#[test]
fn test_typeof_keeps_literals() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let a = interner.literal_string("a");
    let one = interner.literal_number(1.0);
    let value = interner.union(vec![a, one]);

    assert_eq!(ctx.narrow(value, &TypeGuard::Typeof(TypeofKind::Number), Branch::True), one);
    assert_eq!(ctx.narrow(value, &TypeGuard::Typeof(TypeofKind::Number), Branch::False), a);
}

#[test]
fn test_typeof_object_includes_null() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let obj = interner.object(vec![PropertyInfo::new(interner.intern_string("a"), TypeId::STRING)]);
    let func = interner.function(vec![], TypeId::VOID);
    let value = interner.union(vec![obj, func, TypeId::STRING, TypeId::NULL]);
    let guard = TypeGuard::Typeof(TypeofKind::Object);

    assert_eq!(ctx.narrow(value, &guard, Branch::True), interner.union(vec![obj, TypeId::NULL]));
    assert_eq!(
        ctx.narrow(value, &guard, Branch::False),
        interner.union(vec![func, TypeId::STRING])
    );
    assert_eq!(
        ctx.narrow(value, &TypeGuard::Typeof(TypeofKind::Function), Branch::True),
        func
    );
}

#[test]
fn test_typeof_on_unknown() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);

    assert_eq!(
        ctx.narrow(TypeId::UNKNOWN, &TypeGuard::Typeof(TypeofKind::String), Branch::True),
        TypeId::STRING
    );
    assert_eq!(
        ctx.narrow(TypeId::UNKNOWN, &TypeGuard::Typeof(TypeofKind::String), Branch::False),
        TypeId::UNKNOWN
    );
    assert_eq!(
        ctx.narrow(TypeId::ANY, &TypeGuard::Typeof(TypeofKind::Object), Branch::True),
        interner.union(vec![interner.object(vec![]), TypeId::NULL])
    );
}

#[test]
fn test_typeof_kind_names() {
    assert_eq!(TypeofKind::from_name("boolean"), Some(TypeofKind::Boolean));
    assert_eq!(TypeofKind::from_name("bigint"), None);
    assert_eq!(TypeofKind::Function.name(), "function");
    assert_eq!(
        serde_json::to_string(&TypeofKind::Undefined).expect("serialize"),
        "\"undefined\""
    );
    assert_eq!(
        serde_json::from_str::<Branch>("\"false\"").expect("deserialize"),
        Branch::False
    );
}

#[test]
fn test_literal_equality() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let a = interner.literal_string("a");
    let b = interner.literal_string("b");
    let c = interner.literal_string("c");
    let value = interner.union(vec![a, b, c]);
    let guard = TypeGuard::LiteralEquality(a);

    assert_eq!(ctx.narrow(value, &guard, Branch::True), a);
    assert_eq!(ctx.narrow(value, &guard, Branch::False), interner.union(vec![b, c]));
}

#[test]
fn test_literal_equality_against_primitive() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let x = interner.literal_string("x");
    let guard = TypeGuard::LiteralEquality(x);

    assert_eq!(ctx.narrow(TypeId::STRING, &guard, Branch::True), x);
    assert_eq!(ctx.narrow(TypeId::STRING, &guard, Branch::False), TypeId::STRING);
    assert_eq!(ctx.narrow(TypeId::NUMBER, &guard, Branch::True), TypeId::NEVER);
}

#[test]
fn test_literal_equality_boolean() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let guard = TypeGuard::LiteralEquality(TypeId::BOOLEAN_TRUE);

    assert_eq!(ctx.narrow(TypeId::BOOLEAN, &guard, Branch::True), TypeId::BOOLEAN_TRUE);
    assert_eq!(ctx.narrow(TypeId::BOOLEAN, &guard, Branch::False), TypeId::BOOLEAN_FALSE);
}

#[test]
fn test_nullish_equality() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let value = interner.union(vec![TypeId::STRING, TypeId::NULL, TypeId::UNDEFINED]);

    assert_eq!(
        ctx.narrow(value, &TypeGuard::NullishEquality, Branch::True),
        interner.union(vec![TypeId::NULL, TypeId::UNDEFINED])
    );
    assert_eq!(ctx.narrow(value, &TypeGuard::NullishEquality, Branch::False), TypeId::STRING);
}

#[test]
fn test_truthiness() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let value = interner.union(vec![TypeId::STRING, TypeId::NULL]);

    assert_eq!(ctx.narrow(value, &TypeGuard::Truthy, Branch::True), TypeId::STRING);
    assert_eq!(
        ctx.narrow(value, &TypeGuard::Truthy, Branch::False),
        interner.union(vec![interner.literal_string(""), TypeId::NULL])
    );
}

#[test]
fn test_truthiness_of_literals_and_booleans() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let zero = interner.literal_number(0.0);
    let five = interner.literal_number(5.0);
    let value = interner.union(vec![zero, five, TypeId::UNDEFINED]);

    assert_eq!(ctx.narrow(value, &TypeGuard::Truthy, Branch::True), five);
    assert_eq!(
        ctx.narrow(value, &TypeGuard::Truthy, Branch::False),
        interner.union(vec![zero, TypeId::UNDEFINED])
    );
    assert_eq!(
        ctx.narrow(TypeId::BOOLEAN, &TypeGuard::Truthy, Branch::True),
        TypeId::BOOLEAN_TRUE
    );
    assert_eq!(
        ctx.narrow(TypeId::NUMBER, &TypeGuard::Truthy, Branch::False),
        zero
    );
}

#[test]
fn test_discriminant_narrowing() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let (shape, circle, square) = shapes(&interner);
    let guard = TypeGuard::Discriminant {
        property_name: interner.intern_string("kind"),
        value_type: interner.literal_string("circle"),
    };

    assert_eq!(ctx.narrow(shape, &guard, Branch::True), circle);
    assert_eq!(ctx.narrow(shape, &guard, Branch::False), square);
}

#[test]
fn test_discriminant_narrows_union_valued_field() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let kind = interner.intern_string("kind");
    let size = interner.intern_string("size");
    let a = interner.literal_string("a");
    let b = interner.literal_string("b");
    let c = interner.literal_string("c");
    let ab = interner.object(vec![
        PropertyInfo::new(kind, interner.union(vec![a, b])),
        PropertyInfo::new(size, TypeId::NUMBER),
    ]);
    let only_c = interner.object(vec![PropertyInfo::new(kind, c)]);
    let value = interner.union(vec![ab, only_c]);
    let guard = TypeGuard::Discriminant {
        property_name: kind,
        value_type: a,
    };

    let narrowed_a = interner.object(vec![
        PropertyInfo::new(kind, a),
        PropertyInfo::new(size, TypeId::NUMBER),
    ]);
    let narrowed_b = interner.object(vec![
        PropertyInfo::new(kind, b),
        PropertyInfo::new(size, TypeId::NUMBER),
    ]);
    assert_eq!(ctx.narrow(value, &guard, Branch::True), narrowed_a);
    assert_eq!(
        ctx.narrow(value, &guard, Branch::False),
        interner.union(vec![narrowed_b, only_c])
    );
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn test_find_discriminants() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let (shape, circle, square) = shapes(&interner);

    let found = ctx.find_discriminants(shape);

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].property_name, interner.intern_string("kind"));
    assert_eq!(found[0].variants.len(), 2);
    assert!(found[0].variants.contains(&(interner.literal_string("circle"), circle)));
    assert!(found[0].variants.contains(&(interner.literal_string("square"), square)));
    assert!(ctx.find_discriminants(circle).is_empty());
}

#[test]
fn test_find_discriminants_rejects_shared_values() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let kind = interner.intern_string("kind");
    let same = interner.literal_string("same");
    let left = interner.object(vec![
        PropertyInfo::new(kind, same),
        PropertyInfo::new(interner.intern_string("a"), TypeId::STRING),
    ]);
    let right = interner.object(vec![
        PropertyInfo::new(kind, same),
        PropertyInfo::new(interner.intern_string("b"), TypeId::STRING),
    ]);

    assert!(ctx.find_discriminants(interner.union(vec![left, right])).is_empty());
}

#[test]
fn test_in_property() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let (shape, circle, square) = shapes(&interner);
    let guard = TypeGuard::InProperty(interner.intern_string("radius"));

    assert_eq!(ctx.narrow(shape, &guard, Branch::True), circle);
    assert_eq!(ctx.narrow(shape, &guard, Branch::False), square);
}

#[test]
fn test_in_property_optional_stays_in_both() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let name = interner.intern_string("maybe");
    let optional = interner.object(vec![PropertyInfo::opt(name, TypeId::STRING)]);
    let guard = TypeGuard::InProperty(name);

    assert_eq!(ctx.narrow(optional, &guard, Branch::True), optional);
    assert_eq!(ctx.narrow(optional, &guard, Branch::False), optional);
}

#[test]
fn test_predicate_primitive() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let value = interner.union(vec![TypeId::STRING, TypeId::NUMBER]);
    let guard = TypeGuard::Predicate {
        asserts_to: TypeId::STRING,
    };

    assert_eq!(ctx.narrow(value, &guard, Branch::True), TypeId::STRING);
    assert_eq!(ctx.narrow(value, &guard, Branch::False), TypeId::NUMBER);
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn test_predicate_narrows_wider_member() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let a = interner.literal_string("a");
    let guard = TypeGuard::Predicate { asserts_to: a };

    assert_eq!(ctx.narrow(TypeId::STRING, &guard, Branch::True), a);
    assert_eq!(ctx.narrow(TypeId::UNKNOWN, &guard, Branch::True), a);
}

#[test]
fn test_predicate_discriminated_false_branch() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let (shape, circle, square) = shapes(&interner);
    let guard = TypeGuard::Predicate { asserts_to: circle };

    assert_eq!(ctx.narrow(shape, &guard, Branch::True), circle);
    assert_eq!(ctx.narrow(shape, &guard, Branch::False), square);
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn test_predicate_partial_overlap_is_ambiguous() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let a = interner.intern_string("a");
    let has_a = interner.object(vec![PropertyInfo::new(a, TypeId::STRING)]);
    let has_b = interner.object(vec![PropertyInfo::new(interner.intern_string("b"), TypeId::NUMBER)]);
    let value = interner.union(vec![has_a, has_b]);
    let asserted = interner.object(vec![
        PropertyInfo::new(a, TypeId::STRING),
        PropertyInfo::new(interner.intern_string("c"), TypeId::BOOLEAN),
    ]);

    let result = ctx.narrow(value, &TypeGuard::Predicate { asserts_to: asserted }, Branch::False);

    assert_eq!(result, value);
    let diagnostics = ctx.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::NarrowingAmbiguous);
    assert_eq!(diagnostics[0].category, DiagnosticCategory::Warning);
}

#[test]
fn test_branches_join_back_to_original() {
    let interner = TypeInterner::new();
    let mut ctx = NarrowingContext::new(&interner);
    let (shape, _, _) = shapes(&interner);
    let value = interner.union(vec![TypeId::STRING, TypeId::NUMBER, TypeId::NULL]);
    let guards = [
        TypeGuard::Typeof(TypeofKind::String),
        TypeGuard::NullishEquality,
        TypeGuard::Predicate {
            asserts_to: TypeId::NUMBER,
        },
    ];

    for guard in &guards {
        let yes = ctx.narrow(value, guard, Branch::True);
        let no = ctx.narrow(value, guard, Branch::False);
        assert_eq!(ctx.join(yes, no), value, "guard {guard:?}");
    }

    let guard = TypeGuard::Discriminant {
        property_name: interner.intern_string("kind"),
        value_type: interner.literal_string("square"),
    };
    let yes = ctx.narrow(shape, &guard, Branch::True);
    let no = ctx.narrow(shape, &guard, Branch::False);
    assert_eq!(ctx.join(yes, no), shape);
}

#[test]
fn test_narrow_through_alias() {
    let interner = TypeInterner::new();
    let (shape, circle, _) = shapes(&interner);
    let name = interner.intern_string("Shape");
    let mut env = TypeEnvironment::new();
    env.define(name, vec![], shape);

    let mut ctx = NarrowingContext::with_resolver(&interner, &env);
    let guard = TypeGuard::Discriminant {
        property_name: interner.intern_string("kind"),
        value_type: interner.literal_string("circle"),
    };

    assert_eq!(ctx.narrow(interner.reference(name, vec![]), &guard, Branch::True), circle);
    assert_eq!(ctx.find_discriminants(interner.reference(name, vec![])).len(), 1);
}

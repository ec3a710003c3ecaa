use super::*;
use crate::context::{TypeEnvironment, TypeResolver};
use crate::evaluate::TypeEvaluator;

fn alias(name: &str, params: Vec<TypeParamExpr>, body: TypeExpr) -> AliasDecl {
    AliasDecl {
        name: name.to_string(),
        params,
        body,
        location: None,
    }
}

#[test]
fn test_lower_intrinsics_and_literals() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);

    assert_eq!(lowering.lower(&TypeExpr::string()), TypeId::STRING);
    assert_eq!(lowering.lower(&TypeExpr::boolean_literal(true)), TypeId::BOOLEAN_TRUE);
    assert_eq!(
        lowering.lower(&TypeExpr::string_literal("a")),
        interner.literal_string("a")
    );
    assert_eq!(
        lowering.lower(&TypeExpr::number_literal(3.0)),
        interner.literal_number(3.0)
    );
}

#[test]
fn test_lower_union_is_not_normalized() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let expr = TypeExpr::union(vec![
        TypeExpr::string(),
        TypeExpr::string_literal("a"),
    ]);

    let lowered = lowering.lower(&expr);

    assert_eq!(
        lowered,
        interner.union_raw(vec![TypeId::STRING, interner.literal_string("a")])
    );
    assert_ne!(lowered, TypeId::STRING);
}

#[test]
fn test_lower_object_repeated_field_keeps_last_type() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let expr = TypeExpr::object(vec![
        FieldExpr::new("a", TypeExpr::string()),
        FieldExpr::new("b", TypeExpr::number()).optional(),
        FieldExpr::new("a", TypeExpr::boolean()),
    ]);

    let lowered = lowering.lower(&expr);

    let a = interner.intern_string("a");
    let b = interner.intern_string("b");
    assert_eq!(
        lowered,
        interner.object(vec![
            PropertyInfo::new(a, TypeId::BOOLEAN),
            PropertyInfo::opt(b, TypeId::NUMBER),
        ])
    );
}

#[test]
fn test_lower_unknown_name_is_reference() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);

    let lowered = lowering.lower(&TypeExpr::reference("Box", vec![TypeExpr::number()]));

    assert_eq!(
        lowered,
        interner.reference(interner.intern_string("Box"), vec![TypeId::NUMBER])
    );
}

#[test]
fn test_lower_builtin_generics() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);

    assert_eq!(
        lowering.lower(&TypeExpr::reference("Array", vec![TypeExpr::string()])),
        interner.array(TypeId::STRING)
    );
    let a = interner.literal_string("a");
    assert_eq!(
        lowering.lower(&TypeExpr::reference("Capitalize", vec![TypeExpr::string_literal("a")])),
        interner.string_intrinsic(StringIntrinsicKind::Capitalize, a)
    );
    // Wrong arity falls through to an alias reference.
    assert!(matches!(
        interner.lookup(lowering.lower(&TypeExpr::named("Uppercase"))),
        Some(TypeData::Reference(..))
    ));
}

#[test]
fn test_lower_alias_params_in_scope() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let decl = alias(
        "Box",
        vec![TypeParamExpr::new("T")],
        TypeExpr::object(vec![FieldExpr::new("value", TypeExpr::named("T"))]),
    );

    let def = lowering.lower_alias(&decl);

    assert_eq!(def.name, interner.intern_string("Box"));
    assert_eq!(def.params.len(), 1);
    let param = interner.type_param(def.params[0]);
    assert_eq!(
        def.body,
        interner.object(vec![PropertyInfo::new(interner.intern_string("value"), param)])
    );
}

#[test]
fn test_lower_alias_param_constraint_visible_in_body() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let decl = alias(
        "Id",
        vec![TypeParamExpr {
            constraint: Some(TypeExpr::string()),
            default: Some(TypeExpr::string_literal("x")),
            ..TypeParamExpr::new("T")
        }],
        TypeExpr::named("T"),
    );

    let def = lowering.lower_alias(&decl);

    assert_eq!(def.params[0].constraint, Some(TypeId::STRING));
    assert_eq!(def.params[0].default, Some(interner.literal_string("x")));
    match interner.lookup(def.body) {
        Some(TypeData::TypeParameter(info)) => assert_eq!(info.constraint, Some(TypeId::STRING)),
        other => panic!("expected type parameter, got {other:?}"),
    }
}

#[test]
fn test_lower_scope_does_not_leak() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    lowering.lower_alias(&alias("A", vec![TypeParamExpr::new("T")], TypeExpr::named("T")));

    let outside = lowering.lower(&TypeExpr::named("T"));

    assert!(matches!(interner.lookup(outside), Some(TypeData::Reference(..))));
}

#[test]
fn test_lower_conditional_distributivity_default() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let conditional = |check: TypeExpr| {
        TypeExpr::new(TypeExprKind::Conditional {
            check: Box::new(check),
            extends: Box::new(TypeExpr::array(TypeExpr::named("U"))),
            infer: vec!["U".to_string()],
            then_branch: Box::new(TypeExpr::named("U")),
            else_branch: Box::new(TypeExpr::new(TypeExprKind::Intrinsic(IntrinsicKind::Never))),
            distributive: None,
        })
    };

    let (_, generic) = lowering.with_type_params(&[TypeParamExpr::new("T")], |lowering, _| {
        lowering.lower(&conditional(TypeExpr::named("T")))
    });
    let concrete = lowering.lower(&conditional(TypeExpr::string()));

    let shape_of = |id: TypeId| match interner.lookup(id) {
        Some(TypeData::Conditional(cond_id)) => interner.conditional_type(cond_id),
        other => panic!("expected conditional, got {other:?}"),
    };
    let generic = shape_of(generic);
    assert!(generic.is_distributive);
    assert_eq!(generic.infer_params, vec![interner.intern_string("U")]);
    let infer_u = interner.type_param_named("U");
    assert_eq!(generic.extends_type, interner.array(infer_u));
    assert_eq!(generic.true_type, infer_u);
    assert!(!shape_of(concrete).is_distributive);
}

#[test]
fn test_lower_mapped_key_param_in_scope() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let expr = TypeExpr::new(TypeExprKind::Mapped {
        key_param: "K".to_string(),
        source: Box::new(TypeExpr::named("Obj")),
        key_filter: None,
        template: Box::new(TypeExpr::index_access(TypeExpr::named("Obj"), TypeExpr::named("K"))),
        name_type: None,
        optional: Some(MappedModifier::Add),
        readonly: None,
    });

    let lowered = lowering.lower(&expr);

    let Some(TypeData::Mapped(mapped_id)) = interner.lookup(lowered) else {
        panic!("expected mapped type");
    };
    let mapped = interner.mapped_type(mapped_id);
    let obj = interner.reference(interner.intern_string("Obj"), vec![]);
    assert_eq!(mapped.source, obj);
    assert_eq!(
        mapped.template,
        interner.index_access(obj, interner.type_param_named("K"))
    );
    assert_eq!(mapped.optional_modifier, Some(MappedModifier::Add));
}

#[test]
fn test_lower_template_literal() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let expr = TypeExpr::new(TypeExprKind::TemplateLiteral(vec![
        TemplateExprSpan::Text("id-".to_string()),
        TemplateExprSpan::Type(TypeExpr::number()),
    ]));

    assert_eq!(
        lowering.lower(&expr),
        interner.template_literal(vec![
            TemplateSpan::Text(interner.intern_string("id-")),
            TemplateSpan::Type(TypeId::NUMBER),
        ])
    );
}

#[test]
fn test_lower_records_origins() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let object_tag = SourceTag::new(1, 0, 20);
    let field_tag = SourceTag::new(1, 2, 9);
    let expr = TypeExpr::object(vec![FieldExpr::new("a", TypeExpr::string()).at(field_tag)])
        .at(object_tag);

    let lowered = lowering.lower(&expr);

    assert_eq!(interner.type_origin(lowered), Some(object_tag));
    assert_eq!(
        interner.property_origin(lowered, interner.intern_string("a")),
        Some(field_tag)
    );
}

#[test]
fn test_lower_alias_decl_from_json() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let json = r#"{
        "name": "Wrap",
        "params": [{ "name": "T" }],
        "body": {
            "kind": { "object": { "fields": [
                { "name": "inner", "type": { "kind": { "reference": { "name": "T" } } }, "optional": true }
            ] } }
        },
        "location": { "file": 3, "start": 10, "length": 4 }
    }"#;

    let decl: AliasDecl = serde_json::from_str(json).expect("alias decl parses");
    let def = lowering.lower_alias(&decl);

    assert_eq!(def.origin, Some(SourceTag::new(3, 10, 4)));
    let param = interner.type_param(def.params[0]);
    assert_eq!(
        def.body,
        interner.object(vec![PropertyInfo::opt(interner.intern_string("inner"), param)])
    );
}

#[test]
fn test_lowered_alias_evaluates() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let decl = alias(
        "Box",
        vec![TypeParamExpr::new("T")],
        TypeExpr::object(vec![FieldExpr::new("value", TypeExpr::named("T"))]),
    );
    let mut env = TypeEnvironment::new();
    env.insert(lowering.lower_alias(&decl));
    assert!(env.resolve_alias(interner.intern_string("Box")).is_some());

    let applied = lowering.lower(&TypeExpr::reference("Box", vec![TypeExpr::number()]));
    let mut evaluator = TypeEvaluator::with_resolver(&interner, &env);

    assert_eq!(
        evaluator.evaluate(applied),
        Ok(interner.object(vec![PropertyInfo::new(
            interner.intern_string("value"),
            TypeId::NUMBER
        )]))
    );
}

#[test]
fn test_wide_input_hits_operation_limit() {
    let interner = TypeInterner::new();
    let lowering = TypeLowering::new(&interner);
    let small = TypeExpr::union(vec![TypeExpr::string(), TypeExpr::number()]);
    lowering.lower(&small);
    assert!(!lowering.is_limit_exceeded());

    let members = (0..MAX_LOWERING_OPERATIONS)
        .map(|_| TypeExpr::string())
        .collect();
    lowering.lower(&TypeExpr::union(members));

    assert!(lowering.is_limit_exceeded());
}

//! End-to-end resolution scenarios driven through `ResolutionContext`.

use crate::*;

fn environment(interner: &TypeInterner, decls: &[AliasDecl]) -> TypeEnvironment {
    let lowering = TypeLowering::new(interner);
    let mut env = TypeEnvironment::new();
    for decl in decls {
        env.insert(lowering.lower_alias(decl));
    }
    env
}

fn decl(name: &str, params: &[&str], body: TypeExpr) -> AliasDecl {
    AliasDecl {
        name: name.to_string(),
        params: params.iter().map(|p| TypeParamExpr::new(*p)).collect(),
        body,
        location: None,
    }
}

#[test]
fn test_conflicting_object_intersection() {
    let interner = TypeInterner::new();
    let value = interner.intern_string("value");
    let left = interner.object(vec![PropertyInfo::new(value, TypeId::STRING)]);
    let right = interner.object(vec![PropertyInfo::new(value, TypeId::NUMBER)]);
    let tag = SourceTag::new(0, 4, 30);
    let intersection = interner.intersection_raw(vec![left, right]);
    interner.record_origin(OriginKey::Type(intersection), tag);

    let mut ctx = ResolutionContext::new(&interner);
    let resolved = ctx.resolve(intersection).expect("not cancelled");

    assert_eq!(
        resolved.type_id,
        interner.object(vec![PropertyInfo::new(value, TypeId::NEVER)])
    );
    assert_eq!(resolved.diagnostics.len(), 1);
    let diagnostic = &resolved.diagnostics[0];
    assert_eq!(diagnostic.kind, DiagnosticKind::IncompatibleIntersection);
    assert_eq!(diagnostic.location, Some(tag));
    assert!(diagnostic.message.contains("'value'"), "{}", diagnostic.message);
}

#[test]
fn test_distributive_array_wrap() {
    let interner = TypeInterner::new();
    let wrap = TypeExpr::new(TypeExprKind::Conditional {
        check: Box::new(TypeExpr::named("T")),
        extends: Box::new(TypeExpr::intrinsic(IntrinsicKind::Any)),
        infer: Vec::new(),
        then_branch: Box::new(TypeExpr::array(TypeExpr::named("T"))),
        else_branch: Box::new(TypeExpr::intrinsic(IntrinsicKind::Never)),
        distributive: None,
    });
    let env = environment(&interner, &[decl("Wrap", &["T"], wrap)]);
    let lowering = TypeLowering::new(&interner);
    let applied = lowering.lower(&TypeExpr::reference(
        "Wrap",
        vec![TypeExpr::union(vec![TypeExpr::string(), TypeExpr::number()])],
    ));

    let mut ctx = ResolutionContext::with_resolver(&interner, &env);
    let result = ctx.evaluate(applied).expect("not cancelled");

    assert_eq!(
        result,
        interner.union(vec![interner.array(TypeId::STRING), interner.array(TypeId::NUMBER)])
    );
    assert!(ctx.diagnostics().is_empty());
}

#[test]
fn test_discriminant_narrowing_of_shapes() {
    let interner = TypeInterner::new();
    let shape = TypeExpr::union(vec![
        TypeExpr::object(vec![
            FieldExpr::new("kind", TypeExpr::string_literal("circle")),
            FieldExpr::new("radius", TypeExpr::number()),
        ]),
        TypeExpr::object(vec![
            FieldExpr::new("kind", TypeExpr::string_literal("square")),
            FieldExpr::new("size", TypeExpr::number()),
        ]),
    ]);
    let env = environment(&interner, &[decl("Shape", &[], shape)]);
    let shape_ref = interner.reference(interner.intern_string("Shape"), Vec::new());
    let guard = TypeGuard::Discriminant {
        property_name: interner.intern_string("kind"),
        value_type: interner.literal_string("circle"),
    };

    let mut ctx = ResolutionContext::with_resolver(&interner, &env);
    let narrowed = ctx.narrow(shape_ref, &guard, Branch::True);

    let circle = interner.object(vec![
        PropertyInfo::new(interner.intern_string("kind"), interner.literal_string("circle")),
        PropertyInfo::new(interner.intern_string("radius"), TypeId::NUMBER),
    ]);
    assert_eq!(narrowed, circle);

    let other = ctx.narrow(shape_ref, &guard, Branch::False);
    let whole = ctx.evaluate(shape_ref).expect("not cancelled");
    assert_eq!(ctx.join(narrowed, other), whole);
}

#[test]
fn test_getter_key_remapping() {
    let interner = TypeInterner::new();
    let getters = TypeExpr::new(TypeExprKind::Mapped {
        key_param: "K".to_string(),
        source: Box::new(TypeExpr::named("T")),
        key_filter: None,
        template: Box::new(TypeExpr::function(
            Vec::new(),
            TypeExpr::index_access(TypeExpr::named("T"), TypeExpr::named("K")),
        )),
        name_type: Some(Box::new(TypeExpr::new(TypeExprKind::TemplateLiteral(vec![
            TemplateExprSpan::Text("get".to_string()),
            TemplateExprSpan::Type(TypeExpr::reference("Capitalize", vec![TypeExpr::named("K")])),
        ])))),
        optional: None,
        readonly: None,
    });
    let env = environment(&interner, &[decl("Getters", &["T"], getters)]);
    let lowering = TypeLowering::new(&interner);
    let applied = lowering.lower(&TypeExpr::reference(
        "Getters",
        vec![TypeExpr::object(vec![
            FieldExpr::new("id", TypeExpr::number()),
            FieldExpr::new("name", TypeExpr::string()),
        ])],
    ));

    let mut ctx = ResolutionContext::with_resolver(&interner, &env);
    let result = ctx.evaluate(applied).expect("not cancelled");

    assert_eq!(
        result,
        interner.object(vec![
            PropertyInfo::new(
                interner.intern_string("getId"),
                interner.function(Vec::new(), TypeId::NUMBER)
            ),
            PropertyInfo::new(
                interner.intern_string("getName"),
                interner.function(Vec::new(), TypeId::STRING)
            ),
        ])
    );
    assert_eq!(TypeFormatter::new(&interner).format(result), "{ getId: () => number; getName: () => string }");
}

#[test]
fn test_coinductive_self_reference() {
    let interner = TypeInterner::new();
    let node = |name: &str| {
        decl(
            name,
            &[],
            TypeExpr::object(vec![FieldExpr::new("next", TypeExpr::named(name))]),
        )
    };
    let env = environment(&interner, &[node("T"), node("U")]);
    let t = interner.reference(interner.intern_string("T"), Vec::new());
    let u = interner.reference(interner.intern_string("U"), Vec::new());

    let mut ctx = ResolutionContext::with_resolver(&interner, &env);

    assert!(ctx.is_assignable(t, t));
    assert!(ctx.is_assignable(t, u));
    assert!(ctx.is_assignable(u, t));
    let resolved = ctx.resolve(t).expect("not cancelled");
    assert!(resolved.diagnostics.is_empty());
    assert!(matches!(interner.lookup(resolved.type_id), Some(TypeData::Object(_))));
}

#[test]
fn test_infer_call_then_check() {
    let interner = TypeInterner::new();
    let t_info = TypeParamInfo::new(interner.intern_string("T"));
    let t = interner.type_param(t_info);
    let param = interner.object(vec![PropertyInfo::new(interner.intern_string("items"), interner.array(t))]);
    let arg = interner.object(vec![PropertyInfo::new(
        interner.intern_string("items"),
        interner.array(interner.literal_number(1.0)),
    )]);

    let mut ctx = ResolutionContext::new(&interner);
    let inferred = ctx.infer_type_arguments(&[t_info], &[param], &[arg]);

    assert_eq!(inferred, vec![TypeId::NUMBER]);
    assert!(ctx.is_assignable(arg, instantiate_type(&interner, param, &TypeSubstitution::from_args(&[t_info], &inferred))));
}

#[test]
fn test_excess_property_modes() {
    let interner = TypeInterner::new();
    let a = interner.intern_string("a");
    let source = interner.object(vec![
        PropertyInfo::new(a, TypeId::STRING),
        PropertyInfo::new(interner.intern_string("extra"), TypeId::NUMBER),
    ]);
    let target = interner.object(vec![PropertyInfo::new(a, TypeId::STRING)]);

    let mut lenient = ResolutionContext::new(&interner);
    assert!(lenient.is_assignable(source, target));

    let mut strict = ResolutionContext::new(&interner).with_options(ResolutionOptions {
        excess_property_check: true,
        ..ResolutionOptions::default()
    });
    let result = strict.check_assignable(source, target);
    assert!(!result.assignable);
    assert!(result.reason.is_some());
}

#[test]
fn test_assignability_keeps_resolution_diagnostics() {
    let interner = TypeInterner::new();
    let missing = interner.reference(interner.intern_string("Missing"), vec![]);

    let mut ctx = ResolutionContext::new(&interner);
    let result = ctx.check_assignable(missing, TypeId::STRING);

    assert!(!result.assignable);
    let kinds: Vec<DiagnosticKind> = ctx.diagnostics().iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![DiagnosticKind::UnresolvedReference]);
    assert_eq!(ctx.diagnostics()[0].message, "Cannot find type 'Missing'.");
}

#[test]
fn test_conditional_check_past_subtype_depth_takes_false_branch() {
    let interner = TypeInterner::new();
    let env = environment(
        &interner,
        &[decl(
            "HasStringB",
            &["T"],
            TypeExpr::new(TypeExprKind::Conditional {
                check: Box::new(TypeExpr::named("T")),
                extends: Box::new(TypeExpr::object(vec![FieldExpr::new(
                    "a",
                    TypeExpr::object(vec![FieldExpr::new("b", TypeExpr::string())]),
                )])),
                infer: Vec::new(),
                then_branch: Box::new(TypeExpr::boolean_literal(true)),
                else_branch: Box::new(TypeExpr::boolean_literal(false)),
                distributive: None,
            }),
        )],
    );
    let a = interner.intern_string("a");
    let b = interner.intern_string("b");
    let arg = interner.object(vec![PropertyInfo::new(
        a,
        interner.object(vec![PropertyInfo::new(b, interner.literal_string("x"))]),
    )]);

    let mut ctx = ResolutionContext::with_resolver(&interner, &env).with_options(ResolutionOptions {
        max_subtype_depth: 1,
        ..ResolutionOptions::default()
    });
    let result = ctx
        .evaluate(interner.reference(interner.intern_string("HasStringB"), vec![arg]))
        .expect("not cancelled");

    assert_eq!(result, TypeId::BOOLEAN_FALSE);
    assert!(
        ctx.diagnostics()
            .iter()
            .any(|d| d.kind == DiagnosticKind::EvaluationDepthExceeded)
    );
}

#[test]
fn test_cancelled_context() {
    let interner = TypeInterner::new();
    let token = CancellationToken::new();
    token.cancel();
    let object = interner.object(vec![PropertyInfo::new(interner.intern_string("a"), TypeId::STRING)]);

    let mut ctx = ResolutionContext::new(&interner).with_cancellation(token);

    assert_eq!(ctx.evaluate(object), Err(Cancelled));
    assert_eq!(ctx.evaluate(TypeId::STRING), Ok(TypeId::STRING));
}

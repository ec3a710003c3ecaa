use super::*;
use crate::context::ResolutionOptions;
use crate::intern::TypeInterner;
use crate::types::*;
use tsr_common::diagnostics::DiagnosticKind;

fn param(interner: &TypeInterner, name: &str) -> (TypeParamInfo, TypeId) {
    let info = TypeParamInfo::new(interner.intern_string(name));
    (info, interner.type_param(info))
}

#[test]
fn test_infer_identity_widens_literal() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let hello = interner.literal_string("hello");

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[t_info], &[t], &[hello]);

    assert_eq!(args, vec![TypeId::STRING]);
}

#[test]
fn test_infer_const_param_keeps_literal() {
    let interner = TypeInterner::new();
    let info = TypeParamInfo {
        is_const: true,
        ..TypeParamInfo::new(interner.intern_string("T"))
    };
    let t = interner.type_param(info);
    let hello = interner.literal_string("hello");

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[info], &[t], &[hello]);

    assert_eq!(args, vec![hello]);
}

#[test]
fn test_infer_preserve_literals_option() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let seven = interner.literal_number(7.0);
    let options = ResolutionOptions {
        preserve_literals: true,
        ..ResolutionOptions::default()
    };

    let mut ctx = InferenceContext::new(&interner).with_options(&options);
    let args = ctx.infer_type_arguments(&[t_info], &[t], &[seven]);

    assert_eq!(args, vec![seven]);
}

#[test]
fn test_infer_same_class_candidates_union() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let a = interner.literal_string("a");
    let b = interner.literal_string("b");

    let mut ctx = InferenceContext::new(&interner);
    let subst = ctx
        .unify(&[t_info], &[t, t], &[a, b])
        .expect("same-class candidates should not conflict");

    assert_eq!(subst.get(t_info.name), Some(TypeId::STRING));
}

#[test]
fn test_infer_conflicting_primitives() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");

    let mut ctx = InferenceContext::new(&interner);
    let conflict = ctx
        .unify(&[t_info], &[t, t], &[TypeId::STRING, TypeId::NUMBER])
        .expect_err("string and number should conflict");

    assert_eq!(conflict.name, t_info.name);
    assert_eq!(conflict.first, TypeId::STRING);
    assert_eq!(conflict.second, TypeId::NUMBER);
}

#[test]
fn test_infer_conflict_reports_and_falls_back_to_unknown() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[t_info], &[t, t], &[TypeId::STRING, TypeId::NUMBER]);

    assert_eq!(args, vec![TypeId::UNKNOWN]);
    let diagnostics = ctx.take_diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::InferenceConflict);
    assert!(diagnostics[0].message.contains("'T'"));
}

#[test]
fn test_infer_from_array_element() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let param_type = interner.array(t);
    let arg = interner.array(TypeId::NUMBER);

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[t_info], &[param_type], &[arg]);

    assert_eq!(args, vec![TypeId::NUMBER]);
}

#[test]
fn test_infer_from_object_fields() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let value = interner.intern_string("value");
    let param_type = interner.object(vec![PropertyInfo::new(value, t)]);
    let arg = interner.object(vec![
        PropertyInfo::new(value, TypeId::BOOLEAN),
        PropertyInfo::new(interner.intern_string("extra"), TypeId::STRING),
    ]);

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[t_info], &[param_type], &[arg]);

    assert_eq!(args, vec![TypeId::BOOLEAN]);
}

#[test]
fn test_infer_widens_literals_inside_object() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let x = interner.intern_string("x");
    let tag = interner.intern_string("tag");
    let arg = interner.object(vec![
        PropertyInfo::new(x, interner.literal_string("hi")),
        PropertyInfo {
            readonly: true,
            ..PropertyInfo::new(tag, interner.literal_string("fixed"))
        },
    ]);

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[t_info], &[t], &[arg]);

    let expected = interner.object(vec![
        PropertyInfo::new(x, TypeId::STRING),
        PropertyInfo {
            readonly: true,
            ..PropertyInfo::new(tag, interner.literal_string("fixed"))
        },
    ]);
    assert_eq!(args, vec![expected]);
}

#[test]
fn test_infer_widens_array_and_return_literals() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let (u_info, u) = param(&interner, "U");
    let one = interner.literal_number(1.0);
    let array_arg = interner.array(one);
    let fn_arg = interner.function(vec![], interner.literal_string("done"));

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[t_info, u_info], &[t, u], &[array_arg, fn_arg]);

    assert_eq!(
        args,
        vec![
            interner.array(TypeId::NUMBER),
            interner.function(vec![], TypeId::STRING),
        ]
    );
}

#[test]
fn test_infer_const_param_keeps_nested_literal() {
    let interner = TypeInterner::new();
    let info = TypeParamInfo {
        is_const: true,
        ..TypeParamInfo::new(interner.intern_string("T"))
    };
    let t = interner.type_param(info);
    let arg = interner.object(vec![PropertyInfo::new(
        interner.intern_string("x"),
        interner.literal_string("hi"),
    )]);

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[info], &[t], &[arg]);

    assert_eq!(args, vec![arg]);
}

#[test]
fn test_infer_from_function_signature() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let (u_info, u) = param(&interner, "U");
    let param_type = interner.function(vec![t], u);
    let arg = interner.function(vec![TypeId::STRING], TypeId::NUMBER);

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[t_info, u_info], &[param_type], &[arg]);

    assert_eq!(args, vec![TypeId::STRING, TypeId::NUMBER]);
}

#[test]
fn test_infer_nullable_target_takes_leftover() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let param_type = interner.union(vec![t, TypeId::NULL]);
    let arg = interner.union(vec![TypeId::STRING, TypeId::NULL]);

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[t_info], &[param_type], &[arg]);

    assert_eq!(args, vec![TypeId::STRING]);
}

#[test]
fn test_infer_fallback_order() {
    let interner = TypeInterner::new();
    let with_default = TypeParamInfo {
        default: Some(TypeId::BOOLEAN),
        constraint: Some(TypeId::STRING),
        ..TypeParamInfo::new(interner.intern_string("A"))
    };
    let with_constraint = TypeParamInfo {
        constraint: Some(TypeId::NUMBER),
        ..TypeParamInfo::new(interner.intern_string("B"))
    };
    let bare = TypeParamInfo::new(interner.intern_string("C"));

    let mut ctx = InferenceContext::new(&interner);
    let args = ctx.infer_type_arguments(&[with_default, with_constraint, bare], &[], &[]);

    assert_eq!(args, vec![TypeId::BOOLEAN, TypeId::NUMBER, TypeId::UNKNOWN]);
}

#[test]
fn test_unify_omits_unbound_params() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let (u_info, _) = param(&interner, "U");

    let mut ctx = InferenceContext::new(&interner);
    let subst = ctx
        .unify(&[t_info, u_info], &[t], &[TypeId::NUMBER])
        .expect("single candidate");

    assert_eq!(subst.len(), 1);
    assert_eq!(subst.get(t_info.name), Some(TypeId::NUMBER));
    assert!(!subst.contains(u_info.name));
}

#[test]
fn test_infer_variables_meeting_share_candidates() {
    let interner = TypeInterner::new();
    let (t_info, t) = param(&interner, "T");
    let (u_info, u) = param(&interner, "U");

    let mut ctx = InferenceContext::new(&interner);
    let t_var = ctx.fresh_type_param(t_info);
    let u_var = ctx.fresh_type_param(u_info);
    ctx.infer_from(t, u);
    ctx.infer_from(u, TypeId::STRING);

    assert_eq!(ctx.candidates(t_var).as_slice(), &[TypeId::STRING]);
    assert_eq!(ctx.candidates(u_var).as_slice(), &[TypeId::STRING]);
}

#[test]
fn test_fresh_type_param_is_idempotent() {
    let interner = TypeInterner::new();
    let (t_info, _) = param(&interner, "T");

    let mut ctx = InferenceContext::new(&interner);
    let first = ctx.fresh_type_param(t_info);
    let second = ctx.fresh_type_param(t_info);

    assert_eq!(first, second);
    assert_eq!(ctx.find_type_param(t_info.name), Some(first));
}

#[test]
fn test_match_pattern_array_element() {
    let interner = TypeInterner::new();
    let (u_info, u) = param(&interner, "U");
    let pattern = interner.array(u);
    let a = interner.literal_string("a");
    let source = interner.array(a);

    let mut ctx = InferenceContext::new(&interner);
    let subst = ctx
        .match_infer_pattern(source, pattern, &[u_info.name])
        .expect("array source should match array pattern");

    assert_eq!(subst.get(u_info.name), Some(a));
}

#[test]
fn test_match_pattern_shape_mismatch() {
    let interner = TypeInterner::new();
    let (u_info, u) = param(&interner, "U");
    let pattern = interner.array(u);

    let mut ctx = InferenceContext::new(&interner);
    assert!(ctx.match_infer_pattern(TypeId::STRING, pattern, &[u_info.name]).is_none());
}

#[test]
fn test_match_pattern_missing_required_field() {
    let interner = TypeInterner::new();
    let (u_info, u) = param(&interner, "U");
    let pattern = interner.object(vec![PropertyInfo::new(interner.intern_string("a"), u)]);
    let source = interner.object(vec![PropertyInfo::new(interner.intern_string("b"), TypeId::STRING)]);

    let mut ctx = InferenceContext::new(&interner);
    assert!(ctx.match_infer_pattern(source, pattern, &[u_info.name]).is_none());
}

#[test]
fn test_match_pattern_unreached_name_is_unknown() {
    let interner = TypeInterner::new();
    let (u_info, u) = param(&interner, "U");
    let pattern = interner.object(vec![PropertyInfo::opt(interner.intern_string("a"), u)]);
    let source = interner.object(vec![]);

    let mut ctx = InferenceContext::new(&interner);
    let subst = ctx
        .match_infer_pattern(source, pattern, &[u_info.name])
        .expect("optional field may be absent");

    assert_eq!(subst.get(u_info.name), Some(TypeId::UNKNOWN));
}

#[test]
fn test_match_pattern_repeated_name_unions() {
    let interner = TypeInterner::new();
    let (u_info, u) = param(&interner, "U");
    let a = interner.intern_string("a");
    let b = interner.intern_string("b");
    let pattern = interner.object(vec![PropertyInfo::new(a, u), PropertyInfo::new(b, u)]);
    let source = interner.object(vec![
        PropertyInfo::new(a, TypeId::STRING),
        PropertyInfo::new(b, TypeId::NUMBER),
    ]);

    let mut ctx = InferenceContext::new(&interner);
    let subst = ctx
        .match_infer_pattern(source, pattern, &[u_info.name])
        .expect("both fields present");

    assert_eq!(
        subst.get(u_info.name),
        Some(interner.union(vec![TypeId::STRING, TypeId::NUMBER]))
    );
}

#[test]
fn test_match_pattern_template_prefix() {
    let interner = TypeInterner::new();
    let (n_info, n) = param(&interner, "N");
    let pattern = interner.template_literal(vec![
        TemplateSpan::Text(interner.intern_string("get")),
        TemplateSpan::Type(n),
    ]);
    let source = interner.literal_string("getName");

    let mut ctx = InferenceContext::new(&interner);
    let subst = ctx
        .match_infer_pattern(source, pattern, &[n_info.name])
        .expect("prefix matches");

    assert_eq!(subst.get(n_info.name), Some(interner.literal_string("Name")));
}

#[test]
fn test_match_pattern_template_shortest_head() {
    let interner = TypeInterner::new();
    let (h_info, h) = param(&interner, "H");
    let (t_info, t) = param(&interner, "T");
    let pattern = interner.template_literal(vec![
        TemplateSpan::Type(h),
        TemplateSpan::Text(interner.intern_string(".")),
        TemplateSpan::Type(t),
    ]);
    let source = interner.literal_string("a.b.c");

    let mut ctx = InferenceContext::new(&interner);
    let subst = ctx
        .match_infer_pattern(source, pattern, &[h_info.name, t_info.name])
        .expect("dot present");

    assert_eq!(subst.get(h_info.name), Some(interner.literal_string("a")));
    assert_eq!(subst.get(t_info.name), Some(interner.literal_string("b.c")));
}

#[test]
fn test_match_pattern_template_rejects_wrong_prefix() {
    let interner = TypeInterner::new();
    let (n_info, n) = param(&interner, "N");
    let pattern = interner.template_literal(vec![
        TemplateSpan::Text(interner.intern_string("get")),
        TemplateSpan::Type(n),
    ]);
    let source = interner.literal_string("setName");

    let mut ctx = InferenceContext::new(&interner);
    assert!(ctx.match_infer_pattern(source, pattern, &[n_info.name]).is_none());
}

#[test]
fn test_conflict_display() {
    let interner = TypeInterner::new();
    let conflict = InferenceConflict {
        name: interner.intern_string("T"),
        first: TypeId::STRING,
        second: TypeId::NUMBER,
    };

    assert!(conflict.to_string().contains("conflicting inference candidates"));
    let diagnostic = conflict.to_diagnostic(&interner);
    assert_eq!(
        diagnostic.message,
        "Type parameter 'T' has conflicting candidates 'string' and 'number'."
    );
}

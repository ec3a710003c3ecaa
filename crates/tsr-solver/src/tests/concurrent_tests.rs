//! Shared-interner behavior under parallel workers.

use crate::*;
use rayon::prelude::*;
use std::sync::Arc;

#[test]
fn test_parallel_interning_is_canonical() {
    let interner = TypeInterner::new();

    let ids: Vec<(usize, TypeId)> = (0..400usize)
        .into_par_iter()
        .map(|i| {
            let key = i % 20;
            let name = interner.intern_string(&format!("field{key}"));
            let object = interner.object(vec![
                PropertyInfo::new(name, interner.literal_number(key as f64)),
                PropertyInfo::opt(interner.intern_string("shared"), TypeId::STRING),
            ]);
            (key, object)
        })
        .collect();

    for key in 0..20 {
        let mut matching = ids.iter().filter(|(k, _)| *k == key).map(|(_, id)| *id);
        let first = matching.next().expect("every key is produced");
        assert!(matching.all(|id| id == first), "key {key}");
    }
    let distinct: std::collections::HashSet<TypeId> = ids.iter().map(|(_, id)| *id).collect();
    assert_eq!(distinct.len(), 20);
}

#[test]
fn test_parallel_evaluation_with_shared_environment() {
    let interner = TypeInterner::new();
    let decl = AliasDecl {
        name: "Box".to_string(),
        params: vec![TypeParamExpr::new("T")],
        body: TypeExpr::object(vec![FieldExpr::new("value", TypeExpr::named("T"))]),
        location: None,
    };
    let mut env = TypeEnvironment::new();
    env.insert(TypeLowering::new(&interner).lower_alias(&decl));
    let box_name = interner.intern_string("Box");
    let value = interner.intern_string("value");

    let results: Vec<(TypeId, TypeId)> = (0..64)
        .into_par_iter()
        .map(|i| {
            let literal = interner.literal_number(f64::from(i));
            let applied = interner.reference(box_name, vec![interner.union(vec![literal, TypeId::NULL])]);
            let mut ctx = ResolutionContext::with_resolver(&interner, &env);
            let result = ctx.evaluate(applied).expect("not cancelled");
            assert!(ctx.diagnostics().is_empty());
            (literal, result)
        })
        .collect();

    for (literal, result) in results {
        let expected = interner.object(vec![PropertyInfo::new(
            value,
            interner.union(vec![literal, TypeId::NULL]),
        )]);
        assert_eq!(result, expected);
    }
}

#[test]
fn test_parallel_assignability() {
    let interner = TypeInterner::new();
    let name = interner.intern_string("name");
    let target = interner.object(vec![PropertyInfo::new(name, TypeId::STRING)]);

    let verdicts: Vec<bool> = (0..128)
        .into_par_iter()
        .map(|i| {
            let field = if i % 2 == 0 {
                interner.literal_string(&format!("n{i}"))
            } else {
                interner.literal_number(f64::from(i))
            };
            let source = interner.object(vec![PropertyInfo::new(name, field)]);
            ResolutionContext::new(&interner).is_assignable(source, target)
        })
        .collect();

    for (i, verdict) in verdicts.into_iter().enumerate() {
        assert_eq!(verdict, i % 2 == 0, "source {i}");
    }
}

#[test]
fn test_arc_interner_across_threads() {
    let interner = Arc::new(TypeInterner::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let interner = Arc::clone(&interner);
            std::thread::spawn(move || {
                let a = interner.literal_string("a");
                let b = interner.literal_string("b");
                interner.union(vec![b, a, TypeId::NULL])
            })
        })
        .collect();

    let ids: Vec<TypeId> = handles
        .into_iter()
        .map(|handle| handle.join().expect("worker panicked"))
        .collect();
    assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    let a = interner.literal_string("a");
    let b = interner.literal_string("b");
    assert_eq!(ids[0], interner.union(vec![a, b, TypeId::NULL]));
}

#[test]
fn test_origins_first_writer_wins_across_threads() {
    let interner = TypeInterner::new();
    let object = interner.object(vec![PropertyInfo::new(interner.intern_string("k"), TypeId::NUMBER)]);

    (0..32u32).into_par_iter().for_each(|i| {
        interner.record_origin(OriginKey::Type(object), SourceTag::new(i, 0, 1));
    });

    let recorded = interner.type_origin(object).expect("some origin recorded");
    for _ in 0..4 {
        interner.record_origin(OriginKey::Type(object), SourceTag::new(99, 0, 1));
        assert_eq!(interner.type_origin(object), Some(recorded));
    }
}

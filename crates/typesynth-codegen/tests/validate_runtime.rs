//! Validation scenarios run through the reference evaluator.

use typesynth_codegen::runtime::{Runtime, RuntimeError, ValidationFailure, Value};
use typesynth_codegen::validator::NestedCheck;
use typesynth_codegen::{synthesize, Definition, SynthOptions, VecEmitter};
use typesynth_core::id::QualifiedName;
use typesynth_core::types::{Capability, FieldDef, TypeEntry, TypeRef, WrapperKind};
use typesynth_core::universe::Universe;

fn qn(name: &str) -> QualifiedName {
    QualifiedName::new("m", name)
}

fn named(name: &str) -> TypeRef {
    TypeRef::named("m", name)
}

fn synth(universe: &Universe) -> Vec<Definition> {
    let mut emitter = VecEmitter::new();
    let report = synthesize(universe, &SynthOptions::default(), &mut emitter).unwrap();
    assert!(report.is_success(), "failures: {:?}", report.failures);
    emitter.definitions
}

fn request_universe() -> Universe {
    Universe::from_entries(vec![TypeEntry::record(
        qn("R"),
        vec![
            FieldDef::new("A", TypeRef::und(TypeRef::string())).with_constraint("required"),
            FieldDef::new("B", TypeRef::seq(TypeRef::option(TypeRef::int()))).with_constraint("len>=1"),
        ],
    )])
    .unwrap()
}

fn failure_path(result: Option<ValidationFailure>) -> Option<String> {
    result.map(|f| f.path)
}

#[test]
fn first_failing_field_is_reported() {
    let universe = request_universe();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);

    let b = rt.heap_mut().sequence(vec![Value::null(WrapperKind::Option)]);
    let unset = Value::record([("A", Value::undefined(WrapperKind::Und)), ("B", b.clone())]);
    assert_eq!(
        failure_path(rt.validate(&qn("R"), &unset).unwrap()),
        Some("A".to_string())
    );

    let empty = rt.heap_mut().sequence(Vec::new());
    let short = Value::record([
        ("A", Value::defined(WrapperKind::Und, Value::str("x"))),
        ("B", empty),
    ]);
    assert_eq!(
        failure_path(rt.validate(&qn("R"), &short).unwrap()),
        Some("B".to_string())
    );

    let valid = Value::record([
        ("A", Value::defined(WrapperKind::Und, Value::str("x"))),
        ("B", b),
    ]);
    assert_eq!(rt.validate(&qn("R"), &valid).unwrap(), None);
}

#[test]
fn absent_only_constraint_rejects_defined() {
    let universe = Universe::from_entries(vec![TypeEntry::record(
        qn("Gone"),
        vec![FieldDef::new("X", TypeRef::und(TypeRef::int())).with_constraint("null,und")],
    )])
    .unwrap();
    let defs = synth(&universe);
    let rt = Runtime::new(&universe, &defs);

    let set = Value::record([("X", Value::defined(WrapperKind::Und, Value::Int(1)))]);
    let failure = rt.validate(&qn("Gone"), &set).unwrap().unwrap();
    assert_eq!(failure.path, "X");
    assert!(failure.reason.contains("def"));

    for absent in [Value::null(WrapperKind::Und), Value::undefined(WrapperKind::Und)] {
        let v = Value::record([("X", absent)]);
        assert_eq!(rt.validate(&qn("Gone"), &v).unwrap(), None);
    }
}

#[test]
fn nested_failures_carry_full_paths() {
    let universe = Universe::from_entries(vec![
        TypeEntry::record(
            qn("Inner"),
            vec![FieldDef::new("X", TypeRef::und(TypeRef::int())).with_constraint("def")],
        ),
        TypeEntry::record(
            qn("Outer"),
            vec![
                FieldDef::new("Items", TypeRef::seq(TypeRef::ptr(named("Inner")))),
                FieldDef::new("ByKey", TypeRef::map(TypeRef::string(), named("Inner"))),
            ],
        ),
    ])
    .unwrap();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);

    let good = Value::record([("X", Value::defined(WrapperKind::Und, Value::Int(1)))]);
    let bad = Value::record([("X", Value::undefined(WrapperKind::Und))]);
    let p0 = rt.heap_mut().pointer(good.clone());
    let p1 = rt.heap_mut().pointer(good.clone());
    let p2 = rt.heap_mut().pointer(bad.clone());
    let items = rt.heap_mut().sequence(vec![p0, Value::Pointer(None), p1, p2]);
    let map = rt.heap_mut().map(Vec::new());
    let outer = Value::record([("Items", items), ("ByKey", map)]);
    let failure = rt.validate(&qn("Outer"), &outer).unwrap().unwrap();
    assert_eq!(failure.path, "Items[3].X");

    let items = rt.heap_mut().sequence(Vec::new());
    let map = rt
        .heap_mut()
        .map(vec![(Value::str("ok"), good), (Value::str("key"), bad)]);
    let outer = Value::record([("Items", items), ("ByKey", map)]);
    let failure = rt.validate(&qn("Outer"), &outer).unwrap().unwrap();
    assert_eq!(failure.path, "ByKey[key].X");
}

#[test]
fn non_null_values_are_checked_per_element() {
    let universe = Universe::from_entries(vec![TypeEntry::record(
        qn("Batch"),
        vec![FieldDef::new("Ids", TypeRef::elastic(TypeRef::int()))
            .with_constraint("def,values:nonnull")],
    )])
    .unwrap();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);

    let ids = rt.heap_mut().sequence(vec![
        Value::defined(WrapperKind::Option, Value::Int(1)),
        Value::null(WrapperKind::Option),
    ]);
    let batch = Value::record([("Ids", Value::defined(WrapperKind::Elastic, ids))]);
    let failure = rt.validate(&qn("Batch"), &batch).unwrap().unwrap();
    assert_eq!(failure.path, "Ids[1]");
}

#[test]
fn validate_capability_runs_the_host_validator() {
    let universe = Universe::from_entries(vec![
        TypeEntry::record(qn("Email"), vec![FieldDef::new("s", TypeRef::string())])
            .with_method(Capability::Validate, "Check"),
        TypeEntry::record(qn("Contact"), vec![FieldDef::new("Mail", named("Email"))]),
    ])
    .unwrap();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);
    let contact = Value::record([("Mail", Value::record([("s", Value::str("nobody"))]))]);

    assert!(matches!(
        rt.validate(&qn("Contact"), &contact),
        Err(RuntimeError::HostNotRegistered { .. })
    ));

    rt.register_validator(qn("Email"), |_, v| match v.field("s") {
        Ok(Value::Str(s)) if s.contains('@') => None,
        _ => Some(ValidationFailure::new("s", "not an address")),
    });
    let failure = rt.validate(&qn("Contact"), &contact).unwrap().unwrap();
    assert_eq!(failure.to_string(), "Mail.s: not an address");
}

#[test]
fn cyclic_values_are_validated_once_per_cell() {
    let universe = Universe::from_entries(vec![TypeEntry::record(
        qn("Ring"),
        vec![
            FieldDef::new("Label", TypeRef::und(TypeRef::string())).with_constraint("def"),
            FieldDef::new("Next", TypeRef::ptr(named("Ring"))),
        ],
    )])
    .unwrap();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);

    let addr = rt
        .heap_mut()
        .alloc(typesynth_codegen::runtime::Cell::Value(Value::Pointer(None)));
    let ring = Value::record([
        ("Label", Value::defined(WrapperKind::Und, Value::str("a"))),
        ("Next", Value::Pointer(Some(addr))),
    ]);
    rt.heap_mut()
        .store(addr, typesynth_codegen::runtime::Cell::Value(ring.clone()))
        .unwrap();
    assert_eq!(rt.validate(&qn("Ring"), &ring).unwrap(), None);
}

#[test]
fn long_chains_are_validated_in_order() {
    let universe = Universe::from_entries(vec![
        TypeEntry::record(
            qn("Step"),
            vec![
                FieldDef::new("Label", TypeRef::und(TypeRef::string())).with_constraint("def"),
                FieldDef::new("Next", TypeRef::ptr(named("Step"))),
            ],
        ),
        TypeEntry::record(qn("Route"), vec![FieldDef::new("Head", TypeRef::ptr(named("Step")))]),
    ])
    .unwrap();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);

    let n = 3_000;
    let labels: Vec<Value> = (0..n)
        .map(|i| {
            if i == n - 1 {
                Value::undefined(WrapperKind::Und)
            } else {
                Value::defined(WrapperKind::Und, Value::str(&format!("s{}", i)))
            }
        })
        .collect();
    let mut next = Value::Pointer(None);
    for label in labels.into_iter().rev() {
        next = rt
            .heap_mut()
            .pointer(Value::record([("Label", label), ("Next", next)]));
    }
    let route = Value::record([("Head", next.clone())]);

    let failure = rt.validate(&qn("Route"), &route).unwrap().unwrap();
    assert!(failure.path.starts_with("Head.Next.Next"));
    assert!(failure.path.ends_with(".Label"));
    assert_eq!(failure.path.matches("Next").count(), n - 1);

    let copy = rt.clone_value(&qn("Route"), &route).unwrap();
    assert!(rt.deep_eq(&route, &copy).unwrap());
}

#[test]
fn constrained_type_arguments_are_validated() {
    let universe = Universe::from_entries(vec![
        TypeEntry::record(
            qn("Inner"),
            vec![FieldDef::new("X", TypeRef::und(TypeRef::int())).with_constraint("required")],
        ),
        TypeEntry::record(qn("Box"), vec![FieldDef::new("Value", TypeRef::param("T"))])
            .with_params(&["T"]),
        TypeEntry::record(
            qn("Outer"),
            vec![FieldDef::new(
                "B",
                TypeRef::generic("m", "Box", vec![named("Inner")]),
            )],
        ),
    ])
    .unwrap();
    let defs = synth(&universe);
    let rt = Runtime::new(&universe, &defs);

    let unset = Value::record([("X", Value::undefined(WrapperKind::Und))]);
    let set = Value::record([("X", Value::defined(WrapperKind::Und, Value::Int(3)))]);
    let outer = Value::record([("B", Value::record([("Value", unset.clone())]))]);
    let failure = rt.validate(&qn("Outer"), &outer).unwrap().unwrap();
    assert_eq!(failure.path, "B.Value.X");

    let outer = Value::record([("B", Value::record([("Value", set)]))]);
    assert_eq!(rt.validate(&qn("Outer"), &outer).unwrap(), None);

    // Called directly, the box checks its payload only when given a check.
    let boxed = Value::record([("Value", unset)]);
    assert_eq!(rt.validate(&qn("Box"), &boxed).unwrap(), None);
    let inner = [Some(NestedCheck::Call {
        target: qn("Inner"),
        callbacks: Vec::new(),
    })];
    let failure = rt.validate_with(&qn("Box"), &inner, &boxed).unwrap().unwrap();
    assert_eq!(failure.path, "Value.X");
}

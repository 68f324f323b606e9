//! Deep-copy behavior of synthesized clone functions.

use typesynth_check::CopyOp;
use typesynth_codegen::runtime::{Cell, HostKind, Runtime, Value};
use typesynth_codegen::{synthesize, Definition, SynthOptions, VecEmitter};
use typesynth_core::id::QualifiedName;
use typesynth_core::types::{Capability, FieldDef, ScalarType, TypeEntry, TypeRef, WrapperKind};
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

fn list_universe() -> Universe {
    Universe::from_entries(vec![
        TypeEntry::record(
            qn("Node"),
            vec![
                FieldDef::new("V", TypeRef::int()),
                FieldDef::new("Next", TypeRef::ptr(named("Node"))),
            ],
        ),
        TypeEntry::record(qn("Holder"), vec![FieldDef::new("Head", TypeRef::ptr(named("Node")))]),
    ])
    .unwrap()
}

fn node(v: i64, next: Value) -> Value {
    Value::record([("V", Value::Int(v)), ("Next", next)])
}

/// Builds an `n`-node list; with `circular` the last node points back at
/// the first.
fn chain(rt: &mut Runtime<'_>, n: usize, circular: bool) -> Value {
    let heap = rt.heap_mut();
    let addrs: Vec<usize> = (0..n)
        .map(|_| heap.alloc(Cell::Value(Value::Pointer(None))))
        .collect();
    for (i, addr) in addrs.iter().enumerate() {
        let next = match addrs.get(i + 1) {
            Some(a) => Value::Pointer(Some(*a)),
            None if circular => Value::Pointer(Some(addrs[0])),
            None => Value::Pointer(None),
        };
        heap.store(*addr, Cell::Value(node(i as i64, next))).unwrap();
    }
    Value::record([("Head", Value::Pointer(Some(addrs[0])))])
}

#[test]
fn linked_list_copies_every_node_once() {
    let universe = list_universe();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);
    let holder = chain(&mut rt, 5, false);

    let before = rt.heap().allocations();
    let copy = rt.clone_value(&qn("Holder"), &holder).unwrap();
    assert_eq!(rt.heap().allocations() - before, 5);
    assert!(rt.deep_eq(&holder, &copy).unwrap());
    assert!(!rt.shares_identity(&holder, &copy).unwrap());
}

#[test]
fn circular_list_terminates_and_keeps_its_shape() {
    let universe = list_universe();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);
    let holder = chain(&mut rt, 5, true);

    let before = rt.heap().allocations();
    let copy = rt.clone_value(&qn("Holder"), &holder).unwrap();
    assert_eq!(rt.heap().allocations() - before, 5);
    assert!(!rt.shares_identity(&holder, &copy).unwrap());

    // Walking five links from the copied head lands back on it.
    let head = match copy.field("Head").unwrap() {
        Value::Pointer(Some(addr)) => *addr,
        other => panic!("unexpected {:?}", other),
    };
    let mut at = head;
    for _ in 0..5 {
        at = match rt.heap().load(at).unwrap().field("Next").unwrap() {
            Value::Pointer(Some(addr)) => *addr,
            other => panic!("unexpected {:?}", other),
        };
    }
    assert_eq!(at, head);
}

#[test]
fn long_lists_copy_without_deep_recursion() {
    let universe = list_universe();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);
    for circular in [false, true] {
        let holder = chain(&mut rt, 5_000, circular);
        let before = rt.heap().allocations();
        let copy = rt.clone_value(&qn("Holder"), &holder).unwrap();
        assert_eq!(rt.heap().allocations() - before, 5_000);
        assert!(rt.deep_eq(&holder, &copy).unwrap());
        assert!(!rt.shares_identity(&holder, &copy).unwrap());
    }

    let a = chain(&mut rt, 5_000, false);
    let b = chain(&mut rt, 4_999, false);
    assert!(!rt.deep_eq(&a, &b).unwrap());
}

#[test]
fn cloning_twice_gives_equal_independent_copies() {
    let universe = list_universe();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);
    let holder = chain(&mut rt, 5, false);

    let first = rt.clone_value(&qn("Holder"), &holder).unwrap();
    let second = rt.clone_value(&qn("Holder"), &first).unwrap();
    assert!(rt.deep_eq(&first, &second).unwrap());
    assert!(!rt.shares_identity(&first, &second).unwrap());
}

#[test]
fn passthrough_fields_keep_identity() {
    let universe = Universe::from_entries(vec![
        TypeEntry::record(qn("Leaf"), vec![FieldDef::new("v", TypeRef::int())]),
        TypeEntry::record(
            qn("R"),
            vec![
                FieldDef::new("Own", TypeRef::ptr(named("Leaf"))),
                FieldDef::new("Cache", TypeRef::ptr(named("Leaf"))).with_copy("nocopy"),
            ],
        ),
    ])
    .unwrap();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);
    let own = rt.heap_mut().pointer(Value::record([("v", Value::Int(1))]));
    let cache = rt.heap_mut().pointer(Value::record([("v", Value::Int(2))]));
    let r = Value::record([("Own", own.clone()), ("Cache", cache.clone())]);

    let copy = rt.clone_value(&qn("R"), &r).unwrap();
    assert!(rt.deep_eq(&r, &copy).unwrap());
    assert_eq!(copy.field("Cache").unwrap(), &cache);
    assert!(!rt.shares_identity(&own, copy.field("Own").unwrap()).unwrap());
}

#[test]
fn ignored_fields_come_back_zeroed() {
    let universe = Universe::from_entries(vec![TypeEntry::record(
        qn("Job"),
        vec![
            FieldDef::new("Name", TypeRef::string()),
            FieldDef::new("attempts", TypeRef::int()).with_copy("ignore"),
        ],
    )])
    .unwrap();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);
    let job = Value::record([("Name", Value::str("build")), ("attempts", Value::Int(3))]);
    let copy = rt.clone_value(&qn("Job"), &job).unwrap();
    assert_eq!(
        copy,
        Value::record([("Name", Value::str("build")), ("attempts", Value::Int(0))])
    );
}

#[test]
fn generic_box_uses_caller_callbacks() {
    let universe = Universe::from_entries(vec![
        TypeEntry::record(qn("Leaf"), vec![FieldDef::new("v", TypeRef::int())]),
        TypeEntry::record(qn("Box"), vec![FieldDef::new("Value", TypeRef::param("T"))])
            .with_params(&["T"]),
        TypeEntry::record(
            qn("User"),
            vec![FieldDef::new(
                "Deep",
                TypeRef::generic("m", "Box", vec![TypeRef::ptr(named("Leaf"))]),
            )],
        ),
    ])
    .unwrap();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);

    let leaf = rt.heap_mut().pointer(Value::record([("v", Value::Int(9))]));
    let boxed = Value::record([("Value", leaf.clone())]);

    let direct = rt
        .clone_with(&qn("Box"), &[CopyOp::Pointer(Box::new(CopyOp::Assign))], &boxed)
        .unwrap();
    assert!(rt.deep_eq(&boxed, &direct).unwrap());
    assert!(!rt.shares_identity(&boxed, &direct).unwrap());

    let user = Value::record([("Deep", boxed)]);
    let copy = rt.clone_value(&qn("User"), &user).unwrap();
    assert!(rt.deep_eq(&user, &copy).unwrap());
    assert!(!rt.shares_identity(&user, &copy).unwrap());

    // Without a callback for T the generated clone cannot copy the value.
    assert!(rt.clone_with(&qn("Box"), &[], &Value::record([("Value", leaf)])).is_err());
}

#[test]
fn clone_capability_is_delegated_to_the_host() {
    let universe = Universe::from_entries(vec![
        TypeEntry::record(qn("Secret"), vec![FieldDef::new("key", TypeRef::scalar(ScalarType::Bytes))])
            .with_method(Capability::Clone, "Copy"),
        TypeEntry::record(
            qn("Vault"),
            vec![FieldDef::new("Secrets", TypeRef::seq(named("Secret")))],
        ),
    ])
    .unwrap();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);
    rt.register_host(qn("Secret"), HostKind::Clone, |_, v| {
        let mut out = v.clone();
        if let Value::Record(fields) = &mut out {
            fields.insert("key".into(), Value::Bytes(b"redacted".to_vec()));
        }
        Ok(out)
    });

    let secrets = rt
        .heap_mut()
        .sequence(vec![Value::record([("key", Value::Bytes(b"k1".to_vec()))])]);
    let vault = Value::record([("Secrets", secrets)]);
    let copy = rt.clone_value(&qn("Vault"), &vault).unwrap();
    let items = rt.heap().elements(copy.field("Secrets").unwrap()).unwrap();
    assert_eq!(
        items,
        vec![Value::record([("key", Value::Bytes(b"redacted".to_vec()))])]
    );
}

#[test]
fn wrappers_copy_defined_payloads_only() {
    let universe = Universe::from_entries(vec![TypeEntry::record(
        qn("Opt"),
        vec![FieldDef::new("Tags", TypeRef::option(TypeRef::seq(TypeRef::string())))],
    )])
    .unwrap();
    let defs = synth(&universe);
    let mut rt = Runtime::new(&universe, &defs);

    let null = Value::record([("Tags", Value::null(WrapperKind::Option))]);
    assert_eq!(rt.clone_value(&qn("Opt"), &null).unwrap(), null);

    let tags = rt.heap_mut().sequence(vec![Value::str("a")]);
    let set = Value::record([("Tags", Value::defined(WrapperKind::Option, tags))]);
    let copy = rt.clone_value(&qn("Opt"), &set).unwrap();
    assert!(rt.deep_eq(&set, &copy).unwrap());
    assert!(!rt.shares_identity(&set, &copy).unwrap());
}

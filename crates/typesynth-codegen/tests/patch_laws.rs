//! Algebraic laws of synthesized patch operations.

use proptest::prelude::*;

use typesynth_codegen::runtime::{Runtime, Value};
use typesynth_codegen::{synthesize, Definition, FunctionKind, SynthOptions, VecEmitter};
use typesynth_core::id::QualifiedName;
use typesynth_core::types::{FieldDef, TypeEntry, TypeRef, WrapperKind};
use typesynth_core::universe::Universe;

fn profile_name() -> QualifiedName {
    QualifiedName::new("m", "Profile")
}

fn universe() -> Universe {
    Universe::from_entries(vec![TypeEntry::record(
        profile_name(),
        vec![
            FieldDef::new("Name", TypeRef::string()),
            FieldDef::new("Nick", TypeRef::option(TypeRef::string())),
            FieldDef::new("Note", TypeRef::und(TypeRef::int())),
            FieldDef::new("Age", TypeRef::int()),
            FieldDef::new("session", TypeRef::string()).with_copy("ignore"),
        ],
    )])
    .unwrap()
}

fn definitions(universe: &Universe) -> Vec<Definition> {
    let mut emitter = VecEmitter::new();
    synthesize(universe, &SynthOptions::default(), &mut emitter).unwrap();
    emitter.definitions
}

fn option_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::null(WrapperKind::Option)),
        "[a-z]{0,6}".prop_map(|s| Value::defined(WrapperKind::Option, Value::Str(s))),
    ]
}

fn und_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::null(WrapperKind::Und)),
        Just(Value::undefined(WrapperKind::Und)),
        any::<i64>().prop_map(|n| Value::defined(WrapperKind::Und, Value::Int(n))),
    ]
}

/// Profiles as patch operations produce them: the ignored field is zero.
fn profile() -> impl Strategy<Value = Value> {
    ("[a-z]{0,8}", option_value(), und_value(), any::<i64>()).prop_map(|(name, nick, note, age)| {
        Value::record([
            ("Name", Value::Str(name)),
            ("Nick", nick),
            ("Note", note),
            ("Age", Value::Int(age)),
            ("session", Value::Str(String::new())),
        ])
    })
}

fn entry(inner: impl Strategy<Value = Value>) -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::undefined(WrapperKind::Und)),
        Just(Value::null(WrapperKind::Und)),
        inner.prop_map(|v| Value::defined(WrapperKind::Und, v)),
    ]
}

fn patch() -> impl Strategy<Value = Value> {
    (
        entry("[a-z]{0,8}".prop_map(Value::Str)),
        entry(option_value()),
        entry(und_value()),
        entry(any::<i64>().prop_map(Value::Int)),
    )
        .prop_map(|(name, nick, note, age)| {
            Value::record([("Name", name), ("Nick", nick), ("Note", note), ("Age", age)])
        })
}

fn empty_patch() -> Value {
    Value::record(
        ["Name", "Nick", "Note", "Age"]
            .into_iter()
            .map(|f| (f, Value::undefined(WrapperKind::Und))),
    )
}

#[test]
fn companion_has_four_functions() {
    let universe = universe();
    let defs = definitions(&universe);
    let rt = Runtime::new(&universe, &defs);
    for kind in [
        FunctionKind::PatchFromValue,
        FunctionKind::PatchToValue,
        FunctionKind::PatchMerge,
        FunctionKind::PatchApply,
    ] {
        assert!(rt.function(&profile_name(), kind).is_some(), "missing {:?}", kind);
    }
}

#[test]
fn null_entries_resolve_to_absent_values() {
    let universe = universe();
    let defs = definitions(&universe);
    let rt = Runtime::new(&universe, &defs);
    let original = Value::record([
        ("Name", Value::str("ada")),
        ("Nick", Value::defined(WrapperKind::Option, Value::str("a"))),
        ("Note", Value::defined(WrapperKind::Und, Value::Int(1))),
        ("Age", Value::Int(36)),
        ("session", Value::str("tok")),
    ]);
    let clear = Value::record([
        ("Name", Value::undefined(WrapperKind::Und)),
        ("Nick", Value::null(WrapperKind::Und)),
        ("Note", Value::null(WrapperKind::Und)),
        ("Age", Value::null(WrapperKind::Und)),
    ]);
    let applied = rt.patch_apply(&profile_name(), &original, &clear).unwrap();
    assert_eq!(
        applied,
        Value::record([
            ("Name", Value::str("ada")),
            ("Nick", Value::null(WrapperKind::Option)),
            ("Note", Value::null(WrapperKind::Und)),
            ("Age", Value::Int(0)),
            ("session", Value::str("")),
        ])
    );
}

#[test]
fn unset_entries_resolve_to_zero_values() {
    let universe = universe();
    let defs = definitions(&universe);
    let rt = Runtime::new(&universe, &defs);
    let value = rt.patch_to_value(&profile_name(), &empty_patch()).unwrap();
    assert_eq!(
        value,
        Value::record([
            ("Name", Value::str("")),
            ("Nick", Value::null(WrapperKind::Option)),
            ("Note", Value::undefined(WrapperKind::Und)),
            ("Age", Value::Int(0)),
            ("session", Value::str("")),
        ])
    );
}

proptest! {
    #[test]
    fn empty_patch_is_identity(v in profile()) {
        let universe = universe();
        let defs = definitions(&universe);
        let rt = Runtime::new(&universe, &defs);
        let applied = rt.patch_apply(&profile_name(), &v, &empty_patch()).unwrap();
        prop_assert_eq!(applied, v);
    }

    #[test]
    fn full_patch_replaces_the_value(v in profile(), w in profile()) {
        let universe = universe();
        let defs = definitions(&universe);
        let rt = Runtime::new(&universe, &defs);
        let p = rt.patch_from_value(&profile_name(), &w).unwrap();
        let applied = rt.patch_apply(&profile_name(), &v, &p).unwrap();
        prop_assert_eq!(applied, w);
    }

    #[test]
    fn merge_is_associative(a in patch(), b in patch(), c in patch()) {
        let universe = universe();
        let defs = definitions(&universe);
        let rt = Runtime::new(&universe, &defs);
        let name = profile_name();
        let left = rt.patch_merge(&name, &rt.patch_merge(&name, &a, &b).unwrap(), &c).unwrap();
        let right = rt.patch_merge(&name, &a, &rt.patch_merge(&name, &b, &c).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    #[test]
    fn merge_prefers_every_entry_the_right_side_sets(p in patch(), q in patch()) {
        let universe = universe();
        let defs = definitions(&universe);
        let rt = Runtime::new(&universe, &defs);
        let merged = rt.patch_merge(&profile_name(), &p, &q).unwrap();
        for field in ["Name", "Nick", "Note", "Age"] {
            let right = q.field(field).unwrap();
            let expected = if *right == Value::undefined(WrapperKind::Und) {
                p.field(field).unwrap()
            } else {
                right
            };
            prop_assert_eq!(merged.field(field).unwrap(), expected);
        }
    }

    #[test]
    fn empty_patch_is_a_merge_identity(p in patch()) {
        let universe = universe();
        let defs = definitions(&universe);
        let rt = Runtime::new(&universe, &defs);
        let name = profile_name();
        prop_assert_eq!(rt.patch_merge(&name, &p, &empty_patch()).unwrap(), p.clone());
        prop_assert_eq!(rt.patch_merge(&name, &empty_patch(), &p).unwrap(), p);
    }

    #[test]
    fn applying_twice_equals_applying_the_merge(v in profile(), p in patch(), q in patch()) {
        let universe = universe();
        let defs = definitions(&universe);
        let rt = Runtime::new(&universe, &defs);
        let name = profile_name();
        let stepwise = rt
            .patch_apply(&name, &rt.patch_apply(&name, &v, &p).unwrap(), &q)
            .unwrap();
        let merged = rt
            .patch_apply(&name, &v, &rt.patch_merge(&name, &p, &q).unwrap())
            .unwrap();
        prop_assert_eq!(stepwise, merged);
    }
}

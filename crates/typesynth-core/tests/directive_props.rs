//! Properties of the constraint-channel parser.

use proptest::prelude::*;

use typesynth_core::directive::parse_constraint;
use typesynth_core::{LenOp, LenRelation, Presence};

const STATES: [&str; 5] = ["required", "def", "null", "und", "nullish"];

fn len_op() -> impl Strategy<Value = LenOp> {
    prop_oneof![
        Just(LenOp::Eq),
        Just(LenOp::Gt),
        Just(LenOp::Ge),
        Just(LenOp::Lt),
        Just(LenOp::Le),
    ]
}

proptest! {
    #[test]
    fn printed_length_relations_parse_back(op in len_op(), bound in 0usize..10_000) {
        let rel = LenRelation { op, bound };
        let c = parse_constraint(&rel.to_string()).unwrap();
        prop_assert_eq!(c.len, Some(rel));
        prop_assert!(c.states.is_none());
    }

    #[test]
    fn token_order_and_spacing_do_not_matter(
        picks in prop::sample::subsequence(STATES.to_vec(), 1..=5).prop_shuffle(),
        nonnull in any::<bool>(),
    ) {
        let mut tokens: Vec<&str> = picks.clone();
        if nonnull {
            tokens.push("values:nonnull");
        }
        let compact = parse_constraint(&tokens.join(",")).unwrap();
        tokens.reverse();
        let spaced = parse_constraint(&format!(" {} ", tokens.join(" , "))).unwrap();
        prop_assert_eq!(compact, spaced);
        prop_assert_eq!(compact.values_non_null, nonnull);
    }

    #[test]
    fn defined_is_allowed_only_when_named(
        picks in prop::sample::subsequence(STATES.to_vec(), 1..=5),
    ) {
        let c = parse_constraint(&picks.join(",")).unwrap();
        let named = picks.contains(&"required") || picks.contains(&"def");
        prop_assert_eq!(c.allows(Presence::Defined), named);
        let absent = picks.contains(&"nullish");
        prop_assert_eq!(c.allows(Presence::Null), absent || picks.contains(&"null"));
        prop_assert_eq!(c.allows(Presence::Undefined), absent || picks.contains(&"und"));
    }
}

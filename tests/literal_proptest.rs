//! Property-based tests for literal coercion and condition evaluation
//!
//! Coercion is total: any directive text yields a value, in the fixed order
//! quoted string, boolean, integer, float, raw string.

use proptest::prelude::*;
use sieve::{Comparison, Condition, Test, Value};

fn comparison_strategy() -> impl Strategy<Value = Comparison> {
    prop_oneof![
        Just(Comparison::Eq),
        Just(Comparison::Ne),
        Just(Comparison::Gt),
        Just(Comparison::Gte),
        Just(Comparison::Lt),
        Just(Comparison::Lte),
    ]
}

/// Literal texts as they appear after an operator
fn literal_text_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,8}",
        "-?[0-9]{1,6}",
        "[0-9]{1,3}\\.[0-9]{1,3}",
        Just("true".to_string()),
        Just("false".to_string()),
        "\"[a-z0-9 ]{0,8}\"",
    ]
}

proptest! {
    #[test]
    fn integers_coerce_to_integers(n in any::<i64>()) {
        prop_assert_eq!(Value::coerce(&n.to_string()), Value::Int(n));
    }

    #[test]
    fn quoted_text_is_always_a_string(inner in "[^\"']{0,16}") {
        let quoted = format!("\"{}\"", inner);
        prop_assert_eq!(Value::coerce(&quoted), Value::Str(inner));
    }

    #[test]
    fn surrounding_whitespace_is_ignored(text in "\\PC{0,20}") {
        let padded = format!("  {}\t", text);
        prop_assert_eq!(Value::coerce(&padded), Value::coerce(&text));
    }

    #[test]
    fn negation_inverts_every_outcome(
        op in comparison_strategy(),
        literal in literal_text_strategy(),
        flag in prop::option::of(literal_text_strategy()),
    ) {
        let condition = Condition::new("f", Test::Compare(op, Value::coerce(&literal)));
        let value = flag.as_deref().map(Value::coerce);
        prop_assert_eq!(
            condition.clone().negated().evaluate(value.as_ref()),
            !condition.evaluate(value.as_ref())
        );
    }
}

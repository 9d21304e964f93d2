//! Evaluation laws checked over generated inputs.

use proptest::prelude::*;
use rill_core::{Context, Value};
use rill_eval::{Evaluator, Expr, Outcome};

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn plus_steps(increments: &[i32], with_delay: bool) -> Expr {
    let mut steps = Vec::new();
    for increment in increments {
        steps.push(Expr::step("core.plus", vec![Expr::literal(*increment)]));
        if with_delay {
            steps.push(Expr::step("core.delay", vec![Expr::literal(0)]));
        }
    }
    Expr::pipeline(steps)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_empty_pipeline_is_identity(data in json_value()) {
        let evaluator = Evaluator::with_builtins();
        let ctx = Context::new(data.clone());
        let outcome = evaluator.evaluate(&Expr::pipeline(vec![]), &ctx).unwrap();
        prop_assert!(matches!(outcome, Outcome::Ready(ref value) if *value == data));
    }

    #[test]
    fn prop_sync_pipeline_is_ready(start in any::<i32>(), increments in prop::collection::vec(any::<i32>(), 0..8)) {
        let evaluator = Evaluator::with_builtins();
        let ctx = Context::new(Value::from(start));
        let outcome = evaluator.evaluate(&plus_steps(&increments, false), &ctx).unwrap();
        let expected = i64::from(start) + increments.iter().map(|i| i64::from(*i)).sum::<i64>();
        prop_assert!(matches!(outcome, Outcome::Ready(ref value) if *value == Value::from(expected)));
    }

    #[test]
    fn prop_async_steps_match_sync(start in any::<i32>(), increments in prop::collection::vec(any::<i32>(), 1..5)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let evaluator = Evaluator::with_builtins();
        let sync = evaluator
            .evaluate(&plus_steps(&increments, false), &Context::new(Value::from(start)))
            .unwrap();
        let delayed = runtime
            .block_on(evaluator.evaluate_value(&plus_steps(&increments, true), &Context::new(Value::from(start))))
            .unwrap();
        let Outcome::Ready(sync) = sync else {
            panic!("synchronous pipeline suspended");
        };
        prop_assert_eq!(delayed, Some(sync));
    }
}

//! Integration tests for business-code and composite-key uniqueness.

use proptest::prelude::*;
use recordkit_core::{Config, Database, EngineError, Model};
use recordkit_testkit::prelude::*;
use std::collections::HashSet;

const KEY: [&str; 2] = ["order_id", "customer_name"];

#[test]
fn new_entity_sees_existing_codes() {
    let db = TestDatabase::new();
    let scope = db.scope();
    let draft = Model::new(&scope, sample_order("SO000001", "Acme", 0));
    assert!(!draft.check_business_code_exist("order_id", "SO000001").unwrap());

    db.seed(sample_order("SO000001", "Acme", 0));
    assert!(draft.check_business_code_exist("order_id", "SO000001").unwrap());
    assert!(!draft.check_business_code_exist("order_id", "SO000002").unwrap());
}

#[test]
fn saved_entity_is_not_its_own_duplicate() {
    let db = TestDatabase::new();
    let saved = db.seed(sample_order("SO000001", "Acme", 0));

    let scope = db.scope();
    let model = Model::new(&scope, saved.clone());
    assert!(!model.check_business_code_exist("order_id", "SO000001").unwrap());
    model.business_code_cannot_repeat("order_id", "SO000001").unwrap();

    let other = db.seed(sample_order("SO000002", "Beta", 0));
    let model = Model::new(&scope, other);
    assert!(model.check_business_code_exist("order_id", "SO000001").unwrap());
    match model.business_code_cannot_repeat("sales_order.order_id", "SO000001") {
        Err(EngineError::Duplicate { table, column, value }) => {
            assert_eq!(table, "sales_order");
            assert_eq!(column, "sales_order.order_id");
            assert_eq!(value, "SO000001");
        }
        other => panic!("expected a duplicate error, got {other:?}"),
    }
}

#[test]
fn two_matches_are_always_duplicates() {
    let db = TestDatabase::new();
    let first = db.seed(sample_order("SO000001", "Acme", 0));
    db.seed(sample_order("SO000002", "Acme", 0));
    let scope = db.scope();
    let model = Model::new(&scope, first);
    assert!(model.check_business_code_exist("customer_name", "Acme").unwrap());
}

#[test]
fn deleted_rows_do_not_count() {
    let db = TestDatabase::new();
    let saved = db.seed(sample_order("SO000001", "Acme", 0));
    let scope = db.scope();
    let model = Model::new(&scope, SalesOrder::default());
    model.del(&[saved.audit.id]).unwrap();
    assert!(!model.check_business_code_exist("order_id", "SO000001").unwrap());
    assert_eq!(
        model.check_business_codes_exist("order_id", &["SO000001"]).unwrap(),
        [false]
    );
}

#[test]
fn malformed_columns_are_rejected() {
    let db = TestDatabase::new();
    let scope = db.scope();
    let model = Model::new(&scope, SalesOrder::default());
    assert!(matches!(
        model.check_business_code_exist("order_id = 1 or 1", "x"),
        Err(EngineError::InvalidColumn { .. })
    ));
    assert!(matches!(
        model.check_unique_keys_exist(&["order_id", "a.b.c"], &["x", "y"]),
        Err(EngineError::InvalidColumn { .. })
    ));
}

#[test]
fn batch_codes_line_up_with_input() {
    let db = TestDatabase::new();
    db.seed(sample_order("SO000001", "Acme", 0));
    db.seed(sample_order("SO000003", "Acme", 0));
    let scope = db.scope();
    let model = Model::new(&scope, SalesOrder::default());
    let found = model
        .check_business_codes_exist("order_id", &["SO000003", "SO000002", "SO000001"])
        .unwrap();
    assert_eq!(found, [true, false, true]);
    let none: [&str; 0] = [];
    assert!(model.check_business_codes_exist("order_id", &none).unwrap().is_empty());
}

#[test]
fn composite_key_single_check() {
    let db = TestDatabase::new();
    let saved = db.seed(sample_order("A", "X", 0));
    let scope = db.scope();

    let draft = Model::new(&scope, SalesOrder::default());
    assert!(draft.check_unique_keys_exist(&KEY, &["A", "X"]).unwrap());
    assert!(!draft.check_unique_keys_exist(&KEY, &["A", "Y"]).unwrap());

    let own = Model::new(&scope, saved);
    assert!(!own.check_unique_keys_exist(&KEY, &["A", "X"]).unwrap());

    assert!(matches!(
        draft.check_unique_keys_exist(&KEY, &["A"]),
        Err(EngineError::InvalidArgument { .. })
    ));
    let no_values: [&str; 0] = [];
    assert!(matches!(
        draft.check_unique_keys_exist(&[], &no_values),
        Err(EngineError::InvalidArgument { .. })
    ));
}

#[test]
fn composite_batch_reports_each_candidate() {
    let db = TestDatabase::new();
    db.seed(sample_order("A", "X", 0));
    let scope = db.scope();
    let model = Model::new(&scope, SalesOrder::default());

    let found = model
        .check_unique_keys_exist_batch(&KEY, &[vec!["A", "X"], vec!["B", "Y"]], &[])
        .unwrap();
    assert_eq!(found, [true, false]);
}

#[test]
fn delimiter_inside_values_does_not_collide() {
    for config in [Config::new(), Config::new().fingerprint_delimiter("|")] {
        let delimiter = config.fingerprint_delimiter;
        let db = TestDatabase::with_config(config);
        db.seed(sample_order(&format!("A{delimiter}B"), "C", 0));
        let scope = db.scope();
        let model = Model::new(&scope, SalesOrder::default());

        let candidates = vec![
            vec![format!("A{delimiter}B"), "C".to_string()],
            vec!["A".to_string(), format!("B{delimiter}C")],
        ];
        let found = model.check_unique_keys_exist_batch(&KEY, &candidates, &[]).unwrap();
        assert_eq!(found, [true, false]);
    }
}

#[test]
fn composite_batch_honours_exclusions() {
    let db = TestDatabase::new();
    let saved = db.seed(sample_order("A", "X", 0));
    let scope = db.scope();
    let model = Model::new(&scope, SalesOrder::default());
    let found = model
        .check_unique_keys_exist_batch(&KEY, &[vec!["A", "X"]], &[saved.audit.id])
        .unwrap();
    assert_eq!(found, [false]);

    let twin = db.seed(sample_order("A", "X", 0));
    let found = model
        .check_unique_keys_exist_batch(&KEY, &[vec!["A", "X"]], &[saved.audit.id])
        .unwrap();
    assert_eq!(found, [true]);
    let found = model
        .check_unique_keys_exist_batch(&KEY, &[vec!["A", "X"]], &[saved.audit.id, twin.audit.id])
        .unwrap();
    assert_eq!(found, [false]);
}

#[test]
fn composite_batch_argument_errors() {
    let db = TestDatabase::new();
    let scope = db.scope();
    let model = Model::new(&scope, SalesOrder::default());
    let empty: Vec<Vec<&str>> = Vec::new();
    assert!(model.check_unique_keys_exist_batch(&KEY, &empty, &[]).unwrap().is_empty());
    assert!(matches!(
        model.check_unique_keys_exist_batch(&[], &[vec!["A"]], &[]),
        Err(EngineError::InvalidArgument { .. })
    ));
    assert!(matches!(
        model.check_unique_keys_exist_batch(&KEY, &[vec!["A", "X"], vec!["B"]], &[]),
        Err(EngineError::InvalidArgument { .. })
    ));
}

#[test]
fn oversized_batch_fails_before_querying() {
    let store = CountingStore::new();
    let calls = store.calls();
    let db = Database::open(store);
    let scope = db.request().actor("u1", "Alice").build();
    let model = Model::new(&scope, SalesOrder::default());

    let candidates: Vec<Vec<String>> = (0..501)
        .map(|n| vec![format!("SO{n:06}"), "Acme".to_string()])
        .collect();
    let err = model
        .check_unique_keys_exist_batch(&KEY, &candidates, &[])
        .unwrap_err();
    assert!(matches!(err, EngineError::BatchTooLarge { size: 501, limit: 500 }));
    assert_eq!(calls.queries(), 0);

    let codes: Vec<String> = candidates.iter().map(|c| c[0].clone()).collect();
    assert!(matches!(
        model.check_business_codes_exist("order_id", &codes),
        Err(EngineError::BatchTooLarge { .. })
    ));
    assert_eq!(calls.queries(), 0);

    model
        .check_unique_keys_exist_batch(&KEY, &candidates[..500], &[])
        .unwrap();
    assert_eq!(calls.finds(), 1);
}

#[test]
fn batch_limit_is_configurable() {
    let db = TestDatabase::with_config(Config::new().batch_limit(2));
    let scope = db.scope();
    let model = Model::new(&scope, SalesOrder::default());
    let candidates = vec![vec!["A", "X"], vec!["B", "X"], vec!["C", "X"]];
    assert!(matches!(
        model.check_unique_keys_exist_batch(&KEY, &candidates, &[]),
        Err(EngineError::BatchTooLarge { size: 3, limit: 2 })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn batch_agrees_with_single_checks(
        existing in key_candidates_strategy(4),
        candidates in key_candidates_strategy(6),
    ) {
        let db = TestDatabase::new();
        for (order_id, customer) in &existing {
            db.seed(sample_order(order_id, customer, 0));
        }
        let scope = db.scope();
        let model = Model::new(&scope, SalesOrder::default());

        let tuples: Vec<Vec<String>> = candidates
            .iter()
            .map(|(a, b)| vec![a.clone(), b.clone()])
            .collect();
        let batch = model.check_unique_keys_exist_batch(&KEY, &tuples, &[]).unwrap();

        let present: HashSet<_> = existing.iter().collect();
        prop_assert_eq!(batch.len(), candidates.len());
        for (found, candidate) in batch.iter().zip(&candidates) {
            prop_assert_eq!(*found, present.contains(candidate));
            let single = model
                .check_unique_keys_exist(&KEY, &[candidate.0.clone(), candidate.1.clone()])
                .unwrap();
            prop_assert_eq!(*found, single);
        }
    }
}

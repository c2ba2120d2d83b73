#![allow(missing_docs)]

use std::sync::Arc;

use fedql::backing::MemoryBacking;
use fedql::query::intermediate::IntermediateTable;
use fedql::{Catalog, Engine, Permissions, SemanticType, TableSchema, Value};
use proptest::prelude::*;

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::from_schemas([
            TableSchema::new("Item")
                .field("ID", SemanticType::Integer, "primary")
                .field("Key", SemanticType::Integer, "")
                .field("Label", SemanticType::Text, ""),
            TableSchema::new("Tag")
                .field("ID", SemanticType::Integer, "primary")
                .field("ItemID", SemanticType::Integer, ""),
        ])
        .expect("catalog"),
    )
}

/// Rows with ascending ids so input order is observable.
fn item_rows(keys: &[i64]) -> Vec<Vec<Value>> {
    keys.iter()
        .enumerate()
        .map(|(idx, key)| {
            vec![
                Value::Integer(idx as i64),
                Value::Integer(*key),
                Value::from(format!("item-{idx}")),
            ]
        })
        .collect()
}

fn engine_with(keys: &[i64], permissions: Permissions) -> Engine {
    let catalog = catalog();
    let backing = Arc::new(MemoryBacking::new(Arc::clone(&catalog)));
    backing.insert_rows("items", item_rows(keys)).expect("rows");
    let mut engine = Engine::new(catalog);
    engine.set_permissions(permissions);
    engine.set_backing(backing);
    engine
}

fn ints(rows: &fedql::ResultRows, column: &str) -> Vec<i64> {
    rows.iter()
        .map(|row| match row.get(column) {
            Some(Value::Integer(v)) => *v,
            other => panic!("expected integer in {column}, got {other:?}"),
        })
        .collect()
}

proptest! {
    #[test]
    fn filter_none_is_identity(keys in prop::collection::vec(-50i64..50, 0..40)) {
        let catalog = catalog();
        let table = Arc::clone(catalog.table("items").unwrap());
        let relation = IntermediateTable::from_source(table, None, item_rows(&keys));
        prop_assert_eq!(relation.clone().filter(None).unwrap(), relation);
    }

    #[test]
    fn filter_keeps_matching_rows_in_order(
        keys in prop::collection::vec(-50i64..50, 0..40),
        threshold in -60i64..60,
    ) {
        let engine = engine_with(&keys, Permissions::SELECT);
        let rows = engine
            .execute(&format!("select id from items where key > {threshold}"))
            .unwrap();
        let expected: Vec<i64> = keys
            .iter()
            .enumerate()
            .filter(|(_, key)| **key > threshold)
            .map(|(idx, _)| idx as i64)
            .collect();
        prop_assert_eq!(ints(&rows, "id"), expected);
    }

    #[test]
    fn order_by_is_stable(keys in prop::collection::vec(0i64..5, 0..40), descending in any::<bool>()) {
        let engine = engine_with(&keys, Permissions::SELECT);
        let direction = if descending { "desc" } else { "asc" };
        let rows = engine
            .execute(&format!("select id, key from items order by key {direction}"))
            .unwrap();
        let ids = ints(&rows, "id");
        let sorted = ints(&rows, "key");
        prop_assert_eq!(ids.len(), keys.len());
        for pair in ids.windows(2).zip(sorted.windows(2)) {
            let (id_pair, key_pair) = pair;
            if key_pair[0] == key_pair[1] {
                prop_assert!(id_pair[0] < id_pair[1]);
            } else if descending {
                prop_assert!(key_pair[0] > key_pair[1]);
            } else {
                prop_assert!(key_pair[0] < key_pair[1]);
            }
        }
    }

    #[test]
    fn limit_truncates_without_reordering(
        keys in prop::collection::vec(-20i64..20, 0..30),
        limit in 0usize..40,
    ) {
        let engine = engine_with(&keys, Permissions::SELECT);
        let all = engine.execute("select id from items order by key").unwrap();
        let limited = engine
            .execute(&format!("select id from items order by key limit {limit}"))
            .unwrap();
        prop_assert_eq!(limited.len(), limit.min(keys.len()));
        prop_assert_eq!(&all.0[..limited.len()], &limited.0[..]);
    }

    #[test]
    fn wildcard_width_matches_declared_columns(keys in prop::collection::vec(any::<i64>(), 1..10)) {
        let engine = engine_with(&keys, Permissions::SELECT);
        let rows = engine.execute("select * from items").unwrap();
        for row in &rows {
            prop_assert_eq!(row.len(), 3);
        }
    }

    #[test]
    fn count_star_returns_one_row(keys in prop::collection::vec(any::<i64>(), 0..50)) {
        let engine = engine_with(&keys, Permissions::SELECT);
        let rows = engine.execute("select count(*) from items").unwrap();
        prop_assert_eq!(rows.len(), 1);
        prop_assert_eq!(rows.0[0].get("count"), Some(&Value::Integer(keys.len() as i64)));
    }

    #[test]
    fn missing_permission_bit_denies(bits in 0u8..16) {
        let permissions = Permissions::from_bits(bits);
        let engine = engine_with(&[1, 2, 3], permissions);
        let result = engine.execute("select * from items");
        if bits & Permissions::SELECT.bits() == 0 {
            prop_assert_eq!(result.unwrap_err().code(), "PermissionDenied");
        } else {
            prop_assert!(result.is_ok());
        }
        prop_assert_eq!(engine.catalog().len(), 2);
    }

    #[test]
    fn unmatched_join_is_empty(keys in prop::collection::vec(any::<i64>(), 0..20)) {
        let engine = engine_with(&keys, Permissions::SELECT);
        let rows = engine
            .execute("select * from items join tags on items.id = tags.item_id")
            .unwrap();
        prop_assert!(rows.is_empty());
    }
}

#[test]
fn avg_over_empty_set_is_division_by_zero() {
    let engine = engine_with(&[], Permissions::SELECT);
    let err = engine.execute("select avg(key) from items").unwrap_err();
    assert_eq!(err.code(), "DivisionByZero");
    let err = engine
        .execute("select avg(key) from items where key > 0")
        .unwrap_err();
    assert_eq!(err.code(), "DivisionByZero");
}

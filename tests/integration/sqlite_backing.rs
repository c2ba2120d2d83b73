#![allow(missing_docs)]

use std::sync::Arc;

use fedql::backing::{SqliteBacking, SqliteMode};
use fedql::{Catalog, Engine, Permissions, SemanticType, TableSchema, Value};

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::from_schemas([
            TableSchema::new("Account")
                .field("ID", SemanticType::Integer, "primary")
                .field("Name", SemanticType::Text, "")
                .field("Email", SemanticType::Text, "comment='Not validated'")
                .field("Active", SemanticType::Bool, "")
                .field("CreatedAt", SemanticType::Timestamp, "")
                .field("OrganizationID", SemanticType::Integer, "")
                .field("Password", SemanticType::Text, "-"),
            TableSchema::new("Organization")
                .field("ID", SemanticType::Integer, "primary")
                .field("Name", SemanticType::Text, ""),
        ])
        .expect("catalog"),
    )
}

const SEED: &str = "
    INSERT INTO organizations (id, name) VALUES (1, 'Acme'), (2, 'Globex');
    INSERT INTO accounts (id, name, email, active, created_at, organization_id)
    VALUES
        (1, 'John', 'john@aol.com', 1, '2024-01-02T03:04:05Z', 1),
        (2, 'Jane', NULL, 0, 1700000000, 2),
        (3, 'George', 'george@example.com', 1, NULL, 1);
";

fn engine(mode: SqliteMode, permissions: Permissions) -> (tempfile::TempDir, Engine) {
    let dir = tempfile::tempdir().expect("tempdir");
    let catalog = catalog();
    let backing = SqliteBacking::open(&dir.path().join("fedql.db"), mode).expect("open");
    backing.create_schema(&catalog).expect("schema");
    backing.execute_batch(SEED).expect("seed");
    let mut engine = Engine::new(catalog);
    engine.set_permissions(permissions);
    engine.set_backing(Arc::new(backing));
    (dir, engine)
}

#[test]
fn populate_mode_evaluates_locally() {
    let (_dir, engine) = engine(SqliteMode::Populate, Permissions::SELECT);
    let rows = engine
        .execute("select name from accounts where active = true order by name")
        .unwrap();
    assert_eq!(rows.to_string(), "George\nJohn");

    let rows = engine
        .execute("select created_at from accounts where id = 2")
        .unwrap();
    assert_eq!(rows.0[0].get("created_at"), Some(&Value::Timestamp(1_700_000_000)));

    let rows = engine
        .execute(
            "select a.name, o.name from accounts a join organizations o \
             on a.organization_id = o.id where o.name = 'Acme'",
        )
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn populate_mode_rejects_mutations() {
    let (_dir, engine) = engine(SqliteMode::Populate, Permissions::ALL);
    let err = engine
        .execute("update accounts set name = 'x'")
        .unwrap_err();
    assert_eq!(err.code(), "UnsupportedExpression");
}

#[test]
fn pass_through_expands_wildcards_to_declared_columns() {
    let (_dir, engine) = engine(SqliteMode::PassThrough, Permissions::SELECT);
    let rows = engine.execute("select * from accounts where id = 1").unwrap();
    assert_eq!(
        rows.columns(),
        vec!["id", "name", "email", "active", "created_at", "organization_id"]
    );
    assert!(rows.0[0].get("password").is_none());
}

#[test]
fn pass_through_mutations_respect_permissions() {
    let (_dir, engine) = engine(
        SqliteMode::PassThrough,
        Permissions::SELECT | Permissions::INSERT,
    );
    let rows = engine
        .execute("insert into accounts (id, name, organization_id) values (4, 'Ada', 2)")
        .unwrap();
    assert!(rows.is_empty());
    let rows = engine
        .execute("select name from accounts where organization_id = 2 order by id")
        .unwrap();
    assert_eq!(rows.to_string(), "Jane\nAda");

    for sql in ["update accounts set name = 'x'", "delete from accounts"] {
        assert_eq!(engine.execute(sql).unwrap_err().code(), "PermissionDenied");
    }
    assert_eq!(
        engine
            .execute("insert into people (id) values (1)")
            .unwrap_err()
            .code(),
        "UnknownTable"
    );
}

#[test]
fn schema_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fedql.db");
    let catalog = catalog();
    {
        let backing = SqliteBacking::open(&path, SqliteMode::Populate).unwrap();
        backing.create_schema(&catalog).unwrap();
        backing.execute_batch(SEED).unwrap();
    }
    let backing = SqliteBacking::open(&path, SqliteMode::Populate).unwrap();
    backing.create_schema(&catalog).unwrap();
    let mut engine = Engine::new(catalog);
    engine.set_permissions(Permissions::SELECT);
    engine.set_backing(Arc::new(backing));
    let rows = engine.execute("select count(*) from organizations").unwrap();
    assert_eq!(rows.to_string(), "2");
}

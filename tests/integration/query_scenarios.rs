#![allow(missing_docs)]

use std::sync::Arc;

use fedql::backing::MemoryBacking;
use fedql::{Catalog, Engine, Permissions, Record, SemanticType, TableSchema, Value};

struct Account {
    id: i64,
    first_name: &'static str,
    last_name: &'static str,
    email: Option<&'static str>,
    age: i64,
    organization_id: i64,
    internal: bool,
}

impl Record for Account {
    fn schema() -> TableSchema {
        TableSchema::new("Account")
            .field("ID", SemanticType::Integer, "primary")
            .field("FirstName", SemanticType::Text, "")
            .field("LastName", SemanticType::Text, "")
            .field("Email", SemanticType::Text, "comment='Not validated'")
            .field("Age", SemanticType::Integer, "")
            .field("OrganizationID", SemanticType::Integer, "")
            .field("Internal", SemanticType::Bool, "-")
    }

    fn values(&self) -> Vec<Value> {
        vec![
            self.id.into(),
            self.first_name.into(),
            self.last_name.into(),
            self.email.into(),
            self.age.into(),
            self.organization_id.into(),
            self.internal.into(),
        ]
    }
}

struct Organization {
    id: i64,
    name: &'static str,
}

impl Record for Organization {
    fn schema() -> TableSchema {
        TableSchema::new("Organization")
            .field("ID", SemanticType::Integer, "primary")
            .field("Name", SemanticType::Text, "")
    }

    fn values(&self) -> Vec<Value> {
        vec![self.id.into(), self.name.into()]
    }
}

fn accounts() -> Vec<Account> {
    vec![
        Account {
            id: 1,
            first_name: "John",
            last_name: "Doe",
            email: Some("john@aol.com"),
            age: 18,
            organization_id: 1,
            internal: true,
        },
        Account {
            id: 2,
            first_name: "Jane",
            last_name: "Doe",
            email: Some("jane@example.com"),
            age: 21,
            organization_id: 2,
            internal: false,
        },
        Account {
            id: 3,
            first_name: "George",
            last_name: "Smith",
            email: None,
            age: 42,
            organization_id: 1,
            internal: false,
        },
    ]
}

fn engine(permissions: Permissions) -> Engine {
    let catalog = Arc::new(
        Catalog::builder()
            .register::<Organization>()
            .register::<Account>()
            .build()
            .expect("catalog"),
    );
    let backing = Arc::new(MemoryBacking::new(Arc::clone(&catalog)));
    backing.insert_records(&accounts()).expect("accounts");
    backing
        .insert_records(&[
            Organization { id: 1, name: "Acme" },
            Organization {
                id: 2,
                name: "Globex",
            },
        ])
        .expect("organizations");
    let mut engine = Engine::new(catalog);
    engine.set_permissions(permissions);
    engine.set_backing(backing);
    engine
}

fn query(sql: &str) -> fedql::ResultRows {
    engine(Permissions::SELECT).execute(sql).expect(sql)
}

#[test]
fn filter_preserves_input_order() {
    let rows = query("select first_name, age from accounts where age > 18");
    assert_eq!(rows.to_string(), "Jane|21\nGeorge|42");
    assert_eq!(rows.columns(), vec!["first_name", "age"]);
}

#[test]
fn count_star() {
    let rows = query("select count(*) from accounts");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.0[0].len(), 1);
    assert_eq!(rows.0[0].get("count"), Some(&Value::Integer(3)));
}

#[test]
fn order_desc_with_limit() {
    let rows = query("select age from accounts order by age desc limit 2");
    assert_eq!(rows.to_string(), "42\n21");
}

#[test]
fn join_pairs_each_account_with_its_organization() {
    let rows = query(
        "select * from accounts join organizations on accounts.organization_id = organizations.id",
    );
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.columns(),
        vec![
            "accounts.id",
            "accounts.first_name",
            "accounts.last_name",
            "accounts.email",
            "accounts.age",
            "accounts.organization_id",
            "organizations.id",
            "organizations.name",
        ]
    );
    for row in &rows {
        assert_eq!(
            row.get("accounts.organization_id"),
            row.get("organizations.id")
        );
    }
    assert_eq!(rows.0[1].get("organizations.name"), Some(&Value::from("Globex")));
}

#[test]
fn join_with_ordering_operator_pairs_equal_keys() {
    let rows = query(
        "select accounts.first_name, organizations.name from accounts \
         join organizations on accounts.organization_id > organizations.id",
    );
    assert_eq!(rows.to_string(), "John|Acme\nJane|Globex\nGeorge|Acme");
}

#[test]
fn schema_command_renders_both_tables() {
    let engine = engine(Permissions::NONE);
    let text = engine.command(".schema").expect("schema").to_string();
    let expected = "\
CREATE TABLE accounts (
    id INTEGER primary key autoincrement,
    first_name TEXT,
    last_name TEXT,
    email TEXT, -- Not validated
    age INTEGER,
    organization_id INTEGER,
    FOREIGN KEY (organization_id) REFERENCES organizations(id)
);

CREATE TABLE organizations (
    id INTEGER primary key autoincrement,
    name TEXT
);";
    assert_eq!(text, expected);
    assert_eq!(engine.command(".schema").unwrap().to_string(), text);
}

#[test]
fn average_age() {
    let rows = query("select avg(age) from accounts");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows.0[0].get("average"), Some(&Value::Float(27.0)));
    assert_eq!(rows.to_string(), "27.000000");
}

#[test]
fn omitted_fields_are_not_columns() {
    let engine = engine(Permissions::SELECT);
    let rows = engine.execute("select * from accounts limit 1").unwrap();
    assert_eq!(rows.0[0].len(), 6);
    assert!(rows.0[0].get("internal").is_none());
    assert_eq!(
        engine
            .execute("select internal from accounts")
            .unwrap_err()
            .code(),
        "UnknownColumn"
    );
}

#[test]
fn like_and_null_checks() {
    let rows = query("select first_name from accounts where email like '%@aol.com'");
    assert_eq!(rows.to_string(), "John");
    let rows = query("select first_name from accounts where email like 'aol'");
    assert_eq!(rows.to_string(), "John");
    let rows = query("select first_name from accounts where email not like 'example'");
    assert_eq!(rows.to_string(), "John");
    let rows = query("select first_name from accounts where email is null");
    assert_eq!(rows.to_string(), "George");
    let rows = query("select first_name from accounts where not (age > 20) or last_name = 'Smith'");
    assert_eq!(rows.to_string(), "John\nGeorge");
}

#[test]
fn aliases_do_not_leak_between_queries() {
    let engine = engine(Permissions::SELECT);
    let rows = engine
        .execute("select a.first_name from accounts a where a.age = 21")
        .unwrap();
    assert_eq!(rows.to_string(), "Jane");
    let err = engine
        .execute("select a.first_name from accounts")
        .unwrap_err();
    assert_eq!(err.code(), "UnknownTable");
}

#[test]
fn min_max_and_sum() {
    let rows = query("select max(age), min(first_name), sum(age), total(age) from accounts");
    assert_eq!(rows.to_string(), "42|George|81|81");
}

#[test]
fn permission_bits_are_independent() {
    for permissions in [
        Permissions::NONE,
        Permissions::INSERT,
        Permissions::INSERT | Permissions::UPDATE | Permissions::DELETE,
    ] {
        let engine = engine(permissions);
        let err = engine.execute("select * from accounts").unwrap_err();
        assert_eq!(err.code(), "PermissionDenied");
        assert_eq!(engine.catalog().len(), 2);
    }
    let engine = engine(Permissions::SELECT);
    for sql in [
        "insert into accounts (id) values (4)",
        "update accounts set age = 1",
        "delete from accounts",
    ] {
        assert_eq!(engine.execute(sql).unwrap_err().code(), "PermissionDenied");
    }
}

#[test]
fn validation_errors() {
    let engine = engine(Permissions::SELECT);
    let code = |sql: &str| engine.execute(sql).unwrap_err().code();
    assert_eq!(code("select * from people"), "UnknownTable");
    assert_eq!(code("select median(age) from accounts"), "UnknownFunction");
    assert_eq!(code("select * from accounts limit 'ten'"), "InvalidLimit");
    assert_eq!(code("select * from accounts group by age"), "UnsupportedExpression");
    assert_eq!(code("selec * from accounts"), "Parse");
}

//! `CREATE TABLE` rendering for the `.schema` command.

use std::fmt::Write as _;

use super::{Catalog, Table};

/// Renders every table, ordered by name, separated by blank lines.
pub fn render_catalog(catalog: &Catalog) -> String {
    catalog
        .tables()
        .map(|table| render_table(table))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Renders one table.
///
/// Comments trail the column's separator so the output stays valid SQL.
pub fn render_table(table: &Table) -> String {
    let mut lines: Vec<(String, Option<&str>)> = Vec::new();
    for column in &table.columns {
        let Some(mapping) = table.mapping(column) else {
            continue;
        };
        let mut line = format!("{column} {}", mapping.semantic_type.sql_type());
        if mapping.primary {
            line.push_str(" primary key autoincrement");
        }
        lines.push((line, mapping.comment.as_deref()));
    }
    for (column, fk) in &table.foreign_keys {
        lines.push((
            format!("FOREIGN KEY ({column}) REFERENCES {}({})", fk.table, fk.column),
            None,
        ));
    }

    let mut out = format!("CREATE TABLE {} (\n", table.name);
    let last = lines.len().saturating_sub(1);
    for (idx, (line, comment)) in lines.iter().enumerate() {
        let _ = write!(out, "    {line}");
        if idx != last {
            out.push(',');
        }
        if let Some(comment) = comment {
            let _ = write!(out, " -- {comment}");
        }
        out.push('\n');
    }
    out.push_str(");");
    out
}

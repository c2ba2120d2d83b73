//! Identifier conventions and field tag parsing.

use std::collections::BTreeMap;

use super::SchemaError;

/// Converts a type or field name to `snake_case`.
///
/// Runs of capitals are treated as a single word so `OrganizationID`
/// becomes `organization_id` and `HTTPServer` becomes `http_server`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (idx, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            if idx > 0 {
                let prev = chars[idx - 1];
                let next_is_lower = chars.get(idx + 1).is_some_and(|c| c.is_lowercase());
                if prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_is_lower)
                {
                    out.push('_');
                }
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Naive English plural: names already ending in `s` are left alone.
pub fn pluralize(name: &str) -> String {
    if name.ends_with('s') || name.ends_with('S') {
        name.to_owned()
    } else {
        format!("{name}s")
    }
}

/// Table name for a record type name.
pub fn table_name(type_name: &str) -> String {
    snake_case(&pluralize(type_name))
}

/// Parsed field tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldTag {
    /// `-`: the field never becomes a column.
    pub omit: bool,
    /// `primary`: the column is the table's primary key.
    pub primary: bool,
    /// `comment='...'`.
    pub comment: Option<String>,
    /// Every other setting, kept for adapters (`json=firstName`, ...).
    pub options: BTreeMap<String, String>,
}

/// Parses a comma separated tag such as `primary,comment='Not validated'`.
///
/// Single-quoted values may contain commas.
pub fn parse_tag(field: &str, tag: &str) -> Result<FieldTag, SchemaError> {
    let mut parsed = FieldTag::default();
    for setting in split_settings(tag) {
        let setting = setting.trim();
        if setting.is_empty() {
            continue;
        }
        if setting == "-" {
            parsed.omit = true;
            return Ok(parsed);
        }
        let (key, value) = match setting.split_once('=') {
            Some((key, value)) => (key.trim(), unquote(value.trim())),
            None => (setting, String::new()),
        };
        if key.is_empty() {
            return Err(SchemaError::InvalidTag {
                field: field.to_owned(),
                tag: tag.to_owned(),
            });
        }
        match key {
            "primary" => parsed.primary = true,
            "comment" => parsed.comment = Some(value),
            _ => {
                parsed.options.insert(key.to_owned(), value);
            }
        }
    }
    Ok(parsed)
}

fn split_settings(tag: &str) -> Vec<&str> {
    let mut settings = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (idx, ch) in tag.char_indices() {
        match ch {
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                settings.push(&tag[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    settings.push(&tag[start..]);
    settings
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .unwrap_or(value)
        .to_owned()
}

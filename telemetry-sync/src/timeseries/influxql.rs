//! InfluxQL statements used by discovery and sync.
//!
//! Identifiers go in double quotes and string literals in single quotes, with
//! backslash escaping, so tag values coming out of the store can be fed back
//! into `WHERE` clauses safely.

fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// `SHOW TAG VALUES FROM "m" WITH KEY = "k" [WHERE "f" = 'v']`
pub fn show_tag_values(measurement: &str, key: &str, filter: Option<(&str, &str)>) -> String {
    let mut q = format!("SHOW TAG VALUES FROM {} WITH KEY = {}", ident(measurement), ident(key));
    if let Some((tag, value)) = filter {
        q.push_str(&format!(" WHERE {} = {}", ident(tag), literal(value)));
    }
    q
}

/// `SELECT "field" FROM "m" WHERE "tag" = 'value'`
pub fn select_field(measurement: &str, field: &str, tag: &str, value: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = {}",
        ident(field),
        ident(measurement),
        ident(tag),
        literal(value)
    )
}

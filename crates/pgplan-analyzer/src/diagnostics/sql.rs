//! Ready-to-run SQL attached to recommendations

use regex::Regex;
use std::sync::LazyLock;

static CONJUNCT_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+(?:AND|OR)\s+").expect("valid regex"));

/// Identifier (optionally qualified, quoted or cast) directly before a comparison
static FILTER_COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^[(\s]*(?:"?[a-z_][\w$]*"?\.)?"?([a-z_][\w$]*)"?\s*\)?(?:::[a-z_][\w ]*?(?:\[\])?)?\s*(?:<>|!=|>=|<=|=|>|<|!?~~\*?|@>|<@|IS\s|LIKE\s|ILIKE\s|IN\s|BETWEEN\s)"#,
    )
    .expect("valid regex")
});

static SORT_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^(?:"?[a-z_][\w$]*"?\.)?"?([a-z_][\w$]*)"?(\s+(?:ASC|DESC))?(?:\s+NULLS\s+(?:FIRST|LAST))?$"#,
    )
    .expect("valid regex")
});

/// Identifiers Postgres accepts without double quotes
static PLAIN_IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_$]*$").expect("valid regex"));

const SQL_KEYWORDS: &[&str] = &["not", "and", "or", "null", "true", "false", "case", "when"];

/// Reserved keywords that must be quoted when used as a name
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "system_user", "table",
    "then", "to", "trailing", "true", "union", "unique", "user", "using", "variadic", "when",
    "where", "window", "with",
];

/// Extracts column names compared against values in a filter expression
///
/// This is a heuristic over Postgres' deparsed filters, e.g.
/// `((email)::text = 'a@b.c'::text)` yields `email`. Function calls and
/// expressions that do not start with a column are skipped.
pub fn extract_filter_columns(filter: &str) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();

    for part in CONJUNCT_SPLIT_RE.split(filter) {
        let Some(caps) = FILTER_COLUMN_RE.captures(part.trim()) else {
            continue;
        };
        let column = caps[1].to_string();
        if SQL_KEYWORDS.contains(&column.to_ascii_lowercase().as_str()) {
            continue;
        }
        if !columns.contains(&column) {
            columns.push(column);
        }
    }

    columns
}

/// Extracts plain column names from sort keys, keeping their direction
///
/// Returns an empty list when any key is an expression.
pub fn sort_key_columns(keys: &[String]) -> Vec<String> {
    let mut columns = Vec::with_capacity(keys.len());
    for key in keys {
        let Some(caps) = SORT_KEY_RE.captures(key.trim()) else {
            return Vec::new();
        };
        let direction = caps
            .get(2)
            .map(|m| m.as_str().trim().to_ascii_uppercase())
            .filter(|d| d == "DESC");
        match direction {
            Some(desc) => columns.push(format!("{} {}", &caps[1], desc)),
            None => columns.push(caps[1].to_string()),
        }
    }
    columns
}

/// Double-quotes `name` unless Postgres would read it back unchanged
pub fn quote_ident(name: &str) -> String {
    if PLAIN_IDENT_RE.is_match(name) && !RESERVED_WORDS.contains(&name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// `schema.relation` with each part quoted as needed
pub fn qualified_name(relation: &str, schema: Option<&str>) -> String {
    match schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(relation)),
        None => quote_ident(relation),
    }
}

/// `CREATE INDEX idx_<table>_<cols> ON <schema.table> (<cols>);`
///
/// Columns may carry a trailing ` DESC` as produced by [`sort_key_columns`].
pub fn create_index_sql(
    relation: &str,
    schema: Option<&str>,
    columns: &[String],
) -> Option<String> {
    if columns.is_empty() {
        return None;
    }
    let (names, keys): (Vec<&str>, Vec<String>) = columns
        .iter()
        .map(|column| match column.split_once(' ') {
            Some((name, direction)) => (name, format!("{} {}", quote_ident(name), direction)),
            None => (column.as_str(), quote_ident(column)),
        })
        .unzip();
    let index_name = sanitize_identifier(&format!("idx_{}_{}", relation, names.join("_")));
    Some(format!(
        "CREATE INDEX {} ON {} ({});",
        index_name,
        qualified_name(relation, schema),
        keys.join(", ")
    ))
}

/// `ANALYZE <schema.table>;`
pub fn analyze_sql(relation: &str, schema: Option<&str>) -> String {
    format!("ANALYZE {};", qualified_name(relation, schema))
}

/// `SET work_mem = '<n>MB';` sized to twice the data that went to disk
pub fn work_mem_sql(disk_kb: u64) -> String {
    let doubled_mb = (disk_kb.saturating_mul(2)).div_ceil(1024);
    format!("SET work_mem = '{}MB';", doubled_mb.max(4))
}

/// Postgres truncates identifiers at 63 bytes
fn sanitize_identifier(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    name.truncate(63);
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_simple_columns() {
        assert_eq!(extract_filter_columns("(status = 'active'::text)"), vec!["status"]);
        assert_eq!(
            extract_filter_columns("((email)::text = 'a@b.c'::text)"),
            vec!["email"]
        );
        assert_eq!(
            extract_filter_columns("((created_at > '2024-01-01'::date) AND (users.id < 5))"),
            vec!["created_at", "id"]
        );
    }

    #[test]
    fn test_extract_operators() {
        assert_eq!(extract_filter_columns("(name ~~ 'A%'::text)"), vec!["name"]);
        assert_eq!(extract_filter_columns("(deleted_at IS NULL)"), vec!["deleted_at"]);
        assert_eq!(
            extract_filter_columns("((kind)::text <> 'x'::text) OR (kind IS NULL)"),
            vec!["kind"]
        );
    }

    #[test]
    fn test_extract_skips_expressions() {
        assert!(extract_filter_columns("(lower((email)::text) = 'x'::text)").is_empty());
        assert!(extract_filter_columns("('x'::text = name)").is_empty());
        assert!(extract_filter_columns("(hashed SubPlan 1)").is_empty());
        assert!(extract_filter_columns("(NOT active)").is_empty());
    }

    #[test]
    fn test_sort_key_columns() {
        let keys = vec!["orders.created_at DESC".to_string(), "id".to_string()];
        assert_eq!(sort_key_columns(&keys), vec!["created_at DESC", "id"]);

        let expr = vec!["(price * qty)".to_string()];
        assert!(sort_key_columns(&expr).is_empty());
    }

    #[test]
    fn test_create_index_sql() {
        let sql = create_index_sql("users", Some("public"), &["email".to_string()]);
        assert_eq!(
            sql.as_deref(),
            Some("CREATE INDEX idx_users_email ON public.users (email);")
        );

        let multi = create_index_sql(
            "orders",
            None,
            &["customer_id".to_string(), "created_at DESC".to_string()],
        );
        assert_eq!(
            multi.as_deref(),
            Some("CREATE INDEX idx_orders_customer_id_created_at ON orders (customer_id, created_at DESC);")
        );

        assert_eq!(create_index_sql("users", None, &[]), None);
    }

    #[test]
    fn test_create_index_quotes_mixed_case_names() {
        let columns = extract_filter_columns(r#"(("userId" = 42) AND ("order" > 3))"#);
        assert_eq!(columns, vec!["userId", "order"]);

        let sql = create_index_sql("Users", Some("Sales"), &columns);
        assert_eq!(
            sql.as_deref(),
            Some(r#"CREATE INDEX idx_users_userid_order ON "Sales"."Users" ("userId", "order");"#)
        );

        let sorted = sort_key_columns(&[r#""Events"."createdAt" DESC"#.to_string()]);
        assert_eq!(
            create_index_sql("Events", None, &sorted).as_deref(),
            Some(r#"CREATE INDEX idx_events_createdat ON "Events" ("createdAt" DESC);"#)
        );
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "users");
        assert_eq!(quote_ident("line_items2"), "line_items2");
        assert_eq!(quote_ident("Users"), r#""Users""#);
        assert_eq!(quote_ident("user"), r#""user""#);
        assert_eq!(quote_ident("order items"), r#""order items""#);
        assert_eq!(quote_ident(r#"say"hi"#), r#""say""hi""#);
        assert_eq!(quote_ident("2fa"), r#""2fa""#);
    }

    #[test]
    fn test_work_mem_sql() {
        assert_eq!(work_mem_sql(100), "SET work_mem = '4MB';");
        assert_eq!(work_mem_sql(10_240), "SET work_mem = '20MB';");
        assert_eq!(work_mem_sql(10_241), "SET work_mem = '21MB';");
    }

    #[test]
    fn test_analyze_sql() {
        assert_eq!(analyze_sql("users", Some("public")), "ANALYZE public.users;");
        assert_eq!(analyze_sql("Users", None), r#"ANALYZE "Users";"#);
    }
}

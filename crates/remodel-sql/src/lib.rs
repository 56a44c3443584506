//! Identifier quoting and deterministic object naming.
//!
//! Every name produced here fits in a Postgres identifier (63 bytes). Names
//! that would be longer keep a readable prefix and end with a stable hash of
//! the full name, so two different long names never collapse into one.

/// Longest identifier Postgres accepts without silently truncating it.
pub const PG_IDENT_MAX: usize = 63;

/// Displays as a double-quoted identifier.
///
/// Always quotes, so mixed-case names like `TestEntity12` keep their case and
/// reserved words (`user`, `order`) need no special handling. Embedded double
/// quotes are doubled.
///
/// ```
/// use remodel_sql::Ident;
/// assert_eq!(Ident("Ref3Id").to_string(), "\"Ref3Id\"");
/// assert_eq!(Ident("odd\"name").to_string(), "\"odd\"\"name\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&quote_with(self.0.as_ref(), '"'))
    }
}

/// Single-quoted string literal, e.g. a text search configuration name.
pub fn escape_string(s: &str) -> String {
    quote_with(s, '\'')
}

pub fn quote_ident(name: &str) -> String {
    quote_with(name, '"')
}

fn quote_with(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        if c == quote {
            out.push(quote);
        }
        out.push(c);
    }
    out.push(quote);
    out
}

/// Standard index name: `idx_{table}_{columns}`.
///
/// # Examples
///
/// ```
/// assert_eq!(remodel_sql::index_name("user", &["email"]), "idx_user_email");
/// assert_eq!(
///     remodel_sql::index_name("post", &["author_id", "created_at"]),
///     "idx_post_author_id_created_at"
/// );
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    fit_identifier("idx", table, columns)
}

/// Standard unique index name: `uq_{table}_{columns}`.
///
/// # Examples
///
/// ```
/// assert_eq!(remodel_sql::unique_index_name("user", &["email"]), "uq_user_email");
/// ```
pub fn unique_index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    fit_identifier("uq", table, columns)
}

/// Foreign key constraint name: `fk_{table}_{columns}_{parent}`.
///
/// The parent takes part so one column can reference several tables.
///
/// # Examples
///
/// ```
/// assert_eq!(
///     remodel_sql::foreign_key_name("post", &["author_id"], "user"),
///     "fk_post_author_id_user"
/// );
/// ```
pub fn foreign_key_name(table: &str, columns: &[impl AsRef<str>], parent: &str) -> String {
    let mut parts: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    parts.push(parent);
    fit_identifier("fk", table, &parts)
}

/// Full-text index name: `ft_{table}_{column}`.
pub fn full_text_index_name(table: &str, column: &str) -> String {
    fit_identifier("ft", table, &[column])
}

fn fit_identifier(prefix: &str, table: &str, columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    let full = format!("{}_{}_{}", prefix, table, cols.join("_"));
    if full.len() <= PG_IDENT_MAX {
        return full;
    }

    let hex = blake3::hash(full.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];

    // "_" + suffix
    let mut len = PG_IDENT_MAX - suffix.len() - 1;
    while len > 0 && !full.is_char_boundary(len) {
        len -= 1;
    }

    format!("{}_{}", &full[..len], suffix)
}

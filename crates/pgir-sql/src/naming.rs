//! Names the server picks for objects the user did not name.

/// Longest identifier the server keeps (NAMEDATALEN - 1), in bytes.
pub const PG_IDENT_MAX: usize = 63;

/// Cut `s` to at most `len` bytes without splitting a character.
fn clip(s: &str, len: usize) -> &str {
    if s.len() <= len {
        return s;
    }
    let mut len = len;
    while len > 0 && !s.is_char_boundary(len) {
        len -= 1;
    }
    &s[..len]
}

/// Build `name1_name2_label`, shortening the name parts to fit in 63 bytes.
///
/// The label always survives. When the parts are too long, the longer of
/// `name1`/`name2` loses one byte at a time until everything fits.
///
/// # Examples
/// ```
/// use pgir_sql::make_object_name;
/// assert_eq!(make_object_name("users", Some("email"), "key"), "users_email_key");
/// assert_eq!(make_object_name("users", None, "pkey"), "users_pkey");
/// ```
pub fn make_object_name(name1: &str, name2: Option<&str>, label: &str) -> String {
    let mut overhead = 0;
    let mut name2_len = 0;
    if let Some(name2) = name2 {
        name2_len = name2.len();
        overhead += 1;
    }
    if !label.is_empty() {
        overhead += label.len() + 1;
    }

    let avail = PG_IDENT_MAX.saturating_sub(overhead);
    let mut name1_len = name1.len();
    while name1_len + name2_len > avail {
        if name1_len > name2_len {
            name1_len -= 1;
        } else {
            name2_len -= 1;
        }
    }

    let mut out = clip(name1, name1_len).to_string();
    if let Some(name2) = name2 {
        out.push('_');
        out.push_str(clip(name2, name2_len));
    }
    if !label.is_empty() {
        out.push('_');
        out.push_str(label);
    }
    out
}

/// Pick a name with [`make_object_name`], appending a counter to the label
/// until `taken` says it is free.
pub fn choose_name(
    name1: &str,
    name2: Option<&str>,
    label: &str,
    taken: impl Fn(&str) -> bool,
) -> String {
    let mut candidate = make_object_name(name1, name2, label);
    let mut pass = 0;
    while taken(&candidate) {
        pass += 1;
        candidate = make_object_name(name1, name2, &format!("{label}{pass}"));
    }
    candidate
}

fn joined(columns: &[impl AsRef<str>]) -> Option<String> {
    if columns.is_empty() {
        return None;
    }
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    Some(cols.join("_"))
}

/// `table_pkey`.
pub fn primary_key_name(table: &str) -> String {
    make_object_name(table, None, "pkey")
}

/// `table_col1_col2_key`.
pub fn unique_constraint_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    make_object_name(table, joined(columns).as_deref(), "key")
}

/// `table_col_check` for a check on one column, `table_check` otherwise.
pub fn check_constraint_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    match columns {
        [only] => make_object_name(table, Some(only.as_ref()), "check"),
        _ => make_object_name(table, None, "check"),
    }
}

/// `table_col_seq`.
pub fn sequence_name(table: &str, column: &str) -> String {
    make_object_name(table, Some(column), "seq")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_names_keep_the_label() {
        let table = "a".repeat(40);
        let column = "b".repeat(40);
        let name = unique_constraint_name(&table, &[column.as_str()]);
        assert_eq!(name.len(), PG_IDENT_MAX);
        assert!(name.ends_with("_key"));
        // both halves shrink toward each other
        assert_eq!(name, format!("{}_{}_key", "a".repeat(29), "b".repeat(29)));
    }

    #[test]
    fn longer_part_is_shortened_first() {
        let table = "t".repeat(70);
        let name = primary_key_name(&table);
        assert_eq!(name, format!("{}_pkey", "t".repeat(58)));
    }

    #[test]
    fn choose_name_counts_up() {
        let taken = ["items_check", "items_check1"];
        let name = choose_name("items", None, "check", |n| taken.contains(&n));
        assert_eq!(name, "items_check2");
    }

    #[test]
    fn check_names_depend_on_column_count() {
        assert_eq!(check_constraint_name("items", &["price"]), "items_price_check");
        assert_eq!(check_constraint_name("items", &["lo", "hi"]), "items_check");
        assert_eq!(check_constraint_name("items", &[] as &[&str]), "items_check");
    }

    #[test]
    fn multibyte_names_are_not_split() {
        let table = "é".repeat(40);
        let name = primary_key_name(&table);
        assert!(name.len() <= PG_IDENT_MAX);
        assert!(name.ends_with("_pkey"));
    }
}

//! Generated names for relation columns, constraints and junction tables.

/// Replace every non-word character with `_`.
pub fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// First `n` characters (not bytes).
pub fn truncate(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// `candidate`, or `candidate1`, `candidate2`, ... whichever is not taken.
pub fn unique_name<'a>(candidate: &str, taken: impl IntoIterator<Item = &'a str>) -> String {
    let taken: Vec<&str> = taken.into_iter().collect();
    if !taken.contains(&candidate) {
        return candidate.to_string();
    }
    (1u32..)
        .map(|n| format!("{}{}", candidate, n))
        .find(|c| !taken.contains(&c.as_str()))
        .unwrap_or_else(|| candidate.to_string())
}

/// Physical foreign-key column a relation adds to the child: `<parent_table>_id`.
pub fn fk_column_name(parent_table: &str) -> String {
    format!("{}_id", sanitize(parent_table))
}

/// `fk_<parent10>_<child10>_<random10>`.
pub fn fk_constraint_name(parent_table: &str, child_table: &str) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    sanitize(&format!(
        "fk_{}_{}_{}",
        truncate(parent_table, 10),
        truncate(child_table, 10),
        &random[..10]
    ))
}

/// `<prefix>_m2m_<a15>_<b15>`; callers append a numeric suffix until it is free.
pub fn junction_table_name(prefix: &str, a_table: &str, b_table: &str) -> String {
    sanitize(&format!(
        "{}_m2m_{}_{}",
        prefix,
        truncate(a_table, 15),
        truncate(b_table, 15)
    ))
}

/// Junction foreign-key columns. A self-referencing junction gets `<b29>1_id` for the second.
pub fn junction_column_names(a_table: &str, b_table: &str) -> (String, String) {
    let first = format!("{}_id", sanitize(truncate(a_table, 30)));
    let mut second = format!("{}_id", sanitize(truncate(b_table, 30)));
    if first == second {
        second = format!("{}1_id", sanitize(truncate(b_table, 29)));
    }
    (first, second)
}

pub fn belongs_to_title(parent_title: &str) -> String {
    format!("{}Read", parent_title)
}

pub fn has_many_title(child_title: &str) -> String {
    format!("{}List", child_title)
}

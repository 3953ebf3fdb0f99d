//! Script splitting.
//!
//! Splits a script into individual statements on `;`, ignoring semicolons
//! inside `--` line comments, `/* */` block comments, single-quoted literals,
//! double-quoted identifiers and `$$`-quoted bodies. Comments are dropped
//! from the output; a block comment leaves a space behind.

use regex::Regex;
use std::sync::LazyLock;

static CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s*create\s+table\s+(?:if\s+not\s+exists\s+)?([\w."]+)"#)
        .expect("valid regex")
});

pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = script.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match (c, next) {
            ('-', Some('-')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                current.push(' ');
                continue;
            }
            ('\'' | '"', _) => {
                current.push(c);
                i += 1;
                while i < chars.len() {
                    current.push(chars[i]);
                    if chars[i] == c {
                        // a doubled quote is escaped
                        if chars.get(i + 1) == Some(&c) {
                            current.push(c);
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
                continue;
            }
            ('$', Some('$')) => {
                current.push_str("$$");
                i += 2;
                while i < chars.len() && !(chars[i] == '$' && chars.get(i + 1) == Some(&'$')) {
                    current.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    current.push_str("$$");
                }
                i += 2;
                continue;
            }
            (';', _) => {
                push_statement(&mut statements, &mut current);
            }
            _ => current.push(c)
        }
        i += 1;
    }

    push_statement(&mut statements, &mut current);
    statements
}

/// Names of tables created by `statements`, in creation order, without
/// duplicates.
pub fn created_tables<S: AsRef<str>>(statements: &[S]) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    for statement in statements {
        if let Some(caps) = CREATE_TABLE.captures(statement.as_ref()) {
            let name = caps[1].to_string();
            if !tables.contains(&name) {
                tables.push(name);
            }
        }
    }
    tables
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

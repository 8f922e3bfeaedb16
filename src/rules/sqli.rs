//! SQL injection challenge (`sqli_001`)
//!
//! Safe: user input reaches the driver as bound parameters
//! (`execute(query, params)`, SQLAlchemy `text()` with `:name` binds).
//! Unsafe: SQL text assembled by concatenation, f-strings, `%` or `.format`.

use super::{PatternSet, Verdict};

const SAFE_PATTERNS: &[&str] = &[
    r#"\.execute(?:many)?\(\s*(?:"[^"\n]*"|'[^'\n]*'|[A-Za-z_][\w.]*)\s*,\s*\S"#,
    r#"\btext\(\s*["'][^"'\n]*:[A-Za-z_]\w*"#,
];

const UNSAFE_PATTERNS: &[&str] = &[
    // f"SELECT ... {user}"
    r#"(?i)\bf(?:"[^"\n]*\b(?:select|insert|update|delete)\b[^"\n]*\{|'[^'\n]*\b(?:select|insert|update|delete)\b[^'\n]*\{)"#,
    // "SELECT ... '" + user
    r#"(?i)\b(?:select|insert|update|delete|where)\b[^\n]*["']\s*\+"#,
    // "SELECT ... %s" % user
    r#"(?i)\b(?:select|insert|update|delete)\b[^\n]*["']\s*%\s*[\w(]"#,
    // "SELECT ... {}".format(user)
    r#"(?i)\b(?:select|insert|update|delete)\b[^\n]*["']\.format\("#,
];

pub struct SqlInjectionRule {
    safe: PatternSet,
    risky: PatternSet,
}

impl SqlInjectionRule {
    pub fn new() -> Self {
        Self {
            safe: PatternSet::new(SAFE_PATTERNS),
            risky: PatternSet::new(UNSAFE_PATTERNS),
        }
    }

    pub fn evaluate(&self, code: &str) -> Verdict {
        Verdict::from_signals(
            self.safe.is_match(code),
            self.risky.is_match(code),
            "Parameterized query detected; user input is bound as query parameters.",
            "Parameterized queries are used, but SQL is still built with unsafe string \
             concatenation or formatting elsewhere.",
            "SQL is built with unsafe string concatenation or formatting of user input. \
             Use parameter binding instead.",
            "No parameterized query detected. Pass user input to execute() as bound parameters.",
        )
    }
}

impl Default for SqlInjectionRule {
    fn default() -> Self {
        Self::new()
    }
}

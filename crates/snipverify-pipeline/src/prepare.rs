//! Snippet preparation
//!
//! Forum answers often contain a bare expression rather than a program.
//! A single-line Python expression is wrapped in `print(...)` so running it
//! produces observable output. Every prepared source ends with a newline.

use once_cell::sync::Lazy;
use regex::Regex;
use snipverify_core::Language;

/// Line starts that make a Python line a statement rather than an expression
const PYTHON_STATEMENT_PREFIXES: &[&str] = &[
    "import ", "from ", "def ", "class ", "for ", "while ", "if ", "with ", "try:", "return",
    "raise ", "assert ", "del ", "pass", "global ", "nonlocal ", "async ", "@", "#", "print(",
];

static ASSIGNMENT: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][\w\.\[\]'\x22, ]*(\*\*|//|>>|<<|[-+*/%&|^@])?=[^=]").ok()
});

/// Make `source` runnable for `language`
#[must_use]
pub fn prepare_source(source: &str, language: &Language) -> String {
    let body = source.trim_end();
    if *language == Language::Python && is_python_expression(body) {
        return format!("print({})\n", body.trim());
    }
    format!("{body}\n")
}

fn is_python_expression(body: &str) -> bool {
    let line = body.trim();
    if line.is_empty() || line.contains('\n') || line.contains(';') {
        return false;
    }
    if PYTHON_STATEMENT_PREFIXES.iter().any(|p| line.starts_with(p)) {
        return false;
    }
    !ASSIGNMENT.as_ref().is_some_and(|re| re.is_match(line))
}

//! Static policy tables: reserved registration names, the whitelisted
//! native-container method set, and glob-pattern compilation for
//! include/exclude member specs.
//!
//! Grounded on `examples/original_source/tic/eval/call.py`
//! (`WHITELISTED_METHODS`) and `tic/agent/datatypes.py` (`RESERVED_NAMES`);
//! glob translation follows `tic/agent/core.py`'s use of `fnmatch.fnmatch`.

use regex::Regex;

/// Names a host may not register a function/class/module under.
pub const RESERVED_NAMES: &[&str] = &["dataclass", "dataclasses"];

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// A native container kind whose methods are gated by [`whitelisted_methods`]
/// rather than by agent registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeKind {
    List,
    Mapping,
    Set,
    Str,
}

/// The fixed allow-list of methods callable on a native container value.
/// Anything not in this list is refused even if Rust's own implementation
/// could trivially support it.
#[must_use]
pub fn whitelisted_methods(kind: NativeKind) -> &'static [&'static str] {
    match kind {
        NativeKind::List => {
            &["append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse", "sort"]
        }
        NativeKind::Mapping => &["clear", "copy", "get", "items", "keys", "pop", "setdefault", "update", "values"],
        NativeKind::Set => &["add", "clear", "copy", "discard", "pop", "remove", "update"],
        NativeKind::Str => &["upper", "lower", "strip", "split", "replace", "startswith", "endswith", "join"],
    }
}

#[must_use]
pub fn is_whitelisted_method(kind: NativeKind, method: &str) -> bool {
    whitelisted_methods(kind).contains(&method)
}

/// Mapping methods whose return value is a view and must be materialized
/// into a concrete list before handing it back to user code.
#[must_use]
pub fn materializes_to_list(kind: NativeKind, method: &str) -> bool {
    matches!(kind, NativeKind::Mapping) && matches!(method, "keys" | "values" | "items")
}

/// Translates a shell-glob-style pattern (`*`, `?`, `[...]`) into an
/// anchored regular expression, the same matching semantics as Python's
/// `fnmatch.fnmatch` used by the host registration API.
#[must_use]
pub fn glob_to_regex(pattern: &str) -> Regex {
    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!')) {
                    chars.next();
                    out.push('^');
                }
                for c in chars.by_ref() {
                    out.push(c);
                    if c == ']' {
                        break;
                    }
                }
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).unwrap_or_else(|_| Regex::new("^$").expect("empty pattern always compiles"))
}

/// A compiled include/exclude member selector, built from a fixed name
/// list, a single glob pattern, or a set of glob patterns.
#[derive(Debug, Clone)]
pub enum MemberPattern {
    Names(Vec<String>),
    Globs(Vec<String>),
}

impl MemberPattern {
    #[must_use]
    pub fn single(pattern: impl Into<String>) -> Self {
        Self::Globs(vec![pattern.into()])
    }

    #[must_use]
    pub fn names(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Names(names.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match self {
            MemberPattern::Names(names) => names.iter().any(|n| n == name),
            MemberPattern::Globs(patterns) => patterns.iter().any(|p| glob_to_regex(p).is_match(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_star_and_question_mark() {
        assert!(glob_to_regex("get_*").is_match("get_value"));
        assert!(!glob_to_regex("get_*").is_match("set_value"));
        assert!(glob_to_regex("a?c").is_match("abc"));
        assert!(!glob_to_regex("a?c").is_match("abbc"));
    }

    #[test]
    fn exclude_dunder_by_default() {
        let exclude = MemberPattern::single("_*");
        assert!(exclude.matches("_private"));
        assert!(!exclude.matches("public"));
    }

    #[test]
    fn reserved_names_cover_dataclass() {
        assert!(is_reserved_name("dataclass"));
        assert!(!is_reserved_name("widget"));
    }
}

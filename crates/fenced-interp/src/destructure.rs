// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Extracts bound names from a `const`/`let`/`var` declaration's binding
//! pattern: plain identifiers, nested object destructuring (aliasing,
//! defaults), nested array destructuring (rest elements, elision), and one
//! level of TypeScript type-annotation stripping on the identifier form.

/// Split `s` on top-level `,` — respecting `{}`/`[]`/`()` nesting and
/// skipping over `'`/`"`/`` ` `` string spans so a comma or bracket inside a
/// default-value string doesn't confuse the split.
fn split_top_level(s: &str, delim: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    let bytes = s.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = s[i..].chars().next().unwrap();
        if let Some(q) = quote {
            if c == '\\' {
                i += c.len_utf8();
                if i < bytes.len() {
                    i += s[i..].chars().next().unwrap().len_utf8();
                }
                continue;
            }
            if c == q {
                quote = None;
            }
            i += c.len_utf8();
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth -= 1,
            _ if c == delim && depth == 0 => {
                out.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
        i += c.len_utf8();
    }
    out.push(&s[start..]);
    out
}

/// Find the byte offset of the top-level `=` that separates a pattern from
/// its default value or (at the statement level) its initializer —
/// excluding `==`, `!=`, `<=`, `>=`, and `=>`.
fn find_top_level_eq(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let bytes = s.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = s[i..].chars().next().unwrap();
        if let Some(q) = quote {
            if c == '\\' {
                i += c.len_utf8();
                if i < bytes.len() {
                    i += s[i..].chars().next().unwrap().len_utf8();
                }
                continue;
            }
            if c == q {
                quote = None;
            }
            i += c.len_utf8();
            continue;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth -= 1,
            '=' if depth == 0 => {
                let prev = if i > 0 { s.as_bytes()[i - 1] } else { 0 };
                let next = bytes.get(i + 1).copied().unwrap_or(0);
                let is_comparison = matches!(prev, b'=' | b'!' | b'<' | b'>') || next == b'=';
                let is_arrow = next == b'>';
                if !is_comparison && !is_arrow {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += c.len_utf8();
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn leading_ident(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !is_ident_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

/// Extract bound names from one destructuring target (an entry of an array
/// pattern, or the RHS of an object-pattern alias, or a top-level
/// identifier pattern). Strips a single trailing `= default` first.
fn names_from_target(target: &str) -> Vec<String> {
    let target = target.trim();
    if target.is_empty() {
        return Vec::new();
    }
    if let Some(rest) = target.strip_prefix("...") {
        return names_from_target(rest);
    }
    let without_default = match find_top_level_eq(target) {
        Some(idx) => &target[..idx],
        None => target,
    }
    .trim();

    if let Some(inner) = without_default
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
    {
        return names_from_object_pattern(inner);
    }
    if let Some(inner) = without_default
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
    {
        return names_from_array_pattern(inner);
    }
    // plain identifier, optionally with one level of `: Type` annotation.
    let ident = leading_ident(without_default);
    if ident.is_empty() {
        Vec::new()
    } else {
        vec![ident.to_string()]
    }
}

fn names_from_object_pattern(inner: &str) -> Vec<String> {
    let mut names = Vec::new();
    for entry in split_top_level(inner, ',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        if let Some(rest) = entry.strip_prefix("...") {
            names.push(leading_ident(rest.trim()).to_string());
            continue;
        }
        if let Some(colon) = entry.find(':') {
            // `key: target` — the bound name comes from `target`, which may
            // itself be a nested pattern.
            let target = &entry[colon + 1..];
            names.extend(names_from_target(target));
        } else {
            // shorthand `{a}` or `{a = default}`.
            names.extend(names_from_target(entry));
        }
    }
    names
}

fn names_from_array_pattern(inner: &str) -> Vec<String> {
    let mut names = Vec::new();
    for entry in split_top_level(inner, ',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue; // elision: `[a, , b]`
        }
        names.extend(names_from_target(entry));
    }
    names
}

/// Extract every bound name from a declaration's binding pattern text — the
/// span between the `const`/`let`/`var` keyword and the `=` initializer (or
/// the trailing `;`/end of text, when there is no initializer).
pub fn bound_names(pattern: &str) -> Vec<String> {
    names_from_target(pattern)
}

/// Given the full pattern-and-initializer text that follows `const`/`let`/
/// `var` (e.g. `a: T = 1` or `{a, b} = x`), split it into the binding
/// pattern and the rest (including the `=` and initializer, if present).
pub fn split_pattern(decl_rest: &str) -> (&str, &str) {
    match find_top_level_eq(decl_rest) {
        Some(idx) => (decl_rest[..idx].trim_end(), &decl_rest[idx..]),
        None => (decl_rest.trim_end(), ""),
    }
}

/// Split the text following `const`/`let`/`var` into its individual
/// declarators — `a = 1, b = 2` is two declarators, `{a} = x` is one, each
/// split at a top-level `,` (respecting `{}`/`[]`/`()` nesting and string
/// spans, same as [`split_top_level`]) so a comma inside a pattern, default
/// value, or initializer never splits early.
pub fn split_declarators(decl_rest: &str) -> Vec<&str> {
    split_top_level(decl_rest, ',')
}

/// Extract every bound name across a (possibly multi-declarator)
/// `const`/`let`/`var` statement's tail — `a = 1, {b, c: d} = obj` binds
/// `a`, `b`, and `d`.
pub fn bound_names_for_declaration(decl_rest: &str) -> Vec<String> {
    split_declarators(decl_rest)
        .into_iter()
        .flat_map(|declarator| {
            let (pattern, _initializer) = split_pattern(declarator);
            bound_names(pattern)
        })
        .collect()
}

/// Strip a single top-level TypeScript type annotation (`: Type`) from a
/// *plain identifier* binding pattern, so the text is safe to execute as
/// plain JavaScript. Object/array patterns are returned unchanged — the
/// grammar only promises one level of stripping on the identifier form.
pub fn strip_identifier_type_annotation(pattern: &str) -> String {
    let trimmed = pattern.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed.to_string();
    }
    leading_ident(trimmed).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifier() {
        assert_eq!(bound_names("a"), vec!["a"]);
    }

    #[test]
    fn object_shorthand() {
        assert_eq!(bound_names("{a}"), vec!["a"]);
    }

    #[test]
    fn object_alias() {
        assert_eq!(bound_names("{a: b}"), vec!["b"]);
    }

    #[test]
    fn object_default() {
        assert_eq!(bound_names("{a = 1}"), vec!["a"]);
    }

    #[test]
    fn array_simple() {
        assert_eq!(bound_names("[a, b]"), vec!["a", "b"]);
    }

    #[test]
    fn array_nested() {
        assert_eq!(bound_names("[a, [b, c]]"), vec!["a", "b", "c"]);
    }

    #[test]
    fn array_rest() {
        assert_eq!(bound_names("[head, ...tail]"), vec!["head", "tail"]);
    }

    #[test]
    fn identifier_with_type_annotation() {
        assert_eq!(bound_names("a: T"), vec!["a"]);
    }

    #[test]
    fn split_pattern_separates_initializer() {
        let (pattern, rest) = split_pattern("a: T = 1");
        assert_eq!(pattern, "a: T");
        assert_eq!(rest.trim(), "= 1");
    }

    #[test]
    fn split_pattern_does_not_confuse_arrow_with_equals() {
        let (pattern, rest) = split_pattern("f = (x) => x + 1");
        assert_eq!(pattern, "f");
        assert!(rest.trim_start().starts_with("= (x)"));
    }

    #[test]
    fn strip_type_annotation_identifier_only() {
        assert_eq!(strip_identifier_type_annotation("a: T"), "a");
        assert_eq!(strip_identifier_type_annotation("{a, b}"), "{a, b}");
    }

    #[test]
    fn object_nested_alias_pattern() {
        assert_eq!(bound_names("{a: {b, c}}"), vec!["b", "c"]);
    }

    #[test]
    fn multi_declarator_binds_every_name() {
        assert_eq!(
            bound_names_for_declaration("a = 1, b = 2;"),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn multi_declarator_with_patterns_and_type_annotations() {
        assert_eq!(
            bound_names_for_declaration("a: T = 1, {b, c: d} = obj, [e] = arr;"),
            vec!["a".to_string(), "b".to_string(), "d".to_string(), "e".to_string()]
        );
    }

    #[test]
    fn multi_declarator_initializer_commas_do_not_split_early() {
        assert_eq!(
            bound_names_for_declaration("a = foo(1, 2), b = 3;"),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}

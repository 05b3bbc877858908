// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wraps one source statement in an immediately-invoked async function so
//! `await` is available, and classifies it into the three hoisting cases of
//! spec.md §4.3: variable declaration, function declaration, or bare
//! statement.

use crate::destructure::{
    self, bound_names_for_declaration, split_declarators, split_pattern, strip_identifier_type_annotation,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// `const`/`let`/`var` at statement start — names to hoist into the
    /// shared context after the statement executes.
    VariableDeclaration(Vec<String>),
    /// `function`/`async function` with a name — that name is hoisted.
    FunctionDeclaration(String),
    /// No hoisting.
    Bare,
}

pub struct WrappedStatement {
    /// The plain-JavaScript source to hand to the engine (with any single
    /// top-level TypeScript identifier annotation already stripped).
    pub source: String,
    pub binding: Binding,
}

fn strip_leading_keyword<'a>(trimmed: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = trimmed.strip_prefix(keyword)?;
    if rest.chars().next().map(|c| c.is_whitespace()).unwrap_or(false) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn classify(stmt: &str) -> Binding {
    let trimmed = stmt.trim_start();
    for kw in ["const", "let", "var"] {
        if let Some(rest) = strip_leading_keyword(trimmed, kw) {
            // `const a = 1, b = 2;` binds both `a` and `b` — walk every
            // top-level-comma-separated declarator, not just the first.
            return Binding::VariableDeclaration(bound_names_for_declaration(rest));
        }
    }
    let after_async = strip_leading_keyword(trimmed, "async").unwrap_or(trimmed);
    if let Some(rest) = strip_leading_keyword(after_async, "function") {
        let rest = rest.trim_start();
        let name_end = rest
            .find(|c: char| c == '(' || c.is_whitespace())
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        if !name.is_empty() {
            return Binding::FunctionDeclaration(name.to_string());
        }
    }
    Binding::Bare
}

/// Replace every plain-identifier declarator's single top-level type
/// annotation so the statement is valid plain JavaScript, leaving object
/// and array patterns untouched. Handles multi-declarator statements
/// (`const a: T = 1, b: U = 2`) by sanitizing each declarator in turn.
fn sanitize_for_execution(stmt: &str) -> String {
    let trimmed = stmt.trim_start();
    for kw in ["const", "let", "var"] {
        if let Some(rest) = strip_leading_keyword(trimmed, kw) {
            let mut changed = false;
            let declarators: Vec<String> = split_declarators(rest)
                .into_iter()
                .map(|declarator| {
                    let (pattern, initializer) = split_pattern(declarator);
                    let stripped = strip_identifier_type_annotation(pattern);
                    if stripped != pattern.trim() {
                        changed = true;
                    }
                    format!("{stripped} {initializer}").trim().to_string()
                })
                .collect();
            if changed {
                return format!("{kw} {}", declarators.join(", "));
            }
            break;
        }
    }
    stmt.to_string()
}

/// Wrap one complete statement for execution, returning the plain-JS source
/// to evaluate and the hoisting classification.
///
/// Hoisting is done entirely inside the generated source (`globalThis.name =
/// name;`) rather than by round-tripping the bound value through Rust — this
/// works uniformly for primitives, objects, and function values alike.
pub fn wrap(stmt: &str) -> WrappedStatement {
    let binding = classify(stmt);
    let sanitized = sanitize_for_execution(stmt);
    let hoists = match &binding {
        Binding::VariableDeclaration(names) => names
            .iter()
            .map(|n| format!("globalThis.{n} = {n};"))
            .collect::<Vec<_>>()
            .join(" "),
        Binding::FunctionDeclaration(name) => format!("globalThis.{name} = {name};"),
        Binding::Bare => String::new(),
    };
    let source = format!("(async () => {{ {sanitized}\n{hoists} }})()");
    WrappedStatement { source, binding }
}

pub use destructure::bound_names as extract_bound_names;

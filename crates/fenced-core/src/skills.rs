// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! `SkillContext` (SPEC_FULL.md §4.5 [SKILLS]): spec.md §4.5 "Skills &
//! prompt seeding (interface only)" calls for a system prompt assembled from
//! a base template plus per-skill snippets, and credential-holding globals
//! injected into the interpreter. This is the interface only — no
//! filesystem discovery, no credential handling (spec.md §1 names those as
//! external collaborators); a caller constructs a `SkillContext` directly
//! and hands it to session construction.

use serde_json::Value;

/// One skill's contribution: a prompt snippet appended to the base system
/// prompt, and zero or more named globals injected verbatim into the
/// interpreter context.
#[derive(Debug, Clone, Default)]
pub struct Skill {
    pub name: String,
    pub prompt_snippet: String,
    pub globals: Vec<(String, Value)>,
}

/// The ordered set of skills active for one session. Order matters only for
/// prompt assembly (snippets are appended in registration order); globals
/// from later skills overwrite identically-named globals from earlier ones,
/// matching ordinary object-literal merge semantics.
#[derive(Debug, Clone, Default)]
pub struct SkillContext {
    skills: Vec<Skill>,
}

impl SkillContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skill(mut self, skill: Skill) -> Self {
        self.skills.push(skill);
        self
    }

    pub fn prompt_snippets(&self) -> impl Iterator<Item = &str> {
        self.skills.iter().map(|s| s.prompt_snippet.as_str())
    }

    /// Every named global across every skill, later skills winning on name
    /// collision.
    pub fn globals(&self) -> Vec<(String, Value)> {
        let mut merged: Vec<(String, Value)> = Vec::new();
        for skill in &self.skills {
            for (name, value) in &skill.globals {
                if let Some(existing) = merged.iter_mut().find(|(n, _)| n == name) {
                    existing.1 = value.clone();
                } else {
                    merged.push((name.clone(), value.clone()));
                }
            }
        }
        merged
    }
}

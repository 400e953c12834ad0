// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative field-presence checks over JSON objects.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    Require,
    Optional,
    Disallow,
}

/// What to do with fields that no rule mentions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedFields {
    Optional,
    Disallow,
}

/// A set of named field rules, built with [`require`](Self::require),
/// [`optional`](Self::optional) and [`disallow`](Self::disallow).
#[derive(Debug, Clone, Default)]
pub struct ShapeValidator {
    rules: Vec<(&'static str, FieldRule)>,
}

impl ShapeValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(self, field: &'static str) -> Self {
        self.rule(field, FieldRule::Require)
    }

    pub fn optional(self, field: &'static str) -> Self {
        self.rule(field, FieldRule::Optional)
    }

    pub fn disallow(self, field: &'static str) -> Self {
        self.rule(field, FieldRule::Disallow)
    }

    fn rule(mut self, field: &'static str, rule: FieldRule) -> Self {
        self.rules.retain(|(name, _)| *name != field);
        self.rules.push((field, rule));
        self
    }

    /// Check `value` against the rules. Absent values and non-objects fail.
    ///
    /// A field counts as present when its key exists with a non-null value.
    pub fn evaluate(&self, value: Option<&Value>, unmatched: UnmatchedFields) -> bool {
        let Some(Value::Object(map)) = value else {
            return false;
        };
        let present = |field: &str| map.get(field).is_some_and(|v| !v.is_null());

        for &(field, rule) in &self.rules {
            match rule {
                FieldRule::Require if !present(field) => return false,
                FieldRule::Disallow if present(field) => return false,
                _ => {}
            }
        }

        if unmatched == UnmatchedFields::Disallow {
            let known = |key: &str| self.rules.iter().any(|(name, _)| *name == key);
            if map.iter().any(|(key, v)| !v.is_null() && !known(key.as_str())) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "shape_tests.rs"]
mod tests;

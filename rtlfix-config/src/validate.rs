//! Structural compatibility gate for remote documents.
//!
//! A candidate is compared against the bundled baseline of its type:
//!
//! - Primitives must have the same JSON kind as the baseline value (values are free)
//! - Arrays must be non-empty; for `domains`, at least one item must carry every
//!   key seen across the baseline items
//! - Objects must contain every baseline key; nested values are compared recursively
//! - Extra keys in the candidate are always allowed
//!
//! Type-specific checks run after the structural pass. This is a compatibility
//! gate, not full schema validation: remote documents are maintained by hand and
//! must never be able to break styling, but additive changes must keep passing.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::baseline::bundled;
use crate::config_type::ConfigType;
use crate::document::ConfigDocument;
use crate::error::ValidationError;

/// Style classes every `styles` document must define.
pub const REQUIRED_STYLE_CLASSES: [&str; 3] = ["rtl-auto", "rtl-inherit", "rtl-force"];

/// Selector lists every `defaults.selectors` object must define.
pub const REQUIRED_SELECTOR_LISTS: [&str; 3] = ["attributes", "tags", "classes"];

/// Whether `candidate` may replace the cached document for `config_type`.
pub fn accept(config_type: ConfigType, candidate: &ConfigDocument) -> bool {
    match validate(config_type, candidate) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("{e}");
            false
        }
    }
}

/// Validate `candidate`, reporting the first incompatibility found.
pub fn validate(
    config_type: ConfigType,
    candidate: &ConfigDocument,
) -> Result<(), ValidationError> {
    let checker = ShapeChecker { config_type };
    checker.compare(bundled(config_type).as_value(), candidate.as_value(), "$")?;

    match config_type {
        ConfigType::Defaults => checker.check_defaults(candidate.as_value()),
        ConfigType::Domains => Ok(()),
        ConfigType::Styles => checker.check_styles(candidate.as_value()),
        ConfigType::Ui => checker.check_ui(candidate.as_value()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct ShapeChecker {
    config_type: ConfigType,
}

impl ShapeChecker {
    fn reject(&self, path: &str, reason: impl Into<String>) -> ValidationError {
        ValidationError::new(self.config_type, path, reason)
    }

    fn mismatch(&self, path: &str, expected: &Value, found: &Value) -> ValidationError {
        self.reject(
            path,
            format!("expected {}, found {}", kind(expected), kind(found)),
        )
    }

    fn compare(
        &self,
        baseline: &Value,
        candidate: &Value,
        path: &str,
    ) -> Result<(), ValidationError> {
        match baseline {
            // No shape to enforce
            Value::Null => Ok(()),
            Value::Bool(_) if candidate.is_boolean() => Ok(()),
            Value::Number(_) if candidate.is_number() => Ok(()),
            Value::String(_) if candidate.is_string() => Ok(()),
            Value::Array(items) => {
                let Some(candidate_items) = candidate.as_array() else {
                    return Err(self.mismatch(path, baseline, candidate));
                };
                self.compare_array(items, candidate_items, path)
            }
            Value::Object(fields) => {
                let Some(candidate_fields) = candidate.as_object() else {
                    return Err(self.mismatch(path, baseline, candidate));
                };
                self.compare_object(fields, candidate_fields, path)
            }
            _ => Err(self.mismatch(path, baseline, candidate)),
        }
    }

    fn compare_object(
        &self,
        baseline: &Map<String, Value>,
        candidate: &Map<String, Value>,
        path: &str,
    ) -> Result<(), ValidationError> {
        for (key, baseline_value) in baseline {
            let child = format!("{path}.{key}");
            let Some(candidate_value) = candidate.get(key) else {
                return Err(self.reject(&child, "required key is missing"));
            };
            self.compare(baseline_value, candidate_value, &child)?;
        }
        Ok(())
    }

    fn compare_array(
        &self,
        baseline: &[Value],
        candidate: &[Value],
        path: &str,
    ) -> Result<(), ValidationError> {
        if candidate.is_empty() {
            return Err(self.reject(path, "array is empty"));
        }

        if self.config_type != ConfigType::Domains {
            return Ok(());
        }

        // Domain lists are checked loosely: one plausible item is enough.
        let required: BTreeSet<&str> = baseline
            .iter()
            .filter_map(Value::as_object)
            .flat_map(|item| item.keys().map(String::as_str))
            .collect();
        if required.is_empty() {
            return Ok(());
        }

        let plausible = candidate.iter().filter_map(Value::as_object).any(|item| {
            required.iter().all(|key| item.contains_key(*key))
        });
        if plausible {
            Ok(())
        } else {
            let keys: Vec<&str> = required.into_iter().collect();
            Err(self.reject(
                path,
                format!("no item contains all required keys: {}", keys.join(", ")),
            ))
        }
    }

    fn check_defaults(&self, doc: &Value) -> Result<(), ValidationError> {
        for key in ["position", "selectors"] {
            if !doc.get(key).is_some_and(Value::is_object) {
                return Err(self.reject(&format!("$.{key}"), "must be a non-null object"));
            }
        }
        let selectors = &doc["selectors"];
        for list in REQUIRED_SELECTOR_LISTS {
            if !selectors.get(list).is_some_and(Value::is_array) {
                return Err(self.reject(&format!("$.selectors.{list}"), "must be an array"));
            }
        }
        Ok(())
    }

    fn check_styles(&self, doc: &Value) -> Result<(), ValidationError> {
        for class in REQUIRED_STYLE_CLASSES {
            let non_empty = doc
                .get(class)
                .and_then(Value::as_object)
                .is_some_and(|props| !props.is_empty());
            if !non_empty {
                return Err(self.reject(
                    &format!("$.{class}"),
                    "style class must be a non-empty property mapping",
                ));
            }
        }
        Ok(())
    }

    fn check_ui(&self, doc: &Value) -> Result<(), ValidationError> {
        for variant in ["light", "dark"] {
            if doc.get("theme").and_then(|t| t.get(variant)).is_none() {
                return Err(self.reject(&format!("$.theme.{variant}"), "theme variant is missing"));
            }
        }
        let base_styles = doc
            .get("indicatorBaseStyles")
            .and_then(Value::as_object)
            .is_some_and(|styles| !styles.is_empty());
        if !base_styles {
            return Err(self.reject(
                "$.indicatorBaseStyles",
                "must be a non-empty object",
            ));
        }
        Ok(())
    }
}

//! Configuration documents and their typed views.
//!
//! Documents travel through the sync pipeline as raw JSON so the structural
//! validator can compare them against the bundled baseline key by key. The
//! typed views below are what the styling and indicator layers deserialize
//! into; unknown fields are ignored so additive remote changes stay readable.
//!
//! The validator only pins the JSON kind of keys the baseline already has, so
//! the typed views accept anything it lets through: numbers may be fractional,
//! list items and declaration values are not kind-checked, and domain rules
//! that do not fit are skipped one by one.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

/// A configuration payload as accepted by the sync core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigDocument(Value);

impl ConfigDocument {
    /// Wrap an already-parsed JSON value.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse a UTF-8 JSON body.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self)
    }

    /// Borrow the underlying JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Deserialize into one of the typed views.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }

    /// Domain rules of a `domains` document.
    ///
    /// Items that cannot be read as a rule are skipped; only a non-array
    /// document is an error.
    pub fn domain_rules(&self) -> Result<Vec<DomainRule>, serde_json::Error> {
        let items = Vec::<Value>::deserialize(&self.0)?;
        let total = items.len();
        let rules: Vec<DomainRule> = items
            .iter()
            .filter_map(|item| match DomainRule::deserialize(item) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    log::debug!("Skipping unreadable domain rule: {}", e);
                    None
                }
            })
            .collect();
        if rules.len() < total {
            log::warn!("Skipped {} of {} domain rules", total - rules.len(), total);
        }
        Ok(rules)
    }

    /// Pretty-printed JSON for diagnostics output.
    pub fn to_pretty_string(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| self.0.to_string())
    }
}

impl From<Value> for ConfigDocument {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Where the RTL indicator is anchored on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSpec {
    /// One of `top-left`, `top-right`, `bottom-left`, `bottom-right`
    #[serde(default = "default_corner")]
    pub corner: String,
    /// Horizontal offset from the corner, in CSS pixels
    #[serde(default)]
    pub offset_x: f64,
    /// Vertical offset from the corner, in CSS pixels
    #[serde(default)]
    pub offset_y: f64,
}

fn default_corner() -> String {
    "bottom-right".to_string()
}

/// Which DOM elements are candidates for direction correction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorSpec {
    /// Attribute names whose presence marks a message container
    #[serde(default, deserialize_with = "string_items")]
    pub attributes: Vec<String>,
    /// Tag names inspected for RTL content
    #[serde(default, deserialize_with = "string_items")]
    pub tags: Vec<String>,
    /// Class names inspected for RTL content
    #[serde(default, deserialize_with = "string_items")]
    pub classes: Vec<String>,
}

/// Keep the string items of a list, dropping anything else.
fn string_items<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let items = Vec::<Value>::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect())
}

/// Any JSON number as whole milliseconds; negatives become zero.
fn whole_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let number = Number::deserialize(deserializer)?;
    Ok(number.as_u64().unwrap_or_else(|| {
        number
            .as_f64()
            .map_or(0, |ms| ms.max(0.0).round() as u64)
    }))
}

/// Behaviour switches carried in the `defaults` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviourSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub show_indicator: bool,
    /// `auto`, `force` or `off`
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Delay before re-scanning mutated DOM subtrees
    #[serde(default = "default_debounce_ms", deserialize_with = "whole_millis")]
    pub debounce_ms: u64,
    /// Fraction of strong RTL characters above which a block is treated as RTL
    #[serde(default = "default_rtl_threshold")]
    pub rtl_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_mode() -> String {
    "auto".to_string()
}

fn default_debounce_ms() -> u64 {
    150
}

fn default_rtl_threshold() -> f64 {
    0.3
}

impl Default for BehaviourSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            show_indicator: true,
            mode: default_mode(),
            debounce_ms: default_debounce_ms(),
            rtl_threshold: default_rtl_threshold(),
        }
    }
}

/// Typed view of the `defaults` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    pub position: PositionSpec,
    pub selectors: SelectorSpec,
    #[serde(default)]
    pub settings: BehaviourSettings,
}

/// One entry of the `domains` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRule {
    /// Host pattern: `example.com` or `*.example.com`
    pub domain: String,
    pub position: PositionSpec,
    pub selectors: SelectorSpec,
}

impl DomainRule {
    /// Whether this rule applies to `host`.
    ///
    /// `*.example.com` and `example.com` both match `example.com` itself and
    /// any subdomain of it. Comparison is case-insensitive and ignores a
    /// trailing dot on the host.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
        let pattern = self.domain.trim().to_ascii_lowercase();
        let suffix = pattern.strip_prefix("*.").unwrap_or(&pattern);

        if suffix.is_empty() || host.is_empty() {
            return false;
        }

        host == suffix
            || host
                .strip_suffix(suffix)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

/// One CSS declaration value. Remote documents may carry numbers or other
/// JSON values where the baseline has strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CssValue(Value);

impl CssValue {
    /// The value as CSS text: strings verbatim, anything else as JSON.
    pub fn as_css(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for CssValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_css())
    }
}

impl From<&str> for CssValue {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

/// Property name to value.
pub type Declarations = BTreeMap<String, CssValue>;

/// Typed view of the `styles` document: class name to CSS declarations.
///
/// Top-level entries that are not objects are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StyleClasses(BTreeMap<String, Declarations>);

impl StyleClasses {
    pub fn class(&self, name: &str) -> Option<&Declarations> {
        self.0.get(name)
    }
}

impl Deref for StyleClasses {
    type Target = BTreeMap<String, Declarations>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for StyleClasses {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .filter_map(|(name, value)| {
                    Declarations::deserialize(&value).ok().map(|d| (name, d))
                })
                .collect(),
        ))
    }
}

/// Light and dark palettes for the indicator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemePair {
    pub light: Declarations,
    pub dark: Declarations,
}

/// Typed view of the `ui` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiConfig {
    pub theme: ThemePair,
    pub indicator_base_styles: Declarations,
    #[serde(default)]
    pub link_styles: Declarations,
}

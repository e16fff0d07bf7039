//! Scheme configuration types: scheme, element binding,
//! template, element group, and style rule.
//!
//! Every field a [`ElementConfig`] can inherit from a named template is
//! `Option`; absence (not present in the TOML source) is exactly
//! "not explicitly set", which the template resolver consumes directly —
//! no separate explicit-key bitset is needed for this shape.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Text,
    Int,
    Float,
    Bool,
}

fn default_style_match() -> String {
    ".*".to_string()
}

fn default_style_text() -> String {
    "%%".to_string()
}

/// `(match, min?, max?, fill?, opacity?, style?, text)`.
#[derive(Debug, Clone, Deserialize)]
pub struct StyleRuleConfig {
    #[serde(rename = "match", default = "default_style_match")]
    pub pattern: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub fill: Option<String>,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default = "default_style_text")]
    pub text: String,
}

impl Default for StyleRuleConfig {
    fn default() -> Self {
        Self {
            pattern: default_style_match(),
            min: None,
            max: None,
            fill: None,
            opacity: None,
            style: None,
            text: default_style_text(),
        }
    }
}

/// An element binding, doubling as a template definition when it carries
/// a `template` name and is listed under `[[scheme_element_template]]`
/// rather than under a scheme.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ElementConfig {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub data_module: Option<String>,
    #[serde(default)]
    pub data_id: Option<String>,
    pub svg_id: String,
    #[serde(default)]
    pub write: Option<bool>,
    #[serde(default)]
    pub cov: Option<bool>,
    #[serde(default)]
    pub influx_query: Option<String>,
    #[serde(rename = "type", default)]
    pub element_type: Option<ElementType>,
    #[serde(default)]
    pub map: Option<HashMap<String, String>>,
    #[serde(default)]
    pub precision: Option<u32>,
    #[serde(default)]
    pub style: Option<Vec<StyleRuleConfig>>,
}

/// A reference, at the scheme site, to a named element group plus the
/// `variables` map used for `{name}` substitution.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupReferenceConfig {
    pub group_name: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// `(group_name, elements[])`.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementGroupConfig {
    pub group_name: String,
    #[serde(default)]
    pub element: Vec<ElementConfig>,
}

/// `(scheme_id, scheme_name, svg_path, interval, elements[])`.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemeConfig {
    pub scheme_id: String,
    #[serde(default)]
    pub scheme_name: String,
    pub svg_path: String,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default)]
    pub element: Vec<ElementConfig>,
    #[serde(default)]
    pub group: Vec<GroupReferenceConfig>,
}

fn default_interval() -> u32 {
    5
}

//! The Scheme Configuration Resolver: expands element
//! groups with variable substitution, then resolves template inheritance,
//! producing fully-populated [`ResolvedElement`]s.

use std::collections::HashMap;

use conduit_core::GatewayError;
use indexmap::IndexMap;

use crate::config::{ElementConfig, ElementGroupConfig, ElementType, GroupReferenceConfig, SchemeConfig, StyleRuleConfig};

/// A fully-populated element binding: every field a template could have
/// supplied has been resolved.
#[derive(Debug, Clone)]
pub struct ResolvedElement {
    pub data_module: String,
    pub data_id: String,
    pub svg_id: String,
    pub write: bool,
    pub cov: bool,
    pub influx_query: String,
    pub element_type: ElementType,
    pub map: HashMap<String, String>,
    pub precision: u32,
    pub style: Vec<StyleRuleConfig>,
}

#[derive(Debug, Clone)]
pub struct ResolvedScheme {
    pub scheme_id: String,
    pub scheme_name: String,
    pub svg_path: String,
    pub interval: u32,
    pub elements: Vec<ResolvedElement>,
}

/// Owns the template/group/scheme indices and the resolved output.
pub struct SchemeResolver {
    schemes: IndexMap<String, ResolvedScheme>,
}

impl SchemeResolver {
    /// Runs both resolution passes over `templates`/`groups`/`schemes` and
    /// returns the resolver, or the first fatal configuration error
    /// (duplicate key, missing reference, missing substitution
    /// variable).
    pub fn new(
        templates: Vec<ElementConfig>,
        groups: Vec<ElementGroupConfig>,
        schemes: Vec<SchemeConfig>,
    ) -> Result<Self, GatewayError> {
        let template_index = index_templates(templates)?;
        let group_index = index_groups(groups)?;

        let mut resolved = IndexMap::with_capacity(schemes.len());
        for scheme in schemes {
            if resolved.contains_key(&scheme.scheme_id) {
                return Err(GatewayError::Configuration(format!(
                    "duplicate scheme id '{}'",
                    scheme.scheme_id
                )));
            }
            let mut elements = scheme.element.clone();
            expand_groups(&scheme, &group_index, &mut elements)?;

            let resolved_elements: Result<Vec<ResolvedElement>, GatewayError> = elements
                .into_iter()
                .map(|element| resolve_template(element, &template_index, &scheme.scheme_id))
                .collect();

            resolved.insert(
                scheme.scheme_id.clone(),
                ResolvedScheme {
                    scheme_id: scheme.scheme_id,
                    scheme_name: scheme.scheme_name,
                    svg_path: scheme.svg_path,
                    interval: scheme.interval,
                    elements: resolved_elements?,
                },
            );
        }

        Ok(Self { schemes: resolved })
    }

    /// All configured schemes, in declaration order.
    pub fn schemes(&self) -> impl Iterator<Item = &ResolvedScheme> {
        self.schemes.values()
    }

    /// Looks up a scheme by id.
    pub fn get_scheme(&self, scheme_id: &str) -> Result<&ResolvedScheme, GatewayError> {
        self.schemes
            .get(scheme_id)
            .ok_or_else(|| GatewayError::NotFound(format!("scheme '{scheme_id}'")))
    }

    /// Looks up a single element binding by `svg_id` within a scheme.
    pub fn get_element(&self, scheme_id: &str, svg_id: &str) -> Result<&ResolvedElement, GatewayError> {
        let scheme = self.get_scheme(scheme_id)?;
        let matches: Vec<&ResolvedElement> = scheme
            .elements
            .iter()
            .filter(|element| element.svg_id == svg_id)
            .collect();
        match matches.as_slice() {
            [single] => Ok(single),
            _ => Err(GatewayError::NotFound(format!(
                "element '{svg_id}' in scheme '{scheme_id}' (missing or duplicate)"
            ))),
        }
    }
}

fn index_templates(templates: Vec<ElementConfig>) -> Result<HashMap<String, ElementConfig>, GatewayError> {
    let mut index = HashMap::with_capacity(templates.len());
    for template in templates {
        let name = template.template.clone().ok_or_else(|| {
            GatewayError::Configuration("template definition requires a 'template' name".to_string())
        })?;
        if index.insert(name.clone(), template).is_some() {
            return Err(GatewayError::Configuration(format!("duplicate template name '{name}'")));
        }
    }
    Ok(index)
}

fn index_groups(groups: Vec<ElementGroupConfig>) -> Result<HashMap<String, ElementGroupConfig>, GatewayError> {
    let mut index = HashMap::with_capacity(groups.len());
    for group in groups {
        let name = group.group_name.clone();
        if index.insert(name.clone(), group).is_some() {
            return Err(GatewayError::Configuration(format!("duplicate group name '{name}'")));
        }
    }
    Ok(index)
}

fn expand_groups(
    scheme: &SchemeConfig,
    groups: &HashMap<String, ElementGroupConfig>,
    elements: &mut Vec<ElementConfig>,
) -> Result<(), GatewayError> {
    for reference in &scheme.group {
        let group = groups.get(&reference.group_name).ok_or_else(|| {
            GatewayError::Configuration(format!(
                "group '{}' not found, required by scheme '{}'",
                reference.group_name, scheme.scheme_id
            ))
        })?;
        for element in &group.element {
            elements.push(substitute_element(element, reference)?);
        }
    }
    Ok(())
}

/// Clones `element`, passing every string field through `{name}`
/// substitution from the group reference's `variables`.
fn substitute_element(element: &ElementConfig, reference: &GroupReferenceConfig) -> Result<ElementConfig, GatewayError> {
    let subst = |s: &str| substitute_variables(s, &reference.variables);
    let subst_opt = |s: &Option<String>| s.as_deref().map(subst).transpose();

    Ok(ElementConfig {
        template: subst_opt(&element.template)?,
        data_module: subst_opt(&element.data_module)?,
        data_id: subst_opt(&element.data_id)?,
        svg_id: subst(&element.svg_id)?,
        write: element.write,
        cov: element.cov,
        influx_query: subst_opt(&element.influx_query)?,
        element_type: element.element_type,
        map: element
            .map
            .as_ref()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| Ok((subst(k)?, subst(v)?)))
                    .collect::<Result<HashMap<String, String>, GatewayError>>()
            })
            .transpose()?,
        precision: element.precision,
        style: element
            .style
            .as_ref()
            .map(|styles| {
                styles
                    .iter()
                    .map(|style| substitute_style(style, &reference.variables))
                    .collect::<Result<Vec<StyleRuleConfig>, GatewayError>>()
            })
            .transpose()?,
    })
}

fn substitute_style(style: &StyleRuleConfig, variables: &HashMap<String, String>) -> Result<StyleRuleConfig, GatewayError> {
    let subst = |s: &str| substitute_variables(s, variables);
    Ok(StyleRuleConfig {
        pattern: subst(&style.pattern)?,
        min: style.min,
        max: style.max,
        fill: style.fill.as_deref().map(subst).transpose()?,
        opacity: style.opacity,
        style: style.style.as_deref().map(subst).transpose()?,
        text: subst(&style.text)?,
    })
}

/// Replaces `{name}` occurrences in `s` from `variables`; a referenced
/// variable that is missing is fatal.
fn substitute_variables(s: &str, variables: &HashMap<String, String>) -> Result<String, GatewayError> {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = s[i + 1..].find('}') {
                let name = &s[i + 1..i + 1 + end];
                let value = variables.get(name).ok_or_else(|| {
                    GatewayError::Configuration(format!("unknown variable '{name}' in '{s}'"))
                })?;
                out.push_str(value);
                i += end + 2;
                continue;
            }
        }
        let ch = s[i..].chars().next().expect("i < bytes.len()");
        out.push(ch);
        i += ch.len_utf8();
    }
    Ok(out)
}

fn resolve_template(
    element: ElementConfig,
    templates: &HashMap<String, ElementConfig>,
    scheme_id: &str,
) -> Result<ResolvedElement, GatewayError> {
    let template = match &element.template {
        Some(name) => Some(templates.get(name).ok_or_else(|| {
            GatewayError::Configuration(format!(
                "template '{name}' not found, required by '{}' in scheme '{scheme_id}'",
                element.svg_id
            ))
        })?),
        None => None,
    };

    macro_rules! inherit {
        ($field:ident) => {
            element
                .$field
                .clone()
                .or_else(|| template.and_then(|t| t.$field.clone()))
        };
    }

    Ok(ResolvedElement {
        data_module: inherit!(data_module).unwrap_or_default(),
        data_id: inherit!(data_id).unwrap_or_default(),
        svg_id: element.svg_id,
        write: inherit!(write).unwrap_or(false),
        cov: inherit!(cov).unwrap_or(false),
        influx_query: inherit!(influx_query).unwrap_or_default(),
        element_type: inherit!(element_type).unwrap_or(ElementType::Text),
        map: inherit!(map).unwrap_or_default(),
        precision: inherit!(precision).unwrap_or(4),
        style: inherit!(style).unwrap_or_else(|| vec![StyleRuleConfig::default()]),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn element(svg_id: &str) -> ElementConfig {
        ElementConfig {
            svg_id: svg_id.to_string(),
            ..Default::default()
        }
    }

    #[rstest]
    fn test_duplicate_scheme_id_is_fatal() {
        let scheme = SchemeConfig {
            scheme_id: "a".to_string(),
            scheme_name: String::new(),
            svg_path: "a.svg".to_string(),
            interval: 5,
            element: vec![],
            group: vec![],
        };
        let result = SchemeResolver::new(vec![], vec![], vec![scheme.clone(), scheme]);
        assert!(result.is_err());
    }

    #[rstest]
    fn test_template_inheritance_fills_unset_fields() {
        let mut template = element("ignored");
        template.template = Some("tpl".to_string());
        template.data_module = Some("random".to_string());
        template.precision = Some(2);

        let mut bound = element("gauge1");
        bound.template = Some("tpl".to_string());
        bound.data_id = Some("t1".to_string());

        let scheme = SchemeConfig {
            scheme_id: "s1".to_string(),
            scheme_name: String::new(),
            svg_path: "s1.svg".to_string(),
            interval: 5,
            element: vec![bound],
            group: vec![],
        };

        let resolver = SchemeResolver::new(vec![template], vec![], vec![scheme]).unwrap();
        let resolved = resolver.get_element("s1", "gauge1").unwrap();
        assert_eq!(resolved.data_module, "random");
        assert_eq!(resolved.data_id, "t1");
        assert_eq!(resolved.precision, 2);
    }

    #[rstest]
    fn test_missing_template_is_fatal() {
        let mut bound = element("gauge1");
        bound.template = Some("nope".to_string());
        let scheme = SchemeConfig {
            scheme_id: "s1".to_string(),
            scheme_name: String::new(),
            svg_path: "s1.svg".to_string(),
            interval: 5,
            element: vec![bound],
            group: vec![],
        };
        assert!(SchemeResolver::new(vec![], vec![], vec![scheme]).is_err());
    }

    #[rstest]
    fn test_group_expansion_substitutes_variables() {
        let mut group_element = element("{room}-gauge");
        group_element.data_module = Some("random".to_string());
        group_element.data_id = Some("{room}::int".to_string());

        let group = ElementGroupConfig {
            group_name: "rooms".to_string(),
            element: vec![group_element],
        };

        let mut reference = GroupReferenceConfig {
            group_name: "rooms".to_string(),
            variables: HashMap::new(),
        };
        reference.variables.insert("room".to_string(), "kitchen".to_string());

        let scheme = SchemeConfig {
            scheme_id: "s1".to_string(),
            scheme_name: String::new(),
            svg_path: "s1.svg".to_string(),
            interval: 5,
            element: vec![],
            group: vec![reference],
        };

        let resolver = SchemeResolver::new(vec![], vec![group], vec![scheme]).unwrap();
        let resolved = resolver.get_element("s1", "kitchen-gauge").unwrap();
        assert_eq!(resolved.data_id, "kitchen::int");
    }

    #[rstest]
    fn test_group_expansion_missing_variable_is_fatal() {
        let group_element = element("{room}-gauge");
        let group = ElementGroupConfig {
            group_name: "rooms".to_string(),
            element: vec![group_element],
        };
        let reference = GroupReferenceConfig {
            group_name: "rooms".to_string(),
            variables: HashMap::new(),
        };
        let scheme = SchemeConfig {
            scheme_id: "s1".to_string(),
            scheme_name: String::new(),
            svg_path: "s1.svg".to_string(),
            interval: 5,
            element: vec![],
            group: vec![reference],
        };
        assert!(SchemeResolver::new(vec![], vec![group], vec![scheme]).is_err());
    }
}

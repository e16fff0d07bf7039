//! The Scheme Renderer: loads an SVG document, fans out
//! reads across data modules, mutates matched nodes, and serialises.

use std::collections::HashMap;

use conduit_core::{GatewayError, PointValue};
use conduit_data::DataController;
use xmltree::{Element, XMLNode};

use crate::resolver::{ResolvedElement, ResolvedScheme, SchemeResolver};

/// Where scheme SVG files live on disk, configured at the gateway level.
pub struct SchemeRenderer {
    schemes_dir: std::path::PathBuf,
}

impl SchemeRenderer {
    pub fn new(schemes_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            schemes_dir: schemes_dir.into(),
        }
    }

    /// Renders `scheme_id` to a serialised SVG document using live values
    /// from `controller`.
    pub async fn build_svg(
        &self,
        resolver: &SchemeResolver,
        scheme_id: &str,
        controller: &DataController,
    ) -> Result<String, GatewayError> {
        let scheme = resolver.get_scheme(scheme_id)?;
        let path = self.schemes_dir.join(&scheme.svg_path);
        let file = std::fs::File::open(&path).map_err(|err| GatewayError::Configuration(format!(
            "could not load scheme SVG '{}': {err}",
            path.display()
        )))?;
        let mut svg = Element::parse(std::io::BufReader::new(file)).map_err(|err| {
            GatewayError::Configuration(format!("could not parse scheme SVG '{}': {err}", path.display()))
        })?;

        let grouped = group_by_module(scheme);
        let mut data_by_module = HashMap::with_capacity(grouped.len());
        let futures = grouped.iter().map(|(module, data_ids)| {
            let ids: Vec<String> = data_ids.iter().map(|element| element.data_id.clone()).collect();
            async move { (module.clone(), controller.get_values(module, &ids).await) }
        });
        for (module, result) in futures::future::join_all(futures).await {
            match result {
                Ok(values) => {
                    data_by_module.insert(module, values);
                }
                Err(err) => {
                    tracing::error!(module, error = %err, scheme_id, "failed to read data module while rendering scheme");
                }
            }
        }

        for (module, elements) in &grouped {
            let Some(values) = data_by_module.get(module) else {
                continue;
            };
            for element in elements {
                let Some(value) = values.get(&element.data_id) else {
                    tracing::error!(
                        scheme_id,
                        svg_id = element.svg_id,
                        "no value returned for data id '{}'",
                        element.data_id
                    );
                    continue;
                };
                build_element(&mut svg, element, value, scheme_id);
            }
        }

        svg.attributes.insert("width".to_string(), "100%".to_string());
        svg.attributes.insert("height".to_string(), "100%".to_string());

        let mut out = Vec::new();
        svg.write(&mut out)
            .map_err(|err| GatewayError::Configuration(format!("failed to serialise scheme SVG: {err}")))?;
        String::from_utf8(out)
            .map_err(|err| GatewayError::Configuration(format!("scheme SVG is not valid UTF-8: {err}")))
    }
}

fn group_by_module(scheme: &ResolvedScheme) -> HashMap<String, Vec<&ResolvedElement>> {
    let mut grouped: HashMap<String, Vec<&ResolvedElement>> = HashMap::new();
    for element in &scheme.elements {
        grouped.entry(element.data_module.clone()).or_default().push(element);
    }
    grouped
}

fn build_element(svg: &mut Element, element: &ResolvedElement, value: &PointValue, scheme_id: &str) {
    let Some(node) = find_by_id(svg, &element.svg_id) else {
        tracing::error!(scheme_id, svg_id = element.svg_id, "svg_id not found in scheme SVG");
        return;
    };

    let mut data = value.as_display();
    if element.element_type == crate::config::ElementType::Float {
        match data.parse::<f64>() {
            Ok(parsed) => data = format!("{parsed:.*}", element.precision as usize),
            Err(err) => {
                tracing::error!(scheme_id, svg_id = element.svg_id, value = data, error = %err, "expected a float value");
                return;
            }
        }
    }

    let Some(style) = select_style(element, &data) else {
        tracing::error!(scheme_id, svg_id = element.svg_id, value = data, "no style rule matched");
        return;
    };

    let displayed = element.map.get(&data).cloned().unwrap_or(data);
    apply_style(node, style, &displayed);
}

fn select_style<'e>(element: &'e ResolvedElement, value: &str) -> Option<&'e crate::config::StyleRuleConfig> {
    element.style.iter().find(|style| style_matches(style, value))
}

fn style_matches(style: &crate::config::StyleRuleConfig, value: &str) -> bool {
    if style.min.is_some() || style.max.is_some() {
        if let Ok(parsed) = value.parse::<f64>() {
            if style.min.is_some_and(|min| parsed < min) {
                return false;
            }
            if style.max.is_some_and(|max| max < parsed) {
                return false;
            }
            return true;
        }
    }
    regex::Regex::new(&style.pattern)
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

fn apply_style(node: &mut Element, style: &crate::config::StyleRuleConfig, value: &str) {
    if style.fill.is_some() || style.opacity.is_some() || style.style.is_some() {
        let mut merged = node.attributes.get("style").cloned().unwrap_or_default();
        if let Some(fill) = &style.fill {
            merged = format!("{merged};fill:{fill}");
        }
        if let Some(opacity) = style.opacity {
            merged = format!("{merged};opacity:{opacity}");
        }
        if let Some(explicit) = &style.style {
            merged = explicit.clone();
        }
        node.attributes.insert("style".to_string(), merged);
    }
    set_element_text(node, style.text.replace("%%", value));
}

fn find_by_id<'e>(root: &'e mut Element, id: &str) -> Option<&'e mut Element> {
    if root.attributes.get("id").map(String::as_str) == Some(id) {
        return Some(root);
    }
    for child in &mut root.children {
        if let XMLNode::Element(child) = child {
            if let Some(found) = find_by_id(child, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Sets the first child element's text when one exists, else the node's
/// own text.
fn set_element_text(node: &mut Element, text: String) {
    let target = node
        .children
        .iter_mut()
        .find_map(|child| match child {
            XMLNode::Element(element) => Some(element),
            _ => None,
        })
        .unwrap_or(node);
    set_text_node(target, text);
}

fn set_text_node(node: &mut Element, text: String) {
    if let Some(existing) = node.children.iter_mut().find_map(|child| match child {
        XMLNode::Text(existing) => Some(existing),
        _ => None,
    }) {
        *existing = text;
    } else {
        node.children.insert(0, XMLNode::Text(text));
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::config::StyleRuleConfig;

    fn style(min: Option<f64>, max: Option<f64>, pattern: &str) -> StyleRuleConfig {
        StyleRuleConfig {
            pattern: pattern.to_string(),
            min,
            max,
            ..Default::default()
        }
    }

    #[rstest]
    fn test_style_matches_numeric_range() {
        let rule = style(Some(0.0), Some(10.0), ".*");
        assert!(style_matches(&rule, "5"));
        assert!(!style_matches(&rule, "15"));
    }

    #[rstest]
    fn test_style_matches_falls_back_to_regex_for_non_numeric_value() {
        let rule = style(Some(0.0), Some(10.0), "^ok$");
        assert!(style_matches(&rule, "ok"));
        assert!(!style_matches(&rule, "nope"));
    }

    #[rstest]
    fn test_find_by_id_locates_nested_node() {
        let mut svg = Element::new("svg");
        let mut group = Element::new("g");
        let mut text = Element::new("text");
        text.attributes.insert("id".to_string(), "gauge1".to_string());
        group.children.push(XMLNode::Element(text));
        svg.children.push(XMLNode::Element(group));

        assert!(find_by_id(&mut svg, "gauge1").is_some());
        assert!(find_by_id(&mut svg, "missing").is_none());
    }

    #[rstest]
    fn test_set_element_text_prefers_first_child() {
        let mut node = Element::new("text");
        node.children.push(XMLNode::Element(Element::new("tspan")));

        set_element_text(&mut node, "42".to_string());

        let XMLNode::Element(child) = &node.children[0] else {
            panic!("expected element child");
        };
        assert_eq!(child.get_text().as_deref(), Some("42"));
    }

    #[rstest]
    fn test_apply_style_merges_fill_and_opacity() {
        let mut node = Element::new("rect");
        let rule = StyleRuleConfig {
            fill: Some("red".to_string()),
            opacity: Some(0.5),
            ..Default::default()
        };
        apply_style(&mut node, &rule, "1");
        let style = node.attributes.get("style").unwrap();
        assert!(style.contains("fill:red"));
        assert!(style.contains("opacity:0.5"));
    }
}

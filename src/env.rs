use std::collections::HashSet;

// How the live environment exposes computed-style property names. Some
// style objects are indexable by position and yield dash-form names, others
// only enumerate camelCase keys. The prober normalizes both shapes.
#[derive(Debug, Clone)]
pub enum StylePropertyNames {
    Indexed(Vec<String>),
    Enumerated(Vec<String>),
    Unavailable,
}

// Capability surface of the rendering environment. This is the only
// environment-coupled seam: every probe is phrased as a question the host's
// style/DOM binding can answer, and an implementation that cannot answer
// returns false, which reads as "feature not required".
pub trait RenderEnv {
    // Property names exposed by the computed style of the root element.
    fn style_property_names(&self) -> StylePropertyNames;

    // Whether the scratch style object recognizes `property` (camelCase).
    fn supports_property(&self, property: &str) -> bool;

    // Assign `value` to `property` (camelCase) on a scratch style object and
    // report whether the assignment took effect.
    fn supports_value(&self, property: &str, value: &str) -> bool;

    // Insert `rule` into a scratch stylesheet and report whether the parser
    // kept it (rule count > 0).
    fn supports_rule(&self, rule: &str) -> bool;

    // Whether the environment honors a distinct `media` string per rule
    // within a single style resource.
    fn scoped_media(&self) -> bool {
        true
    }
}

// Table-driven environment for tests and non-browser embeddings: the host
// scripts exactly which names, values, and rules its engine accepts.
#[derive(Debug, Clone)]
pub struct ScriptedEnv {
    names: Option<StylePropertyNames>,
    style_properties: HashSet<String>,
    values: HashSet<(String, String)>,
    rules: HashSet<String>,
    scoped_media: bool,
}

impl ScriptedEnv {
    pub fn new() -> Self {
        Self {
            names: None,
            style_properties: HashSet::new(),
            values: HashSet::new(),
            rules: HashSet::new(),
            scoped_media: true,
        }
    }

    pub fn with_indexed_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(StylePropertyNames::Indexed(
            names.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn with_enumerated_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = Some(StylePropertyNames::Enumerated(
            names.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn with_style_property(mut self, camel: impl Into<String>) -> Self {
        self.style_properties.insert(camel.into());
        self
    }

    pub fn with_value(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert((property.into(), value.into()));
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.insert(rule.into());
        self
    }

    pub fn with_scoped_media(mut self, scoped: bool) -> Self {
        self.scoped_media = scoped;
        self
    }
}

impl Default for ScriptedEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEnv for ScriptedEnv {
    fn style_property_names(&self) -> StylePropertyNames {
        self.names
            .clone()
            .unwrap_or(StylePropertyNames::Unavailable)
    }

    fn supports_property(&self, property: &str) -> bool {
        self.style_properties.contains(property)
    }

    fn supports_value(&self, property: &str, value: &str) -> bool {
        self.values
            .contains(&(property.to_string(), value.to_string()))
    }

    fn supports_rule(&self, rule: &str) -> bool {
        self.rules.contains(rule)
    }

    fn scoped_media(&self) -> bool {
        self.scoped_media
    }
}

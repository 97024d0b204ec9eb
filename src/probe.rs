use crate::debug::DebugLogger;
use crate::env::{RenderEnv, StylePropertyNames};

// Candidate functions, each probed by assigning `name(params)` to a scratch
// property. Gradient variants share one test payload.
const FUNCTION_TESTS: &[(&str, &str, &str)] = &[
    ("linear-gradient", "backgroundImage", "red, teal"),
    ("calc", "width", "1px + 5%"),
    ("element", "backgroundImage", "#foo"),
    ("cross-fade", "backgroundImage", "url(a.png), url(b.png), 50%"),
    ("repeating-linear-gradient", "backgroundImage", "red, teal"),
    ("repeating-radial-gradient", "backgroundImage", "red, teal"),
    ("radial-gradient", "backgroundImage", "red, teal"),
];

// Candidate keyword values, each tied to the property it is probed against.
const KEYWORD_TESTS: &[(&str, &str)] = &[
    ("initial", "color"),
    ("zoom-in", "cursor"),
    ("zoom-out", "cursor"),
    ("box", "display"),
    ("flexbox", "display"),
    ("inline-flexbox", "display"),
    ("flex", "display"),
    ("inline-flex", "display"),
];

// Candidate selector fragments and at-rules, probed by inserting a throwaway
// rule into a scratch stylesheet.
const SELECTOR_TESTS: &[&str] = &[":read-only", ":read-write", ":any-link", "::selection"];

const ATRULE_TESTS: &[(&str, Option<&str>)] = &[
    ("keyframes", Some("name")),
    ("viewport", None),
    ("document", Some("regexp(\".\")")),
];

// Properties whose value text may itself contain a property name that needs
// prefixing (`transition: transform 1s`).
const VALUE_PROPERTIES: &[&str] = &["transition", "transition-property"];

// Immutable fact table produced by one probe of the rendering environment.
// `prefix` is the dash-delimited form ("-webkit-"), `prefix_token` the
// capitalized camel form ("Webkit") used for identifier construction. The
// four feature sets hold names supported only under the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixKnowledge {
    pub prefix: String,
    pub prefix_token: String,
    pub properties: Vec<String>,
    pub functions: Vec<String>,
    pub keywords: Vec<String>,
    pub selectors: Vec<String>,
    pub atrules: Vec<String>,
    pub value_properties: Vec<String>,
}

impl PrefixKnowledge {
    // Deactivated state: no prefix, every rewrite is the identity.
    pub fn inert() -> Self {
        Self {
            prefix: String::new(),
            prefix_token: String::new(),
            properties: Vec::new(),
            functions: Vec::new(),
            keywords: Vec::new(),
            selectors: Vec::new(),
            atrules: Vec::new(),
            value_properties: Vec::new(),
        }
    }

    pub fn is_inert(&self) -> bool {
        self.prefix.is_empty()
    }

    // Prefix a property name iff the environment needs the prefixed form.
    pub fn prefix_property(&self, property: &str) -> String {
        if self.properties.iter().any(|p| p == property) {
            format!("{}{}", self.prefix, property)
        } else {
            property.to_string()
        }
    }

    // Prefix unconditionally, even if the property is supported prefix-less.
    pub fn force_prefix_property(&self, property: &str, camel: bool) -> String {
        let prefixed = format!("{}{}", self.prefix, property);
        if camel { camel_case(&prefixed) } else { prefixed }
    }

    // Prefix unconditionally, inserting after the leading `:`/`::` marker.
    pub fn prefix_selector(&self, selector: &str) -> String {
        prefix_selector_with(&self.prefix, selector)
    }
}

fn prefix_selector_with(prefix: &str, selector: &str) -> String {
    if let Some(rest) = selector.strip_prefix("::") {
        format!("::{}{}", prefix, rest)
    } else if let Some(rest) = selector.strip_prefix(':') {
        format!(":{}{}", prefix, rest)
    } else {
        selector.to_string()
    }
}

// "-webkit-box-align" -> "WebkitBoxAlign"; a single leftover dash (as in the
// trailing dash of "-webkit-") is dropped.
pub fn camel_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '-' {
            match chars.peek() {
                Some(next) if next.is_ascii_lowercase() => {
                    let next = chars.next().unwrap_or('-');
                    out.push(next.to_ascii_uppercase());
                }
                _ => out.push(ch),
            }
        } else {
            out.push(ch);
        }
    }
    if let Some(pos) = out.find('-') {
        out.remove(pos);
    }
    out
}

// "WebkitTransform" -> "-webkit-transform".
pub fn de_camel_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    for ch in raw.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

// Probe the environment once. Runs every detection step of the startup pass:
// prefix usage counting over the computed-style enumeration, shorthand
// registration, prefix-only property recomputation, the Microsoft transform
// correction, and the function/keyword/selector/at-rule catalogs.
pub fn probe(env: &dyn RenderEnv, debug: Option<&DebugLogger>) -> PrefixKnowledge {
    let names = match env.style_property_names() {
        StylePropertyNames::Indexed(list) => list,
        StylePropertyNames::Enumerated(list) => {
            list.iter().map(|name| de_camel_case(name)).collect()
        }
        StylePropertyNames::Unavailable => {
            if let Some(logger) = debug {
                logger.log_json("{\"type\":\"stylefix.probe\",\"deactivated\":true}");
                logger.increment("probe.deactivated", 1);
            }
            return PrefixKnowledge::inert();
        }
    };

    let mut candidates: Vec<String> = Vec::new();
    // Usage counter per prefix token, in first-seen order so ties resolve to
    // the token observed first.
    let mut counts: Vec<(String, u64)> = Vec::new();

    for name in &names {
        if !name.starts_with('-') {
            continue;
        }
        candidates.push(name.clone());

        let token = name.split('-').nth(1).unwrap_or("").to_string();
        match counts.iter_mut().find(|(t, _)| *t == token) {
            Some(entry) => entry.1 += 1,
            None => counts.push((token, 1)),
        }

        // Trimming trailing segments can reveal a supported prefixed
        // shorthand ("-webkit-box-align" -> "-webkit-box").
        let mut parts: Vec<&str> = name.split('-').collect();
        while parts.len() > 3 {
            parts.pop();
            let shorthand = parts.join("-");
            if env.supports_property(&camel_case(&shorthand))
                && !candidates.iter().any(|c| *c == shorthand)
            {
                candidates.push(shorthand);
            }
        }
    }

    let mut dominant: Option<(&str, u64)> = None;
    for (token, uses) in &counts {
        if dominant.map_or(true, |(_, best)| *uses > best) {
            dominant = Some((token.as_str(), *uses));
        }
    }
    let Some((token, _)) = dominant else {
        // Nothing prefixed in this environment; there is nothing to rewrite.
        if let Some(logger) = debug {
            logger.log_json("{\"type\":\"stylefix.probe\",\"deactivated\":true}");
            logger.increment("probe.deactivated", 1);
        }
        return PrefixKnowledge::inert();
    };

    let prefix = format!("-{}-", token);
    let prefix_token = camel_case(&prefix);

    let mut properties: Vec<String> = Vec::new();
    for candidate in &candidates {
        // Multiple prefixes can coexist; only the dominant one matters.
        let Some(unprefixed) = candidate.strip_prefix(&prefix) else {
            continue;
        };
        if !env.supports_property(&camel_case(unprefixed))
            && !properties.iter().any(|p| p == unprefixed)
        {
            properties.push(unprefixed.to_string());
        }
    }

    // One historical engine exposed transform only under the
    // lowercase-initial prefixed form.
    if prefix_token == "Ms"
        && !env.supports_property("transform")
        && !env.supports_property("MsTransform")
        && env.supports_property("msTransform")
    {
        properties.push("transform".to_string());
        properties.push("transform-origin".to_string());
    }

    properties.sort();

    let mut functions: Vec<String> = Vec::new();
    for (func, property, params) in FUNCTION_TESTS {
        let value = format!("{}({})", func, params);
        if !env.supports_value(property, &value)
            && env.supports_value(property, &format!("{}{}", prefix, value))
        {
            functions.push((*func).to_string());
        }
    }

    let mut keywords: Vec<String> = Vec::new();
    for (keyword, property) in KEYWORD_TESTS {
        if !env.supports_value(property, keyword)
            && env.supports_value(property, &format!("{}{}", prefix, keyword))
        {
            keywords.push((*keyword).to_string());
        }
    }

    let mut selectors: Vec<String> = Vec::new();
    for selector in SELECTOR_TESTS {
        let plain = format!("{}{{}}", selector);
        let prefixed = format!("{}{{}}", prefix_selector_with(&prefix, selector));
        if !env.supports_rule(&plain) && env.supports_rule(&prefixed) {
            selectors.push((*selector).to_string());
        }
    }

    let mut atrules: Vec<String> = Vec::new();
    for (atrule, params) in ATRULE_TESTS {
        let test = format!("{} {}", atrule, params.unwrap_or(""));
        let plain = format!("@{}{{}}", test);
        let prefixed = format!("@{}{}{{}}", prefix, test);
        if !env.supports_rule(&plain) && env.supports_rule(&prefixed) {
            atrules.push((*atrule).to_string());
        }
    }

    let knowledge = PrefixKnowledge {
        prefix,
        prefix_token,
        properties,
        functions,
        keywords,
        selectors,
        atrules,
        value_properties: VALUE_PROPERTIES.iter().map(|p| p.to_string()).collect(),
    };

    if let Some(logger) = debug {
        logger.log_json(&format!(
            "{{\"type\":\"stylefix.probe\",\"prefix\":\"{}\",\"counts\":{{\"properties\":{},\"functions\":{},\"keywords\":{},\"selectors\":{},\"atrules\":{}}}}}",
            crate::debug::json_escape(&knowledge.prefix),
            knowledge.properties.len(),
            knowledge.functions.len(),
            knowledge.keywords.len(),
            knowledge.selectors.len(),
            knowledge.atrules.len(),
        ));
        logger.increment("probe.properties", knowledge.properties.len() as u64);
    }

    knowledge
}

use crate::probe::PrefixKnowledge;
use regex::{Captures, Regex};
use url::Url;

// Ordered rewrite passes over unparsed CSS text. Every regex is compiled
// once from the fact table; a pass whose fact set is empty is skipped. No
// pass can fail: unmatched patterns leave the text as-is, which is the
// required behavior for CSS that needs no rewriting.
pub struct Rewriter {
    prefix: String,
    gradient_re: Option<Regex>,
    functions_re: Option<Regex>,
    keywords_re: Option<Regex>,
    properties_re: Option<Regex>,
    value_outer_re: Option<Regex>,
    value_inner_re: Option<Regex>,
    selectors_re: Option<Regex>,
    atrules_re: Option<Regex>,
    value_functions_re: Option<Regex>,
    value_keywords_re: Option<Regex>,
    wildcard_re: Regex,
}

// Longest name first, so "transition-property" is preferred over
// "transition" at the same position.
fn alternation(names: &[String]) -> String {
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    sorted
        .iter()
        .map(|name| regex::escape(name))
        .collect::<Vec<_>>()
        .join("|")
}

fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern).ok()
}

// The legacy prefixed gradient syntax measured angles from a different axis
// than the standardized one; integral results print without a decimal point.
fn format_angle(angle: f64) -> String {
    if angle.fract() == 0.0 {
        format!("{}", angle as i64)
    } else {
        format!("{}", angle)
    }
}

impl Rewriter {
    pub fn new(knowledge: &PrefixKnowledge) -> Self {
        let prefix = knowledge.prefix.clone();

        let gradient_re = if knowledge.functions.iter().any(|f| f == "linear-gradient") {
            compile(r"(?i)(\s|:|,)(repeating-)?linear-gradient\(\s*(-?\d*\.?\d*)deg")
        } else {
            None
        };

        let functions_re = if knowledge.functions.is_empty() {
            None
        } else {
            compile(&format!(
                r"(?i)(\s|:|,)({})\s*\(",
                alternation(&knowledge.functions)
            ))
        };

        let keywords_re = if knowledge.keywords.is_empty() {
            None
        } else {
            compile(&format!(
                r"(?i)(\s|:)({})(\s|;|\}}|$)",
                alternation(&knowledge.keywords)
            ))
        };

        let properties_re = if knowledge.properties.is_empty() {
            None
        } else {
            compile(&format!(
                r"(?i)(^|\{{|\s|;)({})\s*:",
                alternation(&knowledge.properties)
            ))
        };

        let (value_outer_re, value_inner_re) =
            if knowledge.value_properties.is_empty() || knowledge.properties.is_empty() {
                (None, None)
            } else {
                (
                    compile(&format!(
                        r"(?i)\b({}):(.+?);",
                        alternation(&knowledge.value_properties)
                    )),
                    // The optional captured colon stands in for a negative
                    // lookahead: a name directly followed by `:` is a new
                    // declaration, not a value token.
                    compile(&format!(
                        r"(?i)\b({})(:?)",
                        alternation(&knowledge.properties)
                    )),
                )
            };

        let selectors_re = if knowledge.selectors.is_empty() {
            None
        } else {
            compile(&format!(r"(?i)({})\b", alternation(&knowledge.selectors)))
        };

        let atrules_re = if knowledge.atrules.is_empty() {
            None
        } else {
            compile(&format!(r"(?i)@({})\b", alternation(&knowledge.atrules)))
        };

        let value_functions_re = if knowledge.functions.is_empty() {
            None
        } else {
            compile(&format!(
                r"(?i)(^|\s|,)({})\s*\(",
                alternation(&knowledge.functions)
            ))
        };

        let value_keywords_re = if knowledge.keywords.is_empty() {
            None
        } else {
            compile(&format!(
                r"(?i)(^|\s)({})(\s|$)",
                alternation(&knowledge.keywords)
            ))
        };

        Self {
            prefix,
            gradient_re,
            functions_re,
            keywords_re,
            properties_re,
            value_outer_re,
            value_inner_re,
            selectors_re,
            atrules_re,
            value_functions_re,
            value_keywords_re,
            wildcard_re: Regex::new(r"(?i)-\*-([a-z])").expect("wildcard pattern"),
        }
    }

    pub fn is_inert(&self) -> bool {
        self.prefix.is_empty()
    }

    // The full prefix pipeline. `raw` marks stylesheet text; selector and
    // at-rule passes never apply to inline `style` attribute values.
    pub fn fix(&self, css: &str, raw: bool) -> String {
        if self.is_inert() {
            return css.to_string();
        }

        let mut css = css.to_string();

        css = self.convert_gradient_angles(&css);
        css = self.prefix_functions(&css);
        css = self.prefix_keywords(&css);
        css = self.prefix_properties(&css);
        css = self.prefix_properties_in_values(&css);

        if raw {
            css = self.prefix_selectors(&css);
            css = self.prefix_atrules(&css);
        }

        css = self.collapse_double_prefix(&css);
        css = self.expand_wildcard(&css);

        css
    }

    // Gradients are supported with a prefix only; convert angles to the
    // legacy convention (90 - N), preserving the `repeating-` modifier.
    fn convert_gradient_angles(&self, css: &str) -> String {
        let Some(re) = &self.gradient_re else {
            return css.to_string();
        };
        re.replace_all(css, |caps: &Captures| {
            let delim = &caps[1];
            let repeating = caps.get(2).map_or("", |m| m.as_str());
            let angle: f64 = caps[3].parse().unwrap_or(0.0);
            format!(
                "{}{}linear-gradient({}deg",
                delim,
                repeating,
                format_angle(90.0 - angle)
            )
        })
        .into_owned()
    }

    fn prefix_functions(&self, css: &str) -> String {
        let Some(re) = &self.functions_re else {
            return css.to_string();
        };
        re.replace_all(css, format!("${{1}}{}${{2}}(", self.prefix).as_str())
            .into_owned()
    }

    fn prefix_keywords(&self, css: &str) -> String {
        let Some(re) = &self.keywords_re else {
            return css.to_string();
        };
        re.replace_all(css, format!("${{1}}{}${{2}}${{3}}", self.prefix).as_str())
            .into_owned()
    }

    fn prefix_properties(&self, css: &str) -> String {
        let Some(re) = &self.properties_re else {
            return css.to_string();
        };
        re.replace_all(css, format!("${{1}}{}${{2}}:", self.prefix).as_str())
            .into_owned()
    }

    // Within the value of a value-property declaration, prefix any known
    // prefix-only property name found as a value token.
    fn prefix_properties_in_values(&self, css: &str) -> String {
        let (Some(outer), Some(inner)) = (&self.value_outer_re, &self.value_inner_re) else {
            return css.to_string();
        };
        outer
            .replace_all(css, |caps: &Captures| {
                inner
                    .replace_all(&caps[0], |inner_caps: &Captures| {
                        if inner_caps.get(2).map_or(false, |m| m.as_str() == ":") {
                            inner_caps[0].to_string()
                        } else {
                            format!("{}{}{}", self.prefix, &inner_caps[1], &inner_caps[2])
                        }
                    })
                    .into_owned()
            })
            .into_owned()
    }

    fn prefix_selectors(&self, css: &str) -> String {
        let Some(re) = &self.selectors_re else {
            return css.to_string();
        };
        re.replace_all(css, |caps: &Captures| self.prefix_selector(&caps[0]))
            .into_owned()
    }

    fn prefix_selector(&self, selector: &str) -> String {
        if let Some(rest) = selector.strip_prefix("::") {
            format!("::{}{}", self.prefix, rest)
        } else if let Some(rest) = selector.strip_prefix(':') {
            format!(":{}{}", self.prefix, rest)
        } else {
            selector.to_string()
        }
    }

    fn prefix_atrules(&self, css: &str) -> String {
        let Some(re) = &self.atrules_re else {
            return css.to_string();
        };
        re.replace_all(css, format!("@{}${{1}}", self.prefix).as_str())
            .into_owned()
    }

    // Passes colliding with author text that was already prefixed produce
    // `-<prefix>-<prefix>` sequences; collapse them to one.
    fn collapse_double_prefix(&self, css: &str) -> String {
        css.replace(&format!("-{}", self.prefix), "-")
    }

    // `-*-` is the author-facing "insert current prefix here" escape.
    fn expand_wildcard(&self, css: &str) -> String {
        self.wildcard_re
            .replace_all(css, format!("{}${{1}}", self.prefix).as_str())
            .into_owned()
    }

    // Function/keyword prefixing for a standalone declaration value.
    pub fn prefix_value(&self, value: &str) -> String {
        if self.is_inert() {
            return value.to_string();
        }
        let mut value = value.to_string();
        if let Some(re) = &self.value_functions_re {
            value = re
                .replace_all(&value, format!("${{1}}{}${{2}}(", self.prefix).as_str())
                .into_owned();
        }
        if let Some(re) = &self.value_keywords_re {
            value = re
                .replace_all(&value, format!("${{1}}{}${{2}}${{3}}", self.prefix).as_str())
                .into_owned();
        }
        value
    }
}

// Matches url(...) with double quotes, single quotes, or bare; the regex
// engine has no backreferences, so the quote forms are separate arms.
fn url_token_re() -> Regex {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^"')][^)]*?))\s*\)"#).expect("url pattern")
}

// Scheme, leading slash, or fragment: already absolute, leave alone.
fn absolute_url_re() -> Regex {
    Regex::new(r"(?i)^([a-z]{3,10}:|/|#)").expect("absolute-url pattern")
}

// Rewrite relative url(...) targets against the stylesheet's base URL. Runs
// before the prefix passes, on raw stylesheet text only. `behavior:` URLs
// anchored to the same base are un-based afterwards so they resolve against
// the document, not the stylesheet.
pub fn absolutize_urls(css: &str, base: &str) -> String {
    if base.is_empty() {
        return css.to_string();
    }

    let absolute = absolute_url_re();
    let rewritten = url_token_re()
        .replace_all(css, |caps: &Captures| {
            let target = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map_or("", |m| m.as_str());
            if target.is_empty() || absolute.is_match(target) {
                return caps[0].to_string();
            }
            let joined = match Url::parse(base) {
                Ok(base_url) => match base_url.join(target) {
                    Ok(url) => url.to_string(),
                    Err(_) => return caps[0].to_string(),
                },
                // Non-URL bases (relative hrefs) fall back to concatenation.
                Err(_) => format!("{}{}", base, target),
            };
            format!("url(\"{}\")", joined)
        })
        .into_owned();

    let behavior_pattern = format!(
        r#"(?i)\b(behavior:\s*url\(["']?){}"#,
        regex::escape(base)
    );
    match Regex::new(&behavior_pattern) {
        Ok(re) => re.replace_all(&rewritten, "${1}").into_owned(),
        Err(_) => rewritten,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knowledge(
        functions: &[&str],
        keywords: &[&str],
        properties: &[&str],
        selectors: &[&str],
        atrules: &[&str],
    ) -> PrefixKnowledge {
        PrefixKnowledge {
            prefix: "-zz-".to_string(),
            prefix_token: "Zz".to_string(),
            properties: properties.iter().map(|s| s.to_string()).collect(),
            functions: functions.iter().map(|s| s.to_string()).collect(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            atrules: atrules.iter().map(|s| s.to_string()).collect(),
            value_properties: vec!["transition".to_string(), "transition-property".to_string()],
        }
    }

    #[test]
    fn prefixes_function_in_value_position() {
        let rewriter = Rewriter::new(&knowledge(&["calc"], &[], &[], &[], &[]));
        assert_eq!(
            rewriter.fix("width: calc(1px + 2%);", true),
            "width: -zz-calc(1px + 2%);"
        );
    }

    #[test]
    fn gradient_angles_use_legacy_convention() {
        let rewriter = Rewriter::new(&knowledge(
            &["linear-gradient", "repeating-linear-gradient"],
            &[],
            &[],
            &[],
            &[],
        ));
        assert_eq!(
            rewriter.fix("background: linear-gradient(30deg, red, blue);", true),
            "background: -zz-linear-gradient(60deg, red, blue);"
        );
        assert_eq!(
            rewriter.fix("background: repeating-linear-gradient(30deg, red, blue);", true),
            "background: -zz-repeating-linear-gradient(60deg, red, blue);"
        );
    }

    #[test]
    fn gradient_angle_handles_negative_and_fractional() {
        let rewriter = Rewriter::new(&knowledge(&["linear-gradient"], &[], &[], &[], &[]));
        assert_eq!(
            rewriter.fix("background: linear-gradient(-30deg, red, blue);", true),
            "background: -zz-linear-gradient(120deg, red, blue);"
        );
        assert_eq!(
            rewriter.fix("background: linear-gradient(37.5deg, red, blue);", true),
            "background: -zz-linear-gradient(52.5deg, red, blue);"
        );
    }

    #[test]
    fn angleless_gradients_are_prefixed_untouched() {
        let rewriter = Rewriter::new(&knowledge(&["linear-gradient"], &[], &[], &[], &[]));
        assert_eq!(
            rewriter.fix("background: linear-gradient(red, blue);", true),
            "background: -zz-linear-gradient(red, blue);"
        );
    }

    #[test]
    fn prefixes_keyword_values() {
        let rewriter = Rewriter::new(&knowledge(&[], &["flex", "inline-flex"], &[], &[], &[]));
        assert_eq!(rewriter.fix("display: flex;", true), "display: -zz-flex;");
        assert_eq!(rewriter.fix("a{display:flex}", true), "a{display:-zz-flex}");
        assert_eq!(
            rewriter.fix("display: inline-flex;", true),
            "display: -zz-inline-flex;"
        );
    }

    #[test]
    fn prefixes_property_declarations() {
        let rewriter = Rewriter::new(&knowledge(&[], &[], &["transform"], &[], &[]));
        assert_eq!(
            rewriter.fix("a { transform: rotate(5deg); }", true),
            "a { -zz-transform: rotate(5deg); }"
        );
        assert_eq!(
            rewriter.fix("transform: none", true),
            "-zz-transform: none"
        );
        // Whitespace before the colon is collapsed, as in the declaration
        // pattern.
        assert_eq!(
            rewriter.fix("a { transform : none; }", true),
            "a { -zz-transform: none; }"
        );
    }

    #[test]
    fn property_name_inside_value_is_not_a_declaration() {
        let rewriter = Rewriter::new(&knowledge(&[], &[], &["transform"], &[], &[]));
        // "transform" in content position has no following colon.
        assert_eq!(
            rewriter.fix("a { content: \"transform\"; }", true),
            "a { content: \"transform\"; }"
        );
    }

    #[test]
    fn prefixes_properties_inside_transition_values() {
        let rewriter = Rewriter::new(&knowledge(&[], &[], &["transform"], &[], &[]));
        assert_eq!(
            rewriter.fix("a { transition: transform 1s; }", true),
            "a { transition: -zz-transform 1s; }"
        );
        assert_eq!(
            rewriter.fix("a { transition-property: transform; }", true),
            "a { transition-property: -zz-transform; }"
        );
    }

    #[test]
    fn transition_declaration_name_is_not_reprefixed_in_value_pass() {
        let rewriter = Rewriter::new(&knowledge(&[], &[], &["transition"], &[], &[]));
        assert_eq!(
            rewriter.fix("a { transition: opacity 1s; }", true),
            "a { -zz-transition: opacity 1s; }"
        );
    }

    #[test]
    fn selectors_prefixed_only_in_raw_text() {
        let rewriter = Rewriter::new(&knowledge(&[], &[], &[], &["::selection", ":read-only"], &[]));
        assert_eq!(
            rewriter.fix("p::selection { background: gold; }", true),
            "p::-zz-selection { background: gold; }"
        );
        assert_eq!(
            rewriter.fix("input:read-only { opacity: .5; }", true),
            "input:-zz-read-only { opacity: .5; }"
        );
        assert_eq!(
            rewriter.fix("p::selection { background: gold; }", false),
            "p::selection { background: gold; }"
        );
    }

    #[test]
    fn atrules_prefixed_only_in_raw_text() {
        let rewriter = Rewriter::new(&knowledge(&[], &[], &[], &[], &["keyframes"]));
        assert_eq!(
            rewriter.fix("@keyframes fade { from { opacity: 0; } }", true),
            "@-zz-keyframes fade { from { opacity: 0; } }"
        );
        assert_eq!(
            rewriter.fix("@keyframes fade {}", false),
            "@keyframes fade {}"
        );
    }

    #[test]
    fn rewriting_twice_is_idempotent() {
        let rewriter = Rewriter::new(&knowledge(
            &["calc", "linear-gradient"],
            &["flex"],
            &["transform"],
            &["::selection"],
            &["keyframes"],
        ));
        let css = "a { width: calc(1px + 2%); display: flex; transition: transform 1s; }\n\
                   p::selection { color: red; }\n\
                   @keyframes fade { to { opacity: 1; } }";
        let once = rewriter.fix(css, true);
        let twice = rewriter.fix(&once, true);
        assert_eq!(once, twice);
    }

    #[test]
    fn author_prefixed_value_tokens_are_not_doubled() {
        let rewriter = Rewriter::new(&knowledge(&[], &[], &["transform"], &[], &[]));
        assert_eq!(
            rewriter.fix("a { transition: -zz-transform 1s; }", true),
            "a { transition: -zz-transform 1s; }"
        );
    }

    #[test]
    fn wildcard_expands_to_current_prefix() {
        let rewriter = Rewriter::new(&knowledge(&[], &[], &[], &[], &[]));
        assert_eq!(
            rewriter.fix("a { -*-box-shadow: 0 0 2px; }", true),
            "a { -zz-box-shadow: 0 0 2px; }"
        );
        // The escape requires a following letter.
        assert_eq!(rewriter.fix("a { content: \"-*-\"; }", true), "a { content: \"-*-\"; }");
    }

    #[test]
    fn inert_rewriter_is_identity() {
        let rewriter = Rewriter::new(&PrefixKnowledge::inert());
        let css = "a { transform: none; display: flex; }";
        assert_eq!(rewriter.fix(css, true), css);
    }

    #[test]
    fn prefix_value_handles_functions_and_keywords() {
        let rewriter = Rewriter::new(&knowledge(&["calc"], &["flex"], &[], &[], &[]));
        assert_eq!(rewriter.prefix_value("calc(1px + 5%)"), "-zz-calc(1px + 5%)");
        assert_eq!(rewriter.prefix_value("flex"), "-zz-flex");
    }

    #[test]
    fn absolutizes_relative_urls() {
        let css = "a { background: url(img/a.png); }";
        assert_eq!(
            absolutize_urls(css, "https://x/y/"),
            "a { background: url(\"https://x/y/img/a.png\"); }"
        );
    }

    #[test]
    fn quoted_urls_are_absolutized() {
        assert_eq!(
            absolutize_urls("a{background:url('img/a.png')}", "https://x/y/"),
            "a{background:url(\"https://x/y/img/a.png\")}"
        );
        assert_eq!(
            absolutize_urls("a{background:url(  \"img/a.png\"  )}", "https://x/y/"),
            "a{background:url(\"https://x/y/img/a.png\")}"
        );
    }

    #[test]
    fn absolute_urls_are_left_alone() {
        for css in [
            "a { background: url(#frag); }",
            "a { background: url(http://x/a.png); }",
            "a { background: url(/rooted.png); }",
            "a { background: url(data:image/png;base64,AAAA); }",
        ] {
            assert_eq!(absolutize_urls(css, "https://x/y/"), css);
        }
    }

    #[test]
    fn behavior_urls_are_not_rebased() {
        let css = "a { behavior: url(hack.htc); background: url(img/a.png); }";
        assert_eq!(
            absolutize_urls(css, "https://x/y/"),
            "a { behavior: url(\"hack.htc\"); background: url(\"https://x/y/img/a.png\"); }"
        );
    }

    #[test]
    fn relative_base_falls_back_to_concatenation() {
        assert_eq!(
            absolutize_urls("a{background:url(a.png)}", "css/"),
            "a{background:url(\"css/a.png\")}"
        );
    }
}

use regex::Regex;

// "all" is implied; stripping it keeps combined queries from growing
// "all and" chains.
fn implied_all_re() -> Regex {
    Regex::new(r"(?i)^all\b(?:\s*and\b)?\s*").expect("implied-all pattern")
}

// AND-join two single media queries. `not`/`only` combinator algebra is out
// of scope; negated media types keep the simple join even where the result
// is imperfect.
pub fn combine_media_queries(query1: &str, query2: &str) -> String {
    let re = implied_all_re();
    let query1 = re.replace(query1, "").trim().to_string();
    let query2 = re.replace(query2, "").trim().to_string();

    if query1.is_empty() || query2.is_empty() {
        if query1.is_empty() { query2 } else { query1 }
    } else {
        format!("{} and {}", query1, query2)
    }
}

// "a, b" combined with "c, d" yields "a and c, b and c, a and d, b and d":
// the cartesian product with list2 outer and list1 inner.
pub fn combine_media_query_lists(list1: &str, list2: &str) -> String {
    let queries1: Vec<&str> = list1.split(',').map(str::trim).collect();
    let queries2: Vec<&str> = list2.split(',').map(str::trim).collect();

    let mut combined: Vec<String> = Vec::with_capacity(queries1.len() * queries2.len());
    for query2 in &queries2 {
        for query1 in &queries1 {
            combined.push(combine_media_queries(query1, query2));
        }
    }
    combined.join(", ")
}

// One emitted style resource. When the environment cannot scope `media` per
// rule, a stylesheet is split into one fragment per top-level rule, each
// carrying its own effective media value plus the source's disabled state
// and passthrough attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleFragment {
    pub css: String,
    pub media: Option<String>,
    pub disabled: bool,
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TopLevelRule {
    css: String,
    media: Option<String>,
}

// Text-level split into top-level rules: brace depth tracking, aware of
// comments and strings. A statement at-rule (@import, @charset) ends at its
// semicolon.
fn split_top_level_rules(css: &str) -> Vec<TopLevelRule> {
    let mut rules: Vec<TopLevelRule> = Vec::new();
    let mut chunk_start = 0usize;
    let mut depth = 0usize;
    let mut in_comment = false;
    let mut string_delim: Option<char> = None;

    let mut iter = css.char_indices().peekable();
    while let Some((idx, ch)) = iter.next() {
        if in_comment {
            if ch == '*' && matches!(iter.peek(), Some((_, '/'))) {
                iter.next();
                in_comment = false;
            }
            continue;
        }
        if let Some(delim) = string_delim {
            if ch == '\\' {
                iter.next();
            } else if ch == delim {
                string_delim = None;
            }
            continue;
        }
        match ch {
            '/' if matches!(iter.peek(), Some((_, '*'))) => {
                iter.next();
                in_comment = true;
            }
            '"' | '\'' => string_delim = Some(ch),
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    push_rule(&mut rules, &css[chunk_start..=idx]);
                    chunk_start = idx + ch.len_utf8();
                }
            }
            ';' if depth == 0 => {
                push_rule(&mut rules, &css[chunk_start..=idx]);
                chunk_start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    if chunk_start < css.len() {
        push_rule(&mut rules, &css[chunk_start..]);
    }
    rules
}

fn push_rule(rules: &mut Vec<TopLevelRule>, chunk: &str) {
    let trimmed = chunk.trim();
    if trimmed.is_empty() {
        return;
    }
    rules.push(TopLevelRule {
        css: trimmed.to_string(),
        media: media_condition(trimmed),
    });
}

// For an @media rule, the query list between the keyword and the block.
fn media_condition(rule: &str) -> Option<String> {
    let rest = rule.strip_prefix("@media")?;
    let brace = rest.find('{')?;
    let condition = rest[..brace].trim();
    if condition.is_empty() {
        None
    } else {
        Some(condition.to_string())
    }
}

// Produce the style fragments for one rewritten stylesheet. The cheap path
// emits the whole sheet unmodified under the container's media; the split
// path emits one fragment per top-level rule, AND-merging the container's
// media list with each rule's own. The @media wrapper stays in the rule
// text; the combined attribute value is what gates application.
pub fn materialize(
    css: &str,
    media: Option<&str>,
    disabled: bool,
    attributes: &[(String, String)],
    scoped_media: bool,
) -> Vec<StyleFragment> {
    let media = media.filter(|m| !m.trim().is_empty());

    if scoped_media {
        return vec![StyleFragment {
            css: css.to_string(),
            media: media.map(str::to_string),
            disabled,
            attributes: attributes.to_vec(),
        }];
    }

    split_top_level_rules(css)
        .into_iter()
        .map(|rule| {
            let effective = match &rule.media {
                Some(rule_media) => {
                    let combined =
                        combine_media_query_lists(media.unwrap_or(""), rule_media);
                    if combined.is_empty() { None } else { Some(combined) }
                }
                None => media.map(str::to_string),
            };
            StyleFragment {
                css: rule.css,
                media: effective,
                disabled,
                attributes: attributes.to_vec(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implied_all_is_stripped() {
        assert_eq!(
            combine_media_queries("all and (min-width:1px)", "print"),
            "(min-width:1px) and print"
        );
        assert_eq!(combine_media_queries("all", "screen"), "screen");
        assert_eq!(combine_media_queries("screen", "all"), "screen");
    }

    #[test]
    fn empty_side_uses_the_other() {
        assert_eq!(combine_media_queries("", "print"), "print");
        assert_eq!(combine_media_queries("screen", ""), "screen");
        assert_eq!(combine_media_queries("", ""), "");
    }

    #[test]
    fn both_sides_are_and_joined() {
        assert_eq!(
            combine_media_queries("screen and (color)", "(min-width: 600px)"),
            "screen and (color) and (min-width: 600px)"
        );
    }

    #[test]
    fn list_combination_order_is_outer_list2_inner_list1() {
        assert_eq!(
            combine_media_query_lists("a, b", "c, d"),
            "a and c, b and c, a and d, b and d"
        );
    }

    #[test]
    fn list_combination_strips_implied_all() {
        assert_eq!(
            combine_media_query_lists("all, print", "screen"),
            "screen, print and screen"
        );
    }

    #[test]
    fn splits_plain_rules_and_media_blocks() {
        let css = "a { color: red; }\n@media print { b { color: blue; } }\nc{}";
        let rules = split_top_level_rules(css);
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].css, "a { color: red; }");
        assert_eq!(rules[0].media, None);
        assert_eq!(rules[1].css, "@media print { b { color: blue; } }");
        assert_eq!(rules[1].media.as_deref(), Some("print"));
        assert_eq!(rules[2].css, "c{}");
    }

    #[test]
    fn statement_atrules_split_at_semicolon() {
        let css = "@import url(\"other.css\");\na { color: red; }";
        let rules = split_top_level_rules(css);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].css, "@import url(\"other.css\");");
        assert_eq!(rules[1].css, "a { color: red; }");
    }

    #[test]
    fn braces_in_strings_and_comments_are_ignored() {
        let css = "a { content: \"}\"; } /* b { */ c { color: red; }";
        let rules = split_top_level_rules(css);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].css, "a { content: \"}\"; }");
        assert_eq!(rules[1].css, "/* b { */ c { color: red; }");
    }

    #[test]
    fn scoped_environment_takes_the_cheap_path() {
        let css = "a{} @media print { b{} }";
        let fragments = materialize(css, Some("screen"), false, &[], true);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].css, css);
        assert_eq!(fragments[0].media.as_deref(), Some("screen"));
    }

    #[test]
    fn unscoped_environment_splits_per_rule() {
        let css = "a { color: red; }\n@media print { b { color: blue; } }";
        let attrs = vec![("data-href".to_string(), "main.css".to_string())];
        let fragments = materialize(css, Some("screen"), true, &attrs, false);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].css, "a { color: red; }");
        assert_eq!(fragments[0].media.as_deref(), Some("screen"));
        assert_eq!(
            fragments[1].media.as_deref(),
            Some("screen and print")
        );
        for fragment in &fragments {
            assert!(fragment.disabled);
            assert_eq!(fragment.attributes, attrs);
        }
    }

    #[test]
    fn split_without_container_media_uses_rule_media() {
        let css = "@media (min-width: 600px) { a{} }";
        let fragments = materialize(css, None, false, &[], false);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].media.as_deref(), Some("(min-width: 600px)"));
    }
}

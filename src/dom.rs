use crate::media::StyleFragment;
use kuchiki::NodeRef;

// One candidate <link rel=...> with everything the scan policy needs read
// up front, so attribute borrows do not outlive the mutation phase.
pub(crate) struct LinkCandidate {
    pub node: NodeRef,
    pub rel: String,
    pub url: Option<String>,
    pub href: Option<String>,
    pub media: Option<String>,
    pub disabled: bool,
    pub noprefix: bool,
    pub in_progress: bool,
}

pub(crate) struct StyleBlock {
    pub node: NodeRef,
    pub css: String,
    pub media: Option<String>,
    pub disabled: bool,
    pub noprefix: bool,
}

pub(crate) fn link_candidates(document: &NodeRef) -> Vec<LinkCandidate> {
    let mut candidates = Vec::new();
    if let Ok(links) = document.select("link[rel]") {
        for link in links {
            let attrs = link.attributes.borrow();
            let href = attrs.get("href").map(str::to_string);
            let url = href
                .clone()
                .or_else(|| attrs.get("data-href").map(str::to_string));
            candidates.push(LinkCandidate {
                node: link.as_node().clone(),
                rel: attrs.get("rel").unwrap_or("").to_string(),
                url,
                href,
                media: attrs.get("media").map(str::to_string),
                disabled: attrs.get("disabled").is_some(),
                noprefix: attrs.get("data-noprefix").is_some(),
                in_progress: attrs.get("data-inprogress").is_some(),
            });
        }
    }
    candidates
}

pub(crate) fn style_blocks(document: &NodeRef) -> Vec<StyleBlock> {
    let mut blocks = Vec::new();
    if let Ok(styles) = document.select("style") {
        for style in styles {
            let node = style.as_node().clone();
            let attrs = style.attributes.borrow();
            blocks.push(StyleBlock {
                css: node.text_contents(),
                media: attrs.get("media").map(str::to_string),
                disabled: attrs.get("disabled").is_some(),
                noprefix: attrs.get("data-noprefix").is_some(),
                node,
            });
        }
    }
    blocks
}

pub(crate) fn styled_elements(document: &NodeRef) -> Vec<NodeRef> {
    let mut elements = Vec::new();
    if let Ok(matches) = document.select("[style]") {
        for element in matches {
            elements.push(element.as_node().clone());
        }
    }
    elements
}

pub(crate) fn set_attribute(node: &NodeRef, name: &str, value: &str) {
    if let Some(element) = node.as_element() {
        element
            .attributes
            .borrow_mut()
            .insert(name, value.to_string());
    }
}

pub(crate) fn get_attribute(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|element| element.attributes.borrow().get(name).map(str::to_string))
}

// The resource URL minus its final path segment; "" when there is none.
pub(crate) fn base_of(url: &str) -> String {
    match url.rfind('/') {
        Some(idx) => url[..=idx].to_string(),
        None => String::new(),
    }
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

// Build a <style> node for one fragment by parsing a snippet document and
// lifting the element out of it.
pub(crate) fn build_style_element(fragment: &StyleFragment) -> Option<NodeRef> {
    use kuchiki::traits::TendrilSink;

    let mut attrs = String::new();
    if let Some(media) = &fragment.media {
        attrs.push_str(&format!(" media=\"{}\"", escape_attr(media)));
    }
    if fragment.disabled {
        attrs.push_str(" disabled=\"disabled\"");
    }
    for (name, value) in &fragment.attributes {
        attrs.push_str(&format!(" {}=\"{}\"", name, escape_attr(value)));
    }

    let html = format!("<style{}>{}</style>", attrs, fragment.css);
    let document = kuchiki::parse_html().one(html);
    let style = document.select_first("style").ok()?;
    let node = style.as_node().clone();
    node.detach();
    Some(node)
}

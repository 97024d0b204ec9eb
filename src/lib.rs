mod debug;
mod dom;
mod env;
mod error;
mod fetch;
mod media;
mod probe;
mod rewrite;

use debug::DebugLogger;
use kuchiki::NodeRef;
use std::path::PathBuf;
use std::sync::Arc;

pub use env::{RenderEnv, ScriptedEnv, StylePropertyNames};
pub use error::StylefixError;
pub use fetch::{FallbackFetcher, FetchResponse, FileFetcher, ResourceFetcher};
pub use media::{combine_media_queries, combine_media_query_lists, materialize, StyleFragment};
pub use probe::{camel_case, de_camel_case, probe, PrefixKnowledge};
pub use rewrite::{absolutize_urls, Rewriter};

// Per-resource context handed to every fixer: the base URL for url()
// absolutization and the source locator carried onto emitted fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleOrigin {
    pub base_url: Option<String>,
    pub source: Option<String>,
}

// A registered CSS-text transformer. `None` means "no change"; each fixer
// sees the previous one's output.
pub type Fixer = Box<dyn Fn(&str, bool, &StyleOrigin) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub links_processed: usize,
    pub links_skipped: usize,
    pub links_failed: usize,
    pub style_blocks: usize,
    pub style_attributes: usize,
    pub fragments: usize,
    pub deactivated: bool,
}

pub struct Stylefix {
    knowledge: PrefixKnowledge,
    rewriter: Rewriter,
    fixers: Vec<Fixer>,
    fetcher: Option<Box<dyn ResourceFetcher>>,
    scoped_media: bool,
    debug: Option<Arc<DebugLogger>>,
}

pub struct StylefixBuilder {
    fetcher: Option<Box<dyn ResourceFetcher>>,
    debug_path: Option<PathBuf>,
    scoped_media: Option<bool>,
    fixers: Vec<Fixer>,
}

impl StylefixBuilder {
    pub fn new() -> Self {
        Self {
            fetcher: None,
            debug_path: None,
            scoped_media: None,
            fixers: Vec::new(),
        }
    }

    pub fn fetcher(mut self, fetcher: impl ResourceFetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    // Override the environment's per-rule media capability.
    pub fn scoped_media(mut self, scoped: bool) -> Self {
        self.scoped_media = Some(scoped);
        self
    }

    pub fn register_fixer(
        mut self,
        fixer: impl Fn(&str, bool, &StyleOrigin) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.fixers.push(Box::new(fixer));
        self
    }

    // Probe the environment once and assemble the engine around the result.
    // An environment without computed-style support yields an inert engine,
    // not an error.
    pub fn probe(self, env: &dyn RenderEnv) -> Result<Stylefix, StylefixError> {
        let debug = self.open_debug()?;
        let knowledge = probe::probe(env, debug.as_deref());
        let scoped = self.scoped_media.unwrap_or_else(|| env.scoped_media());
        Ok(self.assemble(knowledge, scoped, debug))
    }

    // Assemble from a pre-probed fact table.
    pub fn build(self, knowledge: PrefixKnowledge) -> Result<Stylefix, StylefixError> {
        let debug = self.open_debug()?;
        let scoped = self.scoped_media.unwrap_or(true);
        Ok(self.assemble(knowledge, scoped, debug))
    }

    fn open_debug(&self) -> Result<Option<Arc<DebugLogger>>, StylefixError> {
        match &self.debug_path {
            Some(path) => Ok(Some(Arc::new(DebugLogger::new(path)?))),
            None => Ok(None),
        }
    }

    fn assemble(
        self,
        knowledge: PrefixKnowledge,
        scoped_media: bool,
        debug: Option<Arc<DebugLogger>>,
    ) -> Stylefix {
        let rewriter = Rewriter::new(&knowledge);
        Stylefix {
            knowledge,
            rewriter,
            fixers: self.fixers,
            fetcher: self.fetcher,
            scoped_media,
            debug,
        }
    }
}

impl Default for StylefixBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Stylefix {
    pub fn builder() -> StylefixBuilder {
        StylefixBuilder::new()
    }

    // The published fact table: dominant prefix plus the feature-name sets.
    pub fn knowledge(&self) -> &PrefixKnowledge {
        &self.knowledge
    }

    pub fn prefix(&self) -> &str {
        &self.knowledge.prefix
    }

    pub fn is_deactivated(&self) -> bool {
        self.knowledge.is_inert()
    }

    // The full transformer pipeline for one block of CSS text: URL
    // absolutization (raw text with a base only), the prefix rewriter, then
    // registered fixers in order.
    pub fn fix(&self, css: &str, raw: bool, origin: &StyleOrigin) -> String {
        if self.knowledge.is_inert() {
            return css.to_string();
        }
        let mut css = css.to_string();
        if raw {
            if let Some(base) = origin.base_url.as_deref().filter(|base| !base.is_empty()) {
                css = rewrite::absolutize_urls(&css, base);
            }
        }
        css = self.rewriter.fix(&css, raw);
        for fixer in &self.fixers {
            if let Some(changed) = fixer(&css, raw, origin) {
                css = changed;
            }
        }
        css
    }

    // Function/keyword prefixing for a standalone declaration value.
    pub fn prefix_value(&self, value: &str) -> String {
        self.rewriter.prefix_value(value)
    }

    // One scan over a parsed document: linked stylesheets, inline style
    // blocks, then style attributes. Snapshots are taken up front so
    // fragments inserted during the pass are not rescanned.
    pub fn process_document(&self, document: &NodeRef) -> ProcessReport {
        let mut report = ProcessReport::default();
        if self.knowledge.is_inert() {
            report.deactivated = true;
            return report;
        }

        let links = dom::link_candidates(document);
        let styles = dom::style_blocks(document);
        let styled = dom::styled_elements(document);

        for link in links {
            // Alternate stylesheets, opt-outs, and in-flight requests stay
            // untouched.
            if link.rel != "stylesheet" || link.noprefix || link.in_progress {
                report.links_skipped += 1;
                continue;
            }
            let (Some(url), Some(fetcher)) = (link.url.clone(), self.fetcher.as_deref()) else {
                report.links_skipped += 1;
                continue;
            };

            dom::set_attribute(&link.node, "data-inprogress", "");
            match fetcher.fetch(&url) {
                Ok(response) if response.is_usable() => {
                    let origin = StyleOrigin {
                        base_url: Some(dom::base_of(&url)).filter(|base| !base.is_empty()),
                        source: Some(url.clone()),
                    };
                    let css = self.fix(&response.body, true, &origin);
                    let marker = link.href.clone().unwrap_or_else(|| url.clone());
                    let attributes = vec![("data-href".to_string(), marker)];
                    let fragments = media::materialize(
                        &css,
                        link.media.as_deref(),
                        link.disabled,
                        &attributes,
                        self.scoped_media,
                    );
                    for fragment in &fragments {
                        if let Some(style) = dom::build_style_element(fragment) {
                            link.node.insert_before(style);
                            report.fragments += 1;
                        }
                    }
                    link.node.detach();
                    report.links_processed += 1;
                    if let Some(logger) = self.debug.as_deref() {
                        logger.log_json(&format!(
                            "{{\"type\":\"stylefix.link\",\"url\":\"{}\",\"bytes\":{},\"fragments\":{}}}",
                            debug::json_escape(&url),
                            response.body.len(),
                            fragments.len()
                        ));
                        logger.increment("scan.links", 1);
                    }
                }
                Ok(response) => {
                    // Hard failure or empty body: leave the link in place so
                    // the document degrades to unprefixed CSS.
                    report.links_failed += 1;
                    if let Some(logger) = self.debug.as_deref() {
                        let status = response
                            .status
                            .map(|code| code.to_string())
                            .unwrap_or_else(|| "null".to_string());
                        logger.log_json(&format!(
                            "{{\"type\":\"stylefix.link_failed\",\"url\":\"{}\",\"status\":{}}}",
                            debug::json_escape(&url),
                            status
                        ));
                        logger.increment("scan.link_failures", 1);
                    }
                }
                Err(err) => {
                    report.links_failed += 1;
                    if let Some(logger) = self.debug.as_deref() {
                        logger.log_json(&format!(
                            "{{\"type\":\"stylefix.link_failed\",\"url\":\"{}\",\"error\":\"{}\"}}",
                            debug::json_escape(&url),
                            debug::json_escape(&err.to_string())
                        ));
                        logger.increment("scan.link_failures", 1);
                    }
                }
            }
        }

        for block in styles {
            if block.noprefix {
                continue;
            }
            let css = self.fix(&block.css, true, &StyleOrigin::default());
            let fragments = media::materialize(
                &css,
                block.media.as_deref(),
                block.disabled,
                &[],
                self.scoped_media,
            );
            for fragment in &fragments {
                if let Some(style) = dom::build_style_element(fragment) {
                    block.node.insert_before(style);
                    report.fragments += 1;
                }
            }
            block.node.detach();
            report.style_blocks += 1;
            if let Some(logger) = self.debug.as_deref() {
                logger.increment("scan.style_blocks", 1);
            }
        }

        for element in styled {
            let Some(css) = dom::get_attribute(&element, "style") else {
                continue;
            };
            let fixed = self.fix(&css, false, &StyleOrigin::default());
            dom::set_attribute(&element, "style", &fixed);
            report.style_attributes += 1;
            if let Some(logger) = self.debug.as_deref() {
                logger.increment("scan.style_attributes", 1);
            }
        }

        self.tag_document_root(document);

        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary("process_document");
            logger.flush();
        }

        report
    }

    // Expose the detected prefix as a class on the document root so
    // stylesheets can target the current engine.
    fn tag_document_root(&self, document: &NodeRef) {
        let Ok(root) = document.select_first("html") else {
            return;
        };
        let mut attrs = root.attributes.borrow_mut();
        let class = attrs.get("class").unwrap_or("").to_string();
        if class
            .split_whitespace()
            .any(|token| token == self.knowledge.prefix)
        {
            return;
        }
        let tagged = if class.is_empty() {
            self.knowledge.prefix.clone()
        } else {
            format!("{} {}", class, self.knowledge.prefix)
        };
        attrs.insert("class", tagged);
    }
}

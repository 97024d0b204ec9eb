use crate::error::StylefixError;
use base64::Engine;
use std::path::{Path, PathBuf};

// Completion value of a single-shot stylesheet request. `status` is absent
// for transports that have none (files, data URLs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: Option<u16>,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: Some(200),
            body: body.into(),
        }
    }

    // Only this window blocks replacement; everything else is fail-open.
    pub fn is_hard_failure(&self) -> bool {
        matches!(self.status, Some(code) if (400..=600).contains(&code))
    }

    // Replacement proceeds only when text actually came back and the status
    // is absent or outside the hard-failure window.
    pub fn is_usable(&self) -> bool {
        !self.body.is_empty() && !self.is_hard_failure()
    }
}

// Retrieval boundary for linked stylesheets. Implementations own transport
// concerns (cross-origin fallback, timeouts); the core only consumes the
// completion value.
pub trait ResourceFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResponse, StylefixError>;
}

// Resolves `data:` URLs inline and everything else against a root directory.
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn decode_data_url(url: &str) -> Option<String> {
        let payload = url.strip_prefix("data:")?;
        let (header, data) = payload.split_once(',')?;
        if header.contains("base64") {
            let bytes = base64::engine::general_purpose::STANDARD.decode(data).ok()?;
            String::from_utf8(bytes).ok()
        } else {
            Some(data.to_string())
        }
    }
}

impl ResourceFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResponse, StylefixError> {
        if url.starts_with("data:") {
            return match Self::decode_data_url(url) {
                Some(body) => Ok(FetchResponse { status: None, body }),
                None => Err(StylefixError::Fetch {
                    url: url.to_string(),
                    detail: "malformed data url".to_string(),
                }),
            };
        }

        let path = self.root.join(Path::new(url.trim_start_matches('/')));
        match std::fs::read_to_string(&path) {
            Ok(body) => Ok(FetchResponse { status: None, body }),
            Err(err) => Err(StylefixError::Fetch {
                url: url.to_string(),
                detail: err.to_string(),
            }),
        }
    }
}

// Primary transport with a fallback tried on transport error, as a browser
// would fall back to an alternate cross-origin mechanism.
pub struct FallbackFetcher {
    primary: Box<dyn ResourceFetcher>,
    secondary: Box<dyn ResourceFetcher>,
}

impl FallbackFetcher {
    pub fn new(
        primary: impl ResourceFetcher + 'static,
        secondary: impl ResourceFetcher + 'static,
    ) -> Self {
        Self {
            primary: Box::new(primary),
            secondary: Box::new(secondary),
        }
    }
}

impl ResourceFetcher for FallbackFetcher {
    fn fetch(&self, url: &str) -> Result<FetchResponse, StylefixError> {
        match self.primary.fetch(url) {
            Ok(response) => Ok(response),
            Err(_) => self.secondary.fetch(url),
        }
    }
}

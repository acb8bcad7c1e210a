//! Configuration types for document conversion and field extraction.
//!
//! All behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The two feature switches that distinguish a
//! quick preview from a full run are ordinary fields:
//!
//! * [`ExtractionConfig::pages`]: `PageSelection::Single(1)` renders only
//!   the first page of a PDF, `PageSelection::All` renders every page.
//! * [`ExtractionConfig::extract`]: `false` stops after conversion and
//!   never contacts the model.

use crate::backend::ExtractionBackend;
use crate::error::DocExtractError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use edgequake_docextract::{ExtractionConfig, PageSelection};
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .pages(PageSelection::Single(1))
///     .model("claude-sonnet-4-20250514")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI used when rasterising PDF pages. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps either dimension of a rasterised PDF page, scaling the other
    /// proportionally. Uploaded PNG/JPEG images are sent at their own size.
    pub max_rendered_pixels: u32,

    /// JPEG quality (1–100) for the images shown and sent to the model. Default: 85.
    pub jpeg_quality: u8,

    /// Whether to call the model at all. Default: true.
    pub extract: bool,

    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic", "openai").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed extraction backend. Takes precedence over everything
    /// provider-related; used to plug in a non-LLM endpoint or a test double.
    pub backend: Option<Arc<dyn ExtractionBackend>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 1024.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient API failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds; doubles after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Page selection for PDF input. Default: all pages.
    pub pages: PageSelection,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            jpeg_quality: 85,
            extract: true,
            model: None,
            provider_name: None,
            provider: None,
            backend: None,
            temperature: 0.0,
            max_tokens: 1024,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            password: None,
            system_prompt: None,
            pages: PageSelection::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("extract", &self.extract)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("backend", &self.backend.as_ref().map(|_| "<dyn ExtractionBackend>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("pages", &self.pages)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn extract(mut self, v: bool) -> Self {
        self.config.extract = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ExtractionBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, DocExtractError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(DocExtractError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(DocExtractError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.api_timeout_secs == 0 {
            return Err(DocExtractError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        c.pages.validate()?;
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of a PDF to convert.
///
/// Single-image uploads always produce exactly one page regardless of the
/// selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Reject selections that can never match a page.
    pub fn validate(&self) -> Result<(), DocExtractError> {
        match self {
            PageSelection::All => Ok(()),
            PageSelection::Single(0) => Err(DocExtractError::InvalidConfig(
                "Pages are 1-indexed, minimum is 1 (got 0)".into(),
            )),
            PageSelection::Single(_) => Ok(()),
            PageSelection::Range(start, end) if start > end => Err(
                DocExtractError::InvalidConfig(format!(
                    "Invalid page range '{start}-{end}': start must be <= end"
                )),
            ),
            PageSelection::Range(0, _) => Err(DocExtractError::InvalidConfig(
                "Pages are 1-indexed, minimum is 1 (got 0)".into(),
            )),
            PageSelection::Range(..) => Ok(()),
            PageSelection::Set(pages) if pages.is_empty() => Err(
                DocExtractError::InvalidConfig("Page set is empty".into()),
            ),
            PageSelection::Set(pages) if pages.contains(&0) => Err(
                DocExtractError::InvalidConfig("Pages are 1-indexed, minimum is 1 (got 0)".into()),
            ),
            PageSelection::Set(_) => Ok(()),
        }
    }

    /// Parse a CLI-style selection: `all`, `5`, `3-15` or `1,3,5`.
    pub fn parse(s: &str) -> Result<Self, DocExtractError> {
        let s = s.trim().to_lowercase();
        let bad = |what: &str| DocExtractError::InvalidConfig(format!("Invalid {what}: '{s}'"));

        let selection = if s == "all" {
            PageSelection::All
        } else if let Some((start, end)) = s.split_once('-') {
            let start = start.trim().parse().map_err(|_| bad("start page in range"))?;
            let end = end.trim().parse().map_err(|_| bad("end page in range"))?;
            PageSelection::Range(start, end)
        } else if s.contains(',') {
            let pages = s
                .split(',')
                .map(|p| p.trim().parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| bad("page list"))?;
            PageSelection::Set(pages)
        } else {
            PageSelection::Single(s.parse().map_err(|_| bad("page number"))?)
        };

        selection.validate()?;
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ExtractionConfig::builder().build().expect("defaults build");
        assert_eq!(config.dpi, 150);
        assert_eq!(config.jpeg_quality, 85);
        assert!(config.extract);
        assert_eq!(config.pages, PageSelection::All);
    }

    #[test]
    fn rejects_out_of_range_dpi_and_quality() {
        assert!(ExtractionConfig::builder().dpi(50).build().is_err());
        assert!(ExtractionConfig::builder().dpi(401).build().is_err());
        assert!(ExtractionConfig::builder().jpeg_quality(0).build().is_err());
        assert!(ExtractionConfig::builder().jpeg_quality(101).build().is_err());
        assert!(ExtractionConfig::builder().api_timeout_secs(0).build().is_err());
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(1).to_indices(3), vec![0]);
        assert_eq!(PageSelection::Single(4).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 10).to_indices(3), vec![1, 2]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(5), vec![0, 2]);
    }

    #[test]
    fn page_selection_parse() {
        assert_eq!(PageSelection::parse("all").unwrap(), PageSelection::All);
        assert_eq!(PageSelection::parse(" ALL ").unwrap(), PageSelection::All);
        assert_eq!(PageSelection::parse("2").unwrap(), PageSelection::Single(2));
        assert_eq!(PageSelection::parse("2-4").unwrap(), PageSelection::Range(2, 4));
        assert_eq!(
            PageSelection::parse("1, 3,5").unwrap(),
            PageSelection::Set(vec![1, 3, 5])
        );
        assert!(PageSelection::parse("0").is_err());
        assert!(PageSelection::parse("4-2").is_err());
        assert!(PageSelection::parse("x").is_err());
        assert!(PageSelection::parse("1,0").is_err());
    }

    #[test]
    fn invalid_selection_rejected_by_builder() {
        let err = ExtractionConfig::builder()
            .pages(PageSelection::Range(5, 1))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("start must be <= end"));
    }
}

//! Configuration for stamping and submitting membership forms.
//!
//! Everything a [`crate::session::Session`] needs from the outside world is
//! held in [`FormConfig`], built via [`FormConfigBuilder`]. Template and
//! text font are required; everything else has a default.
//!
//! # Example
//! ```rust
//! use membership_form::{FormConfig, ResourceSource};
//!
//! let config = FormConfig::builder()
//!     .template(ResourceSource::parse("https://forms.example.org/membership.pdf").unwrap())
//!     .text_font(ResourceSource::parse("fonts/Rubik-Regular.ttf").unwrap())
//!     .upload_endpoint("https://functions.example.org")
//!     .build()
//!     .unwrap();
//! assert!(config.download_timeout_secs.is_none());
//! ```

use crate::error::FormError;
use crate::progress::ProgressCallback;
use crate::stamp::layout::FieldLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default public IP lookup service. Answers `{"ip": "…"}`.
pub const DEFAULT_IP_LOOKUP_URL: &str = "https://api.ipify.org?format=json";

/// Where a template, font or reference file comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceSource {
    Url(String),
    Path(PathBuf),
}

impl ResourceSource {
    /// Interpret a user-supplied string as an HTTP(S) URL or a local path.
    pub fn parse(input: &str) -> Result<Self, FormError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(FormError::InvalidSource {
                input: input.to_string(),
            });
        }
        if crate::fetch::is_url(input) {
            reqwest::Url::parse(input).map_err(|_| FormError::InvalidSource {
                input: input.to_string(),
            })?;
            Ok(ResourceSource::Url(input.to_string()))
        } else if input.contains("://") {
            Err(FormError::InvalidSource {
                input: input.to_string(),
            })
        } else {
            Ok(ResourceSource::Path(PathBuf::from(input)))
        }
    }
}

impl fmt::Display for ResourceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceSource::Url(url) => f.write_str(url),
            ResourceSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// How the PDF reaches storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Base64 body POSTed to the upload function. (default)
    #[default]
    Direct,
    /// Ask for a signed URL, then PUT the bytes to it.
    SignedUrl,
}

/// Paths of the server-side upload functions, relative to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRoutes {
    pub upload_file: String,
    pub signed_url: String,
    pub upload_metadata: String,
}

impl Default for UploadRoutes {
    fn default() -> Self {
        Self {
            upload_file: "uploadFile".into(),
            signed_url: "getSignedUploadUrl".into(),
            upload_metadata: "uploadMetadata".into(),
        }
    }
}

/// Configuration for a form session.
#[derive(Clone)]
pub struct FormConfig {
    /// Blank form PDF.
    pub template: ResourceSource,

    /// TrueType font used for every stamped text field. Must cover Hebrew.
    pub text_font: ResourceSource,

    /// Cursive font for auto-generated signatures. `None` disables autosign.
    pub signature_font: Option<ResourceSource>,

    /// Field coordinates for the template. Default: built-in layout.
    pub layout: FieldLayout,

    /// Base URL of the server-side upload functions. `None` disables upload.
    pub upload_endpoint: Option<String>,

    /// Function paths under `upload_endpoint`.
    pub upload_routes: UploadRoutes,

    /// Default: [`UploadMode::Direct`].
    pub upload_mode: UploadMode,

    /// Default: [`DEFAULT_IP_LOOKUP_URL`].
    pub ip_lookup_url: String,

    /// JSON array of country names. `None` accepts any birth country.
    pub country_list_url: Option<String>,

    /// Names of the home country. A person born there has no immigration year.
    pub home_country: Vec<String>,

    /// Timeout for every outgoing request in seconds. Default: none.
    pub download_timeout_secs: Option<u64>,

    /// Overlay the 50 pt calibration grid. Honoured in debug builds only.
    pub debug_grid: bool,

    /// Optional progress callback for stamping and upload events.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for FormConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormConfig")
            .field("template", &self.template)
            .field("text_font", &self.text_font)
            .field("signature_font", &self.signature_font)
            .field("layout", &self.layout.name)
            .field("upload_endpoint", &self.upload_endpoint)
            .field("upload_mode", &self.upload_mode)
            .field("ip_lookup_url", &self.ip_lookup_url)
            .field("country_list_url", &self.country_list_url)
            .field("home_country", &self.home_country)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("debug_grid", &self.debug_grid)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn SubmissionProgressCallback>"),
            )
            .finish()
    }
}

impl FormConfig {
    /// Create a new builder for `FormConfig`.
    pub fn builder() -> FormConfigBuilder {
        FormConfigBuilder::default()
    }

    /// Build a `reqwest` client honouring `download_timeout_secs`.
    pub(crate) fn http_client(&self) -> Result<reqwest::Client, FormError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = self.download_timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        builder
            .build()
            .map_err(|e| FormError::Internal(format!("HTTP client: {e}")))
    }
}

/// Builder for [`FormConfig`].
pub struct FormConfigBuilder {
    template: Option<ResourceSource>,
    text_font: Option<ResourceSource>,
    signature_font: Option<ResourceSource>,
    layout: Option<FieldLayout>,
    upload_endpoint: Option<String>,
    upload_routes: UploadRoutes,
    upload_mode: UploadMode,
    ip_lookup_url: String,
    country_list_url: Option<String>,
    home_country: Vec<String>,
    download_timeout_secs: Option<u64>,
    debug_grid: bool,
    progress_callback: Option<ProgressCallback>,
}

impl Default for FormConfigBuilder {
    fn default() -> Self {
        Self {
            template: None,
            text_font: None,
            signature_font: None,
            layout: None,
            upload_endpoint: None,
            upload_routes: UploadRoutes::default(),
            upload_mode: UploadMode::default(),
            ip_lookup_url: DEFAULT_IP_LOOKUP_URL.to_string(),
            country_list_url: None,
            home_country: crate::validate::default_home_country(),
            download_timeout_secs: None,
            debug_grid: false,
            progress_callback: None,
        }
    }
}

impl FormConfigBuilder {
    pub fn template(mut self, source: ResourceSource) -> Self {
        self.template = Some(source);
        self
    }

    pub fn text_font(mut self, source: ResourceSource) -> Self {
        self.text_font = Some(source);
        self
    }

    pub fn signature_font(mut self, source: ResourceSource) -> Self {
        self.signature_font = Some(source);
        self
    }

    pub fn layout(mut self, layout: FieldLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn upload_endpoint(mut self, url: impl Into<String>) -> Self {
        self.upload_endpoint = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn upload_routes(mut self, routes: UploadRoutes) -> Self {
        self.upload_routes = routes;
        self
    }

    pub fn upload_mode(mut self, mode: UploadMode) -> Self {
        self.upload_mode = mode;
        self
    }

    pub fn ip_lookup_url(mut self, url: impl Into<String>) -> Self {
        self.ip_lookup_url = url.into();
        self
    }

    pub fn country_list_url(mut self, url: impl Into<String>) -> Self {
        self.country_list_url = Some(url.into());
        self
    }

    /// Replace the home-country names.
    pub fn home_country<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.home_country = names.into_iter().map(Into::into).collect();
        self
    }

    /// Zero is treated as "no timeout".
    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.download_timeout_secs = (secs > 0).then_some(secs);
        self
    }

    pub fn debug_grid(mut self, v: bool) -> Self {
        self.debug_grid = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FormConfig, FormError> {
        let template = self
            .template
            .ok_or_else(|| FormError::InvalidConfig("a template source is required".into()))?;
        let text_font = self
            .text_font
            .ok_or_else(|| FormError::InvalidConfig("a text font source is required".into()))?;
        if self.home_country.iter().all(|c| c.trim().is_empty()) {
            return Err(FormError::InvalidConfig(
                "at least one home-country name is required".into(),
            ));
        }
        if let Some(endpoint) = &self.upload_endpoint {
            if !crate::fetch::is_url(endpoint) {
                return Err(FormError::InvalidConfig(format!(
                    "upload endpoint must be an HTTP(S) URL, got '{endpoint}'"
                )));
            }
        }
        let layout = match self.layout {
            Some(layout) => layout,
            None => FieldLayout::builtin()?,
        };

        Ok(FormConfig {
            template,
            text_font,
            signature_font: self.signature_font,
            layout,
            upload_endpoint: self.upload_endpoint,
            upload_routes: self.upload_routes,
            upload_mode: self.upload_mode,
            ip_lookup_url: self.ip_lookup_url,
            country_list_url: self.country_list_url,
            home_country: self.home_country,
            download_timeout_secs: self.download_timeout_secs,
            debug_grid: self.debug_grid,
            progress_callback: self.progress_callback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> FormConfigBuilder {
        FormConfig::builder()
            .template(ResourceSource::Path("template.pdf".into()))
            .text_font(ResourceSource::Path("font.ttf".into()))
    }

    #[test]
    fn defaults() {
        let config = minimal().build().unwrap();
        assert_eq!(config.download_timeout_secs, None);
        assert_eq!(config.upload_mode, UploadMode::Direct);
        assert_eq!(config.ip_lookup_url, DEFAULT_IP_LOOKUP_URL);
        assert_eq!(config.home_country, crate::validate::default_home_country());
        assert!(config.home_country.iter().any(|c| c == "ישראל"));
        assert!(!config.debug_grid);
        assert!(config.layout.position(crate::stamp::layout::Block::Primary, "first_name").is_some());
    }

    #[test]
    fn template_and_font_are_required() {
        assert!(matches!(
            FormConfig::builder().build(),
            Err(FormError::InvalidConfig(_))
        ));
        assert!(FormConfig::builder()
            .template(ResourceSource::Path("t.pdf".into()))
            .build()
            .is_err());
    }

    #[test]
    fn zero_timeout_means_none() {
        assert_eq!(minimal().download_timeout_secs(0).build().unwrap().download_timeout_secs, None);
        assert_eq!(
            minimal().download_timeout_secs(30).build().unwrap().download_timeout_secs,
            Some(30)
        );
    }

    #[test]
    fn endpoint_must_be_http() {
        assert!(minimal().upload_endpoint("ftp://nope").build().is_err());
        let config = minimal()
            .upload_endpoint("https://functions.example.org/")
            .build()
            .unwrap();
        assert_eq!(config.upload_endpoint.as_deref(), Some("https://functions.example.org"));
    }

    #[test]
    fn resource_source_parsing() {
        assert_eq!(
            ResourceSource::parse("https://x.org/a.pdf").unwrap(),
            ResourceSource::Url("https://x.org/a.pdf".into())
        );
        assert_eq!(
            ResourceSource::parse("./a.pdf").unwrap(),
            ResourceSource::Path("./a.pdf".into())
        );
        assert!(ResourceSource::parse("ftp://x.org/a.pdf").is_err());
        assert!(ResourceSource::parse("  ").is_err());
    }
}

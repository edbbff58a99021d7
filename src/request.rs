//! Capture request model.
//!
//! A [`CaptureRequest`] describes one capture end to end: what to fetch, how
//! to fetch it, how long to wait and where to write the result. It is built
//! once through [`CaptureRequestBuilder`], which resolves the output format
//! and validates raw command-line values, and is only read afterwards.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

use crate::format::{FormatCatalog, FormatError, OutputFormat};

/// Default minimum viewport width in CSS pixels.
pub const DEFAULT_MIN_WIDTH: u32 = 800;
/// Default initial viewport height in CSS pixels.
pub const DEFAULT_HEIGHT: u32 = 600;
/// Default absolute timeout.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(90_000);

/// Errors detected while assembling a request. They surface before any load
/// begins.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("missing required argument --{0}")]
    Missing(&'static str),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("malformed header '{0}'; expected <name>:<value>")]
    MalformedHeader(String),
    #[error("unsupported request method '{0}'")]
    UnsupportedMethod(String),
    #[error("invalid switch value '{value}' for --{field}; expected on or off")]
    InvalidSwitch { field: &'static str, value: String },
    #[error("request body is not valid base64: {source}")]
    InvalidBody {
        #[source]
        source: base64::DecodeError,
    },
}

/// Request method used for the main resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpMethod {
    #[default]
    Get,
    Head,
    Post,
    Put,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = RequestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "get" => Ok(HttpMethod::Get),
            "head" => Ok(HttpMethod::Head),
            "post" => Ok(HttpMethod::Post),
            "put" => Ok(HttpMethod::Put),
            _ => Err(RequestError::UnsupportedMethod(value.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra request header. Names may repeat; every occurrence is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse a `name:value` argument. The value is kept verbatim.
    pub fn parse(raw: &str) -> Result<Self, RequestError> {
        let (name, value) = raw
            .split_once(':')
            .ok_or_else(|| RequestError::MalformedHeader(raw.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(RequestError::MalformedHeader(raw.to_string()));
        }
        Ok(Header::new(name, value))
    }
}

/// Parse an `on`/`off` switch.
pub fn parse_switch(field: &'static str, value: &str) -> Result<bool, RequestError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(RequestError::InvalidSwitch {
            field,
            value: value.to_string(),
        }),
    }
}

/// Engine features that can be forced on or off. `None` leaves the engine
/// default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureToggles {
    pub javascript: Option<bool>,
    pub java: Option<bool>,
    pub plugins: Option<bool>,
    pub private_browsing: Option<bool>,
    pub auto_load_images: Option<bool>,
    pub javascript_can_open_windows: Option<bool>,
    pub javascript_can_access_clipboard: Option<bool>,
    pub developer_extras: Option<bool>,
    pub links_included_in_focus_chain: Option<bool>,
}

impl FeatureToggles {
    pub fn is_empty(&self) -> bool {
        *self == FeatureToggles::default()
    }
}

/// Request body, either given verbatim or base64 encoded on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodySource {
    Text(String),
    Base64(String),
}

impl BodySource {
    pub fn decode(&self) -> Result<Vec<u8>, RequestError> {
        match self {
            BodySource::Text(text) => Ok(text.as_bytes().to_vec()),
            BodySource::Base64(encoded) => BASE64
                .decode(encoded.trim())
                .map_err(|source| RequestError::InvalidBody { source }),
        }
    }
}

/// Fully resolved capture request.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub url: String,
    pub method: HttpMethod,
    pub body: Option<Vec<u8>>,
    pub headers: Vec<Header>,
    pub user_agent: Option<String>,
    pub app_name: Option<String>,
    pub app_version: Option<String>,
    pub user_stylesheet: Option<String>,
    pub min_width: u32,
    pub default_height: u32,
    pub delay: Duration,
    /// `None` disables the absolute timeout.
    pub max_wait: Option<Duration>,
    pub format: OutputFormat,
    pub output: PathBuf,
    pub features: FeatureToggles,
}

impl CaptureRequest {
    pub fn builder(url: impl Into<String>, output: impl Into<PathBuf>) -> CaptureRequestBuilder {
        CaptureRequestBuilder::new(url, output)
    }

    /// Whether the main request differs from a plain GET without extras.
    pub fn needs_request_interception(&self) -> bool {
        self.method != HttpMethod::Get || self.body.is_some() || !self.headers.is_empty()
    }

    /// `name/version` product token appended to the engine user agent.
    pub fn application_token(&self) -> Option<String> {
        match (&self.app_name, &self.app_version) {
            (Some(name), Some(version)) => Some(format!("{name}/{version}")),
            (Some(name), None) => Some(name.clone()),
            (None, Some(version)) => Some(version.clone()),
            (None, None) => None,
        }
    }
}

/// Builder validating raw inputs into a [`CaptureRequest`].
#[derive(Debug, Clone)]
pub struct CaptureRequestBuilder {
    url: String,
    output: PathBuf,
    explicit_format: Option<String>,
    method: HttpMethod,
    body: Option<BodySource>,
    headers: Vec<Header>,
    user_agent: Option<String>,
    app_name: Option<String>,
    app_version: Option<String>,
    user_stylesheet: Option<String>,
    min_width: u32,
    default_height: u32,
    delay: Duration,
    max_wait: Option<Duration>,
    features: FeatureToggles,
    catalog: FormatCatalog,
}

impl CaptureRequestBuilder {
    pub fn new(url: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            output: output.into(),
            explicit_format: None,
            method: HttpMethod::default(),
            body: None,
            headers: Vec::new(),
            user_agent: None,
            app_name: None,
            app_version: None,
            user_stylesheet: None,
            min_width: DEFAULT_MIN_WIDTH,
            default_height: DEFAULT_HEIGHT,
            delay: Duration::ZERO,
            max_wait: Some(DEFAULT_MAX_WAIT),
            features: FeatureToggles::default(),
            catalog: FormatCatalog::standard(),
        }
    }

    pub fn format(mut self, identifier: impl Into<String>) -> Self {
        self.explicit_format = Some(identifier.into());
        self
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn body(mut self, body: BodySource) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    pub fn user_stylesheet(mut self, url: impl Into<String>) -> Self {
        self.user_stylesheet = Some(url.into());
        self
    }

    pub fn min_width(mut self, width: u32) -> Self {
        self.min_width = width;
        self
    }

    pub fn default_height(mut self, height: u32) -> Self {
        self.default_height = height;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// A zero duration disables the timeout.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = (!max_wait.is_zero()).then_some(max_wait);
        self
    }

    pub fn features(mut self, features: FeatureToggles) -> Self {
        self.features = features;
        self
    }

    pub fn catalog(mut self, catalog: FormatCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn build(self) -> Result<CaptureRequest, RequestError> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err(RequestError::Missing("url"));
        }
        if self.output.as_os_str().is_empty() {
            return Err(RequestError::Missing("out"));
        }

        let format = self
            .catalog
            .resolve(self.explicit_format.as_deref(), &self.output)?;

        let body = self.body.as_ref().map(BodySource::decode).transpose()?;

        Ok(CaptureRequest {
            url,
            method: self.method,
            body,
            headers: self.headers,
            user_agent: self.user_agent,
            app_name: self.app_name,
            app_version: self.app_version,
            user_stylesheet: self.user_stylesheet,
            min_width: self.min_width,
            default_height: self.default_height,
            delay: self.delay,
            max_wait: self.max_wait,
            format,
            output: self.output,
            features: self.features,
        })
    }
}

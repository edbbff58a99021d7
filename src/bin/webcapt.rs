//! webcapt command line.
//!
//! Usage examples:
//!   $ webcapt --url=https://example.org/ --out=example.png
//!   $ webcapt --url=https://example.org/ --out=page.bin --out-format=pdf --delay=500
//!   $ WEBCAPT_CHROME_BIN=/usr/bin/chromium webcapt --url=... --out=dump.rtree -v

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{info, warn};
use webcapt::capture::Capturer;
use webcapt::config::{ConfigOverrides, Verbosity, WebcaptConfig};
use webcapt::format::FormatCatalog;
use webcapt::logging::{LogConfig, init_logger};
use webcapt::request::{
    BodySource, CaptureRequest, FeatureToggles, Header, HttpMethod, RequestError, parse_switch,
};
use webcapt::runtime::ChromiumoxideRuntime;
use webcapt::session::FireTrigger;

#[derive(Parser, Debug)]
#[command(
    name = "webcapt",
    author,
    version,
    about = "Capture a web page to SVG, PDF, text dumps or raster images"
)]
struct Cli {
    /// The URL to capture (http:...|file:...|...).
    #[arg(long)]
    url: String,

    /// Target file (.png|.pdf|.svg|.txt|...).
    #[arg(long)]
    out: PathBuf,

    /// Output format identifier; overrides the file extension.
    #[arg(long, value_name = "FORMAT")]
    out_format: Option<String>,

    /// Minimal width for the viewport [800].
    #[arg(long, value_name = "PX")]
    min_width: Option<u32>,

    /// Initial viewport height [600].
    #[arg(long, value_name = "PX")]
    default_height: Option<u32>,

    /// Don't wait more than this many ms; 0 disables the timeout [90000].
    #[arg(long, value_name = "MS")]
    max_wait: Option<u64>,

    /// After the page is ready, wait this many ms [0].
    #[arg(long, value_name = "MS")]
    delay: Option<u64>,

    /// Location of a user stylesheet.
    #[arg(long, value_name = "URL")]
    user_styles: Option<String>,

    /// Request header; repeatable.
    #[arg(long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,

    /// Request method (get|head|post|put).
    #[arg(long)]
    method: Option<String>,

    /// Unencoded request body.
    #[arg(long, value_name = "STRING", conflicts_with = "body_base64")]
    body_string: Option<String>,

    /// Base64 encoded request body.
    #[arg(long, value_name = "BASE64")]
    body_base64: Option<String>,

    /// Override the user agent string.
    #[arg(long)]
    user_agent: Option<String>,

    /// Application name appended to the default user agent.
    #[arg(long)]
    app_name: Option<String>,

    /// Application version appended to the default user agent.
    #[arg(long)]
    app_version: Option<String>,

    #[arg(long, value_name = "on|off")]
    javascript: Option<String>,

    #[arg(long, value_name = "on|off")]
    java: Option<String>,

    #[arg(long, value_name = "on|off")]
    plugins: Option<String>,

    #[arg(long, value_name = "on|off")]
    private_browsing: Option<String>,

    #[arg(long, value_name = "on|off")]
    auto_load_images: Option<String>,

    #[arg(long, value_name = "on|off")]
    js_can_open_windows: Option<String>,

    #[arg(long, value_name = "on|off")]
    js_can_access_clipboard: Option<String>,

    #[arg(long, value_name = "on|off")]
    developer_extras: Option<String>,

    #[arg(long, value_name = "on|off")]
    links_included_in_focus_chain: Option<String>,

    /// Chrome or Chromium executable to launch.
    #[arg(long, value_name = "PATH")]
    chrome_bin: Option<PathBuf>,

    /// Show the launched browser window.
    #[arg(long)]
    show_browser: bool,

    /// Only log errors.
    #[arg(long, conflicts_with = "verbose")]
    silent: bool,

    /// Increase log verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides {
            min_width: self.min_width,
            default_height: self.default_height,
            delay_ms: self.delay,
            max_wait_ms: self.max_wait,
            ..Default::default()
        };
        if let Some(path) = &self.chrome_bin {
            overrides = overrides.chrome_executable(path.clone());
        }
        if self.show_browser {
            overrides.headless = Some(false);
        }
        if self.silent {
            overrides = overrides.verbose(Verbosity::Minimal);
        } else if self.verbose > 0 {
            overrides = overrides.verbose(Verbosity::Detailed);
        }
        overrides
    }

    fn feature_toggles(&self) -> Result<FeatureToggles, RequestError> {
        let switch = |field: &'static str, value: &Option<String>| {
            value
                .as_deref()
                .map(|value| parse_switch(field, value))
                .transpose()
        };
        Ok(FeatureToggles {
            javascript: switch("javascript", &self.javascript)?,
            java: switch("java", &self.java)?,
            plugins: switch("plugins", &self.plugins)?,
            private_browsing: switch("private-browsing", &self.private_browsing)?,
            auto_load_images: switch("auto-load-images", &self.auto_load_images)?,
            javascript_can_open_windows: switch("js-can-open-windows", &self.js_can_open_windows)?,
            javascript_can_access_clipboard: switch(
                "js-can-access-clipboard",
                &self.js_can_access_clipboard,
            )?,
            developer_extras: switch("developer-extras", &self.developer_extras)?,
            links_included_in_focus_chain: switch(
                "links-included-in-focus-chain",
                &self.links_included_in_focus_chain,
            )?,
        })
    }

    fn request(&self, config: &WebcaptConfig) -> Result<CaptureRequest, RequestError> {
        let mut builder = CaptureRequest::builder(self.url.clone(), self.out.clone())
            .catalog(FormatCatalog::standard())
            .min_width(config.min_width)
            .default_height(config.default_height)
            .delay(Duration::from_millis(config.delay_ms))
            .max_wait(Duration::from_millis(config.max_wait_ms))
            .features(self.feature_toggles()?);

        if let Some(format) = &self.out_format {
            builder = builder.format(format.clone());
        }
        if let Some(method) = &self.method {
            builder = builder.method(method.parse::<HttpMethod>()?);
        }
        if let Some(body) = &self.body_string {
            builder = builder.body(BodySource::Text(body.clone()));
        }
        if let Some(body) = &self.body_base64 {
            builder = builder.body(BodySource::Base64(body.clone()));
        }
        for raw in &self.headers {
            builder = builder.header(Header::parse(raw)?);
        }
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        if let Some(name) = &self.app_name {
            builder = builder.app_name(name.clone());
        }
        if let Some(version) = &self.app_version {
            builder = builder.app_version(version.clone());
        }
        if let Some(href) = &self.user_styles {
            builder = builder.user_stylesheet(href.clone());
        }

        builder.build()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = WebcaptConfig::from_env()
        .context("failed to read webcapt configuration from the environment")?
        .with_overrides(cli.overrides());
    init_logger(LogConfig::new(config.verbose));

    let request = match cli.request(&config) {
        Ok(request) => request,
        Err(err) => {
            eprint!("{}", usage_text(&err));
            return Ok(ExitCode::FAILURE);
        }
    };
    info!(
        "capturing {} to {} as {}",
        request.url,
        request.output.display(),
        request.format
    );

    let capturer = Capturer::new(ChromiumoxideRuntime::new(), config);
    match capturer.capture(&request).await {
        Ok(outcome) => {
            if outcome.trigger == FireTrigger::Timeout {
                warn!("page did not finish loading; captured after timeout");
            }
            info!(
                "wrote {} ({} bytes, viewport {})",
                outcome.report.path.display(),
                outcome.report.bytes_written,
                outcome.report.viewport
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Err(anyhow::Error::new(err).context(format!("failed to capture {}", request.url))),
    }
}

/// The configuration error followed by the help text.
fn usage_text(err: &RequestError) -> String {
    format!("{err}\n\n{}", Cli::command().render_help())
}

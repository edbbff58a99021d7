//! Chromiumoxide-based render engine.
//!
//! Implements [`RenderEngine`] and [`CapturePage`] on top of a locally
//! launched Chromium driven over CDP. Page load events are forwarded into the
//! signal channel consumed by the orchestrator; request shaping (method, body,
//! extra headers) goes through the Fetch domain. JavaScript dialogs are
//! answered as soon as they open so they never block the renderer.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::IntoEventKind;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, DialogType, EnableParams as PageEnableParams,
    EventDomContentEventFired, EventJavascriptDialogOpening, EventLoadEventFired,
    GetLayoutMetricsParams, HandleJavaScriptDialogParams, NavigateParams, PrintToPdfParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::{Page as ChromiumPage, ScreenshotParams};
use futures_util::StreamExt;
use image::{ImageFormat, RgbaImage};
use log::{debug, warn};
use serde_json::{Value as JsonValue, json};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::dom_scripts::{
    LayoutNode, MARKUP_SCRIPT, PLAIN_TEXT_SCRIPT, RENDER_TREE_SCRIPT, render_tree_dump,
    user_stylesheet_script,
};
use crate::engine::{
    CapturePage, EngineError, EngineSignal, LaunchPlan, LoadedPage, PageSize, RenderEngine, Size,
};
use crate::format::PrintKind;
use crate::request::{CaptureRequest, FeatureToggles, Header, HttpMethod};
use crate::surface::SvgSurface;

pub struct ChromiumoxideRuntime {
    state: Arc<Mutex<Option<RuntimeState>>>,
}

struct RuntimeState {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumoxideRuntime {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    async fn open_page(&self) -> Result<(ChromiumPage, Option<String>), EngineError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(EngineError::NotInitialized)?;
        let page = state
            .browser
            .new_page("about:blank")
            .await
            .map_err(map_chromiumoxide_error)?;
        let default_agent = match state.browser.version().await {
            Ok(version) => Some(version.user_agent),
            Err(err) => {
                debug!("could not read the default user agent: {err}");
                None
            }
        };
        Ok((page, default_agent))
    }
}

impl Default for ChromiumoxideRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderEngine for ChromiumoxideRuntime {
    type Page = ChromiumCapturePage;

    async fn launch(&self, plan: &LaunchPlan) -> Result<(), EngineError> {
        if self.state.lock().await.is_some() {
            return Ok(());
        }

        let config = build_config(plan)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(map_chromiumoxide_error)?;
        let handler = spawn_handler(handler);

        let mut guard = self.state.lock().await;
        *guard = Some(RuntimeState { browser, handler });
        debug!("chromium launched (headless={})", plan.headless);
        Ok(())
    }

    async fn load(&self, request: &CaptureRequest) -> Result<LoadedPage<Self::Page>, EngineError> {
        let (page, default_agent) = self.open_page().await?;

        page.execute(PageEnableParams::default())
            .await
            .map_err(map_chromiumoxide_error)?;
        set_device_metrics(
            &page,
            Size::new(request.min_width, request.default_height),
        )
        .await?;

        if let Some(agent) = user_agent_for(request, default_agent.as_deref()) {
            debug!("user agent: {agent}");
            page.execute(SetUserAgentOverrideParams::new(agent))
                .await
                .map_err(map_chromiumoxide_error)?;
        }

        if let Some(href) = &request.user_stylesheet {
            let script = user_stylesheet_script(href);
            page.evaluate_on_new_document(script.as_str())
                .await
                .map_err(map_chromiumoxide_error)?;
        }

        let (tx, signals) = mpsc::unbounded_channel();
        let mut listeners = vec![
            spawn_signal_listener(
                page.event_listener::<EventDomContentEventFired>()
                    .await
                    .map_err(map_chromiumoxide_error)?,
                tx.clone(),
                |_| EngineSignal::LayoutReady,
            ),
            spawn_signal_listener(
                page.event_listener::<EventLoadEventFired>()
                    .await
                    .map_err(map_chromiumoxide_error)?,
                tx.clone(),
                |_| EngineSignal::LoadComplete { success: true },
            ),
        ];

        let dialogs = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(map_chromiumoxide_error)?;
        listeners.push(spawn_dialog_handler(dialogs, page.clone()));

        if request.needs_request_interception() {
            let shaping = RequestShaping::from_request(request);
            let paused = page
                .event_listener::<EventRequestPaused>()
                .await
                .map_err(map_chromiumoxide_error)?;
            listeners.push(spawn_request_shaper(paused, page.clone(), shaping));

            let enable: FetchEnableParams = serde_json::from_value(json!({
                "patterns": [{ "urlPattern": "*", "resourceType": "Document", "requestStage": "Request" }]
            }))
            .map_err(map_chromiumoxide_error)?;
            page.execute(enable)
                .await
                .map_err(map_chromiumoxide_error)?;
        }

        listeners.push(spawn_navigation(page.clone(), request.url.clone(), tx));

        Ok(LoadedPage {
            page: ChromiumCapturePage { page, listeners },
            signals,
        })
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        let state = {
            let mut guard = self.state.lock().await;
            guard.take()
        };

        if let Some(mut state) = state {
            let closed = state.browser.close().await.map_err(map_chromiumoxide_error);
            if let Err(err) = state.browser.wait().await {
                warn!("failed to reap chromium process: {err}");
            }
            state.handler.abort();
            closed?;
        }
        Ok(())
    }
}

/// Loaded Chromium tab.
pub struct ChromiumCapturePage {
    page: ChromiumPage,
    listeners: Vec<JoinHandle<()>>,
}

impl ChromiumCapturePage {
    pub fn inner(&self) -> &ChromiumPage {
        &self.page
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, EngineError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(map_chromiumoxide_error)
    }
}

impl Drop for ChromiumCapturePage {
    fn drop(&mut self) {
        for handle in &self.listeners {
            handle.abort();
        }
    }
}

#[async_trait]
impl CapturePage for ChromiumCapturePage {
    async fn content_size(&self) -> Result<Size, EngineError> {
        let metrics = self
            .page
            .execute(GetLayoutMetricsParams::default())
            .await
            .map_err(map_chromiumoxide_error)?;
        let content = &metrics.result.css_content_size;
        Ok(Size::new(
            content.width.max(0.0).ceil() as u32,
            content.height.max(0.0).ceil() as u32,
        ))
    }

    async fn set_viewport(&self, size: Size) -> Result<(), EngineError> {
        set_device_metrics(&self.page, size).await
    }

    async fn paint_vector(&self, surface: &mut SvgSurface) -> Result<(), EngineError> {
        // Chromium has no vector paint target over CDP; the viewport bitmap is
        // embedded instead.
        if let Ok(Some(title)) = self.page.get_title().await {
            surface.set_title(title);
        }
        let png = self.screenshot_png().await?;
        let Size { width, height } = surface.size();
        surface.fill_rect(0, 0, width, height, "white");
        surface.draw_png(&png, 0, 0, width, height);
        Ok(())
    }

    async fn print_document(&self, kind: PrintKind, page: PageSize) -> Result<Vec<u8>, EngineError> {
        match kind {
            PrintKind::Pdf => self
                .page
                .pdf(PrintToPdfParams {
                    paper_width: Some(page.width_in),
                    paper_height: Some(page.height_in),
                    print_background: Some(true),
                    ..Default::default()
                })
                .await
                .map_err(map_chromiumoxide_error),
            PrintKind::PostScript => Err(EngineError::Unsupported(
                "PostScript output is not available from Chromium".to_string(),
            )),
        }
    }

    async fn plain_text(&self) -> Result<String, EngineError> {
        self.page
            .evaluate(PLAIN_TEXT_SCRIPT)
            .await
            .map_err(map_chromiumoxide_error)?
            .into_value::<String>()
            .map_err(map_chromiumoxide_error)
    }

    async fn markup(&self) -> Result<String, EngineError> {
        self.page
            .evaluate(MARKUP_SCRIPT)
            .await
            .map_err(map_chromiumoxide_error)?
            .into_value::<String>()
            .map_err(map_chromiumoxide_error)
    }

    async fn structural_dump(&self) -> Result<String, EngineError> {
        let tree = self
            .page
            .evaluate(RENDER_TREE_SCRIPT)
            .await
            .map_err(map_chromiumoxide_error)?
            .into_value::<Option<LayoutNode>>()
            .map_err(map_chromiumoxide_error)?;
        let size = self.content_size().await?;
        Ok(tree
            .map(|root| render_tree_dump(&root, size.width, size.height))
            .unwrap_or_default())
    }

    async fn paint_raster(&self, surface: &mut RgbaImage) -> Result<(), EngineError> {
        let png = self.screenshot_png().await?;
        let shot = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .map_err(map_chromiumoxide_error)?
            .to_rgba8();
        image::imageops::replace(surface, &shot, 0, 0);
        Ok(())
    }
}

/// Launch switches derived from feature toggles, plus the toggles Chromium
/// cannot honour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureSwitches {
    pub args: Vec<String>,
    pub unsupported: Vec<&'static str>,
}

pub fn feature_switches(features: &FeatureToggles) -> FeatureSwitches {
    let mut switches = FeatureSwitches::default();
    let mut blink = Vec::new();

    let settings = [
        ("scriptEnabled", features.javascript),
        ("imagesEnabled", features.auto_load_images),
        ("pluginsEnabled", features.plugins),
        (
            "javaScriptCanOpenWindowsAutomatically",
            features.javascript_can_open_windows,
        ),
        (
            "javaScriptCanAccessClipboard",
            features.javascript_can_access_clipboard,
        ),
    ];
    for (name, value) in settings {
        if let Some(enabled) = value {
            blink.push(format!("{name}={enabled}"));
        }
    }
    if !blink.is_empty() {
        switches.args.push(format!("--blink-settings={}", blink.join(",")));
    }

    if features.javascript_can_open_windows == Some(true) {
        switches.args.push("--disable-popup-blocking".to_string());
    }
    if features.private_browsing == Some(true) {
        switches.args.push("--incognito".to_string());
    }
    if features.developer_extras == Some(true) {
        switches.args.push("--auto-open-devtools-for-tabs".to_string());
    }

    if features.java.is_some() {
        switches.unsupported.push("java");
    }
    if features.links_included_in_focus_chain.is_some() {
        switches.unsupported.push("links-included-in-focus-chain");
    }

    switches
}

/// Every switch passed to Chromium for a plan.
pub fn launch_args(plan: &LaunchPlan) -> Vec<String> {
    let switches = feature_switches(&plan.features);
    for name in &switches.unsupported {
        warn!("--{name} has no Chromium equivalent and is ignored");
    }

    let mut args = vec!["--hide-scrollbars".to_string()];
    args.extend(switches.args);
    args.extend(plan.args.iter().cloned());
    args
}

fn build_config(plan: &LaunchPlan) -> Result<BrowserConfig, EngineError> {
    let viewport = Viewport {
        width: plan.viewport.width,
        height: plan.viewport.height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: plan.viewport.width >= plan.viewport.height,
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder();
    if let Some(path) = &plan.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    let builder = builder.viewport(viewport).args(launch_args(plan));
    let builder = if plan.headless {
        builder
    } else {
        builder.with_head()
    };
    let builder = if plan.sandbox {
        builder
    } else {
        builder.no_sandbox()
    };
    let builder = match &plan.user_data_dir {
        Some(dir) => builder.user_data_dir(dir),
        None => builder,
    };

    builder.build().map_err(EngineError::Message)
}

fn user_agent_for(request: &CaptureRequest, default_agent: Option<&str>) -> Option<String> {
    if let Some(agent) = &request.user_agent {
        return Some(agent.clone());
    }
    let token = request.application_token()?;
    match default_agent {
        Some(agent) => Some(format!("{agent} {token}")),
        None => Some(token),
    }
}

async fn set_device_metrics(page: &ChromiumPage, size: Size) -> Result<(), EngineError> {
    page.execute(SetDeviceMetricsOverrideParams::new(
        i64::from(size.width),
        i64::from(size.height),
        1.0,
        false,
    ))
    .await
    .map_err(map_chromiumoxide_error)?;
    Ok(())
}

/// Changes applied to the main document request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestShaping {
    pub method: HttpMethod,
    pub body: Option<Vec<u8>>,
    pub headers: Vec<Header>,
}

impl RequestShaping {
    pub fn from_request(request: &CaptureRequest) -> Self {
        Self {
            method: request.method,
            body: request.body.clone(),
            headers: request.headers.clone(),
        }
    }

    /// `Fetch.continueRequest` payload. Extra headers replace original ones
    /// with the same name; repeated extra headers are all sent.
    pub fn continue_payload(&self, request_id: &str, original_headers: &JsonValue) -> JsonValue {
        let mut headers: Vec<JsonValue> = original_headers
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(name, _)| {
                        !self
                            .headers
                            .iter()
                            .any(|extra| extra.name.eq_ignore_ascii_case(name))
                    })
                    .map(|(name, value)| {
                        let value = value
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| value.to_string());
                        json!({ "name": name, "value": value })
                    })
                    .collect()
            })
            .unwrap_or_default();
        headers.extend(
            self.headers
                .iter()
                .map(|header| json!({ "name": header.name, "value": header.value })),
        );

        let mut payload = json!({
            "requestId": request_id,
            "method": self.method.as_str(),
            "headers": headers,
        });
        if let Some(body) = &self.body {
            payload["postData"] = JsonValue::String(BASE64.encode(body));
        }
        payload
    }
}

/// Answer for a JavaScript dialog: alerts are dismissed, confirmations and
/// before-unload prompts accepted, and prompts accepted with their default
/// text.
pub fn dialog_response(
    kind: &DialogType,
    default_prompt: Option<&str>,
) -> HandleJavaScriptDialogParams {
    let prompt_text = match kind {
        DialogType::Prompt => Some(default_prompt.unwrap_or_default().to_string()),
        _ => None,
    };
    HandleJavaScriptDialogParams {
        accept: true,
        prompt_text,
    }
}

fn spawn_dialog_handler(
    mut stream: EventStream<EventJavascriptDialogOpening>,
    page: ChromiumPage,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            debug!("answering {:?} dialog: {}", event.r#type, event.message);
            let response = dialog_response(&event.r#type, event.default_prompt.as_deref());
            if let Err(err) = page.execute(response).await {
                warn!("failed to close JavaScript dialog: {err}");
            }
        }
    })
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                debug!("chromiumoxide handler error: {err}");
            }
        }
    })
}

fn spawn_signal_listener<T, F>(
    mut stream: EventStream<T>,
    tx: mpsc::UnboundedSender<EngineSignal>,
    map: F,
) -> JoinHandle<()>
where
    T: IntoEventKind + Unpin + Send + Sync + 'static,
    F: Fn(&T) -> EngineSignal + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            if tx.send(map(&*event)).is_err() {
                break;
            }
        }
    })
}

fn spawn_navigation(
    page: ChromiumPage,
    url: String,
    tx: mpsc::UnboundedSender<EngineSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match page.execute(NavigateParams::new(url.clone())).await {
            Ok(response) => {
                if let Some(error) = &response.result.error_text {
                    warn!("navigation to {url} failed: {error}");
                    let _ = tx.send(EngineSignal::LoadComplete { success: false });
                }
            }
            Err(err) => {
                warn!("navigation to {url} failed: {err}");
                let _ = tx.send(EngineSignal::LoadComplete { success: false });
            }
        }
    })
}

fn spawn_request_shaper(
    mut stream: EventStream<EventRequestPaused>,
    page: ChromiumPage,
    shaping: RequestShaping,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shaped = false;
        while let Some(event) = stream.next().await {
            let request_id = event.request_id.as_ref().to_string();
            // Only the first document request is the main navigation.
            let payload = if shaped {
                json!({ "requestId": request_id })
            } else {
                shaped = true;
                let original = serde_json::to_value(&event.request.headers).unwrap_or(JsonValue::Null);
                shaping.continue_payload(&request_id, &original)
            };

            let params: ContinueRequestParams = match serde_json::from_value(payload) {
                Ok(params) => params,
                Err(err) => {
                    warn!("could not build continueRequest for {request_id}: {err}");
                    continue;
                }
            };
            if let Err(err) = page.execute(params).await {
                warn!("continueRequest for {request_id} failed: {err}");
            }
        }
    })
}

fn map_chromiumoxide_error<E: std::fmt::Display>(err: E) -> EngineError {
    EngineError::Message(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebcaptConfig;

    #[test]
    fn untouched_toggles_produce_no_switches() {
        assert_eq!(
            feature_switches(&FeatureToggles::default()),
            FeatureSwitches::default()
        );
    }

    #[test]
    fn toggles_map_to_blink_settings_and_flags() {
        let switches = feature_switches(&FeatureToggles {
            javascript: Some(false),
            auto_load_images: Some(false),
            javascript_can_open_windows: Some(true),
            private_browsing: Some(true),
            java: Some(true),
            links_included_in_focus_chain: Some(false),
            ..Default::default()
        });

        assert_eq!(
            switches.args,
            vec![
                "--blink-settings=scriptEnabled=false,imagesEnabled=false,javaScriptCanOpenWindowsAutomatically=true"
                    .to_string(),
                "--disable-popup-blocking".to_string(),
                "--incognito".to_string(),
            ]
        );
        assert_eq!(
            switches.unsupported,
            vec!["java", "links-included-in-focus-chain"]
        );
    }

    #[test]
    fn launch_args_hide_scrollbars_and_keep_config_args_last() {
        let mut config = WebcaptConfig::default();
        config.chrome_args = vec!["--lang=de-DE".into()];
        let request = CaptureRequest::builder("https://example.org/", "page.png")
            .features(FeatureToggles {
                developer_extras: Some(true),
                ..Default::default()
            })
            .build()
            .unwrap();

        let args = launch_args(&LaunchPlan::new(&config, &request));
        assert_eq!(
            args,
            vec![
                "--hide-scrollbars".to_string(),
                "--auto-open-devtools-for-tabs".to_string(),
                "--lang=de-DE".to_string(),
            ]
        );
    }

    #[test]
    fn user_agent_override_wins_over_application_token() {
        let request = CaptureRequest::builder("https://example.org/", "page.png")
            .user_agent("Custom/1.0")
            .app_name("Capture")
            .build()
            .unwrap();
        assert_eq!(
            user_agent_for(&request, Some("Mozilla/5.0")).as_deref(),
            Some("Custom/1.0")
        );

        let request = CaptureRequest::builder("https://example.org/", "page.png")
            .app_name("Capture")
            .app_version("2.1")
            .build()
            .unwrap();
        assert_eq!(
            user_agent_for(&request, Some("Mozilla/5.0")).as_deref(),
            Some("Mozilla/5.0 Capture/2.1")
        );

        let request = CaptureRequest::builder("https://example.org/", "page.png")
            .build()
            .unwrap();
        assert_eq!(user_agent_for(&request, Some("Mozilla/5.0")), None);
    }

    #[test]
    fn continue_payload_replaces_and_appends_headers() {
        let shaping = RequestShaping {
            method: HttpMethod::Post,
            body: Some(b"a=1".to_vec()),
            headers: vec![
                Header::new("user-agent", "Bot"),
                Header::new("Cookie", "a=1"),
                Header::new("Cookie", "b=2"),
            ],
        };
        let original = json!({ "User-Agent": "Mozilla/5.0", "Accept": "text/html" });

        let payload = shaping.continue_payload("req-1", &original);
        assert_eq!(payload["requestId"], "req-1");
        assert_eq!(payload["method"], "POST");
        assert_eq!(payload["postData"], "YT0x");
        assert_eq!(
            payload["headers"],
            json!([
                { "name": "Accept", "value": "text/html" },
                { "name": "user-agent", "value": "Bot" },
                { "name": "Cookie", "value": "a=1" },
                { "name": "Cookie", "value": "b=2" },
            ])
        );
    }

    #[tokio::test]
    async fn load_requires_launch() {
        let runtime = ChromiumoxideRuntime::new();
        let request = CaptureRequest::builder("https://example.org/", "page.png")
            .build()
            .unwrap();
        assert!(matches!(
            runtime.load(&request).await,
            Err(EngineError::NotInitialized)
        ));
        assert!(!runtime.is_running().await);
        runtime.shutdown().await.expect("shutdown without launch");
    }

    #[test]
    fn dialogs_are_accepted_with_default_prompt_text() {
        let alert = dialog_response(&DialogType::Alert, None);
        assert!(alert.accept);
        assert_eq!(alert.prompt_text, None);

        let confirm = dialog_response(&DialogType::Confirm, Some("ignored"));
        assert!(confirm.accept);
        assert_eq!(confirm.prompt_text, None);

        let prompt = dialog_response(&DialogType::Prompt, Some("guest"));
        assert!(prompt.accept);
        assert_eq!(prompt.prompt_text.as_deref(), Some("guest"));

        let empty_prompt = dialog_response(&DialogType::Prompt, None);
        assert_eq!(empty_prompt.prompt_text.as_deref(), Some(""));

        let unload = dialog_response(&DialogType::Beforeunload, None);
        assert!(unload.accept);
        assert_eq!(unload.prompt_text, None);
    }
}

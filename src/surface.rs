//! Vector output surface.

use std::fmt::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::engine::Size;

/// SVG document the page paints onto. Painted content is kept in call order
/// and serialized by [`SvgSurface::finish`].
#[derive(Debug, Clone)]
pub struct SvgSurface {
    size: Size,
    title: Option<String>,
    body: String,
}

impl SvgSurface {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            title: None,
            body: String::new(),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn is_blank(&self) -> bool {
        self.body.is_empty()
    }

    /// Place a PNG bitmap at `(x, y)` scaled to `width` x `height`.
    pub fn draw_png(&mut self, png: &[u8], x: i64, y: i64, width: u32, height: u32) {
        let _ = writeln!(
            self.body,
            r#"  <image x="{x}" y="{y}" width="{width}" height="{height}" xlink:href="data:image/png;base64,{}"/>"#,
            BASE64.encode(png)
        );
    }

    /// Fill a rectangle with a CSS colour.
    pub fn fill_rect(&mut self, x: i64, y: i64, width: u32, height: u32, color: &str) {
        let _ = writeln!(
            self.body,
            r#"  <rect x="{x}" y="{y}" width="{width}" height="{height}" fill="{}"/>"#,
            escape(color)
        );
    }

    pub fn finish(self) -> String {
        let Size { width, height } = self.size;
        let mut out = String::with_capacity(self.body.len() + 256);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n");
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" version="1.1" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
        );
        if let Some(title) = &self.title {
            let _ = writeln!(out, "  <title>{}</title>", escape(title));
        }
        out.push_str(&self.body);
        out.push_str("</svg>\n");
        out
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

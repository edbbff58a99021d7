//! Page-context scripts used by the Chromium runtime.
//!
//! The layout tree walker lives in its own `.js` file so editors highlight it
//! properly; it is bundled as a string at compile time. Its JSON result is
//! decoded into [`LayoutNode`] and rendered by [`render_tree_dump`].

use std::fmt::Write as _;

use serde::Deserialize;

/// Expression returning the layout tree of the document as JSON.
pub const RENDER_TREE_SCRIPT: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/scripts/render_tree.js"));

/// Expression returning the visible text of the document.
pub const PLAIN_TEXT_SCRIPT: &str = r#"(() => {
  const root = document.body || document.documentElement;
  return root ? root.innerText : "";
})()"#;

/// Attribute marking the injected user stylesheet. Dumps leave marked nodes out.
pub const USER_STYLE_ATTRIBUTE: &str = "data-webcapt-user-style";

/// Expression returning the serialized document without the injected user
/// stylesheet.
pub const MARKUP_SCRIPT: &str = r#"(() => {
  let markup = "";
  if (document.doctype) {
    markup = new XMLSerializer().serializeToString(document.doctype);
  }
  const root = document.documentElement;
  if (root) {
    const copy = root.cloneNode(true);
    for (const node of copy.querySelectorAll("[data-webcapt-user-style]")) {
      node.remove();
    }
    markup += copy.outerHTML;
  }
  return markup;
})()"#;

/// Script installing a user stylesheet in every new document.
pub fn user_stylesheet_script(href: &str) -> String {
    // serde_json quoting yields a valid JS string literal.
    let href = serde_json::to_string(href).unwrap_or_else(|_| "\"\"".to_string());
    let attribute = format!("{USER_STYLE_ATTRIBUTE:?}");
    format!(
        r#"(() => {{
  const install = () => {{
    const link = document.createElement("link");
    link.rel = "stylesheet";
    link.href = {href};
    link.setAttribute({attribute}, "");
    (document.head || document.documentElement).appendChild(link);
  }};
  if (document.documentElement) {{
    install();
  }} else {{
    document.addEventListener("DOMContentLoaded", install, {{ once: true }});
  }}
}})();"#
    )
}

/// One box of the layout tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayoutNode {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub children: Vec<LayoutNode>,
}

/// Indented text rendering of a layout tree, two spaces per level.
pub fn render_tree_dump(root: &LayoutNode, viewport_width: u32, viewport_height: u32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "layer at (0,0) size {viewport_width}x{viewport_height}");
    write_node(&mut out, root, 1);
    out
}

fn write_node(out: &mut String, node: &LayoutNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = write!(
        out,
        "{indent}{} at ({},{}) size {}x{}",
        node.name, node.x, node.y, node.width, node.height
    );
    if let Some(display) = &node.display {
        let _ = write!(out, " display={display}");
    }
    if let Some(position) = node.position.as_deref().filter(|p| *p != "static") {
        let _ = write!(out, " position={position}");
    }
    if let Some(text) = &node.text {
        let _ = write!(out, " text={text:?}");
    }
    out.push('\n');

    for child in &node.children {
        write_node(out, child, depth + 1);
    }
}

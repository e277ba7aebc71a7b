//! [`DocumentAccessor`] backed by a Chrome instance over the DevTools protocol.
//!
//! `headless_chrome` is blocking, so every call runs on tokio's blocking pool.
//! Element handles are tracked on the page side: queried elements are tagged
//! with a numeric id in a `window.__rankprobe` registry and addressed by that
//! id afterwards, which keeps [`NodeRef`] `Copy` and free of lifetimes.
//! Entries for elements that have left the document are dropped on lookup and
//! after every removal, so the registry never pins a detached subtree.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use headless_chrome::browser::tab::point::Point as ChromePoint;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{BoundingBox, DocumentAccessor, NodeRef, Point, ScrollTarget};
use crate::config::BrowserConfig;

/// Shared helpers prepended to every evaluated script.
const PRELUDE: &str = r#"
const __reg = (window.__rankprobe ??= { next: 1, nodes: new Map() });
const __tag = (el) => {
  if (!el.__rankprobeId) {
    el.__rankprobeId = __reg.next++;
    __reg.nodes.set(el.__rankprobeId, el);
  }
  return el.__rankprobeId;
};
const __node = (id) => {
  const el = __reg.nodes.get(id);
  if (el && !el.isConnected) __reg.nodes.delete(id);
  return el && el.isConnected ? el : null;
};
const __prune = () => {
  for (const [id, el] of __reg.nodes) {
    if (!el.isConnected) __reg.nodes.delete(id);
  }
  return __reg.nodes.size;
};
"#;

pub struct ChromeDocument {
    // Dropping the browser kills the Chrome process, so it lives as long as the tab.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeDocument {
    /// Launch Chrome and open a single tab.
    pub fn launch(config: &BrowserConfig, default_timeout: Duration) -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.viewport_width, config.viewport_height)))
            .idle_browser_timeout(default_timeout)
            .build()
            .map_err(|e| anyhow!("invalid browser launch options: {e}"))?;

        let browser = Browser::new(options).context("Failed to launch Chrome")?;
        let tab = browser.new_tab().context("Failed to open a browser tab")?;
        tab.set_default_timeout(default_timeout);

        info!(
            headless = config.headless,
            width = config.viewport_width,
            height = config.viewport_height,
            "browser launched"
        );

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || op(&tab))
            .await
            .context("browser task panicked")?
    }

    /// Evaluate `body` (a function body ending in `return ...`) and decode its result.
    async fn eval<T>(&self, body: String) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let script = wrap_script(&body);
        self.run(move |tab| {
            let object = tab.evaluate(&script, false)?;
            decode_payload(object.value)
        })
        .await
    }
}

fn wrap_script(body: &str) -> String {
    format!("(() => {{ {PRELUDE} return JSON.stringify((() => {{ {body} }})()); }})()")
}

/// Scripts return their result as a JSON string so arrays and objects survive
/// the protocol without `returnByValue`.
fn decode_payload<T: DeserializeOwned>(value: Option<serde_json::Value>) -> Result<T> {
    let json = match value {
        Some(serde_json::Value::String(json)) => json,
        other => bail!("script returned no JSON payload: {other:?}"),
    };
    let de = &mut serde_json::Deserializer::from_str(&json);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        anyhow!("unexpected script result at path '{path}': {}", err.into_inner())
    })
}

/// Quote a string as a JavaScript literal.
fn js_str(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

/// Detach a node, then forget every tracked element no longer in the document.
/// Evaluates to the number of elements still tracked.
fn remove_script(node: NodeRef) -> String {
    format!(
        "const el = __reg.nodes.get({id}); if (el) el.remove(); return __prune();",
        id = node.0
    )
}

fn scope_expr(scope: Option<NodeRef>) -> String {
    match scope {
        Some(node) => format!("__node({})", node.0),
        None => "document".to_string(),
    }
}

#[async_trait]
impl DocumentAccessor for ChromeDocument {
    async fn navigate(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.run(move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn query_all(&self, selector: &str, scope: Option<NodeRef>) -> Result<Vec<NodeRef>> {
        self.eval(format!(
            "const root = {scope}; if (!root) return []; \
             return Array.from(root.querySelectorAll({sel}), __tag);",
            scope = scope_expr(scope),
            sel = js_str(selector),
        ))
        .await
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        self.eval(format!(
            "return document.querySelectorAll({}).length;",
            js_str(selector)
        ))
        .await
    }

    async fn click(&self, node: NodeRef) -> Result<()> {
        // Elements without a rendered box cannot take a pointer click.
        let target: Option<BoundingBox> = self
            .eval(format!(
                "const el = __node({id}); if (!el) return null; \
                 el.scrollIntoView({{ block: 'center', inline: 'center' }}); \
                 const r = el.getBoundingClientRect(); \
                 if (r.width === 0 || r.height === 0) {{ el.click(); return null; }} \
                 return {{ left: r.left, top: r.top, width: r.width, height: r.height }};",
                id = node.0
            ))
            .await?;

        if let Some(bbox) = target {
            let center = ChromePoint {
                x: bbox.left + bbox.width / 2.0,
                y: bbox.top + bbox.height / 2.0,
            };
            self.run(move |tab| {
                tab.click_point(center)?;
                Ok(())
            })
            .await?;
        }
        debug!(%node, "clicked");
        Ok(())
    }

    async fn move_pointer(&self, point: Point) -> Result<()> {
        let target = ChromePoint {
            x: point.x,
            y: point.y,
        };
        self.run(move |tab| {
            tab.move_mouse_to_point(target)?;
            Ok(())
        })
        .await
    }

    async fn bounding_box(&self, node: NodeRef) -> Result<Option<BoundingBox>> {
        self.eval(format!(
            "const el = __node({}); if (!el) return null; \
             const r = el.getBoundingClientRect(); \
             return {{ left: r.left, top: r.top, width: r.width, height: r.height }};",
            node.0
        ))
        .await
    }

    async fn text(&self, node: NodeRef) -> Result<Option<String>> {
        self.eval(format!(
            "const el = __node({}); return el ? el.textContent.trim() : null;",
            node.0
        ))
        .await
    }

    async fn is_checked(&self, node: NodeRef) -> Result<Option<bool>> {
        self.eval(format!(
            "const el = __node({}); \
             return el && typeof el.checked === 'boolean' ? el.checked : null;",
            node.0
        ))
        .await
    }

    async fn is_visible(&self, node: NodeRef) -> Result<bool> {
        self.eval(format!(
            "const el = __node({}); if (!el) return false; \
             const s = getComputedStyle(el); \
             if (s.visibility === 'hidden' || s.display === 'none') return false; \
             const r = el.getBoundingClientRect(); \
             return r.width > 0 && r.height > 0;",
            node.0
        ))
        .await
    }

    async fn remove(&self, node: NodeRef) -> Result<()> {
        let tracked: usize = self.eval(remove_script(node)).await?;
        debug!(%node, tracked, "removed");
        Ok(())
    }

    async fn scroll_to(&self, target: ScrollTarget) -> Result<()> {
        let (node, container, window) = match target {
            ScrollTarget::Top(node) => (node, "0", "0"),
            ScrollTarget::Bottom(node) => (node, "c.scrollHeight", "document.body.scrollHeight"),
        };
        self.eval::<Option<()>>(format!(
            "const el = __node({id}); if (!el) return null; \
             const c = el.parentElement ?? document.scrollingElement; \
             c.scrollTop = {container}; \
             window.scrollTo(0, {window}); \
             return null;",
            id = node.0
        ))
        .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.run(|tab| {
            tab.close(false)?;
            Ok(())
        })
        .await
    }
}

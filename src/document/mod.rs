//! Access to a live, rendered document.
//!
//! The pipeline never touches a browser directly; it drives a
//! [`DocumentAccessor`]. Production runs use [`chrome::ChromeDocument`], tests
//! substitute an in-memory fixture.

pub mod chrome;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// Opaque handle to an element in the live document.
///
/// A handle stays valid until the element is removed. Accessors must treat
/// operations on removed handles as "not present" rather than failing, so
/// teardown can be repeated safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(pub u64);

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Rendered bounding box in viewport CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.left + self.width
            && point.y >= self.top
            && point.y <= self.top + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Where to scroll the container that holds a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollTarget {
    Top(NodeRef),
    Bottom(NodeRef),
}

/// Query and interaction primitives over a rendered document.
///
/// `scope` limits a query to descendants of the given node; `None` searches the
/// whole document. Waiting is not part of this trait; callers poll these
/// primitives through [`crate::wait`].
#[async_trait]
pub trait DocumentAccessor: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn query_one(&self, selector: &str, scope: Option<NodeRef>) -> Result<Option<NodeRef>> {
        Ok(self.query_all(selector, scope).await?.into_iter().next())
    }

    async fn query_all(&self, selector: &str, scope: Option<NodeRef>) -> Result<Vec<NodeRef>>;

    /// Number of matches, without handing out handles.
    async fn count(&self, selector: &str) -> Result<usize> {
        Ok(self.query_all(selector, None).await?.len())
    }

    async fn click(&self, node: NodeRef) -> Result<()>;

    async fn move_pointer(&self, point: Point) -> Result<()>;

    /// `None` when the node is gone or not rendered.
    async fn bounding_box(&self, node: NodeRef) -> Result<Option<BoundingBox>>;

    /// Trimmed text content; `None` when the node is gone.
    async fn text(&self, node: NodeRef) -> Result<Option<String>>;

    /// Checkbox state; `None` when the node is gone or not a checkbox.
    async fn is_checked(&self, node: NodeRef) -> Result<Option<bool>>;

    async fn is_visible(&self, node: NodeRef) -> Result<bool>;

    /// Removed nodes count as hidden.
    async fn is_hidden(&self, node: NodeRef) -> Result<bool> {
        Ok(!self.is_visible(node).await?)
    }

    /// Detach the node. Removing an already removed node is a no-op.
    async fn remove(&self, node: NodeRef) -> Result<()>;

    async fn scroll_to(&self, target: ScrollTarget) -> Result<()>;

    /// Release the underlying session.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Text of the first match for `selector`, if any.
    async fn text_of(&self, selector: &str, scope: Option<NodeRef>) -> Result<Option<String>> {
        match self.query_one(selector, scope).await? {
            Some(node) => self.text(node).await,
            None => Ok(None),
        }
    }
}

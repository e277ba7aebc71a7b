//! Metric probe: reads one entity's count for the target category from its chart.
//!
//! The count is not in the page markup. It only appears in a tooltip after the
//! entity's chart is revealed and the pointer hovers the category's segment.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::document::{BoundingBox, DocumentAccessor, NodeRef, Point};
use crate::session::Session;
use crate::utils::log_if_slow;
use crate::wait::{WaitTimeout, wait_for_predicate, wait_for_value};

/// Horizontal position of the hover target, as a fraction of the chart width.
pub const HOVER_X_FRACTION: f64 = 0.92;

/// Distance of the hover target above the chart's bottom edge, in pixels.
pub const HOVER_Y_INSET: f64 = 63.0;

const SLOW_PROBE_THRESHOLD: Duration = Duration::from_secs(3);

/// Point on a rendered chart that raises the target category's tooltip.
pub fn hover_point(bbox: BoundingBox) -> Point {
    Point {
        x: bbox.left + bbox.width * HOVER_X_FRACTION,
        y: bbox.top + (bbox.height - HOVER_Y_INSET),
    }
}

/// Parse a tooltip's numeric text. Missing, non-numeric or negative text
/// counts as zero.
///
/// Accepts thousands separators. Fractional values are kept as is.
pub fn parse_count(text: Option<&str>) -> f64 {
    let Some(text) = text else {
        return 0.0;
    };
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

/// What a tooltip showed: the category it describes and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct TooltipReading {
    pub label: String,
    pub value: f64,
}

impl TooltipReading {
    /// The value, if the tooltip describes `category`.
    pub fn value_for(&self, category: &str) -> Result<f64, ProbeError> {
        if self.label == category {
            Ok(self.value)
        } else {
            Err(ProbeError::LabelMismatch {
                expected: category.to_string(),
                found: self.label.clone(),
            })
        }
    }
}

/// Reasons a probe degrades to zero.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("No chart reveal control in {owner}")]
    RevealControlMissing { owner: NodeRef },
    #[error("Chart never rendered")]
    ChartNotRendered(#[source] WaitTimeout),
    #[error("Tooltip never appeared")]
    TooltipMissing(#[source] WaitTimeout),
    #[error("Tooltip shows {found:?}, expected {expected:?}")]
    LabelMismatch { expected: String, found: String },
    #[error(transparent)]
    Document(#[from] anyhow::Error),
}

/// Reads one chart-backed count.
///
/// Implementations never fail outward: anything that prevents a clean reading
/// yields `0.0`.
#[async_trait]
pub trait MetricProbe: Send + Sync {
    async fn probe(&self, chart_slot: NodeRef, owner_row: NodeRef) -> f64;
}

/// Probe that drives the real chart through pointer interaction.
pub struct ChartProbe<'s, D> {
    session: &'s Session<D>,
}

impl<'s, D: DocumentAccessor> ChartProbe<'s, D> {
    pub fn new(session: &'s Session<D>) -> Self {
        Self { session }
    }

    /// Reveal the chart, hover the category segment and read the tooltip.
    pub async fn read(
        &self,
        chart_slot: NodeRef,
        owner_row: NodeRef,
    ) -> Result<TooltipReading, ProbeError> {
        let doc = self.session.doc();
        let config = self.session.config();
        let selectors = &config.selectors;

        let reveal = doc
            .query_one(&selectors.chart_reveal, Some(owner_row))
            .await?
            .ok_or(ProbeError::RevealControlMissing { owner: owner_row })?;
        doc.click(reveal).await?;

        let surface_selector = selectors.chart_surface.as_str();
        let bbox = wait_for_value(
            "chart surface rendered",
            self.session.policy(config.timeouts.chart),
            || async move {
                let Some(surface) = doc.query_one(surface_selector, Some(chart_slot)).await? else {
                    return Ok(None);
                };
                let bbox = doc.bounding_box(surface).await?;
                Ok(bbox.filter(|b| b.width > 0.0 && b.height > 0.0))
            },
        )
        .await
        .map_err(ProbeError::ChartNotRendered)?;

        let point = hover_point(bbox);
        debug!(x = point.x, y = point.y, "Hovering chart");
        doc.move_pointer(point).await?;

        let tooltip_selector = selectors.tooltip.as_str();
        wait_for_predicate(
            "tooltip visible",
            self.session.policy(config.timeouts.tooltip),
            || async move {
                match doc.query_one(tooltip_selector, None).await? {
                    Some(tooltip) => doc.is_visible(tooltip).await,
                    None => Ok(false),
                }
            },
        )
        .await
        .map_err(ProbeError::TooltipMissing)?;

        let (label, value) = tokio::join!(
            doc.text_of(&selectors.tooltip_label, None),
            doc.text_of(&selectors.tooltip_value, None),
        );
        Ok(TooltipReading {
            label: label?.unwrap_or_default(),
            value: parse_count(value?.as_deref()),
        })
    }

    /// Remove the tooltip and any chart surface under `chart_slot`.
    ///
    /// Safe to call repeatedly; already removed elements are skipped.
    pub async fn teardown(&self, chart_slot: NodeRef) {
        let doc = self.session.doc();
        let selectors = &self.session.config().selectors;

        match doc.query_one(&selectors.tooltip, None).await {
            Ok(Some(tooltip)) => {
                if let Err(e) = doc.remove(tooltip).await {
                    warn!(error = ?e, "Failed to remove tooltip");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = ?e, "Failed to locate tooltip for teardown"),
        }

        match doc
            .query_all(&selectors.chart_surface, Some(chart_slot))
            .await
        {
            Ok(surfaces) => {
                for surface in surfaces {
                    if let Err(e) = doc.remove(surface).await {
                        warn!(%surface, error = ?e, "Failed to remove chart surface");
                    }
                }
            }
            Err(e) => warn!(%chart_slot, error = ?e, "Failed to locate chart surface for teardown"),
        }
    }
}

#[async_trait]
impl<'s, D: DocumentAccessor> MetricProbe for ChartProbe<'s, D> {
    async fn probe(&self, chart_slot: NodeRef, owner_row: NodeRef) -> f64 {
        let start = Instant::now();
        let category = self.session.config().category.label.as_str();

        let outcome = self
            .read(chart_slot, owner_row)
            .await
            .and_then(|reading| reading.value_for(category));
        self.teardown(chart_slot).await;
        log_if_slow(start, SLOW_PROBE_THRESHOLD, "metric probe");

        match outcome {
            Ok(value) => {
                debug!(%owner_row, value, "Probe read");
                value
            }
            Err(ProbeError::ChartNotRendered(_)) => {
                debug!(%owner_row, "Chart never rendered, no data for category");
                0.0
            }
            Err(e) => {
                warn!(%owner_row, error = %e, "Probe degraded to zero");
                0.0
            }
        }
    }
}

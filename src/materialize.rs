//! Forces the lazily rendered ranking list to mount every row.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::document::{DocumentAccessor, ScrollTarget};
use crate::error::ScrapeError;
use crate::session::Session;
use crate::utils::fmt_duration;
use crate::wait::wait_for_value;

/// Scroll the list until it stops growing and return the final row count.
///
/// The first scroll must produce more rows than were initially mounted within
/// `timeout`, otherwise the list is considered broken. After that, the list is
/// complete once the count holds for `timeouts.list_settle` with the view at
/// the bottom. The view is scrolled back to the top before returning.
pub async fn materialize_all<D: DocumentAccessor>(
    session: &Session<D>,
    row_selector: &str,
    timeout: Duration,
) -> Result<usize, ScrapeError> {
    let doc = session.doc();
    let start = Instant::now();
    let policy = session.policy(timeout);

    let root_selector = session.config().selectors.list_root.as_str();
    let root = wait_for_value("ranking container present", policy, || {
        doc.query_one(root_selector, None)
    })
    .await
    .map_err(|source| ScrapeError::ListLoad { initial: 0, source })?;

    let initial = wait_for_value("initial row count", policy, || async move {
        doc.count(row_selector).await.map(Some)
    })
    .await
    .map_err(|source| ScrapeError::ListLoad { initial: 0, source })?;
    info!(rows = initial, "Scrolling down to load more rows");

    scroll(doc, ScrollTarget::Bottom(root)).await;
    let mut current = wait_for_value("row count above initial", policy, || async move {
        let rows = doc.count(row_selector).await?;
        Ok((rows > initial).then_some(rows))
    })
    .await
    .map_err(|source| ScrapeError::ListLoad { initial, source })?;
    debug!(rows = current, "List started growing");

    let settle = session.config().timeouts.list_settle;
    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            warn!(
                rows = current,
                "List still growing at the global timeout, walking what is loaded"
            );
            break;
        }

        scroll(doc, ScrollTarget::Bottom(root)).await;
        let last = current;
        let grew = wait_for_value(
            "row count growth",
            session.policy(settle.min(remaining)),
            || async move {
                let rows = doc.count(row_selector).await?;
                Ok((rows > last).then_some(rows))
            },
        )
        .await;

        match grew {
            Ok(rows) => {
                debug!(rows, "More rows loaded");
                current = rows;
            }
            Err(_) => break,
        }
    }

    scroll(doc, ScrollTarget::Top(root)).await;
    info!(
        rows = current,
        duration = fmt_duration(start.elapsed()),
        "All rows loaded"
    );
    Ok(current)
}

async fn scroll<D: DocumentAccessor>(doc: &D, target: ScrollTarget) {
    // A failed scroll shows up as a stalled row count, which the caller handles.
    if let Err(e) = doc.scroll_to(target).await {
        warn!(?target, error = ?e, "Failed to scroll ranking list");
    }
}

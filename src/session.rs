//! Session controller: owns the live document and prepares it for extraction.

use anyhow::anyhow;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::document::{DocumentAccessor, NodeRef};
use crate::error::ScrapeError;
use crate::wait::{WaitPolicy, wait_for_predicate, wait_for_value};

/// The single live connection to the rendered page.
///
/// Every pipeline component receives the session explicitly; nothing reaches
/// the document any other way.
pub struct Session<D> {
    doc: D,
    config: Config,
}

impl<D: DocumentAccessor> Session<D> {
    pub fn new(doc: D, config: Config) -> Self {
        Self { doc, config }
    }

    pub fn doc(&self) -> &D {
        &self.doc
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Poll policy for a wait bounded by `timeout`.
    pub fn policy(&self, timeout: Duration) -> WaitPolicy {
        WaitPolicy::new(timeout, self.config.timeouts.poll_interval)
    }

    /// Poll policy for waits bounded by the global timeout.
    pub fn global_policy(&self) -> WaitPolicy {
        self.policy(self.config.timeouts.global)
    }

    /// Navigate to `target_url` and wait for the ranking table to exist.
    pub async fn open(&self, target_url: &str, timeout: Duration) -> Result<(), ScrapeError> {
        let navigation_error = |source| ScrapeError::Navigation {
            url: target_url.to_string(),
            source,
        };

        let url = Url::parse(target_url).map_err(|e| navigation_error(e.into()))?;
        info!(url = %url, "Waiting for the page to load");

        let nav = tokio::time::timeout(timeout, self.doc.navigate(url.as_str())).await;
        match nav {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(navigation_error(e)),
            Err(_) => {
                return Err(navigation_error(anyhow!(
                    "navigation did not finish within {timeout:?}"
                )));
            }
        }

        let root = self.config.selectors.list_root.as_str();
        wait_for_value("ranking container present", self.policy(timeout), || {
            self.doc.query_one(root, None)
        })
        .await
        .map_err(|e| navigation_error(e.into()))?;

        info!("Page loaded");
        Ok(())
    }

    /// Remove the one-time overlay if it shows up within `timeout`.
    ///
    /// Returns whether an overlay was removed. Never fails the run: the site
    /// only sometimes shows it.
    pub async fn dismiss_interstitial(&self, timeout: Duration) -> bool {
        let selector = self.config.selectors.interstitial.as_str();
        let policy = self.policy(timeout);

        let overlay = match wait_for_value("interstitial overlay present", policy, || {
            self.doc.query_one(selector, None)
        })
        .await
        {
            Ok(node) => node,
            Err(_) => {
                info!(selector, "No interstitial overlay shown");
                return false;
            }
        };

        debug!(selector, "Interstitial overlay found, removing it");
        if let Err(e) = self.doc.remove(overlay).await {
            warn!(error = ?e, "Failed to remove interstitial overlay");
            return false;
        }

        let doc = &self.doc;
        match wait_for_predicate("interstitial overlay gone", policy, || async move {
            doc.is_hidden(overlay).await
        })
        .await
        {
            Ok(()) => {
                info!("Interstitial overlay closed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Interstitial overlay still visible, continuing");
                false
            }
        }
    }

    /// Disable every category, then enable exactly the target one.
    ///
    /// Both steps wait for the checkbox state to converge; the page applies
    /// clicks asynchronously.
    pub async fn isolate_category(
        &self,
        off_selector: &str,
        target_checkbox_selector: &str,
    ) -> Result<(), ScrapeError> {
        info!(off_selector, "Turning off all categories");
        let off = self.locate(off_selector, "locate disable-all control").await?;
        self.doc.click(off).await.map_err(|source| ScrapeError::Filter {
            step: "click disable-all control",
            source,
        })?;
        self.await_checked(target_checkbox_selector, false, "target checkbox unchecked")
            .await?;
        info!("All categories are unchecked");

        info!(target_checkbox_selector, "Turning on target category");
        let target = self
            .locate(target_checkbox_selector, "locate target checkbox")
            .await?;
        self.doc.click(target).await.map_err(|source| ScrapeError::Filter {
            step: "click target checkbox",
            source,
        })?;
        self.await_checked(target_checkbox_selector, true, "target checkbox checked")
            .await?;
        info!("Target category is checked");
        Ok(())
    }

    async fn locate(&self, selector: &str, step: &'static str) -> Result<NodeRef, ScrapeError> {
        match self.doc.query_one(selector, None).await {
            Ok(Some(node)) => Ok(node),
            Ok(None) => Err(ScrapeError::Filter {
                step,
                source: anyhow!("no element matches {selector:?}"),
            }),
            Err(source) => Err(ScrapeError::Filter { step, source }),
        }
    }

    async fn await_checked(
        &self,
        selector: &str,
        expected: bool,
        step: &'static str,
    ) -> Result<(), ScrapeError> {
        let doc = &self.doc;
        wait_for_predicate(step, self.global_policy(), || async move {
            // Re-query every poll; the filter panel may re-render the checkbox.
            let state = match doc.query_one(selector, None).await? {
                Some(node) => doc.is_checked(node).await?,
                None => None,
            };
            Ok(state == Some(expected))
        })
        .await
        .map_err(|e| ScrapeError::Filter {
            step,
            source: e.into(),
        })
    }

    /// Tear the session down, releasing the browser.
    pub async fn close(self) {
        match self.doc.close().await {
            Ok(()) => debug!("Session closed"),
            Err(e) => warn!(error = ?e, "Failed to close session cleanly"),
        }
    }
}

//! Fatal error taxonomy for an extraction run.
//!
//! Only the variants here abort a run. Per-row degradations (missing chart,
//! wrong tooltip, malformed header) are absorbed by the probe and walker and
//! never reach this type.

use std::fmt;

use crate::wait::WaitTimeout;

/// Pipeline stage a fatal error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Browser,
    Navigation,
    Filter,
    Materialize,
    Walk,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Navigation => "navigation",
            Self::Filter => "filter",
            Self::Materialize => "materialize",
            Self::Walk => "walk",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Failed to start browser session")]
    Browser(#[source] anyhow::Error),
    #[error("Failed to load {url}")]
    Navigation {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Category filter did not converge: {step}")]
    Filter {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("Ranking list never grew past {initial} rows")]
    ListLoad {
        initial: usize,
        #[source]
        source: WaitTimeout,
    },
    #[error(transparent)]
    Structure(#[from] StructureError),
    #[error("Removal of {what} was never confirmed")]
    Teardown {
        what: &'static str,
        #[source]
        source: WaitTimeout,
    },
    #[error("Document access failed during the walk")]
    Document(#[source] anyhow::Error),
}

impl ScrapeError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Browser(_) => Stage::Browser,
            Self::Navigation { .. } => Stage::Navigation,
            Self::Filter { .. } => Stage::Filter,
            Self::ListLoad { .. } => Stage::Materialize,
            Self::Structure(_) | Self::Teardown { .. } | Self::Document(_) => Stage::Walk,
        }
    }
}

/// The materialized rows do not have the fixed grouping shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructureError {
    #[error("{rows} institute rows cannot form groups of three")]
    RowGroupShape { rows: usize },
    #[error("{rows} professor rows cannot form pairs")]
    PersonPairShape { rows: usize },
    #[error("handle was already consumed")]
    Consumed,
}

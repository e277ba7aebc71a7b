//! Walks the materialized ranking table group by group.
//!
//! The table is a flat list of rows with a fixed shape: every institute spans
//! three rows (header, chart slot, professor list slot), and every professor
//! inside an expanded list spans two (professor row, chart slot). Each group is
//! probed and then removed from the page before the next one is touched.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::document::{DocumentAccessor, NodeRef};
use crate::error::{ScrapeError, StructureError};
use crate::probe::MetricProbe;
use crate::report::{MetricRecord, rank_by_count};
use crate::session::Session;
use crate::wait::wait_for_predicate;

/// Header cells: rank, name, and at least one count column.
const MIN_HEADER_COLUMNS: usize = 3;
const RANK_COLUMN: usize = 0;
const NAME_COLUMN: usize = 1;

/// The three rows making up one institute.
#[derive(Debug)]
pub struct RowGroup {
    header: NodeRef,
    chart_slot: NodeRef,
    person_slot: NodeRef,
    consumed: bool,
}

impl RowGroup {
    /// Split rows into groups of three, in document order.
    pub fn partition(rows: &[NodeRef]) -> Result<Vec<Self>, StructureError> {
        if rows.len() % 3 != 0 {
            return Err(StructureError::RowGroupShape { rows: rows.len() });
        }
        Ok(rows
            .chunks_exact(3)
            .map(|chunk| Self {
                header: chunk[0],
                chart_slot: chunk[1],
                person_slot: chunk[2],
                consumed: false,
            })
            .collect())
    }

    /// `(header, chart_slot, person_slot)`, unless the group was already torn down.
    pub fn handles(&self) -> Result<(NodeRef, NodeRef, NodeRef), StructureError> {
        if self.consumed {
            return Err(StructureError::Consumed);
        }
        Ok((self.header, self.chart_slot, self.person_slot))
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }
}

/// A professor row and the slot its chart renders into.
#[derive(Debug)]
pub struct PersonRowPair {
    person: NodeRef,
    chart_slot: NodeRef,
    consumed: bool,
}

impl PersonRowPair {
    pub fn partition(rows: &[NodeRef]) -> Result<Vec<Self>, StructureError> {
        if rows.len() % 2 != 0 {
            return Err(StructureError::PersonPairShape { rows: rows.len() });
        }
        Ok(rows
            .chunks_exact(2)
            .map(|chunk| Self {
                person: chunk[0],
                chart_slot: chunk[1],
                consumed: false,
            })
            .collect())
    }

    pub fn handles(&self) -> Result<(NodeRef, NodeRef), StructureError> {
        if self.consumed {
            return Err(StructureError::Consumed);
        }
        Ok((self.person, self.chart_slot))
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }
}

/// Identity read from an institute's header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstituteHeader {
    pub rank: Option<u32>,
    pub name: String,
}

pub struct Walker<'s, D, P> {
    session: &'s Session<D>,
    probe: &'s P,
}

impl<'s, D: DocumentAccessor, P: MetricProbe> Walker<'s, D, P> {
    pub fn new(session: &'s Session<D>, probe: &'s P) -> Self {
        Self { session, probe }
    }

    /// Probe every institute group and return records for those with a nonzero total.
    pub async fn walk_institutes(&self) -> Result<Vec<MetricRecord>, ScrapeError> {
        let doc = self.session.doc();
        let rows = doc
            .query_all(&self.session.config().selectors.rows, None)
            .await
            .map_err(ScrapeError::Document)?;
        let mut groups = RowGroup::partition(&rows)?;
        info!(institutes = groups.len(), "Walking institutes");

        let mut records = Vec::new();
        for (index, group) in groups.iter_mut().enumerate() {
            let (header, chart_slot, person_slot) = group.handles()?;
            let outcome = self.walk_group(header, chart_slot, person_slot).await;

            // Tear down before acting on the outcome so a failed group never lingers.
            group.consumed = true;
            self.remove_confirmed(&[header, person_slot], "institute rows")
                .await?;

            if let Some(record) = outcome? {
                info!(
                    index,
                    institute = record.name.as_str(),
                    rank = record.rank,
                    total = record.total,
                    professors = record.professors.as_ref().map_or(0, IndexMap::len),
                    "Institute probed"
                );
                records.push(record);
            }
        }

        info!(
            institutes = groups.len(),
            with_counts = records.len(),
            "Institute walk complete"
        );
        Ok(records)
    }

    async fn walk_group(
        &self,
        header: NodeRef,
        chart_slot: NodeRef,
        person_slot: NodeRef,
    ) -> Result<Option<MetricRecord>, ScrapeError> {
        let Some(institute) = self.read_header(header).await else {
            return Ok(None);
        };

        let total = self.probe.probe(chart_slot, header).await;
        if total <= 0.0 {
            debug!(institute = institute.name.as_str(), "No count for category");
            return Ok(None);
        }

        let mut record = MetricRecord::new(institute.name, institute.rank, total);
        if self.expand(header, person_slot).await {
            record.professors = Some(self.walk_professors(person_slot).await?);
        }
        Ok(Some(record))
    }

    /// Read rank and name from a header row; `None` skips the group.
    pub async fn read_header(&self, header: NodeRef) -> Option<InstituteHeader> {
        let doc = self.session.doc();
        let selectors = &self.session.config().selectors;

        let cells = match doc.query_all(&selectors.header_cells, Some(header)).await {
            Ok(cells) => cells,
            Err(e) => {
                warn!(%header, error = ?e, "Failed to read header cells, skipping group");
                return None;
            }
        };
        if cells.len() < MIN_HEADER_COLUMNS {
            warn!(
                %header,
                columns = cells.len(),
                expected = MIN_HEADER_COLUMNS,
                "Malformed header row, skipping group"
            );
            return None;
        }

        let name_cell = cells[NAME_COLUMN];
        let name = match doc.text_of(&selectors.institute_name, Some(name_cell)).await {
            Ok(Some(name)) => Some(name),
            Ok(None) => doc.text(name_cell).await.ok().flatten(),
            Err(e) => {
                warn!(%header, error = ?e, "Failed to read institute name");
                None
            }
        };
        let Some(name) = name.map(|n| normalize_name(&n)).filter(|n| !n.is_empty()) else {
            warn!(%header, "Header row has no institute name, skipping group");
            return None;
        };

        let rank = doc
            .text(cells[RANK_COLUMN])
            .await
            .ok()
            .flatten()
            .and_then(|text| text.trim().parse().ok());

        Some(InstituteHeader { rank, name })
    }

    /// Open the professor list under `header`. Returns whether it became visible.
    async fn expand(&self, header: NodeRef, person_slot: NodeRef) -> bool {
        let doc = self.session.doc();
        let config = self.session.config();

        let control = match doc
            .query_one(&config.selectors.expand_control, Some(header))
            .await
        {
            Ok(Some(control)) => control,
            Ok(None) => {
                warn!(%header, "No expand control, skipping professors");
                return false;
            }
            Err(e) => {
                warn!(%header, error = ?e, "Failed to locate expand control, skipping professors");
                return false;
            }
        };
        if let Err(e) = doc.click(control).await {
            warn!(%header, error = ?e, "Failed to click expand control, skipping professors");
            return false;
        }

        match wait_for_predicate(
            "professor list visible",
            self.session.policy(config.timeouts.chart),
            || async move { doc.is_visible(person_slot).await },
        )
        .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(%header, error = %e, "Professor list never opened, skipping professors");
                false
            }
        }
    }

    /// Probe every professor in an expanded list, highest count first.
    pub async fn walk_professors(
        &self,
        slot: NodeRef,
    ) -> Result<IndexMap<String, f64>, ScrapeError> {
        let doc = self.session.doc();
        let selectors = &self.session.config().selectors;

        let rows = doc
            .query_all(&selectors.person_rows, Some(slot))
            .await
            .map_err(ScrapeError::Document)?;
        let mut pairs = PersonRowPair::partition(&rows)?;
        debug!(%slot, professors = pairs.len(), "Walking professors");

        let mut counts = Vec::with_capacity(pairs.len());
        for pair in pairs.iter_mut() {
            let (person, chart_slot) = pair.handles()?;

            let name = match doc.text_of(&selectors.person_name, Some(person)).await {
                Ok(name) => name.map(|n| normalize_name(&n)).filter(|n| !n.is_empty()),
                Err(e) => {
                    warn!(%person, error = ?e, "Failed to read professor name");
                    None
                }
            };
            let count = match &name {
                Some(_) => self.probe.probe(chart_slot, person).await,
                None => 0.0,
            };

            pair.consumed = true;
            self.remove_confirmed(&[person, chart_slot], "professor rows")
                .await?;

            if let Some(name) = name.filter(|_| count > 0.0) {
                debug!(professor = name.as_str(), count, "Professor probed");
                counts.push((name, count));
            }
        }

        Ok(rank_by_count(counts))
    }

    /// Remove `nodes` and wait until all of them report hidden.
    async fn remove_confirmed(
        &self,
        nodes: &[NodeRef],
        what: &'static str,
    ) -> Result<(), ScrapeError> {
        let doc = self.session.doc();
        for &node in nodes {
            if let Err(e) = doc.remove(node).await {
                warn!(%node, error = ?e, "Failed to remove {what}");
            }
        }

        wait_for_predicate(what, self.session.global_policy(), || async move {
            for &node in nodes {
                if !doc.is_hidden(node).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        })
        .await
        .map_err(|source| ScrapeError::Teardown { what, source })
    }
}

/// Collapse runs of whitespace, including the non-breaking spaces the page
/// puts between a row's toggle glyph and its label.
fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

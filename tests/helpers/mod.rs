//! In-memory page fixture for driving the pipeline without a browser.
#![allow(dead_code)]

use anyhow::{Result, bail};
use async_trait::async_trait;
use rankprobe::config::{Config, Timeouts};
use rankprobe::document::{BoundingBox, DocumentAccessor, NodeRef, Point, ScrollTarget};
use rankprobe::probe::MetricProbe;
use rankprobe::session::Session;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Chart surfaces all render at this box; each is removed before the next appears.
pub const CHART_BOX: BoundingBox = BoundingBox {
    left: 100.0,
    top: 50.0,
    width: 500.0,
    height: 300.0,
};

/// What a click on a node does to the page.
#[derive(Debug, Clone, Copy)]
pub enum Effect {
    Attach(NodeRef),
    Show(NodeRef),
    SetChecked(NodeRef, bool),
    Toggle(NodeRef),
}

#[derive(Debug, Default)]
struct Node {
    parent: Option<NodeRef>,
    selectors: Vec<String>,
    text: Option<String>,
    bbox: Option<BoundingBox>,
    attached: bool,
    visible: bool,
    checked: Option<bool>,
    on_click: Vec<Effect>,
    /// Chart surfaces raise this (label, value) tooltip when hovered
    tooltip: Option<(String, String)>,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<Node>,
    scroll_batches: VecDeque<Vec<NodeRef>>,
    tooltip: Option<(NodeRef, NodeRef, NodeRef)>,
    pointer_moves: Vec<Point>,
    clicks: Vec<NodeRef>,
    navigations: Vec<String>,
    fail_navigation: bool,
    navigation_delay: Option<Duration>,
    scrolls: Vec<ScrollTarget>,
    closes: usize,
}

impl State {
    fn node(&self, node: NodeRef) -> &Node {
        &self.nodes[node.0 as usize]
    }

    fn node_mut(&mut self, node: NodeRef) -> &mut Node {
        &mut self.nodes[node.0 as usize]
    }

    /// Attached, and every ancestor attached.
    fn is_live(&self, node: NodeRef) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            let n = self.node(id);
            if !n.attached {
                return false;
            }
            current = n.parent;
        }
        true
    }

    fn is_descendant(&self, node: NodeRef, ancestor: NodeRef) -> bool {
        let mut current = self.node(node).parent;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).parent;
        }
        false
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Attach(node) => self.node_mut(node).attached = true,
            Effect::Show(node) => self.node_mut(node).visible = true,
            Effect::SetChecked(node, checked) => self.node_mut(node).checked = Some(checked),
            Effect::Toggle(node) => {
                let n = self.node_mut(node);
                n.checked = Some(!n.checked.unwrap_or(false));
            }
        }
    }
}

/// Clones share the same page, so a test can keep observing it after the
/// session that owns one copy has been closed.
#[derive(Debug, Default, Clone)]
pub struct FixtureDocument {
    state: Arc<Mutex<State>>,
}

impl FixtureDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attached, visible node matching `selectors`.
    pub fn add(&self, parent: Option<NodeRef>, selectors: &[&str]) -> NodeRef {
        let mut state = self.state.lock().unwrap();
        let id = NodeRef(state.nodes.len() as u64);
        state.nodes.push(Node {
            parent,
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            attached: true,
            visible: true,
            ..Node::default()
        });
        id
    }

    pub fn add_text(&self, parent: Option<NodeRef>, selectors: &[&str], text: &str) -> NodeRef {
        let node = self.add(parent, selectors);
        self.set_text(node, text);
        node
    }

    pub fn set_text(&self, node: NodeRef, text: &str) {
        self.state.lock().unwrap().node_mut(node).text = Some(text.to_string());
    }

    pub fn set_attached(&self, node: NodeRef, attached: bool) {
        self.state.lock().unwrap().node_mut(node).attached = attached;
    }

    pub fn set_visible(&self, node: NodeRef, visible: bool) {
        self.state.lock().unwrap().node_mut(node).visible = visible;
    }

    pub fn set_checked(&self, node: NodeRef, checked: bool) {
        self.state.lock().unwrap().node_mut(node).checked = Some(checked);
    }

    pub fn set_bbox(&self, node: NodeRef, bbox: BoundingBox) {
        self.state.lock().unwrap().node_mut(node).bbox = Some(bbox);
    }

    pub fn on_click(&self, node: NodeRef, effect: Effect) {
        self.state.lock().unwrap().node_mut(node).on_click.push(effect);
    }

    pub fn fail_navigation(&self) {
        self.state.lock().unwrap().fail_navigation = true;
    }

    /// Make navigation take `delay` before it returns.
    pub fn delay_navigation(&self, delay: Duration) {
        self.state.lock().unwrap().navigation_delay = Some(delay);
    }

    /// Nodes attached by the next scroll to the bottom.
    pub fn queue_scroll_batch(&self, nodes: Vec<NodeRef>) {
        for &node in &nodes {
            self.set_attached(node, false);
        }
        self.state.lock().unwrap().scroll_batches.push_back(nodes);
    }

    /// Add the shared tooltip element, detached until a chart is hovered.
    pub fn add_tooltip(&self, config: &Config) -> NodeRef {
        let selectors = &config.selectors;
        let tooltip = self.add(None, &[&selectors.tooltip]);
        let label = self.add(Some(tooltip), &[&selectors.tooltip_label]);
        let value = self.add(Some(tooltip), &[&selectors.tooltip_value]);
        self.set_attached(tooltip, false);
        self.state.lock().unwrap().tooltip = Some((tooltip, label, value));
        tooltip
    }

    /// Add a chart surface under `slot` that renders when `reveal` is clicked.
    ///
    /// `tooltip` is the (label, value) text shown when the surface is hovered;
    /// `None` leaves the surface without any hover response.
    pub fn add_chart(
        &self,
        config: &Config,
        slot: NodeRef,
        reveal: NodeRef,
        tooltip: Option<(&str, &str)>,
    ) -> NodeRef {
        let surface = self.add(Some(slot), &[&config.selectors.chart_surface]);
        self.set_bbox(surface, CHART_BOX);
        self.set_attached(surface, false);
        {
            let mut state = self.state.lock().unwrap();
            state.node_mut(surface).tooltip =
                tooltip.map(|(label, value)| (label.to_string(), value.to_string()));
        }
        self.on_click(reveal, Effect::Attach(surface));
        surface
    }

    pub fn is_live(&self, node: NodeRef) -> bool {
        self.state.lock().unwrap().is_live(node)
    }

    pub fn pointer_moves(&self) -> Vec<Point> {
        self.state.lock().unwrap().pointer_moves.clone()
    }

    pub fn clicks(&self) -> Vec<NodeRef> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn scrolls(&self) -> Vec<ScrollTarget> {
        self.state.lock().unwrap().scrolls.clone()
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl DocumentAccessor for FixtureDocument {
    async fn navigate(&self, url: &str) -> Result<()> {
        let (fail, delay) = {
            let mut state = self.state.lock().unwrap();
            state.navigations.push(url.to_string());
            (state.fail_navigation, state.navigation_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            bail!("net::ERR_CONNECTION_REFUSED");
        }
        Ok(())
    }

    async fn query_all(&self, selector: &str, scope: Option<NodeRef>) -> Result<Vec<NodeRef>> {
        let state = self.state.lock().unwrap();
        if let Some(scope) = scope
            && !state.is_live(scope)
        {
            return Ok(Vec::new());
        }
        Ok((0..state.nodes.len())
            .map(|i| NodeRef(i as u64))
            .filter(|&id| state.node(id).selectors.iter().any(|s| s == selector))
            .filter(|&id| state.is_live(id))
            .filter(|&id| scope.is_none_or(|scope| state.is_descendant(id, scope)))
            .collect())
    }

    async fn click(&self, node: NodeRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.is_live(node) {
            bail!("{node} is detached");
        }
        state.clicks.push(node);
        let effects = state.node(node).on_click.clone();
        for effect in effects {
            state.apply(effect);
        }
        Ok(())
    }

    async fn move_pointer(&self, point: Point) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.pointer_moves.push(point);

        let hovered = (0..state.nodes.len())
            .map(|i| NodeRef(i as u64))
            .filter(|&id| state.is_live(id))
            .find_map(|id| {
                let node = state.node(id);
                match (&node.tooltip, node.bbox) {
                    (Some(tooltip), Some(bbox)) if bbox.contains(point) => Some(tooltip.clone()),
                    _ => None,
                }
            });

        if let (Some((label, value)), Some((tooltip, label_node, value_node))) =
            (hovered, state.tooltip)
        {
            state.node_mut(tooltip).attached = true;
            state.node_mut(label_node).text = Some(label);
            state.node_mut(value_node).text = Some(value);
        }
        Ok(())
    }

    async fn bounding_box(&self, node: NodeRef) -> Result<Option<BoundingBox>> {
        let state = self.state.lock().unwrap();
        Ok(state.is_live(node).then(|| state.node(node).bbox).flatten())
    }

    async fn text(&self, node: NodeRef) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .is_live(node)
            .then(|| state.node(node).text.clone())
            .flatten())
    }

    async fn is_checked(&self, node: NodeRef) -> Result<Option<bool>> {
        let state = self.state.lock().unwrap();
        Ok(state.is_live(node).then(|| state.node(node).checked).flatten())
    }

    async fn is_visible(&self, node: NodeRef) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.is_live(node) && state.node(node).visible)
    }

    async fn remove(&self, node: NodeRef) -> Result<()> {
        self.state.lock().unwrap().node_mut(node).attached = false;
        Ok(())
    }

    async fn scroll_to(&self, target: ScrollTarget) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.scrolls.push(target);
        if let ScrollTarget::Bottom(_) = target
            && let Some(batch) = state.scroll_batches.pop_front()
        {
            for node in batch {
                state.node_mut(node).attached = true;
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

/// Default configuration with waits shortened for tests.
pub fn test_config() -> Config {
    Config {
        timeouts: Timeouts {
            global: Duration::from_millis(300),
            interstitial: Duration::from_millis(30),
            chart: Duration::from_millis(60),
            tooltip: Duration::from_millis(60),
            poll_interval: Duration::from_millis(5),
            list_settle: Duration::from_millis(40),
        },
        ..Config::default()
    }
}

pub fn session(doc: FixtureDocument) -> Session<FixtureDocument> {
    Session::new(doc, test_config())
}

/// One professor inside an institute's list.
pub struct ProfessorSpec<'a> {
    pub name: &'a str,
    pub tooltip: Option<(&'a str, &'a str)>,
}

/// One institute group of the ranking table.
pub struct InstituteSpec<'a> {
    pub rank: &'a str,
    pub name: &'a str,
    pub tooltip: Option<(&'a str, &'a str)>,
    pub professors: Vec<ProfessorSpec<'a>>,
    /// Header cells to render; fewer than three is malformed
    pub columns: usize,
    pub expandable: bool,
}

impl<'a> InstituteSpec<'a> {
    pub fn new(rank: &'a str, name: &'a str, tooltip: Option<(&'a str, &'a str)>) -> Self {
        Self {
            rank,
            name,
            tooltip,
            professors: Vec::new(),
            columns: 4,
            expandable: true,
        }
    }

    pub fn professor(mut self, name: &'a str, tooltip: Option<(&'a str, &'a str)>) -> Self {
        self.professors.push(ProfessorSpec { name, tooltip });
        self
    }
}

/// Handles to one institute's rows as built by [`build_ranking`].
#[derive(Debug, Clone)]
pub struct InstituteRows {
    pub header: NodeRef,
    pub chart_slot: NodeRef,
    pub person_slot: NodeRef,
    pub professor_rows: Vec<NodeRef>,
}

/// Build a ranking table shaped like the live page under the default selectors.
pub fn build_ranking(
    doc: &FixtureDocument,
    config: &Config,
    institutes: &[InstituteSpec<'_>],
) -> Vec<InstituteRows> {
    let s = &config.selectors;
    let root = doc.add(None, &[&s.list_root]);
    doc.add_tooltip(config);

    institutes
        .iter()
        .map(|spec| {
            let row_selectors = [s.rows.as_str(), s.all_rows.as_str()];

            let header = doc.add(Some(root), &row_selectors);
            let cells: Vec<NodeRef> = (0..spec.columns)
                .map(|_| doc.add(Some(header), &[&s.header_cells]))
                .collect();
            if let Some(&rank_cell) = cells.first() {
                doc.set_text(rank_cell, spec.rank);
            }
            let name_holder = cells.get(1).copied().unwrap_or(header);
            doc.add_text(Some(name_holder), &[&s.institute_name], spec.name);
            let reveal = doc.add(Some(name_holder), &[&s.chart_reveal]);

            let chart_slot = doc.add(Some(root), &row_selectors);
            doc.add_chart(config, chart_slot, reveal, spec.tooltip);

            let person_slot = doc.add(Some(root), &row_selectors);
            doc.set_visible(person_slot, false);
            if spec.expandable {
                let expand = doc.add(Some(name_holder), &[&s.expand_control]);
                doc.on_click(expand, Effect::Show(person_slot));
            }

            let mut professor_rows = Vec::new();
            for professor in &spec.professors {
                let person = doc.add(Some(person_slot), &[&s.person_rows]);
                doc.add_text(Some(person), &[&s.person_name], professor.name);
                let person_reveal = doc.add(Some(person), &[&s.chart_reveal]);
                let person_chart = doc.add(Some(person_slot), &[&s.person_rows]);
                doc.add_chart(config, person_chart, person_reveal, professor.tooltip);
                professor_rows.extend([person, person_chart]);
            }

            InstituteRows {
                header,
                chart_slot,
                person_slot,
                professor_rows,
            }
        })
        .collect()
}

/// Probe returning scripted counts in call order, then zero.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    counts: Mutex<VecDeque<f64>>,
    calls: Mutex<Vec<(NodeRef, NodeRef)>>,
}

impl ScriptedProbe {
    pub fn new(counts: impl IntoIterator<Item = f64>) -> Self {
        Self {
            counts: Mutex::new(counts.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(NodeRef, NodeRef)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricProbe for ScriptedProbe {
    async fn probe(&self, chart_slot: NodeRef, owner_row: NodeRef) -> f64 {
        self.calls.lock().unwrap().push((chart_slot, owner_row));
        self.counts.lock().unwrap().pop_front().unwrap_or(0.0)
    }
}

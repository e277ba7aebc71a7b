//! Runtime configuration.
//!
//! Values come from an optional TOML file merged under `RANKPROBE_`-prefixed
//! environment variables. Nested tables are addressed with `__`, so
//! `RANKPROBE_TIMEOUTS__GLOBAL=5m` overrides `timeouts.global`.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for a single extraction run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base level for this crate's log events (`trace`..`error`)
    pub log_level: String,
    /// Page holding the ranking table
    pub target_url: String,
    pub category: CategoryConfig,
    pub browser: BrowserConfig,
    pub timeouts: Timeouts,
    pub selectors: Selectors,
    /// Report destination; stdout when absent
    pub output: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            target_url: "https://csrankings.org/".to_string(),
            category: CategoryConfig::default(),
            browser: BrowserConfig::default(),
            timeouts: Timeouts::default(),
            selectors: Selectors::default(),
            output: None,
        }
    }
}

impl Config {
    /// Load configuration from `path` (ignored if missing) and the environment.
    pub fn load(path: &Path) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RANKPROBE_").split("__"))
            .extract()
    }
}

/// The single category isolated before extraction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    /// Label the chart tooltip shows for this category
    pub label: String,
    /// Checkbox enabling the category
    pub checkbox: String,
    /// Control that disables every interdisciplinary category at once
    pub disable_all: String,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            label: "HCI".to_string(),
            checkbox: "#chi".to_string(),
            disable_all: "#other_areas_off".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

/// Every wait in the pipeline is bounded by one of these.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Navigation, filter convergence, list growth and teardown confirmation
    #[serde(deserialize_with = "deserialize_duration")]
    pub global: Duration,
    /// The interstitial overlay is often absent, so this stays short
    #[serde(deserialize_with = "deserialize_duration")]
    pub interstitial: Duration,
    /// Chart surface render after clicking the reveal control
    #[serde(deserialize_with = "deserialize_duration")]
    pub chart: Duration,
    /// Tooltip render after the pointer move
    #[serde(deserialize_with = "deserialize_duration")]
    pub tooltip: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub poll_interval: Duration,
    /// How long the row count must hold still before the list counts as loaded
    #[serde(deserialize_with = "deserialize_duration")]
    pub list_settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            global: Duration::from_secs(240),
            interstitial: Duration::from_secs(3),
            chart: Duration::from_secs(5),
            tooltip: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            list_settle: Duration::from_secs(1),
        }
    }
}

/// CSS selectors describing the page's structural contract.
///
/// Selectors marked "scoped" are resolved relative to the element named in
/// their doc comment rather than the whole document.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// Root ranking table; its presence marks the page as loaded
    pub list_root: String,
    /// Every loaded row; used to watch the lazy list grow
    pub all_rows: String,
    /// Top-level rows, three per institute
    pub rows: String,
    /// Scoped to a header row
    pub header_cells: String,
    /// Scoped to the header's name cell
    pub institute_name: String,
    /// Scoped to a header row; expands the professor list
    pub expand_control: String,
    /// Scoped to a header or professor row; reveals that row's chart
    pub chart_reveal: String,
    /// Scoped to a chart slot
    pub chart_surface: String,
    pub tooltip: String,
    pub tooltip_label: String,
    pub tooltip_value: String,
    /// Scoped to a professor list slot, two per professor
    pub person_rows: String,
    /// Scoped to a professor row
    pub person_name: String,
    pub interstitial: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            list_root: "#ranking".to_string(),
            all_rows: "#ranking tr".to_string(),
            rows: "#ranking > tbody > tr".to_string(),
            header_cells: ":scope > td".to_string(),
            institute_name: "span.hovertip, a".to_string(),
            expand_control: "span[id$='-widget']".to_string(),
            chart_reveal: "span[id$='-chartwidget']".to_string(),
            chart_surface: "svg.marks, canvas.marks".to_string(),
            tooltip: "#vg-tooltip-element".to_string(),
            tooltip_label: "#vg-tooltip-element tr:nth-child(1) td.value".to_string(),
            tooltip_value: "#vg-tooltip-element tr:nth-child(2) td.value".to_string(),
            person_rows: ":scope tbody > tr".to_string(),
            person_name: "a".to_string(),
            interstitial: "#overlay-sponsor".to_string(),
        }
    }
}

/// Accepts `"240s"`, `"4m"`, `"150ms"` or a bare number of seconds.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl serde::de::Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a duration such as \"30s\" or a number of seconds")
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom(format!("duration cannot be negative: {v}")))
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Duration, E> {
            parse_duration(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let parsed = fundu::DurationParser::with_all_time_units()
        .parse(s.trim())
        .map_err(|e| format!("invalid duration {s:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {s:?}: {e}"))
}

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Upper bound for any per-input quantity. Storefront pack inputs reject
/// anything above two digits, so every strategy output is clamped to this.
pub const MAX_QUANTITY: u32 = 99;

/// Current schema version. Stored records carrying a different version are
/// merged over defaults and re-stamped; there is no migration machinery.
pub const CONFIG_VERSION: u32 = 3;

/// How inputs are targeted for a fill pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Fill the first `target_count` inputs.
    Fixed,
    /// Fill the first `target_count` inputs (quantities vary per pattern).
    Random,
    /// Fill every visible input; `target_count` is ignored.
    Unlimited,
}

/// Persisted panel placement. CSS lengths or the literal "auto"; the core
/// never interprets these, it only round-trips them for the settings panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PanelPosition {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Default for PanelPosition {
    fn default() -> Self {
        Self {
            top: "auto".into(),
            right: "16px".into(),
            bottom: "auto".into(),
            left: "auto".into(),
        }
    }
}

/// Timing knobs for the auto-load loop. All bounds are forced finite by
/// [`PackConfig::validate`] so the loop provably terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderParams {
    /// Interval between document-height polls within one scroll attempt.
    pub poll_interval_ms: u64,
    /// Height polls per scroll attempt before the attempt counts as stalled.
    pub polls_per_attempt: u32,
    /// Delay between a detected growth and the next scroll.
    pub scroll_delay_ms: u64,
    /// Hard cap on scroll attempts, growth or not.
    pub max_attempts: u32,
}

impl Default for LoaderParams {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            polls_per_attempt: 10,
            scroll_delay_ms: 600,
            max_attempts: 30,
        }
    }
}

/// The whole persisted configuration record, one JSON document per store key.
///
/// Field names persist in camelCase (the original panel wrote the record that
/// way and existing stores must keep loading). Missing fields merge over
/// defaults; a record that does not parse at all is discarded wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackConfig {
    pub version: u32,
    pub fill_mode: FillMode,
    /// Desired number of inputs to fill in Fixed/Random modes.
    pub target_count: u32,
    pub fixed_quantity: u32,
    pub min_quantity: u32,
    pub max_quantity: u32,
    pub clear_before_fill: bool,
    /// Running-total cap across one fill batch; 0 = unlimited.
    pub max_total_amount: u64,
    /// Strategy name: "fixed", "random" or "noise". Unknown names fall back
    /// to "random" with a logged warning.
    pub pattern_type: String,
    /// Explicit noise seed; derived from the clock when absent.
    pub noise_seed: Option<u64>,
    pub noise_scale: f64,
    pub noise_intensity: f64,
    pub panel_visible: bool,
    pub panel_position: PanelPosition,
    pub dark_mode: bool,
    /// Page the CLI navigates to when no URL argument is given.
    pub target_url: String,
    /// Selector for the pack quantity inputs.
    pub input_selector: String,
    /// Selector for the page's "load more" affordance, if it has one.
    pub load_more_selector: Option<String>,
    pub auto_load: bool,
    pub auto_fill_on_load: bool,
    pub loader: LoaderParams,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            fill_mode: FillMode::Fixed,
            target_count: 10,
            fixed_quantity: 1,
            min_quantity: 1,
            max_quantity: 5,
            clear_before_fill: false,
            max_total_amount: 0,
            pattern_type: "fixed".into(),
            noise_seed: None,
            noise_scale: 3.0,
            noise_intensity: 1.0,
            panel_visible: true,
            panel_position: PanelPosition::default(),
            dark_mode: false,
            target_url: String::new(),
            input_selector: "input[type=number]".into(),
            load_more_selector: None,
            auto_load: true,
            auto_fill_on_load: false,
            loader: LoaderParams::default(),
        }
    }
}

impl PackConfig {
    /// Parse a stored record. Absent or corrupt data falls back to defaults,
    /// a version mismatch is logged and re-stamped; the result is always
    /// validated. This never fails.
    pub fn from_json(json: &str) -> Self {
        let mut cfg = match serde_json::from_str::<PackConfig>(json) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %e, "stored config did not parse, using defaults");
                PackConfig::default()
            }
        };
        if cfg.version != CONFIG_VERSION {
            warn!(
                stored = cfg.version,
                current = CONFIG_VERSION,
                "config version mismatch, re-stamping"
            );
        }
        cfg.version = CONFIG_VERSION;
        cfg.validate();
        cfg
    }

    /// Clamp every field into its legal range. Runs after every load and
    /// after every mutation from the outside; must never panic.
    pub fn validate(&mut self) {
        self.fixed_quantity = self.fixed_quantity.min(MAX_QUANTITY);
        self.min_quantity = self.min_quantity.min(MAX_QUANTITY);
        self.max_quantity = self.max_quantity.min(MAX_QUANTITY);
        if self.min_quantity > self.max_quantity {
            self.min_quantity = self.max_quantity;
        }
        if !self.noise_scale.is_finite() || self.noise_scale <= 0.0 {
            self.noise_scale = 3.0;
        }
        if !self.noise_intensity.is_finite() || self.noise_intensity < 0.0 {
            self.noise_intensity = 1.0;
        }
        if self.input_selector.trim().is_empty() {
            self.input_selector = PackConfig::default().input_selector;
        }
        self.loader.polls_per_attempt = self.loader.polls_per_attempt.max(1);
        self.loader.max_attempts = self.loader.max_attempts.max(1);
    }

    pub fn to_json(&self) -> String {
        // A plain record with no map keys cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }
}

//! DOM collaborator for pack inputs.
//!
//! All page interaction happens through injected JavaScript IIFEs evaluated
//! over CDP, returning JSON strings. The [`PackPage`] trait is the seam the
//! fill orchestrator and auto-loader work against, so both are testable
//! without a browser.

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

/// One value write in a batched apply pass: `index` is the position of the
/// target among the visible inputs in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityWrite {
    pub index: usize,
    pub quantity: u32,
}

/// Outcome counts of a batched write pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ApplyStats {
    /// Inputs whose value changed (and therefore had events dispatched).
    pub written: usize,
    /// Inputs that already held the target value; no events dispatched.
    pub unchanged: usize,
    /// Write indices with no matching input (page shrank mid-operation).
    pub missing: usize,
}

/// Live page handle the fill and load operations run against.
///
/// Implementations must preserve document order in `collect_inputs` and must
/// only dispatch change signaling for writes that actually change a value.
#[allow(async_fn_in_trait)]
pub trait PackPage {
    /// Current values of all visible pack inputs, in document order.
    async fn collect_inputs(&self) -> anyhow::Result<Vec<String>>;

    /// Apply the batch in order. Each write sets the input's value and
    /// dispatches bubbling `input` and `change` events, skipping inputs that
    /// already hold the value.
    async fn apply_quantities(&self, writes: &[QuantityWrite]) -> anyhow::Result<ApplyStats>;

    /// Zero every visible input (guarded like `apply_quantities`). Returns
    /// the number of inputs that changed.
    async fn clear_inputs(&self) -> anyhow::Result<usize>;

    /// Current document height in CSS pixels.
    async fn document_height(&self) -> anyhow::Result<u64>;

    /// Scroll the viewport to the bottom of the content.
    async fn scroll_to_bottom(&self) -> anyhow::Result<()>;

    /// Probe the page's "load more" affordance. `None` when the page has no
    /// such affordance (or none is configured); `Some(true)` once it is
    /// hidden or disabled, signaling natural completion.
    async fn load_more_exhausted(&self) -> anyhow::Result<Option<bool>>;
}

// ── Injected JS ─────────────────────────────────────────────────────────────

/// Escape a string for embedding in a single-quoted JS literal.
fn js_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Shared prelude: collect the visible inputs for `selector` into `els`,
/// filtered to elements with a non-zero rendered box, in document order.
fn visible_inputs_js(selector: &str) -> String {
    format!(
        "var els = Array.prototype.filter.call(document.querySelectorAll('{sel}'), function(el) {{ \
            return el.offsetWidth > 0 && el.offsetHeight > 0 && el.getClientRects().length > 0; \
        }});",
        sel = js_escape(selector)
    )
}

/// JS returning a JSON array of the visible inputs' current values.
pub fn collect_inputs_js(selector: &str) -> String {
    format!(
        "(function() {{ {prelude} \
            return JSON.stringify(els.map(function(el) {{ return String(el.value || ''); }})); \
        }})()",
        prelude = visible_inputs_js(selector)
    )
}

/// JS applying a batch of `[index, quantity]` pairs in order. Writes only
/// when the value differs, then dispatches `input` and `change` so page
/// frameworks observing the inputs react. Returns JSON apply stats.
pub fn apply_quantities_js(selector: &str, writes: &[QuantityWrite]) -> String {
    let pairs: Vec<(usize, u32)> = writes.iter().map(|w| (w.index, w.quantity)).collect();
    // Serializing a vec of numeric pairs cannot fail.
    let writes_json = serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".into());
    format!(
        "(function() {{ {prelude} \
            var writes = {writes}; \
            var written = 0, unchanged = 0, missing = 0; \
            for (var i = 0; i < writes.length; i++) {{ \
                var el = els[writes[i][0]]; \
                if (!el) {{ missing++; continue; }} \
                var next = String(writes[i][1]); \
                if (el.value === next) {{ unchanged++; continue; }} \
                el.value = next; \
                el.dispatchEvent(new Event('input', {{bubbles: true}})); \
                el.dispatchEvent(new Event('change', {{bubbles: true}})); \
                written++; \
            }} \
            return JSON.stringify({{written: written, unchanged: unchanged, missing: missing}}); \
        }})()",
        prelude = visible_inputs_js(selector),
        writes = writes_json,
    )
}

/// JS zeroing every visible input, with the same guarded-write rule.
/// Returns the number of inputs that changed, as a JSON number.
pub fn clear_inputs_js(selector: &str) -> String {
    format!(
        "(function() {{ {prelude} \
            var cleared = 0; \
            els.forEach(function(el) {{ \
                if (el.value === '0') return; \
                el.value = '0'; \
                el.dispatchEvent(new Event('input', {{bubbles: true}})); \
                el.dispatchEvent(new Event('change', {{bubbles: true}})); \
                cleared++; \
            }}); \
            return cleared; \
        }})()",
        prelude = visible_inputs_js(selector)
    )
}

/// JS returning the full document height.
pub const DOC_HEIGHT_JS: &str = r#"(function() {
    return Math.max(
        document.body ? document.body.scrollHeight : 0,
        document.documentElement.scrollHeight || 0
    );
})()"#;

/// JS scrolling the viewport to the bottom of the content.
pub const SCROLL_TO_BOTTOM_JS: &str = r#"(function() {
    var h = Math.max(
        document.body ? document.body.scrollHeight : 0,
        document.documentElement.scrollHeight || 0
    );
    window.scrollTo(0, h);
    return h;
})()"#;

/// JS probing the load-more affordance: 'absent', 'active' or 'exhausted'.
pub fn load_more_state_js(selector: &str) -> String {
    format!(
        "(function() {{ \
            var el = document.querySelector('{sel}'); \
            if (!el) return 'absent'; \
            var gone = !(el.offsetWidth > 0 && el.offsetHeight > 0) || el.disabled === true; \
            return gone ? 'exhausted' : 'active'; \
        }})()",
        sel = js_escape(selector)
    )
}

// ── CDP implementation ──────────────────────────────────────────────────────

/// [`PackPage`] over a live `chromiumoxide::Page`. Selectors are frozen from
/// the config snapshot taken when the operation started.
pub struct CdpPage {
    page: chromiumoxide::Page,
    input_selector: String,
    load_more_selector: Option<String>,
}

impl CdpPage {
    pub fn new(
        page: chromiumoxide::Page,
        input_selector: impl Into<String>,
        load_more_selector: Option<String>,
    ) -> Self {
        Self {
            page,
            input_selector: input_selector.into(),
            load_more_selector,
        }
    }

    async fn eval_string(&self, js: &str) -> anyhow::Result<String> {
        let result = self
            .page
            .evaluate(js)
            .await
            .context("script evaluation failed")?;
        result
            .into_value::<String>()
            .context("script returned a non-string result")
    }
}

impl PackPage for CdpPage {
    async fn collect_inputs(&self) -> anyhow::Result<Vec<String>> {
        let json = self
            .eval_string(&collect_inputs_js(&self.input_selector))
            .await?;
        let values: Vec<String> =
            serde_json::from_str(&json).context("malformed input collection result")?;
        debug!(count = values.len(), "collected visible pack inputs");
        Ok(values)
    }

    async fn apply_quantities(&self, writes: &[QuantityWrite]) -> anyhow::Result<ApplyStats> {
        if writes.is_empty() {
            return Ok(ApplyStats::default());
        }
        let json = self
            .eval_string(&apply_quantities_js(&self.input_selector, writes))
            .await?;
        let stats: ApplyStats =
            serde_json::from_str(&json).context("malformed apply result")?;
        debug!(
            written = stats.written,
            unchanged = stats.unchanged,
            missing = stats.missing,
            "applied quantity batch"
        );
        Ok(stats)
    }

    async fn clear_inputs(&self) -> anyhow::Result<usize> {
        let result = self
            .page
            .evaluate(clear_inputs_js(&self.input_selector).as_str())
            .await
            .context("clear pass failed")?;
        let cleared = result
            .into_value::<usize>()
            .context("clear pass returned a non-numeric result")?;
        debug!(cleared = cleared, "cleared visible pack inputs");
        Ok(cleared)
    }

    async fn document_height(&self) -> anyhow::Result<u64> {
        let result = self
            .page
            .evaluate(DOC_HEIGHT_JS)
            .await
            .context("height probe failed")?;
        result
            .into_value::<u64>()
            .context("height probe returned a non-numeric result")
    }

    async fn scroll_to_bottom(&self) -> anyhow::Result<()> {
        self.page
            .evaluate(SCROLL_TO_BOTTOM_JS)
            .await
            .context("scroll failed")?;
        Ok(())
    }

    async fn load_more_exhausted(&self) -> anyhow::Result<Option<bool>> {
        let Some(selector) = &self.load_more_selector else {
            return Ok(None);
        };
        let state = self.eval_string(&load_more_state_js(selector)).await?;
        Ok(match state.as_str() {
            "exhausted" => Some(true),
            "active" => Some(false),
            _ => None,
        })
    }
}

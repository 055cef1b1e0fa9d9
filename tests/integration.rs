use std::sync::{Arc, Mutex};

use packfill::config::{FillMode, LoaderParams, PackConfig, CONFIG_VERSION};
use packfill::feedback::{Feedback, Severity};
use packfill::fill::{fill, run_fill, FillOutcome};
use packfill::loader::{AutoLoader, LoadStatus};
use packfill::page::{ApplyStats, PackPage, QuantityWrite};
use packfill::store::{ConfigStore, KvStore, MemoryStore};

// ── Fakes ───────────────────────────────────────────────────────────────────

/// Scripted page: a vector of input values, a scripted document-height
/// sequence (the last entry repeats once exhausted), and an event log of
/// every change signal a write dispatched.
#[derive(Default)]
struct FakePage {
    inputs: Mutex<Vec<String>>,
    events: Mutex<Vec<(usize, &'static str)>>,
    heights: Mutex<Vec<u64>>,
    height_cursor: Mutex<usize>,
    /// Report strictly increasing heights forever, ignoring the script.
    always_grow: bool,
    load_more: Mutex<Option<bool>>,
    scrolls: Mutex<u32>,
}

impl FakePage {
    fn with_inputs(count: usize) -> Self {
        Self {
            inputs: Mutex::new(vec![String::new(); count]),
            ..Default::default()
        }
    }

    fn with_heights(heights: Vec<u64>) -> Self {
        Self {
            heights: Mutex::new(heights),
            ..Default::default()
        }
    }

    fn values(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }

    fn events_for(&self, index: usize) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| *i == index)
            .count()
    }

    fn touched_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|(i, _)| *i)
            .collect();
        indices.sort();
        indices.dedup();
        indices
    }

    fn write_guarded(&self, index: usize, next: &str) -> bool {
        let mut inputs = self.inputs.lock().unwrap();
        if inputs[index] == next {
            return false;
        }
        inputs[index] = next.to_string();
        let mut events = self.events.lock().unwrap();
        events.push((index, "input"));
        events.push((index, "change"));
        true
    }
}

impl PackPage for FakePage {
    async fn collect_inputs(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.values())
    }

    async fn apply_quantities(&self, writes: &[QuantityWrite]) -> anyhow::Result<ApplyStats> {
        let mut stats = ApplyStats::default();
        for w in writes {
            if w.index >= self.inputs.lock().unwrap().len() {
                stats.missing += 1;
                continue;
            }
            if self.write_guarded(w.index, &w.quantity.to_string()) {
                stats.written += 1;
            } else {
                stats.unchanged += 1;
            }
        }
        Ok(stats)
    }

    async fn clear_inputs(&self) -> anyhow::Result<usize> {
        let count = self.inputs.lock().unwrap().len();
        let mut cleared = 0;
        for index in 0..count {
            if self.write_guarded(index, "0") {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn document_height(&self) -> anyhow::Result<u64> {
        let mut cursor = self.height_cursor.lock().unwrap();
        *cursor += 1;
        if self.always_grow {
            return Ok(*cursor as u64 * 100);
        }
        let heights = self.heights.lock().unwrap();
        if heights.is_empty() {
            return Ok(0);
        }
        let i = (*cursor - 1).min(heights.len() - 1);
        Ok(heights[i])
    }

    async fn scroll_to_bottom(&self) -> anyhow::Result<()> {
        *self.scrolls.lock().unwrap() += 1;
        Ok(())
    }

    async fn load_more_exhausted(&self) -> anyhow::Result<Option<bool>> {
        Ok(*self.load_more.lock().unwrap())
    }
}

/// Feedback sink that records every notice for assertions.
#[derive(Default)]
struct CollectingFeedback {
    notices: Mutex<Vec<(String, String, Severity)>>,
    toasts: Mutex<Vec<(String, Severity)>>,
}

impl CollectingFeedback {
    fn notice_count(&self) -> usize {
        self.notices.lock().unwrap().len()
    }

    fn toast_count(&self) -> usize {
        self.toasts.lock().unwrap().len()
    }
}

impl Feedback for CollectingFeedback {
    fn notify(&self, title: &str, body: &str, severity: Severity, _dark: bool) {
        self.notices
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string(), severity));
    }

    fn toast(&self, message: &str, severity: Severity, _dark: bool) {
        self.toasts
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
    }
}

fn fixed_cfg(target_count: u32, quantity: u32) -> PackConfig {
    let mut cfg = PackConfig::default();
    cfg.fill_mode = FillMode::Fixed;
    cfg.pattern_type = "fixed".into();
    cfg.target_count = target_count;
    cfg.fixed_quantity = quantity;
    cfg.validate();
    cfg
}

fn fast_loader() -> LoaderParams {
    LoaderParams {
        poll_interval_ms: 1,
        polls_per_attempt: 2,
        scroll_delay_ms: 1,
        max_attempts: 50,
    }
}

// ── Fill orchestration ──────────────────────────────────────────────────────

#[tokio::test]
async fn targets_first_n_in_document_order() {
    let page = FakePage::with_inputs(20);
    let cfg = fixed_cfg(5, 7);

    let outcome = fill(&page, &cfg).await.unwrap();
    let FillOutcome::Applied(result) = outcome else {
        panic!("expected an applied outcome, got {outcome:?}");
    };
    assert_eq!(result.targeted_count, 5);
    assert_eq!(result.available_count, 20);
    assert_eq!(result.filled_count, 5);
    assert_eq!(result.total_quantity_applied, 35);

    let values = page.values();
    assert!(values[..5].iter().all(|v| v == "7"));
    assert!(values[5..].iter().all(|v| v.is_empty()));
    assert_eq!(page.touched_indices(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn clear_pass_covers_all_inputs_before_targeting() {
    let page = FakePage::with_inputs(20);
    let mut cfg = fixed_cfg(5, 7);
    cfg.clear_before_fill = true;

    fill(&page, &cfg).await.unwrap();

    let values = page.values();
    assert!(values[..5].iter().all(|v| v == "7"));
    assert!(values[5..].iter().all(|v| v == "0"));
    // Non-targets saw exactly the clear pass: one input + one change event.
    for index in 5..20 {
        assert_eq!(page.events_for(index), 2, "input {index}");
    }
}

#[tokio::test]
async fn unchanged_values_dispatch_no_events() {
    let page = FakePage::with_inputs(5);
    for v in page.inputs.lock().unwrap().iter_mut() {
        *v = "7".into();
    }
    let cfg = fixed_cfg(5, 7);

    let outcome = fill(&page, &cfg).await.unwrap();
    let FillOutcome::Applied(result) = outcome else {
        panic!("expected an applied outcome");
    };
    assert_eq!(result.filled_count, 5);
    assert!(page.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unlimited_mode_fills_every_input() {
    let page = FakePage::with_inputs(8);
    let mut cfg = fixed_cfg(2, 3);
    cfg.fill_mode = FillMode::Unlimited;

    let FillOutcome::Applied(result) = fill(&page, &cfg).await.unwrap() else {
        panic!("expected an applied outcome");
    };
    assert_eq!(result.targeted_count, 8);
    assert!(page.values().iter().all(|v| v == "3"));
}

#[tokio::test]
async fn no_inputs_is_a_noticed_noop() {
    let page = FakePage::with_inputs(0);
    let mut cfg = fixed_cfg(5, 7);
    cfg.fill_mode = FillMode::Unlimited;
    let feedback = CollectingFeedback::default();

    let result = run_fill(&page, &cfg, &feedback).await;
    assert!(result.is_none());
    assert_eq!(feedback.notice_count(), 1);
    let notices = feedback.notices.lock().unwrap();
    assert_eq!(notices[0].2, Severity::Info);
}

#[tokio::test]
async fn zero_target_count_is_a_noticed_noop() {
    let page = FakePage::with_inputs(3);
    let cfg = fixed_cfg(0, 7);

    let outcome = fill(&page, &cfg).await.unwrap();
    assert_eq!(outcome, FillOutcome::NothingTargeted { available: 3 });

    let feedback = CollectingFeedback::default();
    assert!(run_fill(&page, &cfg, &feedback).await.is_none());
    assert_eq!(feedback.notice_count(), 1);
    assert!(page.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn running_total_cap_reduces_then_zeroes() {
    let page = FakePage::with_inputs(10);
    let mut cfg = fixed_cfg(5, 7);
    cfg.max_total_amount = 10;

    let FillOutcome::Applied(result) = fill(&page, &cfg).await.unwrap() else {
        panic!("expected an applied outcome");
    };
    assert_eq!(result.total_quantity_applied, 10);
    let values = page.values();
    assert_eq!(&values[..5], &["7", "3", "0", "0", "0"]);
    assert!(values[5..].iter().all(|v| v.is_empty()));
}

#[tokio::test]
async fn unknown_pattern_falls_back_to_random_bounds() {
    let page = FakePage::with_inputs(6);
    let mut cfg = fixed_cfg(6, 7);
    cfg.pattern_type = "spiral".into();
    cfg.min_quantity = 2;
    cfg.max_quantity = 4;
    cfg.validate();

    let FillOutcome::Applied(_) = fill(&page, &cfg).await.unwrap() else {
        panic!("expected an applied outcome");
    };
    for v in page.values() {
        let q: u32 = v.parse().unwrap();
        assert!((2..=4).contains(&q), "fallback quantity {q} out of [2,4]");
    }
}

#[tokio::test]
async fn noise_pattern_fills_deterministically() {
    let cfg = {
        let mut cfg = fixed_cfg(12, 0);
        cfg.pattern_type = "noise".into();
        cfg.noise_seed = Some(77);
        cfg.min_quantity = 1;
        cfg.max_quantity = 9;
        cfg.validate();
        cfg
    };

    let first = FakePage::with_inputs(12);
    let second = FakePage::with_inputs(12);
    fill(&first, &cfg).await.unwrap();
    fill(&second, &cfg).await.unwrap();
    assert_eq!(first.values(), second.values());
    for v in first.values() {
        let q: u32 = v.parse().unwrap();
        assert!((1..=9).contains(&q));
    }
}

// ── Auto-loader ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn loader_stalls_when_growth_ceases() {
    let mut page = FakePage::with_heights(vec![100, 200, 300, 300]);
    page.inputs = Mutex::new(vec![String::new(); 4]);
    let mut cfg = PackConfig::default();
    cfg.loader = fast_loader();
    let feedback = CollectingFeedback::default();

    let report = AutoLoader::new(&page).run(&cfg, &feedback).await;
    assert_eq!(report.status, LoadStatus::Stalled);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.inputs_before, 4);
    assert_eq!(report.inputs_after, 4);
    assert_eq!(feedback.toast_count(), 1);
}

#[tokio::test]
async fn loader_hits_the_safety_bound_on_endless_growth() {
    let page = FakePage {
        always_grow: true,
        ..Default::default()
    };
    let mut cfg = PackConfig::default();
    cfg.loader = fast_loader();
    cfg.loader.max_attempts = 4;
    let feedback = CollectingFeedback::default();

    let report = AutoLoader::new(&page).run(&cfg, &feedback).await;
    assert_eq!(report.status, LoadStatus::MaxAttemptsReached);
    assert_eq!(report.attempts, 4);
    assert_eq!(*page.scrolls.lock().unwrap(), 4);
    assert_eq!(feedback.toast_count(), 1);
}

#[tokio::test]
async fn loader_disabled_short_circuits() {
    let page = FakePage::with_inputs(6);
    let mut cfg = PackConfig::default();
    cfg.auto_load = false;
    let feedback = CollectingFeedback::default();

    let report = AutoLoader::new(&page).run(&cfg, &feedback).await;
    assert_eq!(report.status, LoadStatus::Disabled);
    assert_eq!(report.attempts, 0);
    assert_eq!(report.inputs_before, 6);
    assert_eq!(*page.scrolls.lock().unwrap(), 0);
    assert_eq!(feedback.toast_count(), 1);
}

#[tokio::test]
async fn loader_stops_when_load_more_is_exhausted() {
    let page = FakePage {
        always_grow: true,
        load_more: Mutex::new(Some(true)),
        ..Default::default()
    };
    let mut cfg = PackConfig::default();
    cfg.loader = fast_loader();
    let feedback = CollectingFeedback::default();

    let report = AutoLoader::new(&page).run(&cfg, &feedback).await;
    assert_eq!(report.status, LoadStatus::Stalled);
    assert_eq!(report.attempts, 1);
}

#[tokio::test]
async fn loader_cancellation_ends_the_run() {
    let page = FakePage {
        always_grow: true,
        ..Default::default()
    };
    let mut cfg = PackConfig::default();
    cfg.loader = fast_loader();
    cfg.loader.poll_interval_ms = 60_000;
    let feedback = CollectingFeedback::default();

    let loader = AutoLoader::new(&page);
    loader.cancellation_token().cancel();
    let report = loader.run(&cfg, &feedback).await;
    assert_eq!(report.status, LoadStatus::Cancelled);
    assert_eq!(feedback.toast_count(), 1);
}

#[tokio::test]
async fn loader_fills_on_growth_when_enabled() {
    let mut page = FakePage::with_heights(vec![100, 200, 200]);
    page.inputs = Mutex::new(vec![String::new(); 3]);
    let mut cfg = fixed_cfg(3, 5);
    cfg.loader = fast_loader();
    cfg.auto_fill_on_load = true;
    let feedback = CollectingFeedback::default();

    let report = AutoLoader::new(&page).run(&cfg, &feedback).await;
    assert_eq!(report.status, LoadStatus::Stalled);
    assert!(page.values().iter().all(|v| v == "5"));
    // One modal notice from the fill pass, one terminal toast from the load.
    assert_eq!(feedback.notice_count(), 1);
    assert_eq!(feedback.toast_count(), 1);
}

// ── Configuration persistence ───────────────────────────────────────────────

#[test]
fn config_round_trips_through_the_store() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let config_store = ConfigStore::new(Arc::clone(&store));

    let mut cfg = PackConfig::default();
    cfg.version = 1;
    cfg.fill_mode = FillMode::Random;
    cfg.target_count = 12;
    cfg.min_quantity = 2;
    cfg.max_quantity = 6;
    cfg.clear_before_fill = true;
    cfg.pattern_type = "noise".into();
    cfg.noise_seed = Some(42);
    cfg.panel_visible = false;
    cfg.panel_position.left = "12px".into();
    cfg.dark_mode = true;
    cfg.load_more_selector = Some(".load-more".into());

    config_store.save(&cfg).unwrap();
    let loaded = config_store.load();

    // Everything round-trips except the version, which is always re-stamped.
    assert_eq!(loaded.version, CONFIG_VERSION);
    let mut expected = cfg.clone();
    expected.version = CONFIG_VERSION;
    assert_eq!(loaded, expected);
}

#[test]
fn tampered_store_still_yields_a_valid_config() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    store
        .set("config", r#"{"minQuantity": 50, "maxQuantity": 3, "fixedQuantity": 1000}"#)
        .unwrap();
    let loaded = ConfigStore::new(store).load();
    assert!(loaded.min_quantity <= loaded.max_quantity);
    assert!(loaded.fixed_quantity <= packfill::MAX_QUANTITY);
}

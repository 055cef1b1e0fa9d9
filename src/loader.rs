//! The page auto-loader: scroll to the bottom, wait for the document to
//! grow, repeat until growth ceases or the safety bound is hit. Forces
//! lazily-rendered pack inputs onto the page before a fill pass.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PackConfig;
use crate::feedback::{Feedback, Severity};
use crate::fill;
use crate::page::PackPage;

/// Why an auto-load run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Auto-load was off in the config; nothing was scrolled.
    Disabled,
    /// Height stopped growing, or the load-more affordance signaled
    /// completion. The success path.
    Stalled,
    /// The attempt cap fired. Guarantees termination on pages that never
    /// stop reporting growth.
    MaxAttemptsReached,
    /// The owning scope cancelled the run mid-wait.
    Cancelled,
}

/// Final report of one auto-load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    pub status: LoadStatus,
    /// Scroll attempts performed.
    pub attempts: u32,
    pub inputs_before: usize,
    pub inputs_after: usize,
}

/// Drives the scroll-and-wait loop against one page. A single long-lived
/// operation per invocation; every wait is a cancellable suspend point, so
/// abandoning the loader leaks no pending timers.
pub struct AutoLoader<'a, P: PackPage> {
    page: &'a P,
    cancel: CancellationToken,
}

impl<'a, P: PackPage> AutoLoader<'a, P> {
    pub fn new(page: &'a P) -> Self {
        Self {
            page,
            cancel: CancellationToken::new(),
        }
    }

    /// Token to cancel this run from outside (navigation, a newer run).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the loop to a terminal state. Page faults are tolerated as
    /// missing signals rather than errors: a page that cannot report height
    /// simply stalls, and the report still gets published.
    pub async fn run(&self, cfg: &PackConfig, feedback: &dyn Feedback) -> LoadReport {
        let inputs_before = self.count_inputs(0).await;

        if !cfg.auto_load {
            feedback.toast(
                &format!("Auto-load is off. {inputs_before} pack inputs visible."),
                Severity::Info,
                cfg.dark_mode,
            );
            return LoadReport {
                status: LoadStatus::Disabled,
                attempts: 0,
                inputs_before,
                inputs_after: inputs_before,
            };
        }

        let params = cfg.loader.clone();
        let poll_interval = Duration::from_millis(params.poll_interval_ms);
        let scroll_delay = Duration::from_millis(params.scroll_delay_ms);
        let mut height = self.height_or(0).await;
        let mut attempts = 0u32;

        let status = 'run: loop {
            if attempts >= params.max_attempts {
                break LoadStatus::MaxAttemptsReached;
            }
            attempts += 1;

            if let Err(e) = self.page.scroll_to_bottom().await {
                warn!(error = %e, attempt = attempts, "scroll failed");
            }

            let mut grew = false;
            for _ in 0..params.polls_per_attempt {
                if self.wait(poll_interval).await {
                    break 'run LoadStatus::Cancelled;
                }
                let current = self.height_or(height).await;
                if current > height {
                    height = current;
                    grew = true;
                    break;
                }
            }
            if !grew {
                break LoadStatus::Stalled;
            }
            debug!(attempt = attempts, height = height, "document grew");

            if cfg.auto_fill_on_load {
                // The fill reports through its own notice; a failure there
                // must not stop the loading loop.
                let _ = fill::run_fill(self.page, cfg, feedback).await;
            }

            match self.page.load_more_exhausted().await {
                Ok(Some(true)) => break LoadStatus::Stalled,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "load-more probe failed"),
            }

            if self.wait(scroll_delay).await {
                break LoadStatus::Cancelled;
            }
        };

        let inputs_after = self.count_inputs(inputs_before).await;
        info!(
            ?status,
            attempts = attempts,
            inputs_before = inputs_before,
            inputs_after = inputs_after,
            "auto-load finished"
        );

        let message = match status {
            LoadStatus::Stalled => format!(
                "Page fully loaded after {attempts} scrolls: {inputs_before} -> {inputs_after} pack inputs."
            ),
            LoadStatus::MaxAttemptsReached => format!(
                "Stopped after the {attempts}-attempt safety cap: {inputs_before} -> {inputs_after} pack inputs."
            ),
            LoadStatus::Cancelled => format!(
                "Auto-load cancelled after {attempts} scrolls: {inputs_after} pack inputs visible."
            ),
            // Handled above; unreachable here.
            LoadStatus::Disabled => String::new(),
        };
        let severity = match status {
            LoadStatus::MaxAttemptsReached => Severity::Warning,
            LoadStatus::Cancelled => Severity::Info,
            _ => Severity::Success,
        };
        if !message.is_empty() {
            feedback.toast(&message, severity, cfg.dark_mode);
        }

        LoadReport {
            status,
            attempts,
            inputs_before,
            inputs_after,
        }
    }

    /// Sleep, racing cancellation. Returns true when cancelled.
    async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    async fn height_or(&self, fallback: u64) -> u64 {
        match self.page.document_height().await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "height probe failed");
                fallback
            }
        }
    }

    async fn count_inputs(&self, fallback: usize) -> usize {
        match self.page.collect_inputs().await {
            Ok(values) => values.len(),
            Err(e) => {
                warn!(error = %e, "input count failed");
                fallback
            }
        }
    }
}

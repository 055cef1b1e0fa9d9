//! The fill orchestrator: one invocation that computes and writes quantities
//! to a subset of the visible pack inputs, then reports a summary.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{FillMode, PackConfig};
use crate::error::FillError;
use crate::feedback::{Feedback, Severity};
use crate::page::{PackPage, QuantityWrite};
use crate::strategy::{QuantityPlan, QuantityPlanner, Strategy};

/// How long to wait for an off-task noise plan before falling back to
/// inline evaluation.
const PLAN_TASK_TIMEOUT: Duration = Duration::from_secs(2);

/// Summary of one completed fill pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillResult {
    /// Inputs selected by the mode/count policy.
    pub targeted_count: usize,
    /// Visible inputs at collection time.
    pub available_count: usize,
    /// Inputs that received a write pass (equals `targeted_count`).
    pub filled_count: usize,
    /// Sum of all quantities applied.
    pub total_quantity_applied: u64,
}

/// Terminal outcome of a fill pass. The no-op cases are outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Applied(FillResult),
    NoInputs,
    NothingTargeted { available: usize },
}

/// Run one fill pass against `page` with a config snapshot taken by the
/// caller. Quantities are applied in the same order the inputs were
/// collected; only the first `target_count` inputs are targeted outside
/// Unlimited mode.
pub async fn fill<P: PackPage>(page: &P, cfg: &PackConfig) -> Result<FillOutcome, FillError> {
    let inputs = page.collect_inputs().await.map_err(FillError::page)?;
    let available = inputs.len();
    if available == 0 {
        return Ok(FillOutcome::NoInputs);
    }

    let targeted = match cfg.fill_mode {
        FillMode::Unlimited => available,
        FillMode::Fixed | FillMode::Random => (cfg.target_count as usize).min(available),
    };
    if targeted == 0 {
        return Ok(FillOutcome::NothingTargeted { available });
    }

    if cfg.clear_before_fill {
        // Full pass over every visible input, independent of the target set.
        let cleared = page.clear_inputs().await.map_err(FillError::page)?;
        debug!(cleared = cleared, "pre-fill clear pass");
    }

    let plan = plan_quantities(cfg, targeted).await?;
    if plan.fallback_used {
        warn!(pattern = %cfg.pattern_type, "fill ran with the random fallback strategy");
    }

    let writes: Vec<QuantityWrite> = plan
        .quantities
        .iter()
        .enumerate()
        .map(|(index, &quantity)| QuantityWrite { index, quantity })
        .collect();
    let stats = page.apply_quantities(&writes).await.map_err(FillError::page)?;
    debug!(
        written = stats.written,
        unchanged = stats.unchanged,
        missing = stats.missing,
        "fill write pass complete"
    );

    Ok(FillOutcome::Applied(FillResult {
        targeted_count: targeted,
        available_count: available,
        filled_count: targeted,
        total_quantity_applied: plan.total_quantity,
    }))
}

/// Compute the quantity batch. The noise strategy is pure and deterministic,
/// so it can run on a blocking worker; if that worker is unavailable, times
/// out or dies, evaluation silently falls back to the current task.
async fn plan_quantities(cfg: &PackConfig, total: usize) -> Result<QuantityPlan, FillError> {
    let (strategy, _) = Strategy::resolve(&cfg.pattern_type);
    if strategy == Strategy::Noise {
        let worker_cfg = cfg.clone();
        let task = tokio::task::spawn_blocking(move || QuantityPlanner::plan(&worker_cfg, total));
        match tokio::time::timeout(PLAN_TASK_TIMEOUT, task).await {
            Ok(Ok(plan)) => return plan,
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "noise plan worker died, computing inline");
            }
            Err(_) => {
                warn!(timeout_ms = PLAN_TASK_TIMEOUT.as_millis() as u64, "noise plan worker timed out, computing inline");
            }
        }
    }
    QuantityPlanner::plan(cfg, total)
}

/// Orchestration boundary: run a fill pass and map every outcome, including
/// failure, to exactly one notice. Faults never escape into the caller's
/// event loop.
pub async fn run_fill<P: PackPage>(
    page: &P,
    cfg: &PackConfig,
    feedback: &dyn Feedback,
) -> Option<FillResult> {
    match fill(page, cfg).await {
        Ok(FillOutcome::Applied(result)) => {
            info!(
                targeted = result.targeted_count,
                available = result.available_count,
                total = result.total_quantity_applied,
                "fill complete"
            );
            feedback.notify(
                "Fill complete",
                &format!(
                    "Filled {} of {} visible inputs (total quantity {}).",
                    result.filled_count, result.available_count, result.total_quantity_applied
                ),
                Severity::Success,
                cfg.dark_mode,
            );
            Some(result)
        }
        Ok(FillOutcome::NoInputs) => {
            feedback.notify(
                "Nothing to fill",
                "No visible pack inputs were found on the page.",
                Severity::Info,
                cfg.dark_mode,
            );
            None
        }
        Ok(FillOutcome::NothingTargeted { available }) => {
            feedback.notify(
                "Nothing targeted",
                &format!(
                    "{available} inputs are available but the current mode and count target none."
                ),
                Severity::Info,
                cfg.dark_mode,
            );
            None
        }
        Err(e) => {
            warn!(error = %e, "fill pass failed");
            feedback.notify("Fill failed", &e.to_string(), Severity::Error, cfg.dark_mode);
            None
        }
    }
}

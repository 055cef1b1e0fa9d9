use tracing::{error, info, warn};

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Presentation collaborator for operation summaries.
///
/// `notify` is the modal-style summary shown after a fill; `toast` is the
/// transient notice the auto-loader emits. The `dark` flag is the theme hint
/// persisted in the configuration; sinks that have no theming ignore it.
/// Implementations must not fail: the fill orchestrator's error path relies
/// on feedback always degrading to something that cannot throw.
pub trait Feedback: Send + Sync {
    fn notify(&self, title: &str, body: &str, severity: Severity, dark: bool);
    fn toast(&self, message: &str, severity: Severity, dark: bool);
}

/// Default sink: renders notices into the tracing stream.
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn notify(&self, title: &str, body: &str, severity: Severity, _dark: bool) {
        match severity {
            Severity::Info | Severity::Success => info!(title = %title, "{body}"),
            Severity::Warning => warn!(title = %title, "{body}"),
            Severity::Error => error!(title = %title, "{body}"),
        }
    }

    fn toast(&self, message: &str, severity: Severity, _dark: bool) {
        match severity {
            Severity::Info | Severity::Success => info!("{message}"),
            Severity::Warning => warn!("{message}"),
            Severity::Error => error!("{message}"),
        }
    }
}

/// Silent sink.
pub struct NullFeedback;

impl Feedback for NullFeedback {
    fn notify(&self, _title: &str, _body: &str, _severity: Severity, _dark: bool) {}
    fn toast(&self, _message: &str, _severity: Severity, _dark: bool) {}
}

//! Diagnostics collaborator (§6): a narrow sink for non-fatal warnings
//! surfaced during reads, e.g. partial decode failures inside `list`.

pub trait DiagnosticsSink: Send + Sync {
    fn warn(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn warn(&self, message: &str) {
        tracing::warn!("{message}");
    }
}

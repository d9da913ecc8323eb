// ABOUTME: Non-fatal problems noticed while a Task runs.
// ABOUTME: Post-step and transport-close failures land here instead of failing the Task.

use std::fmt;
use tracing::warn;

/// Warnings gathered by one Task, in the order they happened.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Keep `warning` and log it once.
    pub fn warn(&mut self, warning: Warning) {
        warn!(kind = ?warning.kind, subject = %warning.subject, "{}", warning.detail);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    PostStepFailed,
    TransportClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    /// Step name or transport target the warning is about.
    pub subject: String,
    pub detail: String,
}

impl Warning {
    pub fn post_step_failed(step: &str, detail: impl fmt::Display) -> Self {
        Self {
            kind: WarningKind::PostStepFailed,
            subject: step.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn transport_close(target: &str, detail: impl fmt::Display) -> Self {
        Self {
            kind: WarningKind::TransportClose,
            subject: target.to_string(),
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WarningKind::PostStepFailed => write!(f, "post-step '{}' failed: {}", self.subject, self.detail),
            WarningKind::TransportClose => write!(f, "closing {}: {}", self.subject, self.detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_keep_order_and_render() {
        let mut diag = Diagnostics::default();
        assert!(!diag.has_warnings());

        diag.warn(Warning::post_step_failed("remove scratch", "exit 1"));
        diag.warn(Warning::transport_close("root@10.0.0.1:22", "connection reset"));

        let rendered: Vec<String> = diag.warnings().iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "post-step 'remove scratch' failed: exit 1",
                "closing root@10.0.0.1:22: connection reset",
            ]
        );
    }
}

//! Failure notification hook.

use crate::error::HookError;
use crate::types::Outcome;
use async_trait::async_trait;

/// Failed outcomes of one run, handed to the failure hook
#[derive(Debug, Clone)]
pub struct FailureNotice {
    /// Correlation id of the triggering request, if it carried one
    pub request_id: Option<String>,

    /// Failed outcomes, sorted by URL
    pub failed: Vec<Outcome>,
}

/// Called after a run with at least one failed check.
///
/// The call is detached from the run: its result, and even a panic, never
/// changes the report.
#[async_trait]
pub trait FailureHook: Send + Sync {
    async fn on_failure(&self, notice: FailureNotice) -> Result<(), HookError>;
}

/// Default hook, does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

#[async_trait]
impl FailureHook for NoopHook {
    async fn on_failure(&self, _notice: FailureNotice) -> Result<(), HookError> {
        Ok(())
    }
}

/// Adapts a synchronous closure into a hook
pub struct FnHook<F>(F);

impl<F> FnHook<F>
where
    F: Fn(FailureNotice) -> Result<(), HookError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> FailureHook for FnHook<F>
where
    F: Fn(FailureNotice) -> Result<(), HookError> + Send + Sync,
{
    async fn on_failure(&self, notice: FailureNotice) -> Result<(), HookError> {
        (self.0)(notice)
    }
}

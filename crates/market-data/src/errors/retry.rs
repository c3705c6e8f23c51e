/// Classification for retry policy.
///
/// Used by the scheduler to decide whether a failed attempt is worth repeating.
///
/// | Class | Retried? | Backoff before next attempt? |
/// |-------|----------|------------------------------|
/// | `Never` | No | - |
/// | `WithBackoff` | Yes, while attempts remain | Yes |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Terminal failure. The task fails immediately.
    Never,

    /// Transient failure (timeout, source error, aborted worker).
    /// The task is retried after an exponential backoff with jitter.
    WithBackoff,
}

impl RetryClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WithBackoff)
    }
}

/// Classification of an adapter failure.
///
/// Used by the service to decide how a failed attempt affects the rest of the
/// request and the adapter's health.
///
/// # Behavior Summary
///
/// | Class | Try Next Adapter? | Health effect |
/// |-------|-------------------|---------------|
/// | `Transient` | Yes | Counts as a consecutive failure |
/// | `RateLimited` | Yes | Deprioritised until the back-off elapses |
/// | `NotFound` | Yes | None |
/// | `Fatal` | No, propagates | None |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FailureClass {
    /// Timeout, transport error or malformed body.
    ///
    /// The failure is recorded against the adapter; enough of them in a row
    /// suspend it for a cooldown period.
    Transient,

    /// Explicit quota signal from the adapter or the local budget.
    ///
    /// The adapter stays eligible but sorts after every non-limited candidate
    /// until its rate-limit window passes.
    RateLimited,

    /// The adapter cannot serve this instrument or operation.
    ///
    /// Another adapter might, so failover continues without penalty.
    NotFound,

    /// A defect rather than an environmental condition.
    Fatal,
}

impl FailureClass {
    /// Whether the failover loop should move to the next candidate.
    pub fn advances(self) -> bool {
        !matches!(self, Self::Fatal)
    }
}

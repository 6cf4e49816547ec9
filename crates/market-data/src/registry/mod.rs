//! Adapter registry module.
//!
//! - Adapter registration with configuration overrides
//! - Routing: ordered candidates per data kind, segment and symbol
//! - Local rate budgets per adapter
//! - Skip diagnostics for each request

mod rate_limiter;
mod registry;
mod skip_reason;

pub use rate_limiter::RateLimiter;
pub use registry::{Candidate, ProviderRegistry, RouteDecision, DEFAULT_RATE_LIMIT_PENALTY};
pub use skip_reason::{FetchDiagnostics, ProviderAttempt, SkipReason};

use std::collections::HashMap;
use std::time::Duration;

use crate::models::DataKind;

/// Resolves how long an answer stays cached.
///
/// Precedence, lowest first: the kind's built-in default, the configured
/// override for the kind, the serving adapter's own override.
#[derive(Clone, Debug, Default)]
pub struct TtlPolicy {
    overrides: HashMap<DataKind, Duration>,
}

impl TtlPolicy {
    pub fn new(overrides: HashMap<DataKind, Duration>) -> Self {
        Self { overrides }
    }

    pub fn resolve(
        &self,
        kind: DataKind,
        adapter_overrides: Option<&HashMap<DataKind, Duration>>,
    ) -> Duration {
        adapter_overrides
            .and_then(|overrides| overrides.get(&kind))
            .or_else(|| self.overrides.get(&kind))
            .copied()
            .unwrap_or_else(|| kind.default_ttl())
    }
}

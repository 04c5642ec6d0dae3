use crate::config::EscalationConfig;

/// All retry/termination counters in one place, so every way the loop can
/// give up is named and auditable.
#[derive(Debug)]
pub struct EscalationPolicy {
    config: EscalationConfig,
    interaction_failures: u32,
    recovery_failures: u32,
    search_failures: u32,
}

impl EscalationPolicy {
    pub fn new(config: EscalationConfig) -> Self {
        Self {
            config,
            interaction_failures: 0,
            recovery_failures: 0,
            search_failures: 0,
        }
    }

    /// Record a failed interaction; returns the running count.
    pub fn record_interaction_failure(&mut self) -> u32 {
        self.interaction_failures += 1;
        self.interaction_failures
    }

    pub fn reset_interaction_failures(&mut self) {
        self.interaction_failures = 0;
    }

    pub fn interaction_failures(&self) -> u32 {
        self.interaction_failures
    }

    pub fn record_recovery_failure(&mut self) -> u32 {
        self.recovery_failures += 1;
        self.recovery_failures
    }

    pub fn reset_recovery_failures(&mut self) {
        self.recovery_failures = 0;
    }

    /// Record an empty detection pass; returns the running count.
    pub fn record_search_failure(&mut self) -> u32 {
        self.search_failures += 1;
        self.search_failures
    }

    pub fn reset_search_failures(&mut self) {
        self.search_failures = 0;
    }

    pub fn search_failures(&self) -> u32 {
        self.search_failures
    }

    /// Empty searches have gone on long enough to try a camera rotation.
    pub fn should_rotate_search(&self) -> bool {
        self.search_failures > self.config.search_rotate_after
    }

    /// The first exceeded bound wins; `None` means keep running.
    pub fn should_terminate(&self) -> Option<&'static str> {
        if self.recovery_failures >= self.config.max_recovery_failures {
            return Some("stuck and recovery attempts exhausted");
        }
        if self.interaction_failures > self.config.max_consecutive_failures {
            return Some("too many consecutive interaction failures");
        }
        if self.search_failures > self.config.search_abandon_after {
            return Some("no candidates visible for too long");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> EscalationPolicy {
        EscalationPolicy::new(EscalationConfig::default())
    }

    #[test]
    fn interaction_failures_terminate_past_bound() {
        let mut policy = policy();
        for _ in 0..10 {
            policy.record_interaction_failure();
        }
        assert!(policy.should_terminate().is_none(), "bound is exclusive");
        policy.record_interaction_failure();
        assert_eq!(
            policy.should_terminate(),
            Some("too many consecutive interaction failures")
        );
    }

    #[test]
    fn success_resets_interaction_failures() {
        let mut policy = policy();
        for _ in 0..11 {
            policy.record_interaction_failure();
        }
        policy.reset_interaction_failures();
        assert!(policy.should_terminate().is_none());
    }

    #[test]
    fn recovery_failures_terminate_at_bound() {
        let mut policy = policy();
        for _ in 0..4 {
            policy.record_recovery_failure();
            assert!(policy.should_terminate().is_none());
        }
        policy.record_recovery_failure();
        assert_eq!(
            policy.should_terminate(),
            Some("stuck and recovery attempts exhausted")
        );
    }

    #[test]
    fn search_rotation_then_abandonment() {
        let mut policy = policy();
        for _ in 0..30 {
            policy.record_search_failure();
        }
        assert!(!policy.should_rotate_search());
        policy.record_search_failure();
        assert!(policy.should_rotate_search());
        assert!(policy.should_terminate().is_none());

        for _ in 0..90 {
            policy.record_search_failure();
        }
        assert_eq!(
            policy.should_terminate(),
            Some("no candidates visible for too long")
        );
    }
}

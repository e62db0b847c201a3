use std::time::{Duration, Instant};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_DEDUPE_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub interval: Duration,
    pub dedupe_window: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            dedupe_window: DEFAULT_DEDUPE_WINDOW,
        }
    }
}

/// Why a refetch was requested. Every trigger goes through the same
/// de-duplication window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Interval,
    /// The operator came back to the terminal and asked for fresh numbers.
    Resume,
}

/// Identifies one started fetch; only the newest ticket may publish results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// Drops fetch requests that arrive inside the de-duplication window of the
/// previous one, and discards results from superseded fetches.
#[derive(Debug)]
pub struct FetchGate {
    window: Duration,
    last_started: Option<Instant>,
    generation: u64,
}

impl FetchGate {
    pub fn new(policy: &RefreshPolicy) -> Self {
        Self {
            window: policy.dedupe_window,
            last_started: None,
            generation: 0,
        }
    }

    pub fn request(&mut self, trigger: RefreshTrigger, now: Instant) -> Option<FetchTicket> {
        if let Some(last) = self.last_started {
            if now.saturating_duration_since(last) < self.window {
                tracing::debug!(?trigger, "fetch skipped inside de-duplication window");
                return None;
            }
        }
        self.last_started = Some(now);
        self.generation += 1;
        tracing::debug!(?trigger, generation = self.generation, "fetch started");
        Some(FetchTicket(self.generation))
    }

    pub fn is_current(&self, ticket: FetchTicket) -> bool {
        ticket.0 == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_inside_the_window_are_dropped() {
        let mut gate = FetchGate::new(&RefreshPolicy::default());
        let start = Instant::now();

        assert!(gate.request(RefreshTrigger::Interval, start).is_some());
        assert!(gate
            .request(RefreshTrigger::Interval, start + Duration::from_secs(9))
            .is_none());
        assert!(gate
            .request(RefreshTrigger::Interval, start + Duration::from_secs(10))
            .is_some());
    }

    #[test]
    fn resume_shares_the_window_with_the_interval() {
        let mut gate = FetchGate::new(&RefreshPolicy::default());
        let start = Instant::now();

        assert!(gate.request(RefreshTrigger::Interval, start).is_some());
        assert!(gate
            .request(RefreshTrigger::Resume, start + Duration::from_secs(3))
            .is_none());
        assert!(gate
            .request(RefreshTrigger::Resume, start + Duration::from_secs(12))
            .is_some());
    }

    #[test]
    fn superseded_fetches_are_not_current() {
        let mut gate = FetchGate::new(&RefreshPolicy::default());
        let start = Instant::now();

        let first = gate.request(RefreshTrigger::Interval, start).unwrap();
        let second = gate
            .request(RefreshTrigger::Resume, start + Duration::from_secs(10))
            .unwrap();
        assert!(!gate.is_current(first));
        assert!(gate.is_current(second));
    }

    #[test]
    fn default_policy_refreshes_every_thirty_seconds() {
        let policy = RefreshPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(30));
        assert_eq!(policy.dedupe_window, Duration::from_secs(10));
    }
}

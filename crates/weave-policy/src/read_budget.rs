use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::{normalize_slashes, PolicyViolation};

pub const MAX_READS_PER_ITERATION: u32 = 24;
pub const MAX_UNIQUE_PATHS_PER_ITERATION: usize = 12;
const MAX_TRACKED_PAIRS: usize = 500;

#[derive(Debug, Default)]
struct ReadUsage {
    calls: u32,
    paths: HashSet<String>,
    last_touched: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    usage: HashMap<(String, u32), ReadUsage>,
    clock: u64,
}

/// Per `(session, iteration)` read caps, enforced only once the session has
/// artifacts. Oldest pairs are evicted past the tracking limit.
#[derive(Clone, Default)]
pub struct ReadBudgetTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl ReadBudgetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_read(
        &self,
        session_id: &str,
        iteration: u32,
        path: &str,
        session_has_artifacts: bool,
    ) -> Result<(), PolicyViolation> {
        if !session_has_artifacts {
            return Ok(());
        }
        let normalized = normalize_slashes(path.trim());
        let mut state = self.state.lock().expect("read budget lock");
        state.clock += 1;
        let clock = state.clock;

        let key = (session_id.to_string(), iteration);
        let usage = state.usage.entry(key).or_default();
        usage.last_touched = clock;

        if usage.calls >= MAX_READS_PER_ITERATION {
            return Err(PolicyViolation::read_budget(format!(
                "read call budget of {MAX_READS_PER_ITERATION} exhausted for this iteration"
            )));
        }
        if !usage.paths.contains(&normalized) && usage.paths.len() >= MAX_UNIQUE_PATHS_PER_ITERATION
        {
            return Err(PolicyViolation::read_budget(format!(
                "unique path budget of {MAX_UNIQUE_PATHS_PER_ITERATION} exhausted for this iteration"
            )));
        }

        usage.calls += 1;
        usage.paths.insert(normalized);

        if state.usage.len() > MAX_TRACKED_PAIRS {
            evict_oldest(&mut state.usage);
        }
        Ok(())
    }

    pub fn clear_session(&self, session_id: &str) {
        let mut state = self.state.lock().expect("read budget lock");
        state.usage.retain(|(session, _), _| session != session_id);
    }

    pub fn tracked_pairs(&self) -> usize {
        self.state.lock().expect("read budget lock").usage.len()
    }
}

fn evict_oldest(usage: &mut HashMap<(String, u32), ReadUsage>) {
    while usage.len() > MAX_TRACKED_PAIRS {
        let Some(oldest) = usage
            .iter()
            .min_by_key(|(_, u)| u.last_touched)
            .map(|(key, _)| key.clone())
        else {
            return;
        };
        usage.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::READ_BUDGET_EXCEEDED;

    #[test]
    fn twenty_fifth_read_is_rejected() {
        let tracker = ReadBudgetTracker::new();
        for i in 0..24 {
            // stay under the unique-path cap by cycling 12 paths
            let path = format!("src/file{}.ts", i % 12);
            tracker
                .register_read("ses_1", 1, &path, true)
                .expect("within budget");
        }
        let err = tracker
            .register_read("ses_1", 1, "src/file0.ts", true)
            .expect_err("over budget");
        assert_eq!(err.code, READ_BUDGET_EXCEEDED);
    }

    #[test]
    fn thirteenth_unique_path_is_rejected() {
        let tracker = ReadBudgetTracker::new();
        for i in 0..12 {
            tracker
                .register_read("ses_1", 1, &format!("src/file{i}.ts"), true)
                .expect("within budget");
        }
        let err = tracker
            .register_read("ses_1", 1, "src/file12.ts", true)
            .expect_err("over budget");
        assert_eq!(err.code, READ_BUDGET_EXCEEDED);
        // re-reading an already-counted path is still fine
        tracker
            .register_read("ses_1", 1, "src/file0.ts", true)
            .expect("known path");
    }

    #[test]
    fn empty_sessions_are_unbudgeted() {
        let tracker = ReadBudgetTracker::new();
        for i in 0..100 {
            tracker
                .register_read("ses_1", 1, &format!("src/file{i}.ts"), false)
                .expect("no artifacts, no budget");
        }
    }

    #[test]
    fn iterations_reset_the_budget() {
        let tracker = ReadBudgetTracker::new();
        for i in 0..12 {
            tracker
                .register_read("ses_1", 1, &format!("src/file{i}.ts"), true)
                .expect("within budget");
        }
        tracker
            .register_read("ses_1", 2, "src/file99.ts", true)
            .expect("fresh iteration");
    }

    #[test]
    fn tracking_is_bounded() {
        let tracker = ReadBudgetTracker::new();
        for i in 0..600u32 {
            tracker
                .register_read(&format!("ses_{i}"), 1, "a.ts", true)
                .expect("ok");
        }
        assert!(tracker.tracked_pairs() <= MAX_TRACKED_PAIRS);
    }
}

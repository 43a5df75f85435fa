use crate::guard::Outcome;
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub started: DateTime<Local>,
    pub name: String,
    pub outcome: Outcome,
}

/// Outcomes of a sequence of deployments run in one invocation
#[derive(Debug)]
pub struct Session {
    started: Instant,
    entries: Vec<SessionEntry>,
}

impl Default for Session {
    fn default() -> Self {
        Session {
            started: Instant::now(),
            entries: Vec::new(),
        }
    }
}

impl Session {
    pub fn record(&mut self, started: DateTime<Local>, name: &str, outcome: Outcome) {
        self.entries.push(SessionEntry {
            started,
            name: name.to_string(),
            outcome,
        });
    }

    pub fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.is_failure())
            .count()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn report(&self, finished: DateTime<Local>, elapsed: Duration) -> Vec<String> {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .map(|entry| {
                format!(
                    "{} - {}: {}",
                    entry.started.format(TIME_FORMAT),
                    entry.name,
                    entry.outcome
                )
            })
            .collect();
        lines.push(format!("{} - Finished", finished.format(TIME_FORMAT)));
        lines.push(format!(
            "Total runtime: {:.2} seconds",
            elapsed.as_secs_f64()
        ));
        lines
    }
}

#[test]
fn test_session_report() {
    use chrono::TimeZone;

    let mut session = Session::default();
    let start = Local.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
    session.record(start, "watchtower", Outcome::AlreadyPresent);
    session.record(
        start + chrono::Duration::seconds(2),
        "nvidia-toolkit",
        Outcome::Failed("precondition not met".into()),
    );
    assert_eq!(session.count(), 2);
    assert_eq!(session.failures(), 1);

    let report = session.report(
        start + chrono::Duration::seconds(5),
        Duration::from_millis(5250),
    );
    assert_eq!(
        report,
        vec![
            "2025-03-14 09:30:00 - watchtower: already present",
            "2025-03-14 09:30:02 - nvidia-toolkit: failed: precondition not met",
            "2025-03-14 09:30:05 - Finished",
            "Total runtime: 5.25 seconds",
        ]
    );
}

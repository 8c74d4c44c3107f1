use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{InsertOutcome, Store, StoreError};
use crate::fetcher::FetchError;
use crate::model::CanonicalProblem;
use crate::transform::Rejected;
use crate::validate::{describe, validate, Violation};

/// Why one problem did not make it into the store.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("rejected: {0}")]
    Rejected(#[from] Rejected),
    #[error("validation failed: {}", describe(.0))]
    Invalid(Vec<Violation>),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Inserted,
    /// Dry run: valid, nothing written.
    WouldInsert,
    Skipped,
    Rejected,
    Invalid,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub inserted: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub invalid: usize,
    pub failed: usize,
}

impl Tally {
    pub fn total(&self) -> usize {
        self.inserted + self.skipped + self.rejected + self.invalid + self.failed
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Inserted | Outcome::WouldInsert => self.inserted += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Rejected => self.rejected += 1,
            Outcome::Invalid => self.invalid += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    /// Short running tally for the progress bar.
    pub fn brief(&self) -> String {
        format!(
            "ok {} | skip {} | rej {} | inv {} | fail {}",
            self.inserted, self.skipped, self.rejected, self.invalid, self.failed
        )
    }
}

/// Per-run state threaded through every problem: the optional store (absent
/// on dry runs), counters and the records produced so far.
pub struct RunContext<'a> {
    store: Option<&'a Store>,
    stop: Option<&'a AtomicBool>,
    interrupted: bool,
    tally: Tally,
    problems: Vec<CanonicalProblem>,
    started: Instant,
}

impl<'a> RunContext<'a> {
    pub fn new(store: Option<&'a Store>) -> Self {
        RunContext {
            store,
            stop: None,
            interrupted: false,
            tally: Tally::default(),
            problems: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Flag set from outside (Ctrl-C) to end the run between problems.
    pub fn stop_on(mut self, flag: &'a AtomicBool) -> Self {
        self.stop = Some(flag);
        self
    }

    /// True once the stop flag is raised. The run is then reported as
    /// interrupted.
    pub fn should_stop(&mut self) -> bool {
        if !self.interrupted && self.stop.is_some_and(|f| f.load(Ordering::SeqCst)) {
            warn!(
                "Interrupted after {} problems, stopping",
                self.tally.total()
            );
            self.interrupted = true;
        }
        self.interrupted
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    /// Counts the problem as skipped when its external id is already stored,
    /// so callers can avoid fetching it again. Lookup errors fall through to
    /// the regular import path.
    pub fn skip_if_stored(&mut self, external_id: &str) -> bool {
        let Some(store) = self.store else {
            return false;
        };
        match store.exists(external_id) {
            Ok(true) => {
                info!("Already exists: {}", external_id);
                self.tally.record(Outcome::Skipped);
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!("Existence check failed for {}: {}", external_id, e);
                false
            }
        }
    }

    /// Runs one problem through production, validation and persistence.
    /// Every error is absorbed here and turned into an outcome.
    pub fn import<F>(&mut self, label: &str, produce: F) -> Outcome
    where
        F: FnOnce() -> Result<CanonicalProblem, ImportError>,
    {
        let outcome = match self.try_import(produce) {
            Ok(outcome) => outcome,
            Err(ImportError::Rejected(reason)) => {
                info!("Rejected {}: {}", label, reason);
                Outcome::Rejected
            }
            Err(ImportError::Invalid(violations)) => {
                warn!("Validation failed for {}: {}", label, describe(&violations));
                Outcome::Invalid
            }
            Err(e) => {
                warn!("Failed {}: {}", label, e);
                Outcome::Failed
            }
        };
        self.tally.record(outcome);
        outcome
    }

    fn try_import<F>(&mut self, produce: F) -> Result<Outcome, ImportError>
    where
        F: FnOnce() -> Result<CanonicalProblem, ImportError>,
    {
        let problem = produce()?;
        let violations = validate(&problem);
        if !violations.is_empty() {
            return Err(ImportError::Invalid(violations));
        }

        let outcome = match self.store {
            None => {
                info!("Would insert: {} ({})", problem.title, problem.difficulty);
                Outcome::WouldInsert
            }
            Some(store) => match store.insert(&problem)? {
                InsertOutcome::Inserted(id) => {
                    info!("Inserted: {} ({}) as #{}", problem.title, problem.difficulty, id);
                    Outcome::Inserted
                }
                InsertOutcome::Duplicate => {
                    info!("Already exists: {}", problem.external_id);
                    Outcome::Skipped
                }
            },
        };
        if outcome != Outcome::Skipped {
            self.problems.push(problem);
        }
        Ok(outcome)
    }

    pub fn finish(self) -> RunSummary {
        RunSummary {
            tally: self.tally,
            interrupted: self.interrupted,
            problems: self.problems,
            duration: self.started.elapsed(),
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub tally: Tally,
    pub interrupted: bool,
    pub problems: Vec<CanonicalProblem>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn log(&self, source: &str, dry_run: bool) {
        let t = &self.tally;
        info!("{}", "=".repeat(60));
        info!(
            "{} IMPORT SUMMARY{}{}",
            source.to_uppercase(),
            if dry_run { " (dry run)" } else { "" },
            if self.interrupted { " (interrupted)" } else { "" }
        );
        info!("{}", "=".repeat(60));
        info!("Total:    {}", t.total());
        info!("Success:  {}", t.inserted);
        info!("Skipped:  {}", t.skipped);
        info!("Rejected: {}", t.rejected);
        info!("Invalid:  {}", t.invalid);
        info!("Failed:   {}", t.failed);
        info!("Duration: {}", format_duration(self.duration));
        info!("{}", "=".repeat(60));
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Difficulty, Source};

    fn problem(external_id: &str) -> CanonicalProblem {
        CanonicalProblem {
            title: "Watermelon".into(),
            description: "d".repeat(500),
            difficulty: Difficulty::Easy,
            tags: vec![],
            category: Category::Algorithm,
            time_limit: 1000,
            memory_limit: 64,
            input_format: String::new(),
            output_format: String::new(),
            examples: vec![],
            visible_test_cases: vec![],
            hidden_test_cases: vec![],
            constraints: vec![],
            hints: vec![],
            statistics: None,
            source: Source::Codeforces,
            source_url: String::new(),
            external_id: external_id.into(),
            is_public: true,
            is_active: true,
            is_verified: false,
            created_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn duplicate_counts_as_skipped_not_failed() {
        let store = Store::open_in_memory().unwrap();
        let mut ctx = RunContext::new(Some(&store));

        assert_eq!(ctx.import("4A", || Ok(problem("codeforces_4A"))), Outcome::Inserted);
        assert_eq!(ctx.import("4A", || Ok(problem("codeforces_4A"))), Outcome::Skipped);

        let summary = ctx.finish();
        assert_eq!(summary.tally.inserted, 1);
        assert_eq!(summary.tally.skipped, 1);
        assert_eq!(summary.tally.failed, 0);
        assert_eq!(summary.problems.len(), 1);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let mut ctx = RunContext::new(None);
        assert_eq!(ctx.import("4A", || Ok(problem("codeforces_4A"))), Outcome::WouldInsert);
        assert!(!ctx.skip_if_stored("codeforces_4A"));

        let summary = ctx.finish();
        assert_eq!(summary.tally.inserted, 1);
        assert_eq!(summary.problems.len(), 1);
    }

    #[test]
    fn errors_land_in_their_own_buckets() {
        let mut ctx = RunContext::new(None);

        let outcome = ctx.import("q", || Err(Rejected::PaidOnly.into()));
        assert_eq!(outcome, Outcome::Rejected);

        let outcome = ctx.import("x", || {
            Err(FetchError::NotFound {
                url: "https://codeforces.com/problemset/problem/1/Z".into(),
            }
            .into())
        });
        assert_eq!(outcome, Outcome::Failed);

        let outcome = ctx.import("short", || {
            let mut p = problem("codeforces_1A");
            p.description = "too short".into();
            Ok(p)
        });
        assert_eq!(outcome, Outcome::Invalid);

        assert_eq!(
            *ctx.tally(),
            Tally {
                inserted: 0,
                skipped: 0,
                rejected: 1,
                invalid: 1,
                failed: 1,
            }
        );
        assert!(ctx.finish().problems.is_empty());
    }

    #[test]
    fn stored_ids_are_skipped_before_fetching() {
        let store = Store::open_in_memory().unwrap();
        store.insert(&problem("codeforces_4A")).unwrap();

        let mut ctx = RunContext::new(Some(&store));
        assert!(ctx.skip_if_stored("codeforces_4A"));
        assert!(!ctx.skip_if_stored("codeforces_4B"));
        assert_eq!(ctx.tally().skipped, 1);
    }

    #[test]
    fn stop_flag_ends_run_with_partial_summary() {
        let stop = AtomicBool::new(false);
        let mut ctx = RunContext::new(None).stop_on(&stop);

        assert!(!ctx.should_stop());
        ctx.import("4A", || Ok(problem("codeforces_4A")));
        stop.store(true, Ordering::SeqCst);
        assert!(ctx.should_stop());
        assert!(ctx.should_stop());

        let summary = ctx.finish();
        assert!(summary.interrupted);
        assert_eq!(summary.tally.inserted, 1);
        assert_eq!(summary.problems.len(), 1);
    }

    #[test]
    fn without_stop_flag_never_interrupted() {
        let mut ctx = RunContext::new(None);
        assert!(!ctx.should_stop());
        assert!(!ctx.finish().interrupted);
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}

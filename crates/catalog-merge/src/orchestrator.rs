//! Sequences loading, filtering, merging, sampling and writing for one run.
//!
//! A run always ends in exactly one of [`RunState::Done`] or [`RunState::Failed`], reported once
//! to the observer, and returns the matching `Ok`/`Err`. The output path is only touched by the
//! final atomic write.

use std::{
    any::Any,
    backtrace::Backtrace,
    cell::{Cell, RefCell},
    fmt,
    panic::{self, AssertUnwindSafe, catch_unwind},
    path::PathBuf,
    sync::{
        Arc, Mutex, Once,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use bon::Builder;
use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    applier::PredicateApplier,
    error::{Result, RunError},
    loader::load_table,
    pipeline,
    predicate::PredicateSet,
    table::Table,
    vocabulary::Vocabulary,
    writer::write_table,
};

const START_PERCENT: u8 = 5;
const LOADING_SPAN: usize = 75;
const MERGED_PERCENT: u8 = 85;
const WRITING_PERCENT: u8 = 95;
const DONE_PERCENT: u8 = 100;

/// One platform's catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub key:  String,
    pub path: PathBuf,
}

impl SourceDescriptor {
    pub fn new(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key:  key.into(),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Builder)]
pub struct RunRequest {
    pub sources:    Vec<SourceDescriptor>,
    #[builder(default)]
    pub predicates: PredicateSet,
    #[builder(default)]
    pub vocabulary: Vocabulary,
    #[builder(into)]
    pub output:     PathBuf,
    /// Seeds the sampler; `None` draws from OS entropy.
    pub seed:       Option<u64>,
    /// Load and filter sources on the rayon pool.
    #[builder(default)]
    pub parallel:   bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Idle,
    Loading { done: usize, total: usize },
    Merging,
    Sampling,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Loading { done, total } => write!(f, "loading {done}/{total}"),
            RunState::Merging => f.write_str("merging"),
            RunState::Sampling => f.write_str("sampling"),
            RunState::Writing => f.write_str("writing"),
            RunState::Done => f.write_str("done"),
            RunState::Failed => f.write_str("failed"),
        }
    }
}

/// Receives progress while a run executes. Updates may arrive from pool threads.
pub trait ProgressObserver: Sync {
    fn on_progress(&self, state: RunState, percent: u8, message: &str);
}

impl<F> ProgressObserver for F
where
    F: Fn(RunState, u8, &str) + Sync,
{
    fn on_progress(&self, state: RunState, percent: u8, message: &str) {
        self(state, percent, message)
    }
}

/// Observer that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _state: RunState, _percent: u8, _message: &str) {}
}

/// Whole-run cancellation shared between the host and the run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(RunError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCount {
    pub key:  String,
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub output:             PathBuf,
    pub rows:               usize,
    pub per_source:         Vec<SourceCount>,
    pub duplicates_removed: usize,
    pub sampled:            bool,
}

/// Serializes observer calls and keeps the reported percentage non-decreasing.
struct Progress<'a> {
    observer: &'a dyn ProgressObserver,
    last:     Mutex<u8>,
}

impl<'a> Progress<'a> {
    fn new(observer: &'a dyn ProgressObserver) -> Self {
        Self {
            observer,
            last: Mutex::new(0),
        }
    }

    fn report(&self, state: RunState, percent: u8, message: &str) {
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let percent = percent.clamp(*last, DONE_PERCENT);
        *last = percent;
        self.observer.on_progress(state, percent, message);
    }

    fn current(&self) -> u8 {
        *self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn loading_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return START_PERCENT;
    }
    (START_PERCENT as usize + done * LOADING_SPAN / total) as u8
}

/// Executes a run to completion. Never panics; a panic inside the run becomes
/// [`RunError::Unexpected`].
pub fn run(
    request: &RunRequest,
    observer: &dyn ProgressObserver,
    cancel: &CancelFlag,
) -> Result<RunSummary> {
    let progress = Progress::new(observer);
    progress.report(RunState::Idle, 0, "starting");

    let outcome = guarded(|| execute(request, &progress, cancel));

    match &outcome {
        Ok(summary) => {
            info!(output = %summary.output.display(), rows = summary.rows, "run finished");
            progress.report(RunState::Done, DONE_PERCENT, "finished");
        },
        Err(err) => {
            match err {
                RunError::Cancelled => warn!("run cancelled"),
                other => warn!(error = %other, kind = ?other.kind(), "run failed"),
            }
            progress.report(RunState::Failed, progress.current(), &err.to_string());
        },
    }
    outcome
}

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static FAULT_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static FAULT_HOOK: Once = Once::new();

/// Chains a panic hook that records location and backtrace of panics raised inside [`guarded`].
/// Panics elsewhere only reach the previous hook.
fn install_fault_hook() {
    FAULT_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) > 0 {
                let location = info
                    .location()
                    .map(|location| location.to_string())
                    .unwrap_or_else(|| "unknown location".to_string());
                let trace = format!("panicked at {location}\n{}", Backtrace::force_capture());
                FAULT_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            }
            previous(info);
        }));
    });
}

/// Runs `f`, turning a panic into [`RunError::Unexpected`] with the trace taken where it fired.
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    install_fault_hook();
    GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let outcome = catch_unwind(AssertUnwindSafe(f));
    GUARD_DEPTH.with(|depth| depth.set(depth.get() - 1));

    outcome.unwrap_or_else(|payload| {
        let trace = FAULT_TRACE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| Backtrace::force_capture().to_string());
        Err(RunError::Unexpected {
            message: panic_message(payload.as_ref()),
            trace,
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

fn execute(request: &RunRequest, progress: &Progress<'_>, cancel: &CancelFlag) -> Result<RunSummary> {
    let total = request.sources.len();
    progress.report(
        RunState::Loading { done: 0, total },
        START_PERCENT,
        "starting processing",
    );
    if total == 0 {
        return Err(RunError::EmptyResult);
    }
    let applier = PredicateApplier::new(&request.predicates, &request.vocabulary);

    let filtered = if request.parallel {
        filter_parallel(request, &applier, progress, cancel)?
    } else {
        filter_sequential(request, &applier, progress, cancel)?
    };

    let per_source = request
        .sources
        .iter()
        .zip(&filtered)
        .map(|(source, table)| SourceCount {
            key:  source.key.clone(),
            rows: table.len(),
        })
        .collect::<Vec<_>>();

    cancel.check()?;
    progress.report(RunState::Merging, progress.current(), "merging final data");
    let merged = pipeline::concat(filtered);
    if merged.is_empty() {
        return Err(RunError::EmptyResult);
    }
    let (merged, duplicates_removed) = pipeline::dedup(merged);
    info!(rows = merged.len(), duplicates_removed, "merged sources");
    progress.report(RunState::Merging, MERGED_PERCENT, "merged final data");

    cancel.check()?;
    progress.report(RunState::Sampling, MERGED_PERCENT, "sampling rows");
    let mut rng = match request.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let (table, sampled) = pipeline::sample(merged, request.predicates.display_count, &mut rng);

    cancel.check()?;
    progress.report(RunState::Writing, WRITING_PERCENT, "saving output file");
    write_table(&table, &request.output).map_err(|cause| RunError::Write {
        path: request.output.clone(),
        cause,
    })?;

    Ok(RunSummary {
        output: request.output.clone(),
        rows: table.len(),
        per_source,
        duplicates_removed,
        sampled,
    })
}

fn load_and_filter(source: &SourceDescriptor, applier: &PredicateApplier) -> Result<Table> {
    let table = load_table(&source.path).map_err(|cause| RunError::Load {
        source_key: source.key.clone(),
        path: source.path.clone(),
        cause,
    })?;
    let loaded = table.len();
    let filtered = applier.apply(table);
    info!(source = %source.key, loaded, kept = filtered.len(), "filtered source");
    Ok(filtered)
}

fn filter_sequential(
    request: &RunRequest,
    applier: &PredicateApplier,
    progress: &Progress<'_>,
    cancel: &CancelFlag,
) -> Result<Vec<Table>> {
    let total = request.sources.len();
    let mut tables = Vec::with_capacity(total);
    for (idx, source) in request.sources.iter().enumerate() {
        cancel.check()?;
        progress.report(
            RunState::Loading { done: idx, total },
            progress.current(),
            &format!("processing platform: {}...", source.key),
        );
        tables.push(load_and_filter(source, applier)?);
        progress.report(
            RunState::Loading {
                done: idx + 1,
                total,
            },
            loading_percent(idx + 1, total),
            &format!("processed platform: {}", source.key),
        );
    }
    Ok(tables)
}

fn filter_parallel(
    request: &RunRequest,
    applier: &PredicateApplier,
    progress: &Progress<'_>,
    cancel: &CancelFlag,
) -> Result<Vec<Table>> {
    let total = request.sources.len();
    let done = AtomicUsize::new(0);
    // collect keeps source order regardless of completion order
    request
        .sources
        .par_iter()
        .map(|source| {
            // pool threads record their own fault trace
            guarded(|| {
                cancel.check()?;
                let table = load_and_filter(source, applier)?;
                let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                progress.report(
                    RunState::Loading {
                        done: finished,
                        total,
                    },
                    loading_percent(finished, total),
                    &format!("processed platform: {}", source.key),
                );
                Ok(table)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_percent_schedule() {
        assert_eq!(loading_percent(0, 4), 5);
        assert_eq!(loading_percent(2, 4), 42);
        assert_eq!(loading_percent(4, 4), 80);
        assert_eq!(loading_percent(0, 0), 5);
    }

    #[test]
    fn progress_never_decreases() {
        let seen = Mutex::new(Vec::new());
        let observer = |_: RunState, percent: u8, _: &str| {
            seen.lock().unwrap().push(percent);
        };
        let progress = Progress::new(&observer);
        progress.report(RunState::Merging, 50, "");
        progress.report(RunState::Merging, 30, "");
        progress.report(RunState::Writing, 120, "");
        assert_eq!(*seen.lock().unwrap(), [50, 50, 100]);
    }

    #[test]
    fn empty_source_selection_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.xlsx");
        let request = RunRequest::builder()
            .sources(Vec::new())
            .output(&output)
            .build();
        let states = Mutex::new(Vec::new());
        let observer = |state: RunState, _: u8, _: &str| states.lock().unwrap().push(state);

        let err = run(&request, &observer, &CancelFlag::new()).unwrap_err();
        assert!(matches!(err, RunError::EmptyResult));
        assert!(!output.exists());
        let states = states.into_inner().unwrap();
        assert_eq!(states.last(), Some(&RunState::Failed));
        assert_eq!(states.iter().filter(|s| **s == RunState::Failed).count(), 1);
    }

    #[test]
    fn cancelled_run_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("a.csv");
        std::fs::write(&source, "title\nx\n").unwrap();
        let output = dir.path().join("out.csv");
        let request = RunRequest::builder()
            .sources(vec![SourceDescriptor::new("a", &source)])
            .output(&output)
            .build();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = run(&request, &NoProgress, &cancel).unwrap_err();
        assert!(matches!(err, RunError::Cancelled));
        assert!(!output.exists());
    }

    #[inline(never)]
    fn explode_while_merging() {
        panic!("observer exploded");
    }

    #[inline(never)]
    fn explode_while_loading() {
        panic!("pool observer exploded");
    }

    struct Exploding;

    impl ProgressObserver for Exploding {
        fn on_progress(&self, state: RunState, _: u8, _: &str) {
            match state {
                RunState::Merging => explode_while_merging(),
                RunState::Loading { done, .. } if done > 0 => explode_while_loading(),
                _ => {},
            }
        }
    }

    fn one_source_request(dir: &std::path::Path, parallel: bool) -> RunRequest {
        let source = dir.join("a.csv");
        std::fs::write(&source, "title\nx\n").unwrap();
        RunRequest::builder()
            .sources(vec![SourceDescriptor::new("a", &source)])
            .parallel(parallel)
            .output(dir.join("out.csv"))
            .build()
    }

    #[test]
    fn panics_become_unexpected_failures() {
        struct ExplodeOnMerge;
        impl ProgressObserver for ExplodeOnMerge {
            fn on_progress(&self, state: RunState, _: u8, _: &str) {
                if state == RunState::Merging {
                    explode_while_merging();
                }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let request = one_source_request(dir.path(), false);

        let err = run(&request, &ExplodeOnMerge, &CancelFlag::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Unexpected);
        assert!(err.to_string().contains("observer exploded"));
        let trace = err.trace().unwrap();
        assert!(trace.starts_with("panicked at "), "{trace}");
        assert!(trace.contains("orchestrator.rs"), "{trace}");
        assert!(trace.contains("explode_while_merging"), "{trace}");
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn pool_thread_panics_keep_their_fault_trace() {
        let dir = tempfile::tempdir().unwrap();
        let request = one_source_request(dir.path(), true);

        let err = run(&request, &Exploding, &CancelFlag::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::Unexpected);
        assert!(err.to_string().contains("pool observer exploded"));
        assert!(err.trace().unwrap().contains("explode_while_loading"));
        assert!(!dir.path().join("out.csv").exists());
    }

    #[test]
    fn panics_outside_a_run_leave_no_stale_trace() {
        install_fault_hook();
        let caught = catch_unwind(explode_while_loading);
        assert!(caught.is_err());
        assert!(FAULT_TRACE.with(|slot| slot.borrow().is_none()));
    }
}

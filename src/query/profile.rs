use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// A snapshot of per-stage execution timings.
///
/// Profiling is enabled via the `FEDQL_PROFILE` environment variable; every
/// pipeline stage of the executor adds its elapsed time and a call count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryProfileSnapshot {
    /// Total nanoseconds spent populating tables from a backing.
    pub resolve_ns: u64,
    /// Number of table populations.
    pub resolve_count: u64,
    /// Total nanoseconds spent in nested-loop joins.
    pub join_ns: u64,
    /// Number of join steps.
    pub join_count: u64,
    /// Total nanoseconds spent filtering.
    pub filter_ns: u64,
    /// Number of filter passes.
    pub filter_count: u64,
    /// Total nanoseconds spent sorting.
    pub sort_ns: u64,
    /// Number of sorts.
    pub sort_count: u64,
    /// Total nanoseconds spent projecting.
    pub project_ns: u64,
    /// Number of projections.
    pub project_count: u64,
    /// Total nanoseconds spent applying aggregates.
    pub aggregate_ns: u64,
    /// Number of aggregate phases.
    pub aggregate_count: u64,
}

impl fmt::Display for QueryProfileSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages = [
            ("resolve", self.resolve_count, self.resolve_ns),
            ("join", self.join_count, self.join_ns),
            ("filter", self.filter_count, self.filter_ns),
            ("sort", self.sort_count, self.sort_ns),
            ("project", self.project_count, self.project_ns),
            ("aggregate", self.aggregate_count, self.aggregate_ns),
        ];
        for (idx, (name, count, ns)) in stages.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{name}={count}/{ns}ns")?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct QueryProfileCounters {
    resolve_ns: AtomicU64,
    resolve_count: AtomicU64,
    join_ns: AtomicU64,
    join_count: AtomicU64,
    filter_ns: AtomicU64,
    filter_count: AtomicU64,
    sort_ns: AtomicU64,
    sort_count: AtomicU64,
    project_ns: AtomicU64,
    project_count: AtomicU64,
    aggregate_ns: AtomicU64,
    aggregate_count: AtomicU64,
}

static PROFILE_ENABLED: OnceLock<bool> = OnceLock::new();
static PROFILE_COUNTERS: OnceLock<QueryProfileCounters> = OnceLock::new();

fn profiling_enabled() -> bool {
    *PROFILE_ENABLED.get_or_init(|| std::env::var_os("FEDQL_PROFILE").is_some())
}

fn counters() -> Option<&'static QueryProfileCounters> {
    profiling_enabled().then(|| PROFILE_COUNTERS.get_or_init(QueryProfileCounters::default))
}

pub(crate) fn profile_timer() -> Option<Instant> {
    profiling_enabled().then(Instant::now)
}

pub(crate) enum QueryProfileKind {
    Resolve,
    Join,
    Filter,
    Sort,
    Project,
    Aggregate,
}

pub(crate) fn record_profile_timer(kind: QueryProfileKind, start: Option<Instant>) {
    let Some(start) = start else {
        return;
    };
    let Some(counters) = counters() else {
        return;
    };
    let nanos = start.elapsed().as_nanos().min(u64::MAX as u128) as u64;
    counters.record(kind, nanos);
}

impl QueryProfileCounters {
    fn record(&self, kind: QueryProfileKind, nanos: u64) {
        let (ns, count) = match kind {
            QueryProfileKind::Resolve => (&self.resolve_ns, &self.resolve_count),
            QueryProfileKind::Join => (&self.join_ns, &self.join_count),
            QueryProfileKind::Filter => (&self.filter_ns, &self.filter_count),
            QueryProfileKind::Sort => (&self.sort_ns, &self.sort_count),
            QueryProfileKind::Project => (&self.project_ns, &self.project_count),
            QueryProfileKind::Aggregate => (&self.aggregate_ns, &self.aggregate_count),
        };
        ns.fetch_add(nanos, Ordering::Relaxed);
        count.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, reset: bool) -> QueryProfileSnapshot {
        let load = |counter: &AtomicU64| {
            if reset {
                counter.swap(0, Ordering::Relaxed)
            } else {
                counter.load(Ordering::Relaxed)
            }
        };
        QueryProfileSnapshot {
            resolve_ns: load(&self.resolve_ns),
            resolve_count: load(&self.resolve_count),
            join_ns: load(&self.join_ns),
            join_count: load(&self.join_count),
            filter_ns: load(&self.filter_ns),
            filter_count: load(&self.filter_count),
            sort_ns: load(&self.sort_ns),
            sort_count: load(&self.sort_count),
            project_ns: load(&self.project_ns),
            project_count: load(&self.project_count),
            aggregate_ns: load(&self.aggregate_ns),
            aggregate_count: load(&self.aggregate_count),
        }
    }
}

/// Retrieves a snapshot of the stage counters.
///
/// Returns `None` when `FEDQL_PROFILE` is unset. With `reset` the counters
/// are zeroed as they are read.
///
/// ```no_run
/// use fedql::query::profile::profile_snapshot;
///
/// if let Some(snapshot) = profile_snapshot(true) {
///     println!("joins: {} in {}ns", snapshot.join_count, snapshot.join_ns);
/// }
/// ```
pub fn profile_snapshot(reset: bool) -> Option<QueryProfileSnapshot> {
    counters().map(|counters| counters.snapshot(reset))
}

//! Worker-parallelism degree for tree construction.

use rayon::ThreadPoolBuilder;
use tracing::{Span, debug};

use crate::error::RsfError;

/// Cores kept free when every available core is requested.
const RESERVED_CORES: usize = 1;

/// Requested parallelism for a fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NJobs {
    /// Run on the calling thread only.
    #[default]
    Single,
    /// Use exactly this many workers (zero is treated as one).
    Fixed(usize),
    /// Use every available core but one.
    AllButReserved,
}

impl NJobs {
    /// Interpret a raw `n_jobs` value: `None` ⇒ 1, `-1` ⇒ all-but-reserved, `n > 0` ⇒ `n`.
    ///
    /// # Errors
    ///
    /// Returns [`RsfError::InvalidJobCount`] for `0` or any value below `-1`.
    pub fn from_raw(n_jobs: Option<i64>) -> Result<Self, RsfError> {
        match n_jobs {
            None => Ok(NJobs::Single),
            Some(-1) => Ok(NJobs::AllButReserved),
            Some(n) if n > 0 => Ok(NJobs::Fixed(n as usize)),
            Some(n) => Err(RsfError::InvalidJobCount { n_jobs: n }),
        }
    }

    /// Resolve to a concrete worker count (always at least 1).
    #[must_use]
    pub fn resolve(self) -> usize {
        match self {
            NJobs::Single => 1,
            NJobs::Fixed(n) => n.max(1),
            NJobs::AllButReserved => num_cpus::get().saturating_sub(RESERVED_CORES).max(1),
        }
    }
}

/// Run `f` inside a dedicated pool of exactly `n_jobs` workers.
///
/// Every rayon iterator reached from `f` runs on that pool, never on the
/// global one, so a degree of 1 is genuinely single-threaded.
pub(crate) fn run_with_jobs<R: Send>(
    n_jobs: usize,
    f: impl FnOnce() -> R + Send,
) -> Result<R, RsfError> {
    let n_jobs = n_jobs.max(1);
    let pool = ThreadPoolBuilder::new()
        .num_threads(n_jobs)
        .build()
        .map_err(|source| RsfError::ThreadPool { n_jobs, source })?;
    debug!(n_jobs, "worker pool created");
    let span = Span::current();
    Ok(pool.install(move || span.in_scope(f)))
}

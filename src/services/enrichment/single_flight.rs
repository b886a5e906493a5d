use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::enrichment::EnrichmentJob;

/// Tracks which (poem, workflow) pairs are running.
///
/// The value records whether another request for the same key arrived
/// while it was running; such requests collapse into one re-run.
#[derive(Default)]
pub(crate) struct InFlight {
    jobs: Mutex<HashMap<EnrichmentJob, bool>>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashMap<EnrichmentJob, bool>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `job`, or flag it for a re-run if it is already claimed.
    pub(crate) fn claim(&self, job: EnrichmentJob) -> Option<Claim<'_>> {
        let mut jobs = self.lock();
        if let Some(rerun) = jobs.get_mut(&job) {
            *rerun = true;
            return None;
        }
        jobs.insert(job, false);
        Some(Claim {
            owner: self,
            job,
            released: false,
        })
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self, job: &EnrichmentJob) -> bool {
        self.lock().contains_key(job)
    }
}

/// Exclusive right to run one job. Dropping it releases the key.
pub(crate) struct Claim<'a> {
    owner: &'a InFlight,
    job: EnrichmentJob,
    released: bool,
}

impl Claim<'_> {
    /// Either consume a pending re-run request (returns `true`) or release
    /// the key. Both happen under one lock so no request is lost.
    pub(crate) fn rerun_requested(&mut self) -> bool {
        let mut jobs = self.owner.lock();
        match jobs.get_mut(&self.job) {
            Some(rerun) if *rerun => {
                *rerun = false;
                true
            }
            _ => {
                jobs.remove(&self.job);
                self.released = true;
                false
            }
        }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.owner.lock().remove(&self.job);
        }
    }
}

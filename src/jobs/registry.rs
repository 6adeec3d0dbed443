//! # Job Registry
//!
//! Bounded, insertion-ordered map from job id to job record.
//!
//! ## Eviction Policy:
//! Before every insert the registry makes room:
//! 1. Jobs older than the retention horizon are dropped
//! 2. If the resident count would still meet or exceed the maximum, the
//!    oldest-inserted jobs are dropped until there is room for one more
//!
//! The job being processed is never evicted. Evicted records are handed back
//! to the caller, which owns deleting their files.
//!
//! ## Why IndexMap:
//! Lookup by id is O(1) like a HashMap, and iteration follows insertion order,
//! which is exactly "oldest first" for eviction and listing.

use crate::jobs::model::{Job, JobId, JobStatus};
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;

#[derive(Debug)]
pub struct JobRegistry {
    jobs: IndexMap<JobId, Job>,
    max_jobs: usize,
    max_age: Duration,
}

impl JobRegistry {
    pub fn new(max_jobs: usize, max_age: Duration) -> Self {
        Self {
            jobs: IndexMap::new(),
            max_jobs: max_jobs.max(1),
            max_age,
        }
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    /// Insert a new job after enforcing capacity. Returns the evicted records.
    pub fn insert(&mut self, job: Job, now: DateTime<Utc>) -> Vec<Job> {
        let mut evicted = self.evict_older_than(self.max_age, now);

        while self.jobs.len() >= self.max_jobs {
            match self.oldest_evictable() {
                Some(id) => evicted.extend(self.remove(&id)),
                None => break,
            }
        }

        self.jobs.insert(job.id.clone(), job);
        evicted
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    /// Remove a job, keeping the insertion order of the rest.
    pub fn remove(&mut self, id: &JobId) -> Option<Job> {
        self.jobs.shift_remove(id)
    }

    /// All resident jobs, oldest first.
    pub fn all(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Drop every job at least `age` old, except one that is processing.
    ///
    /// A zero age therefore drops everything that isn't processing.
    pub fn evict_older_than(&mut self, age: Duration, now: DateTime<Utc>) -> Vec<Job> {
        let expired: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| job.status != JobStatus::Processing && job.age(now) >= age)
            .map(|job| job.id.clone())
            .collect();

        expired.iter().filter_map(|id| self.remove(id)).collect()
    }

    fn oldest_evictable(&self) -> Option<JobId> {
        self.jobs
            .values()
            .find(|job| job.status != JobStatus::Processing)
            .map(|job| job.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::CaptionFormat;
    use crate::jobs::model::NewJob;
    use std::path::PathBuf;

    fn job_at(name: &str, created_at: DateTime<Utc>) -> Job {
        Job::new(
            NewJob {
                id: JobId::from(name),
                filename: format!("{}.mp4", name),
                source_path: PathBuf::from(format!("/tmp/{}.mp4", name)),
                output_format: CaptionFormat::Srt,
                use_vad: true,
                language: None,
            },
            created_at,
        )
    }

    fn ids(registry: &JobRegistry) -> Vec<String> {
        registry.all().map(|job| job.id.to_string()).collect()
    }

    #[test]
    fn test_capacity_evicts_oldest_inserted() {
        let now = Utc::now();
        let mut registry = JobRegistry::new(3, Duration::hours(24));

        for name in ["a", "b", "c"] {
            assert!(registry.insert(job_at(name, now), now).is_empty());
        }
        let evicted = registry.insert(job_at("d", now), now);

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, JobId::from("a"));
        assert_eq!(ids(&registry), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_age_evicts_expired_jobs() {
        let now = Utc::now();
        let mut registry = JobRegistry::new(10, Duration::hours(1));

        assert!(registry.insert(job_at("old", now - Duration::hours(2)), now).is_empty());
        // Expired jobs are swept before the next insert, well under capacity.
        let evicted = registry.insert(job_at("fresh", now - Duration::minutes(5)), now);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, JobId::from("old"));

        assert!(registry.insert(job_at("new", now), now).is_empty());
        assert_eq!(ids(&registry), vec!["fresh", "new"]);
    }

    #[test]
    fn test_evict_older_than_keeps_recent_jobs() {
        let now = Utc::now();
        let mut registry = JobRegistry::new(10, Duration::hours(24));
        registry.insert(job_at("stale", now - Duration::hours(3)), now);
        registry.insert(job_at("recent", now - Duration::minutes(30)), now);

        let evicted = registry.evict_older_than(Duration::hours(1), now);

        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, JobId::from("stale"));
        assert_eq!(ids(&registry), vec!["recent"]);
    }

    #[test]
    fn test_processing_job_is_never_evicted() {
        let now = Utc::now();
        let mut registry = JobRegistry::new(2, Duration::hours(1));

        let mut busy = job_at("busy", now - Duration::hours(5));
        busy.mark_processing(now);
        registry.insert(busy, now);
        registry.insert(job_at("b", now), now);

        let evicted = registry.insert(job_at("c", now), now);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].id, JobId::from("b"));
        assert_eq!(ids(&registry), vec!["busy", "c"]);

        let swept = registry.evict_older_than(Duration::zero(), now);
        assert!(swept.iter().all(|job| job.id == JobId::from("c")));
        assert_eq!(ids(&registry), vec!["busy"]);
    }

    #[test]
    fn test_remove_keeps_order() {
        let now = Utc::now();
        let mut registry = JobRegistry::new(5, Duration::hours(1));
        for name in ["a", "b", "c"] {
            registry.insert(job_at(name, now), now);
        }

        assert!(registry.remove(&JobId::from("b")).is_some());
        assert!(registry.remove(&JobId::from("b")).is_none());
        assert_eq!(ids(&registry), vec!["a", "c"]);
    }
}

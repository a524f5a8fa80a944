use crate::job::{Job, JobType, Pool};
use crate::policy::Policy;

/// Jobs waiting for a machine in one pool.
///
/// Insertion order carries no meaning: the policy picks the job to
/// remove at `take` time, and no ordering is maintained in between.
#[derive(Debug, Default)]
pub struct Queue {
    jobs: Vec<Job>,
}

impl Queue {
    pub fn new() -> Self {
        Self { jobs: vec![] }
    }

    pub fn add(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// The waiting jobs, in insertion order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// True when at least one H job is waiting.
    pub fn has_high(&self) -> bool {
        self.jobs.iter().any(|job| job.job_type == JobType::High)
    }

    /// Remove and return the job `policy` picks for `pool` at `now`,
    /// or `None` on an empty queue.
    pub fn take(&mut self, policy: &Policy, pool: Pool, now: f64) -> Option<Job> {
        policy
            .select(&self.jobs, pool, now)
            .map(|index| self.jobs.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normal(job_id: u64, due: f64) -> Job {
        Job::new(job_id, JobType::Normal, 0.0, 560.0, due)
    }

    #[test]
    fn test_queue_take_removes_exactly_one() {
        let mut queue = Queue::new();
        queue.add(normal(1, 2000.0));
        queue.add(normal(2, 1500.0));
        queue.add(normal(3, 1800.0));
        assert_eq!(queue.len(), 3);

        let taken = queue.take(&Policy::Edd, Pool::A, 0.0).unwrap();
        assert_eq!(taken.job_id, 2);
        assert_eq!(queue.len(), 2);
        assert!(queue.jobs().iter().all(|job| job.job_id != 2));

        let taken = queue.take(&Policy::Edd, Pool::A, 0.0).unwrap();
        assert_eq!(taken.job_id, 3);
        let taken = queue.take(&Policy::Edd, Pool::A, 0.0).unwrap();
        assert_eq!(taken.job_id, 1);
        assert!(queue.take(&Policy::Edd, Pool::A, 0.0).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_has_high() {
        let mut queue = Queue::new();
        queue.add(normal(1, 2000.0));
        assert!(!queue.has_high());
        queue.add(Job::new(2, JobType::High, 0.0, 500.0, 2000.0));
        assert!(queue.has_high());
    }
}

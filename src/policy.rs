use noisy_float::prelude::*;

use crate::job::{Job, JobType, Pool};
use crate::simulation::Config;

/// Dispatching strategy: where an arriving order is routed and in which
/// order queued orders are started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    /// First come, first served; arrivals balance onto the less loaded pool.
    Fcfs,
    /// Earliest due date; same baseline routing as `Policy::Fcfs`.
    Edd,
    /// Minimum slack (due date minus expected duration minus now);
    /// same baseline routing as `Policy::Fcfs`.
    MinSlk,
    /// Threshold routing: N may use B only when A is congested, B is idle
    /// and empty, and no H arrival is imminent. On B, H runs strictly
    /// before N.
    Opt,
    /// Strict partitioning: B is kept for H through routing, a look-ahead
    /// reservation of idle B machines, and absolute in-queue priority.
    Composite,
}

impl Policy {
    pub fn from(policy: &str) -> anyhow::Result<Self> {
        match policy {
            "fcfs" => Ok(Policy::Fcfs),
            "edd" => Ok(Policy::Edd),
            "min-slk" => Ok(Policy::MinSlk),
            "opt" => Ok(Policy::Opt),
            "composite" => Ok(Policy::Composite),
            _ => Err(anyhow::anyhow!("unknown policy: {}", policy)),
        }
    }

    pub fn all() -> Vec<Policy> {
        vec![
            Policy::Fcfs,
            Policy::Edd,
            Policy::MinSlk,
            Policy::Opt,
            Policy::Composite,
        ]
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Policy::Fcfs => "fcfs",
                Policy::Edd => "edd",
                Policy::MinSlk => "min-slk",
                Policy::Opt => "opt",
                Policy::Composite => "composite",
            }
        )
    }
}

/// Snapshot of the shop state consumed by a routing decision.
#[derive(Debug, Clone, Copy)]
pub struct RoutingState {
    /// Jobs waiting in A's queue.
    pub a_queue_len: usize,
    /// A machines currently processing.
    pub a_in_service: usize,
    /// Jobs waiting in B's queue.
    pub b_queue_len: usize,
    /// B machines currently processing.
    pub b_in_service: usize,
    /// Arrival time of the next H order strictly after now, if any.
    pub next_h_arrival: Option<f64>,
    /// H orders currently queued on or processed by pool B.
    pub h_in_b_system: usize,
}

/// True when no H arrival falls within the reservation window after `now`.
fn clear_of_next_h(next_h_arrival: Option<f64>, now: f64, window: f64) -> bool {
    match next_h_arrival {
        None => true,
        Some(t) => t - now >= window,
    }
}

impl Policy {
    /// Decide the pool an arriving job is dispatched to.
    ///
    /// H jobs always go to B. The decision depends only on the job class
    /// and the state snapshot, never on the job id.
    pub fn route(&self, job: &Job, now: f64, state: &RoutingState, config: &Config) -> Pool {
        if job.job_type == JobType::High {
            return Pool::B;
        }
        let a_load = state.a_queue_len + state.a_in_service;
        let b_load = state.b_queue_len + state.b_in_service;
        match self {
            Policy::Fcfs | Policy::Edd | Policy::MinSlk => {
                if a_load >= b_load {
                    Pool::B
                } else {
                    Pool::A
                }
            }
            Policy::Opt => {
                if a_load >= config.a_busy_threshold
                    && b_load == 0
                    && clear_of_next_h(state.next_h_arrival, now, config.b_reservation_window)
                {
                    Pool::B
                } else {
                    Pool::A
                }
            }
            Policy::Composite => {
                if a_load >= config.a_queue_strict_limit
                    && b_load == 0
                    && state.h_in_b_system == 0
                    && clear_of_next_h(state.next_h_arrival, now, config.b_reservation_window)
                {
                    Pool::B
                } else {
                    Pool::A
                }
            }
        }
    }

    /// Pick the next job to start among `queue` on `pool` and return its
    /// index. Every tie falls to the lower job id, which keeps runs
    /// reproducible.
    pub fn select(&self, queue: &[Job], pool: Pool, now: f64) -> Option<usize> {
        let key = |job: &Job| -> (u8, N64, u64) {
            match (self, pool) {
                (Policy::Fcfs, _) => (0, n64(job.arrival_time), job.job_id),
                (Policy::Edd, _) => (0, n64(job.due_date), job.job_id),
                (Policy::MinSlk, _) => (0, n64(job.slack(now)), job.job_id),
                (Policy::Composite, Pool::B) => match job.job_type {
                    JobType::High => (0, n64(job.due_date), job.job_id),
                    JobType::Normal => (1, n64(job.slack(now)), job.job_id),
                },
                (Policy::Composite, Pool::A) => (0, n64(job.slack(now)), job.job_id),
                (Policy::Opt, Pool::B) => {
                    let class = match job.job_type {
                        JobType::High => 0,
                        JobType::Normal => 1,
                    };
                    (class, n64(job.due_date), job.job_id)
                }
                (Policy::Opt, Pool::A) => (0, n64(job.due_date), job.job_id),
            }
        };
        queue
            .iter()
            .enumerate()
            .min_by_key(|(_, job)| key(job))
            .map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::default()
    }

    fn normal(job_id: u64, arrival: f64, expected: f64, due: f64) -> Job {
        Job::new(job_id, JobType::Normal, arrival, expected, due)
    }

    fn high(job_id: u64, arrival: f64, due: f64) -> Job {
        Job::new(job_id, JobType::High, arrival, 500.0, due)
    }

    fn state(
        a_queue_len: usize,
        a_in_service: usize,
        b_queue_len: usize,
        b_in_service: usize,
    ) -> RoutingState {
        RoutingState {
            a_queue_len,
            a_in_service,
            b_queue_len,
            b_in_service,
            next_h_arrival: None,
            h_in_b_system: 0,
        }
    }

    #[test]
    fn test_policy_from() {
        for policy in Policy::all() {
            assert_eq!(Policy::from(&policy.to_string()).unwrap(), policy);
        }
        assert!(Policy::from("round-robin").is_err());
    }

    #[test]
    fn test_route_high_always_to_b() {
        let job = high(1, 0.0, 1500.0);
        for policy in Policy::all() {
            assert_eq!(policy.route(&job, 0.0, &state(9, 3, 0, 0), &config()), Pool::B);
        }
    }

    #[test]
    fn test_route_baseline_load_balance() {
        let job = normal(1, 0.0, 560.0, 2000.0);
        for policy in [Policy::Fcfs, Policy::Edd, Policy::MinSlk] {
            assert_eq!(policy.route(&job, 0.0, &state(0, 0, 0, 0), &config()), Pool::B);
            assert_eq!(policy.route(&job, 0.0, &state(2, 1, 1, 1), &config()), Pool::B);
            assert_eq!(policy.route(&job, 0.0, &state(0, 1, 1, 1), &config()), Pool::A);
        }
    }

    #[test]
    fn test_route_opt_threshold() {
        let job = normal(1, 0.0, 560.0, 2000.0);
        let cfg = config();
        // below the A threshold, or with B occupied: stay on A
        assert_eq!(Policy::Opt.route(&job, 0.0, &state(2, 1, 0, 0), &cfg), Pool::A);
        assert_eq!(Policy::Opt.route(&job, 0.0, &state(4, 1, 0, 1), &cfg), Pool::A);
        // congested A, idle B, no H anywhere ahead
        assert_eq!(Policy::Opt.route(&job, 0.0, &state(3, 1, 0, 0), &cfg), Pool::B);
    }

    #[test]
    fn test_route_opt_reservation_window() {
        let job = normal(1, 0.0, 560.0, 2000.0);
        let cfg = config();
        let mut s = state(5, 1, 0, 0);
        s.next_h_arrival = Some(30.0);
        assert_eq!(Policy::Opt.route(&job, 0.0, &s, &cfg), Pool::A);
        // at exactly the window boundary the H is no longer imminent
        s.next_h_arrival = Some(cfg.b_reservation_window);
        assert_eq!(Policy::Opt.route(&job, 0.0, &s, &cfg), Pool::B);
    }

    #[test]
    fn test_route_composite_strict() {
        let job = normal(1, 0.0, 560.0, 2000.0);
        let cfg = config();
        assert_eq!(
            Policy::Composite.route(&job, 0.0, &state(6, 1, 0, 0), &cfg),
            Pool::B
        );
        // any H in B's system forbids N on B
        let mut s = state(6, 1, 0, 0);
        s.h_in_b_system = 1;
        assert_eq!(Policy::Composite.route(&job, 0.0, &s, &cfg), Pool::A);
        // below the strict limit
        assert_eq!(
            Policy::Composite.route(&job, 0.0, &state(4, 1, 0, 0), &cfg),
            Pool::A
        );
        // imminent H arrival
        let mut s = state(6, 1, 0, 0);
        s.next_h_arrival = Some(10.0);
        assert_eq!(Policy::Composite.route(&job, 0.0, &s, &cfg), Pool::A);
    }

    #[test]
    fn test_route_ignores_job_id() {
        let cfg = config();
        let twin_a = normal(3, 10.0, 560.0, 2000.0);
        let twin_b = normal(900, 10.0, 560.0, 2000.0);
        for policy in Policy::all() {
            for s in [state(0, 0, 0, 0), state(5, 2, 1, 0), state(9, 3, 0, 0)] {
                assert_eq!(
                    policy.route(&twin_a, 10.0, &s, &cfg),
                    policy.route(&twin_b, 10.0, &s, &cfg)
                );
            }
        }
    }

    #[test]
    fn test_select_fcfs_edd_minslk() {
        let queue = vec![
            normal(1, 5.0, 1200.0, 2600.0),
            normal(2, 3.0, 560.0, 3000.0),
            normal(3, 8.0, 600.0, 2500.0),
        ];
        // FCFS: earliest arrival
        assert_eq!(Policy::Fcfs.select(&queue, Pool::A, 10.0), Some(1));
        // EDD: earliest due date
        assert_eq!(Policy::Edd.select(&queue, Pool::A, 10.0), Some(2));
        // MinSLK: job 1 has the least slack (2600 - 1200 - 10)
        assert_eq!(Policy::MinSlk.select(&queue, Pool::A, 10.0), Some(0));
        // equal due dates, the larger expected duration loses more slack
        let queue = vec![normal(1, 5.0, 100.0, 2500.0), normal(2, 3.0, 560.0, 2500.0)];
        assert_eq!(Policy::MinSlk.select(&queue, Pool::A, 10.0), Some(1));
    }

    #[test]
    fn test_select_composite_high_first_on_b() {
        let queue = vec![
            normal(1, 0.0, 560.0, 900.0),
            high(2, 0.0, 5000.0),
            high(3, 0.0, 4000.0),
        ];
        // H strictly first even when an N is far more urgent; EDD among H
        assert_eq!(Policy::Composite.select(&queue, Pool::B, 0.0), Some(2));
        // without H, minimum slack among N
        let queue = vec![normal(1, 0.0, 100.0, 2000.0), normal(2, 0.0, 560.0, 2000.0)];
        assert_eq!(Policy::Composite.select(&queue, Pool::B, 0.0), Some(1));
        // on A, composite is minimum slack
        assert_eq!(Policy::Composite.select(&queue, Pool::A, 0.0), Some(1));
    }

    #[test]
    fn test_select_opt_high_first_on_b() {
        let queue = vec![
            normal(1, 0.0, 560.0, 900.0),
            high(2, 0.0, 5000.0),
            high(3, 0.0, 4000.0),
        ];
        assert_eq!(Policy::Opt.select(&queue, Pool::B, 0.0), Some(2));
        // on A, OPT orders by due date
        let queue = vec![normal(1, 0.0, 560.0, 2100.0), normal(2, 0.0, 560.0, 2000.0)];
        assert_eq!(Policy::Opt.select(&queue, Pool::A, 0.0), Some(1));
    }

    #[test]
    fn test_select_tie_break_by_job_id() {
        let queue = vec![
            normal(9, 0.0, 560.0, 2000.0),
            normal(4, 0.0, 560.0, 2000.0),
            normal(7, 0.0, 560.0, 2000.0),
        ];
        for policy in Policy::all() {
            for pool in [Pool::A, Pool::B] {
                assert_eq!(policy.select(&queue, pool, 0.0), Some(1));
            }
        }
    }

    #[test]
    fn test_select_empty_queue() {
        assert_eq!(Policy::Fcfs.select(&[], Pool::A, 0.0), None);
    }
}

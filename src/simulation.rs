use noisy_float::prelude::*;

use crate::job::{Job, JobType, Pool, SimulationResult};
use crate::policy::{Policy, RoutingState};
use crate::queue::Queue;
use crate::sampler::{Sampler, TriangularParams};

/// Shop configuration, passed explicitly into every simulation.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of machines in pool A (slower, N only).
    pub a_machines: usize,
    /// Number of machines in pool B (faster, mandatory for H).
    pub b_machines: usize,
    /// Processing time of N jobs on pool A, in minutes.
    pub tri_a_n: TriangularParams,
    /// Processing time of H jobs on pool B, in minutes.
    pub tri_b_h: TriangularParams,
    /// Processing time of N jobs on pool B, in minutes.
    pub tri_b_n: TriangularParams,
    /// A load (queue plus in-service) at or above which OPT may route N to B.
    pub a_busy_threshold: usize,
    /// A load at or above which COMPOSITE may route N to B.
    pub a_queue_strict_limit: usize,
    /// Lead time during which an idle B machine is kept for an imminent H,
    /// in minutes.
    pub b_reservation_window: f64,
    /// Due-date slack multiplier applied by the loader.
    pub due_date_factor: f64,
    /// Seed of every pseudo-random stream.
    pub base_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            a_machines: 3,
            b_machines: 2,
            tri_a_n: TriangularParams::new(360.0, 480.0, 840.0),
            tri_b_h: TriangularParams::new(300.0, 400.0, 800.0),
            tri_b_n: TriangularParams::new(200.0, 280.0, 600.0),
            a_busy_threshold: 4,
            a_queue_strict_limit: 6,
            b_reservation_window: 60.0,
            due_date_factor: 3.0,
            base_seed: 42,
        }
    }
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.a_machines > 0, "vanishing A pool capacity");
        anyhow::ensure!(self.b_machines > 0, "vanishing B pool capacity");
        self.tri_a_n.validate("tri-a-n")?;
        self.tri_b_h.validate("tri-b-h")?;
        self.tri_b_n.validate("tri-b-n")?;
        anyhow::ensure!(
            self.b_reservation_window.is_finite() && self.b_reservation_window >= 0.0,
            "invalid reservation window"
        );
        anyhow::ensure!(
            self.due_date_factor.is_finite() && self.due_date_factor > 0.0,
            "invalid due date factor"
        );
        Ok(())
    }

    pub fn sampler(&self) -> Sampler {
        Sampler::new(self.base_seed, self.tri_a_n, self.tri_b_h, self.tri_b_n)
    }
}

/// One pool of interchangeable machines, tracked by their busy-until
/// times. A machine is idle at `now` iff its entry is `<= now`.
#[derive(Debug)]
struct MachinePool {
    busy_until: Vec<f64>,
}

impl MachinePool {
    fn new(machines: usize) -> Self {
        Self {
            busy_until: vec![0.0; machines],
        }
    }

    /// Lowest-index machine idle at `now`, if any.
    fn idle_machine(&self, now: f64) -> Option<usize> {
        self.busy_until.iter().position(|&t| t <= now)
    }

    fn in_service(&self, now: f64) -> usize {
        self.busy_until.iter().filter(|&&t| t > now).count()
    }

    /// Earliest completion strictly after `now`, if any machine is busy.
    fn next_completion(&self, now: f64) -> Option<f64> {
        self.busy_until
            .iter()
            .copied()
            .filter(|&t| t > now)
            .map(n64)
            .min()
            .map(|t| t.raw())
    }

    /// Earliest time at which some machine is idle.
    fn min_busy(&self) -> f64 {
        self.busy_until
            .iter()
            .copied()
            .map(n64)
            .min()
            .map(|t| t.raw())
            .unwrap_or(0.0)
    }

    fn start(&mut self, machine: usize, now: f64, duration: f64) -> f64 {
        assert!(
            self.busy_until[machine] <= now,
            "machine {} started while busy",
            machine
        );
        self.busy_until[machine] = now + duration;
        self.busy_until[machine]
    }
}

/// Event-stepping simulation of the two-pool shop.
///
/// Time advances from one event (arrival or machine completion) to the
/// next; at each step pending arrivals are admitted first, then idle
/// machines pull from their queues, pool A before pool B.
pub struct Simulation {
    jobs: Vec<Job>,
    policy: Policy,
    sampler: Sampler,
    // arrival times of all H jobs, ascending, fixed at start
    h_arrivals: Vec<f64>,

    pool_a: MachinePool,
    pool_b: MachinePool,
    queue_a: Queue,
    queue_b: Queue,
    next_job: usize,
    // H jobs currently queued on or running on pool B
    h_in_b_system: usize,
    results: Vec<SimulationResult>,

    config: Config,
}

impl Simulation {
    /// Validate the configuration and the job list and set up a run.
    pub fn new(mut jobs: Vec<Job>, policy: Policy, config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let mut seen = std::collections::HashSet::new();
        for job in &jobs {
            job.validate()?;
            anyhow::ensure!(seen.insert(job.job_id), "duplicate job id: {}", job.job_id);
        }
        jobs.sort_by_key(|job| (n64(job.arrival_time), job.job_id));
        let h_arrivals = jobs
            .iter()
            .filter(|job| job.job_type == JobType::High)
            .map(|job| job.arrival_time)
            .collect();

        Ok(Self {
            policy,
            sampler: config.sampler(),
            h_arrivals,
            pool_a: MachinePool::new(config.a_machines),
            pool_b: MachinePool::new(config.b_machines),
            queue_a: Queue::new(),
            queue_b: Queue::new(),
            next_job: 0,
            h_in_b_system: 0,
            results: vec![],
            jobs,
            config,
        })
    }

    /// Run the simulation to completion and return one result per job.
    pub fn run(&mut self) -> Vec<SimulationResult> {
        let mut now = 0.0;
        loop {
            // admit every arrival at or before now, so jobs landing
            // exactly on this tick are visible to the start decisions
            while self.next_job < self.jobs.len()
                && self.jobs[self.next_job].arrival_time <= now
            {
                let job = self.jobs[self.next_job].clone();
                self.next_job += 1;
                self.dispatch(job, now);
            }

            self.start_ready(now);

            let next_arrival = self.jobs.get(self.next_job).map(|job| job.arrival_time);
            let next_completion = match (
                self.pool_a.next_completion(now),
                self.pool_b.next_completion(now),
            ) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            match [next_arrival, next_completion]
                .into_iter()
                .flatten()
                .map(n64)
                .min()
            {
                Some(t_next) => now = t_next.raw(),
                None => {
                    if self.queue_a.is_empty() && self.queue_b.is_empty() {
                        break;
                    }
                    // jobs left but no event can release them: only the
                    // reservation hold can cause this, and with no future
                    // arrival it no longer applies
                    self.drain(now);
                    break;
                }
            }
        }
        assert_eq!(
            self.results.len(),
            self.jobs.len(),
            "job lost by the event loop"
        );
        std::mem::take(&mut self.results)
    }

    /// Arrival time of the next H job strictly after `now`.
    fn next_h_arrival(&self, now: f64) -> Option<f64> {
        self.h_arrivals.iter().copied().find(|&t| t > now)
    }

    fn routing_state(&self, now: f64) -> RoutingState {
        RoutingState {
            a_queue_len: self.queue_a.len(),
            a_in_service: self.pool_a.in_service(now),
            b_queue_len: self.queue_b.len(),
            b_in_service: self.pool_b.in_service(now),
            next_h_arrival: self.next_h_arrival(now),
            h_in_b_system: self.h_in_b_system,
        }
    }

    /// Route an arrived job into one pool's queue.
    fn dispatch(&mut self, job: Job, now: f64) {
        let state = self.routing_state(now);
        let pool = self.policy.route(&job, now, &state, &self.config);
        log::debug!("A {} job {} {} -> {}", now, job.job_id, job, pool);
        match pool {
            Pool::A => {
                assert!(
                    job.job_type == JobType::Normal,
                    "H job {} routed to pool A",
                    job.job_id
                );
                self.queue_a.add(job);
            }
            Pool::B => {
                if job.job_type == JobType::High {
                    self.h_in_b_system += 1;
                }
                self.queue_b.add(job);
            }
        }
    }

    /// True when an idle B machine must stay idle for an imminent H.
    fn hold_b_for_h(&self, now: f64) -> bool {
        if self.policy != Policy::Composite {
            return false;
        }
        match self.next_h_arrival(now) {
            None => false,
            Some(t) => t - now <= self.config.b_reservation_window,
        }
    }

    /// Start jobs on every idle machine, pool A first, then pool B under
    /// the look-ahead reservation rule.
    fn start_ready(&mut self, now: f64) {
        while let Some(machine) = self.pool_a.idle_machine(now) {
            let job = match self.queue_a.take(&self.policy, Pool::A, now) {
                Some(job) => job,
                None => break,
            };
            self.start_job(job, Pool::A, machine, now);
        }

        while let Some(machine) = self.pool_b.idle_machine(now) {
            if self.queue_b.is_empty() {
                break;
            }
            if !self.queue_b.has_high() && self.hold_b_for_h(now) {
                log::debug!("R {} holding idle B machine {}", now, machine);
                break;
            }
            let job = match self.queue_b.take(&self.policy, Pool::B, now) {
                Some(job) => job,
                None => break,
            };
            if job.job_type == JobType::High {
                assert!(self.h_in_b_system > 0, "H bookkeeping underflow");
                self.h_in_b_system -= 1;
            }
            self.start_job(job, Pool::B, machine, now);
        }
    }

    /// End-of-stream pass: no future arrival can release the reservation
    /// hold anymore, so start everything left, ignoring the hold.
    fn drain(&mut self, mut now: f64) {
        log::debug!("D {}", now);
        while !self.queue_a.is_empty() {
            if self.pool_a.idle_machine(now).is_none() {
                now = self.pool_a.min_busy();
            }
            let machine = match self.pool_a.idle_machine(now) {
                Some(machine) => machine,
                None => break,
            };
            let job = match self.queue_a.take(&self.policy, Pool::A, now) {
                Some(job) => job,
                None => break,
            };
            self.start_job(job, Pool::A, machine, now);
        }
        while !self.queue_b.is_empty() {
            if self.pool_b.idle_machine(now).is_none() {
                now = self.pool_b.min_busy();
            }
            let machine = match self.pool_b.idle_machine(now) {
                Some(machine) => machine,
                None => break,
            };
            let job = match self.queue_b.take(&self.policy, Pool::B, now) {
                Some(job) => job,
                None => break,
            };
            if job.job_type == JobType::High {
                assert!(self.h_in_b_system > 0, "H bookkeeping underflow");
                self.h_in_b_system -= 1;
            }
            self.start_job(job, Pool::B, machine, now);
        }
    }

    fn start_job(&mut self, job: Job, pool: Pool, machine: usize, now: f64) {
        let duration = self.sampler.duration(&job, pool);
        let pool_state = match pool {
            Pool::A => &mut self.pool_a,
            Pool::B => &mut self.pool_b,
        };
        let end_time = pool_state.start(machine, now, duration);
        log::debug!(
            "S {} job {} on {}{} until {}",
            now,
            job.job_id,
            pool,
            machine,
            end_time
        );
        self.results.push(SimulationResult {
            job_id: job.job_id,
            job_type: job.job_type,
            arrival_time: job.arrival_time,
            start_time: now,
            end_time,
            due_date: job.due_date,
            tardiness: (end_time - job.due_date).max(0.0),
            machine: pool,
        });
    }
}

/// Run `policy` over `jobs` under `config` and return one result per job,
/// in start order.
pub fn simulate(
    jobs: Vec<Job>,
    policy: Policy,
    config: Config,
) -> anyhow::Result<Vec<SimulationResult>> {
    let mut simulation = Simulation::new(jobs, policy, config)?;
    Ok(simulation.run())
}

/// Per-class tardiness summary of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub mean_tardiness_h: f64,
    pub mean_tardiness_n: f64,
}

impl Summary {
    pub fn header() -> &'static str {
        "mean-tardiness-h,mean-tardiness-n"
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.mean_tardiness_h, self.mean_tardiness_n)
    }
}

/// Mean tardiness per class; a class with no job reports 0.
pub fn summarize(results: &[SimulationResult]) -> Summary {
    let mut high = incr_stats::incr::Stats::new();
    let mut normal = incr_stats::incr::Stats::new();
    for result in results {
        let stats = match result.job_type {
            JobType::High => &mut high,
            JobType::Normal => &mut normal,
        };
        let _ = stats.update(result.tardiness);
    }
    Summary {
        mean_tardiness_h: high.mean().unwrap_or(0.0),
        mean_tardiness_n: normal.mean().unwrap_or(0.0),
    }
}

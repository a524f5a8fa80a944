use rand::{distributions::Distribution, SeedableRng};

use crate::job::{Job, JobType, Pool};

/// Parameters of a triangular processing-time distribution, in minutes.
#[derive(Debug, Clone, Copy)]
pub struct TriangularParams {
    pub min: f64,
    pub mode: f64,
    pub max: f64,
}

impl TriangularParams {
    pub fn new(min: f64, mode: f64, max: f64) -> Self {
        Self { min, mode, max }
    }

    /// Distribution mean (min + mode + max) / 3, used for expected
    /// processing times.
    pub fn mean(&self) -> f64 {
        (self.min + self.mode + self.max) / 3.0
    }

    pub(crate) fn validate(&self, name: &str) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.min.is_finite() && self.mode.is_finite() && self.max.is_finite(),
            "{}: non-finite parameter",
            name
        );
        anyhow::ensure!(
            self.min <= self.mode && self.mode <= self.max,
            "{}: parameters not ordered min <= mode <= max",
            name
        );
        anyhow::ensure!(self.min > 0.0, "{}: non-positive minimum", name);
        Ok(())
    }
}

impl std::fmt::Display for TriangularParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.min, self.mode, self.max)
    }
}

/// Deterministic processing-time sampler.
///
/// Each (job, pool) pair draws from its own generator, seeded with
/// `base_seed + job_id * 1000 + pool index`, so the processing time of a
/// job on a given pool does not depend on the active policy or on the
/// order in which other jobs are started.
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    base_seed: u64,
    tri_a_n: TriangularParams,
    tri_b_h: TriangularParams,
    tri_b_n: TriangularParams,
}

impl Sampler {
    pub fn new(
        base_seed: u64,
        tri_a_n: TriangularParams,
        tri_b_h: TriangularParams,
        tri_b_n: TriangularParams,
    ) -> Self {
        Self {
            base_seed,
            tri_a_n,
            tri_b_h,
            tri_b_n,
        }
    }

    /// Triangular parameters for a class on a pool. Pool A only ever
    /// processes N jobs.
    pub fn params(&self, job_type: JobType, pool: Pool) -> TriangularParams {
        match (pool, job_type) {
            (Pool::A, _) => self.tri_a_n,
            (Pool::B, JobType::High) => self.tri_b_h,
            (Pool::B, JobType::Normal) => self.tri_b_n,
        }
    }

    /// Draw the processing time of `job` on `pool`, in minutes.
    pub fn duration(&self, job: &Job, pool: Pool) -> f64 {
        let params = self.params(job.job_type, pool);
        let rv = rand_distr::Triangular::new(params.min, params.max, params.mode).unwrap();
        let mut rng = rand_pcg::Pcg64::seed_from_u64(
            self.base_seed + job.job_id * 1000 + pool.seed_offset(),
        );
        rv.sample(&mut rng)
    }
}

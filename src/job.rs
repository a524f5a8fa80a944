/// Order class of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    /// High-priority order, only ever processed on pool B.
    High,
    /// Normal order, processed on pool A or, when the policy allows, pool B.
    Normal,
}

impl JobType {
    pub fn from(job_type: &str) -> anyhow::Result<Self> {
        match job_type.to_uppercase().as_str() {
            "H" => Ok(JobType::High),
            "N" => Ok(JobType::Normal),
            _ => Err(anyhow::anyhow!("unknown job type: {}", job_type)),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                JobType::High => "H",
                JobType::Normal => "N",
            }
        )
    }
}

/// Machine pool identifier.
///
/// Pool A is the slower pool and processes N orders only; pool B is the
/// faster pool, mandatory for H orders and optional for N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pool {
    A,
    B,
}

impl Pool {
    /// Index of the pool in the sampler seed keying.
    pub(crate) fn seed_offset(&self) -> u64 {
        match self {
            Pool::A => 0,
            Pool::B => 1,
        }
    }
}

impl std::fmt::Display for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Pool::A => "A",
                Pool::B => "B",
            }
        )
    }
}

/// An order to be processed. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Unique order identifier.
    pub job_id: u64,
    /// Order class.
    pub job_type: JobType,
    /// Arrival time relative to the start of the horizon, in minutes.
    pub arrival_time: f64,
    /// Expected processing time on the class's primary pool, in minutes.
    /// Used only for slack computation.
    pub expected_duration: f64,
    /// Due date, in minutes.
    pub due_date: f64,
}

impl Job {
    pub fn new(
        job_id: u64,
        job_type: JobType,
        arrival_time: f64,
        expected_duration: f64,
        due_date: f64,
    ) -> Self {
        Self {
            job_id,
            job_type,
            arrival_time,
            expected_duration,
            due_date,
        }
    }

    /// Remaining float of this job at `now`, in minutes.
    pub fn slack(&self, now: f64) -> f64 {
        self.due_date - self.expected_duration - now
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.arrival_time.is_finite() && self.arrival_time >= 0.0,
            "job {}: invalid arrival time",
            self.job_id
        );
        anyhow::ensure!(
            self.expected_duration.is_finite() && self.expected_duration > 0.0,
            "job {}: invalid expected duration",
            self.job_id
        );
        anyhow::ensure!(
            self.due_date.is_finite() && self.due_date >= self.arrival_time,
            "job {}: due date before arrival",
            self.job_id
        );
        Ok(())
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(type = {}, arrival = {}, due = {})",
            self.job_type, self.arrival_time, self.due_date
        )
    }
}

/// Completion record of one job, emitted exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub job_id: u64,
    pub job_type: JobType,
    pub arrival_time: f64,
    pub start_time: f64,
    pub end_time: f64,
    pub due_date: f64,
    /// Non-negative lateness: max(0, end_time - due_date).
    pub tardiness: f64,
    /// Pool whose machine processed the job.
    pub machine: Pool,
}

impl SimulationResult {
    pub fn header() -> &'static str {
        "job-id,job-type,arrival-time,start-time,end-time,due-date,tardiness,machine"
    }
}

impl std::fmt::Display for SimulationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{}",
            self.job_id,
            self.job_type,
            self.arrival_time,
            self.start_time,
            self.end_time,
            self.due_date,
            self.tardiness,
            self.machine
        )
    }
}

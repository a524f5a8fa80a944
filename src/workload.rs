use noisy_float::prelude::*;
use rand::{distributions::Distribution, Rng, SeedableRng};
use std::io::prelude::*;

use crate::job::{Job, JobType};
use crate::simulation::Config;

/// Relative half-width of the due-date jitter.
const DUE_DATE_JITTER: f64 = 0.1;

/// Read raw orders from a CSV file of `job_id,job_type,arrival_time`
/// rows and materialize them into jobs.
///
/// A header line is tolerated. Arrival times are minutes relative to the
/// start of the horizon.
pub fn load_jobs(filename: &str, config: &Config) -> anyhow::Result<Vec<Job>> {
    let infile = std::fs::File::open(filename)?;
    let reader = std::io::BufReader::new(infile);

    let mut raw = vec![];
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let tokens = line.split(',').map(str::trim).collect::<Vec<&str>>();
        anyhow::ensure!(tokens.len() == 3, format!("invalid line {}", i));
        if i == 0 && tokens[0].parse::<u64>().is_err() {
            continue;
        }
        let job_id = tokens[0].parse::<u64>()?;
        let job_type = JobType::from(tokens[1])?;
        let arrival_time = tokens[2].parse::<f64>()?;
        anyhow::ensure!(
            arrival_time.is_finite() && arrival_time >= 0.0,
            format!("invalid arrival time at line {}", i)
        );
        raw.push((job_id, job_type, arrival_time));
    }
    Ok(materialize(raw, config))
}

/// Generate a synthetic order stream with exponential interarrival times
/// per class, for runs without a recorded data set.
pub fn generate_jobs(
    num_high: usize,
    num_normal: usize,
    h_interarrival: f64,
    n_interarrival: f64,
    config: &Config,
) -> anyhow::Result<Vec<Job>> {
    anyhow::ensure!(h_interarrival > 0.0, "vanishing H interarrival time");
    anyhow::ensure!(n_interarrival > 0.0, "vanishing N interarrival time");

    let mut arrival_rng = rand_pcg::Pcg64::seed_from_u64(config.base_seed + 2000000);
    let h_rv = rand_distr::Exp::new(1.0 / h_interarrival).unwrap();
    let n_rv = rand_distr::Exp::new(1.0 / n_interarrival).unwrap();

    let mut raw = vec![];
    let mut t = 0.0;
    for i in 0..num_high {
        t += h_rv.sample(&mut arrival_rng);
        raw.push((i as u64, JobType::High, t));
    }
    let mut t = 0.0;
    for i in 0..num_normal {
        t += n_rv.sample(&mut arrival_rng);
        raw.push(((num_high + i) as u64, JobType::Normal, t));
    }
    Ok(materialize(raw, config))
}

/// Scale arrival times by `factor`, keeping each job's slack, to mimic a
/// higher (or lower) arrival rate in sensitivity runs.
pub fn compress_arrivals(jobs: &[Job], factor: f64) -> Vec<Job> {
    let mut compressed = jobs
        .iter()
        .map(|job| {
            let slack = job.due_date - job.arrival_time;
            let arrival_time = job.arrival_time * factor;
            Job {
                arrival_time,
                due_date: arrival_time + slack,
                ..job.clone()
            }
        })
        .collect::<Vec<Job>>();
    compressed.sort_by_key(|job| (n64(job.arrival_time), job.job_id));
    compressed
}

/// Assign expected durations and jittered due dates, then sort by
/// arrival time.
///
/// The expected duration is the triangular mean on the class's primary
/// pool (H on B, N on A); the due date sits `due_date_factor` expected
/// durations after arrival, perturbed within +-10% of the expected
/// duration by a stream seeded with `base_seed` alone, consumed in input
/// order.
fn materialize(raw: Vec<(u64, JobType, f64)>, config: &Config) -> Vec<Job> {
    let mut jitter_rng = rand_pcg::Pcg64::seed_from_u64(config.base_seed);
    let mut jobs = raw
        .into_iter()
        .map(|(job_id, job_type, arrival_time)| {
            let expected_duration = match job_type {
                JobType::High => config.tri_b_h.mean(),
                JobType::Normal => config.tri_a_n.mean(),
            };
            let jitter =
                jitter_rng.gen_range(-DUE_DATE_JITTER..DUE_DATE_JITTER) * expected_duration;
            Job {
                job_id,
                job_type,
                arrival_time,
                expected_duration,
                due_date: arrival_time + config.due_date_factor * expected_duration + jitter,
            }
        })
        .collect::<Vec<Job>>();
    jobs.sort_by_key(|job| (n64(job.arrival_time), job.job_id));
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(name: &str, content: &str) -> String {
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, content).expect("could not write test data");
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_load_jobs() {
        let path = write_csv(
            "jobshop_sim_load_test.csv",
            "job_id,job_type,arrival_time\n3,N,12.5\n1,H,0\n2,n,4\n",
        );
        let config = Config::default();
        let jobs = load_jobs(&path, &config).expect("could not load jobs");
        assert_eq!(jobs.len(), 3);
        // sorted by arrival time
        assert_eq!(
            jobs.iter().map(|j| j.job_id).collect::<Vec<u64>>(),
            vec![1, 2, 3]
        );
        assert_eq!(jobs[0].job_type, JobType::High);
        assert_eq!(jobs[0].expected_duration, config.tri_b_h.mean());
        assert_eq!(jobs[1].job_type, JobType::Normal);
        assert_eq!(jobs[1].expected_duration, config.tri_a_n.mean());
        for job in &jobs {
            let base = job.arrival_time + config.due_date_factor * job.expected_duration;
            assert!((job.due_date - base).abs() <= DUE_DATE_JITTER * job.expected_duration);
            assert!(job.validate().is_ok());
        }
    }

    #[test]
    fn test_load_jobs_deterministic() {
        let path = write_csv(
            "jobshop_sim_load_determinism_test.csv",
            "1,H,0\n2,N,4\n3,N,12.5\n",
        );
        let config = Config::default();
        let first = load_jobs(&path, &config).unwrap();
        let second = load_jobs(&path, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_jobs_invalid() {
        let path = write_csv("jobshop_sim_load_invalid_test.csv", "1,H\n");
        assert!(load_jobs(&path, &Config::default()).is_err());
        let path = write_csv("jobshop_sim_load_invalid_type_test.csv", "1,X,0\n");
        assert!(load_jobs(&path, &Config::default()).is_err());
        let path = write_csv("jobshop_sim_load_invalid_arrival_test.csv", "1,H,-3\n");
        assert!(load_jobs(&path, &Config::default()).is_err());
    }

    #[test]
    fn test_generate_jobs() {
        let config = Config::default();
        let jobs = generate_jobs(5, 20, 300.0, 30.0, &config).unwrap();
        assert_eq!(jobs.len(), 25);
        assert_eq!(
            jobs.iter()
                .filter(|j| j.job_type == JobType::High)
                .count(),
            5
        );
        assert!(jobs
            .windows(2)
            .all(|w| w[0].arrival_time <= w[1].arrival_time));
        for job in &jobs {
            assert!(job.validate().is_ok());
        }
        assert_eq!(jobs, generate_jobs(5, 20, 300.0, 30.0, &config).unwrap());
        assert!(generate_jobs(5, 20, 0.0, 30.0, &config).is_err());
    }

    #[test]
    fn test_compress_arrivals_keeps_slack() {
        let config = Config::default();
        let jobs = generate_jobs(3, 10, 300.0, 30.0, &config).unwrap();
        let compressed = compress_arrivals(&jobs, 0.8);
        assert_eq!(compressed.len(), jobs.len());
        for (before, after) in jobs.iter().zip(compressed.iter()) {
            assert_eq!(before.job_id, after.job_id);
            assert_eq!(after.arrival_time, before.arrival_time * 0.8);
            let slack_before = before.due_date - before.arrival_time;
            let slack_after = after.due_date - after.arrival_time;
            assert!((slack_after - slack_before).abs() < 1e-6);
        }
    }
}

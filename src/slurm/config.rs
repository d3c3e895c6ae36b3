use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::JobArrayError;
use crate::slurm::job_request::JobRequest;

/// A validated job configuration
///
/// Construction checks every field and fails with [`JobArrayError::Validation`] naming the
/// first bad one. Numeric fields must be strictly greater than their minimum:
///
/// | field       | minimum (exclusive) | default |
/// | ----------- | ------------------- | ------- |
/// | arrays      | -1                  | 0       |
/// | nodes       | 0                   | 1       |
/// | ntasks      | 0                   | 1       |
/// | cpus        | 0                   | 1       |
/// | gpus        | -1                  | 0       |
/// | mem_per_cpu | 0                   | 4       |
///
/// Wall time arrives as fractional hours and is kept as `H:MM:SS`. The only field that can
/// change afterwards is the selected environment.
#[derive(Clone, Debug)]
pub struct JobConfig {
    name: String,
    email: Option<String>,
    output_dir: PathBuf,
    hours: f64,
    time: String,
    arrays: u32,
    nodes: u32,
    ntasks: u32,
    cpus: u32,
    gpus: u32,
    mem_per_cpu: u32,
    env: Option<String>,
}

impl JobConfig {
    pub fn new(request: JobRequest) -> Result<JobConfig, JobArrayError> {
        let name = validate_name(&request.name)?;
        let email = match request.email {
            Some(email) if !email.trim().is_empty() => Some(validate_email(email.trim())?),
            _ => None,
        };
        let output_dir = writable_dir("output_dir", &request.output_dir)?;
        let time = format_time(request.time)?;

        let config = JobConfig {
            name,
            email,
            output_dir,
            hours: request.time,
            time,
            arrays: above("arrays", request.arrays, -1)?,
            nodes: above("nodes", request.nodes, 0)?,
            ntasks: above("ntasks", request.ntasks, 0)?,
            cpus: above("cpus", request.cpus, 0)?,
            gpus: above("gpus", request.gpus, -1)?,
            mem_per_cpu: above("mem_per_cpu", request.mem_per_cpu, 0)?,
            env: None,
        };
        info!("Job {} configured: array {}, wall time {}", config.name, config.array_range(), config.time);
        Ok(config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Absolute path
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Wall time as requested, in hours
    pub fn hours(&self) -> f64 {
        self.hours
    }

    /// Wall time as `H:MM:SS`
    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn arrays(&self) -> u32 {
        self.arrays
    }

    /// SLURM `--array` range
    pub fn array_range(&self) -> String {
        format!("0-{}", self.arrays)
    }

    pub fn nodes(&self) -> u32 {
        self.nodes
    }

    pub fn ntasks(&self) -> u32 {
        self.ntasks
    }

    pub fn cpus(&self) -> u32 {
        self.cpus
    }

    pub fn gpus(&self) -> u32 {
        self.gpus
    }

    pub fn mem_per_cpu(&self) -> u32 {
        self.mem_per_cpu
    }

    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }

    pub fn select_env(&mut self, env: impl Into<String>) {
        let env = env.into();
        info!("Selected environment {}", env);
        self.env = Some(env);
    }
}

/// Convert fractional hours to `H:MM:SS`, rounding to the nearest second
pub fn format_time(hours: f64) -> Result<String, JobArrayError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(JobArrayError::validation("time", format!("expected a positive number of hours, got {}", hours)));
    }
    let total = (hours * 3600.0).round() as u64;
    if total == 0 {
        return Err(JobArrayError::validation("time", format!("{} hours is less than one second", hours)));
    }
    Ok(format!("{}:{:02}:{:02}", total / 3600, total % 3600 / 60, total % 60))
}

/// Resolve `path` to an absolute directory that exists and accepts new files
pub(crate) fn writable_dir(field: &'static str, path: &Path) -> Result<PathBuf, JobArrayError> {
    let dir = fs::canonicalize(path)
        .map_err(|err| JobArrayError::validation(field, format!("{} doesn't exist: {}", path.display(), err)))?;
    if !dir.is_dir() {
        return Err(JobArrayError::validation(field, format!("{} isn't a directory", dir.display())));
    }
    // permission bits don't tell the whole story (ACLs, read-only mounts), so try it
    tempfile::Builder::new()
        .prefix(".jobarray-probe")
        .tempfile_in(&dir)
        .map_err(|err| JobArrayError::validation(field, format!("{} isn't writable: {}", dir.display(), err)))?;
    debug!("{} is a writable directory", dir.display());
    Ok(dir)
}

fn above(field: &'static str, value: i64, minimum: i64) -> Result<u32, JobArrayError> {
    if value <= minimum {
        return Err(JobArrayError::validation(field, format!("must be greater than {}, got {}", minimum, value)));
    }
    u32::try_from(value).map_err(|_| JobArrayError::validation(field, format!("{} is too large", value)))
}

fn validate_name(name: &str) -> Result<String, JobArrayError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(JobArrayError::validation("name", "must not be empty"));
    }
    // the name ends up in file names and SBATCH directives
    if name.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(JobArrayError::validation("name", format!("{:?} can't contain whitespace or '/'", name)));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> Result<String, JobArrayError> {
    match email.split_once('@') {
        Some((user, host)) if !user.is_empty() && !host.is_empty() && !email.contains(char::is_whitespace) => {
            Ok(email.to_string())
        }
        _ => Err(JobArrayError::validation("email", format!("{:?} isn't an email address", email))),
    }
}

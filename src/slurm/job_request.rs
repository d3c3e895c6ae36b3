use std::path::PathBuf;

use clap::Args;
use serde::{Deserialize, Serialize};

/// Unvalidated job parameters, from command line flags or a JSON request
#[derive(Args, Clone, Debug, Deserialize, Serialize)]
pub struct JobRequest {
    /// Job name, also used to name the script and output directories
    #[arg(long)]
    pub name: String,
    /// Send begin, end, and failure notifications here
    #[arg(long)]
    #[serde(default)]
    pub email: Option<String>,
    /// Existing, writable directory for the script and job output
    #[arg(long)]
    pub output_dir: PathBuf,
    /// Wall time in hours, e.g. 1.75 for 1:45:00
    #[arg(long)]
    pub time: f64,
    /// Highest array task index (tasks are numbered from 0)
    #[arg(long, default_value_t = 0)]
    #[serde(default)]
    pub arrays: i64,
    #[arg(long, default_value_t = 1)]
    #[serde(default = "one")]
    pub nodes: i64,
    #[arg(long, default_value_t = 1)]
    #[serde(default = "one")]
    pub ntasks: i64,
    #[arg(long, default_value_t = 1)]
    #[serde(default = "one")]
    pub cpus: i64,
    #[arg(long, default_value_t = 0)]
    #[serde(default)]
    pub gpus: i64,
    /// Memory per CPU in GB
    #[arg(long, default_value_t = 4)]
    #[serde(default = "default_mem")]
    pub mem_per_cpu: i64,
}

/// A complete submission in one JSON document
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ArrayRequest {
    pub job: JobRequest,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub presteps: Vec<String>,
    pub jobs: Vec<String>,
}

fn one() -> i64 {
    1
}

fn default_mem() -> i64 {
    4
}

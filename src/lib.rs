//! Generate and submit SLURM job array scripts
//!
//! A list of shell commands is wrapped with resource directives, environment setup and
//! per-array-task output redirection, written to disk, then handed to `sbatch`.

/// Errors raised while building or submitting a job array
pub mod error;

/// Run shell commands against a persistent shell process
pub mod shell;

/// Job configuration, header rendering, output redirection and submission
pub mod slurm;

/// How interactive confirmation prompts are answered
pub mod policy;

pub use error::JobArrayError;
pub use slurm::job_array::{JobArray, Submission};

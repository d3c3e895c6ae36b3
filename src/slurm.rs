//! Build job array scripts and submit them to SLURM

/// Requests are deserialised or parsed from the command line into the struct defined here
pub mod job_request;

/// Validated job configuration
pub mod config;

/// Render the SBATCH header from a template
pub mod header;

/// Cluster specific commands (environment modules, conda, sbatch)
pub mod cluster;

/// Give each redirectable job its own output directory and array task
pub mod redirect;

/// Ask before submitting jobs that look like typos
pub mod mistake_proof;

/// Orchestrate a submission: verify, render, redirect, write, sbatch
pub mod job_array;

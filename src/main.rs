use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use jobarray::policy::ConfirmPolicy;
use jobarray::slurm::job_request::{ArrayRequest, JobRequest};
use jobarray::JobArray;

/// Generate a SLURM job array script from a list of commands and submit it
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Describe the job with command line flags
    Submit {
        #[command(flatten)]
        job: JobRequest,
        /// Conda environment activated before the jobs run
        #[arg(long)]
        env: Option<String>,
        /// Environment module to load (repeatable), kept only if it loads now
        #[arg(long = "module")]
        modules: Vec<String>,
        /// Command to run before the jobs (repeatable), kept only if it succeeds now
        #[arg(long = "prestep")]
        presteps: Vec<String>,
        /// One job per line, or a JSON array of jobs if the file ends in .json
        #[arg(long)]
        jobs: PathBuf,
    },
    /// Read the job, environment and jobs from a JSON request
    Request {
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct Options {
    /// SBATCH header template
    #[arg(long, global = true)]
    template: Option<PathBuf>,
    /// Script path (default: {name}_{YYYYMMDDHHMM}.sh in the output directory)
    #[arg(long, global = true)]
    script: Option<PathBuf>,
    /// How to answer questions about suspicious jobs
    #[arg(long, value_enum, default_value_t = ConfirmPolicy::Ask, global = true)]
    confirm: ConfirmPolicy,
    /// Write the script but don't run sbatch
    #[arg(long, global = true)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    info!("terve! starting up :)");

    let cli = Cli::parse();
    let request = match cli.command {
        Commands::Submit { job, env, modules, presteps, jobs } => ArrayRequest {
            job,
            env,
            modules,
            presteps,
            jobs: read_jobs(&jobs)?,
        },
        Commands::Request { path } => read_request(&path)?,
    };

    if request.jobs.is_empty() {
        bail!("No jobs to submit");
    }

    let options = cli.options;
    let mut array = JobArray::new(request.job)?.dry_run(options.dry_run);
    if let Some(template) = options.template {
        array = array.with_template(template);
    }
    if let Some(script) = options.script {
        array = array.with_script(script);
    }
    if let Some(env) = request.env {
        array.set_env(env);
    }
    if !request.modules.is_empty() {
        let loaded = array.module_load(&request.modules)?;
        info!("{} of {} modules loaded", loaded, request.modules.len());
    }
    for step in &request.presteps {
        array.add_prestep(step);
    }

    info!("Questions are answered with policy: {}", options.confirm);
    let mut confirm = options.confirm.into_confirm();
    let submission = array.submit(&request.jobs, confirm.as_mut())?;
    println!("{}", submission.script.display());

    if !options.dry_run && !submission.submitted {
        bail!("sbatch failed, resubmit {} by hand", submission.script.display());
    }
    Ok(())
}

/// Jobs file: a JSON array of strings, or one job per line (blank lines and `#` comments skipped)
fn read_jobs(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).with_context(|| format!("Can't read jobs file {}", path.display()))?;
    if path.extension().map_or(false, |ext| ext == "json") {
        return serde_json::from_str(&text).with_context(|| format!("{} isn't a JSON array of jobs", path.display()));
    }
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

fn read_request(path: &Path) -> Result<ArrayRequest> {
    info!("Reading job request: {}", path.display());
    let json = fs::read_to_string(path).map_err(|err| {
        warn!("Can't read job request at path: {}", path.display());
        err
    })?;
    serde_json::from_str(&json).with_context(|| format!("Invalid job request {}", path.display()))
}

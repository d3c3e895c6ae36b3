use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use regex::Regex;

use crate::error::JobArrayError;
use crate::shell::session::quote;
use crate::slurm::cluster::Cluster;
use crate::slurm::config::writable_dir;

/// Rewrites jobs so each array task writes to its own output directory
///
/// A job is redirectable when it looks like `<launcher> ... <file><suffix>`, e.g.
/// `python /path/run.py --epochs 3`. Redirectable jobs get a fresh directory
/// `{name}_job-{n}` under the target directory, `-o <dir>` right after the script file, and a
/// guard so they only run on one array task. Everything else passes through untouched.
///
/// Jobs must not pick their own output location: `-o`, `--output`, or `--output_dir` after
/// the launcher is rejected.
pub struct OutputRedirector {
    directory: PathBuf,
    name: String,
    index_var: String,
    output_flag: Regex,
    script_call: Regex,
    comment: Regex,
}

impl OutputRedirector {
    pub fn new(directory: &Path, name: &str, cluster: &Cluster) -> Result<OutputRedirector, JobArrayError> {
        let directory = writable_dir("output_dir", directory)?;
        if cluster.launcher.trim().is_empty() {
            return Err(JobArrayError::validation("launcher", "must not be empty"));
        }

        let launcher = format!(r"\b{}\b", regex::escape(&cluster.launcher));
        let output_flag = Regex::new(&format!(r"{}.*?\s(?:-o|--output|--output_dir)(?:[\s=]|$)", launcher))
            .map_err(|err| JobArrayError::validation("launcher", err.to_string()))?;
        let script_call = Regex::new(&format!(r"({}.*?\S{})(?:[\s;]|$)", launcher, regex::escape(&cluster.script_suffix)))
            .map_err(|err| JobArrayError::validation("script_suffix", err.to_string()))?;

        Ok(OutputRedirector {
            directory,
            name: name.to_string(),
            index_var: cluster.array_index_var.clone(),
            output_flag,
            script_call,
            comment: Regex::new(r"(?:^|\s)#").map_err(|err| JobArrayError::validation("launcher", err.to_string()))?,
        })
    }

    /// Fail on the first job that sets its own output location
    pub fn check(&self, jobs: &[String]) -> Result<(), JobArrayError> {
        match jobs.iter().find(|job| self.output_flag.is_match(job)) {
            Some(job) => Err(JobArrayError::OutputFlag(job.clone())),
            None => Ok(()),
        }
    }

    /// Rewrite `jobs` for an array of `array_count` tasks (at least 1)
    ///
    /// The n-th redirectable job (counting from 0) writes to `{name}_job-{n}` and runs on task
    /// `(n + 1) % array_count`. Nothing is created on disk if any job fails [`check`](Self::check).
    pub fn redirect(&self, jobs: &[String], array_count: u32) -> Result<Vec<String>, JobArrayError> {
        self.check(jobs)?;
        let array_count = array_count.max(1);

        let mut counter: u32 = 0;
        let mut redirected = Vec::with_capacity(jobs.len());
        for job in jobs {
            let trimmed = job.trim_end().trim_end_matches(';').trim_end();
            let Some(script) = self.script_call.captures(trimmed).and_then(|caps| caps.get(1)) else {
                debug!("Not redirecting {}", job);
                redirected.push(job.clone());
                continue;
            };

            let out_dir = self.directory.join(format!("{}_job-{}", self.name, counter));
            fs::create_dir_all(&out_dir)?;
            counter += 1;
            let index = counter % array_count;

            let (call, rest) = trimmed.split_at(script.end());
            let job = format!("{} -o {}{}", call, quote(&out_dir.display().to_string()), rest);
            // `; fi` would end up inside a trailing comment, and `&;` doesn't parse
            let separator = if self.comment.is_match(&job) {
                "\n"
            } else if job.ends_with('&') {
                " "
            } else {
                "; "
            };
            info!("Task {} runs {}", index, job);
            redirected.push(format!("if [[ ${} == {} ]]; then {}{}fi", self.index_var, index, job, separator));
        }

        Ok(redirected)
    }
}

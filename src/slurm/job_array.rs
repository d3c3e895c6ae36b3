use std::fs::File;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::error::JobArrayError;
use crate::policy::Confirm;
use crate::shell::command::{CommandChain, Execute, ShellCommand};
use crate::shell::session::{quote, ShellSession};
use crate::slurm::cluster::Cluster;
use crate::slurm::config::JobConfig;
use crate::slurm::job_request::JobRequest;
use crate::slurm::mistake_proof::check_launchers;
use crate::slurm::redirect::OutputRedirector;

/// Outcome of [`JobArray::submit`]
#[derive(Debug)]
pub struct Submission {
    /// The rendered script, left on disk whether or not sbatch accepted it
    pub script: PathBuf,
    /// sbatch exited 0 (always false for a dry run)
    pub submitted: bool,
}

/// A job array waiting to be submitted
///
/// Submission walks through these steps and stops at the first failure:
///
/// 1. mistake-proofing: jobs calling the launcher more than once need confirmation
/// 2. the SBATCH header is rendered from the template
/// 3. jobs are checked for hand-written output flags
/// 4. if an environment is selected, `reset; load manager; activate <env>` must succeed
/// 5. output directories are created and the script is written
/// 6. the script is passed to sbatch
///
/// Steps 1-3 don't start any process, and nothing is written to disk before step 5.
pub struct JobArray {
    config: JobConfig,
    cluster: Cluster,
    template: Option<PathBuf>,
    script: Option<PathBuf>,
    dry_run: bool,
    modules: Vec<ShellCommand>,
    presteps: Vec<ShellCommand>,
}

impl JobArray {
    pub fn new(request: JobRequest) -> Result<JobArray, JobArrayError> {
        Ok(JobArray {
            config: JobConfig::new(request)?,
            cluster: Cluster::default(),
            template: None,
            script: None,
            dry_run: false,
            modules: Vec::new(),
            presteps: Vec::new(),
        })
    }

    pub fn with_cluster(self, cluster: Cluster) -> JobArray {
        JobArray { cluster, ..self }
    }

    /// Render the header from this file instead of the included template
    pub fn with_template(self, template: impl Into<PathBuf>) -> JobArray {
        JobArray { template: Some(template.into()), ..self }
    }

    /// Write the script here instead of an automatically named file. Relative paths are
    /// relative to the output directory.
    pub fn with_script(self, script: impl Into<PathBuf>) -> JobArray {
        JobArray { script: Some(script.into()), ..self }
    }

    /// Write the script but don't submit it
    pub fn dry_run(self, dry_run: bool) -> JobArray {
        JobArray { dry_run, ..self }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn set_env(&mut self, env: impl Into<String>) {
        self.config.select_env(env);
    }

    /// Try loading each module with the cluster's module command and keep the ones that load
    ///
    /// Returns how many were kept. Modules are loaded in one session, so a module that only
    /// loads after another one will work if listed after it.
    pub fn module_load(&mut self, modules: &[String]) -> Result<usize, JobArrayError> {
        let mut session = ShellSession::open().map_err(|err| JobArrayError::Environment(err.to_string()))?;
        let mut loaded = 0;
        for module in modules {
            let cmd = ShellCommand::new(format!("{} {}", self.cluster.module_load, module));
            if cmd.execute(Some(&mut session)) {
                info!("Module {} loads, adding it to the script", module);
                self.modules.push(cmd);
                loaded += 1;
            } else {
                warn!("Module {} doesn't load, skipping it", module);
            }
        }
        session.close();
        Ok(loaded)
    }

    /// Keep `cmd` as a step run before the jobs if it succeeds now
    pub fn add_prestep(&mut self, cmd: &str) -> bool {
        let cmd = ShellCommand::new(cmd);
        let ok = cmd.execute(None);
        if ok {
            self.presteps.push(cmd);
        } else {
            warn!("Prestep `{}` failed, skipping it", cmd.text());
        }
        ok
    }

    /// `reset; load manager; activate <env>`, if an environment is selected
    fn environment_chain(&self) -> Option<CommandChain> {
        let env = self.config.env()?;
        Some(
            [
                ShellCommand::new(self.cluster.reset.as_str()),
                ShellCommand::new(self.cluster.env_manager.as_str()),
                ShellCommand::new(format!("{} {}", self.cluster.activate, env)),
            ]
            .into_iter()
            .collect(),
        )
    }

    pub fn submit(&self, jobs: &[String], confirm: &mut dyn Confirm) -> Result<Submission, JobArrayError> {
        info!("Preparing job array {} with {} jobs", self.config.name(), jobs.len());
        check_launchers(jobs, &self.cluster.launcher, confirm)?;
        let header = self.config.create_header(self.template.as_deref())?;
        let redirector = OutputRedirector::new(self.config.output_dir(), self.config.name(), &self.cluster)?;
        redirector.check(jobs)?;

        let activation = match self.environment_chain() {
            Some(chain) => {
                info!("Verifying environment: {}", chain.line());
                if !chain.execute(None) {
                    return Err(JobArrayError::Environment(chain.line()));
                }
                info!("Environment verified");
                Some(chain.line())
            }
            None => {
                info!("No environment selected, skipping verification");
                None
            }
        };

        let path = match &self.script {
            Some(script) => {
                let path = self.config.output_dir().join(script);
                if path.exists() {
                    warn!("Script {} already exists and will be overwritten", path.display());
                }
                path
            }
            None => script_path(self.config.output_dir(), self.config.name(), Local::now()),
        };

        let jobs = redirector.redirect(jobs, self.config.arrays())?;
        let script = JobScript {
            header,
            activation,
            modules: self.modules.iter().map(|cmd| cmd.text().to_string()).collect(),
            presteps: self.presteps.iter().map(|cmd| cmd.text().to_string()).collect(),
            jobs,
        };
        script.write(&path)?;
        info!("Wrote job script {}", path.display());

        if self.dry_run {
            info!("--dry-run set, not submitting {}", path.display());
            return Ok(Submission { script: path, submitted: false });
        }

        let submitted = self.run_sbatch(&path);
        Ok(Submission { script: path, submitted })
    }

    fn run_sbatch(&self, script: &Path) -> bool {
        let sbatch = ShellCommand::new(format!("{} {}", self.cluster.submit, quote(&script.display().to_string())));
        info!("Running {}", sbatch.text());
        let submitted = sbatch.execute(None);
        if submitted {
            info!("Submitted {}", script.display());
        } else {
            warn!("Submitting {} failed, the script is left on disk for resubmission", script.display());
        }
        submitted
    }
}

/// `{name}_{YYYYMMDDHHMM}.sh` in `dir`, or with `_1`, `_2`, ... appended until the name is unused
fn script_path(dir: &Path, name: &str, now: DateTime<Local>) -> PathBuf {
    let stem = format!("{}_{}", name, now.format("%Y%m%d%H%M"));
    let mut path = dir.join(format!("{}.sh", stem));
    let mut n = 0;
    while path.exists() {
        n += 1;
        path = dir.join(format!("{}_{}.sh", stem, n));
    }
    path
}

/// All rendered sections of a job array script
struct JobScript {
    header: String,
    activation: Option<String>,
    modules: Vec<String>,
    presteps: Vec<String>,
    jobs: Vec<String>,
}

impl JobScript {
    /// Write the complete script, replacing any existing file
    fn write(self, out_path: &Path) -> Result<(), io::Error> {
        let mut file = File::create(out_path)?;

        // order is important when writing the file
        let sections = [
            vec![self.header],
            self.activation.into_iter().collect(),
            self.modules,
            self.presteps,
            self.jobs,
        ];

        for line in sections.iter().flatten() {
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use chrono::TimeZone;

    use super::*;
    use crate::policy::{AutoConfirm, Prompt};

    /// Stand-ins for module, conda and sbatch that always succeed
    fn harmless_cluster() -> Cluster {
        Cluster {
            reset: "true".to_string(),
            env_manager: "true".to_string(),
            module_load: "test -d".to_string(),
            activate: "true".to_string(),
            submit: "test -f".to_string(),
            ..Cluster::default()
        }
    }

    fn request(dir: &Path) -> JobRequest {
        JobRequest {
            name: "test_sample".to_string(),
            email: Some("someone@example.org".to_string()),
            output_dir: dir.to_path_buf(),
            time: 0.512,
            arrays: 15,
            nodes: 1,
            ntasks: 1,
            cpus: 1,
            gpus: 2,
            mem_per_cpu: 4,
        }
    }

    fn job_array(dir: &Path) -> JobArray {
        JobArray::new(request(dir)).unwrap().with_cluster(harmless_cluster())
    }

    fn jobs(jobs: &[&str]) -> Vec<String> {
        jobs.iter().map(|job| job.to_string()).collect()
    }

    fn entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn submit_sample_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut array = job_array(dir.path());
        array.set_env("tf24");

        let submission = array
            .submit(
                &jobs(&[
                    "python -c 'import sys; print(sys.version)'",
                    "python sample_store-files.py",
                    "python sample_store-files.py",
                ]),
                &mut AutoConfirm(false),
            )
            .unwrap();

        assert!(submission.submitted);
        let script = fs::read_to_string(&submission.script).unwrap();
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines[0], "#!/bin/bash");
        assert!(lines.contains(&"#SBATCH --array=0-15"));
        assert!(lines.contains(&"true; true; true tf24"));
        assert!(lines.contains(&"python -c 'import sys; print(sys.version)'"));
        let out_dir = array.config().output_dir();
        let guarded = format!(
            "if [[ $SLURM_ARRAY_TASK_ID == 2 ]]; then python sample_store-files.py -o {}; fi",
            out_dir.join("test_sample_job-1").display()
        );
        assert_eq!(lines.last(), Some(&guarded.as_str()));
        assert!(out_dir.join("test_sample_job-0").is_dir());

        let name = submission.script.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("test_sample_") && name.ends_with(".sh"), "{}", name);
    }

    #[test]
    fn no_env_means_no_activation_line() {
        let dir = tempfile::tempdir().unwrap();
        let array = job_array(dir.path()).dry_run(true);
        let submission = array.submit(&jobs(&["python a.py"]), &mut AutoConfirm(false)).unwrap();
        assert!(!submission.submitted);
        let script = fs::read_to_string(&submission.script).unwrap();
        assert!(!script.contains("true tf24"));
        assert!(script.ends_with("fi\n"));
    }

    #[test]
    fn failed_environment_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Cluster { activate: "false".to_string(), ..harmless_cluster() };
        let mut array = JobArray::new(request(dir.path())).unwrap().with_cluster(cluster);
        array.set_env("tf24");

        let err = array.submit(&jobs(&["python a.py"]), &mut AutoConfirm(true)).unwrap_err();
        assert!(matches!(err, JobArrayError::Environment(_)));
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn missing_template_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let array = job_array(dir.path()).with_template(dir.path().join("missing.txt"));
        let err = array.submit(&jobs(&["python a.py"]), &mut AutoConfirm(true)).unwrap_err();
        assert!(matches!(err, JobArrayError::TemplateNotFound { .. }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn declined_confirmation_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let array = job_array(dir.path());
        let mut prompt = Prompt::new(Cursor::new("n\n"), Vec::new());
        let err = array.submit(&jobs(&["python a.py; python b.py"]), &mut prompt).unwrap_err();
        assert!(matches!(err, JobArrayError::UserAbort));
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn output_flag_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let array = job_array(dir.path());
        let err = array
            .submit(&jobs(&["python a.py", "python b.py --output here"]), &mut AutoConfirm(true))
            .unwrap_err();
        assert!(matches!(err, JobArrayError::OutputFlag(_)));
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn failed_submission_keeps_script() {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Cluster { submit: "false".to_string(), ..harmless_cluster() };
        let array = JobArray::new(request(dir.path())).unwrap().with_cluster(cluster);
        let submission = array.submit(&jobs(&["echo hello"]), &mut AutoConfirm(true)).unwrap();
        assert!(!submission.submitted);
        assert!(submission.script.is_file());
    }

    #[test]
    fn caller_chooses_script_name() {
        let dir = tempfile::tempdir().unwrap();
        let array = job_array(dir.path()).with_script("custom.sh").dry_run(true);
        let submission = array.submit(&jobs(&["echo hello"]), &mut AutoConfirm(true)).unwrap();
        assert_eq!(submission.script, array.config().output_dir().join("custom.sh"));
        assert!(submission.script.is_file());
    }

    #[test]
    fn script_names_are_disambiguated() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2026, 10, 19, 14, 5, 0).unwrap();

        let first = script_path(dir.path(), "job", now);
        assert_eq!(first, dir.path().join("job_202610191405.sh"));
        fs::write(&first, "").unwrap();

        let second = script_path(dir.path(), "job", now);
        assert_eq!(second, dir.path().join("job_202610191405_1.sh"));
        fs::write(&second, "").unwrap();

        assert_eq!(script_path(dir.path(), "job", now), dir.path().join("job_202610191405_2.sh"));
    }

    #[test]
    fn output_dir_with_space_is_submitted() {
        let dir = tempfile::tempdir().unwrap();
        let runs = dir.path().join("my runs");
        fs::create_dir(&runs).unwrap();
        let array = job_array(&runs);

        let submission = array.submit(&jobs(&["python a.py"]), &mut AutoConfirm(true)).unwrap();

        assert!(submission.submitted);
        let script = fs::read_to_string(&submission.script).unwrap();
        let out_dir = array.config().output_dir().join("test_sample_job-0");
        assert!(script.contains(&format!("then python a.py -o '{}'; fi", out_dir.display())));
        assert!(out_dir.is_dir());
    }

    #[test]
    fn only_loadable_modules_follow_activation() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present");
        fs::create_dir(&present).unwrap();
        let missing = dir.path().join("missing");
        let mut array = job_array(dir.path()).dry_run(true);
        array.set_env("tf24");

        let modules = [present.display().to_string(), missing.display().to_string()];
        assert_eq!(array.module_load(&modules).unwrap(), 1);

        let submission = array.submit(&jobs(&["echo hello"]), &mut AutoConfirm(true)).unwrap();
        let script = fs::read_to_string(&submission.script).unwrap();
        let lines: Vec<&str> = script.lines().collect();
        let activation = lines.iter().position(|line| *line == "true; true; true tf24").unwrap();
        let loaded = format!("test -d {}", present.display());
        assert_eq!(lines[activation + 1], loaded);
        assert!(!script.contains(&format!("test -d {}", missing.display())));
    }

    #[test]
    fn prestep_is_kept_only_when_it_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut array = job_array(dir.path()).dry_run(true);
        assert!(array.add_prestep("echo preparing"));
        assert!(!array.add_prestep("false"));

        let submission = array.submit(&jobs(&["echo hello"]), &mut AutoConfirm(true)).unwrap();
        let script = fs::read_to_string(&submission.script).unwrap();
        assert!(script.contains("echo preparing\necho hello\n"));
        assert!(!script.contains("\nfalse\n"));
    }
}

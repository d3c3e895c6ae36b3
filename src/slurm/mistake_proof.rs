use log::{info, warn};

use crate::error::JobArrayError;
use crate::policy::Confirm;

/// Ask before submitting a job that mentions the launcher more than once
///
/// `python a.py; python b.py` in a single job is usually two jobs pasted together by mistake.
/// Jobs are never changed here: the operator either confirms or the submission is aborted.
pub fn check_launchers(jobs: &[String], launcher: &str, confirm: &mut dyn Confirm) -> Result<(), JobArrayError> {
    for job in jobs {
        let count = job.matches(launcher).count();
        if count <= 1 {
            continue;
        }

        warn!("Job calls {} {} times: {}", launcher, count, job);
        let question = format!("Job `{}` calls {} {} times. Submit anyway?", job, launcher, count);
        if !confirm.confirm(&question)? {
            info!("Submission declined");
            return Err(JobArrayError::UserAbort);
        }
    }
    Ok(())
}

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::error::JobArrayError;
use crate::slurm::config::JobConfig;

/// included header template, used when no template file is given
pub static DEFAULT_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/header.txt"));

/// Lines starting with this are dropped when no email is configured
static MAIL_DIRECTIVE: &str = "#SBATCH --mail";

/// Rendering context for the header
///
/// Field names are the placeholder names available to templates, e.g. `{time}`. A placeholder
/// that isn't listed here is a rendering error.
#[derive(Serialize)]
struct HeaderContext {
    name: String,
    email: String,
    output_dir: String,
    time: String,
    array: String,
    nodes: u32,
    ntasks: u32,
    cpus: u32,
    gpus: u32,
    mem_per_cpu: u32,
    env: String,
}

impl From<&JobConfig> for HeaderContext {
    fn from(config: &JobConfig) -> Self {
        HeaderContext {
            name: config.name().to_string(),
            email: config.email().unwrap_or_default().to_string(),
            output_dir: config.output_dir().display().to_string(),
            time: config.time().to_string(),
            array: config.array_range(),
            nodes: config.nodes(),
            ntasks: config.ntasks(),
            cpus: config.cpus(),
            gpus: config.gpus(),
            mem_per_cpu: config.mem_per_cpu(),
            env: config.env().unwrap_or_default().to_string(),
        }
    }
}

impl JobConfig {
    /// Render the SBATCH header from the template file at `template`, or the included
    /// [`DEFAULT_TEMPLATE`] when there's no file
    ///
    /// Each template line is rendered on its own. Mail directives are dropped before
    /// substitution when there's no email, so `{email}` never renders empty.
    pub fn create_header(&self, template: Option<&Path>) -> Result<String, JobArrayError> {
        let text = match template {
            Some(path) => {
                info!("Rendering header from {}", path.display());
                fs::read_to_string(path)
                    .map_err(|source| JobArrayError::TemplateNotFound { path: path.to_path_buf(), source })?
            }
            None => {
                info!("Rendering header from the default template");
                DEFAULT_TEMPLATE.to_string()
            }
        };
        render_header(&text, &HeaderContext::from(self), self.email().is_some())
    }
}

fn render_header(template: &str, context: &HeaderContext, mail: bool) -> Result<String, JobArrayError> {
    let mut lines: Vec<String> = Vec::new();
    for (i, line) in template.lines().enumerate() {
        if !mail && line.trim_start().starts_with(MAIL_DIRECTIVE) {
            debug!("No email set, dropping line {}: {}", i + 1, line);
            continue;
        }
        lines.push(render_line(line, context).map_err(|err| JobArrayError::Template(format!("line {}: {}", i + 1, err)))?);
    }
    Ok(lines.join("\n"))
}

fn render_line(line: &str, context: &HeaderContext) -> Result<String, tinytemplate::error::Error> {
    let mut tt = TinyTemplate::new();
    // paths and addresses go in verbatim
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("line", line)?;
    tt.render("line", context)
}

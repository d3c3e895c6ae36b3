/// Commands that differ between clusters
///
/// Defaults match a SLURM cluster using environment modules and an anaconda module for conda.
#[derive(Clone, Debug)]
pub struct Cluster {
    /// Unload everything that's currently loaded
    pub reset: String,
    /// Make the environment manager available
    pub env_manager: String,
    /// Followed by a module name
    pub module_load: String,
    /// Followed by the environment name
    pub activate: String,
    /// Followed by the script path
    pub submit: String,
    /// Set by SLURM to the array task index at run time
    pub array_index_var: String,
    /// Program that runs user scripts
    pub launcher: String,
    /// Suffix of user script files
    pub script_suffix: String,
}

impl Default for Cluster {
    fn default() -> Self {
        Cluster {
            reset: "module purge".to_string(),
            env_manager: "module load anaconda3/2021.11".to_string(),
            module_load: "module load".to_string(),
            activate: "conda activate".to_string(),
            submit: "sbatch".to_string(),
            array_index_var: "SLURM_ARRAY_TASK_ID".to_string(),
            launcher: "python".to_string(),
            script_suffix: ".py".to_string(),
        }
    }
}

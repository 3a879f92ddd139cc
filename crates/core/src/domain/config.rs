// Compose Configuration Model

use super::error::{DomainError, Result};
use super::job::Job;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Var holding the backend region
pub const REGION_VAR: &str = "AWS_REGION";

/// Var holding the backend credential profile
pub const PROFILE_VAR: &str = "AWS_PROFILE";

/// Parsed compose file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    #[serde(default)]
    pub jobs: BTreeMap<String, Job>,
}

/// Region/profile hints threaded into session construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSettings {
    pub region: Option<String>,
    pub profile: Option<String>,
}

impl ComposeConfig {
    /// Build a config from jobs (keyed by their names)
    pub fn from_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        let jobs = jobs.into_iter().map(|j| (j.name.clone(), j)).collect();
        Self {
            description: None,
            vars: BTreeMap::new(),
            jobs,
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Copy every map key into its job's `name`
    pub fn normalize(&mut self) {
        for (name, job) in self.jobs.iter_mut() {
            job.name = name.clone();
        }
    }

    pub fn total_stacks(&self) -> usize {
        self.jobs.values().map(|j| j.stacks.len()).sum()
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            region: self.vars.get(REGION_VAR).cloned(),
            profile: self.vars.get(PROFILE_VAR).cloned(),
        }
    }

    /// Validate the configuration, reporting the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            return Err(DomainError::NoJobs);
        }

        // stack name -> owning job
        let mut owners: HashMap<&str, &str> = HashMap::new();

        for (name, job) in &self.jobs {
            if name.trim().is_empty() {
                return Err(DomainError::EmptyJobName);
            }
            if job.stacks.is_empty() {
                return Err(DomainError::EmptyJob(name.clone()));
            }

            for stack in &job.stacks {
                if stack.stack_name.trim().is_empty() {
                    return Err(DomainError::EmptyStackName { job: name.clone() });
                }
                if stack.template_file.trim().is_empty() {
                    return Err(DomainError::MissingTemplate {
                        job: name.clone(),
                        stack: stack.stack_name.clone(),
                    });
                }
                if let Some(first) = owners.insert(&stack.stack_name, name) {
                    if first == name.as_str() {
                        return Err(DomainError::RepeatedStack {
                            job: name.clone(),
                            stack: stack.stack_name.clone(),
                        });
                    }
                    return Err(DomainError::DuplicateStack {
                        stack: stack.stack_name.clone(),
                        first: first.to_string(),
                        second: name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

//! Level Grouper - partitions jobs into ordering groups
//!
//! Deploy runs groups in ascending order key, destroy in descending order
//! key so dependents are torn down before their dependencies.

use crate::domain::{ComposeConfig, Job, OrderKey, RunMode};
use std::collections::BTreeMap;

/// Jobs sharing one ordering key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderGroup {
    pub order: OrderKey,
    /// Sorted by job name; position carries no meaning
    pub jobs: Vec<Job>,
}

impl OrderGroup {
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }
}

/// Direction-sorted ordering groups for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    mode: RunMode,
    groups: Vec<OrderGroup>,
}

impl ExecutionPlan {
    /// Group every job of the config by its ordering key
    ///
    /// Job names are taken from the config's map keys.
    pub fn build(config: &ComposeConfig, mode: RunMode) -> Self {
        let mut by_order: BTreeMap<OrderKey, Vec<Job>> = BTreeMap::new();
        for (name, job) in &config.jobs {
            let mut job = job.clone();
            job.name = name.clone();
            by_order.entry(job.order).or_default().push(job);
        }

        let mut groups: Vec<OrderGroup> = by_order
            .into_iter()
            .map(|(order, jobs)| OrderGroup { order, jobs })
            .collect();

        if mode == RunMode::Destroy {
            groups.reverse();
        }

        Self { mode, groups }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn groups(&self) -> &[OrderGroup] {
        &self.groups
    }

    /// Order keys in execution sequence
    pub fn orders(&self) -> Vec<OrderKey> {
        self.groups.iter().map(|g| g.order).collect()
    }

    /// Total jobs across all groups (also the worker pool size)
    pub fn job_count(&self) -> usize {
        self.groups.iter().map(|g| g.jobs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

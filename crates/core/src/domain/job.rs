// Job & Stack Domain Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Job name (unique key in the compose file)
pub type JobName = String;

/// Ordering key: jobs sharing it form one level and run concurrently
pub type OrderKey = i32;

/// Run direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Ascending levels, forward stack order, apply operations
    Deploy,
    /// Descending levels, reverse stack order, destroy operations
    Destroy,
}

impl RunMode {
    pub fn from_deploy_flag(deploy: bool) -> Self {
        if deploy {
            RunMode::Deploy
        } else {
            RunMode::Destroy
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Deploy => write!(f, "DEPLOY"),
            RunMode::Destroy => write!(f, "DESTROY"),
        }
    }
}

/// Backend operation performed on a single stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackOperation {
    Apply,
    ApplyDryRun,
    Destroy,
    DestroyDryRun,
}

impl StackOperation {
    /// Pick the operation for a run direction and dry-run flag
    pub fn select(mode: RunMode, dry_run: bool) -> Self {
        match (mode, dry_run) {
            (RunMode::Deploy, false) => StackOperation::Apply,
            (RunMode::Deploy, true) => StackOperation::ApplyDryRun,
            (RunMode::Destroy, false) => StackOperation::Destroy,
            (RunMode::Destroy, true) => StackOperation::DestroyDryRun,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, StackOperation::ApplyDryRun | StackOperation::DestroyDryRun)
    }
}

impl std::fmt::Display for StackOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackOperation::Apply => write!(f, "APPLY"),
            StackOperation::ApplyDryRun => write!(f, "APPLY_DRY_RUN"),
            StackOperation::Destroy => write!(f, "DESTROY"),
            StackOperation::DestroyDryRun => write!(f, "DESTROY_DRY_RUN"),
        }
    }
}

/// One provisionable unit inside a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stack {
    pub stack_name: String,
    pub template_file: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// e.g. CAPABILITY_IAM, CAPABILITY_NAMED_IAM
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Stack {
    pub fn new(stack_name: impl Into<String>, template_file: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            template_file: template_file.into(),
            parameters: BTreeMap::new(),
            tags: BTreeMap::new(),
            capabilities: Vec::new(),
        }
    }
}

/// Job Entity: an ordered sequence of stacks sharing one ordering key
///
/// Immutable once the compose file is loaded. The name is not part of the
/// serialized form; it is filled from the map key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Job {
    #[serde(skip)]
    pub name: JobName,

    #[serde(default)]
    pub order: OrderKey,

    pub stacks: Vec<Stack>,
}

impl Job {
    pub fn new(name: impl Into<String>, order: OrderKey, stacks: Vec<Stack>) -> Self {
        Self {
            name: name.into(),
            order,
            stacks,
        }
    }

    /// Stacks in the order the given direction walks them
    ///
    /// Deploy walks the declared order, destroy walks it backwards.
    pub fn stacks_for(&self, mode: RunMode) -> Box<dyn Iterator<Item = &Stack> + Send + '_> {
        match mode {
            RunMode::Deploy => Box::new(self.stacks.iter()),
            RunMode::Destroy => Box::new(self.stacks.iter().rev()),
        }
    }
}

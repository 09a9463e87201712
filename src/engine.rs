//! Workflow execution.
//!
//! Every operation is a [`Workflow`]. Workflows run through an [`Executor`],
//! including workflows started from inside another workflow, so the State
//! File is committed after each unit of work and a later failure never loses
//! earlier progress.

use std::fmt;

use crate::error::Result;
use crate::state::StateFile;

/// How a workflow ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The workflow changed something.
    Done,
    /// Nothing to do: the target is already at the latest state.
    AlreadyUpToDate,
    /// Nothing to do for another benign reason (already installed, not
    /// installed, untracked repository).
    Skipped,
}

impl Outcome {
    pub fn changed(self) -> bool {
        self == Self::Done
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Done => "done",
            Self::AlreadyUpToDate => "already up to date",
            Self::Skipped => "skipped",
        })
    }
}

pub trait Workflow {
    fn name(&self) -> String;
    fn execute(&self) -> Result<Outcome>;
}

pub trait Executor {
    fn execute(&self, workflow: &dyn Workflow) -> Result<Outcome>;
}

/// Runs workflows and commits the State File after each one, whatever the
/// result.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    state: StateFile,
}

impl WorkflowEngine {
    pub fn new(state: StateFile) -> Self {
        Self { state }
    }
}

impl Executor for WorkflowEngine {
    fn execute(&self, workflow: &dyn Workflow) -> Result<Outcome> {
        let name = workflow.name();
        let span = tracing::debug_span!("workflow", name = %name);
        let _enter = span.enter();

        let result = workflow.execute();
        match &result {
            Ok(outcome) => tracing::debug!(%outcome, "workflow finished"),
            Err(err) => tracing::debug!(error = %err, "workflow failed"),
        }

        if let Err(err) = self.state.commit() {
            tracing::error!(
                path = %self.state.path().display(),
                error = %err,
                "failed to commit state file"
            );
        }
        result
    }
}

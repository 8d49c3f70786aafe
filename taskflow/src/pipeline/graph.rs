//! Pipeline graph construction and ordering.

use super::{ExecutionEngine, TaskSpec};
use crate::context::RunContext;
use crate::core::RunRecord;
use crate::errors::{ContractErrorInfo, CycleDetectedError, PipelineValidationError};
use std::collections::{HashMap, HashSet};

/// A directed acyclic graph of tasks identified by a pipeline id.
///
/// The definition is never touched by a run, so one pipeline can be run any
/// number of times, including concurrently.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// The pipeline id.
    id: String,
    /// Task specifications.
    tasks: HashMap<String, TaskSpec>,
    /// Registration order, used to break ties between independent tasks.
    task_order: Vec<String>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            task_order: Vec::new(),
        }
    }

    /// Registers a task.
    ///
    /// Dependencies may name tasks that are registered later; they are
    /// resolved when the execution order is computed.
    ///
    /// # Errors
    ///
    /// Returns an error if the task is invalid on its own or its id is
    /// already taken.
    pub fn add_task(mut self, task: TaskSpec) -> Result<Self, PipelineValidationError> {
        task.validate()?;

        if self.tasks.contains_key(&task.id) {
            return Err(PipelineValidationError::new(format!(
                "Task '{}' is already registered in pipeline '{}'",
                task.id, self.id
            ))
            .with_tasks(vec![task.id.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-004-DUPLICATE",
                    format!("Duplicate task id '{}'", task.id),
                )
                .with_fix_hint("Give every task in a pipeline a distinct id."),
            ));
        }

        self.task_order.push(task.id.clone());
        self.tasks.insert(task.id.clone(), task);
        Ok(self)
    }

    /// Returns the pipeline id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns a task by id.
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.tasks.get(id)
    }

    /// Returns task ids in registration order.
    #[must_use]
    pub fn task_ids(&self) -> &[String] {
        &self.task_order
    }

    /// Computes the execution order.
    ///
    /// Every task appears exactly once and after all of its transitive
    /// dependencies. Independent tasks keep their registration order, so the
    /// result is the same on every call.
    ///
    /// # Errors
    ///
    /// Returns an error if a dependency names an unknown task or the graph
    /// contains a cycle.
    pub fn execution_order(&self) -> Result<Vec<String>, PipelineValidationError> {
        topological_sort(&self.tasks, &self.task_order)
    }

    /// Checks the whole definition without running anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline id is blank or the graph cannot be
    /// ordered. A pipeline with no tasks is valid and runs to success.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.id.trim().is_empty() {
            return Err(PipelineValidationError::new(
                "Pipeline id cannot be empty or whitespace-only",
            ));
        }
        self.execution_order().map(|_| ())
    }

    /// Validates the pipeline and returns its tasks in execution order.
    pub(crate) fn ordered_tasks(&self) -> Result<Vec<&TaskSpec>, PipelineValidationError> {
        self.validate()?;
        let order = self.execution_order()?;
        Ok(order.iter().filter_map(|id| self.tasks.get(id)).collect())
    }

    /// Runs the pipeline with the default engine.
    ///
    /// Task failures are reported on the returned record, never as errors.
    ///
    /// # Errors
    ///
    /// Returns a configuration error, before any task runs, if the pipeline
    /// is malformed.
    pub async fn run(&self, ctx: &RunContext) -> Result<RunRecord, PipelineValidationError> {
        ExecutionEngine::default().run(self, ctx).await
    }
}

/// Post-order depth-first topological sort.
///
/// Roots are visited in registration order and dependencies in the order
/// they were declared.
/// The visited set is shared across roots, so every id is emitted once.
fn topological_sort(
    tasks: &HashMap<String, TaskSpec>,
    task_order: &[String],
) -> Result<Vec<String>, PipelineValidationError> {
    for id in task_order {
        let Some(spec) = tasks.get(id) else { continue };
        if let Some(dep) = spec.dependencies.iter().find(|dep| !tasks.contains_key(*dep)) {
            return Err(PipelineValidationError::new(format!(
                "Task '{id}' depends on unknown task '{dep}'"
            ))
            .with_tasks(vec![id.clone(), dep.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "CONTRACT-004-MISSING_DEP",
                    format!("Dependency '{dep}' not found"),
                )
                .with_fix_hint("Register the dependency in the same pipeline or remove it."),
            ));
        }
    }

    fn visit<'a>(
        node: &'a str,
        tasks: &'a HashMap<String, TaskSpec>,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
        result: &mut Vec<String>,
    ) -> Result<(), CycleDetectedError> {
        if visited.contains(node) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|n| *n == node) {
            let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_string()).collect();
            cycle.push(node.to_string());
            return Err(CycleDetectedError::new(cycle));
        }

        path.push(node);
        if let Some(spec) = tasks.get(node) {
            for dep in &spec.dependencies {
                visit(dep, tasks, visited, path, result)?;
            }
        }
        path.pop();

        visited.insert(node);
        result.push(node.to_string());
        Ok(())
    }

    let mut result = Vec::with_capacity(task_order.len());
    let mut visited = HashSet::new();
    let mut path = Vec::new();

    for id in task_order {
        visit(id, tasks, &mut visited, &mut path, &mut result)?;
    }

    Ok(result)
}

//! Task dependency graph
//!
//! Pipeline stages are declared as named tasks with the tasks they wait for.
//! Execution is sequential in topological order; a task runs only when every
//! predecessor completed, otherwise it is skipped.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use tracing::{error, info, warn};

use crate::error::{IngestError, Result};

#[derive(Debug)]
struct Task<T> {
    name: String,
    payload: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub task: String,
    pub error: String,
}

/// What happened to each task of one execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphOutcome {
    pub completed: Vec<String>,
    pub failed: Vec<TaskFailure>,
    pub skipped: Vec<String>,
}

impl GraphOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

#[derive(Debug)]
pub struct TaskGraph<T> {
    graph: DiGraph<Task<T>, ()>,
    index: HashMap<String, NodeIndex>,
}

impl<T> Default for TaskGraph<T> {
    fn default() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Clone> TaskGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&mut self, name: impl Into<String>, payload: T) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(IngestError::Graph(format!("task {} declared twice", name)));
        }
        let node = self.graph.add_node(Task {
            name: name.clone(),
            payload,
        });
        self.index.insert(name, node);
        Ok(())
    }

    /// Declare that `task` runs only after every task in `predecessors`
    pub fn wait_for(&mut self, task: &str, predecessors: &[&str]) -> Result<()> {
        let node = self.node(task)?;
        for pred in predecessors {
            let pred_node = self.node(pred)?;
            self.graph.update_edge(pred_node, node, ());
        }
        Ok(())
    }

    fn node(&self, name: &str) -> Result<NodeIndex> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| IngestError::Graph(format!("unknown task {}", name)))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Task names in an order that respects every dependency
    pub fn order(&self) -> Result<Vec<String>> {
        Ok(self
            .sorted()?
            .into_iter()
            .map(|n| self.graph[n].name.clone())
            .collect())
    }

    fn sorted(&self) -> Result<Vec<NodeIndex>> {
        toposort(&self.graph, None).map_err(|cycle| {
            IngestError::Graph(format!(
                "dependency cycle through task {}",
                self.graph[cycle.node_id()].name
            ))
        })
    }

    /// Run every task with `run`, in dependency order
    pub async fn execute<F, Fut, E>(&self, mut run: F) -> Result<GraphOutcome>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Display,
    {
        let order = self.sorted()?;
        let mut done: HashSet<NodeIndex> = HashSet::new();
        let mut outcome = GraphOutcome::default();

        for node in order {
            let task = &self.graph[node];
            let blocked: Vec<&str> = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .filter(|pred| !done.contains(pred))
                .map(|pred| self.graph[pred].name.as_str())
                .collect();

            if !blocked.is_empty() {
                warn!(task = %task.name, waiting_on = ?blocked, "Skipping task");
                outcome.skipped.push(task.name.clone());
                continue;
            }

            info!(task = %task.name, "Starting task");
            match run(task.payload.clone()).await {
                Ok(()) => {
                    info!(task = %task.name, "Task finished");
                    done.insert(node);
                    outcome.completed.push(task.name.clone());
                },
                Err(e) => {
                    error!(task = %task.name, "Task failed: {}", e);
                    outcome.failed.push(TaskFailure {
                        task: task.name.clone(),
                        error: e.to_string(),
                    });
                },
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn chain() -> TaskGraph<&'static str> {
        let mut graph = TaskGraph::new();
        for name in ["c", "b", "a"] {
            graph.add_task(name, name).unwrap();
        }
        graph.wait_for("b", &["a"]).unwrap();
        graph.wait_for("c", &["b"]).unwrap();
        graph
    }

    #[test]
    fn test_order_respects_dependencies() {
        assert_eq!(chain().order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = chain();
        graph.wait_for("a", &["c"]).unwrap();
        assert!(matches!(graph.order(), Err(IngestError::Graph(_))));
    }

    #[test]
    fn test_unknown_predecessor() {
        let mut graph = chain();
        assert!(graph.wait_for("a", &["missing"]).is_err());
        assert!(graph.add_task("a", "again").is_err());
    }

    #[tokio::test]
    async fn test_execute_runs_in_order() {
        let mut ran = Vec::new();
        let outcome = chain()
            .execute(|name| {
                ran.push(name);
                async { Ok::<(), String>(()) }
            })
            .await
            .unwrap();

        assert_eq!(ran, vec!["a", "b", "c"]);
        assert!(outcome.is_success());
        assert_eq!(outcome.completed.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_skips_dependents() {
        let mut graph = chain();
        graph.add_task("independent", "independent").unwrap();

        let outcome = graph
            .execute(|name| async move {
                if name == "a" {
                    Err("boom".to_string())
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.failed, vec![TaskFailure {
            task: "a".to_string(),
            error: "boom".to_string(),
        }]);
        assert_eq!(outcome.skipped, vec!["b", "c"]);
        assert_eq!(outcome.completed, vec!["independent"]);
        assert!(!outcome.is_success());
    }
}

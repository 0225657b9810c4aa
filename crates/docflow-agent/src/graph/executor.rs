use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, error, info, warn};

use docflow_core::error::{DocflowError, Result};

use super::edge::Transition;
use super::node::{NodeId, Step};
use super::retry::{with_retry, RetryPolicy};
use super::state::RunState;

struct NodeEntry<N: 'static, C, S> {
    step: Step<C, S>,
    next: Transition<N, S>,
}

/// A compiled workflow: one handler and one successor rule per node.
///
/// Built once and shared by every request; all per-request data lives in
/// the run state passed to [`GraphExecutor::run`].
pub struct WorkflowGraph<N: 'static, C, S> {
    name: &'static str,
    entry: N,
    terminal: N,
    step_limit: usize,
    retry: RetryPolicy,
    nodes: HashMap<N, NodeEntry<N, C, S>>,
}

/// Collects nodes and validates the finished table.
pub struct GraphBuilder<N: 'static, C, S> {
    name: &'static str,
    entry: N,
    terminal: N,
    step_limit: usize,
    retry: RetryPolicy,
    nodes: HashMap<N, NodeEntry<N, C, S>>,
}

impl<N: NodeId, C, S> GraphBuilder<N, C, S> {
    pub fn new(name: &'static str, entry: N, terminal: N) -> Self {
        Self {
            name,
            entry,
            terminal,
            step_limit: 100,
            retry: RetryPolicy::default(),
            nodes: HashMap::new(),
        }
    }

    pub fn node(mut self, id: N, step: Step<C, S>, next: Transition<N, S>) -> Self {
        self.nodes.insert(id, NodeEntry { step, next });
        self
    }

    /// Hard ceiling on node executions per run.
    pub fn step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Check the table and freeze it.
    ///
    /// Every node must be registered and reachable from the entry node, only
    /// the terminal node may end the run, and every declared successor must
    /// be a registered node.
    pub fn build(self) -> Result<WorkflowGraph<N, C, S>> {
        let name = self.name;
        let invalid = |msg: String| DocflowError::Config(format!("workflow '{name}': {msg}"));

        for id in N::ALL {
            let Some(entry) = self.nodes.get(id) else {
                return Err(invalid(format!("node '{}' has no handler", id.name())));
            };
            let ends = matches!(entry.next, Transition::End);
            if *id == self.terminal && !ends {
                return Err(invalid(format!(
                    "terminal node '{}' must not have a successor",
                    id.name()
                )));
            }
            if *id != self.terminal && ends {
                return Err(invalid(format!("node '{}' has no successor", id.name())));
            }
        }
        if self.step_limit == 0 {
            return Err(invalid("step limit must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.entry]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let entry = self
                .nodes
                .get(&id)
                .ok_or_else(|| invalid(format!("node '{}' is not registered", id.name())))?;
            queue.extend(entry.next.targets());
        }
        if let Some(orphan) = N::ALL.iter().find(|id| !seen.contains(*id)) {
            return Err(invalid(format!("node '{}' is unreachable", orphan.name())));
        }

        Ok(WorkflowGraph {
            name: self.name,
            entry: self.entry,
            terminal: self.terminal,
            step_limit: self.step_limit,
            retry: self.retry,
            nodes: self.nodes,
        })
    }
}

impl<N: NodeId, C, S> WorkflowGraph<N, C, S> {
    pub fn builder(name: &'static str, entry: N, terminal: N) -> GraphBuilder<N, C, S> {
        GraphBuilder::new(name, entry, terminal)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn entry(&self) -> N {
        self.entry
    }

    pub fn terminal(&self) -> N {
        self.terminal
    }

    pub fn step_limit(&self) -> usize {
        self.step_limit
    }
}

impl<N: NodeId, C: Sync, S: RunState> WorkflowGraph<N, C, S> {
    /// Shorthand for `GraphExecutor::new(self).run(deps, state)`.
    pub async fn run(&self, deps: &C, state: S) -> Result<Execution<N, S>> {
        GraphExecutor::new(self).run(deps, state).await
    }
}

/// A finished run: the final state and the nodes visited, in order.
#[derive(Debug)]
pub struct Execution<N, S> {
    pub state: S,
    pub path: Vec<N>,
    /// The run hit the graph's step limit and was cut short. The state's
    /// error then carries the `StepLimitExceeded` message.
    pub step_limit_exceeded: bool,
}

impl<N: NodeId, S> Execution<N, S> {
    pub fn visited(&self, node: N) -> usize {
        self.path.iter().filter(|n| **n == node).count()
    }

    pub fn path_names(&self) -> Vec<&'static str> {
        self.path.iter().map(|n| n.name()).collect()
    }
}

/// Drives one run state through a compiled graph.
pub struct GraphExecutor<'g, N: 'static, C, S> {
    graph: &'g WorkflowGraph<N, C, S>,
}

impl<'g, N: NodeId, C: Sync, S: RunState> GraphExecutor<'g, N, C, S> {
    pub fn new(graph: &'g WorkflowGraph<N, C, S>) -> Self {
        Self { graph }
    }

    /// Execute from the entry node until the terminal node has run.
    ///
    /// Once the state carries an error every successor rule is bypassed and
    /// the run jumps to the terminal node. Reaching the step limit records
    /// `StepLimitExceeded` as the run's error, runs the terminal node once
    /// outside the retry policy, and flags the returned [`Execution`].
    pub async fn run(&self, deps: &C, mut state: S) -> Result<Execution<N, S>> {
        let graph = self.graph;
        let mut path = Vec::new();
        let mut current = graph.entry;

        loop {
            if path.len() >= graph.step_limit {
                warn!(
                    workflow = graph.name,
                    node = current.name(),
                    limit = graph.step_limit,
                    "Step limit reached, aborting run"
                );
                let err = DocflowError::StepLimitExceeded {
                    workflow: graph.name.to_string(),
                    limit: graph.step_limit,
                };
                state.set_error(err.to_string());
                self.run_terminal(deps, &mut state).await?;
                path.push(graph.terminal);
                return Ok(Execution {
                    state,
                    path,
                    step_limit_exceeded: true,
                });
            }
            path.push(current);

            let entry = graph.nodes.get(&current).ok_or_else(|| {
                DocflowError::Config(format!(
                    "workflow '{}': node '{}' not found",
                    graph.name,
                    current.name()
                ))
            })?;

            debug!(workflow = graph.name, node = current.name(), step = path.len(), "Executing node");
            match &entry.step {
                Step::Retried(handler) => {
                    with_retry(current.name(), *handler, graph.retry, deps, &mut state).await;
                }
                Step::BestEffort(handler) => {
                    if let Err(e) = handler(deps, &mut state).await {
                        error!(workflow = graph.name, node = current.name(), error = %e, "Node failed");
                    }
                }
            }

            if current == graph.terminal {
                break;
            }

            current = if state.failed() {
                graph.terminal
            } else {
                entry.next.resolve(&state).ok_or_else(|| {
                    DocflowError::Config(format!(
                        "workflow '{}': node '{}' chose an undeclared successor",
                        graph.name,
                        current.name()
                    ))
                })?
            };
        }

        info!(
            workflow = graph.name,
            steps = path.len(),
            failed = state.failed(),
            "Workflow finished"
        );
        Ok(Execution {
            state,
            path,
            step_limit_exceeded: false,
        })
    }

    /// Run the terminal handler once, swallowing its failure.
    async fn run_terminal(&self, deps: &C, state: &mut S) -> Result<()> {
        let graph = self.graph;
        let entry = graph.nodes.get(&graph.terminal).ok_or_else(|| {
            DocflowError::Config(format!(
                "workflow '{}': terminal node '{}' not found",
                graph.name,
                graph.terminal.name()
            ))
        })?;
        let handler = match &entry.step {
            Step::Retried(handler) | Step::BestEffort(handler) => *handler,
        };
        if let Err(e) = handler(deps, state).await {
            error!(workflow = graph.name, node = graph.terminal.name(), error = %e, "Node failed");
        }
        Ok(())
    }
}

use std::fmt::Debug;
use std::hash::Hash;

use futures::future::BoxFuture;

use docflow_core::error::Result;

/// Identifier of one step in a workflow graph.
///
/// Implemented by a fieldless enum per workflow, so the node set is closed
/// and every table built over it can be checked for completeness.
pub trait NodeId: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Every node of the workflow.
    const ALL: &'static [Self];

    /// Name used in run-log lines and error messages.
    fn name(self) -> &'static str;
}

/// Async node body.
///
/// Mutates the run state in place. An `Err` marks a failed attempt; the
/// state keeps whatever the attempt wrote before failing.
pub type Handler<C, S> = for<'a> fn(&'a C, &'a mut S) -> BoxFuture<'a, Result<()>>;

/// How the executor invokes a node's handler.
pub enum Step<C, S> {
    /// Run under the graph's retry policy; final failure lands in the run
    /// state's error slot.
    Retried(Handler<C, S>),
    /// Run exactly once, even on a failed run. Failures are logged and
    /// dropped.
    BestEffort(Handler<C, S>),
}

impl<C, S> Step<C, S> {
    pub fn retried(handler: Handler<C, S>) -> Self {
        Step::Retried(handler)
    }

    pub fn best_effort(handler: Handler<C, S>) -> Self {
        Step::BestEffort(handler)
    }

    pub fn is_retried(&self) -> bool {
        matches!(self, Step::Retried(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Demo {
        Start,
        Stop,
    }

    impl NodeId for Demo {
        const ALL: &'static [Self] = &[Demo::Start, Demo::Stop];

        fn name(self) -> &'static str {
            match self {
                Demo::Start => "start",
                Demo::Stop => "stop",
            }
        }
    }

    fn noop<'a>(_: &'a (), _: &'a mut u32) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn test_node_names() {
        let names: Vec<_> = Demo::ALL.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["start", "stop"]);
    }

    #[test]
    fn test_step_kinds() {
        assert!(Step::<(), u32>::retried(noop).is_retried());
        assert!(!Step::<(), u32>::best_effort(noop).is_retried());
    }
}

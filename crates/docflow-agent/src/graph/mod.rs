//! Graph execution engine for document workflows.
//!
//! A workflow is a closed set of nodes (a fieldless enum implementing
//! [`NodeId`]), each with an async handler and a successor rule: either a
//! fixed next node or a predicate over the run state. [`GraphBuilder`]
//! checks the table once; [`GraphExecutor`] then walks it for any number of
//! concurrent requests, each with its own [`RunState`].
//!
//! Retry is explicit per node: handlers registered with [`Step::Retried`]
//! run under the graph's [`RetryPolicy`], so a failing collaborator turns
//! into a recorded error rather than a panic or a propagated `Err`.

pub mod edge;
pub mod executor;
pub mod node;
pub mod retry;
pub mod state;

pub use edge::Transition;
pub use executor::{Execution, GraphBuilder, GraphExecutor, WorkflowGraph};
pub use node::{Handler, NodeId, Step};
pub use retry::{with_retry, RetryPolicy};
pub use state::RunState;

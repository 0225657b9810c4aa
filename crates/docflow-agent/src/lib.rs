pub mod graph;
pub mod workflows;

pub use graph::{Execution, GraphExecutor, NodeId, RetryPolicy, RunState, Step, Transition, WorkflowGraph};
pub use workflows::{
    ChatDeps, ChatRequest, ChatWorkflow, SummaryDeps, SummaryRequest, SummaryWorkflow, TutorialDeps,
    TutorialRequest, TutorialWorkflow,
};

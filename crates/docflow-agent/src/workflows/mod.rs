//! The three document workflows built on [`crate::graph`].

pub mod chat;
pub mod document;
pub mod prompts;
pub mod rag;
pub mod summary;
pub mod tutorial;

pub use chat::{ChatDeps, ChatNode, ChatRequest, ChatState, ChatWorkflow};
pub use summary::{SummaryDeps, SummaryNode, SummaryRequest, SummaryState, SummaryWorkflow};
pub use tutorial::{TutorialDeps, TutorialNode, TutorialRequest, TutorialState, TutorialWorkflow};

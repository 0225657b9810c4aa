//! Question answering and summarization over a chat history.
//!
//! ```text
//! entry ──summary──> summarize ───────────────────────────> translate -> finish
//!   └──question────> answer -> verify ─true / bad──────────> translate
//!                                 ^  └─false─> refine ─┐
//!                                 └────────────────────┘
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use docflow_core::config::EngineConfig;
use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::LlmExecutor;
use docflow_core::types::{
    is_summary_query, Language, Outcome, WorkflowOutput, CHAT_UNRELATED_APOLOGY,
};

use super::prompts;
use super::rag::{translate_text, verdict};
use crate::graph::{Execution, NodeId, RetryPolicy, RunState, Step, Transition, WorkflowGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatNode {
    Entry,
    Summarize,
    Answer,
    Verify,
    Refine,
    Translate,
    Finish,
}

impl NodeId for ChatNode {
    const ALL: &'static [Self] = &[
        ChatNode::Entry,
        ChatNode::Summarize,
        ChatNode::Answer,
        ChatNode::Verify,
        ChatNode::Refine,
        ChatNode::Translate,
        ChatNode::Finish,
    ];

    fn name(self) -> &'static str {
        match self {
            ChatNode::Entry => "entry",
            ChatNode::Summarize => "summarize",
            ChatNode::Answer => "answer",
            ChatNode::Verify => "verify",
            ChatNode::Refine => "refine",
            ChatNode::Translate => "translate",
            ChatNode::Finish => "finish",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<String>,
    pub query: String,
    pub lang: Language,
}

#[derive(Debug, Clone)]
pub struct ChatState {
    pub messages: Vec<String>,
    pub query: String,
    pub lang: Language,

    pub is_summary: bool,
    pub needs_refine: bool,
    /// Set when the answer was replaced by the fixed apology.
    pub unrelated: bool,

    pub summary: Option<String>,
    pub answer: Option<String>,
    pub refine_count: u32,

    pub log: Vec<String>,
    pub error: Option<String>,
}

impl ChatState {
    pub fn new(request: ChatRequest) -> Self {
        Self {
            messages: request.messages,
            query: request.query,
            lang: request.lang,
            is_summary: false,
            needs_refine: false,
            unrelated: false,
            summary: None,
            answer: None,
            refine_count: 0,
            log: vec![],
            error: None,
        }
    }

    fn history(&self) -> String {
        self.messages.join("\n")
    }

    fn apologize(&mut self) {
        self.answer = Some(CHAT_UNRELATED_APOLOGY.to_string());
        self.unrelated = true;
        self.needs_refine = false;
    }

    pub fn into_output(self) -> WorkflowOutput {
        let outcome = match (self.error, self.is_summary) {
            (Some(e), _) => Outcome::Error(e),
            (None, true) => match self.summary {
                Some(s) => Outcome::Summary(s),
                None => Outcome::Error("workflow finished without a summary".into()),
            },
            (None, false) => match self.answer {
                Some(a) => Outcome::Answer(a),
                None => Outcome::Error("workflow finished without an answer".into()),
            },
        };
        WorkflowOutput {
            file_id: None,
            cached: false,
            log: self.log,
            outcome,
        }
    }
}

impl RunState for ChatState {
    fn log(&self) -> &[String] {
        &self.log
    }

    fn log_mut(&mut self) -> &mut Vec<String> {
        &mut self.log
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn set_error(&mut self, error: String) {
        self.error = Some(error);
    }
}

#[derive(Clone)]
pub struct ChatDeps {
    pub llm: Arc<dyn LlmExecutor>,
    pub max_refines: u32,
}

fn entry<'a>(_deps: &'a ChatDeps, st: &'a mut ChatState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if st.messages.iter().all(|m| m.trim().is_empty()) {
            return Err(DocflowError::Validation("chat history is empty".into()));
        }
        st.is_summary = is_summary_query(&st.query);
        Ok(())
    })
}

fn summarize<'a>(deps: &'a ChatDeps, st: &'a mut ChatState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        st.summary = Some(deps.llm.summarize(&st.messages).await?);
        Ok(())
    })
}

fn answer<'a>(deps: &'a ChatDeps, st: &'a mut ChatState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let prompt = prompts::chat_answer(&st.query, &st.history());
        st.answer = Some(deps.llm.execute(&prompt).await?.trim().to_string());
        Ok(())
    })
}

fn verify<'a>(deps: &'a ChatDeps, st: &'a mut ChatState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let prompt = prompts::chat_verify(
            &st.query,
            &st.history(),
            st.answer.as_deref().unwrap_or(""),
        );
        match verdict(&deps.llm.execute(&prompt).await?).as_str() {
            "bad" => st.apologize(),
            "true" => st.needs_refine = false,
            _ => st.needs_refine = true,
        }
        Ok(())
    })
}

fn refine<'a>(deps: &'a ChatDeps, st: &'a mut ChatState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        st.refine_count += 1;
        if st.refine_count > deps.max_refines {
            warn!(refines = deps.max_refines, "Answer still unverified, giving up");
            st.apologize();
            return Ok(());
        }
        let prompt = prompts::chat_refine(
            &st.query,
            &st.history(),
            st.answer.as_deref().unwrap_or(""),
        );
        st.answer = Some(deps.llm.execute(&prompt).await?.trim().to_string());
        Ok(())
    })
}

fn translate<'a>(deps: &'a ChatDeps, st: &'a mut ChatState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let slot = if st.is_summary { &mut st.summary } else { &mut st.answer };
        let text = slot
            .as_deref()
            .ok_or_else(|| DocflowError::Validation("nothing to translate".into()))?;
        let translated = translate_text(deps.llm.as_ref(), &st.lang, text).await?;
        *slot = Some(translated);
        Ok(())
    })
}

fn finish<'a>(_deps: &'a ChatDeps, st: &'a mut ChatState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        match &st.error {
            Some(e) => warn!(error = %e, "Chat workflow stopped on error"),
            None => info!(
                summary = st.is_summary,
                refines = st.refine_count,
                unrelated = st.unrelated,
                "Chat workflow complete"
            ),
        }
        Ok(())
    })
}

fn after_entry(st: &ChatState) -> ChatNode {
    if st.is_summary {
        ChatNode::Summarize
    } else {
        ChatNode::Answer
    }
}

fn after_verify(st: &ChatState) -> ChatNode {
    if st.needs_refine {
        ChatNode::Refine
    } else {
        ChatNode::Translate
    }
}

fn after_refine(st: &ChatState) -> ChatNode {
    if st.unrelated {
        ChatNode::Translate
    } else {
        ChatNode::Verify
    }
}

fn build_graph(engine: &EngineConfig) -> Result<WorkflowGraph<ChatNode, ChatDeps, ChatState>> {
    use ChatNode::*;

    WorkflowGraph::<ChatNode, ChatDeps, ChatState>::builder("chat", Entry, Finish)
        .node(
            Entry,
            Step::retried(entry),
            Transition::branch(&[Summarize, Answer], after_entry),
        )
        .node(Summarize, Step::retried(summarize), Transition::to(Translate))
        .node(Answer, Step::retried(answer), Transition::to(Verify))
        .node(
            Verify,
            Step::retried(verify),
            Transition::branch(&[Refine, Translate], after_verify),
        )
        .node(
            Refine,
            Step::retried(refine),
            Transition::branch(&[Verify, Translate], after_refine),
        )
        .node(Translate, Step::retried(translate), Transition::to(Finish))
        .node(Finish, Step::best_effort(finish), Transition::End)
        .step_limit(engine.chat_step_limit)
        .retry(RetryPolicy::from_config(engine))
        .build()
}

pub struct ChatWorkflow {
    graph: WorkflowGraph<ChatNode, ChatDeps, ChatState>,
    deps: ChatDeps,
}

impl ChatWorkflow {
    pub fn new(deps: ChatDeps, engine: &EngineConfig) -> Result<Self> {
        Ok(Self {
            graph: build_graph(engine)?,
            deps,
        })
    }

    pub async fn execute(&self, request: ChatRequest) -> Result<Execution<ChatNode, ChatState>> {
        info!(
            messages = request.messages.len(),
            lang = %request.lang,
            "Starting chat workflow"
        );
        self.graph.run(&self.deps, ChatState::new(request)).await
    }

    pub async fn run(&self, request: ChatRequest) -> Result<WorkflowOutput> {
        Ok(self.execute(request).await?.state.into_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::types::SUMMARY_SENTINEL;
    use docflow_test_utils::MockLlm;

    fn workflow(llm: Arc<MockLlm>) -> ChatWorkflow {
        let deps = ChatDeps {
            llm,
            max_refines: 3,
        };
        ChatWorkflow::new(deps, &EngineConfig::default()).unwrap()
    }

    fn request(query: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![
                "alice: the deploy is on friday".into(),
                "bob: staging is frozen until then".into(),
            ],
            query: query.into(),
            lang: Language::English,
        }
    }

    #[tokio::test]
    async fn test_summary_path() {
        let llm = Arc::new(MockLlm::new().with_summary("Deploy planned for Friday."));
        let exec = workflow(llm.clone())
            .execute(request(SUMMARY_SENTINEL))
            .await
            .unwrap();

        assert_eq!(exec.path_names(), vec!["entry", "summarize", "translate", "finish"]);
        assert_eq!(llm.summarized().len(), 1);
        assert_eq!(llm.summarized()[0].len(), 2);
        let out = exec.state.into_output();
        assert_eq!(out.outcome, Outcome::Summary("Deploy planned for Friday.".into()));
        assert!(out.file_id.is_none());
    }

    #[tokio::test]
    async fn test_verified_answer() {
        let llm = Arc::new(
            MockLlm::new()
                .on("Answer the question", "Friday.")
                .on("grounded in the chat history", "true"),
        );
        let exec = workflow(llm).execute(request("When is the deploy?")).await.unwrap();

        assert_eq!(
            exec.path_names(),
            vec!["entry", "answer", "verify", "translate", "finish"]
        );
        assert_eq!(exec.state.answer.as_deref(), Some("Friday."));
    }

    #[tokio::test]
    async fn test_unrelated_answer_apologizes() {
        let llm = Arc::new(
            MockLlm::new()
                .on("Answer the question", "Paris is in France.")
                .on("grounded in the chat history", "bad"),
        );
        let out = workflow(llm).run(request("Capital of France?")).await.unwrap();
        assert_eq!(out.outcome, Outcome::Answer(CHAT_UNRELATED_APOLOGY.into()));
    }

    #[tokio::test]
    async fn test_refine_then_verify() {
        let llm = Arc::new(
            MockLlm::new()
                .on("Answer the question", "Thursday.")
                .on_sequence("grounded in the chat history", &["false", "true"])
                .on("Improve the answer", "Friday."),
        );
        let exec = workflow(llm).execute(request("When is the deploy?")).await.unwrap();

        assert_eq!(
            exec.path_names(),
            vec!["entry", "answer", "verify", "refine", "verify", "translate", "finish"]
        );
        assert_eq!(exec.state.answer.as_deref(), Some("Friday."));
        assert_eq!(exec.state.refine_count, 1);
    }

    #[tokio::test]
    async fn test_refine_is_capped() {
        let llm = Arc::new(
            MockLlm::new()
                .on("Answer the question", "Thursday.")
                .on("grounded in the chat history", "false")
                .on("Improve the answer", "Maybe Thursday."),
        );
        let exec = workflow(llm.clone())
            .execute(request("When is the deploy?"))
            .await
            .unwrap();

        assert_eq!(llm.prompts_containing("Improve the answer").len(), 3);
        assert_eq!(exec.state.refine_count, 4);
        assert!(exec.state.unrelated);
        assert_eq!(exec.state.answer.as_deref(), Some(CHAT_UNRELATED_APOLOGY));
        assert!(exec.state.error.is_none());
    }

    #[tokio::test]
    async fn test_answer_is_translated() {
        let llm = Arc::new(
            MockLlm::new()
                .on("Answer the question", "Friday.")
                .on("grounded in the chat history", "true")
                .on("Translate the text", "금요일입니다."),
        );
        let mut req = request("When is the deploy?");
        req.lang = Language::Korean;
        let out = workflow(llm).run(req).await.unwrap();
        assert_eq!(out.content(), Some("금요일입니다."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_history_fails() {
        let llm = Arc::new(MockLlm::new());
        let mut req = request("anything");
        req.messages.clear();
        let exec = workflow(llm.clone()).execute(req).await.unwrap();

        assert_eq!(exec.path_names(), vec!["entry", "finish"]);
        assert!(exec
            .state
            .error
            .as_deref()
            .unwrap()
            .starts_with("entry failed after 3 tries"));
        assert_eq!(llm.execute_calls(), 0);
    }
}

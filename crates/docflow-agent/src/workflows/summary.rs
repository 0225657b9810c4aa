//! Document Q&A and whole-document summary workflow.
//!
//! ```text
//! entry ─┬─> translate                      (summary requested, cached)
//!        ├─> route_query                    (already embedded)
//!        └─> load ─> embed ─> route_query
//! route_query ─┬─> summarize ─> save ─> translate
//!              ├─> retrieve_web ──┐
//!              └─> retrieve_vector┴─> grade ─┬─> generate ─> verify
//!                                            └─> translate  (nothing relevant)
//! verify ─┬─> refine ─┬─> route_query       (query rewritten)
//!         │           └─> translate         (unrelated, or out of refines)
//!         ├─> save                          (summary mode)
//!         └─> translate
//! translate ─> finish
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::info;

use docflow_core::config::EngineConfig;
use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::{CacheStore, DocumentLoader, LlmExecutor, VectorStore, WebSearch};
use docflow_core::types::{
    is_summary_query, Language, Outcome, RunLogRecord, TextChunk, WorkflowOutput,
    NO_ANSWER_APOLOGY,
};

use super::prompts;
use super::rag::{grade_chunks, persist_run_log, translate_text, verdict};
use crate::graph::{Execution, NodeId, RetryPolicy, RunState, Step, Transition, WorkflowGraph};

const WEB_RESULTS: usize = 5;
const WEB_VECTOR_RESULTS: usize = 3;
const VECTOR_RESULTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryNode {
    Entry,
    Load,
    Embed,
    RouteQuery,
    Summarize,
    RetrieveWeb,
    RetrieveVector,
    Grade,
    Generate,
    Verify,
    Refine,
    Save,
    Translate,
    Finish,
}

impl NodeId for SummaryNode {
    const ALL: &'static [Self] = &[
        SummaryNode::Entry,
        SummaryNode::Load,
        SummaryNode::Embed,
        SummaryNode::RouteQuery,
        SummaryNode::Summarize,
        SummaryNode::RetrieveWeb,
        SummaryNode::RetrieveVector,
        SummaryNode::Grade,
        SummaryNode::Generate,
        SummaryNode::Verify,
        SummaryNode::Refine,
        SummaryNode::Save,
        SummaryNode::Translate,
        SummaryNode::Finish,
    ];

    fn name(self) -> &'static str {
        match self {
            SummaryNode::Entry => "entry",
            SummaryNode::Load => "load",
            SummaryNode::Embed => "embed",
            SummaryNode::RouteQuery => "route_query",
            SummaryNode::Summarize => "summarize",
            SummaryNode::RetrieveWeb => "retrieve_web",
            SummaryNode::RetrieveVector => "retrieve_vector",
            SummaryNode::Grade => "grade",
            SummaryNode::Generate => "generate",
            SummaryNode::Verify => "verify",
            SummaryNode::Refine => "refine",
            SummaryNode::Save => "save",
            SummaryNode::Translate => "translate",
            SummaryNode::Finish => "finish",
        }
    }
}

/// Inbound request for one document question or summary.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub file_id: String,
    pub url: String,
    /// A question, or `SUMMARY_ALL` for a whole-document summary.
    pub query: String,
    pub lang: Language,
}

/// Run state of the document workflow.
#[derive(Debug, Clone)]
pub struct SummaryState {
    pub file_id: String,
    pub url: String,
    pub query: String,
    pub lang: Language,

    /// Query used for retrieval; replaced by each refine.
    pub active_query: String,
    pub is_summary: bool,
    pub cached: bool,
    pub embedded: bool,
    pub needs_web: bool,
    pub is_good: bool,
    /// Set when the answer is the fixed apology and the run should skip to
    /// translation.
    pub no_answer: bool,

    pub chunks: Option<Vec<TextChunk>>,
    pub retrieved: Vec<TextChunk>,
    pub summary: Option<String>,
    pub answer: Option<String>,

    pub refine_count: u32,
    pub log: Vec<String>,
    pub error: Option<String>,
}

impl SummaryState {
    pub fn new(request: SummaryRequest) -> Self {
        Self {
            active_query: request.query.clone(),
            file_id: request.file_id,
            url: request.url,
            query: request.query,
            lang: request.lang,
            is_summary: false,
            cached: false,
            embedded: false,
            needs_web: false,
            is_good: false,
            no_answer: false,
            chunks: None,
            retrieved: vec![],
            summary: None,
            answer: None,
            refine_count: 0,
            log: vec![],
            error: None,
        }
    }

    fn run_log(&self, message: impl Into<String>) -> RunLogRecord {
        RunLogRecord {
            file_id: self.file_id.clone(),
            url: self.url.clone(),
            query: self.query.clone(),
            lang: self.lang.code().to_string(),
            message: message.into(),
        }
    }

    fn give_up(&mut self) {
        self.answer = Some(NO_ANSWER_APOLOGY.to_string());
        self.no_answer = true;
    }

    /// Project the final state into the caller-facing record.
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
            file_id: Some(self.file_id),
            cached: self.cached,
            log: self.log,
            outcome,
        }
    }
}

impl RunState for SummaryState {
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

/// Collaborators of the document workflow.
#[derive(Clone)]
pub struct SummaryDeps {
    pub loader: Arc<dyn DocumentLoader>,
    pub store: Arc<dyn VectorStore>,
    /// `None` disables web retrieval.
    pub web: Option<Arc<dyn WebSearch>>,
    pub llm: Arc<dyn LlmExecutor>,
    pub cache: Arc<dyn CacheStore>,
    /// Refine cycles before the apology answer.
    pub max_refines: u32,
}

// ── nodes ──────────────────────────────────────────────────────

fn entry<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        st.is_summary = is_summary_query(&st.query);
        st.cached = deps.cache.exists_summary(&st.file_id).await?;
        if st.cached {
            st.summary = deps.cache.get_summary(&st.file_id).await?;
            // Expired between the two calls
            st.cached = st.summary.is_some();
        }
        st.embedded = deps.store.has_chunks(&st.file_id).await?;
        persist_run_log(deps.cache.as_ref(), st.run_log("entry")).await;
        Ok(())
    })
}

fn load<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let chunks = deps.loader.load(&st.url).await?;
        if chunks.is_empty() {
            return Err(DocflowError::ContentExtraction(format!(
                "no text extracted from {}",
                st.url
            )));
        }
        st.chunks = Some(chunks);
        Ok(())
    })
}

fn embed<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let chunks = st
            .chunks
            .as_deref()
            .ok_or_else(|| DocflowError::Validation("no chunks to embed".into()))?;
        if !st.embedded {
            deps.store.upsert(chunks, &st.file_id).await?;
            st.embedded = true;
        }
        Ok(())
    })
}

async fn summarize_document(deps: &SummaryDeps, st: &mut SummaryState) -> Result<String> {
    if st.chunks.is_none() {
        st.chunks = Some(deps.store.get_all(&st.file_id).await?);
    }
    let chunks = st.chunks.as_deref().unwrap_or_default();
    if chunks.is_empty() {
        return Err(DocflowError::Validation(format!(
            "document {} has no chunks to summarize",
            st.file_id
        )));
    }
    deps.llm.summarize(chunks).await
}

fn route_query<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if st.is_summary {
            return Ok(());
        }
        if st.summary.is_none() {
            st.summary = Some(summarize_document(deps, st).await?);
        }
        st.needs_web = match deps.web {
            Some(_) => {
                let prompt =
                    prompts::determine_web(&st.active_query, st.summary.as_deref().unwrap_or(""));
                verdict(&deps.llm.execute(&prompt).await?) == "true"
            }
            None => false,
        };
        Ok(())
    })
}

fn summarize<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        st.summary = Some(summarize_document(deps, st).await?);
        Ok(())
    })
}

fn retrieve_web<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let web = deps
            .web
            .as_ref()
            .ok_or_else(|| DocflowError::WebSearch("web search is not configured".into()))?;
        let (web_hits, vector_hits) = futures::try_join!(
            web.search(&st.active_query, WEB_RESULTS),
            deps.store
                .similarity_search(&st.file_id, &st.active_query, WEB_VECTOR_RESULTS),
        )?;
        st.retrieved = vector_hits.into_iter().chain(web_hits).collect();
        Ok(())
    })
}

fn retrieve_vector<'a>(
    deps: &'a SummaryDeps,
    st: &'a mut SummaryState,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        st.retrieved = deps
            .store
            .similarity_search(&st.file_id, &st.active_query, VECTOR_RESULTS)
            .await?;
        Ok(())
    })
}

fn grade<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let kept = grade_chunks(
            deps.llm.as_ref(),
            &st.active_query,
            st.summary.as_deref(),
            &st.retrieved,
        )
        .await?;
        if kept.is_empty() {
            st.give_up();
        }
        st.retrieved = kept;
        Ok(())
    })
}

fn generate<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let prompt = prompts::generate(&st.active_query, &st.retrieved);
        let answer = deps.llm.execute(&prompt).await?;
        st.answer = Some(answer.trim().to_string());
        Ok(())
    })
}

fn verify<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let prompt = prompts::verify(
            &st.active_query,
            st.summary.as_deref(),
            &st.retrieved,
            st.answer.as_deref().unwrap_or(""),
        );
        st.is_good = verdict(&deps.llm.execute(&prompt).await?) == "good";
        Ok(())
    })
}

fn refine<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        st.refine_count += 1;
        if st.refine_count > deps.max_refines {
            st.give_up();
            return Ok(());
        }

        let prompt = prompts::refine(
            st.summary.as_deref(),
            &st.active_query,
            &st.retrieved,
            st.answer.as_deref(),
        );
        let response = deps.llm.execute(&prompt).await?;
        let unrelated = verdict(&response) == prompts::UNRELATED_MARKER.to_lowercase()
            || response.contains(NO_ANSWER_APOLOGY);
        if unrelated {
            st.give_up();
        } else {
            st.active_query = response.trim().to_string();
            st.retrieved.clear();
            st.is_good = false;
        }
        Ok(())
    })
}

fn save<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if st.is_summary && !st.cached {
            if let Some(summary) = &st.summary {
                deps.cache.set_summary(&st.file_id, summary).await?;
            }
        }
        Ok(())
    })
}

fn translate<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let text = if st.is_summary { &st.summary } else { &st.answer };
        let text = text
            .as_deref()
            .ok_or_else(|| DocflowError::Validation("nothing to translate".into()))?;
        let translated = translate_text(deps.llm.as_ref(), &st.lang, text).await?;
        if st.is_summary {
            st.summary = Some(translated);
        } else {
            st.answer = Some(translated);
        }
        Ok(())
    })
}

fn finish<'a>(deps: &'a SummaryDeps, st: &'a mut SummaryState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let message = match &st.error {
            Some(e) => e.clone(),
            None => st.log.join(" | "),
        };
        persist_run_log(deps.cache.as_ref(), st.run_log(message)).await;
        Ok(())
    })
}

// ── routing ────────────────────────────────────────────────────

fn after_entry(st: &SummaryState) -> SummaryNode {
    if st.is_summary && st.cached {
        SummaryNode::Translate
    } else if st.embedded {
        SummaryNode::RouteQuery
    } else {
        SummaryNode::Load
    }
}

fn after_route(st: &SummaryState) -> SummaryNode {
    if st.is_summary {
        SummaryNode::Summarize
    } else if st.needs_web {
        SummaryNode::RetrieveWeb
    } else {
        SummaryNode::RetrieveVector
    }
}

fn after_grade(st: &SummaryState) -> SummaryNode {
    if st.no_answer {
        SummaryNode::Translate
    } else {
        SummaryNode::Generate
    }
}

fn after_verify(st: &SummaryState) -> SummaryNode {
    if !st.is_good {
        SummaryNode::Refine
    } else if st.is_summary {
        SummaryNode::Save
    } else {
        SummaryNode::Translate
    }
}

fn after_refine(st: &SummaryState) -> SummaryNode {
    if st.no_answer {
        SummaryNode::Translate
    } else {
        SummaryNode::RouteQuery
    }
}

fn build_graph(
    engine: &EngineConfig,
) -> Result<WorkflowGraph<SummaryNode, SummaryDeps, SummaryState>> {
    use SummaryNode::*;

    WorkflowGraph::<SummaryNode, SummaryDeps, SummaryState>::builder("summary", Entry, Finish)
        .node(
            Entry,
            Step::retried(entry),
            Transition::branch(&[Translate, RouteQuery, Load], after_entry),
        )
        .node(Load, Step::retried(load), Transition::to(Embed))
        .node(Embed, Step::retried(embed), Transition::to(RouteQuery))
        .node(
            RouteQuery,
            Step::retried(route_query),
            Transition::branch(&[Summarize, RetrieveWeb, RetrieveVector], after_route),
        )
        .node(Summarize, Step::retried(summarize), Transition::to(Save))
        .node(RetrieveWeb, Step::retried(retrieve_web), Transition::to(Grade))
        .node(RetrieveVector, Step::retried(retrieve_vector), Transition::to(Grade))
        .node(
            Grade,
            Step::retried(grade),
            Transition::branch(&[Translate, Generate], after_grade),
        )
        .node(Generate, Step::retried(generate), Transition::to(Verify))
        .node(
            Verify,
            Step::retried(verify),
            Transition::branch(&[Refine, Save, Translate], after_verify),
        )
        .node(
            Refine,
            Step::retried(refine),
            Transition::branch(&[Translate, RouteQuery], after_refine),
        )
        .node(Save, Step::retried(save), Transition::to(Translate))
        .node(Translate, Step::retried(translate), Transition::to(Finish))
        .node(Finish, Step::best_effort(finish), Transition::End)
        .step_limit(engine.summary_step_limit)
        .retry(RetryPolicy::from_config(engine))
        .build()
}

/// Compiled document workflow bound to its collaborators.
pub struct SummaryWorkflow {
    graph: WorkflowGraph<SummaryNode, SummaryDeps, SummaryState>,
    deps: SummaryDeps,
}

impl SummaryWorkflow {
    pub fn new(deps: SummaryDeps, engine: &EngineConfig) -> Result<Self> {
        Ok(Self {
            graph: build_graph(engine)?,
            deps,
        })
    }

    /// Run the graph and return the final state with the visited path.
    pub async fn execute(
        &self,
        request: SummaryRequest,
    ) -> Result<Execution<SummaryNode, SummaryState>> {
        info!(file_id = %request.file_id, query = %request.query, lang = %request.lang, "Starting document workflow");
        self.graph.run(&self.deps, SummaryState::new(request)).await
    }

    pub async fn run(&self, request: SummaryRequest) -> Result<WorkflowOutput> {
        Ok(self.execute(request).await?.state.into_output())
    }
}

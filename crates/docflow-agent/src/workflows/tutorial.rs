//! Illustrated tutorial generation.
//!
//! `load -> generate -> combine -> finish`. Any error jumps straight to
//! `finish`, which also swaps figure placeholders for image links.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use docflow_core::config::EngineConfig;
use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::{CacheStore, DocumentLoader, LlmExecutor, SemanticGrouper};
use docflow_core::types::{Language, Outcome, PageChunk, RunLogRecord, WorkflowOutput};

use super::document;
use super::prompts;
use super::rag::persist_run_log;
use crate::graph::{Execution, NodeId, RetryPolicy, RunState, Step, Transition, WorkflowGraph};

/// Translated text shorter than this share of the original triggers a warning.
const MIN_LENGTH_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TutorialNode {
    Load,
    Generate,
    Combine,
    Finish,
}

impl NodeId for TutorialNode {
    const ALL: &'static [Self] = &[
        TutorialNode::Load,
        TutorialNode::Generate,
        TutorialNode::Combine,
        TutorialNode::Finish,
    ];

    fn name(self) -> &'static str {
        match self {
            TutorialNode::Load => "load",
            TutorialNode::Generate => "generate",
            TutorialNode::Combine => "combine",
            TutorialNode::Finish => "finish",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TutorialRequest {
    pub file_id: String,
    pub url: String,
    pub lang: Language,
}

#[derive(Debug, Clone)]
pub struct TutorialState {
    pub file_id: String,
    pub url: String,
    pub lang: Language,

    pub chunks: Vec<PageChunk>,
    /// One drafted section per chunk cluster, in document order.
    pub sections: Vec<String>,
    pub tutorial: Option<String>,
    /// Placeholders left in the tutorial because no chunk carried them.
    pub unresolved_figures: Vec<String>,

    pub log: Vec<String>,
    pub error: Option<String>,
}

impl TutorialState {
    pub fn new(request: TutorialRequest) -> Self {
        Self {
            file_id: request.file_id,
            url: request.url,
            lang: request.lang,
            chunks: vec![],
            sections: vec![],
            tutorial: None,
            unresolved_figures: vec![],
            log: vec![],
            error: None,
        }
    }

    pub fn into_output(self) -> WorkflowOutput {
        let outcome = match (self.error, self.tutorial) {
            (Some(e), _) => Outcome::Error(e),
            (None, Some(t)) => Outcome::Tutorial(t),
            (None, None) => Outcome::Error("workflow finished without a tutorial".into()),
        };
        WorkflowOutput {
            file_id: Some(self.file_id),
            cached: false,
            log: self.log,
            outcome,
        }
    }
}

impl RunState for TutorialState {
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
pub struct TutorialDeps {
    pub loader: Arc<dyn DocumentLoader>,
    pub grouper: Arc<dyn SemanticGrouper>,
    pub llm: Arc<dyn LlmExecutor>,
    pub cache: Arc<dyn CacheStore>,
    /// Cluster text sent to the model is cut to this many characters.
    pub max_section_chars: usize,
}

fn load<'a>(deps: &'a TutorialDeps, st: &'a mut TutorialState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let chunks = deps.loader.load_pages(&st.url).await?;
        if chunks.is_empty() {
            return Err(DocflowError::ContentExtraction(format!(
                "no pages extracted from {}",
                st.url
            )));
        }
        st.chunks = chunks;
        Ok(())
    })
}

fn generate<'a>(deps: &'a TutorialDeps, st: &'a mut TutorialState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if st.chunks.is_empty() {
            return Err(DocflowError::Validation("no page chunks to group".into()));
        }
        let groups = deps.grouper.group_chunks(&st.chunks).await?;
        if groups.is_empty() {
            return Err(DocflowError::Validation("grouping produced no clusters".into()));
        }
        st.log.push(format!(
            "grouped {} chunks into {} sections",
            st.chunks.len(),
            groups.len()
        ));

        let mut sections = Vec::with_capacity(groups.len());
        for group in &groups {
            let text: String = group
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
                .chars()
                .take(deps.max_section_chars)
                .collect();
            let section = deps.llm.execute(&prompts::tutorial_section(&text)).await?;
            sections.push(section);
        }
        st.sections = sections;
        Ok(())
    })
}

fn combine<'a>(deps: &'a TutorialDeps, st: &'a mut TutorialState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if st.sections.is_empty() {
            return Err(DocflowError::Validation("no sections to combine".into()));
        }

        let mut original_chars = 0usize;
        let mut original_figures = 0usize;
        let mut translated = Vec::with_capacity(st.sections.len());
        for section in st.sections.iter().filter(|s| !s.trim().is_empty()) {
            original_chars += section.chars().count();
            original_figures += document::count_figure_refs(section);
            // Per section, so no single call carries the whole document
            let text = if st.lang.is_language_of(section) {
                section.clone()
            } else {
                deps.llm
                    .execute(&prompts::tutorial_translate(&st.lang, section))
                    .await?
            };
            translated.push(text);
        }

        let doc = document::assemble(&translated);
        let doc_chars = doc.chars().count();
        let doc_figures = document::count_figure_refs(&doc);

        let mut warnings = Vec::new();
        if (doc_chars as f64) < original_chars as f64 * MIN_LENGTH_RATIO {
            warnings.push(format!(
                "translation shrank content ({original_chars} -> {doc_chars} chars)"
            ));
        }
        if translated.len() < st.sections.len() {
            warnings.push(format!(
                "section count dropped ({} -> {})",
                st.sections.len(),
                translated.len()
            ));
        }
        if doc_figures < original_figures {
            warnings.push(format!(
                "figure references dropped ({original_figures} -> {doc_figures})"
            ));
        }
        for w in warnings {
            warn!(file_id = %st.file_id, "{}", w);
            st.log.push(format!("warning: {w}"));
        }

        st.tutorial = Some(doc);
        Ok(())
    })
}

fn finish<'a>(deps: &'a TutorialDeps, st: &'a mut TutorialState) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if let Some(e) = &st.error {
            st.log.push(format!("stopped on error: {e}"));
        } else if let Some(tutorial) = &st.tutorial {
            let figures = document::figure_map(&st.chunks);
            let resolved = document::resolve_figures(tutorial, &figures);
            st.log.push(format!("resolved {} figure references", resolved.resolved));
            if !resolved.unresolved.is_empty() {
                st.log.push(format!(
                    "unresolved figure references: {}",
                    resolved.unresolved.join(", ")
                ));
            }
            st.tutorial = Some(resolved.text);
            st.unresolved_figures = resolved.unresolved;
            st.log.push("tutorial complete".to_string());
        }

        let record = RunLogRecord {
            file_id: st.file_id.clone(),
            url: st.url.clone(),
            query: "TUTORIAL".to_string(),
            lang: st.lang.code().to_string(),
            message: st.error.clone().unwrap_or_else(|| st.log.join(" | ")),
        };
        persist_run_log(deps.cache.as_ref(), record).await;
        Ok(())
    })
}

fn build_graph(
    engine: &EngineConfig,
) -> Result<WorkflowGraph<TutorialNode, TutorialDeps, TutorialState>> {
    use TutorialNode::*;

    WorkflowGraph::<TutorialNode, TutorialDeps, TutorialState>::builder("tutorial", Load, Finish)
        .node(Load, Step::retried(load), Transition::to(Generate))
        .node(Generate, Step::retried(generate), Transition::to(Combine))
        .node(Combine, Step::retried(combine), Transition::to(Finish))
        .node(Finish, Step::best_effort(finish), Transition::End)
        .step_limit(engine.tutorial_step_limit)
        .retry(RetryPolicy::from_config(engine))
        .build()
}

pub struct TutorialWorkflow {
    graph: WorkflowGraph<TutorialNode, TutorialDeps, TutorialState>,
    deps: TutorialDeps,
}

impl TutorialWorkflow {
    pub fn new(deps: TutorialDeps, engine: &EngineConfig) -> Result<Self> {
        Ok(Self {
            graph: build_graph(engine)?,
            deps,
        })
    }

    pub async fn execute(
        &self,
        request: TutorialRequest,
    ) -> Result<Execution<TutorialNode, TutorialState>> {
        info!(file_id = %request.file_id, lang = %request.lang, "Starting tutorial workflow");
        self.graph.run(&self.deps, TutorialState::new(request)).await
    }

    pub async fn run(&self, request: TutorialRequest) -> Result<WorkflowOutput> {
        Ok(self.execute(request).await?.state.into_output())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::types::FigureRef;
    use docflow_test_utils::{MockCache, MockGrouper, MockLlm, MockLoader};

    fn pages() -> Vec<PageChunk> {
        vec![
            PageChunk::new(0, "Ownership basics [IMG_0_1] diagram")
                .with_figures(vec![FigureRef::new("IMG_0_1", "https://cdn/own.png")]),
            PageChunk::new(1, "Moves and copies"),
            PageChunk::new(2, "Borrowing rules"),
        ]
    }

    fn workflow(llm: Arc<MockLlm>, loader: MockLoader, cache: Arc<MockCache>) -> TutorialWorkflow {
        let deps = TutorialDeps {
            loader: Arc::new(loader),
            grouper: Arc::new(MockGrouper::by_size(2)),
            llm,
            cache,
            max_section_chars: 6_000,
        };
        TutorialWorkflow::new(deps, &EngineConfig::default()).unwrap()
    }

    fn drafting_llm() -> MockLlm {
        MockLlm::new().on_fn("expert tutor", |p| {
            if p.contains("Ownership basics") {
                "# Ownership\nSee [IMG_0_1] here.\n**Tutor's note:** a diagram.\n## Key takeaways\n- one owner".into()
            } else {
                "# Borrowing\nReferences borrow values.\n## Key takeaways\n- many readers".into()
            }
        })
    }

    #[tokio::test]
    async fn test_generates_illustrated_tutorial() {
        let llm = Arc::new(drafting_llm());
        let cache = Arc::new(MockCache::new());
        let wf = workflow(llm.clone(), MockLoader::with_pages(pages()), cache.clone());
        let exec = wf
            .execute(TutorialRequest {
                file_id: "doc-7".into(),
                url: "https://example.com/rust.pdf".into(),
                lang: Language::English,
            })
            .await
            .unwrap();

        assert_eq!(exec.path_names(), vec!["load", "generate", "combine", "finish"]);
        assert_eq!(exec.state.sections.len(), 2);
        let tutorial = exec.state.tutorial.as_deref().unwrap();
        assert!(tutorial.contains("1. [Ownership](#1-ownership)"));
        assert!(tutorial.contains("2. [Borrowing](#2-borrowing)"));
        assert!(tutorial.contains("![figure](https://cdn/own.png)"));
        assert!(!tutorial.contains("[IMG_0_1]"));
        assert!(exec.state.unresolved_figures.is_empty());
        // English drafts need no translation calls
        assert!(llm.prompts_containing("Translate this tutorial section").is_empty());
        assert_eq!(cache.run_logs().len(), 1);
        assert_eq!(cache.run_logs()[0].query, "TUTORIAL");
    }

    #[tokio::test]
    async fn test_translates_each_section_separately() {
        let llm = Arc::new(
            drafting_llm().on_fn("Translate this tutorial section", |p| {
                if p.contains("# Ownership") {
                    "# 소유권\n[IMG_0_1] 그림 설명 [IMG_5_5]\n## 핵심 요약\n- 소유자는 하나".into()
                } else {
                    "# 빌림\n참조는 값을 빌립니다.\n## 핵심 요약\n- 여러 독자".into()
                }
            }),
        );
        let wf = workflow(llm.clone(), MockLoader::with_pages(pages()), Arc::new(MockCache::new()));
        let exec = wf
            .execute(TutorialRequest {
                file_id: "doc-7".into(),
                url: "u".into(),
                lang: Language::Korean,
            })
            .await
            .unwrap();

        assert_eq!(llm.prompts_containing("Translate this tutorial section").len(), 2);
        let tutorial = exec.state.tutorial.as_deref().unwrap();
        assert!(tutorial.contains("## 1. 소유권"));
        assert!(tutorial.contains("![figure](https://cdn/own.png)"));
        assert_eq!(exec.state.unresolved_figures, vec!["IMG_5_5"]);
        assert!(exec
            .state
            .log
            .iter()
            .any(|l| l.starts_with("unresolved figure references: IMG_5_5")));
    }

    #[tokio::test]
    async fn test_warns_when_translation_shrinks() {
        let llm = Arc::new(
            drafting_llm().on("Translate this tutorial section", "# 짧음"),
        );
        let wf = workflow(llm, MockLoader::with_pages(pages()), Arc::new(MockCache::new()));
        let exec = wf
            .execute(TutorialRequest {
                file_id: "doc-7".into(),
                url: "u".into(),
                lang: Language::Korean,
            })
            .await
            .unwrap();

        assert!(exec.state.error.is_none());
        assert!(exec
            .state
            .log
            .iter()
            .any(|l| l.starts_with("warning: figure references dropped (1 -> 0)")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_skips_to_finish() {
        let llm = Arc::new(drafting_llm());
        let loader = MockLoader::with_pages(pages()).failing(3, "pdf unreadable");
        let wf = workflow(llm.clone(), loader, Arc::new(MockCache::new()));
        let out = wf
            .run(TutorialRequest {
                file_id: "doc-7".into(),
                url: "u".into(),
                lang: Language::English,
            })
            .await
            .unwrap();

        assert!(out.error().unwrap().starts_with("load failed after 3 tries"));
        assert!(out.content().is_none());
        assert_eq!(llm.execute_calls(), 0);
        assert!(out.log.last().unwrap().starts_with("stopped on error"));
    }

    #[tokio::test]
    async fn test_section_text_is_truncated() {
        let llm = Arc::new(drafting_llm());
        let long = "x".repeat(10_000);
        let deps = TutorialDeps {
            loader: Arc::new(MockLoader::with_pages(vec![PageChunk::new(0, long)])),
            grouper: Arc::new(MockGrouper::by_size(3)),
            llm: llm.clone(),
            cache: Arc::new(MockCache::new()),
            max_section_chars: 100,
        };
        let wf = TutorialWorkflow::new(deps, &EngineConfig::default()).unwrap();
        wf.run(TutorialRequest {
            file_id: "d".into(),
            url: "u".into(),
            lang: Language::English,
        })
        .await
        .unwrap();

        let prompt = &llm.prompts_containing("expert tutor")[0];
        assert!(prompt.contains(&"x".repeat(100)));
        assert!(!prompt.contains(&"x".repeat(101)));
    }
}

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use tracing::{debug, warn};

use docflow_core::config::LoaderConfig;
use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::DocumentLoader;
use docflow_core::types::{FigureRef, PageChunk, TextChunk};

use crate::splitter::RecursiveSplitter;

const PAGE_BREAK: char = '\u{000C}';

/// Fetches text documents over HTTP(S) or from disk and chunks them.
///
/// Pages are separated by form feeds. In page mode, Markdown images
/// `![caption](uri)` become `[IMG_<page>_<n>] caption` placeholders and the
/// URI is kept on the chunk as a [`FigureRef`].
pub struct HttpDocumentLoader {
    http: reqwest::Client,
    splitter: RecursiveSplitter,
}

impl HttpDocumentLoader {
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("docflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                DocflowError::ContentExtraction(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            http,
            splitter: RecursiveSplitter::from_config(config),
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            let path = url.strip_prefix("file://").unwrap_or(url);
            return read_local(Path::new(path)).await;
        }

        debug!(url, "Fetching document");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DocflowError::ContentExtraction(format!("Request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DocflowError::ContentExtraction(format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if content_type.contains("pdf") || content_type.starts_with("image/") {
            return Err(DocflowError::ContentExtraction(format!(
                "unsupported content type '{}'",
                content_type
            )));
        }

        let body = resp.text().await.map_err(|e| {
            DocflowError::ContentExtraction(format!("Failed to read response body: {}", e))
        })?;

        Ok(if content_type.contains("html") {
            strip_html_tags(&body)
        } else {
            body
        })
    }

    pub fn chunk_text(&self, text: &str) -> Vec<TextChunk> {
        let flat = text.replace(PAGE_BREAK, "\n\n");
        self.splitter.split_text(&flat)
    }

    pub fn chunk_pages(&self, text: &str) -> Vec<PageChunk> {
        let mut out = Vec::new();
        for (page, raw) in text.split(PAGE_BREAK).enumerate() {
            let page = page as u32;
            let (body, figures) = extract_figures(page, raw);
            for chunk in self.splitter.split_text(&body) {
                let on_chunk: Vec<FigureRef> = figures
                    .iter()
                    .filter(|f| chunk.contains(&f.placeholder()))
                    .cloned()
                    .collect();
                out.push(PageChunk::new(page, chunk).with_figures(on_chunk));
            }
        }
        out
    }
}

async fn read_local(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        DocflowError::ContentExtraction(format!("Failed to read {}: {}", path.display(), e))
    })?;
    String::from_utf8(bytes).map_err(|_| {
        DocflowError::ContentExtraction(format!("{} is not UTF-8 text", path.display()))
    })
}

fn image_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)(?:\s+[^)]*)?\)").expect("image pattern is valid")
    })
}

/// Swap Markdown images on one page for numbered placeholders.
pub fn extract_figures(page: u32, text: &str) -> (String, Vec<FigureRef>) {
    let mut figures = Vec::new();
    let body = image_pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let figure = FigureRef::new(format!("IMG_{}_{}", page, figures.len() + 1), &caps[2]);
            let caption = caps[1].trim();
            let placeholder = figure.placeholder();
            figures.push(figure);
            if caption.is_empty() {
                placeholder
            } else {
                format!("{placeholder} {caption}")
            }
        })
        .into_owned();
    (body, figures)
}

fn html_patterns() -> &'static [Regex; 4] {
    static RE: OnceLock<[Regex; 4]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("script pattern is valid"),
            Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style pattern is valid"),
            Regex::new(r"<[^>]+>").expect("tag pattern is valid"),
            Regex::new(r"\n{3,}").expect("blank line pattern is valid"),
        ]
    })
}

/// Basic HTML tag stripping using regex.
fn strip_html_tags(html: &str) -> String {
    let [script, style, tags, blank_lines] = html_patterns();
    let cleaned = script.replace_all(html, "");
    let cleaned = style.replace_all(&cleaned, "");
    let text = tags.replace_all(&cleaned, "");

    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    blank_lines.replace_all(&text, "\n\n").trim().to_string()
}

impl DocumentLoader for HttpDocumentLoader {
    fn load<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<TextChunk>>> {
        Box::pin(async move {
            let text = self.fetch(url).await?;
            let chunks = self.chunk_text(&text);
            if chunks.is_empty() {
                return Err(DocflowError::ContentExtraction(format!(
                    "no text extracted from {}",
                    url
                )));
            }
            debug!(url, chunks = chunks.len(), "Document chunked");
            Ok(chunks)
        })
    }

    fn load_pages<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<PageChunk>>> {
        Box::pin(async move {
            let text = self.fetch(url).await?;
            let chunks = self.chunk_pages(&text);
            if chunks.is_empty() {
                return Err(DocflowError::ContentExtraction(format!(
                    "no text extracted from {}",
                    url
                )));
            }
            let figures: usize = chunks.iter().map(|c| c.figures.len()).sum();
            if figures == 0 {
                warn!(url, "Document has no figures");
            }
            debug!(url, chunks = chunks.len(), figures, "Document chunked by page");
            Ok(chunks)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> HttpDocumentLoader {
        HttpDocumentLoader::new(&LoaderConfig::default()).unwrap()
    }

    #[test]
    fn test_extract_figures() {
        let (body, figures) = extract_figures(
            2,
            "Intro ![Borrow graph](https://cdn/b.png) and ![](img/c.png \"title\") end",
        );
        assert_eq!(body, "Intro [IMG_2_1] Borrow graph and [IMG_2_2] end");
        assert_eq!(
            figures,
            vec![
                FigureRef::new("IMG_2_1", "https://cdn/b.png"),
                FigureRef::new("IMG_2_2", "img/c.png"),
            ]
        );
    }

    #[test]
    fn test_chunk_pages_tags_pages_and_figures() {
        let text = "Page one ![fig](https://cdn/1.png)\u{000C}Page two text";
        let chunks = loader().chunk_pages(text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, 0);
        assert_eq!(chunks[0].text, "Page one [IMG_0_1] fig");
        assert_eq!(chunks[0].figures, vec![FigureRef::new("IMG_0_1", "https://cdn/1.png")]);
        assert_eq!(chunks[1].page, 1);
        assert!(chunks[1].figures.is_empty());
    }

    #[test]
    fn test_chunk_text_ignores_page_breaks() {
        let chunks = loader().chunk_text("alpha\u{000C}beta");
        assert_eq!(chunks, vec!["alpha\n\nbeta"]);
    }

    #[test]
    fn test_strip_html_tags() {
        let html = "<html><head><style>p{}</style><script>x()</script></head>\
                    <body><p>Tom &amp; Jerry</p>\n\n\n\n<p>end</p></body></html>";
        assert_eq!(strip_html_tags(html), "Tom & Jerry\n\nend");
    }

    #[tokio::test]
    async fn test_load_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "# Title\n\nBody text\u{000C}Second page").unwrap();

        let loader = loader();
        let url = path.to_string_lossy().to_string();
        let chunks = loader.load(&url).await.unwrap();
        assert_eq!(chunks, vec!["# Title\n\nBody text\n\nSecond page"]);

        let pages = loader.load_pages(&format!("file://{}", url)).await.unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_or_missing_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "   \n").unwrap();

        let loader = loader();
        let err = loader.load(&path.to_string_lossy()).await.unwrap_err();
        assert!(matches!(err, DocflowError::ContentExtraction(_)));

        let missing = dir.path().join("missing.txt");
        let err = loader.load_pages(&missing.to_string_lossy()).await.unwrap_err();
        assert!(matches!(err, DocflowError::ContentExtraction(_)));
    }
}

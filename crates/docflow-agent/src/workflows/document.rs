//! Tutorial document assembly: numbered sections, table of contents with
//! anchor links, and figure placeholder resolution.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use docflow_core::types::PageChunk;

const TITLE: &str = "# Tutorial Guide";
const TOC_HEADING: &str = "## Table of Contents";
const SEPARATOR: &str = "---";

fn figure_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(IMG_\d+_\d+)\]").expect("figure pattern is valid"))
}

fn anchor_strip_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("anchor pattern is valid"))
}

fn anchor_join_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-\s]+").expect("anchor pattern is valid"))
}

fn heading_text(line: &str) -> Option<&str> {
    let line = line.trim();
    (line.starts_with('#') && line.len() > 1).then(|| line.trim_start_matches('#').trim())
}

/// Text of the first Markdown heading in `section`.
pub fn section_title(section: &str) -> Option<&str> {
    section.lines().find_map(heading_text).filter(|t| !t.is_empty())
}

/// Titles of every `##`-or-deeper heading in `section`.
pub fn subsections(section: &str) -> Vec<&str> {
    section
        .lines()
        .filter(|l| {
            let l = l.trim();
            l.starts_with("##") && l.len() > 2
        })
        .filter_map(heading_text)
        .collect()
}

/// URL fragment for a heading: lowercase, punctuation dropped, runs of
/// whitespace and dashes collapsed to one dash.
pub fn anchor(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = anchor_strip_pattern().replace_all(&lower, "");
    anchor_join_pattern().replace_all(&stripped, "-").into_owned()
}

/// `section` without its first heading line.
pub fn strip_first_heading(section: &str) -> String {
    let mut removed = false;
    section
        .trim()
        .lines()
        .filter(|line| {
            if !removed && heading_text(line).is_some() {
                removed = true;
                return false;
            }
            true
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Join drafted sections into one Markdown document with a table of
/// contents. Each section is renumbered under its own first heading, and
/// the TOC links point at the numbered heading text.
pub fn assemble(sections: &[String]) -> String {
    if sections.is_empty() {
        return String::new();
    }

    let mut doc = format!("{TITLE}\n\n{TOC_HEADING}\n\n");
    for (i, section) in sections.iter().enumerate() {
        let n = i + 1;
        match section_title(section) {
            Some(title) => {
                let target = anchor(&format!("{n}. {title}"));
                doc.push_str(&format!("{n}. [{title}](#{target})\n"));
                let body = strip_first_heading(section);
                for (j, sub) in subsections(&body).iter().enumerate() {
                    doc.push_str(&format!("   {n}.{}. [{sub}](#{})\n", j + 1, anchor(sub)));
                }
            }
            None => doc.push_str(&format!("{n}. [Section {n}](#{n}-section)\n")),
        }
    }
    doc.push_str(&format!("\n{SEPARATOR}\n\n"));

    for (i, section) in sections.iter().enumerate() {
        let n = i + 1;
        match section_title(section) {
            Some(title) => {
                doc.push_str(&format!("## {n}. {title}\n\n"));
                doc.push_str(&strip_first_heading(section));
                doc.push_str("\n\n");
            }
            None => doc.push_str(&format!("## {n}. Section\n\n{}\n\n", section.trim())),
        }
        if n < sections.len() {
            doc.push_str(&format!("{SEPARATOR}\n\n"));
        }
    }
    doc
}

/// Number of figure placeholders in `text`.
pub fn count_figure_refs(text: &str) -> usize {
    text.matches("[IMG_").count()
}

/// Placeholder id to image location, over every chunk's figures.
pub fn figure_map(chunks: &[PageChunk]) -> HashMap<String, String> {
    chunks
        .iter()
        .flat_map(|c| c.figures.iter())
        .map(|f| (f.id.clone(), f.uri.clone()))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFigures {
    pub text: String,
    pub resolved: usize,
    /// Placeholder ids with no known location, left in the text as written.
    pub unresolved: Vec<String>,
}

/// Replace every `[IMG_<page>_<n>]` with a Markdown image link.
pub fn resolve_figures(text: &str, figures: &HashMap<String, String>) -> ResolvedFigures {
    let mut resolved = 0;
    let mut unresolved = Vec::new();
    let text = figure_pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let id = &caps[1];
            match figures.get(id) {
                Some(uri) => {
                    resolved += 1;
                    format!("![figure]({uri})")
                }
                None => {
                    unresolved.push(id.to_string());
                    caps[0].to_string()
                }
            }
        })
        .into_owned();
    ResolvedFigures {
        text,
        resolved,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::types::FigureRef;

    #[test]
    fn test_anchor() {
        assert_eq!(anchor("Getting Started!"), "getting-started");
        assert_eq!(anchor("Step 1 - Install  the   tools"), "step-1-install-the-tools");
        assert_eq!(anchor("소유권 이해하기"), "소유권-이해하기");
    }

    #[test]
    fn test_titles() {
        let section = "intro line\n# Ownership\n\ntext\n## Moves\n### Copies\n";
        assert_eq!(section_title(section), Some("Ownership"));
        assert_eq!(subsections(section), vec!["Moves", "Copies"]);
        assert_eq!(section_title("no heading"), None);
    }

    #[test]
    fn test_strip_first_heading() {
        let section = "# Ownership\nBody\n## Moves\nMore";
        assert_eq!(strip_first_heading(section), "Body\n## Moves\nMore");
    }

    #[test]
    fn test_assemble() {
        let sections = vec![
            "# Ownership\nValues have one owner.\n## Moves\nMoving transfers.".to_string(),
            "Plain text without heading".to_string(),
        ];
        let doc = assemble(&sections);

        assert!(doc.starts_with("# Tutorial Guide\n\n## Table of Contents\n\n"));
        assert!(doc.contains("1. [Ownership](#1-ownership)\n"));
        assert!(doc.contains("   1.1. [Moves](#moves)\n"));
        assert!(doc.contains("2. [Section 2](#2-section)\n"));
        assert!(doc.contains("## 1. Ownership\n\nValues have one owner."));
        assert!(doc.contains("## 2. Section\n\nPlain text without heading"));
        // One separator after the TOC and one between the two sections
        assert_eq!(doc.matches("---\n").count(), 2);
        assert!(assemble(&[]).is_empty());
    }

    #[test]
    fn test_toc_links_resolve_to_headings() {
        let sections = vec![
            "# Getting Started!\nInstall.\n## Step 1 - Install the tools\nRun it.".to_string(),
            "Untitled draft".to_string(),
            "## 소유권 이해하기\n본문".to_string(),
        ];
        let doc = assemble(&sections);
        let (toc, body) = doc.split_once(SEPARATOR).unwrap();

        let targets: Vec<&str> = toc
            .split("](#")
            .skip(1)
            .filter_map(|rest| rest.split(')').next())
            .collect();
        assert_eq!(targets.len(), 4);

        let heading_anchors: Vec<String> = body
            .lines()
            .filter_map(heading_text)
            .map(anchor)
            .collect();
        for target in targets {
            assert!(
                heading_anchors.iter().any(|a| a == target),
                "TOC link #{target} has no heading in {heading_anchors:?}"
            );
        }
        assert!(toc.contains("3. [소유권 이해하기](#3-소유권-이해하기)"));
    }

    #[test]
    fn test_resolve_figures() {
        let chunk = PageChunk::new(0, "text").with_figures(vec![FigureRef::new(
            "IMG_0_1",
            "https://cdn.example.com/a.png",
        )]);
        let map = figure_map(&[chunk]);
        let out = resolve_figures("See [IMG_0_1] and [IMG_3_9].", &map);

        assert_eq!(
            out.text,
            "See ![figure](https://cdn.example.com/a.png) and [IMG_3_9]."
        );
        assert_eq!(out.resolved, 1);
        assert_eq!(out.unresolved, vec!["IMG_3_9"]);
        assert_eq!(count_figure_refs("[IMG_1_1] [IMG_1_2] IMG_"), 2);
    }
}

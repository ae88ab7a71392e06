//! Markdown-aware chunking under a token budget.

use crate::core::{Context, Metadata};
use regex::Regex;
use std::fmt::Debug;
use std::sync::LazyLock;

static HEADING: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})[ \t]+(.+?)[ \t#]*$"));

/// Label for text that comes before any heading.
const ROOT_SECTION: &str = "root";

/// Splits a loaded document into contexts.
pub trait Chunker: Send + Sync + Debug {
    /// Splits `text` from `source` into contexts tagged with
    /// `section`, `source`, `type` and `chunk_index` metadata.
    fn chunk(&self, text: &str, source: &str, source_type: &str) -> Vec<Context>;
}

/// Splits on markdown headings, then windows each section by whitespace tokens.
///
/// Heading-only fragments are merged into the fragment that follows them,
/// and fragments shorter than `min_chunk_tokens` are merged into the one
/// before. Each section is cut into windows of at most `max_tokens` tokens,
/// consecutive windows sharing `overlap` tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownChunker {
    max_tokens: usize,
    overlap: usize,
    min_chunk_tokens: usize,
}

#[derive(Debug, Clone)]
struct Fragment {
    path: Vec<String>,
    text: String,
    body_tokens: usize,
}

impl Fragment {
    fn tokens(&self) -> usize {
        self.text.split_whitespace().count()
    }

    fn section(&self) -> String {
        if self.path.is_empty() {
            ROOT_SECTION.to_string()
        } else {
            self.path.join(" > ")
        }
    }
}

impl Default for MarkdownChunker {
    fn default() -> Self {
        Self::new(500, 150)
    }
}

impl MarkdownChunker {
    /// Creates a chunker with the given token budget and overlap.
    ///
    /// An overlap that does not leave room for progress is clamped to
    /// `max_tokens - 1`.
    #[must_use]
    pub fn new(max_tokens: usize, overlap: usize) -> Self {
        let max_tokens = max_tokens.max(1);
        Self {
            max_tokens,
            overlap: overlap.min(max_tokens - 1),
            min_chunk_tokens: 0,
        }
    }

    /// Sets the size below which a fragment is merged into its predecessor.
    #[must_use]
    pub fn with_min_chunk_tokens(mut self, tokens: usize) -> Self {
        self.min_chunk_tokens = tokens;
        self
    }

    fn split(text: &str) -> Vec<Fragment> {
        let heading = HEADING.as_ref().ok();
        let mut fragments: Vec<Fragment> = Vec::new();
        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut current = Fragment {
            path: Vec::new(),
            text: String::new(),
            body_tokens: 0,
        };
        let mut fence: Option<&str> = None;

        for line in text.lines() {
            let trimmed = line.trim_start();
            let marker = ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(m));

            let captures = if fence.is_none() && marker.is_none() {
                heading.and_then(|re| re.captures(line))
            } else {
                None
            };

            if let Some(caps) = captures {
                let level = caps.get(1).map_or(1, |m| m.as_str().len());
                let title = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();

                if !current.text.trim().is_empty() {
                    fragments.push(current);
                }
                while stack.last().is_some_and(|(l, _)| *l >= level) {
                    stack.pop();
                }
                stack.push((level, title));
                current = Fragment {
                    path: stack.iter().map(|(_, t)| t.clone()).collect(),
                    text: String::new(),
                    body_tokens: 0,
                };
            } else {
                match (fence, marker) {
                    (None, Some(m)) => fence = Some(m),
                    (Some(open), Some(m)) if open == m => fence = None,
                    _ => {}
                }
                current.body_tokens += line.split_whitespace().count();
            }

            current.text.push_str(line);
            current.text.push('\n');
        }

        if !current.text.trim().is_empty() {
            fragments.push(current);
        }
        fragments
    }

    fn consolidate(&self, fragments: Vec<Fragment>) -> Vec<Fragment> {
        let mut forward: Vec<Fragment> = Vec::with_capacity(fragments.len());
        let mut pending: Option<Fragment> = None;

        for mut fragment in fragments {
            if let Some(heading_only) = pending.take() {
                fragment.text = format!("{}{}", heading_only.text, fragment.text);
            }
            if fragment.body_tokens == 0 {
                pending = Some(fragment);
            } else {
                forward.push(fragment);
            }
        }
        if let Some(heading_only) = pending {
            forward.push(heading_only);
        }

        let mut merged: Vec<Fragment> = Vec::with_capacity(forward.len());
        for fragment in forward {
            match merged.last_mut() {
                Some(previous) if fragment.tokens() < self.min_chunk_tokens => {
                    previous.text.push('\n');
                    previous.text.push_str(&fragment.text);
                    previous.body_tokens += fragment.body_tokens;
                }
                _ => merged.push(fragment),
            }
        }
        merged
    }

    fn windows(&self, text: &str) -> Vec<String> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() <= self.max_tokens {
            return vec![text.trim().to_string()];
        }

        let step = self.max_tokens - self.overlap;
        let mut windows = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + self.max_tokens).min(tokens.len());
            windows.push(tokens[start..end].join(" "));
            if end == tokens.len() {
                break;
            }
            start += step;
        }
        windows
    }
}

impl Chunker for MarkdownChunker {
    fn chunk(&self, text: &str, source: &str, source_type: &str) -> Vec<Context> {
        let fragments = self.consolidate(Self::split(text));
        let mut contexts = Vec::new();

        for fragment in fragments {
            let section = fragment.section();
            for window in self.windows(&fragment.text) {
                let index = contexts.len();
                let mut metadata = Metadata::new();
                metadata.insert("section".into(), serde_json::json!(section));
                metadata.insert("source".into(), serde_json::json!(source));
                metadata.insert("type".into(), serde_json::json!(source_type));
                metadata.insert("chunk_index".into(), serde_json::json!(index));
                contexts.push(Context::derived(source, index, window, metadata));
            }
        }
        contexts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sections(contexts: &[Context]) -> Vec<&str> {
        contexts
            .iter()
            .filter_map(|c| c.metadata_str("section"))
            .collect()
    }

    #[test]
    fn test_splits_on_headings_with_paths() {
        let text = "Intro line.\n\n# Guide\nGuide body.\n## Setup\nSetup body.\n# FAQ\nFAQ body.\n";
        let contexts = MarkdownChunker::default().chunk(text, "guide.md", "markdown");

        assert_eq!(sections(&contexts), vec!["root", "Guide", "Guide > Setup", "FAQ"]);
        assert!(contexts[2].text.contains("## Setup"));
        assert!(contexts[2].text.contains("Setup body."));
    }

    #[test]
    fn test_metadata_and_ids() {
        let contexts = MarkdownChunker::default().chunk("# A\nbody", "a.md", "markdown");
        let c = &contexts[0];

        assert_eq!(c.metadata_str("source"), Some("a.md"));
        assert_eq!(c.metadata_str("type"), Some("markdown"));
        assert_eq!(c.metadata.get("chunk_index"), Some(&serde_json::json!(0)));
        assert_eq!(c.id, Context::derive_id("a.md", 0, &c.text));
    }

    #[test]
    fn test_headings_inside_code_fences_are_ignored() {
        let text = "# Script\n```bash\n# not a heading\necho hi\n```\n";
        let contexts = MarkdownChunker::default().chunk(text, "s.md", "markdown");

        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].text.contains("# not a heading"));
    }

    #[test]
    fn test_heading_only_fragment_merges_forward() {
        let text = "# Manual\n## Battery\nLasts 60 minutes.\n";
        let contexts = MarkdownChunker::default().chunk(text, "m.md", "markdown");

        assert_eq!(contexts.len(), 1);
        assert_eq!(sections(&contexts), vec!["Manual > Battery"]);
        assert!(contexts[0].text.starts_with("# Manual"));
    }

    #[test]
    fn test_small_fragments_merge_into_predecessor() {
        let text = "# Long\none two three four five six\n# Short\nseven\n";
        let chunker = MarkdownChunker::default().with_min_chunk_tokens(4);
        let contexts = chunker.chunk(text, "m.md", "markdown");

        assert_eq!(contexts.len(), 1);
        assert_eq!(sections(&contexts), vec!["Long"]);
        assert!(contexts[0].text.contains("seven"));
    }

    #[test]
    fn test_windows_overlap() {
        let text = (1..=10).map(|n| n.to_string()).collect::<Vec<_>>().join(" ");
        let contexts = MarkdownChunker::new(4, 2).chunk(&text, "n.txt", "text");
        let texts: Vec<&str> = contexts.iter().map(|c| c.text.as_str()).collect();

        assert_eq!(texts, vec!["1 2 3 4", "3 4 5 6", "5 6 7 8", "7 8 9 10"]);
        assert!(contexts.iter().all(|c| c.metadata_str("section") == Some("root")));
    }

    #[test]
    fn test_overlap_is_clamped() {
        let chunker = MarkdownChunker::new(3, 10);
        let contexts = chunker.chunk("a b c d e", "x", "text");
        assert_eq!(contexts.last().map(|c| c.text.as_str()), Some("c d e"));
    }

    #[test]
    fn test_ids_are_unique_within_document() {
        let text = "# A\nsame\n# B\nsame\n";
        let contexts = MarkdownChunker::default().chunk(text, "d.md", "markdown");
        assert_eq!(contexts.len(), 2);
        assert_ne!(contexts[0].id, contexts[1].id);
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert!(MarkdownChunker::default().chunk("  \n", "e.md", "markdown").is_empty());
    }
}

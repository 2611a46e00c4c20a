use regex::{Regex, RegexBuilder};
use tracing::warn;
use crate::types::{Highlight, Segment};

/// Case-insensitive literal matcher for one search term, built once per filter pass.
#[derive(Clone, Debug)]
pub struct Highlighter {
    regex: Option<Regex>,
}

impl Highlighter {
    pub fn new(term: &str) -> Self {
        if term.is_empty() {
            return Self { regex: None };
        }
        // Escaped so metacharacters in user input match literally
        let regex = match RegexBuilder::new(&regex::escape(term)).case_insensitive(true).build() {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(error = %e, "could not compile highlight pattern, highlighting disabled");
                None
            }
        };
        Self { regex }
    }

    /// Whether `text` contains the term anywhere. Always false for an empty term.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(text))
    }

    /// Splits `text` into plain and matched segments. `None` text yields an empty string.
    pub fn highlight(&self, text: Option<&str>) -> Highlight {
        let text = text.unwrap_or("");
        let Some(re) = &self.regex else {
            return Highlight::Unchanged(text.to_string());
        };

        let mut segments = Vec::new();
        let mut last = 0;
        let mut pos = 0;
        let mut matched = false;
        while pos <= text.len() {
            let Some(m) = re.find_at(text, pos) else { break };
            if m.start() > last {
                segments.push(Segment::Plain(text[last..m.start()].to_string()));
            }
            if m.is_empty() {
                // always step past a zero-length match
                pos = m.end() + text[m.end()..].chars().next().map_or(1, char::len_utf8);
                last = m.start();
                continue;
            }
            segments.push(Segment::Match(m.as_str().to_string()));
            matched = true;
            last = m.end();
            pos = m.end();
        }

        if !matched {
            return Highlight::Unchanged(text.to_string());
        }
        if last < text.len() {
            segments.push(Segment::Plain(text[last..].to_string()));
        }
        Highlight::Segments(segments)
    }
}

/// One-off highlight of `text` for `term`.
pub fn highlight(text: Option<&str>, term: &str) -> Highlight {
    Highlighter::new(term).highlight(text)
}

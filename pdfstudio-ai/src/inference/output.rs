// Cleanup and screening of raw engine output
// Everything here is pure string processing; engines and the orchestrator share it.

use once_cell::sync::Lazy;
use regex::Regex;

// Compile regexes once and reuse
static THINKING_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think(?:ing)?>.*?</think(?:ing)?>").unwrap());

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[A-Za-z][^\]\n]{0,59}\]").unwrap());

static LIST_PREFIX_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*•]+|\d+[.)])\s*").unwrap());

/// Marker some engines print once generation stops
const END_OF_TEXT_MARKER: &str = "[end of text]";

/// Alphanumeric share of non-whitespace characters below which text is rejected
const MIN_ALPHANUMERIC_RATIO: f64 = 0.3;

/// Longest tolerated run of one repeated non-whitespace character
const MAX_CHAR_REPEAT: usize = 10;

// ============================================================================
// Line capture for CLI engine output
// ============================================================================

/// Accumulates the generated part of a CLI engine's stdout.
///
/// Log lines are dropped wherever they appear. Before capture starts, blank
/// lines and `>` prompt markers are skipped; a line equal to the prompt turns
/// capture on without being kept, any other line turns it on and is kept.
pub struct OutputCollector<'a> {
    prompt: &'a str,
    markers: &'a [String],
    capturing: bool,
    lines: Vec<String>,
}

impl<'a> OutputCollector<'a> {
    pub fn new(prompt: &'a str, markers: &'a [String]) -> Self {
        Self {
            prompt: prompt.trim(),
            markers,
            capturing: false,
            lines: Vec::new(),
        }
    }

    pub fn is_log_line(&self, line: &str) -> bool {
        self.markers.iter().any(|m| !m.is_empty() && line.contains(m.as_str()))
    }

    pub fn push_line(&mut self, line: &str) {
        if self.is_log_line(line) {
            return;
        }

        if !self.capturing {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('>') {
                return;
            }
            self.capturing = true;
            if !self.prompt.is_empty() && trimmed == self.prompt {
                return;
            }
        }

        self.lines.push(line.to_string());
    }

    /// Captured text with any echoed prompt removed
    pub fn finish(self) -> String {
        let joined = self.lines.join("\n");
        strip_prompt_echo(&joined, self.prompt)
    }
}

/// Drops a leading verbatim copy of the prompt
pub fn strip_prompt_echo(text: &str, prompt: &str) -> String {
    let text = text.trim();
    let prompt = prompt.trim();
    if !prompt.is_empty() {
        if let Some(rest) = text.strip_prefix(prompt) {
            return rest.trim().to_string();
        }
    }
    text.to_string()
}

// ============================================================================
// Cleanup
// ============================================================================

/// Removes reasoning blocks, end-of-text markers and wrapping code fences
pub fn clean_model_output(raw: &str) -> String {
    let without_thinking = THINKING_TAG_REGEX.replace_all(raw, "");
    let mut trimmed = without_thinking.trim();

    while let Some(rest) = trimmed.strip_suffix(END_OF_TEXT_MARKER) {
        trimmed = rest.trim_end();
    }

    const PREFIXES: &[&str] = &["```markdown\n", "```text\n", "```\n"];
    const SUFFIX: &str = "```";

    for prefix in PREFIXES {
        if trimmed.len() >= prefix.len() + SUFFIX.len()
            && trimmed.starts_with(prefix)
            && trimmed.ends_with(SUFFIX)
        {
            let content = &trimmed[prefix.len()..trimmed.len() - SUFFIX.len()];
            return content.trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Splits list-shaped output into items, dropping bullets and numbering
pub fn split_list_output(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| LIST_PREFIX_REGEX.replace(line.trim(), "").trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

// ============================================================================
// Screening
// ============================================================================

/// Error-shaped bodies such as `[AI Service] ...` or `Error: ...`
pub fn is_placeholder(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with("Error:") || PLACEHOLDER_REGEX.is_match(trimmed)
}

/// Heuristic check for non-linguistic decoder output
pub fn is_gibberish(text: &str) -> bool {
    if text.trim().is_empty() {
        return true;
    }

    if text.contains("[TOKEN_") {
        log::debug!("Gibberish detected: raw token ids in output");
        return true;
    }

    let mut alphanumeric = 0usize;
    let mut non_whitespace = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        non_whitespace += 1;
        if c.is_alphanumeric() {
            alphanumeric += 1;
        }
    }

    if non_whitespace > 0 {
        let ratio = alphanumeric as f64 / non_whitespace as f64;
        if ratio < MIN_ALPHANUMERIC_RATIO {
            log::debug!("Gibberish detected: alphanumeric ratio = {:.2}", ratio);
            return true;
        }
    }

    let max_repeat = longest_char_run(text);
    if max_repeat > MAX_CHAR_REPEAT {
        log::debug!("Gibberish detected: max character repeat = {}", max_repeat);
        return true;
    }

    false
}

fn longest_char_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut last: Option<char> = None;

    for c in text.chars() {
        if c.is_whitespace() {
            current = 0;
            last = None;
            continue;
        }
        current = if last == Some(c) { current + 1 } else { 1 };
        longest = longest.max(current);
        last = Some(c);
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_LOG_MARKERS;

    fn markers() -> Vec<String> {
        DEFAULT_LOG_MARKERS.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_collector_skips_logs_and_prompt_line() {
        let markers = markers();
        let mut collector = OutputCollector::new("Summarize this", &markers);
        for line in [
            "llama_model_loader: loaded meta data",
            "",
            "> ",
            "Summarize this",
            "The document covers quarterly results.",
            "llama_perf_context_print: eval time = 12 ms",
            "Revenue grew.",
        ] {
            collector.push_line(line);
        }
        assert_eq!(
            collector.finish(),
            "The document covers quarterly results.\nRevenue grew."
        );
    }

    #[test]
    fn test_collector_strips_multiline_prompt_echo() {
        let markers = markers();
        let prompt = "Context: abc\n\nUser question: why?\n\nAnswer:";
        let mut collector = OutputCollector::new(prompt, &markers);
        for line in prompt.lines().chain(["Because it is."]) {
            collector.push_line(line);
        }
        assert_eq!(collector.finish(), "Because it is.");
    }

    #[test]
    fn test_collector_keeps_blank_lines_once_capturing() {
        let markers = markers();
        let mut collector = OutputCollector::new("p", &markers);
        for line in ["First paragraph.", "", "Second paragraph."] {
            collector.push_line(line);
        }
        assert_eq!(collector.finish(), "First paragraph.\n\nSecond paragraph.");
    }

    #[test]
    fn test_strip_prompt_echo_leaves_unrelated_text() {
        assert_eq!(strip_prompt_echo("  hello there ", "prompt"), "hello there");
        assert_eq!(strip_prompt_echo("prompt answer", "prompt"), "answer");
    }

    #[test]
    fn test_clean_removes_thinking_and_fences() {
        let raw = "<think>internal</think>\n```markdown\n# Title\nBody\n```";
        assert_eq!(clean_model_output(raw), "# Title\nBody");
    }

    #[test]
    fn test_clean_removes_end_of_text_marker() {
        assert_eq!(clean_model_output("An answer. [end of text]\n"), "An answer.");
    }

    #[test]
    fn test_gibberish_detection() {
        assert!(is_gibberish(&"x".repeat(50)));
        // 1 alphanumeric in 4 non-whitespace characters
        assert!(is_gibberish("a### b### c### d###"));
        assert!(is_gibberish("   "));
        assert!(is_gibberish("[TOKEN_1234] [TOKEN_99]"));
        assert!(!is_gibberish("The quick brown fox jumps over the lazy dog."));
        assert!(!is_gibberish("Loooooooong words are still readable"));
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder("[AI Service] This is a stub response for: hi"));
        assert!(is_placeholder("[Inference error: boom]"));
        assert!(is_placeholder("Error: connection refused"));
        assert!(!is_placeholder("The report says [1] sources agree."));
        assert!(!is_placeholder("[1] First item"));
    }

    #[test]
    fn test_split_list_output() {
        let items = split_list_output("1. Alice Smith\n- Acme Corp\n\n* Paris\n2) 2024-01-05");
        assert_eq!(items, vec!["Alice Smith", "Acme Corp", "Paris", "2024-01-05"]);
    }
}

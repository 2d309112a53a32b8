// Deterministic responses derived from the input text alone
// Used whenever no model tier produced usable output.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "can", "this", "that",
    "these", "those", "i", "you", "he", "she", "it", "we", "they",
];

const WORDS_PER_MINUTE: usize = 200;
const KEYWORD_COUNT: usize = 10;
const PREVIEW_SENTENCES: usize = 5;
const PREVIEW_MIN_CHARS: usize = 20;
const PREVIEW_MAX_CHARS: usize = 150;
const MAX_HEADINGS: usize = 20;
const MAX_HEADING_CHARS: usize = 100;
const MAX_ENTITIES: usize = 20;

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").unwrap());
static TITLE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z\s]+$").unwrap());
static NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s+.+$").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());
static SSN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());
static CARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:\d{4}[ -]?){3}\d{4}\b").unwrap());
static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)|\b\d{3})[\s.-]?\d{3}[\s.-]?\d{4}\b").unwrap()
});

static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\b\d{4}-\d{2}-\d{2}\b",
        r"|\b\d{1,2}/\d{1,2}/\d{2,4}\b",
        r"|\b(?:January|February|March|April|May|June|July|August|September|October|November|December)",
        r"\s+\d{1,2},?\s+\d{4}\b"
    ))
    .unwrap()
});
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").unwrap());
static PROPER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b").unwrap());

// ============================================================================
// Text statistics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStats {
    pub characters: usize,
    pub words: usize,
    pub sentences: usize,
    pub lines: usize,
    pub reading_minutes: usize,
}

impl TextStats {
    pub fn of(text: &str) -> Self {
        let words = text.split_whitespace().count();
        Self {
            characters: text.chars().count(),
            words,
            sentences: sentences(text).len(),
            lines: text.lines().count(),
            reading_minutes: words / WORDS_PER_MINUTE,
        }
    }
}

fn sentences(text: &str) -> Vec<&str> {
    SENTENCE_SPLIT
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// `12345` -> `12,345`
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Most frequent significant words as `(word, count)`, ties broken alphabetically
pub fn keywords(text: &str, top_n: usize) -> Vec<(String, usize)> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for raw in text.split_whitespace() {
        let word: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if word.len() >= 3 && !STOP_WORDS.contains(&word.as_str()) {
            *freq.entry(word).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_n);
    ranked
}

fn push_unique(items: &mut Vec<String>, item: String) {
    if !items.contains(&item) {
        items.push(item);
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Fallback responses that never need a model and never come back empty
pub struct StubResponseGenerator;

impl StubResponseGenerator {
    pub fn summary(text: &str) -> String {
        if text.trim().is_empty() {
            return "Summary: No text content found in the document.".to_string();
        }

        let stats = TextStats::of(text);
        let mut out = String::from("📄 DOCUMENT SUMMARY\n\n");

        out.push_str("📊 Statistics:\n");
        out.push_str(&format!("• {} characters\n", group_thousands(stats.characters)));
        out.push_str(&format!("• {} words\n", group_thousands(stats.words)));
        out.push_str(&format!("• {} sentences\n", group_thousands(stats.sentences)));
        out.push_str(&format!("• {} lines\n", group_thousands(stats.lines)));
        out.push_str(&format!(
            "• Estimated reading time: {} minutes\n\n",
            stats.reading_minutes
        ));

        out.push_str("🔑 Key Topics:\n");
        for (word, count) in keywords(text, KEYWORD_COUNT) {
            out.push_str(&format!("• {} ({})\n", word, count));
        }
        out.push('\n');

        out.push_str("📝 Content Preview:\n");
        for sentence in sentences(text).into_iter().take(PREVIEW_SENTENCES) {
            let length = sentence.chars().count();
            if length <= PREVIEW_MIN_CHARS {
                continue;
            }
            let preview: String = sentence.chars().take(PREVIEW_MAX_CHARS).collect();
            out.push_str("• ");
            out.push_str(&preview);
            if length > PREVIEW_MAX_CHARS {
                out.push_str("...");
            }
            out.push('\n');
        }

        out.push_str("\n💡 Note: This is an automated text analysis summary.\n");
        out.push_str("   A full AI-powered summary requires the AI service or a local model.");
        out
    }

    /// Canned reply chosen by keyword patterns, checked in order
    pub fn chat(message: &str) -> String {
        let lower = message.to_lowercase();

        if lower.contains("what") && lower.contains("about") {
            return "This document appears to be a text-based PDF. I can help you analyze it, \
                    extract text, or search for specific content. Try asking about specific topics or sections."
                .to_string();
        }

        if lower.contains("how many") && (lower.contains("page") || lower.contains("word")) {
            return "To get detailed statistics about the document, try the 'Generate Summary' feature \
                    which provides word count, page count, and reading time estimates."
                .to_string();
        }

        if lower.contains("summarize") || lower.contains("summary") {
            return "Click the 'Generate Summary' button in the AI Summary tab to get a detailed \
                    overview of the document including statistics and key topics."
                .to_string();
        }

        if lower.contains("search") || lower.contains("find") {
            return "To search within the document, use the Search feature in the left sidebar. \
                    You can also extract all text using the Tools menu."
                .to_string();
        }

        if lower.contains("translate") {
            return "Translation features are available in the AI Assistant tab. Select your target \
                    language and the text you want to translate."
                .to_string();
        }

        if lower.contains('?') {
            return "That question needs a language model to answer properly, and none is available \
                    right now. The 'Generate Summary' feature can still give you statistics and key \
                    topics, and Search can locate specific passages."
                .to_string();
        }

        format!(
            "🤖 AI Chat Assistant (Limited Mode)\n\n\
             I understand your message: \"{}\"\n\n\
             Currently running in limited mode. I can help with:\n\
             • Document statistics and summaries\n\
             • Text extraction and search\n\
             • Basic document analysis\n\n\
             💡 For full conversational AI, start the AI service or install a local model.",
            message
        )
    }

    /// Dates, years, e-mail addresses and capitalised multi-word names found in the text
    pub fn entities(text: &str) -> Vec<String> {
        let mut found = Vec::new();

        let dates: Vec<&str> = DATE.find_iter(text).map(|m| m.as_str()).collect();
        for date in &dates {
            push_unique(&mut found, format!("Date: {}", date));
        }
        for year in YEAR.find_iter(text).map(|m| m.as_str()) {
            if !dates.iter().any(|d| d.contains(year)) {
                push_unique(&mut found, format!("Year: {}", year));
            }
        }
        for email in EMAIL.find_iter(text) {
            push_unique(&mut found, format!("Email: {}", email.as_str()));
        }
        for name in PROPER_NAME.find_iter(text) {
            push_unique(&mut found, format!("Name: {}", name.as_str()));
        }

        found.truncate(MAX_ENTITIES);
        if found.is_empty() {
            found.push("No named entities detected".to_string());
        }
        found
    }

    pub fn translation(text: &str, target_language: &str) -> String {
        format!("[Translated to {}]: {}", target_language, text)
    }

    /// Counts of e-mail, phone, card-like and SSN-like patterns
    pub fn sensitive(text: &str) -> Vec<String> {
        let mut findings = Vec::new();

        let ssn_count = SSN.find_iter(text).count();
        let card_count = CARD.find_iter(text).count();
        let email_count = EMAIL.find_iter(text).count();

        // Card and SSN digits would otherwise also read as phone numbers
        let masked = SSN.replace_all(&CARD.replace_all(text, " "), " ").into_owned();
        let phone_count = PHONE.find_iter(&masked).count();

        for (count, label) in [
            (email_count, "email address"),
            (phone_count, "phone number"),
            (card_count, "payment card number"),
            (ssn_count, "social security number"),
        ] {
            if count > 0 {
                let plural = if count == 1 { "" } else { "s" };
                findings.push(format!("Potential {}{} detected ({})", label, plural, count));
            }
        }

        if findings.is_empty() {
            findings.push("No sensitive content detected".to_string());
        }
        findings
    }

    pub fn insights(text: &str) -> String {
        if text.trim().is_empty() {
            return "📊 DOCUMENT INSIGHTS\n\nThe document contains no extractable text.".to_string();
        }

        let stats = TextStats::of(text);
        let headings = Self::structure_headings(text).len();
        let words_per_sentence = stats.words / stats.sentences.max(1);
        let letters: usize = text
            .split_whitespace()
            .map(|w| w.chars().filter(|c| c.is_alphanumeric()).count())
            .sum();
        let avg_word_len = letters as f64 / stats.words.max(1) as f64;
        let complexity = if avg_word_len < 5.0 {
            "Low"
        } else if avg_word_len < 6.0 {
            "Moderate"
        } else {
            "High"
        };

        let mut out = String::from("📊 DOCUMENT INSIGHTS\n\n");
        out.push_str("🔍 Structure Analysis:\n");
        out.push_str(&format!(
            "• {} sentences across {} lines\n",
            group_thousands(stats.sentences),
            group_thousands(stats.lines)
        ));
        out.push_str(&format!("• {} heading-like lines detected\n", headings));
        out.push_str(&format!("• Average sentence length: {} words\n\n", words_per_sentence));

        out.push_str("📈 Content Analysis:\n");
        let topics: Vec<String> = keywords(text, 5).into_iter().map(|(w, _)| w).collect();
        if topics.is_empty() {
            out.push_str("• No dominant topics\n\n");
        } else {
            out.push_str(&format!("• Dominant topics: {}\n\n", topics.join(", ")));
        }

        out.push_str("⏱️ Reading Analysis:\n");
        out.push_str(&format!(
            "• Estimated reading time: {} minutes\n",
            stats.reading_minutes.max(1)
        ));
        out.push_str(&format!(
            "• Complexity level: {} (average word length {:.1})\n\n",
            complexity, avg_word_len
        ));

        out.push_str("⚠️ Note: Detailed AI-powered insights require the AI service or a local model.\n");
        out.push_str("   Current analysis is based on basic text processing.");
        out
    }

    /// Runs of two or more lines that split into the same number of columns
    pub fn tables(text: &str) -> Vec<String> {
        let mut tables = Vec::new();
        let mut run: Option<(usize, usize)> = None; // (columns, rows)

        for line in text.lines() {
            match (table_columns(line), run) {
                (Some(columns), Some((current, rows))) if columns == current => {
                    run = Some((current, rows + 1));
                }
                (Some(columns), _) => {
                    close_table_run(&mut run, &mut tables);
                    run = Some((columns, 1));
                }
                (None, _) => close_table_run(&mut run, &mut tables),
            }
        }
        close_table_run(&mut run, &mut tables);

        if tables.is_empty() {
            tables.push("No tables detected".to_string());
        }
        tables
    }

    /// Title-like or numbered short lines, at most 20
    pub fn structure(text: &str) -> Vec<String> {
        let headings = Self::structure_headings(text);
        if headings.is_empty() {
            return vec!["No headings detected".to_string()];
        }
        headings
    }

    fn structure_headings(text: &str) -> Vec<String> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && line.chars().count() < MAX_HEADING_CHARS)
            .filter(|line| TITLE_LINE.is_match(line) || NUMBERED_LINE.is_match(line))
            .take(MAX_HEADINGS)
            .map(|line| format!("Heading: {}", line))
            .collect()
    }
}

fn close_table_run(run: &mut Option<(usize, usize)>, tables: &mut Vec<String>) {
    if let Some((columns, rows)) = run.take() {
        if rows >= 2 {
            tables.push(format!(
                "Table {}: {} rows x {} columns",
                tables.len() + 1,
                rows,
                columns
            ));
        }
    }
}

/// Column count of a tab, pipe or wide-space separated row
fn table_columns(line: &str) -> Option<usize> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let cells: Vec<&str> = if line.contains('\t') {
        line.split('\t').collect()
    } else if line.contains('|') {
        line.split('|').collect()
    } else {
        MULTI_SPACE.split(line).collect()
    };

    let columns = cells.iter().filter(|c| !c.trim().is_empty()).count();
    (columns >= 2).then_some(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Hello world. This is a test document about finance and banking.";

    #[test]
    fn test_summary_reports_counts_and_keywords() {
        let summary = StubResponseGenerator::summary(SAMPLE);
        assert!(summary.contains("• 11 words"));
        assert!(summary.contains("• 2 sentences"));
        let lower = summary.to_lowercase();
        assert!(lower.contains("finance (1)"));
        assert!(lower.contains("banking (1)"));
        assert!(!lower.contains("• this ("));
    }

    #[test]
    fn test_summary_of_empty_text() {
        assert_eq!(
            StubResponseGenerator::summary("   \n"),
            "Summary: No text content found in the document."
        );
    }

    #[test]
    fn test_keywords_rank_by_frequency_then_name() {
        let ranked = keywords("Banking, banking! Finance. The bank and the BANK; zebra", 3);
        assert_eq!(
            ranked,
            vec![
                ("bank".to_string(), 2),
                ("banking".to_string(), 2),
                ("finance".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(7), "7");
        assert_eq!(group_thousands(1234), "1,234");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_chat_patterns() {
        assert!(StubResponseGenerator::chat("Can you summarize this?").contains("Generate Summary"));
        assert!(StubResponseGenerator::chat("How many pages are there").contains("statistics"));
        assert!(StubResponseGenerator::chat("find the budget").contains("Search feature"));
        assert!(StubResponseGenerator::chat("Who signed it?").contains("needs a language model"));

        let generic = StubResponseGenerator::chat("Tell me a joke");
        assert!(generic.contains("\"Tell me a joke\""));
        assert!(generic.contains("Limited Mode"));
    }

    #[test]
    fn test_entities_from_text() {
        let text = "Jane Doe met Acme Holdings on 2024-03-15 in New York. Contact: jane@acme.com. Founded 1999.";
        let entities = StubResponseGenerator::entities(text);
        assert!(entities.contains(&"Date: 2024-03-15".to_string()));
        assert!(entities.contains(&"Year: 1999".to_string()));
        assert!(!entities.contains(&"Year: 2024".to_string()));
        assert!(entities.contains(&"Email: jane@acme.com".to_string()));
        assert!(entities.contains(&"Name: Jane Doe".to_string()));
        assert!(entities.contains(&"Name: New York".to_string()));
    }

    #[test]
    fn test_entities_never_empty() {
        assert_eq!(
            StubResponseGenerator::entities("nothing here"),
            vec!["No named entities detected".to_string()]
        );
    }

    #[test]
    fn test_sensitive_scan() {
        let text = "Mail bob@example.org or call (555) 123-4567. Card 4111 1111 1111 1111, SSN 123-45-6789.";
        let findings = StubResponseGenerator::sensitive(text);
        assert_eq!(
            findings,
            vec![
                "Potential email address detected (1)".to_string(),
                "Potential phone number detected (1)".to_string(),
                "Potential payment card number detected (1)".to_string(),
                "Potential social security number detected (1)".to_string(),
            ]
        );
        assert_eq!(
            StubResponseGenerator::sensitive("plain prose"),
            vec!["No sensitive content detected".to_string()]
        );
    }

    #[test]
    fn test_translation_marker() {
        assert_eq!(
            StubResponseGenerator::translation("Hello", "French"),
            "[Translated to French]: Hello"
        );
    }

    #[test]
    fn test_tables_detected_from_aligned_rows() {
        let text = "Intro paragraph\n\nName\tQty\tPrice\nApple\t3\t1.20\nPear\t5\t0.90\n\nOutro\n| a | b |\n| c | d |";
        assert_eq!(
            StubResponseGenerator::tables(text),
            vec![
                "Table 1: 3 rows x 3 columns".to_string(),
                "Table 2: 2 rows x 2 columns".to_string(),
            ]
        );
        assert_eq!(
            StubResponseGenerator::tables("just prose"),
            vec!["No tables detected".to_string()]
        );
    }

    #[test]
    fn test_structure_headings() {
        let text = "Introduction\nsome body text that is lowercase.\n1. Scope of Work\nResults And Discussion\n";
        assert_eq!(
            StubResponseGenerator::structure(text),
            vec![
                "Heading: Introduction".to_string(),
                "Heading: 1. Scope of Work".to_string(),
                "Heading: Results And Discussion".to_string(),
            ]
        );
    }

    #[test]
    fn test_insights_use_real_statistics() {
        let insights = StubResponseGenerator::insights(SAMPLE);
        assert!(insights.contains("2 sentences across 1 lines"));
        assert!(insights.contains("Dominant topics: about, banking, document, finance, hello"));
    }
}

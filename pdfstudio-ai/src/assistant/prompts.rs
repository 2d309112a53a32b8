// Prompt templates for each assistant operation
// Document text is cut to a character budget before it is embedded.

/// Appended to excerpts that were cut
pub const ELLIPSIS: &str = "...";

/// Asked when a chat message is blank
pub const DEFAULT_CHAT_QUESTION: &str = "What is this document about?";

/// First `max_chars` characters, plus an ellipsis when anything was dropped
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

pub fn summarize_prompt(text: &str, budget: usize) -> String {
    format!(
        "Summarize the following document:\n\n{}",
        truncate_text(text, budget)
    )
}

pub fn chat_prompt(context: &str, message: &str, budget: usize) -> String {
    format!(
        "Context: {}\n\nUser question: {}\n\nAnswer:",
        truncate_text(context, budget),
        message
    )
}

pub fn entities_prompt(text: &str, budget: usize) -> String {
    format!(
        "Extract all named entities (people, organizations, locations, dates) from:\n\n{}",
        truncate_text(text, budget)
    )
}

pub fn translate_prompt(text: &str, target_language: &str, budget: usize) -> String {
    format!(
        "Translate the following text to {}:\n\n{}",
        target_language,
        truncate_text(text, budget)
    )
}

pub fn insights_prompt(text: &str, budget: usize) -> String {
    format!(
        "Analyze the following document and provide key insights:\n\n{}",
        truncate_text(text, budget)
    )
}

pub fn sensitive_prompt(text: &str, budget: usize) -> String {
    format!(
        "Identify any sensitive information (PII, financial data, confidential info) in:\n\n{}",
        truncate_text(text, budget)
    )
}

//! Prompt assembly for grounded answers.

use super::conversation::{Turn, recent_turns};

/// Answer returned when retrieval finds no passages.
pub const NO_RELEVANT_DOCUMENTS: &str = "No relevant documents found in the database.";

/// Separator placed between retrieved passages in the context block.
pub const CONTEXT_DELIMITER: &str = "\n\n";

/// Render the last `limit` turns as `User: ...` / `Assistant: ...` lines.
pub fn format_history(turns: &[Turn], limit: usize) -> String {
    recent_turns(turns, limit)
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the single instruction prompt sent to the generation service.
pub fn build_prompt<S: AsRef<str>>(
    passages: &[S],
    history: &[Turn],
    history_turns: usize,
    question: &str,
) -> String {
    let context = passages
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER);
    let history = format_history(history, history_turns);

    format!(
        "Answer the question based ONLY on the following context.\n\
         If the information is not in the context, say you don't have enough information to answer accurately.\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Previous conversation:\n\
         {history}\n\
         \n\
         Question: {question}"
    )
}

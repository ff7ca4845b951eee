//! Prompt assembly for grounded question answering.

use serde::{Deserialize, Serialize};

pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions based ONLY on the provided context.

Your role is to:
1. Carefully analyze the provided context documents
2. Answer the user's question using only information from the context
3. Always cite your sources using the format [Source: filename]
4. If the answer cannot be found in the context, say \"I don't have enough information to answer this question\"
5. Be concise but thorough in your responses
6. Do not make up information or hallucinate facts

IMPORTANT:
- Use ONLY the provided context for your answer
- If multiple sources are relevant, cite all of them
- Maintain accuracy over completeness
- Indicate when information is missing from the context";

const HISTORY_TURNS: usize = 5;
const NO_CONTEXT_DOCUMENTS: &str = "No relevant context documents were found.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self { Self { role: "user".into(), content: content.into() } }
    pub fn assistant(content: impl Into<String>) -> Self { Self { role: "assistant".into(), content: content.into() } }
}

/// System prompt, the last five history turns, the context and the question.
pub fn build_rag_prompt(question: &str, context: &str, history: &[ChatTurn]) -> String {
    let mut parts: Vec<String> = vec![SYSTEM_PROMPT.to_string()];

    if !history.is_empty() {
        parts.push("\n\nCONVERSATION HISTORY:".into());
        let recent = &history[history.len().saturating_sub(HISTORY_TURNS)..];
        parts.extend(recent.iter().map(|turn| format!("{}: {}", turn.role.to_uppercase(), turn.content)));
    }

    let context = if context.trim().is_empty() { NO_CONTEXT_DOCUMENTS } else { context };
    parts.push(format!("\n\nCONTEXT DOCUMENTS:\n{context}"));
    parts.push(format!("\n\nUSER QUESTION:\n{question}"));
    parts.push("\n\nPlease provide a comprehensive answer based on the context above.".into());
    parts.join("\n")
}

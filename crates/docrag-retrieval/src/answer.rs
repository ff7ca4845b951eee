use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use docrag_core::config::CompletionSettings;
use docrag_core::error::{Error, Result};
use docrag_core::traits::CompletionProvider;
use docrag_core::types::{RetrievalConfig, SourceCitation};

use crate::prompt::{build_rag_prompt, ChatTurn};
use crate::retriever::Retriever;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<SourceCitation>,
    pub has_context: bool,
}

/// Retrieval followed by one completion call.
pub struct Answerer {
    retriever: Arc<Retriever>,
    llm: Arc<dyn CompletionProvider>,
    settings: CompletionSettings,
}

impl Answerer {
    pub fn new(retriever: Arc<Retriever>, llm: Arc<dyn CompletionProvider>, settings: CompletionSettings) -> Self {
        Self { retriever, llm, settings }
    }

    pub async fn answer(&self, question: &str, scope_key: &str, config: &RetrievalConfig, history: &[ChatTurn]) -> Result<Answer> {
        let context = self.retriever.get_context(question, scope_key, config).await?;
        let prompt = build_rag_prompt(question, &context.formatted_context, history);
        let answer = self
            .llm
            .complete(&prompt, self.settings.max_tokens, self.settings.temperature)
            .await
            .map_err(|e| Error::external(self.llm.name(), format!("{e:#}")))?;
        info!(citations = context.citations.len(), answer_chars = answer.len(), "Answer generated");
        Ok(Answer { answer, citations: context.citations, has_context: context.has_context })
    }
}

//! Prompt templates
//!
//! Templates are data, not code paths: a system block per variant, a
//! shared instruction block, and a dedicated no-context variant that
//! tells the model to acknowledge the absence of retrieved material.

use crate::query::QueryType;
use serde::{Deserialize, Serialize};

/// Template variants selected by query type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateVariant {
    Default,
    Analytical,
    Conversational,
    NoContext,
}

impl TemplateVariant {
    /// Variant for a query type (context present)
    pub fn for_query_type(query_type: QueryType) -> Self {
        match query_type {
            QueryType::MemoryRecall | QueryType::General => TemplateVariant::Default,
            QueryType::Pattern => TemplateVariant::Analytical,
            QueryType::Recommendation => TemplateVariant::Conversational,
        }
    }
}

const SYSTEM_DEFAULT: &str = "You are a personal assistant with access to the user's \
connected data. Answer using the retrieved documents below.";

const SYSTEM_ANALYTICAL: &str = "You are a personal assistant analyzing patterns in the \
user's connected data. Look across the retrieved documents for recurring behavior, \
frequencies, and trends before answering.";

const SYSTEM_CONVERSATIONAL: &str = "You are a friendly personal assistant making \
suggestions grounded in the user's connected data. Keep the tone light and the advice \
concrete.";

const SYSTEM_NO_CONTEXT: &str = "You are a personal assistant with access to the user's \
connected data, but no relevant documents were retrieved for this question. Say so \
clearly, answer from general knowledge only if appropriate, and suggest how the user \
might rephrase or sync more data.";

const INSTRUCTIONS: &str = "Instructions:\n\
- Cite documents by number, e.g. [Document 2], for every claim drawn from them.\n\
- Prefer the retrieved context over general knowledge.\n\
- If the context is insufficient to answer, say so explicitly.";

/// Prompt builder over the template set
#[derive(Debug, Clone, Default)]
pub struct PromptTemplates;

impl PromptTemplates {
    /// Assemble the final prompt: system block, context block,
    /// instruction block, then the user question
    pub fn build(&self, query_type: QueryType, context: &str, has_context: bool, question: &str) -> String {
        let variant = if has_context {
            TemplateVariant::for_query_type(query_type)
        } else {
            TemplateVariant::NoContext
        };

        let system = match variant {
            TemplateVariant::Default => SYSTEM_DEFAULT,
            TemplateVariant::Analytical => SYSTEM_ANALYTICAL,
            TemplateVariant::Conversational => SYSTEM_CONVERSATIONAL,
            TemplateVariant::NoContext => SYSTEM_NO_CONTEXT,
        };

        if variant == TemplateVariant::NoContext {
            return format!("{}\n\nQuestion: {}", system, question);
        }

        format!(
            "{}\n\nRetrieved context:\n{}\n\n{}\n\nQuestion: {}",
            system, context, INSTRUCTIONS, question
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_selection() {
        assert_eq!(
            TemplateVariant::for_query_type(QueryType::MemoryRecall),
            TemplateVariant::Default
        );
        assert_eq!(
            TemplateVariant::for_query_type(QueryType::Pattern),
            TemplateVariant::Analytical
        );
        assert_eq!(
            TemplateVariant::for_query_type(QueryType::Recommendation),
            TemplateVariant::Conversational
        );
    }

    #[test]
    fn test_prompt_contains_all_blocks() {
        let templates = PromptTemplates;
        let prompt = templates.build(
            QueryType::MemoryRecall,
            "[Document 1]\nBody",
            true,
            "What did Ravi send?",
        );

        assert!(prompt.contains("[Document 1]"));
        assert!(prompt.contains("Cite documents by number"));
        assert!(prompt.ends_with("Question: What did Ravi send?"));
    }

    #[test]
    fn test_no_context_template() {
        let templates = PromptTemplates;
        let prompt = templates.build(QueryType::General, "", false, "anything?");

        assert!(prompt.contains("no relevant documents were retrieved"));
        assert!(!prompt.contains("Cite documents by number"));
    }
}

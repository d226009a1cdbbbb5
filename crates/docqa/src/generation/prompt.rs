//! Prompt templates for document-grounded answers

use crate::memory::Turn;
use crate::types::Chunk;

/// Separator between chunks in the context
const CHUNK_SEPARATOR: &str = "\n\n";

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Join chunk texts in order, stopping at the first chunk that would
    /// take the context past `budget` characters.
    ///
    /// Returns the context and how many chunks it holds.
    pub fn build_context(chunks: &[Chunk], budget: usize) -> (String, usize) {
        let mut context = String::new();
        let mut used_chars = 0usize;
        let mut included = 0usize;

        for chunk in chunks {
            let separator = if included == 0 { 0 } else { CHUNK_SEPARATOR.len() };
            let chunk_chars = chunk.text.chars().count();

            if used_chars + separator + chunk_chars > budget {
                break;
            }

            if included > 0 {
                context.push_str(CHUNK_SEPARATOR);
            }
            context.push_str(&chunk.text);
            used_chars += separator + chunk_chars;
            included += 1;
        }

        (context, included)
    }

    /// Format prior turns, oldest first
    fn format_history(history: &[Turn]) -> String {
        history
            .iter()
            .map(|turn| format!("User: {}\nAssistant: {}", turn.question, turn.answer))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Build the full RAG prompt
    pub fn build_rag_prompt(question: &str, context: &str, history: &[Turn]) -> String {
        let history_section = if history.is_empty() {
            String::new()
        } else {
            format!(
                "CONVERSATION SO FAR:\n{}\n\n",
                Self::format_history(history)
            )
        };

        format!(
            r#"You are an assistant that answers questions about a single uploaded document.

IMPORTANT INSTRUCTIONS:
1. Answer ONLY from the context below
2. If the answer is not in the context, say "I don't know based on this document"
3. Do not use outside knowledge and do not guess
4. Use the conversation so far only to understand follow-up questions

CONTEXT FROM DOCUMENT:
{context}

{history}QUESTION: {question}

Answer:"#,
            context = context,
            history = history_section,
            question = question
        )
    }
}

//! Prompt augmentation with retrieved knowledge.
//!
//! When the scorer accepts an entry, the outgoing message sequence becomes:
//!
//! 1. a system instruction steering the model toward the supplied knowledge;
//! 2. every earlier message, in order;
//! 3. the final user message, its original text first, followed by the
//!    matched question/answer pair.
//!
//! Without a match the sequence is forwarded untouched.

use crate::models::{ChatMessage, Role};
use crate::scorer::MatchResult;

/// System instruction prepended to augmented prompts.
pub const GROUNDING_INSTRUCTION: &str = "You are a helpful assistant. \
When knowledge-base context is supplied with the user's question, prefer it over your own \
knowledge. Answer concisely and in the same language as the user. If the supplied context \
does not fully answer the question, say so honestly instead of guessing.";

/// Rewrite `messages` to carry the matched knowledge, if any.
pub fn augment(messages: &[ChatMessage], matched: Option<&MatchResult<'_>>) -> Vec<ChatMessage> {
    let Some(matched) = matched else {
        return messages.to_vec();
    };
    let Some(last_user) = messages.iter().rposition(|m| m.role == Role::User) else {
        return messages.to_vec();
    };

    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(ChatMessage::system(GROUNDING_INSTRUCTION));
    out.extend(
        messages
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != last_user)
            .map(|(_, m)| m.clone()),
    );
    out.push(ChatMessage::user(ground_question(
        &messages[last_user].content,
        matched,
    )));
    out
}

/// The user's question verbatim, followed by the retrieved entry.
fn ground_question(question: &str, matched: &MatchResult<'_>) -> String {
    format!(
        "{}\n\n---\nRelevant knowledge-base entry:\nQuestion: {}\nAnswer: {}",
        question, matched.entry.question, matched.entry.answer
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{build_index, KnowledgeEntry, KnowledgeIndex};
    use crate::scorer::{find_best_match, MatchPolicy};

    fn index() -> KnowledgeIndex {
        build_index(vec![KnowledgeEntry {
            id: "unasat".to_string(),
            question: "What is UNASAT?".to_string(),
            answer: "An org.".to_string(),
            combined_text: None,
            metadata: None,
        }])
    }

    #[test]
    fn test_no_match_passthrough() {
        let msgs = vec![ChatMessage::user("hello there")];
        assert_eq!(augment(&msgs, None), msgs);
    }

    #[test]
    fn test_match_rewrites_final_user_message() {
        let idx = index();
        let m = find_best_match(&idx, "What is UNASAT?", &MatchPolicy::default()).unwrap();
        let msgs = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("Hello! How can I help?"),
            ChatMessage::user("What is UNASAT?"),
        ];

        let out = augment(&msgs, Some(&m));
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[0].content, GROUNDING_INSTRUCTION);
        assert_eq!(out[1], msgs[0]);
        assert_eq!(out[2], msgs[1]);
        assert_eq!(out[3].role, Role::User);
        assert!(out[3].content.starts_with("What is UNASAT?\n\n"));
        assert!(out[3].content.contains("Question: What is UNASAT?"));
        assert!(out[3].content.contains("Answer: An org."));
    }

    #[test]
    fn test_without_user_message_passthrough() {
        let idx = index();
        let m = find_best_match(&idx, "unasat", &MatchPolicy::default()).unwrap();
        let msgs = vec![ChatMessage::assistant("only me")];
        assert_eq!(augment(&msgs, Some(&m)), msgs);
    }
}

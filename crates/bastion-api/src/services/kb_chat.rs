//! Knowledge-base chat grounded in a client's sources.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use bastion_core::defaults::KB_HISTORY_LIMIT;
use bastion_core::{
    ChatTurn, Error, GenerationRequest, KbConversation, KbMessage, MessageRole, PromptKey, Result,
};
use bastion_inference::prompts::kb_chat_system;
use bastion_inference::{conversation_title, default_prompt};

use super::file_prep::{ignore_progress, prepare_sources};
use crate::AppState;

/// Both sides of one chat exchange.
#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub user_message: KbMessage,
    pub assistant_message: KbMessage,
    /// Set when this message gave the conversation its title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Turns sent to the model: prior history followed by the new message.
pub fn build_turns(history: &[KbMessage], content: &str) -> Vec<ChatTurn> {
    history
        .iter()
        .map(|m| match m.role {
            MessageRole::User => ChatTurn::user(m.content.clone()),
            MessageRole::Assistant => ChatTurn::assistant(m.content.clone()),
        })
        .chain(std::iter::once(ChatTurn::user(content)))
        .collect()
}

/// Record the user's message, answer it from the client's sources, and
/// record the answer.
///
/// The first message of a conversation still carrying the placeholder title
/// also names the conversation. If generation fails the user's message stays
/// stored and the error is returned.
pub async fn send_message(
    state: &AppState,
    conversation: &KbConversation,
    content: &str,
) -> Result<ChatReply> {
    let start = Instant::now();
    let org = conversation.organisation_id;
    let content = content.trim();

    let client = state
        .db
        .clients
        .get(org, conversation.client_id)
        .await?
        .ok_or_else(|| Error::NotFound("Client not found".to_string()))?;

    let history = state
        .db
        .kb
        .recent_messages(org, conversation.id, KB_HISTORY_LIMIT)
        .await?;
    let user_message = state
        .db
        .kb
        .insert_message(org, conversation.id, MessageRole::User, content)
        .await?;

    let title = if history.is_empty() {
        let title = conversation_title(content);
        state
            .db
            .kb
            .auto_title(conversation.id, &title)
            .await?
            .then_some(title)
    } else {
        None
    };

    let sources = state
        .db
        .sources
        .list_for_client(org, conversation.client_id)
        .await?;
    let files = prepare_sources(state, &sources, &ignore_progress).await;
    debug!(
        conversation_id = %conversation.id,
        history = history.len(),
        files = files.len(),
        sources = sources.len(),
        "Prepared chat context"
    );

    let base = state
        .db
        .prompts
        .effective(org, PromptKey::KbChat, default_prompt(PromptKey::KbChat))
        .await?
        .content;
    let request = GenerationRequest {
        system: Some(kb_chat_system(&base, &client)),
        turns: build_turns(&history, content),
        files,
        ..Default::default()
    };
    let answer = state.generator.generate(request).await?;

    let assistant_message = state
        .db
        .kb
        .insert_message(org, conversation.id, MessageRole::Assistant, answer.trim())
        .await?;

    info!(
        subsystem = "api",
        component = "kb_chat",
        op = "send_message",
        conversation_id = %conversation.id,
        client_id = %conversation.client_id,
        duration_ms = start.elapsed().as_millis() as u64,
        "Chat answered"
    );
    Ok(ChatReply {
        user_message,
        assistant_message,
        title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn message(role: MessageRole, content: &str) -> KbMessage {
        KbMessage {
            id: Uuid::new_v4(),
            organisation_id: Uuid::nil(),
            conversation_id: Uuid::nil(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_turns_appends_new_message() {
        let history = vec![
            message(MessageRole::User, "Who is the audience?"),
            message(MessageRole::Assistant, "Young commuters."),
        ];
        let turns = build_turns(&history, "And the tone?");
        assert_eq!(
            turns,
            vec![
                ChatTurn::user("Who is the audience?"),
                ChatTurn::assistant("Young commuters."),
                ChatTurn::user("And the tone?"),
            ]
        );
    }

    #[test]
    fn test_build_turns_without_history() {
        assert_eq!(build_turns(&[], "Hi"), vec![ChatTurn::user("Hi")]);
    }
}

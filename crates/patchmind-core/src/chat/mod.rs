use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

/// One message in the conversation. The id and role are fixed at creation;
/// content is mutable only through the operations on [`ChatHistory`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-mostly chat history. Supports streaming appends into the latest
/// AI message, user-message edits, and explicit truncation.
#[derive(Debug, Default)]
pub struct ChatHistory {
    messages: Vec<ChatMessage>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user message. Empty content is ignored.
    pub fn add_user_message(&mut self, content: impl Into<String>) -> Option<Uuid> {
        let content = content.into();
        if content.is_empty() {
            return None;
        }
        let msg = ChatMessage::new(Role::User, content);
        let id = msg.id;
        self.push(msg);
        debug!("chat: added user message {id}");
        Some(id)
    }

    /// Adds an empty placeholder for an incoming AI response.
    pub fn add_ai_placeholder(&mut self) -> Uuid {
        let msg = ChatMessage::new(Role::Ai, "");
        let id = msg.id;
        self.push(msg);
        debug!("chat: added AI placeholder {id}");
        id
    }

    /// Appends a streamed chunk to an AI message's content.
    pub fn append_ai_chunk(&mut self, id: Uuid, chunk: &str) {
        match self.find_mut(id) {
            Some(msg) if msg.role == Role::Ai => msg.content.push_str(chunk),
            _ => warn!("chat: no AI message {id} to stream into"),
        }
    }

    /// Replaces an AI message's content once streaming has ended.
    pub fn finalize_ai_message(&mut self, id: Uuid, final_content: impl Into<String>) {
        let final_content = final_content.into();
        match self.find_mut(id) {
            Some(msg) if msg.role == Role::Ai => {
                if msg.content != final_content {
                    msg.content = final_content;
                    debug!("chat: finalized AI message {id}");
                }
            }
            _ => warn!("chat: no AI message {id} to finalize"),
        }
    }

    /// Rewrites a user message's content (message edit before resubmission).
    pub fn update_user_message(&mut self, id: Uuid, new_content: impl Into<String>) -> bool {
        match self.find_mut(id) {
            Some(msg) if msg.role == Role::User => {
                msg.content = new_content.into();
                true
            }
            _ => {
                warn!("chat: no user message {id} to update");
                false
            }
        }
    }

    /// Removes the message and everything after it.
    pub fn delete_and_truncate(&mut self, id: Uuid) {
        if let Some(idx) = self.index_of(id) {
            let before = self.messages.len();
            self.messages.truncate(idx);
            info!(
                "chat: deleted {id}, history {before} -> {} messages",
                self.messages.len()
            );
        } else {
            warn!("chat: no message {id} to delete");
        }
    }

    /// Truncates history after the given message, keeping the message itself.
    pub fn truncate_after(&mut self, id: Uuid) {
        if let Some(idx) = self.index_of(id) {
            self.messages.truncate(idx + 1);
        } else {
            warn!("chat: no message {id} to truncate after");
        }
    }

    /// Cloned snapshot handed to a generation run.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    fn push(&mut self, mut msg: ChatMessage) {
        // Collisions are vanishingly rare with v4 ids but ids must stay
        // unique within the sequence, so regenerate rather than reject.
        while self.index_of(msg.id).is_some() {
            msg.id = Uuid::new_v4();
        }
        self.messages.push(msg);
    }

    fn index_of(&self, id: Uuid) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut ChatMessage> {
        // Updates usually touch recent messages, so search from the back.
        self.messages.iter_mut().rev().find(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_appends_to_ai_message_only() {
        let mut history = ChatHistory::new();
        let user_id = history.add_user_message("hi").unwrap();
        let ai_id = history.add_ai_placeholder();

        history.append_ai_chunk(ai_id, "Hel");
        history.append_ai_chunk(ai_id, "lo");
        history.append_ai_chunk(user_id, "nope");

        let snap = history.snapshot();
        assert_eq!(snap[0].content, "hi");
        assert_eq!(snap[1].content, "Hello");
    }

    #[test]
    fn messages_round_trip_through_json() {
        let msg = ChatMessage::new(Role::User, "persist me");
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, msg.id);
        assert_eq!(back.role, Role::User);
        assert_eq!(back.content, "persist me");
    }

    #[test]
    fn delete_truncates_tail() {
        let mut history = ChatHistory::new();
        history.add_user_message("one");
        let mid = history.add_user_message("two").unwrap();
        history.add_user_message("three");

        history.delete_and_truncate(mid);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last_message().unwrap().content, "one");
    }

    #[test]
    fn truncate_after_keeps_message() {
        let mut history = ChatHistory::new();
        let first = history.add_user_message("one").unwrap();
        history.add_user_message("two");

        history.truncate_after(first);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last_message().unwrap().id, first);
    }
}

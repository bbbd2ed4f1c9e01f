//! Conversations and their turn history.
//!
//! Storage layout:
//! - `conversations`: index of every [`Conversation`]
//! - `conversations:active`: id of the active conversation
//! - `conversation:{id}:history`: [`ConversationHistory`] of one conversation

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{Conversation, GenerationResult, HistoryEntry, now_millis};
use crate::error::{Result, VoxError};
use crate::services::{KeyValueStore, get_json, set_json};

/// Entries kept per conversation; the oldest are evicted silently
pub const MAX_HISTORY_ENTRIES: usize = 50;

const TITLE_CHARS: usize = 40;
const PREVIEW_CHARS: usize = 80;

const CONVERSATIONS_KEY: &str = "conversations";
const ACTIVE_KEY: &str = "conversations:active";

fn history_key(id: &str) -> String {
    format!("conversation:{}:history", id)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.trim().chars().take(max).collect()
}

/// Ordered turns of one conversation plus the navigation cursor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHistory {
    pub entries: Vec<HistoryEntry>,
    /// `None` only while empty
    pub current_index: Option<usize>,
}

impl ConversationHistory {
    /// Append after the cursor, discarding any entries beyond it
    pub fn push(&mut self, entry: HistoryEntry) {
        let keep = self.current_index.map_or(0, |i| i + 1);
        self.entries.truncate(keep);
        self.entries.push(entry);

        if self.entries.len() > MAX_HISTORY_ENTRIES {
            let excess = self.entries.len() - MAX_HISTORY_ENTRIES;
            self.entries.drain(..excess);
        }
        self.current_index = Some(self.entries.len() - 1);
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.current_index.and_then(|i| self.entries.get(i))
    }

    /// Move the cursor; out-of-range indices leave it unchanged
    pub fn navigate_to(&mut self, index: usize) -> Option<&HistoryEntry> {
        if index >= self.entries.len() {
            return None;
        }
        self.current_index = Some(index);
        self.entries.get(index)
    }

    pub fn can_go_back(&self) -> bool {
        self.current_index.is_some_and(|i| i > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        self.current_index
            .is_some_and(|i| i + 1 < self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Repair a cursor that points past the end (hand-edited store)
    fn normalize(&mut self) {
        self.current_index = match (self.entries.len(), self.current_index) {
            (0, _) => None,
            (len, Some(i)) if i < len => Some(i),
            (len, _) => Some(len - 1),
        };
    }
}

/// Persisted conversations with exactly one active at a time
pub struct ConversationStore {
    store: Arc<dyn KeyValueStore>,
    conversations: Vec<Conversation>,
    active_id: String,
    history: ConversationHistory,
}

impl ConversationStore {
    /// Load the index and active history, creating a first conversation if needed
    pub fn open(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let conversations: Vec<Conversation> =
            get_json(store.as_ref(), CONVERSATIONS_KEY)?.unwrap_or_default();
        let active: Option<String> = get_json(store.as_ref(), ACTIVE_KEY)?;

        let mut this = Self {
            store,
            conversations,
            active_id: String::new(),
            history: ConversationHistory::default(),
        };

        let active = active
            .filter(|id| this.conversations.iter().any(|c| &c.id == id))
            .or_else(|| this.most_recent_id());

        match active {
            Some(id) => {
                this.history = this.load_history(&id)?;
                this.active_id = id;
                this.save_active()?;
            }
            None => {
                this.new_conversation()?;
            }
        }

        tracing::debug!(
            "Loaded {} conversation(s), active {}",
            this.conversations.len(),
            this.active_id
        );
        Ok(this)
    }

    fn most_recent_id(&self) -> Option<String> {
        self.conversations
            .iter()
            .max_by_key(|c| c.updated_at)
            .map(|c| c.id.clone())
    }

    fn load_history(&self, id: &str) -> Result<ConversationHistory> {
        let mut history: ConversationHistory =
            get_json(self.store.as_ref(), &history_key(id))?.unwrap_or_default();
        history.normalize();
        Ok(history)
    }

    fn save_history(&self) -> Result<()> {
        set_json(
            self.store.as_ref(),
            &history_key(&self.active_id),
            &self.history,
        )
    }

    fn save_index(&self) -> Result<()> {
        set_json(self.store.as_ref(), CONVERSATIONS_KEY, &self.conversations)
    }

    fn save_active(&self) -> Result<()> {
        set_json(self.store.as_ref(), ACTIVE_KEY, &self.active_id)
    }

    pub fn active_id(&self) -> &str {
        &self.active_id
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == self.active_id)
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn current_entry(&self) -> Option<&HistoryEntry> {
        self.history.current()
    }

    /// Most recently updated first
    pub fn list(&self) -> Vec<Conversation> {
        let mut list = self.conversations.clone();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }

    /// Record a completed turn in the active conversation
    pub fn append(&mut self, result: &GenerationResult, transcript: &str) -> Result<HistoryEntry> {
        let entry = HistoryEntry::from_result(result, transcript);
        self.history.push(entry.clone());
        self.save_history()?;

        let now = now_millis();
        if let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == self.active_id)
        {
            if conversation.has_default_title() && !transcript.trim().is_empty() {
                conversation.title = truncate_chars(transcript, TITLE_CHARS);
            }
            conversation.preview_text = truncate_chars(transcript, PREVIEW_CHARS);
            conversation.updated_at = now;
        }
        self.save_index()?;
        Ok(entry)
    }

    /// Create a conversation and make it active
    pub fn new_conversation(&mut self) -> Result<Conversation> {
        if !self.active_id.is_empty() {
            self.save_history()?;
        }
        let conversation = Conversation::new();
        self.conversations.push(conversation.clone());
        self.active_id = conversation.id.clone();
        self.history = ConversationHistory::default();

        self.save_index()?;
        self.save_active()?;
        self.save_history()?;
        tracing::info!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    /// Save the outgoing history and load the incoming one
    pub fn switch(&mut self, id: &str) -> Result<()> {
        if !self.conversations.iter().any(|c| c.id == id) {
            return Err(VoxError::Storage(format!("unknown conversation: {}", id)));
        }
        if id == self.active_id {
            return Ok(());
        }
        self.save_history()?;
        self.history = self.load_history(id)?;
        self.active_id = id.to_string();
        self.save_active()?;
        tracing::info!("Switched to conversation {}", id);
        Ok(())
    }

    /// Delete a conversation; deleting the active one activates the most
    /// recent remaining conversation or a fresh one
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return Err(VoxError::Storage(format!("unknown conversation: {}", id)));
        }
        self.store.delete(&history_key(id))?;
        self.save_index()?;

        if id == self.active_id {
            self.active_id.clear();
            match self.most_recent_id() {
                Some(next) => {
                    self.history = self.load_history(&next)?;
                    self.active_id = next;
                    self.save_active()?;
                }
                None => {
                    self.new_conversation()?;
                }
            }
        }
        tracing::info!("Deleted conversation {}", id);
        Ok(())
    }

    pub fn rename(&mut self, id: &str, title: &str) -> Result<()> {
        let conversation = self
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| VoxError::Storage(format!("unknown conversation: {}", id)))?;
        conversation.title = title.trim().to_string();
        self.save_index()
    }

    pub fn navigate_to(&mut self, index: usize) -> Result<Option<HistoryEntry>> {
        let entry = self.history.navigate_to(index).cloned();
        if entry.is_some() {
            self.save_history()?;
        }
        Ok(entry)
    }

    pub fn go_back(&mut self) -> Result<Option<HistoryEntry>> {
        match self.history.current_index {
            Some(i) if i > 0 => self.navigate_to(i - 1),
            _ => Ok(None),
        }
    }

    pub fn go_forward(&mut self) -> Result<Option<HistoryEntry>> {
        match self.history.current_index {
            Some(i) => self.navigate_to(i + 1),
            None => Ok(None),
        }
    }
}

//! Conversation state: the active message sequence plus named archives
//! of past conversations.
//!
//! Messages are immutable once appended, with one exception: the
//! transient `highlighted` flag driving copy feedback, which is set and
//! then reset by a cancellable per-message timer. Archiving snapshots
//! the current sequence; an archive whose messages already match the
//! current sequence is updated in place instead of duplicated.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::error::GatewayError;

/// Fixed user-facing text appended when a send fails.
pub const SEND_FAILURE_TEXT: &str = "Error: Could not get a response. Please try again.";

/// How long copy feedback stays highlighted.
pub const HIGHLIGHT_RESET_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role string used by the flat chat dialect.
    pub fn api_name(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFlags {
    #[serde(default)]
    pub highlighted: bool,
    #[serde(default)]
    pub chain_of_thought: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    pub timestamp: String,
    #[serde(default)]
    pub flags: DisplayFlags,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message {
            role: Role::User,
            text: text.into(),
            timestamp: clock_time(),
            flags: DisplayFlags::default(),
        }
    }

    pub fn assistant(text: impl Into<String>, flags: DisplayFlags) -> Self {
        Message {
            role: Role::Assistant,
            text: text.into(),
            timestamp: clock_time(),
            flags,
        }
    }
}

fn clock_time() -> String {
    Local::now().format("%H:%M").to_string()
}

/// Human-readable stamp used in archive names and fallback titles.
pub fn local_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    /// Creation timestamp in milliseconds; doubles as the archive id.
    pub id: i64,
    pub name: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    current: Vec<Message>,
    archives: Vec<Archive>,
}

impl ConversationStore {
    pub fn new() -> Self {
        ConversationStore::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.current
    }

    pub fn archives(&self) -> &[Archive] {
        &self.archives
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> &Message {
        self.push(Message::user(text))
    }

    /// Placeholder user entry when a send carries only an attachment.
    pub fn append_user_attachment(&mut self, name: &str) -> &Message {
        self.push(Message::user(format!("File uploaded: {name}")))
    }

    pub fn append_assistant(&mut self, text: impl Into<String>, flags: DisplayFlags) -> &Message {
        self.push(Message::assistant(text, flags))
    }

    /// Normalized failure entry; the text is fixed and user-facing.
    pub fn append_error(&mut self) -> &Message {
        self.push(Message::assistant(
            SEND_FAILURE_TEXT,
            DisplayFlags::default(),
        ))
    }

    fn push(&mut self, message: Message) -> &Message {
        self.current.push(message);
        self.current.last().expect("just pushed")
    }

    pub fn clear_current(&mut self) {
        self.current.clear();
    }

    /// Snapshot the current conversation under `name`. Returns the
    /// archive id, or `None` when there is nothing to archive.
    ///
    /// If an existing archive holds the same message sequence, that
    /// archive's name is updated in place instead of creating a
    /// duplicate entry.
    pub fn archive_current(&mut self, name: impl Into<String>) -> Option<i64> {
        if self.current.is_empty() {
            return None;
        }
        let name = name.into();

        if let Some(existing) = self
            .archives
            .iter_mut()
            .find(|archive| archive.messages == self.current)
        {
            debug!(archive_id = existing.id, "updating matching archive in place");
            existing.name = name;
            return Some(existing.id);
        }

        let id = self.next_archive_id();
        debug!(archive_id = id, messages = self.current.len(), "archiving conversation");
        self.archives.push(Archive {
            id,
            name,
            messages: self.current.clone(),
        });
        Some(id)
    }

    fn next_archive_id(&self) -> i64 {
        // Creation-timestamp ids, nudged forward when two archives land
        // in the same millisecond.
        let now = Utc::now().timestamp_millis();
        match self.archives.iter().map(|archive| archive.id).max() {
            Some(max) if now <= max => max + 1,
            _ => now,
        }
    }

    /// Replace the current conversation with an archive's snapshot.
    /// The archive entry itself stays in the list.
    pub fn restore(&mut self, archive_id: i64) -> Result<(), GatewayError> {
        let archive = self
            .archives
            .iter()
            .find(|archive| archive.id == archive_id)
            .ok_or_else(|| {
                GatewayError::validation(format!("no archive with id {archive_id}"))
            })?;
        self.current = archive.messages.clone();
        Ok(())
    }

    pub fn delete_archive(&mut self, archive_id: i64) {
        self.archives.retain(|archive| archive.id != archive_id);
    }

    /// Flip the transient highlight flag. Returns false for an
    /// out-of-range index.
    pub fn set_highlight(&mut self, index: usize, highlighted: bool) -> bool {
        match self.current.get_mut(index) {
            Some(message) => {
                message.flags.highlighted = highlighted;
                true
            }
            None => false,
        }
    }

    /// Load a store whose archives come from `path`. A missing file
    /// yields an empty archive list.
    pub fn load_from_path(path: &Path) -> Result<Self, GatewayError> {
        if !path.exists() {
            return Ok(ConversationStore::new());
        }
        let contents = fs::read_to_string(path)
            .map_err(|err| GatewayError::storage(err.to_string()))?;
        let archives: Vec<Archive> = serde_json::from_str(&contents)
            .map_err(|err| GatewayError::storage(err.to_string()))?;
        Ok(ConversationStore {
            current: Vec::new(),
            archives,
        })
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), GatewayError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| GatewayError::storage(err.to_string()))?;
        }
        let contents = serde_json::to_string_pretty(&self.archives)
            .map_err(|err| GatewayError::storage(err.to_string()))?;
        fs::write(path, contents).map_err(|err| GatewayError::storage(err.to_string()))
    }
}

/// Highlight a message and schedule the reset. The returned token
/// cancels the pending reset for this one message; it does not touch
/// other messages' timers.
pub async fn flash_highlight(
    store: Arc<Mutex<ConversationStore>>,
    index: usize,
    delay: Duration,
) -> CancellationToken {
    store.lock().await.set_highlight(index, true);

    let token = CancellationToken::new();
    let reset_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = reset_token.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                store.lock().await.set_highlight(index, false);
            }
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_exchange() -> ConversationStore {
        let mut store = ConversationStore::new();
        store.append_user("Hello");
        store.append_assistant("Hi there!", DisplayFlags::default());
        store
    }

    #[test]
    fn appends_preserve_order_and_roles() {
        let store = store_with_exchange();
        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[0].text, "Hello");
    }

    #[test]
    fn attachment_sends_get_a_placeholder_entry() {
        let mut store = ConversationStore::new();
        store.append_user_attachment("diagram.png");
        assert_eq!(store.messages()[0].text, "File uploaded: diagram.png");
        assert!(store.messages()[0].role.is_user());
    }

    #[test]
    fn error_entries_use_the_fixed_text() {
        let mut store = ConversationStore::new();
        store.append_error();
        assert_eq!(store.messages()[0].text, SEND_FAILURE_TEXT);
        assert_eq!(store.messages()[0].role, Role::Assistant);
    }

    #[test]
    fn archiving_an_empty_conversation_is_a_no_op() {
        let mut store = ConversationStore::new();
        assert_eq!(store.archive_current("empty"), None);
        assert!(store.archives().is_empty());
    }

    #[test]
    fn matching_archives_merge_instead_of_duplicating() {
        let mut store = store_with_exchange();

        let first = store.archive_current("first name").expect("archived");
        let second = store.archive_current("second name").expect("archived");

        assert_eq!(first, second);
        assert_eq!(store.archives().len(), 1);
        assert_eq!(store.archives()[0].name, "second name");
    }

    #[test]
    fn different_conversations_archive_separately() {
        let mut store = store_with_exchange();
        store.archive_current("one").expect("archived");

        store.append_user("Something new");
        store.archive_current("two").expect("archived");

        assert_eq!(store.archives().len(), 2);
        let ids: Vec<i64> = store.archives().iter().map(|a| a.id).collect();
        assert!(ids[0] < ids[1]);
    }

    #[test]
    fn restore_round_trips_the_snapshot() {
        let mut store = store_with_exchange();
        let before = store.messages().to_vec();

        let id = store.archive_current("saved").expect("archived");
        store.clear_current();
        assert!(store.messages().is_empty());

        store.restore(id).expect("restore succeeds");
        assert_eq!(store.messages(), before.as_slice());
        // Restoring is non-destructive to history.
        assert_eq!(store.archives().len(), 1);
    }

    #[test]
    fn restoring_an_unknown_archive_fails() {
        let mut store = store_with_exchange();
        assert!(matches!(
            store.restore(12345),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn delete_archive_removes_only_the_target() {
        let mut store = store_with_exchange();
        let first = store.archive_current("one").expect("archived");
        store.append_user("more");
        let second = store.archive_current("two").expect("archived");

        store.delete_archive(first);
        assert_eq!(store.archives().len(), 1);
        assert_eq!(store.archives()[0].id, second);
    }

    #[test]
    fn archives_persist_and_reload() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join("history.json");

        let mut store = store_with_exchange();
        store.archive_current("saved chat").expect("archived");
        store.save_to_path(&path).expect("save succeeds");

        let reloaded = ConversationStore::load_from_path(&path).expect("load succeeds");
        assert_eq!(reloaded.archives(), store.archives());
        assert!(reloaded.messages().is_empty());
    }

    #[test]
    fn loading_a_missing_history_file_yields_an_empty_store() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let store = ConversationStore::load_from_path(&dir.path().join("absent.json"))
            .expect("load succeeds");
        assert!(store.archives().is_empty());
    }

    #[tokio::test]
    async fn flash_highlight_sets_then_resets() {
        let store = Arc::new(Mutex::new(store_with_exchange()));

        flash_highlight(store.clone(), 0, Duration::from_millis(10)).await;
        assert!(store.lock().await.messages()[0].flags.highlighted);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!store.lock().await.messages()[0].flags.highlighted);
    }

    #[tokio::test]
    async fn cancelled_highlight_reset_leaves_the_flag_alone() {
        let store = Arc::new(Mutex::new(store_with_exchange()));

        let token = flash_highlight(store.clone(), 1, Duration::from_millis(10)).await;
        token.cancel();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.lock().await.messages()[1].flags.highlighted);
    }
}

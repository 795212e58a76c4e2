//! Interaction handler
//!
//! Persists a raised interruption so a later invocation can resume it: the
//! request lands in the `interactions` collection keyed by its id, and a
//! thread record lands in `interactions_threads` keyed by thread id with
//! the checkpoint and bundle info needed to pick the run back up. A
//! display callback lets the embedding adapter (CLI, HTTP) surface the
//! prompt; the core never blocks waiting for the human.
//!
//! Thread lifecycle: `paused` → `resuming` → `completed`. Stale paused
//! threads can be purged by age.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use agentmap_core::{HumanInteractionRequest, Interruption, InterruptionCheckpoint};

use crate::error::{Result, RuntimeError};
use crate::storage::JsonCollectionStore;

/// Collection holding interaction requests by id
pub const INTERACTIONS_COLLECTION: &str = "interactions";

/// Collection holding thread records by thread id
pub const THREADS_COLLECTION: &str = "interactions_threads";

/// Lifecycle state of an interrupted thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Paused,
    Resuming,
    Completed,
}

/// Where the interrupted run's bundle came from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleInfo {
    pub csv_hash: String,
    pub bundle_path: PathBuf,
    pub csv_path: PathBuf,
}

/// Persistent continuation of an interrupted execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub thread_id: String,
    pub graph_name: String,
    pub node_name: String,
    pub status: ThreadStatus,
    #[serde(default)]
    pub pending_interaction_id: Option<Uuid>,
    pub checkpoint_data: InterruptionCheckpoint,
    pub bundle_info: BundleInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub resumed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Invoked with each persisted request so an adapter can show the prompt
pub type DisplayCallback = Arc<dyn Fn(&HumanInteractionRequest) + Send + Sync>;

/// Catches interruptions, persists them, and drives thread transitions
pub struct InteractionHandler {
    store: Arc<JsonCollectionStore>,
    display: RwLock<Option<DisplayCallback>>,
}

impl InteractionHandler {
    pub fn new(store: Arc<JsonCollectionStore>) -> Self {
        Self {
            store,
            display: RwLock::new(None),
        }
    }

    pub fn set_display_callback(&self, callback: DisplayCallback) {
        *self.display.write() = Some(callback);
    }

    /// Persist an interruption's request and thread record, then notify
    /// the display callback
    pub fn handle_interruption(
        &self,
        interruption: &Interruption,
        graph_name: &str,
        bundle_info: BundleInfo,
    ) -> Result<()> {
        let request = &interruption.request;
        self.store
            .write_document(
                INTERACTIONS_COLLECTION,
                &request.id.to_string(),
                serde_json::to_value(request)?,
            )
            .map_err(|e| storage_step("persist interaction request", e))?;

        let now = Utc::now();
        let record = ThreadRecord {
            thread_id: interruption.thread_id.clone(),
            graph_name: graph_name.to_string(),
            node_name: interruption.checkpoint.node_name.clone(),
            status: ThreadStatus::Paused,
            pending_interaction_id: Some(request.id),
            checkpoint_data: interruption.checkpoint.clone(),
            bundle_info,
            created_at: now,
            updated_at: now,
            resumed_at: None,
            completed_at: None,
        };
        self.write_thread(&record)
            .map_err(|e| storage_step("persist thread record", e))?;

        info!(
            thread = %interruption.thread_id,
            node = %record.node_name,
            interaction = %request.id,
            "execution paused for human interaction"
        );

        if let Some(display) = self.display.read().clone() {
            display(request);
        }
        Ok(())
    }

    /// Transition a paused thread to `resuming`
    pub fn mark_thread_resuming(&self, thread_id: &str) -> Result<ThreadRecord> {
        let mut record = self.require_thread(thread_id)?;
        record.status = ThreadStatus::Resuming;
        record.resumed_at = Some(Utc::now());
        record.updated_at = Utc::now();
        self.write_thread(&record)
            .map_err(|e| storage_step("mark thread resuming", e))?;
        debug!(thread = %thread_id, "thread resuming");
        Ok(record)
    }

    /// Transition a thread to `completed`, clearing the pending interaction
    pub fn mark_thread_completed(&self, thread_id: &str) -> Result<()> {
        let mut record = self.require_thread(thread_id)?;
        record.status = ThreadStatus::Completed;
        record.pending_interaction_id = None;
        record.completed_at = Some(Utc::now());
        record.updated_at = Utc::now();
        self.write_thread(&record)
            .map_err(|e| storage_step("mark thread completed", e))?;
        debug!(thread = %thread_id, "thread completed");
        Ok(())
    }

    pub fn get_thread(&self, thread_id: &str) -> Option<ThreadRecord> {
        let value = self.store.read_document(THREADS_COLLECTION, thread_id)?;
        serde_json::from_value(value).ok()
    }

    pub fn get_interaction(&self, id: &Uuid) -> Option<HumanInteractionRequest> {
        let value = self
            .store
            .read_document(INTERACTIONS_COLLECTION, &id.to_string())?;
        serde_json::from_value(value).ok()
    }

    /// Purge paused/resuming threads older than `hours`; returns how many
    pub fn cleanup_expired_threads(&self, hours: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::hours(hours);
        let mut purged = 0;

        for (thread_id, value) in self.store.read_collection(THREADS_COLLECTION) {
            let Ok(record) = serde_json::from_value::<ThreadRecord>(value) else {
                continue;
            };
            if record.status == ThreadStatus::Completed || record.updated_at >= cutoff {
                continue;
            }
            if let Some(interaction_id) = record.pending_interaction_id {
                self.store
                    .delete_document(INTERACTIONS_COLLECTION, &interaction_id.to_string())
                    .map_err(|e| storage_step("cleanup interaction request", e))?;
            }
            self.store
                .delete_document(THREADS_COLLECTION, &thread_id)
                .map_err(|e| storage_step("cleanup thread record", e))?;
            purged += 1;
        }

        if purged > 0 {
            info!(purged, hours, "purged expired interaction threads");
        }
        Ok(purged)
    }

    fn require_thread(&self, thread_id: &str) -> Result<ThreadRecord> {
        self.get_thread(thread_id)
            .ok_or_else(|| RuntimeError::NotFound(format!("thread record '{thread_id}'")))
    }

    fn write_thread(&self, record: &ThreadRecord) -> Result<()> {
        self.store.write_document(
            THREADS_COLLECTION,
            &record.thread_id,
            serde_json::to_value(record)?,
        )
    }
}

fn storage_step(step: &str, error: RuntimeError) -> RuntimeError {
    match error {
        RuntimeError::Storage { message, .. } => RuntimeError::Storage {
            step: step.to_string(),
            message,
        },
        other => RuntimeError::Storage {
            step: step.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmap_core::InteractionType;
    use parking_lot::Mutex;
    use serde_json::json;
    use tempfile::TempDir;

    fn handler_in(dir: &TempDir) -> InteractionHandler {
        InteractionHandler::new(Arc::new(JsonCollectionStore::new(dir.path())))
    }

    fn sample_interruption(thread_id: &str, node: &str) -> Interruption {
        let request =
            HumanInteractionRequest::new(thread_id, node, InteractionType::TextInput, "need input");
        let checkpoint = InterruptionCheckpoint {
            inputs: serde_json::from_value(json!({"q": "?"})).unwrap(),
            node_name: node.to_string(),
            ..Default::default()
        };
        Interruption::new(thread_id, request, checkpoint)
    }

    #[test]
    fn test_interruption_roundtrip() {
        let dir = TempDir::new().unwrap();
        let handler = handler_in(&dir);
        let interruption = sample_interruption("t-1", "n2");
        let request_id = interruption.request.id;

        handler
            .handle_interruption(&interruption, "main", BundleInfo::default())
            .unwrap();

        let stored = handler.get_interaction(&request_id).unwrap();
        assert_eq!(stored.id, request_id);
        assert_eq!(stored.node_name, "n2");

        let thread = handler.get_thread("t-1").unwrap();
        assert_eq!(thread.status, ThreadStatus::Paused);
        assert_eq!(thread.node_name, "n2");
        assert_eq!(thread.pending_interaction_id, Some(request_id));
        assert_eq!(thread.checkpoint_data.inputs["q"], json!("?"));
    }

    #[test]
    fn test_resume_and_complete_transitions() {
        let dir = TempDir::new().unwrap();
        let handler = handler_in(&dir);
        handler
            .handle_interruption(&sample_interruption("t-1", "n2"), "main", BundleInfo::default())
            .unwrap();

        let resuming = handler.mark_thread_resuming("t-1").unwrap();
        assert_eq!(resuming.status, ThreadStatus::Resuming);
        assert!(resuming.resumed_at.is_some());

        handler.mark_thread_completed("t-1").unwrap();
        let completed = handler.get_thread("t-1").unwrap();
        assert_eq!(completed.status, ThreadStatus::Completed);
        assert_eq!(completed.pending_interaction_id, None);
        assert!(completed.completed_at.is_some());
    }

    #[test]
    fn test_unknown_thread_is_not_found() {
        let dir = TempDir::new().unwrap();
        let handler = handler_in(&dir);
        assert!(matches!(
            handler.mark_thread_resuming("ghost"),
            Err(RuntimeError::NotFound(_))
        ));
    }

    #[test]
    fn test_display_callback_fires() {
        let dir = TempDir::new().unwrap();
        let handler = handler_in(&dir);
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        handler.set_display_callback(Arc::new(move |request| {
            sink.lock().push(request.prompt.clone());
        }));

        handler
            .handle_interruption(&sample_interruption("t-1", "n1"), "main", BundleInfo::default())
            .unwrap();
        assert_eq!(seen.lock().as_slice(), ["need input"]);
    }

    #[test]
    fn test_cleanup_purges_only_stale_unfinished_threads() {
        let dir = TempDir::new().unwrap();
        let handler = handler_in(&dir);
        handler
            .handle_interruption(&sample_interruption("old", "n1"), "main", BundleInfo::default())
            .unwrap();
        handler
            .handle_interruption(&sample_interruption("fresh", "n1"), "main", BundleInfo::default())
            .unwrap();

        // Age the first record artificially
        let mut record = handler.get_thread("old").unwrap();
        record.updated_at = Utc::now() - Duration::hours(48);
        handler.write_thread(&record).unwrap();

        let purged = handler.cleanup_expired_threads(24).unwrap();
        assert_eq!(purged, 1);
        assert!(handler.get_thread("old").is_none());
        assert!(handler.get_thread("fresh").is_some());
    }
}

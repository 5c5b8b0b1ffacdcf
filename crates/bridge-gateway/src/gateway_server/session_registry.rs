//! In-memory record of CLI sessions created through the native chat route.
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::*;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SessionRecord {
    pub(super) session_id: String,
    pub(super) created_at: DateTime<Utc>,
    pub(super) last_accessed_at: DateTime<Utc>,
    pub(super) working_directory: String,
    pub(super) message_count: u32,
}

#[derive(Debug, Default)]
pub(super) struct SessionRegistry {
    sessions: Mutex<BTreeMap<String, SessionRecord>>,
}

impl SessionRegistry {
    /// Inserts or refreshes a session. An existing record keeps its creation time.
    pub(super) fn record(
        &self,
        session_id: &str,
        working_directory: &Path,
        message_count: u32,
    ) -> Result<SessionRecord, ApiError> {
        let now = Utc::now();
        let mut sessions = self.lock()?;
        let created_at = sessions
            .get(session_id)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        let record = SessionRecord {
            session_id: session_id.to_string(),
            created_at,
            last_accessed_at: now,
            working_directory: working_directory.display().to_string(),
            message_count,
        };
        sessions.insert(session_id.to_string(), record.clone());
        Ok(record)
    }

    pub(super) fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, ApiError> {
        Ok(self.lock()?.get(session_id).cloned())
    }

    pub(super) fn remove(&self, session_id: &str) -> Result<bool, ApiError> {
        Ok(self.lock()?.remove(session_id).is_some())
    }

    /// All sessions, oldest first.
    pub(super) fn list(&self) -> Result<Vec<SessionRecord>, ApiError> {
        let mut sessions = self.lock()?.values().cloned().collect::<Vec<_>>();
        sessions.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.session_id.cmp(&right.session_id))
        });
        Ok(sessions)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, SessionRecord>>, ApiError> {
        self.sessions
            .lock()
            .map_err(|_| ApiError::internal("session registry lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_record_keeps_created_at_and_refreshes_access() {
        let registry = SessionRegistry::default();
        let first = registry
            .record("sess-1", Path::new("/srv/app"), 1)
            .expect("record");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = registry
            .record("sess-1", Path::new("/srv/other"), 3)
            .expect("record again");

        assert_eq!(second.created_at, first.created_at);
        assert!(second.last_accessed_at > first.last_accessed_at);
        assert_eq!(second.working_directory, "/srv/other");
        assert_eq!(second.message_count, 3);
        assert_eq!(registry.list().expect("list").len(), 1);
    }

    #[test]
    fn unit_remove_reports_whether_session_existed() {
        let registry = SessionRegistry::default();
        registry
            .record("sess-2", Path::new("/srv/app"), 1)
            .expect("record");
        assert!(registry.remove("sess-2").expect("remove"));
        assert!(!registry.remove("sess-2").expect("remove again"));
        assert_eq!(registry.get("sess-2").expect("get"), None);
    }

    #[test]
    fn unit_session_record_serializes_camel_case_fields() {
        let registry = SessionRegistry::default();
        let record = registry
            .record("sess-3", Path::new("/srv/app"), 2)
            .expect("record");
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["sessionId"], "sess-3");
        assert_eq!(value["workingDirectory"], "/srv/app");
        assert_eq!(value["messageCount"], 2);
        assert!(value["createdAt"].is_string());
        assert!(value["lastAccessedAt"].is_string());
    }
}

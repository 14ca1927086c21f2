use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::session::types::{
    SessionKey, SessionRecord, SessionStore, UpdateOutcome, WriteCondition,
};
use crate::text_util::file_safe;

fn check_condition(
    current: Option<&SessionRecord>,
    condition: WriteCondition,
) -> Option<UpdateOutcome> {
    match (condition, current) {
        (WriteCondition::SessionUnset, Some(existing)) if existing.has_session() => {
            Some(UpdateOutcome::Conflict {
                existing: existing.clone(),
            })
        }
        _ => None,
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    store: RwLock<HashMap<SessionKey, SessionRecord>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, key: &SessionKey) -> anyhow::Result<SessionRecord> {
        let l = self
            .store
            .read()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        anyhow::Ok(l.get(key).cloned().unwrap_or_default())
    }

    async fn update(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
        condition: WriteCondition,
    ) -> anyhow::Result<UpdateOutcome> {
        let mut l = self
            .store
            .write()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        if let Some(conflict) = check_condition(l.get(key), condition) {
            return anyhow::Ok(conflict);
        }
        l.insert(key.clone(), record.clone());
        anyhow::Ok(UpdateOutcome::Written)
    }
}

/// One JSON document per session key under `data_dir`.
pub struct FileSessionStore {
    data_dir: PathBuf,
    writes: Mutex<()>,
}

impl FileSessionStore {
    pub async fn open(data_dir: &Path) -> anyhow::Result<FileSessionStore> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Failed to create {}", data_dir.display()))?;
        log::info!("Storing sessions in {}", data_dir.display());
        anyhow::Ok(FileSessionStore {
            data_dir: data_dir.to_path_buf(),
            writes: Mutex::new(()),
        })
    }

    fn record_path(&self, key: &SessionKey) -> PathBuf {
        self.data_dir.join(format!(
            "session-{}-{}.json",
            file_safe(key.title_id.as_str()),
            file_safe(key.entity_id.as_str())
        ))
    }

    async fn load(path: &Path) -> anyhow::Result<Option<SessionRecord>> {
        match tokio::fs::read(path).await {
            Ok(content) => {
                let record = serde_json::from_slice(content.as_slice())
                    .with_context(|| format!("Corrupt session record {}", path.display()))?;
                anyhow::Ok(Some(record))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => anyhow::Ok(None),
            Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, key: &SessionKey) -> anyhow::Result<SessionRecord> {
        anyhow::Ok(Self::load(&self.record_path(key)).await?.unwrap_or_default())
    }

    async fn update(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
        condition: WriteCondition,
    ) -> anyhow::Result<UpdateOutcome> {
        let _guard = self.writes.lock().await;
        let path = self.record_path(key);
        let current = Self::load(&path).await?;
        if let Some(conflict) = check_condition(current.as_ref(), condition) {
            return anyhow::Ok(conflict);
        }
        let tmp = path.with_extension("json.tmp");
        let written = match tokio::fs::write(&tmp, serde_json::to_vec_pretty(record)?).await {
            Ok(()) => tokio::fs::rename(&tmp, &path)
                .await
                .with_context(|| format!("Failed to write {}", path.display())),
            Err(err) => Err(err).with_context(|| format!("Failed to write {}", tmp.display())),
        };
        if written.is_err() {
            if let Err(err) = tokio::fs::remove_file(&tmp).await {
                log::debug!("Leaving {}: {}", tmp.display(), err);
            }
        }
        written?;
        anyhow::Ok(UpdateOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use serde_json::json;

    use crate::services::sessions::{FileSessionStore, InMemorySessionStore};
    use crate::session::types::*;

    fn test_data_dir() -> PathBuf {
        std::env::temp_dir().join(format!("sessions-{}", uuid::Uuid::new_v4()))
    }

    fn key() -> SessionKey {
        SessionKey::new("TITLE", "player/1")
    }

    async fn conditional_write_keeps_first_session(store: &dyn SessionStore) {
        assert_eq!(SessionRecord::default(), store.get(&key()).await.unwrap());

        let first = store
            .update(&key(), &SessionRecord::with_session("s-1"), WriteCondition::SessionUnset)
            .await
            .unwrap();
        let second = store
            .update(&key(), &SessionRecord::with_session("s-2"), WriteCondition::SessionUnset)
            .await
            .unwrap();

        assert_eq!(UpdateOutcome::Written, first);
        assert_eq!(
            UpdateOutcome::Conflict {
                existing: SessionRecord::with_session("s-1")
            },
            second
        );
        assert_eq!(
            Some("s-1".to_string()),
            store.get(&key()).await.unwrap().session_id
        );
    }

    #[tokio::test]
    async fn test_in_memory_conditional_write() {
        conditional_write_keeps_first_session(&InMemorySessionStore::default()).await;
    }

    #[tokio::test]
    async fn test_file_conditional_write() {
        let dir = test_data_dir();
        let store = FileSessionStore::open(&dir).await.unwrap();
        conditional_write_keeps_first_session(&store).await;
        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_unconditional_write_replaces_record() {
        let store = InMemorySessionStore::default();
        store
            .update(&key(), &SessionRecord::with_session("s-1"), WriteCondition::Always)
            .await
            .unwrap();
        store
            .update(&key(), &SessionRecord::with_session("s-2"), WriteCondition::Always)
            .await
            .unwrap();
        assert_eq!(
            Some("s-2".to_string()),
            store.get(&key()).await.unwrap().session_id
        );
    }

    #[tokio::test]
    async fn test_file_records_keep_extra_attributes_across_reopen() {
        let dir = test_data_dir();
        let mut record = SessionRecord::with_session("s-1");
        record.attributes.insert("lobby".to_string(), json!({"size": 4}));
        {
            let store = FileSessionStore::open(&dir).await.unwrap();
            store
                .update(&key(), &record, WriteCondition::Always)
                .await
                .unwrap();
        }
        let reopened = FileSessionStore::open(&dir).await.unwrap();
        assert_eq!(record, reopened.get(&key()).await.unwrap());
        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_get_distinct_records() {
        let dir = test_data_dir();
        let store = FileSessionStore::open(&dir).await.unwrap();
        let pairs = [
            (SessionKey::new("TITLE", "a/b"), SessionKey::new("TITLE", "a_b")),
            (SessionKey::new("T-x", "y"), SessionKey::new("T", "x-y")),
        ];
        for (written, other) in pairs.iter() {
            assert_ne!(store.record_path(written), store.record_path(other));
            store
                .update(written, &SessionRecord::with_session("s-A"), WriteCondition::Always)
                .await
                .unwrap();
            assert_eq!(None, store.get(other).await.unwrap().session_id);
        }
        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_names_the_file() {
        let dir = test_data_dir();
        let store = FileSessionStore::open(&dir).await.unwrap();
        let tmp = store.record_path(&key()).with_extension("json.tmp");
        tokio::fs::create_dir(&tmp).await.unwrap();

        let err = store
            .update(&key(), &SessionRecord::with_session("s-1"), WriteCondition::Always)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to write"), "{}", err);
        assert!(err.to_string().contains(".json.tmp"), "{}", err);
        assert_eq!(None, store.get(&key()).await.unwrap().session_id);
        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_a_store_error() {
        let dir = test_data_dir();
        let store = FileSessionStore::open(&dir).await.unwrap();
        tokio::fs::write(store.record_path(&key()), b"{not json")
            .await
            .unwrap();
        assert!(store.get(&key()).await.is_err());
        tokio::fs::remove_dir_all(dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_racing_first_writes_record_one_session() {
        let store = Arc::new(InMemorySessionStore::default());
        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update(
                        &key(),
                        &SessionRecord::with_session(format!("s-{}", i).as_str()),
                        WriteCondition::SessionUnset,
                    )
                    .await
                    .unwrap()
            }));
        }
        let mut written = 0;
        for task in tasks {
            if task.await.unwrap() == UpdateOutcome::Written {
                written += 1;
            }
        }
        assert_eq!(1, written);
    }
}

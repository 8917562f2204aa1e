//! Round Persistence
//!
//! Closed rounds are handed to a `RoundStore`. Storage is never on the
//! gameplay path: the engine queues work on a `RoundWriter`, which saves in
//! order on its own task and logs failures instead of returning them.

use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::game::error::RoundError;
use crate::game::round::{Round, RoundNumber};

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Round could not be encoded.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Backend refused the write.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for RoundError {
    fn from(e: StoreError) -> Self {
        RoundError::PersistenceFailure(e.to_string())
    }
}

/// Destination for closed rounds.
#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Persist one closed round.
    async fn save_round(&self, round: &Round) -> Result<(), StoreError>;

    /// Drop all stored history (round numbering restarted).
    async fn purge(&self) -> Result<(), StoreError>;
}

/// Keeps closed rounds in memory.
#[derive(Debug, Default)]
pub struct InMemoryRoundStore {
    rounds: RwLock<Vec<Round>>,
}

impl InMemoryRoundStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of stored rounds, oldest first.
    pub async fn rounds(&self) -> Vec<Round> {
        self.rounds.read().await.clone()
    }

    /// Stored round by number.
    pub async fn get(&self, number: RoundNumber) -> Option<Round> {
        self.rounds.read().await
            .iter()
            .find(|r| r.number == number)
            .cloned()
    }

    /// Number of stored rounds.
    pub async fn len(&self) -> usize {
        self.rounds.read().await.len()
    }
}

#[async_trait]
impl RoundStore for InMemoryRoundStore {
    async fn save_round(&self, round: &Round) -> Result<(), StoreError> {
        self.rounds.write().await.push(round.clone());
        Ok(())
    }

    async fn purge(&self) -> Result<(), StoreError> {
        self.rounds.write().await.clear();
        Ok(())
    }
}

/// Appends one JSON document per round to a file.
#[derive(Debug)]
pub struct JsonlRoundStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRoundStore {
    /// Store rounds at `path`, creating the file on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Read back every stored round.
    pub async fn load(&self) -> Result<Vec<Round>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl RoundStore for JsonlRoundStore {
    async fn save_round(&self, round: &Round) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(round)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn purge(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::write(&self.path, b"").await?;
        Ok(())
    }
}

/// Work queued for the writer task.
#[derive(Debug)]
enum StoreJob {
    Save(Box<Round>),
    Purge,
}

/// Ordered, fire-and-forget front end to a `RoundStore`.
#[derive(Clone, Debug)]
pub struct RoundWriter {
    jobs: mpsc::UnboundedSender<StoreJob>,
}

impl RoundWriter {
    /// Spawn the writer task. It exits once every `RoundWriter` is dropped.
    pub fn spawn(store: Arc<dyn RoundStore>) -> (Self, JoinHandle<()>) {
        let (jobs, mut rx) = mpsc::unbounded_channel::<StoreJob>();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    StoreJob::Save(round) => match store.save_round(&round).await {
                        Ok(()) => debug!("Persisted round {}", round.number),
                        Err(e) => {
                            let e = RoundError::from(e);
                            error!(code = ?e.code(), "Failed to persist round {}: {}", round.number, e);
                        }
                    },
                    StoreJob::Purge => match store.purge().await {
                        Ok(()) => info!("Purged round history"),
                        Err(e) => {
                            let e = RoundError::from(e);
                            error!(code = ?e.code(), "Failed to purge round history: {}", e);
                        }
                    },
                }
            }
            debug!("Round writer stopped");
        });

        (Self { jobs }, handle)
    }

    /// Queue a closed round.
    pub fn save(&self, round: Round) {
        let number = round.number;
        if self.jobs.send(StoreJob::Save(Box::new(round))).is_err() {
            error!("Round writer gone, dropping round {}", number);
        }
    }

    /// Queue a history purge.
    pub fn purge(&self) {
        if self.jobs.send(StoreJob::Purge).is_err() {
            error!("Round writer gone, dropping purge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::core::multiplier::Multiplier;

    fn round(number: RoundNumber) -> Round {
        Round {
            number,
            seed: "secret-seed".into(),
            commitment: "00".repeat(32),
            crash_point: Multiplier::from_hundredths(335),
            start_time: Utc::now(),
            end_time: Some(Utc::now()),
            bets: Vec::new(),
            cashouts: Vec::new(),
        }
    }

    fn temp_log() -> PathBuf {
        std::env::temp_dir().join(format!("crash-rounds-{}.jsonl", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = InMemoryRoundStore::new();
        store.save_round(&round(1)).await.unwrap();
        store.save_round(&round(2)).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(2).await.unwrap().number, 2);

        store.purge().await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_jsonl_store_appends() {
        let path = temp_log();
        let store = JsonlRoundStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());

        store.save_round(&round(1)).await.unwrap();
        store.save_round(&round(2)).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].number, 1);
        assert_eq!(loaded[1].crash_point, Multiplier::from_hundredths(335));

        store.purge().await.unwrap();
        assert!(store.load().await.unwrap().is_empty());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_writer_keeps_order() {
        let store = Arc::new(InMemoryRoundStore::new());
        let (writer, handle) = RoundWriter::spawn(store.clone());

        writer.save(round(1));
        writer.purge();
        writer.save(round(2));
        drop(writer);
        handle.await.unwrap();

        let rounds = store.rounds().await;
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].number, 2);
    }

    struct BrokenStore;

    #[async_trait]
    impl RoundStore for BrokenStore {
        async fn save_round(&self, _round: &Round) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }

        async fn purge(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
    }

    #[test]
    fn test_store_error_maps_to_persistence_failure() {
        let e = RoundError::from(StoreError::Unavailable("disk full".into()));
        assert_eq!(e, RoundError::PersistenceFailure("Store unavailable: disk full".into()));
        assert_eq!(e.code(), crate::game::error::ErrorCode::PersistenceFailure);
        assert!(e.is_server_error());
    }

    #[tokio::test]
    async fn test_writer_survives_failures() {
        let (writer, handle) = RoundWriter::spawn(Arc::new(BrokenStore));
        writer.save(round(1));
        writer.save(round(2));
        drop(writer);

        // Errors are logged, the task still drains and exits cleanly
        handle.await.unwrap();
    }
}

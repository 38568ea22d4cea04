use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        mpsc::{self, TrySendError},
        Arc, RwLock, RwLockReadGuard,
    },
};
use tracing::{debug, error, trace};

use crate::common::{error::TradeError, types::SerdeGenericTrait};

enum PersisterMsg {
    Persist,
    Close,
}

/// Writes a JSON snapshot of a store to disk from a dedicated thread. Requests coalesce:
/// while a write is pending, further `queue()` calls are dropped, and the pending write
/// picks up the latest state anyway.
pub(crate) struct Persister {
    persist_tx: mpsc::SyncSender<PersisterMsg>,
    task_handle: std::thread::JoinHandle<()>,
    data_path: PathBuf,
}

impl Persister {
    pub(crate) fn restore(data_path: impl AsRef<Path>) -> Result<String, TradeError> {
        let json: String = fs::read_to_string(data_path.as_ref())?;
        Ok(json)
    }

    pub(crate) fn new(
        store: Arc<RwLock<dyn SerdeGenericTrait>>,
        data_path: impl AsRef<Path>,
    ) -> Self {
        let data_path = data_path.as_ref().to_path_buf();
        let (persist_tx, task_handle) = Self::setup_persistence(store, data_path.clone());

        Self {
            persist_tx,
            task_handle,
            data_path,
        }
    }

    fn setup_persistence(
        store: Arc<RwLock<dyn SerdeGenericTrait>>,
        data_path: PathBuf,
    ) -> (mpsc::SyncSender<PersisterMsg>, std::thread::JoinHandle<()>) {
        let (persist_tx, persist_rx) = mpsc::sync_channel(1);
        let task_handle = std::thread::spawn(move || {
            loop {
                match persist_rx.recv() {
                    Ok(PersisterMsg::Persist) => {
                        let store = match store.read() {
                            Ok(store) => store,
                            Err(error) => {
                                error!("Error reading store - {}", error);
                                continue;
                            }
                        };
                        if let Some(error) = Self::persist(store, &data_path).err() {
                            error!(
                                "Error persisting data to path {} - {}",
                                data_path.display(),
                                error
                            );
                        }
                    }
                    Ok(PersisterMsg::Close) => break,
                    Err(err) => {
                        error!("Persistence channel recv Error - {}", err);
                        break;
                    }
                }
            }
            debug!("Persistence thread for {} exiting", data_path.display());
        });
        (persist_tx, task_handle)
    }

    fn persist(
        store: RwLockReadGuard<'_, dyn SerdeGenericTrait>,
        data_path: impl AsRef<Path>,
    ) -> Result<(), TradeError> {
        let json = serde_json::to_string(&*store)?;
        drop(store);

        trace!(
            "Persisting JSON to path: {} - {}",
            data_path.as_ref().display(),
            json
        );

        // Last good snapshot must survive a crash mid-write
        let tmp_path = data_path.as_ref().with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, data_path.as_ref())?;
        Ok(())
    }

    pub(crate) fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub(crate) fn queue(&self) {
        match self.persist_tx.try_send(PersisterMsg::Persist) {
            Ok(_) => {}
            Err(TrySendError::Full(_)) => {
                trace!("Persistence channel full")
            }
            Err(TrySendError::Disconnected(_)) => {
                error!("Persistence channel disconnected")
            }
        }
    }

    /// Flushes one final snapshot and joins the persistence thread.
    pub(crate) fn terminate(self) {
        if let Some(error) = self.persist_tx.send(PersisterMsg::Persist).err() {
            error!("Error queueing final persist - {}", error);
        }
        if let Some(error) = self.persist_tx.send(PersisterMsg::Close).err() {
            error!("Error closing persistence thread - {}", error);
        }
        if let Some(error) = self.task_handle.join().err() {
            error!("Error terminating persistence thread - {:?}", error);
        }
    }
}

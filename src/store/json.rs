use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use crate::economy::{NetworkEconomyState, UserLedger};

/// On-disk snapshot layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    network: Option<NetworkEconomyState>,
    users: Vec<UserLedger>,
}

/// System of record for ledgers and the network singleton: a JSON snapshot
/// file rewritten atomically (write-temp-then-rename). The in-memory mirror
/// receives batched upserts from the flush loop and from settlement.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    network: Option<NetworkEconomyState>,
    users: HashMap<String, UserLedger>,
}

impl JsonStore {
    /// Open the store, reading an existing snapshot if present. A missing
    /// file means first boot; an unreadable or unparsable file is an error
    /// the caller must treat as fatal.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let snapshot = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Snapshot>(&raw)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no snapshot at {}; starting fresh", path.display());
                Snapshot::default()
            }
            Err(e) => return Err(e),
        };

        let users: HashMap<String, UserLedger> = snapshot
            .users
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();
        if !users.is_empty() {
            info!("loaded {} ledgers from {}", users.len(), path.display());
        }

        Ok(Self {
            path,
            network: snapshot.network,
            users,
        })
    }

    pub fn network(&self) -> Option<&NetworkEconomyState> {
        self.network.as_ref()
    }

    pub fn users(&self) -> impl Iterator<Item = &UserLedger> {
        self.users.values()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn set_network(&mut self, network: NetworkEconomyState) {
        self.network = Some(network);
    }

    /// Replace the stored copy of each ledger in the batch.
    pub fn upsert_users(&mut self, batch: Vec<UserLedger>) {
        for ledger in batch {
            self.users.insert(ledger.id.clone(), ledger);
        }
    }

    /// Write the whole snapshot to disk. A temp file plus rename keeps a
    /// crash from leaving a half-written system of record.
    pub fn persist(&self) -> io::Result<()> {
        let snapshot = Snapshot {
            network: self.network.clone(),
            users: self.users.values().cloned().collect(),
        };
        let raw = serde_json::to_vec(&snapshot)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &raw)?;
        fs::rename(&tmp, &self.path)?;
        debug!(
            "persisted snapshot: {} users, {} bytes",
            self.users.len(),
            raw.len()
        );
        Ok(())
    }
}

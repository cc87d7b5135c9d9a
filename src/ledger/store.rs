//! Durable per-user ledger.
//!
//! One JSON document per user under `<data_dir>/users/`. Writes go through a
//! temp file and a rename, so a crash leaves either the old or the new
//! document on disk. Each user's document is guarded by its own async mutex;
//! users never contend with each other.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::types::{
    now_secs, CachedBalance, LedgerError, LedgerResult, RecordUpdate, TransactionRecord,
    TxStatus, UserRecord,
};
use crate::identity::UserId;
use crate::vault::StoredWallet;

type Slot = Arc<Mutex<Option<UserRecord>>>;

/// Thread-safe store of wallets, nonces, balances and history.
#[derive(Debug, Clone)]
pub struct UserLedger {
    users_dir: PathBuf,
    slots: Arc<DashMap<UserId, Slot>>,
}

impl UserLedger {
    /// Open (or create) a ledger rooted at `data_dir`.
    pub fn open(data_dir: &Path) -> LedgerResult<Self> {
        let users_dir = data_dir.join("users");
        std::fs::create_dir_all(&users_dir).map_err(|e| io_error(&users_dir, e))?;

        let ledger = Self {
            users_dir,
            slots: Arc::new(DashMap::new()),
        };
        tracing::info!(
            path = %ledger.users_dir.display(),
            users = ledger.known_users()?.len(),
            "Ledger opened"
        );
        Ok(ledger)
    }

    /// Bind a wallet to a user. Rebinding the same address is a no-op; a
    /// different address is refused.
    pub async fn save(&self, user: &UserId, wallet: StoredWallet) -> LedgerResult<()> {
        self.mutate(user, |record| match &record.wallet {
            Some(existing) if existing.address == wallet.address => Ok(()),
            Some(_) => Err(LedgerError::WalletAlreadyAssigned(user.clone())),
            None => {
                record.wallet = Some(wallet);
                Ok(())
            }
        })
        .await
    }

    pub async fn load(&self, user: &UserId) -> LedgerResult<Option<StoredWallet>> {
        self.read(user, |record| record.wallet.clone()).await
    }

    pub async fn append_record(
        &self,
        user: &UserId,
        entry: TransactionRecord,
    ) -> LedgerResult<()> {
        self.mutate(user, |record| {
            record.history.push(entry);
            record.refresh_last_nonce();
            Ok(())
        })
        .await
    }

    /// Move a Pending record forward. Returns the updated record.
    pub async fn update_record(
        &self,
        user: &UserId,
        request_id: Uuid,
        update: RecordUpdate,
    ) -> LedgerResult<TransactionRecord> {
        self.mutate(user, |record| {
            let entry = record
                .history
                .iter_mut()
                .find(|r| r.request_id == request_id)
                .ok_or(LedgerError::RecordNotFound(request_id))?;
            entry.apply(&update)?;
            let updated = entry.clone();
            record.refresh_last_nonce();
            Ok(updated)
        })
        .await
    }

    pub async fn history(&self, user: &UserId) -> LedgerResult<Vec<TransactionRecord>> {
        self.read(user, |record| record.history.clone()).await
    }

    pub async fn record(
        &self,
        user: &UserId,
        request_id: Uuid,
    ) -> LedgerResult<Option<TransactionRecord>> {
        self.read(user, |record| {
            record
                .history
                .iter()
                .find(|r| r.request_id == request_id)
                .cloned()
        })
        .await
    }

    pub async fn pending(&self, user: &UserId) -> LedgerResult<Vec<TransactionRecord>> {
        self.read(user, |record| {
            record
                .history
                .iter()
                .filter(|r| r.status == TxStatus::Pending)
                .cloned()
                .collect()
        })
        .await
    }

    /// Highest nonce a recorded transaction holds.
    pub async fn last_nonce(&self, user: &UserId) -> LedgerResult<Option<u64>> {
        self.read(user, |record| record.last_nonce).await
    }

    pub async fn cache_balance(
        &self,
        user: &UserId,
        token: Address,
        amount: U256,
    ) -> LedgerResult<()> {
        self.mutate(user, |record| {
            record.cached_balance = Some(CachedBalance {
                token,
                amount,
                updated_at: now_secs(),
            });
            Ok(())
        })
        .await
    }

    pub async fn cached_balance(&self, user: &UserId) -> LedgerResult<Option<CachedBalance>> {
        self.read(user, |record| record.cached_balance.clone()).await
    }

    /// Users with a document on disk.
    pub fn known_users(&self) -> LedgerResult<Vec<UserId>> {
        let entries =
            std::fs::read_dir(&self.users_dir).map_err(|e| io_error(&self.users_dir, e))?;

        let mut users = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match UserId::new(stem) {
                Ok(user) => users.push(user),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping stray ledger file"),
            }
        }
        users.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(users)
    }

    async fn read<R>(
        &self,
        user: &UserId,
        view: impl FnOnce(&UserRecord) -> R,
    ) -> LedgerResult<R> {
        let slot = self.slot(user);
        let mut guard = slot.lock().await;
        let record = self.loaded(user, &mut guard).await?;
        Ok(view(record))
    }

    /// Apply `change` to a copy, persist the copy, then publish it. A failed
    /// change or a failed write leaves the cached record untouched.
    async fn mutate<R>(
        &self,
        user: &UserId,
        change: impl FnOnce(&mut UserRecord) -> LedgerResult<R>,
    ) -> LedgerResult<R> {
        let slot = self.slot(user);
        let mut guard = slot.lock().await;
        let mut next = self.loaded(user, &mut guard).await?.clone();
        let result = change(&mut next)?;
        self.persist(&next).await?;
        *guard = Some(next);
        Ok(result)
    }

    fn slot(&self, user: &UserId) -> Slot {
        self.slots.entry(user.clone()).or_default().value().clone()
    }

    async fn loaded<'a>(
        &self,
        user: &UserId,
        cached: &'a mut Option<UserRecord>,
    ) -> LedgerResult<&'a UserRecord> {
        if cached.is_none() {
            *cached = Some(self.read_from_disk(user).await?);
        }
        cached
            .as_ref()
            .ok_or_else(|| LedgerError::Corrupted(format!("record for {user} vanished")))
    }

    async fn read_from_disk(&self, user: &UserId) -> LedgerResult<UserRecord> {
        let path = self.path_for(user);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(UserRecord::new(user.clone()));
            }
            Err(e) => return Err(io_error(&path, e)),
        };

        let record: UserRecord = serde_json::from_slice(&bytes)?;
        if &record.user_id != user {
            return Err(LedgerError::Corrupted(format!(
                "{} belongs to {}",
                path.display(),
                record.user_id
            )));
        }
        tracing::debug!(user = %user, entries = record.history.len(), "Loaded ledger record");
        Ok(record)
    }

    async fn persist(&self, record: &UserRecord) -> LedgerResult<()> {
        let path = self.path_for(&record.user_id);
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec_pretty(record)?;

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        restrict_permissions(&tmp).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(&path, e));
        }
        Ok(())
    }

    fn path_for(&self, user: &UserId) -> PathBuf {
        self.users_dir.join(format!("{}.json", user.as_str()))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> LedgerResult<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| io_error(path, e))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> LedgerResult<()> {
    Ok(())
}

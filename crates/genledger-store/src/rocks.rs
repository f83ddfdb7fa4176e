//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use ulid::Generator;

use genledger_core::{
    Account, BillingError, EntryId, GenerationJob, JobOutcome, LedgerEntry, NewJob, RequestId,
    SettlementSource, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{Admission, CreditKind, Settlement, Store};

/// RocksDB-backed storage implementation.
///
/// Reads go straight to the database. Every read-check-write operation runs
/// under `commit`, which also owns the monotonic ULID generator that issues
/// ledger entry IDs, so entry key order equals commit order.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    commit: Mutex<Generator>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            commit: Mutex::new(Generator::new()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Generator>> {
        self.commit
            .lock()
            .map_err(|_| StoreError::Database("commit lock poisoned".into()))
    }

    fn next_entry_id(generator: &mut Generator) -> Result<EntryId> {
        generator
            .generate()
            .map(EntryId::from_ulid)
            .map_err(|e| StoreError::Database(format!("entry id generation failed: {e}")))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn account_not_found(user_id: &UserId) -> StoreError {
        StoreError::NotFound {
            entity: "account",
            id: user_id.to_string(),
        }
    }

    fn put_account(&self, batch: &mut WriteBatch, account: &Account) -> Result<()> {
        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.user_id),
            Self::serialize(account)?,
        );
        Ok(())
    }

    fn put_entry(&self, batch: &mut WriteBatch, entry: &LedgerEntry) -> Result<()> {
        let cf_ledger = self.cf(cf::LEDGER)?;
        let cf_by_user = self.cf(cf::LEDGER_BY_USER)?;
        batch.put_cf(&cf_ledger, keys::entry_key(&entry.id), Self::serialize(entry)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_entry_key(&entry.user_id, &entry.id),
            [],
        );
        Ok(())
    }

    fn put_job(&self, batch: &mut WriteBatch, job: &GenerationJob) -> Result<()> {
        let cf_jobs = self.cf(cf::JOBS)?;
        batch.put_cf(&cf_jobs, keys::job_key(&job.request_id), Self::serialize(job)?);
        Ok(())
    }

    fn get_entry(&self, entry_id: &EntryId) -> Result<Option<LedgerEntry>> {
        let cf = self.cf(cf::LEDGER)?;
        self.db
            .get_cf(&cf, keys::entry_key(entry_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Scan a `user_id || entry_id` index, returning `(key, value)` pairs.
    fn scan_user_index(
        &self,
        cf_name: &str,
        user_id: &UserId,
        newest_first: bool,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(cf_name)?;
        let prefix = keys::user_prefix(user_id);

        let mut upper = prefix.clone();
        upper.extend_from_slice(&[0xFF; 16]);

        let mode = if newest_first {
            IteratorMode::From(upper.as_slice(), Direction::Reverse)
        } else {
            IteratorMode::From(prefix.as_slice(), Direction::Forward)
        };

        let mut rows = Vec::new();
        for item in self.db.iterator_cf(&cf, mode).skip(offset) {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) || rows.len() >= limit {
                break;
            }
            rows.push((key, value));
        }
        Ok(rows)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Accounts and Ledger
    // =========================================================================

    fn create_account(&self, user_id: UserId, signup_grant: i64) -> Result<Account> {
        if signup_grant < 0 {
            return Err(BillingError::InvalidAmount(format!(
                "signup grant must not be negative, got {signup_grant}"
            ))
            .into());
        }

        let mut generator = self.lock()?;

        if self.get_account(&user_id)?.is_some() {
            return Err(StoreError::AccountAlreadyExists {
                user_id: user_id.to_string(),
            });
        }

        let mut account = Account::new(user_id);
        let mut batch = WriteBatch::default();

        if signup_grant > 0 {
            account.balance = signup_grant;
            account.lifetime_granted = signup_grant;

            let entry = LedgerEntry::signup_grant(user_id, signup_grant, account.balance)
                .with_id(Self::next_entry_id(&mut generator)?, account.created_at);
            self.put_entry(&mut batch, &entry)?;
        }

        self.put_account(&mut batch, &account)?;
        self.write(batch)?;

        tracing::debug!(user_id = %user_id, balance = account.balance, "Account created");
        Ok(account)
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let key = keys::account_key(user_id);

        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn post_credit(
        &self,
        user_id: &UserId,
        kind: CreditKind,
        amount: i64,
        note: String,
    ) -> Result<LedgerEntry> {
        if amount == 0 {
            return Err(BillingError::InvalidAmount("amount must not be zero".into()).into());
        }
        if kind == CreditKind::Purchase && amount < 0 {
            return Err(BillingError::InvalidAmount(format!(
                "purchase amount must be positive, got {amount}"
            ))
            .into());
        }

        let mut generator = self.lock()?;

        let mut account = self
            .get_account(user_id)?
            .ok_or_else(|| Self::account_not_found(user_id))?;

        let new_balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| BillingError::InvalidAmount("balance overflow".into()))?;
        if new_balance < 0 {
            return Err(StoreError::InsufficientFunds {
                required: -amount,
                available: account.balance,
            });
        }

        let now = Utc::now();
        account.balance = new_balance;
        account.updated_at = now;

        let entry = match kind {
            CreditKind::Purchase => {
                account.lifetime_purchased += amount;
                LedgerEntry::purchase(*user_id, amount, new_balance, note)
            }
            CreditKind::AdminAdjustment => {
                if amount > 0 {
                    account.lifetime_granted += amount;
                }
                LedgerEntry::admin_adjustment(*user_id, amount, new_balance, note)
            }
        }
        .with_id(Self::next_entry_id(&mut generator)?, now);

        let mut batch = WriteBatch::default();
        self.put_account(&mut batch, &account)?;
        self.put_entry(&mut batch, &entry)?;
        self.write(batch)?;

        tracing::debug!(
            user_id = %user_id,
            kind = entry.kind.as_str(),
            credits = amount,
            balance = new_balance,
            "Credits posted"
        );
        Ok(entry)
    }

    fn list_entries_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = self.scan_user_index(cf::LEDGER_BY_USER, user_id, true, offset, limit)?;

        let mut entries = Vec::with_capacity(rows.len());
        for (key, _) in rows {
            if let Some(entry_id) = keys::entry_id_from_user_key(&key) {
                if let Some(entry) = self.get_entry(&entry_id)? {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    fn ledger_for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>> {
        let rows =
            self.scan_user_index(cf::LEDGER_BY_USER, user_id, false, 0, usize::MAX)?;

        let mut entries = Vec::with_capacity(rows.len());
        for (key, _) in rows {
            let entry_id = keys::entry_id_from_user_key(&key)
                .ok_or_else(|| StoreError::Database("malformed ledger index key".into()))?;
            let entry = self.get_entry(&entry_id)?.ok_or_else(|| StoreError::NotFound {
                entity: "ledger entry",
                id: entry_id.to_string(),
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    // =========================================================================
    // Job Registry
    // =========================================================================

    fn get_job(&self, request_id: &RequestId) -> Result<Option<GenerationJob>> {
        let cf = self.cf(cf::JOBS)?;

        self.db
            .get_cf(&cf, keys::job_key(request_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_jobs_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<GenerationJob>> {
        let rows = self.scan_user_index(cf::JOBS_BY_USER, user_id, true, offset, limit)?;

        let mut jobs = Vec::with_capacity(rows.len());
        for (_, value) in rows {
            if let Some(request_id) = keys::request_id_from_value(&value) {
                if let Some(job) = self.get_job(&request_id)? {
                    jobs.push(job);
                }
            }
        }
        Ok(jobs)
    }

    fn list_open_jobs(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<GenerationJob>> {
        let cf = self.cf(cf::OPEN_JOBS)?;

        let mut jobs = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            if jobs.len() >= limit {
                break;
            }
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let Some(request_id) = keys::request_id_from_value(&value) else {
                continue;
            };
            let Some(job) = self.get_job(&request_id)? else {
                continue;
            };
            // Keyed by charge entry ULID, so admission order.
            if job.created_at >= created_before {
                break;
            }
            if !job.status.is_terminal() {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    fn admit_job(&self, new_job: NewJob) -> Result<Admission> {
        if new_job.credits <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "job price must be positive, got {}",
                new_job.credits
            ))
            .into());
        }

        let mut generator = self.lock()?;

        if let Some(existing) = self.get_job(&new_job.request_id)? {
            if existing.user_id != new_job.user_id {
                return Err(StoreError::RequestIdConflict {
                    request_id: new_job.request_id.to_string(),
                });
            }
            let balance = self
                .get_account(&existing.user_id)?
                .ok_or_else(|| Self::account_not_found(&existing.user_id))?
                .balance;
            tracing::debug!(request_id = %existing.request_id, "Admission replayed");
            return Ok(Admission::Replayed {
                job: existing,
                balance,
            });
        }

        let mut account = self
            .get_account(&new_job.user_id)?
            .ok_or_else(|| Self::account_not_found(&new_job.user_id))?;

        if !account.has_sufficient_credits(new_job.credits) {
            return Err(StoreError::InsufficientFunds {
                required: new_job.credits,
                available: account.balance,
            });
        }

        let now = Utc::now();
        let entry_id = Self::next_entry_id(&mut generator)?;

        account.balance -= new_job.credits;
        account.lifetime_charged += new_job.credits;
        account.updated_at = now;

        let job = GenerationJob::new(new_job, entry_id, now);
        let charge = LedgerEntry::job_charge(&job, account.balance).with_id(entry_id, now);

        let cf_jobs_by_user = self.cf(cf::JOBS_BY_USER)?;
        let cf_open = self.cf(cf::OPEN_JOBS)?;
        let request_key = keys::job_key(&job.request_id);

        // Write atomically
        let mut batch = WriteBatch::default();
        self.put_account(&mut batch, &account)?;
        self.put_entry(&mut batch, &charge)?;
        self.put_job(&mut batch, &job)?;
        batch.put_cf(
            &cf_jobs_by_user,
            keys::user_entry_key(&job.user_id, &entry_id),
            &request_key,
        );
        batch.put_cf(&cf_open, keys::entry_key(&entry_id), &request_key);
        self.write(batch)?;

        tracing::info!(
            user_id = %job.user_id,
            request_id = %job.request_id,
            model = %job.model,
            credits = job.credits_charged,
            balance = account.balance,
            "Job admitted"
        );

        Ok(Admission::Admitted {
            job,
            charge,
            balance: account.balance,
        })
    }

    fn mark_processing(
        &self,
        request_id: &RequestId,
        provider_task_id: String,
    ) -> Result<Option<GenerationJob>> {
        let _guard = self.lock()?;

        let Some(mut job) = self.get_job(request_id)? else {
            return Ok(None);
        };

        if job.mark_processing(provider_task_id) {
            let mut batch = WriteBatch::default();
            self.put_job(&mut batch, &job)?;
            self.write(batch)?;
            tracing::debug!(request_id = %request_id, "Job processing");
        }

        Ok(Some(job))
    }

    fn settle_job(
        &self,
        request_id: &RequestId,
        outcome: JobOutcome,
        source: SettlementSource,
    ) -> Result<Settlement> {
        let mut generator = self.lock()?;

        let Some(mut job) = self.get_job(request_id)? else {
            return Ok(Settlement::UnknownJob);
        };
        if job.status.is_terminal() {
            return Ok(Settlement::AlreadySettled(job));
        }

        let failed = matches!(outcome, JobOutcome::Failed { .. });
        let now = Utc::now();
        job.settle(outcome, source, now)?;

        let cf_open = self.cf(cf::OPEN_JOBS)?;
        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_open, keys::entry_key(&job.charge_entry_id));

        if !failed {
            self.put_job(&mut batch, &job)?;
            self.write(batch)?;
            tracing::info!(request_id = %request_id, ?source, "Job completed");
            return Ok(Settlement::Completed(job));
        }

        let mut account = self
            .get_account(&job.user_id)?
            .ok_or_else(|| Self::account_not_found(&job.user_id))?;

        let refund_amount = job.refund_amount();
        account.balance += refund_amount;
        account.lifetime_refunded += refund_amount;
        account.updated_at = now;

        let entry_id = Self::next_entry_id(&mut generator)?;
        job.refund_entry_id = Some(entry_id);
        let refund = LedgerEntry::job_refund(&job, account.balance).with_id(entry_id, now);

        self.put_account(&mut batch, &account)?;
        self.put_entry(&mut batch, &refund)?;
        self.put_job(&mut batch, &job)?;
        self.write(batch)?;

        tracing::info!(
            user_id = %job.user_id,
            request_id = %request_id,
            ?source,
            credits = refund_amount,
            balance = account.balance,
            "Job failed, charge refunded"
        );

        Ok(Settlement::Failed {
            job,
            refund,
            balance: account.balance,
        })
    }
}

//! Caller-suspension bridge: asynchronous commit dispatch.
//!
//! Callers may be thousands of lightweight sessions, each waiting on one
//! commit. The bridge decouples them from the coordinator's concurrency:
//!
//! - every commit runs as a unit of work on a bounded pool (a semaphore
//!   in front of `spawn_blocking`), never on the caller's task
//! - the caller gets a [`CommitHandle`] and suspends on it, via
//!   `wait().await`, `blocking_wait()` or an `on_complete` callback
//! - each dispatch is keyed by a [`DedupToken`]; redelivering a token with
//!   the identical request attaches to the original dispatch instead of
//!   running it again
//! - abandoning a handle (drop, timeout) never cancels the commit
//!
//! A redelivered token only shares a dispatch when the request fingerprint
//! matches. Any other request under that token goes through the coordinator
//! on its own, so signature checks and duplicate detection always run.
//!
//! Final results are retained for the last `dedup_cache_size` tokens, oldest
//! evicted first. Retryable failures (closed time window, storage or worker
//! errors) are dropped as soon as they are delivered, so a redelivery runs
//! the commit again. A redelivery after eviction also runs it again, which
//! the uniqueness service answers as an idempotent retry.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Duration,
};

use notary_ledger::ConsumptionLedger;
use notary_types::{
    Attestation, CommitRequest, DedupToken, NotaryConfig, NotaryError, Result, TxId,
};
use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::{Semaphore, watch},
};

use crate::{coordinator::CommitCoordinator, signature::RequestVerifier};

type CommitResult = Result<Attestation>;
type ResultCell = watch::Receiver<Option<CommitResult>>;

/// One cached dispatch.
struct Dispatch {
    /// Distinguishes successive dispatches under the same token.
    seq: u64,
    tx_id: TxId,
    fingerprint: [u8; 32],
    cell: ResultCell,
}

impl Dispatch {
    /// Finished with an error that a later attempt could turn into success.
    fn settled_retryable(&self) -> bool {
        matches!(&*self.cell.borrow(), Some(Err(e)) if e.is_retryable())
    }
}

/// Bounded token → dispatch cache with oldest-first eviction.
struct DedupCache {
    slots: HashMap<DedupToken, Dispatch>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<DedupToken>,
    max_size: usize,
    next_seq: u64,
}

impl DedupCache {
    fn new(max_size: usize) -> Self {
        Self {
            slots: HashMap::new(),
            order: VecDeque::new(),
            max_size,
            next_seq: 0,
        }
    }

    fn get(&self, token: &DedupToken) -> Option<&Dispatch> {
        self.slots.get(token)
    }

    /// Cache a new dispatch under `token`, replacing any previous one.
    fn insert(
        &mut self,
        token: DedupToken,
        tx_id: TxId,
        fingerprint: [u8; 32],
        cell: ResultCell,
    ) -> u64 {
        self.forget(&token);
        while self.slots.len() >= self.max_size {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.slots.remove(&oldest);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(
            token,
            Dispatch {
                seq,
                tx_id,
                fingerprint,
                cell,
            },
        );
        self.order.push_back(token);
        seq
    }

    /// Drop the dispatch `seq` under `token`, unless it was already replaced.
    fn remove(&mut self, token: &DedupToken, seq: u64) {
        if self.slots.get(token).is_some_and(|d| d.seq == seq) {
            self.forget(token);
        }
    }

    fn forget(&mut self, token: &DedupToken) {
        if self.slots.remove(token).is_some() {
            self.order.retain(|t| t != token);
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Dispatches commits onto a bounded worker pool and hands out awaitable
/// handles.
pub struct CommitBridge<L, V> {
    coordinator: Arc<CommitCoordinator<L, V>>,
    runtime: Handle,
    permits: Arc<Semaphore>,
    dispatches: Arc<Mutex<DedupCache>>,
}

impl<L, V> CommitBridge<L, V>
where
    L: ConsumptionLedger + 'static,
    V: RequestVerifier + 'static,
{
    /// Bridge over `coordinator`, spawning onto `runtime`.
    ///
    /// # Errors
    /// Returns `Configuration` if `config` is invalid.
    pub fn new(
        coordinator: Arc<CommitCoordinator<L, V>>,
        runtime: Handle,
        config: &NotaryConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            coordinator,
            runtime,
            permits: Arc::new(Semaphore::new(config.max_concurrent_commits)),
            dispatches: Arc::new(Mutex::new(DedupCache::new(config.dedup_cache_size))),
        })
    }

    /// Dispatch `request` under `token`.
    ///
    /// If `token` already carries the identical request, the returned handle
    /// observes that dispatch and nothing runs twice. A different request
    /// for the same transaction is committed on its own and never sees the
    /// cached result.
    ///
    /// # Errors
    /// Returns `DedupTokenReused` if `token` is bound to another transaction.
    pub fn submit(&self, token: DedupToken, request: CommitRequest) -> Result<CommitHandle> {
        let tx_id = request.tx_id;
        let fingerprint = request.fingerprint();
        let mut dispatches = self.dispatches.lock();

        if let Some(existing) = dispatches.get(&token) {
            if existing.tx_id != tx_id {
                tracing::warn!(
                    token = %token,
                    tx_id = %tx_id,
                    bound_to = %existing.tx_id,
                    "Dedup token reused"
                );
                return Err(NotaryError::DedupTokenReused {
                    token,
                    bound_to: existing.tx_id,
                });
            }
            if existing.fingerprint != fingerprint {
                drop(dispatches);
                tracing::warn!(
                    token = %token,
                    tx_id = %tx_id,
                    "Redelivered token carries a different request; committing it uncached"
                );
                let (sender, cell) = watch::channel(None);
                self.spawn_commit(request, sender, None);
                return Ok(self.handle(token, tx_id, cell));
            }
            if !existing.settled_retryable() {
                tracing::debug!(
                    token = %token,
                    tx_id = %tx_id,
                    "Redelivered token attached to existing dispatch"
                );
                return Ok(self.handle(token, tx_id, existing.cell.clone()));
            }
        }

        let (sender, cell) = watch::channel(None);
        let seq = dispatches.insert(token, tx_id, fingerprint, cell.clone());
        drop(dispatches);

        self.spawn_commit(request, sender, Some((token, seq)));
        tracing::debug!(token = %token, tx_id = %tx_id, "Commit dispatched");
        Ok(self.handle(token, tx_id, cell))
    }

    /// Dispatch under the token derived from the request itself, so a
    /// caller that crashed and resumed redelivers automatically.
    ///
    /// # Errors
    /// Returns `DedupTokenReused` on a token collision.
    pub fn submit_request(&self, request: CommitRequest) -> Result<CommitHandle> {
        let token = DedupToken::for_request(&request.tx_id, &request.requester);
        self.submit(token, request)
    }

    /// Number of tokens whose results are retained.
    #[must_use]
    pub fn retained_tokens(&self) -> usize {
        self.dispatches.lock().len()
    }

    /// Commits that could start right now without queueing.
    #[must_use]
    pub fn idle_workers(&self) -> usize {
        self.permits.available_permits()
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<CommitCoordinator<L, V>> {
        &self.coordinator
    }

    /// Run the commit on the worker pool and publish its result. A cached
    /// dispatch (`slot`) whose result is retryable is dropped from the cache
    /// before the result becomes visible.
    fn spawn_commit(
        &self,
        request: CommitRequest,
        sender: watch::Sender<Option<CommitResult>>,
        slot: Option<(DedupToken, u64)>,
    ) {
        let coordinator = Arc::clone(&self.coordinator);
        let permits = Arc::clone(&self.permits);
        let dispatches = Arc::clone(&self.dispatches);
        self.runtime.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => {
                    tokio::task::spawn_blocking(move || coordinator.commit_input_states(&request))
                        .await
                        .unwrap_or_else(|e| Err(NotaryError::WorkerLost(e.to_string())))
                }
                Err(e) => Err(NotaryError::WorkerLost(e.to_string())),
            };
            if let (Some((token, seq)), Err(e)) = (slot, &result) {
                if e.is_retryable() {
                    tracing::debug!(token = %token, error = %e, "Retryable result not retained");
                    dispatches.lock().remove(&token, seq);
                }
            }
            sender.send_replace(Some(result));
        });
    }

    fn handle(&self, token: DedupToken, tx_id: TxId, cell: ResultCell) -> CommitHandle {
        CommitHandle {
            token,
            tx_id,
            cell,
            runtime: self.runtime.clone(),
        }
    }
}

/// A caller's claim on one dispatched commit.
///
/// Dropping it abandons the wait, not the commit.
pub struct CommitHandle {
    token: DedupToken,
    tx_id: TxId,
    cell: ResultCell,
    runtime: Handle,
}

impl CommitHandle {
    #[must_use]
    pub fn token(&self) -> DedupToken {
        self.token
    }

    #[must_use]
    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    /// The result, if the commit already finished.
    #[must_use]
    pub fn try_result(&self) -> Option<CommitResult> {
        self.cell.borrow().clone()
    }

    /// Suspend until the commit finishes.
    ///
    /// # Errors
    /// The commit's own error, or `WorkerLost` if the worker died.
    pub async fn wait(mut self) -> CommitResult {
        let tx_id = self.tx_id;
        match self.cell.wait_for(Option::is_some).await {
            Ok(result) => result
                .clone()
                .unwrap_or_else(|| Err(NotaryError::WorkerLost(format!("no result for {tx_id}")))),
            Err(_) => Err(NotaryError::WorkerLost(format!(
                "dispatch for {tx_id} dropped without a result"
            ))),
        }
    }

    /// Like [`wait`](Self::wait), but give up after `limit`. The commit keeps
    /// running; a later redelivery of the same token sees its result.
    ///
    /// # Errors
    /// `CommitTimedOut` once `limit` elapses, otherwise as for `wait`.
    pub async fn wait_timeout(self, limit: Duration) -> CommitResult {
        let tx_id = self.tx_id;
        tokio::time::timeout(limit, self.wait()).await.unwrap_or_else(|_| {
            Err(NotaryError::CommitTimedOut {
                tx_id,
                waited_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })
        })
    }

    /// Block the current OS thread until the commit finishes.
    ///
    /// # Errors
    /// As for [`wait`](Self::wait).
    ///
    /// # Panics
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_wait(self) -> CommitResult {
        let runtime = self.runtime.clone();
        runtime.block_on(self.wait())
    }

    /// Run `callback` with the result once the commit finishes.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(CommitResult) + Send + 'static,
    {
        let runtime = self.runtime.clone();
        runtime.spawn(async move { callback(self.wait().await) });
    }
}

impl std::fmt::Debug for CommitHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitHandle")
            .field("token", &self.token)
            .field("tx_id", &self.tx_id)
            .finish_non_exhaustive()
    }
}

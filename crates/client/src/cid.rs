//! One-time push identifiers (CIDs), fetched in batches and cached.
//!
//! Each class (immediate / scheduled) has its own buffer. A buffer is
//! refilled wholesale when it runs empty or when its batch has outlived the
//! validity window; leftover identifiers of a stale batch are discarded.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use pushgate_core::CidKind;

use crate::api::ProviderApi;
use crate::context::RequestContext;
use crate::error::PushError;

/// How long the provider honors a fetched batch.
pub const DEFAULT_CID_VALIDITY: Duration = Duration::from_secs(23 * 60 * 60);

/// Where CID batches come from.
pub trait CidSource: Send + Sync {
    fn fetch_cids(
        &self,
        ctx: &RequestContext,
        kind: CidKind,
        count: usize,
    ) -> Result<Vec<String>, PushError>;
}

impl CidSource for ProviderApi {
    fn fetch_cids(
        &self,
        ctx: &RequestContext,
        kind: CidKind,
        count: usize,
    ) -> Result<Vec<String>, PushError> {
        ProviderApi::fetch_cids(self, ctx, kind, count)
    }
}

#[derive(Debug, Default)]
struct Buffer {
    cids: VecDeque<String>,
    fetched_at: Option<Instant>,
}

impl Buffer {
    fn take_fresh(&mut self, validity: Duration) -> Option<String> {
        match self.fetched_at {
            Some(fetched_at) if fetched_at.elapsed() < validity => self.cids.pop_front(),
            _ => None,
        }
    }
}

/// Cache of unused CIDs for one class.
///
/// The lock is held across the refill so concurrent callers never fetch
/// twice for the same empty buffer.
pub struct CidCache {
    kind: CidKind,
    source: Arc<dyn CidSource>,
    batch_size: usize,
    validity: Duration,
    buffer: Mutex<Buffer>,
}

impl CidCache {
    pub fn new(kind: CidKind, source: Arc<dyn CidSource>, batch_size: usize) -> Self {
        Self {
            kind,
            source,
            batch_size: batch_size.max(1),
            validity: DEFAULT_CID_VALIDITY,
            buffer: Mutex::new(Buffer::default()),
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    pub fn kind(&self) -> CidKind {
        self.kind
    }

    /// Hand out an unused CID, fetching a new batch when needed.
    ///
    /// Fetch errors are returned unchanged; an empty batch is `NoCid`.
    pub fn get(&self, ctx: &RequestContext) -> Result<String, PushError> {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(cid) = buffer.take_fresh(self.validity) {
            return Ok(cid);
        }

        debug!(kind = %self.kind, count = self.batch_size, "fetching cid batch");
        let mut batch: VecDeque<String> = self
            .source
            .fetch_cids(ctx, self.kind, self.batch_size)?
            .into_iter()
            .filter(|cid| !cid.is_empty())
            .collect();

        let Some(first) = batch.pop_front() else {
            return Err(PushError::NoCid);
        };

        debug!(kind = %self.kind, cached = batch.len(), "cid batch stored");
        buffer.cids = batch;
        buffer.fetched_at = Some(Instant::now());
        Ok(first)
    }

    /// Unused CIDs left in the current batch, stale or not.
    pub fn remaining(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cids
            .len()
    }
}

/// Caches for both CID classes.
pub struct CidClient {
    immediate: CidCache,
    scheduled: CidCache,
}

impl CidClient {
    pub fn new(source: Arc<dyn CidSource>, batch_size: usize, validity: Duration) -> Self {
        Self {
            immediate: CidCache::new(CidKind::Immediate, source.clone(), batch_size)
                .with_validity(validity),
            scheduled: CidCache::new(CidKind::Scheduled, source, batch_size)
                .with_validity(validity),
        }
    }

    pub fn cache(&self, kind: CidKind) -> &CidCache {
        match kind {
            CidKind::Immediate => &self.immediate,
            CidKind::Scheduled => &self.scheduled,
        }
    }

    pub fn get(&self, ctx: &RequestContext, kind: CidKind) -> Result<String, PushError> {
        self.cache(kind).get(ctx)
    }

    /// CID for an immediate push.
    pub fn push_id(&self, ctx: &RequestContext) -> Result<String, PushError> {
        self.immediate.get(ctx)
    }

    /// CID for a scheduled push.
    pub fn schedule_id(&self, ctx: &RequestContext) -> Result<String, PushError> {
        self.scheduled.get(ctx)
    }
}

//! Drives blocks from a source through the committer, one at a time.

use crate::commit::{CommitError, CommitSummary, Committer};
use crate::config::IngestConfig;
use crate::source::{BlockSource, SourceError};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use utxoshard_core::Hash;
use utxoshard_storage::{ShardPersistence, StorageError, UtxoSet};

/// Errors that stop the sequencer.
#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("commit error: {0}")]
    Commit(#[from] CommitError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, SequencerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Running,
    Closed,
}

/// Outcome of one [`Sequencer::cycle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    Committed(CommitSummary),
    EndOfRange,
    Closed,
}

/// The most recently committed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestBlock {
    pub height: u32,
    pub blockhash: Hash,
    pub tx_count: usize,
}

/// Why [`Sequencer::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfRange,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub blocks: u64,
    pub transactions: u64,
    pub checkpoints: u32,
    pub stop: StopReason,
    pub elapsed: Duration,
}

/// Requests a sequencer to stop. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CloseHandle(Arc<AtomicBool>);

impl CloseHandle {
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Inner<S> {
    source: S,
    set: UtxoSet,
    since_checkpoint: u32,
    checkpoints: u32,
}

/// Pulls blocks in height order and commits each before fetching the next.
pub struct Sequencer<S: BlockSource> {
    inner: Mutex<Inner<S>>,
    committer: Committer,
    persistence: Option<Box<dyn ShardPersistence>>,
    latest: RwLock<Option<LatestBlock>>,
    closed: CloseHandle,
    checkpoint_every: u32,
    progress_every: u32,
}

impl<S: BlockSource> Sequencer<S> {
    pub fn new(source: S, set: UtxoSet, committer: Committer) -> Self {
        let defaults = IngestConfig::default();
        let latest = set.tip().map(|tip| LatestBlock {
            height: tip.height,
            blockhash: tip.blockhash,
            tx_count: 0,
        });
        Self {
            inner: Mutex::new(Inner {
                source,
                set,
                since_checkpoint: 0,
                checkpoints: 0,
            }),
            committer,
            persistence: None,
            latest: RwLock::new(latest),
            closed: CloseHandle::default(),
            checkpoint_every: defaults.checkpoint_every,
            progress_every: defaults.progress_every,
        }
    }

    /// A sequencer whose committer and intervals come from `config`.
    pub fn from_config(source: S, set: UtxoSet, config: &IngestConfig) -> Result<Self> {
        let committer = Committer::from_config(config)?;
        let mut sequencer = Self::new(source, set, committer);
        sequencer.checkpoint_every = config.checkpoint_every;
        sequencer.progress_every = config.progress_every;
        Ok(sequencer)
    }

    /// Checkpoint the set to `persistence` as blocks are committed.
    pub fn with_persistence(mut self, persistence: Box<dyn ShardPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn state(&self) -> SequencerState {
        if self.closed.is_closed() {
            SequencerState::Closed
        } else {
            SequencerState::Running
        }
    }

    pub fn close_handle(&self) -> CloseHandle {
        self.closed.clone()
    }

    /// Stop after the cycle in flight. Idempotent.
    pub fn close(&self) {
        if !self.closed.is_closed() {
            tracing::info!("sequencer closing");
        }
        self.closed.close();
    }

    pub fn latest(&self) -> Option<LatestBlock> {
        *self.latest.read()
    }

    /// Run `f` against the set between cycles.
    pub fn with_set<T>(&self, f: impl FnOnce(&UtxoSet) -> T) -> T {
        f(&self.inner.lock().set)
    }

    pub fn into_set(self) -> UtxoSet {
        self.inner.into_inner().set
    }

    /// Commit the next block, if there is one.
    pub fn cycle(&self) -> Result<Cycle> {
        if self.closed.is_closed() {
            return Ok(Cycle::Closed);
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let block = match inner.source.next_block()? {
            Some(block) => block,
            None => return Ok(Cycle::EndOfRange),
        };
        let summary = self.committer.commit(&mut inner.set, &block)?;

        *self.latest.write() = Some(LatestBlock {
            height: summary.height,
            blockhash: summary.blockhash,
            tx_count: summary.tx_count,
        });
        tracing::debug!(
            height = summary.height,
            txs = summary.tx_count,
            spent = summary.spent_outputs,
            created = summary.created_outputs,
            shards = summary.shards_touched,
            elapsed_us = summary.elapsed.as_micros() as u64,
            "block committed"
        );
        if self.progress_every > 0 && summary.height % self.progress_every == 0 {
            let totals = inner.set.totals();
            tracing::info!(
                height = summary.height,
                blockhash = %summary.blockhash,
                entries = totals.entries,
                outputs = totals.outputs,
                "progress"
            );
        }

        inner.since_checkpoint += 1;
        if self.checkpoint_every > 0 && inner.since_checkpoint >= self.checkpoint_every {
            self.checkpoint(inner)?;
        }
        Ok(Cycle::Committed(summary))
    }

    /// Cycle until the source is exhausted or the sequencer is closed, then
    /// checkpoint once more if anything was committed since the last one.
    pub fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        let mut blocks = 0u64;
        let mut transactions = 0u64;
        let stop = loop {
            match self.cycle()? {
                Cycle::Committed(summary) => {
                    blocks += 1;
                    transactions += summary.tx_count as u64;
                }
                Cycle::EndOfRange => break StopReason::EndOfRange,
                Cycle::Closed => break StopReason::Closed,
            }
        };

        let mut guard = self.inner.lock();
        if guard.since_checkpoint > 0 {
            self.checkpoint(&mut guard)?;
        }
        let report = RunReport {
            blocks,
            transactions,
            checkpoints: guard.checkpoints,
            stop,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            blocks,
            transactions,
            stop = ?report.stop,
            height = ?guard.set.best_height(),
            "run finished"
        );
        Ok(report)
    }

    fn checkpoint(&self, inner: &mut Inner<S>) -> Result<()> {
        if let Some(persistence) = &self.persistence {
            persistence.save_set(&inner.set)?;
            inner.checkpoints += 1;
            tracing::info!(height = ?inner.set.best_height(), "checkpoint written");
        }
        inner.since_checkpoint = 0;
        Ok(())
    }
}

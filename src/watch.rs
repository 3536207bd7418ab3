//! Re-running the sync when the local library changes.
//!
//! A [`Trigger`] is an external event source; [`run_with_trigger`] performs
//! one pass and then another for every event the trigger yields, until the
//! source closes. Without a trigger it performs exactly one pass, which is
//! what the shipped binary does.
//!
//! Passes never overlap: the next event is only awaited after the previous
//! pass finished.

use crate::error::SyncError;
use crate::sync::SyncPipeline;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Source of "library changed" events.
#[async_trait]
pub trait Trigger: Send {
    /// Wait for the next change. Returns `false` once the source is closed.
    async fn changed(&mut self) -> bool;
}

/// Trigger fed through a tokio channel; whoever holds the sender decides
/// when a new pass is due.
pub struct ChannelTrigger {
    rx: mpsc::Receiver<()>,
}

impl ChannelTrigger {
    pub fn new(buffer: usize) -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl Trigger for ChannelTrigger {
    async fn changed(&mut self) -> bool {
        let Some(()) = self.rx.recv().await else {
            return false;
        };
        // Coalesce a burst of events into one pass.
        while self.rx.try_recv().is_ok() {}
        true
    }
}

/// Run once, then once more per trigger event. Returns the number of passes.
pub async fn run_with_trigger(
    pipeline: &SyncPipeline,
    trigger: Option<&mut dyn Trigger>,
) -> Result<usize, SyncError> {
    pipeline.run_once().await?;
    let mut passes = 1;

    let Some(trigger) = trigger else {
        warn!("File watcher is disabled");
        return Ok(passes);
    };

    info!(
        "Watching {} for changes",
        pipeline.config().zotero.zotero_directory.display()
    );
    while trigger.changed().await {
        info!("File changes detected");
        pipeline.run_once().await?;
        passes += 1;
    }
    info!("Change source closed after {} passes", passes);
    Ok(passes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_trigger_closes_when_sender_dropped() {
        let (tx, mut trigger) = ChannelTrigger::new(4);
        tx.send(()).await.unwrap();
        drop(tx);
        assert!(trigger.changed().await);
        assert!(!trigger.changed().await);
    }

    #[tokio::test]
    async fn bursts_are_coalesced() {
        let (tx, mut trigger) = ChannelTrigger::new(8);
        for _ in 0..5 {
            tx.send(()).await.unwrap();
        }
        drop(tx);
        assert!(trigger.changed().await);
        assert!(!trigger.changed().await);
    }
}

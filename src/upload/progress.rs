//! Upload progress relay
//!
//! While a push runs, the registry side produces [`Update`]s on a channel with
//! a single slot. One relay task consumes them and owns the progress bar; the
//! pushing task never touches the bar once the relay is spawned.

use crate::registry::progress::ProgressSink;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the update channel
const UPDATE_CHANNEL_CAPACITY: usize = 1;

/// Progress of a push: cumulative bytes written out of `total`, or a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Progress { complete: u64, total: u64 },
    Error(String),
}

/// How the relay task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Cumulative progress reached the total; the bar was finished
    Completed,
    /// An error update arrived; the bar was abandoned
    Aborted,
    /// The producer hung up before completion; the bar was abandoned
    Disconnected,
}

/// Spawn the relay task driving `bar`, returning the producer side
pub fn spawn_progress_relay<B>(bar: B) -> (mpsc::Sender<Update>, JoinHandle<RelayOutcome>)
where
    B: ProgressSink + 'static,
{
    let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
    let handle = tokio::spawn(relay_progress(rx, bar));
    (tx, handle)
}

/// Consume updates until completion, error or hang-up
pub async fn relay_progress<B: ProgressSink>(
    mut updates: mpsc::Receiver<Update>,
    bar: B,
) -> RelayOutcome {
    let mut total = 0u64;
    let mut so_far = 0u64;

    while let Some(update) = updates.recv().await {
        match update {
            Update::Error(_) => {
                bar.abort();
                return RelayOutcome::Aborted;
            }
            Update::Progress {
                complete,
                total: declared,
            } => {
                // Multi-blob pushes may revise the total mid-transfer.
                if declared != total {
                    bar.init(declared);
                    total = declared;
                }
                bar.incr_by(complete.saturating_sub(so_far));
                so_far = complete;
                if so_far >= total {
                    bar.finish();
                    return RelayOutcome::Completed;
                }
            }
        }
    }

    bar.abort();
    RelayOutcome::Disconnected
}

//! Async flush driver.
//!
//! Ticks a shared [`Debugger`] on a fixed period until told to stop:
//!
//! ```rust,ignore
//! let (stop, shutdown) = tokio::sync::watch::channel(false);
//! let period = Duration::from_millis(16);
//! let task = tokio::spawn(driver::run(Arc::clone(&debugger), period, shutdown));
//! // ...
//! stop.send(true)?;
//! task.await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::debugger::Debugger;
use crate::transport::Transport;

/// Tick `debugger` every `period` until `shutdown` turns `true` or its sender
/// is dropped. Missed ticks are skipped rather than bunched up.
pub async fn run<T>(
    debugger: Arc<Mutex<Debugger<T>>>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    T: Transport + Send + 'static,
{
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            instant = ticker.tick() => {
                debugger.lock().tick(instant.into_std());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("debugger driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DebuggerConfig;
    use crate::graph::{Owner, OwnerTraits};
    use crate::protocol::OutputMessage;
    use crate::transport::ChannelTransport;

    #[tokio::test(start_paused = true)]
    async fn driver_flushes_structure_and_stops() {
        let (transport, mut rx) = ChannelTransport::channel();
        let debugger = Arc::new(Mutex::new(Debugger::new(DebuggerConfig::default(), transport)));
        let root = Owner::root(None);
        root.create_child(OwnerTraits::computation(), Some("child"));
        let root_id = debugger
            .lock()
            .register_root(&root, time::Instant::now().into_std())
            .unwrap();

        let (stop, shutdown) = watch::channel(false);
        let task = tokio::spawn(run(Arc::clone(&debugger), Duration::from_millis(16), shutdown));

        time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());

        time::sleep(Duration::from_millis(100)).await;
        match rx.recv().await {
            Some(OutputMessage::StructureUpdates(updates)) => {
                assert_eq!(updates.updated[0].id, root_id);
            }
            other => panic!("unexpected message {other:?}"),
        }

        stop.send(true).unwrap();
        task.await.unwrap();
    }
}

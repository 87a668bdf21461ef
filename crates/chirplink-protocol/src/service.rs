//! Async shell for the receive side.
//!
//! One cooperative task owns the [`Receiver`]: it waits for the next
//! decoded frame or the earliest session deadline, whichever comes first,
//! and forwards events to the caller over a channel in arrival order. No
//! lock is held across a suspension point because nothing is shared: the
//! task owns the whole session map.

use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant as TokioInstant};

use crate::events::ReceiverEvent;
use crate::receiver::{Receiver, ReceiverConfig};

/// Spawn the receive loop.
///
/// `frames` carries decoded ASCII frames from the acoustic layer; closing
/// it stops the task. Events arrive on the returned channel; dropping that
/// receiver also stops the task at its next event.
pub fn spawn_receive(
    mut frames: mpsc::Receiver<String>,
    config: ReceiverConfig,
) -> (JoinHandle<()>, mpsc::Receiver<ReceiverEvent>) {
    let (events_tx, events_rx) = mpsc::channel(64);

    let handle = tokio::spawn(async move {
        let mut receiver = Receiver::new(config);
        loop {
            let deadline = receiver.next_deadline().map(TokioInstant::from_std);
            tokio::select! {
                frame = frames.recv() => {
                    let Some(frame) = frame else { return };
                    for event in receiver.handle_frame(&frame, Instant::now()) {
                        if events_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                _ = wait_until(deadline) => {
                    for event in receiver.poll_timeouts(Instant::now()) {
                        if events_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });

    (handle, events_rx)
}

async fn wait_until(deadline: Option<TokioInstant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

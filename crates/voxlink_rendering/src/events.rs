//! # Bridge Event Feed
//!
//! Non-blocking notifications from the hook to debug tooling (overlays,
//! status commands, tests).
//!
//! ```text
//! ┌─────────────┐  try_send   ┌──────────────┐  drain   ┌─────────────┐
//! │ PipelineHook│ ──────────► │   bounded    │ ───────► │  consumer   │
//! │ render/tick │             │   channel    │          │  (optional) │
//! └─────────────┘             └──────────────┘          └─────────────┘
//! ```
//!
//! Publishing never blocks the render thread. A full channel drops the
//! event and counts the drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use voxlink_core::{CellCoord, StructureId};

/// Default channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Things that happened inside the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A cell's artifact was computed and cached.
    ArtifactComputed {
        /// Owning structure.
        structure: StructureId,
        /// Cell.
        cell: CellCoord,
        /// Number of boxes produced.
        boxes: usize,
    },

    /// A cell's computation failed; it stays a placeholder.
    CellFailed {
        /// Owning structure.
        structure: StructureId,
        /// Cell.
        cell: CellCoord,
        /// Short error label.
        reason: &'static str,
    },

    /// A structure's cache entries were dropped.
    StructureInvalidated {
        /// The structure.
        structure: StructureId,
        /// Cells removed.
        cells: usize,
    },

    /// The host failed to enumerate structures; the frame was skipped.
    FrameAbandoned,
}

/// Bounded event channel.
pub struct BridgeEventBus {
    sender: Sender<BridgeEvent>,
    receiver: Receiver<BridgeEvent>,
    dropped: Arc<AtomicU64>,
}

impl BridgeEventBus {
    /// Creates a bus holding at most `capacity` undelivered events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A producer handle.
    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// A consumer handle. Consumers share one queue.
    #[must_use]
    pub fn receiver(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Events dropped because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for BridgeEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for BridgeEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeEventBus")
            .field("pending", &self.receiver.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Handle for publishing events.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: Sender<BridgeEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// Publishes without blocking. Returns false if the event was dropped.
    #[inline]
    pub fn send(&self, event: BridgeEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Handle for consuming events.
#[derive(Clone, Debug)]
pub struct EventReceiver {
    receiver: Receiver<BridgeEvent>,
}

impl EventReceiver {
    /// Takes every pending event.
    #[inline]
    pub fn drain(&self) -> Vec<BridgeEvent> {
        self.receiver.try_iter().collect()
    }

    /// Takes one event, if any.
    #[inline]
    pub fn try_recv(&self) -> Option<BridgeEvent> {
        self.receiver.try_recv().ok()
    }

    /// Number of pending events.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_drain() {
        let bus = BridgeEventBus::new(8);
        let tx = bus.sender();
        let rx = bus.receiver();
        assert!(tx.send(BridgeEvent::FrameAbandoned));
        assert!(tx.send(BridgeEvent::StructureInvalidated {
            structure: StructureId(3),
            cells: 2,
        }));
        assert_eq!(rx.pending_count(), 2);
        let events = rx.drain();
        assert_eq!(events[0], BridgeEvent::FrameAbandoned);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let bus = BridgeEventBus::new(1);
        let tx = bus.sender();
        assert!(tx.send(BridgeEvent::FrameAbandoned));
        assert!(!tx.send(BridgeEvent::FrameAbandoned));
        assert_eq!(bus.dropped(), 1);
    }
}

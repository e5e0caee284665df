//! Dispatch queue — the boundary between the network context and the
//! control thread.
//!
//! Producers (the MQTT callback task, one push per inbound message) call
//! [`DispatchQueue::enqueue`]; the control loop is the single consumer and
//! calls [`DispatchQueue::drain`] once per tick.
//!
//! ```text
//! ┌──────────────┐            ┌──────────────┐            ┌──────────────┐
//! │ MQTT task    │──enqueue──▶│ DispatchQueue│───drain───▶│ Control loop │
//! │ (callbacks)  │            │  (FIFO, MPSC)│            │ (sole writer)│
//! └──────────────┘            └──────────────┘            └──────────────┘
//! ```
//!
//! The queue is an explicitly constructed value, shared through an `Arc`,
//! so a test can build as many independent queues as it likes.
//!
//! Capacity is fixed at compile time.  A full queue rejects the new action
//! with [`DispatchError::Full`] instead of growing without bound while the
//! control loop is stalled.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::error::DispatchError;

/// Default number of pending actions the queue can hold.
pub const DISPATCH_DEPTH: usize = 64;

/// Multi-producer, single-consumer FIFO of deferred work.
pub struct DispatchQueue<T, const N: usize = DISPATCH_DEPTH> {
    channel: Channel<CriticalSectionRawMutex, T, N>,
}

impl<T, const N: usize> DispatchQueue<T, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Push an item from any context.  Never blocks.
    pub fn enqueue(&self, item: T) -> Result<(), DispatchError> {
        self.channel
            .try_send(item)
            .map_err(|_| DispatchError::Full)
    }

    /// Hand every item that was pending when the call started to `handler`,
    /// oldest first.  Returns how many items were handled.
    ///
    /// Items pushed while the drain is running are left for the next tick so
    /// a producer flood cannot starve the rest of the control loop.
    pub fn drain(&self, mut handler: impl FnMut(T)) -> usize {
        let budget = self.channel.len();
        let mut handled = 0;
        while handled < budget {
            let Ok(item) = self.channel.try_receive() else {
                break;
            };
            handler(item);
            handled += 1;
        }
        handled
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for DispatchQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

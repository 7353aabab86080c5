use std::collections::VecDeque;

use leptos::prelude::*;

/// Host-to-widget message channel.
///
/// The host creates a queue, passes it to the component and calls
/// [`send`](Self::send). A mounted widget drains the queue from an effect;
/// commands sent before the map has a size wait until it does.
pub struct CommandQueue<C: Send + Sync + 'static> {
    pending: RwSignal<VecDeque<C>>,
}

impl<C: Send + Sync + 'static> Clone for CommandQueue<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: Send + Sync + 'static> Copy for CommandQueue<C> {}

impl<C: Send + Sync + 'static> Default for CommandQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Send + Sync + 'static> CommandQueue<C> {
    pub fn new() -> Self {
        Self {
            pending: RwSignal::new(VecDeque::new()),
        }
    }

    pub fn send(&self, command: C) {
        self.pending.update(|queue| queue.push_back(command));
    }

    /// Subscribe the running effect to new commands.
    pub(crate) fn track(&self) {
        self.pending.track();
    }

    /// Take everything queued without waking subscribers again.
    pub(crate) fn take_pending(&self) -> VecDeque<C> {
        self.pending
            .try_update_untracked(std::mem::take)
            .unwrap_or_default()
    }
}

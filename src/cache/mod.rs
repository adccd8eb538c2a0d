//! Message caches
//!
//! Every worker owns two [`IncomingCache`]s. The write cache receives the
//! messages sent during superstep N, from local vertices through
//! [`IncomingCache::set_direct`] and from other workers through
//! [`IncomingCache::parse_messages`]. The read cache holds the messages sent
//! during superstep N-1 and is only read by the compute pass. At the barrier
//! the read cache is cleared and swapped with the write cache.
//!
//! [`OutgoingCache`] is the per-superstep send buffer of a worker.

mod incoming;
mod outgoing;

pub use incoming::IncomingCache;
pub use outgoing::OutgoingCache;

use std::slice;

/// Iterator over the messages delivered to one vertex
///
/// Array mode yields messages in insertion order, combining mode yields at
/// most one message. An unknown vertex yields nothing.
#[derive(Debug, Clone)]
pub struct MessageIterator<'a, M> {
    inner: slice::Iter<'a, M>,
}

impl<'a, M> MessageIterator<'a, M> {
    pub(crate) fn new(messages: &'a [M]) -> Self {
        Self {
            inner: messages.iter(),
        }
    }

    /// Iterator over no messages
    pub fn empty() -> Self {
        Self::new(&[])
    }
}

impl<'a, M> Iterator for MessageIterator<'a, M> {
    type Item = &'a M;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<M> ExactSizeIterator for MessageIterator<'_, M> {}

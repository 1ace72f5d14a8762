// ── Reactive entity streams ──
//
// Subscription types for consuming presented-entity changes from the
// registry.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// A subscription to a collection of presented entities.
///
/// Provides point-in-time snapshot access and change notification via
/// [`changed`](Self::changed) or by converting to a `Stream`.
pub struct EntityStream<T: Clone + Send + Sync + 'static> {
    current: Arc<Vec<Arc<T>>>,
    receiver: watch::Receiver<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Arc<Vec<Arc<T>>>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Arc<Vec<Arc<T>>> {
        &self.current
    }

    /// The latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Arc<Vec<Arc<T>>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` once the registry is dropped.
    pub async fn changed(&mut self) -> Option<Arc<Vec<Arc<T>>>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> EntityWatchStream<T> {
        EntityWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
///
/// Yields the current snapshot first, then a new one after every mutation.
pub struct EntityWatchStream<T: Clone + Send + Sync + 'static> {
    inner: WatchStream<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Stream for EntityWatchStream<T> {
    type Item = Arc<Vec<Arc<T>>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    fn items(values: &[u32]) -> Arc<Vec<Arc<u32>>> {
        Arc::new(values.iter().copied().map(Arc::new).collect())
    }

    #[tokio::test]
    async fn changed_updates_current() {
        let (tx, rx) = watch::channel(items(&[1]));
        let mut stream = EntityStream::new(rx);
        assert_eq!(stream.current().len(), 1);

        tx.send(items(&[1, 2])).unwrap();
        let snap = stream.changed().await.unwrap();

        assert_eq!(snap.len(), 2);
        assert_eq!(stream.current().len(), 2);
    }

    #[tokio::test]
    async fn changed_ends_when_sender_dropped() {
        let (tx, rx) = watch::channel(items(&[]));
        let mut stream = EntityStream::new(rx);
        drop(tx);
        assert!(stream.changed().await.is_none());
    }

    #[test]
    fn changed_waits_for_a_send() {
        let (tx, rx) = watch::channel(items(&[1]));
        let mut stream = EntityStream::new(rx);
        let mut changed = task::spawn(stream.changed());

        assert_pending!(changed.poll());
        tx.send(items(&[3])).unwrap();
        assert!(changed.is_woken());
        let snap = assert_ready!(changed.poll()).unwrap();
        assert_eq!(*snap[0], 3);
    }

    #[tokio::test]
    async fn into_stream_yields_current_then_updates() {
        let (tx, rx) = watch::channel(items(&[1]));
        let mut stream = EntityStream::new(rx).into_stream();

        assert_eq!(stream.next().await.unwrap().len(), 1);
        tx.send(items(&[1, 2, 3])).unwrap();
        assert_eq!(stream.next().await.unwrap().len(), 3);
        drop(tx);
        assert!(stream.next().await.is_none());
    }
}

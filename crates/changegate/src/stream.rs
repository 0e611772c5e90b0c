//! Change stream adapters.
//!
//! The dispatcher consumes a [`ChangeStream`]: a boxed stream of
//! notifications in arrival order. An `Err` item means the subscription
//! transport failed, which is fatal to the consumption loop. The end of the
//! stream ends the loop cleanly.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::{broadcast, mpsc};

use crate::error::StreamError;
use crate::resource::Notification;

/// Notifications in arrival order, as consumed by the dispatcher.
pub type ChangeStream<S> = BoxStream<'static, Result<Notification<S>, StreamError>>;

/// The remote store's subscription mechanism.
#[async_trait]
pub trait ChangeSource<S>: Send + Sync {
    /// Opens a new subscription. The returned stream is not restartable;
    /// reconnect policy belongs to the implementor.
    async fn subscribe(&self) -> Result<ChangeStream<S>, StreamError>;
}

/// Push side of [`channel`].
pub struct NotificationSender<S> {
    inner: mpsc::Sender<Result<Notification<S>, StreamError>>,
}

impl<S> Clone for NotificationSender<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S> NotificationSender<S> {
    /// Forwards a notification. Waits while the channel is full.
    pub async fn send(&self, notification: Notification<S>) -> Result<(), StreamError> {
        self.inner
            .send(Ok(notification))
            .await
            .map_err(|_| StreamError::Closed)
    }

    /// Reports a transport failure. The consumer stops after receiving it.
    pub async fn fail(&self, error: StreamError) -> Result<(), StreamError> {
        self.inner.send(Err(error)).await.map_err(|_| StreamError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Creates a bounded channel whose receiving half is a [`ChangeStream`].
///
/// For hosts that own a watch connection and push notifications into the
/// dispatcher. The stream ends once every sender is dropped.
pub fn channel<S: Send + 'static>(capacity: usize) -> (NotificationSender<S>, ChangeStream<S>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed();
    (NotificationSender { inner: tx }, stream)
}

/// Adapts a broadcast receiver into a [`ChangeStream`].
///
/// A lagging receiver has lost notifications it can never classify, so lag
/// is surfaced as [`StreamError::Lagged`] and ends the stream.
pub fn from_broadcast<S: Clone + Send + 'static>(
    receiver: broadcast::Receiver<Notification<S>>,
) -> ChangeStream<S> {
    stream::unfold(Some(receiver), |state| async move {
        let mut receiver = state?;
        match receiver.recv().await {
            Ok(notification) => Some((Ok(notification), Some(receiver))),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                log::warn!("Change subscription lagged, {} notifications dropped", missed);
                Some((Err(StreamError::Lagged(missed)), None))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    })
    .boxed()
}

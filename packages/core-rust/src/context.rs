//! Invocation context threaded through every stage of a chain.
//!
//! The chain only forwards a [`RequestContext`]; cancellation, deadlines and
//! request-scoped values are created by the transport (or the test) that
//! invokes it, and observed by the stages that care.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Extensions;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Cancellation, deadline, and value carrier for one invocation.
///
/// Cloning is cheap: all clones share the same immutable state. The `with_*`
/// methods return a derived context and leave the original untouched.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

#[derive(Debug, Clone, Default)]
struct Inner {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    values: Extensions,
}

impl RequestContext {
    /// A context that is never cancelled, has no deadline and carries no values.
    ///
    /// Used when a chain is invoked by a transport that installed no context.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Replaces the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        Arc::make_mut(&mut self.inner).cancel = token;
        self
    }

    /// Derives a context whose token is a child of this one: cancelling the
    /// child does not cancel the parent, cancelling the parent cancels both.
    #[must_use]
    pub fn child(&self) -> Self {
        let mut inner = (*self.inner).clone();
        inner.cancel = self.inner.cancel.child_token();
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Sets the deadline. An earlier existing deadline is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        let inner = Arc::make_mut(&mut self.inner);
        inner.deadline = Some(match inner.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Sets the deadline to `now + timeout`, keeping an earlier existing one.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Attaches a request-scoped value, replacing any value of the same type.
    #[must_use]
    pub fn with_value<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.inner).values.insert(value);
        self
    }

    /// Looks up a request-scoped value by type.
    #[must_use]
    pub fn value<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.inner.values.get::<T>()
    }

    /// The cancellation token observed by this context.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.cancel.cancelled()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left until the deadline, `None` if there is no deadline.
    /// Returns `Duration::ZERO` once the deadline has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// True when the context is cancelled or past its deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct TraceId(&'static str);

    #[test]
    fn background_is_never_done() {
        let ctx = RequestContext::background();
        assert!(!ctx.is_cancelled());
        assert!(!ctx.is_expired());
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[test]
    fn with_value_does_not_touch_the_original() {
        let base = RequestContext::background();
        let derived = base.clone().with_value(TraceId("abc"));

        assert_eq!(derived.value::<TraceId>(), Some(&TraceId("abc")));
        assert!(base.value::<TraceId>().is_none());
    }

    #[test]
    fn earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = RequestContext::background()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn past_deadline_is_expired() {
        let ctx = RequestContext::background().with_timeout(Duration::ZERO);
        assert!(ctx.is_expired());
        assert!(ctx.is_done());
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn cancelling_parent_cancels_child_only_downwards() {
        let parent = RequestContext::background();
        let child = parent.child();

        child.cancellation_token().cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let second = parent.child();
        parent.cancellation_token().cancel();
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let token = CancellationToken::new();
        let ctx = RequestContext::background().with_cancellation(token.clone());
        token.cancel();
        ctx.cancelled().await;
        assert!(ctx.is_done());
    }
}

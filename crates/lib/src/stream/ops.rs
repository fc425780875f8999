//! The small operator set used throughout the crate.
//!
//! `map`/`filter`/`take`/`skip` come straight from `futures::StreamExt`; this module
//! adds the operators the rest of the crate (and its tests) need beyond that:
//! distinct-until-changed, combine-latest, timed ticks, and first-value accessors
//! with cancellation.

use std::future::Future;
use std::time::Duration;

use futures::future::{Either, ready};
use futures::{Stream, StreamExt, pin_mut};

use super::StreamError;

/// Distinct-until-changed: forward a value only when it differs (structural equality)
/// from the previously forwarded one.
pub fn dedupe<S>(stream: S) -> impl Stream<Item = S::Item>
where
    S: Stream,
    S::Item: Clone + PartialEq,
{
    stream
        .scan(None, |last: &mut Option<S::Item>, item| {
            let out = if last.as_ref() == Some(&item) {
                None
            } else {
                *last = Some(item.clone());
                Some(item)
            };
            ready(Some(out))
        })
        .filter_map(ready)
}

enum Side<A, B> {
    Left(A),
    Right(B),
}

/// Combine the latest values of two streams: once both sides have produced a value,
/// every push on either side emits `combine(latest_a, latest_b)`.
pub fn combine_latest<A, B, R, F>(
    left: impl Stream<Item = A>,
    right: impl Stream<Item = B>,
    combine: F,
) -> impl Stream<Item = R>
where
    A: Clone,
    B: Clone,
    F: Fn(&A, &B) -> R,
{
    let left = left.map(Side::Left);
    let right = right.map(Side::Right);
    futures::stream::select(left, right)
        .scan(
            (None::<A>, None::<B>),
            move |latest, side| {
                match side {
                    Side::Left(value) => latest.0 = Some(value),
                    Side::Right(value) => latest.1 = Some(value),
                }
                let out = match (&latest.0, &latest.1) {
                    (Some(a), Some(b)) => Some(combine(a, b)),
                    _ => None,
                };
                ready(Some(out))
            },
        )
        .filter_map(ready)
}

/// Timed ticks: emits `0, 1, 2, …`, one per elapsed `period`. Ticking stops when the
/// stream is dropped.
pub fn interval(period: Duration) -> impl Stream<Item = u64> {
    futures::stream::unfold(
        (None::<tokio::time::Interval>, 0u64),
        move |(timer, tick)| async move {
            let mut timer = timer.unwrap_or_else(|| {
                tokio::time::interval_at(tokio::time::Instant::now() + period, period)
            });
            timer.tick().await;
            Some((tick, (Some(timer), tick + 1)))
        },
    )
}

/// Await the first value of a stream; [`StreamError::EmptySequence`] if it ends first.
pub async fn first_value<S: Stream>(stream: S) -> crate::Result<S::Item> {
    pin_mut!(stream);
    match stream.next().await {
        Some(value) => Ok(value),
        None => Err(StreamError::EmptySequence.into()),
    }
}

/// Await the first value of a stream, racing a cancellation future.
/// [`StreamError::Cancelled`] if the cancellation wins.
pub async fn first_value_or_cancel<S: Stream, C: Future>(
    stream: S,
    cancel: C,
) -> crate::Result<S::Item> {
    pin_mut!(stream);
    pin_mut!(cancel);
    match futures::future::select(stream.next(), cancel).await {
        Either::Left((Some(value), _)) => Ok(value),
        Either::Left((None, _)) => Err(StreamError::EmptySequence.into()),
        Either::Right(_) => Err(StreamError::Cancelled.into()),
    }
}

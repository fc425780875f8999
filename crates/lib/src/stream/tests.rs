use std::time::Duration;

use futures::StreamExt;
use tokio::sync::oneshot;

use super::*;

#[tokio::test]
async fn subject_broadcasts_to_all_subscribers() {
    let subject = Subject::new();
    let mut first = subject.subscribe();
    let mut second = subject.subscribe();

    subject.on_next(7);
    assert_eq!(first.next().await, Some(7));
    assert_eq!(second.next().await, Some(7));
}

#[tokio::test]
async fn late_subscriber_misses_earlier_values() {
    let subject = Subject::new();
    subject.on_next(1);

    let mut stream = subject.subscribe();
    subject.on_next(2);
    subject.on_completed();

    assert_eq!(stream.next().await, Some(2));
    assert_eq!(stream.next().await, None);
}

#[tokio::test]
async fn terminal_signals_are_sticky() {
    let subject = Subject::new();
    let mut stream = subject.subscribe();

    subject.on_completed();
    subject.on_error("too late");
    subject.on_next(1);

    assert_eq!(stream.next().await, None);
    assert_eq!(subject.terminal(), Some(Terminal::Completed));

    // A subscriber arriving after the terminal state sees an ended stream.
    let mut late = subject.subscribe();
    assert_eq!(late.next().await, None);
}

#[tokio::test]
async fn subject_first_value_reports_abort() {
    let subject: Subject<i32> = Subject::new();
    subject.on_error("boom");

    let err = subject.first_value().await.unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Stream(StreamError::Aborted { .. })
    ));
}

#[tokio::test]
async fn behavior_subject_replays_current_value() {
    let subject = BehaviorSubject::new(1);
    let mut early = subject.subscribe();
    assert_eq!(early.next().await, Some(1));

    subject.on_next(2);
    assert_eq!(early.next().await, Some(2));
    assert_eq!(subject.value(), 2);

    let mut late = subject.subscribe();
    assert_eq!(late.next().await, Some(2));
}

#[tokio::test]
async fn dedupe_drops_repeats_only() {
    let values = futures::stream::iter(vec![1, 1, 2, 2, 1, 3]);
    let collected: Vec<_> = dedupe(values).collect().await;
    assert_eq!(collected, vec![1, 2, 1, 3]);
}

#[tokio::test]
async fn combine_latest_emits_once_both_sides_arrive() {
    let s1 = BehaviorSubject::new(1);
    let s2 = BehaviorSubject::new(2);
    let mut sums = Box::pin(combine_latest(s1.subscribe(), s2.subscribe(), |a, b| a + b));

    assert_eq!(sums.next().await, Some(3));
    s1.on_next(2);
    assert_eq!(sums.next().await, Some(4));
    s2.on_next(4);
    assert_eq!(sums.next().await, Some(6));
}

#[tokio::test]
async fn first_value_returns_first_push() {
    let subject = Subject::new();
    let stream = subject.subscribe();
    subject.on_next(42);
    subject.on_next(43);

    assert_eq!(first_value(stream).await.unwrap(), 42);
}

#[tokio::test]
async fn first_value_on_ended_stream_is_empty_sequence() {
    let stream = futures::stream::empty::<i32>();
    let err = first_value(stream).await.unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Stream(StreamError::EmptySequence)
    ));
}

#[tokio::test]
async fn first_value_or_cancel_cancels_deterministically() {
    let subject: Subject<i32> = Subject::new();
    let stream = subject.subscribe();
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

    let wait = tokio::spawn(first_value_or_cancel(stream, cancel_rx));
    cancel_tx.send(()).unwrap();

    let err = wait.await.unwrap().unwrap_err();
    assert!(matches!(err, crate::Error::Stream(StreamError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn interval_ticks_monotonically() {
    let mut ticks = Box::pin(interval(Duration::from_millis(100)));

    assert_eq!(ticks.next().await, Some(0));
    assert_eq!(ticks.next().await, Some(1));
    assert_eq!(ticks.next().await, Some(2));
}

//! ConcurrentBag Asynchronous Tests
//!
//! Validates the asynchronous half of the concurrency-safe bag contract:
//! concurrent `get_async` callers share a single in-flight operation, the
//! resolved value is cached as a value (not re-awaited), rejections are
//! shared by every awaiter and never cached, and dropping one awaiter does
//! not abort the shared operation.
//!
//! ## Test Strategy
//!
//! - Coalescing tests run on a multi-threaded runtime so callers really
//!   race; factories sleep long enough that every caller joins the same
//!   attempt before it resolves
//! - Factory body execution counts use atomics; instance identity uses
//!   `Arc::ptr_eq`

use singleton_bag::{ConcurrentBag, KeyError, TryGetError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test]
async fn test_gives_what_factory_gives() {
    let bag = ConcurrentBag::new();

    let actual = bag.get_async("x", || async { 10 }).await.unwrap();

    assert_eq!(*actual, 10);
}

#[tokio::test]
async fn test_two_concurrent_callers_share_one_execution() {
    let bag = ConcurrentBag::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let factory = {
        let runs = Arc::clone(&runs);
        move || {
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(50)).await;
                7u32
            }
        }
    };

    let (first, second) = tokio::join!(
        bag.get_async("slow", factory.clone()),
        bag.get_async("slow", factory),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(*first, 7);
    assert_eq!(*second, 7);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_tasks_coalesce_onto_one_operation() {
    let bag = Arc::new(ConcurrentBag::new());
    let runs = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let bag = Arc::clone(&bag);
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                bag.get_async("shared", move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(100)).await;
                    String::from("ready")
                })
                .await
                .unwrap()
            })
        })
        .collect();

    let mut values = Vec::new();
    for handle in handles {
        values.push(handle.await.unwrap());
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    for value in &values {
        assert_eq!(**value, "ready");
        assert!(Arc::ptr_eq(value, &values[0]));
    }
}

#[tokio::test]
async fn test_resolved_value_is_cached_as_a_value() {
    let bag = ConcurrentBag::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let first = bag
        .get_async("n", {
            let runs = Arc::clone(&runs);
            move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                7u32
            }
        })
        .await
        .unwrap();

    // A later call returns the identical instance without touching its
    // factory closure, let alone awaiting anything of its own.
    let second = bag
        .get_async("n", {
            let runs = Arc::clone(&runs);
            move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                99u32
            }
        })
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(*second, 7);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejection_is_not_cached() {
    let bag = ConcurrentBag::new();
    let runs = Arc::new(AtomicUsize::new(0));

    let error = bag
        .try_get_async::<String, &str, _, _>("s", {
            let runs = Arc::clone(&runs);
            move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Err("fail")
            }
        })
        .await
        .unwrap_err();
    assert!(matches!(error, TryGetError::Factory(ref e) if **e == "fail"));
    assert!(bag.is_empty());

    let actual = bag
        .try_get_async::<String, &str, _, _>("s", {
            let runs = Arc::clone(&runs);
            move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(String::from("result"))
            }
        })
        .await
        .unwrap();
    assert_eq!(*actual, "result");
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_awaiters_observe_one_shared_rejection() {
    let bag = Arc::new(ConcurrentBag::new());
    let runs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(tokio::sync::Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let bag = Arc::clone(&bag);
            let runs = Arc::clone(&runs);
            let start = Arc::clone(&start);
            tokio::spawn(async move {
                start.wait().await;
                bag.try_get_async::<u32, &str, _, _>("doomed", move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(200)).await;
                    Err("refused")
                })
                .await
            })
        })
        .collect();

    let mut errors = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap_err() {
            TryGetError::Factory(error) => errors.push(error),
            other => panic!("expected a factory failure, got {other:?}"),
        }
    }

    // One attempt, one error instance, observed by all eight awaiters.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    for error in &errors {
        assert_eq!(**error, "refused");
        assert!(Arc::ptr_eq(error, &errors[0]));
    }

    // And the key is open again.
    assert!(bag.is_empty());
    let retried = bag
        .try_get_async::<u32, &str, _, _>("doomed", || async { Ok(9) })
        .await
        .unwrap();
    assert_eq!(*retried, 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dropped_awaiter_does_not_abort_the_operation() {
    let bag = Arc::new(ConcurrentBag::new());
    let runs = Arc::new(AtomicUsize::new(0));

    let factory = {
        let runs = Arc::clone(&runs);
        move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(100)).await;
            7u32
        }
    };

    let aborted = {
        let bag = Arc::clone(&bag);
        let factory = factory.clone();
        tokio::spawn(async move { bag.get_async("steady", factory).await })
    };
    // Let the first awaiter install and start driving the operation, then
    // cancel it mid-flight.
    sleep(Duration::from_millis(20)).await;
    aborted.abort();
    assert!(aborted.await.unwrap_err().is_cancelled());

    // The shared operation is still in the bag; a surviving caller picks
    // it up and resolves it without a second factory run.
    let value = bag.get_async("steady", factory).await.unwrap();
    assert_eq!(*value, 7);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_per_key_isolation() {
    let bag = ConcurrentBag::new();

    let a = bag.get_async("a", || async { 11u32 }).await.unwrap();
    let b = bag.get_async("b", || async { 35u32 }).await.unwrap();
    let s = bag
        .get_async("a", || async { String::from("Hello") })
        .await
        .unwrap();

    assert_eq!((*a, *b), (11, 35));
    assert_eq!(*s, "Hello");
    assert_eq!(bag.len(), 3);
}

#[tokio::test]
async fn test_empty_label_is_rejected_before_the_factory_runs() {
    let bag = ConcurrentBag::new();
    let runs = AtomicUsize::new(0);

    let result = bag
        .get_async("", || {
            runs.fetch_add(1, Ordering::SeqCst);
            async { 1u32 }
        })
        .await;

    assert_eq!(result, Err(KeyError::EmptyLabel));
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(bag.is_empty());
}

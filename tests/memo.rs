use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use labctl::errors::{self, ErrorKind, MachineError};
use labctl::memo::Memo;

#[tokio::test]
async fn value_is_computed_once() {
    let memo = Memo::new();
    let runs = AtomicUsize::new(0);

    for _ in 0..3 {
        let v = memo
            .get_or_init(|| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(v, 42);
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(memo.is_initialized());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_callers_share_one_init() {
    let memo = Arc::new(Memo::<String>::new());
    let runs = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let memo = Arc::clone(&memo);
        let runs = Arc::clone(&runs);
        handles.push(tokio::spawn(async move {
            memo.get_or_init(|| async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok("ready".to_string())
            })
            .await
        }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap().unwrap(), "ready");
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn error_is_cached_with_its_kind() {
    let memo = Memo::<u32>::new();
    let runs = AtomicUsize::new(0);

    for _ in 0..2 {
        let err = memo
            .get_or_init(|| async {
                runs.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::Error::new(MachineError::NotFound {
                    program: "spkez".to_string(),
                })
                .context("could not find spkez"))
            })
            .await
            .unwrap_err();
        assert_eq!(format!("{err:#}"), "could not find spkez: spkez: command not found");
        assert_eq!(errors::kind(&err), Some(ErrorKind::NotFound));
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn fresh_memo_is_uninitialized() {
    assert!(!Memo::<u8>::new().is_initialized());
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use portfolio_loader::{BatchFunction, CancellationToken, LoadError, Loader, LoaderConfig};
use tokio::sync::Notify;

#[derive(Debug, PartialEq, Eq, Clone)]
struct DummyData(String);

#[derive(Default)]
struct DummyContext {
    map: HashMap<i64, String>,
    calls: Mutex<Vec<Vec<i64>>>,
}

impl DummyContext {
    fn with(entries: &[(i64, &str)]) -> Arc<Self> {
        Arc::new(Self {
            map: entries.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Vec<i64>> {
        self.calls.lock().unwrap().clone()
    }
}

/// Negative keys fail individually; everything else resolves to the mapped value, if any.
struct DummyDataLoader;

#[async_trait]
impl BatchFunction<i64, Option<DummyData>> for DummyDataLoader {
    type Context = Arc<DummyContext>;
    type Error = String;

    async fn load(
        keys: &[i64],
        context: &Arc<DummyContext>,
    ) -> Result<Vec<Result<Option<DummyData>, String>>, String> {
        context.calls.lock().unwrap().push(keys.to_vec());
        Ok(keys
            .iter()
            .map(|k| {
                if *k < 0 {
                    Err(format!("negative key {}", k))
                } else {
                    Ok(context.map.get(k).cloned().map(DummyData))
                }
            })
            .collect())
    }
}

struct OutageLoader;

#[async_trait]
impl BatchFunction<i64, Option<DummyData>> for OutageLoader {
    type Context = Arc<DummyContext>;
    type Error = Arc<String>;

    async fn load(
        keys: &[i64],
        context: &Arc<DummyContext>,
    ) -> Result<Vec<Result<Option<DummyData>, Arc<String>>>, Arc<String>> {
        context.calls.lock().unwrap().push(keys.to_vec());
        Err(Arc::new("connection refused".to_owned()))
    }
}

struct StalledLoader;

#[async_trait]
impl BatchFunction<i64, Option<DummyData>> for StalledLoader {
    type Context = Arc<DummyContext>;
    type Error = String;

    async fn load(
        keys: &[i64],
        context: &Arc<DummyContext>,
    ) -> Result<Vec<Result<Option<DummyData>, String>>, String> {
        context.calls.lock().unwrap().push(keys.to_vec());
        future::pending::<()>().await;
        Ok(Vec::new())
    }
}

/// Every key resolves to its own decimal string. A batch containing `GATED_KEY` blocks until the
/// context's gate is opened.
struct GatedLoader;

const GATED_KEY: i64 = 2;

#[derive(Default)]
struct GatedContext {
    calls: Mutex<Vec<Vec<i64>>>,
    gate: Notify,
}

impl GatedContext {
    fn calls(&self) -> Vec<Vec<i64>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchFunction<i64, Option<DummyData>> for GatedLoader {
    type Context = Arc<GatedContext>;
    type Error = String;

    async fn load(
        keys: &[i64],
        context: &Arc<GatedContext>,
    ) -> Result<Vec<Result<Option<DummyData>, String>>, String> {
        context.calls.lock().unwrap().push(keys.to_vec());
        if keys.contains(&GATED_KEY) {
            context.gate.notified().await;
        }
        Ok(keys.iter().map(|k| Ok(Some(DummyData(k.to_string())))).collect())
    }
}

struct ShortLoader;

#[async_trait]
impl BatchFunction<i64, Option<DummyData>> for ShortLoader {
    type Context = Arc<DummyContext>;
    type Error = String;

    async fn load(
        keys: &[i64],
        _context: &Arc<DummyContext>,
    ) -> Result<Vec<Result<Option<DummyData>, String>>, String> {
        Ok(keys.iter().skip(1).map(|_| Ok(None)).collect())
    }
}

fn data(s: &str) -> Option<DummyData> {
    Some(DummyData(s.to_owned()))
}

#[tokio::test]
async fn basic_load() {
    let context = DummyContext::with(&[(42, "Foo")]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());
    assert_eq!(loader.load(42).await, Ok(data("Foo")));
    assert_eq!(context.calls(), vec![vec![42]]);
}

#[tokio::test]
async fn repeated_load_hits_cache() {
    let context = DummyContext::with(&[(42, "Foo")]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());
    assert_eq!(loader.load(42).await, Ok(data("Foo")));
    assert_eq!(loader.load(42).await, Ok(data("Foo")));
    assert_eq!(context.calls(), vec![vec![42]]);
}

#[tokio::test]
async fn missing_key_is_absent_not_an_error() {
    let context = DummyContext::with(&[]);

    let loader = Loader::new(DummyDataLoader {}, context);
    assert_eq!(loader.load(15).await, Ok(None));
}

#[tokio::test]
async fn basic_load_many() {
    let context = DummyContext::with(&[
        (42, "one fish"),
        (12, "two fish"),
        (5, "red fish"),
        (8, "blue fish"),
    ]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());
    assert_eq!(
        loader.load_many(vec![5, 12, 8, 5]).await,
        vec![
            Ok(data("red fish")),
            Ok(data("two fish")),
            Ok(data("blue fish")),
            Ok(data("red fish")),
        ]
    );
    assert_eq!(context.calls(), vec![vec![5, 12, 8]]);
}

#[tokio::test]
async fn load_async_coalesces_in_first_seen_order() {
    let context = DummyContext::with(&[
        (42, "one fish"),
        (12, "two fish"),
        (5, "red fish"),
        (8, "blue fish"),
    ]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());

    let tuple = future::join4(
        loader.load(5),
        loader.load_many(vec![5, 42]),
        loader.load(99),
        loader.load(12),
    );

    assert_eq!(
        tuple.await,
        (
            Ok(data("red fish")),
            vec![Ok(data("red fish")), Ok(data("one fish"))],
            Ok(None),
            Ok(data("two fish"))
        )
    );
    assert_eq!(context.calls(), vec![vec![5, 42, 99, 12]]);
}

#[tokio::test]
async fn duplicate_concurrent_loads_share_one_fetch() {
    let context = DummyContext::with(&[(3, "three"), (7, "seven"), (9, "nine")]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());
    let results = future::join_all(vec![3, 7, 3, 9].into_iter().map(|k| loader.load(k))).await;

    assert_eq!(
        results,
        vec![Ok(data("three")), Ok(data("seven")), Ok(data("three")), Ok(data("nine"))]
    );
    assert_eq!(context.calls(), vec![vec![3, 7, 9]]);
}

#[tokio::test]
async fn per_key_error_only_reaches_its_waiters() {
    let context = DummyContext::with(&[(2, "two")]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());
    let (failed, again, ok) = future::join3(loader.load(-1), loader.load(-1), loader.load(2)).await;

    assert_eq!(failed, Err(LoadError::Fetch("negative key -1".to_owned())));
    assert_eq!(again, failed);
    assert_eq!(ok, Ok(data("two")));

    // Failures are cached too; no retry.
    assert_eq!(loader.load(-1).await, failed);
    assert_eq!(context.calls(), vec![vec![-1, 2]]);
}

#[tokio::test]
async fn systemic_failure_reaches_every_key_of_the_batch() {
    let context = DummyContext::with(&[]);

    let loader = Loader::new(OutageLoader {}, context.clone());
    let (five, six) = future::join(loader.load(5), loader.load(6)).await;

    let (five, six) = match (five, six) {
        (Err(LoadError::Fetch(a)), Err(LoadError::Fetch(b))) => (a, b),
        other => panic!("expected fetch errors, got {:?}", other),
    };
    assert!(Arc::ptr_eq(&five, &six));
    assert_eq!(five.as_str(), "connection refused");
    assert_eq!(context.calls(), vec![vec![5, 6]]);
}

#[tokio::test]
async fn empty_load_many_never_dispatches() {
    let context = DummyContext::with(&[(1, "one")]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());
    assert_eq!(loader.load_many(Vec::new()).await, Vec::new());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(context.calls().is_empty());
}

#[tokio::test]
async fn primed_key_skips_the_batch_function() {
    let context = DummyContext::with(&[(1, "stored")]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());
    loader.prime(1, data("primed"));
    assert_eq!(loader.load(1).await, Ok(data("primed")));
    assert!(context.calls().is_empty());
}

#[tokio::test]
async fn prime_does_not_replace_a_cached_result() {
    let context = DummyContext::with(&[(1, "stored")]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());
    assert_eq!(loader.load(1).await, Ok(data("stored")));
    loader.prime_many(vec![(1, data("primed")), (2, data("two"))]);
    assert_eq!(loader.load_many(vec![1, 2]).await, vec![Ok(data("stored")), Ok(data("two"))]);
    assert_eq!(context.calls(), vec![vec![1]]);
}

#[tokio::test]
async fn prime_withdraws_key_from_open_window() {
    let context = DummyContext::with(&[(5, "stored")]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());
    let (first, second) = future::join(loader.load(5), async {
        loader.prime(5, data("primed"));
        loader.load(5).await
    })
    .await;

    assert_eq!(first, Ok(data("primed")));
    assert_eq!(second, Ok(data("primed")));
    assert!(context.calls().is_empty());
}

#[tokio::test]
async fn chained_loads_open_a_new_window() {
    let context = DummyContext::with(&[(1, "one"), (2, "two")]);

    let loader = Loader::new(DummyDataLoader {}, context.clone());
    assert_eq!(loader.load(1).await, Ok(data("one")));
    assert_eq!(loader.load_many(vec![1, 2]).await, vec![Ok(data("one")), Ok(data("two"))]);
    assert_eq!(context.calls(), vec![vec![1], vec![2]]);
}

#[tokio::test]
async fn cache_hit_is_answered_while_a_batch_is_loading() {
    let context = Arc::new(GatedContext::default());

    let loader = Arc::new(Loader::new(GatedLoader {}, context.clone()));
    assert_eq!(loader.load(1).await, Ok(data("1")));

    let gated = {
        let loader = loader.clone();
        tokio::spawn(async move { loader.load(GATED_KEY).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(context.calls(), vec![vec![1], vec![GATED_KEY]]);

    let cached = tokio::time::timeout(Duration::from_millis(200), loader.load(1)).await;
    assert_eq!(cached, Ok(Ok(data("1"))));

    context.gate.notify_one();
    assert_eq!(gated.await.unwrap(), Ok(data("2")));
}

#[tokio::test]
async fn loads_during_a_batch_join_it_or_open_the_next_window() {
    let context = Arc::new(GatedContext::default());

    let loader = Arc::new(Loader::new(GatedLoader {}, context.clone()));
    let first = {
        let loader = loader.clone();
        tokio::spawn(async move { loader.load(GATED_KEY).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let later = {
        let loader = loader.clone();
        tokio::spawn(async move { future::join(loader.load(GATED_KEY), loader.load(3)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(context.calls(), vec![vec![GATED_KEY]]);

    context.gate.notify_one();
    assert_eq!(first.await.unwrap(), Ok(data("2")));
    assert_eq!(later.await.unwrap(), (Ok(data("2")), Ok(data("3"))));
    assert_eq!(context.calls(), vec![vec![GATED_KEY], vec![3]]);
}

#[tokio::test]
async fn max_batch_size_splits_dispatch() {
    let context = DummyContext::with(&[]);
    let config = LoaderConfig::default().with_max_batch_size(2);

    let loader = Loader::with_config(DummyDataLoader {}, context.clone(), config);
    let results = loader.load_many(vec![1, 2, 3, 2, 4, 5]).await;

    assert_eq!(results.len(), 6);
    assert_eq!(context.calls(), vec![vec![1, 2], vec![3, 4], vec![5]]);
}

#[tokio::test(start_paused = true)]
async fn max_wait_flushes_a_trickling_window() {
    let context = DummyContext::with(&[]);
    let config = LoaderConfig::default()
        .with_wait(Duration::from_millis(20))
        .with_max_wait(Duration::from_millis(50));

    let loader = Arc::new(Loader::with_config(DummyDataLoader {}, context.clone(), config));
    let handles = (0..10)
        .map(|i: i64| {
            let loader = loader.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(15 * i as u64)).await;
                loader.load(i).await
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Ok(None));
    }

    let calls = context.calls();
    assert_eq!(calls[0], vec![0, 1, 2, 3]);
    assert!(calls.len() > 1);
    assert_eq!(calls.concat(), (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn cancel_resolves_outstanding_loads() {
    let context = DummyContext::with(&[]);

    let loader = Arc::new(Loader::new(StalledLoader {}, context.clone()));
    let pending = {
        let loader = loader.clone();
        tokio::spawn(async move { loader.load(1).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(context.calls(), vec![vec![1]]);

    loader.cancel();
    assert_eq!(pending.await.unwrap(), Err(LoadError::Cancelled));
    assert!(loader.is_cancelled());
    assert_eq!(loader.load(2).await, Err(LoadError::Cancelled));
    assert_eq!(
        loader.load_many(vec![3, 4]).await,
        vec![Err(LoadError::Cancelled), Err(LoadError::Cancelled)]
    );
}

#[tokio::test]
async fn parent_token_cancels_loader() {
    let context = DummyContext::with(&[]);
    let request = CancellationToken::new();

    let loader = Loader::with_cancellation(
        StalledLoader {},
        context,
        LoaderConfig::default(),
        request.child_token(),
    );
    let (result, _) = future::join(loader.load(1), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        request.cancel();
    })
    .await;
    assert_eq!(result, Err(LoadError::Cancelled));
}

#[tokio::test]
async fn mismatched_result_length_fails_every_waiter() {
    let context = DummyContext::with(&[]);

    let loader = Loader::new(ShortLoader {}, context);
    let (a, b) = future::join(loader.load(1), loader.load(2)).await;
    assert_eq!(a, Err(LoadError::WorkerFailed));
    assert_eq!(b, Err(LoadError::WorkerFailed));
    assert_eq!(loader.load(3).await, Err(LoadError::WorkerFailed));
    assert!(!loader.is_cancelled());
}

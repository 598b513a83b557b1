//! Batch functions for relationship lookups built from a single bulk query.
//!
//! A [`GroupedFetch`] implementation issues one "rows where column in keys" query and names the
//! column the rows are bucketed by. [`Grouped`] turns it into a one-to-many `BatchFunction`
//! (each key resolves to its rows, possibly none), [`Indexed`] into a one-to-one `BatchFunction`
//! (each key resolves to at most one row).
//!
//! A failed query fails the whole batch. The error is wrapped in an `Arc` so every key of the
//! batch carries the same error instance.

use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::batch_function::BatchFunction;

#[async_trait]
pub trait GroupedFetch<K, R> {
    type Context;
    type Error;

    /// Fetches every row whose grouping column is one of `keys`, in one query.
    async fn fetch(keys: &[K], context: &Self::Context) -> Result<Vec<R>, Self::Error>;

    /// The grouping column of `row`. Rows without one are dropped.
    fn group_key(row: &R) -> Option<K>;
}

/// One-to-many adapter: a key with no matching rows resolves to an empty `Vec`.
pub struct Grouped<F>(PhantomData<F>);

impl<F> Grouped<F> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<F> Default for Grouped<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// One-to-one adapter: a key with no matching row resolves to `None`.
pub struct Indexed<F>(PhantomData<F>);

impl<F> Indexed<F> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<F> Default for Indexed<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, R, F> BatchFunction<K, Vec<Arc<R>>> for Grouped<F>
where
    K: 'static + Eq + Hash + Send + Sync,
    R: 'static + Send + Sync,
    F: 'static + GroupedFetch<K, R>,
    F::Context: Send + Sync + 'static,
    F::Error: Send + Sync + 'static,
{
    type Context = F::Context;
    type Error = Arc<F::Error>;

    async fn load(
        keys: &[K],
        context: &Self::Context,
    ) -> Result<Vec<Result<Vec<Arc<R>>, Self::Error>>, Self::Error> {
        let rows = F::fetch(keys, context).await.map_err(Arc::new)?;
        Ok(group_rows(keys, rows, F::group_key).into_iter().map(Ok).collect())
    }
}

#[async_trait]
impl<K, R, F> BatchFunction<K, Option<Arc<R>>> for Indexed<F>
where
    K: 'static + Eq + Hash + Send + Sync,
    R: 'static + Send + Sync,
    F: 'static + GroupedFetch<K, R>,
    F::Context: Send + Sync + 'static,
    F::Error: Send + Sync + 'static,
{
    type Context = F::Context;
    type Error = Arc<F::Error>;

    async fn load(
        keys: &[K],
        context: &Self::Context,
    ) -> Result<Vec<Result<Option<Arc<R>>, Self::Error>>, Self::Error> {
        let rows = F::fetch(keys, context).await.map_err(Arc::new)?;
        Ok(index_rows(keys, rows, F::group_key).into_iter().map(Ok).collect())
    }
}

/// Buckets `rows` by `group_key` and answers each of `keys` with its bucket, in `keys` order.
pub fn group_rows<K, R>(
    keys: &[K],
    rows: Vec<R>,
    group_key: impl Fn(&R) -> Option<K>,
) -> Vec<Vec<Arc<R>>>
where
    K: Eq + Hash,
{
    let mut buckets: HashMap<K, Vec<Arc<R>>> = HashMap::with_capacity(keys.len());
    for row in rows {
        if let Some(key) = group_key(&row) {
            buckets.entry(key).or_default().push(Arc::new(row));
        }
    }
    keys.iter().map(|k| buckets.get(k).cloned().unwrap_or_default()).collect()
}

/// Like [`group_rows`] but keeps only the first row seen for each key.
pub fn index_rows<K, R>(
    keys: &[K],
    rows: Vec<R>,
    group_key: impl Fn(&R) -> Option<K>,
) -> Vec<Option<Arc<R>>>
where
    K: Eq + Hash,
{
    let mut index: HashMap<K, Arc<R>> = HashMap::with_capacity(keys.len());
    for row in rows {
        if let Some(key) = group_key(&row) {
            index.entry(key).or_insert_with(|| Arc::new(row));
        }
    }
    keys.iter().map(|k| index.get(k).cloned()).collect()
}

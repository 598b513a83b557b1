//! Request-scoped batching loaders for the portfolio GraphQL backend.
//!
//! A [`Loader`] coalesces the keys requested by concurrently running resolvers, hands them to a
//! [`BatchFunction`] in one call, and answers every caller from a cache that lives as long as the
//! loader. [`Loaders`] bundles the four relationship loaders of one request.

mod batch_function;
mod cache;
mod config;
mod error;
pub mod grouping;
mod loader;
mod loader_op;
mod loader_worker;
pub mod model;
pub mod registry;
pub mod store;
#[cfg(feature = "stats")]
mod worker_stats;

pub use batch_function::BatchFunction;
pub use config::LoaderConfig;
pub use error::{LoadError, StoreError};
pub use loader::Loader;
pub use loader_op::LoadResult;
pub use registry::Loaders;
pub use tokio_util::sync::CancellationToken;

//! Replica reads and the fan-out over primary and replicas.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::select_all;
use futures::stream::{BoxStream, FuturesUnordered, StreamExt};
use tokio::task::{JoinError, JoinHandle};

use docstore_core::{DocstoreError, Result};

use super::get_result::GetResult;

/// A document read from either the primary or one replica.
#[derive(Clone)]
pub struct GetReplicaResult {
    result: GetResult,
    replica: bool,
}

impl GetReplicaResult {
    pub(crate) fn new(result: GetResult, replica: bool) -> Self {
        Self { result, replica }
    }

    /// Returns true if a replica, not the primary, served the read.
    pub fn is_replica(&self) -> bool {
        self.replica
    }

    /// Consumes the wrapper.
    pub fn into_inner(self) -> GetResult {
        self.result
    }
}

impl Deref for GetReplicaResult {
    type Target = GetResult;

    fn deref(&self) -> &GetResult {
        &self.result
    }
}

impl fmt::Debug for GetReplicaResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetReplicaResult")
            .field("key", &self.result.key())
            .field("cas", &self.result.cas())
            .field("replica", &self.replica)
            .finish()
    }
}

/// A spawned read that is aborted when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = std::result::Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Waits for the first read to finish and aborts the others.
///
/// The first read to finish wins even if it failed. Dropping the returned
/// future aborts every read.
pub(crate) async fn first_completed<T: Send + 'static>(
    reads: Vec<JoinHandle<Result<T>>>,
) -> Result<T> {
    if reads.is_empty() {
        return Err(DocstoreError::Connection(
            "no server available for any copy of the document".to_string(),
        ));
    }
    let guarded = reads.into_iter().map(AbortOnDrop);
    let (winner, index, losers) = select_all(guarded).await;
    tracing::debug!(winner = index, aborted = losers.len(), "replica fan-out settled");
    drop(losers);
    winner.map_err(join_error)?
}

/// Yields every read as it finishes.
///
/// Dropping the stream aborts the reads still in flight.
pub(crate) fn as_completed<T: Send + 'static>(
    reads: Vec<JoinHandle<Result<T>>>,
) -> BoxStream<'static, Result<T>> {
    reads
        .into_iter()
        .map(AbortOnDrop)
        .collect::<FuturesUnordered<_>>()
        .map(|joined| joined.map_err(join_error).and_then(|read| read))
        .boxed()
}

fn join_error(e: JoinError) -> DocstoreError {
    DocstoreError::Connection(format!("replica read task failed: {e}"))
}

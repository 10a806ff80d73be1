use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::HandlerError;
use crate::ResolvedChunk;

/// Consumer of resolved chunks, typically a bulk insert into a downstream store.
///
/// Sync and async closures are adapted through [`SyncHandler`] and [`AsyncHandler`]
/// so the resolver drives every handler the same way.
pub trait ResolveHandler: Send + Sync + 'static {
    fn handle(
        &self,
        chunk: ResolvedChunk,
    ) -> BoxFuture<'static, std::result::Result<(), HandlerError>>;
}

/// Identifies one registration; registering the same closure twice yields two keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerKey(pub(crate) String);

impl HandlerKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct SyncHandler<F>(pub F);

impl<F> ResolveHandler for SyncHandler<F>
where
    F: Fn(ResolvedChunk) -> std::result::Result<(), HandlerError> + Send + Sync + 'static,
{
    fn handle(
        &self,
        chunk: ResolvedChunk,
    ) -> BoxFuture<'static, std::result::Result<(), HandlerError>> {
        let result = (self.0)(chunk);
        async move { result }.boxed()
    }
}

pub struct AsyncHandler<F>(pub F);

impl<F, Fut> ResolveHandler for AsyncHandler<F>
where
    F: Fn(ResolvedChunk) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
{
    fn handle(
        &self,
        chunk: ResolvedChunk,
    ) -> BoxFuture<'static, std::result::Result<(), HandlerError>> {
        (self.0)(chunk).boxed()
    }
}

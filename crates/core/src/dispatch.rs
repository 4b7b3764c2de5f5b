//! Dispatch seams
//!
//! A governor does not know how requests reach the wire. Each endpoint
//! facade supplies one of two dispatch styles:
//! - [`BatchDispatcher`]: the whole batch goes out as one combined call
//! - [`ItemDispatcher`] wrapped in [`Concurrent`]: one call per item, all
//!   items of a batch in flight together
//!
//! Either way the reply is positional: element `i` answers `batch[i]`.
//! An item fails with [`DispatchError::Remote`] when the endpoint answered
//! it with an error and with [`DispatchError::Transport`] when its wire call
//! never produced an answer. Only remote errors are eligible for retry.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::error::DispatchError;

/// Per-item outcomes of one dispatched batch
pub type BatchReply<Resp> = Result<Vec<Result<Resp, DispatchError>>, DispatchError>;

/// Sends one batch as a single wire call
#[async_trait]
pub trait BatchDispatcher<Req, Resp>: Send + Sync + 'static
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    async fn dispatch(&self, batch: &[Req]) -> BatchReply<Resp>;
}

/// Sends one request as its own wire call
#[async_trait]
pub trait ItemDispatcher<Req, Resp>: Send + Sync + 'static
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    async fn call(&self, request: &Req) -> Result<Resp, DispatchError>;
}

/// Adapts an [`ItemDispatcher`] into a [`BatchDispatcher`] that issues the
/// items of a batch concurrently.
pub struct Concurrent<D>(pub D);

#[async_trait]
impl<Req, Resp, D> BatchDispatcher<Req, Resp> for Concurrent<D>
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
    D: ItemDispatcher<Req, Resp>,
{
    async fn dispatch(&self, batch: &[Req]) -> BatchReply<Resp> {
        Ok(join_all(batch.iter().map(|request| self.0.call(request))).await)
    }
}

#[async_trait]
impl<Req, Resp, D> BatchDispatcher<Req, Resp> for Arc<D>
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
    D: BatchDispatcher<Req, Resp>,
{
    async fn dispatch(&self, batch: &[Req]) -> BatchReply<Resp> {
        self.as_ref().dispatch(batch).await
    }
}

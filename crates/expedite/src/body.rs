//! Request, response, and body types at the pipeline seam
//!
//! The middleware is installed in front of whatever dispatches requests to
//! handlers. That seam is expressed with plain `http` types plus a boxed
//! streaming body, so the crate works the same whether the handler returns a
//! fully buffered payload or streams it chunk by chunk.

use crate::error::BoxError;
use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// HTTP request as seen by the middleware.
///
/// The body is already buffered by the surrounding pipeline; the cache layer
/// itself only reads the method, URI, headers, and extensions.
pub type Request = http::Request<Bytes>;

/// HTTP response produced by handlers and by the middleware.
pub type Response = http::Response<CacheBody>;

/// The proceed-callback: runs the rest of the pipeline for a request.
///
/// The middleware invokes it exactly once per request unless it has already
/// fully terminated the response itself (a 304 or a cache replay).
pub type Next =
    Arc<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send + 'static>> + Send + Sync>;

/// A boxed response body that may stream.
///
/// Handlers can hand back anything implementing [`http_body::Body`]; the
/// middleware never assumes the payload fits a single frame.
pub struct CacheBody {
    inner: BoxBody<Bytes, BoxError>,
}

impl CacheBody {
    /// Box an arbitrary body.
    pub fn new<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            inner: body.map_err(Into::into).boxed(),
        }
    }

    /// A single-frame body holding the given bytes.
    pub fn full(bytes: impl Into<Bytes>) -> Self {
        Self::new(Full::new(bytes.into()))
    }

    /// A body with no frames at all.
    pub fn empty() -> Self {
        Self::new(Empty::new())
    }
}

impl Body for CacheBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl std::fmt::Debug for CacheBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheBody").finish_non_exhaustive()
    }
}

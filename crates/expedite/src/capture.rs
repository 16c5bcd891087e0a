//! Response capture
//!
//! Wraps the outgoing response body so every byte the client receives is
//! also mirrored into a raw-capture buffer. Delivery is never altered or
//! delayed: frames are forwarded exactly as the handler produced them, and
//! the buffer grows on the side.
//!
//! The buffer is pre-seeded with a serialized status line and header block,
//! and bodies without a declared content-length are recorded with chunked
//! transfer framing, so what accumulates is the response as it would appear
//! on the wire. [`parse_response`](crate::parse::parse_response) understands
//! exactly that shape.
//!
//! A finalizer fires exactly once per capture: with the full raw bytes on a
//! clean end of stream, or as an abort when the body errors or is dropped
//! before completing. The drop path is what keeps per-key capture locks from
//! leaking when a client disconnects mid-response.

use crate::body::CacheBody;
use crate::error::BoxError;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http_body::{Body, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};

/// How a capture ended.
pub(crate) enum CaptureOutcome {
    /// Stream completed; the raw response bytes are complete.
    Complete(Vec<u8>),
    /// Stream errored or the client went away; nothing usable was captured.
    Aborted,
}

/// Invoked exactly once when the captured stream terminates.
///
/// `Sync` is required for the wrapping body to be boxable as a
/// [`CacheBody`].
pub(crate) type Finalizer = Box<dyn FnOnce(CaptureOutcome) + Send + Sync + 'static>;

pub(crate) struct CaptureBody {
    inner: CacheBody,
    buf: Vec<u8>,
    chunked: bool,
    finalizer: Option<Finalizer>,
}

impl CaptureBody {
    /// Wrap `response`'s body so its bytes are mirrored into a capture
    /// buffer on the way to the client.
    pub(crate) fn attach(
        response: http::Response<CacheBody>,
        finalizer: Finalizer,
    ) -> http::Response<CacheBody> {
        let (head, chunked) = serialize_head(&response);
        let (parts, body) = response.into_parts();
        let capture = CaptureBody {
            inner: body,
            buf: head,
            chunked,
            finalizer: Some(finalizer),
        };
        http::Response::from_parts(parts, CacheBody::new(capture))
    }

    fn record(&mut self, data: &Bytes) {
        if data.is_empty() {
            return;
        }
        if self.chunked {
            self.buf
                .extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
            self.buf.extend_from_slice(data);
            self.buf.extend_from_slice(b"\r\n");
        } else {
            self.buf.extend_from_slice(data);
        }
    }

    fn finish(&mut self, complete: bool) {
        let Some(finalizer) = self.finalizer.take() else {
            return;
        };
        if complete {
            if self.chunked {
                self.buf.extend_from_slice(b"0\r\n\r\n");
            }
            finalizer(CaptureOutcome::Complete(std::mem::take(&mut self.buf)));
        } else {
            self.buf = Vec::new();
            finalizer(CaptureOutcome::Aborted);
        }
    }
}

impl Body for CaptureBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.record(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.finish(false);
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.finish(true);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CaptureBody {
    fn drop(&mut self) {
        // Client abort: the body is dropped before the stream completed.
        self.finish(false);
    }
}

/// Serialize the status line and header block the way they would appear on
/// the wire, and decide how the body will be framed in the capture.
///
/// A response without a declared content-length is recorded with chunked
/// framing; the matching `transfer-encoding: chunked` line is added to the
/// recorded head when the handler did not set one itself.
fn serialize_head(response: &http::Response<CacheBody>) -> (Vec<u8>, bool) {
    let status = response.status();
    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(b"HTTP/1.1 ");
    head.extend_from_slice(status.as_str().as_bytes());
    if let Some(reason) = status.canonical_reason() {
        head.push(b' ');
        head.extend_from_slice(reason.as_bytes());
    }
    head.extend_from_slice(b"\r\n");

    for (name, value) in response.headers() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    let declares_chunked = response
        .headers()
        .get_all(TRANSFER_ENCODING)
        .iter()
        .any(|v| {
            v.to_str()
                .map(|s| s.to_ascii_lowercase().contains("chunked"))
                .unwrap_or(false)
        });
    let chunked = declares_chunked || !response.headers().contains_key(CONTENT_LENGTH);
    if chunked && !declares_chunked {
        head.extend_from_slice(b"transfer-encoding: chunked\r\n");
    }
    head.extend_from_slice(b"\r\n");
    (head, chunked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_response;
    use http_body_util::{BodyExt, StreamBody};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<CaptureOutcome>>>;

    fn finalizer() -> (Finalizer, Captured) {
        let outcomes: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        let finalizer: Finalizer = Box::new(move |outcome| {
            sink.lock().unwrap().push(outcome);
        });
        (finalizer, outcomes)
    }

    fn raw_complete(outcomes: &Captured) -> Vec<u8> {
        let mut outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1, "finalizer must fire exactly once");
        match outcomes.pop().unwrap() {
            CaptureOutcome::Complete(raw) => raw,
            CaptureOutcome::Aborted => panic!("expected a complete capture"),
        }
    }

    #[tokio::test]
    async fn capture_mirrors_bytes_without_altering_delivery() {
        let response = http::Response::builder()
            .status(200)
            .header("content-type", "text/plain")
            .header("content-length", "5")
            .body(CacheBody::full("hello"))
            .unwrap();
        let (finalizer, outcomes) = finalizer();
        let response = CaptureBody::attach(response, finalizer);

        let delivered = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(delivered, Bytes::from("hello"));

        let raw = raw_complete(&outcomes);
        let entry = parse_response(&raw).unwrap();
        assert_eq!(entry.status, 200);
        assert_eq!(entry.header("content-type"), Some("text/plain"));
        assert_eq!(entry.body, Bytes::from("hello"));
    }

    #[tokio::test]
    async fn streamed_bodies_are_recorded_with_chunk_framing() {
        let frames = futures_util::stream::iter(vec![
            Ok::<_, BoxError>(Frame::data(Bytes::from("hello"))),
            Ok(Frame::data(Bytes::from(" world"))),
        ]);
        let response = http::Response::builder()
            .status(200)
            .body(CacheBody::new(StreamBody::new(frames)))
            .unwrap();
        let (finalizer, outcomes) = finalizer();
        let response = CaptureBody::attach(response, finalizer);

        let delivered = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(delivered, Bytes::from("hello world"));

        let raw = raw_complete(&outcomes);
        let text = String::from_utf8_lossy(&raw).into_owned();
        assert!(text.contains("transfer-encoding: chunked"));
        assert!(text.contains("5\r\nhello\r\n"));

        let entry = parse_response(&raw).unwrap();
        assert_eq!(entry.body, Bytes::from("hello world"));
    }

    #[tokio::test]
    async fn dropping_the_body_mid_stream_aborts_the_capture() {
        let frames = futures_util::stream::iter(vec![
            Ok::<_, BoxError>(Frame::data(Bytes::from("partial"))),
            Ok(Frame::data(Bytes::from(" rest"))),
        ]);
        let response = http::Response::builder()
            .status(200)
            .body(CacheBody::new(StreamBody::new(frames)))
            .unwrap();
        let (finalizer, outcomes) = finalizer();
        let mut response = CaptureBody::attach(response, finalizer);

        // Deliver one frame, then the client goes away.
        let first = response.body_mut().frame().await.unwrap().unwrap();
        assert_eq!(first.data_ref().unwrap(), &Bytes::from("partial"));
        drop(response);

        let mut outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes.pop().unwrap(), CaptureOutcome::Aborted));
    }

    #[tokio::test]
    async fn erroring_bodies_abort_the_capture_and_forward_the_error() {
        let frames = futures_util::stream::iter(vec![
            Ok(Frame::data(Bytes::from("start"))),
            Err::<Frame<Bytes>, BoxError>("connection reset".into()),
        ]);
        let response = http::Response::builder()
            .status(200)
            .body(CacheBody::new(StreamBody::new(frames)))
            .unwrap();
        let (finalizer, outcomes) = finalizer();
        let response = CaptureBody::attach(response, finalizer);

        let err = response.into_body().collect().await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");

        let mut outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes.pop().unwrap(), CaptureOutcome::Aborted));
    }

    #[tokio::test]
    async fn finalizer_does_not_fire_again_on_drop_after_completion() {
        let response = http::Response::builder()
            .status(200)
            .header("content-length", "2")
            .body(CacheBody::full("ok"))
            .unwrap();
        let (finalizer, outcomes) = finalizer();
        let response = CaptureBody::attach(response, finalizer);

        let body = response.into_body();
        let _ = body.collect().await.unwrap();
        // The collected body has been dropped by now; still one outcome.
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }
}

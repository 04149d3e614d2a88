//! Response body wrapper that measures what is actually sent.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use http_body::{Body as HttpBody, Frame, SizeHint};

/// Called once with the number of data bytes the body produced.
pub type FinishHook = Box<dyn FnOnce(u64) + Send + 'static>;

/// Passes frames through unchanged while counting data bytes.
///
/// The hook fires exactly once: at end of stream, on a body error, or when the
/// body is dropped early (client gone, `HEAD` response).
pub struct CountingBody {
    inner: Body,
    bytes: u64,
    on_finish: Option<FinishHook>,
}

impl CountingBody {
    pub fn new(inner: Body, on_finish: impl FnOnce(u64) + Send + 'static) -> Self {
        Self {
            inner,
            bytes: 0,
            on_finish: Some(Box::new(on_finish)),
        }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    fn finish(&mut self) {
        if let Some(hook) = self.on_finish.take() {
            hook(self.bytes);
        }
    }
}

impl HttpBody for CountingBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.bytes += data.len() as u64;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish();
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

impl Drop for CountingBody {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<u64>>>, impl FnOnce(u64) + Send + 'static) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        (calls, move |bytes| sink.lock().unwrap().push(bytes))
    }

    #[tokio::test]
    async fn test_counts_and_passes_through() {
        let (calls, hook) = recorder();
        let body = CountingBody::new(Body::from("{\"status\":\"online\"}"), hook);

        let bytes = axum::body::to_bytes(Body::new(body), usize::MAX).await.unwrap();

        assert_eq!(&bytes[..], b"{\"status\":\"online\"}");
        assert_eq!(*calls.lock().unwrap(), vec![19]);
    }

    #[test]
    fn test_drop_without_polling_fires_once() {
        let (calls, hook) = recorder();
        let body = CountingBody::new(Body::from("unsent"), hook);
        drop(body);

        assert_eq!(*calls.lock().unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_streamed_chunks_counted() {
        let (calls, hook) = recorder();
        let chunks = vec![Ok::<_, std::io::Error>(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"defgh"))];
        let stream = Body::from_stream(futures_util::stream::iter(chunks));
        let body = CountingBody::new(stream, hook);

        let bytes = axum::body::to_bytes(Body::new(body), usize::MAX).await.unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(*calls.lock().unwrap(), vec![8]);
    }
}

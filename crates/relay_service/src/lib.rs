use async_trait::async_trait;
use bytes::Bytes;
use domain::{ProxyError, ResolvedMedia, bounded};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};

pub mod sniff;

use sniff::{Classification, SNIFF_WINDOW, classify, error_message, first_significant_byte};

/// Upper bound on how much of an error payload is read
pub const ERROR_BODY_LIMIT: usize = 64 * 1024;

/// Chunks buffered between the upstream reader and the client
pub const SINK_CAPACITY: usize = 8;

/// Destination of relayed media bytes
#[async_trait]
pub trait ByteSink: Send {
    /// Fails with [`ProxyError::SinkClosed`] once the consumer is gone.
    async fn send(&mut self, chunk: Bytes) -> Result<(), ProxyError>;
}

#[async_trait]
impl ByteSink for Vec<u8> {
    async fn send(&mut self, chunk: Bytes) -> Result<(), ProxyError> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}

type BodyItem = Result<Bytes, io::Error>;

/// Bounded-channel sink feeding an HTTP response body
///
/// The channel capacity is what gives end-to-end backpressure: the relay
/// can only read upstream as fast as the body is being polled.
pub struct ChannelSink {
    tx: mpsc::Sender<BodyItem>,
}

impl ChannelSink {
    /// Create a sink and the body stream it feeds. Dropping the body cancels `cancel`.
    pub fn channel(capacity: usize, cancel: CancellationToken) -> (Self, RelayBody) {
        let (tx, rx) = mpsc::channel(capacity);
        let body = RelayBody {
            rx: ReceiverStream::new(rx),
            _cancel_on_drop: cancel.drop_guard(),
        };
        (Self { tx }, body)
    }

    /// Terminate the body with an error so the client sees a failed transfer
    /// rather than a silently truncated file.
    pub async fn abort(&self, err: &ProxyError) {
        let _ = self.tx.send(Err(io::Error::other(err.to_string()))).await;
    }
}

#[async_trait]
impl ByteSink for ChannelSink {
    async fn send(&mut self, chunk: Bytes) -> Result<(), ProxyError> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| ProxyError::SinkClosed)
    }
}

/// Response body stream paired with a [`ChannelSink`]
pub struct RelayBody {
    rx: ReceiverStream<BodyItem>,
    _cancel_on_drop: DropGuard,
}

impl Stream for RelayBody {
    type Item = BodyItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_next_unpin(cx)
    }
}

/// Headers describing a classified media stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHeaders {
    pub content_type: &'static str,
    pub content_disposition: String,
    pub content_length: Option<u64>,
}

/// An upstream response already classified as media, not yet forwarded
pub struct MediaStream {
    headers: MediaHeaders,
    head: Vec<Bytes>,
    rest: BoxStream<'static, reqwest::Result<Bytes>>,
}

impl MediaStream {
    pub fn headers(&self) -> &MediaHeaders {
        &self.headers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub bytes_forwarded: u64,
    pub headers: MediaHeaders,
}

/// Fetches a direct media URL and pipes it into a [`ByteSink`]
pub struct StreamRelay {
    client: reqwest::Client,
    open_timeout: Duration,
    idle_timeout: Duration,
}

impl StreamRelay {
    /// `open_timeout` bounds everything up to classification; `idle_timeout`
    /// bounds each upstream read afterwards.
    pub fn new(client: reqwest::Client, open_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            client,
            open_timeout,
            idle_timeout,
        }
    }

    /// Fetch and classify. No byte reaches any sink before this returns `Ok`.
    pub async fn open(&self, media: &ResolvedMedia) -> Result<MediaStream, ProxyError> {
        bounded(self.open_timeout, self.open_unbounded(media)).await
    }

    async fn open_unbounded(&self, media: &ResolvedMedia) -> Result<MediaStream, ProxyError> {
        let response = self
            .client
            .get(&media.direct_url)
            .send()
            .await
            .map_err(|e| ProxyError::UpstreamFailure(e.to_string()))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = response.content_length();
        let mut stream = response.bytes_stream().boxed();

        if !status.is_success() {
            let body = collect_limited(Vec::new(), &mut stream).await;
            let message = if body.iter().all(u8::is_ascii_whitespace) {
                format!("HTTP {}", status.as_u16())
            } else {
                format!("HTTP {}: {}", status.as_u16(), error_message(&body))
            };
            return Err(ProxyError::UpstreamError(message));
        }

        // Peek until the first significant byte so leading whitespace cannot hide a JSON body.
        let mut head = Vec::new();
        let first_byte = loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    let first = first_significant_byte(&chunk);
                    head.push(chunk);
                    if first.is_some() {
                        break first;
                    }
                }
                Some(Err(e)) => return Err(ProxyError::UpstreamFailure(e.to_string())),
                None => break None,
            }
        };

        if first_byte.is_none() {
            return Err(ProxyError::UpstreamError("empty media response".to_string()));
        }

        let mut sniffed = Vec::with_capacity(SNIFF_WINDOW);
        for chunk in &head {
            let room = SNIFF_WINDOW.saturating_sub(sniffed.len());
            sniffed.extend_from_slice(&chunk[..chunk.len().min(room)]);
        }

        match classify(content_type.as_deref(), &sniffed) {
            Classification::Media => Ok(MediaStream {
                headers: MediaHeaders {
                    content_type: media.mime_type(),
                    content_disposition: media.content_disposition(),
                    content_length,
                },
                head,
                rest: stream,
            }),
            Classification::Error => {
                let buffered = head.iter().flat_map(|c| c.iter().copied()).collect();
                let body = collect_limited(buffered, &mut stream).await;
                let message = error_message(&body);
                tracing::warn!(
                    direct_url = %media.direct_url,
                    content_type = content_type.as_deref().unwrap_or(""),
                    %message,
                    "media host answered with an error payload"
                );
                Err(ProxyError::UpstreamError(message))
            }
        }
    }

    /// Pipe a classified stream into `sink` and return the number of bytes forwarded.
    ///
    /// Stops reading upstream as soon as `cancel` fires or the sink closes.
    pub async fn forward<S: ByteSink + ?Sized>(
        &self,
        stream: MediaStream,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<u64, ProxyError> {
        let MediaStream { head, mut rest, .. } = stream;
        let mut forwarded = 0u64;

        for chunk in head.into_iter().filter(|c| !c.is_empty()) {
            forwarded += chunk.len() as u64;
            push(sink, chunk, cancel).await?;
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProxyError::SinkClosed),
                next = tokio::time::timeout(self.idle_timeout, rest.next()) => next,
            };

            let chunk = match next {
                Err(_) => return Err(ProxyError::UpstreamTimeout(self.idle_timeout)),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(ProxyError::UpstreamFailure(e.to_string())),
                Ok(Some(Ok(chunk))) => chunk,
            };
            if chunk.is_empty() {
                continue;
            }

            forwarded += chunk.len() as u64;
            push(sink, chunk, cancel).await?;
        }

        Ok(forwarded)
    }

    /// Open, classify and forward in one call.
    pub async fn relay<S: ByteSink + ?Sized>(
        &self,
        media: &ResolvedMedia,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<RelayOutcome, ProxyError> {
        let stream = self.open(media).await?;
        let headers = stream.headers().clone();
        let bytes_forwarded = self.forward(stream, sink, cancel).await?;
        Ok(RelayOutcome {
            bytes_forwarded,
            headers,
        })
    }
}

async fn push<S: ByteSink + ?Sized>(
    sink: &mut S,
    chunk: Bytes,
    cancel: &CancellationToken,
) -> Result<(), ProxyError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProxyError::SinkClosed),
        sent = sink.send(chunk) => sent,
    }
}

/// Read at most [`ERROR_BODY_LIMIT`] bytes; read errors end the collection.
async fn collect_limited(
    mut buffer: Vec<u8>,
    stream: &mut BoxStream<'static, reqwest::Result<Bytes>>,
) -> Vec<u8> {
    while buffer.len() < ERROR_BODY_LIMIT {
        match stream.next().await {
            Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
            _ => break,
        }
    }
    buffer.truncate(ERROR_BODY_LIMIT);
    buffer
}

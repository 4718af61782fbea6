use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc, OnceLock};
use std::time::Duration;

use futures_util::StreamExt;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};

use crate::config::ChatApiConfig;
use crate::decoder::StreamDecoder;
use crate::error::{parse_error_message, ChatApiError};
use crate::events::StreamEvent;
use crate::headers::build_headers;
use crate::payload::ChatRequest;
use crate::url::normalize_stream_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Retry attempts after the initial send, applied only before any byte of a
/// reply body has been consumed.
const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How a reply stream reached its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The done marker arrived; remaining bytes were discarded.
    Completed,
    /// The body closed gracefully without the marker; any tail was already
    /// flushed as a final content fragment.
    Closed,
}

#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

/// Fully-drained stream: ordered events plus how the stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamResult {
    pub events: Vec<StreamEvent>,
    pub end: StreamEnd,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn stream_endpoint(&self) -> String {
        normalize_stream_url(&self.config.base_url)
    }

    pub(crate) fn header_map(&self) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config);
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    fn build_stream_request(
        &self,
        request: &ChatRequest,
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        let headers = self.header_map()?;
        Ok(self
            .http
            .post(self.stream_endpoint())
            .headers(headers)
            .json(request))
    }

    /// Issue the streaming request, retrying transient pre-stream failures.
    ///
    /// A terminal non-success status maps to [`ChatApiError::Status`]; no
    /// byte of a response body has been consumed when this returns an error.
    pub async fn send_with_retry(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<Response, ChatApiError> {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }

            let response = self.build_stream_request(request)?.send();
            let response = await_or_cancel(response, cancellation)
                .await?
                .map_err(ChatApiError::from);

            match response {
                Ok(response) => {
                    if response.status().is_success() {
                        return Ok(response);
                    }

                    let status = response.status();
                    last_status = Some(status);
                    let body = await_or_cancel(response.text(), cancellation)
                        .await?
                        .unwrap_or_else(|_| {
                            status
                                .canonical_reason()
                                .unwrap_or("request failed")
                                .to_string()
                        });
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if attempt < MAX_RETRIES && is_transient_failure(status, &body) {
                        await_or_cancel(tokio::time::sleep(retry_backoff(attempt)), cancellation)
                            .await?;
                        continue;
                    }

                    return Err(ChatApiError::Status(status, message));
                }
                Err(error) => {
                    last_error = Some(error.to_string());
                    if attempt < MAX_RETRIES {
                        await_or_cancel(tokio::time::sleep(retry_backoff(attempt)), cancellation)
                            .await?;
                        continue;
                    }
                    return Err(ChatApiError::RetryExhausted {
                        status: last_status,
                        last_error,
                    });
                }
            }
        }

        Err(ChatApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Stream one reply, forwarding every decoded event in arrival order.
    ///
    /// The loop suspends only while waiting for the next chunk; cancellation
    /// is checked at each suspension point, never mid-classification. Reading
    /// stops as soon as the done marker is decoded.
    pub async fn stream_chat_with_handler<F>(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<StreamEnd, ChatApiError>
    where
        F: FnMut(StreamEvent),
    {
        let response = self.send_with_retry(request, cancellation).await?;
        let mut bytes = response.bytes_stream();
        let mut decoder = StreamDecoder::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            let chunk = match chunk {
                Ok(chunk) => chunk,
                // Abrupt closure: flush any carried tail as final content
                // before surfacing the interruption, so partial output is
                // never discarded.
                Err(error) => {
                    if let Some(event) = decoder.finish() {
                        if !event.is_terminal() {
                            on_event(event);
                        }
                    }
                    return Err(ChatApiError::StreamInterrupted(error.to_string()));
                }
            };

            for event in decoder.feed(&chunk) {
                let terminal = event.is_terminal();
                on_event(event);
                if terminal {
                    return Ok(StreamEnd::Completed);
                }
            }
        }

        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        // Graceful close without the marker: flush the carry buffer.
        if let Some(event) = decoder.finish() {
            let terminal = event.is_terminal();
            on_event(event);
            if terminal {
                return Ok(StreamEnd::Completed);
            }
        }

        Ok(StreamEnd::Closed)
    }

    /// Drain one reply stream into a buffered result.
    pub async fn stream_chat(
        &self,
        request: &ChatRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<StreamResult, ChatApiError> {
        let mut events = Vec::new();
        let end = self
            .stream_chat_with_handler(request, cancellation, |event| {
                events.push(event);
            })
            .await?;

        Ok(StreamResult { events, end })
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

/// Failures worth another pre-stream attempt. Anything that happens after
/// streaming begins is never retried; it finalizes with partial state.
fn is_transient_failure(status: StatusCode, body: &str) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
        || transient_error_regex().is_match(body)
}

fn transient_error_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|overloaded|temporarily.?unavailable|connection.?(refused|reset)|timed.?out")
            .expect("transient error regex must compile")
    })
}

fn retry_backoff(attempt: u32) -> Duration {
    BASE_RETRY_DELAY * 2u32.saturating_pow(attempt.min(16))
}

async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}

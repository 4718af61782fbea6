use chat_api::{
    ChatApiClient, ChatApiConfig, ChatApiError, ChatRequest, StreamEnd, StreamEvent,
};

/// Shared cooperative cancellation flag for a session.
pub type CancelSignal = chat_api::CancellationSignal;

/// Blocking transport seam between the session aggregator and the backend.
///
/// The aggregator drives this from a dedicated worker thread per session, so
/// implementations may block. Events must be delivered in arrival order, and
/// the cancellation flag must be honored at every wait point.
pub trait ChatTransport: Send + Sync + 'static {
    /// Stream one reply, forwarding decoded events to `on_event`.
    fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<StreamEnd, ChatApiError>;

    /// Persist a thread title; fire-and-forget from the caller's view.
    fn rename_thread(&self, thread_id: &str, title: &str) -> Result<(), ChatApiError>;
}

/// Real HTTP transport backed by [`ChatApiClient`].
#[derive(Debug)]
pub struct HttpChatTransport {
    client: ChatApiClient,
}

impl HttpChatTransport {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        Ok(Self {
            client: ChatApiClient::new(config)?,
        })
    }

    #[must_use]
    pub fn client(&self) -> &ChatApiClient {
        &self.client
    }

    fn runtime() -> Result<tokio::runtime::Runtime, ChatApiError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                ChatApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })
    }
}

impl ChatTransport for HttpChatTransport {
    fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: &CancelSignal,
        on_event: &mut dyn FnMut(StreamEvent),
    ) -> Result<StreamEnd, ChatApiError> {
        let runtime = Self::runtime()?;
        runtime.block_on(
            self.client
                .stream_chat_with_handler(request, Some(cancel), on_event),
        )
    }

    fn rename_thread(&self, thread_id: &str, title: &str) -> Result<(), ChatApiError> {
        let runtime = Self::runtime()?;
        runtime.block_on(self.client.rename_thread(thread_id, title))
    }
}

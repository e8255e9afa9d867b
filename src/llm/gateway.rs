use crate::llm::models::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Why a stream reached its terminal signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The upstream sent `data: [DONE]`.
    Completed,
    /// The body ended without a `[DONE]` marker.
    EndOfStream,
    /// The streaming POST itself was answered with a non-2xx status.
    Rejected { status: u16 },
    /// Connecting or reading the body failed.
    Failed(String),
}

impl StreamEnd {
    pub fn is_failure(&self) -> bool {
        matches!(self, StreamEnd::Rejected { .. } | StreamEnd::Failed(_))
    }
}

/// One push delivered to a stream handler.
///
/// A handler sees zero or more `Content` events followed by exactly one
/// `Done`, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Content(String),
    Done(StreamEnd),
}

impl StreamEvent {
    /// The text carried by this event; empty for the terminal signal.
    pub fn fragment(&self) -> &str {
        match self {
            StreamEvent::Content(text) => text,
            StreamEvent::Done(_) => "",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_))
    }
}

/// Callback invoked for every [`StreamEvent`] of a streaming call.
pub type StreamHandler = Box<dyn FnMut(StreamEvent) + Send + 'static>;

/// Handle to a chat call running on the worker pool.
///
/// Awaiting the handle yields the call's [`ChatResponse`]. Cancelling it
/// stops delivery only: the network call keeps running to completion and
/// its result is dropped.
#[derive(Debug)]
pub struct ChatHandle {
    session_id: String,
    receiver: Option<oneshot::Receiver<ChatResponse>>,
    worker: Option<JoinHandle<()>>,
}

impl ChatHandle {
    pub(crate) fn new(session_id: String, receiver: oneshot::Receiver<ChatResponse>) -> Self {
        Self {
            session_id,
            receiver: Some(receiver),
            worker: None,
        }
    }

    /// Attach the task producing the response.
    pub(crate) fn with_worker(mut self, worker: JoinHandle<()>) -> Self {
        self.worker = Some(worker);
        self
    }

    /// True once the worker task has run to completion, whether or not the
    /// result has been taken or the handle cancelled.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| worker.is_finished())
    }

    /// Session id of the request this handle belongs to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stop delivering the result to this handle.
    pub fn cancel(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            receiver.close();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver.is_none()
    }

    /// Non-blocking poll for the result.
    ///
    /// Returns `None` while the call is still running or after the handle
    /// was cancelled.
    pub fn try_result(&mut self) -> Option<ChatResponse> {
        let receiver = self.receiver.as_mut()?;
        match receiver.try_recv() {
            Ok(response) => {
                self.receiver = None;
                Some(response)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.receiver = None;
                Some(self.lost_worker())
            }
        }
    }

    fn lost_worker(&self) -> ChatResponse {
        ChatResponse::error("Chat worker ended without a response", self.session_id.clone())
    }
}

impl Future for ChatHandle {
    type Output = ChatResponse;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(receiver) = this.receiver.as_mut() else {
            return Poll::Ready(ChatResponse::error(
                "Chat request was cancelled",
                this.session_id.clone(),
            ));
        };

        match Pin::new(receiver).poll(cx) {
            Poll::Ready(Ok(response)) => {
                this.receiver = None;
                Poll::Ready(response)
            }
            Poll::Ready(Err(_)) => {
                this.receiver = None;
                Poll::Ready(this.lost_worker())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Interface to a remote chat-completion service.
///
/// None of the calls surface a fault to the caller: failures become error
/// responses, a terminal stream event, or a `false` probe. Every call takes
/// the request mutably so a missing session id is backfilled in the
/// caller's value before any network activity.
///
/// `chat_async` and `chat_stream` spawn onto the ambient tokio runtime and
/// must be called from within one.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a request and wait for the full response.
    async fn chat(&self, request: &mut ChatRequest) -> ChatResponse;

    /// Send a request on the worker pool and return immediately.
    fn chat_async(&self, request: &mut ChatRequest) -> ChatHandle;

    /// Stream a response, pushing each fragment to `handler` from a
    /// background reader task. The returned handle completes after the
    /// terminal event has been delivered.
    fn chat_stream(&self, request: &mut ChatRequest, handler: StreamHandler) -> JoinHandle<()>;

    /// Single reachability probe; true iff the upstream answered 2xx.
    async fn health_check(&self) -> bool;
}

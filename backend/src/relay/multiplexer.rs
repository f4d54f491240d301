//! Fan-out orchestration for batch generation requests.
//!
//! `start` launches one task per slot plus a driver task. Slot tasks read
//! their upstream token stream and forward messages over a single channel;
//! the driver owns the slot states, serializes everything onto the outbound
//! stream, and emits the terminal event once all slots have settled.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::llm::{InferenceBackend, UpstreamError};

use super::{BatchEvent, BatchRecord, BatchRequest, BatchSink, GenerationSlot, RelayError};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Orchestrates `batch_count` concurrent upstream generations per request.
pub struct BatchMultiplexer {
    backend: Arc<dyn InferenceBackend>,
    sink: Arc<dyn BatchSink>,
    max_batch_size: usize,
}

/// Message from a slot task to the driver.
#[derive(Debug)]
enum SlotMessage {
    Delta { index: usize, text: String },
    Finished { index: usize },
    Failed { index: usize, error: UpstreamError },
}

impl BatchMultiplexer {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        sink: Arc<dyn BatchSink>,
        max_batch_size: usize,
    ) -> Self {
        Self {
            backend,
            sink,
            max_batch_size,
        }
    }

    /// Validate and launch a batch, returning the outbound stream at once.
    ///
    /// No upstream call is made when validation fails. The returned stream
    /// is the only handle on the batch: dropping it aborts the driver and
    /// every in-flight upstream generation.
    pub fn start(&self, request: BatchRequest) -> Result<BatchStream, RelayError> {
        let count = request.batch_count;
        if count < 1 || count > self.max_batch_size {
            return Err(RelayError::InvalidBatchCount {
                given: count,
                max: self.max_batch_size,
            });
        }

        tracing::info!(
            request_id = %request.request_id,
            batch_count = count,
            model = %request.profile.model,
            "starting batch generation"
        );

        let request = Arc::new(request);
        let (slot_tx, slot_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let slot_tasks: Vec<JoinHandle<()>> = (0..count)
            .map(|index| {
                tokio::spawn(run_slot(
                    index,
                    self.backend.clone(),
                    request.clone(),
                    slot_tx.clone(),
                ))
            })
            .collect();
        drop(slot_tx);

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let driver = tokio::spawn(drive(request, slot_rx, event_tx, self.sink.clone()));

        Ok(BatchStream {
            events: ReceiverStream::new(event_rx),
            driver,
            slot_tasks,
        })
    }
}

/// Run one upstream generation and forward its deltas in order.
///
/// Every parsed delta crosses this channel exactly once; there is no retry
/// or replay path that could redeliver a frame.
async fn run_slot(
    index: usize,
    backend: Arc<dyn InferenceBackend>,
    request: Arc<BatchRequest>,
    tx: mpsc::Sender<SlotMessage>,
) {
    let mut stream = match backend
        .chat_stream(&request.profile, &request.messages, &request.params)
        .await
    {
        Ok(stream) => stream,
        Err(error) => {
            let _ = tx.send(SlotMessage::Failed { index, error }).await;
            return;
        }
    };

    while let Some(item) = stream.next().await {
        let message = match item {
            Ok(text) => SlotMessage::Delta { index, text },
            Err(error) => {
                let _ = tx.send(SlotMessage::Failed { index, error }).await;
                return;
            }
        };
        if tx.send(message).await.is_err() {
            // Driver gone: the batch was cancelled.
            return;
        }
    }

    let _ = tx.send(SlotMessage::Finished { index }).await;
}

/// Consume slot messages, mutate the slots, emit outbound events.
async fn drive(
    request: Arc<BatchRequest>,
    mut slot_rx: mpsc::Receiver<SlotMessage>,
    event_tx: mpsc::Sender<BatchEvent>,
    sink: Arc<dyn BatchSink>,
) {
    let mut slots: Vec<GenerationSlot> = (0..request.batch_count).map(GenerationSlot::new).collect();
    let mut active = request.batch_count;

    while active > 0 {
        // recv returns None only if every slot task died without a terminal
        // message (e.g. the whole batch is being torn down).
        let Some(message) = slot_rx.recv().await else {
            break;
        };
        match message {
            SlotMessage::Delta { index, text } => {
                if !slots[index].append(&text) {
                    tracing::warn!(index, "dropping delta for settled slot");
                    continue;
                }
                if event_tx
                    .send(BatchEvent::Delta { index, text })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            SlotMessage::Finished { index } => {
                slots[index].complete();
                active -= 1;
            }
            SlotMessage::Failed { index, error } => {
                tracing::warn!(index, error = %error, "generation slot failed");
                slots[index].fail();
                active -= 1;
                if event_tx
                    .send(BatchEvent::SlotError {
                        index,
                        message: error.to_string(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }

    let record = BatchRecord {
        request_id: request.request_id.clone(),
        model: request.profile.model.clone(),
        input_prompt: request.user_prompt().to_string(),
        outputs: slots.into_iter().map(GenerationSlot::into_text).collect(),
        params: request.params.clone(),
    };
    if let Err(error) = sink.record_batch(&record) {
        tracing::warn!(
            error = %error,
            request_id = %record.request_id,
            "failed to record batch call"
        );
    }

    let _ = event_tx.send(BatchEvent::Done).await;
}

/// Outbound event stream for one batch request.
pub struct BatchStream {
    events: ReceiverStream<BatchEvent>,
    driver: JoinHandle<()>,
    slot_tasks: Vec<JoinHandle<()>>,
}

impl Stream for BatchStream {
    type Item = BatchEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().events).poll_next(cx)
    }
}

impl Drop for BatchStream {
    // No upstream connection outlives the downstream stream: aborting a
    // slot task drops its reqwest body stream, closing the connection.
    fn drop(&mut self) {
        self.driver.abort();
        for task in &self.slot_tasks {
            task.abort();
        }
    }
}

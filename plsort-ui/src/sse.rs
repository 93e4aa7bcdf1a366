//! Server-Sent Events decoding
//!
//! Turns the raw body of a `text/event-stream` response into a stream of
//! [`ProgressEvent`]s:
//!
//! ```text
//! : keep-alive
//!
//! data: {"type":"progress","message":"Adding tracks","current":1,"total":4}
//!
//! data: {"type":"complete","message":"Sort complete!"}
//! ```
//!
//! Messages are separated by blank lines; several `data:` lines in one message
//! are joined with `\n`. Comment lines and `id:`/`retry:` fields are ignored.
//! A message whose data is not a valid event is logged and skipped.

use crate::error::{SessionError, SessionResult};
use futures::stream::{BoxStream, Stream, StreamExt};
use plsort_common::ProgressEvent;
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::{trace, warn};

/// Decoded progress events of one operation channel
pub type EventStream = BoxStream<'static, SessionResult<ProgressEvent>>;

/// One dispatched SSE message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    pub data: String,
}

/// Incremental line-oriented SSE parser
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
    event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every message completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(message) = self.process_line(line.trim_end_matches('\r')) {
                messages.push(message);
            }
        }
        messages
    }

    /// Flush whatever is buffered when the body ends
    pub fn finish(&mut self) -> Option<SseMessage> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(message) = self.process_line(line.trim_end_matches('\r')) {
                return Some(message);
            }
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" | "retry" => {}
            other => trace!(field = other, "Ignoring unknown SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseMessage { event, data })
    }
}

/// Parse a message's data as a progress event, logging and skipping garbage
pub fn parse_progress(message: &SseMessage) -> Option<ProgressEvent> {
    match serde_json::from_str::<ProgressEvent>(&message.data) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, data = %message.data, "Skipping unparsable stream message");
            None
        }
    }
}

struct DecodeState<B, E> {
    inner: Pin<Box<dyn Stream<Item = Result<B, E>> + Send>>,
    decoder: SseDecoder,
    pending: VecDeque<ProgressEvent>,
    finished: bool,
}

/// Decode a raw byte stream into progress events
///
/// The stream ends when the body ends; a transport error is yielded once and
/// then the stream ends.
pub fn decode_progress_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<SessionError> + Send + 'static,
{
    let state = DecodeState {
        inner: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    let messages = state.decoder.push(chunk.as_ref());
                    state.pending.extend(messages.iter().filter_map(parse_progress));
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.finished = true;
                    if let Some(message) = state.decoder.finish() {
                        state.pending.extend(parse_progress(&message));
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use plsort_common::EventType;

    fn chunks(parts: &[&str]) -> EventStream {
        let items: Vec<Result<Vec<u8>, SessionError>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        decode_progress_stream(futures::stream::iter(items))
    }

    async fn collect(stream: EventStream) -> Vec<SessionResult<ProgressEvent>> {
        stream.collect().await
    }

    #[test]
    fn test_decoder_joins_multiline_data() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.push(b"event: progress\ndata: line one\ndata: line two\n\n");
        assert_eq!(
            messages,
            vec![SseMessage { event: Some("progress".into()), data: "line one\nline two".into() }]
        );
    }

    #[test]
    fn test_decoder_ignores_comments_and_ids() {
        let mut decoder = SseDecoder::new();
        let messages = decoder.push(b": keep-alive\n\nid: 7\nretry: 1000\ndata:x\r\n\r\n");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, "x");
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_handles_split_utf8() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: café\n\n".as_bytes();
        let split = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(decoder.push(&bytes[..split]).is_empty());
        let messages = decoder.push(&bytes[split..]);
        assert_eq!(messages[0].data, "café");
    }

    #[tokio::test]
    async fn test_events_split_across_chunks() {
        let events = collect(chunks(&[
            "data: {\"type\":\"info\",\"message\":\"Connected to event stream\"}\n\ndata: {\"type\":\"prog",
            "ress\",\"message\":\"Adding\",\"current\":1,\"total\":2}\n\n",
            "data: {\"type\":\"complete\",\"message\":\"done\"}\n\n",
        ]))
        .await;

        let kinds: Vec<EventType> = events.into_iter().map(|e| e.unwrap().kind).collect();
        assert_eq!(kinds, vec![EventType::Info, EventType::Progress, EventType::Complete]);
    }

    #[tokio::test]
    async fn test_json_split_over_data_lines() {
        let events = collect(chunks(&[
            "data: {\"type\":\"error\",\ndata: \"message\":\"Spotify said no\"}\n\n",
        ]))
        .await;
        let event = events[0].as_ref().unwrap();
        assert_eq!(event.kind, EventType::Error);
        assert_eq!(event.message, "Spotify said no");
    }

    #[tokio::test]
    async fn test_invalid_json_is_skipped() {
        let events = collect(chunks(&[
            "data: not json\n\n",
            "data: {\"type\":\"progress\",\"message\":\"ok\"}\n\n",
        ]))
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap().message, "ok");
    }

    #[tokio::test]
    async fn test_final_message_without_blank_line() {
        let events = collect(chunks(&["data: {\"type\":\"complete\",\"message\":\"end\"}"])).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let items: Vec<Result<Vec<u8>, SessionError>> = vec![
            Ok(b"data: {\"type\":\"progress\",\"message\":\"a\"}\n\n".to_vec()),
            Err(SessionError::Network("reset".into())),
            Ok(b"data: {\"type\":\"complete\",\"message\":\"late\"}\n\n".to_vec()),
        ];
        let events = collect(decode_progress_stream(futures::stream::iter(items))).await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(SessionError::Network(_))));
    }
}

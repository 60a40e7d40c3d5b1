//! Line sources for the two streaming framings

use std::pin::Pin;

use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::{Stream, StreamExt, TryStreamExt, future};
use prism_core::{Attribution, CanonicalError};
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::io::StreamReader;

/// Longest line accepted before the stream fails
const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Stream of text lines, or of SSE `data` payloads
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String, CanonicalError>> + Send>>;

/// Server-sent events, yielding the `data` payload of each event
///
/// Multi-line `data` fields arrive joined, comments and other fields are
/// consumed by the parser. A line that is not UTF-8 is dropped before
/// parsing, so the events around it still arrive.
pub fn sse_lines<S>(body: S, origin: Attribution) -> LineStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let events = text_lines(body, origin.clone())
        .map_ok(|mut line| {
            line.push('\n');
            line
        })
        .eventsource()
        .map(move |event| match event {
            Ok(event) => Ok(event.data),
            Err(EventStreamError::Transport(error)) => Err(error),
            Err(e) => {
                tracing::error!(provider = %origin.provider, error = %e, "SSE stream failed");
                Err(CanonicalError::network(e.to_string(), origin.clone()))
            }
        });

    Box::pin(events)
}

/// Newline-delimited JSON, one line per item
pub fn ndjson_lines<S>(body: S, origin: Attribution) -> LineStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    Box::pin(text_lines(body, origin))
}

/// Body split on `\n`, without the delimiter
///
/// Lines that are not valid UTF-8 are logged and skipped.
fn text_lines<S>(body: S, origin: Attribution) -> impl Stream<Item = Result<String, CanonicalError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let reader = StreamReader::new(body.map_err(std::io::Error::other));
    let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), MAX_LINE_LENGTH);

    FramedRead::new(reader, codec).filter_map(move |line| {
        let item = match line {
            Ok(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(line) => Some(Ok(line)),
                Err(e) => {
                    tracing::debug!(provider = %origin.provider, error = %e, "skipping stream line that is not UTF-8");
                    None
                }
            },
            Err(e) => {
                tracing::error!(provider = %origin.provider, error = %e, "stream read failed");
                Some(Err(CanonicalError::network(e.to_string(), origin.clone())))
            }
        };
        future::ready(item)
    })
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use prism_core::RequestKind;

    use super::*;

    fn body(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static + use<> {
        let chunks: Vec<&'static [u8]> = chunks.iter().map(|chunk| chunk.as_bytes()).collect();
        raw_body(&chunks)
    }

    fn raw_body(chunks: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static + use<> {
        stream::iter(
            chunks
                .iter()
                .map(|chunk| Ok(Bytes::from_static(chunk)))
                .collect::<Vec<_>>(),
        )
    }

    fn origin() -> Attribution {
        Attribution::new("local", "m", RequestKind::ChatStream)
    }

    #[tokio::test]
    async fn sse_payloads_survive_chunk_boundaries() {
        let lines: Vec<String> = sse_lines(
            body(&["data: {\"a\"", ":1}\n\n", "event: ping\ndata: [DONE]\n\n"]),
            origin(),
        )
        .try_collect()
        .await
        .unwrap();

        assert_eq!(lines, vec![r#"{"a":1}"#, "[DONE]"]);
    }

    #[tokio::test]
    async fn ndjson_lines_split_across_chunks() {
        let lines: Vec<String> = ndjson_lines(body(&["{\"done\":", "false}\n{\"done\":true}\n"]), origin())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(lines, vec![r#"{"done":false}"#, r#"{"done":true}"#]);
    }

    #[tokio::test]
    async fn ndjson_keeps_unterminated_last_line() {
        let lines: Vec<String> = ndjson_lines(body(&["{\"a\":1}\n{\"b\":2}"]), origin())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn ndjson_skips_line_that_is_not_utf8() {
        let lines: Vec<String> = ndjson_lines(
            raw_body(&[b"{\"content\":\"a\"}\n\xff\xfe{broken\n", b"{\"content\":\"b\"}\n{\"done\":true}"]),
            origin(),
        )
        .try_collect()
        .await
        .unwrap();

        assert_eq!(lines, vec![r#"{"content":"a"}"#, r#"{"content":"b"}"#, r#"{"done":true}"#]);
    }

    #[tokio::test]
    async fn sse_skips_line_that_is_not_utf8() {
        let lines: Vec<String> = sse_lines(
            raw_body(&[
                b"data: {\"a\":1}\n\n",
                b"data: \xff\xfe\n\n",
                b"data: {\"b\":2}\n\ndata: [DONE]\n\n",
            ]),
            origin(),
        )
        .try_collect()
        .await
        .unwrap();

        assert_eq!(lines, vec![r#"{"a":1}"#, r#"{"b":2}"#, "[DONE]"]);
    }

    #[tokio::test]
    async fn sse_crlf_line_endings() {
        let lines: Vec<String> = sse_lines(body(&["data: {\"a\":1}\r\n\r\n"]), origin())
            .try_collect()
            .await
            .unwrap();

        assert_eq!(lines, vec![r#"{"a":1}"#]);
    }
}

//! Reading response bodies, with passthrough for oversized ones
//!
//! Bodies under the configured threshold are read into a caller-provided
//! buffer for full decoding. Larger bodies are handed back as a byte stream
//! with usage pulled from a bounded preview by a structural scan.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use http::StatusCode;
use prism_core::{Attribution, CanonicalError, LargePayloadOptions, context::MAX_PREVIEW_SIZE};
use serde::Deserialize;

use crate::adapter::UsageField;
use crate::error::transport_error;
use crate::json_scan;
use crate::types::Usage;

/// Error bodies are never read past this many bytes
pub const MAX_ERROR_BODY_SIZE: usize = 512 * 1024;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, CanonicalError>> + Send>>;

/// Reduced-fidelity result for a body that was not decoded
pub struct LargePayloadResult {
    pub status: StatusCode,
    pub content_type: Option<String>,
    /// Upstream `Content-Length`, when it was known
    pub content_length: Option<u64>,
    /// Usage found in the preview window, if any
    pub usage: Option<Usage>,
    /// Time to the response headers
    pub latency_ms: u64,
    /// The full upstream body, starting with the bytes already read
    pub body: ByteStream,
}

impl fmt::Debug for LargePayloadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LargePayloadResult")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("usage", &self.usage)
            .field("latency_ms", &self.latency_ms)
            .finish_non_exhaustive()
    }
}

/// How a body was consumed by [`read_body`]
pub enum BodyRead {
    /// The whole body is in the caller's buffer
    Buffered,
    Passthrough { usage: Option<Usage>, body: ByteStream },
}

impl fmt::Debug for BodyRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered => f.write_str("Buffered"),
            Self::Passthrough { usage, .. } => f.debug_struct("Passthrough").field("usage", usage).finish_non_exhaustive(),
        }
    }
}

/// Read a success body, switching to passthrough past the threshold
///
/// `buf` receives the body on the buffered path and is left holding
/// whatever prefix was read on the passthrough path.
pub async fn read_body<S>(
    body: S,
    content_length: Option<u64>,
    options: Option<LargePayloadOptions>,
    usage_field: UsageField,
    buf: &mut Vec<u8>,
    origin: &Attribution,
) -> Result<BodyRead, CanonicalError>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let mut body = Box::pin(body);
    let Some(options) = options else {
        read_until(&mut body, usize::MAX, buf, origin).await?;
        return Ok(BodyRead::Buffered);
    };

    let threshold = options.threshold;
    let known_large = match content_length.map(usize::try_from) {
        Some(Ok(length)) if length <= threshold => {
            buf.reserve(length);
            read_until(&mut body, usize::MAX, buf, origin).await?;
            return Ok(BodyRead::Buffered);
        }
        Some(_) => true,
        None => false,
    };

    if known_large {
        read_until(&mut body, options.preview_size(), buf, origin).await?;
    } else {
        let exhausted = read_until(&mut body, threshold.saturating_add(1), buf, origin).await?;
        if exhausted && buf.len() <= threshold {
            return Ok(BodyRead::Buffered);
        }
    }

    let preview_len = buf.len().min(if known_large { options.preview_size() } else { MAX_PREVIEW_SIZE });
    let usage = extract_usage(&buf[..preview_len], usage_field);

    tracing::debug!(
        provider = %origin.provider,
        content_length,
        threshold,
        prefix = buf.len(),
        has_usage = usage.is_some(),
        "passing large response body through"
    );

    let prefix = Bytes::copy_from_slice(buf);
    let origin = origin.clone();
    let rest = body.map(move |chunk| chunk.map_err(|e| transport_error(&e, origin.clone())));
    let body = stream::once(async move { Ok(prefix) }).chain(rest);

    Ok(BodyRead::Passthrough {
        usage,
        body: Box::pin(body),
    })
}

/// Read a whole body into `buf`
pub async fn read_to_end<S>(body: S, buf: &mut Vec<u8>, origin: &Attribution) -> Result<(), CanonicalError>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>>,
{
    let mut body = std::pin::pin!(body);
    read_until(&mut body, usize::MAX, buf, origin).await.map(drop)
}

/// Read an error body, capped at [`MAX_ERROR_BODY_SIZE`]
///
/// A transport failure mid-body keeps whatever was read so far.
pub async fn read_error_body<S>(body: S) -> Vec<u8>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>>,
{
    let mut body = std::pin::pin!(body);
    let mut buf = Vec::new();
    while buf.len() < MAX_ERROR_BODY_SIZE {
        match body.next().await {
            Some(Ok(chunk)) => {
                let take = chunk.len().min(MAX_ERROR_BODY_SIZE - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Some(Err(e)) => {
                tracing::debug!(error = %e, "error body read failed");
                break;
            }
            None => break,
        }
    }
    buf
}

/// Read chunks until `buf` holds at least `limit` bytes
///
/// Returns whether the body ended. The last chunk is kept whole, so `buf`
/// may end up past `limit`.
async fn read_until<S>(body: &mut S, limit: usize, buf: &mut Vec<u8>, origin: &Attribution) -> Result<bool, CanonicalError>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    while buf.len() < limit {
        match body.next().await {
            Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
            Some(Err(e)) => {
                tracing::error!(provider = %origin.provider, error = %e, "failed to read response body");
                return Err(transport_error(&e, origin.clone()));
            }
            None => return Ok(true),
        }
    }
    Ok(false)
}

/// Usage counters under any of the spellings providers use
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UsageCounts {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
    input_tokens: u64,
    output_tokens: u64,
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: u64,
    #[serde(rename = "totalTokenCount")]
    total_token_count: u64,
}

impl UsageCounts {
    fn into_usage(self) -> Option<Usage> {
        let prompt = first_nonzero(&[self.prompt_tokens, self.input_tokens, self.prompt_token_count]);
        let completion = first_nonzero(&[self.completion_tokens, self.output_tokens, self.candidates_token_count]);
        let total = match first_nonzero(&[self.total_tokens, self.total_token_count]) {
            0 => prompt + completion,
            total => total,
        };

        (total > 0).then(|| Usage {
            total_tokens: total,
            ..Usage::new(prompt, completion)
        })
    }
}

fn first_nonzero(values: &[u64]) -> u64 {
    values.iter().copied().find(|&v| v > 0).unwrap_or_default()
}

/// Usage from a possibly truncated body prefix
pub fn extract_usage(preview: &[u8], field: UsageField) -> Option<Usage> {
    let counts = match field {
        UsageField::Object(name) => {
            let range = json_scan::top_level_field(preview, name)?;
            serde_json::from_slice::<UsageCounts>(&preview[range]).ok()?
        }
        UsageField::TopLevel => {
            let mut counts = UsageCounts::default();
            for (name, range) in json_scan::top_level_fields(preview, &["prompt_eval_count", "eval_count"]) {
                let value = serde_json::from_slice::<u64>(&preview[range]).unwrap_or_default();
                match name {
                    "prompt_eval_count" => counts.prompt_tokens = value,
                    _ => counts.completion_tokens = value,
                }
            }
            counts
        }
    };

    counts.into_usage()
}

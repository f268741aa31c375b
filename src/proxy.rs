use crate::config::UpstreamConfig;
use crate::error::{ProxyError, Result};
use crate::translate::openai_types::{ChatCompletionResponse, UpstreamRequest};
use crate::translate::response::{parse_upstream_body, to_completion};
use crate::translate::streaming::{Frame, SseReframer};

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use std::pin::Pin;

/// Outcome of proxying a streaming request: the re-framed events, in order.
pub type FrameStream = Pin<Box<dyn Stream<Item = std::result::Result<Frame, std::io::Error>> + Send>>;

/// Build the shared upstream HTTP client.
pub fn build_client(config: &UpstreamConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(config.connect_timeout())
        .build()?)
}

/// Forward a non-streaming request and translate the reply.
pub async fn proxy_non_streaming(
    body: &UpstreamRequest,
    model: &str,
    config: &UpstreamConfig,
    client: &reqwest::Client,
) -> Result<ChatCompletionResponse> {
    let response = send(body, config, client, true).await?;
    let text = response.text().await.map_err(ProxyError::transport)?;

    tracing::debug!(body_len = text.len(), "upstream response received");

    let payload = parse_upstream_body(&text)?;
    let completion = to_completion(&payload, model);

    tracing::info!(
        model,
        id = %completion.id,
        finish_reason = %completion.choices[0].finish_reason,
        "completion translated"
    );

    Ok(completion)
}

/// Forward a streaming request, returning the re-framed event stream.
pub async fn proxy_streaming(
    body: &UpstreamRequest,
    model: &str,
    config: &UpstreamConfig,
    client: &reqwest::Client,
) -> Result<FrameStream> {
    let response = send(body, config, client, false).await?;
    Ok(Box::pin(reframe(response.bytes_stream(), model.to_string())))
}

async fn send(
    body: &UpstreamRequest,
    config: &UpstreamConfig,
    client: &reqwest::Client,
    with_timeout: bool,
) -> Result<reqwest::Response> {
    tracing::info!(
        url = %config.url,
        model = %body.model,
        stream = body.stream.unwrap_or(false),
        messages = body.messages.len(),
        "POST upstream"
    );

    let mut request = client
        .post(&config.url)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "*/*")
        .header(USER_AGENT, &config.user_agent);

    if let Some(origin) = config.origin.as_deref().filter(|o| !o.is_empty()) {
        request = request.header(ORIGIN, origin);
    }
    if let Some(referer) = config.referer.as_deref().filter(|r| !r.is_empty()) {
        request = request.header(REFERER, referer);
    }
    // Streams may legitimately run for a long time; only the connect timeout applies.
    if with_timeout {
        request = request.timeout(config.timeout());
    }

    let response = request
        .json(body)
        .send()
        .await
        .map_err(ProxyError::transport)?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %truncate(&text, 300), "upstream error");
        return Err(ProxyError::Upstream {
            status: status.as_u16(),
            body: text,
        });
    }

    Ok(response)
}

/// Re-frame an upstream SSE byte stream into client frames.
///
/// The sentinel is always the last frame of a stream that ends normally. A
/// failed upstream read ends the output with an error instead, so the client
/// sees a broken stream rather than a clean finish.
pub fn reframe<S, E>(
    byte_stream: S,
    model: String,
) -> impl Stream<Item = std::result::Result<Frame, std::io::Error>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut reframer = SseReframer::new(&model);
        let mut frames_sent = 0usize;
        let mut failed = false;

        tokio::pin!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, frames_sent, "upstream stream failed");
                    yield Err(std::io::Error::other(format!("upstream stream failed: {e}")));
                    failed = true;
                    break;
                }
            };

            for frame in reframer.push(&chunk) {
                frames_sent += 1;
                yield Ok(frame);
            }

            if reframer.is_done() {
                break;
            }
        }

        if !failed {
            for frame in reframer.finish() {
                frames_sent += 1;
                yield Ok(frame);
            }
            tracing::info!(model = %model, frames_sent, "stream completed");
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

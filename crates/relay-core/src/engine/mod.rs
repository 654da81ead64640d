use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

use relay_common::{ProxyConfig, ProxyError, Strategy, error_envelope};
use relay_pool::select::{record_error, record_success};
use relay_pool::{Outcome, TransportErrorKind};
use relay_protocol::claude::types::CreateMessageBody;
use relay_protocol::openai::chat::{ChatCompletionRequest, ChatUsage};
use relay_storage::UsageUpdate;
use relay_transform::stream2nostream::ChatCollapse;
use relay_transform::{
    detect, headers as dialect_headers, openai_chat2claude, openai_chat2codex, rules,
};

use crate::classify::{InboundDialect, InboundPath};
use crate::state::{AppState, PoolKind};
use crate::upstream_client::{
    AttemptTimeouts, TransportFailure, UpstreamBody, UpstreamClient, UpstreamRequest,
    UpstreamResponse,
};

mod diag;
pub mod stream;
mod wire;

use diag::DiagBuffer;
use stream::{ClientFormat, ClientFrame, StreamRewriter, encode_chunk, encode_done};

const NORMAL_RETRY_DELAY: Duration = Duration::from_secs(2);
const EXHAUSTIVE_WALKS_PER_ENTRY: usize = 3;

#[derive(Clone)]
pub struct Engine {
    state: Arc<AppState>,
    client: Arc<dyn UpstreamClient>,
}

pub enum EngineResponse {
    Json {
        status: u16,
        content_type: &'static str,
        body: Bytes,
    },
    Stream {
        status: u16,
        content_type: &'static str,
        body: mpsc::Receiver<Bytes>,
    },
}

/// Everything one request needs across all its attempts. The body is
/// serialized once and reused verbatim; headers are rebuilt per attempt.
#[derive(Clone)]
struct RequestPlan {
    pool: PoolKind,
    upstream_path: String,
    body: Bytes,
    /// Dialect-fixed header set (claude identity headers). Empty for the
    /// responses pool, whose headers depend on the selected entry.
    base_headers: Vec<(String, String)>,
    format: ClientFormat,
    client_wants_stream: bool,
    wire_streaming: bool,
    model: String,
}

#[derive(Debug, Clone)]
struct Target {
    name: String,
    base_url: String,
    key: String,
}

struct Acquired {
    response: UpstreamResponse,
    /// Main-pool index of the serving entry; None for retry-ladder rungs.
    pool_index: Option<usize>,
}

enum AcquireEnd {
    Upstream(Acquired),
    /// `normal_retry`: the upstream response goes to the client verbatim.
    Verbatim(EngineResponse),
}

impl Engine {
    pub fn new(state: Arc<AppState>, client: Arc<dyn UpstreamClient>) -> Self {
        Self { state, client }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn authenticate_user_key(&self, key: &str) -> bool {
        self.state.authenticate_user_key(key)
    }

    pub async fn handle(
        &self,
        trace_id: &str,
        inbound: &InboundPath,
        body: Bytes,
    ) -> Result<EngineResponse, ProxyError> {
        let config = self.state.config();
        let plan = build_plan(&config, inbound, &body)?;
        let mut diag = DiagBuffer::new(trace_id);

        let acquired = match self.acquire(&config, &plan, &mut diag).await {
            Ok(AcquireEnd::Upstream(acquired)) => acquired,
            Ok(AcquireEnd::Verbatim(resp)) => {
                self.record_usage(zero_usage(&plan)).await;
                return Ok(resp);
            }
            Err(err) => {
                self.record_usage(zero_usage(&plan)).await;
                return Err(err);
            }
        };

        let Acquired {
            response,
            pool_index,
        } = acquired;

        match response.body {
            UpstreamBody::Bytes(bytes) => {
                // Non-streaming upstream call (native client, stream=false).
                self.record_usage(usage_from_json(&bytes, &plan.model)).await;
                Ok(EngineResponse::Json {
                    status: response.status,
                    content_type: "application/json",
                    body: bytes,
                })
            }
            UpstreamBody::Stream(rx) => {
                if plan.client_wants_stream {
                    let (tx, out_rx) = mpsc::channel::<Bytes>(32);
                    let engine = self.clone();
                    let config = config.clone();
                    tokio::spawn(async move {
                        engine
                            .stream_to_client(config, plan, rx, pool_index, tx, diag)
                            .await;
                    });
                    Ok(EngineResponse::Stream {
                        status: 200,
                        content_type: "text/event-stream",
                        body: out_rx,
                    })
                } else {
                    self.collapse(&config, &plan, rx, pool_index, &mut diag).await
                }
            }
        }
    }

    /// Phase one: try upstreams until response headers arrive. Every
    /// failure is classified and drives the strategy machine; only the
    /// final unrecovered outcome escapes.
    async fn acquire(
        &self,
        config: &Arc<ProxyConfig>,
        plan: &RequestPlan,
        diag: &mut DiagBuffer,
    ) -> Result<AcquireEnd, ProxyError> {
        self.acquire_from(config, plan, diag, 0).await
    }

    async fn acquire_from(
        &self,
        config: &Arc<ProxyConfig>,
        plan: &RequestPlan,
        diag: &mut DiagBuffer,
        start_attempt: u32,
    ) -> Result<AcquireEnd, ProxyError> {
        let settings = self.state.pool_settings(plan.pool, config);
        let pool = self.state.pool(plan.pool);
        let max_retries = config.timeout_settings.max_retries;
        let mut attempt_no: u32 = start_attempt;

        for _ in 0..max_retries {
            let selected = {
                let mut guard = pool.lock().await;
                relay_pool::select(&mut guard, &settings, OffsetDateTime::now_utc())
            };
            let Some(selected) = selected else { break };
            let target = Target {
                name: selected.entry.name.clone(),
                base_url: selected.entry.base_url.clone(),
                key: selected.entry.key.clone(),
            };

            match self.try_target(config, plan, &target, attempt_no, false).await {
                Ok(resp) if is_success(resp.status) => {
                    let mut guard = pool.lock().await;
                    record_success(&mut guard, selected.index);
                    drop(guard);
                    info!(
                        entry = %target.name,
                        attempt = attempt_no,
                        "upstream accepted request"
                    );
                    return Ok(AcquireEnd::Upstream(Acquired {
                        response: resp,
                        pool_index: Some(selected.index),
                    }));
                }
                Ok(resp) => {
                    let status = resp.status;
                    let body = body_bytes(resp.body);
                    diag.push(
                        &self.state.flow,
                        format!("entry {} returned HTTP {status}", target.name),
                    );
                    match self.strategy_for(config, plan, &Outcome::HttpStatus(status)) {
                        Strategy::SwitchApi => {
                            let mut guard = pool.lock().await;
                            record_error(&mut guard, selected.index, &settings, OffsetDateTime::now_utc());
                        }
                        Strategy::StrategyRetry => {
                            return self.ladder(config, plan, diag).await;
                        }
                        Strategy::NormalRetry => {
                            tokio::time::sleep(NORMAL_RETRY_DELAY).await;
                            return Ok(AcquireEnd::Verbatim(EngineResponse::Json {
                                status,
                                content_type: "application/json",
                                body,
                            }));
                        }
                    }
                }
                Err(failure) => {
                    diag.push(
                        &self.state.flow,
                        format!(
                            "entry {} transport failure ({}): {}",
                            target.name,
                            failure.kind.as_key(),
                            failure.message
                        ),
                    );
                    match self.strategy_for(config, plan, &Outcome::Transport(failure.kind)) {
                        Strategy::SwitchApi => {
                            let mut guard = pool.lock().await;
                            record_error(&mut guard, selected.index, &settings, OffsetDateTime::now_utc());
                        }
                        Strategy::StrategyRetry => {
                            return self.ladder(config, plan, diag).await;
                        }
                        Strategy::NormalRetry => {
                            tokio::time::sleep(NORMAL_RETRY_DELAY).await;
                            return Ok(AcquireEnd::Verbatim(EngineResponse::Json {
                                status: 502,
                                content_type: "application/json",
                                body: error_envelope(
                                    failure.message,
                                    "upstream_error",
                                    "transport_error",
                                ),
                            }));
                        }
                    }
                }
            }
            attempt_no += 1;
        }

        self.exhaustive_fallthrough(config, plan, diag, attempt_no).await
    }

    /// The retry ladder never touches the main pool: the configured rungs
    /// are tried once each, in order, with the extended read deadline.
    async fn ladder(
        &self,
        config: &Arc<ProxyConfig>,
        plan: &RequestPlan,
        diag: &mut DiagBuffer,
    ) -> Result<AcquireEnd, ProxyError> {
        let mut attempt_no: u32 = 1;
        for rung in config.enabled_retry_rungs() {
            let target = Target {
                name: rung.name.clone(),
                base_url: rung.base_url.clone(),
                key: rung.key.clone(),
            };
            match self.try_target(config, plan, &target, attempt_no, true).await {
                Ok(resp) if is_success(resp.status) => {
                    info!(rung = %target.name, "retry ladder rung accepted request");
                    return Ok(AcquireEnd::Upstream(Acquired {
                        response: resp,
                        pool_index: None,
                    }));
                }
                Ok(resp) => diag.push(
                    &self.state.flow,
                    format!("ladder rung {} returned HTTP {}", target.name, resp.status),
                ),
                Err(failure) => diag.push(
                    &self.state.flow,
                    format!(
                        "ladder rung {} transport failure: {}",
                        target.name, failure.message
                    ),
                ),
            }
            attempt_no += 1;
        }

        diag.flush_failure(&self.state.flow);
        Err(ProxyError::bad_gateway("all retry ladder rungs exhausted"))
    }

    /// Last-resort tier: walk every configured entry up to three full
    /// rounds, ignoring availability. Users depend on this surviving
    /// multi-entry outages.
    async fn exhaustive_fallthrough(
        &self,
        config: &Arc<ProxyConfig>,
        plan: &RequestPlan,
        diag: &mut DiagBuffer,
        mut attempt_no: u32,
    ) -> Result<AcquireEnd, ProxyError> {
        let entries = {
            let guard = self.state.pool(plan.pool).lock().await;
            guard.entries.clone()
        };
        if entries.is_empty() {
            diag.flush_failure(&self.state.flow);
            return Err(ProxyError::bad_gateway("no upstream configured"));
        }

        for walk in 0..entries.len() * EXHAUSTIVE_WALKS_PER_ENTRY {
            let index = walk % entries.len();
            let entry = &entries[index];
            let target = Target {
                name: entry.name.clone(),
                base_url: entry.base_url.clone(),
                key: entry.key.clone(),
            };
            match self.try_target(config, plan, &target, attempt_no, false).await {
                Ok(resp) if is_success(resp.status) => {
                    let mut guard = self.state.pool(plan.pool).lock().await;
                    record_success(&mut guard, index);
                    drop(guard);
                    info!(entry = %target.name, "exhaustive fallthrough found a live entry");
                    return Ok(AcquireEnd::Upstream(Acquired {
                        response: resp,
                        pool_index: Some(index),
                    }));
                }
                Ok(resp) => diag.push(
                    &self.state.flow,
                    format!(
                        "fallthrough walk {walk} on {} returned HTTP {}",
                        target.name, resp.status
                    ),
                ),
                Err(failure) => diag.push(
                    &self.state.flow,
                    format!(
                        "fallthrough walk {walk} on {} failed: {}",
                        target.name, failure.message
                    ),
                ),
            }
            attempt_no += 1;
        }

        diag.flush_failure(&self.state.flow);
        Err(ProxyError::bad_gateway("all upstreams exhausted"))
    }

    /// The ladder is a messages-pool facility; the responses pool has no
    /// rungs, so its `strategy_retry` outcomes degrade to entry switching.
    fn strategy_for(
        &self,
        config: &ProxyConfig,
        plan: &RequestPlan,
        outcome: &Outcome,
    ) -> Strategy {
        let strategy = relay_pool::classify(&config.error_handling_strategies, outcome);
        if strategy == Strategy::StrategyRetry && plan.pool == PoolKind::Responses {
            return Strategy::SwitchApi;
        }
        strategy
    }

    /// One attempt against one target. The HTTP client is created inside
    /// `send` and dies with the attempt; retries additionally defeat any
    /// intermediary caches.
    async fn try_target(
        &self,
        config: &ProxyConfig,
        plan: &RequestPlan,
        target: &Target,
        attempt_no: u32,
        ladder: bool,
    ) -> Result<UpstreamResponse, TransportFailure> {
        let url = wire::join_url(&target.base_url, &plan.upstream_path);

        let mut headers = match plan.pool {
            PoolKind::Messages => {
                let mut headers = plan.base_headers.clone();
                let (name, value) = wire::bearer_auth(&target.key);
                headers.push((name, value));
                headers
            }
            PoolKind::Responses => dialect_headers::codex_headers(&target.key, &target.base_url),
        };
        if attempt_no > 0 && config.timeout_settings.modify_retry_headers {
            headers = wire::merge_headers(&headers, wire::retry_defeat_headers(attempt_no));
        }
        wire::set_content_length(&mut headers, &plan.body);

        let timeouts = attempt_timeouts(config, plan, ladder);
        self.client
            .send(UpstreamRequest {
                url,
                headers,
                body: plan.body.clone(),
                stream: plan.wire_streaming,
                timeouts,
            })
            .await
    }

    /// Streaming phase for clients that asked to stream. Runs detached:
    /// response headers are already on the wire. Recovery is silent only
    /// while nothing has been flushed to the client.
    async fn stream_to_client(
        self,
        config: Arc<ProxyConfig>,
        plan: RequestPlan,
        mut upstream_rx: mpsc::Receiver<Result<Bytes, TransportFailure>>,
        mut pool_index: Option<usize>,
        tx: mpsc::Sender<Bytes>,
        mut diag: DiagBuffer,
    ) {
        let mut flushed = false;
        let mut reconnects: u32 = 0;

        loop {
            let mut rewriter = StreamRewriter::new(plan.format, now_unix());
            let end = self
                .drive(
                    &mut rewriter,
                    &mut upstream_rx,
                    Sink::Client {
                        tx: &tx,
                        flushed: &mut flushed,
                    },
                    &config,
                    &plan,
                )
                .await;

            match end {
                DriveEnd::Completed => {
                    if plan.pool == PoolKind::Responses {
                        self.state.adaptive.record_success();
                    }
                    self.record_usage(rewriter.usage(&plan.model)).await;
                    return;
                }
                DriveEnd::ClientGone => {
                    // Dropping the receiver tears the upstream connection
                    // down; recorded usage stays recorded.
                    return;
                }
                DriveEnd::Interrupted {
                    outcome,
                    message,
                    deadline_hit,
                } => {
                    if deadline_hit && plan.pool == PoolKind::Responses {
                        self.state
                            .adaptive
                            .record_timeout(config.timeout_settings.codex_increment());
                    }
                    diag.push(&self.state.flow, format!("stream interrupted: {message}"));

                    if flushed {
                        // Too late for a silent switch; end in-band.
                        let _ = tx.send(error_frame(plan.format, &message)).await;
                        self.record_usage(rewriter.usage(&plan.model)).await;
                        return;
                    }

                    self.note_stream_error(&config, &plan, pool_index, &outcome).await;
                    reconnects += 1;
                    if reconnects > config.timeout_settings.max_retries {
                        let _ = tx.send(error_frame(plan.format, &message)).await;
                        diag.flush_failure(&self.state.flow);
                        self.record_usage(zero_usage(&plan)).await;
                        return;
                    }
                    tokio::time::sleep(config.timeout_settings.stream_retry_wait()).await;

                    match self.reacquire(&config, &plan, &mut diag).await {
                        Some((rx, index)) => {
                            upstream_rx = rx;
                            pool_index = index;
                        }
                        None => {
                            let _ = tx.send(error_frame(plan.format, &message)).await;
                            self.record_usage(zero_usage(&plan)).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Non-streaming client over a streaming wire: accumulate, then answer
    /// in one shot. Nothing is flushed until the end, so recovery stays
    /// available throughout.
    async fn collapse(
        &self,
        config: &Arc<ProxyConfig>,
        plan: &RequestPlan,
        mut upstream_rx: mpsc::Receiver<Result<Bytes, TransportFailure>>,
        mut pool_index: Option<usize>,
        diag: &mut DiagBuffer,
    ) -> Result<EngineResponse, ProxyError> {
        let mut reconnects: u32 = 0;

        loop {
            let mut rewriter = StreamRewriter::new(plan.format, now_unix());
            let mut collapse = ChatCollapse::new();
            let end = self
                .drive(
                    &mut rewriter,
                    &mut upstream_rx,
                    Sink::Collapse(&mut collapse),
                    config,
                    plan,
                )
                .await;

            match end {
                DriveEnd::Completed => {
                    if plan.pool == PoolKind::Responses {
                        self.state.adaptive.record_success();
                    }
                    let usage = rewriter.usage(&plan.model);
                    collapse.set_usage(ChatUsage {
                        prompt_tokens: usage.input_tokens,
                        completion_tokens: usage.output_tokens,
                        total_tokens: usage.input_tokens + usage.output_tokens,
                    });
                    self.record_usage(usage).await;
                    let completion = collapse.finish();
                    let body = serde_json::to_vec(&completion)
                        .map_err(|err| ProxyError::bad_gateway(err.to_string()))?;
                    return Ok(EngineResponse::Json {
                        status: 200,
                        content_type: "application/json",
                        body: Bytes::from(body),
                    });
                }
                DriveEnd::ClientGone => {
                    return Err(ProxyError::bad_gateway("client went away"));
                }
                DriveEnd::Interrupted {
                    outcome,
                    message,
                    deadline_hit,
                } => {
                    if deadline_hit && plan.pool == PoolKind::Responses {
                        self.state
                            .adaptive
                            .record_timeout(config.timeout_settings.codex_increment());
                    }
                    diag.push(&self.state.flow, format!("stream interrupted: {message}"));
                    self.note_stream_error(config, plan, pool_index, &outcome).await;

                    reconnects += 1;
                    if reconnects > config.timeout_settings.max_retries {
                        diag.flush_failure(&self.state.flow);
                        self.record_usage(zero_usage(plan)).await;
                        return Err(ProxyError::bad_gateway(message));
                    }
                    tokio::time::sleep(config.timeout_settings.stream_retry_wait()).await;

                    match self.reacquire(config, plan, diag).await {
                        Some((rx, index)) => {
                            upstream_rx = rx;
                            pool_index = index;
                        }
                        None => {
                            self.record_usage(zero_usage(plan)).await;
                            return Err(ProxyError::bad_gateway(message));
                        }
                    }
                }
            }
        }
    }

    /// Mid-stream failures count against the serving entry exactly like
    /// pre-stream ones.
    async fn note_stream_error(
        &self,
        config: &ProxyConfig,
        plan: &RequestPlan,
        pool_index: Option<usize>,
        _outcome: &Outcome,
    ) {
        let Some(index) = pool_index else { return };
        let settings = self.state.pool_settings(plan.pool, config);
        let mut guard = self.state.pool(plan.pool).lock().await;
        record_error(&mut guard, index, &settings, OffsetDateTime::now_utc());
    }

    /// Fresh entry, fresh client, fresh cache-defeating headers for a
    /// mid-stream reconnect.
    async fn reacquire(
        &self,
        config: &Arc<ProxyConfig>,
        plan: &RequestPlan,
        diag: &mut DiagBuffer,
    ) -> Option<(mpsc::Receiver<Result<Bytes, TransportFailure>>, Option<usize>)> {
        match self.acquire_from(config, plan, diag, 1).await {
            Ok(AcquireEnd::Upstream(acquired)) => match acquired.response.body {
                UpstreamBody::Stream(rx) => Some((rx, acquired.pool_index)),
                UpstreamBody::Bytes(_) => None,
            },
            Ok(AcquireEnd::Verbatim(_)) | Err(_) => None,
        }
    }

    /// Pump upstream chunks through the rewriter into the sink, applying
    /// the adaptive body deadline on the responses pool.
    async fn drive(
        &self,
        rewriter: &mut StreamRewriter,
        rx: &mut mpsc::Receiver<Result<Bytes, TransportFailure>>,
        mut sink: Sink<'_>,
        config: &ProxyConfig,
        plan: &RequestPlan,
    ) -> DriveEnd {
        let deadline = (plan.pool == PoolKind::Responses).then(|| {
            Instant::now()
                + self
                    .state
                    .adaptive
                    .body_deadline(config.timeout_settings.codex_base())
        });

        loop {
            let next = match deadline {
                Some(at) => match timeout_at(at, rx.recv()).await {
                    Ok(item) => item,
                    Err(_) => {
                        return DriveEnd::Interrupted {
                            outcome: Outcome::Transport(TransportErrorKind::ReadTimeout),
                            message: "streaming body deadline exceeded".to_string(),
                            deadline_hit: true,
                        };
                    }
                },
                None => rx.recv().await,
            };

            match next {
                Some(Ok(chunk)) => match rewriter.push_chunk(&chunk) {
                    Ok(frames) => {
                        if deliver(&mut sink, frames).await.is_err() {
                            return DriveEnd::ClientGone;
                        }
                    }
                    Err(embedded) => {
                        return DriveEnd::Interrupted {
                            outcome: Outcome::HttpStatus(embedded.status),
                            message: embedded.message,
                            deadline_hit: false,
                        };
                    }
                },
                Some(Err(failure)) => {
                    return DriveEnd::Interrupted {
                        outcome: Outcome::Transport(failure.kind),
                        message: failure.message,
                        deadline_hit: false,
                    };
                }
                None => {
                    return match rewriter.finish() {
                        Ok(frames) => {
                            if deliver(&mut sink, frames).await.is_err() {
                                DriveEnd::ClientGone
                            } else {
                                DriveEnd::Completed
                            }
                        }
                        Err(embedded) => DriveEnd::Interrupted {
                            outcome: Outcome::HttpStatus(embedded.status),
                            message: embedded.message,
                            deadline_hit: false,
                        },
                    };
                }
            }
        }
    }

    async fn record_usage(&self, usage: UsageUpdate) {
        self.state.flow.response.append(&format!(
            "usage model={} input={} output={} cache_creation={} cache_read={}",
            usage.model,
            usage.input_tokens,
            usage.output_tokens,
            usage.cache_creation_tokens,
            usage.cache_read_tokens
        ));
        if let Err(err) = self
            .state
            .usage
            .record(&usage, OffsetDateTime::now_utc())
            .await
        {
            warn!("usage store update failed: {err}");
        }
    }
}

enum Sink<'a> {
    Client {
        tx: &'a mpsc::Sender<Bytes>,
        flushed: &'a mut bool,
    },
    Collapse(&'a mut ChatCollapse),
}

enum DriveEnd {
    Completed,
    ClientGone,
    Interrupted {
        outcome: Outcome,
        message: String,
        deadline_hit: bool,
    },
}

async fn deliver(sink: &mut Sink<'_>, frames: Vec<ClientFrame>) -> Result<(), ()> {
    for frame in frames {
        match sink {
            Sink::Client { tx, flushed } => {
                let bytes = match frame {
                    ClientFrame::Bytes(bytes) => bytes,
                    ClientFrame::Chunk(chunk) => encode_chunk(&chunk),
                    ClientFrame::Done => encode_done(),
                };
                if bytes.is_empty() {
                    continue;
                }
                tx.send(bytes).await.map_err(|_| ())?;
                **flushed = true;
            }
            Sink::Collapse(collapse) => {
                if let ClientFrame::Chunk(chunk) = frame {
                    collapse.push_chunk(&chunk);
                }
            }
        }
    }
    Ok(())
}

fn build_plan(
    config: &ProxyConfig,
    inbound: &InboundPath,
    body: &Bytes,
) -> Result<RequestPlan, ProxyError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| ProxyError::bad_request(format!("invalid json body: {err}")))?;

    match inbound.dialect {
        InboundDialect::Messages | InboundDialect::Chat => {
            build_messages_plan(config, inbound, value)
        }
        InboundDialect::Responses => build_responses_plan(inbound, body, value),
    }
}

fn build_messages_plan(
    config: &ProxyConfig,
    inbound: &InboundPath,
    value: serde_json::Value,
) -> Result<RequestPlan, ProxyError> {
    let timeouts = &config.timeout_settings;
    let model_rules = model_rules(config);

    let (mut claude_body, format, client_wants_stream, thinking) =
        if detect::is_openai_chat(&value) {
            let chat: ChatCompletionRequest = serde_json::from_value(value)
                .map_err(|err| ProxyError::bad_request(format!("invalid chat request: {err}")))?;
            let client_wants_stream = chat.stream.unwrap_or(false);
            let translated = openai_chat2claude::request::convert_request(&chat);
            let thinking = translated.thinking;
            (
                translated.body,
                ClientFormat::ChatFromClaude,
                client_wants_stream,
                thinking,
            )
        } else {
            let claude_body: CreateMessageBody = serde_json::from_value(value).map_err(|err| {
                ProxyError::bad_request(format!("invalid messages request: {err}"))
            })?;
            let client_wants_stream = claude_body.stream.unwrap_or(false);
            let thinking = claude_body.thinking.is_some();
            (
                claude_body,
                ClientFormat::ClaudePassthrough,
                client_wants_stream,
                thinking,
            )
        };

    rules::apply_model_rules(&mut claude_body, &model_rules);
    if config.optimization_settings.enable_cache_control_limit {
        rules::enforce_cache_control_cap(&mut claude_body, rules::CACHE_CONTROL_CAP);
    }

    // Translated requests always stream on the wire; native requests keep
    // the client's choice.
    let wire_streaming = match format {
        ClientFormat::ChatFromClaude => true,
        _ => client_wants_stream,
    };

    let model = claude_body.model.clone();
    let headers = dialect_headers::claude_identity_headers(
        thinking,
        timeouts.streaming_read_timeout as u64,
    );
    let body = serde_json::to_vec(&claude_body)
        .map_err(|err| ProxyError::bad_request(format!("request rebuild failed: {err}")))?;

    Ok(RequestPlan {
        pool: PoolKind::Messages,
        upstream_path: inbound.upstream_path.clone(),
        body: Bytes::from(body),
        base_headers: headers,
        format,
        client_wants_stream,
        wire_streaming,
        model,
    })
}

fn build_responses_plan(
    inbound: &InboundPath,
    raw: &Bytes,
    value: serde_json::Value,
) -> Result<RequestPlan, ProxyError> {
    // A body that already carries `input` is native Responses dialect and
    // passes through untouched.
    if value.get("input").is_some() {
        let client_wants_stream = value
            .get("stream")
            .and_then(|s| s.as_bool())
            .unwrap_or(false);
        let model = value
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or("gpt-5-codex")
            .to_string();
        return Ok(RequestPlan {
            pool: PoolKind::Responses,
            upstream_path: inbound.upstream_path.clone(),
            body: raw.clone(),
            base_headers: Vec::new(),
            format: ClientFormat::CodexPassthrough,
            client_wants_stream,
            wire_streaming: client_wants_stream,
            model,
        });
    }

    let chat: ChatCompletionRequest = serde_json::from_value(value)
        .map_err(|err| ProxyError::bad_request(format!("invalid chat request: {err}")))?;
    let client_wants_stream = chat.stream.unwrap_or(false);
    let codex_request = openai_chat2codex::request::convert_request(&chat);
    let model = codex_request.model.clone();
    let body = serde_json::to_vec(&codex_request)
        .map_err(|err| ProxyError::bad_request(format!("request rebuild failed: {err}")))?;

    Ok(RequestPlan {
        pool: PoolKind::Responses,
        upstream_path: inbound.upstream_path.clone(),
        body: Bytes::from(body),
        base_headers: Vec::new(),
        format: ClientFormat::ChatFromCodex,
        client_wants_stream,
        wire_streaming: true,
        model,
    })
}

fn model_rules(config: &ProxyConfig) -> Vec<rules::ModelRule> {
    config
        .enabled_model_conversions()
        .into_iter()
        .map(|rule| rules::ModelRule {
            source_model: rule.source_model.clone(),
            target_model: rule.target_model.clone(),
            kind: match rule.conversion_type {
                relay_common::ConversionKind::SimpleRename => rules::ConversionKind::SimpleRename,
                relay_common::ConversionKind::FullFormat => rules::ConversionKind::FullFormat,
            },
        })
        .collect()
}

fn attempt_timeouts(config: &ProxyConfig, plan: &RequestPlan, ladder: bool) -> AttemptTimeouts {
    let timeouts = &config.timeout_settings;
    if ladder {
        return AttemptTimeouts {
            connect: Duration::from_secs_f64(timeouts.extended_connect_timeout),
            read: Some(timeouts.strategy_retry_read()),
        };
    }
    match plan.pool {
        PoolKind::Messages => AttemptTimeouts {
            connect: timeouts.connect(),
            read: Some(if plan.wire_streaming {
                timeouts.streaming_read()
            } else {
                timeouts.non_streaming_read()
            }),
        },
        // The body deadline is adaptive and owned by the stream driver.
        PoolKind::Responses => AttemptTimeouts {
            connect: timeouts.codex_connect(),
            read: None,
        },
    }
}

fn body_bytes(body: UpstreamBody) -> Bytes {
    match body {
        UpstreamBody::Bytes(bytes) => bytes,
        UpstreamBody::Stream(_) => Bytes::new(),
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn zero_usage(plan: &RequestPlan) -> UsageUpdate {
    UsageUpdate {
        model: plan.model.clone(),
        ..UsageUpdate::default()
    }
}

/// Usage fields of a complete JSON response (non-streaming upstream call).
fn usage_from_json(bytes: &Bytes, fallback_model: &str) -> UsageUpdate {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) else {
        return UsageUpdate {
            model: fallback_model.to_string(),
            ..UsageUpdate::default()
        };
    };
    let usage = value.get("usage");
    let field = |name: &str| {
        usage
            .and_then(|u| u.get(name))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    };
    UsageUpdate {
        model: value
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(fallback_model)
            .to_string(),
        input_tokens: field("input_tokens"),
        output_tokens: field("output_tokens"),
        cache_creation_tokens: field("cache_creation_input_tokens"),
        cache_read_tokens: field("cache_read_input_tokens"),
    }
}

/// In-band termination after bytes already reached the client.
fn error_frame(format: ClientFormat, message: &str) -> Bytes {
    let payload = serde_json::json!({
        "type": "error",
        "error": {
            "type": "upstream_error",
            "message": message,
        }
    });
    match format {
        ClientFormat::ClaudePassthrough | ClientFormat::CodexPassthrough => {
            Bytes::from(format!("event: error\ndata: {payload}\n\n"))
        }
        ClientFormat::ChatFromClaude | ClientFormat::ChatFromCodex => {
            Bytes::from(format!("data: {payload}\n\ndata: [DONE]\n\n"))
        }
    }
}

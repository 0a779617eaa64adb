//! Default reqwest-backed load engine

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use hdrhistogram::Histogram;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use async_trait::async_trait;

use crate::config::HttpMethod;
use crate::options::LoadOptions;

use super::{EngineError, LatencyPercentiles, LoadEngine, LoadStats};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Microsecond ceiling recorded into the latency histogram (one minute)
const HISTOGRAM_MAX_US: u64 = 60_000_000;

/// Effective deadline for durations too large for instant arithmetic (one year)
const MAX_DEADLINE_SECS: u64 = 60 * 60 * 24 * 365;

/// Default [`LoadEngine`] backed by a shared reqwest client.
///
/// One worker task per configured connection. Workers share an atomic
/// claim counter capping the request volume, a global rate limiter, and
/// the job deadline; each request send is raced against the cancellation
/// signal so a shutdown never waits on the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpLoadEngine;

impl HttpLoadEngine {
    /// Creates the default engine
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LoadEngine for HttpLoadEngine {
    async fn execute(
        &self,
        options: &LoadOptions,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<LoadStats, EngineError> {
        let client = Arc::new(build_client(options)?);
        let template = Arc::new(build_template(options)?);
        let limiter = Arc::new(build_limiter(options)?);
        let claimed = Arc::new(AtomicU64::new(0));

        let started = Instant::now();
        let deadline = started
            .checked_add(Duration::from_secs(options.max_duration_seconds))
            .unwrap_or_else(|| started + Duration::from_secs(MAX_DEADLINE_SECS));

        tracing::debug!(
            url = %options.url,
            concurrency = options.concurrency,
            max_requests = options.max_requests,
            "spawning load workers"
        );

        let (sample_tx, mut sample_rx) = mpsc::unbounded_channel();
        let mut handles = Vec::with_capacity(options.concurrency);
        for _ in 0..options.concurrency {
            let client = Arc::clone(&client);
            let template = Arc::clone(&template);
            let limiter = Arc::clone(&limiter);
            let claimed = Arc::clone(&claimed);
            let sample_tx = sample_tx.clone();
            let mut cancel_rx = shutdown.resubscribe();
            let max_requests = options.max_requests;

            handles.push(tokio::spawn(async move {
                run_worker(
                    &client,
                    &template,
                    &limiter,
                    &claimed,
                    max_requests,
                    deadline,
                    &sample_tx,
                    &mut cancel_rx,
                )
                .await;
            }));
        }
        drop(sample_tx);
        drop(shutdown);

        join_workers(handles).await?;

        let mut samples = Vec::new();
        while let Some(sample) = sample_rx.recv().await {
            samples.push(sample);
        }

        aggregate(&samples, started.elapsed())
    }
}

/// One completed (or cancelled) request attempt
struct Sample {
    latency_ms: f64,
    status: Option<u16>,
    error: Option<&'static str>,
    cancelled: bool,
}

/// Request pieces shared by all workers of one job
struct RequestTemplate {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<String>,
}

fn build_client(options: &LoadOptions) -> Result<Client, EngineError> {
    let mut builder = Client::builder();
    if options.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(options.timeout_ms));
    }
    Ok(builder.build()?)
}

fn build_template(options: &LoadOptions) -> Result<RequestTemplate, EngineError> {
    let method = match options.method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Patch => Method::PATCH,
    };

    let mut headers = HeaderMap::new();
    for (name, value) in &options.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
            EngineError::InvalidOptions(format!("header name `{}`: {}", name, err))
        })?;
        let value = HeaderValue::from_str(value)
            .map_err(|err| EngineError::InvalidOptions(format!("header `{}`: {}", name, err)))?;
        headers.insert(name, value);
    }

    let content_type = HeaderValue::from_str(&options.content_type).map_err(|err| {
        EngineError::InvalidOptions(format!("content type `{}`: {}", options.content_type, err))
    })?;
    headers.insert(CONTENT_TYPE, content_type);

    if !options.cookies.is_empty() {
        let joined = options.cookies.join("; ");
        let cookie = HeaderValue::from_str(&joined)
            .map_err(|err| EngineError::InvalidOptions(format!("cookie header: {}", err)))?;
        headers.insert(COOKIE, cookie);
    }

    let body = if sends_body(options.method) && !options.body.is_empty() {
        let raw = serde_json::to_string(&options.body)
            .map_err(|err| EngineError::InvalidOptions(format!("body: {}", err)))?;
        Some(raw)
    } else {
        None
    };

    Ok(RequestTemplate {
        method,
        url: options.url.clone(),
        headers,
        body,
    })
}

fn sends_body(method: HttpMethod) -> bool {
    matches!(method, HttpMethod::Post | HttpMethod::Patch)
}

fn build_limiter(options: &LoadOptions) -> Result<DirectRateLimiter, EngineError> {
    let rate = NonZeroU32::new(options.requests_per_second).ok_or_else(|| {
        EngineError::InvalidOptions("requests_per_second must be at least 1".into())
    })?;
    Ok(RateLimiter::direct(Quota::per_second(rate)))
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    client: &Client,
    template: &RequestTemplate,
    limiter: &DirectRateLimiter,
    claimed: &AtomicU64,
    max_requests: u64,
    deadline: Instant,
    sample_tx: &mpsc::UnboundedSender<Sample>,
    cancel_rx: &mut broadcast::Receiver<()>,
) {
    loop {
        if cancel_requested(cancel_rx) || Instant::now() >= deadline {
            break;
        }

        // Claim a request slot; give it back when over the cap.
        let idx = claimed.fetch_add(1, Ordering::SeqCst);
        if idx >= max_requests {
            claimed.fetch_sub(1, Ordering::SeqCst);
            break;
        }

        tokio::select! {
            biased;
            _ = cancel_rx.recv() => {
                claimed.fetch_sub(1, Ordering::SeqCst);
                break;
            }
            _ = sleep_until(deadline) => {
                claimed.fetch_sub(1, Ordering::SeqCst);
                break;
            }
            _ = limiter.until_ready() => {}
        }

        let sample = send_one(client, template, cancel_rx).await;
        if sample.cancelled {
            break;
        }
        let _ = sample_tx.send(sample);
    }
}

/// Settles every worker task, surfacing the first panic only after all of
/// them have stopped
async fn join_workers(handles: Vec<JoinHandle<()>>) -> Result<(), EngineError> {
    let mut first_panic = None;
    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "load worker panicked");
            if first_panic.is_none() {
                first_panic = Some(err);
            }
        }
    }
    match first_panic {
        Some(err) => Err(EngineError::Worker(err.to_string())),
        None => Ok(()),
    }
}

async fn send_one(
    client: &Client,
    template: &RequestTemplate,
    cancel_rx: &mut broadcast::Receiver<()>,
) -> Sample {
    let started = Instant::now();
    let mut request = client
        .request(template.method.clone(), &template.url)
        .headers(template.headers.clone());
    if let Some(body) = &template.body {
        request = request.body(body.clone());
    }

    let outcome = tokio::select! {
        result = request.send() => Some(result),
        _ = cancel_rx.recv() => None,
    };

    let Some(outcome) = outcome else {
        return Sample {
            latency_ms: elapsed_ms(started),
            status: None,
            error: None,
            cancelled: true,
        };
    };

    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            return Sample {
                latency_ms: elapsed_ms(started),
                status: None,
                error: Some(classify_transport_error(&err)),
                cancelled: false,
            }
        }
    };

    // Drain the body so latency covers the full exchange.
    let status = response.status().as_u16();
    let drained = tokio::select! {
        result = response.bytes() => Some(result),
        _ = cancel_rx.recv() => None,
    };

    match drained {
        None => Sample {
            latency_ms: elapsed_ms(started),
            status: None,
            error: None,
            cancelled: true,
        },
        Some(Ok(_)) => Sample {
            latency_ms: elapsed_ms(started),
            status: Some(status),
            error: None,
            cancelled: false,
        },
        Some(Err(err)) => Sample {
            latency_ms: elapsed_ms(started),
            status: None,
            error: Some(classify_transport_error(&err)),
            cancelled: false,
        },
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn classify_transport_error(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else {
        "request"
    }
}

pub(crate) fn cancel_requested(cancel_rx: &mut broadcast::Receiver<()>) -> bool {
    use tokio::sync::broadcast::error::TryRecvError;

    match cancel_rx.try_recv() {
        Ok(_) => true,
        Err(TryRecvError::Lagged(_)) => true,
        Err(TryRecvError::Closed) => true,
        Err(TryRecvError::Empty) => false,
    }
}

/// Incremental min/mean/max over latency samples
#[derive(Default)]
struct RunningStats {
    count: u64,
    mean: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    fn add(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
    }
}

fn aggregate(samples: &[Sample], elapsed: Duration) -> Result<LoadStats, EngineError> {
    let mut stats = RunningStats::default();
    let mut histogram = Histogram::<u64>::new_with_bounds(1, HISTOGRAM_MAX_US, 3)
        .map_err(|err| EngineError::Metrics(format!("latency histogram: {}", err)))?;
    let mut error_codes: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_errors = 0u64;

    for sample in samples {
        stats.add(sample.latency_ms);
        let latency_us =
            ((sample.latency_ms * 1000.0).round().max(1.0) as u64).min(HISTOGRAM_MAX_US);
        let _ = histogram.record(latency_us);

        match (sample.status, sample.error) {
            (Some(status), _) if status >= 400 => {
                total_errors += 1;
                *error_codes.entry(status.to_string()).or_insert(0) += 1;
            }
            (None, Some(kind)) => {
                total_errors += 1;
                *error_codes.entry(kind.to_string()).or_insert(0) += 1;
            }
            _ => {}
        }
    }

    let total_requests = samples.len() as u64;
    let total_time_seconds = elapsed.as_secs_f64().max(0.001);
    let rps = if total_requests == 0 {
        0.0
    } else {
        total_requests as f64 / total_time_seconds
    };

    let percentiles = if total_requests == 0 {
        LatencyPercentiles::default()
    } else {
        LatencyPercentiles {
            p50: histogram.value_at_quantile(0.50) as f64 / 1000.0,
            p90: histogram.value_at_quantile(0.90) as f64 / 1000.0,
            p95: histogram.value_at_quantile(0.95) as f64 / 1000.0,
            p99: histogram.value_at_quantile(0.99) as f64 / 1000.0,
        }
    };

    Ok(LoadStats {
        total_requests,
        total_errors,
        rps,
        total_time_seconds,
        min_latency_ms: stats.min,
        max_latency_ms: stats.max,
        mean_latency_ms: stats.mean,
        percentiles,
        error_codes,
    })
}

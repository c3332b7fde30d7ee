use std::collections::VecDeque;

use anyhow::{Context as _, Error as GenericError};
use skytrace_config::TracerConfiguration;
use skytrace_propagation::SegmentContext;
use skywalking_protos::skywalking::v3::trace_segment_report_service_client::TraceSegmentReportServiceClient;
use skywalking_protos::skywalking::v3::SegmentObject;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};
use tracing::{debug, error, warn};

use crate::encode::encode_segment;
use crate::telemetry::ReporterTelemetry;

type CollectClient =
    TraceSegmentReportServiceClient<InterceptedService<Channel, AuthenticationInterceptor>>;

/// Adds the configured inline token as `authentication` metadata on every
/// collector call.
#[derive(Clone)]
struct AuthenticationInterceptor {
    token: Option<MetadataValue<Ascii>>,
}

impl Interceptor for AuthenticationInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(token) = self.token.clone() {
            request.metadata_mut().insert("authentication", token);
        }
        Ok(request)
    }
}

/// Handle the tracer reports finished, sampled segments through.
#[derive(Clone)]
pub struct ReporterHandle {
    tx: mpsc::Sender<SegmentObject>,
    telemetry: ReporterTelemetry,
}

impl ReporterHandle {
    /// Hands a finished segment off for transmission.
    ///
    /// Never blocks the request path: when the reporter cannot keep up, the
    /// segment is dropped and counted.
    pub fn report(&self, segment: &SegmentContext) {
        if self.tx.try_send(encode_segment(segment)).is_err() {
            warn!(trace_id = segment.trace_id(), "Reporter queue full. Dropping segment.");
            self.telemetry.segments_dropped().increment(1);
        }
    }
}

/// Reporter task owning the collector client, the active report stream, and
/// the delayed-segment cache.
pub struct TraceSegmentReporter {
    rx: mpsc::Receiver<SegmentObject>,
    client: CollectClient,
    stream: Option<mpsc::Sender<SegmentObject>>,
    cache: VecDeque<SegmentObject>,
    max_cache_size: usize,
    telemetry: ReporterTelemetry,
}

impl TraceSegmentReporter {
    /// Builds the reporter and the handle the tracer reports through.
    ///
    /// The collector channel is constructed lazily; nothing connects until
    /// the first segment is dispatched.
    pub fn new(config: &TracerConfiguration) -> Result<(ReporterHandle, Self), GenericError> {
        let channel = Channel::from_shared(config.collector_address().to_string())
            .context("Failed to construct gRPC channel due to an invalid collector address.")?
            .connect_lazy();

        let token: Option<MetadataValue<Ascii>> = config
            .authentication()
            .map(MetadataValue::try_from)
            .transpose()
            .context("Authentication token is not valid request metadata.")?;
        let client =
            TraceSegmentReportServiceClient::with_interceptor(channel, AuthenticationInterceptor { token });

        let telemetry = ReporterTelemetry::new();
        let (tx, rx) = mpsc::channel(config.max_cache_size().max(1));

        let handle = ReporterHandle {
            tx,
            telemetry: telemetry.clone(),
        };
        let reporter = Self {
            rx,
            client,
            stream: None,
            cache: VecDeque::new(),
            max_cache_size: config.max_cache_size(),
            telemetry,
        };

        Ok((handle, reporter))
    }

    /// Runs the reporter until every handle is dropped.
    pub async fn run(mut self) {
        debug!("Trace segment reporter started.");

        while let Some(segment) = self.rx.recv().await {
            self.dispatch(segment);
        }

        debug!("Trace segment reporter stopped.");
    }

    fn dispatch(&mut self, segment: SegmentObject) {
        if self.stream.is_none() {
            self.establish_stream();
            self.flush_cache();
        }

        let Some(stream) = self.stream.as_ref() else {
            self.cache_segment(segment);
            return;
        };

        match stream.try_send(segment) {
            Ok(()) => self.telemetry.segments_sent().increment(1),
            Err(TrySendError::Full(segment)) => {
                self.cache_segment(segment);
            }
            Err(TrySendError::Closed(segment)) => {
                // The collect call died; retry with a fresh stream on the
                // next dispatch.
                self.stream = None;
                self.cache_segment(segment);
            }
        }
    }

    /// Opens a fresh report stream against the collector.
    ///
    /// The spawned call owns the receiving half of the stream channel: when
    /// the call fails, the receiver is dropped, sends start failing, and the
    /// next dispatch opens a new stream.
    fn establish_stream(&mut self) {
        let (tx, mut rx) = mpsc::channel::<SegmentObject>(self.max_cache_size.max(1));
        let mut client = self.client.clone();

        tokio::spawn(async move {
            let segments = async_stream::stream! {
                while let Some(segment) = rx.recv().await {
                    yield segment;
                }
            };

            match client.collect(Request::new(segments)).await {
                Ok(response) => {
                    let commands = response.into_inner();
                    debug!(commands = commands.commands.len(), "Trace segment stream completed.");
                }
                Err(error) => {
                    error!(%error, "Trace segment stream failed.");
                }
            }
        });

        debug!("Opened trace segment stream to collector.");
        self.stream = Some(tx);
    }

    /// Drains the delayed-segment cache into the active stream.
    fn flush_cache(&mut self) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };

        let mut flushed = 0u64;
        while let Some(segment) = self.cache.pop_front() {
            match stream.try_send(segment) {
                Ok(()) => flushed += 1,
                Err(TrySendError::Full(segment)) | Err(TrySendError::Closed(segment)) => {
                    self.cache.push_front(segment);
                    break;
                }
            }
        }

        if flushed > 0 {
            debug!(segments = flushed, "Flushed delayed segment cache.");
            self.telemetry.cache_flushed().increment(1);
            self.telemetry.segments_flushed().increment(flushed);
        }
    }

    /// Buffers a segment while no stream is usable, evicting the oldest
    /// entry once the configured capacity is reached.
    fn cache_segment(&mut self, segment: SegmentObject) {
        if self.cache.len() >= self.max_cache_size {
            self.cache.pop_front();
            self.telemetry.segments_dropped().increment(1);
        }
        self.cache.push_back(segment);
    }
}

//! Single-flight request processor

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::Instrument;

use super::{
    Delivery, EXPECTED_EXTENSION, Failure, MediaSource, OUTPUT_EXTENSION, Outcome, Request,
    ScratchSpace, Stage, Transcoder, digest_file,
};
use crate::db::{CacheMeta, ConversionRepo};

type StageResult<T> = Result<T, (Stage, Failure)>;

/// Runs one request at a time from probe to delivery
#[derive(Clone)]
pub struct Processor {
    source: Arc<dyn MediaSource>,
    transcoder: Arc<dyn Transcoder>,
    cache: ConversionRepo,
    delivery: Delivery,
    scratch: ScratchSpace,
}

impl Processor {
    /// Assemble a processor from its collaborators
    #[must_use]
    pub fn new(
        source: Arc<dyn MediaSource>,
        transcoder: Arc<dyn Transcoder>,
        cache: ConversionRepo,
        delivery: Delivery,
        scratch: ScratchSpace,
    ) -> Self {
        Self {
            source,
            transcoder,
            cache,
            delivery,
            scratch,
        }
    }

    /// Process requests until the hand-off closes
    ///
    /// A request that has been received is always finished before the next
    /// one is taken or the loop exits.
    pub async fn run(self, mut requests: mpsc::Receiver<Request>) {
        tracing::debug!(stage = %Stage::Idle, "processor waiting for requests");
        while let Some(request) = requests.recv().await {
            self.process(&request).await;
            tracing::debug!(stage = %Stage::Idle, "processor waiting for requests");
        }
        tracing::info!("processor stopped");
    }

    /// Take one request through the pipeline
    ///
    /// Failures are reported to the requester before returning. Scratch
    /// files are gone by the time this returns.
    pub async fn process(&self, request: &Request) -> Outcome {
        let span = tracing::info_span!(
            "request",
            chat_id = request.chat_id,
            message_id = request.message_id,
            url = %request.url,
        );

        async {
            match self.try_process(request).await {
                Ok(outcome) => {
                    match &outcome {
                        Outcome::Cached { digest, reference } => {
                            tracing::info!(%digest, kind = %reference.kind, "delivered from cache");
                        }
                        Outcome::Converted {
                            digest,
                            reference,
                            cached,
                        } => {
                            tracing::info!(%digest, kind = %reference.kind, cached, "converted and delivered");
                        }
                        Outcome::Failed { .. } => {}
                    }
                    outcome
                }
                Err((stage, failure)) => {
                    tracing::warn!(%stage, error = %failure.detail(), "request failed");
                    tracing::debug!(stage = %Stage::Failed, "sending error notice");
                    self.delivery.deliver_error(request, &failure).await;
                    Outcome::Failed { stage, failure }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_process(&self, request: &Request) -> StageResult<Outcome> {
        enter(Stage::Validating);
        let info = self
            .source
            .probe(&request.url)
            .await
            .map_err(at(Stage::Validating))?;
        tracing::debug!(content_type = %info.content_type, content_length = ?info.content_length, "probe passed");

        enter(Stage::Downloading);
        let input = self
            .scratch
            .allocate(EXPECTED_EXTENSION)
            .map_err(|e| (Stage::Downloading, Failure::DownloadFailed(format!("scratch file: {e}"))))?;
        let size_bytes = self
            .source
            .fetch(&request.url, &input)
            .await
            .map_err(at(Stage::Downloading))?;
        tracing::debug!(size_bytes, "download complete");

        enter(Stage::Hashing);
        let digest = digest_file(&input).await.map_err(at(Stage::Hashing))?;

        enter(Stage::CacheLookup);
        let cached = match self.cache.lookup(&digest) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(%digest, error = %e, "cache lookup failed, treating as miss");
                None
            }
        };

        if let Some(reference) = cached {
            enter(Stage::CachedDeliver);
            drop(input);
            self.delivery
                .deliver_cached(request, &reference)
                .await
                .map_err(at(Stage::CachedDeliver))?;
            return Ok(Outcome::Cached { digest, reference });
        }

        enter(Stage::Converting);
        let output = self.scratch.allocate(OUTPUT_EXTENSION).map_err(|e| {
            (Stage::Converting, Failure::ConversionFailed(format!("scratch file: {e}")))
        })?;
        self.transcoder
            .transcode(&input, &output)
            .await
            .map_err(at(Stage::Converting))?;
        drop(input);

        enter(Stage::FreshDeliver);
        let reference = self
            .delivery
            .deliver_fresh(request, &output)
            .await
            .map_err(at(Stage::FreshDeliver))?;
        drop(output);

        enter(Stage::CacheStore);
        let meta = CacheMeta {
            source_url: request.url.clone(),
            size_bytes,
        };
        let cached = match self.cache.store(&digest, &reference, &meta) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%digest, error = %e, "failed to store conversion, continuing");
                false
            }
        };

        Ok(Outcome::Converted {
            digest,
            reference,
            cached,
        })
    }
}

fn enter(stage: Stage) {
    tracing::debug!(%stage, "stage");
}

fn at(stage: Stage) -> impl Fn(Failure) -> (Stage, Failure) {
    move |failure| (stage, failure)
}

//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use webm_relay::channels::{Channel, MediaKind, MediaRef};
use webm_relay::db::{self, ConversionRepo};
use webm_relay::pipeline::{
    Delivery, EXPECTED_MIME, Failure, MAX_SOURCE_BYTES, MediaSource, Processor, Request,
    ResourceInfo, ScratchSpace, Transcoder,
};
use webm_relay::{DbPool, Error};

/// Chat the test relay accepts
pub const CHAT_ID: i64 = 1001;

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Video reference as handed out by [`MockChannel`]
#[must_use]
pub fn video(file_id: &str) -> MediaRef {
    MediaRef::new(MediaKind::Video, file_id)
}

/// Build a request from the allowed chat
#[must_use]
pub fn request(message_id: i64, url: &str) -> Request {
    Request {
        chat_id: CHAT_ID,
        message_id,
        url: url.to_string(),
    }
}

/// Number of files left in a scratch directory
#[must_use]
pub fn scratch_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).expect("scratch dir readable").count()
}

/// Something the mock channel was asked to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: i64,
        reply_to: Option<i64>,
        text: String,
    },
    Reference {
        chat_id: i64,
        reply_to: Option<i64>,
        media: MediaRef,
    },
    Upload {
        chat_id: i64,
        reply_to: Option<i64>,
        body: Vec<u8>,
    },
}

/// Channel that records sends and hands out `ref-N` references
pub struct MockChannel {
    sent: Mutex<Vec<Sent>>,
    uploads: AtomicUsize,
    fail_uploads: bool,
    upload_kind: MediaKind,
}

impl Default for MockChannel {
    fn default() -> Self {
        Self {
            sent: Mutex::default(),
            uploads: AtomicUsize::new(0),
            fail_uploads: false,
            upload_kind: MediaKind::Video,
        }
    }
}

impl MockChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel that files every upload as `kind`
    #[must_use]
    pub fn filing_as(kind: MediaKind) -> Self {
        Self {
            upload_kind: kind,
            ..Self::default()
        }
    }

    /// A channel whose uploads are always refused
    #[must_use]
    pub fn failing_uploads() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<Sent> {
        self.sent.lock().await.clone()
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&mut self) -> webm_relay::Result<()> {
        Ok(())
    }

    async fn send_text(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        text: &str,
    ) -> webm_relay::Result<()> {
        self.sent.lock().await.push(Sent::Text {
            chat_id,
            reply_to,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_media_by_reference(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        media: &MediaRef,
    ) -> webm_relay::Result<()> {
        self.sent.lock().await.push(Sent::Reference {
            chat_id,
            reply_to,
            media: media.clone(),
        });
        Ok(())
    }

    async fn upload_video(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        path: &Path,
    ) -> webm_relay::Result<MediaRef> {
        if self.fail_uploads {
            return Err(Error::Channel("upload refused".to_string()));
        }

        let body = std::fs::read(path)?;
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().await.push(Sent::Upload {
            chat_id,
            reply_to,
            body,
        });
        Ok(MediaRef::new(self.upload_kind, format!("ref-{n}")))
    }
}

/// What a fake URL serves
#[derive(Debug, Clone)]
pub enum Resource {
    /// WebM body with a truthful length
    Body(Vec<u8>),
    /// Declares `len` bytes but is never fetched in a passing test
    Declared(u64),
    /// Probe fails with this failure
    Fail(Failure),
}

/// In-memory media source keyed by URL
///
/// Unknown URLs are unreachable.
#[derive(Default)]
pub struct FakeSource {
    resources: HashMap<String, Resource>,
    probes: AtomicUsize,
    fetches: AtomicUsize,
}

impl FakeSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, url: &str, resource: Resource) -> Self {
        self.resources.insert(url.to_string(), resource);
        self
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSource for FakeSource {
    async fn probe(&self, url: &str) -> Result<ResourceInfo, Failure> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let len = match self.resources.get(url) {
            None => return Err(Failure::Unreachable(format!("no route to {url}"))),
            Some(Resource::Fail(failure)) => return Err(failure.clone()),
            Some(Resource::Body(body)) => body.len() as u64,
            Some(Resource::Declared(len)) => *len,
        };

        if len > MAX_SOURCE_BYTES {
            return Err(Failure::TooLarge(len));
        }

        Ok(ResourceInfo {
            content_type: EXPECTED_MIME.to_string(),
            content_length: Some(len),
        })
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64, Failure> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.resources.get(url) {
            Some(Resource::Body(body)) => {
                tokio::fs::write(dest, body)
                    .await
                    .map_err(|e| Failure::DownloadFailed(e.to_string()))?;
                Ok(body.len() as u64)
            }
            _ => Err(Failure::DownloadFailed(format!("nothing to fetch at {url}"))),
        }
    }
}

/// Transcoder that prefixes the input with `mp4:`, or fails after writing
/// partial output
#[derive(Default)]
pub struct FakeTranscoder {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeTranscoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut converted = b"mp4:".to_vec();
        converted.extend(
            tokio::fs::read(input)
                .await
                .map_err(|e| Failure::ConversionFailed(e.to_string()))?,
        );

        if self.fail {
            tokio::fs::write(output, &converted[..2])
                .await
                .map_err(|e| Failure::ConversionFailed(e.to_string()))?;
            return Err(Failure::ConversionFailed("exited with code 1".to_string()));
        }

        tokio::fs::write(output, converted)
            .await
            .map_err(|e| Failure::ConversionFailed(e.to_string()))
    }
}

/// A processor wired to fakes, with handles for inspection
pub struct Harness {
    pub processor: Processor,
    pub channel: Arc<MockChannel>,
    pub source: Arc<FakeSource>,
    pub transcoder: Arc<FakeTranscoder>,
    pub repo: ConversionRepo,
    pub scratch_dir: tempfile::TempDir,
}

impl Harness {
    #[must_use]
    pub fn new(source: FakeSource, transcoder: FakeTranscoder, pool: DbPool) -> Self {
        Self::with_channel(source, transcoder, MockChannel::new(), pool)
    }

    #[must_use]
    pub fn with_channel(
        source: FakeSource,
        transcoder: FakeTranscoder,
        channel: MockChannel,
        pool: DbPool,
    ) -> Self {
        let scratch_dir = tempfile::tempdir().expect("scratch tempdir");
        let scratch = ScratchSpace::new(scratch_dir.path()).expect("scratch space");

        let channel = Arc::new(channel);
        let source = Arc::new(source);
        let transcoder = Arc::new(transcoder);
        let repo = ConversionRepo::new(pool);

        let processor = Processor::new(
            source.clone(),
            transcoder.clone(),
            repo.clone(),
            Delivery::new(channel.clone()),
            scratch,
        );

        Self {
            processor,
            channel,
            source,
            transcoder,
            repo,
            scratch_dir,
        }
    }

    #[must_use]
    pub fn scratch_files(&self) -> usize {
        scratch_files(self.scratch_dir.path())
    }
}

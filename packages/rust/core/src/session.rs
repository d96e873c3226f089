//! One user session: plan tier, queue, optional base document, build state
//! and the optional publisher.
//!
//! Every mutation of the queue or base invalidates the current build, so a
//! downloadable artifact always reflects the inputs that are on screen.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use everythingpdf_shared::{
    EverythingPdfError, FREE_LIMIT, KeyValueStore, Publisher, Result, TIER_STORAGE_KEY, Tier,
};
use uuid::Uuid;

use crate::admission::admit;
use crate::assembler::{self, BaseDocument};
use crate::build::{BuildArtifact, BuildFailure, BuildSession, BuildState, BuildToken, Completion};
use crate::classify::{QueuedInput, RawInput, RejectedInput, classify_batch};
use crate::queue::{Queue, QueueSnapshot};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one batch handed to [`Session::add_inputs`].
#[derive(Debug, Clone, Default)]
pub struct AddOutcome {
    /// Names appended to the queue, in order.
    pub admitted: Vec<String>,
    /// Inputs refused by the classifier.
    pub rejected_inputs: Vec<RejectedInput>,
    /// Supported inputs turned away by the plan limit.
    pub rejected_count: usize,
    /// The queue was already at the plan limit.
    pub cap_exceeded: bool,
    /// Plan-limit notice from admission, if any input was turned away.
    pub limit_notice: Option<String>,
}

impl AddOutcome {
    /// User-facing messages, one per distinct outcome.
    pub fn notices(&self) -> Vec<String> {
        self.rejected_inputs
            .iter()
            .map(RejectedInput::message)
            .chain(self.limit_notice.clone())
            .collect()
    }

    /// Why nothing from the batch was queued, as an error.
    ///
    /// `None` when at least one input was admitted or the batch was empty.
    pub fn to_error(&self) -> Option<EverythingPdfError> {
        if !self.admitted.is_empty() {
            return None;
        }
        if self.cap_exceeded {
            return Some(EverythingPdfError::AdmissionCapped { limit: FREE_LIMIT });
        }
        self.rejected_inputs.first().map(EverythingPdfError::from)
    }
}

/// A build captured at trigger time; run it without holding the session.
#[derive(Debug)]
pub struct BuildTicket {
    token: BuildToken,
    base: Option<BaseDocument>,
    snapshot: QueueSnapshot,
}

/// The finished work of a [`BuildTicket`], to hand back to
/// [`Session::finish_build`].
#[derive(Debug)]
pub struct BuildCompletion {
    token: BuildToken,
    outcome: std::result::Result<BuildArtifact, BuildFailure>,
}

impl BuildTicket {
    pub fn snapshot(&self) -> &QueueSnapshot {
        &self.snapshot
    }

    /// Assemble the captured inputs.
    #[instrument(skip_all, fields(build_id = %self.token.build_id()))]
    pub async fn run(self) -> BuildCompletion {
        let input_count = self.snapshot.len();
        info!(
            documents = self.snapshot.document_count(),
            images = self.snapshot.image_count(),
            has_base = self.base.is_some(),
            "assembling"
        );
        let outcome = match assembler::assemble(self.base.as_ref(), &self.snapshot).await {
            Ok(result) => Ok(BuildArtifact::from_assembly(
                result,
                input_count,
                self.token.build_id(),
            )),
            Err(e) => Err(BuildFailure::from_error(&e)),
        };
        BuildCompletion {
            token: self.token,
            outcome,
        }
    }
}

/// A publish captured at trigger time, bound to the artifact it uploads.
#[derive(Clone)]
pub struct PublishTicket {
    publisher: Arc<dyn Publisher>,
    bytes: Arc<[u8]>,
    name: String,
    build_id: Uuid,
}

/// The finished upload of a [`PublishTicket`], to hand back to
/// [`Session::finish_publish`].
#[derive(Debug)]
pub struct PublishCompletion {
    build_id: Uuid,
    result: Result<String>,
}

impl PublishTicket {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(self) -> PublishCompletion {
        let result = self.publisher.publish(&self.bytes, &self.name).await;
        PublishCompletion {
            build_id: self.build_id,
            result,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    tier: Tier,
    queue: Queue,
    base: Option<BaseDocument>,
    build: BuildSession,
    store: Arc<dyn KeyValueStore>,
    publisher: Option<Arc<dyn Publisher>>,
    publishing: bool,
    last_share_url: Option<String>,
}

impl Session {
    /// Start a session, restoring the persisted tier (missing key → Free).
    pub async fn open(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let stored = store.get(TIER_STORAGE_KEY).await?;
        let tier = Tier::from_storage_value(stored.as_deref());
        info!(%tier, "session opened");

        Ok(Self {
            tier,
            queue: Queue::new(),
            base: None,
            build: BuildSession::new(),
            store,
            publisher: None,
            publishing: false,
            last_share_url: None,
        })
    }

    /// Enable sharing through `publisher`.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn base(&self) -> Option<&BaseDocument> {
        self.base.as_ref()
    }

    pub fn build_state(&self) -> &BuildState {
        self.build.state()
    }

    pub fn artifact(&self) -> Option<&BuildArtifact> {
        self.build.artifact()
    }

    pub fn last_share_url(&self) -> Option<&str> {
        self.last_share_url.as_deref()
    }

    // -- inputs --------------------------------------------------------------

    /// Classify `inputs`, gate the supported ones by plan, and append what
    /// fits. Unsupported inputs never count against the plan limit.
    #[instrument(skip_all, fields(batch = inputs.len(), tier = %self.tier))]
    pub fn add_inputs(&mut self, inputs: Vec<RawInput>) -> AddOutcome {
        let (supported, rejected_inputs) = classify_batch(inputs);
        for rejected in &rejected_inputs {
            warn!(name = %rejected.name, media_type = %rejected.media_type, "input rejected");
        }

        let report = admit(&supported, self.queue.len(), self.tier);
        let admitted: Vec<String> = report.accepted.iter().map(|i| i.display_name.clone()).collect();
        let limit_notice = report.message();

        if !report.accepted.is_empty() {
            self.queue.append(report.accepted);
            self.on_inputs_changed();
        }

        info!(
            admitted = admitted.len(),
            rejected = rejected_inputs.len(),
            over_limit = report.rejected_count,
            queue_len = self.queue.len(),
            "batch processed"
        );

        AddOutcome {
            admitted,
            rejected_inputs,
            rejected_count: report.rejected_count,
            cap_exceeded: report.cap_exceeded,
            limit_notice,
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Result<QueuedInput> {
        let removed = self.queue.remove_at(index)?;
        self.on_inputs_changed();
        Ok(removed)
    }

    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        self.queue.move_item(from, to)?;
        if from != to {
            self.on_inputs_changed();
        }
        Ok(())
    }

    /// Set the document the next build extends.
    pub fn load_base(&mut self, base: BaseDocument) {
        info!(name = %base.name, size = base.bytes.len(), "base document loaded");
        self.base = Some(base);
        self.on_inputs_changed();
    }

    /// Empty the queue, drop the base, and return the build to idle.
    pub fn reset(&mut self) {
        self.queue.reset();
        self.base = None;
        self.build.reset();
        self.publishing = false;
        self.last_share_url = None;
        info!("session reset");
    }

    // -- plan ----------------------------------------------------------------

    /// Switch to Pro. The new tier is persisted before it takes effect.
    pub async fn upgrade(&mut self) -> Result<()> {
        self.store
            .set(TIER_STORAGE_KEY, Tier::Pro.storage_value())
            .await?;
        self.tier = Tier::Pro;
        info!("upgraded to pro");
        Ok(())
    }

    /// Switch to Free, keeping only the first [`FREE_LIMIT`] queue entries.
    pub async fn downgrade(&mut self) -> Result<Vec<QueuedInput>> {
        self.store
            .set(TIER_STORAGE_KEY, Tier::Free.storage_value())
            .await?;
        self.tier = Tier::Free;

        let dropped = self.queue.truncate(FREE_LIMIT);
        if !dropped.is_empty() {
            warn!(dropped = dropped.len(), "queue truncated to free plan limit");
            self.on_inputs_changed();
        }
        info!("downgraded to free");
        Ok(dropped)
    }

    // -- build ---------------------------------------------------------------

    /// Start a build over the current base and queue.
    pub fn begin_build(&mut self) -> Result<BuildTicket> {
        let token = self.build.begin()?;
        self.last_share_url = None;
        Ok(BuildTicket {
            token,
            base: self.base.clone(),
            snapshot: self.queue.snapshot(),
        })
    }

    /// Record a finished build.
    pub fn finish_build(&mut self, completion: BuildCompletion) -> Completion {
        self.build.complete(completion.token, completion.outcome)
    }

    /// Build in one step and return the artifact.
    pub async fn build(&mut self) -> Result<BuildArtifact> {
        let ticket = self.begin_build()?;
        let completion = ticket.run().await;
        self.finish_build(completion);

        match self.build.state() {
            BuildState::Succeeded(artifact) => Ok(artifact.clone()),
            BuildState::Failed(failure) => Err(EverythingPdfError::assembly(
                failure.item.clone(),
                failure.message.clone(),
            )),
            _ => Err(EverythingPdfError::NoArtifact),
        }
    }

    pub fn can_download(&self) -> bool {
        self.build.can_download()
    }

    /// Write the current artifact to `path`.
    pub async fn save_artifact(&self, path: &Path) -> Result<()> {
        let artifact = self.build.artifact().ok_or(EverythingPdfError::NoArtifact)?;
        artifact.save(path).await
    }

    // -- share ---------------------------------------------------------------

    pub fn can_share(&self) -> bool {
        self.build.can_download() && self.publisher.is_some()
    }

    /// Start publishing the current artifact under `name`.
    pub fn begin_publish(&mut self, name: impl Into<String>) -> Result<PublishTicket> {
        let artifact = self.build.artifact().ok_or(EverythingPdfError::NoArtifact)?;
        let publisher = self
            .publisher
            .clone()
            .ok_or(EverythingPdfError::PublishNotConfigured)?;
        if self.publishing {
            return Err(EverythingPdfError::PublishInProgress);
        }

        let ticket = PublishTicket {
            publisher,
            bytes: Arc::clone(&artifact.bytes),
            name: name.into(),
            build_id: artifact.build_id,
        };
        self.publishing = true;
        Ok(ticket)
    }

    /// Record the result of a publish. Build state is never affected.
    ///
    /// A link is only kept when the uploaded artifact is still the current
    /// one; otherwise it points at superseded output and is dropped.
    pub fn finish_publish(&mut self, completion: PublishCompletion) -> Result<String> {
        self.publishing = false;
        let current = self.build.artifact().map(|a| a.build_id);
        match completion.result {
            Ok(url) if current != Some(completion.build_id) => {
                warn!(url = %url, "inputs changed during upload, discarding link");
                Err(EverythingPdfError::Publish(
                    "inputs changed during upload; rebuild and share again".into(),
                ))
            }
            Ok(url) => {
                info!(url = %url, "share link ready");
                self.last_share_url = Some(url.clone());
                Ok(url)
            }
            Err(e) => {
                warn!(error = %e, "publish failed");
                Err(e)
            }
        }
    }

    /// Publish the current artifact and return its public link.
    pub async fn share(&mut self, name: impl Into<String>) -> Result<String> {
        let ticket = self.begin_publish(name)?;
        let completion = ticket.run().await;
        self.finish_publish(completion)
    }

    fn on_inputs_changed(&mut self) {
        self.build.invalidate();
        self.last_share_url = None;
    }
}

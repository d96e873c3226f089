//! Build lifecycle: `Idle → Building → Succeeded | Failed`.
//!
//! A [`BuildSession`] hands out a [`BuildToken`] when a build begins and only
//! accepts the outcome carrying the current token. Any queue, base, or plan
//! change bumps the generation, so a build that finishes after such a change
//! is discarded instead of publishing a stale artifact.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use everythingpdf_shared::{EverythingPdfError, Result};

use crate::assembler::AssembleResult;

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// The PDF produced by the most recent successful build.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    /// Serialized PDF.
    pub bytes: Arc<[u8]>,
    /// Total pages in the document.
    pub page_count: usize,
    /// Hex SHA-256 of `bytes`.
    pub sha256: String,
    /// Number of queue entries that went into the build.
    pub input_count: usize,
    pub built_at: DateTime<Utc>,
    pub build_id: Uuid,
}

/// Serializable summary of an artifact, without the bytes.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub build_id: Uuid,
    pub page_count: usize,
    pub size_bytes: usize,
    pub sha256: String,
    pub input_count: usize,
    pub built_at: DateTime<Utc>,
}

impl BuildArtifact {
    pub(crate) fn from_assembly(result: AssembleResult, input_count: usize, build_id: Uuid) -> Self {
        let sha256 = hex_digest(&result.bytes);
        Self {
            bytes: Arc::from(result.bytes),
            page_count: result.page_count,
            sha256,
            input_count,
            built_at: Utc::now(),
            build_id,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            build_id: self.build_id,
            page_count: self.page_count,
            size_bytes: self.bytes.len(),
            sha256: self.sha256.clone(),
            input_count: self.input_count,
            built_at: self.built_at,
        }
    }

    /// Write the PDF to `path`.
    ///
    /// Bytes go to a sibling temp file first and are renamed into place, so
    /// an interrupted write never leaves a truncated document behind.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EverythingPdfError::io(parent, e))?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                EverythingPdfError::validation(format!("'{}' is not a file path", path.display()))
            })?;
        let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", self.build_id));

        tokio::fs::write(&tmp, &self.bytes)
            .await
            .map_err(|e| EverythingPdfError::io(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(EverythingPdfError::io(path, e));
        }

        info!(path = %path.display(), size = self.bytes.len(), "document saved");
        Ok(())
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Why the last build failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFailure {
    /// Which input failed (`item 2 'scan.pdf'`, `base document`, ...).
    pub item: String,
    pub message: String,
}

impl BuildFailure {
    pub fn from_error(err: &EverythingPdfError) -> Self {
        match err {
            EverythingPdfError::Assembly { item, message } => Self {
                item: item.clone(),
                message: message.clone(),
            },
            other => Self {
                item: "build".into(),
                message: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "build failed at {}: {}", self.item, self.message)
    }
}

/// Where the build lifecycle currently is.
#[derive(Debug, Clone, Default)]
pub enum BuildState {
    #[default]
    Idle,
    Building,
    Succeeded(BuildArtifact),
    Failed(BuildFailure),
}

impl BuildState {
    pub fn label(&self) -> &'static str {
        match self {
            BuildState::Idle => "idle",
            BuildState::Building => "building",
            BuildState::Succeeded(_) => "succeeded",
            BuildState::Failed(_) => "failed",
        }
    }
}

/// Proof that a build was started; required to record its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildToken {
    generation: u64,
    build_id: Uuid,
}

impl BuildToken {
    pub fn build_id(&self) -> Uuid {
        self.build_id
    }
}

/// What happened to a completed build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Outcome recorded; state is now `Succeeded` or `Failed`.
    Applied,
    /// Inputs changed while the build ran; outcome dropped, state is `Idle`.
    Stale,
    /// Token does not belong to the in-flight build; nothing changed.
    Ignored,
}

/// Owns the build state and guards against overlapping or stale builds.
#[derive(Debug, Default)]
pub struct BuildSession {
    state: BuildState,
    generation: u64,
    in_flight: Option<BuildToken>,
}

impl BuildSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &BuildState {
        &self.state
    }

    pub fn is_building(&self) -> bool {
        matches!(self.state, BuildState::Building)
    }

    /// Enter `Building`. Fails if a build is already running.
    pub fn begin(&mut self) -> Result<BuildToken> {
        if self.is_building() {
            return Err(EverythingPdfError::BuildInProgress);
        }
        let token = BuildToken {
            generation: self.generation,
            build_id: Uuid::now_v7(),
        };
        self.in_flight = Some(token);
        self.state = BuildState::Building;
        debug!(build_id = %token.build_id, generation = token.generation, "build started");
        Ok(token)
    }

    /// Record the outcome of the build identified by `token`.
    pub fn complete(
        &mut self,
        token: BuildToken,
        outcome: std::result::Result<BuildArtifact, BuildFailure>,
    ) -> Completion {
        if self.in_flight != Some(token) {
            debug!(build_id = %token.build_id, "ignoring outcome of unknown build");
            return Completion::Ignored;
        }
        self.in_flight = None;

        if token.generation != self.generation {
            warn!(build_id = %token.build_id, "inputs changed during build, discarding result");
            self.state = BuildState::Idle;
            return Completion::Stale;
        }

        self.state = match outcome {
            Ok(artifact) => {
                info!(
                    build_id = %token.build_id,
                    pages = artifact.page_count,
                    size = artifact.size(),
                    "build succeeded"
                );
                BuildState::Succeeded(artifact)
            }
            Err(failure) => {
                warn!(build_id = %token.build_id, item = %failure.item, error = %failure.message, "build failed");
                BuildState::Failed(failure)
            }
        };
        Completion::Applied
    }

    /// Inputs changed: drop any finished result and mark a running build stale.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        if matches!(self.state, BuildState::Succeeded(_) | BuildState::Failed(_)) {
            self.state = BuildState::Idle;
        }
    }

    /// Back to `Idle`, forgetting any in-flight build.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.in_flight = None;
        self.state = BuildState::Idle;
    }

    pub fn can_download(&self) -> bool {
        matches!(self.state, BuildState::Succeeded(_))
    }

    pub fn artifact(&self) -> Option<&BuildArtifact> {
        match &self.state {
            BuildState::Succeeded(artifact) => Some(artifact),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&BuildFailure> {
        match &self.state {
            BuildState::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(pages: usize) -> BuildArtifact {
        BuildArtifact::from_assembly(
            AssembleResult {
                bytes: b"%PDF-1.7 fake".to_vec(),
                page_count: pages,
                base_pages: 0,
                document_pages: pages,
                image_pages: 0,
            },
            1,
            Uuid::now_v7(),
        )
    }

    fn failure() -> BuildFailure {
        BuildFailure {
            item: "item 1 'x.pdf'".into(),
            message: "could not open PDF".into(),
        }
    }

    #[test]
    fn success_path() {
        let mut session = BuildSession::new();
        assert!(!session.can_download());

        let token = session.begin().unwrap();
        assert!(session.is_building());
        assert_eq!(session.complete(token, Ok(artifact(3))), Completion::Applied);

        assert!(session.can_download());
        assert_eq!(session.artifact().unwrap().page_count, 3);
    }

    #[test]
    fn failure_path_keeps_details() {
        let mut session = BuildSession::new();
        let token = session.begin().unwrap();
        session.complete(token, Err(failure()));

        assert!(!session.can_download());
        let f = session.failure().unwrap();
        assert_eq!(f.item, "item 1 'x.pdf'");
        assert_eq!(session.state().label(), "failed");
    }

    #[test]
    fn no_reentrant_builds() {
        let mut session = BuildSession::new();
        let _token = session.begin().unwrap();
        assert!(matches!(session.begin(), Err(EverythingPdfError::BuildInProgress)));
    }

    #[test]
    fn invalidate_clears_finished_result() {
        let mut session = BuildSession::new();
        let token = session.begin().unwrap();
        session.complete(token, Ok(artifact(1)));

        session.invalidate();
        assert!(matches!(session.state(), BuildState::Idle));
        assert!(!session.can_download());
    }

    #[test]
    fn stale_build_is_discarded() {
        let mut session = BuildSession::new();
        let token = session.begin().unwrap();
        session.invalidate();
        assert!(session.is_building(), "running build keeps Building until it returns");

        assert_eq!(session.complete(token, Ok(artifact(2))), Completion::Stale);
        assert!(matches!(session.state(), BuildState::Idle));
    }

    #[test]
    fn outcome_after_reset_is_ignored() {
        let mut session = BuildSession::new();
        let token = session.begin().unwrap();
        session.reset();

        assert_eq!(session.complete(token, Ok(artifact(1))), Completion::Ignored);
        assert!(matches!(session.state(), BuildState::Idle));
        assert!(session.begin().is_ok());
    }

    #[test]
    fn rebuild_after_failure() {
        let mut session = BuildSession::new();
        let token = session.begin().unwrap();
        session.complete(token, Err(failure()));

        let token = session.begin().unwrap();
        session.complete(token, Ok(artifact(2)));
        assert!(session.can_download());
    }

    #[test]
    fn failure_from_assembly_error() {
        let err = EverythingPdfError::assembly("item 3 'z.png'", "invalid PNG image");
        let failure = BuildFailure::from_error(&err);
        assert_eq!(failure.item, "item 3 'z.png'");
        assert_eq!(failure.to_string(), err.to_string());
    }

    #[test]
    fn digest_is_hex_sha256() {
        let a = artifact(1);
        assert_eq!(a.sha256.len(), 64);
        assert!(a.sha256.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn save_writes_bytes() {
        let dir = std::env::temp_dir().join(format!("epdf-build-{}", Uuid::now_v7()));
        let path = dir.join("nested").join("out.pdf");
        let a = artifact(1);

        a.save(&path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7 fake");

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Core domain types shared by the EverythingPDF crates.

use serde::{Deserialize, Serialize};

/// Maximum number of queued uploads on the Free plan.
pub const FREE_LIMIT: usize = 2;

/// Key under which the plan is persisted in the key-value store.
pub const TIER_STORAGE_KEY: &str = "everythingpdf_isPro";

/// Media type of the output document and of PDF inputs.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Suggested file name for a locally saved build.
pub const DEFAULT_OUTPUT_NAME: &str = "everythingpdf.pdf";

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Admission-limit mode governing queue capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
}

impl Tier {
    /// Maximum queue length, or `None` when unbounded.
    pub fn cap(self) -> Option<usize> {
        match self {
            Tier::Free => Some(FREE_LIMIT),
            Tier::Pro => None,
        }
    }

    /// Value written to the key-value store.
    pub fn storage_value(self) -> &'static str {
        match self {
            Tier::Free => "0",
            Tier::Pro => "1",
        }
    }

    /// Decode a stored value. Anything other than `"1"` (including a missing
    /// key) is the Free plan.
    pub fn from_storage_value(value: Option<&str>) -> Self {
        match value {
            Some("1") => Tier::Pro,
            _ => Tier::Free,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Free => write!(f, "Free"),
            Tier::Pro => write!(f, "Pro"),
        }
    }
}

// ---------------------------------------------------------------------------
// Input kinds
// ---------------------------------------------------------------------------

/// Raster encodings the assembly engine can place on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSubkind {
    Png,
    Jpeg,
}

/// What a queued input contributes to the output document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "subkind", rename_all = "lowercase")]
pub enum InputKind {
    /// A PDF whose pages are copied wholesale.
    Document,
    /// A raster image that becomes exactly one page.
    Image(ImageSubkind),
}

impl InputKind {
    /// Short uppercase label used in listings (`PDF`, `PNG`, `JPEG`).
    pub fn label(self) -> &'static str {
        match self {
            InputKind::Document => "PDF",
            InputKind::Image(ImageSubkind::Png) => "PNG",
            InputKind::Image(ImageSubkind::Jpeg) => "JPEG",
        }
    }
}

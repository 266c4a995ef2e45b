//! Fetch request types.
//!
//! - [`BuildId`] - Normalized hex identifier with its cache shard split
//! - [`FileType`] - Which artifact of a build to fetch
//! - [`FetchRequest`] - Build ID plus file type

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SymbolError;

/// Shortest build ID accepted: a two character shard plus at least one more.
pub const MIN_BUILD_ID_LEN: usize = 3;

// ============================================================================
// Build ID
// ============================================================================

/// A validated, lowercase hex build identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BuildId(String);

impl BuildId {
    /// Parses and normalizes a build ID.
    ///
    /// Surrounding whitespace is trimmed and hex digits are lowercased.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::InvalidBuildId` if the string is shorter than
    /// [`MIN_BUILD_ID_LEN`] or contains non-hex characters.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let trimmed = raw.trim();
        if trimmed.len() < MIN_BUILD_ID_LEN {
            return Err(SymbolError::InvalidBuildId(format!(
                "'{trimmed}' is shorter than {MIN_BUILD_ID_LEN} characters"
            )));
        }
        if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SymbolError::InvalidBuildId(format!(
                "'{trimmed}' is not a hex string"
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Returns the normalized string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the two character shard directory name.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    /// Returns everything after the shard prefix.
    pub fn rest(&self) -> &str {
        &self.0[2..]
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BuildId {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BuildId> for String {
    fn from(id: BuildId) -> Self {
        id.0
    }
}

// ============================================================================
// File Type
// ============================================================================

/// Which file of a build to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// The stripped or unstripped binary itself.
    Binary,
    /// The separate debug information file.
    #[default]
    DebugInfo,
}

impl FileType {
    /// Suffix appended to the build ID in URLs and cache file names.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Binary => "",
            Self::DebugInfo => ".debug",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => write!(f, "binary"),
            Self::DebugInfo => write!(f, "debug info"),
        }
    }
}

// ============================================================================
// Fetch Request
// ============================================================================

/// A request for one file of one build.
///
/// The build ID is kept as the caller supplied it; servers validate it with
/// [`FetchRequest::parsed_build_id`] when the request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Hex build identifier.
    pub build_id: String,
    /// Which file to fetch.
    pub file_type: FileType,
}

impl FetchRequest {
    /// Creates a new request.
    pub fn new(build_id: impl Into<String>, file_type: FileType) -> Self {
        Self {
            build_id: build_id.into(),
            file_type,
        }
    }

    /// Creates a debug info request.
    pub fn debug_info(build_id: impl Into<String>) -> Self {
        Self::new(build_id, FileType::DebugInfo)
    }

    /// Creates a binary request.
    pub fn binary(build_id: impl Into<String>) -> Self {
        Self::new(build_id, FileType::Binary)
    }

    /// Validates and normalizes the build ID.
    ///
    /// # Errors
    ///
    /// Returns `SymbolError::InvalidBuildId` for malformed IDs.
    pub fn parsed_build_id(&self) -> Result<BuildId, SymbolError> {
        BuildId::parse(&self.build_id)
    }
}

impl fmt::Display for FetchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.build_id, self.file_type)
    }
}

// ============================================================================
// Tests
// ============================================================================

// mvnkit: Dependency resolution and effective-model engine for Maven-style builds.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

//! Errors of every layer. All of them are plain data so that a cached failure
//! can be handed out again, or written to disk, exactly as it was produced.

use mvnutil::{
    coordinate::{Coordinate, VersionlessKey},
    version::{NoMatchingVersionError, RangeSyntaxError},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conflict::Conflict;

/// Coordinates from the root down to a node, both ends included.
pub type DependencyPath = Vec<Coordinate>;

pub fn display_path(path: &[Coordinate]) -> String {
    path.iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataErrorKind {
    /// The artifact does not exist. Retrying will not help.
    NotFound,
    /// I/O or network trouble. A later attempt may succeed.
    Transient,
    /// The metadata exists but cannot be understood.
    Malformed,
}

impl std::fmt::Display for MetadataErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataErrorKind::NotFound => write!(f, "not found"),
            MetadataErrorKind::Transient => write!(f, "transient failure"),
            MetadataErrorKind::Malformed => write!(f, "malformed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("cannot read `{target}` ({kind}): {message}")]
pub struct MetadataError {
    pub target: String,
    pub kind: MetadataErrorKind,
    pub message: String,
}

impl MetadataError {
    pub fn new(target: impl ToString, kind: MetadataErrorKind, message: impl Into<String>) -> Self {
        MetadataError {
            target: target.to_string(),
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(target: impl ToString) -> Self {
        Self::new(target, MetadataErrorKind::NotFound, "no such artifact")
    }

    pub fn transient(target: impl ToString, message: impl Into<String>) -> Self {
        Self::new(target, MetadataErrorKind::Transient, message)
    }

    pub fn malformed(target: impl ToString, message: impl Into<String>) -> Self {
        Self::new(target, MetadataErrorKind::Malformed, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == MetadataErrorKind::Transient
    }
}

/// Errors while computing an effective model.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ModelBuildError {
    #[error("parent cycle: {}", display_path(members))]
    ParentCycle { members: Vec<Coordinate> },
    #[error("property cycle in {model}: {}", members.join(" -> "))]
    PropertyCycle { model: String, members: Vec<String> },
    #[error("import cycle: {}", display_path(members))]
    ImportCycle { members: Vec<Coordinate> },
    #[error("invalid model {coordinate}: {reason}")]
    InvalidModel { coordinate: String, reason: String },
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("in {coordinate}: {error}")]
    Range {
        coordinate: String,
        error: RangeSyntaxError,
    },
}

impl ModelBuildError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelBuildError::Metadata(e) if e.is_transient())
    }
}

/// Errors of the top-level [`resolve`](crate::resolver::resolve) call.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ResolveError {
    #[error("{error}, declared at {}", display_path(path))]
    RangeSyntax {
        error: RangeSyntaxError,
        path: DependencyPath,
    },
    #[error("cannot resolve {key}: {error}, required at {}", display_path(path))]
    NoMatchingVersion {
        key: VersionlessKey,
        error: NoMatchingVersionError,
        path: DependencyPath,
    },
    #[error("metadata of {coordinate} is unavailable ({kind}): {message}, required at {}", display_path(path))]
    MetadataUnavailable {
        coordinate: Coordinate,
        path: DependencyPath,
        kind: MetadataErrorKind,
        message: String,
    },
    #[error("{} version conflict(s): {}", conflicts.len(), display_conflicts(conflicts))]
    VersionConflict { conflicts: Vec<Conflict> },
    #[error("parent cycle: {}", display_path(members))]
    ParentCycle { members: Vec<Coordinate> },
    #[error("property cycle in {model}: {}", members.join(" -> "))]
    PropertyCycle { model: String, members: Vec<String> },
    #[error("import cycle: {}", display_path(members))]
    ImportCycle { members: Vec<Coordinate> },
    #[error("invalid model {coordinate}: {reason}")]
    InvalidModel { coordinate: String, reason: String },
    #[error("dependency graph exceeds {limit} nodes")]
    TooManyNodes { limit: usize },
    #[error("resolution cancelled")]
    Cancelled,
}

fn display_conflicts(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ResolveError {
    /// Lifts a model error raised while handling the node at `path`.
    pub fn from_model_error(error: ModelBuildError, path: DependencyPath) -> Self {
        match error {
            ModelBuildError::ParentCycle { members } => ResolveError::ParentCycle { members },
            ModelBuildError::PropertyCycle { model, members } => {
                ResolveError::PropertyCycle { model, members }
            }
            ModelBuildError::ImportCycle { members } => ResolveError::ImportCycle { members },
            ModelBuildError::InvalidModel { coordinate, reason } => {
                ResolveError::InvalidModel { coordinate, reason }
            }
            ModelBuildError::Range { error, .. } => ResolveError::RangeSyntax { error, path },
            ModelBuildError::Metadata(e) => {
                let coordinate = e
                    .target
                    .parse()
                    .ok()
                    .or_else(|| path.last().cloned())
                    .unwrap_or_else(|| Coordinate::new("", "", ""));
                ResolveError::MetadataUnavailable {
                    coordinate,
                    path,
                    kind: e.kind,
                    message: e.message,
                }
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResolveError::Cancelled)
    }
}

/// A failed step of a cached resolution.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ResolutionFailure {
    #[error(transparent)]
    Model(#[from] ModelBuildError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl ResolutionFailure {
    /// Failures that may go away on a retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ResolutionFailure::Model(e) => e.is_transient(),
            ResolutionFailure::Resolve(ResolveError::MetadataUnavailable { kind, .. }) => {
                *kind == MetadataErrorKind::Transient
            }
            ResolutionFailure::Resolve(e) => e.is_cancelled(),
        }
    }
}

#[cfg(test)]
mod test {
    use expect_test::expect;

    use super::*;

    #[test]
    fn test_metadata_error_lifts_with_path() {
        let path = vec![Coordinate::new("g", "root", "1"), Coordinate::new("g", "a", "2")];
        let e = ResolveError::from_model_error(
            MetadataError::transient("g:parent:pom:3", "connection reset").into(),
            path,
        );
        expect!["metadata of g:parent:pom:3 is unavailable (transient failure): connection reset, required at g:root:1 -> g:a:2"]
            .assert_eq(&e.to_string());
    }

    #[test]
    fn test_errors_survive_json() {
        let e = ResolveError::ParentCycle {
            members: vec![Coordinate::new("g", "a", "1"), Coordinate::new("g", "a", "1")],
        };
        let text = serde_json::to_string(&e).unwrap();
        let back: ResolveError = serde_json::from_str(&text).unwrap();
        assert_eq!(back, e);
        assert!(!e.is_cancelled());
    }

    #[test]
    fn test_transient_failures() {
        let transient: ResolutionFailure =
            ModelBuildError::from(MetadataError::transient("g:a:1", "timeout")).into();
        assert!(transient.is_transient());
        assert!(ResolutionFailure::from(ResolveError::Cancelled).is_transient());
        let lifted = ResolveError::from_model_error(
            MetadataError::transient("g:a:1", "timeout").into(),
            vec![Coordinate::new("g", "a", "1")],
        );
        assert!(ResolutionFailure::from(lifted).is_transient());
        let conflict = ResolveError::VersionConflict { conflicts: Vec::new() };
        assert!(!ResolutionFailure::from(conflict).is_transient());
    }
}

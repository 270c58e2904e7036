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

use mvnutil::coordinate::Coordinate;
use serde::{Deserialize, Serialize};

use crate::error::{DependencyPath, MetadataError, display_path};

/// Something tolerated during resolution that callers may want to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Diagnostic {
    /// A dependency leads back to an artifact already on its path.
    Cycle {
        coordinate: Coordinate,
        path: DependencyPath,
    },
    /// An optional dependency whose metadata could not be read.
    SkippedOptional {
        coordinate: Coordinate,
        path: DependencyPath,
        error: MetadataError,
    },
    /// A transitive declaration without a version, even after management.
    MissingVersion {
        dependency: String,
        declared_by: Coordinate,
    },
    /// A declaration that cannot take part in the graph, e.g. `import` scope
    /// outside dependency management.
    Ignored {
        dependency: String,
        declared_by: Coordinate,
        reason: String,
    },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::Cycle { coordinate, path } => {
                write!(f, "cycle at {} via {}", coordinate, display_path(path))
            }
            Diagnostic::SkippedOptional {
                coordinate, error, ..
            } => write!(f, "skipped optional {}: {}", coordinate, error),
            Diagnostic::MissingVersion {
                dependency,
                declared_by,
            } => write!(f, "{} declared by {} has no version", dependency, declared_by),
            Diagnostic::Ignored {
                dependency,
                declared_by,
                reason,
            } => write!(f, "ignored {} declared by {}: {}", dependency, declared_by, reason),
        }
    }
}

/// Collects diagnostics for one resolution. Passed down explicitly so that
/// concurrent resolutions never see each other's reports.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::Cycle { .. } => log::debug!("{}", diagnostic),
            _ => log::warn!("{}", diagnostic),
        }
        self.items.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

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

//! Effective-model computation and dependency resolution.

#![warn(clippy::unwrap_used)]

pub mod cache;
pub mod cancel;
pub mod conflict;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod interpolate;
pub mod merge;
pub mod model_builder;
pub mod options;
pub mod profile;
pub mod reader;
pub mod resolver;

pub use cancel::CancellationToken;
pub use conflict::{ClasspathScope, Conflict, ConflictReason, ResolvedDependency, ResolvedDependencySet};
pub use error::{MetadataError, MetadataErrorKind, ModelBuildError, ResolutionFailure, ResolveError};
pub use options::{ConflictPolicy, ResolveOptions, ResolveOptionsBuilder};
pub use reader::{LocalRepository, MemoryRepository, MetadataReader, ReaderChain};
pub use resolver::{Resolution, ResolutionCache, resolve, resolve_with_cancel};

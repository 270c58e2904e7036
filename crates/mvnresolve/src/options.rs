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

use std::path::Path;

use anyhow::Context;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::model_builder::DEFAULT_MAX_PARENT_DEPTH;

pub const DEFAULT_MAX_CONCURRENT_READS: usize = 8;

/// What `resolve` does with version conflicts that cannot be satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Return `ResolveError::VersionConflict`.
    #[default]
    Fail,
    /// Log the conflicts and return the resolution with them recorded.
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into))]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ResolveOptions {
    #[builder(default = DEFAULT_MAX_PARENT_DEPTH)]
    pub max_parent_depth: usize,

    /// Threads reading models of one BFS level. `0` or `1` reads on the
    /// calling thread.
    #[builder(default = DEFAULT_MAX_CONCURRENT_READS)]
    pub max_concurrent_reads: usize,

    #[builder(default)]
    pub conflict_policy: ConflictPolicy,

    /// Activate profiles of dependency models against the caller's
    /// environment instead of an empty one.
    #[builder(default = false)]
    pub inherit_environment: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            max_parent_depth: DEFAULT_MAX_PARENT_DEPTH,
            max_concurrent_reads: DEFAULT_MAX_CONCURRENT_READS,
            conflict_policy: ConflictPolicy::default(),
            inherit_environment: false,
        }
    }
}

impl ResolveOptions {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("failed to parse resolve options")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read `{}`", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in `{}`", path.display()))
    }

    /// Options from the user's options file, or the defaults when it does
    /// not exist.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = mvnutil::mvn_dir::options_file()?;
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

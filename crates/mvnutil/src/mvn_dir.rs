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

use std::path::{Path, PathBuf};

use anyhow::Context;

pub const HOME_ENV: &str = "MVNKIT_HOME";
pub const REPOSITORY_ENV: &str = "MVNKIT_REPOSITORY";
pub const OPTIONS_FILE: &str = "options.toml";

fn home_from(override_dir: Option<PathBuf>, user_home: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = override_dir {
        return Ok(dir);
    }
    let h = user_home.context("failed to get home directory")?;
    Ok(h.join(".mvnkit"))
}

/// `$MVNKIT_HOME`, or `~/.mvnkit`.
pub fn home() -> anyhow::Result<PathBuf> {
    home_from(
        std::env::var_os(HOME_ENV).map(PathBuf::from),
        home::home_dir(),
    )
}

fn ensure_dir(dir: PathBuf) -> anyhow::Result<PathBuf> {
    if !dir.exists() {
        log::debug!("creating {}", dir.display());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    Ok(dir)
}

/// Root of the local metadata repository.
pub fn local_repository() -> anyhow::Result<PathBuf> {
    if let Some(dir) = std::env::var_os(REPOSITORY_ENV) {
        return ensure_dir(PathBuf::from(dir));
    }
    ensure_dir(home()?.join("repository"))
}

/// Directory of the persistent request cache.
pub fn cache_dir() -> anyhow::Result<PathBuf> {
    ensure_dir(home()?.join("cache"))
}

pub fn options_file() -> anyhow::Result<PathBuf> {
    Ok(home()?.join(OPTIONS_FILE))
}

/// Path of a model inside a repository rooted at `root`:
/// `<root>/<group path>/<artifact>/<version>/<artifact>-<version>.json`.
pub fn model_path(root: &Path, group_id: &str, artifact_id: &str, version: &str) -> PathBuf {
    let mut p = root.to_path_buf();
    for segment in group_id.split('.') {
        p.push(segment);
    }
    p.push(artifact_id);
    p.push(version);
    p.push(format!("{}-{}.json", artifact_id, version));
    p
}

/// Directory holding every version of an artifact.
pub fn artifact_dir(root: &Path, group_id: &str, artifact_id: &str) -> PathBuf {
    let mut p = root.to_path_buf();
    for segment in group_id.split('.') {
        p.push(segment);
    }
    p.push(artifact_id);
    p
}

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

use mvnutil::{
    common::{ModelJsonFormatErrorKind, read_model_from_json},
    coordinate::{Coordinate, VersionlessKey},
    model::Model,
    mvn_dir,
    version::Version,
};

use super::MetadataReader;
use crate::error::MetadataError;

/// A repository laid out on disk as
/// `<root>/<group path>/<artifact>/<version>/<artifact>-<version>.json`.
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalRepository { root: root.into() }
    }

    /// The repository under the mvnkit home directory.
    pub fn default_location() -> anyhow::Result<Self> {
        Ok(LocalRepository::new(mvn_dir::local_repository()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_path(&self, coordinate: &Coordinate) -> PathBuf {
        mvn_dir::model_path(
            &self.root,
            &coordinate.group_id,
            &coordinate.artifact_id,
            &coordinate.version,
        )
    }
}

impl MetadataReader for LocalRepository {
    fn read(&self, coordinate: &Coordinate) -> Result<Model, MetadataError> {
        let path = self.model_path(coordinate);
        log::debug!("Reading {} from {}", coordinate, path.display());
        read_model_from_json(&path).map_err(|e| {
            if e.is_not_found() {
                return MetadataError::not_found(coordinate);
            }
            match &e.kind {
                ModelJsonFormatErrorKind::IO(io) => {
                    MetadataError::transient(coordinate, io.to_string())
                }
                ModelJsonFormatErrorKind::Parse(p) => {
                    MetadataError::malformed(coordinate, p.to_string())
                }
                ModelJsonFormatErrorKind::EmptyArtifactId => {
                    MetadataError::malformed(coordinate, e.kind.to_string())
                }
            }
        })
    }

    fn available_versions(&self, key: &VersionlessKey) -> Result<Vec<Version>, MetadataError> {
        let dir = mvn_dir::artifact_dir(&self.root, &key.group_id, &key.artifact_id);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MetadataError::not_found(key));
            }
            Err(e) => return Err(MetadataError::transient(key, e.to_string())),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MetadataError::transient(key, e.to_string()))?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let model = entry
                .path()
                .join(format!("{}-{}.json", key.artifact_id, name));
            if model.is_file() {
                versions.push(Version::new(name));
            } else {
                log::debug!("Ignoring {} without a model file", entry.path().display());
            }
        }
        versions.sort();
        Ok(versions)
    }
}

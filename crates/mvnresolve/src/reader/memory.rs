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

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use mvnutil::{
    coordinate::{Coordinate, VersionlessKey},
    dependency::Dependency,
    model::Model,
    version::Version,
};

use super::MetadataReader;
use crate::error::{MetadataError, MetadataErrorKind};

type ArtifactId = (String, String);

/// An in-memory repository. Models are looked up by `groupId:artifactId` and
/// version, so the type and classifier of a request do not matter.
///
/// Failures can be injected per coordinate, and every call is counted.
#[derive(Default)]
pub struct MemoryRepository {
    models: HashMap<ArtifactId, BTreeMap<Version, Arc<Model>>>,
    read_failures: HashMap<(ArtifactId, Version), MetadataErrorKind>,
    version_failures: HashMap<ArtifactId, MetadataErrorKind>,
    reads: AtomicUsize,
    version_lookups: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        MemoryRepository::default()
    }

    /// Adds a model under its own coordinate, replacing any previous one.
    pub fn add_model(&mut self, model: Model) -> &mut Self {
        let id = (
            model.effective_group_id().to_owned(),
            model.artifact_id.clone(),
        );
        let version = Version::new(model.effective_version());
        self.models
            .entry(id)
            .or_default()
            .insert(version, Arc::new(model));
        self
    }

    /// Adds `group:artifact:version` declaring `deps`.
    pub fn add_artifact(
        &mut self,
        group_id: &str,
        artifact_id: &str,
        version: &str,
        deps: impl IntoIterator<Item = Dependency>,
    ) -> &mut Self {
        let mut model = Model::new(group_id, artifact_id, version);
        model.base.dependencies = deps.into_iter().collect();
        self.add_model(model)
    }

    /// Makes every read of `coordinate` fail with `kind`.
    pub fn fail_with(&mut self, coordinate: Coordinate, kind: MetadataErrorKind) -> &mut Self {
        let version = Version::new(&coordinate.version);
        self.read_failures
            .insert((artifact_id_of(&coordinate), version), kind);
        self
    }

    /// Makes every version listing of `key` fail with `kind`.
    pub fn fail_versions_with(&mut self, key: &VersionlessKey, kind: MetadataErrorKind) -> &mut Self {
        self.version_failures
            .insert((key.group_id.clone(), key.artifact_id.clone()), kind);
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn version_lookup_count(&self) -> usize {
        self.version_lookups.load(Ordering::SeqCst)
    }
}

fn artifact_id_of(coordinate: &Coordinate) -> ArtifactId {
    (coordinate.group_id.clone(), coordinate.artifact_id.clone())
}

fn injected(target: impl ToString, kind: MetadataErrorKind) -> MetadataError {
    MetadataError::new(target, kind, "injected failure")
}

impl MetadataReader for MemoryRepository {
    fn read(&self, coordinate: &Coordinate) -> Result<Model, MetadataError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let id = artifact_id_of(coordinate);
        let version = Version::new(&coordinate.version);

        if let Some(kind) = self.read_failures.get(&(id.clone(), version.clone())) {
            return Err(injected(coordinate, *kind));
        }
        self.models
            .get(&id)
            .and_then(|versions| versions.get(&version))
            .map(|m| (**m).clone())
            .ok_or_else(|| MetadataError::not_found(coordinate))
    }

    fn available_versions(&self, key: &VersionlessKey) -> Result<Vec<Version>, MetadataError> {
        self.version_lookups.fetch_add(1, Ordering::SeqCst);
        let id = (key.group_id.clone(), key.artifact_id.clone());

        if let Some(kind) = self.version_failures.get(&id) {
            return Err(injected(key, *kind));
        }
        self.models
            .get(&id)
            .map(|versions| versions.keys().cloned().collect())
            .ok_or_else(|| MetadataError::not_found(key))
    }
}

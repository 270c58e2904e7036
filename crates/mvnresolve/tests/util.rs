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

#![allow(dead_code)]

use mvnresolve::{
    MemoryRepository, Resolution, ResolutionCache, ResolveError, ResolveOptions, resolve,
};
use mvnutil::{
    dependency::Dependency,
    environment::Environment,
    model::{Model, Parent},
};

pub fn dep(artifact_id: &str, version: &str) -> Dependency {
    Dependency::new("g", artifact_id).with_version(version)
}

pub fn app(deps: impl IntoIterator<Item = Dependency>) -> Model {
    let mut m = Model::new("g", "app", "1");
    m.base.dependencies = deps.into_iter().collect();
    m
}

pub fn pom(group_id: &str, artifact_id: &str, version: &str) -> Model {
    let mut m = Model::new(group_id, artifact_id, version);
    m.packaging = Some("pom".into());
    m
}

pub fn parent(group_id: &str, artifact_id: &str, version: &str) -> Option<Parent> {
    Some(Parent {
        group_id: group_id.into(),
        artifact_id: artifact_id.into(),
        version: version.into(),
        relative_path: None,
    })
}

pub fn resolve_in(repo: &MemoryRepository, root: &Model) -> Result<Resolution, ResolveError> {
    resolve(
        root,
        repo,
        &Environment::empty(),
        &ResolutionCache::new(),
        &ResolveOptions::default(),
    )
}

/// `artifactId:version` of every resolved dependency, in resolution order.
pub fn versions(resolution: &Resolution) -> Vec<String> {
    resolution
        .dependencies
        .iter()
        .map(|d| format!("{}:{}", d.coordinate.artifact_id, d.coordinate.version))
        .collect()
}

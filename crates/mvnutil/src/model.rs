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

//! The project object model.
//!
//! Models are plain values. Reading produces a fresh model, and inheritance
//! produces a new merged model instead of mutating the inputs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;
use crate::dependency::Dependency;

pub const DEFAULT_PACKAGING: &str = "jar";
pub const DEFAULT_PLUGIN_GROUP: &str = "org.apache.maven.plugins";

/// Reference from a model to its parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    /// Location hint of the parent inside a multi-module checkout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
}

impl Parent {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(&self.group_id, &self.artifact_id, &self.version).with_type("pom")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "yes", skip_serializing_if = "is_yes")]
    pub releases: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub snapshots: bool,
}

fn yes() -> bool {
    true
}

fn is_yes(b: &bool) -> bool {
    *b
}

fn default_plugin_group() -> String {
    DEFAULT_PLUGIN_GROUP.to_owned()
}

/// A build plugin. Its configuration is carried along but never interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    #[serde(default = "default_plugin_group")]
    pub group_id: String,
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub configuration: serde_json::Value,
}

impl Plugin {
    pub fn key(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
}

/// The part of a model that profiles can contribute to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelBase {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_management: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<Build>,
}

impl ModelBase {
    /// Visits every interpolatable string in this fragment.
    pub fn for_each_string_mut(&mut self, f: &mut dyn FnMut(&mut String)) {
        for value in self.properties.values_mut() {
            f(value);
        }
        for dep in self
            .dependencies
            .iter_mut()
            .chain(self.dependency_management.iter_mut())
        {
            visit_dependency(dep, f);
        }
        for repo in &mut self.repositories {
            f(&mut repo.id);
            f(&mut repo.url);
            if let Some(name) = &mut repo.name {
                f(name);
            }
        }
        if let Some(build) = &mut self.build {
            if let Some(s) = &mut build.final_name {
                f(s);
            }
            if let Some(s) = &mut build.directory {
                f(s);
            }
            for plugin in &mut build.plugins {
                f(&mut plugin.group_id);
                f(&mut plugin.artifact_id);
                if let Some(v) = &mut plugin.version {
                    f(v);
                }
                visit_json(&mut plugin.configuration, f);
            }
        }
    }
}

fn visit_dependency(dep: &mut Dependency, f: &mut dyn FnMut(&mut String)) {
    f(&mut dep.group_id);
    f(&mut dep.artifact_id);
    if let Some(v) = &mut dep.version {
        f(v);
    }
    f(&mut dep.artifact_type);
    f(&mut dep.classifier);
    if let Some(p) = &mut dep.system_path {
        f(p);
    }
    for excl in &mut dep.exclusions {
        f(&mut excl.group_id);
        f(&mut excl.artifact_id);
    }
}

fn visit_json(value: &mut serde_json::Value, f: &mut dyn FnMut(&mut String)) {
    match value {
        serde_json::Value::String(s) => f(s),
        serde_json::Value::Array(items) => items.iter_mut().for_each(|v| visit_json(v, f)),
        serde_json::Value::Object(map) => map.values_mut().for_each(|v| visit_json(v, f)),
        _ => {}
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packaging: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Parent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(flatten)]
    pub base: ModelBase,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<Profile>,
}

impl Model {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Model {
            group_id: Some(group_id.into()),
            artifact_id: artifact_id.into(),
            version: Some(version.into()),
            ..Default::default()
        }
    }

    /// The group id, falling back to the parent's as Maven does for identity.
    pub fn effective_group_id(&self) -> &str {
        self.group_id
            .as_deref()
            .or(self.parent.as_ref().map(|p| p.group_id.as_str()))
            .unwrap_or_default()
    }

    pub fn effective_version(&self) -> &str {
        self.version
            .as_deref()
            .or(self.parent.as_ref().map(|p| p.version.as_str()))
            .unwrap_or_default()
    }

    pub fn packaging(&self) -> &str {
        self.packaging.as_deref().unwrap_or(DEFAULT_PACKAGING)
    }

    pub fn coordinate(&self) -> Coordinate {
        let coord = Coordinate::new(
            self.effective_group_id(),
            &self.artifact_id,
            self.effective_version(),
        );
        if self.packaging() == "pom" {
            coord.with_type("pom")
        } else {
            coord
        }
    }

    pub fn properties(&self) -> &IndexMap<String, String> {
        &self.base.properties
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.base.dependencies
    }

    pub fn dependency_management(&self) -> &[Dependency] {
        &self.base.dependency_management
    }

    /// Visits every interpolatable string of the model itself. Profiles and
    /// the parent reference are left alone.
    pub fn for_each_string_mut(&mut self, f: &mut dyn FnMut(&mut String)) {
        for s in [
            &mut self.group_id,
            &mut self.version,
            &mut self.packaging,
            &mut self.name,
            &mut self.description,
            &mut self.url,
        ]
        .into_iter()
        .flatten()
        {
            f(s);
        }
        f(&mut self.artifact_id);
        self.base.for_each_string_mut(f);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<Activation>,
    #[serde(flatten)]
    pub base: ModelBase,
}

impl Profile {
    pub fn new(id: impl Into<String>) -> Self {
        Profile {
            id: id.into(),
            activation: None,
            base: ModelBase::default(),
        }
    }

    pub fn is_active_by_default(&self) -> bool {
        self.activation.as_ref().is_some_and(|a| a.active_by_default)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub active_by_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jdk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<ActivationOs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<ActivationProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<ActivationFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationOs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationProperty {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivationFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<String>,
}

/// A single activation predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationCondition<'a> {
    Jdk(&'a str),
    Os(&'a ActivationOs),
    Property(&'a ActivationProperty),
    File(&'a ActivationFile),
}

impl Activation {
    /// The declared predicates, excluding `activeByDefault`.
    pub fn conditions(&self) -> Vec<ActivationCondition<'_>> {
        let mut out = Vec::new();
        if let Some(jdk) = &self.jdk {
            out.push(ActivationCondition::Jdk(jdk));
        }
        if let Some(os) = &self.os {
            out.push(ActivationCondition::Os(os));
        }
        if let Some(p) = &self.property {
            out.push(ActivationCondition::Property(p));
        }
        if let Some(file) = &self.file {
            out.push(ActivationCondition::File(file));
        }
        out
    }
}

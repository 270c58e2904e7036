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

//! `${...}` expansion over a merged model.

use std::collections::HashMap;

use mvnutil::{environment::Environment, model::Model};

use crate::error::ModelBuildError;

/// Expands every `${name}` reference in `model`.
///
/// Names are looked up among the `project.*` built-ins, then user
/// properties, model properties, system properties and finally `env.*`.
/// Unknown references are kept verbatim.
pub fn interpolate(model: &Model, env: &Environment) -> Result<Model, ModelBuildError> {
    let mut out = model.clone();
    let mut interpolator = Interpolator::new(model, env);
    let mut error = None;
    out.for_each_string_mut(&mut |s| {
        if error.is_some() || !s.contains("${") {
            return;
        }
        match interpolator.expand(s) {
            Ok(expanded) => *s = expanded,
            Err(e) => error = Some(e),
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

struct Interpolator<'a> {
    model: &'a Model,
    env: &'a Environment,
    resolved: HashMap<String, Option<String>>,
    visiting: Vec<String>,
}

impl<'a> Interpolator<'a> {
    fn new(model: &'a Model, env: &'a Environment) -> Self {
        Interpolator {
            model,
            env,
            resolved: HashMap::new(),
            visiting: Vec::new(),
        }
    }

    fn builtin(&self, name: &str) -> Option<String> {
        let model = self.model;
        let name = name.strip_prefix("pom.").unwrap_or(name);
        let name = name.strip_prefix("project.").unwrap_or(name);
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_owned());
        match name {
            "groupId" => non_empty(model.effective_group_id()),
            "artifactId" => Some(model.artifact_id.clone()),
            "version" => non_empty(model.effective_version()),
            "packaging" => Some(model.packaging().to_owned()),
            "name" => model.name.clone(),
            "description" => model.description.clone(),
            "url" => model.url.clone(),
            "parent.groupId" => model.parent.as_ref().map(|p| p.group_id.clone()),
            "parent.artifactId" => model.parent.as_ref().map(|p| p.artifact_id.clone()),
            "parent.version" => model.parent.as_ref().map(|p| p.version.clone()),
            "basedir" => self
                .env
                .base_dir
                .as_ref()
                .map(|dir| dir.to_string_lossy().into_owned()),
            _ => None,
        }
    }

    fn raw(&self, name: &str) -> Option<String> {
        let is_builtin = name == "basedir" || name.starts_with("project.") || name.starts_with("pom.");
        if is_builtin && let Some(v) = self.builtin(name) {
            return Some(v);
        }
        self.env
            .user_properties
            .get(name)
            .or_else(|| self.model.properties().get(name))
            .or_else(|| self.env.system_properties.get(name))
            .or_else(|| {
                name.strip_prefix("env.")
                    .and_then(|var| self.env.env_vars.get(var))
            })
            .cloned()
    }

    fn lookup(&mut self, name: &str) -> Result<Option<String>, ModelBuildError> {
        if let Some(value) = self.resolved.get(name) {
            return Ok(value.clone());
        }
        if let Some(start) = self.visiting.iter().position(|n| n == name) {
            let mut members = self.visiting[start..].to_vec();
            members.push(name.to_owned());
            return Err(ModelBuildError::PropertyCycle {
                model: self.model.coordinate().to_string(),
                members,
            });
        }

        let value = match self.raw(name) {
            Some(raw) => {
                self.visiting.push(name.to_owned());
                let expanded = self.expand(&raw)?;
                self.visiting.pop();
                Some(expanded)
            }
            None => None,
        };
        self.resolved.insert(name.to_owned(), value.clone());
        Ok(value)
    }

    fn expand(&mut self, text: &str) -> Result<String, ModelBuildError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return Ok(out);
            };
            let name = &after[..end];
            match self.lookup(name)? {
                Some(value) => out.push_str(&value),
                None => {
                    log::debug!("Leaving unknown reference ${{{}}} as is", name);
                    out.push_str(&rest[start..start + 2 + end + 1]);
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

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

//! Effective model computation.
//!
//! The effective model of a raw model is obtained by, in order:
//!
//! 1. walking the parent chain up to its root,
//! 2. merging from the top ancestor down, injecting each model's active
//!    profiles on the way,
//! 3. interpolating `${...}` references,
//! 4. replacing `import` entries of dependency management with the
//!    management of the imported models,
//! 5. filling unset dependency fields from dependency management.

use std::collections::HashMap;

use mvnutil::{
    coordinate::Coordinate,
    dependency::{Dependency, Scope},
    environment::Environment,
    model::{Model, Profile},
    version::{Version, VersionRange},
};

use crate::{
    error::ModelBuildError,
    interpolate::interpolate,
    merge::{merge, merge_keyed},
    profile::active_profiles,
    reader::MetadataReader,
};

pub const DEFAULT_MAX_PARENT_DEPTH: usize = 64;

pub struct ModelBuilder<'a> {
    reader: &'a dyn MetadataReader,
    max_parent_depth: usize,
}

fn same_artifact(a: &Coordinate, b: &Coordinate) -> bool {
    a.group_id == b.group_id && a.artifact_id == b.artifact_id && a.version == b.version
}

impl<'a> ModelBuilder<'a> {
    pub fn new(reader: &'a dyn MetadataReader) -> Self {
        ModelBuilder {
            reader,
            max_parent_depth: DEFAULT_MAX_PARENT_DEPTH,
        }
    }

    pub fn max_parent_depth(mut self, depth: usize) -> Self {
        self.max_parent_depth = depth;
        self
    }

    /// Reads `coordinate` and computes its effective model.
    pub fn build_coordinate(
        &self,
        coordinate: &Coordinate,
        env: &Environment,
    ) -> Result<Model, ModelBuildError> {
        let raw = self.reader.read(coordinate)?;
        self.build(&raw, env)
    }

    /// Computes the effective model of an already loaded raw model.
    pub fn build(&self, model: &Model, env: &Environment) -> Result<Model, ModelBuildError> {
        let mut imports = vec![model.coordinate()];
        self.build_inner(model, env, &mut imports)
    }

    fn build_inner(
        &self,
        model: &Model,
        env: &Environment,
        imports: &mut Vec<Coordinate>,
    ) -> Result<Model, ModelBuildError> {
        let parents = self.lineage(model)?;

        let mut inherited: Option<Model> = None;
        for parent in parents.iter().rev() {
            inherited = Some(merge_with_profiles(parent, inherited.as_ref(), env));
        }
        let merged = merge_with_profiles(model, inherited.as_ref(), env);

        let interpolated = interpolate(&merged, env)?;
        let mut effective = self.import_management(interpolated, env, imports)?;
        inject_management(&mut effective);
        validate(&effective)?;
        Ok(effective)
    }

    /// Reads the ancestors of `model`, nearest first.
    fn lineage(&self, model: &Model) -> Result<Vec<Model>, ModelBuildError> {
        let mut members = vec![model.coordinate()];
        let mut parents = Vec::new();
        let mut next = model.parent.clone();
        while let Some(parent) = next {
            let coordinate = parent.coordinate();
            let revisited = members.iter().any(|m| same_artifact(m, &coordinate));
            members.push(coordinate.clone());
            if revisited || parents.len() >= self.max_parent_depth {
                return Err(ModelBuildError::ParentCycle { members });
            }

            log::debug!("Reading parent {} of {}", coordinate, model.artifact_id);
            let raw = self.reader.read(&coordinate)?;
            next = raw.parent.clone();
            parents.push(raw);
        }
        Ok(parents)
    }

    fn import_management(
        &self,
        mut model: Model,
        env: &Environment,
        imports: &mut Vec<Coordinate>,
    ) -> Result<Model, ModelBuildError> {
        let is_import = |d: &Dependency| d.scope == Some(Scope::Import) && d.artifact_type == "pom";
        if !model.dependency_management().iter().any(is_import) {
            return Ok(model);
        }

        let declared = std::mem::take(&mut model.base.dependency_management);
        let mut explicit = Vec::new();
        let mut imported: Vec<Dependency> = Vec::new();
        for dep in declared {
            if !is_import(&dep) {
                explicit.push(dep);
                continue;
            }
            let coordinate = import_coordinate(&model, &dep)?;
            if let Some(start) = imports.iter().position(|c| same_artifact(c, &coordinate)) {
                let mut members = imports[start..].to_vec();
                members.push(coordinate);
                return Err(ModelBuildError::ImportCycle { members });
            }

            log::debug!("Importing management of {} into {}", coordinate, model.coordinate());
            imports.push(coordinate.clone());
            let raw = self.reader.read(&coordinate)?;
            let bom = self.build_inner(&raw, env, imports)?;
            imports.pop();

            // earlier imports win over later ones
            imported = merge_keyed(&imported, bom.dependency_management(), |d| d.key());
        }
        model.base.dependency_management = merge_keyed(&explicit, &imported, |d| d.key());
        Ok(model)
    }
}

fn merge_with_profiles(model: &Model, parent: Option<&Model>, env: &Environment) -> Model {
    let active = active_profiles(&model.profiles, env);
    if !active.is_empty() {
        log::debug!(
            "Active profiles of {}: {:?}",
            model.artifact_id,
            active.iter().collect::<Vec<_>>()
        );
    }
    let profiles: Vec<&Profile> = model
        .profiles
        .iter()
        .filter(|p| active.contains(&p.id))
        .collect();
    merge(model, parent, &profiles)
}

/// An import needs one definite version: a soft version or `[v]`.
fn import_coordinate(model: &Model, dep: &Dependency) -> Result<Coordinate, ModelBuildError> {
    let invalid = |reason: String| ModelBuildError::InvalidModel {
        coordinate: model.coordinate().to_string(),
        reason,
    };
    let range = match dep.version_range() {
        None => return Err(invalid(format!("import of {} has no version", dep.ga()))),
        Some(Err(error)) => {
            return Err(ModelBuildError::Range {
                coordinate: model.coordinate().to_string(),
                error,
            });
        }
        Some(Ok(range)) => range,
    };
    match exact_version(&range) {
        Some(version) => Ok(dep.to_coordinate(version.as_str())),
        None => Err(invalid(format!(
            "import of {} must name a single version, got `{}`",
            dep.ga(),
            range
        ))),
    }
}

fn exact_version(range: &VersionRange) -> Option<Version> {
    if let Some(v) = range.recommended().filter(|_| range.is_soft()) {
        return Some(v.clone());
    }
    match range.restrictions() {
        [r] if r.lower_inclusive && r.upper_inclusive && r.lower.is_some() && r.lower == r.upper => {
            r.lower.clone()
        }
        _ => None,
    }
}

/// Fills version, scope, optional flag, system path and exclusions of
/// declared dependencies from the matching management entry.
pub fn inject_management(model: &mut Model) {
    let mut managed: HashMap<_, Dependency> = HashMap::new();
    for entry in model.dependency_management() {
        managed.entry(entry.key()).or_insert_with(|| entry.clone());
    }
    if managed.is_empty() {
        return;
    }

    for dep in &mut model.base.dependencies {
        let Some(entry) = managed.get(&dep.key()) else {
            continue;
        };
        if dep.version.is_none() {
            dep.version = entry.version.clone();
        }
        if dep.scope.is_none() && entry.scope != Some(Scope::Import) {
            dep.scope = entry.scope;
        }
        if dep.optional.is_none() {
            dep.optional = entry.optional;
        }
        if dep.system_path.is_none() {
            dep.system_path = entry.system_path.clone();
        }
        if dep.exclusions.is_empty() {
            dep.exclusions = entry.exclusions.clone();
        }
    }
}

fn validate(model: &Model) -> Result<(), ModelBuildError> {
    let missing = if model.artifact_id.is_empty() {
        Some("artifactId")
    } else if model.effective_group_id().is_empty() {
        Some("groupId")
    } else if model.effective_version().is_empty() {
        Some("version")
    } else {
        None
    };
    match missing {
        Some(field) => Err(ModelBuildError::InvalidModel {
            coordinate: model.coordinate().to_string(),
            reason: format!("missing {}", field),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use expect_test::expect;
    use mvnutil::model::{Activation, ActivationProperty, Parent};
    use test_log::test;

    use super::*;
    use crate::{error::MetadataErrorKind, reader::MemoryRepository};

    fn parent_ref(g: &str, a: &str, v: &str) -> Option<Parent> {
        Some(Parent {
            group_id: g.into(),
            artifact_id: a.into(),
            version: v.into(),
            relative_path: None,
        })
    }

    fn pom(g: &str, a: &str, v: &str) -> Model {
        let mut m = Model::new(g, a, v);
        m.packaging = Some("pom".into());
        m
    }

    #[test]
    fn test_three_level_inheritance() {
        let mut repo = MemoryRepository::new();
        let mut grand = pom("org.example", "grand", "1");
        grand.base.properties.insert("lib.version".into(), "1.0".into());
        grand.base.dependency_management =
            vec![Dependency::new("org.example", "lib").with_version("${lib.version}")];
        let mut parent = pom("org.example", "parent", "2");
        parent.parent = parent_ref("org.example", "grand", "1");
        parent.base.properties.insert("lib.version".into(), "2.0".into());
        repo.add_model(grand).add_model(parent);

        let mut child = Model {
            artifact_id: "app".into(),
            parent: parent_ref("org.example", "parent", "2"),
            ..Default::default()
        };
        child.base.dependencies = vec![Dependency::new("org.example", "lib")];

        let effective = ModelBuilder::new(&repo)
            .build(&child, &Environment::empty())
            .unwrap();
        expect!["org.example:app:2"].assert_eq(&effective.coordinate().to_string());
        // interpolation happens after merging, so the nearest definition wins
        assert_eq!(effective.dependencies()[0].version.as_deref(), Some("2.0"));
        assert_eq!(repo.read_count(), 2);
    }

    #[test]
    fn test_parent_profiles_activate_in_parent() {
        let mut repo = MemoryRepository::new();
        let mut parent = pom("g", "parent", "1");
        let mut profile = Profile::new("ci");
        profile.activation = Some(Activation {
            property: Some(ActivationProperty {
                name: "ci".into(),
                value: None,
            }),
            ..Default::default()
        });
        profile.base.properties.insert("mode".into(), "ci".into());
        parent.profiles.push(profile);
        parent.base.properties.insert("encoding".into(), "UTF-8".into());
        repo.add_model(parent);

        let mut child = Model::new("g", "child", "1");
        child.parent = parent_ref("g", "parent", "1");

        let builder = ModelBuilder::new(&repo);
        let local = builder.build(&child, &Environment::empty()).unwrap();
        assert_eq!(local.properties().get("mode"), None);
        assert_eq!(local.properties()["encoding"], "UTF-8");
        let ci = builder
            .build(&child, &Environment::empty().with_user_property("ci", "1"))
            .unwrap();
        assert_eq!(ci.properties()["mode"], "ci");
        // profiles are not inherited
        assert!(ci.profiles.is_empty());
    }

    #[test]
    fn test_parent_cycle() {
        let mut repo = MemoryRepository::new();
        let mut a = pom("g", "a", "1");
        a.parent = parent_ref("g", "b", "1");
        let mut b = pom("g", "b", "1");
        b.parent = parent_ref("g", "a", "1");
        repo.add_model(a.clone()).add_model(b);

        let e = ModelBuilder::new(&repo)
            .build(&a, &Environment::empty())
            .unwrap_err();
        expect!["parent cycle: g:a:pom:1 -> g:b:pom:1 -> g:a:pom:1"].assert_eq(&e.to_string());
    }

    #[test]
    fn test_parent_depth_ceiling() {
        let mut repo = MemoryRepository::new();
        for i in 0..5 {
            let mut m = pom("g", &format!("p{}", i), "1");
            m.parent = parent_ref("g", &format!("p{}", i + 1), "1");
            repo.add_model(m);
        }
        let mut child = Model::new("g", "child", "1");
        child.parent = parent_ref("g", "p0", "1");

        let e = ModelBuilder::new(&repo)
            .max_parent_depth(3)
            .build(&child, &Environment::empty())
            .unwrap_err();
        let ModelBuildError::ParentCycle { members } = e else {
            panic!("unexpected {:?}", e);
        };
        assert_eq!(members.len(), 5);
    }

    #[test]
    fn test_missing_parent() {
        let repo = MemoryRepository::new();
        let mut child = Model::new("g", "child", "1");
        child.parent = parent_ref("g", "nowhere", "1");
        let e = ModelBuilder::new(&repo)
            .build(&child, &Environment::empty())
            .unwrap_err();
        assert!(matches!(
            e,
            ModelBuildError::Metadata(ref m) if m.kind == MetadataErrorKind::NotFound
        ));
    }

    #[test]
    fn test_import_and_injection() {
        let mut repo = MemoryRepository::new();
        let mut bom = pom("g", "bom", "1");
        bom.base.dependency_management = vec![
            Dependency::new("g", "x")
                .with_version("1.0")
                .with_scope(Scope::Runtime)
                .exclude("noise", "*"),
            Dependency::new("g", "y").with_version("1.0"),
        ];
        repo.add_model(bom);

        let mut app = Model::new("g", "app", "1");
        app.base.dependency_management = vec![
            Dependency::new("g", "bom")
                .with_version("1")
                .with_type("pom")
                .with_scope(Scope::Import),
            Dependency::new("g", "y").with_version("2.0"),
        ];
        app.base.dependencies = vec![
            Dependency::new("g", "x"),
            Dependency::new("g", "y").with_scope(Scope::Test),
        ];

        let effective = ModelBuilder::new(&repo)
            .build(&app, &Environment::empty())
            .unwrap();
        expect!["g:x:jar:1.0 (runtime), g:y:jar:2.0 (test)"].assert_eq(
            &effective
                .dependencies()
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        );
        assert_eq!(effective.dependencies()[0].exclusions.len(), 1);
        assert!(
            !effective
                .dependency_management()
                .iter()
                .any(|d| d.scope == Some(Scope::Import))
        );
    }

    #[test]
    fn test_import_cycle() {
        let import = |a: &str| {
            Dependency::new("g", a)
                .with_version("1")
                .with_type("pom")
                .with_scope(Scope::Import)
        };
        let mut repo = MemoryRepository::new();
        let mut a = pom("g", "a", "1");
        a.base.dependency_management = vec![import("b")];
        let mut b = pom("g", "b", "1");
        b.base.dependency_management = vec![import("a")];
        repo.add_model(a.clone()).add_model(b);

        let e = ModelBuilder::new(&repo)
            .build(&a, &Environment::empty())
            .unwrap_err();
        expect!["import cycle: g:a:pom:1 -> g:b:pom:1 -> g:a:pom:1"].assert_eq(&e.to_string());
    }

    #[test]
    fn test_import_needs_single_version() {
        let repo = MemoryRepository::new();
        let mut app = Model::new("g", "app", "1");
        app.base.dependency_management = vec![
            Dependency::new("g", "bom")
                .with_version("[1,2)")
                .with_type("pom")
                .with_scope(Scope::Import),
        ];
        let e = ModelBuilder::new(&repo)
            .build(&app, &Environment::empty())
            .unwrap_err();
        assert!(matches!(e, ModelBuildError::InvalidModel { .. }));
    }

    #[test]
    fn test_missing_group_is_invalid() {
        let repo = MemoryRepository::new();
        let model = Model {
            artifact_id: "orphan".into(),
            version: Some("1".into()),
            ..Default::default()
        };
        let e = ModelBuilder::new(&repo)
            .build(&model, &Environment::empty())
            .unwrap_err();
        expect!["invalid model :orphan:1: missing groupId"].assert_eq(&e.to_string());
    }
}

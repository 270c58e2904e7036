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

//! Inheritance and profile injection.
//!
//! Every function here takes its inputs by reference and returns a new
//! value. Keyed collections keep the dominant side's entries first, followed
//! by entries only the recessive side has.

use std::hash::Hash;

use indexmap::IndexMap;
use mvnutil::model::{Build, Model, ModelBase, Profile};

/// Merges two keyed lists. `dominant` entries replace `recessive` entries
/// with the same key, and come first.
pub fn merge_keyed<T, K, F>(dominant: &[T], recessive: &[T], key: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut merged: IndexMap<K, T> = IndexMap::with_capacity(dominant.len() + recessive.len());
    for item in dominant {
        merged.insert(key(item), item.clone());
    }
    for item in recessive {
        merged.entry(key(item)).or_insert_with(|| item.clone());
    }
    merged.into_values().collect()
}

fn merge_properties(
    dominant: &IndexMap<String, String>,
    recessive: &IndexMap<String, String>,
) -> IndexMap<String, String> {
    let mut merged = dominant.clone();
    for (k, v) in recessive {
        merged.entry(k.clone()).or_insert_with(|| v.clone());
    }
    merged
}

fn merge_build(dominant: Option<&Build>, recessive: Option<&Build>) -> Option<Build> {
    match (dominant, recessive) {
        (None, None) => None,
        (Some(b), None) | (None, Some(b)) => Some(b.clone()),
        (Some(d), Some(r)) => Some(Build {
            final_name: d.final_name.clone().or_else(|| r.final_name.clone()),
            directory: d.directory.clone().or_else(|| r.directory.clone()),
            plugins: merge_keyed(&d.plugins, &r.plugins, |p| p.key()),
        }),
    }
}

/// Merges two model fragments, `dominant` winning on every key.
pub fn merge_base(dominant: &ModelBase, recessive: &ModelBase) -> ModelBase {
    ModelBase {
        properties: merge_properties(&dominant.properties, &recessive.properties),
        dependencies: merge_keyed(&dominant.dependencies, &recessive.dependencies, |d| d.key()),
        dependency_management: merge_keyed(
            &dominant.dependency_management,
            &recessive.dependency_management,
            |d| d.key(),
        ),
        repositories: merge_keyed(&dominant.repositories, &recessive.repositories, |r| {
            r.id.clone()
        }),
        build: merge_build(dominant.build.as_ref(), recessive.build.as_ref()),
    }
}

/// Folds active profile fragments in declaration order, later profiles
/// overriding earlier ones.
pub fn fold_profiles(profiles: &[&Profile]) -> ModelBase {
    profiles
        .iter()
        .fold(ModelBase::default(), |acc, profile| merge_base(&profile.base, &acc))
}

/// Produces the model of `child` with its active profiles injected and its
/// parent's effective model inherited.
///
/// The child's own declarations win over profile declarations, and both win
/// over the parent.
pub fn merge(child: &Model, parent: Option<&Model>, active_profiles: &[&Profile]) -> Model {
    let mut merged = child.clone();
    if !active_profiles.is_empty() {
        merged.base = merge_base(&child.base, &fold_profiles(active_profiles));
    }

    let Some(parent) = parent else {
        return merged;
    };

    merged.group_id = merged.group_id.or_else(|| parent.group_id.clone());
    merged.version = merged.version.or_else(|| parent.version.clone());
    merged.description = merged.description.or_else(|| parent.description.clone());
    merged.url = merged.url.or_else(|| {
        parent
            .url
            .as_ref()
            .map(|url| format!("{}/{}", url.trim_end_matches('/'), child.artifact_id))
    });
    merged.base = merge_base(&merged.base, &parent.base);
    merged
}

#[cfg(test)]
mod test {
    use expect_test::expect;
    use mvnutil::{
        dependency::{Dependency, Scope},
        model::{Parent, Plugin, Repository},
    };

    use super::*;

    fn parent_model() -> Model {
        let mut parent = Model::new("org.example", "parent", "3");
        parent.packaging = Some("pom".into());
        parent.name = Some("Parent".into());
        parent.description = Some("shared settings".into());
        parent.url = Some("https://example.org/".into());
        parent
            .base
            .properties
            .extend([("a".to_owned(), "parent".to_owned()), ("b".to_owned(), "parent".to_owned())]);
        parent.base.dependencies = vec![
            Dependency::new("org.example", "common").with_version("1.0"),
            Dependency::new("junit", "junit").with_version("4.12").with_scope(Scope::Test),
        ];
        parent.base.repositories = vec![Repository {
            id: "central".into(),
            url: "https://repo".into(),
            name: None,
            releases: true,
            snapshots: false,
        }];
        parent
    }

    fn child_model() -> Model {
        let mut child = Model {
            artifact_id: "child".into(),
            parent: Some(Parent {
                group_id: "org.example".into(),
                artifact_id: "parent".into(),
                version: "3".into(),
                relative_path: None,
            }),
            ..Default::default()
        };
        child
            .base
            .properties
            .insert("b".to_owned(), "child".to_owned());
        child.base.dependencies = vec![
            Dependency::new("junit", "junit").with_version("4.13").with_scope(Scope::Test),
        ];
        child
    }

    #[test]
    fn test_scalar_inheritance() {
        let merged = merge(&child_model(), Some(&parent_model()), &[]);
        assert_eq!(merged.group_id.as_deref(), Some("org.example"));
        assert_eq!(merged.version.as_deref(), Some("3"));
        assert_eq!(merged.description.as_deref(), Some("shared settings"));
        assert_eq!(merged.url.as_deref(), Some("https://example.org/child"));
        // not inherited
        assert_eq!(merged.name, None);
        assert_eq!(merged.packaging, None);
        assert_eq!(merged.artifact_id, "child");
    }

    #[test]
    fn test_child_entries_win_and_come_first() {
        let merged = merge(&child_model(), Some(&parent_model()), &[]);
        expect!["junit:junit:jar:4.13 (test), org.example:common:jar:1.0"].assert_eq(
            &merged
                .dependencies()
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        );
        expect![[r#"{"b": "child", "a": "parent"}"#]].assert_eq(&format!("{:?}", merged.properties()));
        assert_eq!(merged.base.repositories.len(), 1);
    }

    #[test]
    fn test_profiles_fold_under_child() {
        let mut p1 = Profile::new("p1");
        p1.base.properties.insert("x".into(), "p1".into());
        p1.base.properties.insert("y".into(), "p1".into());
        let mut p2 = Profile::new("p2");
        p2.base.properties.insert("y".into(), "p2".into());
        p2.base.properties.insert("b".into(), "p2".into());

        let merged = merge(&child_model(), Some(&parent_model()), &[&p1, &p2]);
        let props = merged.properties();
        assert_eq!(props["x"], "p1");
        assert_eq!(props["y"], "p2");
        // the child's own value beats the profile's
        assert_eq!(props["b"], "child");
        assert_eq!(props["a"], "parent");
    }

    #[test]
    fn test_build_merges_field_wise() {
        let plugin = |artifact: &str, version: &str| Plugin {
            group_id: "org.apache.maven.plugins".into(),
            artifact_id: artifact.into(),
            version: Some(version.into()),
            configuration: serde_json::Value::Null,
        };
        let mut parent = parent_model();
        parent.base.build = Some(Build {
            final_name: Some("parent-final".into()),
            directory: Some("target".into()),
            plugins: vec![plugin("compiler", "3.1"), plugin("jar", "3.0")],
        });
        let mut child = child_model();
        child.base.build = Some(Build {
            final_name: Some("child-final".into()),
            directory: None,
            plugins: vec![plugin("compiler", "3.11")],
        });

        let build = merge(&child, Some(&parent), &[]).base.build.unwrap();
        assert_eq!(build.final_name.as_deref(), Some("child-final"));
        assert_eq!(build.directory.as_deref(), Some("target"));
        let versions: Vec<_> = build
            .plugins
            .iter()
            .map(|p| format!("{}@{}", p.artifact_id, p.version.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(versions, vec!["compiler@3.11", "jar@3.0"]);
    }

    #[test]
    fn test_inputs_untouched() {
        let child = child_model();
        let parent = parent_model();
        let _ = merge(&child, Some(&parent), &[]);
        assert_eq!(child, child_model());
        assert_eq!(parent, parent_model());
    }
}

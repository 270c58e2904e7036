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

//! Profile activation.
//!
//! A profile is active when any of its conditions holds. Profiles marked
//! `activeByDefault` only apply when nothing else in the same model is
//! active, and the explicit id lists of the environment override both.

use std::path::PathBuf;

use indexmap::IndexSet;
use mvnutil::{
    environment::Environment,
    model::{ActivationCondition, ActivationFile, ActivationOs, ActivationProperty, Profile},
    version::{Version, VersionRange},
};

pub type ProfileId = String;

/// Selects the active profiles, in declaration order.
pub fn active_profiles(profiles: &[Profile], env: &Environment) -> IndexSet<ProfileId> {
    let mut active = IndexSet::new();
    let mut by_default = Vec::new();

    for profile in profiles {
        if env.inactive_profiles.contains(&profile.id) {
            log::debug!("Profile {} is explicitly deactivated", profile.id);
            continue;
        }
        if env.active_profiles.contains(&profile.id) || is_triggered(profile, env) {
            active.insert(profile.id.clone());
        } else if profile.is_active_by_default() {
            by_default.push(profile.id.clone());
        }
    }

    if active.is_empty() {
        active.extend(by_default);
    }
    active
}

/// Whether any declared condition of the profile holds.
pub fn is_triggered(profile: &Profile, env: &Environment) -> bool {
    let Some(activation) = &profile.activation else {
        return false;
    };
    activation
        .conditions()
        .into_iter()
        .any(|condition| condition_matches(condition, env))
}

pub fn condition_matches(condition: ActivationCondition<'_>, env: &Environment) -> bool {
    match condition {
        ActivationCondition::Jdk(spec) => jdk_matches(spec, env),
        ActivationCondition::Os(os) => os_matches(os, env),
        ActivationCondition::Property(p) => property_matches(p, env),
        ActivationCondition::File(file) => file_matches(file, env),
    }
}

fn negated(text: &str) -> (bool, &str) {
    match text.strip_prefix('!') {
        Some(rest) => (true, rest.trim()),
        None => (false, text.trim()),
    }
}

fn jdk_matches(spec: &str, env: &Environment) -> bool {
    let Some(jdk) = &env.jdk_version else {
        return false;
    };
    let (negate, spec) = negated(spec.trim());
    if spec.starts_with('[') || spec.starts_with('(') {
        return match VersionRange::parse(spec) {
            Ok(range) => range.contains(&Version::new(jdk)) != negate,
            Err(e) => {
                log::warn!("Ignoring jdk activation: {}", e);
                false
            }
        };
    }
    jdk.starts_with(spec) != negate
}

fn property_matches(p: &ActivationProperty, env: &Environment) -> bool {
    let (name_negated, name) = negated(&p.name);
    if name.is_empty() {
        return false;
    }
    let actual = env.property(name);
    match &p.value {
        None if name_negated => actual.is_none(),
        None => actual.is_some_and(|v| !v.is_empty()),
        Some(_) if name_negated => {
            log::warn!(
                "Ignoring property activation `{}`: a negated name cannot have a value",
                p.name
            );
            false
        }
        Some(value) => {
            let (value_negated, expected) = negated(value);
            (actual == Some(expected)) != value_negated
        }
    }
}

fn is_family(family: &str, os_name: &str) -> bool {
    let is_windows = os_name.contains("windows");
    let is_mac = os_name.contains("mac") || os_name.contains("darwin");
    match family {
        "windows" => is_windows,
        "dos" => is_windows,
        "mac" => is_mac,
        "os/2" => os_name.contains("os/2"),
        "z/os" => os_name.contains("z/os") || os_name.contains("os/390"),
        "os/400" => os_name.contains("os/400"),
        "openvms" => os_name.contains("openvms"),
        "tandem" => os_name.contains("nonstop_kernel"),
        "netware" => os_name.contains("netware"),
        "unix" => {
            !is_windows
                && !os_name.contains("os/2")
                && !os_name.contains("netware")
                && !os_name.contains("openvms")
                && (!is_mac || os_name.ends_with('x') || os_name == "macos" || os_name == "darwin")
        }
        _ => false,
    }
}

fn os_matches(os: &ActivationOs, env: &Environment) -> bool {
    let name = env.os.name.to_lowercase();
    let arch = env.os.arch.to_lowercase();
    let version = env.os.version.to_lowercase();

    let checks: [(Option<&String>, &dyn Fn(&str) -> bool); 4] = [
        (os.name.as_ref(), &|expected| expected == name),
        (os.family.as_ref(), &|expected| is_family(expected, &name)),
        (os.arch.as_ref(), &|expected| expected == arch),
        (os.version.as_ref(), &|expected| expected == version),
    ];

    let mut any = false;
    for (field, check) in checks {
        let Some(field) = field else { continue };
        any = true;
        let (negate, expected) = negated(field);
        if check(&expected.to_lowercase()) == negate {
            return false;
        }
    }
    any
}

fn resolve_activation_path(raw: &str, env: &Environment) -> Option<PathBuf> {
    let mut text = raw.trim().to_owned();
    if let Some(base) = &env.base_dir {
        let base = base.to_string_lossy();
        text = text
            .replace("${project.basedir}", &base)
            .replace("${basedir}", &base);
    }
    if text.contains("${") {
        return None;
    }
    let path = PathBuf::from(text);
    if path.is_absolute() {
        Some(path)
    } else {
        env.base_dir.as_ref().map(|base| base.join(path))
    }
}

fn file_matches(file: &ActivationFile, env: &Environment) -> bool {
    if let Some(exists) = &file.exists {
        return resolve_activation_path(exists, env).is_some_and(|p| p.exists());
    }
    if let Some(missing) = &file.missing {
        return resolve_activation_path(missing, env).is_some_and(|p| !p.exists());
    }
    false
}

#[cfg(test)]
mod test {
    use mvnutil::{
        environment::OsInfo,
        model::{Activation, ActivationFile},
    };
    use test_log::test;

    use super::*;

    fn profile(id: &str, activation: Activation) -> Profile {
        let mut p = Profile::new(id);
        p.activation = Some(activation);
        p
    }

    fn by_property(id: &str, name: &str, value: Option<&str>) -> Profile {
        profile(
            id,
            Activation {
                property: Some(ActivationProperty {
                    name: name.into(),
                    value: value.map(Into::into),
                }),
                ..Default::default()
            },
        )
    }

    fn by_default(id: &str) -> Profile {
        profile(
            id,
            Activation {
                active_by_default: true,
                ..Default::default()
            },
        )
    }

    fn ids(set: IndexSet<ProfileId>) -> Vec<String> {
        set.into_iter().collect()
    }

    #[test]
    fn test_active_by_default_is_suppressed() {
        let profiles = [by_default("p1"), by_property("p2", "ci", None)];
        let env = Environment::empty().with_user_property("ci", "true");
        assert_eq!(ids(active_profiles(&profiles, &env)), vec!["p2"]);

        let env = Environment::empty();
        assert_eq!(ids(active_profiles(&profiles, &env)), vec!["p1"]);
    }

    #[test]
    fn test_explicit_lists() {
        let profiles = [
            by_default("p1"),
            by_property("p2", "ci", None),
            Profile::new("p3"),
        ];
        let env = Environment::empty()
            .with_user_property("ci", "true")
            .activate("p3")
            .deactivate("p2");
        assert_eq!(ids(active_profiles(&profiles, &env)), vec!["p3"]);

        // deactivating the only trigger lets the default back in
        let env = Environment::empty()
            .with_user_property("ci", "true")
            .deactivate("p2");
        assert_eq!(ids(active_profiles(&profiles, &env)), vec!["p1"]);
    }

    #[test]
    fn test_property_conditions() {
        let env = Environment::empty()
            .with_user_property("mode", "fast")
            .with_system_property("empty", "")
            .with_env_var("CI", "1");
        let check = |name: &str, value: Option<&str>| {
            is_triggered(&by_property("p", name, value), &env)
        };
        assert!(check("mode", None));
        assert!(!check("empty", None));
        assert!(!check("absent", None));
        assert!(check("!absent", None));
        assert!(!check("!mode", None));
        assert!(check("mode", Some("fast")));
        assert!(!check("mode", Some("slow")));
        assert!(check("mode", Some("!slow")));
        assert!(!check("mode", Some("!fast")));
        assert!(check("absent", Some("!fast")));
        assert!(check("env.CI", Some("1")));
    }

    #[test]
    fn test_jdk_conditions() {
        let jdk = |spec: &str| {
            profile(
                "p",
                Activation {
                    jdk: Some(spec.into()),
                    ..Default::default()
                },
            )
        };
        let env = Environment::empty().with_jdk("17.0.2");
        assert!(is_triggered(&jdk("17"), &env));
        assert!(!is_triggered(&jdk("1.8"), &env));
        assert!(is_triggered(&jdk("!1.8"), &env));
        assert!(is_triggered(&jdk("[11,)"), &env));
        assert!(!is_triggered(&jdk("[1.8,11)"), &env));
        assert!(!is_triggered(&jdk("[oops"), &env));
        assert!(!is_triggered(&jdk("![11,)"), &env));
        assert!(is_triggered(&jdk("![1.8,11)"), &env));
        assert!(is_triggered(&jdk("![1.8,)"), &Environment::empty().with_jdk("1.7")));
        assert!(!is_triggered(&jdk("![oops"), &env));
        assert!(!is_triggered(&jdk("17"), &Environment::empty()));
    }

    #[test]
    fn test_os_conditions() {
        let os = |family: Option<&str>, arch: Option<&str>| {
            profile(
                "p",
                Activation {
                    os: Some(ActivationOs {
                        family: family.map(Into::into),
                        arch: arch.map(Into::into),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
        };
        let linux = Environment::empty().with_os(OsInfo {
            name: "Linux".into(),
            arch: "amd64".into(),
            version: "6.1".into(),
        });
        assert!(is_triggered(&os(Some("unix"), None), &linux));
        assert!(!is_triggered(&os(Some("windows"), None), &linux));
        assert!(is_triggered(&os(Some("!windows"), Some("amd64")), &linux));
        assert!(!is_triggered(&os(Some("unix"), Some("aarch64")), &linux));
        assert!(!is_triggered(&os(None, None), &linux));

        let windows = Environment::empty().with_os(OsInfo {
            name: "Windows 11".into(),
            arch: "amd64".into(),
            version: "10.0".into(),
        });
        assert!(is_triggered(&os(Some("windows"), None), &windows));
        assert!(is_triggered(&os(Some("dos"), None), &windows));
        assert!(!is_triggered(&os(Some("unix"), None), &windows));

        let mac = Environment::empty().with_os(OsInfo {
            name: "Mac OS X".into(),
            arch: "aarch64".into(),
            version: "14".into(),
        });
        assert!(is_triggered(&os(Some("mac"), None), &mac));
        assert!(is_triggered(&os(Some("unix"), None), &mac));
    }

    #[test]
    fn test_file_conditions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let file = |exists: Option<&str>, missing: Option<&str>| {
            profile(
                "p",
                Activation {
                    file: Some(ActivationFile {
                        exists: exists.map(Into::into),
                        missing: missing.map(Into::into),
                    }),
                    ..Default::default()
                },
            )
        };
        let env = Environment::empty().with_base_dir(dir.path());
        assert!(is_triggered(&file(Some("marker.txt"), None), &env));
        assert!(is_triggered(&file(Some("${basedir}/marker.txt"), None), &env));
        assert!(is_triggered(&file(Some("${project.basedir}/marker.txt"), None), &env));
        assert!(!is_triggered(&file(Some("other.txt"), None), &env));
        assert!(is_triggered(&file(None, Some("other.txt")), &env));
        assert!(!is_triggered(&file(None, Some("marker.txt")), &env));

        let absolute = dir.path().join("marker.txt");
        let absolute = absolute.to_string_lossy();
        assert!(is_triggered(&file(Some(&absolute), None), &Environment::empty()));
        // relative paths need a base directory
        assert!(!is_triggered(&file(Some("marker.txt"), None), &Environment::empty()));
        assert!(!is_triggered(&file(None, Some("other.txt")), &Environment::empty()));
    }

    #[test]
    fn test_any_condition_suffices() {
        let p = profile(
            "p",
            Activation {
                jdk: Some("1.4".into()),
                property: Some(ActivationProperty {
                    name: "go".into(),
                    value: None,
                }),
                ..Default::default()
            },
        );
        let env = Environment::empty()
            .with_jdk("21")
            .with_user_property("go", "yes");
        assert!(is_triggered(&p, &env));
        assert!(!is_triggered(&p, &Environment::empty().with_jdk("21")));
    }
}

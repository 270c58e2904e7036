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

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OsInfo {
    pub name: String,
    pub arch: String,
    pub version: String,
}

impl OsInfo {
    pub fn current() -> Self {
        OsInfo {
            name: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            version: String::new(),
        }
    }
}

/// Snapshot of everything profile activation and interpolation may look at.
///
/// Two equal snapshots always activate the same profiles, which is what lets
/// effective models be cached per environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    #[serde(default)]
    pub user_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub system_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub jdk_version: Option<String>,
    #[serde(default)]
    pub os: OsInfo,
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Profile ids activated explicitly, e.g. with `-P id`.
    #[serde(default)]
    pub active_profiles: Vec<String>,
    /// Profile ids deactivated explicitly, e.g. with `-P !id`.
    #[serde(default)]
    pub inactive_profiles: Vec<String>,
}

impl Environment {
    /// An environment where nothing activates except `activeByDefault`.
    pub fn empty() -> Self {
        Environment::default()
    }

    /// Captures the running process: environment variables, OS, and the JDK
    /// version from `JAVA_VERSION` when set.
    pub fn current() -> Self {
        let env_vars: BTreeMap<String, String> = std::env::vars().collect();
        let os = OsInfo::current();
        let jdk_version = env_vars.get("JAVA_VERSION").cloned();

        let mut system_properties = BTreeMap::new();
        system_properties.insert("os.name".to_owned(), os.name.clone());
        system_properties.insert("os.arch".to_owned(), os.arch.clone());
        if let Some(jdk) = &jdk_version {
            system_properties.insert("java.version".to_owned(), jdk.clone());
        }

        Environment {
            env_vars,
            jdk_version,
            os,
            system_properties,
            base_dir: std::env::current_dir().ok(),
            ..Default::default()
        }
    }

    /// Looks up a property: user properties first, then system properties,
    /// and `env.X` in the environment variables.
    pub fn property(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.user_properties.get(name) {
            return Some(v);
        }
        if let Some(v) = self.system_properties.get(name) {
            return Some(v);
        }
        name.strip_prefix("env.")
            .and_then(|var| self.env_vars.get(var))
            .map(String::as_str)
    }

    pub fn with_user_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_properties.insert(name.into(), value.into());
        self
    }

    pub fn with_system_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.system_properties.insert(name.into(), value.into());
        self
    }

    pub fn with_env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(name.into(), value.into());
        self
    }

    pub fn with_jdk(mut self, version: impl Into<String>) -> Self {
        self.jdk_version = Some(version.into());
        self
    }

    pub fn with_os(mut self, os: OsInfo) -> Self {
        self.os = os;
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn activate(mut self, profile: impl Into<String>) -> Self {
        self.active_profiles.push(profile.into());
        self
    }

    pub fn deactivate(mut self, profile: impl Into<String>) -> Self {
        self.inactive_profiles.push(profile.into());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_property_lookup_order() {
        let env = Environment::empty()
            .with_system_property("x", "system")
            .with_user_property("x", "user")
            .with_system_property("y", "system")
            .with_env_var("HOME", "/home/me");
        assert_eq!(env.property("x"), Some("user"));
        assert_eq!(env.property("y"), Some("system"));
        assert_eq!(env.property("env.HOME"), Some("/home/me"));
        assert_eq!(env.property("HOME"), None);
        assert_eq!(env.property("z"), None);
    }

    #[test]
    fn test_current_has_os() {
        let env = Environment::current();
        assert_eq!(env.os.name, std::env::consts::OS);
        assert_eq!(env.property("os.arch"), Some(std::env::consts::ARCH));
    }
}

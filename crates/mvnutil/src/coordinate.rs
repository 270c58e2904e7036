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

use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TYPE: &str = "jar";

pub(crate) fn default_type() -> String {
    DEFAULT_TYPE.to_owned()
}

pub(crate) fn is_default_type(t: &str) -> bool {
    t == DEFAULT_TYPE
}

/// A fully qualified artifact: `groupId:artifactId:type:classifier:version`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub classifier: String,
    #[serde(
        rename = "type",
        default = "default_type",
        skip_serializing_if = "is_default_type"
    )]
    pub artifact_type: String,
}

impl Coordinate {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Coordinate {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: String::new(),
            artifact_type: default_type(),
        }
    }

    pub fn with_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = artifact_type.into();
        self
    }

    pub fn with_classifier(mut self, classifier: impl Into<String>) -> Self {
        self.classifier = classifier.into();
        self
    }

    pub fn key(&self) -> VersionlessKey {
        VersionlessKey {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            artifact_type: self.artifact_type.clone(),
            classifier: self.classifier.clone(),
        }
    }

    /// `groupId:artifactId`, the identity used for cycle detection and exclusions.
    pub fn ga(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)?;
        if !self.classifier.is_empty() {
            write!(f, ":{}:{}", self.artifact_type, self.classifier)?;
        } else if !is_default_type(&self.artifact_type) {
            write!(f, ":{}", self.artifact_type)?;
        }
        write!(f, ":{}", self.version)
    }
}

impl std::fmt::Debug for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid coordinate `{0}`, expected groupId:artifactId[:type[:classifier]]:version")]
pub struct CoordinateParseError(pub String);

impl FromStr for Coordinate {
    type Err = CoordinateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CoordinateParseError(s.to_owned()));
        }
        match parts.as_slice() {
            [g, a, v] => Ok(Coordinate::new(*g, *a, *v)),
            [g, a, t, v] => Ok(Coordinate::new(*g, *a, *v).with_type(*t)),
            [g, a, t, c, v] => Ok(Coordinate::new(*g, *a, *v)
                .with_type(*t)
                .with_classifier(*c)),
            _ => Err(CoordinateParseError(s.to_owned())),
        }
    }
}

/// A coordinate without its version. Nodes sharing a key compete in conflict
/// resolution, and dependency management entries are looked up by it.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct VersionlessKey {
    pub group_id: String,
    pub artifact_id: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub classifier: String,
}

impl VersionlessKey {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        VersionlessKey {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            artifact_type: default_type(),
            classifier: String::new(),
        }
    }

    pub fn with_version(&self, version: impl Into<String>) -> Coordinate {
        Coordinate {
            group_id: self.group_id.clone(),
            artifact_id: self.artifact_id.clone(),
            version: version.into(),
            classifier: self.classifier.clone(),
            artifact_type: self.artifact_type.clone(),
        }
    }
}

impl std::fmt::Display for VersionlessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.group_id, self.artifact_id, self.artifact_type
        )?;
        if !self.classifier.is_empty() {
            write!(f, ":{}", self.classifier)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for VersionlessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// A `groupId:artifactId` pattern pruned from a dependency's subtree.
/// Either field may be `*`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct Exclusion {
    pub group_id: String,
    pub artifact_id: String,
}

impl Exclusion {
    pub fn new(group_id: impl Into<String>, artifact_id: impl Into<String>) -> Self {
        Exclusion {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
        }
    }

    pub fn matches(&self, group_id: &str, artifact_id: &str) -> bool {
        (self.group_id == "*" || self.group_id == group_id)
            && (self.artifact_id == "*" || self.artifact_id == artifact_id)
    }
}

impl std::fmt::Display for Exclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.group_id, self.artifact_id)
    }
}

#[cfg(test)]
mod test {
    use expect_test::expect;

    use super::*;

    #[test]
    fn test_coordinate_text_forms() {
        let c: Coordinate = "org.example:core:1.0".parse().unwrap();
        assert_eq!(c.artifact_type, "jar");
        assert!(c.classifier.is_empty());
        expect!["org.example:core:1.0"].assert_eq(&c.to_string());

        let c: Coordinate = "org.example:bom:pom:2.0".parse().unwrap();
        expect!["org.example:bom:pom:2.0"].assert_eq(&c.to_string());

        let c: Coordinate = "org.example:core:jar:tests:1.0".parse().unwrap();
        expect!["org.example:core:jar:tests:1.0"].assert_eq(&c.to_string());
        expect!["org.example:core:jar:tests"].assert_eq(&c.key().to_string());

        assert!("org.example".parse::<Coordinate>().is_err());
        assert!("org.example::1.0".parse::<Coordinate>().is_err());
    }

    #[test]
    fn test_key_ignores_version() {
        let a = Coordinate::new("g", "a", "1.0");
        let b = Coordinate::new("g", "a", "2.0");
        assert_ne!(a, b);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), b.with_classifier("sources").key());
    }

    #[test]
    fn test_exclusion_wildcards() {
        assert!(Exclusion::new("g", "a").matches("g", "a"));
        assert!(!Exclusion::new("g", "a").matches("g", "b"));
        assert!(Exclusion::new("g", "*").matches("g", "b"));
        assert!(Exclusion::new("*", "*").matches("x", "y"));
        assert!(!Exclusion::new("*", "a").matches("x", "y"));
    }

    #[test]
    fn test_coordinate_json() {
        let c = Coordinate::new("g", "a", "1.0");
        expect![[r#"{"groupId":"g","artifactId":"a","version":"1.0"}"#]]
            .assert_eq(&serde_json::to_string(&c).unwrap());
        let parsed: Coordinate =
            serde_json::from_str(r#"{"groupId":"g","artifactId":"a","version":"1.0"}"#).unwrap();
        assert_eq!(parsed, c);
    }
}

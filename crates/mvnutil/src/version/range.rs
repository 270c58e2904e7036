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

//! Version range expressions such as `[1.0,2.0)`, `(,1.0],[1.2,)` or the soft
//! requirement `1.5`.

use std::{cmp::Ordering, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Version;

#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error, Serialize, Deserialize)]
#[error("invalid version range `{spec}`: {reason}")]
pub struct RangeSyntaxError {
    pub spec: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("no version in {available:?} satisfies `{range}`")]
pub struct NoMatchingVersionError {
    pub range: String,
    pub available: Vec<String>,
}

/// One interval of a range. `None` bounds are unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Restriction {
    pub lower: Option<Version>,
    pub lower_inclusive: bool,
    pub upper: Option<Version>,
    pub upper_inclusive: bool,
}

impl Restriction {
    pub fn everything() -> Self {
        Restriction {
            lower: None,
            lower_inclusive: false,
            upper: None,
            upper_inclusive: false,
        }
    }

    pub fn exactly(version: Version) -> Self {
        Restriction {
            lower: Some(version.clone()),
            lower_inclusive: true,
            upper: Some(version),
            upper_inclusive: true,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    pub fn contains(&self, version: &Version) -> bool {
        if let Some(lower) = &self.lower {
            match version.cmp(lower) {
                Ordering::Less => return false,
                Ordering::Equal if !self.lower_inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match version.cmp(upper) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.upper_inclusive => return false,
                _ => {}
            }
        }
        true
    }

    fn intersect(&self, other: &Restriction) -> Option<Restriction> {
        let (lower, lower_inclusive) = match (&self.lower, &other.lower) {
            (None, None) => (None, false),
            (Some(l), None) => (Some(l.clone()), self.lower_inclusive),
            (None, Some(l)) => (Some(l.clone()), other.lower_inclusive),
            (Some(a), Some(b)) => match a.cmp(b) {
                Ordering::Greater => (Some(a.clone()), self.lower_inclusive),
                Ordering::Less => (Some(b.clone()), other.lower_inclusive),
                Ordering::Equal => (
                    Some(a.clone()),
                    self.lower_inclusive && other.lower_inclusive,
                ),
            },
        };
        let (upper, upper_inclusive) = match (&self.upper, &other.upper) {
            (None, None) => (None, false),
            (Some(u), None) => (Some(u.clone()), self.upper_inclusive),
            (None, Some(u)) => (Some(u.clone()), other.upper_inclusive),
            (Some(a), Some(b)) => match a.cmp(b) {
                Ordering::Less => (Some(a.clone()), self.upper_inclusive),
                Ordering::Greater => (Some(b.clone()), other.upper_inclusive),
                Ordering::Equal => (
                    Some(a.clone()),
                    self.upper_inclusive && other.upper_inclusive,
                ),
            },
        };

        if let (Some(l), Some(u)) = (&lower, &upper) {
            match l.cmp(u) {
                Ordering::Greater => return None,
                Ordering::Equal if !(lower_inclusive && upper_inclusive) => return None,
                _ => {}
            }
        }
        Some(Restriction {
            lower,
            lower_inclusive,
            upper,
            upper_inclusive,
        })
    }

    /// Orders restrictions by their lower bound, unbounded first.
    fn cmp_lower(&self, other: &Restriction) -> Ordering {
        match (&self.lower, &other.lower) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a
                .cmp(b)
                .then_with(|| other.lower_inclusive.cmp(&self.lower_inclusive)),
        }
    }
}

impl std::fmt::Display for Restriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(l), Some(u)) = (&self.lower, &self.upper)
            && self.lower_inclusive
            && self.upper_inclusive
            && l == u
        {
            return write!(f, "[{}]", l);
        }
        f.write_str(if self.lower_inclusive { "[" } else { "(" })?;
        if let Some(l) = &self.lower {
            write!(f, "{}", l)?;
        }
        f.write_str(",")?;
        if let Some(u) = &self.upper {
            write!(f, "{}", u)?;
        }
        f.write_str(if self.upper_inclusive { "]" } else { ")" })
    }
}

/// A parsed version requirement.
///
/// A plain version such as `1.5` is *soft*: it recommends a version but accepts
/// any. Everything else is *hard* and only accepts versions inside one of its
/// restrictions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    recommended: Option<Version>,
    restrictions: Vec<Restriction>,
}

impl VersionRange {
    pub fn parse(spec: &str) -> Result<Self, RangeSyntaxError> {
        let err = |reason: &str| RangeSyntaxError {
            spec: spec.to_owned(),
            reason: reason.to_owned(),
        };

        let mut process = spec.trim();
        if process.is_empty() {
            return Err(err("empty version range"));
        }

        let mut restrictions: Vec<Restriction> = Vec::new();
        while process.starts_with('[') || process.starts_with('(') {
            let close = match (process.find(')'), process.find(']')) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => return Err(err("unbounded range")),
            };
            let restriction = parse_restriction(spec, &process[..=close])?;
            if let Some(prev) = restrictions.last() {
                let overlaps = match (&prev.upper, &restriction.lower) {
                    (Some(upper), Some(lower)) => lower < upper,
                    _ => true,
                };
                if overlaps {
                    return Err(err("ranges overlap"));
                }
            }
            restrictions.push(restriction);

            process = process[close + 1..].trim();
            if let Some(rest) = process.strip_prefix(',') {
                process = rest.trim();
            }
        }

        if !process.is_empty() {
            if !restrictions.is_empty() {
                return Err(err(
                    "only fully-qualified sets allowed in multiple set scenario",
                ));
            }
            check_token(spec, process)?;
            return Ok(VersionRange::soft(Version::new(process)));
        }

        Ok(VersionRange {
            recommended: None,
            restrictions,
        })
    }

    /// A soft requirement on `version`.
    pub fn soft(version: Version) -> Self {
        VersionRange {
            recommended: Some(version),
            restrictions: vec![Restriction::everything()],
        }
    }

    /// The hard requirement `[version]`.
    pub fn exact(version: Version) -> Self {
        VersionRange {
            recommended: None,
            restrictions: vec![Restriction::exactly(version)],
        }
    }

    pub fn recommended(&self) -> Option<&Version> {
        self.recommended.as_ref()
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn is_soft(&self) -> bool {
        self.recommended.is_some()
            && self.restrictions.len() == 1
            && self.restrictions[0].is_unbounded()
    }

    pub fn is_hard(&self) -> bool {
        !self.is_soft()
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.restrictions.iter().any(|r| r.contains(version))
    }

    /// Intersects two ranges. Returns `None` when no version can satisfy both.
    pub fn intersect(&self, other: &VersionRange) -> Option<VersionRange> {
        let mut restrictions = Vec::new();
        for a in &self.restrictions {
            for b in &other.restrictions {
                if let Some(r) = a.intersect(b) {
                    restrictions.push(r);
                }
            }
        }
        if restrictions.is_empty() {
            return None;
        }
        restrictions.sort_by(|a, b| a.cmp_lower(b));

        let contained =
            |v: &&Version| restrictions.iter().any(|r| r.contains(v));
        let recommended = self
            .recommended
            .as_ref()
            .filter(contained)
            .or_else(|| other.recommended.as_ref().filter(contained))
            .cloned();

        Some(VersionRange {
            recommended,
            restrictions,
        })
    }

    /// Picks the highest candidate inside the range.
    pub fn select_highest<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a Version>,
    ) -> Result<Version, NoMatchingVersionError> {
        let mut seen = Vec::new();
        let mut best: Option<&Version> = None;
        for candidate in candidates {
            seen.push(candidate.to_string());
            if self.contains(candidate) && best.is_none_or(|b| candidate > b) {
                best = Some(candidate);
            }
        }
        best.cloned().ok_or_else(|| NoMatchingVersionError {
            range: self.to_string(),
            available: seen,
        })
    }
}

fn check_token(spec: &str, token: &str) -> Result<(), RangeSyntaxError> {
    let valid = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'));
    if valid {
        Ok(())
    } else {
        Err(RangeSyntaxError {
            spec: spec.to_owned(),
            reason: format!("invalid version `{}`", token),
        })
    }
}

fn parse_restriction(spec: &str, text: &str) -> Result<Restriction, RangeSyntaxError> {
    let err = |reason: &str| RangeSyntaxError {
        spec: spec.to_owned(),
        reason: reason.to_owned(),
    };

    let lower_inclusive = text.starts_with('[');
    let upper_inclusive = text.ends_with(']');
    let inner = text[1..text.len() - 1].trim();

    match inner.split_once(',') {
        None => {
            if !lower_inclusive || !upper_inclusive {
                return Err(err("single version must be surrounded by []"));
            }
            check_token(spec, inner)?;
            Ok(Restriction::exactly(Version::new(inner)))
        }
        Some((lo, hi)) => {
            let (lo, hi) = (lo.trim(), hi.trim());
            if hi.contains(',') {
                return Err(err("more than one comma in a restriction"));
            }
            let bound = |token: &str| -> Result<Option<Version>, RangeSyntaxError> {
                if token.is_empty() {
                    Ok(None)
                } else {
                    check_token(spec, token)?;
                    Ok(Some(Version::new(token)))
                }
            };
            let lower = bound(lo)?;
            let upper = bound(hi)?;
            if let (Some(l), Some(u)) = (&lower, &upper) {
                match u.cmp(l) {
                    Ordering::Less => return Err(err("range defies version ordering")),
                    Ordering::Equal if !(lower_inclusive && upper_inclusive) => {
                        return Err(err("range cannot have identical boundaries"));
                    }
                    _ => {}
                }
            }
            Ok(Restriction {
                lower,
                lower_inclusive,
                upper,
                upper_inclusive,
            })
        }
    }
}

impl std::fmt::Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_soft()
            && let Some(v) = &self.recommended
        {
            return write!(f, "{}", v);
        }
        for (i, r) in self.restrictions.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}

impl FromStr for VersionRange {
    type Err = RangeSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionRange::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        VersionRange::parse(&text).map_err(serde::de::Error::custom)
    }
}

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

//! Artifact versions ordered the way Maven orders them.
//!
//! A version string is split into a tree of items. `.` separates items in the
//! same list, while `-` and every transition between digits and letters open
//! a nested list. Trailing "null" items (`0`, the release qualifier, empty
//! lists) are dropped, so `1`, `1.0` and `1.0.0` are the same version.

pub mod range;

use std::{cmp::Ordering, convert::Infallible, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use range::{NoMatchingVersionError, RangeSyntaxError, Restriction, VersionRange};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Item {
    /// Decimal digits without leading zeros. Zero is `"0"`.
    Number(String),
    /// A lower-cased qualifier with aliases already applied.
    Qualifier(String),
    List(Vec<Item>),
}

impl Item {
    fn is_null(&self) -> bool {
        match self {
            Item::Number(n) => n == "0",
            Item::Qualifier(q) => q.is_empty(),
            Item::List(items) => items.is_empty(),
        }
    }

    /// Compares this item against the item at the same position in another
    /// version, `None` meaning the other version has no item there.
    fn compare(&self, other: Option<&Item>) -> Ordering {
        match (self, other) {
            (Item::Number(n), None) => {
                if n == "0" {
                    Ordering::Equal
                } else {
                    Ordering::Greater
                }
            }
            (Item::Number(a), Some(Item::Number(b))) => compare_numbers(a, b),
            // 1.1 > 1-sp, 1.1 > 1-1
            (Item::Number(_), Some(_)) => Ordering::Greater,

            // 1-rc < 1, 1-sp > 1
            (Item::Qualifier(q), None) => compare_qualifiers(q, ""),
            (Item::Qualifier(_), Some(Item::Number(_))) => Ordering::Less,
            (Item::Qualifier(a), Some(Item::Qualifier(b))) => compare_qualifiers(a, b),
            (Item::Qualifier(_), Some(Item::List(_))) => Ordering::Less,

            (Item::List(items), None) => items
                .iter()
                .map(|it| it.compare(None))
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal),
            (Item::List(_), Some(Item::Number(_))) => Ordering::Less,
            (Item::List(_), Some(Item::Qualifier(_))) => Ordering::Greater,
            (Item::List(a), Some(Item::List(b))) => compare_lists(a, b),
        }
    }
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    // Both sides are stripped of leading zeros, so a longer string is a larger number.
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_lists(left: &[Item], right: &[Item]) -> Ordering {
    let len = left.len().max(right.len());
    for i in 0..len {
        let ord = match (left.get(i), right.get(i)) {
            (Some(l), r) => l.compare(r),
            (None, Some(r)) => r.compare(None).reverse(),
            (None, None) => Ordering::Equal,
        };
        if ord.is_ne() {
            return ord;
        }
    }
    Ordering::Equal
}

/// Rank of a qualifier. Unknown qualifiers sit between `rc` and `snapshot`
/// and are ordered lexically among themselves.
fn qualifier_rank(qualifier: &str) -> u8 {
    match qualifier {
        "alpha" => 0,
        "beta" => 1,
        "milestone" => 2,
        "rc" => 3,
        "snapshot" => 5,
        "" => 6,
        "sp" => 7,
        _ => 4,
    }
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    qualifier_rank(a)
        .cmp(&qualifier_rank(b))
        .then_with(|| a.cmp(b))
}

fn qualifier_item(text: &str, followed_by_digit: bool) -> Item {
    let expanded = if followed_by_digit && text.len() == 1 {
        // a1 = alpha-1, b1 = beta-1, m1 = milestone-1
        match text {
            "a" => "alpha",
            "b" => "beta",
            "m" => "milestone",
            other => other,
        }
    } else {
        text
    };
    let canonical = match expanded {
        "cr" => "rc",
        "final" | "ga" | "release" => "",
        other => other,
    };
    Item::Qualifier(canonical.to_owned())
}

fn parse_item(is_digit: bool, text: &str) -> Item {
    if is_digit {
        let stripped = text.trim_start_matches('0');
        if stripped.is_empty() {
            Item::Number("0".to_owned())
        } else {
            Item::Number(stripped.to_owned())
        }
    } else {
        qualifier_item(text, false)
    }
}

fn normalize(items: &mut Vec<Item>) {
    let mut i = items.len();
    while i > 0 {
        i -= 1;
        if items[i].is_null() {
            items.remove(i);
        } else if !matches!(items[i], Item::List(_)) {
            break;
        }
    }
}

fn parse_items(text: &str) -> Vec<Item> {
    let lower = text.to_lowercase();
    let chars: Vec<char> = lower.chars().collect();
    let slice = |from: usize, to: usize| chars[from..to].iter().collect::<String>();

    // Each new list is the last element of the list below it on the stack, so
    // the tree can be rebuilt by folding the stack from the top.
    let mut stack: Vec<Vec<Item>> = vec![Vec::new()];
    let mut is_digit = false;
    let mut start = 0;

    for (i, &c) in chars.iter().enumerate() {
        if c == '.' || c == '-' {
            let item = if i == start {
                Item::Number("0".to_owned())
            } else {
                parse_item(is_digit, &slice(start, i))
            };
            push(&mut stack, item);
            start = i + 1;

            if c != '.' || !is_digit {
                stack.push(Vec::new());
            }
        } else if c.is_ascii_digit() {
            if !is_digit && i > start {
                // 1.0.RC1 < 1.0-RC2: treat .RC as -RC
                if stack.last().is_some_and(|l| !l.is_empty()) {
                    stack.push(Vec::new());
                }
                push(&mut stack, qualifier_item(&slice(start, i), true));
                start = i;
                stack.push(Vec::new());
            }
            is_digit = true;
        } else {
            if is_digit && i > start {
                push(&mut stack, parse_item(true, &slice(start, i)));
                start = i;
                stack.push(Vec::new());
            }
            is_digit = false;
        }
    }

    if chars.len() > start {
        if !is_digit && stack.last().is_some_and(|l| !l.is_empty()) {
            stack.push(Vec::new());
        }
        push(&mut stack, parse_item(is_digit, &slice(start, chars.len())));
    }

    let mut current = stack.pop().unwrap_or_default();
    normalize(&mut current);
    while let Some(mut parent) = stack.pop() {
        parent.push(Item::List(current));
        normalize(&mut parent);
        current = parent;
    }
    current
}

fn push(stack: &mut [Vec<Item>], item: Item) {
    if let Some(list) = stack.last_mut() {
        list.push(item);
    }
}

fn write_canonical(items: &[Item], out: &mut String) {
    for item in items {
        if !out.is_empty() {
            out.push(if matches!(item, Item::List(_)) { '-' } else { '.' });
        }
        match item {
            Item::Number(n) => out.push_str(n),
            Item::Qualifier(q) => out.push_str(q),
            Item::List(inner) => {
                let mut buf = String::new();
                write_canonical(inner, &mut buf);
                out.push_str(&buf);
            }
        }
    }
}

/// A version of an artifact, compared with Maven's rules.
///
/// Equality and ordering use the parsed form, while [`Display`](std::fmt::Display)
/// prints the text the version was created from.
#[derive(Clone)]
pub struct Version {
    text: String,
    items: Vec<Item>,
}

impl Version {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let items = parse_items(&text);
        Version { text, items }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The normalized form, e.g. `1-snapshot` for `1.0-SNAPSHOT`.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        write_canonical(&self.items, &mut out);
        out
    }

    pub fn is_snapshot(&self) -> bool {
        self.text.to_ascii_uppercase().ends_with("SNAPSHOT")
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.items.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_lists(&self.items, &other.items)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl std::fmt::Debug for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for Version {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Version::new(s))
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Version::new(value)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let text = String::deserialize(d)?;
        Ok(Version::new(text))
    }
}

#[cfg(test)]
mod test {
    use expect_test::expect;

    use super::*;

    fn v(s: &str) -> Version {
        Version::new(s)
    }

    fn assert_ascending(versions: &[&str]) {
        for pair in versions.windows(2) {
            let (low, high) = (v(pair[0]), v(pair[1]));
            assert!(low < high, "expected {} < {}", pair[0], pair[1]);
            assert!(high > low, "expected {} > {}", pair[1], pair[0]);
        }
    }

    #[test]
    fn test_release_ordering() {
        assert_ascending(&[
            "0.9", "1.0-alpha-1", "1.0-beta-1", "1.0-rc-1", "1.0-SNAPSHOT", "1.0", "1.0-sp-1",
            "1.0.1", "1.1", "1.10", "2.0",
        ]);
    }

    #[test]
    fn test_qualifier_ordering() {
        assert_ascending(&[
            "1-alpha2snapshot",
            "1-alpha2",
            "1-alpha-123",
            "1-beta-2",
            "1-beta123",
            "1-m2",
            "1-m11",
            "1-rc",
            "1-cr2",
            "1-rc123",
            "1-abc",
            "1-def",
            "1-SNAPSHOT",
            "1",
            "1-sp",
            "1-sp2",
            "1-sp123",
            "1-1-snapshot",
            "1-1",
            "1-2",
            "1-123",
        ]);
    }

    #[test]
    fn test_snapshot_is_just_below_release() {
        assert!(v("1.5-SNAPSHOT") < v("1.5"));
        assert!(v("1.5-SNAPSHOT") > v("1.5-rc-9"));
        assert!(v("1.5-SNAPSHOT") > v("1.5-custom"));
        assert!(v("1.5-SNAPSHOT") > v("1.4.99"));
    }

    #[test]
    fn test_equal_versions() {
        for (a, b) in [
            ("1", "1.0"),
            ("1", "1.0.0"),
            ("1.0", "1.0-ga"),
            ("1", "1-final"),
            ("1.0.0", "1.0.0-RELEASE"),
            ("1-cr1", "1-rc1"),
            ("1a1", "1-alpha-1"),
            ("1.0-SNAPSHOT", "1-snapshot"),
            ("1.0.01", "1.0.1"),
        ] {
            assert_eq!(v(a), v(b), "{} should equal {}", a, b);
            assert_eq!(v(a).cmp(&v(b)), Ordering::Equal);
        }
    }

    #[test]
    fn test_large_numbers() {
        assert!(v("1.123456789012345678901234567890") > v("1.99999999999"));
        assert!(v("20240101") > v("9.9.9"));
    }

    #[test]
    fn test_canonical() {
        expect!["1-snapshot"].assert_eq(&v("1.0-SNAPSHOT").canonical());
        expect!["2-alpha-1"].assert_eq(&v("2.0-alpha-1").canonical());
        expect!["1.0.1"].assert_eq(&v("1.0.1").canonical());
    }

    #[test]
    fn test_display_keeps_original_text() {
        let version = v("1.0-SNAPSHOT");
        assert_eq!(version.to_string(), "1.0-SNAPSHOT");
        assert!(version.is_snapshot());
        assert!(!v("1.0").is_snapshot());
    }
}

use core::fmt;
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::{FromStr, Split};
use std::sync::Arc;

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ocfl::error::{OcflError, Result};

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^v\d+$"#).unwrap());

/// Represents an OCFL version number, eg `v3` or `v0003`.
///
/// A zero-padded number carries its rendered width. Padded numbers must fit
/// the padding: a width `w >= 2` admits numbers strictly less than
/// `10^(w - 1)`.
#[derive(Deserialize, Serialize, Debug, Copy, Clone)]
#[serde(try_from = "&str")]
#[serde(into = "String")]
pub struct VersionNum {
    pub number: u32,
    pub width: u32,
}

/// Represents either a specific version number or whatever the current head version is
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VersionRef {
    Number(VersionNum),
    Head,
}

#[derive(Deserialize, Serialize, Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
#[serde(try_from = "String")]
struct PathInner(String);

/// The logical path of a file within a version's state
#[derive(Deserialize, Serialize, Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
#[serde(transparent)]
pub struct LogicalPath {
    inner: PathInner,
}

/// The path of a content file, relative the object root. The first segment
/// is always a version directory.
#[derive(Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
pub struct ContentPath {
    inner: PathInner,
    /// The version directory the content path resides in
    pub version: VersionNum,
}

/// OCFL user serialization object
#[derive(Deserialize, Serialize, Debug, Eq, PartialEq, Clone)]
pub struct User {
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Optional meta that may be associated with a commit
#[derive(Debug, Eq, PartialEq, Clone, Default)]
pub struct CommitMeta {
    pub(crate) user_name: Option<String>,
    pub(crate) user_address: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) created: Option<DateTime<Local>>,
}

/// Represents a change to a logical path between two versions
#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Diff {
    Added(Arc<LogicalPath>),
    Modified(Arc<LogicalPath>),
    Deleted(Arc<LogicalPath>),
    Renamed {
        original: Vec<Arc<LogicalPath>>,
        renamed: Vec<Arc<LogicalPath>>,
    },
}

impl VersionNum {
    /// Creates a new unpadded VersionNum
    pub fn new(number: u32) -> Self {
        Self { number, width: 0 }
    }

    /// Creates a new VersionNum with the specified padding width
    pub fn with_width(number: u32, width: u32) -> Self {
        Self { number, width }
    }

    pub fn v1() -> Self {
        Self::new(1)
    }

    /// The highest number the padding width can represent. Unpadded numbers
    /// have no practical limit.
    pub fn max_for_width(&self) -> u32 {
        if self.width == 0 {
            u32::MAX
        } else {
            match 10u64.checked_pow(self.width - 1) {
                Some(limit) if limit <= u64::from(u32::MAX) => (limit - 1) as u32,
                _ => u32::MAX,
            }
        }
    }

    /// Returns the previous version, or an Error if the previous version is invalid (less than 1).
    pub fn previous(&self) -> Result<VersionNum> {
        if self.number - 1 < 1 {
            return Err(OcflError::IllegalState(
                "Versions cannot be less than 1".to_string(),
            ));
        }

        Ok(Self {
            number: self.number - 1,
            width: self.width,
        })
    }

    /// Returns the next version, or an Error if the next version would overflow
    /// the padding width.
    pub fn next(&self) -> Result<VersionNum> {
        let max = self.max_for_width();

        if self.number + 1 > max {
            return Err(OcflError::IllegalState(format!(
                "Version cannot be greater than {}",
                max
            )));
        }

        Ok(Self {
            number: self.number + 1,
            width: self.width,
        })
    }
}

impl TryFrom<&str> for VersionNum {
    type Error = OcflError;

    /// Parses a string in the format of `v1` or `v0002` into a `VersionNum`. An error is returned
    /// if the version string is invalid.
    fn try_from(version: &str) -> Result<Self, Self::Error> {
        if !VERSION_REGEX.is_match(version) {
            return Err(OcflError::IllegalArgument(format!(
                "Invalid version {}",
                version
            )));
        }

        match version[1..].parse::<u32>() {
            Ok(num) => {
                if num < 1 {
                    return Err(OcflError::IllegalArgument(format!(
                        "Invalid version {}",
                        version
                    )));
                }

                let width = match version.starts_with("v0") {
                    true => (version.len() - 1) as u32,
                    false => 0,
                };

                let parsed = Self { number: num, width };

                if num > parsed.max_for_width() {
                    return Err(OcflError::IllegalArgument(format!(
                        "Invalid version {}",
                        version
                    )));
                }

                Ok(parsed)
            }
            Err(_) => Err(OcflError::IllegalArgument(format!(
                "Invalid version {}",
                version
            ))),
        }
    }
}

impl TryFrom<u32> for VersionNum {
    type Error = OcflError;

    fn try_from(version: u32) -> Result<Self, Self::Error> {
        if version < 1 {
            return Err(OcflError::IllegalArgument(format!(
                "Invalid version number {}",
                version
            )));
        }

        Ok(Self {
            number: version,
            width: 0,
        })
    }
}

impl FromStr for VersionNum {
    type Err = OcflError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionNum::try_from(s)
    }
}

impl fmt::Display for VersionNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{:0width$}", self.number, width = self.width as usize)
    }
}

impl From<VersionNum> for String {
    fn from(version_num: VersionNum) -> Self {
        format!("{}", version_num)
    }
}

impl PartialEq for VersionNum {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl Eq for VersionNum {}

impl Hash for VersionNum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number.hash(state)
    }
}

impl PartialOrd for VersionNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number.cmp(&other.number)
    }
}

impl VersionRef {
    pub fn resolve(&self, head_num: VersionNum) -> VersionNum {
        match self {
            VersionRef::Number(num) => *num,
            VersionRef::Head => head_num,
        }
    }
}

impl From<VersionNum> for VersionRef {
    fn from(num: VersionNum) -> Self {
        Self::Number(num)
    }
}

impl From<Option<VersionNum>> for VersionRef {
    fn from(num: Option<VersionNum>) -> Self {
        num.map_or(VersionRef::Head, VersionRef::Number)
    }
}

impl From<u32> for VersionRef {
    /// `0` refers to the head version
    fn from(num: u32) -> Self {
        match num {
            0 => VersionRef::Head,
            n => VersionRef::Number(VersionNum::new(n)),
        }
    }
}

fn validate_path(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(OcflError::IllegalArgument(
            "Paths may not be empty".to_string(),
        ));
    }

    if value.starts_with('/') || value.ends_with('/') {
        return Err(OcflError::IllegalArgument(format!(
            "Paths may not begin or end with '/'. Found: {}",
            value
        )));
    }

    if value.contains('\\') {
        return Err(OcflError::IllegalArgument(format!(
            "Paths may not contain '\\'. Found: {}",
            value
        )));
    }

    let has_illegal_part = value
        .split('/')
        .any(|part| part == "." || part == ".." || part.is_empty());

    if has_illegal_part {
        return Err(OcflError::IllegalArgument(format!(
            "Paths may not contain '.', '..', or '' parts. Found: {}",
            value
        )));
    }

    Ok(())
}

impl PathInner {
    fn parts(&self) -> Split<char> {
        self.0.split('/')
    }

    fn filename(&self) -> &str {
        match self.0.rfind('/') {
            Some(last_slash) => &self.0.as_str()[last_slash + 1..],
            None => self.0.as_str(),
        }
    }
}

impl LogicalPath {
    /// Returns an iterable containing each segment of the path split on the `/` separator
    pub fn parts(&self) -> Split<char> {
        self.inner.parts()
    }

    /// Returns the part of the path that's after the final `/`, or the entire path if
    /// there is no `/`
    pub fn filename(&self) -> &str {
        self.inner.filename()
    }

    pub fn as_str(&self) -> &str {
        self.inner.0.as_str()
    }
}

impl ContentPath {
    /// Constructs the direct content path for a logical path within a version
    pub fn build(
        version: VersionNum,
        content_dir: &str,
        logical_path: &str,
    ) -> Result<ContentPath> {
        format!("{}/{}/{}", version, content_dir, logical_path).try_into()
    }

    /// Returns an iterable containing each segment of the path split on the `/` separator
    pub fn parts(&self) -> Split<char> {
        self.inner.parts()
    }

    /// Returns the part of the path that's after the final `/`
    pub fn filename(&self) -> &str {
        self.inner.filename()
    }

    pub fn as_str(&self) -> &str {
        self.inner.0.as_str()
    }
}

impl TryFrom<&str> for PathInner {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_path(value)?;
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for PathInner {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_path(&value)?;
        Ok(Self(value))
    }
}

impl TryFrom<&str> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(Self {
            inner: PathInner::try_from(value)?,
        })
    }
}

impl TryFrom<String> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self {
            inner: PathInner::try_from(value)?,
        })
    }
}

impl TryFrom<&String> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl TryFrom<&str> for ContentPath {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let inner = PathInner::try_from(value)?;

        let version = match value.find('/') {
            Some(index) => VersionNum::try_from(&value[0..index])?,
            None => {
                return Err(OcflError::IllegalArgument(format!(
                    "Content paths must begin with a version directory. Found: {}",
                    value
                )));
            }
        };

        Ok(Self { inner, version })
    }
}

impl TryFrom<String> for ContentPath {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl TryFrom<&String> for ContentPath {
    type Error = OcflError;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<LogicalPath> for String {
    fn from(path: LogicalPath) -> Self {
        path.inner.0
    }
}

impl From<ContentPath> for String {
    fn from(path: ContentPath) -> Self {
        path.inner.0
    }
}

impl AsRef<str> for LogicalPath {
    fn as_ref(&self) -> &str {
        &self.inner.0
    }
}

impl AsRef<str> for ContentPath {
    fn as_ref(&self) -> &str {
        &self.inner.0
    }
}

impl Display for LogicalPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.0)
    }
}

impl Display for ContentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.0)
    }
}

impl Serialize for ContentPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentPath {
    fn deserialize<D>(deserializer: D) -> Result<ContentPath, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(ContentPathVisitor)
    }
}

struct ContentPathVisitor;

impl<'de> Visitor<'de> for ContentPathVisitor {
    type Value = ContentPath;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a path string that is a valid OCFL content path")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.try_into()
            .map_err(|e: OcflError| E::custom(e.to_string()))
    }
}

impl User {
    pub fn new(name: String, address: Option<String>) -> Self {
        Self {
            name: Some(name),
            address,
        }
    }
}

impl CommitMeta {
    /// Creates commit meta with all values empty
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the commit user. `name` must be provided if `address` is provided.
    pub fn with_user(mut self, name: Option<String>, address: Option<String>) -> Result<Self> {
        if address.is_some() && name.is_none() {
            return Err(OcflError::IllegalArgument(
                "User name must be set when user address is set.".to_string(),
            ));
        }
        self.user_name = name;
        self.user_address = address;
        Ok(self)
    }

    /// Sets the commit message
    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    /// Sets the commit created timestamp. Defaults to now.
    pub fn with_created(mut self, created: Option<DateTime<Local>>) -> Self {
        self.created = created;
        self
    }
}

impl Diff {
    /// Returns the path associated with the diff. If there are multiple paths,
    /// it is the first path on the left hand side.
    pub fn path(&self) -> &Arc<LogicalPath> {
        match self {
            Diff::Added(path) => path,
            Diff::Modified(path) => path,
            Diff::Deleted(path) => path,
            Diff::Renamed { original, .. } => original
                .first()
                .expect("At least one renamed path should have existed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::{TryFrom, TryInto};

    use super::{ContentPath, LogicalPath, VersionNum};

    #[test]
    fn version_num_round_trips() {
        for (s, number, width) in [
            ("v1", 1, 0),
            ("v3", 3, 0),
            ("v100", 100, 0),
            ("v0003", 3, 4),
            ("v099", 99, 3),
        ] {
            let parsed = VersionNum::try_from(s).unwrap();
            assert_eq!(number, parsed.number);
            assert_eq!(width, parsed.width);
            assert_eq!(s, parsed.to_string());
        }
    }

    #[test]
    fn reject_invalid_version_nums() {
        for s in ["v0", "1", "v-1", "v1.1", "version1", "v"] {
            assert!(VersionNum::try_from(s).is_err(), "{} should be invalid", s);
        }
    }

    #[test]
    fn version_num_random_round_trips() {
        use rand::Rng;

        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let number = rng.gen_range(1..=u32::MAX / 2);
            let num = VersionNum::new(number);
            let parsed = VersionNum::try_from(num.to_string().as_str()).unwrap();
            assert_eq!(number, parsed.number);
            assert_eq!(0, parsed.width);

            let width = rng.gen_range(2..=8u32);
            let number = rng.gen_range(1..10u32.pow(width - 1));
            let num = VersionNum::with_width(number, width);
            let parsed = VersionNum::try_from(num.to_string().as_str()).unwrap();
            assert_eq!(number, parsed.number);
            assert_eq!(width, parsed.width);
        }
    }

    #[test]
    fn padded_version_cannot_overflow_width() {
        let num = VersionNum::try_from("v0099").unwrap();
        assert_eq!(999, num.max_for_width());

        let at_max = VersionNum::with_width(999, 4);
        assert!(at_max.next().is_err());

        let unpadded = VersionNum::new(999);
        assert_eq!(1000, unpadded.next().unwrap().number);
    }

    #[test]
    fn create_logical_path_when_valid() {
        let value = "foo/.bar/baz.txt";
        let path: LogicalPath = value.try_into().unwrap();
        assert_eq!(value, path.as_str());
    }

    #[test]
    fn reject_malformed_paths() {
        for value in [
            "",
            "/foo/bar",
            "foo/bar/",
            "foo//bar",
            "foo/./bar",
            "foo/../bar",
            "..",
            "foo\\bar",
        ] {
            assert!(
                LogicalPath::try_from(value).is_err(),
                "{} should be invalid",
                value
            );
        }
    }

    #[test]
    fn content_paths_carry_their_version() {
        let path = ContentPath::try_from("v3/content/foo/bar.txt").unwrap();
        assert_eq!(3, path.version.number);
        assert_eq!("bar.txt", path.filename());

        assert!(ContentPath::try_from("content/foo.txt").is_err());
        assert!(ContentPath::try_from("foo.txt").is_err());
    }
}

//! core::types
//!
//! Validated identifiers shared by the store, the engine and the CLI.
//!
//! - [`Oid`] - object id in lowercase hex (SHA-1 or SHA-256 length)
//! - [`RefName`] - a name `git check-ref-format` would accept
//! - [`Signature`] - identity plus timestamp (author, committer, tagger)
//! - [`ObjectKind`] - the four kinds of Git object
//!
//! ```
//! use reweave::core::types::{Oid, RefName};
//!
//! let main = RefName::new("refs/heads/main").unwrap();
//! assert_eq!(main.backup_name("refs/original/").unwrap().as_str(), "refs/original/heads/main");
//! assert!(RefName::new("refs/heads/a..b").is_err());
//! assert!(Oid::new("HEAD").is_err());
//! ```

use chrono::{DateTime, FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("invalid ref name: {0}")]
    InvalidRefName(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Object id, stored as lowercase hex.
///
/// Both backends hand out ids in this form, so equality of two `Oid`s is
/// equality of the objects they name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Parse a full-length hex id. Uppercase input is folded to lowercase.
    pub fn new(hex: impl Into<String>) -> Result<Self, TypeError> {
        let hex = hex.into().to_ascii_lowercase();
        match hex.len() {
            40 | 64 if hex.bytes().all(|b| b.is_ascii_hexdigit()) => Ok(Self(hex)),
            40 | 64 => Err(TypeError::InvalidOid(format!("'{hex}' is not hexadecimal"))),
            n => Err(TypeError::InvalidOid(format!(
                "'{hex}' has {n} characters, need 40 or 64"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Substrings no reference name may contain.
const FORBIDDEN_SEQUENCES: &[&str] = &[
    "..", "@{", "//", " ", "~", "^", ":", "\\", "?", "*", "[",
];

/// A reference name such as `refs/heads/main`, `refs/tags/v1` or `HEAD`.
///
/// ```
/// use reweave::core::types::RefName;
///
/// let tag = RefName::for_tag("v1.0").unwrap();
/// assert_eq!(tag.as_str(), "refs/tags/v1.0");
/// assert_eq!(tag.tag_name(), Some("v1.0"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RefName(String);

impl RefName {
    /// Prefix shared by every tag reference.
    pub const TAG_PREFIX: &'static str = "refs/tags/";

    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        match violation(&name) {
            Some(reason) => Err(TypeError::InvalidRefName(format!("'{name}': {reason}"))),
            None => Ok(Self(name)),
        }
    }

    /// `refs/tags/<name>`.
    pub fn for_tag(name: &str) -> Result<Self, TypeError> {
        Self::new(format!("{}{}", Self::TAG_PREFIX, name))
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with(Self::TAG_PREFIX)
    }

    /// The short tag name, if this is a tag ref.
    pub fn tag_name(&self) -> Option<&str> {
        self.0.strip_prefix(Self::TAG_PREFIX)
    }

    /// The name this ref is backed up under.
    ///
    /// `refs/` is swapped for `namespace`, which must end with `/`. Names
    /// outside `refs/` (`HEAD`) are appended whole.
    pub fn backup_name(&self, namespace: &str) -> Result<Self, TypeError> {
        let suffix = self.0.strip_prefix("refs/").unwrap_or(&self.0);
        Self::new(format!("{namespace}{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Why `name` is not a valid reference name, if it isn't.
fn violation(name: &str) -> Option<String> {
    if name.is_empty() {
        return Some("empty".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Some("leading or trailing '/'".into());
    }
    if let Some(seq) = FORBIDDEN_SEQUENCES.iter().find(|seq| name.contains(**seq)) {
        return Some(format!("contains '{seq}'"));
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Some("contains a control character".into());
    }
    name.split('/').find_map(|component| {
        if component.starts_with('.') {
            Some(format!("component '{component}' starts with '.'"))
        } else if component.ends_with(".lock") {
            Some(format!("component '{component}' ends with '.lock'"))
        } else {
            None
        }
    })
}

impl TryFrom<String> for RefName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RefName> for String {
    fn from(name: RefName) -> Self {
        name.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An identity and the moment it acted (author, committer or tagger).
///
/// The timestamp keeps its original UTC offset so that copying a signature
/// onto a rewritten object reproduces it byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// Time of the action, with its original offset
    pub when: DateTime<FixedOffset>,
}

impl Signature {
    /// Create a signature at the given instant.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        when: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }

    /// Create a signature from raw Git time fields (seconds since epoch, offset in minutes).
    pub fn from_raw(
        name: impl Into<String>,
        email: impl Into<String>,
        seconds: i64,
        offset_minutes: i32,
    ) -> Result<Self, TypeError> {
        let offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            TypeError::InvalidSignature(format!("offset out of range: {offset_minutes}"))
        })?;
        let when = offset
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| TypeError::InvalidSignature(format!("timestamp out of range: {seconds}")))?;
        Ok(Self::new(name, email, when))
    }

    /// Parse an identity of the form `Name <email>`, stamped with `when`.
    ///
    /// # Example
    ///
    /// ```
    /// use reweave::core::types::Signature;
    ///
    /// let when = chrono::Utc::now().fixed_offset();
    /// let sig = Signature::parse_identity("Jane Doe <jane@example.com>", when).unwrap();
    /// assert_eq!(sig.name, "Jane Doe");
    /// assert_eq!(sig.email, "jane@example.com");
    /// ```
    pub fn parse_identity(identity: &str, when: DateTime<FixedOffset>) -> Result<Self, TypeError> {
        let identity = identity.trim();
        let (name, rest) = identity.split_once('<').ok_or_else(|| {
            TypeError::InvalidSignature(format!("expected 'Name <email>', got '{identity}'"))
        })?;
        let email = rest.strip_suffix('>').ok_or_else(|| {
            TypeError::InvalidSignature(format!("missing closing '>' in '{identity}'"))
        })?;
        let name = name.trim();
        if name.is_empty() || email.contains(['<', '>']) {
            return Err(TypeError::InvalidSignature(format!(
                "expected 'Name <email>', got '{identity}'"
            )));
        }
        Ok(Self::new(name, email.trim(), when))
    }

    /// Seconds since the Unix epoch.
    pub fn seconds(&self) -> i64 {
        self.when.timestamp()
    }

    /// UTC offset in minutes.
    pub fn offset_minutes(&self) -> i32 {
        self.when.offset().local_minus_utc() / 60
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// The kind of a Git object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectKind {
    /// The name Git uses for this kind in object headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Commit => "commit",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Tag => "tag",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod oid {
        use super::*;

        const SHA1: &str = "0123456789abcdef0123456789abcdef01234567";

        #[test]
        fn accepts_both_hash_lengths() {
            assert_eq!(Oid::new(SHA1).unwrap().as_str(), SHA1);
            assert!(Oid::new("f".repeat(64)).is_ok());
        }

        #[test]
        fn folds_uppercase() {
            let oid = Oid::new(SHA1.to_uppercase()).unwrap();
            assert_eq!(oid, Oid::new(SHA1).unwrap());
        }

        #[test]
        fn rejects_abbreviations_and_garbage() {
            assert!(matches!(Oid::new("0123abc"), Err(TypeError::InvalidOid(_))));
            assert!(Oid::new(format!("{SHA1}0")).is_err());
            assert!(Oid::new("z".repeat(40)).is_err());
        }

        #[test]
        fn deserialization_validates() {
            let parsed: Oid = serde_json::from_str(&format!("\"{SHA1}\"")).unwrap();
            assert_eq!(parsed.to_string(), SHA1);
            assert!(serde_json::from_str::<Oid>("\"HEAD\"").is_err());
        }
    }

    mod ref_name {
        use super::*;

        #[test]
        fn accepts_ordinary_names() {
            for name in ["refs/heads/main", "refs/tags/v1.0", "refs/remotes/origin/HEAD", "HEAD"] {
                assert!(RefName::new(name).is_ok(), "{name}");
            }
        }

        #[test]
        fn rejects_what_git_rejects() {
            for name in [
                "",
                "/refs/heads/main",
                "refs/heads/",
                "refs/heads/main.lock",
                "refs/heads/a..b",
                "refs/heads/a@{b",
                "refs//heads",
                "refs/heads/has space",
                "refs/heads/.hidden",
                "refs/heads/tab\there",
            ] {
                assert!(RefName::new(name).is_err(), "{name:?}");
            }
        }

        #[test]
        fn error_names_the_offender() {
            let err = RefName::new("refs/heads/x:y").unwrap_err();
            assert_eq!(
                err.to_string(),
                "invalid ref name: 'refs/heads/x:y': contains ':'"
            );
        }

        #[test]
        fn tag_helpers() {
            let tag = RefName::for_tag("v1").unwrap();
            assert!(tag.is_tag());
            assert_eq!(tag.tag_name(), Some("v1"));

            let branch = RefName::new("refs/heads/main").unwrap();
            assert!(!branch.is_tag());
            assert_eq!(branch.tag_name(), None);
        }

        #[test]
        fn backup_name_replaces_refs_prefix() {
            let name = RefName::new("refs/heads/feature/x").unwrap();
            assert_eq!(
                name.backup_name("refs/original/").unwrap().as_str(),
                "refs/original/heads/feature/x"
            );
        }

        #[test]
        fn backup_name_keeps_non_refs_name_whole() {
            let name = RefName::new("HEAD").unwrap();
            assert_eq!(
                name.backup_name("refs/original/").unwrap().as_str(),
                "refs/original/HEAD"
            );
        }
    }

    mod signature {
        use super::*;

        #[test]
        fn from_raw_keeps_offset() {
            let sig = Signature::from_raw("A", "a@example.com", 1_700_000_000, 120).unwrap();
            assert_eq!(sig.seconds(), 1_700_000_000);
            assert_eq!(sig.offset_minutes(), 120);
        }

        #[test]
        fn negative_offset() {
            let sig = Signature::from_raw("A", "a@example.com", 0, -300).unwrap();
            assert_eq!(sig.offset_minutes(), -300);
        }

        #[test]
        fn parse_identity_rejects_malformed() {
            let when = Signature::from_raw("x", "x", 0, 0).unwrap().when;
            assert!(Signature::parse_identity("no email", when).is_err());
            assert!(Signature::parse_identity("Name <open", when).is_err());
            assert!(Signature::parse_identity("<a@b>", when).is_err());
        }

        #[test]
        fn display() {
            let sig = Signature::from_raw("Jane", "jane@example.com", 0, 0).unwrap();
            assert_eq!(sig.to_string(), "Jane <jane@example.com>");
        }
    }
}

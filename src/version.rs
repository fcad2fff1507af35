//! Product release identifiers.
//!
//! Versions look like `MAJOR.MINOR.RELEASE[SUFFIX][-BUILD[BUILDSUFFIX]]`, e.g. `4.0.1` or
//! `4.0.1rc2-3405b`. An empty suffix marks a final release, which sorts above any pre-release
//! suffix such as `rc1`.
//!
//! Any numeric component may be [`Component::Any`], which matches everything when testing
//! equality. This lets callers write "any build of 4.0.1" as `Version::new(4, 0, 1)`.
use std::{cmp::Ordering, fmt, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed version string {input:?}: {reason}")]
pub struct ParseVersionError {
    input: String,
    reason: &'static str,
}

impl ParseVersionError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_owned(),
            reason,
        }
    }
}

/// A single numeric part of a [`Version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Matches any value when comparing for equality. Versions holding it in `major`, `minor`
    /// or `release` have no ordering, so `<=`/`>=` are false even where `==` holds.
    Any,
    Num(u32),
}

impl Component {
    /// Wildcard-aware equality.
    #[must_use]
    pub const fn matches(self, other: Self) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Num(a), Self::Num(b)) => a == b,
        }
    }

    #[must_use]
    pub const fn is_any(self) -> bool {
        matches!(self, Self::Any)
    }

    const fn num(self) -> Option<u32> {
        match self {
            Self::Any => None,
            Self::Num(n) => Some(n),
        }
    }
}

impl From<u32> for Component {
    fn from(value: u32) -> Self {
        Self::Num(value)
    }
}

#[derive(Debug, Clone, SerializeDisplay, DeserializeFromStr)]
pub struct Version {
    pub major: Component,
    pub minor: Component,
    pub release: Component,
    pub build: Component,
    pub suffix: String,
    pub build_suffix: String,
}

impl Version {
    /// A final release with no particular build.
    #[must_use]
    pub const fn new(major: u32, minor: u32, release: u32) -> Self {
        Self::wildcard(
            Component::Num(major),
            Component::Num(minor),
            Component::Num(release),
        )
    }

    /// Build a version where any of the release components may be [`Component::Any`].
    #[must_use]
    pub const fn wildcard(major: Component, minor: Component, release: Component) -> Self {
        Self {
            major,
            minor,
            release,
            build: Component::Any,
            suffix: String::new(),
            build_suffix: String::new(),
        }
    }

    #[must_use]
    pub fn with_build(mut self, build: u32) -> Self {
        self.build = Component::Num(build);
        self
    }

    #[must_use]
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        suffix.clone_into(&mut self.suffix);
        self
    }

    #[must_use]
    pub fn with_build_suffix(mut self, build_suffix: &str) -> Self {
        build_suffix.clone_into(&mut self.build_suffix);
        self
    }

    /// Whether `major`, `minor` and `release` are all concrete, i.e. the version can be ordered.
    #[must_use]
    pub const fn is_concrete(&self) -> bool {
        !(self.major.is_any() || self.minor.is_any() || self.release.is_any())
    }

    fn release_tuple(&self) -> Option<(u32, u32, u32)> {
        Some((self.major.num()?, self.minor.num()?, self.release.num()?))
    }

    /// Compare two versions by their release line, ignoring the build.
    ///
    /// # Panics
    /// If either side has a wildcard in `major`, `minor` or `release`. Ordering against a
    /// wildcard has no meaning; check [`Self::is_concrete`] first.
    #[must_use]
    pub fn release_cmp(&self, other: &Self) -> Ordering {
        let (Some(lhs), Some(rhs)) = (self.release_tuple(), other.release_tuple()) else {
            panic!("cannot order wildcard versions {self} and {other}");
        };
        lhs.cmp(&rhs)
            .then_with(|| cmp_suffix(&self.suffix, &other.suffix))
    }
}

/// An empty suffix is a final release and beats any pre-release tag.
fn cmp_suffix(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        _ if a == b => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.cmp(b),
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.major.matches(other.major)
            && self.minor.matches(other.minor)
            && self.release.matches(other.release)
            && self.build.matches(other.build)
            && self.suffix == other.suffix
    }
}

/// Not consistent with [`PartialEq`] across wildcards: a wildcard version can be `==` to a
/// concrete one, yet `partial_cmp` is `None`, so `<=` and `>=` are both false. Use `==` to
/// match against wildcards and only order concrete versions.
impl PartialOrd for Version {
    /// `None` when either side is not concrete, or when the release lines tie but the builds
    /// differ: builds are never ordered.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !(self.is_concrete() && other.is_concrete()) {
            return None;
        }
        match self.release_cmp(other) {
            Ordering::Equal => (self == other).then_some(Ordering::Equal),
            ord => Some(ord),
        }
    }
}

/// Split `s` into its leading ASCII digit run and the rest.
fn split_digits(s: &str) -> (&str, &str) {
    s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()))
}

fn parse_num(input: &str, digits: &str, what: &'static str) -> Result<u32, ParseVersionError> {
    if digits.is_empty() {
        return Err(ParseVersionError::new(input, what));
    }
    digits
        .parse()
        .map_err(|_| ParseVersionError::new(input, "number out of range"))
}

impl FromStr for Version {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (release_part, build_part) = match s.split_once('-') {
            Some((_, b)) if b.contains(['-', '.']) => {
                return Err(ParseVersionError::new(s, "separator inside build number"))
            }
            Some((r, b)) => (r, Some(b)),
            None => (s, None),
        };

        let mut dots = release_part.split('.');
        let (Some(major), Some(minor), Some(relsuf), None) =
            (dots.next(), dots.next(), dots.next(), dots.next())
        else {
            return Err(ParseVersionError::new(
                s,
                "expected MAJOR.MINOR.RELEASE",
            ));
        };

        if !major.bytes().all(|b| b.is_ascii_digit()) || !minor.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(ParseVersionError::new(s, "major and minor must be numeric"));
        }
        let major = parse_num(s, major, "missing major number")?;
        let minor = parse_num(s, minor, "missing minor number")?;
        let (release, suffix) = split_digits(relsuf);
        let release = parse_num(s, release, "missing release number")?;

        let mut version = Self::new(major, minor, release).with_suffix(suffix);
        if let Some(build_part) = build_part {
            let (build, build_suffix) = split_digits(build_part);
            version = version
                .with_build(parse_num(s, build, "missing build number")?)
                .with_build_suffix(build_suffix);
        }
        Ok(version)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Num(n) => write!(f, "{n}"),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            major,
            minor,
            release,
            build,
            suffix,
            build_suffix,
        } = self;
        write!(f, "{major}.{minor}.{release}{suffix}")?;
        if !build.is_any() {
            write!(f, "-{build}{build_suffix}")?;
        }
        Ok(())
    }
}

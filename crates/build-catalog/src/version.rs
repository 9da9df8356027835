use std::cmp::Ordering;
use std::fmt;

/// A parsed game release version such as `1.21`, `1.21.6` or `1.21-rc1`.
///
/// Missing components count as zero, so `1.21` and `1.21.0` are equal.
/// Snapshot identifiers (`24w14a`) and free-form names do not parse.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameVersion(semver::Version);

impl GameVersion {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (release, pre) = match s.split_once('-') {
            Some((release, pre)) => (release, Some(pre)),
            None => (s, None),
        };

        let mut parts = [0u64; 3];
        for (i, piece) in release.split('.').enumerate() {
            if i >= parts.len() || piece.is_empty() || !piece.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            parts[i] = piece.parse().ok()?;
        }

        let mut version = semver::Version::new(parts[0], parts[1], parts[2]);
        if let Some(pre) = pre {
            version.pre = semver::Prerelease::new(pre).ok()?;
        }
        Some(Self(version))
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether `version` clears `minimum`. With no minimum everything passes;
/// with one, versions that do not parse are rejected.
pub fn meets_minimum(version: &str, minimum: Option<&GameVersion>) -> bool {
    match minimum {
        None => true,
        Some(min) => GameVersion::parse(version).is_some_and(|v| &v >= min),
    }
}

/// Newest-first ordering for version strings. Parseable versions come
/// before unparseable ones; the latter fall back to reverse lexical order.
pub fn newest_first(a: &str, b: &str) -> Ordering {
    match (GameVersion::parse(a), GameVersion::parse(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.cmp(a),
    }
}

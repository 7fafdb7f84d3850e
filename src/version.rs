use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

pub const DEFAULT_GAME_VERSION: &str = "2.0";

/// A `major.minor` platform version as declared by `info.json`'s
/// `factorio_version`. Parsing is lenient: anything unreadable becomes 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GameVersion {
    pub major: u32,
    pub minor: u32,
}

impl GameVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.trim().split('.').map(|part| part.trim().parse::<u32>().ok());
        let major = parts.next().flatten().unwrap_or(0);
        let minor = parts.next().flatten().unwrap_or(0);
        Self { major, minor }
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Whether a release declaring `required` runs on a `target` server.
///
/// Stable servers need the same major and at least the required minor.
/// Experimental builds accept anything declaring the target major or newer.
pub fn is_compatible(required: &str, target: &str, target_is_prerelease: bool) -> bool {
    let required = GameVersion::parse(required);
    let target = GameVersion::parse(target);
    if target_is_prerelease {
        return required.major >= target.major;
    }
    required.major == target.major && target.minor >= required.minor
}

/// The platform the managed server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPlatform {
    #[serde(with = "game_version_string")]
    pub version: GameVersion,
    #[serde(default)]
    pub experimental: bool,
}

impl Default for TargetPlatform {
    fn default() -> Self {
        Self {
            version: GameVersion::parse(DEFAULT_GAME_VERSION),
            experimental: false,
        }
    }
}

impl TargetPlatform {
    pub fn stable(version: &str) -> Self {
        Self {
            version: GameVersion::parse(version),
            experimental: false,
        }
    }

    pub fn experimental(version: &str) -> Self {
        Self {
            version: GameVersion::parse(version),
            experimental: true,
        }
    }

    /// Reads the server's `FACTORIO_VERSION` variable. Unset and `latest`
    /// mean the current stable line.
    pub fn from_server_variable(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Self::default();
        };
        if raw.eq_ignore_ascii_case("latest") || raw.eq_ignore_ascii_case("stable") {
            return Self::default();
        }
        if raw.to_ascii_lowercase().contains("experimental") {
            let version = extract_major_minor(raw).unwrap_or_else(|| DEFAULT_GAME_VERSION.to_string());
            return Self::experimental(&version);
        }
        match extract_major_minor(raw) {
            Some(version) => Self::stable(&version),
            None => Self::default(),
        }
    }

    /// Missing declarations are accepted; older portal releases omit them.
    pub fn accepts(&self, required: Option<&str>) -> bool {
        match required {
            Some(required) => is_compatible(required, &self.version.to_string(), self.experimental),
            None => true,
        }
    }

    pub fn label(&self) -> String {
        if self.experimental {
            format!("{} (experimental)", self.version)
        } else {
            self.version.to_string()
        }
    }
}

fn extract_major_minor(raw: &str) -> Option<String> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    let tail = &raw[start..];
    let mut parts = tail.split('.');
    let major: String = parts.next()?.chars().take_while(char::is_ascii_digit).collect();
    let minor: String = parts
        .next()?
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    if major.is_empty() || minor.is_empty() {
        return None;
    }
    Some(format!("{major}.{minor}"))
}

mod game_version_string {
    use super::GameVersion;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(version: &GameVersion, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(version)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<GameVersion, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(GameVersion::parse(&raw))
    }
}

/// A mod release version (`1.2.3` or `1.2.3.4`), compared numerically.
#[derive(Debug, Clone, Eq)]
pub struct ModVersion {
    parts: Vec<u64>,
}

impl ModVersion {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().trim_start_matches('v');
        if raw.is_empty() {
            return None;
        }
        let parts = raw
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Self { parts })
    }

    fn component(&self, index: usize) -> u64 {
        self.parts.get(index).copied().unwrap_or(0)
    }
}

impl Ord for ModVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|index| self.component(index).cmp(&other.component(index)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for ModVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ModVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for ModVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .parts
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&joined)
    }
}

pub fn is_newer_version(candidate: &str, installed: &str) -> bool {
    match (ModVersion::parse(candidate), ModVersion::parse(installed)) {
        (Some(candidate), Some(installed)) => candidate > installed,
        _ => false,
    }
}

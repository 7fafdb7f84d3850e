use crate::mod_list::BASE_MOD;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    Required,
    Optional,
    Incompatible,
    HiddenOptional,
}

impl DependencyKind {
    fn from_sigil(sigil: char) -> Option<Self> {
        match sigil {
            '?' => Some(DependencyKind::Optional),
            '!' => Some(DependencyKind::Incompatible),
            '~' => Some(DependencyKind::HiddenOptional),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DependencyKind::Required => "required",
            DependencyKind::Optional => "optional",
            DependencyKind::Incompatible => "incompatible",
            DependencyKind::HiddenOptional => "hidden-optional",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    pub name: String,
    pub kind: DependencyKind,
    pub version_constraint: Option<String>,
}

impl DependencySpec {
    pub fn is_required(&self) -> bool {
        self.kind == DependencyKind::Required
    }
}

/// Parses one `info.json` dependency string: `[?|!|~] name [op version]`.
///
/// Returns `None` for blank input and for the implicit `base` dependency.
pub fn parse(raw: &str) -> Option<DependencySpec> {
    let mut rest = raw.trim();
    let mut kind = DependencyKind::Required;
    if let Some(sigil) = rest.chars().next() {
        if let Some(parsed) = DependencyKind::from_sigil(sigil) {
            kind = parsed;
            rest = rest[sigil.len_utf8()..].trim_start();
        }
    }
    // "(?)" is the portal's older spelling of hidden-optional.
    if let Some(stripped) = rest.strip_prefix("(?)") {
        kind = DependencyKind::HiddenOptional;
        rest = stripped.trim_start();
    }

    let split = rest
        .find(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '='))
        .unwrap_or(rest.len());
    let (name, constraint) = rest.split_at(split);
    if name.is_empty() || name == BASE_MOD {
        return None;
    }

    let constraint = constraint.trim();
    Some(DependencySpec {
        name: name.to_string(),
        kind,
        version_constraint: (!constraint.is_empty()).then(|| constraint.to_string()),
    })
}

pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Vec<DependencySpec> {
    raw.iter().filter_map(|entry| parse(entry.as_ref())).collect()
}

/// Only the dependencies that must be installed alongside the mod.
pub fn required<S: AsRef<str>>(raw: &[S]) -> Vec<DependencySpec> {
    parse_all(raw)
        .into_iter()
        .filter(DependencySpec::is_required)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_optional_with_constraint() {
        let spec = parse("? optional-mod >= 1.0.0").expect("parsed");
        assert_eq!(spec.name, "optional-mod");
        assert_eq!(spec.kind, DependencyKind::Optional);
        assert_eq!(spec.version_constraint.as_deref(), Some(">= 1.0.0"));
    }

    #[test]
    fn parses_incompatible_and_hidden() {
        let spec = parse("! bad-mod").expect("parsed");
        assert_eq!(spec.kind, DependencyKind::Incompatible);
        assert_eq!(spec.name, "bad-mod");

        let spec = parse("~ quiet-mod").expect("parsed");
        assert_eq!(spec.kind, DependencyKind::HiddenOptional);

        let spec = parse("(?) legacy-mod").expect("parsed");
        assert_eq!(spec.kind, DependencyKind::HiddenOptional);
        assert_eq!(spec.name, "legacy-mod");
    }

    #[test]
    fn bare_name_is_required_without_constraint() {
        let spec = parse("required-mod").expect("parsed");
        assert_eq!(spec.kind, DependencyKind::Required);
        assert_eq!(spec.version_constraint, None);
    }

    #[test]
    fn operator_without_spaces() {
        let spec = parse("flib>=0.12.0").expect("parsed");
        assert_eq!(spec.name, "flib");
        assert_eq!(spec.version_constraint.as_deref(), Some(">=0.12.0"));
    }

    #[test]
    fn base_is_never_surfaced() {
        assert_eq!(parse("base"), None);
        assert_eq!(parse("base >= 2.0"), None);
        assert_eq!(parse("? base"), None);
        let parsed = parse_all(&["base >= 2.0", "flib", "? space-age", ""]);
        let names: Vec<&str> = parsed.iter().map(|spec| spec.name.as_str()).collect();
        assert_eq!(names, vec!["flib", "space-age"]);
    }

    #[test]
    fn required_filters_other_kinds() {
        let deps = required(&["base", "a", "? b", "! c", "~ d", "e >= 1.0"]);
        let names: Vec<&str> = deps.iter().map(|spec| spec.name.as_str()).collect();
        assert_eq!(names, vec!["a", "e"]);
    }
}

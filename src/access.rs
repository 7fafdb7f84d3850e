use serde::{Deserialize, Serialize};

pub const MOD_INSTALLER_FEATURE: &str = "factorio_mod_installer";

/// What the hosting panel knows about a game server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    #[serde(default)]
    pub egg_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl ServerProfile {
    pub fn factorio() -> Self {
        Self {
            egg_name: "Factorio".to_string(),
            tags: Vec::new(),
            features: vec![MOD_INSTALLER_FEATURE.to_string()],
        }
    }

    pub fn can_manage_mods(&self) -> bool {
        let mentions_factorio = |value: &str| value.to_lowercase().contains("factorio");
        mentions_factorio(&self.egg_name)
            || self.tags.iter().any(|tag| mentions_factorio(tag))
            || self
                .features
                .iter()
                .any(|feature| feature == MOD_INSTALLER_FEATURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn egg_tag_or_feature_grants_access() {
        let by_egg = ServerProfile {
            egg_name: "Factorio Headless".to_string(),
            ..ServerProfile::default()
        };
        let by_tag = ServerProfile {
            egg_name: "Generic".to_string(),
            tags: vec!["games".to_string(), "factorio".to_string()],
            ..ServerProfile::default()
        };
        let by_feature = ServerProfile {
            egg_name: "Custom".to_string(),
            features: vec![MOD_INSTALLER_FEATURE.to_string()],
            ..ServerProfile::default()
        };
        assert!(by_egg.can_manage_mods());
        assert!(by_tag.can_manage_mods());
        assert!(by_feature.can_manage_mods());
        assert!(ServerProfile::factorio().can_manage_mods());
    }

    #[test]
    fn unrelated_server_is_refused() {
        let profile = ServerProfile {
            egg_name: "Minecraft".to_string(),
            tags: vec!["java".to_string()],
            features: vec!["eula".to_string()],
        };
        assert!(!profile.can_manage_mods());
    }
}

//! Panel settings, layered with figment.
//!
//! Precedence, lowest to highest:
//!
//! 1. Programmatic defaults ([`Settings::default`])
//! 2. A YAML file, when one is given
//! 3. `DEBUG_PANEL_*` environment variables, nested with `__`
//!    (e.g. `DEBUG_PANEL_CACHE__TIMEOUT_SECS=60`)

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "DEBUG_PANEL_";

/// Settings consumed by the visibility check and the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Client addresses allowed to see debug output.
    pub internal_ips: Vec<IpAddr>,
    /// Master switch; nothing is shown while this is off.
    pub debug: bool,
    /// Mount point shared by the toolbar's routes and the panel's data route.
    pub url_prefix: String,
    pub cache: CacheSettings,
}

/// Sizing for the built-in memory cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub timeout_secs: u64,
    pub max_entries: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            internal_ips: vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(Ipv6Addr::LOCALHOST),
            ],
            debug: false,
            url_prefix: "/__debug__".to_owned(),
            cache: CacheSettings::default(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_entries: 300,
        }
    }
}

impl CacheSettings {
    /// Returns `timeout_secs` as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Defaults overridden by the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(Self::figment())
    }

    /// Defaults, then `path`, then the environment.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Settings = figment.extract().map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects settings the panel cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.url_prefix.starts_with('/') || self.prefix().is_empty() {
            return Err(ConfigError::InvalidUrlPrefix(self.url_prefix.clone()));
        }
        if self.url_prefix.contains(['*', ':', '?']) {
            return Err(ConfigError::InvalidUrlPrefix(self.url_prefix.clone()));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidMaxEntries);
        }
        Ok(())
    }

    /// `url_prefix` without its trailing slash.
    pub fn prefix(&self) -> &str {
        self.url_prefix.trim_end_matches('/')
    }

    /// Returns `true` when `ip` is on the allow-list.
    pub fn is_internal_ip(&self, ip: IpAddr) -> bool {
        self.internal_ips.contains(&ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_allow_loopback_but_debug_is_off() {
        let settings = Settings::default();
        assert!(!settings.debug);
        assert!(settings.is_internal_ip("127.0.0.1".parse().unwrap()));
        assert!(settings.is_internal_ip("::1".parse().unwrap()));
        assert!(!settings.is_internal_ip("10.1.2.3".parse().unwrap()));
        assert_eq!(settings.prefix(), "/__debug__");
        assert_eq!(settings.cache.timeout(), Duration::from_secs(300));
    }

    #[test]
    fn env_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("DEBUG_PANEL_DEBUG", "true");
            jail.set_env("DEBUG_PANEL_INTERNAL_IPS", r#"["10.0.0.7", "127.0.0.1"]"#);
            jail.set_env("DEBUG_PANEL_CACHE__MAX_ENTRIES", "12");

            let settings = Settings::load().map_err(|e| e.to_string())?;
            assert!(settings.debug);
            assert_eq!(settings.cache.max_entries, 12);
            assert_eq!(settings.cache.timeout_secs, 300);
            assert!(settings.is_internal_ip("10.0.0.7".parse().unwrap()));
            Ok(())
        });
    }

    #[test]
    fn yaml_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "panel.yaml",
                r#"
debug: true
url_prefix: /_panel/
internal_ips: ["192.168.0.10"]
cache:
  timeout_secs: 30
"#,
            )?;
            jail.set_env("DEBUG_PANEL_CACHE__TIMEOUT_SECS", "45");

            let settings = Settings::load_from_file("panel.yaml").map_err(|e| e.to_string())?;
            assert!(settings.debug);
            assert_eq!(settings.prefix(), "/_panel");
            assert_eq!(settings.cache.timeout_secs, 45);
            assert_eq!(settings.internal_ips, vec!["192.168.0.10".parse::<IpAddr>().unwrap()]);
            Ok(())
        });
    }

    #[test]
    fn bad_ip_is_a_config_error() {
        Jail::expect_with(|jail| {
            jail.set_env("DEBUG_PANEL_INTERNAL_IPS", r#"["not-an-ip"]"#);
            assert!(matches!(Settings::load(), Err(ConfigError::Figment(_))));
            Ok(())
        });
    }

    #[test]
    fn validation() {
        let mut settings = Settings {
            url_prefix: "__debug__".into(),
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidUrlPrefix(_))
        ));

        settings.url_prefix = "/".into();
        assert!(settings.validate().is_err());

        settings.url_prefix = "/dbg".into();
        settings.cache.max_entries = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidMaxEntries)
        ));
    }
}

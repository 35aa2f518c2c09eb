//! Настройки контейнера
//!
//! Источники в порядке приоритета: environment variables (`IOC_*`), файл
//! конфигурации (TOML, JSON, YAML), preset.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ContainerError, Result};
use crate::lifestyle::Lifestyle;

pub const DEFAULT_ENV_PREFIX: &str = "IOC";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    /// Разрешить повторную регистрацию того же service type
    pub allow_overriding_registrations: bool,
    /// Lifestyle для registrations, где он не указан явно
    pub default_lifestyle: Lifestyle,
    /// Логировать каждую registration на уровне info
    pub verbose_logging: bool,
    /// Закрывать open generic registrations под запрошенные closed types
    pub resolve_open_generics: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self::production()
    }
}

impl ContainerOptions {
    /// Production: строгая регистрация без лишнего шума
    pub fn production() -> Self {
        Self {
            allow_overriding_registrations: false,
            default_lifestyle: Lifestyle::Transient,
            verbose_logging: false,
            resolve_open_generics: true,
        }
    }

    /// Development: подробные логи, переопределение разрешено (удобно для
    /// подмены реализаций в тестах)
    pub fn development() -> Self {
        Self {
            allow_overriding_registrations: true,
            default_lifestyle: Lifestyle::Transient,
            verbose_logging: true,
            resolve_open_generics: true,
        }
    }

    /// Minimal: только явные closed registrations
    pub fn minimal() -> Self {
        Self {
            allow_overriding_registrations: false,
            default_lifestyle: Lifestyle::Transient,
            verbose_logging: false,
            resolve_open_generics: false,
        }
    }

    pub fn from_preset(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::production()),
            "development" | "dev" => Ok(Self::development()),
            "minimal" => Ok(Self::minimal()),
            other => Err(ContainerError::configuration(format!(
                "unknown preset '{}'",
                other
            ))),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ContainerError::configuration(format!("invalid TOML options: {}", e)))
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| ContainerError::configuration(format!("invalid JSON options: {}", e)))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ContainerError::configuration(format!("invalid YAML options: {}", e)))
    }

    /// Формат определяется по расширению файла
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;

        let options = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            Some("json") => Self::from_json_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            other => Err(ContainerError::configuration(format!(
                "unsupported options file format: {:?}",
                other
            ))),
        }?;

        debug!("Loaded container options from {}", path.display());
        Ok(options)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ContainerError::configuration(format!("cannot serialize options: {}", e)))
    }

    /// Применить переменные окружения `<PREFIX>_*`
    pub fn apply_env_overrides(&mut self, prefix: &str) -> Result<()> {
        self.apply_vars(prefix, std::env::vars())
    }

    /// То же, но из произвольного набора пар (ключ, значение)
    pub fn apply_vars(
        &mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<()> {
        let prefix = format!("{}_", prefix);

        for (key, value) in vars {
            let Some(name) = key.strip_prefix(&prefix) else {
                continue;
            };

            match name.to_ascii_uppercase().as_str() {
                "ALLOW_OVERRIDING_REGISTRATIONS" => {
                    self.allow_overriding_registrations = parse_flag(&key, &value)?;
                }
                "DEFAULT_LIFESTYLE" => {
                    self.default_lifestyle = value.parse()?;
                }
                "VERBOSE_LOGGING" => {
                    self.verbose_logging = parse_flag(&key, &value)?;
                }
                "RESOLVE_OPEN_GENERICS" => {
                    self.resolve_open_generics = parse_flag(&key, &value)?;
                }
                _ => {
                    debug!("Ignoring unknown option variable {}", key);
                }
            }
        }

        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ContainerError::configuration(format!(
            "{} expects a boolean, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_presets() {
        assert!(!ContainerOptions::production().allow_overriding_registrations);
        assert!(ContainerOptions::development().verbose_logging);
        assert!(!ContainerOptions::minimal().resolve_open_generics);
        assert_eq!(ContainerOptions::default(), ContainerOptions::production());
        assert_eq!(
            ContainerOptions::from_preset("DEV").unwrap(),
            ContainerOptions::development()
        );
        assert!(ContainerOptions::from_preset("staging").is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let options = ContainerOptions::from_toml_str(
            r#"
            default_lifestyle = "singleton"
            verbose_logging = true
            "#,
        )
        .unwrap();

        assert_eq!(options.default_lifestyle, Lifestyle::Singleton);
        assert!(options.verbose_logging);
        assert!(options.resolve_open_generics);
    }

    #[test]
    fn test_env_overrides() {
        let mut options = ContainerOptions::production();
        options
            .apply_vars(
                "IOC",
                vars(&[
                    ("IOC_ALLOW_OVERRIDING_REGISTRATIONS", "yes"),
                    ("IOC_DEFAULT_LIFESTYLE", "Singleton"),
                    ("OTHER_VERBOSE_LOGGING", "true"),
                ]),
            )
            .unwrap();

        assert!(options.allow_overriding_registrations);
        assert_eq!(options.default_lifestyle, Lifestyle::Singleton);
        assert!(!options.verbose_logging);
    }

    #[test]
    fn test_invalid_flag_is_configuration_error() {
        let mut options = ContainerOptions::production();
        let error = options
            .apply_vars("IOC", vars(&[("IOC_VERBOSE_LOGGING", "maybe")]))
            .unwrap_err();
        assert_eq!(error.category(), "configuration");
    }

    #[test]
    fn test_toml_roundtrip_through_string() {
        let options = ContainerOptions::development();
        let text = options.to_toml_string().unwrap();
        assert_eq!(ContainerOptions::from_toml_str(&text).unwrap(), options);
    }
}

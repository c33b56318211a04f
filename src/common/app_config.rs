// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

static CONFIG: OnceLock<NovaFilterConfig> = OnceLock::new();

fn default_log_level() -> String {
    "info".to_string()
}

fn default_dynamic_filter_refresh_interval_ms() -> u64 {
    200
}

pub fn init_from_path(path: impl AsRef<Path>) -> Result<&'static NovaFilterConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = path.as_ref().to_path_buf();
    let cfg = NovaFilterConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

pub fn init_from_env_or_default() -> Result<&'static NovaFilterConfig> {
    if let Some(cfg) = CONFIG.get() {
        return Ok(cfg);
    }
    let path = config_path_from_env_or_default()?;
    let cfg = NovaFilterConfig::load_from_file(&path)?;
    let _ = CONFIG.set(cfg);
    Ok(CONFIG.get().expect("CONFIG set"))
}

pub fn config() -> Result<&'static NovaFilterConfig> {
    init_from_env_or_default()
}

fn config_path_from_env_or_default() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("NOVAFILTER_CONFIG") {
        if !p.trim().is_empty() {
            return Ok(PathBuf::from(p));
        }
    }

    let candidates = [PathBuf::from("novafilter.toml")];
    for p in candidates {
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "missing config file: set $NOVAFILTER_CONFIG or create ./novafilter.toml"
    ))
}

#[derive(Clone, Deserialize)]
pub struct NovaFilterConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional full tracing EnvFilter expression.
    /// If set, this takes precedence over `log_level`.
    #[serde(default)]
    pub log_filter: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Collector period for dynamic filter harvesting. Must be positive.
    #[serde(default = "default_dynamic_filter_refresh_interval_ms")]
    pub dynamic_filter_refresh_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dynamic_filter_refresh_interval_ms: default_dynamic_filter_refresh_interval_ms(),
        }
    }
}

impl NovaFilterConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read config file: {}", path.display()))?;
        let cfg: NovaFilterConfig =
            toml::from_str(&s).with_context(|| format!("parse toml: {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.runtime.dynamic_filter_refresh_interval_ms == 0 {
            return Err(anyhow!(
                "runtime.dynamic_filter_refresh_interval_ms must be positive"
            ));
        }
        Ok(())
    }

    pub fn dynamic_filter_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.runtime.dynamic_filter_refresh_interval_ms)
    }

    pub fn effective_log_filter(&self) -> String {
        match self.log_filter.as_ref() {
            Some(filter) if !filter.trim().is_empty() => filter.clone(),
            _ => self.log_level.clone(),
        }
    }
}

impl Default for NovaFilterConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: None,
            runtime: RuntimeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NovaFilterConfig;

    #[test]
    fn test_refresh_interval_default_is_200ms() {
        let cfg: NovaFilterConfig = toml::from_str(
            r#"
[runtime]
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.runtime.dynamic_filter_refresh_interval_ms, 200);
    }

    #[test]
    fn test_refresh_interval_can_be_overridden() {
        let cfg: NovaFilterConfig = toml::from_str(
            r#"
[runtime]
dynamic_filter_refresh_interval_ms = 50
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.runtime.dynamic_filter_refresh_interval_ms, 50);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_refresh_interval_is_rejected() {
        let cfg: NovaFilterConfig = toml::from_str(
            r#"
[runtime]
dynamic_filter_refresh_interval_ms = 0
"#,
        )
        .expect("parse config");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_log_filter_takes_precedence() {
        let cfg: NovaFilterConfig = toml::from_str(
            r#"
log_level = "debug"
log_filter = "novafilter=debug,hyper=off"
"#,
        )
        .expect("parse config");
        assert_eq!(cfg.effective_log_filter(), "novafilter=debug,hyper=off");
    }
}

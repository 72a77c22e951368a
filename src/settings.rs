// 配置文件（YAML）加载与保存

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::collector::{MetricsSettings, NodeSettings};
use crate::utils;

/// 工具主目录（相对用户主目录）
const AGENT_HOME: &str = ".instaclustr/supportcenter";
/// 默认配置档案的指针文件
const DEFAULT_PROFILE: &str = "DEFAULT";
/// 工作目录下的默认配置文件
const WORKING_DIR_SETTINGS: &str = "settings.yml";

/// 本工具自身配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AgentSettings {
    /// 采集数据根目录（支持 `~`）
    pub collected_data_path: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            collected_data_path: "~/.instaclustr/supportcenter/DATA".to_string(),
        }
    }
}

/// 与命令行合并的目标主机
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    pub nodes: Vec<String>,
    pub metrics: Vec<String>,
}

/// 完整配置
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub agent: AgentSettings,
    pub node: NodeSettings,
    pub metrics: MetricsSettings,
    pub target: TargetSettings,
}

impl Settings {
    /// 从 YAML 文件加载；缺失的键保持默认值
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to load settings file '{}'", path.display()))?;
        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to unmarshal settings file '{}'", path.display()))?;
        Ok(settings)
    }

    /// 保存为 YAML 文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to marshal settings")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create folder '{}'", parent.display()))?;
        }
        fs::write(path, content)
            .with_context(|| format!("Failed to save settings file '{}'", path.display()))?;
        Ok(())
    }
}

/// 解析配置文件路径
///
/// 1. 显式指定的 `config`
/// 2. `~/.instaclustr/supportcenter/DEFAULT` 中记录的档案名
/// 3. 工作目录下的 `settings.yml`
pub fn search_settings_path(config: &str) -> PathBuf {
    search_settings_path_in(config, utils::home_dir().as_deref())
}

pub fn search_settings_path_in(config: &str, home: Option<&Path>) -> PathBuf {
    if !config.trim().is_empty() {
        return utils::expand_with_home(config, home);
    }

    if let Some(home) = home {
        let agent_home = home.join(AGENT_HOME);
        if let Ok(content) = fs::read_to_string(agent_home.join(DEFAULT_PROFILE)) {
            let profile = content.trim();
            if !profile.is_empty() {
                return agent_home.join(profile);
            }
        }
    }

    PathBuf::from(WORKING_DIR_SETTINGS)
}

// 命令行参数
// 兼容单横线长参数（-mc host、-disable_known_hosts），解析前统一转换为双横线

use std::ffi::OsString;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser};

use crate::collector::CollectionWindow;
use crate::error::AgentError;
use crate::ssh::DEFAULT_PORT;

/// Cassandra / Prometheus 诊断数据收集工具
#[derive(Parser, Debug, Clone)]
#[command(name = "instaclustr-agent", version)]
#[command(about = "Collects Cassandra node and Prometheus metrics diagnostics over SSH")]
pub struct Cli {
    /// User to log in as on the remote machine
    #[arg(short = 'l', value_name = "USER")]
    pub user: Option<String>,

    /// Port to connect to on the remote host
    #[arg(short = 'p', value_name = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Metrics collecting hostname
    #[arg(long = "mc", value_name = "HOST", value_delimiter = ',')]
    pub metrics_hosts: Vec<String>,

    /// Node collecting hostnames
    #[arg(long = "nc", value_name = "HOST", value_delimiter = ',')]
    pub node_hosts: Vec<String>,

    /// Private key files read in addition to the default one ([HOME]/.ssh/id_rsa)
    #[arg(long = "pk", value_name = "FILE", value_delimiter = ',')]
    pub private_keys: Vec<PathBuf>,

    /// Datetime (RFC3339) to fetch metrics from (default 1970-01-01T00:00:00Z)
    #[arg(long = "mc-from", value_name = "RFC3339", default_value = "")]
    pub mc_from: String,

    /// Datetime (RFC3339) to fetch metrics to (default current datetime)
    #[arg(long = "mc-to", value_name = "RFC3339", default_value = "")]
    pub mc_to: String,

    /// Skip loading the user's known-hosts file
    #[arg(
        long = "disable_known_hosts",
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub disable_known_hosts: bool,

    /// The path to the configuration file
    #[arg(long = "config", value_name = "PATH", default_value = "")]
    pub config: String,

    /// Write the default configuration to the settings path and exit
    #[arg(
        long = "generate_config",
        num_args = 0..=1,
        default_value_t = false,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub generate_config: bool,
}

impl Cli {
    /// 解析命令行（含单横线长参数转换）
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Cli::try_parse_from(normalize_args(args))
    }

    /// 参数校验：除生成配置外必须提供登录用户
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.generate_config {
            return Ok(());
        }
        match self.user.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => Ok(()),
            _ => Err(AgentError::ArgumentValidation(
                "Missing required parameter '-l <user>'".to_string(),
            )),
        }
    }

    /// 登录用户（校验通过后调用）
    pub fn user(&self) -> &str {
        self.user.as_deref().unwrap_or_default()
    }

    /// 指标采集窗口；未指定的边界使用纪元与 `now`
    pub fn window(&self, now: DateTime<Utc>) -> Result<CollectionWindow, AgentError> {
        let from = parse_bound("from", &self.mc_from)?.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let to = parse_bound("to", &self.mc_to)?.unwrap_or(now);

        let window = CollectionWindow::new(from, to);
        if !window.is_valid() {
            return Err(AgentError::ArgumentValidation(format!(
                "Incorrect metrics collecting time span {} after {}",
                from.to_rfc3339(),
                to.to_rfc3339()
            )));
        }
        Ok(window)
    }
}

fn parse_bound(which: &str, value: &str) -> Result<Option<DateTime<Utc>>, AgentError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(value)
        .map(|t| Some(t.with_timezone(&Utc)))
        .map_err(|e| {
            AgentError::ArgumentValidation(format!(
                "Failed to parse '{}' datetime ({}): {}",
                which, value, e
            ))
        })
}

/// 把 `-name` / `-name=value` 形式的长参数改写为 `--name`
/// 单字符短参数、`--` 之后的参数与参数值保持不变
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut normalized = Vec::new();
    let mut passthrough = false;

    for (i, arg) in args.into_iter().enumerate() {
        let arg: OsString = arg.into();
        if i == 0 || passthrough {
            normalized.push(arg);
            continue;
        }

        let rewritten = match arg.to_str() {
            Some("--") => {
                passthrough = true;
                None
            }
            Some(s) if s.starts_with('-') && !s.starts_with("--") => {
                let name = s[1..].split('=').next().unwrap_or_default();
                if name.chars().count() > 1 {
                    Some(OsString::from(format!("-{}", s)))
                } else {
                    None
                }
            }
            _ => None,
        };
        normalized.push(rewritten.unwrap_or(arg));
    }

    normalized
}

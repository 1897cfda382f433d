use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::models::SiteProfile;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 语音转文字网页地址
    pub target_url: String,
    /// 等待文本生成的最长时间（秒）
    pub max_wait_secs: u64,
    /// 完成检测的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 单次页面操作的默认超时（秒）
    pub page_timeout_secs: u64,
    /// 页面加载完成后的额外等待（毫秒）
    pub settle_delay_ms: u64,
    /// 点击上传按钮后的等待（毫秒）
    pub upload_dialog_delay_ms: u64,
    /// 查找控件的最长时间（秒）
    pub element_wait_secs: u64,
    /// 查找控件的重试间隔（毫秒）
    pub element_poll_ms: u64,
    /// 结果文本的最小长度
    pub min_text_len: usize,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// 是否以无头模式启动浏览器
    pub headless: bool,
    /// 浏览器可执行文件路径，为空时自动查找
    pub chrome_executable: Option<PathBuf>,
    /// 目标网站的页面结构
    pub site: SiteProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_url: "https://daotao.abaii.vn/#/tockyat-fileat".to_string(),
            max_wait_secs: 300,
            poll_interval_ms: 2000,
            page_timeout_secs: 60,
            settle_delay_ms: 3000,
            upload_dialog_delay_ms: 2000,
            element_wait_secs: 10,
            element_poll_ms: 1000,
            min_text_len: 50,
            viewport_width: 1920,
            viewport_height: 1080,
            headless: true,
            chrome_executable: None,
            site: SiteProfile::default(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置，解析失败时使用默认值
    pub fn from_env() -> Self {
        Self::default().overlay_env()
    }

    /// 先读取 TOML 配置文件（如果提供），再用环境变量覆盖
    ///
    /// # 参数
    /// - `path`: TOML 配置文件路径，为 `None` 时从默认值开始
    ///
    /// # 返回
    /// 返回通过校验的配置
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => {
                info!("📄 读取配置文件: {}", path.display());
                Self::from_toml_file(path)?
            }
            None => Self::default(),
        };
        let config = base.overlay_env();
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取配置，缺失的字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn overlay_env(self) -> Self {
        self.overlay(|name| std::env::var(name).ok())
    }

    /// 用 `var` 查到的值覆盖对应字段
    ///
    /// 目标地址优先读 `AUDIO_TO_TEXT_URL`，其次兼容旧部署的 `ABAII_URL`
    fn overlay(self, var: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |name: &str| parse_var(name, var(name));
        Self {
            target_url: var("AUDIO_TO_TEXT_URL")
                .or_else(|| var("ABAII_URL"))
                .unwrap_or(self.target_url),
            max_wait_secs: parse("AUDIO_TO_TEXT_MAX_WAIT_SECS").unwrap_or(self.max_wait_secs),
            poll_interval_ms: parse("AUDIO_TO_TEXT_POLL_INTERVAL_MS").unwrap_or(self.poll_interval_ms),
            page_timeout_secs: parse("AUDIO_TO_TEXT_PAGE_TIMEOUT_SECS").unwrap_or(self.page_timeout_secs),
            settle_delay_ms: parse("AUDIO_TO_TEXT_SETTLE_DELAY_MS").unwrap_or(self.settle_delay_ms),
            upload_dialog_delay_ms: parse("AUDIO_TO_TEXT_UPLOAD_DELAY_MS").unwrap_or(self.upload_dialog_delay_ms),
            element_wait_secs: parse("AUDIO_TO_TEXT_ELEMENT_WAIT_SECS").unwrap_or(self.element_wait_secs),
            element_poll_ms: parse("AUDIO_TO_TEXT_ELEMENT_POLL_MS").unwrap_or(self.element_poll_ms),
            min_text_len: parse_var("AUDIO_TO_TEXT_MIN_TEXT_LEN", var("AUDIO_TO_TEXT_MIN_TEXT_LEN"))
                .unwrap_or(self.min_text_len),
            viewport_width: parse_var("AUDIO_TO_TEXT_VIEWPORT_WIDTH", var("AUDIO_TO_TEXT_VIEWPORT_WIDTH"))
                .unwrap_or(self.viewport_width),
            viewport_height: parse_var("AUDIO_TO_TEXT_VIEWPORT_HEIGHT", var("AUDIO_TO_TEXT_VIEWPORT_HEIGHT"))
                .unwrap_or(self.viewport_height),
            headless: parse_var("AUDIO_TO_TEXT_HEADLESS", var("AUDIO_TO_TEXT_HEADLESS")).unwrap_or(self.headless),
            chrome_executable: var("CHROME_EXECUTABLE").map(PathBuf::from).or(self.chrome_executable),
            site: self.site,
        }
    }

    /// 检查配置之间的约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "轮询间隔必须大于 0".to_string(),
            });
        }
        if self.poll_interval() >= self.max_wait() {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: format!(
                    "轮询间隔 {}ms 必须小于最长等待时间 {}s",
                    self.poll_interval_ms, self.max_wait_secs
                ),
            });
        }
        if self.element_wait_secs == 0 || self.element_poll_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "element_wait_secs",
                reason: "控件查找时间和重试间隔必须大于 0".to_string(),
            });
        }
        if self.site.upload_trigger.is_empty() || self.site.file_input.is_empty() {
            return Err(ConfigError::Invalid {
                field: "site",
                reason: "上传按钮和文件输入框至少需要一个选择器".to_string(),
            });
        }
        if self.page_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "page_timeout_secs",
                reason: "页面操作超时必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn upload_dialog_delay(&self) -> Duration {
        Duration::from_millis(self.upload_dialog_delay_ms)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_secs(self.element_wait_secs)
    }

    pub fn element_poll(&self) -> Duration {
        Duration::from_millis(self.element_poll_ms)
    }
}

/// 解析环境变量的值，格式不对时记录警告并忽略
fn parse_var<T: std::str::FromStr>(name: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("⚠️ 环境变量 {}={} 格式不正确，已忽略", name, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_site_timings() {
        let config = Config::default();
        assert_eq!(config.max_wait(), Duration::from_secs(300));
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.min_text_len, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_overrides_only_given_fields() {
        let config = Config::from_toml_str(
            r#"
            target_url = "http://localhost:8080/upload"
            max_wait_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.target_url, "http://localhost:8080/upload");
        assert_eq!(config.max_wait_secs, 30);
        assert_eq!(config.poll_interval_ms, 2000);
        assert!(config.headless);
        assert_eq!(config.site, SiteProfile::abaii());
    }

    #[test]
    fn test_site_selectors_from_toml() {
        let config = Config::from_toml_str(
            r##"
            [site]
            upload_trigger = ["#uploadV2", "button.upload"]
            "##,
        )
        .unwrap();
        assert_eq!(config.site.upload_trigger.len(), 2);
        assert_eq!(config.site.polished_region, "#polishedNote");
        assert!(config.validate().is_ok());

        let empty = Config::from_toml_str("[site]\nfile_input = []").unwrap();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        assert!(Config::from_toml_str("max_wait_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_poll_interval_must_be_shorter_than_max_wait() {
        let config = Config {
            max_wait_secs: 1,
            poll_interval_ms: 1000,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                ..
            })
        ));

        let zero = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        assert!(zero.validate().is_err());
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_legacy_abaii_url_is_honored() {
        let config = Config::default().overlay(vars(&[("ABAII_URL", "https://staging.abaii.vn/#/tockyat-fileat")]));
        assert_eq!(config.target_url, "https://staging.abaii.vn/#/tockyat-fileat");
    }

    #[test]
    fn test_audio_to_text_url_wins_over_abaii_url() {
        let config = Config::default().overlay(vars(&[
            ("ABAII_URL", "https://old.example/upload"),
            ("AUDIO_TO_TEXT_URL", "http://localhost:8080/upload"),
        ]));
        assert_eq!(config.target_url, "http://localhost:8080/upload");
    }

    #[test]
    fn test_env_values_override_and_bad_values_are_ignored() {
        let config = Config::default().overlay(vars(&[
            ("AUDIO_TO_TEXT_MAX_WAIT_SECS", "120"),
            ("AUDIO_TO_TEXT_POLL_INTERVAL_MS", "soon"),
            ("AUDIO_TO_TEXT_HEADLESS", "false"),
            ("CHROME_EXECUTABLE", "/usr/bin/chromium"),
        ]));
        assert_eq!(config.max_wait_secs, 120);
        assert_eq!(config.poll_interval_ms, 2000);
        assert!(!config.headless);
        assert_eq!(config.chrome_executable, Some(PathBuf::from("/usr/bin/chromium")));
        assert_eq!(config.target_url, Config::default().target_url);
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::from_toml_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFailed { .. }));
    }
}

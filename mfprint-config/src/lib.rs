use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    /// 检查取值范围。轮询间隔为零时超时永远无法累计。
    pub fn validate(&self) -> Result<(), String> {
        if self.service.poll_interval_ms == 0 {
            return Err("service.poll_interval_ms 必须大于 0".to_string());
        }
        if self.encoding.circle_sides < 3 {
            return Err("encoding.circle_sides 至少为 3".to_string());
        }
        Ok(())
    }

    /// 自动发现配置文件：优先读取环境变量 `MFPRINT_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("MFPRINT_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 打印服务地址与轮询节奏。
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "ServiceConfig::default_url")]
    pub url: String,
    #[serde(default = "ServiceConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "ServiceConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl ServiceConfig {
    fn default_url() -> String {
        "http://localhost:8080/print/default".to_string()
    }

    fn default_poll_interval_ms() -> u64 {
        1000
    }

    fn default_timeout_ms() -> u64 {
        30_000
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pdf,
    Jpg,
    Png,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Pdf
    }
}

/// 编码参数。`page_size` 为地图框尺寸（点，1/72 英寸）。
#[derive(Debug, Clone, Deserialize)]
pub struct EncodingConfig {
    #[serde(default = "EncodingConfig::default_circle_sides")]
    pub circle_sides: usize,
    #[serde(default = "EncodingConfig::default_dpi")]
    pub dpi: f64,
    #[serde(default = "EncodingConfig::default_layout")]
    pub layout: String,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "EncodingConfig::default_page_size")]
    pub page_size: [f64; 2],
    #[serde(default)]
    pub pdf_a: bool,
}

impl EncodingConfig {
    fn default_circle_sides() -> usize {
        64
    }

    fn default_dpi() -> f64 {
        254.0
    }

    fn default_layout() -> String {
        "A4 portrait".to_string()
    }

    fn default_page_size() -> [f64; 2] {
        [555.0, 675.0]
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            circle_sides: Self::default_circle_sides(),
            dpi: Self::default_dpi(),
            layout: Self::default_layout(),
            format: OutputFormat::default(),
            page_size: Self::default_page_size(),
            pdf_a: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("配置文件 {path:?} 取值无效: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_every_section() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.service.poll_interval_ms, 1000);
        assert_eq!(cfg.service.timeout_ms, 30_000);
        assert_eq!(cfg.encoding.circle_sides, 64);
        assert_eq!(cfg.encoding.format, OutputFormat::Pdf);
        assert_eq!(cfg.encoding.layout, "A4 portrait");
        assert!(!cfg.encoding.pdf_a);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("创建临时文件");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [service]
            url = "https://print.example.org/print/demo"
            timeout_ms = 5000

            [encoding]
            circle_sides = 32
            format = "png"
            page_size = [400, 300]
            pdf_a = true
            "#
        )
        .expect("写入临时文件");

        let cfg = AppConfig::from_file(file.path()).expect("加载配置");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.service.url, "https://print.example.org/print/demo");
        assert_eq!(cfg.service.timeout_ms, 5000);
        assert_eq!(cfg.service.poll_interval_ms, 1000);
        assert_eq!(cfg.encoding.circle_sides, 32);
        assert_eq!(cfg.encoding.format.as_str(), "png");
        assert_eq!(cfg.encoding.page_size, [400.0, 300.0]);
        assert!(cfg.encoding.pdf_a);
        assert_eq!(cfg.encoding.dpi, 254.0);
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().expect("创建临时文件");
        writeln!(file, "[service]\npoll_interval_ms = \"soon\"").expect("写入临时文件");
        let err = AppConfig::from_file(file.path()).expect_err("应当解析失败");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("创建临时文件");
        writeln!(file, "[service]\npoll_interval_ms = 0").expect("写入临时文件");
        let err = AppConfig::from_file(file.path()).expect_err("零间隔应被拒绝");
        match err {
            ConfigError::Invalid { message, .. } => {
                assert!(message.contains("poll_interval_ms"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn missing_file_reports_io_error() {
        let dir = tempfile::tempdir().expect("创建临时目录");
        let err = AppConfig::from_file(dir.path().join("absent.toml")).expect_err("文件不存在");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

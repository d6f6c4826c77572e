use std::fs;
use std::path::PathBuf;

use mfprint_config::{AppConfig, ConfigError};
use mfprint_core::units::{self, METERS_PER_INCH};
use mfprint_engine::{BaseCustomizer, EncodeOptions, PrintEncoder, SpecOptions};
use mfprint_io::{PollSettings, ReportClient, ThreadSleeper};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod demo;

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut submit = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--submit" => submit = true,
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            "--output" => {
                let Some(path) = args.next() else {
                    eprintln!("`--output` 需要提供输出文件路径");
                    std::process::exit(1);
                };
                output = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
        }
    }

    let config = load_configuration(config_override);
    init_logging(&config);
    info!("启动打印规格编码器");

    let encoding = &config.encoding;
    let extent = units::print_extent(encoding.page_size, demo::center(), demo::SCALE);
    let print_resolution = demo::SCALE * METERS_PER_INCH / encoding.dpi;
    let mut options = EncodeOptions::new(demo::SCALE, print_resolution, encoding.dpi);
    if encoding.pdf_a {
        options = options.with_pdf_a(true);
    }

    let map = demo::build_map();
    let customizer = BaseCustomizer::new(extent);
    let spec = PrintEncoder::new()
        .with_circle_sides(encoding.circle_sides)
        .create_spec(
            &map,
            &options,
            SpecOptions::new(encoding.layout.clone(), encoding.format.as_str()),
            &customizer,
        );

    let json = match serde_json::to_string_pretty(&spec) {
        Ok(json) => json,
        Err(err) => {
            error!(error = %err, "序列化打印规格失败");
            std::process::exit(1);
        }
    };
    match &output {
        Some(path) => {
            if let Err(err) = fs::write(path, &json) {
                error!(path = %path.display(), error = %err, "写入打印规格失败");
                std::process::exit(1);
            }
            info!(path = %path.display(), layers = spec.attributes.map.layers.len(), "打印规格已写入");
        }
        None => println!("{json}"),
    }

    if !submit {
        return;
    }
    let settings = match PollSettings::from_millis(
        config.service.poll_interval_ms,
        config.service.timeout_ms,
    ) {
        Ok(settings) => settings,
        Err(err) => {
            error!(error = %err, "轮询参数无效");
            std::process::exit(1);
        }
    };
    let client = match ReportClient::http(config.service.url.clone()) {
        Ok(client) => client.with_settings(settings),
        Err(err) => {
            error!(error = %err, "无法创建打印服务客户端");
            std::process::exit(1);
        }
    };
    match client.print(&spec, &ThreadSleeper) {
        Ok(url) => {
            info!(%url, "报告已生成");
            println!("{url}");
        }
        Err(err) => {
            error!(error = %err, "打印作业失败");
            std::process::exit(1);
        }
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. }
                    | ConfigError::Parse { path, .. }
                    | ConfigError::Invalid { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_writer(std::io::stderr).with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

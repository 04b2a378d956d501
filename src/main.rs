use anyhow::Result;
use clap::{Arg, Command};
use loan_pipeline::common::{start_application, StartupConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let matches = Command::new("loan-pipeline")
        .version("1.0.0")
        .about("贷款申请异步风险评分流水线")
        .long_about("消费进件队列中的贷款申请，经过清洗、评分、持久化三个阶段可靠处理")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .get_matches();

    let startup_config = StartupConfig {
        config_path: matches.get_one::<String>("config").cloned(),
        log_level: matches.get_one::<String>("log-level").unwrap().to_string(),
        log_format: matches.get_one::<String>("log-format").unwrap().to_string(),
    };

    start_application(startup_config, "Pipeline").await
}

// Instaclustr Agent - Cassandra / Prometheus 诊断数据收集工具
// 应用入口

use std::process::ExitCode;

use clap::CommandFactory;

mod archive;
mod cli;
mod collector;
mod error;
mod logging;
mod orchestrator;
mod progress;
mod settings;
mod ssh;
mod utils;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            // --help / --version 走 stdout 并正常退出
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug
    let log = match logging::init() {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Failed to initialize logging '{}' ({})", logging::LOG_FILE, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = cli.validate() {
        tracing::error!("{}", e);
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    }

    if cli.generate_config {
        return match orchestrator::generate_config(&cli.config) {
            Ok(path) => {
                tracing::info!("Default settings written to '{}'", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!("Failed to generate config ({})", e);
                ExitCode::FAILURE
            }
        };
    }

    match orchestrator::run(cli, log).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

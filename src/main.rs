use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use dirmirror::cli::{self, Cli, MirrorArgs};
use dirmirror::config::{self, MirrorConfig};
use dirmirror::core::{MirrorPass, Scheduler, SyncEngine};
use dirmirror::logging;
use std::ffi::OsString;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const EXIT_INVALID: u8 = 1;
const EXIT_SYNC_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // 路径参数可能不是合法 UTF-8
    let mut argv: Vec<OsString> = std::env::args_os().collect();
    if argv.len() <= 1 {
        let stdin = std::io::stdin();
        match cli::prompt_arguments(&mut stdin.lock(), &mut std::io::stdout()) {
            Ok(args) => argv = args.into_iter().map(OsString::from).collect(),
            Err(e) => {
                eprintln!("读取输入失败: {}", e);
                return ExitCode::from(EXIT_INVALID);
            }
        }
    }

    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_INVALID),
            };
        }
    };

    let config_dir = cli.config.clone().unwrap_or_else(config::default_config_dir);
    logging::init_logging(&config_dir, cli.verbose);

    let args = match cli.into_args() {
        Ok(args) => args,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_INVALID);
        }
    };

    if args.admin {
        warn!("--admin: 不会自动提权，如需访问受保护的目录请以管理员/root 身份重新运行");
    }

    let engine = Arc::new(SyncEngine::local(MirrorConfig::load(&config_dir)));

    let result = match args.interval {
        None => engine
            .synchronize(&args.source, &args.destination)
            .await
            .map(|_| ())
            .context("同步失败"),
        Some(interval) => run_periodic(engine, &args, interval).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_SYNC_FAILED)
        }
    }
}

/// 定时同步，直到收到 Ctrl-C
async fn run_periodic(engine: Arc<SyncEngine>, args: &MirrorArgs, interval: Duration) -> anyhow::Result<()> {
    let scheduler = Scheduler::new(engine);

    // 首次同步失败已记录日志，定时器照常运行
    if let Err(e) = scheduler.start(&args.source, &args.destination, interval).await {
        warn!("首次同步未成功: {}", e);
    }
    info!("定时同步已启动，按 Ctrl-C 退出");

    tokio::signal::ctrl_c().await.context("监听 Ctrl-C 失败")?;
    info!("收到退出信号，正在停止...");

    scheduler.stop().await;
    scheduler.wait_idle().await;
    Ok(())
}

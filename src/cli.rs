//! 命令行参数与交互式输入

use clap::Parser;
use regex::Regex;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const YEAR: u64 = 365 * DAY;

/// 单向目录镜像同步
#[derive(Debug, Parser)]
#[command(name = "dirmirror", version, about)]
pub struct Cli {
    /// 源目录
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// 目标目录
    #[arg(short, long)]
    pub destination: Option<PathBuf>,

    /// 同步间隔：纯数字为分钟，或 <N>s|m|h|d|y；不指定则只同步一次
    #[arg(short, long, value_parser = parse_interval)]
    pub interval: Option<Duration>,

    /// 请求以管理员身份运行（仅记录，不会自动提权）
    #[arg(long)]
    pub admin: bool,

    /// 配置目录
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}

/// 校验后的同步参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorArgs {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub interval: Option<Duration>,
    pub admin: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("缺少参数 --source")]
    MissingSource,
    #[error("缺少参数 --destination")]
    MissingDestination,
    #[error("源目录不存在或不是目录: {0}")]
    SourceNotFound(PathBuf),
}

impl Cli {
    pub fn into_args(self) -> Result<MirrorArgs, ArgsError> {
        let source = self.source.ok_or(ArgsError::MissingSource)?;
        let destination = self.destination.ok_or(ArgsError::MissingDestination)?;
        if !source.is_dir() {
            return Err(ArgsError::SourceNotFound(source));
        }
        Ok(MirrorArgs {
            source,
            destination,
            interval: self.interval,
            admin: self.admin,
        })
    }
}

fn interval_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^\s*(\d+)\s*([smhdy]?)\s*$").expect("有效的正则"))
}

/// 解析同步间隔
///
/// 纯数字按分钟计；后缀 s/m/h/d/y 分别表示秒/分/时/天/年（一年按 365 天）。
pub fn parse_interval(text: &str) -> Result<Duration, String> {
    let caps = interval_pattern()
        .captures(text)
        .ok_or_else(|| format!("无效的时间间隔: {}", text))?;

    let value: u64 = caps[1]
        .parse()
        .map_err(|_| format!("时间间隔数值过大: {}", text))?;
    if value == 0 {
        return Err("时间间隔必须大于 0".to_string());
    }

    let unit = match caps[2].to_ascii_lowercase().as_str() {
        "s" => 1,
        "" | "m" => MINUTE,
        "h" => HOUR,
        "d" => DAY,
        "y" => YEAR,
        _ => unreachable!(),
    };

    value
        .checked_mul(unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("时间间隔数值过大: {}", text))
}

/// 没有任何参数时交互式询问，返回拼好的参数列表（含程序名）
pub fn prompt_arguments<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<Vec<String>> {
    let mut args = vec!["dirmirror".to_string()];

    let source = ask(input, output, "源目录: ")?;
    args.extend(["--source".to_string(), source]);

    let destination = ask(input, output, "目标目录: ")?;
    args.extend(["--destination".to_string(), destination]);

    let interval = ask(input, output, "同步间隔（如 30、10s、2h，留空或 once 表示只同步一次）: ")?;
    if !interval.is_empty() && !interval.eq_ignore_ascii_case("once") {
        args.extend(["--interval".to_string(), interval]);
    }

    let admin = ask(input, output, "以管理员身份运行？[y/N]: ")?;
    if matches!(admin.to_ascii_lowercase().as_str(), "y" | "yes") {
        args.push("--admin".to_string());
    }

    Ok(args)
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<String> {
    write!(output, "{}", question)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().trim_matches('"').to_string())
}

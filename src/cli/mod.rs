mod images;
mod sentences;
mod status;

use anyhow::{Result, anyhow};
use console::style;
use std::path::PathBuf;

use crate::core::config::{self, Config};
use crate::core::terminal::{self, GuideSection, print_error};
use crate::logging;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Pipeline")
        .command("sentences", "Generate one n+1 sentence per vocabulary row")
        .command("images", "Render an illustration for each stored sentence")
        .command("all", "Run sentences, then images")
        .print();

    GuideSection::new("Inspection")
        .command("status", "Show progress of the sentence store and images")
        .command("help", "Show this guide")
        .print();

    GuideSection::new("Flags")
        .command("--start N", "First vocabulary/sentence row (1-based)")
        .command("--limit N", "Maximum number of rows to process")
        .command("--concurrency K", "Parallel image workers")
        .command("--config PATH", "TOML config file (default: kotodeck.toml)")
        .command("--verbose", "Debug logging")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("kotodeck").green()
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CliFlags {
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub start: Option<usize>,
    pub limit: Option<usize>,
    pub concurrency: Option<usize>,
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    args.get(i + 1)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow!("{} requires a value", flag))
}

fn flag_number(args: &[String], i: usize, flag: &str) -> Result<usize> {
    let raw = flag_value(args, i, flag)?;
    raw.parse()
        .map_err(|_| anyhow!("{} expects a number, got {:?}", flag, raw))
}

pub(crate) fn parse_flags(args: &[String], start: usize) -> Result<CliFlags> {
    let mut flags = CliFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                flags.config = Some(PathBuf::from(flag_value(args, i, "--config")?));
                i += 2;
            }
            "--verbose" | "-v" => {
                flags.verbose = true;
                i += 1;
            }
            "--start" => {
                flags.start = Some(flag_number(args, i, "--start")?);
                i += 2;
            }
            "--limit" => {
                let n = flag_number(args, i, "--limit")?;
                flags.limit = (n > 0).then_some(n);
                i += 2;
            }
            "--concurrency" | "-j" => {
                flags.concurrency = Some(flag_number(args, i, "--concurrency")?);
                i += 2;
            }
            other => return Err(anyhow!("Unknown flag: {}", other)),
        }
    }
    Ok(flags)
}

fn load_config(flags: &CliFlags) -> Result<Config> {
    let lookup = |name: &str| std::env::var(name).ok();
    let path = config::resolve_config_path(flags.config.as_deref(), lookup);
    Config::load(path.as_deref(), lookup)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let flags = parse_flags(&args, 2)?;
    logging::init(flags.verbose);
    let mut config = load_config(&flags)?;

    match cmd {
        "sentences" => {
            apply_sentence_flags(&mut config, &flags);
            sentences::run(&config).await
        }
        "images" => {
            apply_image_flags(&mut config, &flags);
            images::run(&config).await
        }
        "all" => {
            apply_sentence_flags(&mut config, &flags);
            if let Some(k) = flags.concurrency {
                config.concurrency = k;
            }
            sentences::run(&config).await?;
            images::run(&config).await
        }
        "status" => status::run(&config),
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Err(anyhow!("unknown command {:?}", other))
        }
    }
}

fn apply_sentence_flags(config: &mut Config, flags: &CliFlags) {
    if let Some(start) = flags.start {
        config.start_index = start;
    }
    if flags.start.is_some() || flags.limit.is_some() {
        config.row_limit = flags.limit;
    }
}

fn apply_image_flags(config: &mut Config, flags: &CliFlags) {
    if let Some(start) = flags.start {
        config.image_start_index = start;
    }
    if flags.start.is_some() || flags.limit.is_some() {
        config.image_row_limit = flags.limit;
    }
    if let Some(k) = flags.concurrency {
        config.concurrency = k;
    }
}

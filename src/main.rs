use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use tokio::io::{AsyncBufReadExt, BufReader};

use debugcat::debugger::core::Debugger;
use debugcat::ui::console::{self, Command};
use debugcat::{Mode, OutputSink, Registry, SessionConfig, StatusBus};

/// DEBUGCAT - drive a headless debugger from the console
#[derive(Debug, Parser)]
#[command(name = "debugcat", version, about)]
struct Cli {
    /// Session configuration file (TOML)
    #[arg(long, env = "DEBUGCAT_CONFIG")]
    config: Option<PathBuf>,

    /// Attach to a running process instead of launching
    #[arg(long, value_name = "PID", conflicts_with = "test")]
    attach: Option<u32>,

    /// Debug the package tests
    #[arg(long)]
    test: bool,

    /// Only run tests matching FILTER
    #[arg(long, value_name = "FILTER", requires = "test")]
    run: Option<String>,

    /// Debugger binary
    #[arg(long, value_name = "PATH")]
    dlv: Option<String>,

    /// Project root, stripped from displayed paths
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Program or package to debug
    target: PathBuf,

    /// Passed to the debugger after `--`
    #[arg(last = true)]
    extra: Vec<String>,
}

impl Cli {
    /// Load the config file, then apply flags on top
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
            None => SessionConfig::default(),
        };
        if let Some(pid) = self.attach {
            config.mode = Mode::Attach;
            config.pid = Some(pid);
        } else if self.test {
            config.mode = Mode::Test;
        }
        if self.run.is_some() {
            config.test_filter = self.run.clone();
        }
        if let Some(dlv) = &self.dlv {
            config.debugger = dlv.clone();
        }
        if self.root.is_some() {
            config.project_root = self.root.clone();
        }
        if !self.extra.is_empty() {
            config.extra_args = self.extra.clone();
        }
        config.validate().context("invalid session configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    debugcat::init_logging(if cli.verbose { LevelFilter::Debug } else { LevelFilter::Info });
    info!("Starting {} v{}", debugcat::PKG_NAME, debugcat::VERSION);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
    info!("{} exiting", debugcat::PKG_NAME);
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.session_config()?;
    let registry = Registry::with_defaults(&config.debugger);
    let root = config.project_root.clone();
    let params = config.into_params(StatusBus::new());

    let (out, mut lines) = OutputSink::channel();
    let dbg = Debugger::for_path(&registry, &cli.target, params, out, root)
        .with_context(|| format!("no debugger for {}", cli.target.display()))?;

    let printer = tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            println!("{}", line.text);
        }
    });
    let watcher = dbg.on_status(|status| println!("[{}]", status));

    dbg.start(&cli.target)
        .await
        .with_context(|| format!("starting session for {}", cli.target.display()))?;
    if dbg.pid() != 0 {
        info!("Debugging process {}", dbg.pid());
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = input.next_line().await.context("reading console input")? {
        let cmd = console::parse_command(&line);
        if cmd == Command::Quit {
            break;
        }
        if matches!(&cmd, Command::Unknown(msg) if msg.is_empty()) {
            continue;
        }
        match console::execute(&dbg, cmd).await {
            Ok(reply) => reply.iter().for_each(|l| println!("{}", l)),
            Err(e) => println!("error: {}", e),
        }
    }

    if dbg.is_active() {
        if let Err(e) = dbg.stop().await {
            error!("Failed to end session: {}", e);
        }
    }
    watcher.abort();
    printer.abort();
    Ok(())
}

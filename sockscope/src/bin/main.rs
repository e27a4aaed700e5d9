use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use env_logger::Builder;
use log::{info, LevelFilter};
use sockscope::replay::Replayer;

const ABOUT: &str = "Correlates HTTP and TLS socket activity of traced processes into spans";

#[derive(Parser)]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    /// Enable debugging
    #[arg(short, long)]
    debug: bool,

    /// Silents out debug, info, error logging.
    #[arg(short, long)]
    silent: bool,

    /// Set verbosity level, repeat option for more verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Specify a sockscope command
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Parser)]
struct ReplayOpt {
    /// Write records to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print replay statistics to stderr when done
    #[arg(long)]
    stats: bool,

    /// Recorded kernel events (json lines), "-" reads stdin
    log_files: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay recorded kernel events through the correlation engine
    Replay(ReplayOpt),
}

impl Command {
    fn replay(o: ReplayOpt) -> anyhow::Result<()> {
        let mut r = Replayer::default();

        let mut out: Box<dyn Write> = match o.output.as_ref() {
            Some(p) => Box::new(BufWriter::new(
                fs::File::create(p).with_context(|| format!("failed to create {}", p.display()))?,
            )),
            None => Box::new(BufWriter::new(io::stdout().lock())),
        };

        let files = if o.log_files.is_empty() {
            vec!["-".to_string()]
        } else {
            o.log_files.clone()
        };

        for f in files {
            let reader: Box<dyn Read> = if f == "-" {
                Box::new(io::stdin().lock())
            } else {
                Box::new(fs::File::open(&f).with_context(|| format!("failed to open {f}"))?)
            };

            info!("replaying {f}");
            r.replay(BufReader::new(reader), &mut out)
                .with_context(|| format!("failed to replay {f}"))?;
        }

        if o.stats {
            eprintln!("{}", serde_json::to_string(&r.stats())?);
        }

        Ok(())
    }
}

fn main() -> Result<(), anyhow::Error> {
    let cli: Cli = Cli::from_arg_matches(&Cli::command().get_matches())?;

    // setting log level according to the verbosity level
    let mut log_level = LevelFilter::Warn;
    match cli.verbose {
        1 => log_level = LevelFilter::Info,
        2 => log_level = LevelFilter::Debug,
        3..=u8::MAX => log_level = LevelFilter::Trace,
        _ => {}
    }

    // silent out logging if specified in CLI
    if cli.silent {
        log_level = LevelFilter::Off;
    }

    if cli.debug {
        log_level = LevelFilter::Debug;
    }

    Builder::new().filter_level(log_level).init();

    match cli.command {
        Some(Command::Replay(o)) => Command::replay(o),
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

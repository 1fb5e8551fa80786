//! gdb-baud - Raise the speed of a remote GDB serial link
//!
//! Asks a GDB stub on the far end of a serial line to reprogram its UART
//! divider, then reopens the local port at the new speed and checks the
//! stub still answers.

mod config;
mod handshake;
mod protocol;
mod transport;

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Context;
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use handshake::{Outcome, Sequencer};
use transport::SerialConnector;

/// gdb-baud - Switch a remote GDB serial link to a higher baud rate
#[derive(Parser, Debug)]
#[command(name = "gdb-baud")]
#[command(author = "gdb-baud Contributors")]
#[command(about = "Switch a remote GDB serial link to a higher baud rate", long_about = None)]
#[command(disable_version_flag = true, disable_help_flag = true)]
#[command(args_override_self = true)]
struct Cli {
    /// Echo every frame sent and received
    #[arg(short = 'v', short_alias = 'V')]
    verbose: bool,

    /// New baud rate [default: 921600]
    #[arg(short = 'b', short_alias = 'B', value_name = "RATE",
          value_parser = clap::value_parser!(u32).range(1..))]
    baud: Option<u32>,

    /// Serial port [default: COM7 on Windows, /dev/ttyUSB0 elsewhere]
    #[arg(short = 'c', short_alias = 'C', value_name = "PORT")]
    port: Option<String>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Drop replies whose checksum does not match
    #[arg(long)]
    strict: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Write the effective configuration to a file and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    /// Command-line values take precedence over the configuration file
    fn apply(&self, config: &mut Config) {
        if self.verbose {
            config.general.verbose = true;
        }
        if let Some(baud) = self.baud {
            config.serial.target_baud = baud;
        }
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if self.strict {
            config.protocol.verify_checksums = true;
        }
    }
}

/// Parse arguments, dropping any the tool does not know about
fn parse_lenient<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();

    loop {
        let err = match Cli::try_parse_from(&args) {
            Ok(cli) => return Ok(cli),
            Err(err) if err.kind() == ErrorKind::UnknownArgument => err,
            Err(err) => return Err(err),
        };

        let Some(ContextValue::String(unknown)) = err.get(ContextKind::InvalidArg) else {
            return Err(err);
        };
        let with_value = format!("{}=", unknown);
        let position = args.iter().skip(1).position(|arg| {
            arg.to_str()
                .is_some_and(|arg| arg == unknown || arg.starts_with(&with_value))
        });

        if let Some(index) = position {
            args.remove(index + 1);
            continue;
        }

        // Unknown short flag inside a cluster such as `-xv`
        let Some(flag) = unknown
            .strip_prefix('-')
            .filter(|flag| flag.chars().count() == 1 && *flag != "-")
        else {
            return Err(err);
        };
        let cluster = args.iter().enumerate().skip(1).find_map(|(index, arg)| {
            let shorts = arg
                .to_str()?
                .strip_prefix('-')
                .filter(|shorts| shorts.len() > 1 && !shorts.starts_with('-'))?;
            shorts
                .contains(flag)
                .then(|| (index, shorts.replacen(flag, "", 1)))
        });

        match cluster {
            Some((index, rest)) if rest.is_empty() => {
                args.remove(index);
            }
            Some((index, rest)) => args[index] = format!("-{}", rest).into(),
            None => return Err(err),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = match parse_lenient(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => return Err(err).context("Invalid command line"),
        Err(err) => err.exit(),
    };

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        Config::load_default().unwrap_or_default()
    };
    cli.apply(&mut config);

    // Initialize logging
    let filter = if config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    config.validate()?;

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }
    if let Some(path) = &cli.write_config {
        config.save(path)?;
        println!("Configuration written to: {}", path.display());
        return Ok(());
    }

    let report = Sequencer::new(&config, SerialConnector::new()).run()?;
    match report.divider {
        Some(divider) if report.speed_change_sent => {
            tracing::debug!("UART divider set to {}", divider)
        }
        _ => tracing::warn!(
            "No reply at {} baud, speed change was not sent",
            config.serial.initial_baud
        ),
    }
    tracing::debug!("Handshake totals: {:?}", report.stats);

    match report.outcome {
        Outcome::Confirmed => println!(
            "Target system responding OK at {} baud",
            config.serial.target_baud
        ),
        Outcome::NoResponse => println!(
            "No response from target system at {} baud",
            config.serial.target_baud
        ),
    }

    Ok(())
}

// SPDX-License-Identifier: Apache-2.0

mod config;
mod crypt;
mod info;
mod selftest;

use crate::backend::{Backend, Relay, BACKENDS};
use crate::config::Config;

use std::ops::Deref;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use cryptoport::cipher::Operation;
use log::info;

/// Paravirtualized crypto device relay
///
/// vcryptodev relays cryptodev operations from a guest-side client to a
/// host-side device through flat lists of readable and writable segments.
#[derive(Parser, Debug)]
#[clap(version)]
pub struct Options {
    /// Logging options
    #[clap(flatten)]
    logger: LogOptions,

    /// Subcommands (with their own options)
    #[clap(subcommand)]
    cmd: Subcommands,
}

impl Options {
    pub fn execute(self) -> anyhow::Result<()> {
        self.logger.init();

        info!("logging initialized!");
        info!("CLI opts: {:?}", self);

        self.cmd.dispatch()
    }
}

/// `vcryptodev` subcommands and their options/arguments.
#[derive(Subcommand, Debug)]
enum Subcommands {
    Info(info::Options),
    Selftest(selftest::Options),
    Encrypt(crypt::Options),
    Decrypt(crypt::Options),
    #[clap(subcommand)]
    Config(config::Subcommands),
}

impl Subcommands {
    fn dispatch(self) -> anyhow::Result<()> {
        match self {
            Self::Info(cmd) => cmd.execute(),
            Self::Selftest(cmd) => cmd.execute(),
            Self::Encrypt(cmd) => cmd.execute(Operation::Encrypt),
            Self::Decrypt(cmd) => cmd.execute(Operation::Decrypt),
            Self::Config(subcmd) => subcmd.dispatch(),
        }
    }
}

/// Common backend and relay options
#[derive(Args, Debug)]
pub struct BackendOptions {
    /// Set which backend to use
    #[clap(long, env = "VCRYPTODEV_BACKEND")]
    backend: Option<String>,

    /// Relay configuration file
    #[clap(long, env = "VCRYPTODEV_CONFIG")]
    config: Option<PathBuf>,

    /// Bound on the wait for each request, in milliseconds
    #[clap(long)]
    timeout_ms: Option<u64>,
}

impl BackendOptions {
    /// Loads the configuration file, if any, and applies the command line overrides.
    pub fn config(&self) -> anyhow::Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load(path)?,
            None => Config::default(),
        };
        if self.backend.is_some() {
            config.backend = self.backend.clone();
        }
        if self.timeout_ms.is_some() {
            config.timeout_ms = self.timeout_ms;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn pick(&self, config: &Config) -> anyhow::Result<&dyn Backend> {
        if let Some(ref name) = config.backend {
            BACKENDS
                .deref()
                .iter()
                .find(|b| b.have() && b.name() == name)
                .ok_or_else(|| anyhow!("Backend {:?} is unsupported.", name))
        } else {
            BACKENDS.deref().iter().find(|b| b.have()).ok_or_else(|| {
                anyhow!("No supported backend found. Please check your machine with `$ vcryptodev info`.")
            })
        }
        .map(|b| &**b)
    }

    /// Starts the relay described by these options.
    pub fn relay(&self) -> anyhow::Result<Relay> {
        let config = self.config()?;
        let backend = self.pick(&config)?;
        info!("using {} backend", backend.name());
        backend.relay(config.devices, config.channel_options())
    }
}

/// Common logging / output options
#[derive(Args, Debug)]
pub struct LogOptions {
    /// Increase log verbosity. Pass multiple times for more log output.
    ///
    /// By default we only show error messages. Passing `-v` will show warnings,
    /// `-vv` adds info, `-vvv` for debug, and `-vvvv` for trace.
    #[clap(long = "verbose", short = 'v', action = ArgAction::Count)]
    verbosity: u8,

    /// Set fancier logging filters.
    ///
    /// This is equivalent to the `RUST_LOG` environment variable.
    /// For more info, see the `env_logger` crate documentation.
    #[clap(long = "log-filter", env = "VCRYPTODEV_LOG")]
    log_filter: Option<String>,

    /// Set log output target ("stderr", "stdout")
    #[clap(long, default_value = "stderr")]
    log_target: LogTarget,
}

impl LogOptions {
    /// Build & initialize a global logger using env_logger::Builder.
    /// As with Builder::init(), this will panic if called more than once,
    /// or if another library has already initialized a global logger.
    pub fn init(&self) {
        let mut builder = env_logger::Builder::new();
        builder
            .filter_level(self.verbosity_level())
            .parse_filters(self.log_filter.as_deref().unwrap_or_default())
            .target(self.log_target.into())
            .init();
    }

    /// Convert the -vvv.. count into a log level.
    fn verbosity_level(&self) -> log::LevelFilter {
        match self.verbosity {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// Represents targets for debug logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
enum LogTarget {
    Stdout,
    Stderr,
}

/// Convert a str to a LogTarget. This is how Clap parses CLI args.
impl FromStr for LogTarget {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            _ => Err(anyhow!("unknown log target {:?}", s)),
        }
    }
}

/// Convert our LogTarget to env_logger's Target
impl From<LogTarget> for env_logger::Target {
    fn from(t: LogTarget) -> Self {
        match t {
            LogTarget::Stdout => Self::Stdout,
            LogTarget::Stderr => Self::Stderr,
        }
    }
}

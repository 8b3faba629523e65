//! The `-v`/`-q` flag group.
//!
//! By default warnings and errors are shown. Every `-v` adds a level
//! (`-v` info, which includes progress lines, `-vv` debug, `-vvv` trace),
//! every `-q` removes one (`-q` errors only, `-qq` nothing).

use std::fmt;

use log::LevelFilter;
use serde::Deserialize;

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// More output per occurrence
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet",
    )]
    verbose: u8,

    /// Less output per occurrence
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose",
    )]
    quiet: u8,
}

impl Verbosity {
    /// The most detailed level which is logged
    pub(crate) fn log_level_filter(&self) -> LevelFilter {
        match self.level() {
            i16::MIN..=-1 => LevelFilter::Off,
            0 => LevelFilter::Error,
            1 => LevelFilter::Warn,
            2 => LevelFilter::Info,
            3 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn level(&self) -> i16 {
        level_value(LevelFilter::Warn) - i16::from(self.quiet) + i16::from(self.verbose)
    }
}

const fn level_value(level: LevelFilter) -> i16 {
    match level {
        LevelFilter::Off => -1,
        LevelFilter::Error => 0,
        LevelFilter::Warn => 1,
        LevelFilter::Info => 2,
        LevelFilter::Debug => 3,
        LevelFilter::Trace => 4,
    }
}

// In the configuration file the level is given by name, e.g. "info"
impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let level = match s.to_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            level => {
                return Err(serde::de::Error::custom(format!(
                    "invalid log level `{level}`"
                )));
            }
        };

        let offset = level_value(level) - level_value(LevelFilter::Warn);
        let steps = u8::try_from(offset.unsigned_abs()).unwrap_or(u8::MAX);
        Ok(if offset < 0 {
            Verbosity {
                verbose: 0,
                quiet: steps,
            }
        } else {
            Verbosity {
                verbose: steps,
                quiet: 0,
            }
        })
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log_level_filter())
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use rstest::rstest;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[clap(flatten)]
        verbose: Verbosity,
    }

    #[test]
    fn verify_app() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case(&[], LevelFilter::Warn)]
    #[case(&["-v"], LevelFilter::Info)]
    #[case(&["-vv"], LevelFilter::Debug)]
    #[case(&["-vvvvv"], LevelFilter::Trace)]
    #[case(&["-q"], LevelFilter::Error)]
    #[case(&["-qq"], LevelFilter::Off)]
    #[case(&["-qqqq"], LevelFilter::Off)]
    fn test_flags(#[case] args: &[&str], #[case] expected: LevelFilter) {
        let cli = Cli::try_parse_from(std::iter::once("fastbio").chain(args.iter().copied()))
            .unwrap();
        assert_eq!(cli.verbose.log_level_filter(), expected);
    }

    #[rstest]
    #[case("off", LevelFilter::Off)]
    #[case("Error", LevelFilter::Error)]
    #[case("warning", LevelFilter::Warn)]
    #[case("INFO", LevelFilter::Info)]
    #[case("trace", LevelFilter::Trace)]
    fn test_deserialize(#[case] name: &str, #[case] expected: LevelFilter) {
        let verbosity: Verbosity = serde_json::from_value(serde_json::json!(name)).unwrap();
        assert_eq!(verbosity.log_level_filter(), expected);
    }

    #[test]
    fn test_deserialize_invalid_level() {
        let result: Result<Verbosity, _> = serde_json::from_value(serde_json::json!("loud"));
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_conflict() {
        assert!(Cli::try_parse_from(["fastbio", "-v", "-q"]).is_err());
    }
}

use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand, builder::TypedValueParser};
use const_format::{concatcp, formatcp};
use fastbio_lib::{
    DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_RETRIES,
    ratelimit::{DEFAULT_PERIOD, DEFAULT_REQUESTS_PER_SECOND},
    transport::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT},
};
use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::{fs, path::PathBuf, str::FromStr, time::Duration};
use strum::{Display, EnumString, VariantNames};

pub(crate) const FASTBIO_CONFIG_FILE: &str = "fastbio.toml";

const DEFAULT_RETRY_WAIT: &str = "1s";

// this exists because clap requires `&str` type values for defaults
// whereas serde expects owned `String` types
const MAX_CONCURRENCY_STR: &str = concatcp!(DEFAULT_MAX_CONCURRENCY);
const MAX_RETRIES_STR: &str = concatcp!(DEFAULT_MAX_RETRIES);
const REQUESTS_PER_SECOND_STR: &str = concatcp!(DEFAULT_REQUESTS_PER_SECOND);
const TIMEOUT_STR: &str = formatcp!("{}s", DEFAULT_TIMEOUT.as_secs());
const PERIOD_STR: &str = formatcp!("{}s", DEFAULT_PERIOD.as_secs());
// Shown in the help text, but the config file must be able to tell whether
// the user has passed a value, so there is no clap default.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    FASTBIO_CONFIG_FILE,
);

/// How payloads are written to standard output
#[derive(
    Debug, Deserialize, Default, Clone, Copy, Display, EnumString, VariantNames, PartialEq, Eq,
)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub(crate) enum OutputFormat {
    /// The payloads as they came from the service, one after another.
    /// Failed requests are reported on standard error.
    #[default]
    Raw,

    /// One JSON document with the outcome of every request and the
    /// request statistics.
    Json,
}

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    max_concurrency: usize = DEFAULT_MAX_CONCURRENCY;
    max_retries: u64 = DEFAULT_MAX_RETRIES;
    requests_per_second: u32 = DEFAULT_REQUESTS_PER_SECOND;
    period: Duration = DEFAULT_PERIOD;
    retry_wait: Duration = fastbio_lib::DEFAULT_RETRY_WAIT;
    timeout: Duration = DEFAULT_TIMEOUT;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Parse a single header into a [`HeaderName`] and [`HeaderValue`]
///
/// Headers are expected to be in format `Header-Name: Header-Value`.
/// The header name and value are trimmed of whitespace.
///
/// If the header contains multiple colons, the part after the first colon is
/// considered the value.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    match header.split_once(':') {
        Some((name, value)) => {
            let name = name.trim();
            let name = HeaderName::from_str(name)
                .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
            Ok((name, value))
        }
        None => Err(anyhow!(
            "Invalid header format. Expected colon-separated string in the format 'HeaderName: HeaderValue'"
        )),
    }
}

/// Parses a single HTTP header into a tuple of (String, String)
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let invalid =
            |message: String| clap::Error::raw(clap::error::ErrorKind::InvalidValue, message);

        let header = value
            .to_str()
            .ok_or_else(|| invalid("Header contains invalid UTF-8".to_string()))?;
        let (name, value) = parse_single_header(header).map_err(|e| invalid(e.to_string()))?;
        let value = value
            .to_str()
            .map_err(|_| invalid("Header value contains invalid UTF-8".to_string()))?;

        Ok((name.to_string(), value.to_string()))
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Extension trait for converting a Vec of header pairs to a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Convert a collection of header key-value pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value '{value}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// fastbio sends batches of requests to the REST APIs of biological
/// databases, with a per-service rate limit and an on-disk response cache.
///
/// Repeated requests are answered from the cache without touching the network.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct FastbioOptions {
    /// Configuration file to use
    #[arg(short, long = "config", global = true)]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Fetch one or more URLs
    Get(GetArgs),

    /// Send one or more bodies to a URL, one request per body
    Post(PostArgs),

    /// Inspect or empty the response cache
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheCommand {
    /// Delete all cached responses
    Clear,
    /// Print the cache directory
    Path,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct GetArgs {
    /// URLs to fetch. Relative URLs are appended to `--base-url`.
    #[arg(required = true)]
    pub(crate) urls: Vec<String>,

    #[clap(flatten)]
    pub(crate) request: RequestArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct PostArgs {
    /// URL to send the bodies to. A relative URL is appended to `--base-url`.
    pub(crate) url: String,

    /// Request body, may be given many times
    #[arg(long, value_name = "BODY", required_unless_present = "body_file")]
    pub(crate) body: Vec<String>,

    /// Read a request body from a file, may be given many times
    #[arg(long, value_name = "PATH")]
    pub(crate) body_file: Vec<PathBuf>,

    #[clap(flatten)]
    pub(crate) request: RequestArgs,
}

impl PostArgs {
    /// All bodies, inline ones first
    pub(crate) fn bodies(&self) -> Result<Vec<Vec<u8>>> {
        let mut bodies: Vec<Vec<u8>> = self.body.iter().map(|b| b.clone().into_bytes()).collect();
        for path in &self.body_file {
            let body = fs::read(path)
                .with_context(|| format!("Cannot read request body from `{}`", path.display()))?;
            bodies.push(body);
        }
        Ok(bodies)
    }
}

/// Options of a single `get` or `post` call
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct RequestArgs {
    /// Fetch from the network even if a response is cached,
    /// and do not cache the new responses
    #[arg(long)]
    pub(crate) refresh: bool,

    /// Output format
    #[arg(
        short,
        long,
        default_value = "raw",
        value_parser = PossibleValuesParser::new(OutputFormat::VARIANTS).map(|s| s.parse::<OutputFormat>().unwrap())
    )]
    pub(crate) format: OutputFormat,

    /// Repeat the whole batch up to N times, bypassing the cache, while
    /// every response is empty
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub(crate) retry_empty: u64,
}

// Custom deserializer function for the header field
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// The configuration shared by all commands.
///
/// Every option can also be set in the configuration file, where the
/// command line takes precedence.
#[allow(clippy::struct_excessive_bools)]
#[derive(Args, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Prefix of relative URLs
    #[arg(short, long, global = true)]
    #[serde(default)]
    pub(crate) base_url: Option<String>,

    /// Name of the service, used to share its rate limit.
    /// Defaults to the host of the base URL.
    #[arg(long, global = true, verbatim_doc_comment)]
    #[serde(default)]
    pub(crate) service: Option<String>,

    /// Maximum number of network requests per period
    #[arg(long = "rps", global = true, default_value = REQUESTS_PER_SECOND_STR)]
    #[serde(default = "requests_per_second")]
    pub(crate) requests_per_second: u32,

    /// Length of the rate limiting window, e.g. `1s` or `500ms`
    #[arg(long, global = true, value_parser = humantime::parse_duration, default_value = PERIOD_STR)]
    #[serde(default = "period", with = "humantime_serde")]
    pub(crate) period: Duration,

    /// Maximum number of concurrent network requests
    #[arg(long, global = true, default_value = MAX_CONCURRENCY_STR)]
    #[serde(default = "max_concurrency")]
    pub(crate) max_concurrency: usize,

    /// Retries of a request after a timeout, a `429` or a `5xx` response
    #[arg(long, global = true, default_value = MAX_RETRIES_STR)]
    #[serde(default = "max_retries")]
    pub(crate) max_retries: u64,

    /// Wait before the first retry, doubled for every further one
    #[arg(long, global = true, value_parser = humantime::parse_duration, default_value = DEFAULT_RETRY_WAIT)]
    #[serde(default = "retry_wait", with = "humantime_serde")]
    pub(crate) retry_wait: Duration,

    /// Do not read or write the response cache
    #[arg(long, global = true)]
    #[serde(default)]
    pub(crate) no_cache: bool,

    /// Directory of the response cache.
    /// Defaults to `fastbio` below the platform's cache directory.
    #[arg(long, global = true, value_name = "DIR", verbatim_doc_comment)]
    #[serde(default)]
    pub(crate) cache_dir: Option<PathBuf>,

    /// Fetch cached responses older than this again, e.g. `7d`.
    /// By default cached responses never expire.
    #[arg(long, global = true, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) max_cache_age: Option<Duration>,

    /// Total time a single request may take
    #[arg(short, long, global = true, value_parser = humantime::parse_duration, default_value = TIMEOUT_STR)]
    #[serde(default = "timeout", with = "humantime_serde")]
    pub(crate) timeout: Duration,

    /// User agent
    #[arg(short, long, global = true, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Custom request header, e.g. `-H 'Accept: application/json'`
    #[arg(
        short = 'H',
        long = "header",
        global = true,
        action = clap::ArgAction::Append,
        value_parser = HeaderParser,
        value_name = "HEADER:VALUE"
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,
}

impl Config {
    /// Special handling for merging headers
    ///
    /// Adds the headers of `other` unless `self` has a header of the same
    /// name. Header names are compared case-insensitively.
    fn merge_headers(&mut self, other: &[(String, String)]) {
        let normalized = |headers: &[(String, String)]| {
            headers
                .iter()
                .map(|(name, value)| (name.to_lowercase(), value.clone()))
                .collect::<Vec<_>>()
        };

        let merged_map: HashMap<_, _> = normalized(other)
            .into_iter()
            .chain(normalized(&self.header))
            .collect();

        self.header = merged_map.into_iter().collect();
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        self.merge_headers(&toml.header);

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..header,

                // Keys with defaults to assign
                base_url: None,
                cache_dir: None,
                max_cache_age: None,
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                max_retries: DEFAULT_MAX_RETRIES,
                no_cache: false,
                period: DEFAULT_PERIOD,
                requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
                retry_wait: fastbio_lib::DEFAULT_RETRY_WAIT,
                service: None,
                timeout: DEFAULT_TIMEOUT,
                user_agent: DEFAULT_USER_AGENT,
                verbose: Verbosity::default(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(args: &[&str]) -> FastbioOptions {
        FastbioOptions::try_parse_from(std::iter::once("fastbio").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_parse_custom_headers() {
        assert_eq!(
            parse_single_header("accept:application/json").unwrap(),
            (
                HeaderName::from_static("accept"),
                HeaderValue::from_static("application/json")
            )
        );
        assert_eq!(
            parse_single_header("X-Forwarded-For: a:b").unwrap(),
            (
                HeaderName::from_static("x-forwarded-for"),
                HeaderValue::from_static("a:b")
            )
        );
        assert!(parse_single_header("no colon").is_err());
    }

    #[test]
    fn test_cli_defaults_match_config_defaults() {
        let options = parse(&["get", "https://x/y"]);
        let from_file: Config = toml::from_str("").unwrap();

        assert_eq!(options.config.requests_per_second, from_file.requests_per_second);
        assert_eq!(options.config.period, from_file.period);
        assert_eq!(options.config.max_concurrency, from_file.max_concurrency);
        assert_eq!(options.config.max_retries, from_file.max_retries);
        assert_eq!(options.config.retry_wait, from_file.retry_wait);
        assert_eq!(options.config.timeout, from_file.timeout);
        assert_eq!(options.config.user_agent, from_file.user_agent);
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let options = parse(&[
            "get",
            "/gene/1017",
            "--base-url",
            "https://mygene.info/v3",
            "--rps",
            "10",
            "-H",
            "Accept: application/json",
            "--refresh",
            "--format",
            "json",
        ]);

        assert_eq!(options.config.base_url.as_deref(), Some("https://mygene.info/v3"));
        assert_eq!(options.config.requests_per_second, 10);
        assert_eq!(
            options.config.header,
            vec![("accept".to_string(), "application/json".to_string())]
        );
        match options.command {
            Command::Get(args) => {
                assert_eq!(args.urls, vec!["/gene/1017"]);
                assert!(args.request.refresh);
                assert_eq!(args.request.format, OutputFormat::Json);
            }
            command => panic!("unexpected command: {command:?}"),
        }
    }

    #[test]
    fn test_post_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("query.json");
        fs::write(&file, br#"{"ids":"1017"}"#).unwrap();

        let options = parse(&[
            "post",
            "/v3/gene",
            "--body",
            "q=1",
            "--body-file",
            file.to_str().unwrap(),
        ]);
        let Command::Post(args) = options.command else {
            panic!("expected post command");
        };
        assert_eq!(
            args.bodies().unwrap(),
            vec![b"q=1".to_vec(), br#"{"ids":"1017"}"#.to_vec()]
        );
    }

    #[test]
    fn test_post_requires_a_body() {
        let result = FastbioOptions::try_parse_from(["fastbio", "post", "https://x/y"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_prefers_cli_values() {
        let mut options = parse(&["--rps", "3", "-H", "Accept: text/plain", "cache", "path"]);
        let toml: Config = toml::from_str(
            r#"
            requests_per_second = 20
            max_concurrency = 4
            base_url = "https://rest.ensembl.org"
            period = "2s"
            max_cache_age = "7d"
            verbose = "debug"

            [header]
            Accept = "application/json"
            X-Api-Key = "secret"
            "#,
        )
        .unwrap();

        options.config.merge(toml);
        let config = options.config;

        assert_eq!(config.requests_per_second, 3);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.base_url.as_deref(), Some("https://rest.ensembl.org"));
        assert_eq!(config.period, Duration::from_secs(2));
        assert_eq!(config.max_cache_age, Some(Duration::from_secs(7 * 24 * 60 * 60)));
        assert_eq!(config.verbose.log_level_filter(), log::LevelFilter::Debug);

        let headers = HeaderMap::from_header_pairs(&config.header).unwrap();
        assert_eq!(headers["accept"], "text/plain");
        assert_eq!(headers["x-api-key"], "secret");
    }

    #[test]
    fn test_unknown_config_keys_are_rejected() {
        let result: Result<Config, _> = toml::from_str("requests_per_minute = 5");
        assert!(result.is_err());
    }
}

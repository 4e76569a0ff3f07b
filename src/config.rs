use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_OUTPUT: &str = "extractedoutput.jl";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; InfocardExtractor/1.0)";

pub const DEFAULT_URLS: &[&str] = &[
    "https://en.wikipedia.org/wiki/Robotics",
    "https://en.wikipedia.org/wiki/Robot",
    "https://en.wikipedia.org/wiki/Reinforcement_learning",
    "https://en.wikipedia.org/wiki/Robot_Operating_System",
    "https://en.wikipedia.org/wiki/Intelligent_agent",
    "https://en.wikipedia.org/wiki/Software_agent",
    "https://en.wikipedia.org/wiki/Robotic_process_automation",
    "https://en.wikipedia.org/wiki/Chatbot",
    "https://en.wikipedia.org/wiki/Applications_of_artificial_intelligence",
    "https://en.wikipedia.org/wiki/Android_(robot)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExtractionMode {
    /// Title, organization name, info card and body paragraphs
    #[default]
    Full,
    /// Plain text of the document body only
    Text,
}

#[derive(Debug, Parser)]
#[command(
    name = "infocard",
    about = "Fetch web documents and write one extracted JSON record per line"
)]
pub struct Args {
    /// URLs to fetch (defaults to the built-in article list)
    pub urls: Vec<String>,

    /// File with one URL per line; blank lines and `#` comments are ignored
    #[arg(long, env = "INFOCARD_URLS_FILE")]
    pub urls_file: Option<PathBuf>,

    /// JSON-lines output file, appended to
    #[arg(short, long, env = "INFOCARD_OUTPUT", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    #[arg(long, value_enum, env = "INFOCARD_MODE", default_value_t = ExtractionMode::Full)]
    pub mode: ExtractionMode,

    /// Per-request timeout in seconds
    #[arg(long, env = "INFOCARD_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Documents fetched at once (defaults to the number of CPUs)
    #[arg(short = 'j', long, env = "INFOCARD_CONCURRENCY")]
    pub concurrency: Option<usize>,

    #[arg(long, env = "INFOCARD_MAX_RESPONSE_BYTES", default_value_t = DEFAULT_MAX_RESPONSE_SIZE)]
    pub max_response_bytes: usize,

    #[arg(long, env = "INFOCARD_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("unsupported URL scheme {scheme:?} in {url}")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("failed to read URL file {}: {source}", .path.display())]
    UrlsFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// An absolute http(s) URL to fetch once per run.
///
/// Reports and logs use the URL as it was given; requests use the parsed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    raw: String,
    url: Url,
}

impl CrawlTarget {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let url = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::UnsupportedScheme {
                url: raw.to_string(),
                scheme: url.scheme().to_string(),
            });
        }
        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for CrawlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub targets: Vec<CrawlTarget>,
    pub output: PathBuf,
    pub mode: ExtractionMode,
    pub timeout: Duration,
    pub concurrency: usize,
    pub max_response_size: usize,
    pub user_agent: String,
}

impl CrawlConfig {
    /// Config for the given targets and output path, everything else default.
    pub fn new(targets: Vec<CrawlTarget>, output: impl Into<PathBuf>) -> Self {
        Self {
            targets,
            output: output.into(),
            mode: ExtractionMode::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: num_cpus::get(),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl TryFrom<Args> for CrawlConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let mut raw = args.urls;
        if let Some(path) = &args.urls_file {
            raw.extend(read_urls_file(path)?);
        }

        let targets = if raw.is_empty() {
            parse_targets(DEFAULT_URLS.iter().copied())?
        } else {
            parse_targets(raw.iter().map(String::as_str))?
        };

        let concurrency = args.concurrency.unwrap_or_else(num_cpus::get);
        if concurrency == 0 {
            return Err(ConfigError::Zero("concurrency"));
        }
        if args.timeout_secs == 0 {
            return Err(ConfigError::Zero("timeout"));
        }
        if args.max_response_bytes == 0 {
            return Err(ConfigError::Zero("max response size"));
        }

        Ok(Self {
            targets,
            output: args.output,
            mode: args.mode,
            timeout: Duration::from_secs(args.timeout_secs),
            concurrency,
            max_response_size: args.max_response_bytes,
            user_agent: args.user_agent,
        })
    }
}

pub fn parse_targets<'a>(
    urls: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<CrawlTarget>, ConfigError> {
    urls.into_iter().map(CrawlTarget::parse).collect()
}

fn read_urls_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::UrlsFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_url_lines(&contents))
}

fn parse_url_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    domain::{BotIdentity, ServerAddr, TargetChannel},
    errors::Error,
    framing::DEFAULT_MAX_LINE_LEN,
    sink::{RecordFormat, DEFAULT_SINK_QUEUE},
    Result,
};

pub const DEFAULT_SERVER: &str = "irc.freenode.net";
pub const DEFAULT_PORT: u16 = 8001;

/// Typed configuration, read once at startup and shared read-only.
#[derive(Clone, Debug)]
pub struct Config {
    // Relay
    pub server: ServerAddr,
    pub channel: TargetChannel,
    pub identity: BotIdentity,
    pub quit_message: String,

    // Transcript
    pub log_path: PathBuf,
    pub log_format: RecordFormat,
    /// Records allowed to wait for the disk before new ones are dropped.
    pub sink_queue: usize,

    // Connection tuning
    pub max_line_len: usize,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl Config {
    /// Load from the process environment (and `.env` if present).
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_lookup(|key| env::var(key).ok())?;

        if let Some(parent) = cfg.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(cfg)
    }

    /// Build from an arbitrary key lookup; `load()` passes the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required
        let channel = get("CHANLOG_CHANNEL").ok_or_else(|| {
            Error::Config("CHANLOG_CHANNEL environment variable is required".to_string())
        })?;
        let nick = get("CHANLOG_NICK").ok_or_else(|| {
            Error::Config("CHANLOG_NICK environment variable is required".to_string())
        })?;

        let host = get("CHANLOG_SERVER").unwrap_or_else(|| DEFAULT_SERVER.to_string());
        let port = parse_or("CHANLOG_PORT", get("CHANLOG_PORT"), DEFAULT_PORT)?;

        let realname =
            get("CHANLOG_REALNAME").unwrap_or_else(|| "chanlog transcript bot".to_string());
        let mut identity = BotIdentity::new(nick, realname)?;
        if let Some(password) = get("CHANLOG_NICKSERV_PASSWORD") {
            identity = identity.with_nickserv_password(password);
        }

        let quit_message = get("CHANLOG_QUIT_MESSAGE").unwrap_or_else(|| "bye!".to_string());

        let log_path = PathBuf::from(get("CHANLOG_LOG_PATH").unwrap_or("irc_messages".to_string()));
        let log_format = if parse_bool("CHANLOG_LOG_JSON", get("CHANLOG_LOG_JSON"), false)? {
            RecordFormat::Json
        } else {
            RecordFormat::Html
        };
        let sink_queue = parse_or(
            "CHANLOG_SINK_QUEUE",
            get("CHANLOG_SINK_QUEUE"),
            DEFAULT_SINK_QUEUE,
        )?;
        if sink_queue == 0 {
            return Err(Error::Config("CHANLOG_SINK_QUEUE must be positive".to_string()));
        }

        let max_line_len = parse_or(
            "CHANLOG_MAX_LINE_BYTES",
            get("CHANLOG_MAX_LINE_BYTES"),
            DEFAULT_MAX_LINE_LEN,
        )?;
        if max_line_len < 512 {
            return Err(Error::Config(
                "CHANLOG_MAX_LINE_BYTES must be at least 512".to_string(),
            ));
        }

        let secs = |key: &str, default: u64| -> Result<Duration> {
            Ok(Duration::from_secs(parse_or(key, get(key), default)?))
        };
        let connect_timeout = secs("CHANLOG_CONNECT_TIMEOUT_SECS", 30)?;
        let idle_timeout = secs("CHANLOG_IDLE_TIMEOUT_SECS", 300)?;
        let write_timeout = secs("CHANLOG_WRITE_TIMEOUT_SECS", 10)?;
        let reconnect_max = secs("CHANLOG_RECONNECT_MAX_SECS", 300)?;
        let reconnect_initial = Duration::from_millis(parse_or(
            "CHANLOG_RECONNECT_INITIAL_MS",
            get("CHANLOG_RECONNECT_INITIAL_MS"),
            1000,
        )?);

        Ok(Self {
            server: ServerAddr::new(host, port),
            channel: TargetChannel::new(channel)?,
            identity,
            quit_message,
            log_path,
            log_format,
            sink_queue,
            max_line_len,
            connect_timeout,
            idle_timeout,
            write_timeout,
            reconnect_initial,
            reconnect_max,
        })
    }
}

/// Export `KEY=value` pairs from a dotenv file. Variables already present in
/// the environment keep their value.
fn load_dotenv_if_present(path: &Path) {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return,
    };
    for (key, value) in dotenv_pairs(&contents) {
        if env::var_os(key).is_none() {
            env::set_var(key, value);
        }
    }
}

/// Assignments of a dotenv file in order. Comments, blank lines and lines
/// without `=` are ignored; an optional `export ` prefix is accepted.
fn dotenv_pairs(contents: &str) -> Vec<(&str, &str)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| {
            let l = l.strip_prefix("export ").unwrap_or(l);
            let (key, value) = l.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key, unquote(value.trim())))
        })
        .collect()
}

fn unquote(v: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = v.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    v
}

fn parse_bool(key: &str, v: Option<String>, default: bool) -> Result<bool> {
    let Some(s) = v else {
        return Ok(default);
    };
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{key} must be a boolean, got {s:?}"))),
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, v: Option<String>, default: T) -> Result<T> {
    match v {
        None => Ok(default),
        Some(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {s:?}"))),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

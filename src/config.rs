//! Environment-driven configuration

use crate::actions::ActionRegistry;
use crate::assistants::openai::DEFAULT_BASE_URL;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(DEFAULT_POLL_INTERVAL_MS);
pub const DEFAULT_MAX_POLLS: u32 = 150;
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// Demo flavor: which thread key is used and which actions are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Plain chat, no client-side actions
    Plain,
    /// Chat with the color actions enabled
    #[default]
    Actions,
}

impl Profile {
    /// Key under which the thread id is persisted
    pub fn storage_key(self) -> &'static str {
        match self {
            Profile::Plain => "thread_id",
            Profile::Actions => "thread_id_actions_demo",
        }
    }

    pub fn default_assistant_id(self) -> &'static str {
        match self {
            Profile::Plain => "asst_saKSiiL3YTFxDFY83nGcufXX",
            Profile::Actions => "asst_x2Ge4RPdABFgbFUwLWKHZX1V",
        }
    }

    pub fn registry(self) -> ActionRegistry {
        match self {
            Profile::Plain => ActionRegistry::empty(),
            Profile::Actions => ActionRegistry::colors(),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(Profile::Plain),
            "actions" => Ok(Profile::Actions),
            other => Err(format!("unknown profile '{other}'")),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Profile::Plain => "plain",
            Profile::Actions => "actions",
        })
    }
}

/// Run-relevant settings handed to the session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub assistant_id: String,
    pub instructions: String,
    pub poll_interval: Duration,
    /// `None` polls until the run settles
    pub max_polls: Option<u32>,
    /// `None` waits forever
    pub run_timeout: Option<Duration>,
    pub storage_key: String,
    pub registry: ActionRegistry,
}

impl SessionConfig {
    /// Defaults for a profile
    pub fn for_profile(profile: Profile) -> Self {
        Self {
            assistant_id: profile.default_assistant_id().to_string(),
            instructions: String::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: Some(DEFAULT_MAX_POLLS),
            run_timeout: Some(DEFAULT_RUN_TIMEOUT),
            storage_key: profile.storage_key().to_string(),
            registry: profile.registry(),
        }
    }
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub profile: Profile,
    pub db_path: PathBuf,
    pub log_json: bool,
    pub session: SessionConfig,
    /// Problems found while reading the environment. Collected rather than
    /// logged because configuration is read before the subscriber exists.
    pub warnings: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut warnings = Vec::new();

        let profile = var("ASSISTANT_PROFILE")
            .map_or(Ok(Profile::default()), |v| v.parse())
            .unwrap_or_else(|e| {
                warnings.push(format!("Invalid ASSISTANT_PROFILE ({e}), using default"));
                Profile::default()
            });

        let mut session = SessionConfig::for_profile(profile);
        if let Some(id) = var("ASSISTANT_ID") {
            session.assistant_id = id;
        }
        let interval_ms = parse_or(
            "ASSISTANT_POLL_INTERVAL_MS",
            var("ASSISTANT_POLL_INTERVAL_MS"),
            DEFAULT_POLL_INTERVAL_MS,
            &mut warnings,
        );
        session.poll_interval = Duration::from_millis(interval_ms);
        session.max_polls = non_zero(parse_or(
            "ASSISTANT_MAX_POLLS",
            var("ASSISTANT_MAX_POLLS"),
            DEFAULT_MAX_POLLS,
            &mut warnings,
        ));
        session.run_timeout = non_zero(parse_or(
            "ASSISTANT_RUN_TIMEOUT_SECS",
            var("ASSISTANT_RUN_TIMEOUT_SECS"),
            DEFAULT_RUN_TIMEOUT.as_secs(),
            &mut warnings,
        ))
        .map(Duration::from_secs);

        let db_path = var("ASSISTANT_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".assistant-runner").join("state.db")
            },
            PathBuf::from,
        );

        Self {
            api_key: var("OPENAI_API_KEY"),
            base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            profile,
            db_path,
            log_json: var("ASSISTANT_LOG_JSON").is_some_and(|v| v == "1" || v == "true"),
            session,
            warnings,
        }
    }
}

fn parse_or<T: FromStr + Copy + fmt::Display>(
    name: &str,
    value: Option<String>,
    default: T,
    warnings: &mut Vec<String>,
) -> T {
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warnings.push(format!("Unparsable {name}={raw:?}, using default {default}"));
            default
        }),
    }
}

/// Zero means unbounded
fn non_zero<T: Default + PartialEq>(value: T) -> Option<T> {
    (value != T::default()).then_some(value)
}

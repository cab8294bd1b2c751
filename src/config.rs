use {
    std::path::{
        Path,
        PathBuf,
    },
    lazy_regex::{
        regex_captures,
        regex_is_match,
    },
    crate::{
        Args,
        prelude::*,
        reddit::{
            Game,
            PostId,
        },
    },
};
#[cfg(unix)] use xdg::BaseDirectories;

const CONFIG_FILE_NAME: &str = "upset-thread.json";

/// Shortest poll interval accepted, so the post doesn't claim to update every 0 minutes.
const MIN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Io(#[from] std::io::Error),
    #[error("failed to parse config file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("missing config file upset-thread.json")]
    Missing,
    #[error("invalid {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
    },
}

/// Credentials, read from a JSON file.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Config {
    /// start.gg API token
    pub(crate) startgg: String,
    pub(crate) reddit: ConfigReddit,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConfigReddit {
    #[serde(rename = "clientID")]
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) username: String,
    pub(crate) password: String,
    /// Where new posts are submitted, without the `r/` prefix.
    pub(crate) subreddit: String,
    #[serde(default)]
    pub(crate) user_agent: Option<String>,
}

impl Config {
    pub(crate) async fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = match path {
            Some(path) => path.to_owned(),
            None => Self::default_path().ok_or(Error::Missing)?,
        };
        let buf = tokio::fs::read(&path).await?;
        serde_json::from_slice(&buf).map_err(|source| Error::Json { path, source })
    }

    #[cfg(unix)]
    fn default_path() -> Option<PathBuf> {
        BaseDirectories::new().find_config_file(CONFIG_FILE_NAME)
    }

    #[cfg(windows)]
    fn default_path() -> Option<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "upset-thread")?;
        let path = dirs.config_dir().join(CONFIG_FILE_NAME);
        path.exists().then_some(path)
    }
}

/// Operator choices for one run, validated before anything is fetched.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    /// Of the form `tournament/<tournament>/event/<event>`.
    pub(crate) event_slug: String,
    pub(crate) rules: Rules,
    pub(crate) interval: Duration,
    pub(crate) game: Option<Game>,
    /// Existing post to keep editing instead of creating a new one.
    pub(crate) post: Option<PostId>,
    /// Initial watermark. Sets updated before this are never fetched.
    pub(crate) since: DateTime<Utc>,
}

fn invalid(field: &'static str, reason: impl ToString) -> Error {
    Error::Validation { field, reason: reason.to_string() }
}

/// Accepts an event slug or a link to any page of the event.
fn parse_event_slug(input: &str) -> Option<String> {
    let input = input.trim();
    if let Some((_, slug)) = regex_captures!(r"^(?:https?://)?(?:www\.)?(?:start|smash)\.gg/(tournament/[^/?#]+/event/[^/?#]+)(?:[/?#].*)?$", input) {
        Some(slug.to_owned())
    } else if regex_is_match!("^tournament/[^/?#]+/event/[^/?#]+$", input) {
        Some(input.to_owned())
    } else {
        None
    }
}

impl Settings {
    pub(crate) fn from_args(args: &Args) -> Result<Self, Error> {
        let event_slug = parse_event_slug(&args.event)
            .ok_or_else(|| invalid("event", format!("{:?} is neither an event slug (tournament/<name>/event/<name>) nor a start.gg event link", args.event)))?;
        if args.differential == 0 { return Err(invalid("differential", "must be at least 1")) }
        if args.cutoff == 0 { return Err(invalid("cutoff", "must be at least 1")) }
        let interval = Duration::from_secs(args.interval);
        if interval < MIN_INTERVAL { return Err(invalid("interval", format!("must be at least {} seconds", MIN_INTERVAL.as_secs()))) }
        let post = args.post.as_deref()
            .map(|post| PostId::parse(post).ok_or_else(|| invalid("post", format!("{post:?} is not a reddit post ID or link"))))
            .transpose()?;
        let since = match args.since {
            Some(since) => DateTime::from_timestamp(since, 0).ok_or_else(|| invalid("since", "timestamp out of range"))?,
            None => DateTime::UNIX_EPOCH,
        };
        Ok(Self {
            rules: Rules {
                cutoff: args.cutoff,
                differential: args.differential,
            },
            game: args.game,
            event_slug, interval, post, since,
        })
    }

    /// Interval as stated in the post.
    pub(crate) fn interval_minutes(&self) -> u64 {
        self.interval.as_secs() / 60
    }
}

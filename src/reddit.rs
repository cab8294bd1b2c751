//! Publishing the report as a reddit self post.

use {
    async_trait::async_trait,
    lazy_regex::regex_captures,
    crate::{
        config::ConfigReddit,
        http::{
            self,
            detailed_error_for_status,
            json_with_text_in_error,
        },
        prelude::*,
    },
};

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const OAUTH_BASE: &str = "https://oauth.reddit.com";

/// Tokens are refreshed this long before reddit says they expire.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Http(#[from] http::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error("reddit rejected the request: {}", .0.join(", "))]
    Api(Vec<String>),
    #[error("reddit did not return the new post's ID")]
    MissingPostId,
}

/// The base-36 ID of a reddit submission, without the `t3_` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PostId(String);

impl PostId {
    /// Accepts a bare ID, a `t3_` fullname, or a link to the post.
    pub(crate) fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some((_, id)) = regex_captures!(r"^(?:https?://)?(?:[a-z]+\.)?reddit\.com/(?:r/[^/]+/)?comments/([0-9a-z]+)(?:/.*)?$", input) {
            Some(Self(id.to_owned()))
        } else if let Some((_, id)) = regex_captures!(r"^(?:https?://)?redd\.it/([0-9a-z]+)/?$", input) {
            Some(Self(id.to_owned()))
        } else if let Some((_, id)) = regex_captures!("^(?:t3_)?([0-9a-z]+)$", input) {
            Some(Self(id.to_owned()))
        } else {
            None
        }
    }

    fn fullname(&self) -> String {
        format!("t3_{}", self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Display tag for the post, selected by which game the event is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum Game {
    Ultimate,
    Melee,
}

impl Game {
    /// Post flair on r/smashbros.
    pub(crate) fn flair_id(&self) -> &'static str {
        match self {
            Self::Ultimate => "328ff9f0-9493-11e8-bb38-0eab79b479bc",
            Self::Melee => "4239bb48-9493-11e8-82ac-0e7a476c5a6c",
        }
    }
}

/// Where reports go.
#[async_trait]
pub(crate) trait Publisher {
    async fn create_post(&mut self, title: &str, body: &str) -> Result<PostId, Error>;
    async fn edit_post(&mut self, post: &PostId, body: &str) -> Result<(), Error>;
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    json: ApiResponseJson<T>,
}

#[derive(Deserialize)]
struct ApiResponseJson<T> {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct SubmitData {
    id: Option<String>,
}

impl<T> ApiResponse<T> {
    /// reddit reports validation errors with a 200 status as `[code, message, field]` triples.
    fn into_result(self) -> Result<Option<T>, Error> {
        let ApiResponseJson { errors, data } = self.json;
        if errors.is_empty() {
            Ok(data)
        } else {
            Err(Error::Api(errors.into_iter().map(|error| error.iter().filter_map(|part| part.as_str()).collect::<Vec<_>>().join(": ")).collect()))
        }
    }
}

/// A script-type reddit app posting as its owner.
pub(crate) struct Client {
    http_client: reqwest::Client,
    config: ConfigReddit,
    flair_id: Option<&'static str>,
    token: Option<(String, Instant)>,
}

impl Client {
    pub(crate) fn new(http_client: reqwest::Client, config: ConfigReddit, game: Option<Game>) -> Self {
        Self {
            flair_id: game.map(|game| game.flair_id()),
            token: None,
            http_client, config,
        }
    }

    async fn token(&mut self) -> Result<String, Error> {
        if let Some((ref token, expires_at)) = self.token {
            if Instant::now() < expires_at {
                return Ok(token.clone())
            }
        }
        log::debug!("requesting reddit access token");
        let response = self.http_client.post(TOKEN_URL)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(reqwest::header::USER_AGENT, self.user_agent())
            .form(&[
                ("grant_type", "password"),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ])
            .send().await?;
        let AccessToken { access_token, expires_in } = json_with_text_in_error(detailed_error_for_status(response).await?).await?;
        let expires_at = Instant::now() + Duration::from_secs(expires_in).saturating_sub(TOKEN_MARGIN);
        self.token = Some((access_token.clone(), expires_at));
        Ok(access_token)
    }

    fn user_agent(&self) -> String {
        self.config.user_agent.clone().unwrap_or_else(|| format!("upset-thread/{} (by /u/{})", env!("CARGO_PKG_VERSION"), self.config.username))
    }

    async fn api_post<T: for<'de> Deserialize<'de>>(&mut self, endpoint: &str, form: &[(&str, &str)]) -> Result<Option<T>, Error> {
        let token = self.token().await?;
        let response = self.http_client.post(format!("{OAUTH_BASE}{endpoint}"))
            .bearer_auth(token)
            .header(reqwest::header::USER_AGENT, self.user_agent())
            .form(form)
            .send().await?;
        json_with_text_in_error::<ApiResponse<T>>(detailed_error_for_status(response).await?).await?.into_result()
    }
}

#[async_trait]
impl Publisher for Client {
    async fn create_post(&mut self, title: &str, body: &str) -> Result<PostId, Error> {
        let subreddit = self.config.subreddit.clone();
        let mut form = vec![
            ("api_type", "json"),
            ("kind", "self"),
            ("sr", &*subreddit),
            ("title", title),
            ("text", body),
        ];
        if let Some(flair_id) = self.flair_id {
            form.push(("flair_id", flair_id));
        }
        let SubmitData { id } = self.api_post("/api/submit", &form).await?.ok_or(Error::MissingPostId)?;
        let post = id.ok_or(Error::MissingPostId)?;
        log::info!("created post in /r/{subreddit} with id {post}");
        Ok(PostId(post))
    }

    async fn edit_post(&mut self, post: &PostId, body: &str) -> Result<(), Error> {
        let fullname = post.fullname();
        self.api_post::<serde_json::Value>("/api/editusertext", &[
            ("api_type", "json"),
            ("thing_id", fullname.as_str()),
            ("text", body),
        ]).await?;
        Ok(())
    }
}

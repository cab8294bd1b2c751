use crate::prelude::*;

/// A non-success HTTP response, with the body kept for diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("{url} returned {status}: {body}")]
pub(crate) struct StatusError {
    pub(crate) url: String,
    pub(crate) status: reqwest::StatusCode,
    pub(crate) body: String,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error(transparent)] Status(#[from] StatusError),
    #[error("failed to decode response from {url}: {source}\n{body}")]
    Json {
        url: String,
        source: serde_json::Error,
        body: String,
    },
}

/// Like [`reqwest::Response::error_for_status`], but includes the response body in the error.
pub(crate) async fn detailed_error_for_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let url = response.url().to_string();
        let body = response.text().await?;
        Err(StatusError { url, status, body }.into())
    }
}

/// Decodes a JSON body, keeping the raw text around if it doesn't match the expected shape.
pub(crate) async fn json_with_text_in_error<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, Error> {
    let url = response.url().to_string();
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|source| Error::Json { url, source, body })
}

pub(crate) fn client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("upset-thread/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .use_rustls_tls()
        .https_only(true)
        .build()
}

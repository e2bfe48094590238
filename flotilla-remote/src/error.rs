use thiserror::Error;

/// Failures talking to the function-hosting platform.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure (DNS, TLS, connection reset, ...).
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The platform answered with a status the caller does not accept.
    #[error("{status} {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures resolving credentials for a profile.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "`{command}` exited with {status}: {stderr}\nmake sure `{command}` returns the current profile"
    )]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("empty token returned for profile '{profile}'")]
    EmptyToken { profile: String },

    #[error("profile '{profile}' could not be parsed: {source}")]
    Profile {
        profile: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("profile '{profile}' has no subscription and none was given")]
    MissingSubscription { profile: String },
}

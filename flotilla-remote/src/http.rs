//! REST adapter for [`RemoteApi`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use flotilla_core::{BuildHandle, InstanceRef, InstanceSpec, SearchCriteria, SubscriptionId};

use crate::api::{BuildStatus, PutOutcome, RemoteApi, SearchPage};
use crate::error::RemoteError;
use crate::session::Session;

/// Talks to `{base_url}/v1/account/{account}/subscription/{sub}/...`.
#[derive(Debug, Clone, Default)]
pub struct HttpRemote {
    client: Client,
}

impl HttpRemote {
    pub fn new() -> Self {
        Self::default()
    }

    async fn send(
        &self,
        session: &Session,
        request: RequestBuilder,
        url: &str,
    ) -> Result<Response, RemoteError> {
        let token = session.token().await;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                url: url.to_string(),
                source,
            })
    }
}

fn subscription_url(session: &Session, subscription: &str) -> String {
    format!(
        "{}/v1/account/{}/subscription/{}",
        session.base_url(),
        session.account_id(),
        subscription
    )
}

fn function_url(session: &Session, subscription: &str, boundary: &str, function: &str) -> String {
    format!(
        "{}/boundary/{}/function/{}",
        subscription_url(session, subscription),
        boundary,
        function
    )
}

/// Query pairs in the order the platform documents: cursor first, then clauses.
pub(crate) fn search_query<'a>(
    criteria: &'a SearchCriteria,
    next: Option<&'a str>,
) -> Vec<(&'static str, &'a str)> {
    let mut query = Vec::with_capacity(criteria.clauses().len() + 1);
    if let Some(next) = next {
        query.push(("next", next));
    }
    query.extend(criteria.clauses().iter().map(|c| ("search", c.as_str())));
    query
}

async fn read_body(response: Response, url: &str) -> Result<String, RemoteError> {
    response.text().await.map_err(|source| RemoteError::Transport {
        url: url.to_string(),
        source,
    })
}

fn decode<T: DeserializeOwned>(body: &str, url: &str) -> Result<T, RemoteError> {
    serde_json::from_str(body).map_err(|source| RemoteError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Prefer the platform's `message` field; fall back to the raw body.
pub(crate) fn rejection(status: StatusCode, body: &str) -> RemoteError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    RemoteError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn search(
        &self,
        session: &Session,
        subscription: &SubscriptionId,
        criteria: &SearchCriteria,
        next: Option<&str>,
    ) -> Result<SearchPage, RemoteError> {
        let url = format!("{}/function", subscription_url(session, subscription.as_str()));
        let request = self.client.get(&url).query(&search_query(criteria, next));
        let response = self.send(session, request, &url).await?;
        let status = response.status();
        let body = read_body(response, &url).await?;
        if !status.is_success() {
            return Err(rejection(status, &body));
        }
        decode(&body, &url)
    }

    async fn get_function(
        &self,
        session: &Session,
        subscription: &SubscriptionId,
        instance: &InstanceRef,
    ) -> Result<InstanceSpec, RemoteError> {
        let url = function_url(
            session,
            subscription.as_str(),
            &instance.boundary_id,
            &instance.function_id,
        );
        let response = self.send(session, self.client.get(&url), &url).await?;
        let status = response.status();
        let body = read_body(response, &url).await?;
        if !status.is_success() {
            return Err(rejection(status, &body));
        }
        decode(&body, &url)
    }

    async fn put_function(
        &self,
        session: &Session,
        subscription: &SubscriptionId,
        instance: &InstanceRef,
        spec: &InstanceSpec,
    ) -> Result<PutOutcome, RemoteError> {
        let url = function_url(
            session,
            subscription.as_str(),
            &instance.boundary_id,
            &instance.function_id,
        );
        let response = self
            .send(session, self.client.put(&url).json(spec), &url)
            .await?;
        let status = response.status();
        let body = read_body(response, &url).await?;
        match status {
            StatusCode::OK => Ok(PutOutcome::Applied),
            StatusCode::CREATED => Ok(PutOutcome::Building(decode::<BuildHandle>(&body, &url)?)),
            other => Err(rejection(other, &body)),
        }
    }

    async fn build_status(
        &self,
        session: &Session,
        build: &BuildHandle,
    ) -> Result<BuildStatus, RemoteError> {
        let url = format!(
            "{}/build/{}",
            function_url(
                session,
                &build.subscription_id,
                &build.boundary_id,
                &build.function_id
            ),
            build.build_id
        );
        let response = self.send(session, self.client.get(&url), &url).await?;
        match response.status() {
            StatusCode::CREATED => Ok(BuildStatus::Pending),
            other => Ok(BuildStatus::Resolved(other.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_query_puts_cursor_before_clauses() {
        let criteria = SearchCriteria::new(["tags.type=slack", "template.id=x"]).expect("criteria");
        assert_eq!(
            search_query(&criteria, Some("cursor-2")),
            vec![
                ("next", "cursor-2"),
                ("search", "tags.type=slack"),
                ("search", "template.id=x"),
            ]
        );
        assert_eq!(search_query(&criteria, None).len(), 2);
    }

    #[test]
    fn rejection_prefers_message_field() {
        let err = rejection(StatusCode::BAD_REQUEST, r#"{"status":400,"message":"bad spec"}"#);
        assert!(matches!(
            err,
            RemoteError::Rejected { status: 400, ref message } if message == "bad spec"
        ));
    }

    #[test]
    fn rejection_falls_back_to_body() {
        let err = rejection(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err.to_string(), "502 upstream down");
    }
}

use axum::{
    extract::{Form, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::time::Duration;

use super::error::ApiError;
use crate::config::StubConfig;

/// Name of the identifier field read from each request.
pub const COUNTER_FIELD: &str = "counter";

/// Immutable per-run settings shared by every handler invocation.
#[derive(Debug, Clone)]
pub struct StubSettings {
    pub delay: Duration,
    pub echo: bool,
    pub require_counter: bool,
}

impl From<&StubConfig> for StubSettings {
    fn from(cfg: &StubConfig) -> Self {
        Self {
            delay: cfg.delay(),
            echo: cfg.echo,
            require_counter: cfg.require_counter,
        }
    }
}

/// Raw `key=value` pairs, so repeated keys never fail extraction.
type FieldPairs = Vec<(String, String)>;

/// First non-empty `counter` value; body fields take precedence over the query.
fn first_counter(form: Option<FieldPairs>, query: Option<FieldPairs>) -> Option<String> {
    form.into_iter()
        .chain(query)
        .flatten()
        .find(|(key, value)| key == COUNTER_FIELD && !value.is_empty())
        .map(|(_, value)| value)
}

/// GET|POST / - Simulated slow work
///
/// Holds the request for the configured delay before answering, so every
/// in-flight request pins one connection on the server.
pub async fn simulate_work(
    State(settings): State<StubSettings>,
    query: Option<Query<FieldPairs>>,
    form: Option<Form<FieldPairs>>,
) -> Result<Response, ApiError> {
    let counter = first_counter(form.map(|Form(f)| f), query.map(|Query(q)| q));

    if settings.require_counter && counter.is_none() {
        return Err(ApiError::MissingField(COUNTER_FIELD));
    }

    tokio::time::sleep(settings.delay).await;

    let body = if settings.echo {
        counter.unwrap_or_default()
    } else {
        String::new()
    };
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> FieldPairs {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_first_counter_prefers_body_then_query() {
        let form = pairs(&[("counter", ""), ("counter", "5")]);
        let query = pairs(&[("counter", "9")]);
        assert_eq!(first_counter(Some(form), Some(query.clone())).as_deref(), Some("5"));
        assert_eq!(first_counter(None, Some(query)).as_deref(), Some("9"));
        assert_eq!(first_counter(Some(pairs(&[("id", "1")])), None), None);
    }
}

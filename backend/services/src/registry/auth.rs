use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::error::ServiceError;

/// Parameters for obtaining a registry token. Repo and tag are required for
/// docker.io, whose tokens must carry a directed scope.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub registry_url: String,
    pub repo: String,
    pub tag: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub token: String,
}

impl Token {
    pub fn bearer_header(&self) -> String {
        if self.token.is_empty() {
            String::new()
        } else {
            format!("Bearer {}", self.token)
        }
    }
}

/// A `WWW-Authenticate: Bearer` challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: String,
    pub scope: String,
}

/// Extracts the bearer challenge from a 401 response's headers, if any.
pub fn parse_bearer_challenge(headers: &HeaderMap) -> Option<AuthChallenge> {
    for value in headers.get_all(reqwest::header::WWW_AUTHENTICATE) {
        let raw = value.to_str().ok()?;
        if let Some(challenge) = parse_challenge_header(raw) {
            return Some(challenge);
        }
    }
    None
}

/// Parses `Bearer realm="…",service="…",scope="…"`. Parameter order is not
/// guaranteed by registries.
pub fn parse_challenge_header(raw: &str) -> Option<AuthChallenge> {
    let rest = raw.trim().strip_prefix("Bearer ").or_else(|| {
        raw.trim().strip_prefix("bearer ")
    })?;

    let mut challenge = AuthChallenge::default();
    for part in rest.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        let key = kv.next()?.trim();
        let value = kv.next().unwrap_or("").trim().trim_matches('"');
        match key {
            "realm" => challenge.realm = value.to_string(),
            "service" => challenge.service = value.to_string(),
            "scope" => challenge.scope = value.to_string(),
            _ => {}
        }
    }

    if challenge.realm.is_empty() {
        None
    } else {
        Some(challenge)
    }
}

/// Google Container Registry accepts a service-account JSON key through the
/// token exchange when the client authenticates as `_json_key`.
pub(crate) fn effective_username(registry_url: &str, username: &str, password: &str) -> String {
    if registry_url.contains("gcr.io") && username.is_empty() && password.trim_start().starts_with('{') {
        "_json_key".to_string()
    } else {
        username.to_string()
    }
}

/// Performs the token request against the challenge's realm, carrying Basic
/// credentials when supplied.
pub async fn token_request(
    http: &reqwest::Client,
    challenge: &AuthChallenge,
    username: &str,
    password: &str,
) -> Result<Token, ServiceError> {
    let mut query: Vec<(&str, &str)> = vec![("service", challenge.service.as_str())];
    if !challenge.scope.is_empty() {
        query.push(("scope", challenge.scope.as_str()));
    }

    let mut req = http.get(&challenge.realm).query(&query);
    if !username.is_empty() || !password.is_empty() {
        req = req.basic_auth(username, Some(password));
    }

    let resp = req.send().await?;
    if resp.status().as_u16() >= 400 {
        return Err(ServiceError::StatusCode(resp.status().as_u16()));
    }

    Ok(resp.json::<Token>().await?)
}

/// Authenticates against a registry with the provided credentials, returning
/// the resulting token. A registry that never answers 401 yields an empty
/// token, which downstream callers treat as "no Authorization header".
pub async fn auth_registry(config: &AuthConfig) -> Result<Token, ServiceError> {
    let username = effective_username(&config.registry_url, &config.username, &config.password);

    let url = if !config.repo.is_empty() && !config.tag.is_empty() {
        format!(
            "{}/v2/{}/manifests/{}",
            config.registry_url, config.repo, config.tag
        )
    } else {
        format!("{}/v2/", config.registry_url)
    };

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let resp = http.get(&url).send().await?;
    if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
        if let Some(challenge) = parse_bearer_challenge(resp.headers()) {
            return token_request(&http, &challenge, &username, &config.password).await;
        }
    }

    Ok(Token::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_challenge() {
        let parsed = parse_challenge_header(
            "Bearer realm=\"https://auth.example.com/token\",service=\"registry.example.com\",scope=\"repository:app:pull\"",
        )
        .expect("challenge should parse");
        assert_eq!(parsed.realm, "https://auth.example.com/token");
        assert_eq!(parsed.service, "registry.example.com");
        assert_eq!(parsed.scope, "repository:app:pull");
    }

    #[test]
    fn parses_challenge_without_scope() {
        let parsed = parse_challenge_header(
            "Bearer realm=\"https://gcr.io/v2/token\",service=\"gcr.io\"",
        )
        .expect("challenge should parse");
        assert_eq!(parsed.scope, "");
    }

    #[test]
    fn rejects_basic_challenge() {
        assert_eq!(parse_challenge_header("Basic realm=\"registry\""), None);
    }

    #[test]
    fn gcr_json_key_switches_username() {
        let user = effective_username("https://gcr.io", "", "{\"type\":\"service_account\"}");
        assert_eq!(user, "_json_key");

        let unchanged = effective_username("https://registry.example.com", "", "{\"k\":1}");
        assert_eq!(unchanged, "");
    }

    #[test]
    fn empty_token_renders_no_header() {
        assert_eq!(Token::default().bearer_header(), "");
        let token = Token {
            token: "abc".into(),
        };
        assert_eq!(token.bearer_header(), "Bearer abc");
    }
}

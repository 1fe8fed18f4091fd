//! Endpoint derivation: template + parameters + credential.

use std::collections::{BTreeMap, BTreeSet};

use url::{ParseError, Url};

use crate::chat::core::config::ChatConfig;
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::credentials::Credentials;

/// Query parameter carrying the credential.
pub const TOKEN_PARAM: &str = "token";

/// Endpoint template with `${name}` placeholders.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EndpointTemplate {
    template: String,
    base_url: Option<Url>,
}

impl EndpointTemplate {
    /// Build a template, optionally anchored to a base URL for relative paths.
    ///
    /// # Errors
    /// Returns an error if `base_url` is not a valid absolute URL.
    pub fn new(template: impl Into<String>, base_url: Option<&str>) -> ChatResult<Self> {
        let base_url = base_url.map(Url::parse).transpose()?;
        Ok(Self {
            template: template.into(),
            base_url,
        })
    }

    /// Template described by a config.
    ///
    /// # Errors
    /// Returns an error if the configured base URL is invalid.
    pub fn from_config(config: &ChatConfig) -> ChatResult<Self> {
        Self::new(config.endpoint_template.clone(), config.base_url.as_deref())
    }

    /// Raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute placeholders and append leftover parameters as query pairs.
    ///
    /// Values are inserted as-is, so a placeholder may stand for a host,
    /// a port or several path segments; `Url::parse` normalises the result.
    ///
    /// # Errors
    /// Returns `InvalidEndpoint` when a placeholder has no value, the result is
    /// not a URL, or the scheme cannot carry a websocket.
    pub fn resolve(&self, params: &BTreeMap<String, String>) -> ChatResult<Url> {
        let (substituted, used) = substitute(&self.template, params)?;

        let mut url = match Url::parse(&substituted) {
            Ok(url) => url,
            Err(ParseError::RelativeUrlWithoutBase) => match &self.base_url {
                Some(base) => base.join(&substituted)?,
                None => {
                    return Err(ChatError::InvalidEndpoint(format!(
                        "relative endpoint {substituted} needs a base_url"
                    )));
                }
            },
            Err(err) => return Err(err.into()),
        };

        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(ChatError::InvalidEndpoint(format!(
                    "unsupported scheme {other}"
                )));
            }
        };
        if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
            return Err(ChatError::InvalidEndpoint(format!(
                "cannot switch {url} to {scheme}"
            )));
        }

        let leftovers: Vec<_> = params
            .iter()
            .filter(|(key, _)| !used.contains(key.as_str()))
            .collect();
        if !leftovers.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in leftovers {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

/// Attach the credential to an endpoint as `token=<value>`.
///
/// A missing credential leaves the endpoint untouched.
#[must_use]
pub fn authorize(endpoint: &Url, credentials: &Credentials) -> Url {
    let mut url = endpoint.clone();
    if let Some(token) = credentials.token() {
        url.query_pairs_mut().append_pair(TOKEN_PARAM, token);
    }
    url
}

fn substitute<'a>(
    template: &str,
    params: &'a BTreeMap<String, String>,
) -> ChatResult<(String, BTreeSet<&'a str>)> {
    let mut out = String::with_capacity(template.len());
    let mut used = BTreeSet::new();
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(ChatError::InvalidEndpoint(format!(
                "unterminated placeholder in {template}"
            )));
        };
        let name = &after[..end];
        let Some((key, value)) = params.get_key_value(name) else {
            return Err(ChatError::InvalidEndpoint(format!(
                "no value for placeholder {name}"
            )));
        };
        out.push_str(value);
        used.insert(key.as_str());
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok((out, used))
}

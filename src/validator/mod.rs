//! URL validation with redirect tracking
//!
//! The validator issues a single GET per URL, follows redirects manually so
//! every hop is observable, and classifies every failure mode into a
//! [`ValidationResult`]. Validation never fails outward. Batch validation is
//! deliberately sequential with a fixed delay between requests: simple,
//! reproducible pacing against third-party government servers.

use chrono::Utc;
use reqwest::{header, redirect::Policy, Client};
use std::collections::HashMap;
use std::time::Duration;

/// Default overall timeout for a single validation request
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 20;

/// Default maximum number of redirects to follow per URL
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Identifying user agent sent with every validation request
pub const USER_AGENT: &str = "EU-Government-Accessibility-Scanner/1.0";

/// Result of a single URL validation check
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// The URL as it was requested
    pub url: String,

    /// True when the final status code after redirects is below 400
    pub is_valid: bool,

    /// Final HTTP status code, if an exchange completed
    pub status_code: Option<u16>,

    /// Kind-labeled description of the failure, if validation failed without
    /// a completed exchange
    pub error_message: Option<String>,

    /// Final URL when it differs from the requested URL
    pub redirected_to: Option<String>,

    /// URLs that answered with a redirect, in the order they were followed
    pub redirect_chain: Vec<String>,

    /// RFC 3339 timestamp taken when validation started
    pub validated_at: String,
}

impl ValidationResult {
    fn failure(url: &str, error_message: String, validated_at: String) -> Self {
        Self {
            url: url.to_string(),
            is_valid: false,
            status_code: None,
            error_message: Some(error_message),
            redirected_to: None,
            redirect_chain: Vec::new(),
            validated_at,
        }
    }
}

/// Validates URL accessibility with rate limiting and redirect capture
pub struct Validator {
    client: Client,
    max_redirects: usize,
}

impl Validator {
    /// Creates a validator with the given request timeout
    pub fn new(timeout_seconds: u64) -> Result<Self, reqwest::Error> {
        Self::with_max_redirects(timeout_seconds, DEFAULT_MAX_REDIRECTS)
    }

    /// Creates a validator with explicit timeout and redirect limits
    pub fn with_max_redirects(
        timeout_seconds: u64,
        max_redirects: usize,
    ) -> Result<Self, reqwest::Error> {
        // Redirects are followed manually so each hop lands in the chain.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_seconds))
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            max_redirects,
        })
    }

    /// Validates a single URL, tracking redirects
    ///
    /// Never returns an error: network failures, timeouts, and redirect-limit
    /// overruns all resolve to a result with `is_valid = false` and a
    /// descriptive `error_message`.
    pub async fn validate(&self, url: &str) -> ValidationResult {
        let validated_at = Utc::now().to_rfc3339();

        let mut redirect_chain: Vec<String> = Vec::new();
        let mut current = url.to_string();

        loop {
            let response = match self.client.get(&current).send().await {
                Ok(response) => response,
                Err(e) => {
                    return ValidationResult::failure(url, classify_error(&e), validated_at)
                }
            };

            let status = response.status();
            let location = redirect_location(&response);

            match location {
                Some(location) if status.is_redirection() => {
                    if redirect_chain.len() >= self.max_redirects {
                        return ValidationResult::failure(
                            url,
                            format!("Too many redirects: exceeded {} hops", self.max_redirects),
                            validated_at,
                        );
                    }

                    let next = match resolve_location(&current, &location) {
                        Ok(next) => next,
                        Err(e) => {
                            return ValidationResult::failure(
                                url,
                                format!("Unexpected error: {}", e),
                                validated_at,
                            )
                        }
                    };

                    tracing::debug!("Redirect {} -> {} ({})", current, next, status);
                    redirect_chain.push(current);
                    current = next;
                }
                _ => {
                    // Final response. A 3xx without a Location header counts
                    // as final rather than as a broken redirect.
                    let redirected_to = if current != url {
                        Some(current.clone())
                    } else {
                        None
                    };

                    return ValidationResult {
                        url: url.to_string(),
                        is_valid: status.as_u16() < 400,
                        status_code: Some(status.as_u16()),
                        error_message: None,
                        redirected_to,
                        redirect_chain,
                        validated_at,
                    };
                }
            }
        }
    }

    /// Validates multiple URLs with rate limiting
    ///
    /// URLs are processed strictly in input order, one request in flight at a
    /// time, sleeping `1 / rate_limit_per_second` after each request. A zero
    /// or negative rate limit disables the delay (used in tests).
    pub async fn validate_batch(
        &self,
        urls: &[String],
        rate_limit_per_second: f64,
    ) -> HashMap<String, ValidationResult> {
        let mut results: HashMap<String, ValidationResult> = HashMap::new();
        let delay = if rate_limit_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / rate_limit_per_second)
        } else {
            Duration::ZERO
        };

        let total = urls.len();
        for (idx, url) in urls.iter().enumerate() {
            tracing::info!("[{}/{}] Validating: {}", idx + 1, total, url);
            let result = self.validate(url).await;

            if result.is_valid {
                match &result.redirected_to {
                    Some(target) => tracing::info!(
                        "ok {} -> {}",
                        result.status_code.unwrap_or_default(),
                        target
                    ),
                    None => tracing::info!("ok {}", result.status_code.unwrap_or_default()),
                }
            } else {
                tracing::info!(
                    "failed: {}",
                    result.error_message.as_deref().unwrap_or("Failed")
                );
            }

            results.insert(url.clone(), result);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        results
    }
}

/// Classifies a transport error into a kind-labeled message
fn classify_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("Timeout: {}", e)
    } else if e.is_connect() {
        format!("Connection error: {}", e)
    } else if e.is_redirect() {
        format!("Too many redirects: {}", e)
    } else if e.is_builder() || e.is_request() {
        format!("Unexpected error: {}", e)
    } else {
        format!("HTTP error: {}", e)
    }
}

/// Extracts the Location header from a response, if any
fn redirect_location(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Resolves a possibly-relative redirect target against the current URL
fn resolve_location(current: &str, location: &str) -> Result<String, url::ParseError> {
    let base = url::Url::parse(current)?;
    Ok(base.join(location)?.to_string())
}

//! CORS policy enforcement.
//!
//! Origins are matched by exact string membership. An accepted origin is
//! echoed back verbatim; `*` is never emitted because credentials may be
//! shared. Every `OPTIONS` request is answered here and never reaches a
//! handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        Method, Request, StatusCode,
    },
    middleware::Next,
    response::Response,
};
use thiserror::Error;
use url::Url;

use crate::config::CorsConfig;

/// Structural problems that make a CORS policy unusable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorsConfigError {
    #[error("no allowed CORS origin configured")]
    NoOrigins,

    #[error("wildcard origin is not allowed when credentials are shared")]
    WildcardOrigin,

    #[error("invalid CORS origin '{0}', expected scheme://host[:port]")]
    InvalidOrigin(String),

    #[error("invalid CORS method '{0}'")]
    InvalidMethod(String),

    #[error("invalid CORS header name '{0}'")]
    InvalidHeader(String),
}

/// Outcome of checking a request's `Origin` against the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginDecision {
    /// No `Origin` header; not a cross-origin request.
    Absent,
    /// Origin is on the allow-list. Carries the exact value to echo.
    Allowed(HeaderValue),
    /// Origin is present but not allowed.
    Rejected,
}

/// Immutable, pre-rendered CORS policy shared by all requests.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: Vec<HeaderValue>,
    methods: Vec<Method>,
    allowed_headers: Vec<HeaderName>,
    allow_methods_value: HeaderValue,
    allow_headers_value: HeaderValue,
    expose_headers_value: Option<HeaderValue>,
    max_age_value: HeaderValue,
    allow_credentials: bool,
}

impl CorsPolicy {
    /// Build a policy, failing on any structurally invalid entry.
    pub fn from_config(config: &CorsConfig) -> Result<Self, CorsConfigError> {
        let origins = config
            .allowed_origins()
            .into_iter()
            .map(|origin| parse_origin(&origin))
            .collect::<Result<Vec<_>, _>>()?;
        if origins.is_empty() {
            return Err(CorsConfigError::NoOrigins);
        }

        let methods = config
            .allowed_methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|_| CorsConfigError::InvalidMethod(m.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let allowed_headers = parse_header_names(&config.allowed_headers)?;
        let exposed_headers = parse_header_names(&config.exposed_headers)?;

        let allow_methods_value = join_values(methods.iter().map(Method::as_str))?;
        let allow_headers_value = join_values(allowed_headers.iter().map(HeaderName::as_str))?;
        let expose_headers_value = if exposed_headers.is_empty() {
            None
        } else {
            Some(join_values(exposed_headers.iter().map(HeaderName::as_str))?)
        };

        Ok(Self {
            origins,
            methods,
            allowed_headers,
            allow_methods_value,
            allow_headers_value,
            expose_headers_value,
            max_age_value: HeaderValue::from(config.max_age_secs),
            allow_credentials: config.allow_credentials,
        })
    }

    /// Check the request's `Origin` header.
    pub fn check_origin(&self, headers: &HeaderMap) -> OriginDecision {
        let Some(origin) = headers.get(header::ORIGIN) else {
            return OriginDecision::Absent;
        };
        match self
            .origins
            .iter()
            .find(|allowed| allowed.as_bytes() == origin.as_bytes())
        {
            Some(allowed) => OriginDecision::Allowed(allowed.clone()),
            None => OriginDecision::Rejected,
        }
    }

    /// Answer a preflight request.
    ///
    /// The status is always 204. Permissive headers are added only when the
    /// origin, requested method and requested headers are all allowed.
    pub fn preflight(&self, headers: &HeaderMap) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;

        let origin = match self.check_origin(headers) {
            OriginDecision::Allowed(origin) => origin,
            OriginDecision::Rejected => {
                tracing::debug!(origin = ?headers.get(header::ORIGIN), "CORS preflight: origin rejected");
                add_vary_origin(response.headers_mut());
                return response;
            }
            OriginDecision::Absent => return response,
        };

        add_vary_origin(response.headers_mut());
        if !self.preflight_request_allowed(headers) {
            return response;
        }

        let out = response.headers_mut();
        out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        out.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.allow_methods_value.clone(),
        );
        out.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            self.allow_headers_value.clone(),
        );
        out.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age_value.clone());
        if self.allow_credentials {
            out.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        response
    }

    /// Decorate an actual (non-preflight) response for an allowed origin.
    pub fn apply_allowed(&self, origin: HeaderValue, headers: &mut HeaderMap) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
        if let Some(expose) = &self.expose_headers_value {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, expose.clone());
        }
    }

    /// Add the headers an actual (non-preflight) response gets for `decision`.
    ///
    /// Also used by the recovery stage, whose 500 never passes back through
    /// this one.
    pub fn decorate(&self, decision: OriginDecision, headers: &mut HeaderMap) {
        match decision {
            OriginDecision::Allowed(origin) => {
                self.apply_allowed(origin, headers);
                add_vary_origin(headers);
            }
            OriginDecision::Rejected => add_vary_origin(headers),
            OriginDecision::Absent => {}
        }
    }

    fn preflight_request_allowed(&self, headers: &HeaderMap) -> bool {
        if let Some(requested) = headers.get(header::ACCESS_CONTROL_REQUEST_METHOD) {
            let allowed = Method::from_bytes(requested.as_bytes())
                .map(|m| self.methods.contains(&m))
                .unwrap_or(false);
            if !allowed {
                tracing::debug!(method = ?requested, "CORS preflight: method not allowed");
                return false;
            }
        }

        if let Some(requested) = headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            let Ok(requested) = requested.to_str() else {
                return false;
            };
            for name in requested.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                // HeaderName comparison is case-insensitive once parsed.
                let allowed = HeaderName::from_bytes(name.as_bytes())
                    .map(|n| self.allowed_headers.contains(&n))
                    .unwrap_or(false);
                if !allowed {
                    tracing::debug!(header = name, "CORS preflight: header not allowed");
                    return false;
                }
            }
        }

        true
    }
}

/// Middleware entry point for the CORS stage.
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() == Method::OPTIONS {
        return policy.preflight(req.headers());
    }

    let decision = policy.check_origin(req.headers());
    let mut response = next.run(req).await;
    policy.decorate(decision, response.headers_mut());
    response
}

fn parse_origin(origin: &str) -> Result<HeaderValue, CorsConfigError> {
    if origin == "*" {
        return Err(CorsConfigError::WildcardOrigin);
    }
    let invalid = || CorsConfigError::InvalidOrigin(origin.to_string());

    let url = Url::parse(origin).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    // Must already be in serialized-origin form: no path, query or trailing slash.
    if url.origin().ascii_serialization() != origin {
        return Err(invalid());
    }
    HeaderValue::from_str(origin).map_err(|_| invalid())
}

fn parse_header_names(names: &[String]) -> Result<Vec<HeaderName>, CorsConfigError> {
    names
        .iter()
        .map(|n| {
            HeaderName::from_bytes(n.trim().as_bytes())
                .map_err(|_| CorsConfigError::InvalidHeader(n.clone()))
        })
        .collect()
}

fn join_values<'a>(parts: impl Iterator<Item = &'a str>) -> Result<HeaderValue, CorsConfigError> {
    let joined = parts.collect::<Vec<_>>().join(", ");
    HeaderValue::from_str(&joined).map_err(|_| CorsConfigError::InvalidHeader(joined))
}

fn add_vary_origin(headers: &mut HeaderMap) {
    headers.append(header::VARY, HeaderValue::from_static("origin"));
}

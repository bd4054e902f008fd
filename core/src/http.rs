//! Request description and the URL/auth helpers used to hand it to a transport.
//!
//! # Design
//! `Request` is plain data built by the caller before execution. The
//! lifecycle takes it by value and only ever borrows it afterwards, so a
//! request cannot change between the first send and a retry. `prepare`
//! flattens it into a `PreparedRequest`, which is all a `Transport` sees:
//! the escaped URL, the final header list and the optional form body.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use url::form_urlencoded;

use crate::error::LifecycleError;
use crate::result::ResultKind;

const AUTHORIZATION: &str = "Authorization";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Basic-auth credentials for a protected resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: &str, password: &str) -> Self {
        Self {
            user: user.to_string(),
            password: password.to_string(),
        }
    }
}

/// Where basic-auth credentials travel.
///
/// `Url` embeds them as `user:password@host`, which exposes them in plain
/// text wherever the URL is logged. `Header` sends an `Authorization` header
/// instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Url,
    Header,
}

/// Immutable description of a network operation.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: HttpMethod,
    pub host: String,
    pub path: String,
    pub use_https: bool,
    pub credentials: Option<Credentials>,
    pub auth_mode: AuthMode,
    pub form: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub result_kind: ResultKind,
}

impl Request {
    pub fn new(method: HttpMethod, host: &str, path: &str) -> Self {
        Self {
            method,
            host: host.to_string(),
            path: path.to_string(),
            use_https: false,
            credentials: None,
            auth_mode: match method {
                HttpMethod::Get => AuthMode::Url,
                HttpMethod::Post => AuthMode::Header,
            },
            form: Vec::new(),
            headers: Vec::new(),
            result_kind: ResultKind::default(),
        }
    }

    pub fn get(host: &str, path: &str) -> Self {
        Self::new(HttpMethod::Get, host, path)
    }

    pub fn post(host: &str, path: &str) -> Self {
        Self::new(HttpMethod::Post, host, path)
    }

    pub fn with_https(mut self, use_https: bool) -> Self {
        self.use_https = use_https;
        self
    }

    /// Attach basic-auth credentials. GET requests default to URL auth and
    /// POST requests to header auth; override with `with_auth_mode`.
    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(user, password));
        self
    }

    pub fn with_auth_mode(mut self, mode: AuthMode) -> Self {
        self.auth_mode = mode;
        self
    }

    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.form.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_result_kind(mut self, kind: ResultKind) -> Self {
        self.result_kind = kind;
        self
    }

    /// Reject requests that cannot be sent at all.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.host.trim().is_empty() {
            return Err(LifecycleError::InvalidRequest("host is empty".to_string()));
        }
        Ok(())
    }

    /// Flatten into what the transport receives.
    pub fn prepare(&self) -> PreparedRequest {
        let url_credentials = match self.auth_mode {
            AuthMode::Url => self.credentials.as_ref(),
            AuthMode::Header => None,
        };
        let url = escape_url(&self.host, &self.path, self.use_https, url_credentials);

        let mut headers = self.headers.clone();
        if let (AuthMode::Header, Some(creds)) = (self.auth_mode, &self.credentials) {
            set_auth_header(&mut headers, &creds.user, &creds.password);
        }

        let form = match self.method {
            HttpMethod::Get => None,
            HttpMethod::Post => Some(self.form.clone()),
        };

        PreparedRequest {
            method: self.method,
            url,
            headers,
            form,
        }
    }
}

/// A request as handed to a `Transport`.
///
/// `form` is `Some` for POST requests, possibly with no fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
}

/// Build `scheme://[user:password@]host[/escaped/path]`.
///
/// Each path segment is form-url-escaped on its own so `/` separators
/// survive. An empty path adds nothing after the host.
pub fn escape_url(host: &str, path: &str, https: bool, credentials: Option<&Credentials>) -> String {
    let scheme = if https { "https://" } else { "http://" };
    let userinfo = match credentials {
        Some(c) => format!("{}:{}@", escape_component(&c.user), escape_component(&c.password)),
        None => String::new(),
    };
    format!("{scheme}{userinfo}{host}{}", escape_path(path))
}

fn escape_path(path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return String::new();
    }
    let segments: Vec<String> = path.split('/').map(escape_component).collect();
    format!("/{}", segments.join("/"))
}

fn escape_component(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// `Basic base64(user:password)`.
pub fn basic_auth_value(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

/// Insert or replace the `Authorization` header.
pub fn set_auth_header(headers: &mut Vec<(String, String)>, user: &str, password: &str) {
    let value = basic_auth_value(user, password);
    match headers
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case(AUTHORIZATION))
    {
        Some(existing) => existing.1 = value,
        None => headers.push((AUTHORIZATION.to_string(), value)),
    }
}

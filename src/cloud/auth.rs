//! AK/SK request signing
//!
//! Huawei Cloud APIs authenticate each request with an `SDK-HMAC-SHA256`
//! signature computed over a canonical form of the request. The signature
//! goes into the `Authorization` header alongside an `X-Sdk-Date` timestamp.

use crate::error::ApiError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNING_ALGORITHM: &str = "SDK-HMAC-SHA256";
pub const HEADER_SDK_DATE: &str = "X-Sdk-Date";
pub const HEADER_PROJECT_ID: &str = "X-Project-Id";

const SDK_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Access key pair
#[derive(Clone)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Headers to attach to a signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub sdk_date: String,
    pub authorization: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Sign a request. `headers` are extra headers that must be covered by
    /// the signature; `host` and `x-sdk-date` are always included.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &[(&str, &str)],
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Signature, ApiError> {
        let sdk_date = now.format(SDK_DATE_FORMAT).to_string();

        let mut signed: Vec<(String, String)> = headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        signed.push(("host".to_string(), host_header(url)));
        signed.push((HEADER_SDK_DATE.to_ascii_lowercase(), sdk_date.clone()));
        signed.sort();

        let signed_headers = signed
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical = canonical_request(method, url, &signed, &signed_headers, body);
        let string_to_sign = format!(
            "{}\n{}\n{}",
            SIGNING_ALGORITHM,
            sdk_date,
            hex::encode(Sha256::digest(canonical.as_bytes()))
        );

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ApiError::fatal("sign request", e))?;
        mac.update(string_to_sign.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(Signature {
            sdk_date,
            authorization: format!(
                "{} Access={}, SignedHeaders={}, Signature={}",
                SIGNING_ALGORITHM, self.access_key, signed_headers, signature
            ),
        })
    }
}

/// Build the canonical request string
fn canonical_request(
    method: &str,
    url: &Url,
    headers: &[(String, String)],
    signed_headers: &str,
    body: &[u8],
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method.to_ascii_uppercase(),
        canonical_uri(url),
        canonical_query(url),
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(body))
    )
}

/// Path with every segment percent-encoded and a trailing slash
fn canonical_uri(url: &Url) -> String {
    let mut uri = url
        .path()
        .split('/')
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            urlencoding::encode(&decoded).into_owned()
        })
        .collect::<Vec<_>>()
        .join("/");

    if !uri.ends_with('/') {
        uri.push('/');
    }
    uri
}

/// Query pairs encoded and sorted by key, then value
fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            (
                urlencoding::encode(&k).into_owned(),
                urlencoding::encode(&v).into_owned(),
            )
        })
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

//! AWS Signature Version 4 for S3-compatible endpoints.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

use crate::error::StoreError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// Characters left unescaped in query components: the RFC 3986 unreserved set.
pub(crate) const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Same as [`QUERY_COMPONENT`] but keeps `/` so object keys map onto paths.
pub(crate) const PATH: &AsciiSet = &QUERY_COMPONENT.remove(b'/');

pub(crate) const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub(crate) struct Credentials<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
}

/// The parts of a request that go into its signature.
pub(crate) struct CanonicalRequest<'a> {
    pub method: &'a str,
    /// Already percent-encoded.
    pub path: &'a str,
    /// Already percent-encoded and sorted, see [`canonical_query`].
    pub query: &'a str,
    /// Lower-case header names. Must include `host`, `x-amz-date` and
    /// `x-amz-content-sha256`.
    pub headers: &'a BTreeMap<String, String>,
    pub payload_sha256: &'a str,
}

pub(crate) fn amz_date(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub(crate) fn encode_path(key: &str) -> String {
    utf8_percent_encode(key, PATH).to_string()
}

/// Encode and sort query parameters the way the signature expects.
pub(crate) fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(k, QUERY_COMPONENT).to_string(),
                utf8_percent_encode(v, QUERY_COMPONENT).to_string(),
            )
        })
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| StoreError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build the `Authorization` header value for `request` signed at `now`.
pub(crate) fn authorization(
    credentials: &Credentials<'_>,
    request: &CanonicalRequest<'_>,
    now: DateTime<Utc>,
) -> Result<String, StoreError> {
    let date = now.format("%Y%m%d").to_string();
    let scope = format!("{date}/{}/{SERVICE}/aws4_request", credentials.region);

    let signed_headers = request
        .headers
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = request
        .headers
        .iter()
        .map(|(name, value)| format!("{name}:{}\n", value.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{canonical_headers}\n{signed_headers}\n{}",
        request.method, request.path, request.query, request.payload_sha256
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{}\n{scope}\n{}",
        amz_date(now),
        sha256_hex(canonical_request.as_bytes())
    );

    let k_date = hmac(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        date.as_bytes(),
    )?;
    let k_region = hmac(&k_date, credentials.region.as_bytes())?;
    let k_service = hmac(&k_region, SERVICE.as_bytes())?;
    let k_signing = hmac(&k_service, b"aws4_request")?;
    let signature: String = hmac(&k_signing, string_to_sign.as_bytes())?
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    Ok(format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.access_key_id
    ))
}

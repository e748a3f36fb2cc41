//! AWS Signature Version 4 request signing.
//!
//! Signs outgoing object-storage requests so that any SigV4-compatible
//! store (MinIO, Ceph RGW, AWS S3) accepts them.  The core algorithm
//! follows AWS Signature Version 4:
//! 1. Build a canonical request
//! 2. Build a string-to-sign
//! 3. Derive a signing key via HMAC chain
//! 4. Compute the signature and assemble the `Authorization` header
//!
//! Every value here is recomputed per request and discarded afterwards.
//! Only three headers are ever signed: `host`, `x-amz-content-sha256` and
//! `x-amz-date`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm identifier.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Service name in the credential scope.
pub const SERVICE: &str = "s3";

/// SHA-256 of the empty string, the payload hash for GET and DELETE.
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// The signed header names, lowercase, sorted, `;`-joined.
pub const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

// ── Credentials ─────────────────────────────────────────────────────

/// Long-lived access key pair and region.
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Headers to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// `x-amz-date` value, `YYYYMMDDTHHMMSSZ`.
    pub amz_date: String,
    /// `x-amz-content-sha256` value.
    pub payload_hash: String,
    /// `Authorization` header value.
    pub authorization: String,
}

// ── Request signing ─────────────────────────────────────────────────

/// Sign a request.
///
/// `host` is the exact `host` header sent on the wire (including a
/// non-default port) and `canonical_uri` the already-encoded path.
/// `payload` is the request body; pass an empty slice for GET/DELETE.
pub fn sign_request(
    credentials: &Credentials,
    method: &str,
    host: &str,
    canonical_uri: &str,
    payload: &[u8],
    now: DateTime<Utc>,
) -> SignedRequest {
    let amz_date = format_amz_date(now);
    let date_stamp = format_date_stamp(now);
    let payload_hash = hash_payload(payload);

    let headers = vec![
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];

    let canonical_request = build_canonical_request(
        method,
        canonical_uri,
        "",
        &headers,
        SIGNED_HEADERS,
        &payload_hash,
    );

    let scope = credential_scope(&date_stamp, &credentials.region);
    let string_to_sign = build_string_to_sign(&amz_date, &scope, &canonical_request);
    let signing_key = derive_signing_key(
        &credentials.secret_key,
        &date_stamp,
        &credentials.region,
        SERVICE,
    );
    let signature = compute_signature(&signing_key, &string_to_sign);

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
        credentials.access_key
    );

    SignedRequest {
        amz_date,
        payload_hash,
        authorization,
    }
}

/// `YYYYMMDDTHHMMSSZ`
pub fn format_amz_date(t: DateTime<Utc>) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

/// `YYYYMMDD`
pub fn format_date_stamp(t: DateTime<Utc>) -> String {
    t.format("%Y%m%d").to_string()
}

/// `dateStamp/region/s3/aws4_request`
pub fn credential_scope(date_stamp: &str, region: &str) -> String {
    format!("{date_stamp}/{region}/{SERVICE}/aws4_request")
}

/// Hex SHA-256 of a request body.
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

// ── Canonical request construction ──────────────────────────────────

/// Build the canonical request string.
///
/// ```text
/// HTTPMethod + '\n' +
/// CanonicalURI + '\n' +
/// CanonicalQueryString + '\n' +
/// CanonicalHeaders + '\n' +
/// SignedHeaders + '\n' +
/// HashedPayload
/// ```
///
/// `headers` are (lowercase name, value) pairs; only those named in
/// `signed_headers_str` are included, in that order.
pub fn build_canonical_request(
    method: &str,
    uri: &str,
    query_string: &str,
    headers: &[(String, String)],
    signed_headers_str: &str,
    payload_hash: &str,
) -> String {
    // S3 signs the path as sent, without double-encoding or normalization.
    let canonical_uri = if uri.is_empty() { "/" } else { uri };

    let mut canonical_headers = String::new();
    for name in signed_headers_str.split(';') {
        if let Some((hname, hval)) = headers.iter().find(|(n, _)| n == name) {
            canonical_headers.push_str(hname);
            canonical_headers.push(':');
            canonical_headers.push_str(&collapse_whitespace(hval));
            canonical_headers.push('\n');
        }
    }

    format!(
        "{method}\n{canonical_uri}\n{query_string}\n{canonical_headers}\n{signed_headers_str}\n{payload_hash}"
    )
}

// ── String to sign ──────────────────────────────────────────────────

/// Build the string to sign.
///
/// ```text
/// AWS4-HMAC-SHA256 + '\n' +
/// Timestamp + '\n' +
/// CredentialScope + '\n' +
/// HexEncode(SHA256(CanonicalRequest))
/// ```
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request: &str,
) -> String {
    let hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!("{ALGORITHM}\n{timestamp}\n{credential_scope}\n{hash}")
}

// ── Signing key derivation ──────────────────────────────────────────

/// Derive the signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC-SHA256("AWS4" + secret, dateStamp)
/// kRegion  = HMAC-SHA256(kDate, region)
/// kService = HMAC-SHA256(kRegion, service)
/// kSigning = HMAC-SHA256(kService, "aws4_request")
/// ```
pub fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Vec<u8> {
    let k_secret = format!("AWS4{secret_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Compute HMAC-SHA256.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute the signature: HexEncode(HMAC-SHA256(SigningKey, StringToSign)).
pub fn compute_signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

// ── URI encoding ────────────────────────────────────────────────────

/// S3-compatible URI encoding (RFC 3986 with S3 exceptions).
///
/// - Characters A-Z, a-z, 0-9, -, _, ., ~ are NOT encoded.
/// - All other characters are percent-encoded with uppercase hex.
/// - If `encode_slash` is false, `/` is NOT encoded (for URI paths).
pub fn s3_uri_encode(input: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len() * 2);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if !encode_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

// ── Authorization header parsing ────────────────────────────────────


// ── Helper functions ────────────────────────────────────────────────

/// Collapse consecutive whitespace in a header value to a single space,
/// and trim leading/trailing whitespace.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Tests ───────────────────────────────────────────────────────────

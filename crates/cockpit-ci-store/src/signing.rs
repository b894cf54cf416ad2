//! AWS4-HMAC-SHA256 request signing, ported field-for-field from the
//! original `s3_sign()` (spec.md §4.3, §9 "S3 signature determinism").

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Pure function of its inputs: given the same method, URL, headers,
/// checksum, keys and timestamp it always returns the same signed
/// header set. Production callers pass `Utc::now()`; tests pin `now`.
pub fn s3_sign(
    method: &str,
    url: &Url,
    extra_headers: &[(String, String)],
    checksum: &str,
    access_key: &str,
    secret_key: &str,
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = &amz_date[..8];
    let host = url.host_str().expect("S3 destination URL must have a host");

    let mut headers: BTreeMap<String, String> = extra_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
        .collect();
    headers.insert("host".to_string(), host.to_string());
    headers.insert("x-amz-content-sha256".to_string(), checksum.to_string());
    headers.insert("x-amz-date".to_string(), amz_date.clone());

    let canonical_headers: String = headers.iter().map(|(k, v)| format!("{k}:{v}\n")).collect();
    let signed_headers: String = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let credential_scope = format!("{date_stamp}/any/s3/aws4_request");

    let canonical_request = format!(
        "{method}\n{path}\n{query}\n{canonical_headers}\n{signed_headers}\n{checksum}",
        path = url.path(),
        query = url.query().unwrap_or(""),
    );
    let request_hash = sha256_hex(canonical_request.as_bytes());
    let string_to_sign =
        format!("AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{request_hash}");

    let mut signing_key = hmac(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    signing_key = hmac(&signing_key, b"any");
    signing_key = hmac(&signing_key, b"s3");
    signing_key = hmac(&signing_key, b"aws4_request");
    let signature = hex::encode(hmac(&signing_key, string_to_sign.as_bytes()));

    headers.insert(
        "authorization".to_string(),
        format!(
            "AWS4-HMAC-SHA256 Credential={access_key}/{credential_scope}, \
             SignedHeaders={signed_headers}, Signature={signature}"
        ),
    );

    headers.into_iter().collect()
}

/// Signs an outgoing request; separated from [`s3_sign`] so the queue
/// can depend on a trait object and tests can pin `s3_sign` directly.
pub trait Signer: Send + Sync {
    fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &[(String, String)],
        checksum: &str,
    ) -> Vec<(String, String)>;
}

pub struct S3Signer {
    access_key: String,
    secret_key: String,
}

impl S3Signer {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self { access_key: access_key.into(), secret_key: secret_key.into() }
    }
}

impl Signer for S3Signer {
    fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &[(String, String)],
        checksum: &str,
    ) -> Vec<(String, String)> {
        s3_sign(method, url, headers, checksum, &self.access_key, &self.secret_key, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 1, 2, 3).unwrap()
    }

    #[test]
    fn signing_is_deterministic_given_the_same_inputs() {
        let url = Url::parse("https://bucket.s3.example.com/path/to/object").unwrap();
        let headers = vec![("Content-Type".to_string(), "text/plain".to_string())];
        let a = s3_sign("PUT", &url, &headers, "deadbeef", "AKID", "secret", fixed_now());
        let b = s3_sign("PUT", &url, &headers, "deadbeef", "AKID", "secret", fixed_now());
        assert_eq!(a, b);
    }

    #[test]
    fn changing_the_checksum_changes_the_signature() {
        let url = Url::parse("https://bucket.s3.example.com/path/to/object").unwrap();
        let a = s3_sign("PUT", &url, &[], "aaaa", "AKID", "secret", fixed_now());
        let b = s3_sign("PUT", &url, &[], "bbbb", "AKID", "secret", fixed_now());
        let auth_a = a.iter().find(|(k, _)| k == "authorization").unwrap();
        let auth_b = b.iter().find(|(k, _)| k == "authorization").unwrap();
        assert_ne!(auth_a, auth_b);
    }

    #[test]
    fn credential_scope_uses_any_region_and_todays_date() {
        let url = Url::parse("https://bucket.s3.example.com/object").unwrap();
        let signed = s3_sign("GET", &url, &[], "e3b0c4", "AKID", "secret", fixed_now());
        let auth = signed.iter().find(|(k, _)| k == "authorization").unwrap().1.clone();
        assert!(auth.contains("20240314/any/s3/aws4_request"));
    }
}

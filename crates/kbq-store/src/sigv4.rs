//! AWS Signature Version 4 for unsigned-body S3 requests (HEAD/GET).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use kbq_core::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";
/// SHA-256 of the empty body.
pub const EMPTY_PAYLOAD_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

/// Header values to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
}

pub fn sign(
    creds: &Credentials,
    method: &str,
    host: &str,
    canonical_uri: &str,
    at: DateTime<Utc>,
) -> Result<SignedHeaders> {
    let amz_date = at.format("%Y%m%dT%H%M%SZ").to_string();
    let date = at.format("%Y%m%d").to_string();
    let scope = format!("{date}/{}/s3/aws4_request", creds.region);

    let canonical_request = format!(
        "{method}\n{canonical_uri}\n\nhost:{host}\nx-amz-content-sha256:{EMPTY_PAYLOAD_SHA256}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{EMPTY_PAYLOAD_SHA256}"
    );
    let string_to_sign =
        format!("{ALGORITHM}\n{amz_date}\n{scope}\n{}", hex::encode(Sha256::digest(canonical_request.as_bytes())));

    let mut key = hmac(format!("AWS4{}", creds.secret_access_key).as_bytes(), date.as_bytes())?;
    for part in [creds.region.as_str(), "s3", "aws4_request"] {
        key = hmac(&key, part.as_bytes())?;
    }
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            creds.access_key_id
        ),
        amz_date,
        content_sha256: EMPTY_PAYLOAD_SHA256.to_string(),
    })
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::Connection(format!("cannot sign request: invalid signing key ({e})")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode a path per SigV4 rules, keeping `/` separators.
pub fn uri_encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for b in path.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn signature_matches_reference_vector() {
        let creds = Credentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY".to_string(),
            region: "auto".to_string(),
        };
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).single().expect("valid time");
        let uri = uri_encode_path("/kb-index/prod/index v2/docstore.json");
        assert_eq!(uri, "/kb-index/prod/index%20v2/docstore.json");

        let signed = sign(&creds, "GET", "acct123.r2.cloudflarestorage.com", &uri, at).expect("sign");
        assert_eq!(signed.amz_date, "20240115T093000Z");
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240115/auto/s3/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date, \
             Signature=0ead0a6c8db3d56f9b462b9d03b0eecd6a1152ae39b78d2ae40849bca826c35c"
        );
    }

    #[test]
    fn signs_with_any_secret_length() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).single().expect("valid time");
        for secret in [String::new(), "k".repeat(4096)] {
            let creds = Credentials { access_key_id: "id".to_string(), secret_access_key: secret, region: "auto".to_string() };
            let signed = sign(&creds, "HEAD", "localhost", "/kb", at).expect("sign");
            assert!(signed.authorization.contains("Signature="));
        }
    }

    #[test]
    fn encodes_reserved_bytes() {
        assert_eq!(uri_encode_path("/b/a+b=c&ü"), "/b/a%2Bb%3Dc%26%C3%BC");
    }
}

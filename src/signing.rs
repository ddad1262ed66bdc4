//! AWS Signature Version 4 request signing for the catalog source.
//!
//! Only the POST-with-JSON-body shape the Product Advertising API uses is
//! supported: empty query string, fixed header set, SHA-256 payload hash.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac as _};
use sha2::{Digest as _, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "content-encoding;content-type;host;x-amz-date;x-amz-target";

pub const CONTENT_ENCODING: &str = "amz-1.0";
pub const CONTENT_TYPE: &str = "application/json; charset=UTF-8";

#[derive(Debug)]
pub struct SigningParams<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub service: &'a str,
    pub region: &'a str,
    pub target: &'a str,
    pub body: &'a str,
}

/// Header values to attach to the signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
}

pub fn sign(params: &SigningParams<'_>, now: DateTime<Utc>) -> anyhow::Result<SignedHeaders> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();

    let canonical_headers = format!(
        "content-encoding:{CONTENT_ENCODING}\ncontent-type:{CONTENT_TYPE}\nhost:{}\nx-amz-date:{amz_date}\nx-amz-target:{}\n",
        params.host, params.target
    );
    let payload_hash = hex::encode(Sha256::digest(params.body.as_bytes()));
    let canonical_request = format!(
        "POST\n{}\n\n{canonical_headers}\n{SIGNED_HEADERS}\n{payload_hash}",
        params.path
    );

    let scope = format!(
        "{date_stamp}/{}/{}/aws4_request",
        params.region, params.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", params.secret_key).as_bytes(),
        date_stamp.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, params.region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, params.service.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
        params.access_key
    );

    Ok(SignedHeaders {
        amz_date,
        authorization,
    })
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| anyhow::anyhow!("build hmac-sha256: {err}"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn params<'a>(body: &'a str) -> SigningParams<'a> {
        SigningParams {
            access_key: "AKIDEXAMPLE",
            secret_key: "wJalrXUtnFEMI",
            host: "webservices.amazon.com",
            path: "/paapi5/searchitems",
            service: "ProductAdvertisingAPI",
            region: "us-east-1",
            target: "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.SearchItems",
            body,
        }
    }

    #[test]
    fn authorization_carries_credential_scope_and_signed_headers() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let signed = sign(&params("{}"), now).unwrap();

        assert_eq!(signed.amz_date, "20240301T120000Z");
        assert!(signed.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240301/us-east-1/ProductAdvertisingAPI/aws4_request, "
        ));
        assert!(
            signed
                .authorization
                .contains("SignedHeaders=content-encoding;content-type;host;x-amz-date;x-amz-target")
        );
    }

    #[test]
    fn signature_is_deterministic_and_body_sensitive() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let a = sign(&params("{}"), now).unwrap();
        let b = sign(&params("{}"), now).unwrap();
        let c = sign(&params(r#"{"Keywords":"Fantasy"}"#), now).unwrap();

        assert_eq!(a, b);
        assert_ne!(a.authorization, c.authorization);
    }
}

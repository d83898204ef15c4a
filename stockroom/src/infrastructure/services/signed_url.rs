// /////////////////////////////////////////////////////////////////////////////
// Stockroom RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Signed URL Authorization
//!
//! File downloads are authorized by an HMAC-SHA256 signature over the
//! canonical string `<path>|<exp>|<uid>`. The signature, expiry, and user id
//! travel as query parameters; verification recomputes the MAC in constant
//! time, so a tampered path, a borrowed uid, or an expired timestamp all
//! fail with `Unauthorized` without revealing which part was wrong.

use chrono::{DateTime, Duration, Utc};
use ring::hmac;

use stockroom_domain::{DomainError, DomainResult, EntityId};

/// A generated signed URL, decomposed for the handler layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    /// Path component, e.g. `/files/test-file.pdf`.
    pub path: String,
    /// Hex-encoded HMAC-SHA256 signature.
    pub sig: String,
    /// Expiry as unix seconds.
    pub exp: i64,
    /// The user the URL was issued to.
    pub uid: String,
}

impl SignedUrl {
    /// Renders the full relative URL with query string.
    pub fn to_url(&self) -> String {
        format!("{}?sig={}&exp={}&uid={}", self.path, self.sig, self.exp, self.uid)
    }
}

/// Issues and verifies signed file URLs.
pub struct SignedUrlService {
    key: hmac::Key,
    ttl: Duration,
}

impl SignedUrlService {
    /// Creates a service from raw key material and a time-to-live.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl,
        }
    }

    fn canonical(path: &str, exp: i64, uid: &str) -> String {
        format!("{path}|{exp}|{uid}")
    }

    /// Generates a signed URL for a file path at `now`.
    pub fn generate(
        &self,
        file_name: &str,
        ext: &str,
        user_id: &EntityId,
        now: DateTime<Utc>,
    ) -> SignedUrl {
        let path = format!("/files/{file_name}.{ext}");
        let exp = (now + self.ttl).timestamp();
        let tag = hmac::sign(&self.key, Self::canonical(&path, exp, user_id.as_str()).as_bytes());
        SignedUrl {
            path,
            sig: hex::encode(tag.as_ref()),
            exp,
            uid: user_id.as_str().to_string(),
        }
    }

    /// Verifies a presented URL at `now`.
    pub fn verify(
        &self,
        path: &str,
        sig: &str,
        exp: i64,
        uid: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if now.timestamp() >= exp {
            return Err(DomainError::unauthorized("signed URL expired"));
        }
        let tag = hex::decode(sig).map_err(|_| DomainError::unauthorized("malformed signature"))?;
        hmac::verify(&self.key, Self::canonical(path, exp, uid).as_bytes(), &tag)
            .map_err(|_| DomainError::unauthorized("signature mismatch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> SignedUrlService {
        SignedUrlService::new(b"test-signing-key", Duration::minutes(15))
    }

    #[test]
    fn generated_url_verifies() {
        let service = service();
        let user = EntityId::parse("user-1").unwrap();
        let now = Utc::now();
        let url = service.generate("test-file", "pdf", &user, now);

        assert_eq!(url.path, "/files/test-file.pdf");
        assert!(url.to_url().contains("sig="));
        assert!(url.to_url().contains("uid=user-1"));
        service.verify(&url.path, &url.sig, url.exp, &url.uid, now).unwrap();
    }

    #[test]
    fn foreign_uid_rejected() {
        let service = service();
        let now = Utc::now();
        let url = service.generate("test-file", "pdf", &EntityId::parse("user-1").unwrap(), now);

        let err = service
            .verify(&url.path, &url.sig, url.exp, "user-2", now)
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn tampered_path_rejected() {
        let service = service();
        let now = Utc::now();
        let url = service.generate("test-file", "pdf", &EntityId::parse("user-1").unwrap(), now);

        let err = service
            .verify("/files/other-file.pdf", &url.sig, url.exp, &url.uid, now)
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn expired_url_rejected() {
        let service = service();
        let issued = Utc::now();
        let url = service.generate("test-file", "pdf", &EntityId::parse("user-1").unwrap(), issued);

        let later = issued + Duration::minutes(16);
        let err = service
            .verify(&url.path, &url.sig, url.exp, &url.uid, later)
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));
    }

    #[test]
    fn malformed_signature_rejected() {
        let service = service();
        let now = Utc::now();
        let url = service.generate("test-file", "pdf", &EntityId::parse("user-1").unwrap(), now);
        assert!(service
            .verify(&url.path, "zz-not-hex", url.exp, &url.uid, now)
            .is_err());
    }
}

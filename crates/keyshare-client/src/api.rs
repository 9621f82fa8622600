//! Reqwest-backed implementations of the server ports.
//!
//! The key server's auth-share field arrives either as a bare string or as
//! an object with an `encryptedData` member, depending on the record's age.
//! Both shapes are normalized into one canonical internal form here, right
//! after deserialization; nothing deeper in the call graph branches on
//! wire shape.

use std::sync::Arc;

use async_trait::async_trait;
use keyshare_crypto::EncryptedPayload;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ClientError, Result};
use crate::http::HttpClient;
use crate::ports::{
    AuthProvider, EmailShareRequest, KeyProvider, KeyServerPort, NotifyResult, QrRelayPort,
    QrSession, QrSessionInfo, RecoveryMethodInfo, RecoveryMethodRecord, RecoveryMethodType,
    RecoveryShareRecord, ServerKeyStatus,
};

/// Auth share as it appears on the wire: bare string or object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAuthShare {
    Text(String),
    Object {
        #[serde(rename = "encryptedData")]
        encrypted_data: String,
    },
}

impl RawAuthShare {
    fn into_share(self) -> String {
        match self {
            Self::Text(share) => share,
            Self::Object { encrypted_data } => encrypted_data,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthShareQuery<'a> {
    provider_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    share_version: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthShareResponse {
    #[serde(default)]
    auth_share: Option<RawAuthShare>,
    #[serde(default)]
    key_provider: Option<KeyProvider>,
    #[serde(default)]
    primary_did: Option<String>,
    #[serde(default)]
    recovery_methods: Vec<RecoveryMethodInfo>,
    #[serde(default)]
    share_version: Option<u32>,
    #[serde(default)]
    masked_recovery_email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreAuthShareBody<'a> {
    provider_type: &'a str,
    auth_share: AuthShareObject<'a>,
    primary_did: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthShareObject<'a> {
    encrypted_data: &'a str,
    encrypted_dek: &'a str,
    iv: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreAuthShareResponse {
    #[serde(default)]
    share_version: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddRecoveryMethodBody<'a> {
    provider_type: &'a str,
    #[serde(rename = "type")]
    method_type: RecoveryMethodType,
    #[serde(skip_serializing_if = "Option::is_none")]
    encrypted_share: Option<&'a EncryptedPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    credential_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    share_version: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderBody<'a> {
    provider_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailShareBody<'a> {
    provider_type: &'a str,
    email_share: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    use_recovery_email: bool,
}

/// [`KeyServerPort`] over HTTPS, authenticated per request with the auth
/// provider's identity token.
pub struct HttpKeyServer {
    http: HttpClient,
    auth: Arc<dyn AuthProvider>,
}

impl HttpKeyServer {
    /// Connect to the key server at `server_url`.
    pub fn new(server_url: &str, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(server_url)?,
            auth,
        })
    }

    async fn token(&self) -> Result<String> {
        self.auth.id_token().await
    }
}

#[async_trait]
impl KeyServerPort for HttpKeyServer {
    async fn fetch_key_status(&self, share_version: Option<u32>) -> Result<ServerKeyStatus> {
        let token = self.token().await?;
        let body = AuthShareQuery {
            provider_type: self.auth.provider_type(),
            share_version,
        };

        let response: AuthShareResponse =
            match self.http.post("/keys/auth-share", &body, Some(&token)).await {
                Ok(response) => response,
                Err(ClientError::NotFound(_)) => return Ok(ServerKeyStatus::default()),
                Err(e) => return Err(e),
            };

        let auth_share = response.auth_share.map(RawAuthShare::into_share);

        Ok(ServerKeyStatus {
            exists: auth_share.is_some()
                || response.key_provider.is_some()
                || response.primary_did.is_some(),
            key_provider: response.key_provider,
            primary_did: response.primary_did,
            recovery_methods: response.recovery_methods,
            auth_share,
            share_version: response.share_version,
            masked_recovery_email: response.masked_recovery_email,
        })
    }

    async fn store_auth_share(&self, auth_share: &str, primary_did: &str) -> Result<u32> {
        let token = self.token().await?;
        let body = StoreAuthShareBody {
            provider_type: self.auth.provider_type(),
            auth_share: AuthShareObject {
                encrypted_data: auth_share,
                encrypted_dek: "",
                iv: "",
            },
            primary_did,
        };

        let response: StoreAuthShareResponse =
            self.http.put("/keys/auth-share", &body, Some(&token)).await?;

        Ok(response.share_version.unwrap_or(1))
    }

    async fn add_recovery_method(&self, record: &RecoveryMethodRecord) -> Result<()> {
        let token = self.token().await?;
        let body = AddRecoveryMethodBody {
            provider_type: self.auth.provider_type(),
            method_type: record.method_type,
            encrypted_share: record.encrypted_share.as_ref(),
            credential_id: record.credential_id.as_deref(),
            share_version: record.share_version,
        };

        let _: serde_json::Value = self.http.post("/keys/recovery", &body, Some(&token)).await?;
        Ok(())
    }

    async fn get_recovery_share(
        &self,
        method: RecoveryMethodType,
        credential_id: Option<&str>,
    ) -> Result<Option<RecoveryShareRecord>> {
        let token = self.token().await?;

        let mut path = format!(
            "/keys/recovery?type={method}&providerType={}",
            self.auth.provider_type()
        );
        if let Some(credential_id) = credential_id {
            path.push_str(&format!("&credentialId={credential_id}"));
        }

        match self.http.get(&path, Some(&token)).await {
            Ok(record) => Ok(Some(record)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn mark_migrated(&self) -> Result<()> {
        let token = self.token().await?;
        let body = ProviderBody {
            provider_type: self.auth.provider_type(),
        };

        let _: serde_json::Value = self.http.post("/keys/migrate", &body, Some(&token)).await?;
        Ok(())
    }

    async fn delete_key(&self) -> Result<()> {
        let token = self.token().await?;
        let body = ProviderBody {
            provider_type: self.auth.provider_type(),
        };

        self.http.delete("/keys", &body, Some(&token)).await
    }

    async fn send_email_share(&self, request: &EmailShareRequest) -> Result<()> {
        let token = self.token().await?;
        let body = EmailShareBody {
            provider_type: self.auth.provider_type(),
            email_share: &request.email_share,
            email: request.email.as_deref(),
            use_recovery_email: request.use_recovery_email,
        };

        let _: serde_json::Value = self
            .http
            .post("/keys/email-backup", &body, Some(&token))
            .await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody<'a> {
    public_key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApproveSessionBody<'a> {
    session_id: &'a str,
    encrypted_payload: &'a str,
    approver_did: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotifyBody<'a> {
    session_id: &'a str,
    short_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider_type: Option<&'a str>,
}

/// [`QrRelayPort`] over HTTPS. Session creation and lookup are
/// unauthenticated (the requester has no credentials yet); the notify call
/// uses the auth provider when one is available.
pub struct HttpQrRelay {
    http: HttpClient,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl HttpQrRelay {
    /// Connect to the relay at `server_url`.
    pub fn new(server_url: &str, auth: Option<Arc<dyn AuthProvider>>) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(server_url)?,
            auth,
        })
    }

    /// The relay base URL (embedded in QR payloads by callers that need it).
    pub fn relay_url(&self) -> &str {
        self.http.base_url()
    }
}

#[async_trait]
impl QrRelayPort for HttpQrRelay {
    async fn create_session(&self, public_key: &str) -> Result<QrSession> {
        self.http
            .post("/qr-login/session", &CreateSessionBody { public_key }, None)
            .await
    }

    async fn get_session(&self, lookup: &str) -> Result<QrSessionInfo> {
        match self
            .http
            .get(&format!("/qr-login/session/{lookup}"), None)
            .await
        {
            Ok(info) => Ok(info),
            Err(ClientError::NotFound(_)) => Err(ClientError::SessionNotFound),
            Err(e) => Err(e),
        }
    }

    async fn approve_session(
        &self,
        session_id: &str,
        encrypted_payload: &str,
        approver_did: &str,
    ) -> Result<()> {
        let body = ApproveSessionBody {
            session_id,
            encrypted_payload,
            approver_did,
        };

        let _: serde_json::Value = self
            .http
            .post(&format!("/qr-login/session/{session_id}/approve"), &body, None)
            .await?;
        Ok(())
    }

    async fn notify_devices(&self, session_id: &str, short_code: &str) -> Result<NotifyResult> {
        let token = match &self.auth {
            Some(auth) => match auth.id_token().await {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(error = %e, "skipping device notification: no identity token");
                    return Ok(NotifyResult::default());
                }
            },
            None => None,
        };

        let body = NotifyBody {
            session_id,
            short_code,
            provider_type: self.auth.as_ref().map(|a| a.provider_type()),
        };

        self.http
            .post("/qr-login/notify", &body, token.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_auth_share_normalizes_both_wire_shapes() {
        let text: RawAuthShare = serde_json::from_str("\"02abcd\"").unwrap();
        assert_eq!(text.into_share(), "02abcd");

        let object: RawAuthShare =
            serde_json::from_str(r#"{"encryptedData":"02abcd","iv":""}"#).unwrap();
        assert_eq!(object.into_share(), "02abcd");
    }

    #[test]
    fn test_auth_share_response_tolerates_missing_fields() {
        let response: AuthShareResponse = serde_json::from_str("{}").unwrap();
        assert!(response.auth_share.is_none());
        assert!(response.recovery_methods.is_empty());

        let response: AuthShareResponse = serde_json::from_str(
            r#"{
                "authShare": {"encryptedData": "02ff"},
                "keyProvider": "legacy",
                "primaryDid": "did:key:z123",
                "shareVersion": 4,
                "recoveryMethods": [{"type": "password", "createdAt": "2026-01-01T00:00:00Z"}]
            }"#,
        )
        .unwrap();

        assert_eq!(response.key_provider, Some(KeyProvider::Legacy));
        assert_eq!(response.share_version, Some(4));
        assert_eq!(response.recovery_methods.len(), 1);
        assert_eq!(
            response.recovery_methods[0].method_type,
            RecoveryMethodType::Password
        );
    }

    #[test]
    fn test_email_share_body_omits_flag_when_false() {
        let body = EmailShareBody {
            provider_type: "firebase",
            email_share: "0a:02ff",
            email: Some("user@example.com"),
            use_recovery_email: false,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("useRecoveryEmail"));

        let body = EmailShareBody {
            provider_type: "firebase",
            email_share: "02ff",
            email: None,
            use_recovery_email: true,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"useRecoveryEmail\":true"));
    }
}

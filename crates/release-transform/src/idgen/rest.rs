//! HTTP client for the remote component identifier service.
//!
//! The service exposes a token-authenticated JSON API: a session is opened
//! with [`RestIdClient::login`] before the build's first identifier request
//! and closed with [`RestIdClient::logout`] when the build finishes.
//! Network failures and server errors map to transient faults so the caller
//! can retry; client errors map to permanent faults.

use std::collections::HashMap;

use async_trait::async_trait;
use release_types::SctId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::IdServiceError;
use crate::idgen::IdAssignmentClient;

const SOFTWARE_NAME: &str = "release-builder";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SctidRequest<'a> {
    namespace: u32,
    partition_id: &'a str,
    system_id: String,
    release_id: &'a str,
    execution_id: &'a str,
    module_id: &'a str,
    software: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SctidBulkRequest<'a> {
    namespace: u32,
    partition_id: &'a str,
    system_ids: Vec<String>,
    release_id: &'a str,
    execution_id: &'a str,
    module_id: &'a str,
    software: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SctidRecord {
    system_id: String,
    sctid: SctId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SchemeIdBulkRequest {
    system_ids: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemeIdRecord {
    system_id: String,
    scheme_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnomedIdBulkRequest {
    records: Vec<SnomedIdRequestRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnomedIdRequestRecord {
    sct_id: SctId,
    parent_sct_id: Option<SctId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnomedIdRecord {
    sct_id: SctId,
    scheme_id: String,
}

/// Identifier service client over HTTP.
pub struct RestIdClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    token: RwLock<Option<String>>,
}

impl RestIdClient {
    /// Creates a client for the service at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        RestIdClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            token: RwLock::new(None),
        }
    }

    /// Opens an authenticated session.
    pub async fn login(&self) -> Result<(), IdServiceError> {
        let response: LoginResponse = self
            .post_json(
                "login",
                &LoginRequest {
                    username: &self.username,
                    password: &self.password,
                },
            )
            .await?;
        *self.token.write().await = Some(response.token);
        Ok(())
    }

    /// Closes the session. Failures are the caller's to log; the session
    /// expires server-side regardless.
    pub async fn logout(&self) -> Result<(), IdServiceError> {
        let token = self.token.write().await.take();
        if let Some(token) = token {
            let url = format!("{}/logout?token={token}", self.base_url);
            self.http
                .post(url)
                .send()
                .await
                .map_err(|e| IdServiceError::transient(e.to_string()))?;
        }
        Ok(())
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, IdServiceError> {
        let mut url = format!("{}/{endpoint}", self.base_url);
        if let Some(token) = self.token.read().await.as_deref() {
            url = format!("{url}?token={token}");
        }
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| IdServiceError::transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_IMPLEMENTED {
            return Err(IdServiceError::unsupported(endpoint));
        }
        if status.is_server_error() {
            return Err(IdServiceError::transient(format!(
                "{endpoint} returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(IdServiceError::permanent(format!(
                "{endpoint} returned {status}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| IdServiceError::permanent(format!("malformed {endpoint} response: {e}")))
    }

    fn parse_uuid_key(value: &str, endpoint: &str) -> Result<Uuid, IdServiceError> {
        Uuid::parse_str(value).map_err(|_| {
            IdServiceError::permanent(format!("{endpoint} returned non-UUID system id '{value}'"))
        })
    }
}

#[async_trait]
impl IdAssignmentClient for RestIdClient {
    async fn create_sctid(
        &self,
        component_uuid: Uuid,
        namespace_id: u32,
        partition_id: &str,
        release_id: &str,
        execution_id: &str,
        module_id: &str,
    ) -> Result<SctId, IdServiceError> {
        let record: SctidRecord = self
            .post_json(
                "sct/generate",
                &SctidRequest {
                    namespace: namespace_id,
                    partition_id,
                    system_id: component_uuid.to_string(),
                    release_id,
                    execution_id,
                    module_id,
                    software: SOFTWARE_NAME,
                },
            )
            .await?;
        Ok(record.sctid)
    }

    async fn create_sctid_list(
        &self,
        component_uuids: &[Uuid],
        namespace_id: u32,
        partition_id: &str,
        release_id: &str,
        execution_id: &str,
        module_id: &str,
    ) -> Result<HashMap<Uuid, SctId>, IdServiceError> {
        let records: Vec<SctidRecord> = self
            .post_json(
                "sct/bulk/generate",
                &SctidBulkRequest {
                    namespace: namespace_id,
                    partition_id,
                    system_ids: component_uuids.iter().map(Uuid::to_string).collect(),
                    release_id,
                    execution_id,
                    module_id,
                    software: SOFTWARE_NAME,
                },
            )
            .await?;
        let mut map = HashMap::with_capacity(records.len());
        for record in records {
            let uuid = Self::parse_uuid_key(&record.system_id, "sct/bulk/generate")?;
            map.insert(uuid, record.sctid);
        }
        Ok(map)
    }

    async fn create_ctv3_id_list(
        &self,
        component_uuids: &[Uuid],
    ) -> Result<HashMap<Uuid, String>, IdServiceError> {
        let records: Vec<SchemeIdRecord> = self
            .post_json(
                "scheme/CTV3ID/bulk/generate",
                &SchemeIdBulkRequest {
                    system_ids: component_uuids.iter().map(Uuid::to_string).collect(),
                },
            )
            .await?;
        let mut map = HashMap::with_capacity(records.len());
        for record in records {
            let uuid = Self::parse_uuid_key(&record.system_id, "scheme/CTV3ID/bulk/generate")?;
            map.insert(uuid, record.scheme_id);
        }
        Ok(map)
    }

    async fn create_snomed_id_list(
        &self,
        sctid_with_parent: &[(SctId, Option<SctId>)],
    ) -> Result<HashMap<SctId, String>, IdServiceError> {
        let records: Vec<SnomedIdRecord> = self
            .post_json(
                "scheme/SNOMEDID/bulk/generate",
                &SnomedIdBulkRequest {
                    records: sctid_with_parent
                        .iter()
                        .map(|(sct_id, parent_sct_id)| SnomedIdRequestRecord {
                            sct_id: *sct_id,
                            parent_sct_id: *parent_sct_id,
                        })
                        .collect(),
                },
            )
            .await?;
        Ok(records
            .into_iter()
            .map(|record| (record.sct_id, record.scheme_id))
            .collect())
    }
}

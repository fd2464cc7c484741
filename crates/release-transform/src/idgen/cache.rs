//! Cached SCTID assignment with single-flight semantics and bounded retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use release_types::SctId;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::{FaultKind, IdServiceError, TransformError};
use crate::idgen::IdAssignmentClient;

/// Module id parameter used for batched assignment requests.
const BATCH_MODULE_ID_PARAM: &str = "1";

/// Per-execution SCTID assigner and cache.
///
/// Keyed by (namespace, release id, execution id) at construction and
/// discarded with the execution: the cache is the single source of truth for
/// exactly-once assignment within one build run and must never be reused
/// across runs.
///
/// Concurrent callers for the same UUID are serialized on a per-key cell, so
/// the remote call happens exactly once; every subsequent read returns the
/// cached SCTID without touching the service.
pub struct CachedSctidFactory {
    namespace_id: u32,
    release_id: String,
    execution_id: String,
    client: Arc<dyn IdAssignmentClient>,
    cache: DashMap<String, Arc<OnceCell<SctId>>>,
    max_tries: u32,
    retry_delay: Duration,
}

impl CachedSctidFactory {
    /// Creates a factory for one build execution.
    pub fn new(
        namespace_id: u32,
        release_id: impl Into<String>,
        execution_id: impl Into<String>,
        client: Arc<dyn IdAssignmentClient>,
        max_tries: u32,
        retry_delay: Duration,
    ) -> Self {
        CachedSctidFactory {
            namespace_id,
            release_id: release_id.into(),
            execution_id: execution_id.into(),
            client,
            cache: DashMap::new(),
            max_tries: max_tries.max(1),
            retry_delay,
        }
    }

    /// Resolves one component UUID to an SCTID.
    ///
    /// On a cache miss the remote service is called once, with transient
    /// faults retried up to the configured attempt count at a fixed delay.
    /// On a hit the cached value is returned without a remote call.
    pub async fn get_sctid(
        &self,
        component_uuid: &str,
        partition_id: &str,
        module_id: &str,
    ) -> Result<SctId, TransformError> {
        let uuid = Uuid::parse_str(component_uuid).map_err(|_| TransformError::InvalidUuid {
            value: component_uuid.to_string(),
        })?;
        let cell = self
            .cache
            .entry(component_uuid.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        cell.get_or_try_init(|| async {
            self.create_with_retry(uuid, partition_id, module_id).await
        })
        .await
        .copied()
    }

    /// Resolves a batch of component UUIDs in one remote call.
    ///
    /// Already-cached UUIDs are served from the cache; the rest go to the
    /// service as a single list request. The result is equivalent to calling
    /// [`get_sctid`](Self::get_sctid) per UUID.
    pub async fn get_sctids(
        &self,
        component_uuids: &[String],
        partition_id: &str,
    ) -> Result<HashMap<String, SctId>, TransformError> {
        let mut results = HashMap::with_capacity(component_uuids.len());
        let mut unresolved = Vec::new();
        for uuid_string in component_uuids {
            match self.get_cached(uuid_string) {
                Some(sctid) => {
                    results.insert(uuid_string.clone(), sctid);
                }
                None => {
                    let uuid =
                        Uuid::parse_str(uuid_string).map_err(|_| TransformError::InvalidUuid {
                            value: uuid_string.clone(),
                        })?;
                    unresolved.push(uuid);
                }
            }
        }
        if unresolved.is_empty() {
            return Ok(results);
        }

        tracing::info!(batch_size = unresolved.len(), "batch id assignment lookup");
        let mut attempt = 1;
        let assigned = loop {
            match self
                .client
                .create_sctid_list(
                    &unresolved,
                    self.namespace_id,
                    partition_id,
                    &self.release_id,
                    &self.execution_id,
                    BATCH_MODULE_ID_PARAM,
                )
                .await
            {
                Ok(map) => break map,
                Err(fault) => attempt = self.handle_fault(fault, attempt).await?,
            }
        };

        for (uuid, sctid) in assigned {
            let uuid_string = uuid.to_string();
            let cell = self
                .cache
                .entry(uuid_string.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();
            // A concurrent single-path caller may have won the race; the
            // cached value stays authoritative either way.
            let _ = cell.set(sctid);
            if let Some(cached) = cell.get() {
                results.insert(uuid_string, *cached);
            }
        }
        Ok(results)
    }

    /// Reads a previously assigned SCTID without a remote call.
    pub fn get_cached(&self, component_uuid: &str) -> Option<SctId> {
        self.cache
            .get(component_uuid)
            .and_then(|cell| cell.get().copied())
    }

    /// Returns every (UUID, SCTID) pair resolved so far.
    pub fn resolved_entries(&self) -> Vec<(String, SctId)> {
        self.cache
            .iter()
            .filter_map(|entry| entry.value().get().map(|sctid| (entry.key().clone(), *sctid)))
            .collect()
    }

    async fn create_with_retry(
        &self,
        uuid: Uuid,
        partition_id: &str,
        module_id: &str,
    ) -> Result<SctId, TransformError> {
        let mut attempt = 1;
        loop {
            match self
                .client
                .create_sctid(
                    uuid,
                    self.namespace_id,
                    partition_id,
                    &self.release_id,
                    &self.execution_id,
                    module_id,
                )
                .await
            {
                Ok(sctid) => return Ok(sctid),
                Err(fault) => attempt = self.handle_fault(fault, attempt).await?,
            }
        }
    }

    /// Decides whether a fault is retried. Returns the next attempt number,
    /// or the terminal error once retries are exhausted or the fault is not
    /// retryable.
    async fn handle_fault(
        &self,
        fault: IdServiceError,
        attempt: u32,
    ) -> Result<u32, TransformError> {
        if fault.kind != FaultKind::Transient {
            return Err(TransformError::IdAssignment(fault));
        }
        if attempt >= self.max_tries {
            return Err(TransformError::RetryExhausted {
                attempts: attempt,
                source: fault,
            });
        }
        tracing::warn!(
            attempt,
            delay_ms = self.retry_delay.as_millis() as u64,
            fault = %fault,
            "id assignment lookup failed, waiting before retry"
        );
        tokio::time::sleep(self.retry_delay).await;
        Ok(attempt + 1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Test client that counts remote calls and fails a configured number of
    /// times before succeeding.
    struct CountingIdClient {
        calls: AtomicU32,
        failures_before_success: u32,
    }

    impl CountingIdClient {
        fn new(failures_before_success: u32) -> Self {
            CountingIdClient {
                calls: AtomicU32::new(0),
                failures_before_success,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdAssignmentClient for CountingIdClient {
        async fn create_sctid(
            &self,
            _component_uuid: Uuid,
            _namespace_id: u32,
            _partition_id: &str,
            _release_id: &str,
            _execution_id: &str,
            _module_id: &str,
        ) -> Result<SctId, IdServiceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(IdServiceError::transient("connection reset"))
            } else {
                Ok(123456789010)
            }
        }

        async fn create_sctid_list(
            &self,
            component_uuids: &[Uuid],
            _namespace_id: u32,
            _partition_id: &str,
            _release_id: &str,
            _execution_id: &str,
            _module_id: &str,
        ) -> Result<HashMap<Uuid, SctId>, IdServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(component_uuids
                .iter()
                .enumerate()
                .map(|(i, uuid)| (*uuid, 100001 + i as u64))
                .collect())
        }

        async fn create_ctv3_id_list(
            &self,
            _component_uuids: &[Uuid],
        ) -> Result<HashMap<Uuid, String>, IdServiceError> {
            Err(IdServiceError::unsupported("createCTV3IDList"))
        }

        async fn create_snomed_id_list(
            &self,
            _sctid_with_parent: &[(SctId, Option<SctId>)],
        ) -> Result<HashMap<SctId, String>, IdServiceError> {
            Err(IdServiceError::unsupported("createSNOMEDIDList"))
        }
    }

    fn factory(client: Arc<CountingIdClient>, max_tries: u32) -> CachedSctidFactory {
        CachedSctidFactory::new(
            0,
            "20240101",
            "build-1",
            client,
            max_tries,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_cache_hit_avoids_remote_call() {
        let client = Arc::new(CountingIdClient::new(0));
        let factory = factory(client.clone(), 3);
        let uuid = Uuid::new_v4().to_string();

        let first = factory.get_sctid(&uuid, "00", "mod").await.unwrap();
        let second = factory.get_sctid(&uuid, "00", "mod").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(client.calls(), 1);
        assert_eq!(factory.get_cached(&uuid), Some(first));
    }

    #[tokio::test]
    async fn test_concurrent_calls_make_exactly_one_remote_call() {
        let client = Arc::new(CountingIdClient::new(0));
        let factory = Arc::new(factory(client.clone(), 3));
        let uuid = Uuid::new_v4().to_string();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let factory = factory.clone();
            let uuid = uuid.clone();
            handles.push(tokio::spawn(async move {
                factory.get_sctid(&uuid, "00", "mod").await.unwrap()
            }));
        }
        let mut sctids = Vec::new();
        for handle in handles {
            sctids.push(handle.await.unwrap());
        }
        assert!(sctids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_retried_until_success() {
        let client = Arc::new(CountingIdClient::new(2));
        let factory = factory(client.clone(), 3);
        let uuid = Uuid::new_v4().to_string();

        let sctid = factory.get_sctid(&uuid, "00", "mod").await.unwrap();
        assert_eq!(sctid, 123456789010);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_fails() {
        let client = Arc::new(CountingIdClient::new(u32::MAX));
        let factory = factory(client.clone(), 3);
        let uuid = Uuid::new_v4().to_string();

        let err = factory.get_sctid(&uuid, "00", "mod").await.unwrap_err();
        match err {
            TransformError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected retry exhaustion, got {other}"),
        }
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_invalid_uuid_rejected_without_remote_call() {
        let client = Arc::new(CountingIdClient::new(0));
        let factory = factory(client.clone(), 3);

        let err = factory.get_sctid("123456789", "00", "mod").await.unwrap_err();
        assert!(matches!(err, TransformError::InvalidUuid { .. }));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_batch_populates_cache() {
        let client = Arc::new(CountingIdClient::new(0));
        let factory = factory(client.clone(), 3);
        let uuids: Vec<String> = (0..3).map(|_| Uuid::new_v4().to_string()).collect();

        let assigned = factory.get_sctids(&uuids, "00").await.unwrap();
        assert_eq!(assigned.len(), 3);
        assert_eq!(client.calls(), 1);
        for uuid in &uuids {
            assert_eq!(factory.get_cached(uuid), Some(assigned[uuid]));
        }

        // A second batch for the same UUIDs is served from cache.
        let again = factory.get_sctids(&uuids, "00").await.unwrap();
        assert_eq!(again, assigned);
        assert_eq!(client.calls(), 1);
    }
}

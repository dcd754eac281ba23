use crate::error::{Error, Result, SharedFetchError};
use chrono::{DateTime, Utc};
use common::ApiClient;
use faststr::FastStr;
use flight::{KVCache, SingleFlightCache, SingleFlightConfig, TtlCache};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

const TENANT_PATH: &str = "tenant/info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantInfo {
    pub id:              u64,
    pub tenant_name:     FastStr,
    #[serde(default)]
    pub business_number: Option<FastStr>,
    #[serde(default)]
    pub time_zone:       Option<FastStr>,
    #[serde(default)]
    pub is_use:          bool,
    #[serde(skip, default = "Utc::now")]
    pub fetched_at:      DateTime<Utc>,
}

pub trait TenantSource: Send + Sync + 'static {
    fn fetch_tenant(
        &self,
        tenant_id: u64,
    ) -> impl Future<Output = common::error::Result<Option<TenantInfo>>> + Send;
}

impl TenantSource for ApiClient {
    async fn fetch_tenant(&self, tenant_id: u64) -> common::error::Result<Option<TenantInfo>> {
        self.get(TENANT_PATH, &[("tenantId", tenant_id.to_string())])
            .await
    }
}

type TenantFlights = SingleFlightCache<u64, Option<TenantInfo>, SharedFetchError>;

/// Tenant lookups: a TTL memo in front, request coalescing behind it.
///
/// One instance lives for one signed-in session; call [`reset`](Self::reset)
/// when the session or tenant context changes.
///
/// Every `invalidate`/`reset` bumps `epoch`. A fetch only memoizes its result
/// when no bump happened between its start and its write.
pub struct TenantInfoService<S, C = TtlCache<u64, TenantInfo>> {
    source:  Arc<S>,
    memo:    C,
    flights: TenantFlights,
    epoch:   Arc<AtomicU64>,
}

impl<S, C: Clone> Clone for TenantInfoService<S, C> {
    fn clone(&self) -> Self {
        Self {
            source:  Arc::clone(&self.source),
            memo:    self.memo.clone(),
            flights: self.flights.clone(),
            epoch:   Arc::clone(&self.epoch),
        }
    }
}

impl<S, C> TenantInfoService<S, C>
where
    S: TenantSource,
    C: KVCache<u64, TenantInfo>,
{
    pub fn new(source: S, memo: C, config: SingleFlightConfig) -> Self {
        Self {
            source: Arc::new(source),
            memo,
            flights: SingleFlightCache::new(config),
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn tenant(&self, tenant_id: u64) -> Result<TenantInfo> {
        if let Some(info) = self.memo.get(&tenant_id).await {
            debug!(tenant_id, "tenant info served from memo");
            return Ok(info);
        }

        let source = Arc::clone(&self.source);
        let memo = self.memo.clone();
        let epoch = Arc::clone(&self.epoch);
        let started = epoch.load(Ordering::SeqCst);
        let info = self
            .flights
            .get(tenant_id, move || async move {
                let fetched: std::result::Result<_, SharedFetchError> =
                    source.fetch_tenant(tenant_id).await.map_err(Arc::new);
                if let Ok(Some(info)) = &fetched {
                    if epoch.load(Ordering::SeqCst) == started {
                        memo.set(tenant_id, info.clone()).await;
                    }
                    // An invalidation may land between the check and the write.
                    if epoch.load(Ordering::SeqCst) != started {
                        memo.invalidate(&tenant_id).await;
                        debug!(tenant_id, "tenant info invalidated mid-fetch, not memoized");
                    }
                }
                fetched
            })
            .await?;

        info.ok_or_else(|| Error::NotFound(format!("tenant {tenant_id}").into()))
    }

    pub async fn invalidate(&self, tenant_id: u64) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.memo.invalidate(&tenant_id).await;
        self.flights.evict(&tenant_id);
    }

    /// Forgets everything, e.g. on logout.
    pub fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.memo.invalidate_all();
        self.flights.clear();
        info!("tenant info cache reset");
    }

    pub fn stats(&self) -> &flight::FlightStats {
        self.flights.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FakeTenants {
        calls: Arc<AtomicUsize>,
    }

    impl TenantSource for FakeTenants {
        async fn fetch_tenant(&self, tenant_id: u64) -> common::error::Result<Option<TenantInfo>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if tenant_id == 0 {
                return Ok(None);
            }
            if tenant_id == 500 {
                return Err(common::error::Error::MsgError("tenant service down".into()));
            }
            Ok(Some(TenantInfo {
                id:              tenant_id,
                tenant_name:     format!("tenant-{tenant_id}").into(),
                business_number: None,
                time_zone:       Some("Asia/Seoul".into()),
                is_use:          true,
                fetched_at:      Utc::now(),
            }))
        }
    }

    fn service() -> (Arc<AtomicUsize>, TenantInfoService<FakeTenants>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = TenantInfoService::new(
            FakeTenants {
                calls: Arc::clone(&calls),
            },
            TtlCache::new(10, Duration::from_secs(60)),
            SingleFlightConfig::default().with_grace_period(Duration::from_millis(50)),
        );
        (calls, service)
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_fetch() {
        let (calls, service) = service();
        let (a, b, c) = tokio::join!(service.tenant(3), service.tenant(3), service.tenant(3));
        assert_eq!(a.unwrap().tenant_name.as_str(), "tenant-3");
        assert_eq!(b.unwrap().id, 3);
        assert_eq!(c.unwrap().id, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.stats().joined(), 2);
    }

    #[tokio::test]
    async fn test_memo_outlives_grace_period() {
        let (calls, service) = service();
        service.tenant(3).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        service.tenant(3).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_refetches() {
        let (calls, service) = service();
        service.tenant(3).await.unwrap();
        service.invalidate(3).await;
        service.tenant(3).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        service.reset();
        service.tenant(3).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_missing_tenant_is_not_found() {
        let (_, service) = service();
        assert!(matches!(service.tenant(0).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_failure_not_memoized() {
        let (calls, service) = service();
        assert!(matches!(service.tenant(500).await, Err(Error::Fetch(_))));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(service.tenant(500).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_during_fetch_does_not_memoize() {
        let (calls, service) = service();
        let pending = tokio::spawn({
            let service = service.clone();
            async move { service.tenant(3).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        service.reset();

        // The waiter still gets the answer it asked for.
        assert_eq!(pending.await.unwrap().unwrap().id, 3);
        service.tenant(3).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_does_not_memoize() {
        let (calls, service) = service();
        let pending = tokio::spawn({
            let service = service.clone();
            async move { service.tenant(3).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        service.invalidate(3).await;

        assert_eq!(pending.await.unwrap().unwrap().id, 3);
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.tenant(3).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_leaves_other_tenants_memoized() {
        let (calls, service) = service();
        service.tenant(3).await.unwrap();
        service.invalidate(4).await;
        service.tenant(3).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

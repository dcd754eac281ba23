use crate::error::{Result, SharedFetchError};
use chrono::NaiveDateTime;
use common::ApiClient;
use common::api::PagedData;
use faststr::FastStr;
use flight::{CompositeKey, KeyError, KeyPart, SingleFlightCache, SingleFlightConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const DETAIL_PATH: &str = "mold/mold-order/detail";
const DETAIL_NAMESPACE: &str = "mold-order-detail";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoldOrderDetail {
    pub id:                   u64,
    #[serde(default)]
    pub tenant_id:            Option<u64>,
    pub mold_order_master_id: u64,
    #[serde(default)]
    pub mold_master_id:       Option<u64>,
    #[serde(default)]
    pub item_id:              Option<u64>,
    #[serde(default)]
    pub progress_id:          Option<u64>,
    #[serde(default)]
    pub order_month:          Option<FastStr>,
    #[serde(default)]
    pub account_month:        Option<FastStr>,
    #[serde(default)]
    pub in_month:             Option<FastStr>,
    #[serde(default)]
    pub in_date:              Option<FastStr>,
    #[serde(default)]
    pub num:                  Option<i64>,
    #[serde(default)]
    pub order_price:          Option<f64>,
    #[serde(default)]
    pub order_amount:         Option<f64>,
    #[serde(default)]
    pub is_in:                bool,
    #[serde(default)]
    pub vendor_id:            Option<u64>,
    #[serde(default)]
    pub vendor_name:          Option<FastStr>,
    #[serde(default)]
    pub is_dev:               bool,
    #[serde(default)]
    pub is_change:            bool,
    #[serde(default)]
    pub created_at:           Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_at:           Option<NaiveDateTime>,
}

/// One page of details under a mold order master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetailPageQuery {
    pub master_id: u64,
    pub page:      u32,
    pub size:      u32,
}

impl DetailPageQuery {
    pub fn new(master_id: u64, page: u32, size: u32) -> Self {
        Self {
            master_id,
            page,
            size,
        }
    }

    /// Every parameter that changes the response is part of the key.
    pub fn key(&self) -> std::result::Result<CompositeKey, KeyError> {
        if self.size == 0 {
            return Err(KeyError::new("page size must be positive"));
        }
        CompositeKey::builder(DETAIL_NAMESPACE)
            .part(self.master_id)
            .part(self.page)
            .part(self.size)
            .build()
    }

    fn params(&self) -> [(&'static str, String); 3] {
        [
            ("moldOrderMasterId", self.master_id.to_string()),
            ("page", self.page.to_string()),
            ("size", self.size.to_string()),
        ]
    }
}

pub trait MoldOrderSource: Send + Sync + 'static {
    fn fetch_details(
        &self,
        query: DetailPageQuery,
    ) -> impl Future<Output = common::error::Result<Vec<MoldOrderDetail>>> + Send;
}

impl MoldOrderSource for ApiClient {
    async fn fetch_details(
        &self,
        query: DetailPageQuery,
    ) -> common::error::Result<Vec<MoldOrderDetail>> {
        let page: Option<PagedData<MoldOrderDetail>> =
            self.get(DETAIL_PATH, &query.params()).await?;
        Ok(page.map(PagedData::into_vec).unwrap_or_default())
    }
}

pub type DetailFlights = SingleFlightCache<CompositeKey, Arc<Vec<MoldOrderDetail>>, SharedFetchError>;

/// Paged detail reads. Concurrent requests for the same page share one
/// backend call.
pub struct MoldOrderDetailService<S> {
    source:  Arc<S>,
    flights: DetailFlights,
}

impl<S> Clone for MoldOrderDetailService<S> {
    fn clone(&self) -> Self {
        Self {
            source:  Arc::clone(&self.source),
            flights: self.flights.clone(),
        }
    }
}

impl<S: MoldOrderSource> MoldOrderDetailService<S> {
    pub fn new(source: S, config: SingleFlightConfig) -> Self {
        Self::with_flights(Arc::new(source), SingleFlightCache::new(config))
    }

    pub fn with_flights(source: Arc<S>, flights: DetailFlights) -> Self {
        Self { source, flights }
    }

    pub fn flights(&self) -> &DetailFlights {
        &self.flights
    }

    pub async fn details(&self, query: DetailPageQuery) -> Result<Arc<Vec<MoldOrderDetail>>> {
        let key = query.key()?;
        let source = Arc::clone(&self.source);
        let rows = self
            .flights
            .get(key, move || async move {
                debug!(?query, "fetching mold order details");
                source
                    .fetch_details(query)
                    .await
                    .map(Arc::new)
                    .map_err(Arc::new)
            })
            .await?;
        Ok(rows)
    }

    pub fn pending_count(&self, query: &DetailPageQuery) -> usize {
        query
            .key()
            .map(|key| self.flights.pending_count(&key))
            .unwrap_or(0)
    }

    /// Drops every cached page of `master_id`; call after writing to it.
    pub fn invalidate_master(&self, master_id: u64) -> usize {
        let master = KeyPart::from(master_id);
        let dropped = self.flights.evict_matching(|key| {
            key.namespace() == DETAIL_NAMESPACE && key.parts().first() == Some(&master)
        });
        info!(master_id, dropped, "mold order detail pages invalidated");
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeSource {
        calls: AtomicUsize,
        fail:  bool,
    }

    impl MoldOrderSource for FakeSource {
        async fn fetch_details(
            &self,
            query: DetailPageQuery,
        ) -> common::error::Result<Vec<MoldOrderDetail>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            if self.fail {
                return Err(common::error::Error::ApiError {
                    code:    500,
                    message: "detail lookup failed".into(),
                });
            }
            Ok((0..query.size.min(2))
                .map(|i| detail(query.master_id, u64::from(query.page) * 100 + u64::from(i)))
                .collect())
        }
    }

    fn detail(master_id: u64, id: u64) -> MoldOrderDetail {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "moldOrderMasterId": master_id,
            "vendorName": "Hanil Mold",
            "isIn": false,
            "createdAt": "2025-03-02T09:15:00"
        }))
        .unwrap()
    }

    fn service(fail: bool) -> (Arc<FakeSource>, MoldOrderDetailService<FakeSource>) {
        let source = Arc::new(FakeSource {
            calls: AtomicUsize::new(0),
            fail,
        });
        let flights = SingleFlightCache::new(
            SingleFlightConfig::default().with_grace_period(Duration::from_secs(1)),
        );
        let service = MoldOrderDetailService::with_flights(Arc::clone(&source), flights);
        (source, service)
    }

    #[test]
    fn test_detail_dto_parses_backend_shape() {
        let row = detail(42, 1);
        assert_eq!(row.mold_order_master_id, 42);
        assert_eq!(row.vendor_name.as_deref(), Some("Hanil Mold"));
        assert!(row.created_at.is_some());
        assert!(row.order_price.is_none());
    }

    #[test]
    fn test_query_key_includes_every_parameter() {
        let key = DetailPageQuery::new(42, 0, 20).key().unwrap();
        assert_eq!(key.to_string(), "mold-order-detail:42:0:20");
        assert_ne!(key, DetailPageQuery::new(42, 1, 20).key().unwrap());
        assert!(DetailPageQuery::new(42, 0, 0).key().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_page_requests_hit_backend_once() {
        let (source, service) = service(false);
        let query = DetailPageQuery::new(42, 0, 20);

        let (a, b, c) = tokio::join!(
            service.details(query),
            service.details(query),
            service.details(query)
        );
        let a = a.unwrap();
        assert!(Arc::ptr_eq(&a, &b.unwrap()));
        assert!(Arc::ptr_eq(&a, &c.unwrap()));
        assert_eq!(a.len(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(service.pending_count(&query), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_pages_fetch_separately() {
        let (source, service) = service(false);
        let (first, second) = tokio::join!(
            service.details(DetailPageQuery::new(42, 0, 20)),
            service.details(DetailPageQuery::new(42, 1, 20))
        );
        assert_ne!(first.unwrap()[0].id, second.unwrap()[0].id);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_failure_shared_by_all_callers() {
        let (source, service) = service(true);
        let query = DetailPageQuery::new(7, 0, 10);
        let (a, b) = tokio::join!(service.details(query), service.details(query));

        match (a, b) {
            (Err(Error::Fetch(a)), Err(Error::Fetch(b))) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_query_rejected_before_fetch() {
        let (source, service) = service(false);
        let result = service.details(DetailPageQuery::new(7, 0, 0)).await;
        assert!(matches!(result, Err(Error::InvalidKey(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_master_forces_refetch() {
        let (source, service) = service(false);
        service.details(DetailPageQuery::new(42, 0, 20)).await.unwrap();
        service.details(DetailPageQuery::new(42, 1, 20)).await.unwrap();
        service.details(DetailPageQuery::new(43, 0, 20)).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        assert_eq!(service.invalidate_master(42), 2);
        service.details(DetailPageQuery::new(42, 0, 20)).await.unwrap();
        service.details(DetailPageQuery::new(43, 0, 20)).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    }
}

use anyhow::Result;
use common::{ApiClient, Config};
use data_access::{DetailPageQuery, MoldOrderDetailService, TenantInfo, TenantInfoService};
use dotenvy::dotenv;
use flight::{SingleFlightConfig, TtlCache};
use futures_util::future::join_all;
use tracing::{info, warn};

const BURST: usize = 3;

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = common::logging_stdout();
    dotenv().ok();

    let config = Config::from_env()?;
    let client = ApiClient::new(&config)?;
    let flights = SingleFlightConfig::default().with_grace_period(config.grace_period);

    let details = MoldOrderDetailService::new(client.clone(), flights.clone());
    let memo: TtlCache<u64, TenantInfo> =
        TtlCache::new(config.tenant_cache_capacity, config.tenant_cache_ttl);
    let tenants = TenantInfoService::new(client.clone(), memo, flights);

    if let Some(tenant_id) = client.tenant_id().and_then(|t| t.parse::<u64>().ok()) {
        match tenants.tenant(tenant_id).await {
            Ok(tenant) => info!(tenant_id, name = %tenant.tenant_name, "tenant loaded"),
            Err(e) => warn!(tenant_id, error = %e, "tenant lookup failed"),
        }
    }

    let master_id = config.mold_order_master_id;
    let query = DetailPageQuery::new(master_id, 0, 20);

    let results = join_all((0..BURST).map(|_| details.details(query))).await;
    let requests = details.pending_count(&query);
    for result in results {
        match result {
            Ok(rows) => info!(master_id, rows = rows.len(), "mold order details loaded"),
            Err(e) => warn!(master_id, error = %e, "mold order detail lookup failed"),
        }
    }
    let stats = details.flights().stats();
    info!(
        requests,
        leaders = stats.leaders(),
        joined = stats.joined(),
        dedup_ratio = stats.dedup_ratio(),
        "request coalescing summary"
    );

    Ok(())
}

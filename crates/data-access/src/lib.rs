//! Typed backend reads that go through a shared [`flight::SingleFlightCache`].

pub mod error;
pub mod mold_order;
pub mod tenant;

pub use error::{Error, Result};
pub use mold_order::{DetailPageQuery, MoldOrderDetail, MoldOrderDetailService, MoldOrderSource};
pub use tenant::{TenantInfo, TenantInfoService, TenantSource};

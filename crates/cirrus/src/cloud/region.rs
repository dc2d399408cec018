//! Region resolution.

use std::collections::BTreeSet;

use snafu::prelude::*;
use tracing::debug;

use super::{CloudProviderRef, Session};
use crate::error::{EnabledRegionsSnafu, RegionResolutionError, ServiceRegionsSnafu};

/// Services whose API is global but still needs a region to talk to.
pub const GLOBAL_SERVICES: &[&str] = &["cloudfront", "s3"];

/// Pseudo-region used for global services.
pub const GLOBAL_REGION: &str = "us-east-1";

const PARTITION: &str = "aws";

const ENABLED_OPT_IN_STATUSES: &[&str] = &["opt-in-not-required", "opted-in"];

#[derive(Clone)]
pub struct RegionResolver {
    provider: CloudProviderRef,
}

impl RegionResolver {
    pub fn new(provider: CloudProviderRef) -> Self {
        Self { provider }
    }

    /// Regions to query for `service` in the session's account, sorted.
    ///
    /// Explicit regions are returned unchanged without touching the API.
    pub async fn resolve(
        &self,
        session: &Session,
        service: &str,
        explicit: Option<&[String]>,
    ) -> Result<Vec<String>, RegionResolutionError> {
        if let Some(regions) = explicit {
            return Ok(regions.to_vec());
        }
        if GLOBAL_SERVICES.contains(&service) {
            return Ok(vec![GLOBAL_REGION.to_string()]);
        }

        let offered: BTreeSet<String> = self
            .provider
            .service_regions(session, service, PARTITION)
            .await
            .context(ServiceRegionsSnafu { service })?
            .into_iter()
            .collect();

        // The service list ignores regions the account has not opted into.
        let enabled: BTreeSet<String> = self
            .provider
            .enabled_regions(session, ENABLED_OPT_IN_STATUSES)
            .await
            .context(EnabledRegionsSnafu)?
            .into_iter()
            .collect();

        let regions: Vec<String> = offered.intersection(&enabled).cloned().collect();
        debug!(service, regions = regions.len(), "Resolved regions");
        Ok(regions)
    }
}

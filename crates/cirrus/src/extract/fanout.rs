//! Fan-out of the extraction call over accounts and regions.

use futures::future::try_join_all;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use snafu::IntoError;
use snafu::prelude::*;
use tracing::info;

use super::collector::{CallRequest, PaginatedCollector, RawItem};
use crate::cloud::AccountSession;
use crate::config::AccountConfig;
use crate::descriptor::ResourceDescriptor;
use crate::error::{AuthenticationSnafu, ExtractSnafu, PipelineError, RegionResolutionSnafu};

impl PaginatedCollector {
    /// Run the descriptor's extraction call in every account and resolved
    /// region, merging the per-(account, region) sequences into one stream.
    ///
    /// Sessions are acquired once per account. Items arrive in no particular
    /// order.
    pub fn from_descriptor(
        &self,
        accounts: &[AccountConfig],
        descriptor: &ResourceDescriptor,
    ) -> BoxStream<'static, Result<RawItem, PipelineError>> {
        let collector = self.clone();
        let accounts = accounts.to_vec();
        let descriptor = descriptor.clone();

        let setup = async move {
            let targets = try_join_all(
                accounts
                    .iter()
                    .map(|account| collector.targets(account, &descriptor)),
            )
            .await?;

            let streams: Vec<_> = targets
                .into_iter()
                .flatten()
                .map(|(connected, region)| {
                    let request = CallRequest {
                        session: connected.session,
                        account_id: connected.account_id,
                        region,
                        params: descriptor.extract.params.clone(),
                        call: descriptor.extract.clone(),
                        add_metadata: true,
                    };
                    let resource = descriptor.key.clone();
                    collector
                        .collect(request)
                        .map_err(move |source| ExtractSnafu { resource: &resource }.into_error(source))
                        .boxed()
                })
                .collect();

            info!(
                target = %descriptor.key,
                accounts = accounts.len(),
                streams = streams.len(),
                "Extracting"
            );
            Ok::<_, PipelineError>(stream::select_all(streams))
        };

        stream::once(setup).try_flatten().boxed()
    }

    /// Connect to one account and list the regions to query in it.
    async fn targets(
        &self,
        account: &AccountConfig,
        descriptor: &ResourceDescriptor,
    ) -> Result<Vec<(AccountSession, String)>, PipelineError> {
        let connected = self
            .sessions
            .connect(account)
            .await
            .context(AuthenticationSnafu {
                resource: &descriptor.key,
            })?;

        let regions = self
            .regions
            .resolve(
                &connected.session,
                &descriptor.extract.service,
                descriptor.extract.regions.as_deref(),
            )
            .await
            .context(RegionResolutionSnafu {
                resource: &descriptor.key,
            })?;

        Ok(regions
            .into_iter()
            .map(|region| (connected.clone(), region))
            .collect())
    }
}

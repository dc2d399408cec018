//! Secondary per-item API calls.

use futures::future::try_join_all;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use snafu::prelude::*;
use tracing::debug;

use crate::descriptor::{CallSpec, METADATA_ROOT, RESOURCE_ROOT, ResourceDescriptor};
use crate::error::{
    EnrichSnafu, EnrichmentError, FailedSnafu, MissingMetadataSnafu, ParametersSnafu,
    PipelineError,
};
use crate::extract::{CallRequest, ItemMetadata, PaginatedCollector, RawItem};
use crate::metrics::events::EnrichmentCall;
use crate::template;
use cirrus_common::emit;

/// The document columns are evaluated against.
///
/// Holds the extracted item under `resource`, its origin under `metadata`
/// and each enrichment result under the enrichment's name.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedItem(Value);

impl EnrichedItem {
    /// Wrap an already assembled document.
    pub fn from_value(document: Value) -> Self {
        Self(document)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Runs a descriptor's enrichment calls for each extracted item.
#[derive(Clone)]
pub struct Enricher {
    collector: PaginatedCollector,
    target: String,
    enrichments: IndexMap<String, CallSpec>,
}

impl Enricher {
    pub fn new(collector: PaginatedCollector, descriptor: &ResourceDescriptor) -> Self {
        Self {
            collector,
            target: descriptor.key.clone(),
            enrichments: descriptor.enrichments.clone(),
        }
    }

    /// Enrich one item.
    ///
    /// Every call runs in the item's account and region with parameters
    /// rendered from the item. The first item a call yields is its result; a
    /// call yielding nothing contributes `null`.
    ///
    /// A placeholder item has nothing to render parameters from, so no calls
    /// are made and every enrichment is `null`.
    pub async fn enrich(&self, item: RawItem) -> Result<EnrichedItem, EnrichmentError> {
        let metadata = item.metadata.as_ref();
        if item.placeholder {
            debug!(target = %self.target, "Skipping enrichment of placeholder item");
            let nulls = self.enrichments.keys().map(|name| (name.clone(), Value::Null));
            return Ok(document(item.data, metadata, nulls));
        }

        let view = item.template_view();
        let calls = self.enrichments.iter().map(|(name, call)| {
            let view = &view;
            async move {
                let metadata = metadata.context(MissingMetadataSnafu { name })?;
                let params = template::render(&call.params, view).context(ParametersSnafu { name })?;
                let request = CallRequest {
                    session: metadata.session.clone(),
                    account_id: metadata.account_id.clone(),
                    region: metadata.region.clone(),
                    call: call.clone(),
                    params,
                    add_metadata: false,
                };

                emit!(EnrichmentCall {
                    target: self.target.clone(),
                    name: name.clone(),
                });
                let first = self
                    .collector
                    .collect(request)
                    .try_next()
                    .await
                    .context(FailedSnafu { name })?;
                Ok::<_, EnrichmentError>((name.clone(), first.map(|item| item.data).unwrap_or(Value::Null)))
            }
        });
        let results = try_join_all(calls).await?;
        Ok(document(item.data, metadata, results))
    }

    /// Enrich a stream of items, at most `concurrency` at a time.
    ///
    /// Output order is not preserved.
    pub fn enrich_stream(
        self,
        items: BoxStream<'static, Result<RawItem, PipelineError>>,
        concurrency: Option<usize>,
    ) -> BoxStream<'static, Result<EnrichedItem, PipelineError>> {
        let limit = concurrency.unwrap_or(usize::MAX).max(1);
        items
            .map(move |item| {
                let enricher = self.clone();
                async move {
                    let item = item?;
                    enricher.enrich(item).await.context(EnrichSnafu {
                        resource: enricher.target.clone(),
                    })
                }
            })
            .buffer_unordered(limit)
            .boxed()
    }
}

fn document(
    resource: Value,
    metadata: Option<&ItemMetadata>,
    results: impl IntoIterator<Item = (String, Value)>,
) -> EnrichedItem {
    let mut document = Map::new();
    document.insert(RESOURCE_ROOT.to_string(), resource);
    document.insert(
        METADATA_ROOT.to_string(),
        metadata.map(ItemMetadata::to_value).unwrap_or(Value::Null),
    );
    document.extend(results);
    EnrichedItem(Value::Object(document))
}

//! Paginated retrieval of one API operation.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::cloud::{ApiClient, CloudProviderRef, RegionResolver, RetryPolicy, Session, SessionProvider};
use crate::descriptor::CallSpec;
use crate::error::{ApiCallError, CloudError};
use crate::metrics::events::{ExpectedErrorSuppressed, ItemsExtracted};
use cirrus_common::emit;

/// Where an item came from.
#[derive(Debug, Clone)]
pub struct ItemMetadata {
    pub account_id: String,
    pub region: String,
    /// Session the item was read with, reused for enrichment calls.
    pub session: Arc<Session>,
}

impl ItemMetadata {
    /// The serializable part of the metadata. The session never leaves the process.
    pub fn to_value(&self) -> Value {
        json!({
            "account_id": self.account_id,
            "region": self.region,
        })
    }
}

/// One element of an API result.
#[derive(Debug, Clone)]
pub struct RawItem {
    pub data: Value,
    pub metadata: Option<ItemMetadata>,
    /// Stands in for a suppressed error. `data` is empty.
    pub placeholder: bool,
}

impl RawItem {
    /// The document placeholders are resolved against: the item's fields plus
    /// `metadata.account_id` and `metadata.region`.
    pub fn template_view(&self) -> Value {
        let mut view = self.data.clone();
        if let (Value::Object(map), Some(metadata)) = (&mut view, &self.metadata) {
            map.insert("metadata".to_string(), metadata.to_value());
        }
        view
    }
}

/// Everything needed to run one call against one account and region.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub session: Arc<Session>,
    pub account_id: String,
    pub region: String,
    pub call: CallSpec,
    /// Parameters to send; usually `call.params` after placeholder substitution.
    pub params: Value,
    /// Whether yielded items carry metadata.
    pub add_metadata: bool,
}

impl CallRequest {
    fn metadata(&self) -> Option<ItemMetadata> {
        self.add_metadata.then(|| ItemMetadata {
            account_id: self.account_id.clone(),
            region: self.region.clone(),
            session: self.session.clone(),
        })
    }

    fn item(&self, data: Value) -> RawItem {
        RawItem {
            data,
            metadata: self.metadata(),
            placeholder: false,
        }
    }

    fn placeholder(&self) -> RawItem {
        RawItem {
            placeholder: true,
            ..self.item(json!({}))
        }
    }

    fn call_error(&self, source: CloudError) -> ApiCallError {
        ApiCallError::Call {
            service: self.call.service.clone(),
            operation: self.call.operation.clone(),
            account_id: self.account_id.clone(),
            region: self.region.clone(),
            source,
        }
    }
}

/// Runs API operations page by page and turns responses into items.
#[derive(Clone)]
pub struct PaginatedCollector {
    pub(super) provider: CloudProviderRef,
    pub(super) retry: RetryPolicy,
    pub(super) sessions: SessionProvider,
    pub(super) regions: RegionResolver,
}

enum Cursor {
    Open,
    Fetch {
        client: Arc<dyn ApiClient>,
        paginate: bool,
        token: Option<Value>,
    },
    Done,
}

impl PaginatedCollector {
    pub fn new(provider: CloudProviderRef, retry: RetryPolicy) -> Self {
        Self {
            sessions: SessionProvider::new(provider.clone()),
            regions: RegionResolver::new(provider.clone()),
            provider,
            retry,
        }
    }

    /// Lazily run one call, yielding the items selected by its result path.
    ///
    /// An allow-listed remote error yields a single placeholder item
    /// and ends the sequence. Any other error ends it with an `ApiCallError`.
    pub fn collect(&self, request: CallRequest) -> BoxStream<'static, Result<RawItem, ApiCallError>> {
        let provider = self.provider.clone();
        let retry = self.retry;
        let request = Arc::new(request);

        stream::unfold(Cursor::Open, move |cursor| {
            let provider = provider.clone();
            let request = request.clone();
            async move {
                let (client, paginate, token) = match cursor {
                    Cursor::Done => return None,
                    Cursor::Open => {
                        let call = &request.call;
                        match provider.client(&request.session, &call.service, &request.region, retry) {
                            Ok(client) => {
                                let client: Arc<dyn ApiClient> = Arc::from(client);
                                let paginate = client.can_paginate(&call.operation);
                                (client, paginate, None)
                            }
                            Err(source) => {
                                let error = ApiCallError::Client {
                                    service: call.service.clone(),
                                    region: request.region.clone(),
                                    source,
                                };
                                return Some((vec![Err(error)], Cursor::Done));
                            }
                        }
                    }
                    Cursor::Fetch {
                        client,
                        paginate,
                        token,
                    } => (client, paginate, token),
                };

                let response = fetch(client.as_ref(), &request, paginate, token).await;
                let (batch, next) = match response {
                    Ok((page, next)) => (select_items(&request, &page), next),
                    Err(error) => (vec![recover(&request, error)], None),
                };

                let cursor = match next {
                    Some(token) => Cursor::Fetch {
                        client,
                        paginate,
                        token: Some(token),
                    },
                    None => Cursor::Done,
                };
                Some((batch, cursor))
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }
}

/// Fetch one page, or the single response of a non-paginated operation.
async fn fetch(
    client: &dyn ApiClient,
    request: &CallRequest,
    paginate: bool,
    token: Option<Value>,
) -> Result<(Value, Option<Value>), CloudError> {
    let operation = &request.call.operation;
    if paginate {
        let page = client.fetch_page(operation, &request.params, token).await?;
        Ok((page.response, page.next))
    } else {
        let response = client.invoke(operation, &request.params).await?;
        Ok((response, None))
    }
}

fn select_items(request: &CallRequest, page: &Value) -> Vec<Result<RawItem, ApiCallError>> {
    let items = match request.call.result_path.search(page) {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    };

    if !items.is_empty() {
        emit!(ItemsExtracted {
            count: items.len() as u64,
            service: request.call.service.clone(),
            operation: request.call.operation.clone(),
        });
    }
    items.into_iter().map(|data| Ok(request.item(data))).collect()
}

/// Turn an allow-listed error into a placeholder item; anything else fails.
fn recover(request: &CallRequest, error: CloudError) -> Result<RawItem, ApiCallError> {
    match error.code() {
        Some(code) if request.call.is_expected(code) => {
            debug!(
                service = %request.call.service,
                operation = %request.call.operation,
                account_id = %request.account_id,
                region = %request.region,
                code,
                "Suppressed expected error"
            );
            emit!(ExpectedErrorSuppressed {
                service: request.call.service.clone(),
                operation: request.call.operation.clone(),
                code: code.to_string(),
            });
            Ok(request.placeholder())
        }
        _ => {
            warn!(
                service = %request.call.service,
                operation = %request.call.operation,
                account_id = %request.account_id,
                region = %request.region,
                error = %error,
                "API call failed"
            );
            Err(request.call_error(error))
        }
    }
}

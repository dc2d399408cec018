//! Scripted in-memory cloud provider.
//!
//! Accounts, roles and regions are declared up front and each operation is
//! answered by a handler closure returning the response pages. Every request
//! is recorded so callers can assert on what was called, where, and with
//! which parameters.

use std::collections::HashMap;
use std::future;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ApiClient, CloudProvider, Credentials, Page, RetryPolicy, Session};
use crate::error::CloudError;

/// Where a scripted operation is being called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub account_id: String,
    pub region: String,
    pub service: String,
    pub operation: String,
}

/// A request seen by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub account_id: Option<String>,
    pub region: Option<String>,
    pub service: String,
    pub operation: String,
    pub params: Value,
}

type Handler = Arc<dyn Fn(&CallContext, &Value) -> Result<Vec<Value>, CloudError> + Send + Sync>;

struct Operation {
    paginated: bool,
    handler: Handler,
}

#[derive(Default)]
struct Script {
    accounts: HashMap<String, String>,
    roles: HashMap<String, Result<String, CloudError>>,
    service_regions: HashMap<String, Vec<String>>,
    enabled_regions: Vec<String>,
    region_failure: Option<CloudError>,
    operations: HashMap<(String, String), Operation>,
}

impl Script {
    fn account_id(&self, session: &Session) -> Result<String, CloudError> {
        let found = match session.role() {
            Some(role) => self.roles.get(role).and_then(|r| r.as_ref().ok()),
            None => self.accounts.get(session.profile()),
        };
        found.cloned().ok_or_else(|| CloudError::Remote {
            code: "InvalidClientTokenId".to_string(),
            message: format!("no identity for profile '{}'", session.profile()),
        })
    }
}

/// In-memory [`CloudProvider`]. Clones share the script and the call log.
#[derive(Clone)]
pub struct MemoryCloud {
    script: Arc<Script>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MemoryCloud {
    pub fn builder() -> MemoryCloudBuilder {
        MemoryCloudBuilder::default()
    }

    /// Every request seen so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls_to(&self, service: &str, operation: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.service == service && call.operation == operation)
            .collect()
    }

    /// Number of region list lookups, of either kind.
    pub fn region_lookups(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                call.operation == "get_available_regions" || call.operation == "describe_regions"
            })
            .count()
    }

    fn record(&self, call: RecordedCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl CloudProvider for MemoryCloud {
    async fn base_session(&self, profile: &str) -> Result<Session, CloudError> {
        if !self.script.accounts.contains_key(profile) {
            return Err(CloudError::Remote {
                code: "ProfileNotFound".to_string(),
                message: format!("the config profile ({profile}) could not be found"),
            });
        }
        Ok(Session::base(profile))
    }

    async fn assume_role(
        &self,
        base: &Session,
        role: &str,
        session_name: &str,
    ) -> Result<Credentials, CloudError> {
        self.record(RecordedCall {
            account_id: self.script.account_id(base).ok(),
            region: None,
            service: "sts".to_string(),
            operation: "assume_role".to_string(),
            params: json!({"RoleArn": role, "RoleSessionName": session_name}),
        });

        match self.script.roles.get(role) {
            Some(Ok(account_id)) => Ok(Credentials {
                access_key_id: format!("ASIA{account_id}"),
                secret_access_key: "memory-secret".to_string(),
                session_token: Some("memory-token".to_string()),
            }),
            Some(Err(e)) => Err(e.clone()),
            None => Err(CloudError::Remote {
                code: "AccessDenied".to_string(),
                message: format!("not authorized to assume {role}"),
            }),
        }
    }

    async fn caller_account_id(&self, session: &Session) -> Result<String, CloudError> {
        let account_id = self.script.account_id(session);
        self.record(RecordedCall {
            account_id: account_id.as_ref().ok().cloned(),
            region: None,
            service: "sts".to_string(),
            operation: "get_caller_identity".to_string(),
            params: json!({}),
        });
        account_id
    }

    async fn service_regions(
        &self,
        session: &Session,
        service: &str,
        partition: &str,
    ) -> Result<Vec<String>, CloudError> {
        self.record(RecordedCall {
            account_id: self.script.account_id(session).ok(),
            region: None,
            service: service.to_string(),
            operation: "get_available_regions".to_string(),
            params: json!({"partition_name": partition}),
        });
        if let Some(e) = &self.script.region_failure {
            return Err(e.clone());
        }
        Ok(self
            .script
            .service_regions
            .get(service)
            .cloned()
            .unwrap_or_default())
    }

    async fn enabled_regions(
        &self,
        session: &Session,
        opt_in_statuses: &[&str],
    ) -> Result<Vec<String>, CloudError> {
        self.record(RecordedCall {
            account_id: self.script.account_id(session).ok(),
            region: Some(super::GLOBAL_REGION.to_string()),
            service: "ec2".to_string(),
            operation: "describe_regions".to_string(),
            params: json!({"Filters": [{"Name": "opt-in-status", "Values": opt_in_statuses}]}),
        });
        if let Some(e) = &self.script.region_failure {
            return Err(e.clone());
        }
        Ok(self.script.enabled_regions.clone())
    }

    fn client(
        &self,
        session: &Session,
        service: &str,
        region: &str,
        retry: RetryPolicy,
    ) -> Result<Box<dyn ApiClient>, CloudError> {
        Ok(Box::new(MemoryClient {
            cloud: self.clone(),
            retry,
            account_id: self.script.account_id(session)?,
            region: region.to_string(),
            service: service.to_string(),
        }))
    }
}

struct MemoryClient {
    cloud: MemoryCloud,
    retry: RetryPolicy,
    account_id: String,
    region: String,
    service: String,
}

impl MemoryClient {
    /// One request. Every attempt is recorded.
    fn attempt(
        &self,
        operation: &str,
        params: &Value,
        token: Option<&Value>,
    ) -> Result<Page, CloudError> {
        self.cloud.record(RecordedCall {
            account_id: Some(self.account_id.clone()),
            region: Some(self.region.clone()),
            service: self.service.clone(),
            operation: operation.to_string(),
            params: params.clone(),
        });

        let Some(op) = self
            .cloud
            .script
            .operations
            .get(&(self.service.clone(), operation.to_string()))
        else {
            return Err(CloudError::Remote {
                code: "InvalidAction".to_string(),
                message: format!("{}.{operation} is not scripted", self.service),
            });
        };

        let context = CallContext {
            account_id: self.account_id.clone(),
            region: self.region.clone(),
            service: self.service.clone(),
            operation: operation.to_string(),
        };
        let pages = (op.handler)(&context, params)?;

        let index = token.and_then(Value::as_u64).unwrap_or(0) as usize;
        let response = pages.get(index).cloned().unwrap_or_else(|| json!({}));
        let next = (index + 1 < pages.len()).then(|| Value::from(index + 1));
        Ok(Page { response, next })
    }
}

#[async_trait]
impl ApiClient for MemoryClient {
    fn can_paginate(&self, operation: &str) -> bool {
        self.cloud
            .script
            .operations
            .get(&(self.service.clone(), operation.to_string()))
            .is_some_and(|op| op.paginated)
    }

    async fn fetch_page(
        &self,
        operation: &str,
        params: &Value,
        token: Option<Value>,
    ) -> Result<Page, CloudError> {
        self.retry
            .retry(|| future::ready(self.attempt(operation, params, token.as_ref())))
            .await
    }

    async fn invoke(&self, operation: &str, params: &Value) -> Result<Value, CloudError> {
        Ok(self.fetch_page(operation, params, None).await?.response)
    }
}

#[derive(Default)]
pub struct MemoryCloudBuilder {
    script: Script,
}

impl MemoryCloudBuilder {
    /// Declare a profile and the account it resolves to.
    pub fn account(mut self, profile: impl Into<String>, account_id: impl Into<String>) -> Self {
        self.script.accounts.insert(profile.into(), account_id.into());
        self
    }

    /// Declare an assumable role and the account it lives in.
    pub fn role(mut self, role: impl Into<String>, account_id: impl Into<String>) -> Self {
        self.script.roles.insert(role.into(), Ok(account_id.into()));
        self
    }

    pub fn fail_role(mut self, role: impl Into<String>, error: CloudError) -> Self {
        self.script.roles.insert(role.into(), Err(error));
        self
    }

    pub fn service_regions<I, S>(mut self, service: impl Into<String>, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script
            .service_regions
            .insert(service.into(), regions.into_iter().map(Into::into).collect());
        self
    }

    pub fn enabled_regions<I, S>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script.enabled_regions = regions.into_iter().map(Into::into).collect();
        self
    }

    pub fn fail_region_lookups(mut self, error: CloudError) -> Self {
        self.script.region_failure = Some(error);
        self
    }

    /// Script a non-paginated operation answering with a single response.
    pub fn on<F>(self, service: &str, operation: &str, handler: F) -> Self
    where
        F: Fn(&CallContext, &Value) -> Result<Value, CloudError> + Send + Sync + 'static,
    {
        self.operation(service, operation, false, move |ctx, params| {
            handler(ctx, params).map(|response| vec![response])
        })
    }

    /// Script a paginated operation answering with a list of pages.
    pub fn on_paginated<F>(self, service: &str, operation: &str, handler: F) -> Self
    where
        F: Fn(&CallContext, &Value) -> Result<Vec<Value>, CloudError> + Send + Sync + 'static,
    {
        self.operation(service, operation, true, handler)
    }

    fn operation<F>(mut self, service: &str, operation: &str, paginated: bool, handler: F) -> Self
    where
        F: Fn(&CallContext, &Value) -> Result<Vec<Value>, CloudError> + Send + Sync + 'static,
    {
        self.script.operations.insert(
            (service.to_string(), operation.to_string()),
            Operation {
                paginated,
                handler: Arc::new(handler),
            },
        );
        self
    }

    pub fn build(self) -> MemoryCloud {
        MemoryCloud {
            script: Arc::new(self.script),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_pages_are_chained_by_token() {
        let cloud = MemoryCloud::builder()
            .account("prod", "111111111111")
            .on_paginated("ec2", "describe_volumes", |_, _| {
                Ok(vec![json!({"Volumes": [1]}), json!({"Volumes": [2]})])
            })
            .build();
        let client = cloud
            .client(&Session::base("prod"), "ec2", "eu-west-1", RetryPolicy::default())
            .unwrap();

        assert!(client.can_paginate("describe_volumes"));
        let first = client.fetch_page("describe_volumes", &json!({}), None).await.unwrap();
        assert_eq!(first.next, Some(json!(1)));
        let second = client
            .fetch_page("describe_volumes", &json!({}), first.next)
            .await
            .unwrap();
        assert_eq!(second.response, json!({"Volumes": [2]}));
        assert_eq!(second.next, None);

        let calls = cloud.calls_to("ec2", "describe_volumes");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].account_id.as_deref(), Some("111111111111"));
        assert_eq!(calls[0].region.as_deref(), Some("eu-west-1"));
    }

    #[tokio::test]
    async fn test_unscripted_operation_fails() {
        let cloud = MemoryCloud::builder().account("prod", "1").build();
        let client = cloud
            .client(&Session::base("prod"), "s3", "us-east-1", RetryPolicy::default())
            .unwrap();
        let err = client.invoke("list_buckets", &json!({})).await.unwrap_err();
        assert_eq!(err.code(), Some("InvalidAction"));
        assert_eq!(cloud.calls().len(), 1);
    }

    fn throttled_first(failures: usize) -> MemoryCloud {
        let seen = Arc::new(AtomicUsize::new(0));
        MemoryCloud::builder()
            .account("prod", "111111111111")
            .on("ec2", "describe_volumes", move |_, _| {
                if seen.fetch_add(1, Ordering::SeqCst) < failures {
                    return Err(CloudError::Remote {
                        code: "Throttling".to_string(),
                        message: "Rate exceeded".to_string(),
                    });
                }
                Ok(json!({"Volumes": [{"VolumeId": "vol-1"}]}))
            })
            .build()
    }

    #[tokio::test]
    async fn test_throttled_request_is_retried() {
        let cloud = throttled_first(1);
        let retry = RetryPolicy::default().with_backoff(Duration::ZERO);
        let client = cloud
            .client(&Session::base("prod"), "ec2", "us-east-1", retry)
            .unwrap();

        let response = client.invoke("describe_volumes", &json!({})).await.unwrap();

        assert_eq!(response["Volumes"][0]["VolumeId"], "vol-1");
        assert_eq!(cloud.calls_to("ec2", "describe_volumes").len(), 2);
    }

    #[tokio::test]
    async fn test_throttling_gives_up_after_max_attempts() {
        let cloud = throttled_first(usize::MAX);
        let retry = RetryPolicy::adaptive(3).with_backoff(Duration::ZERO);
        let client = cloud
            .client(&Session::base("prod"), "ec2", "us-east-1", retry)
            .unwrap();

        let err = client.invoke("describe_volumes", &json!({})).await.unwrap_err();

        assert_eq!(err.code(), Some("Throttling"));
        assert_eq!(cloud.calls_to("ec2", "describe_volumes").len(), 3);
    }
}

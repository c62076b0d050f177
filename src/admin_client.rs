//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
use crate::admin_client_builder::AdminClientBuilder;
use crate::credentials::AnonymousCredentials;
use crate::error::{ia_err, BigtableError};
use crate::rpc_backoff_policy::{BackoffPolicy, ExponentialBackoffPolicy};
use crate::rpc_retry_policy::{LimitedAttemptsRetryPolicy, RetryPolicy};
use crate::table_admin::TableAdmin;
use crate::transport::{HttpTransport, Transport};
use std::result::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://bigtableadmin.googleapis.com";

/// Client for administrative operations in one project.
///
/// The client holds the transport and the retry and backoff policy
/// prototypes shared by every [`TableAdmin`] created from it. It is thread-safe
/// and uses an [`Arc`] internally, so `.clone()` returns another reference to
/// the same client.
#[derive(Clone, Debug)]
pub struct AdminClient {
    // Use an inner Arc so cloning keeps the same contents
    pub(crate) inner: Arc<AdminClientRef>,
}

#[derive(Debug)]
pub(crate) struct AdminClientRef {
    pub(crate) project_id: String,
    pub(crate) transport: Arc<dyn Transport>,
    retry_policy: Box<dyn RetryPolicy>,
    backoff_policy: Box<dyn BackoffPolicy>,
}

impl AdminClient {
    /// Create a new [`AdminClientBuilder`].
    pub fn builder() -> AdminClientBuilder {
        AdminClientBuilder::new()
    }

    // Create the new AdminClient based on builder configuration
    pub(crate) fn new(b: AdminClientBuilder) -> Result<AdminClient, BigtableError> {
        if b.project_id.is_empty() {
            if b.from_environment {
                return ia_err!("cannot build admin client: no project id. set BIGTABLE_PROJECT environment.");
            }
            return ia_err!("cannot build admin client: call AdminClientBuilder::project_id()");
        }
        let transport: Arc<dyn Transport> = match b.transport {
            Some(t) => t,
            None => {
                let endpoint = if b.endpoint.is_empty() {
                    DEFAULT_ENDPOINT
                } else {
                    b.endpoint.as_str()
                };
                let credentials = b
                    .credentials
                    .unwrap_or_else(|| Arc::new(AnonymousCredentials));
                Arc::new(HttpTransport::new(
                    endpoint,
                    credentials,
                    b.timeout.unwrap_or(Duration::new(30, 0)),
                    b.client,
                    b.runtime,
                )?)
            }
        };
        let retry_policy = b
            .retry_policy
            .unwrap_or_else(|| Box::new(LimitedAttemptsRetryPolicy::new(5)));
        let backoff_policy = b.backoff_policy.unwrap_or_else(|| {
            Box::new(ExponentialBackoffPolicy::new(
                Duration::from_millis(100),
                Duration::from_secs(60),
            ))
        });
        debug!(
            "Creating new AdminClient: project={}, transport={:?}",
            b.project_id, transport
        );
        Ok(AdminClient {
            inner: Arc::new(AdminClientRef {
                project_id: b.project_id,
                transport,
                retry_policy,
                backoff_policy,
            }),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.inner.project_id
    }

    /// `projects/{project_id}`
    pub fn project_name(&self) -> String {
        format!("projects/{}", self.inner.project_id)
    }

    /// Administer the tables of `instance_id`.
    pub fn table_admin(&self, instance_id: &str) -> Result<TableAdmin, BigtableError> {
        if instance_id.is_empty() || instance_id.contains('/') {
            return ia_err!("invalid instance id '{}'", instance_id);
        }
        Ok(TableAdmin::new(self.clone(), instance_id))
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.transport)
    }

    pub(crate) fn retry_policy(&self) -> Box<dyn RetryPolicy> {
        self.inner.retry_policy.clone_policy()
    }

    pub(crate) fn backoff_policy(&self) -> Box<dyn BackoffPolicy> {
        self.inner.backoff_policy.clone_policy()
    }
}

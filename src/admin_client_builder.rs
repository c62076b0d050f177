//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Builder for creating an [`AdminClient`](crate::AdminClient)
//!

use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::admin_client::AdminClient;
use crate::credentials::{
    AccessTokenCredentials, AnonymousCredentials, ConfigFileCredentials, Credentials,
};
use crate::error::{ia_err, BigtableError};
use crate::rpc_backoff_policy::BackoffPolicy;
use crate::rpc_retry_policy::RetryPolicy;
use crate::transport::Transport;
use reqwest::Client;
use tokio::runtime::Handle;

/// Builder used to set all the parameters to create an
/// [`AdminClient`](crate::AdminClient).
///
/// Every setter returns `Result<Self, BigtableError>` so that configuration
/// steps can be chained with `?`.
#[derive(Default, Debug, Clone)]
pub struct AdminClientBuilder {
    pub(crate) endpoint: String,
    pub(crate) project_id: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) credentials: Option<Arc<dyn Credentials>>,
    pub(crate) retry_policy: Option<Box<dyn RetryPolicy>>,
    pub(crate) backoff_policy: Option<Box<dyn BackoffPolicy>>,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) client: Option<Client>,
    pub(crate) runtime: Option<Handle>,
    // For error messaging
    pub(crate) from_environment: bool,
}

impl AdminClientBuilder {
    /// Create a new AdminClientBuilder with no project and default settings.
    pub fn new() -> Self {
        AdminClientBuilder {
            ..Default::default()
        }
    }

    /// Build a new [`AdminClient`].
    ///
    /// Unless a transport was given with
    /// [`transport()`](AdminClientBuilder::transport()), this creates an
    /// [`HttpTransport`](crate::HttpTransport) for the configured endpoint.
    pub fn build(self) -> Result<AdminClient, BigtableError> {
        AdminClient::new(self)
    }

    /// Gather configuration settings from the current environment.
    ///
    /// Values can be overridden by calling other methods afterwards.
    ///
    /// | variable | description |
    /// | -------- | ----------- |
    /// | `BIGTABLE_ADMIN_ENDPOINT` | The admin endpoint. See [`AdminClientBuilder::endpoint()`]. |
    /// | `BIGTABLE_PROJECT` | The project id. |
    /// | `BIGTABLE_CREDENTIALS_FILE` | A credentials file, read with profile `DEFAULT`. See [`AdminClientBuilder::credentials_from_file()`]. |
    /// | `BIGTABLE_ACCESS_TOKEN` | A bearer token. See [`AdminClientBuilder::access_token()`]. |
    /// | `BIGTABLE_EMULATOR_HOST` | `host:port` of a local emulator. Uses `http` and no credentials, and overrides the values above. |
    pub fn from_environment(mut self) -> Result<Self, BigtableError> {
        self.from_environment = true;
        if let Ok(val) = env::var("BIGTABLE_ADMIN_ENDPOINT") {
            self = self.endpoint(&val)?;
        }
        if let Ok(val) = env::var("BIGTABLE_PROJECT") {
            self = self.project_id(&val)?;
        }
        if let Ok(val) = env::var("BIGTABLE_CREDENTIALS_FILE") {
            self = self.credentials_from_file(&val, "DEFAULT")?;
        }
        if let Ok(val) = env::var("BIGTABLE_ACCESS_TOKEN") {
            self = self.access_token(&val)?;
        }
        if let Ok(val) = env::var("BIGTABLE_EMULATOR_HOST") {
            self = self.emulator(&val)?;
        }
        Ok(self)
    }

    /// Set the admin endpoint.
    ///
    /// The scheme is optional and defaults to `https`. The default endpoint is
    /// `https://bigtableadmin.googleapis.com`.
    pub fn endpoint(mut self, endpoint: &str) -> Result<Self, BigtableError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return ia_err!("endpoint must be non-empty");
        }
        self.endpoint = endpoint.to_string();
        Ok(self)
    }

    /// Connect to a local emulator at `host` (`host:port`) over plain http,
    /// without credentials.
    pub fn emulator(self, host: &str) -> Result<Self, BigtableError> {
        let host = host
            .trim()
            .trim_start_matches("http://")
            .trim_end_matches('/');
        let b = self.endpoint(&format!("http://{}", host))?;
        b.credentials(AnonymousCredentials)
    }

    /// Set the project that owns the instances managed by the client. Required.
    pub fn project_id(mut self, project_id: &str) -> Result<Self, BigtableError> {
        let project_id = project_id.trim();
        if project_id.is_empty() || project_id.contains('/') {
            return ia_err!("invalid project id '{}'", project_id);
        }
        self.project_id = project_id.to_string();
        Ok(self)
    }

    /// Specify the timeout used for each http request.
    ///
    /// The default timeout is 30 seconds. The total time spent on an operation,
    /// including retries, is governed by the retry policy.
    pub fn timeout(mut self, timeout: Duration) -> Result<Self, BigtableError> {
        if timeout.is_zero() {
            return ia_err!("timeout must be greater than zero");
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    pub fn credentials<C: Credentials + 'static>(mut self, credentials: C) -> Result<Self, BigtableError> {
        self.credentials = Some(Arc::new(credentials));
        Ok(self)
    }

    /// Authorize requests with a fixed bearer token.
    pub fn access_token(self, token: &str) -> Result<Self, BigtableError> {
        let c = AccessTokenCredentials::new(token)?;
        self.credentials(c)
    }

    /// Read credentials from `profile` of the file at `path`.
    ///
    /// If the profile names a `project_id` and none has been set yet, it is
    /// used as the project.
    pub fn credentials_from_file(mut self, path: &str, profile: &str) -> Result<Self, BigtableError> {
        let c = ConfigFileCredentials::new_from_file(path, profile)?;
        if self.project_id.is_empty() {
            if let Some(p) = c.project_id() {
                self = self.project_id(p)?;
            }
        }
        self.credentials(c)
    }

    /// Set the retry policy prototype. Each operation gets a fresh copy.
    ///
    /// The default allows 5 attempts.
    pub fn retry_policy<P: RetryPolicy + 'static>(mut self, policy: P) -> Result<Self, BigtableError> {
        self.retry_policy = Some(Box::new(policy));
        Ok(self)
    }

    /// Set the backoff policy prototype. Each operation gets a fresh copy.
    ///
    /// The default is exponential from 100ms up to 60s, with jitter.
    pub fn backoff_policy<P: BackoffPolicy + 'static>(mut self, policy: P) -> Result<Self, BigtableError> {
        self.backoff_policy = Some(Box::new(policy));
        Ok(self)
    }

    /// Use `transport` for all requests instead of an http transport.
    ///
    /// The endpoint, credentials, timeout, client and runtime settings are
    /// then ignored.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Result<Self, BigtableError> {
        self.transport = Some(transport);
        Ok(self)
    }

    /// Specify a [`reqwest::Client`] to use for all http/s connections.
    ///
    /// By default a new client is created. Passing an existing one avoids
    /// creating multiple connection pools.
    pub fn reqwest_client(mut self, client: &Client) -> Result<Self, BigtableError> {
        self.client = Some(client.clone());
        Ok(self)
    }

    /// Run http requests on an existing tokio runtime.
    ///
    /// By default the client starts a small runtime of its own.
    pub fn runtime_handle(mut self, handle: Handle) -> Result<Self, BigtableError> {
        self.runtime = Some(handle);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BigtableErrorCode;
    use crate::rpc_retry_policy::LimitedAttemptsRetryPolicy;
    use std::io::Write;

    #[test]
    fn setters_validate() {
        let b = AdminClientBuilder::new();
        assert!(b.clone().project_id("").is_err());
        assert!(b.clone().project_id("a/b").is_err());
        assert!(b.clone().endpoint("  ").is_err());
        assert!(b.clone().timeout(Duration::ZERO).is_err());
        let e = b.clone().access_token("").unwrap_err();
        assert_eq!(e.code, BigtableErrorCode::InvalidArgument);

        let b = b
            .project_id(" p1 ")
            .unwrap()
            .retry_policy(LimitedAttemptsRetryPolicy::new(2))
            .unwrap();
        assert_eq!(b.project_id, "p1");
        assert!(b.retry_policy.is_some());
    }

    #[test]
    fn emulator_uses_http_without_credentials() {
        let b = AdminClientBuilder::new().emulator("localhost:8086").unwrap();
        assert_eq!(b.endpoint, "http://localhost:8086");
        let header = b.credentials.unwrap().authorization_header().unwrap();
        assert!(header.is_none());
    }

    #[test]
    fn project_from_credentials_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[DEFAULT]\naccess_token=tok\nproject_id=from-file").unwrap();
        let path = f.path().to_str().unwrap();

        let b = AdminClientBuilder::new()
            .credentials_from_file(path, "DEFAULT")
            .unwrap();
        assert_eq!(b.project_id, "from-file");

        // an explicit project is kept
        let b = AdminClientBuilder::new()
            .project_id("mine")
            .unwrap()
            .credentials_from_file(path, "DEFAULT")
            .unwrap();
        assert_eq!(b.project_id, "mine");
    }
}

//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Cloud Bigtable Table Admin Rust SDK
//!
//! This is a Rust SDK for the Cloud Bigtable table administration service. It
//! provides calls to create, list, get and delete tables, modify their column
//! families and drop rows, on top of an asynchronous completion queue that
//! multiplexes any number of in-flight calls onto a small pool of worker
//! threads.
//!
//! The general flow for an application is:
//! - Create a [`CompletionQueue`] and start one or more threads calling [`CompletionQueue::run()`]
//! - Create an [`AdminClient`] from an [`AdminClientBuilder`], once, and share it across threads
//! - Get a [`TableAdmin`] for an instance with [`AdminClient::table_admin()`]
//! - Call its `async_*` methods with a continuation, or the blocking twins, which wait for the result
//! - Call [`CompletionQueue::shutdown()`] and join the worker threads
//!
//! ## Simple Example
//! ```no_run
//! use bigtable_rust_sdk::{AdminClient, CompletionQueue};
//! use bigtable_rust_sdk::types::{GcRule, TableConfig, TableView};
//! use std::error::Error;
//!
//! fn main() -> Result<(), Box<dyn Error>> {
//!     let cq = CompletionQueue::new();
//!     let worker = {
//!         let cq = cq.clone();
//!         std::thread::spawn(move || cq.run())
//!     };
//!
//!     let client = AdminClient::builder()
//!         .from_environment()?
//!         .build()?;
//!     let admin = client.table_admin("my-instance")?;
//!
//!     let config = TableConfig::new(vec![("fam", GcRule::max_num_versions(1))], vec![]);
//!     let table = admin.create_table(&cq, "my-table", config)?;
//!     println!("created {}", table.name);
//!
//!     // asynchronous form: the continuation runs on the worker thread
//!     admin.async_list_tables(&cq, TableView::NameOnly, |_cq, res| match res {
//!         Ok(tables) => println!("{} tables", tables.len()),
//!         Err(e) => eprintln!("list failed: {}", e),
//!     });
//!
//!     cq.shutdown();
//!     worker.join().unwrap();
//!     Ok(())
//! }
//! ```
//!
//! ## Configuring the SDK
//!
//! [`AdminClientBuilder::from_environment()`] reads the following variables:
//!
//! | variable | description |
//! | -------- | ----------- |
//! | `BIGTABLE_PROJECT` | The project id. Required unless set in code or in the credentials file. |
//! | `BIGTABLE_ADMIN_ENDPOINT` | Admin endpoint. Defaults to `https://bigtableadmin.googleapis.com`. |
//! | `BIGTABLE_ACCESS_TOKEN` | OAuth2 bearer token sent with every request. |
//! | `BIGTABLE_CREDENTIALS_FILE` | INI file with `access_token` (and optionally `project_id`) in its `[DEFAULT]` profile. |
//! | `BIGTABLE_EMULATOR_HOST` | `host:port` of a local emulator; uses plain http and no credentials. |
//!
//! This SDK does not acquire or refresh tokens itself. Implement
//! [`Credentials`](credentials::Credentials) to plug in a token source.
//!
//! ## Retries
//!
//! Every operation is retried on transient errors (`Unavailable`,
//! `DeadlineExceeded`, `Aborted`) according to the client's
//! [`RetryPolicy`] and [`BackoffPolicy`]. By default an operation gets up to
//! 5 attempts, with jittered exponential backoff from 100ms to 60s. Each
//! operation works on its own fresh copy of the policies.
//!
//! Operations that are not safe to repeat (creating a table, modifying
//! column families, dropping rows) are never retried: their first failure
//! is reported as is.
//!
//! ## Logging
//!
//! The SDK logs through [tracing](https://crates.io/crates/tracing) and does
//! not install a subscriber. Operation lifecycle is logged at `debug`, and each
//! attempt and timer at `trace`.
//!
//! ## License
//!
//! Copyright (C) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//!
//! This SDK is licensed under the Universal Permissive License 1.0.
//!

pub(crate) mod admin_client_builder;
pub use crate::admin_client_builder::AdminClientBuilder;

pub(crate) mod admin_client;
pub use crate::admin_client::AdminClient;

pub(crate) mod async_operation;
pub use crate::async_operation::{start_retry_async_call, AsyncCall, AsyncCallFn, Idempotency};


pub(crate) mod completion_queue;
pub use crate::completion_queue::{CompletionQueue, Responder};

#[cfg(test)]
pub(crate) mod completion_queue_tests;

pub mod credentials;

pub(crate) mod error;
pub use crate::error::{BigtableError, BigtableErrorCode};

pub(crate) mod future;
pub use crate::future::{promise, Future, Promise};

pub(crate) mod rpc_backoff_policy;
pub use crate::rpc_backoff_policy::{BackoffPolicy, ExponentialBackoffPolicy, LinearBackoffPolicy};

pub(crate) mod rpc_retry_policy;
pub use crate::rpc_retry_policy::{LimitedAttemptsRetryPolicy, LimitedTimeRetryPolicy, RetryPolicy};

pub(crate) mod table_admin;
pub use crate::table_admin::TableAdmin;

pub(crate) mod transport;
pub use crate::transport::{HttpMethod, HttpTransport, RestRequest, Transport};

pub mod types;

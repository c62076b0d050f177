//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Table administration: create, list, get and delete tables, change their
//! column families, and drop rows.
//!
//! Each `async_*` method starts one retried operation on a
//! [`CompletionQueue`] and calls its continuation exactly once on a worker
//! thread of that queue. Each has a blocking twin with the same name minus
//! the prefix, which waits on a [`Future`](crate::Future) for the result. The
//! blocking forms need at least one thread running the queue, and must not be
//! called from one.

use crate::admin_client::AdminClient;
use crate::async_operation::{start_retry_async_call, AsyncCall, Idempotency};
use crate::completion_queue::{CompletionQueue, Responder};
use crate::error::{ia_err, ia_error, BigtableError};
use crate::future::promise;
use crate::rpc_retry_policy::RetryPolicy;
use crate::transport::{RestRequest, Transport};
use crate::types::{ColumnFamilyModification, ListTablesResponse, Table, TableConfig, TableView};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// Administrative operations on the tables of one instance.
///
/// Created by [`AdminClient::table_admin()`]. Cheap to clone.
#[derive(Clone, Debug)]
pub struct TableAdmin {
    client: AdminClient,
    instance_id: String,
    instance_name: String,
}

// One REST call, re-sent verbatim on each attempt.
struct RestCall<R> {
    name: &'static str,
    idempotency: Idempotency,
    request: RestRequest,
    transport: Arc<dyn Transport>,
    decode: fn(Value) -> Result<R, BigtableError>,
}

impl<R: Send + 'static> AsyncCall for RestCall<R> {
    type Response = R;

    fn name(&self) -> &str {
        self.name
    }

    fn idempotency(&self) -> Idempotency {
        self.idempotency
    }

    fn start(&self, attempt: u32, done: Responder<R>) {
        trace!("{} attempt {}: {:?} {}", self.name, attempt, self.request.method, self.request.path);
        self.transport.start(self.request.clone(), done.map(self.decode));
    }
}

// One retry budget spread over the several operations of a paged call.
// Cloning shares the budget rather than restarting it.
#[derive(Debug, Clone)]
struct SharedRetryPolicy(Arc<Mutex<Box<dyn RetryPolicy>>>);

impl SharedRetryPolicy {
    fn new(policy: Box<dyn RetryPolicy>) -> SharedRetryPolicy {
        SharedRetryPolicy(Arc::new(Mutex::new(policy)))
    }
}

impl RetryPolicy for SharedRetryPolicy {
    fn on_failure(&mut self, err: &BigtableError) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).on_failure(err)
    }

    fn is_exhausted(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_exhausted()
    }

    fn clone_policy(&self) -> Box<dyn RetryPolicy> {
        Box::new(self.clone())
    }
}

fn decode_table(v: Value) -> Result<Table, BigtableError> {
    Ok(serde_json::from_value(v)?)
}

fn decode_list_page(v: Value) -> Result<ListTablesResponse, BigtableError> {
    Ok(serde_json::from_value(v)?)
}

fn decode_empty(_v: Value) -> Result<(), BigtableError> {
    Ok(())
}

fn check_table_id(table_id: &str) -> Result<(), BigtableError> {
    if table_id.is_empty() {
        return ia_err!("table id must be non-empty");
    }
    if table_id.contains('/') {
        return ia_err!("invalid table id '{}'", table_id);
    }
    Ok(())
}

// Report a validation failure through the continuation, on a worker thread.
fn fail<R, F>(cq: &CompletionQueue, err: BigtableError, continuation: F)
where
    R: Send + 'static,
    F: FnOnce(&CompletionQueue, Result<R, BigtableError>) + Send + 'static,
{
    trace!("rejecting request: {}", err);
    // on Err the queue is shut down and the continuation is already scheduled
    if let Ok(done) = cq.start_call(continuation) {
        done.complete(Err(err));
    }
}

impl TableAdmin {
    pub(crate) fn new(client: AdminClient, instance_id: &str) -> TableAdmin {
        let instance_name = format!("{}/instances/{}", client.project_name(), instance_id);
        TableAdmin {
            client,
            instance_id: instance_id.to_string(),
            instance_name,
        }
    }

    pub fn client(&self) -> &AdminClient {
        &self.client
    }

    pub fn project_id(&self) -> &str {
        self.client.project_id()
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// `projects/{project}/instances/{instance}`
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// `projects/{project}/instances/{instance}/tables/{table_id}`
    pub fn table_name(&self, table_id: &str) -> String {
        format!("{}/tables/{}", self.instance_name, table_id)
    }

    fn rest_call<R>(
        &self,
        name: &'static str,
        idempotency: Idempotency,
        request: RestRequest,
        decode: fn(Value) -> Result<R, BigtableError>,
    ) -> RestCall<R> {
        RestCall {
            name,
            idempotency,
            request,
            transport: self.client.transport(),
            decode,
        }
    }

    // Start one logical call with a fresh copy of the client's policies.
    fn start<R, F>(
        &self,
        cq: &CompletionQueue,
        name: &'static str,
        idempotency: Idempotency,
        request: RestRequest,
        decode: fn(Value) -> Result<R, BigtableError>,
        continuation: F,
    ) where
        R: Send + 'static,
        F: FnOnce(&CompletionQueue, Result<R, BigtableError>) + Send + 'static,
    {
        start_retry_async_call(
            cq,
            self.rest_call(name, idempotency, request, decode),
            self.client.retry_policy(),
            self.client.backoff_policy(),
            continuation,
        );
    }

    /// Create table `table_id` with the column families and initial splits of
    /// `config`.
    ///
    /// Not retried: a lost response followed by a retry would report
    /// `AlreadyExists` for a table this call created.
    pub fn async_create_table<F>(&self, cq: &CompletionQueue, table_id: &str, config: TableConfig, continuation: F)
    where
        F: FnOnce(&CompletionQueue, Result<Table, BigtableError>) + Send + 'static,
    {
        if let Err(e) = check_table_id(table_id) {
            return fail(cq, e, continuation);
        }
        let request = RestRequest::post(
            &format!("v2/{}/tables", self.instance_name),
            config.to_request_body(table_id),
        );
        self.start(cq, "CreateTable", Idempotency::NonIdempotent, request, decode_table, continuation);
    }

    /// List all tables of the instance, following page tokens until the last
    /// page.
    ///
    /// Each page is fetched as its own retried operation, but all pages draw
    /// on one retry budget: the client's retry policy covers the whole
    /// listing, not each page.
    pub fn async_list_tables<F>(&self, cq: &CompletionQueue, view: TableView, continuation: F)
    where
        F: FnOnce(&CompletionQueue, Result<Vec<Table>, BigtableError>) + Send + 'static,
    {
        let budget = SharedRetryPolicy::new(self.client.retry_policy());
        self.list_tables_page(cq, view, budget, String::new(), Vec::new(), continuation);
    }

    fn list_tables_page<F>(
        &self,
        cq: &CompletionQueue,
        view: TableView,
        budget: SharedRetryPolicy,
        page_token: String,
        mut tables: Vec<Table>,
        continuation: F,
    ) where
        F: FnOnce(&CompletionQueue, Result<Vec<Table>, BigtableError>) + Send + 'static,
    {
        let mut request = RestRequest::get(&format!("v2/{}/tables", self.instance_name))
            .query("view", view.as_query_value());
        if !page_token.is_empty() {
            request = request.query("pageToken", &page_token);
        }
        let admin = self.clone();
        let retry_policy = Box::new(budget.clone());
        start_retry_async_call(
            cq,
            self.rest_call("ListTables", Idempotency::Idempotent, request, decode_list_page),
            retry_policy,
            self.client.backoff_policy(),
            move |cq: &CompletionQueue, page: Result<ListTablesResponse, BigtableError>| match page {
                Ok(page) => {
                    tables.extend(page.tables);
                    if page.next_page_token.is_empty() || page.next_page_token == page_token {
                        continuation(cq, Ok(tables))
                    } else {
                        admin.list_tables_page(cq, view, budget, page.next_page_token, tables, continuation)
                    }
                }
                Err(e) => continuation(cq, Err(e)),
            },
        );
    }

    pub fn async_get_table<F>(&self, cq: &CompletionQueue, table_id: &str, view: TableView, continuation: F)
    where
        F: FnOnce(&CompletionQueue, Result<Table, BigtableError>) + Send + 'static,
    {
        if let Err(e) = check_table_id(table_id) {
            return fail(cq, e, continuation);
        }
        let request = RestRequest::get(&format!("v2/{}", self.table_name(table_id)))
            .query("view", view.as_query_value());
        self.start(cq, "GetTable", Idempotency::Idempotent, request, decode_table, continuation);
    }

    /// Delete a table and all of its data.
    pub fn async_delete_table<F>(&self, cq: &CompletionQueue, table_id: &str, continuation: F)
    where
        F: FnOnce(&CompletionQueue, Result<(), BigtableError>) + Send + 'static,
    {
        if let Err(e) = check_table_id(table_id) {
            return fail(cq, e, continuation);
        }
        let request = RestRequest::delete(&format!("v2/{}", self.table_name(table_id)));
        self.start(cq, "DeleteTable", Idempotency::Idempotent, request, decode_empty, continuation);
    }

    /// Apply `modifications` in order and return the resulting table.
    pub fn async_modify_column_families<F>(
        &self,
        cq: &CompletionQueue,
        table_id: &str,
        modifications: Vec<ColumnFamilyModification>,
        continuation: F,
    ) where
        F: FnOnce(&CompletionQueue, Result<Table, BigtableError>) + Send + 'static,
    {
        if let Err(e) = check_table_id(table_id) {
            return fail(cq, e, continuation);
        }
        if modifications.is_empty() {
            return fail(cq, ia_error!("no column family modifications given"), continuation);
        }
        if let Some(m) = modifications.iter().find(|m| m.id().is_empty()) {
            return fail(cq, ia_error!("column family id must be non-empty: {:?}", m), continuation);
        }
        let mods: Vec<Value> = modifications.iter().map(|m| m.to_json()).collect();
        let request = RestRequest::post(
            &format!("v2/{}:modifyColumnFamilies", self.table_name(table_id)),
            json!({ "modifications": mods }),
        );
        self.start(
            cq,
            "ModifyColumnFamilies",
            Idempotency::NonIdempotent,
            request,
            decode_table,
            continuation,
        );
    }

    /// Delete every row whose key starts with `row_key_prefix`.
    pub fn async_drop_rows_by_prefix<F>(
        &self,
        cq: &CompletionQueue,
        table_id: &str,
        row_key_prefix: &[u8],
        continuation: F,
    ) where
        F: FnOnce(&CompletionQueue, Result<(), BigtableError>) + Send + 'static,
    {
        if let Err(e) = check_table_id(table_id) {
            return fail(cq, e, continuation);
        }
        if row_key_prefix.is_empty() {
            return fail(
                cq,
                ia_error!("row key prefix must be non-empty; use drop_all_rows to drop every row"),
                continuation,
            );
        }
        let request = RestRequest::post(
            &format!("v2/{}:dropRowRange", self.table_name(table_id)),
            json!({ "rowKeyPrefix": BASE64_STANDARD.encode(row_key_prefix) }),
        );
        self.start(cq, "DropRowsByPrefix", Idempotency::NonIdempotent, request, decode_empty, continuation);
    }

    /// Delete every row of the table, keeping the table and its schema.
    pub fn async_drop_all_rows<F>(&self, cq: &CompletionQueue, table_id: &str, continuation: F)
    where
        F: FnOnce(&CompletionQueue, Result<(), BigtableError>) + Send + 'static,
    {
        if let Err(e) = check_table_id(table_id) {
            return fail(cq, e, continuation);
        }
        let request = RestRequest::post(
            &format!("v2/{}:dropRowRange", self.table_name(table_id)),
            json!({ "deleteAllDataFromTable": true }),
        );
        self.start(cq, "DropAllRows", Idempotency::NonIdempotent, request, decode_empty, continuation);
    }

    pub fn create_table(&self, cq: &CompletionQueue, table_id: &str, config: TableConfig) -> Result<Table, BigtableError> {
        let (p, f) = promise();
        self.async_create_table(cq, table_id, config, p.into_continuation());
        f.get()
    }

    pub fn list_tables(&self, cq: &CompletionQueue, view: TableView) -> Result<Vec<Table>, BigtableError> {
        let (p, f) = promise();
        self.async_list_tables(cq, view, p.into_continuation());
        f.get()
    }

    pub fn get_table(&self, cq: &CompletionQueue, table_id: &str, view: TableView) -> Result<Table, BigtableError> {
        let (p, f) = promise();
        self.async_get_table(cq, table_id, view, p.into_continuation());
        f.get()
    }

    pub fn delete_table(&self, cq: &CompletionQueue, table_id: &str) -> Result<(), BigtableError> {
        let (p, f) = promise();
        self.async_delete_table(cq, table_id, p.into_continuation());
        f.get()
    }

    pub fn modify_column_families(
        &self,
        cq: &CompletionQueue,
        table_id: &str,
        modifications: Vec<ColumnFamilyModification>,
    ) -> Result<Table, BigtableError> {
        let (p, f) = promise();
        self.async_modify_column_families(cq, table_id, modifications, p.into_continuation());
        f.get()
    }

    pub fn drop_rows_by_prefix(&self, cq: &CompletionQueue, table_id: &str, row_key_prefix: &[u8]) -> Result<(), BigtableError> {
        let (p, f) = promise();
        self.async_drop_rows_by_prefix(cq, table_id, row_key_prefix, p.into_continuation());
        f.get()
    }

    pub fn drop_all_rows(&self, cq: &CompletionQueue, table_id: &str) -> Result<(), BigtableError> {
        let (p, f) = promise();
        self.async_drop_all_rows(cq, table_id, p.into_continuation());
        f.get()
    }
}

//
// Copyright (c) 2024, 2025 Oracle and/or its affiliates. All rights reserved.
//
// Licensed under the Universal Permissive License v 1.0 as shown at
//  https://oss.oracle.com/licenses/upl/
//
//! Table administration types: tables, column families, garbage-collection
//! rules and the requests that create or modify them.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde_derive::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

/// A table as returned by the service.
///
/// Which fields are populated depends on the [`TableView`] requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Full resource name: `projects/{p}/instances/{i}/tables/{t}`.
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub column_families: HashMap<String, ColumnFamily>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
}

impl Table {
    /// The table id, i.e. the last component of [`Table::name`].
    pub fn table_id(&self) -> &str {
        match self.name.rfind("/tables/") {
            Some(i) => &self.name[i + "/tables/".len()..],
            None => &self.name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnFamily {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gc_rule: Option<GcRule>,
}

/// Garbage-collection rule for a column family.
///
/// The service evaluates these; this crate only carries them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GcRule {
    /// Keep at most this many versions of each cell.
    MaxNumVersions(i32),
    /// Delete cells older than this.
    MaxAge(#[serde(with = "proto_duration")] Duration),
    /// Delete cells matching all of the rules.
    Intersection { rules: Vec<GcRule> },
    /// Delete cells matching any of the rules.
    Union { rules: Vec<GcRule> },
}

impl GcRule {
    pub fn max_num_versions(n: i32) -> GcRule {
        GcRule::MaxNumVersions(n)
    }

    pub fn max_age(age: Duration) -> GcRule {
        GcRule::MaxAge(age)
    }

    pub fn intersection(rules: Vec<GcRule>) -> GcRule {
        GcRule::Intersection { rules }
    }

    pub fn union(rules: Vec<GcRule>) -> GcRule {
        GcRule::Union { rules }
    }
}

// Durations travel as decimal seconds with an "s" suffix, e.g. "86400s" or "1.5s".
mod proto_duration {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        if d.subsec_nanos() == 0 {
            s.serialize_str(&format!("{}s", d.as_secs()))
        } else {
            let frac = format!("{:09}", d.subsec_nanos());
            s.serialize_str(&format!("{}.{}s", d.as_secs(), frac.trim_end_matches('0')))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(d)?;
        let secs = s
            .strip_suffix('s')
            .ok_or_else(|| D::Error::custom(format!("invalid duration '{}'", s)))?;
        let v: f64 = secs
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid duration '{}'", s)))?;
        Duration::try_from_secs_f64(v)
            .map_err(|e| D::Error::custom(format!("invalid duration '{}': {}", s, e)))
    }
}

/// How much of a table's definition the service returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableView {
    Unspecified,
    /// Only the table name.
    NameOnly,
    /// Name and column families.
    #[default]
    SchemaView,
    ReplicationView,
    Full,
}

impl TableView {
    pub(crate) fn as_query_value(&self) -> &'static str {
        match self {
            TableView::Unspecified => "VIEW_UNSPECIFIED",
            TableView::NameOnly => "NAME_ONLY",
            TableView::SchemaView => "SCHEMA_VIEW",
            TableView::ReplicationView => "REPLICATION_VIEW",
            TableView::Full => "FULL",
        }
    }
}

/// Column families and initial split points for a new table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableConfig {
    pub column_families: HashMap<String, GcRule>,
    pub initial_splits: Vec<String>,
}

impl TableConfig {
    pub fn new(column_families: Vec<(&str, GcRule)>, initial_splits: Vec<&str>) -> TableConfig {
        TableConfig {
            column_families: column_families
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            initial_splits: initial_splits.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn add_column_family(mut self, name: &str, rule: GcRule) -> TableConfig {
        self.column_families.insert(name.to_string(), rule);
        self
    }

    pub fn add_initial_split(mut self, split: &str) -> TableConfig {
        self.initial_splits.push(split.to_string());
        self
    }

    pub(crate) fn to_request_body(&self, table_id: &str) -> Value {
        let families: serde_json::Map<String, Value> = self
            .column_families
            .iter()
            .map(|(name, rule)| (name.clone(), json!({ "gcRule": rule })))
            .collect();
        let splits: Vec<Value> = self
            .initial_splits
            .iter()
            .map(|s| json!({ "key": BASE64_STANDARD.encode(s.as_bytes()) }))
            .collect();
        json!({
            "tableId": table_id,
            "table": { "columnFamilies": families },
            "initialSplits": splits,
        })
    }
}

/// One change to the column families of an existing table.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnFamilyModification {
    Create { id: String, rule: GcRule },
    Update { id: String, rule: GcRule },
    Drop { id: String },
}

impl ColumnFamilyModification {
    pub fn create(id: &str, rule: GcRule) -> Self {
        ColumnFamilyModification::Create {
            id: id.to_string(),
            rule,
        }
    }

    pub fn update(id: &str, rule: GcRule) -> Self {
        ColumnFamilyModification::Update {
            id: id.to_string(),
            rule,
        }
    }

    pub fn drop(id: &str) -> Self {
        ColumnFamilyModification::Drop { id: id.to_string() }
    }

    pub fn id(&self) -> &str {
        match self {
            ColumnFamilyModification::Create { id, .. }
            | ColumnFamilyModification::Update { id, .. }
            | ColumnFamilyModification::Drop { id } => id,
        }
    }

    pub(crate) fn to_json(&self) -> Value {
        match self {
            ColumnFamilyModification::Create { id, rule } => {
                json!({ "id": id, "create": { "gcRule": rule } })
            }
            ColumnFamilyModification::Update { id, rule } => {
                json!({ "id": id, "update": { "gcRule": rule } })
            }
            ColumnFamilyModification::Drop { id } => json!({ "id": id, "drop": true }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListTablesResponse {
    #[serde(default)]
    pub(crate) tables: Vec<Table>,
    #[serde(default)]
    pub(crate) next_page_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_rule_json() {
        let rule = GcRule::intersection(vec![
            GcRule::max_age(Duration::from_secs(7 * 24 * 3600)),
            GcRule::max_num_versions(1),
        ]);
        let v = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            v,
            json!({"intersection": {"rules": [{"maxAge": "604800s"}, {"maxNumVersions": 1}]}})
        );
        let back: GcRule = serde_json::from_value(v).unwrap();
        assert_eq!(back, rule);
    }

    #[test]
    fn fractional_durations() {
        let v = serde_json::to_value(GcRule::max_age(Duration::from_millis(1500))).unwrap();
        assert_eq!(v, json!({"maxAge": "1.5s"}));
        let r: Result<GcRule, _> = serde_json::from_value(json!({"maxAge": "-3s"}));
        assert!(r.is_err());
        let r: Result<GcRule, _> = serde_json::from_value(json!({"maxAge": "3"}));
        assert!(r.is_err());
        // out of range or not a number: an error, never a panic
        for bad in ["1e30s", "infs", "NaNs"] {
            let r: Result<GcRule, _> = serde_json::from_value(json!({ "maxAge": bad }));
            assert!(r.is_err(), "{}", bad);
        }
    }

    #[test]
    fn create_table_body() {
        let config = TableConfig::new(vec![("fam", GcRule::max_num_versions(5))], vec!["a1000"]);
        let body = config.to_request_body("t1");
        assert_eq!(body["tableId"], "t1");
        assert_eq!(
            body["table"]["columnFamilies"]["fam"]["gcRule"]["maxNumVersions"],
            5
        );
        assert_eq!(body["initialSplits"][0]["key"], "YTEwMDA=");
    }

    #[test]
    fn modifications_json() {
        assert_eq!(
            ColumnFamilyModification::drop("foo").to_json(),
            json!({"id": "foo", "drop": true})
        );
        assert_eq!(
            ColumnFamilyModification::update("fam", GcRule::max_num_versions(2)).to_json(),
            json!({"id": "fam", "update": {"gcRule": {"maxNumVersions": 2}}})
        );
    }

    #[test]
    fn table_decodes_and_reports_id() {
        let t: Table = serde_json::from_value(json!({
            "name": "projects/p/instances/i/tables/t1",
            "columnFamilies": {"fam": {"gcRule": {"maxNumVersions": 5}}, "bare": {}},
        }))
        .unwrap();
        assert_eq!(t.table_id(), "t1");
        assert_eq!(t.column_families.len(), 2);
        assert_eq!(t.column_families["bare"].gc_rule, None);
    }
}

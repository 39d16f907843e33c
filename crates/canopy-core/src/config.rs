//! Scan configuration.
//!
//! Options arrive as TOML (or are built in code), are validated once, and
//! are then turned into the plan strategy, aggregator and filters a scan
//! runs with.

use crate::db::{
    aggregate::{Aggregator, AttributeFilter},
    plan::{BuilderKind, FieldIndexLeaves, FieldPolicy, Leaves},
};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::RangeInclusive,
    sync::Arc,
};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("failed to parse scan options: {0}")]
    Parse(String),

    #[error("field '{field}' is both included and excluded")]
    Conflict { field: String },

    #[error("start_time {start} is after end_time {end}")]
    InvalidTimeRange { start: i64, end: i64 },
}

///
/// ScanOptions
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScanOptions {
    /// Registered plan strategy.
    pub plan_builder: BuilderKind,

    /// Fields predicates may be compiled for. `None` admits every field.
    pub include_fields: Option<BTreeSet<String>>,
    pub exclude_fields: BTreeSet<String>,

    /// Index attributes returned with a match. `None` keeps them all.
    pub fields_to_aggregate: Option<BTreeSet<String>>,

    /// Fields that exist only in the index and never in event data.
    pub index_only_fields: BTreeSet<String>,

    pub query_fully_satisfied: bool,
    pub build_document: bool,
    pub datatypes: Option<BTreeSet<String>>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,

    // global-index uid collection
    pub parse_tld_uids: bool,
    pub collapse_uids: bool,
    pub collapse_uids_threshold: Option<usize>,

    pub event_filter: EventFilterOptions,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            plan_builder: BuilderKind::default(),
            include_fields: None,
            exclude_fields: BTreeSet::new(),
            fields_to_aggregate: None,
            index_only_fields: BTreeSet::new(),
            query_fully_satisfied: false,
            build_document: true,
            datatypes: None,
            start_time: None,
            end_time: None,
            parse_tld_uids: false,
            collapse_uids: false,
            collapse_uids_threshold: None,
            event_filter: EventFilterOptions::default(),
        }
    }
}

impl ScanOptions {
    /// Parse and validate options from TOML.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let options: Self =
            toml::from_str(source).map_err(|err| ConfigError::Parse(err.to_string()))?;
        options.validate()?;

        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(include) = &self.include_fields
            && let Some(field) = include.intersection(&self.exclude_fields).next()
        {
            return Err(ConfigError::Conflict {
                field: field.clone(),
            });
        }

        if let (Some(start), Some(end)) = (self.start_time, self.end_time)
            && start > end
        {
            return Err(ConfigError::InvalidTimeRange { start, end });
        }

        self.event_filter.validate()
    }

    #[must_use]
    pub fn field_policy(&self) -> FieldPolicy {
        FieldPolicy::new(self.include_fields.clone(), self.exclude_fields.clone())
    }

    /// Inclusive timestamp window, if either end is configured.
    #[must_use]
    pub fn time_range(&self) -> Option<RangeInclusive<i64>> {
        if self.start_time.is_none() && self.end_time.is_none() {
            return None;
        }

        Some(self.start_time.unwrap_or(i64::MIN)..=self.end_time.unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn datatype_filter(&self) -> Option<Arc<BTreeSet<Vec<u8>>>> {
        self.datatypes.as_ref().map(|datatypes| {
            Arc::new(
                datatypes
                    .iter()
                    .map(|datatype| datatype.as_bytes().to_vec())
                    .collect(),
            )
        })
    }

    /// Aggregator matching the configured plan strategy.
    #[must_use]
    pub fn aggregator(&self) -> Aggregator {
        let aggregator = Aggregator::new(self.plan_builder.aggregator_kind());

        match &self.fields_to_aggregate {
            Some(fields) => aggregator.with_fields_to_keep(fields.clone()),
            None => aggregator,
        }
    }

    /// Leaf strategy registered under `plan_builder`.
    #[must_use]
    pub fn leaves(&self, filter: Option<Arc<dyn AttributeFilter>>) -> Leaves {
        let aggregator = match filter {
            Some(filter) => self.aggregator().with_filter(filter),
            None => self.aggregator(),
        };
        let leaves = FieldIndexLeaves::new(aggregator)
            .with_document(self.build_document)
            .with_datatypes(self.datatype_filter())
            .with_time_range(self.time_range());

        Leaves::for_kind(self.plan_builder, leaves)
    }
}

///
/// EventFilterOptions
///
/// Settings for the event-data filter applied when documents are loaded.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EventFilterOptions {
    pub allow_fields: Option<BTreeSet<String>>,
    pub deny_fields: Option<BTreeSet<String>>,

    /// Fields stored outside the event column family (index or term data).
    pub non_event_fields: BTreeSet<String>,

    /// Per-field value limits; the `_ANYFIELD_` key applies to every field.
    pub limit_fields: BTreeMap<String, u64>,

    /// Field name used when recording that a limit was hit.
    pub limit_fields_field: Option<String>,

    pub max_fields_before_seek: Option<u64>,
    pub max_keys_before_seek: Option<u64>,
}

impl EventFilterOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let (Some(allow), Some(deny)) = (&self.allow_fields, &self.deny_fields)
            && let Some(field) = allow.intersection(deny).next()
        {
            return Err(ConfigError::Conflict {
                field: field.clone(),
            });
        }

        Ok(())
    }
}

///
/// TESTS
///

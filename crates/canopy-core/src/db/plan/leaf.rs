use crate::db::{
    aggregate::{Aggregator, AggregatorKind},
    cursor::{DocumentCursorBox, FieldIndexCursor, TopLevelIndexCursor},
    plan::PlanError,
    store::SortedKeyCursor,
};
use serde::Deserialize;
use std::{collections::BTreeSet, ops::RangeInclusive, sync::Arc};
use tracing::warn;

///
/// LeafStrategy
///
/// Capability interface the plan builder compiles leaves through.
///

pub trait LeafStrategy {
    /// Build the cursor for one `field == value` predicate.
    fn build_leaf(
        &self,
        field: &str,
        value: &[u8],
        source: Box<dyn SortedKeyCursor>,
    ) -> DocumentCursorBox;

    /// Handle an unresolved `field == null` predicate.
    /// `Ok` means the branch simply contributes no index coverage.
    fn unresolved_value(&self, field: &str, fully_satisfied: bool) -> Result<(), PlanError>;
}

///
/// BuilderKind
///
/// Statically registered plan strategies, selected by configuration key.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum BuilderKind {
    Generic,
    #[default]
    TopLevel,
}

impl BuilderKind {
    /// Aggregation scope implied by this strategy.
    #[must_use]
    pub const fn aggregator_kind(self) -> AggregatorKind {
        match self {
            Self::Generic => AggregatorKind::Identity,
            Self::TopLevel => AggregatorKind::TopLevel,
        }
    }
}

///
/// FieldIndexLeaves
///
/// Generic strategy: one field-index cursor per predicate, aggregated per
/// document. Unresolved values only lose coverage.
///

#[derive(Clone, Debug)]
pub struct FieldIndexLeaves {
    aggregator: Aggregator,
    build_document: bool,
    datatypes: Option<Arc<BTreeSet<Vec<u8>>>>,
    time_range: Option<RangeInclusive<i64>>,
}

impl FieldIndexLeaves {
    #[must_use]
    pub const fn new(aggregator: Aggregator) -> Self {
        Self {
            aggregator,
            build_document: true,
            datatypes: None,
            time_range: None,
        }
    }

    #[must_use]
    pub const fn with_document(mut self, build_document: bool) -> Self {
        self.build_document = build_document;
        self
    }

    #[must_use]
    pub fn with_datatypes(mut self, datatypes: Option<Arc<BTreeSet<Vec<u8>>>>) -> Self {
        self.datatypes = datatypes;
        self
    }

    #[must_use]
    pub fn with_time_range(mut self, time_range: Option<RangeInclusive<i64>>) -> Self {
        self.time_range = time_range;
        self
    }

    fn cursor(&self, field: &str, value: &[u8], source: Box<dyn SortedKeyCursor>) -> FieldIndexCursor {
        let mut cursor = FieldIndexCursor::new(field, value, source, self.aggregator.clone());
        if !self.build_document {
            cursor = cursor.keys_only();
        }
        if let Some(datatypes) = &self.datatypes {
            cursor = cursor.with_datatypes(Arc::clone(datatypes));
        }
        if let Some(time_range) = &self.time_range {
            cursor = cursor.with_time_range(time_range.clone());
        }

        cursor
    }
}

impl LeafStrategy for FieldIndexLeaves {
    fn build_leaf(
        &self,
        field: &str,
        value: &[u8],
        source: Box<dyn SortedKeyCursor>,
    ) -> DocumentCursorBox {
        Box::new(self.cursor(field, value, source))
    }

    fn unresolved_value(&self, field: &str, fully_satisfied: bool) -> Result<(), PlanError> {
        if fully_satisfied {
            warn!(field, "null comparison in a fully index-satisfied query");
        }

        Ok(())
    }
}

///
/// TopLevelLeaves
///
/// Hierarchy-aware strategy: wraps the generic leaves in document-range
/// aware cursors and treats an unresolved value in a fully satisfied plan
/// as a planner fault.
///

#[derive(Clone, Debug)]
pub struct TopLevelLeaves {
    inner: FieldIndexLeaves,
}

impl TopLevelLeaves {
    #[must_use]
    pub const fn new(inner: FieldIndexLeaves) -> Self {
        Self { inner }
    }
}

impl LeafStrategy for TopLevelLeaves {
    fn build_leaf(
        &self,
        field: &str,
        value: &[u8],
        source: Box<dyn SortedKeyCursor>,
    ) -> DocumentCursorBox {
        Box::new(TopLevelIndexCursor::new(
            self.inner.cursor(field, value, source),
        ))
    }

    fn unresolved_value(&self, field: &str, fully_satisfied: bool) -> Result<(), PlanError> {
        if fully_satisfied {
            return Err(PlanError::PlannerConsistencyFault {
                field: field.to_string(),
            });
        }

        Ok(())
    }
}

///
/// Leaves
///
/// Closed set of leaf strategies.
///

#[derive(Clone, Debug)]
pub enum Leaves {
    Generic(FieldIndexLeaves),
    TopLevel(TopLevelLeaves),
}

impl Leaves {
    /// Build the strategy registered under `kind`.
    #[must_use]
    pub fn for_kind(kind: BuilderKind, leaves: FieldIndexLeaves) -> Self {
        match kind {
            BuilderKind::Generic => Self::Generic(leaves),
            BuilderKind::TopLevel => Self::TopLevel(TopLevelLeaves::new(leaves)),
        }
    }
}

impl LeafStrategy for Leaves {
    fn build_leaf(
        &self,
        field: &str,
        value: &[u8],
        source: Box<dyn SortedKeyCursor>,
    ) -> DocumentCursorBox {
        match self {
            Self::Generic(leaves) => leaves.build_leaf(field, value, source),
            Self::TopLevel(leaves) => leaves.build_leaf(field, value, source),
        }
    }

    fn unresolved_value(&self, field: &str, fully_satisfied: bool) -> Result<(), PlanError> {
        match self {
            Self::Generic(leaves) => leaves.unresolved_value(field, fully_satisfied),
            Self::TopLevel(leaves) => leaves.unresolved_value(field, fully_satisfied),
        }
    }
}

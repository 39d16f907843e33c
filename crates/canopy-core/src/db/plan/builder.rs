use crate::{
    db::{
        cursor::{CompositeCursor, DocumentCursorBox, Join},
        plan::{LeafStrategy, PlanError, QueryNode},
        store::SortedKeyCursor,
    },
    obs::{self, CoverageLoss, PlanFingerprint, ScanTraceEvent, TraceSinkHandle},
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

///
/// FieldPolicy
///
/// Allow/deny lists applied to predicate fields.
/// An absent allow list admits every field not explicitly denied.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldPolicy {
    allow: Option<BTreeSet<String>>,
    deny: BTreeSet<String>,
}

impl FieldPolicy {
    #[must_use]
    pub const fn new(allow: Option<BTreeSet<String>>, deny: BTreeSet<String>) -> Self {
        Self { allow, deny }
    }

    #[must_use]
    pub fn allows(&self, field: &str) -> bool {
        self.allow
            .as_ref()
            .is_none_or(|allow| allow.contains(field))
            && !self.deny.contains(field)
    }

    /// Explicitly denied and not re-admitted by the allow list.
    #[must_use]
    pub fn denies(&self, field: &str) -> bool {
        self.deny.contains(field)
            && !self
                .allow
                .as_ref()
                .is_some_and(|allow| allow.contains(field))
    }
}

///
/// CompiledPlan
///
/// Cursor tree plus the coverage facts gathered while compiling it.
/// A `None` root means no predicate could be answered from the index.
///

pub struct CompiledPlan {
    pub root: Option<DocumentCursorBox>,
    pub dropped: Vec<String>,
    pub includes: u32,
    pub excludes: u32,
    pub fingerprint: PlanFingerprint,
}

impl CompiledPlan {
    /// Independent copy with deep copies of every cursor in the tree.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self {
            root: self.root.as_ref().map(|root| root.deep_copy()),
            dropped: self.dropped.clone(),
            includes: self.includes,
            excludes: self.excludes,
            fingerprint: self.fingerprint,
        }
    }

    /// Whether every predicate was compiled into an index cursor.
    #[must_use]
    pub const fn index_satisfied(&self) -> bool {
        self.root.is_some() && self.dropped.is_empty()
    }

    #[must_use]
    pub fn describe(&self) -> String {
        self.root
            .as_ref()
            .map_or_else(|| "<unindexed>".to_string(), |root| root.describe())
    }
}

///
/// PlanBuilder
///
/// Compiles a `QueryNode` tree into a cursor tree.
///
/// Positive predicates become leaves; negations land in the enclosing
/// composite's exclude set; same-kind composites are flattened; a branch
/// that compiles to nothing is recorded as lost coverage.
///

pub struct PlanBuilder<'a, S> {
    strategy: S,
    source: &'a dyn SortedKeyCursor,
    fields: FieldPolicy,
    index_only: BTreeSet<String>,
    fully_satisfied: bool,
    trace: Option<TraceSinkHandle>,
}

impl<'a, S> PlanBuilder<'a, S>
where
    S: LeafStrategy,
{
    #[must_use]
    pub fn new(strategy: S, source: &'a dyn SortedKeyCursor) -> Self {
        Self {
            strategy,
            source,
            fields: FieldPolicy::default(),
            index_only: BTreeSet::new(),
            fully_satisfied: false,
            trace: None,
        }
    }

    #[must_use]
    pub fn with_fields(mut self, fields: FieldPolicy) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn with_index_only(mut self, fields: BTreeSet<String>) -> Self {
        self.index_only = fields;
        self
    }

    /// Assert that the query is expected to be fully answered from the index.
    #[must_use]
    pub const fn fully_satisfied(mut self, fully_satisfied: bool) -> Self {
        self.fully_satisfied = fully_satisfied;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: Option<TraceSinkHandle>) -> Self {
        self.trace = trace;
        self
    }

    /// Compile `query`.
    pub fn build(&self, query: &QueryNode) -> Result<CompiledPlan, PlanError> {
        let mut stats = BuildStats::default();
        let root = match self.build_node(query, ParentContext::Root(None), &mut stats)? {
            ParentContext::Root(root) => root,
            ParentContext::Composite(_) => {
                return Err(PlanError::shape("root compiled into a composite context"));
            }
        };

        let description = root
            .as_ref()
            .map_or_else(|| "<unindexed>".to_string(), |root| root.describe());
        let plan = CompiledPlan {
            root,
            dropped: stats.dropped,
            includes: stats.includes,
            excludes: stats.excludes,
            fingerprint: PlanFingerprint::from_description(&description),
        };

        debug!(
            plan = %description,
            fingerprint = %plan.fingerprint,
            dropped = plan.dropped.len(),
            "plan compiled"
        );
        obs::emit(self.trace.as_ref(), || ScanTraceEvent::PlanCompiled {
            fingerprint: plan.fingerprint,
            includes: plan.includes,
            excludes: plan.excludes,
            index_satisfied: plan.index_satisfied(),
        });

        Ok(plan)
    }

    // Compile one node into `parent`, returning the updated parent.
    fn build_node(
        &self,
        node: &QueryNode,
        parent: ParentContext,
        stats: &mut BuildStats,
    ) -> Result<ParentContext, PlanError> {
        match node {
            QueryNode::Eq { field, value } => {
                self.build_predicate(field, value.as_deref(), false, parent, stats)
            }
            QueryNode::Ne { field, value } => {
                self.build_predicate(field, value.as_deref(), true, parent, stats)
            }
            QueryNode::And(children) => self.build_composite(Join::And, children, parent, stats),
            QueryNode::Or(children) => self.build_composite(Join::Or, children, parent, stats),
            QueryNode::Not(child) => {
                let ParentContext::Composite(mut composite) = parent else {
                    return Err(PlanError::shape("a negation cannot be the root of a plan"));
                };

                let ParentContext::Composite(stub) = self.build_node(
                    child,
                    ParentContext::Composite(CompositeContext::new(ContextKind::Negation)),
                    stats,
                )?
                else {
                    return Err(PlanError::shape("negation lost its context"));
                };

                composite.includes.extend(stub.excludes);
                composite.excludes.extend(stub.includes);

                Ok(ParentContext::Composite(composite))
            }
        }
    }

    fn build_predicate(
        &self,
        field: &str,
        value: Option<&[u8]>,
        negated: bool,
        parent: ParentContext,
        stats: &mut BuildStats,
    ) -> Result<ParentContext, PlanError> {
        let composite = match parent {
            ParentContext::Root(_) if negated => {
                return Err(PlanError::shape("a negation cannot be the root of a plan"));
            }
            ParentContext::Root(_) => None,
            ParentContext::Composite(composite) => Some(composite),
        };

        let Some(value) = value else {
            if self.index_only.contains(field) {
                return Err(PlanError::IndexOnlyNullComparison {
                    field: field.to_string(),
                });
            }
            self.strategy
                .unresolved_value(field, self.fully_satisfied)?;
            self.drop_coverage(field, CoverageLoss::NullValue, stats);

            return Ok(composite.map_or(ParentContext::Root(None), ParentContext::Composite));
        };

        // a root predicate is only refused for an explicitly denied field
        if composite.is_none() {
            if self.fields.denies(field) {
                return Err(PlanError::shape(format!(
                    "root predicate field '{field}' is a denied index field"
                )));
            }
        } else if !self.fields.allows(field) {
            self.drop_coverage(field, CoverageLoss::FieldNotAllowed, stats);

            return Ok(composite.map_or(ParentContext::Root(None), ParentContext::Composite));
        }

        let leaf = |stats: &mut BuildStats| {
            if negated {
                stats.excludes += 1;
            } else {
                stats.includes += 1;
            }
            self.strategy
                .build_leaf(field, value, self.source.deep_copy())
        };

        match composite {
            None => Ok(ParentContext::Root(Some(leaf(stats)))),
            Some(mut composite) => {
                if composite.seen(field, value, negated) {
                    debug!(field, "duplicate predicate suppressed");
                } else if negated {
                    composite.excludes.push(leaf(stats));
                } else {
                    composite.includes.push(leaf(stats));
                }

                Ok(ParentContext::Composite(composite))
            }
        }
    }

    fn build_composite(
        &self,
        join: Join,
        children: &[QueryNode],
        parent: ParentContext,
        stats: &mut BuildStats,
    ) -> Result<ParentContext, PlanError> {
        // same-kind children merge into the parent composite
        if let ParentContext::Composite(composite) = &parent
            && composite.kind == ContextKind::Join(join)
        {
            return children
                .iter()
                .try_fold(parent, |parent, child| self.build_node(child, parent, stats));
        }

        let mut nested = ParentContext::Composite(CompositeContext::new(ContextKind::Join(join)));
        for child in children {
            nested = self.build_node(child, nested, stats)?;
        }
        let ParentContext::Composite(nested) = nested else {
            return Err(PlanError::shape("composite lost its context"));
        };
        let negations_only = nested.includes.is_empty() && !nested.excludes.is_empty();
        let cursor = nested.finish(join);

        match parent {
            ParentContext::Root(_) => match cursor {
                Some(cursor) => Ok(ParentContext::Root(Some(cursor))),
                None if negations_only => Err(PlanError::shape(
                    "a composite of only negations cannot be the root of a plan",
                )),
                None => Ok(ParentContext::Root(None)),
            },
            ParentContext::Composite(mut composite) => {
                match cursor {
                    Some(cursor) => composite.includes.push(cursor),
                    None => self.drop_coverage(
                        &format!("{join:?}").to_lowercase(),
                        CoverageLoss::EmptyComposite,
                        stats,
                    ),
                }

                Ok(ParentContext::Composite(composite))
            }
        }
    }

    fn drop_coverage(&self, field: &str, reason: CoverageLoss, stats: &mut BuildStats) {
        if self.fully_satisfied {
            warn!(field, ?reason, "index coverage lost in a fully satisfied query");
        } else {
            debug!(field, ?reason, "index coverage lost");
        }
        obs::emit(self.trace.as_ref(), || ScanTraceEvent::CoverageDropped {
            field: field.to_string(),
            reason,
        });

        stats.dropped.push(field.to_string());
    }
}

///
/// ParentContext
///
/// Where a compiled node lands: the plan root, or a composite under
/// construction. Threaded through the recursive build by value.
///

enum ParentContext {
    Root(Option<DocumentCursorBox>),
    Composite(CompositeContext),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ContextKind {
    Join(Join),
    Negation,
}

struct CompositeContext {
    kind: ContextKind,
    includes: Vec<DocumentCursorBox>,
    excludes: Vec<DocumentCursorBox>,
    seen: BTreeSet<(String, Vec<u8>, bool)>,
}

impl CompositeContext {
    const fn new(kind: ContextKind) -> Self {
        Self {
            kind,
            includes: Vec::new(),
            excludes: Vec::new(),
            seen: BTreeSet::new(),
        }
    }

    // Record a predicate; true when an identical one was already added.
    fn seen(&mut self, field: &str, value: &[u8], negated: bool) -> bool {
        !self
            .seen
            .insert((field.to_string(), value.to_vec(), negated))
    }

    // A composite without includes cannot drive a scan.
    fn finish(self, join: Join) -> Option<DocumentCursorBox> {
        if self.includes.is_empty() {
            return None;
        }

        Some(Box::new(CompositeCursor::new(
            join,
            self.includes,
            self.excludes,
        )))
    }
}

#[derive(Default)]
struct BuildStats {
    dropped: Vec<String>,
    includes: u32,
    excludes: u32,
}

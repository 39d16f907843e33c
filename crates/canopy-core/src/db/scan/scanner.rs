use crate::{
    config::ScanOptions,
    db::{
        aggregate::AttributeFilter,
        cursor::{DocumentCursor, DocumentMatch},
        document::Document,
        filter::EventDataFilter,
        key::{DOCUMENT_ID_SEPARATOR, Key, NULL_BYTE, Range, next_document_key},
        plan::{BuilderKind, CompiledPlan, PlanBuilder, QueryNode},
        store::SortedKeyCursor,
    },
    error::{ErrorClass, ErrorOrigin, InternalError},
    obs::{self, ScanTraceEvent, TraceSinkHandle},
};
use std::{collections::BTreeSet, ops::Bound, sync::Arc};
use tracing::{debug, trace};

///
/// DocumentScanner
///
/// Scan driver for one query over one shard source.
///
/// The plan is compiled on first use. Seeks are resumed on whole-document
/// boundaries for the hierarchy-aware strategy, so a scan restarted after
/// an emitted document never revisits it or any of its children.
///

pub struct DocumentScanner {
    source: Box<dyn SortedKeyCursor>,
    query: Arc<QueryNode>,
    options: Arc<ScanOptions>,
    attribute_filter: Option<Arc<dyn AttributeFilter>>,
    filter: EventDataFilter,
    trace: Option<TraceSinkHandle>,
    plan: Option<CompiledPlan>,
    documents: u64,
    finished: bool,
}

impl DocumentScanner {
    /// Build a scanner; options are validated here.
    pub fn new(
        source: Box<dyn SortedKeyCursor>,
        query: QueryNode,
        options: ScanOptions,
    ) -> Result<Self, InternalError> {
        options.validate()?;
        let filter = EventDataFilter::new(&options.event_filter, query.fields());

        Ok(Self {
            source,
            query: Arc::new(query),
            options: Arc::new(options),
            attribute_filter: None,
            filter,
            trace: None,
            plan: None,
            documents: 0,
            finished: false,
        })
    }

    #[must_use]
    pub fn with_trace(mut self, trace: Option<TraceSinkHandle>) -> Self {
        self.trace = trace;
        self.plan = None;
        self
    }

    /// Filter consulted for every attribute before it is marked as kept.
    #[must_use]
    pub fn with_attribute_filter(mut self, filter: Arc<dyn AttributeFilter>) -> Self {
        self.attribute_filter = Some(filter);
        self.plan = None;
        self
    }

    #[must_use]
    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Compile the plan if needed and return it.
    pub fn compile(&mut self) -> Result<&CompiledPlan, InternalError> {
        self.ensure_plan().map(|plan| &*plan)
    }

    fn ensure_plan(&mut self) -> Result<&mut CompiledPlan, InternalError> {
        if self.plan.is_none() {
            let leaves = self.options.leaves(self.attribute_filter.clone());
            let plan = PlanBuilder::new(leaves, self.source.as_ref())
                .with_fields(self.options.field_policy())
                .with_index_only(self.options.index_only_fields.clone())
                .fully_satisfied(self.options.query_fully_satisfied)
                .with_trace(self.trace.clone())
                .build(&self.query)?;
            debug!(plan = %plan.describe(), fingerprint = %plan.fingerprint, "scan plan ready");
            self.plan = Some(plan);
        }

        self.plan
            .as_mut()
            .ok_or_else(|| InternalError::scan_invariant("scan plan missing after compilation"))
    }

    /// Read the matched document from the shard, children included, keeping
    /// the cells the event-data filter selects.
    pub fn load_document(&self, found: &DocumentMatch) -> Result<Document, InternalError> {
        let mut source = self.source.deep_copy();
        let mut filter = self.filter.clone();
        filter.start_document();

        let mut document = Document::new();
        let mut markers = BTreeSet::new();
        for range in document_ranges(self.options.plan_builder, &found.key) {
            source.seek(&range)?;

            while let Some(key) = source.peek_key().cloned() {
                if filter.apply(&key)? {
                    let keep = filter.keep(&key)?
                        && self
                            .attribute_filter
                            .as_ref()
                            .is_none_or(|attributes| attributes.keep(&key));
                    push_cell(&mut document, &key, keep);
                    source.next()?;
                    continue;
                }

                if let Some(marker) = filter.transform(&key)?
                    && markers.insert(marker.column_qualifier().to_vec())
                {
                    push_cell(&mut document, &marker, true);
                }

                match filter.seek_range(&key, range.end())? {
                    Some(next) => {
                        trace!(from = %key, to = %next, "document load seek");
                        source.seek(&next)?;
                    }
                    None => source.next()?,
                }
            }
        }

        debug!(key = %found.key, attributes = document.len(), "document loaded");

        Ok(document)
    }

    fn copy(&self) -> Self {
        Self {
            source: self.source.deep_copy(),
            query: Arc::clone(&self.query),
            options: Arc::clone(&self.options),
            attribute_filter: self.attribute_filter.clone(),
            filter: self.filter.clone(),
            trace: self.trace.clone(),
            plan: self.plan.as_ref().map(CompiledPlan::deep_copy),
            documents: self.documents,
            finished: self.finished,
        }
    }
}

impl DocumentCursor for DocumentScanner {
    fn seek(&mut self, range: &Range) -> Result<(), InternalError> {
        let resumed = resume_range(self.options.plan_builder, range);
        let rewritten = resumed != *range;
        if rewritten {
            debug!(from = %range, to = %resumed, "scan range resumed");
        }

        self.documents = 0;
        self.finished = false;

        let plan = self.ensure_plan()?;
        let fingerprint = plan.fingerprint;
        let root = plan.root.as_mut().ok_or_else(|| {
            InternalError::new(
                ErrorClass::Unsupported,
                ErrorOrigin::Plan,
                "query has no index-backed predicate",
            )
        })?;
        root.seek(&resumed)?;

        obs::emit(self.trace.as_ref(), || ScanTraceEvent::Seek {
            fingerprint,
            rewritten,
        });

        Ok(())
    }

    fn peek(&self) -> Option<&Key> {
        self.plan.as_ref()?.root.as_ref()?.peek()
    }

    fn next(&mut self) -> Result<Option<DocumentMatch>, InternalError> {
        let Some(plan) = self.plan.as_mut() else {
            return Ok(None);
        };
        let fingerprint = plan.fingerprint;
        let Some(root) = plan.root.as_mut() else {
            return Ok(None);
        };

        if let Some(found) = root.next()? {
            self.documents += 1;
            trace!(key = %found.key, "document emitted");
            obs::emit(self.trace.as_ref(), || ScanTraceEvent::DocumentEmitted {
                fingerprint,
            });

            return Ok(Some(found));
        }

        if !self.finished {
            self.finished = true;
            debug!(documents = self.documents, "scan finished");
            obs::emit(self.trace.as_ref(), || ScanTraceEvent::Finish {
                fingerprint,
                documents: self.documents,
            });
        }

        Ok(None)
    }

    fn move_to(&mut self, pointer: &Key) -> Result<(), InternalError> {
        match self.plan.as_mut().and_then(|plan| plan.root.as_mut()) {
            Some(root) => root.move_to(pointer),
            None => Ok(()),
        }
    }

    fn deep_copy(&self) -> Box<dyn DocumentCursor> {
        Box::new(self.copy())
    }

    fn describe(&self) -> String {
        self.plan
            .as_ref()
            .map_or_else(|| "<uncompiled>".to_string(), CompiledPlan::describe)
    }
}

/// Range a scan resumes with.
///
/// For the hierarchy-aware strategy an exclusive start names a document
/// already returned; the start moves to that document's sentinel so none of
/// its children are revisited. A start pushed past the end leaves an empty
/// range just after the new start.
#[must_use]
pub fn resume_range(kind: BuilderKind, range: &Range) -> Range {
    if kind == BuilderKind::Generic {
        return range.clone();
    }
    let Bound::Excluded(start) = range.start() else {
        return range.clone();
    };

    let next = next_document_key(start);
    if next == *start {
        return range.clone();
    }
    if range.after_end(&next) {
        return Range::new(Bound::Included(next.clone()), Bound::Excluded(next));
    }

    range.with_start(Bound::Included(next))
}

// Ranges holding every cell of the matched document.
fn document_ranges(kind: BuilderKind, key: &Key) -> Vec<Range> {
    let own = Range::exact_family(key);
    if kind == BuilderKind::Generic {
        return vec![own];
    }

    let mut children = key.column_family().to_vec();
    children.push(DOCUMENT_ID_SEPARATOR);
    let start = Key::new(key.row(), children, Vec::new());

    vec![
        own,
        Range::new(Bound::Included(start), Bound::Excluded(next_document_key(key))),
    ]
}

// Event qualifiers are `name NUL value`.
fn push_cell(document: &mut Document, key: &Key, keep: bool) {
    let cq = key.column_qualifier();
    let (name, value) = match cq.iter().position(|&byte| byte == NULL_BYTE) {
        Some(nul) => (&cq[..nul], &cq[nul + 1..]),
        None => (cq, &[][..]),
    };

    document.push_field(name, value, false, keep);
}

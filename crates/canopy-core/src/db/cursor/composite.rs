use crate::{
    db::{
        cursor::{DocumentCursor, DocumentCursorBox, DocumentMatch, document_order},
        document::Document,
        key::{Key, Range},
    },
    error::InternalError,
};
use tracing::trace;

///
/// Join
///
/// Include-group semantics of a composite cursor.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Join {
    And,
    Or,
}

impl Join {
    const fn operator(self) -> &'static str {
        match self {
            Self::And => " && ",
            Self::Or => " || ",
        }
    }
}

///
/// CompositeCursor
///
/// Streaming AND/OR over child cursors joined on document order.
///
/// A candidate is accepted when it is present in the include group under the
/// join (all includes for AND, any include for OR) and absent from every
/// exclude. Children are consumed in lockstep; nothing is buffered beyond
/// the current match.
///

pub struct CompositeCursor {
    join: Join,
    includes: Vec<DocumentCursorBox>,
    excludes: Vec<DocumentCursorBox>,
    top: Option<Key>,
    document: Document,
}

impl CompositeCursor {
    #[must_use]
    pub const fn new(
        join: Join,
        includes: Vec<DocumentCursorBox>,
        excludes: Vec<DocumentCursorBox>,
    ) -> Self {
        Self {
            join,
            includes,
            excludes,
            top: None,
            document: Document::new(),
        }
    }

    #[must_use]
    pub const fn join(&self) -> Join {
        self.join
    }

    #[must_use]
    pub const fn include_count(&self) -> usize {
        self.includes.len()
    }

    #[must_use]
    pub const fn exclude_count(&self) -> usize {
        self.excludes.len()
    }

    fn find_next(&mut self) -> Result<(), InternalError> {
        self.top = None;
        self.document.clear();

        loop {
            let candidate = match self.join {
                Join::And => self.align_includes()?,
                Join::Or => self.lowest_include(),
            };
            let Some(candidate) = candidate else {
                return Ok(());
            };

            if self.is_excluded(&candidate)? {
                trace!(candidate = %candidate, "composite candidate excluded");
                self.consume(&candidate, None)?;
                continue;
            }

            let mut document = Document::new();
            self.consume(&candidate, Some(&mut document))?;
            self.top = Some(candidate);
            self.document = document;

            return Ok(());
        }
    }

    // Leapfrog every include onto the greatest current document.
    fn align_includes(&mut self) -> Result<Option<Key>, InternalError> {
        loop {
            let mut greatest: Option<&Key> = None;
            for include in &self.includes {
                let Some(key) = include.peek() else {
                    return Ok(None);
                };
                if greatest.is_none_or(|max| document_order(key, max).is_gt()) {
                    greatest = Some(key);
                }
            }
            let Some(target) = greatest.cloned() else {
                return Ok(None);
            };

            let mut aligned = true;
            for include in &mut self.includes {
                if include
                    .peek()
                    .is_some_and(|key| document_order(key, &target).is_lt())
                {
                    include.move_to(&target)?;
                    aligned = false;
                }
            }

            if aligned {
                return Ok(Some(target));
            }
        }
    }

    fn lowest_include(&self) -> Option<Key> {
        self.includes
            .iter()
            .filter_map(|include| include.peek())
            .min_by(|left, right| document_order(left, right))
            .cloned()
    }

    fn is_excluded(&mut self, candidate: &Key) -> Result<bool, InternalError> {
        for exclude in &mut self.excludes {
            if exclude
                .peek()
                .is_some_and(|key| document_order(key, candidate).is_lt())
            {
                exclude.move_to(candidate)?;
            }
            if exclude
                .peek()
                .is_some_and(|key| document_order(key, candidate).is_eq())
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    // Advance every include positioned on `candidate`, merging attributes.
    fn consume(
        &mut self,
        candidate: &Key,
        mut document: Option<&mut Document>,
    ) -> Result<(), InternalError> {
        for include in &mut self.includes {
            while include
                .peek()
                .is_some_and(|key| document_order(key, candidate).is_eq())
            {
                let Some(matched) = include.next()? else {
                    break;
                };
                if let Some(document) = document.as_deref_mut() {
                    document.merge(matched.document);
                }
            }
        }

        Ok(())
    }
}

impl DocumentCursor for CompositeCursor {
    fn seek(&mut self, range: &Range) -> Result<(), InternalError> {
        for child in self.includes.iter_mut().chain(self.excludes.iter_mut()) {
            child.seek(range)?;
        }

        self.find_next()
    }

    fn peek(&self) -> Option<&Key> {
        self.top.as_ref()
    }

    fn next(&mut self) -> Result<Option<DocumentMatch>, InternalError> {
        let Some(key) = self.top.take() else {
            return Ok(None);
        };
        let document = std::mem::take(&mut self.document);
        self.find_next()?;

        Ok(Some(DocumentMatch { key, document }))
    }

    fn move_to(&mut self, pointer: &Key) -> Result<(), InternalError> {
        match &self.top {
            None => return Ok(()),
            Some(top) if document_order(top, pointer).is_ge() => return Ok(()),
            Some(_) => {}
        }

        for include in &mut self.includes {
            if include
                .peek()
                .is_some_and(|key| document_order(key, pointer).is_lt())
            {
                include.move_to(pointer)?;
            }
        }

        self.find_next()
    }

    fn deep_copy(&self) -> Box<dyn DocumentCursor> {
        Box::new(Self {
            join: self.join,
            includes: self.includes.iter().map(|c| c.deep_copy()).collect(),
            excludes: self.excludes.iter().map(|c| c.deep_copy()).collect(),
            top: self.top.clone(),
            document: self.document.clone(),
        })
    }

    fn describe(&self) -> String {
        let mut parts: Vec<String> = self.includes.iter().map(|c| c.describe()).collect();
        parts.extend(self.excludes.iter().map(|c| format!("!({})", c.describe())));

        format!("({})", parts.join(self.join.operator()))
    }
}

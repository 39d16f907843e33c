use crate::{
    db::{key::Key, store::KeySource},
    error::InternalError,
};

///
/// FilteredCursor
///
/// View of a positioned cursor that only exposes entries `accept` admits.
/// Rejected entries are consumed from the inner cursor as they come up.
///

pub struct FilteredCursor<S, F> {
    inner: S,
    accept: F,
}

impl<S, F> FilteredCursor<S, F>
where
    S: KeySource,
    F: Fn(&Key) -> Result<bool, InternalError>,
{
    /// Wrap `inner`, skipping any rejected entries at its current position.
    pub fn new(inner: S, accept: F) -> Result<Self, InternalError> {
        let mut cursor = Self { inner, accept };
        cursor.skip_rejected()?;

        Ok(cursor)
    }

    fn skip_rejected(&mut self) -> Result<(), InternalError> {
        while let Some(key) = self.inner.peek_key() {
            if (self.accept)(key)? {
                break;
            }
            self.inner.next()?;
        }

        Ok(())
    }
}

impl<S, F> KeySource for FilteredCursor<S, F>
where
    S: KeySource,
    F: Fn(&Key) -> Result<bool, InternalError>,
{
    fn has_next(&self) -> bool {
        self.inner.has_next()
    }

    fn peek_key(&self) -> Option<&Key> {
        self.inner.peek_key()
    }

    fn peek_value(&self) -> Option<&[u8]> {
        self.inner.peek_value()
    }

    fn next(&mut self) -> Result<(), InternalError> {
        self.inner.next()?;
        self.skip_rejected()
    }
}

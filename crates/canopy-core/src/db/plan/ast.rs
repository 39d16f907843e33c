use std::collections::BTreeSet;

///
/// QueryNode
///
/// Boolean query tree handed to the plan builder.
/// A `None` value is an unresolved comparison (`field == null`).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryNode {
    Eq {
        field: String,
        value: Option<Vec<u8>>,
    },
    Ne {
        field: String,
        value: Option<Vec<u8>>,
    },
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
}

impl QueryNode {
    #[must_use]
    pub fn equals(field: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::Eq {
            field: field.into(),
            value: Some(value.into()),
        }
    }

    #[must_use]
    pub fn equals_null(field: impl Into<String>) -> Self {
        Self::Eq {
            field: field.into(),
            value: None,
        }
    }

    #[must_use]
    pub fn not_equals(field: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::Ne {
            field: field.into(),
            value: Some(value.into()),
        }
    }

    #[must_use]
    pub const fn all(children: Vec<Self>) -> Self {
        Self::And(children)
    }

    #[must_use]
    pub const fn any(children: Vec<Self>) -> Self {
        Self::Or(children)
    }

    #[must_use]
    pub fn negate(child: Self) -> Self {
        Self::Not(Box::new(child))
    }

    /// Every field name referenced anywhere in the tree.
    #[must_use]
    pub fn fields(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Eq { field, .. } | Self::Ne { field, .. } => {
                out.insert(field.clone());
            }
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Self::Not(child) => child.collect_fields(out),
        }
    }
}

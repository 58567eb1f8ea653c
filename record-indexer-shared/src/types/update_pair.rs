//! Pairing of an incoming record with its previously indexed counterpart.

/// An incoming "update" value together with the value currently held by the
/// index for the same id, if any.
///
/// `existing` is populated only when a successful lookup found a prior index
/// entry with the same id; a pair for a brand-new record carries `None`.
/// Pairs are created by the existing-values lookup stage and consumed within
/// the same batch by downstream stages.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePair<T> {
    update: T,
    existing: Option<T>,
}

impl<T> UpdatePair<T> {
    /// Pair for a record with no prior index entry.
    pub fn only_new(update: T) -> Self {
        Self {
            update,
            existing: None,
        }
    }

    /// Pair an incoming record with an optional prior index entry.
    pub fn with_existing(update: T, existing: Option<T>) -> Self {
        Self { update, existing }
    }

    /// The incoming record.
    pub fn update(&self) -> &T {
        &self.update
    }

    /// The prior index entry, if the record already existed.
    pub fn existing(&self) -> Option<&T> {
        self.existing.as_ref()
    }

    /// Whether this record is new to the index.
    pub fn is_new(&self) -> bool {
        self.existing.is_none()
    }

    /// Split the pair into its parts.
    pub fn into_parts(self) -> (T, Option<T>) {
        (self.update, self.existing)
    }
}

//! Missing-value filtering for ingestion.
//!
//! Input batches carry a caller-supplied sentinel value meaning "no entry
//! here". [`IsValid`] decides, per raw value, whether a stored entry is
//! constructed at all; values equal to the sentinel and NaN values are
//! dropped. It also carries the admissibility rule for infinities: an
//! infinite value is only legitimate input when the sentinel is itself
//! infinite.

/// Predicate deciding whether a raw value becomes a stored entry.
#[derive(Clone, Copy, Debug)]
pub struct IsValid {
    missing: f32,
}

impl IsValid {
    #[inline]
    pub fn new(missing: f32) -> Self {
        Self { missing }
    }

    /// The missing sentinel this filter was built with.
    #[inline]
    pub fn missing(&self) -> f32 {
        self.missing
    }

    /// Returns `true` if `value` is a real entry: not NaN and not equal to
    /// the missing sentinel.
    ///
    /// A NaN sentinel drops only NaN values, since `value != NaN` holds for
    /// every real value.
    #[inline]
    pub fn is_valid(&self, value: f32) -> bool {
        !value.is_nan() && value != self.missing
    }

    /// Returns `true` if `value` is admissible input at all.
    ///
    /// An infinite value can only appear in well-formed data when it is
    /// itself the declared sentinel; with a finite (or NaN) sentinel it
    /// signals corrupt input.
    #[inline]
    pub fn is_admissible(&self, value: f32) -> bool {
        self.missing.is_infinite() || !value.is_infinite()
    }
}

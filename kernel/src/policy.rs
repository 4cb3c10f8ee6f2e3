//! Policy validation error shared by kernel policies.

/// A policy field is out of range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid policy: {detail}")]
pub struct InvalidPolicy {
    pub detail: String,
}

impl InvalidPolicy {
    pub(crate) fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

pub(crate) fn check_probability(name: &str, p: f64) -> Result<(), InvalidPolicy> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(InvalidPolicy::new(format!(
            "{name} must lie in [0, 1], got {p}"
        )))
    }
}

use std::collections::HashMap;
use std::sync::Arc;

/// Metadata entry carrying a backend's administrative weight.
pub const WEIGHT_METADATA_KEY: &str = "weight";

/// Weight assumed when discovery metadata carries no usable weight.
pub const DEFAULT_WEIGHT: u32 = 1;

/// Errors produced when validating a candidate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandidateError {
    /// Weights are positive integers.
    #[error("candidate '{id}' has weight 0; weights must be >= 1")]
    ZeroWeight {
        /// Offending candidate id.
        id: String,
    },
    /// Candidates are keyed by id, so it cannot be blank.
    #[error("candidate id must not be empty")]
    EmptyId,
}

/// A reachable backend replica as reported by discovery.
///
/// `handle` is the opaque connection the caller sends requests through; the
/// picker clones it out on every pick and never looks inside.
#[derive(Debug, Clone)]
pub struct Candidate<H> {
    id: Arc<str>,
    handle: H,
    weight: u32,
}

impl<H> Candidate<H> {
    /// Create a candidate with an explicit weight (must be >= 1).
    pub fn new(id: impl Into<String>, handle: H, weight: u32) -> Result<Self, CandidateError> {
        let id = validate_id(id.into())?;
        if weight == 0 {
            return Err(CandidateError::ZeroWeight { id });
        }
        Ok(Self { id: id.into(), handle, weight })
    }

    /// Create a candidate from discovery metadata.
    ///
    /// The weight comes from the `weight` entry. A missing entry means
    /// [`DEFAULT_WEIGHT`]; an unparsable or zero value is logged and replaced
    /// by the default so one bad address does not drop the whole update.
    pub fn from_metadata(
        id: impl Into<String>,
        handle: H,
        metadata: &HashMap<String, String>,
    ) -> Result<Self, CandidateError> {
        let id = validate_id(id.into())?;
        let weight = match metadata.get(WEIGHT_METADATA_KEY) {
            None => DEFAULT_WEIGHT,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(weight) if weight > 0 => weight,
                _ => {
                    tracing::warn!(
                        id = %id,
                        weight = %raw,
                        default = DEFAULT_WEIGHT,
                        "invalid weight in discovery metadata; using default"
                    );
                    DEFAULT_WEIGHT
                }
            },
        };
        Ok(Self { id: id.into(), handle, weight })
    }

    /// Stable identifier; also the tie-break order for the picker.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Administrative weight (>= 1).
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Connection handle.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub(crate) fn shared_id(&self) -> Arc<str> {
        self.id.clone()
    }
}

fn validate_id(id: String) -> Result<String, CandidateError> {
    if id.trim().is_empty() {
        return Err(CandidateError::EmptyId);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn rejects_zero_weight() {
        let err = Candidate::new("a", (), 0).expect_err("zero weight should be invalid");
        assert_eq!(err, CandidateError::ZeroWeight { id: "a".into() });
    }

    #[test]
    fn rejects_blank_id() {
        assert_eq!(Candidate::new("  ", (), 1).unwrap_err(), CandidateError::EmptyId);
        assert_eq!(
            Candidate::from_metadata("", (), &HashMap::new()).unwrap_err(),
            CandidateError::EmptyId
        );
    }

    #[test]
    fn reads_weight_from_metadata() {
        let c = Candidate::from_metadata("10.0.0.1:9000", (), &metadata(&[("weight", " 7 ")]))
            .unwrap();
        assert_eq!(c.weight(), 7);
        assert_eq!(c.id(), "10.0.0.1:9000");
    }

    #[test]
    fn missing_or_bad_weight_falls_back_to_default() {
        let missing = Candidate::from_metadata("a", (), &metadata(&[("zone", "eu")])).unwrap();
        assert_eq!(missing.weight(), DEFAULT_WEIGHT);

        let garbage = Candidate::from_metadata("b", (), &metadata(&[("weight", "heavy")])).unwrap();
        assert_eq!(garbage.weight(), DEFAULT_WEIGHT);

        let zero = Candidate::from_metadata("c", (), &metadata(&[("weight", "0")])).unwrap();
        assert_eq!(zero.weight(), DEFAULT_WEIGHT);

        let negative = Candidate::from_metadata("d", (), &metadata(&[("weight", "-3")])).unwrap();
        assert_eq!(negative.weight(), DEFAULT_WEIGHT);
    }
}

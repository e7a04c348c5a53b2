//! Which records of a stream an event-book read returns.

use tessera_types::{Sequence, Timestamp};

use crate::error::{Result, TesseraError};

/// Record selection for [`crate::Tessera::get_event_book`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    /// Newest snapshot plus every record after it.
    #[default]
    Latest,
    /// `lower..=upper`, or `lower..` when `upper` is `None`.
    Range {
        lower: Sequence,
        upper: Option<Sequence>,
    },
    /// The stream as it stood at a point in time.
    Temporal(PointInTime),
    /// Records of this stream appended under a correlation id.
    Correlation(String),
}

impl Selector {
    pub fn range(lower: u64, upper: Option<u64>) -> Self {
        Selector::Range {
            lower: Sequence::new(lower),
            upper: upper.map(Sequence::new),
        }
    }

    pub fn as_of_sequence(sequence: u64) -> Self {
        Selector::Temporal(PointInTime::Sequence(Sequence::new(sequence)))
    }

    pub fn as_of_rfc3339(input: impl Into<String>) -> Self {
        Selector::Temporal(PointInTime::Rfc3339(input.into()))
    }

    /// Rejects selectors that cannot select anything well-defined.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Selector::Latest | Selector::Temporal(_) => Ok(()),
            Selector::Range {
                lower,
                upper: Some(upper),
            } if upper < lower => Err(TesseraError::invalid(format!(
                "range upper bound {upper} is below lower bound {lower}"
            ))),
            Selector::Range { .. } => Ok(()),
            Selector::Correlation(id) if id.is_empty() => Err(TesseraError::invalid(
                "correlation selector requires a correlation id",
            )),
            Selector::Correlation(_) => Ok(()),
        }
    }
}

/// A point in a stream's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointInTime {
    /// Inclusive: the record at this sequence is part of the result.
    Sequence(Sequence),
    /// Every record created at or before this instant.
    Timestamp(Timestamp),
    /// Same as `Timestamp`, given as an RFC 3339 string.
    Rfc3339(String),
}

/// A resolved point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AsOf {
    Sequence(Sequence),
    Timestamp(Timestamp),
}

impl PointInTime {
    pub(crate) fn resolve(&self) -> Result<AsOf> {
        match self {
            PointInTime::Sequence(s) => Ok(AsOf::Sequence(*s)),
            PointInTime::Timestamp(t) => Ok(AsOf::Timestamp(*t)),
            PointInTime::Rfc3339(input) => Timestamp::parse_rfc3339(input)
                .map(AsOf::Timestamp)
                .map_err(|e| TesseraError::invalid(format!("point in time: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_storage::ErrorKind;
    use test_case::test_case;

    #[test_case(Selector::Latest ; "latest")]
    #[test_case(Selector::range(0, None) ; "open range")]
    #[test_case(Selector::range(3, Some(3)) ; "single record range")]
    #[test_case(Selector::as_of_sequence(0) ; "as of sequence")]
    #[test_case(Selector::Correlation("flow".into()) ; "correlation")]
    fn valid_selectors(selector: Selector) {
        assert!(selector.validate().is_ok());
    }

    #[test_case(Selector::range(5, Some(4)) ; "inverted range")]
    #[test_case(Selector::Correlation(String::new()) ; "empty correlation")]
    fn invalid_selectors(selector: Selector) {
        let err = selector.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn rfc3339_resolves_to_timestamp() {
        let at = PointInTime::Rfc3339("1970-01-01T00:00:10Z".to_string())
            .resolve()
            .unwrap();
        assert_eq!(at, AsOf::Timestamp(Timestamp::from_secs(10)));
    }

    #[test_case("" ; "empty")]
    #[test_case("yesterday" ; "prose")]
    #[test_case("2024-13-40T00:00:00Z" ; "out of range")]
    fn bad_rfc3339_is_invalid(input: &str) {
        let err = PointInTime::Rfc3339(input.to_string())
            .resolve()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a job within one queue instance.
///
/// Ids are assigned from a per-queue counter starting at 1 and are never reused,
/// even after the job has been evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// First id handed out by a fresh queue
    pub const FIRST: JobId = JobId(1);

    /// Get the numeric value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The id following this one
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_from_route_params() {
        assert_eq!("12".parse::<JobId>().unwrap(), JobId(12));
        assert!("abc".parse::<JobId>().is_err());
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        assert_eq!(serde_json::to_string(&JobId(3)).unwrap(), "3");
    }
}

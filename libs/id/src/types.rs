//! Typed ID definitions.

use crate::define_id;
use crate::IdError;
use ulid::Ulid;

// =============================================================================
// Jobs
// =============================================================================

/// The identity of a job, minted once at intake.
///
/// Job IDs are bare ULIDs: lexicographic order is mint order, and the canonical
/// form is the 26-character Crockford base32 string with no prefix. Clients
/// address jobs by this string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(Ulid);

impl JobId {
    /// Mints a fresh, time-ordered job ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a job ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the timestamp portion of the ULID in milliseconds.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }

    /// Parses a job ID from its canonical bare-ULID form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let ulid = s
            .parse::<Ulid>()
            .map_err(|e| IdError::InvalidUlid(e.to_string()))?;

        Ok(Self(ulid))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for JobId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl AsRef<Ulid> for JobId {
    fn as_ref(&self) -> &Ulid {
        &self.0
    }
}

// =============================================================================
// Requests
// =============================================================================

define_id!(RequestId, "req");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_roundtrip() {
        let id = JobId::new();
        let parsed = JobId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn job_id_is_bare_ulid() {
        let id = JobId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 26);
        assert!(!s.contains('_'));
        assert!(s.parse::<Ulid>().is_ok());
    }

    #[test]
    fn job_ids_sort_by_mint_time() {
        let a = JobId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = JobId::new();
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }

    #[test]
    fn job_id_rejects_garbage() {
        assert_eq!(JobId::parse(""), Err(IdError::Empty));
        assert!(matches!(
            JobId::parse("not-a-ulid"),
            Err(IdError::InvalidUlid(_))
        ));
    }

    #[test]
    fn job_id_serde_as_string() {
        let id = JobId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn request_id_has_prefix() {
        let id = RequestId::new();
        assert!(id.to_string().starts_with("req_"));
        let parsed: RequestId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn request_id_rejects_wrong_prefix() {
        let err = RequestId::parse("job_01HV4Z2WQXKJNM8GPQY6VBKC3D").unwrap_err();
        assert!(matches!(err, IdError::InvalidPrefix { .. }));
    }
}

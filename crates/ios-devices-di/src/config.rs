use serde::{Deserialize, Serialize};

/// How `OpenPartition` treats the ticket and certificate-chain vectors.
///
/// Guests are expected to leave both unset. Older drivers sometimes pass them anyway.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyFieldPolicy {
    /// Log a warning and open the partition as if the fields were absent.
    #[default]
    Permissive,
    /// Fail the request with `IPC_EINVAL` without touching the disc.
    Strict,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiConfig {
    pub legacy_fields: LegacyFieldPolicy,
}

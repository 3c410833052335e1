//! Item availability status.

use serde::{Deserialize, Serialize};

/// Availability status of a marketplace item.
///
/// The item row in the transactional store is the single source of truth for
/// sellability. Transitions are owned by the checkout flow:
///
/// - `Available -> Reserved` by the reservation coordinator
/// - `Reserved -> Sold` by the settlement reconciler (completion)
/// - `Reserved -> Available` by release (compensation, abandon, sweep)
///
/// `Sold` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Available,
    Reserved,
    Sold,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "available"),
            Self::Reserved => write!(f, "reserved"),
            Self::Sold => write!(f, "sold"),
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "reserved" => Ok(Self::Reserved),
            "sold" => Ok(Self::Sold),
            _ => Err(format!("invalid item status: {s}")),
        }
    }
}

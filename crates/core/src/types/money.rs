//! Money in integer minor units.
//!
//! All monetary arithmetic in the checkout flow happens in the smallest
//! currency unit (cents) to avoid floating-point drift. Conversion to major
//! units happens only at the I/O boundary (display, logs).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An amount of money in minor units (cents) of the single supported currency.
///
/// Negative amounts are representable (refund math) but nothing in the
/// checkout flow produces them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Get the amount in minor units.
    #[must_use]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Checked addition; `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Absolute difference between two amounts, saturating on overflow.
    #[must_use]
    pub const fn abs_diff(self, other: Self) -> Self {
        let d = self.0.abs_diff(other.0);
        if d > i64::MAX as u64 {
            Self(i64::MAX)
        } else {
            #[allow(clippy::cast_possible_wrap)] // bounded by the check above
            let minor = d as i64;
            Self(minor)
        }
    }

    /// Convert to major units for display (e.g. `3650` -> `36.50`).
    #[must_use]
    pub fn to_major(self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_major())
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| {
            acc.checked_add(m).unwrap_or(Self(i64::MAX))
        })
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let minor = <i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(minor))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

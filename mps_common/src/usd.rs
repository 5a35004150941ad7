use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::op;

pub const USD_CURRENCY_CODE: &str = "USD";

//--------------------------------------     UsdAmount       ---------------------------------------------------------
/// A USD amount, stored as an integer number of cents so that running balances never accumulate floating-point
/// error. Values cross the wire as decimal dollars (e.g. `99.8`), which is what the payment gateway sends.
#[derive(Debug, Clone, Copy, Default, Ord, PartialOrd)]
pub struct UsdAmount(i64);

op!(binary UsdAmount, Add, add);
op!(inplace UsdAmount, AddAssign, add_assign);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in USD cents: {0}")]
pub struct UsdConversionError(String);

impl From<i64> for UsdAmount {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl PartialEq for UsdAmount {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for UsdAmount {}

impl TryFrom<f64> for UsdAmount {
    type Error = UsdConversionError;

    fn try_from(dollars: f64) -> Result<Self, Self::Error> {
        if !dollars.is_finite() {
            return Err(UsdConversionError(format!("{dollars} is not a finite dollar value")));
        }
        let cents = (dollars * 100.0).round();
        if cents.abs() >= i64::MAX as f64 {
            return Err(UsdConversionError(format!("{dollars} is too large to convert to UsdAmount")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(cents as i64))
    }
}

impl Display for UsdAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${:0.2}", self.to_dollars())
    }
}

impl UsdAmount {
    /// The amount in whole cents.
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    pub fn to_dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

// On the wire, USD amounts are decimal dollars, matching the gateway's JSON payloads.
impl Serialize for UsdAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_dollars())
    }
}

impl<'de> Deserialize<'de> for UsdAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dollars = f64::deserialize(deserializer)?;
        UsdAmount::try_from(dollars).map_err(serde::de::Error::custom)
    }
}

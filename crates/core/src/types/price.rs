//! Non-negative price amounts using decimal arithmetic.
//!
//! The shop trades in a single currency, so a price is just an amount in the
//! currency's standard unit.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::Quantity;

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
    /// The input is not a decimal number.
    #[error("price is not a number: {0}")]
    NotANumber(String),
    /// More decimal places than the currency has.
    #[error("price cannot have more than {} decimal places", Price::SCALE)]
    TooPrecise,
    /// The amount is above the allowed maximum.
    #[error("price cannot exceed {0}")]
    TooLarge(Decimal),
    /// Arithmetic on prices left the representable range.
    #[error("amount exceeds {}", Price::max_amount())]
    Overflow,
}

/// A non-negative price.
///
/// Serializes as a decimal string (`"1000.50"`) so no precision is lost in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Zero price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Decimal places an amount may carry.
    pub const SCALE: u32 = 2;

    /// Largest amount any price may reach, order totals included.
    #[must_use]
    pub fn max_amount() -> Decimal {
        Decimal::new(99_999_999_999_999, Self::SCALE)
    }

    /// Largest amount a single unit may cost. Any unit price times
    /// [`Quantity::MAX`] stays within [`Price::max_amount`].
    #[must_use]
    pub fn max_unit_amount() -> Decimal {
        Decimal::new(9_999_999_999, Self::SCALE)
    }

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if `amount < 0`,
    /// `PriceError::TooPrecise` for more than [`Price::SCALE`] decimal
    /// places, and `PriceError::TooLarge` above [`Price::max_amount`].
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        if amount.normalize().scale() > Self::SCALE {
            return Err(PriceError::TooPrecise);
        }
        if amount > Self::max_amount() {
            return Err(PriceError::TooLarge(Self::max_amount()));
        }
        Ok(Self(amount))
    }

    /// Create the price of a single unit, which is capped lower than
    /// totals so that line subtotals stay in range.
    ///
    /// # Errors
    ///
    /// Same as [`Price::new`], with `PriceError::TooLarge` above
    /// [`Price::max_unit_amount`].
    pub fn unit(amount: Decimal) -> Result<Self, PriceError> {
        let price = Self::new(amount)?;
        if amount > Self::max_unit_amount() {
            return Err(PriceError::TooLarge(Self::max_unit_amount()));
        }
        Ok(price)
    }

    /// Parse a price from text such as `"1250.00"`.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::NotANumber` for non-decimal input and
    /// `PriceError::Negative` for amounts below zero.
    pub fn parse(s: &str) -> Result<Self, PriceError> {
        let amount: Decimal = s
            .trim()
            .parse()
            .map_err(|_| PriceError::NotANumber(s.to_owned()))?;
        Self::new(amount)
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the result is above
    /// [`Price::max_amount`].
    pub fn times(self, quantity: Quantity) -> Result<Self, PriceError> {
        self.0
            .checked_mul(Decimal::from(quantity.get()))
            .ok_or(PriceError::Overflow)
            .and_then(Self::in_range)
    }

    /// Sum of two prices.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` if the result is above
    /// [`Price::max_amount`].
    pub fn checked_add(self, rhs: Self) -> Result<Self, PriceError> {
        self.0
            .checked_add(rhs.0)
            .ok_or(PriceError::Overflow)
            .and_then(Self::in_range)
    }

    fn in_range(amount: Decimal) -> Result<Self, PriceError> {
        if amount > Self::max_amount() {
            return Err(PriceError::Overflow);
        }
        Ok(Self(amount))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Price {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Price {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative() {
        assert_eq!(Price::parse("-0.01"), Err(PriceError::Negative));
        assert!(Price::parse("0").is_ok());
        assert!(Price::parse("-0").is_ok());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(Price::parse("ten"), Err(PriceError::NotANumber(_))));
    }

    #[test]
    fn test_times_quantity() {
        let price = Price::parse("1000").unwrap();
        let qty = Quantity::new(3).unwrap();
        assert_eq!(price.times(qty).unwrap(), Price::parse("3000").unwrap());
    }

    #[test]
    fn test_checked_add() {
        let total = ["1000", "500", "0.25"]
            .iter()
            .map(|s| Price::parse(s).unwrap())
            .try_fold(Price::ZERO, Price::checked_add)
            .unwrap();
        assert_eq!(total, Price::parse("1500.25").unwrap());
    }

    #[test]
    fn test_rejects_extra_decimal_places() {
        assert_eq!(Price::parse("4.505"), Err(PriceError::TooPrecise));
        assert!(Price::parse("4.500").is_ok());
    }

    #[test]
    fn test_rejects_amounts_beyond_storage() {
        assert!(Price::new(Price::max_amount()).is_ok());
        assert!(matches!(
            Price::new(Decimal::MAX),
            Err(PriceError::TooLarge(_))
        ));
        assert!(Price::new(Price::max_unit_amount() + Decimal::ONE).is_ok());
        assert!(matches!(
            Price::unit(Price::max_unit_amount() + Decimal::ONE),
            Err(PriceError::TooLarge(_))
        ));
    }

    #[test]
    fn test_arithmetic_overflow_is_an_error() {
        let max = Price::new(Price::max_amount()).unwrap();
        assert_eq!(
            max.times(Quantity::new(2).unwrap()),
            Err(PriceError::Overflow)
        );
        assert_eq!(
            max.checked_add(Price::parse("0.01").unwrap()),
            Err(PriceError::Overflow)
        );
        let unit = Price::unit(Price::max_unit_amount()).unwrap();
        assert!(unit.times(Quantity::MAX).is_ok());
    }

    #[test]
    fn test_serde_as_string() {
        let price = Price::parse("12.50").unwrap();
        assert_eq!(serde_json::to_string(&price).unwrap(), "\"12.50\"");
        assert!(serde_json::from_str::<Price>("\"-1\"").is_err());
    }
}

use serde::{Deserialize, Serialize};

use crate::course::ClassWithCourse;

/// How a promotion reduces the price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Discount {
    /// Whole percent off, 0..=100
    Percentage(i64),
    /// Flat amount off, in cents
    Amount(i64),
}

impl Discount {
    pub fn percentage(pct: i64) -> Result<Self, PricingError> {
        if !(0..=100).contains(&pct) {
            return Err(PricingError::InvalidDiscount(format!("{}% is out of range", pct)));
        }
        Ok(Discount::Percentage(pct))
    }

    pub fn amount(cents: i64) -> Result<Self, PricingError> {
        if cents < 0 {
            return Err(PricingError::InvalidDiscount(format!("{} cents is negative", cents)));
        }
        Ok(Discount::Amount(cents))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Invalid discount: {0}")]
    InvalidDiscount(String),
}

/// Purchase pattern the promotion is applied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromoContext {
    /// Base class plus add-on levels, each priced on its own
    pub is_bundle: bool,
    /// All levels of the track under the series price
    pub whole_series: bool,
    /// Number of classes in the cart, base included
    pub class_count: usize,
}

/// Result of taking something off a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    pub result: i64,
    pub used: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub price: i64,
    pub used_credit: i64,
    pub applied_discount: i64,
}

impl PriceBreakdown {
    pub fn free() -> Self {
        Self::default()
    }

    /// Price before any discount or credit.
    pub fn list_price(&self) -> i64 {
        self.price + self.used_credit + self.applied_discount
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// ISO currency of all cent amounts
    pub currency: String,

    /// Whether promotions stack with the whole-series price basis
    pub series_promotions: bool,

    /// Flat promotions count once per level in a bundle
    pub bundle_flat_per_class: bool,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            series_promotions: true,
            bundle_flat_per_class: true,
        }
    }
}

/// Checkout price calculator. All amounts are integer cents.
///
/// Order of operations is fixed: list price, then at most one promotion,
/// then account credit. The result is never negative.
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Sum of unit prices for the cart. The whole-series flag switches every
    /// class to its course's series price.
    pub fn total_price_in_cents<'a, I>(&self, classes: I, whole_series: bool) -> i64
    where
        I: IntoIterator<Item = &'a ClassWithCourse>,
    {
        classes
            .into_iter()
            .map(|c| c.course.unit_price_in_cents(whole_series))
            .sum()
    }

    pub fn apply_promo(&self, price: i64, discount: &Discount, context: &PromoContext) -> Deduction {
        if price <= 0 {
            return Deduction { result: price.max(0), used: 0 };
        }

        if context.whole_series && !self.config.series_promotions {
            return Deduction { result: price, used: 0 };
        }

        let wanted = match *discount {
            Discount::Percentage(pct) => (price * pct.clamp(0, 100) + 50) / 100,
            Discount::Amount(cents) => {
                let cents = cents.max(0);
                if context.is_bundle && self.config.bundle_flat_per_class {
                    cents * context.class_count.max(1) as i64
                } else {
                    cents
                }
            }
        };

        let used = wanted.min(price);
        Deduction { result: price - used, used }
    }

    pub fn apply_credit(&self, price: i64, balance_in_cents: i64) -> Deduction {
        if price <= 0 || balance_in_cents <= 0 {
            return Deduction { result: price.max(0), used: 0 };
        }

        let used = balance_in_cents.min(price);
        Deduction { result: price - used, used }
    }

    /// Full checkout computation for a base class plus add-ons.
    pub fn price_breakdown(
        &self,
        klass: &ClassWithCourse,
        addons: &[ClassWithCourse],
        balance_in_cents: i64,
        promotion: Option<&Discount>,
        is_bundle: bool,
        whole_series: bool,
    ) -> PriceBreakdown {
        if klass.course.is_free() {
            return PriceBreakdown::free();
        }

        let mut price = self.total_price_in_cents(std::iter::once(klass).chain(addons), whole_series);
        let mut breakdown = PriceBreakdown::default();

        if price > 0 {
            if let Some(discount) = promotion {
                let context = PromoContext {
                    is_bundle,
                    whole_series,
                    class_count: 1 + addons.len(),
                };
                let pc = self.apply_promo(price, discount, &context);
                price = pc.result;
                breakdown.applied_discount = pc.used;
            }
        }

        if price > 0 && balance_in_cents > 0 {
            let pc = self.apply_credit(price, balance_in_cents);
            price = pc.result;
            breakdown.used_credit = pc.used;
        }

        breakdown.price = price;
        breakdown
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use academy_catalog::Discount;

/// A coupon code a user can type at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Promotion {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount: Discount,
    /// Only for accounts that never paid for a class
    pub first_timer_only: bool,
    /// Only for users converting from a trial or a lower level
    pub is_level_up: bool,
    pub valid_from: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub redemption_limit: Option<i32>,
    pub redemption_count: i32,
}

impl Promotion {
    /// Inside the validity window and not used up.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(from) = self.valid_from {
            if now < from {
                return false;
            }
        }

        if let Some(until) = self.expires_at {
            if now >= until {
                return false;
            }
        }

        match self.redemption_limit {
            Some(limit) => self.redemption_count < limit,
            None => true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn promo() -> Promotion {
        Promotion {
            id: Uuid::new_v4(),
            code: "SPRING20".to_string(),
            description: None,
            discount: Discount::Percentage(20),
            first_timer_only: false,
            is_level_up: false,
            valid_from: None,
            expires_at: None,
            redemption_limit: None,
            redemption_count: 0,
        }
    }

    #[test]
    fn test_open_ended_promotion_is_valid() {
        assert!(promo().is_valid());
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let p = Promotion {
            valid_from: Some(now - Duration::days(1)),
            expires_at: Some(now + Duration::days(1)),
            ..promo()
        };
        assert!(p.is_valid_at(now));
        assert!(!p.is_valid_at(now - Duration::days(2)));
        assert!(!p.is_valid_at(now + Duration::days(1)));
    }

    #[test]
    fn test_redemption_limit() {
        let p = Promotion {
            redemption_limit: Some(10),
            redemption_count: 10,
            ..promo()
        };
        assert!(!p.is_valid());

        let p = Promotion { redemption_count: 9, ..p };
        assert!(p.is_valid());
    }
}

use uuid::Uuid;

use crate::pii::Masked;

pub const ACCOUNT_TOPIC: &str = "academy.account";
pub const PROMOTION_TOPIC: &str = "academy.promotion";
pub const ENROLLMENT_TOPIC: &str = "academy.enrollment";

/// Emitted whenever a parent account's children or balance change, so
/// downstream caches (CRM sync, search) can refresh.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct AccountUpdatedEvent {
    pub user_id: Uuid,
    pub timestamp: i64,
}

/// A signed-in user tried a coupon they are not allowed to use.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct CouponRejectedEvent {
    pub user_id: Uuid,
    pub email: Masked<String>,
    pub promotion_id: Uuid,
    pub code: String,
    pub reason: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct EnrollmentCreatedEvent {
    pub user_id: Uuid,
    pub student_id: Uuid,
    pub class_ids: Vec<Uuid>,
    pub price_in_cents: i64,
    pub used_credit: i64,
    pub applied_discount: i64,
    pub promotion_id: Option<Uuid>,
    pub timestamp: i64,
}

/// Envelope used on the wire: `{"type": "...", "payload": {...}}`.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainEvent {
    AccountUpdated(AccountUpdatedEvent),
    CouponRejected(CouponRejectedEvent),
    EnrollmentCreated(EnrollmentCreatedEvent),
}

impl DomainEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            DomainEvent::AccountUpdated(_) => ACCOUNT_TOPIC,
            DomainEvent::CouponRejected(_) => PROMOTION_TOPIC,
            DomainEvent::EnrollmentCreated(_) => ENROLLMENT_TOPIC,
        }
    }

    /// Partition key: events for one account stay ordered.
    pub fn key(&self) -> String {
        match self {
            DomainEvent::AccountUpdated(e) => e.user_id.to_string(),
            DomainEvent::CouponRejected(e) => e.user_id.to_string(),
            DomainEvent::EnrollmentCreated(e) => e.user_id.to_string(),
        }
    }

    pub fn account_updated(user_id: Uuid) -> Self {
        DomainEvent::AccountUpdated(AccountUpdatedEvent {
            user_id,
            timestamp: chrono::Utc::now().timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let user_id = Uuid::new_v4();
        let event = DomainEvent::account_updated(user_id);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "ACCOUNT_UPDATED");
        assert_eq!(value["payload"]["user_id"], user_id.to_string());
        assert_eq!(event.topic(), ACCOUNT_TOPIC);
        assert_eq!(event.key(), user_id.to_string());
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use academy_catalog::{ClassWithCourse, PriceBreakdown};
use academy_core::models::Enrollment;
use academy_offer::Promotion;

/// What the checkout page submits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub class_id: Uuid,
    pub student_id: Uuid,
    #[serde(default)]
    pub addon_class_ids: Vec<Uuid>,
    #[serde(default)]
    pub whole_series: bool,
    pub promotion_id: Option<Uuid>,
}

/// Priced cart, shown before the user confirms.
#[derive(Debug, Clone, Serialize)]
pub struct Quote {
    pub klass: ClassWithCourse,
    pub addons: Vec<ClassWithCourse>,
    pub is_bundle: bool,
    pub whole_series: bool,
    /// Promotion actually applied, after eligibility checks
    pub promotion: Option<Promotion>,
    pub breakdown: PriceBreakdown,
}

impl Quote {
    pub fn class_ids(&self) -> Vec<Uuid> {
        std::iter::once(&self.klass)
            .chain(self.addons.iter())
            .map(|c| c.class.id)
            .collect()
    }

    /// Checkout steps; free classes skip payment.
    pub fn steps(&self) -> Vec<&'static str> {
        if self.klass.course.price_in_cents > 0 {
            vec!["Confirm student", "Make Payment", "Complete"]
        } else {
            vec!["Confirm student", "Complete"]
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentReceipt {
    pub enrollments: Vec<Enrollment>,
    pub breakdown: PriceBreakdown,
    pub promotion_id: Option<Uuid>,
}

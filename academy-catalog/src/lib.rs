pub mod course;
pub mod pricing;
pub mod cache;

pub use course::{Class, ClassWithCourse, Course, Session, Subject};
pub use pricing::{Deduction, Discount, PriceBreakdown, PricingConfig, PricingEngine, PricingError, PromoContext};
pub use cache::{CatalogCache, CatalogSource};

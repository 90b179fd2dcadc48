pub mod app_config;
pub mod database;
pub mod redis_repo;
pub mod events;
pub mod catalog_repo;
pub mod account_repo;
pub mod enrollment_repo;
pub mod promotion_repo;
pub mod memory;

pub use app_config::Config;
pub use database::DbClient;
pub use redis_repo::RedisClient;
pub use events::RedisEventPublisher;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
pub use catalog_repo::PgCatalogRepository;
pub use account_repo::PgAccountRepository;
pub use enrollment_repo::PgEnrollmentRepository;
pub use promotion_repo::PgPromotionRepository;
pub use memory::MemoryStore;

use std::sync::Arc;
use academy_catalog::{CatalogCache, PricingConfig, PricingEngine};
use academy_core::accounts::StudentService;
use academy_core::events::EventPublisher;
use academy_core::repository::{
    ClassRepository, ContentRepository, EnrollmentRepository, StudentRepository, UserRepository,
};
use academy_offer::{EligibilityRules, EligibilityWindows, EnrollmentHistory, LevelUpCoupons, PromotionService, PromotionStore};
use academy_order::CheckoutService;
use academy_store::app_config::{Config, RateLimitConfig};
use academy_store::{
    MemoryStore, PgAccountRepository, PgCatalogRepository, PgEnrollmentRepository, PgPromotionRepository, RedisClient,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

/// Tunables taken from the loaded `Config`.
#[derive(Clone)]
pub struct Settings {
    pub auth: AuthConfig,
    pub pricing: PricingConfig,
    pub eligibility: EligibilityWindows,
    pub levelups: LevelUpCoupons,
    pub rate_limit: RateLimitConfig,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            auth: AuthConfig {
                secret: config.auth.jwt_secret.clone(),
            },
            pricing: config.pricing.clone(),
            eligibility: config.eligibility,
            levelups: config.levelups.clone(),
            rate_limit: config.rate_limit.clone(),
        }
    }
}

/// Storage backends behind the repository traits.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub students: Arc<dyn StudentRepository>,
    pub classes: Arc<dyn ClassRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
    pub content: Arc<dyn ContentRepository>,
    pub promotions: Arc<dyn PromotionStore>,
    pub history: Arc<dyn EnrollmentHistory>,
    pub events: Arc<dyn EventPublisher>,
}

impl Repositories {
    pub fn postgres(pool: PgPool, events: Arc<dyn EventPublisher>) -> Self {
        let accounts = Arc::new(PgAccountRepository::new(pool.clone()));
        let enrollments = Arc::new(PgEnrollmentRepository::new(pool.clone()));

        Self {
            users: accounts.clone(),
            students: accounts.clone(),
            classes: Arc::new(PgCatalogRepository::new(pool.clone())),
            enrollments: enrollments.clone(),
            content: accounts,
            promotions: Arc::new(PgPromotionRepository::new(pool)),
            history: enrollments,
            events,
        }
    }

    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            students: store.clone(),
            classes: store.clone(),
            enrollments: store.clone(),
            content: store.clone(),
            promotions: store.clone(),
            history: store.clone(),
            events: store,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub catalog: Arc<CatalogCache>,
    pub pricing: Arc<PricingEngine>,
    pub promotions: PromotionService,
    pub accounts: StudentService,
    pub checkout: CheckoutService,
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        catalog: CatalogCache,
        settings: Settings,
        redis: Option<Arc<RedisClient>>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let pricing = Arc::new(PricingEngine::new(settings.pricing));

        let promotions = PromotionService::new(
            repos.promotions.clone(),
            repos.history.clone(),
            EligibilityRules::new(settings.eligibility),
            settings.levelups,
        );

        let accounts = StudentService::new(repos.students.clone(), repos.events.clone());

        let checkout = CheckoutService::new(
            catalog.clone(),
            pricing.clone(),
            promotions.clone(),
            repos.users.clone(),
            repos.students.clone(),
            repos.classes.clone(),
            repos.enrollments.clone(),
            repos.events.clone(),
        );

        Self {
            repos,
            catalog,
            pricing,
            promotions,
            accounts,
            checkout,
            redis,
            auth: settings.auth,
            rate_limit: settings.rate_limit,
        }
    }
}

use std::sync::Arc;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use academy_api::middleware::Claims;
use academy_api::state::{AppState, AuthConfig, Repositories, Settings};
use academy_api::app;
use academy_catalog::{CatalogCache, Class, Course, Discount, PricingConfig, Session, Subject};
use academy_core::models::{Enrollment, Student, StudentDetails, User};
use academy_offer::{EligibilityWindows, LevelUpCoupons, Promotion};
use academy_shared::models::events::DomainEvent;
use academy_shared::Masked;
use academy_store::app_config::RateLimitConfig;
use academy_store::MemoryStore;

const SECRET: &str = "integration-secret";

struct TestApp {
    store: Arc<MemoryStore>,
    state: AppState,
    parent_id: Uuid,
    student_id: Uuid,
    level1_class: Uuid,
    first_timer_promo: Uuid,
}

fn course(id: &str, level: i32, price: i64) -> Course {
    Course {
        id: id.to_string(),
        subject_id: "ai".to_string(),
        name: format!("AI {}", id),
        level,
        capacity: 4,
        price_in_cents: price,
        series_price_in_cents: Some(9500).filter(|_| level > 0),
    }
}

fn class(course_id: &str, start: chrono::DateTime<Utc>, weeks: i64) -> Class {
    let id = Uuid::new_v4();
    Class {
        id,
        course_id: course_id.to_string(),
        start_date: start,
        end_date: start + Duration::weeks(weeks - 1) + Duration::hours(1),
        active: true,
        sessions: (0..weeks as i32)
            .map(|idx| Session {
                id: Uuid::new_v4(),
                class_id: id,
                idx,
                start_date: start + Duration::weeks(idx as i64),
                end_date: start + Duration::weeks(idx as i64) + Duration::hours(1),
            })
            .collect(),
    }
}

fn promo(code: &str, discount: Discount, first_timer_only: bool, is_level_up: bool) -> Promotion {
    Promotion {
        id: Uuid::new_v4(),
        code: code.to_string(),
        description: None,
        discount,
        first_timer_only,
        is_level_up,
        valid_from: None,
        expires_at: None,
        redemption_limit: None,
        redemption_count: 0,
    }
}

fn setup(paid: bool) -> TestApp {
    let store = Arc::new(MemoryStore::new());

    let subjects = vec![Subject {
        id: "ai".to_string(),
        name: "AI".to_string(),
        exit_level: 2,
        courses: vec![
            course("ai_0", 0, 0),
            course("ai_1", 1, 12900),
            course("ai_2", 2, 12900),
            course("ai_camp", -1, 30000),
        ],
    }];
    store.insert_subjects(subjects.clone());

    let parent_id = Uuid::new_v4();
    store.insert_user(User {
        id: parent_id,
        email: Masked("parent@example.com".to_string()),
        first_name: "Pat".to_string(),
        paid,
        balance_in_cents: 2000,
        referral_code: Some("PAT2024".to_string()),
        is_admin: false,
        created_at: Utc::now(),
    });

    let student_id = Uuid::new_v4();
    store.insert_student(Student {
        id: student_id,
        parent_id,
        name: "Ada".to_string(),
        year: Some(2014),
        gender: None,
        details: StudentDetails::default(),
        created_at: Utc::now(),
    });

    let level1 = class("ai_1", Utc::now() + Duration::days(5), 4);
    let level1_class = level1.id;
    store.insert_class(level1);
    store.insert_class(class("ai_2", Utc::now() + Duration::days(40), 4));

    let first_timer = promo("SAVE20", Discount::Percentage(20), true, false);
    let first_timer_promo = first_timer.id;
    store.insert_promotion(first_timer);
    store.insert_promotion(promo("TRIAL2AI", Discount::Amount(3000), false, true));

    let settings = Settings {
        auth: AuthConfig {
            secret: SECRET.to_string(),
        },
        pricing: PricingConfig::default(),
        eligibility: EligibilityWindows::default(),
        levelups: LevelUpCoupons {
            trial: [("ai".to_string(), "TRIAL2AI".to_string())].into_iter().collect(),
            regular: Default::default(),
        },
        rate_limit: RateLimitConfig::default(),
    };

    let state = AppState::new(
        Repositories::in_memory(store.clone()),
        CatalogCache::new(subjects, vec!["ai".to_string()]),
        settings,
        None,
    );

    TestApp {
        store,
        state,
        parent_id,
        student_id,
        level1_class,
        first_timer_promo,
    }
}

fn token_for(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        email: "parent@example.com".to_string(),
        is_admin: false,
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn graphql(t: &TestApp, token: Option<&str>, query: &str, variables: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/graphql")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    let body = json!({ "query": query, "variables": variables });
    let response = app(t.state.clone())
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let t = setup(false);
    let response = app(t.state.clone())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_anonymous_and_invalid_token() {
    let t = setup(false);

    let (status, body) = graphql(&t, None, "{ user { id } }", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["user"].is_null());

    let (status, _) = graphql(&t, Some("not.a.jwt"), "{ user { id } }", json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_with_students() {
    let t = setup(false);
    let token = token_for(t.parent_id);

    let (_, body) = graphql(
        &t,
        Some(&token),
        "{ user { email balanceInCents students { name } } }",
        json!({}),
    )
    .await;

    assert_eq!(body["data"]["user"]["email"], "parent@example.com");
    assert_eq!(body["data"]["user"]["balanceInCents"], 2000);
    assert_eq!(body["data"]["user"]["students"][0]["name"], "Ada");
}

#[tokio::test]
async fn test_catalog_queries_hide_unlisted_levels() {
    let t = setup(false);

    let (_, body) = graphql(
        &t,
        None,
        r#"{ subjects { id courses { id level } } courses(subjectIds: ["ai"], level: 1) { id } }"#,
        json!({}),
    )
    .await;

    let courses = body["data"]["subjects"][0]["courses"].as_array().unwrap();
    assert_eq!(courses.len(), 3);
    assert!(courses.iter().all(|c| c["level"].as_i64().unwrap() >= 0));
    assert_eq!(body["data"]["courses"][0]["id"], "ai_1");
}

#[tokio::test]
async fn test_upcoming_classes_for_subject() {
    let t = setup(false);

    let (_, body) = graphql(
        &t,
        None,
        r#"{ classes(subjectId: "ai") { id courseId seatsLeft sessions { idx } } }"#,
        json!({}),
    )
    .await;

    let classes = body["data"]["classes"].as_array().unwrap();
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0]["courseId"], "ai_1");
    assert_eq!(classes[0]["seatsLeft"], 4);
    assert_eq!(classes[0]["sessions"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_promotion_requires_login() {
    let t = setup(false);
    let (_, body) = graphql(&t, None, r#"{ promotion(code: "SAVE20") { id } }"#, json!({})).await;
    assert!(body["data"]["promotion"].is_null());
    assert!(body["errors"].is_null());
}

#[tokio::test]
async fn test_promotion_code_errors_are_field_errors() {
    let t = setup(true);
    let token = token_for(t.parent_id);

    let (_, body) = graphql(&t, Some(&token), r#"{ promotion(code: " NOPE ") { id } }"#, json!({})).await;
    let ext = &body["errors"][0]["extensions"];
    assert_eq!(ext["status"], 400);
    assert_eq!(ext["fields"]["code"], "This coupon code is invalid");

    // Account already paid, so a first-timer coupon is refused and reported
    let (_, body) = graphql(
        &t,
        Some(&token),
        r#"{ promotion(code: "SAVE20", courseId: "ai_1") { id } }"#,
        json!({}),
    )
    .await;
    assert_eq!(
        body["errors"][0]["extensions"]["fields"]["code"],
        "This coupon cannot be used for this class"
    );

    let rejected: Vec<DomainEvent> = t
        .store
        .published_events()
        .into_iter()
        .filter(|e| matches!(e, DomainEvent::CouponRejected(_)))
        .collect();
    assert_eq!(rejected.len(), 1);
}

#[tokio::test]
async fn test_level_up_offer_after_recent_trial() {
    let t = setup(false);
    let token = token_for(t.parent_id);

    let query = r#"{ course(id: "ai_1") { offer { code amountInCents } } }"#;
    let (_, body) = graphql(&t, Some(&token), query, json!({})).await;
    assert!(body["data"]["course"]["offer"].is_null());

    let trial = class("ai_0", Utc::now() - Duration::days(1), 1);
    t.store.insert_enrollment(Enrollment {
        id: Uuid::new_v4(),
        student_id: t.student_id,
        class_id: trial.id,
        status_code: 1,
        created_at: Utc::now() - Duration::days(3),
    });
    t.store.insert_class(trial);

    let (_, body) = graphql(&t, Some(&token), query, json!({})).await;
    assert_eq!(body["data"]["course"]["offer"]["code"], "TRIAL2AI");
    assert_eq!(body["data"]["course"]["offer"]["amountInCents"], 3000);
}

#[tokio::test]
async fn test_add_student_duplicate_name() {
    let t = setup(false);
    let token = token_for(t.parent_id);
    let mutation = r#"mutation($input: StudentInput!) { addStudent(input: $input) { id name } }"#;

    let (_, body) = graphql(&t, Some(&token), mutation, json!({ "input": { "childName": " Grace " } })).await;
    assert_eq!(body["data"]["addStudent"]["name"], "Grace");

    let (_, body) = graphql(&t, Some(&token), mutation, json!({ "input": { "childName": "Ada" } })).await;
    assert_eq!(body["errors"][0]["message"], "Duplicate name");
    assert_eq!(body["errors"][0]["extensions"]["fields"]["child_name"], "Ada is already on file");

    let (_, body) = graphql(&t, None, mutation, json!({ "input": { "childName": "Linus" } })).await;
    assert_eq!(body["errors"][0]["extensions"]["status"], 401);
}

#[tokio::test]
async fn test_quote_then_enroll() {
    let t = setup(false);
    let token = token_for(t.parent_id);
    let input = json!({
        "classId": t.level1_class.to_string(),
        "studentId": t.student_id.to_string(),
        "promotionId": t.first_timer_promo.to_string(),
    });

    let (_, body) = graphql(
        &t,
        Some(&token),
        r#"query($input: EnrollInput!) { quote(input: $input) { listPrice appliedDiscount usedCredit price steps } }"#,
        json!({ "input": input }),
    )
    .await;
    let quote = &body["data"]["quote"];
    assert_eq!(quote["listPrice"], 12900);
    assert_eq!(quote["appliedDiscount"], 2580);
    assert_eq!(quote["usedCredit"], 2000);
    assert_eq!(quote["price"], 8320);
    assert_eq!(quote["steps"].as_array().unwrap().len(), 3);

    let (_, body) = graphql(
        &t,
        Some(&token),
        r#"mutation($input: EnrollInput!) { enrollClass(input: $input) { classIds price } }"#,
        json!({ "input": input }),
    )
    .await;
    assert_eq!(body["data"]["enrollClass"]["price"], 8320);

    let user = t.store.user(t.parent_id).unwrap();
    assert!(user.paid);
    assert_eq!(user.balance_in_cents, 0);
    assert!(t
        .store
        .published_events()
        .iter()
        .any(|e| matches!(e, DomainEvent::EnrollmentCreated(_))));

    let (_, body) = graphql(
        &t,
        Some(&token),
        r#"query($id: ID!) { student(id: $id) { registrations { seats { idx added } } } }"#,
        json!({ "id": t.student_id.to_string() }),
    )
    .await;
    let seats = body["data"]["student"]["registrations"][0]["seats"].as_array().unwrap();
    assert_eq!(seats.len(), 4);
    assert!(seats.iter().all(|s| s["added"] == false));

    // Second attempt is a conflict
    let (_, body) = graphql(
        &t,
        Some(&token),
        r#"mutation($input: EnrollInput!) { enrollClass(input: $input) { price } }"#,
        json!({ "input": input }),
    )
    .await;
    assert_eq!(body["errors"][0]["extensions"]["status"], 409);
}

#[tokio::test]
async fn test_student_of_another_parent_is_hidden() {
    let t = setup(false);
    let stranger = token_for(Uuid::new_v4());

    let (_, body) = graphql(
        &t,
        Some(&stranger),
        r#"query($id: ID!) { student(id: $id) { name } maker(id: $id) { name registrations { id } } }"#,
        json!({ "id": t.student_id.to_string() }),
    )
    .await;

    assert!(body["data"]["student"].is_null());
    assert_eq!(body["data"]["maker"]["name"], "Ada");
    assert!(body["data"]["maker"]["registrations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_addon_candidates_are_running_classes() {
    let t = setup(false);

    let enroll = |class_id: Uuid| Enrollment {
        id: Uuid::new_v4(),
        student_id: Uuid::new_v4(),
        class_id,
        status_code: 1,
        created_at: Utc::now(),
    };

    // Started ten days ago; session 2 is four days out
    let running = class("ai_1", Utc::now() - Duration::days(10), 4);
    let running_id = running.id;
    t.store.insert_enrollment(enroll(running_id));
    t.store.insert_class(running);
    t.store.insert_enrollment(enroll(t.level1_class));

    let mut cancelled = class("ai_1", Utc::now() - Duration::days(9), 4);
    cancelled.active = false;
    t.store.insert_enrollment(enroll(cancelled.id));
    t.store.insert_class(cancelled);

    // No students yet
    t.store.insert_class(class("ai_1", Utc::now() + Duration::days(2), 4));

    let (_, body) = graphql(
        &t,
        None,
        r#"{ addonCandidates(courseId: "ai_1", idx: 2) { idx startDate class { id } } }"#,
        json!({}),
    )
    .await;

    let candidates = body["data"]["addonCandidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0]["class"]["id"], running_id.to_string());
    assert_eq!(candidates[1]["class"]["id"], t.level1_class.to_string());
    assert!(candidates.iter().all(|c| c["idx"] == 2));

    // Session 1 of the running class is already over
    let (_, body) = graphql(
        &t,
        None,
        r#"{ addonCandidates(courseId: "ai_1", idx: 1) { class { id } } }"#,
        json!({}),
    )
    .await;
    let candidates = body["data"]["addonCandidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0]["class"]["id"], t.level1_class.to_string());
}

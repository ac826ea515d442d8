use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, NaiveTime, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use omniport_api::middleware::{Claims, Role};
use omniport_api::state::{AppState, AuthConfig};
use omniport_api::app;
use omniport_core::clock::FixedClock;
use omniport_core::models::{BusProfile, BusStatus, ScheduleTemplate};
use omniport_core::retry::RetryPolicy;
use omniport_core::{EngineConfig, MemoryStore, Portal};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test-secret";

struct TestApp {
    state: AppState,
    template_id: Uuid,
}

impl TestApp {
    async fn new(total_seats: i32) -> Self {
        Self::with_driver(total_seats, None).await
    }

    async fn with_driver(total_seats: i32, driver_id: Option<Uuid>) -> Self {
        let store = MemoryStore::new();
        let bus = BusProfile {
            id: Uuid::new_v4(),
            name: "Express 1".to_string(),
            total_seats,
            from_city: "Colombo".to_string(),
            to_city: "Kandy".to_string(),
            status: BusStatus::Active,
        };
        store.upsert_bus(bus.clone()).await;
        let departure = NaiveTime::from_hms_opt(8, 0, 0).unwrap();
        let template = ScheduleTemplate {
            id: Uuid::new_v4(),
            bus_id: bus.id,
            driver_id,
            day_of_week: 1,
            departure_time: departure,
            arrival_time: departure + Duration::hours(3),
            price_per_seat: 1500,
            active: true,
        };
        store.upsert_template(template.clone()).await.unwrap();

        // Monday 2026-10-19, 07:00 UTC.
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap()));
        let config = EngineConfig {
            retry: RetryPolicy::immediate(2),
            ..EngineConfig::default()
        };
        let portal = Arc::new(Portal::new(Arc::new(store), clock, config));
        let state = AppState::new(portal, AuthConfig { secret: SECRET.to_string() }).unwrap();

        Self {
            state,
            template_id: template.id,
        }
    }

    fn router(&self) -> Router {
        app(self.state.clone())
    }

    async fn call(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn book(&self, token: &str) -> (StatusCode, Value) {
        self.call(
            "POST",
            "/v1/bookings",
            Some(token),
            Some(json!({
                "template_id": self.template_id,
                "service_date": "2026-10-19",
                "passenger": {
                    "name": "Nimal Perera",
                    "email": "nimal@example.com",
                    "phone": "+94 77 123 4567"
                }
            })),
        )
        .await
    }
}

fn token(sub: &str, role: Role) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role,
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

#[tokio::test]
async fn test_health_and_metrics_are_public() {
    let app = TestApp::new(10).await;

    let response = app
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .router()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_booking_requires_passenger_token() {
    let app = TestApp::new(10).await;

    let (status, _) = app.call("GET", "/v1/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call("GET", "/v1/bookings", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.book(&token("driver-1", Role::Driver)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_search_book_verify_and_track() {
    let app = TestApp::new(10).await;
    let rider = token("rider-1", Role::Passenger);
    let driver = token("driver-1", Role::Driver);

    let (status, results) = app
        .call("GET", "/v1/trips/search?from=colombo&to=KANDY&date=2026-10-19", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results.as_array().map(Vec::len), Some(1));
    assert_eq!(results[0]["seats_available"], 10);

    let (status, booking) = app.book(&rider).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["seats_available"], 9);
    assert_eq!(booking["total_amount"], 1500);
    let pin = booking["tracking_pin"].as_str().unwrap().to_string();
    let trip_id = booking["trip_id"].as_str().unwrap().to_string();

    let (status, mine) = app.call("GET", "/v1/bookings", Some(&rider), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().map(Vec::len), Some(1));

    let (status, tracked) = app.call("GET", &format!("/v1/tickets/track/{}", pin), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tracked["booking_reference"], booking["reference"]);

    let verify = json!({ "pin": pin, "latitude": 6.93, "longitude": 79.85 });
    let (status, verified) = app
        .call("POST", "/v1/boarding/verify", Some(&driver), Some(verify.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["passenger"]["name"], "Nimal Perera");
    assert_eq!(verified["passenger"]["has_geo"], true);

    let (status, again) = app.call("POST", "/v1/boarding/verify", Some(&driver), Some(verify)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["error"], "PIN already used at 07:00");

    let (status, manifest) = app
        .call("GET", &format!("/v1/trips/{}/manifest", trip_id), Some(&driver), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(manifest["verified_count"], 1);

    let (status, _) = app
        .call("GET", &format!("/v1/trips/{}/manifest", trip_id), Some(&rider), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, trip_status) = app.call("GET", &format!("/v1/trips/{}/status", trip_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trip_status["state"], "BOARDING");
}

#[tokio::test]
async fn test_sold_out_is_conflict() {
    let app = TestApp::new(1).await;

    let (status, _) = app.book(&token("rider-1", Role::Passenger)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.book(&token("rider-2", Role::Passenger)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Seats unavailable");

    let metrics = app.state.metrics.render().unwrap();
    assert!(metrics.contains("omniport_bookings_total{outcome=\"sold_out\"} 1"));
}

#[tokio::test]
async fn test_cancel_is_owner_scoped() {
    let app = TestApp::new(5).await;
    let rider = token("rider-1", Role::Passenger);
    let stranger = token("rider-2", Role::Passenger);

    let (_, booking) = app.book(&rider).await;
    let booking_id = booking["booking_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call("POST", &format!("/v1/bookings/{}/cancel", booking_id), Some(&stranger), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, cancelled) = app
        .call("POST", &format!("/v1/bookings/{}/cancel", booking_id), Some(&rider), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");
    assert_eq!(cancelled["seats_available"], 5);

    let (status, repeat) = app
        .call("POST", &format!("/v1/bookings/{}/cancel", booking_id), Some(&rider), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(repeat["already_cancelled"], true);
}

#[tokio::test]
async fn test_trip_events_reach_stream_subscribers() {
    let app = TestApp::new(5).await;
    let (_, booking) = app.book(&token("rider-1", Role::Passenger)).await;
    let trip_id = booking["trip_id"].as_str().unwrap().to_string();
    let mut rx = app.state.sse_tx.subscribe();

    let (status, body) = app
        .call(
            "POST",
            &format!("/v1/trips/{}/events", trip_id),
            Some(&token("driver-1", Role::Driver)),
            Some(json!({ "event_type": "DEPARTURE" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trip_status"], "IN_PROGRESS");
    assert_eq!(body["event"]["message"], "Trip started");

    let notice = rx.try_recv().unwrap();
    assert_eq!(notice.trip_id.to_string(), trip_id);
    assert_eq!(notice.event_type, "DEPARTURE");
    assert_eq!(notice.trip_status, "IN_PROGRESS");
}

#[tokio::test]
async fn test_operator_cancellation_blocks_bookings() {
    let app = TestApp::new(5).await;
    let rider = token("rider-1", Role::Passenger);
    let (_, booking) = app.book(&rider).await;
    let trip_id = booking["trip_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .call("POST", &format!("/v1/trips/{}/cancel", trip_id), Some(&token("driver-1", Role::Driver)), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, trip) = app
        .call("POST", &format!("/v1/trips/{}/cancel", trip_id), Some(&token("ops-1", Role::Operator)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trip["status"], "CANCELLED");

    let (status, _) = app.book(&token("rider-2", Role::Passenger)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_trip_actions_are_limited_to_its_driver() {
    let driver = Uuid::new_v4();
    let app = TestApp::with_driver(5, Some(driver)).await;
    let rider = token("rider-1", Role::Passenger);
    let (_, booking) = app.book(&rider).await;
    let trip_id = booking["trip_id"].as_str().unwrap().to_string();
    let booking_id = booking["booking_id"].as_str().unwrap().to_string();
    let events = format!("/v1/trips/{}/events", trip_id);
    let departure = json!({ "event_type": "DEPARTURE" });

    let (status, _) = app
        .call("POST", &events, Some(&token("driver-1", Role::Driver)), Some(departure.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call("POST", &events, Some(&token(&driver.to_string(), Role::Driver)), Some(departure))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trip_status"], "IN_PROGRESS");

    // Departed trips keep their passengers.
    let (status, _) = app
        .call("POST", &format!("/v1/bookings/{}/cancel", booking_id), Some(&rider), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

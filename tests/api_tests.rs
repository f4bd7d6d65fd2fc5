//! End-to-end tests of the HTTP surface over the in-memory store

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        response::Response,
        Router,
    };
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use progression_server::{
        app_router,
        middleware::RateLimiter,
        models::{ApplicationStatus, ApplicationUpsert},
        notify::{SmsError, SmsMessage, SmsSender},
        payments::signature::sign_transaction,
        store::{ApplicationStore, MagicLinkStore, MemoryStore, NoteStore, Stores},
        AppState, Config,
    };

    const ADMIN_KEY: &str = "test-admin-key";
    const CRON_SECRET: &str = "test-cron-secret";
    const VOPAY_SECRET: &str = "test-vopay-secret";

    #[derive(Default)]
    struct RecordingSms {
        sent: Mutex<Vec<SmsMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl SmsSender for RecordingSms {
        async fn send_sms(&self, message: SmsMessage) -> Result<(), SmsError> {
            if self.fail {
                return Err(SmsError::NotConfigured);
            }
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    struct TestApp {
        router: Router,
        store: Arc<MemoryStore>,
        sms: Arc<RecordingSms>,
    }

    fn test_config() -> Config {
        Config {
            admin_api_key: Some(ADMIN_KEY.to_string()),
            cron_secret: Some(CRON_SECRET.to_string()),
            vopay_shared_secret: Some(VOPAY_SECRET.to_string()),
            ..Config::default()
        }
    }

    fn build(config: Config, sms: RecordingSms) -> TestApp {
        let store = Arc::new(MemoryStore::new());
        let sms = Arc::new(sms);
        let rate_limiter = RateLimiter::in_memory(
            config.status_rate_limit_max,
            std::time::Duration::from_secs(config.status_rate_limit_window_seconds),
        );
        let state = AppState::new(
            Stores::memory(store.clone()),
            sms.clone(),
            &config,
            rate_limiter,
        );

        TestApp {
            router: app_router(state, &config),
            store,
            sms,
        }
    }

    fn setup() -> TestApp {
        build(test_config(), RecordingSms::default())
    }

    async fn seed_application(store: &MemoryStore, id: &str, status: ApplicationStatus) {
        store
            .upsert_application(ApplicationUpsert {
                id: id.to_string(),
                status,
                origin: "Margill".to_string(),
                name: Some("Julie Bouchard".to_string()),
                email: Some("julie@example.ca".to_string()),
                phone: Some("+15145550123".to_string()),
                amount_cents: Some(80_000),
                first_payment_date: None,
            })
            .await
            .unwrap();
    }

    async fn send(router: &Router, request: Request<Body>) -> Response {
        router.clone().oneshot(request).await.unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn admin_post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-api-key", ADMIN_KEY)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn admin_get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-api-key", ADMIN_KEY)
            .body(Body::empty())
            .unwrap()
    }

    fn status_request(token: &str, ip: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/api/status?t={}", token))
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    /// Issue a link and return the raw token from its URL
    async fn issue(app: &TestApp, application_id: &str, max_uses: Option<i32>) -> (Value, String) {
        let mut body = json!({ "application_id": application_id, "phone": "+15145550123" });
        if let Some(max_uses) = max_uses {
            body["max_uses"] = json!(max_uses);
        }
        let response = send(&app.router, admin_post("/api/admin/magic-link", body)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let url = json["data"]["url"].as_str().unwrap().to_string();
        let token = url.split("t=").nth(1).unwrap().to_string();
        (json, token)
    }

    #[tokio::test]
    async fn test_issue_then_read_status() {
        let app = setup();
        seed_application(&app.store, "MARGILL-100", ApplicationStatus::AwaitingSignature).await;
        app.store
            .insert_note("MARGILL-100", "Contrat envoyé par courriel", true)
            .await
            .unwrap();
        app.store
            .insert_note("MARGILL-100", "Note interne", false)
            .await
            .unwrap();

        let (issued, token) = issue(&app, "MARGILL-100", None).await;
        assert_eq!(issued["success"], true);
        assert_eq!(issued["data"]["max_uses"], 20);
        assert_eq!(issued["data"]["sms_sent"], true);

        let sent = app.sms.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "+15145550123");
        assert!(sent[0].body.contains(&token));

        let response = send(&app.router, status_request(&token, "198.51.100.1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(response.headers()["x-ratelimit-limit"], "20");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "19");

        let json = body_json(response).await;
        let data = &json["data"];
        assert_eq!(data["application"]["id"], "MARGILL-100");
        assert_eq!(data["application"]["status"], "AWAITING_SIGNATURE");
        assert_eq!(data["progress"]["currentStepIndex"], 5);
        assert_eq!(data["progress"]["totalSteps"], 8);
        assert_eq!(data["notes"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_token_hash_is_stored_not_token() {
        let app = setup();
        seed_application(&app.store, "MARGILL-101", ApplicationStatus::Received).await;
        let (_, token) = issue(&app, "MARGILL-101", None).await;

        let links = app.store.list_links(Some("MARGILL-101")).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_ne!(links[0].token_hash, token);
        assert_eq!(links[0].token_hash.len(), 64);

        let listed = body_json(
            send(&app.router, admin_get("/api/admin/magic-links?application_id=MARGILL-101")).await,
        )
        .await;
        assert!(listed["data"][0].get("token_hash").is_none());
    }

    #[tokio::test]
    async fn test_link_stops_working_after_max_uses() {
        let app = setup();
        seed_application(&app.store, "MARGILL-102", ApplicationStatus::Received).await;
        let (_, token) = issue(&app, "MARGILL-102", Some(2)).await;

        for _ in 0..2 {
            let response = send(&app.router, status_request(&token, "198.51.100.2")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = send(&app.router, status_request(&token, "198.51.100.2")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["message"], "Lien invalide ou expiré");
    }

    #[tokio::test]
    async fn test_revoked_link_is_rejected() {
        let app = setup();
        seed_application(&app.store, "MARGILL-103", ApplicationStatus::Received).await;
        let (issued, token) = issue(&app, "MARGILL-103", None).await;
        let link_id = issued["data"]["magic_link_id"].as_str().unwrap().to_string();

        let uri = format!("/api/admin/magic-links/{}/revoke", link_id);
        let first = body_json(send(&app.router, admin_post(&uri, json!({}))).await).await;
        let second = body_json(send(&app.router, admin_post(&uri, json!({}))).await).await;
        assert!(first["data"]["revoked_at"].is_string());
        assert_eq!(first["data"]["revoked_at"], second["data"]["revoked_at"]);

        let response = send(&app.router, status_request(&token, "198.51.100.3")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let unknown = format!("/api/admin/magic-links/{}/revoke", uuid::Uuid::new_v4());
        let response = send(&app.router, admin_post(&unknown, json!({}))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_and_missing_tokens() {
        let app = setup();

        let response = send(&app.router, status_request("not-a-real-token", "198.51.100.4")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(
            &app.router,
            Request::builder().uri("/api/status").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_rate_limited_per_ip() {
        let app = setup();

        for _ in 0..20 {
            let response = send(&app.router, status_request("bogus", "203.0.113.50")).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let response = send(&app.router, status_request("bogus", "203.0.113.50")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

        let other = send(&app.router, status_request("bogus", "203.0.113.51")).await;
        assert_eq!(other.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_issue_validation() {
        let app = setup();

        let response = send(
            &app.router,
            admin_post("/api/admin/magic-link", json!({ "application_id": "MARGILL-1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &app.router,
            admin_post(
                "/api/admin/magic-link",
                json!({ "application_id": "MARGILL-404", "phone": "+15145550000" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(app.sms.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_issue_rejects_oversized_ttl() {
        let app = setup();
        seed_application(&app.store, "MARGILL-106", ApplicationStatus::Received).await;

        let response = send(
            &app.router,
            admin_post(
                "/api/admin/magic-link",
                json!({
                    "application_id": "MARGILL-106",
                    "phone": "+15145550106",
                    "ttl_hours": 10_000_000_000i64
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.store.list_links(None).await.unwrap().is_empty());
        assert!(app.sms.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sms_failure_still_returns_link() {
        let app = build(
            test_config(),
            RecordingSms {
                fail: true,
                ..RecordingSms::default()
            },
        );
        seed_application(&app.store, "MARGILL-104", ApplicationStatus::Received).await;

        let (issued, token) = issue(&app, "MARGILL-104", None).await;
        assert_eq!(issued["data"]["sms_sent"], false);

        let response = send(&app.router, status_request(&token, "198.51.100.5")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_routes_require_key() {
        let app = setup();

        let missing = Request::builder()
            .uri("/api/admin/stats")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app.router, missing).await.status(), StatusCode::UNAUTHORIZED);

        let wrong = Request::builder()
            .uri("/api/admin/stats")
            .header("x-api-key", "nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app.router, wrong).await.status(), StatusCode::UNAUTHORIZED);

        let unconfigured = build(Config::default(), RecordingSms::default());
        let response = send(&unconfigured.router, admin_get("/api/admin/stats")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cron_cleanup() {
        let app = setup();
        seed_application(&app.store, "MARGILL-105", ApplicationStatus::Received).await;
        issue(&app, "MARGILL-105", None).await;
        issue(&app, "MARGILL-105", None).await;

        let mut links = app.store.list_links(Some("MARGILL-105")).await.unwrap();
        let mut expired = links.remove(0);
        expired.expires_at = Utc::now() - Duration::hours(1);
        app.store.put_link(expired).await;

        let unauthorized = Request::builder()
            .uri("/api/cron/cleanup")
            .header(header::AUTHORIZATION, "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            send(&app.router, unauthorized).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let authorized = || {
            Request::builder()
                .uri("/api/cron/cleanup")
                .header(header::AUTHORIZATION, format!("Bearer {}", CRON_SECRET))
                .body(Body::empty())
                .unwrap()
        };

        let json = body_json(send(&app.router, authorized()).await).await;
        assert_eq!(json["data"]["expired_deleted"], 1);
        assert_eq!(json["data"]["revoked_deleted"], 0);

        let json = body_json(send(&app.router, authorized()).await).await;
        assert_eq!(json["data"]["expired_deleted"], 0);
        assert_eq!(app.store.list_links(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_margill_webhook_then_stats() {
        let app = setup();

        let response = send(
            &app.router,
            admin_post(
                "/api/webhook/margill",
                json!({
                    "dossier_id": "9001",
                    "statut_margill": "analyse_en_cours",
                    "nom_client": "Éric Lavoie",
                    "montant": 2500,
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["application_id"], "MARGILL-9001");
        assert_eq!(json["data"]["mapped_status"], "ANALYSIS_IN_PROGRESS");

        let response = send(
            &app.router,
            admin_post(
                "/api/webhook/margill",
                json!({ "dossier_id": "9001", "statut_margill": "inconnu" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let note = send(
            &app.router,
            admin_post(
                "/api/admin/applications/MARGILL-9001/notes",
                json!({ "message": "Analyse en cours, merci de votre patience" }),
            ),
        )
        .await;
        assert_eq!(note.status(), StatusCode::OK);

        let stats = body_json(send(&app.router, admin_get("/api/admin/stats")).await).await;
        assert_eq!(stats["data"]["total_applications"], 1);
        assert_eq!(stats["data"]["applications_by_status"]["ANALYSIS_IN_PROGRESS"], 1);

        let events = body_json(send(&app.router, admin_get("/api/admin/events")).await).await;
        assert_eq!(events["data"][0]["event_type"], "margill_status_change");

        let notes = body_json(send(&app.router, admin_get("/api/admin/notes?limit=5")).await).await;
        assert_eq!(notes["data"].as_array().unwrap().len(), 1);

        let application = app.store.get_application("MARGILL-9001").await.unwrap().unwrap();
        assert_eq!(application.amount_cents, Some(250_000));
    }

    #[tokio::test]
    async fn test_vopay_webhook_signature() {
        let app = setup();
        let payload = |key: &str| {
            json!({
                "Success": true,
                "TransactionType": "EFT",
                "TransactionID": "88123",
                "TransactionAmount": "300.00",
                "Status": "Failed",
                "FailureReason": "NSF",
                "ValidationKey": key,
                "Environment": "Production",
            })
        };
        let post = |body: Value| {
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/vopay")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let forged = sign_transaction("88123", "guessed").unwrap();
        let response = send(&app.router, post(payload(&forged))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let key = sign_transaction("88123", VOPAY_SECRET).unwrap();
        let response = send(&app.router, post(payload(&key))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["status"], "failed");

        let logs = app.store.payment_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].failure_reason.as_deref(), Some("NSF"));
    }

    #[tokio::test]
    async fn test_health_and_security_headers() {
        let app = setup();
        let response = send(
            &app.router,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["referrer-policy"], "no-referrer");
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");

        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["store"], "memory");
    }
}

//! Property-based tests for rowdymail-api
//!
//! Webhook validation and the proxy's address checks, driven through the
//! router with generated inputs.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

use rowdymail_api::{router, AppState};
use rowdymail_core::{is_valid_email, AddressGenerator, MailsacConfig, MessageStore, NewAddress};

const REQUIRED: [&str; 4] = ["to", "from", "subject", "text"];

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Non-empty subset of the required fields, as a bit mask
fn missing_mask() -> impl Strategy<Value = u8> {
    1u8..16
}

fn blank() -> impl Strategy<Value = Option<String>> {
    prop_oneof![Just(None), Just(Some(String::new())), Just(Some("   ".to_string()))]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    // ============================================================
    // Webhook validation
    // ============================================================

    #[test]
    fn incomplete_webhooks_are_rejected_and_store_nothing(
        mask in missing_mask(),
        filler in blank(),
    ) {
        let (status, error, stored) = runtime().block_on(async {
            let state = Arc::new(AppState::for_tests(MailsacConfig::default()).await.unwrap());
            let address = state
                .store
                .create_address(NewAddress {
                    email: "a@provider.tld".into(),
                    user_id: Some("u1".into()),
                    ..Default::default()
                })
                .await
                .unwrap();
            let server = TestServer::new(router(state.clone())).unwrap();

            let mut body = Map::new();
            for (i, field) in REQUIRED.iter().enumerate() {
                if mask & (1 << i) == 0 {
                    body.insert(field.to_string(), json!(if *field == "to" { "a@provider.tld" } else { "v" }));
                } else if let Some(filler) = &filler {
                    body.insert(field.to_string(), json!(filler));
                }
            }

            let response = server.post("/api/webhook/email").json(&Value::Object(body)).await;
            let status = response.status_code();
            let error = response.json::<Value>()["error"].as_str().unwrap_or_default().to_string();
            let stored = state.store.list_messages(&address.id).await.unwrap().len();
            (status, error, stored)
        });

        prop_assert_eq!(status, StatusCode::BAD_REQUEST);
        prop_assert!(error.starts_with("Missing required fields: "));
        for (i, field) in REQUIRED.iter().enumerate() {
            prop_assert_eq!(mask & (1 << i) != 0, error.contains(field));
        }
        prop_assert_eq!(stored, 0);
    }

    #[test]
    fn recipient_case_never_matters(
        local in "[a-z0-9]{1,12}",
        flips in prop::collection::vec(any::<bool>(), 12),
    ) {
        let to: String = format!("{}@provider.tld", local)
            .chars()
            .zip(flips.iter().cycle())
            .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c })
            .collect();

        let stored = runtime().block_on(async {
            let state = Arc::new(AppState::for_tests(MailsacConfig::default()).await.unwrap());
            let address = state
                .store
                .create_address(NewAddress {
                    email: format!("{}@provider.tld", local),
                    ..Default::default()
                })
                .await
                .unwrap();
            let server = TestServer::new(router(state.clone())).unwrap();

            server
                .post("/api/webhook/email")
                .json(&json!({ "to": to, "from": "x@y.com", "subject": "s", "text": "t" }))
                .await
                .assert_status_ok();

            state.store.list_messages(&address.id).await.unwrap().len()
        });

        prop_assert_eq!(stored, 1);
    }

    // ============================================================
    // Address validation
    // ============================================================

    #[test]
    fn generated_addresses_pass_proxy_validation(prefix in proptest::option::of("[a-z0-9._-]{1,64}")) {
        let email = AddressGenerator::new("mailsac.com").generate(prefix.as_deref()).unwrap();
        prop_assert!(is_valid_email(&email));
    }

    #[test]
    fn strings_without_at_are_rejected(s in "[^@\\s]{0,40}") {
        prop_assert!(!is_valid_email(&s));
    }
}

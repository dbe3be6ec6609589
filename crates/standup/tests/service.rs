//! End-to-end tests of the service operations over in-memory backends.

use standup::prelude::*;
use standup::{SentMail, SessionPolicy};
use standup_store::FaultyStore;

// =========================================================================
// Helpers
// =========================================================================

const CLIENT: &str = "198.51.100.20";

fn secret() -> ServerSecret {
    ServerSecret::new(vec![42u8; 32]).unwrap()
}

fn service_with(config: StandupConfig) -> StandupService<MemoryStore, MemoryMailer> {
    StandupBuilder::new()
        .config(config)
        .secret(secret())
        .build(MemoryStore::new(), MemoryMailer::new())
        .unwrap()
}

fn service() -> StandupService<MemoryStore, MemoryMailer> {
    service_with(StandupConfig::default())
}

/// Runs the send/verify code flow and returns the identity token.
async fn verified_token(
    service: &StandupService<MemoryStore, MemoryMailer>,
    email: &str,
) -> String {
    service.send_email_code(CLIENT, email).await.unwrap();
    let code = service.mailer().last_code_for(email).unwrap();
    service.verify_email_code(CLIENT, email, &code).await.unwrap()
}

// =========================================================================
// Builder
// =========================================================================

#[test]
fn test_build_without_secret_fails() {
    let result = StandupBuilder::new().build(MemoryStore::new(), LogMailer);
    assert!(matches!(result, Err(StandupError::Internal(_))));
}

#[test]
fn test_build_with_overflowing_token_ttl_fails() {
    let mut config = StandupConfig::default();
    config.tokens.email_token_ttl_days = i64::MAX;

    let result = StandupBuilder::new()
        .config(config)
        .secret(secret())
        .build(MemoryStore::new(), MemoryMailer::new());

    assert!(matches!(result, Err(StandupError::Internal(_))));
}

#[test]
fn test_build_with_overflowing_session_ttl_fails() {
    let mut config = StandupConfig::default();
    config.store.session_ttl_secs = u64::MAX;

    let result = StandupBuilder::new()
        .config(config)
        .secret(secret())
        .build(MemoryStore::new(), MemoryMailer::new());

    assert!(matches!(result, Err(StandupError::Internal(_))));
}

// =========================================================================
// create_session / get_session
// =========================================================================

#[tokio::test]
async fn test_create_session_then_get_returns_public_view() {
    let service = service();

    let created = service
        .create_session(CLIENT, "  Ana  ", Some("correct horse"))
        .await
        .unwrap();
    let view = service.get_session(&created.session_id).await.unwrap();

    assert_eq!(view.id, created.session_id);
    assert_eq!(view.leader_name, "Ana");
    assert_eq!(view.leader_id, created.user_id);
    assert!(view.requires_password);
    assert_eq!(view.participants.len(), 1);
    assert_eq!(view.expires_at, created.expires_at);

    let json = serde_json::to_string(&view).unwrap();
    assert!(!json.contains("pbkdf2"), "view must not leak the hash");
}

#[tokio::test]
async fn test_create_session_blank_password_means_open_session() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", Some("   ")).await.unwrap();

    let view = service.get_session(&created.session_id).await.unwrap();

    assert!(!view.requires_password);
}

#[tokio::test]
async fn test_create_session_weak_password_is_validation_error() {
    let err = service()
        .create_session(CLIENT, "Ana", Some("short"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_create_session_empty_name_is_validation_error() {
    let err = service().create_session(CLIENT, " ", None).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_create_session_sixth_call_is_rate_limited() {
    let service = service();
    for _ in 0..5 {
        service.create_session(CLIENT, "Ana", None).await.unwrap();
    }

    let err = service.create_session(CLIENT, "Ana", None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert!(err.retry_after().is_some());
    // Another client is unaffected.
    assert!(service.create_session("198.51.100.21", "Bea", None).await.is_ok());
}

#[tokio::test]
async fn test_get_session_unknown_is_not_found() {
    let err = service().get_session(&SessionId::generate()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// =========================================================================
// join_session
// =========================================================================

#[tokio::test]
async fn test_join_session_adds_participant() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();

    let joined = service
        .join_session(CLIENT, &created.session_id, "Bea", None, None)
        .await
        .unwrap();

    assert_ne!(joined.user_id, created.user_id);
    assert_eq!(joined.participants.len(), 2);
    assert_eq!(joined.access_grant, None);
}

#[tokio::test]
async fn test_join_session_duplicate_name_is_rejected() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();
    let id = &created.session_id;
    let bea = service.join_session(CLIENT, id, "Bea", None, None).await.unwrap();

    let again = service
        .join_session(CLIENT, id, " BEA ", None, None)
        .await
        .unwrap_err();

    match again {
        StandupError::Validation(msg) => assert_eq!(msg, "name already taken"),
        other => panic!("expected Validation, got {other:?}"),
    }
    let view = service.get_session(id).await.unwrap();
    assert_eq!(view.participants.len(), 2);
    assert!(view.participants.iter().any(|p| p.id == bea.user_id));
}

#[tokio::test]
async fn test_join_session_leader_name_never_yields_leader_id() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();
    let id = &created.session_id;

    let result = service.join_session(CLIENT, id, "ana", None, None).await;

    assert!(matches!(result, Err(StandupError::Validation(_))));
    let view = service.get_session(id).await.unwrap();
    assert_eq!(view.participants.len(), 1);
    assert_eq!(view.leader_id, created.user_id);
}

#[tokio::test]
async fn test_join_session_protected_leader_name_is_rejected_after_password() {
    let service = service();
    let created = service
        .create_session(CLIENT, "Ana", Some("correct horse"))
        .await
        .unwrap();
    let id = &created.session_id;

    let impostor = service
        .join_session(CLIENT, id, "ANA", Some("correct horse"), None)
        .await;

    match impostor {
        Err(StandupError::Validation(msg)) => assert_eq!(msg, "name already taken"),
        Ok(joined) => {
            assert_ne!(joined.user_id, created.user_id);
            panic!("duplicate name admitted");
        }
        Err(other) => panic!("expected Validation, got {other:?}"),
    }
    let summary = service.set_summary(id, created.user_id, "Still the leader.").await;
    assert!(summary.is_ok());
}

#[tokio::test]
async fn test_join_session_unknown_is_not_found() {
    let err = service()
        .join_session(CLIENT, &SessionId::generate(), "Bea", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_join_session_password_checks() {
    let service = service();
    let created = service
        .create_session(CLIENT, "Ana", Some("correct horse"))
        .await
        .unwrap();
    let id = &created.session_id;

    let missing = service.join_session(CLIENT, id, "Bea", None, None).await;
    let wrong = service
        .join_session(CLIENT, id, "Bea", Some("battery staple"), None)
        .await;
    let right = service
        .join_session(CLIENT, id, "Bea", Some("correct horse"), None)
        .await
        .unwrap();

    assert!(matches!(missing, Err(StandupError::Authentication)));
    assert!(matches!(wrong, Err(StandupError::Authentication)));
    assert!(right.access_grant.is_some());
    assert_eq!(service.get_session(id).await.unwrap().participants.len(), 2);
}

#[tokio::test]
async fn test_join_session_full_session_rejects_newcomer() {
    let service = service_with(StandupConfig {
        session: SessionPolicy {
            max_participants: 3,
            ..SessionPolicy::default()
        },
        ..StandupConfig::default()
    });
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();
    let id = &created.session_id;
    service.join_session(CLIENT, id, "Bea", None, None).await.unwrap();
    service.join_session(CLIENT, id, "Cai", None, None).await.unwrap();

    let full = service
        .join_session(CLIENT, id, "Dee", None, None)
        .await
        .unwrap_err();

    match full {
        StandupError::Validation(msg) => assert_eq!(msg, "session is full"),
        other => panic!("expected Validation, got {other:?}"),
    }
    assert_eq!(service.get_session(id).await.unwrap().participants.len(), 3);
}

#[tokio::test]
async fn test_join_session_invalid_email_token_is_authentication_error() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();

    let err = service
        .join_session(CLIENT, &created.session_id, "Bea", None, Some("a.b.c"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_join_session_after_finish_is_rejected() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();
    service
        .finish_session(&created.session_id, created.user_id)
        .await
        .unwrap();

    let err = service
        .join_session(CLIENT, &created.session_id, "Bea", None, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
}

// =========================================================================
// Writes: transcript, summary, finish, leave, delete
// =========================================================================

#[tokio::test]
async fn test_append_transcript_records_entries_in_order() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();
    let bea = service
        .join_session(CLIENT, &created.session_id, "Bea", None, None)
        .await
        .unwrap();

    service
        .append_transcript(&created.session_id, created.user_id, "yesterday: reviews")
        .await
        .unwrap();
    service
        .append_transcript(&created.session_id, bea.user_id, "blocked on CI")
        .await
        .unwrap();

    let view = service.get_session(&created.session_id).await.unwrap();
    let lines: Vec<&str> = view.transcripts.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(lines, ["yesterday: reviews", "blocked on CI"]);
    assert_eq!(view.transcripts[1].user_id, bea.user_id);
}

#[tokio::test]
async fn test_append_transcript_outsider_is_rejected() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();

    let err = service
        .append_transcript(&created.session_id, UserId::generate(), "hello")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
}

#[tokio::test]
async fn test_finish_session_mails_summary_to_verified_participants() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();
    let token = verified_token(&service, "Bea@Example.com").await;
    service
        .join_session(CLIENT, &created.session_id, "Bea", None, Some(&token))
        .await
        .unwrap();
    service
        .join_session(CLIENT, &created.session_id, "Cai", None, None)
        .await
        .unwrap();
    service
        .set_summary(&created.session_id, created.user_id, "All green.")
        .await
        .unwrap();

    let finished = service
        .finish_session(&created.session_id, created.user_id)
        .await
        .unwrap();

    assert_eq!(finished.emails, ["bea@example.com"]);
    assert!(finished.undelivered.is_empty());
    assert!(service.mailer().sent().contains(&SentMail::Summary {
        email: "bea@example.com".into(),
        session_id: created.session_id.clone(),
        summary: "All green.".into(),
    }));
    let view = service.get_session(&created.session_id).await.unwrap();
    assert_eq!(view.finished_at, Some(finished.finished_at));
    assert_eq!(view.summary.as_deref(), Some("All green."));
}

#[tokio::test]
async fn test_finish_session_twice_keeps_first_timestamp() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();

    let first = service
        .finish_session(&created.session_id, created.user_id)
        .await
        .unwrap();
    let second = service
        .finish_session(&created.session_id, created.user_id)
        .await
        .unwrap();

    assert_eq!(first.finished_at, second.finished_at);
}

#[tokio::test]
async fn test_finish_session_non_leader_is_rejected() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();
    let bea = service
        .join_session(CLIENT, &created.session_id, "Bea", None, None)
        .await
        .unwrap();

    let finish = service.finish_session(&created.session_id, bea.user_id).await;
    let summary = service
        .set_summary(&created.session_id, bea.user_id, "hijacked")
        .await;

    assert!(matches!(finish, Err(StandupError::Authentication)));
    assert!(matches!(summary, Err(StandupError::Authentication)));
    assert_eq!(service.get_session(&created.session_id).await.unwrap().finished_at, None);
}

#[tokio::test]
async fn test_leave_session_last_one_out_deletes_session() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();
    let bea = service
        .join_session(CLIENT, &created.session_id, "Bea", None, None)
        .await
        .unwrap();

    assert!(!service.leave_session(&created.session_id, bea.user_id).await.unwrap());
    assert_eq!(
        service.get_session(&created.session_id).await.unwrap().participants.len(),
        1
    );

    assert!(service.leave_session(&created.session_id, created.user_id).await.unwrap());
    let err = service.get_session(&created.session_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_session_leader_only() {
    let service = service();
    let created = service.create_session(CLIENT, "Ana", None).await.unwrap();
    let bea = service
        .join_session(CLIENT, &created.session_id, "Bea", None, None)
        .await
        .unwrap();

    let by_bea = service.delete_session(&created.session_id, bea.user_id).await;
    assert!(matches!(by_bea, Err(StandupError::Authentication)));

    service
        .delete_session(&created.session_id, created.user_id)
        .await
        .unwrap();
    assert!(service.get_session(&created.session_id).await.is_err());
}

// =========================================================================
// Email verification
// =========================================================================

#[tokio::test]
async fn test_email_code_flow_issues_token_for_normalized_email() {
    let service = service();

    let token = verified_token(&service, "  Ana@Example.COM ").await;

    assert_eq!(service.verify_email_token(&token).unwrap(), "ana@example.com");
}

#[tokio::test]
async fn test_verify_email_code_is_single_use() {
    let service = service();
    service.send_email_code(CLIENT, "ana@example.com").await.unwrap();
    let code = service.mailer().last_code_for("ana@example.com").unwrap();

    service.verify_email_code(CLIENT, "ana@example.com", &code).await.unwrap();
    let reuse = service.verify_email_code(CLIENT, "ana@example.com", &code).await;

    assert!(matches!(reuse, Err(StandupError::Authentication)));
}

#[tokio::test]
async fn test_verify_email_code_wrong_email_and_unknown_code_look_the_same() {
    let service = service();
    service.send_email_code(CLIENT, "ana@example.com").await.unwrap();
    let code = service.mailer().last_code_for("ana@example.com").unwrap();
    let other_code = if code == "000000" { "000001" } else { "000000" };

    let wrong_email = service
        .verify_email_code(CLIENT, "eve@example.com", &code)
        .await
        .unwrap_err();
    let unknown_code = service
        .verify_email_code(CLIENT, "ana@example.com", other_code)
        .await
        .unwrap_err();

    assert_eq!(wrong_email.to_string(), unknown_code.to_string());
    assert_eq!(wrong_email.kind(), unknown_code.kind());
}

#[tokio::test]
async fn test_verify_email_code_destroyed_after_max_mismatches() {
    let service = service();
    service.send_email_code(CLIENT, "ana@example.com").await.unwrap();
    let code = service.mailer().last_code_for("ana@example.com").unwrap();

    for i in 0..5 {
        let email = format!("eve{i}@example.com");
        assert!(service.verify_email_code(CLIENT, &email, &code).await.is_err());
    }
    let rightful = service.verify_email_code(CLIENT, "ana@example.com", &code).await;

    assert!(matches!(rightful, Err(StandupError::Authentication)));
}

#[tokio::test]
async fn test_verify_email_code_sixth_attempt_is_rate_limited() {
    let service = service();
    for _ in 0..5 {
        let _ = service.verify_email_code(CLIENT, "ana@example.com", "123456").await;
    }

    let err = service
        .verify_email_code(CLIENT, "ana@example.com", "123456")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RateLimited);
}

#[tokio::test]
async fn test_send_email_code_rotating_emails_hits_client_quota() {
    let service = service();
    for i in 0..20 {
        let email = format!("user{i}@example.com");
        service.send_email_code(CLIENT, &email).await.unwrap();
    }

    let err = service
        .send_email_code(CLIENT, "user20@example.com")
        .await
        .unwrap_err();
    let other_client = service.send_email_code("203.0.113.9", "user20@example.com").await;

    assert!(matches!(
        err,
        StandupError::RateLimited {
            action: ActionClass::EmailCodeSendByClient,
            ..
        }
    ));
    assert!(other_client.is_ok());
    assert_eq!(service.mailer().sent().len(), 21);
}

#[tokio::test]
async fn test_verify_email_code_rotating_emails_hits_client_quota() {
    let service = service();
    for i in 0..20 {
        let email = format!("user{i}@example.com");
        let _ = service.verify_email_code(CLIENT, &email, "123456").await;
    }

    let err = service
        .verify_email_code(CLIENT, "user20@example.com", "123456")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StandupError::RateLimited {
            action: ActionClass::EmailCodeVerifyByClient,
            ..
        }
    ));
}

#[tokio::test]
async fn test_send_email_code_invalid_address_is_validation_error() {
    let err = service().send_email_code(CLIENT, "not-an-email").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_send_email_code_delivery_failure_discards_code() {
    let service = service();
    service.mailer().fail_with(Some("smtp down"));

    let err = service.send_email_code(CLIENT, "ana@example.com").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Delivery);
    assert!(service.backend().is_empty(), "undelivered code must not linger");
}

#[tokio::test]
async fn test_issue_email_token_round_trips() {
    let service = service();
    let token = service.issue_email_token("Ana@Example.com").unwrap();

    assert_eq!(service.verify_email_token(&token).unwrap(), "ana@example.com");
    assert!(matches!(
        service.verify_email_token(&format!("{token}x")),
        Err(StandupError::Authentication)
    ));
}

// =========================================================================
// Guard integration
// =========================================================================

#[tokio::test]
async fn test_guard_accepts_grant_from_password_join() {
    let service = service();
    let created = service
        .create_session(CLIENT, "Ana", Some("correct horse"))
        .await
        .unwrap();
    let joined = service
        .join_session(CLIENT, &created.session_id, "Bea", Some("correct horse"), None)
        .await
        .unwrap();
    let guard = service.guard();

    let without_grant = MemoryCache::with(CachedSession {
        session_id: created.session_id.clone(),
        user_id: Some(joined.user_id),
        display_name: Some("Bea".into()),
        access_grant: None,
    });
    let with_grant = MemoryCache::with(CachedSession {
        access_grant: joined.access_grant.clone(),
        ..without_grant.load().unwrap().unwrap()
    });

    assert_eq!(
        guard.check(&created.session_id, &without_grant).await.state(),
        Some(GuardState::PasswordReauthRequired)
    );
    assert_eq!(
        guard.check(&created.session_id, &with_grant).await.state(),
        Some(GuardState::Authorized)
    );
}

// =========================================================================
// Storage failures
// =========================================================================

#[tokio::test]
async fn test_offline_store_surfaces_generic_storage_error() {
    let service = StandupBuilder::new()
        .secret(secret())
        .build(FaultyStore::new(MemoryStore::new()), MemoryMailer::new())
        .unwrap();
    service.backend().set_offline(true);

    let err = service.create_session(CLIENT, "Ana", None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(err.to_string(), "storage unavailable, try again");
    assert!(err.is_retryable());
}

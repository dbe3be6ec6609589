//! One standup from creation to the summary email, against in-memory
//! backends. Set `STANDUP_SECRET` (32+ bytes) to use your own key and
//! `RUST_LOG=debug` to see every decision the service makes.

use standup::prelude::*;
use standup::SentMail;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_SECRET: &str = "walkthrough-demo-secret-do-not-deploy!!";
const CLIENT: &str = "127.0.0.1";

fn secret() -> Result<ServerSecret, Box<dyn std::error::Error>> {
    let raw = match std::env::var("STANDUP_SECRET") {
        Ok(raw) => raw,
        Err(_) => {
            warn!("STANDUP_SECRET not set, using the built-in demo secret");
            DEMO_SECRET.to_owned()
        }
    };
    Ok(ServerSecret::new(raw.into_bytes())?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,standup=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let service = StandupBuilder::new()
        .secret(secret()?)
        .build(MemoryStore::new(), MemoryMailer::new())?;
    let sweeper = service.spawn_sweeper();

    // Ana opens a protected standup.
    let created = service
        .create_session(CLIENT, "Ana", Some("daily-sync-42"))
        .await?;
    info!(session_id = %created.session_id, "Ana created a session");

    // Bea verifies an email address to receive the summary.
    service.send_email_code(CLIENT, "bea@example.com").await?;
    let code = service
        .mailer()
        .last_code_for("bea@example.com")
        .ok_or("no verification code in the outbox")?;
    let email_token = service.verify_email_code(CLIENT, "bea@example.com", &code).await?;

    let joined = service
        .join_session(
            CLIENT,
            &created.session_id,
            "Bea",
            Some("daily-sync-42"),
            Some(&email_token),
        )
        .await?;
    info!(participants = joined.participants.len(), "Bea joined");

    // Reloading the room: a cached grant renders, a bare identity is sent
    // back to re-enter the password.
    let guard = service.guard();
    let bare = CachedSession {
        session_id: created.session_id.clone(),
        user_id: Some(joined.user_id),
        display_name: Some("Bea".into()),
        access_grant: None,
    };
    let with_grant = CachedSession {
        access_grant: joined.access_grant.clone(),
        ..bare.clone()
    };
    for (label, cached) in [("without grant", bare), ("with grant", with_grant)] {
        match guard.check(&created.session_id, &MemoryCache::with(cached)).await {
            GuardDecision::Render(view) => {
                info!(label, participants = view.participants.len(), "guard rendered the room");
            }
            GuardDecision::Redirect { state, to } => {
                info!(label, ?state, to = %to.to_url(), "guard redirected");
            }
            GuardDecision::RetryLater => warn!(label, "store unavailable"),
        }
    }

    service
        .append_transcript(&created.session_id, joined.user_id, "Shipped the login fix.")
        .await?;
    service
        .append_transcript(&created.session_id, created.user_id, "Reviewing the rollout plan.")
        .await?;
    service
        .set_summary(
            &created.session_id,
            created.user_id,
            "Login fix shipped. Rollout plan under review.",
        )
        .await?;
    let finished = service
        .finish_session(&created.session_id, created.user_id)
        .await?;
    info!(finished_at = %finished.finished_at, recipients = ?finished.emails, "standup finished");

    let view = service.get_session(&created.session_id).await?;
    println!("{}", serde_json::to_string_pretty(&view)?);

    for mail in service.mailer().sent() {
        if let SentMail::Summary { email, summary, .. } = mail {
            println!("summary to {email}: {summary}");
        }
    }

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    Ok(())
}

// Potluck sync demo - drives the event cache against the in-memory store

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use potluck_sync::{
    app_state::AppState,
    config::Config,
    core::UserId,
    infrastructure::InMemoryDocumentStore,
    models::{NewEvent, ProfileDraft},
    sync::EventList,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("potluck_sync=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let store = Arc::new(InMemoryDocumentStore::new());
    let app = AppState::new(config, store);

    let host = UserId::from("host-uid");
    let guest = UserId::from("guest-uid");

    app.profiles
        .save_profile(
            Some(&guest),
            ProfileDraft {
                first_name: "Sam".into(),
                last_name: "Guest".into(),
                ..Default::default()
            },
        )
        .await?;
    info!("guest setup complete: {}", app.profiles.is_setup_complete(&guest).await?);

    // The guest's home screen
    let cache = app.event_cache();
    let mut updates = cache.subscribe();
    cache.start(Some(&guest)).await?;

    let now = Utc::now();
    let brunch = app
        .events
        .create_event(
            Some(&host),
            NewEvent {
                name: "Sunday brunch".into(),
                theme: "Pancakes".into(),
                address: "".into(),
                date_time: now + ChronoDuration::days(6),
            },
            None,
        )
        .await?;
    let picnic = app
        .events
        .create_event(
            Some(&host),
            NewEvent {
                name: "Park picnic".into(),
                theme: "Salads".into(),
                address: "Riverside Park".into(),
                date_time: now + ChronoDuration::days(2),
            },
            None,
        )
        .await?;

    app.events.invite_user(&brunch, &guest).await?;

    let mut links = app.deep_links();
    let link = links.share_link(&picnic);
    links.handle_url(&link);
    links.accept_pending(&app.events, Some(&guest)).await?;

    let events = wait_for_len(&mut updates, 2).await?;
    print_events("after invite and deep link", &events);

    cache.delete(&brunch).await??;
    print_events("after delete", &cache.events());

    cache.shutdown().await;
    Ok(())
}

async fn wait_for_len(
    updates: &mut tokio::sync::watch::Receiver<EventList>,
    len: usize,
) -> anyhow::Result<EventList> {
    let wait = async {
        loop {
            let current = updates.borrow_and_update().clone();
            if current.len() == len {
                return Ok::<_, anyhow::Error>(current);
            }
            updates.changed().await?;
        }
    };
    Ok(tokio::time::timeout(Duration::from_secs(5), wait).await??)
}

fn print_events(label: &str, events: &EventList) {
    println!("📋 {} ({} events)", label, events.len());
    for event in events.iter() {
        println!(
            "  {}  {:<16} @ {:<16} attendees={} invited={}",
            event.date_time.format("%a %b %e %H:%M"),
            event.name,
            event.location,
            event.attendees.len(),
            event.invited_users.len()
        );
    }
}

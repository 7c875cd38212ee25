//! Demo Seed Tool
//!
//! Seeds a pool with participants, a pair of fixtures, and two open guesses,
//! so the API has something to settle and rank straight away.
//!
//! Usage:
//!   cargo run --bin seed_demo
//!   cargo run --bin seed_demo -- --db-path ./goalpool.db --title "office pool"

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Parser;
use std::sync::Arc;

use goalpool_backend::models::{Fixture, Guess, Score};
use goalpool_backend::store::{
    FixtureStore, GuessStore, ParticipantStore, PoolStore, SqliteStore,
};

/// Seed a demo pool into the goalpool database
#[derive(Parser, Debug)]
#[command(name = "seed_demo")]
#[command(about = "Seed a demo pool, fixtures and guesses into the database")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, env = "DATABASE_PATH", default_value = "./goalpool.db")]
    db_path: String,

    /// Title of the seeded pool
    #[arg(long, default_value = "Copa demo pool")]
    title: String,

    /// Users to enroll, in join order
    #[arg(long, value_delimiter = ',', default_value = "alice,bob,carol")]
    users: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let store = Arc::new(SqliteStore::new(&cli.db_path)?);

    let pool = store.create_pool(&cli.title).await?;
    println!("pool        {}  ({})", pool.id, pool.title);

    let mut participants = Vec::new();
    for user in &cli.users {
        let p = store.add_participant(&pool.id, user).await?;
        println!("participant {}  ({}, join_seq {})", p.id, p.user_id, p.join_seq);
        participants.push(p);
    }

    let opener = Fixture::new("Germany", "Brazil", Utc::now() + Duration::hours(1));
    store.insert_fixture(&opener).await?;
    println!(
        "fixture     {}  ({} vs {})",
        opener.id, opener.first_team, opener.second_team
    );

    let later = Fixture::new("Brazil", "Argentina", Utc::now() + Duration::days(1));
    store.insert_fixture(&later).await?;
    println!(
        "fixture     {}  ({} vs {})",
        later.id, later.first_team, later.second_team
    );

    // Two open guesses on the opener, ready to be settled.
    if let Some(first) = participants.first() {
        let guess = Guess::new(&opener.id, &first.id, Score::new(2, 1));
        store.insert_guess(&guess).await?;
        println!("guess       {}  ({} predicts 2:1)", guess.id, first.user_id);
    }
    if let Some(second) = participants.get(1) {
        let guess = Guess::new(&opener.id, &second.id, Score::new(1, 1));
        store.insert_guess(&guess).await?;
        println!("guess       {}  ({} predicts 1:1)", guess.id, second.user_id);
    }

    println!();
    println!("settle the opener with:");
    println!(
        "  curl -X PUT localhost:8080/fixtures/{}/score -H 'content-type: application/json' -d '{{\"first\":2,\"second\":1}}'",
        opener.id
    );
    println!("then read the ranking:");
    println!("  curl localhost:8080/pools/{}/ranking", pool.id);

    Ok(())
}

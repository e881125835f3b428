//! Runs the content and ballot services against a real Postgres instance.
//!
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use std::collections::BTreeMap;
use voting_portal::{
    AppError, PostgresRepository,
    ballot::{BallotPolicy, submit_ballot},
    content,
    models::{Identity, Role, VotingFields},
    repository::Repository,
};

async fn setup() -> (PostgresRepository, sqlx::PgPool) {
    dotenv::dotenv().ok();
    let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .expect("Failed to connect to Postgres in tests");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    (PostgresRepository::new(pool.clone()), pool)
}

async fn insert_voter(pool: &sqlx::PgPool) -> Identity {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO identities (display_name, role) VALUES ('Test Voter', 'user') RETURNING id",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    Identity {
        id,
        display_name: "Test Voter".to_string(),
        role: Role::Participant,
    }
}

fn fields(name: &str) -> VotingFields {
    VotingFields {
        name: name.to_string(),
        description: String::new(),
        start_time: Utc::now(),
        end_time: Utc::now() + Duration::days(1),
    }
}

#[tokio::test]
#[ignore = "requires a Postgres instance at DATABASE_URL"]
async fn test_cascade_delete_against_postgres() {
    let (repo, pool) = setup().await;
    let voter = insert_voter(&pool).await;

    let voting = content::create_voting(&repo, &fields("PG Election")).await.unwrap();
    let mut selections = BTreeMap::new();
    for q in 0..2 {
        let question = content::create_question(&repo, voting.id, &format!("Q{q}"))
            .await
            .unwrap();
        let first = content::create_answer(&repo, question.id, "A").await.unwrap();
        content::create_answer(&repo, question.id, "B").await.unwrap();
        selections.insert(question.id, first.id);
    }

    let records = submit_ballot(&repo, &voter, voting.id, &selections, BallotPolicy::new(true))
        .await
        .unwrap();
    assert_eq!(records.len(), 2);

    let again = submit_ballot(&repo, &voter, voting.id, &selections, BallotPolicy::new(true)).await;
    assert!(matches!(again, Err(AppError::DuplicateVote { .. })));

    let removed = content::delete_voting(&repo, voting.id).await.unwrap();
    assert_eq!(removed.hierarchy_rows(), 1 + 2 + 4);
    assert_eq!(removed.vote_records, 2);
    assert!(repo.get_voting(voting.id).await.unwrap().is_none());

    let again = content::delete_voting(&repo, voting.id).await.unwrap();
    assert_eq!(again.hierarchy_rows(), 0);
}

#[tokio::test]
#[ignore = "requires a Postgres instance at DATABASE_URL"]
async fn test_identity_role_alias_against_postgres() {
    let (repo, pool) = setup().await;
    let voter = insert_voter(&pool).await;

    let stored = repo.get_identity(voter.id).await.unwrap().unwrap();
    assert_eq!(stored.role, Role::Participant);
}

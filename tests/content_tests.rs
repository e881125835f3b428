use chrono::{Duration, TimeZone, Utc};
use voting_portal::{
    AppError, MemoryRepository,
    content,
    error::RepositoryError,
    memory::{Fault, RowCounts},
    models::{Identity, Role, Voting, VotingFields},
    repository::Repository,
};

// --- Fixtures ---

fn fields(name: &str) -> VotingFields {
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
    VotingFields {
        name: name.to_string(),
        description: "Annual board election".to_string(),
        start_time: start,
        end_time: start + Duration::days(7),
    }
}

fn admin() -> Identity {
    Identity {
        id: 1,
        display_name: "Ada".to_string(),
        role: Role::Admin,
    }
}

/// Creates a voting with one question per entry of `answers_per_question`, each holding
/// that many answers.
async fn seed_voting(
    repo: &MemoryRepository,
    name: &str,
    answers_per_question: &[usize],
) -> Voting {
    let voting = content::create_voting(repo, &fields(name)).await.unwrap();
    for (q, &answers) in answers_per_question.iter().enumerate() {
        let question = content::create_question(repo, voting.id, &format!("Question {q}"))
            .await
            .unwrap();
        for a in 0..answers {
            content::create_answer(repo, question.id, &format!("Answer {a}"))
                .await
                .unwrap();
        }
    }
    voting
}

// --- Votings ---

#[tokio::test]
async fn test_create_and_update_voting() {
    let repo = MemoryRepository::new();
    let voting = content::create_voting(&repo, &fields("  Election  ")).await.unwrap();
    assert_eq!(voting.name, "Election");

    let mut changed = fields("Referendum");
    changed.description = "Moved".to_string();
    changed.end_time = changed.start_time + Duration::days(1);

    let updated = content::update_voting(&repo, voting.id, &changed).await.unwrap();
    assert_eq!(updated.id, voting.id);
    assert_eq!(updated.name, "Referendum");
    assert_eq!(updated.description, "Moved");
    assert_eq!(updated.end_time, changed.end_time);

    let stored = repo.get_voting(voting.id).await.unwrap().unwrap();
    assert_eq!(stored, updated);
}

#[tokio::test]
async fn test_voting_validation() {
    let repo = MemoryRepository::new();

    let result = content::create_voting(&repo, &fields("   ")).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let mut inverted = fields("Backwards");
    inverted.end_time = inverted.start_time - Duration::hours(1);
    let result = content::create_voting(&repo, &inverted).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let result = content::update_voting(&repo, 404, &fields("Ghost")).await;
    assert!(matches!(result, Err(AppError::NotFound("voting"))));
}

#[tokio::test]
async fn test_delete_voting_removes_whole_subtree() {
    let repo = MemoryRepository::new();
    let doomed = seed_voting(&repo, "Doomed", &[3, 2, 0]).await;
    let kept = seed_voting(&repo, "Kept", &[2]).await;

    let removed = content::delete_voting(&repo, doomed.id).await.unwrap();

    // 3 questions + 5 answers + the voting itself.
    assert_eq!(removed.votings, 1);
    assert_eq!(removed.questions, 3);
    assert_eq!(removed.answers, 5);
    assert_eq!(removed.hierarchy_rows(), 3 + 5 + 1);

    assert!(repo.get_voting(doomed.id).await.unwrap().is_none());
    assert!(repo.list_questions(doomed.id).await.unwrap().is_empty());

    // The other voting is untouched.
    let kept_questions = repo.list_questions(kept.id).await.unwrap();
    assert_eq!(kept_questions.len(), 1);
    assert_eq!(repo.list_answers(kept_questions[0].id).await.unwrap().len(), 2);
    assert_eq!(
        repo.row_counts().await,
        RowCounts {
            votings: 1,
            questions: 1,
            answers: 2,
            vote_records: 0,
        }
    );
}

#[tokio::test]
async fn test_delete_voting_twice_is_a_no_op() {
    let repo = MemoryRepository::new();
    let voting = seed_voting(&repo, "Once", &[1]).await;

    content::delete_voting(&repo, voting.id).await.unwrap();
    let again = content::delete_voting(&repo, voting.id).await.unwrap();

    assert_eq!(again.hierarchy_rows(), 0);
    assert_eq!(again.vote_records, 0);
}

#[tokio::test]
async fn test_failed_voting_cascade_rolls_back() {
    let repo = MemoryRepository::new();
    let voting = seed_voting(&repo, "Sticky", &[2, 1]).await;
    let before = repo.row_counts().await;

    repo.inject_fault(Some(Fault::DeleteVoting)).await;
    let result = content::delete_voting(&repo, voting.id).await;
    assert!(matches!(result, Err(AppError::Persistence(_))));

    // Questions and answers deleted before the failure are back.
    assert_eq!(repo.row_counts().await, before);

    repo.inject_fault(Some(Fault::DeleteQuestion)).await;
    assert!(content::delete_voting(&repo, voting.id).await.is_err());
    assert_eq!(repo.row_counts().await, before);

    repo.inject_fault(None).await;
    let removed = content::delete_voting(&repo, voting.id).await.unwrap();
    assert_eq!(removed.hierarchy_rows(), 1 + 2 + 3);
}

// --- Questions ---

#[tokio::test]
async fn test_question_lifecycle() {
    let repo = MemoryRepository::new();
    let voting = seed_voting(&repo, "Election", &[]).await;

    let question = content::create_question(&repo, voting.id, "Color?").await.unwrap();
    assert_eq!(question.voting_id, voting.id);

    let renamed = content::update_question(&repo, question.id, "Colour?").await.unwrap();
    assert_eq!(renamed.name, "Colour?");
    assert_eq!(renamed.voting_id, voting.id);

    let found = content::find_question_in(&repo, voting.id, question.id).await.unwrap();
    assert_eq!(found, renamed);

    let result = content::find_question_in(&repo, voting.id + 1000, question.id).await;
    assert!(matches!(result, Err(AppError::NotFound("question"))));
}

#[tokio::test]
async fn test_create_question_under_missing_voting() {
    let repo = MemoryRepository::new();

    let result = content::create_question(&repo, 77, "Orphan?").await;
    assert!(matches!(result, Err(AppError::NotFound("voting"))));

    let voting = seed_voting(&repo, "Election", &[]).await;
    let result = content::create_question(&repo, voting.id, "  ").await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn test_orphan_inserts_are_foreign_key_violations() {
    let repo = MemoryRepository::new();

    let result = repo.insert_question(404, "Orphan?").await;
    assert!(matches!(result, Err(RepositoryError::ForeignKey(_))));
    let result = repo.insert_answer(404, "Orphan").await;
    assert!(matches!(result, Err(RepositoryError::ForeignKey(_))));

    assert_eq!(repo.row_counts().await, RowCounts::default());
}

#[tokio::test]
async fn test_delete_question_reports_parent_and_keeps_siblings() {
    let repo = MemoryRepository::new();
    let voting = seed_voting(&repo, "Election", &[2, 1]).await;
    let questions = repo.list_questions(voting.id).await.unwrap();

    let deleted = content::delete_question(&repo, questions[0].id).await.unwrap();

    assert_eq!(deleted.voting_id, voting.id);
    assert_eq!(deleted.removed.questions, 1);
    assert_eq!(deleted.removed.answers, 2);

    let remaining = repo.list_questions(voting.id).await.unwrap();
    assert_eq!(remaining, vec![questions[1].clone()]);
    assert_eq!(repo.list_answers(questions[1].id).await.unwrap().len(), 1);
    assert!(repo.get_voting(voting.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_missing_question_is_not_found() {
    let repo = MemoryRepository::new();

    let result = content::delete_question(&repo, 12).await;
    assert!(matches!(result, Err(AppError::NotFound("question"))));
}

#[tokio::test]
async fn test_failed_question_cascade_rolls_back() {
    let repo = MemoryRepository::new();
    let voting = seed_voting(&repo, "Election", &[3]).await;
    let question = repo.list_questions(voting.id).await.unwrap().remove(0);
    let before = repo.row_counts().await;

    repo.inject_fault(Some(Fault::DeleteQuestion)).await;
    let result = content::delete_question(&repo, question.id).await;

    assert!(matches!(result, Err(AppError::Persistence(_))));
    assert_eq!(repo.row_counts().await, before);
    assert_eq!(repo.list_answers(question.id).await.unwrap().len(), 3);
}

// --- Answers ---

#[tokio::test]
async fn test_answer_lifecycle() {
    let repo = MemoryRepository::new();
    let voting = seed_voting(&repo, "Election", &[]).await;
    let question = content::create_question(&repo, voting.id, "Color?").await.unwrap();

    let red = content::create_answer(&repo, question.id, "Red").await.unwrap();
    let blue = content::create_answer(&repo, question.id, "Blue").await.unwrap();
    assert_eq!(red.question_id, question.id);

    let renamed = content::update_answer(&repo, blue.id, "Navy").await.unwrap();
    assert_eq!(renamed.name, "Navy");

    let result = content::find_answer_in(&repo, question.id + 1000, red.id).await;
    assert!(matches!(result, Err(AppError::NotFound("answer"))));

    let result = content::create_answer(&repo, 999, "Lost").await;
    assert!(matches!(result, Err(AppError::NotFound("question"))));

    let result = content::update_answer(&repo, 999, "Lost").await;
    assert!(matches!(result, Err(AppError::NotFound("answer"))));
}

#[tokio::test]
async fn test_delete_answer_reports_both_ancestors() {
    let repo = MemoryRepository::new();
    let voting = seed_voting(&repo, "Election", &[]).await;
    let question = content::create_question(&repo, voting.id, "Color?").await.unwrap();
    let red = content::create_answer(&repo, question.id, "Red").await.unwrap();
    let blue = content::create_answer(&repo, question.id, "Blue").await.unwrap();

    let deleted = content::delete_answer(&repo, red.id).await.unwrap();

    assert_eq!(deleted.voting_id, voting.id);
    assert_eq!(deleted.question_id, question.id);
    assert_eq!(deleted.removed.answers, 1);
    assert_eq!(repo.list_answers(question.id).await.unwrap(), vec![blue]);

    let result = content::delete_answer(&repo, red.id).await;
    assert!(matches!(result, Err(AppError::NotFound("answer"))));
}

// --- Read Models ---

#[tokio::test]
async fn test_voting_tree_and_index() {
    let repo = MemoryRepository::new();
    let voting = seed_voting(&repo, "Election", &[2, 3]).await;

    let tree = content::voting_tree(&repo, voting.id, &admin()).await.unwrap();
    assert!(tree.can_manage);
    assert_eq!(tree.voting, voting);
    assert_eq!(tree.questions.len(), 2);
    assert_eq!(tree.questions[0].answers.len(), 2);
    assert_eq!(tree.questions[1].answers.len(), 3);
    assert!(tree.my_selections.is_empty());

    let participant = Identity {
        role: Role::Participant,
        ..admin()
    };
    let index = content::voting_index(&repo, &participant).await.unwrap();
    assert!(!index.can_manage);
    assert_eq!(index.votings, vec![voting]);

    let result = content::voting_tree(&repo, 404, &participant).await;
    assert!(matches!(result, Err(AppError::NotFound("voting"))));
}

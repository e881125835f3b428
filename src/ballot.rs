use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::{
    error::{AppError, RepositoryError},
    models::{Identity, NewVoteRecord, VoteRecord},
    repository::Repository,
};

/// BallotPolicy
///
/// Product rules applied when a ballot is submitted.
#[derive(Debug, Clone, Copy)]
pub struct BallotPolicy {
    /// Reject ballots outside the voting's `[start_time, end_time]` window.
    pub enforce_window: bool,
    /// The instant the window check is made against.
    pub now: DateTime<Utc>,
}

impl BallotPolicy {
    pub fn new(enforce_window: bool) -> Self {
        Self {
            enforce_window,
            now: Utc::now(),
        }
    }
}

/// submit_ballot
///
/// Records one vote record per `(question_id, answer_id)` selection, attributed to
/// `identity`, all inside one unit of work: either every selection is stored or none is.
///
/// Rejections, checked before anything is written:
/// * `NotFound` - the voting does not exist.
/// * `BadRequest` - no selections.
/// * `VotingClosed` - the window is enforced and `policy.now` lies outside it.
/// * `InvalidReference` - a question outside this voting, or an answer outside its question.
/// * `DuplicateVote` - the identity already answered one of the questions.
pub async fn submit_ballot(
    repo: &dyn Repository,
    identity: &Identity,
    voting_id: i64,
    selections: &BTreeMap<i64, i64>,
    policy: BallotPolicy,
) -> Result<Vec<VoteRecord>, AppError> {
    if selections.is_empty() {
        return Err(AppError::BadRequest("ballot has no selections".to_string()));
    }

    let mut uow = repo.begin().await?;

    let voting = uow
        .get_voting(voting_id)
        .await?
        .ok_or(AppError::NotFound("voting"))?;

    if policy.enforce_window && !voting.is_open_at(policy.now) {
        tracing::info!(voting_id, identity_id = identity.id, "ballot outside voting window");
        return Err(AppError::VotingClosed);
    }

    for (&question_id, &answer_id) in selections {
        let question_ok = uow
            .get_question(question_id)
            .await?
            .is_some_and(|question| question.voting_id == voting_id);
        if !question_ok {
            return Err(AppError::InvalidReference(format!(
                "question {question_id} does not belong to voting {voting_id}"
            )));
        }

        let answer_ok = uow
            .get_answer(answer_id)
            .await?
            .is_some_and(|answer| answer.question_id == question_id);
        if !answer_ok {
            return Err(AppError::InvalidReference(format!(
                "answer {answer_id} does not belong to question {question_id}"
            )));
        }

        if uow.has_vote(identity.id, question_id).await? {
            return Err(AppError::DuplicateVote { question_id });
        }
    }

    let mut records = Vec::with_capacity(selections.len());
    for (&question_id, &answer_id) in selections {
        let record = NewVoteRecord {
            voting_id,
            question_id,
            answer_id,
            identity_id: identity.id,
        };
        let stored = uow.insert_vote_record(record).await.map_err(|e| match e {
            // Lost a race against a concurrent ballot from the same identity.
            RepositoryError::Conflict(_) => AppError::DuplicateVote { question_id },
            other => {
                tracing::error!(
                    voting_id,
                    question_id,
                    error = %other,
                    "ballot insert failed, rolled back"
                );
                AppError::Persistence(other)
            }
        })?;
        records.push(stored);
    }

    uow.commit().await?;

    tracing::info!(
        voting_id,
        identity_id = identity.id,
        selections = records.len(),
        "ballot recorded"
    );
    Ok(records)
}

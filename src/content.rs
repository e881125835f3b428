//! Content hierarchy: Voting -> Question -> Answer.
//!
//! This module is the only writer of votings, questions and answers. Deletes run
//! bottom-up inside one unit of work: children are enumerated by parent id, each subtree
//! is removed, then the parent row. Any failure aborts the whole unit of work, so no
//! caller ever observes a question without its voting or an answer without its question.
//! Vote records referencing a removed row go with it.

use std::collections::BTreeMap;

use crate::{
    error::{AppError, RepoResult, RepositoryError},
    models::{
        Answer, CascadeSummary, DeletedAnswer, DeletedQuestion, Identity, Question,
        QuestionDetail, Voting, VotingDetail, VotingFields, VotingIndex,
    },
    repository::{Repository, UnitOfWork, VoteScope},
};

// --- Validation ---

fn validate_voting(fields: &VotingFields) -> Result<VotingFields, AppError> {
    let name = required_name(&fields.name, "voting")?;
    if fields.end_time < fields.start_time {
        return Err(AppError::BadRequest(
            "end_time must not precede start_time".to_string(),
        ));
    }
    Ok(VotingFields {
        name,
        description: fields.description.trim().to_string(),
        start_time: fields.start_time,
        end_time: fields.end_time,
    })
}

fn required_name(name: &str, entity: &str) -> Result<String, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{entity} name must not be empty")));
    }
    Ok(trimmed.to_string())
}

// --- Votings ---

pub async fn create_voting(
    repo: &dyn Repository,
    fields: &VotingFields,
) -> Result<Voting, AppError> {
    let fields = validate_voting(fields)?;
    let voting = repo.insert_voting(&fields).await?;
    tracing::info!(voting_id = voting.id, "voting created");
    Ok(voting)
}

/// Replaces every field of the voting; the id never changes.
pub async fn update_voting(
    repo: &dyn Repository,
    id: i64,
    fields: &VotingFields,
) -> Result<Voting, AppError> {
    let fields = validate_voting(fields)?;
    let voting = repo
        .update_voting(id, &fields)
        .await?
        .ok_or(AppError::NotFound("voting"))?;
    tracing::info!(voting_id = id, "voting updated");
    Ok(voting)
}

/// delete_voting
///
/// Three-level cascade: every answer of every question, then the questions, then the
/// voting. Deleting an id that does not exist commits nothing and reports zero rows.
pub async fn delete_voting(repo: &dyn Repository, id: i64) -> Result<CascadeSummary, AppError> {
    let mut uow = repo.begin().await?;

    let removed = cascade_voting(uow.as_mut(), id).await.map_err(|e| {
        tracing::error!(voting_id = id, error = %e, "voting cascade aborted, rolled back");
        e
    })?;
    uow.commit().await?;

    tracing::info!(
        voting_id = id,
        questions = removed.questions,
        answers = removed.answers,
        vote_records = removed.vote_records,
        "voting deleted"
    );
    Ok(removed)
}

// --- Questions ---

/// Fails with `NotFound` when the voting does not exist.
pub async fn create_question(
    repo: &dyn Repository,
    voting_id: i64,
    name: &str,
) -> Result<Question, AppError> {
    let name = required_name(name, "question")?;
    repo.get_voting(voting_id)
        .await?
        .ok_or(AppError::NotFound("voting"))?;

    // The voting may vanish between the lookup and the insert.
    let question = repo
        .insert_question(voting_id, &name)
        .await
        .map_err(|e| match e {
            RepositoryError::ForeignKey(_) => AppError::NotFound("voting"),
            other => other.into(),
        })?;
    tracing::info!(voting_id, question_id = question.id, "question created");
    Ok(question)
}

pub async fn update_question(
    repo: &dyn Repository,
    id: i64,
    name: &str,
) -> Result<Question, AppError> {
    let name = required_name(name, "question")?;
    repo.update_question(id, &name)
        .await?
        .ok_or(AppError::NotFound("question"))
}

/// delete_question
///
/// Resolves the parent voting first (the caller shows that voting next), then removes the
/// question's answers and the question itself. A missing question is `NotFound`.
pub async fn delete_question(repo: &dyn Repository, id: i64) -> Result<DeletedQuestion, AppError> {
    let mut uow = repo.begin().await?;

    let question = uow
        .get_question(id)
        .await?
        .ok_or(AppError::NotFound("question"))?;

    let removed = cascade_question(uow.as_mut(), id).await.map_err(|e| {
        tracing::error!(question_id = id, error = %e, "question cascade aborted, rolled back");
        e
    })?;
    uow.commit().await?;

    tracing::info!(
        question_id = id,
        voting_id = question.voting_id,
        answers = removed.answers,
        "question deleted"
    );
    Ok(DeletedQuestion {
        voting_id: question.voting_id,
        removed,
    })
}

// --- Answers ---

/// Fails with `NotFound` when the question does not exist.
pub async fn create_answer(
    repo: &dyn Repository,
    question_id: i64,
    name: &str,
) -> Result<Answer, AppError> {
    let name = required_name(name, "answer")?;
    repo.get_question(question_id)
        .await?
        .ok_or(AppError::NotFound("question"))?;

    let answer = repo
        .insert_answer(question_id, &name)
        .await
        .map_err(|e| match e {
            RepositoryError::ForeignKey(_) => AppError::NotFound("question"),
            other => other.into(),
        })?;
    tracing::info!(question_id, answer_id = answer.id, "answer created");
    Ok(answer)
}

pub async fn update_answer(repo: &dyn Repository, id: i64, name: &str) -> Result<Answer, AppError> {
    let name = required_name(name, "answer")?;
    repo.update_answer(id, &name)
        .await?
        .ok_or(AppError::NotFound("answer"))
}

/// delete_answer
///
/// Resolves both ancestors (answer -> question -> voting) before deleting, since the caller
/// navigates back to the question. A missing answer or question is `NotFound`.
pub async fn delete_answer(repo: &dyn Repository, id: i64) -> Result<DeletedAnswer, AppError> {
    let mut uow = repo.begin().await?;

    let answer = uow
        .get_answer(id)
        .await?
        .ok_or(AppError::NotFound("answer"))?;
    let question = uow
        .get_question(answer.question_id)
        .await?
        .ok_or(AppError::NotFound("question"))?;

    let removed = cascade_answer(uow.as_mut(), id).await?;
    uow.commit().await?;

    tracing::info!(answer_id = id, question_id = question.id, "answer deleted");
    Ok(DeletedAnswer {
        voting_id: question.voting_id,
        question_id: question.id,
        removed,
    })
}

// --- Cascade Steps (run inside a unit of work) ---

async fn cascade_answer(uow: &mut dyn UnitOfWork, answer_id: i64) -> RepoResult<CascadeSummary> {
    let vote_records = uow.delete_vote_records(VoteScope::Answer(answer_id)).await?;
    let answers = uow.delete_answer(answer_id).await?;
    Ok(CascadeSummary {
        answers,
        vote_records,
        ..CascadeSummary::default()
    })
}

async fn cascade_question(
    uow: &mut dyn UnitOfWork,
    question_id: i64,
) -> RepoResult<CascadeSummary> {
    let mut removed = CascadeSummary::default();

    for answer in uow.list_answers(question_id).await? {
        removed += cascade_answer(uow, answer.id).await?;
    }
    removed.vote_records += uow.delete_vote_records(VoteScope::Question(question_id)).await?;
    removed.questions += uow.delete_question(question_id).await?;
    Ok(removed)
}

async fn cascade_voting(uow: &mut dyn UnitOfWork, voting_id: i64) -> RepoResult<CascadeSummary> {
    let mut removed = CascadeSummary::default();

    for question in uow.list_questions(voting_id).await? {
        removed += cascade_question(uow, question.id).await?;
    }
    removed.vote_records += uow.delete_vote_records(VoteScope::Voting(voting_id)).await?;
    removed.votings += uow.delete_voting(voting_id).await?;
    Ok(removed)
}

// --- Read Models ---

/// All votings; `can_manage` is set for admins.
pub async fn voting_index(
    repo: &dyn Repository,
    viewer: &Identity,
) -> Result<VotingIndex, AppError> {
    Ok(VotingIndex {
        can_manage: viewer.is_admin(),
        votings: repo.list_votings().await?,
    })
}

/// voting_tree
///
/// One voting with its questions, each question's answers, and the answers `viewer` has
/// already recorded.
pub async fn voting_tree(
    repo: &dyn Repository,
    voting_id: i64,
    viewer: &Identity,
) -> Result<VotingDetail, AppError> {
    let voting = repo
        .get_voting(voting_id)
        .await?
        .ok_or(AppError::NotFound("voting"))?;

    let mut questions = Vec::new();
    for question in repo.list_questions(voting_id).await? {
        let answers = repo.list_answers(question.id).await?;
        questions.push(QuestionDetail { question, answers });
    }

    let my_selections: BTreeMap<i64, i64> = repo
        .list_vote_records(voting_id)
        .await?
        .into_iter()
        .filter(|record| record.identity_id == viewer.id)
        .map(|record| (record.question_id, record.answer_id))
        .collect();

    Ok(VotingDetail {
        can_manage: viewer.is_admin(),
        voting,
        questions,
        my_selections,
    })
}

pub async fn find_voting(repo: &dyn Repository, id: i64) -> Result<Voting, AppError> {
    repo.get_voting(id).await?.ok_or(AppError::NotFound("voting"))
}

/// The question, provided it belongs to `voting_id`. A question under another voting is
/// reported as `NotFound` for this path.
pub async fn find_question_in(
    repo: &dyn Repository,
    voting_id: i64,
    question_id: i64,
) -> Result<Question, AppError> {
    repo.get_question(question_id)
        .await?
        .filter(|question| question.voting_id == voting_id)
        .ok_or(AppError::NotFound("question"))
}

/// The answer, provided it belongs to `question_id`.
pub async fn find_answer_in(
    repo: &dyn Repository,
    question_id: i64,
    answer_id: i64,
) -> Result<Answer, AppError> {
    repo.get_answer(answer_id)
        .await?
        .filter(|answer| answer.question_id == question_id)
        .ok_or(AppError::NotFound("answer"))
}

pub async fn question_detail(
    repo: &dyn Repository,
    question_id: i64,
) -> Result<QuestionDetail, AppError> {
    let question = repo
        .get_question(question_id)
        .await?
        .ok_or(AppError::NotFound("question"))?;
    let answers = repo.list_answers(question_id).await?;
    Ok(QuestionDetail { question, answers })
}

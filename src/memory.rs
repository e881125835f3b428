use crate::{
    auth::hash_password,
    error::{RepoResult, RepositoryError},
    models::{
        Answer, Credential, Identity, NewVoteRecord, Question, Role, VoteRecord, Voting,
        VotingFields,
    },
    repository::{Repository, UnitOfWork, VoteScope},
};
use async_trait::async_trait;
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Fault
///
/// A simulated store failure, used to prove that partially applied units of work are
/// rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every `delete_voting` inside a unit of work fails.
    DeleteVoting,
    /// Every `delete_question` inside a unit of work fails.
    DeleteQuestion,
    /// The vote insert after `n` successful inserts in the same unit of work fails.
    VoteInsertAfter(usize),
}

/// Row counts per table, for diagnostics and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowCounts {
    pub votings: usize,
    pub questions: usize,
    pub answers: usize,
    pub vote_records: usize,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: i64,
    identities: BTreeMap<i64, Identity>,
    // Keyed by login; logins are unique.
    credentials: BTreeMap<String, Credential>,
    votings: BTreeMap<i64, Voting>,
    questions: BTreeMap<i64, Question>,
    answers: BTreeMap<i64, Answer>,
    vote_records: BTreeMap<i64, VoteRecord>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn questions_of(&self, voting_id: i64) -> Vec<Question> {
        self.questions
            .values()
            .filter(|q| q.voting_id == voting_id)
            .cloned()
            .collect()
    }

    fn answers_of(&self, question_id: i64) -> Vec<Answer> {
        self.answers
            .values()
            .filter(|a| a.question_id == question_id)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: Tables,
    fault: Option<Fault>,
}

/// MemoryRepository
///
/// An in-process implementation of `Repository`. All tables sit behind one async mutex.
/// A unit of work holds that mutex until it is committed or dropped, stages its writes on
/// a copy of the tables, and publishes the copy on commit, so readers only ever observe
/// whole transactions.
///
/// Used for local development without Postgres and throughout the test suite.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// provision_identity
    ///
    /// Creates an identity and its credential. Provisioning is an administrative concern
    /// outside the HTTP surface; this exists for local mode and tests.
    pub async fn provision_identity(
        &self,
        display_name: &str,
        role: Role,
        login: &str,
        password: &str,
    ) -> RepoResult<Identity> {
        let mut inner = self.inner.lock().await;
        let tables = &mut inner.tables;

        if tables.credentials.contains_key(login) {
            return Err(RepositoryError::Conflict(format!("login `{login}` already exists")));
        }

        let identity = Identity {
            id: tables.allocate_id(),
            display_name: display_name.to_string(),
            role,
        };
        let credential = Credential {
            id: tables.allocate_id(),
            login: login.to_string(),
            password_hash: hash_password(password),
            identity_id: identity.id,
        };

        tables.identities.insert(identity.id, identity.clone());
        tables.credentials.insert(credential.login.clone(), credential);
        Ok(identity)
    }

    /// Arms (or with `None`, clears) a simulated failure for subsequent units of work.
    pub async fn inject_fault(&self, fault: Option<Fault>) {
        self.inner.lock().await.fault = fault;
    }

    pub async fn row_counts(&self) -> RowCounts {
        let inner = self.inner.lock().await;
        RowCounts {
            votings: inner.tables.votings.len(),
            questions: inner.tables.questions.len(),
            answers: inner.tables.answers.len(),
            vote_records: inner.tables.vote_records.len(),
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_identity(&self, id: i64) -> RepoResult<Option<Identity>> {
        Ok(self.inner.lock().await.tables.identities.get(&id).cloned())
    }

    async fn get_credential(&self, login: &str) -> RepoResult<Option<Credential>> {
        Ok(self.inner.lock().await.tables.credentials.get(login).cloned())
    }

    async fn list_votings(&self) -> RepoResult<Vec<Voting>> {
        let inner = self.inner.lock().await;
        let mut votings: Vec<Voting> = inner.tables.votings.values().cloned().collect();
        // Same order as the Postgres query.
        votings.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        Ok(votings)
    }

    async fn get_voting(&self, id: i64) -> RepoResult<Option<Voting>> {
        Ok(self.inner.lock().await.tables.votings.get(&id).cloned())
    }

    async fn get_question(&self, id: i64) -> RepoResult<Option<Question>> {
        Ok(self.inner.lock().await.tables.questions.get(&id).cloned())
    }

    async fn get_answer(&self, id: i64) -> RepoResult<Option<Answer>> {
        Ok(self.inner.lock().await.tables.answers.get(&id).cloned())
    }

    async fn list_questions(&self, voting_id: i64) -> RepoResult<Vec<Question>> {
        Ok(self.inner.lock().await.tables.questions_of(voting_id))
    }

    async fn list_answers(&self, question_id: i64) -> RepoResult<Vec<Answer>> {
        Ok(self.inner.lock().await.tables.answers_of(question_id))
    }

    async fn list_vote_records(&self, voting_id: i64) -> RepoResult<Vec<VoteRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tables
            .vote_records
            .values()
            .filter(|r| r.voting_id == voting_id)
            .cloned()
            .collect())
    }

    async fn insert_voting(&self, fields: &VotingFields) -> RepoResult<Voting> {
        let mut inner = self.inner.lock().await;
        let voting = Voting {
            id: inner.tables.allocate_id(),
            name: fields.name.clone(),
            description: fields.description.clone(),
            start_time: fields.start_time,
            end_time: fields.end_time,
        };
        inner.tables.votings.insert(voting.id, voting.clone());
        Ok(voting)
    }

    async fn update_voting(&self, id: i64, fields: &VotingFields) -> RepoResult<Option<Voting>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.tables.votings.get_mut(&id).map(|voting| {
            voting.name = fields.name.clone();
            voting.description = fields.description.clone();
            voting.start_time = fields.start_time;
            voting.end_time = fields.end_time;
            voting.clone()
        }))
    }

    async fn insert_question(&self, voting_id: i64, name: &str) -> RepoResult<Question> {
        let mut inner = self.inner.lock().await;
        // Mirrors the foreign key on questions.voting_id.
        if !inner.tables.votings.contains_key(&voting_id) {
            return Err(RepositoryError::ForeignKey(format!(
                "voting {voting_id} does not exist"
            )));
        }
        let question = Question {
            id: inner.tables.allocate_id(),
            name: name.to_string(),
            voting_id,
        };
        inner.tables.questions.insert(question.id, question.clone());
        Ok(question)
    }

    async fn update_question(&self, id: i64, name: &str) -> RepoResult<Option<Question>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.tables.questions.get_mut(&id).map(|question| {
            question.name = name.to_string();
            question.clone()
        }))
    }

    async fn insert_answer(&self, question_id: i64, name: &str) -> RepoResult<Answer> {
        let mut inner = self.inner.lock().await;
        if !inner.tables.questions.contains_key(&question_id) {
            return Err(RepositoryError::ForeignKey(format!(
                "question {question_id} does not exist"
            )));
        }
        let answer = Answer {
            id: inner.tables.allocate_id(),
            name: name.to_string(),
            question_id,
        };
        inner.tables.answers.insert(answer.id, answer.clone());
        Ok(answer)
    }

    async fn update_answer(&self, id: i64, name: &str) -> RepoResult<Option<Answer>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.tables.answers.get_mut(&id).map(|answer| {
            answer.name = name.to_string();
            answer.clone()
        }))
    }

    async fn begin(&self) -> RepoResult<Box<dyn UnitOfWork>> {
        let guard = self.inner.clone().lock_owned().await;
        let staged = guard.tables.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged,
            vote_inserts: 0,
        }))
    }
}

/// MemoryUnitOfWork
///
/// Holds the store lock for its whole lifetime; writes land in `staged` only.
struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Inner>,
    staged: Tables,
    vote_inserts: usize,
}

impl MemoryUnitOfWork {
    fn simulated_failure(&self, operation: &str) -> RepositoryError {
        RepositoryError::Unavailable(format!("simulated failure in {operation}"))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn get_voting(&mut self, id: i64) -> RepoResult<Option<Voting>> {
        Ok(self.staged.votings.get(&id).cloned())
    }

    async fn get_question(&mut self, id: i64) -> RepoResult<Option<Question>> {
        Ok(self.staged.questions.get(&id).cloned())
    }

    async fn get_answer(&mut self, id: i64) -> RepoResult<Option<Answer>> {
        Ok(self.staged.answers.get(&id).cloned())
    }

    async fn list_questions(&mut self, voting_id: i64) -> RepoResult<Vec<Question>> {
        Ok(self.staged.questions_of(voting_id))
    }

    async fn list_answers(&mut self, question_id: i64) -> RepoResult<Vec<Answer>> {
        Ok(self.staged.answers_of(question_id))
    }

    async fn has_vote(&mut self, identity_id: i64, question_id: i64) -> RepoResult<bool> {
        Ok(self
            .staged
            .vote_records
            .values()
            .any(|r| r.identity_id == identity_id && r.question_id == question_id))
    }

    async fn delete_vote_records(&mut self, scope: VoteScope) -> RepoResult<u64> {
        let before = self.staged.vote_records.len();
        self.staged.vote_records.retain(|_, r| match scope {
            VoteScope::Voting(id) => r.voting_id != id,
            VoteScope::Question(id) => r.question_id != id,
            VoteScope::Answer(id) => r.answer_id != id,
        });
        Ok((before - self.staged.vote_records.len()) as u64)
    }

    async fn delete_answer(&mut self, id: i64) -> RepoResult<u64> {
        if self.staged.vote_records.values().any(|r| r.answer_id == id) {
            return Err(RepositoryError::ForeignKey(format!(
                "answer {id} is still referenced by vote records"
            )));
        }
        Ok(self.staged.answers.remove(&id).map_or(0, |_| 1))
    }

    async fn delete_question(&mut self, id: i64) -> RepoResult<u64> {
        if self.guard.fault == Some(Fault::DeleteQuestion) {
            return Err(self.simulated_failure("delete_question"));
        }
        if self.staged.answers.values().any(|a| a.question_id == id) {
            return Err(RepositoryError::ForeignKey(format!(
                "question {id} still has answers"
            )));
        }
        Ok(self.staged.questions.remove(&id).map_or(0, |_| 1))
    }

    async fn delete_voting(&mut self, id: i64) -> RepoResult<u64> {
        if self.guard.fault == Some(Fault::DeleteVoting) {
            return Err(self.simulated_failure("delete_voting"));
        }
        if self.staged.questions.values().any(|q| q.voting_id == id) {
            return Err(RepositoryError::ForeignKey(format!(
                "voting {id} still has questions"
            )));
        }
        Ok(self.staged.votings.remove(&id).map_or(0, |_| 1))
    }

    async fn insert_vote_record(&mut self, record: NewVoteRecord) -> RepoResult<VoteRecord> {
        if let Some(Fault::VoteInsertAfter(n)) = self.guard.fault {
            if self.vote_inserts >= n {
                return Err(self.simulated_failure("insert_vote_record"));
            }
        }

        let duplicate = self
            .staged
            .vote_records
            .values()
            .any(|r| r.identity_id == record.identity_id && r.question_id == record.question_id);
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "identity {} already answered question {}",
                record.identity_id, record.question_id
            )));
        }

        let stored = VoteRecord {
            id: self.staged.allocate_id(),
            voting_id: record.voting_id,
            question_id: record.question_id,
            answer_id: record.answer_id,
            identity_id: record.identity_id,
        };
        self.staged.vote_records.insert(stored.id, stored.clone());
        self.vote_inserts += 1;
        Ok(stored)
    }

    async fn commit(self: Box<Self>) -> RepoResult<()> {
        let MemoryUnitOfWork {
            mut guard, staged, ..
        } = *self;
        guard.tables = staged;
        Ok(())
    }
}

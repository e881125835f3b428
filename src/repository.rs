use crate::{
    error::{RepoResult, RepositoryError},
    models::{
        Answer, Credential, Identity, NewVoteRecord, Question, VoteRecord, Voting, VotingFields,
    },
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use std::sync::Arc;

/// Repository Trait
///
/// The persistence collaborator contract: key fetches, parent-id enumerations, inserts and
/// updates, plus `begin` for work that must be atomic (cascading deletes, ballots).
///
/// Errors are returned, never swallowed; callers decide how they surface.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Identity/Auth ---
    async fn get_identity(&self, id: i64) -> RepoResult<Option<Identity>>;
    // Logins are unique.
    async fn get_credential(&self, login: &str) -> RepoResult<Option<Credential>>;

    // --- Hierarchy Reads ---
    async fn list_votings(&self) -> RepoResult<Vec<Voting>>;
    async fn get_voting(&self, id: i64) -> RepoResult<Option<Voting>>;
    async fn get_question(&self, id: i64) -> RepoResult<Option<Question>>;
    async fn get_answer(&self, id: i64) -> RepoResult<Option<Answer>>;
    async fn list_questions(&self, voting_id: i64) -> RepoResult<Vec<Question>>;
    async fn list_answers(&self, question_id: i64) -> RepoResult<Vec<Answer>>;
    async fn list_vote_records(&self, voting_id: i64) -> RepoResult<Vec<VoteRecord>>;

    // --- Hierarchy Writes ---
    async fn insert_voting(&self, fields: &VotingFields) -> RepoResult<Voting>;
    // Returns None when no row has this id.
    async fn update_voting(&self, id: i64, fields: &VotingFields) -> RepoResult<Option<Voting>>;
    async fn insert_question(&self, voting_id: i64, name: &str) -> RepoResult<Question>;
    async fn update_question(&self, id: i64, name: &str) -> RepoResult<Option<Question>>;
    async fn insert_answer(&self, question_id: i64, name: &str) -> RepoResult<Answer>;
    async fn update_answer(&self, id: i64, name: &str) -> RepoResult<Option<Answer>>;

    /// Opens a unit of work. Nothing it writes is visible to other callers until `commit`;
    /// dropping it uncommitted discards every write.
    async fn begin(&self) -> RepoResult<Box<dyn UnitOfWork>>;
}

/// UnitOfWork
///
/// One transaction against the store.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn get_voting(&mut self, id: i64) -> RepoResult<Option<Voting>>;
    async fn get_question(&mut self, id: i64) -> RepoResult<Option<Question>>;
    async fn get_answer(&mut self, id: i64) -> RepoResult<Option<Answer>>;
    async fn list_questions(&mut self, voting_id: i64) -> RepoResult<Vec<Question>>;
    async fn list_answers(&mut self, question_id: i64) -> RepoResult<Vec<Answer>>;
    async fn has_vote(&mut self, identity_id: i64, question_id: i64) -> RepoResult<bool>;

    // Each delete returns the number of rows removed.
    async fn delete_vote_records(&mut self, scope: VoteScope) -> RepoResult<u64>;
    async fn delete_answer(&mut self, id: i64) -> RepoResult<u64>;
    async fn delete_question(&mut self, id: i64) -> RepoResult<u64>;
    async fn delete_voting(&mut self, id: i64) -> RepoResult<u64>;

    /// Fails with `RepositoryError::Conflict` when the identity already answered the question.
    async fn insert_vote_record(&mut self, record: NewVoteRecord) -> RepoResult<VoteRecord>;

    async fn commit(self: Box<Self>) -> RepoResult<()>;
}

/// Which vote records a delete targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteScope {
    Voting(i64),
    Question(i64),
    Answer(i64),
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Queries are checked at runtime so
/// the crate builds without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const VOTING_COLUMNS: &str = "id, name, description, start_time, end_time";

fn foreign_key(error: sqlx::Error, detail: String) -> RepositoryError {
    match error {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            RepositoryError::ForeignKey(detail)
        }
        other => other.into(),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_identity(&self, id: i64) -> RepoResult<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>(
            "SELECT id, display_name, role FROM identities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(identity)
    }

    async fn get_credential(&self, login: &str) -> RepoResult<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT id, login, password_hash, identity_id FROM credentials WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credential)
    }

    async fn list_votings(&self) -> RepoResult<Vec<Voting>> {
        let votings = sqlx::query_as::<_, Voting>(&format!(
            "SELECT {VOTING_COLUMNS} FROM votings ORDER BY start_time DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(votings)
    }

    async fn get_voting(&self, id: i64) -> RepoResult<Option<Voting>> {
        let query = format!("SELECT {VOTING_COLUMNS} FROM votings WHERE id = $1");
        let voting = sqlx::query_as::<_, Voting>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(voting)
    }

    async fn get_question(&self, id: i64) -> RepoResult<Option<Question>> {
        let question =
            sqlx::query_as::<_, Question>("SELECT id, name, voting_id FROM questions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(question)
    }

    async fn get_answer(&self, id: i64) -> RepoResult<Option<Answer>> {
        let answer =
            sqlx::query_as::<_, Answer>("SELECT id, name, question_id FROM answers WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(answer)
    }

    async fn list_questions(&self, voting_id: i64) -> RepoResult<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            "SELECT id, name, voting_id FROM questions WHERE voting_id = $1 ORDER BY id",
        )
        .bind(voting_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    async fn list_answers(&self, question_id: i64) -> RepoResult<Vec<Answer>> {
        let answers = sqlx::query_as::<_, Answer>(
            "SELECT id, name, question_id FROM answers WHERE question_id = $1 ORDER BY id",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    async fn list_vote_records(&self, voting_id: i64) -> RepoResult<Vec<VoteRecord>> {
        let records = sqlx::query_as::<_, VoteRecord>(
            r#"SELECT id, voting_id, question_id, answer_id, identity_id
               FROM vote_records WHERE voting_id = $1 ORDER BY id"#,
        )
        .bind(voting_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn insert_voting(&self, fields: &VotingFields) -> RepoResult<Voting> {
        let voting = sqlx::query_as::<_, Voting>(&format!(
            r#"INSERT INTO votings (name, description, start_time, end_time)
               VALUES ($1, $2, $3, $4)
               RETURNING {VOTING_COLUMNS}"#
        ))
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(fields.start_time)
        .bind(fields.end_time)
        .fetch_one(&self.pool)
        .await?;
        Ok(voting)
    }

    /// update_voting
    ///
    /// Replaces every field; `RETURNING` yields no row when the id is unknown.
    async fn update_voting(&self, id: i64, fields: &VotingFields) -> RepoResult<Option<Voting>> {
        let voting = sqlx::query_as::<_, Voting>(&format!(
            r#"UPDATE votings
               SET name = $2, description = $3, start_time = $4, end_time = $5
               WHERE id = $1
               RETURNING {VOTING_COLUMNS}"#
        ))
        .bind(id)
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(fields.start_time)
        .bind(fields.end_time)
        .fetch_optional(&self.pool)
        .await?;
        Ok(voting)
    }

    async fn insert_question(&self, voting_id: i64, name: &str) -> RepoResult<Question> {
        let question = sqlx::query_as::<_, Question>(
            "INSERT INTO questions (name, voting_id) VALUES ($1, $2) RETURNING id, name, voting_id",
        )
        .bind(name)
        .bind(voting_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| foreign_key(e, format!("voting {voting_id} does not exist")))?;
        Ok(question)
    }

    async fn update_question(&self, id: i64, name: &str) -> RepoResult<Option<Question>> {
        let question = sqlx::query_as::<_, Question>(
            "UPDATE questions SET name = $2 WHERE id = $1 RETURNING id, name, voting_id",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(question)
    }

    async fn insert_answer(&self, question_id: i64, name: &str) -> RepoResult<Answer> {
        let answer = sqlx::query_as::<_, Answer>(
            "INSERT INTO answers (name, question_id) VALUES ($1, $2) \
             RETURNING id, name, question_id",
        )
        .bind(name)
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| foreign_key(e, format!("question {question_id} does not exist")))?;
        Ok(answer)
    }

    async fn update_answer(&self, id: i64, name: &str) -> RepoResult<Option<Answer>> {
        let answer = sqlx::query_as::<_, Answer>(
            "UPDATE answers SET name = $2 WHERE id = $1 RETURNING id, name, question_id",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(answer)
    }

    async fn begin(&self) -> RepoResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// PgUnitOfWork
///
/// Wraps one `sqlx::Transaction`. sqlx rolls the transaction back when it is dropped
/// without `commit`.
struct PgUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn get_voting(&mut self, id: i64) -> RepoResult<Option<Voting>> {
        // FOR UPDATE keeps concurrent cascades and ballots on the same voting serialized.
        let voting = sqlx::query_as::<_, Voting>(&format!(
            "SELECT {VOTING_COLUMNS} FROM votings WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(voting)
    }

    async fn get_question(&mut self, id: i64) -> RepoResult<Option<Question>> {
        let question = sqlx::query_as::<_, Question>(
            "SELECT id, name, voting_id FROM questions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(question)
    }

    async fn get_answer(&mut self, id: i64) -> RepoResult<Option<Answer>> {
        let answer = sqlx::query_as::<_, Answer>(
            "SELECT id, name, question_id FROM answers WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(answer)
    }

    async fn list_questions(&mut self, voting_id: i64) -> RepoResult<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            "SELECT id, name, voting_id FROM questions WHERE voting_id = $1 ORDER BY id",
        )
        .bind(voting_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(questions)
    }

    async fn list_answers(&mut self, question_id: i64) -> RepoResult<Vec<Answer>> {
        let answers = sqlx::query_as::<_, Answer>(
            "SELECT id, name, question_id FROM answers WHERE question_id = $1 ORDER BY id",
        )
        .bind(question_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(answers)
    }

    async fn has_vote(&mut self, identity_id: i64, question_id: i64) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS \
             (SELECT 1 FROM vote_records WHERE identity_id = $1 AND question_id = $2)",
        )
        .bind(identity_id)
        .bind(question_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn delete_vote_records(&mut self, scope: VoteScope) -> RepoResult<u64> {
        let (sql, id) = match scope {
            VoteScope::Voting(id) => ("DELETE FROM vote_records WHERE voting_id = $1", id),
            VoteScope::Question(id) => ("DELETE FROM vote_records WHERE question_id = $1", id),
            VoteScope::Answer(id) => ("DELETE FROM vote_records WHERE answer_id = $1", id),
        };
        let result = sqlx::query(sql).bind(id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn delete_answer(&mut self, id: i64) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM answers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_question(&mut self, id: i64) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_voting(&mut self, id: i64) -> RepoResult<u64> {
        let result = sqlx::query("DELETE FROM votings WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// insert_vote_record
    ///
    /// The `(identity_id, question_id)` unique index is the final arbiter for concurrent
    /// duplicate ballots; its violation surfaces as `Conflict`.
    async fn insert_vote_record(&mut self, record: NewVoteRecord) -> RepoResult<VoteRecord> {
        let inserted = sqlx::query_as::<_, VoteRecord>(
            r#"INSERT INTO vote_records (voting_id, question_id, answer_id, identity_id)
               VALUES ($1, $2, $3, $4)
               RETURNING id, voting_id, question_id, answer_id, identity_id"#,
        )
        .bind(record.voting_id)
        .bind(record.question_id)
        .bind(record.answer_id)
        .bind(record.identity_id)
        .fetch_one(&mut *self.tx)
        .await;

        match inserted {
            Ok(row) => Ok(row),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepositoryError::Conflict(format!(
                    "identity {} already answered question {}",
                    record.identity_id, record.question_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(self: Box<Self>) -> RepoResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

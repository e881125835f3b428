use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Identity & Authentication (Mapped to Database) ---

/// Role
///
/// The RBAC field of an identity. Stored as lowercase text; the legacy value `user`
/// is accepted as an alias of `participant`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    #[serde(alias = "user")]
    Participant,
    Admin,
}

/// Raised when a stored role string is neither `participant`/`user` nor `admin`.
#[derive(Debug, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "participant" | "user" => Ok(Role::Participant),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(value)),
        }
    }
}

/// Identity
///
/// The canonical account record stored in the `identities` table. Provisioned
/// administratively and read-only to this service. Resolved once per request by the
/// access guard and handed to handlers as a typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Identity {
    pub id: i64,
    pub display_name: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Credential
///
/// Login material for exactly one identity (`credentials` table).
/// `password_hash` is the lowercase hex SHA-256 of the password.
#[derive(Debug, Clone, FromRow, Default)]
pub struct Credential {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
    pub identity_id: i64,
}

/// Session
///
/// The live binding between an opaque token and an identity. Owned exclusively by the
/// session store and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Session {
    pub token: String,
    pub identity_id: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Content Hierarchy (Mapped to Database) ---

/// Voting
///
/// Root of the content hierarchy (`votings` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Voting {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[ts(type = "string")]
    pub start_time: DateTime<Utc>,
    #[ts(type = "string")]
    pub end_time: DateTime<Utc>,
}

impl Voting {
    /// Whether `now` falls inside the inclusive `[start_time, end_time]` window.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }
}

/// Question
///
/// One item within a voting (`questions` table). FK `voting_id` -> `votings.id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Question {
    pub id: i64,
    pub name: String,
    pub voting_id: i64,
}

/// Answer
///
/// One selectable option of a question (`answers` table). FK `question_id` -> `questions.id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Answer {
    pub id: i64,
    pub name: String,
    pub question_id: i64,
}

/// VoteRecord
///
/// One ballot selection (`vote_records` table). Append-only; removed only together with
/// the voting, question or answer it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct VoteRecord {
    pub id: i64,
    pub voting_id: i64,
    pub question_id: i64,
    pub answer_id: i64,
    pub identity_id: i64,
}

/// A vote record before the store assigns its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewVoteRecord {
    pub voting_id: i64,
    pub question_id: i64,
    pub answer_id: i64,
    pub identity_id: i64,
}

/// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Input payload for `POST /authentication`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// VotingFields
///
/// Full field set of a voting, used by both create and update (update replaces every field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VotingFields {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[ts(type = "string")]
    pub start_time: DateTime<Utc>,
    #[ts(type = "string")]
    pub end_time: DateTime<Utc>,
}

/// NameRequest
///
/// Payload for creating or renaming a question or an answer.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NameRequest {
    pub name: String,
}

/// BallotRequest
///
/// Payload for `POST /votings/{voting_id}/questions/answers`: question id -> answer id.
/// JSON object keys are the question ids as strings.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BallotRequest {
    pub selections: BTreeMap<i64, i64>,
}

/// --- Responses & View Models (Output Schemas) ---

/// LoginResponse
///
/// Returned on successful authentication, alongside the session cookie.
/// The token may also be presented as a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub identity: Identity,
}

/// VotingIndex
///
/// View model for `GET /`. `can_manage` switches the admin controls on.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VotingIndex {
    pub can_manage: bool,
    pub votings: Vec<Voting>,
}

/// QuestionDetail
///
/// A question together with its answers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct QuestionDetail {
    pub question: Question,
    pub answers: Vec<Answer>,
}

/// VotingDetail
///
/// The full hierarchy of one voting. `my_selections` holds the answers the viewing
/// identity has already recorded, keyed by question id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VotingDetail {
    pub can_manage: bool,
    pub voting: Voting,
    pub questions: Vec<QuestionDetail>,
    pub my_selections: BTreeMap<i64, i64>,
}

/// CascadeSummary
///
/// Rows removed by one cascading delete, per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CascadeSummary {
    pub votings: u64,
    pub questions: u64,
    pub answers: u64,
    pub vote_records: u64,
}

impl std::ops::AddAssign for CascadeSummary {
    fn add_assign(&mut self, other: Self) {
        self.votings += other.votings;
        self.questions += other.questions;
        self.answers += other.answers;
        self.vote_records += other.vote_records;
    }
}

impl CascadeSummary {
    /// Hierarchy rows removed (votings + questions + answers), vote records excluded.
    pub fn hierarchy_rows(&self) -> u64 {
        self.votings + self.questions + self.answers
    }
}

/// DeletedQuestion
///
/// Result of deleting a question: the parent voting to show next, plus what was removed.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DeletedQuestion {
    pub voting_id: i64,
    pub removed: CascadeSummary,
}

/// DeletedAnswer
///
/// Result of deleting an answer: both ancestors, plus what was removed.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DeletedAnswer {
    pub voting_id: i64,
    pub question_id: i64,
    pub removed: CascadeSummary,
}

/// BallotReceipt
///
/// Returned after a ballot is recorded.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BallotReceipt {
    pub voting_id: i64,
    pub records: Vec<VoteRecord>,
}

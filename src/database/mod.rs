use std::sync::Arc;

use libsql::{named_params, params::IntoParams, Builder, Connection, Database as LibsqlDatabase};
use time::OffsetDateTime;

use crate::survey::{
    response::{Answers, SurveyResponse},
    Question, Survey, SurveyUpdate,
};

#[derive(thiserror::Error, Debug)]
pub(crate) enum InitializationError {
    #[error("Error creating database: {0}")]
    CreateError(libsql::Error),
    #[error("Error connecting to database: {0}")]
    ConnectionError(libsql::Error),
    #[error("Error executing create tables batch query: {0}")]
    CreateTablesError(libsql::Error),
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum StatementError {
    #[error("Error preparing statement: {0}")]
    PrepareError(libsql::Error),
    #[error("Error exectuing statement: {0}")]
    ExecuteError(libsql::Error),
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum QueryError {
    #[error(transparent)]
    StatementError(#[from] StatementError),
    #[error("Error getting next row: {0}")]
    NextRowError(libsql::Error),
    #[error("Error reading value from row: {0}")]
    RowError(libsql::Error),
    #[error("Error encoding column as JSON: {0}")]
    EncodeError(serde_json::Error),
    #[error("Error decoding JSON column: {0}")]
    DecodeError(serde_json::Error),
    #[error("Error transforming timestamp: {0}")]
    TimestampError(#[from] time::error::ComponentRange),
}

/// Survey counts shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Totals {
    pub(crate) surveys: u64,
    pub(crate) active_surveys: u64,
    pub(crate) responses: u64,
}

/// Whether remote (Turso/libsql server) or local database should be opened for a URL
fn is_remote(url: &str) -> bool {
    ["libsql://", "http://", "https://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

fn to_nanos(timestamp: OffsetDateTime) -> i64 {
    // Only overflows after the year 2262
    i64::try_from(timestamp.unix_timestamp_nanos()).unwrap_or(i64::MAX)
}

fn from_nanos(nanos: i64) -> Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<String, QueryError> {
    serde_json::to_string(value).map_err(QueryError::EncodeError)
}

fn count(row: &libsql::Row) -> Result<u64, QueryError> {
    let count = row.get::<i64>(0).map_err(QueryError::RowError)?;
    Ok(u64::try_from(count).unwrap_or_default())
}

/// Reads a row selected as `id, title, description, questions, is_active, created_at, updated_at`
fn read_survey(row: &libsql::Row) -> Result<Survey, QueryError> {
    let id = row.get_str(0).map_err(QueryError::RowError)?;
    let title = row.get::<String>(1).map_err(QueryError::RowError)?;
    let description = row.get::<Option<String>>(2).map_err(QueryError::RowError)?;
    let questions = row.get_str(3).map_err(QueryError::RowError)?;
    let questions: Vec<Question> =
        serde_json::from_str(questions).map_err(QueryError::DecodeError)?;
    let is_active = row.get::<i64>(4).map_err(QueryError::RowError)? != 0;
    let created_at = row.get::<i64>(5).map_err(QueryError::RowError)?;
    let updated_at = row.get::<i64>(6).map_err(QueryError::RowError)?;

    Ok(Survey {
        id: id.into(),
        title,
        description,
        questions,
        is_active,
        created_at: from_nanos(created_at)?,
        updated_at: from_nanos(updated_at)?,
    })
}

fn read_response(row: &libsql::Row) -> Result<SurveyResponse, QueryError> {
    let id = row.get_str(0).map_err(QueryError::RowError)?;
    let survey_id = row.get_str(1).map_err(QueryError::RowError)?;
    let answers = row.get_str(2).map_err(QueryError::RowError)?;
    let answers: Answers = serde_json::from_str(answers).map_err(QueryError::DecodeError)?;
    let submitted_at = row.get::<i64>(3).map_err(QueryError::RowError)?;

    Ok(SurveyResponse {
        id: id.into(),
        survey_id: survey_id.into(),
        answers,
        submitted_at: from_nanos(submitted_at)?,
    })
}

/// A wrapper around the libsql database to hide the database and provide access to predefined queries
#[derive(Clone)]
pub(crate) struct Database {
    /// Kept so the database outlives the connection, required for in memory databases
    _database: Arc<LibsqlDatabase>,
    connection: Connection,
}

impl Database {
    async fn create(url: &str, auth_token: String) -> Result<LibsqlDatabase, InitializationError> {
        let builder_result = if is_remote(url) {
            Builder::new_remote(url.to_owned(), auth_token).build().await
        } else {
            Builder::new_local(url).build().await
        };

        builder_result.map_err(InitializationError::CreateError)
    }

    /// Opens the database and initializes it with the tables
    pub(crate) async fn initialize(
        url: &str,
        auth_token: String,
    ) -> Result<Database, InitializationError> {
        let database = Self::create(url, auth_token).await?;

        let connection = database
            .connect()
            .map_err(InitializationError::ConnectionError)?;

        let query = include_str!("./create_tables.sql");
        connection
            .execute_batch(query)
            .await
            .map_err(InitializationError::CreateTablesError)?;

        tracing::debug!("Tables created");

        Ok(Self {
            _database: Arc::new(database),
            connection,
        })
    }

    async fn execute(
        &self,
        sql: &'static str,
        parameters: impl IntoParams,
    ) -> Result<usize, StatementError> {
        let mut statement = self
            .connection
            .prepare(sql)
            .await
            .map_err(StatementError::PrepareError)?;

        statement
            .execute(parameters)
            .await
            .map_err(StatementError::ExecuteError)
    }

    async fn query_row(
        &self,
        sql: &'static str,
        parameters: impl IntoParams,
    ) -> Result<libsql::Row, StatementError> {
        let mut statement = self
            .connection
            .prepare(sql)
            .await
            .map_err(StatementError::PrepareError)?;

        statement
            .query_row(parameters)
            .await
            .map_err(StatementError::ExecuteError)
    }

    async fn query(
        &self,
        sql: &'static str,
        parameters: impl IntoParams,
    ) -> Result<libsql::Rows, StatementError> {
        let mut statement = self
            .connection
            .prepare(sql)
            .await
            .map_err(StatementError::PrepareError)?;

        statement
            .query(parameters)
            .await
            .map_err(StatementError::ExecuteError)
    }

    async fn query_all<T>(
        &self,
        sql: &'static str,
        parameters: impl IntoParams,
        read: impl Fn(&libsql::Row) -> Result<T, QueryError>,
    ) -> Result<Vec<T>, QueryError> {
        let mut rows = self.query(sql, parameters).await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(QueryError::NextRowError)? {
            items.push(read(&row)?);
        }

        Ok(items)
    }

    pub(crate) async fn insert_survey(&self, survey: &Survey) -> Result<(), QueryError> {
        let questions = encode(&survey.questions)?;

        self.execute(
            "INSERT INTO surveys (\
                id,\
                title,\
                description,\
                questions,\
                is_active,\
                created_at,\
                updated_at\
            ) \
            VALUES (\
                :id,\
                :title,\
                :description,\
                :questions,\
                :is_active,\
                :created_at,\
                :updated_at\
            )",
            named_params! {
                ":id": &*survey.id,
                ":title": survey.title.as_str(),
                ":description": survey.description.clone(),
                ":questions": questions,
                ":is_active": i64::from(survey.is_active),
                ":created_at": to_nanos(survey.created_at),
                ":updated_at": to_nanos(survey.updated_at),
            },
        )
        .await?;

        Ok(())
    }

    /// Surveys with the newest first
    pub(crate) async fn get_surveys(&self) -> Result<Vec<Survey>, QueryError> {
        self.query_all(
            "SELECT id, title, description, questions, is_active, created_at, updated_at \
            FROM surveys \
            ORDER BY created_at DESC, rowid DESC",
            (),
            read_survey,
        )
        .await
    }

    /// Active surveys with the newest first
    pub(crate) async fn get_active_surveys(&self) -> Result<Vec<Survey>, QueryError> {
        self.query_all(
            "SELECT id, title, description, questions, is_active, created_at, updated_at \
            FROM surveys \
            WHERE is_active = 1 \
            ORDER BY created_at DESC, rowid DESC",
            (),
            read_survey,
        )
        .await
    }

    pub(crate) async fn get_survey(&self, survey_id: &str) -> Result<Option<Survey>, QueryError> {
        let result = self
            .query_row(
                "SELECT id, title, description, questions, is_active, created_at, updated_at \
                FROM surveys \
                WHERE id = :id",
                named_params![":id": survey_id],
            )
            .await;

        match result {
            Ok(row) => read_survey(&row).map(Some),
            Err(StatementError::ExecuteError(libsql::Error::QueryReturnedNoRows)) => Ok(None),
            Err(error) => Err(QueryError::StatementError(error)),
        }
    }

    /// Overwrites the supplied fields in a single statement and returns the updated survey.
    /// The update timestamp always moves forward, even when the clock does not.
    pub(crate) async fn update_survey(
        &self,
        survey_id: &str,
        update: &SurveyUpdate,
        now: OffsetDateTime,
    ) -> Result<Option<Survey>, QueryError> {
        let questions = update.questions.as_ref().map(encode).transpose()?;

        // The connection is shared between requests, so existence is decided by the returned
        // row and not by the connection wide change count
        let result = self
            .query_row(
                "UPDATE surveys SET \
                    title = COALESCE(:title, title),\
                    description = COALESCE(:description, description),\
                    questions = COALESCE(:questions, questions),\
                    is_active = COALESCE(:is_active, is_active),\
                    updated_at = MAX(:updated_at, updated_at + 1) \
                WHERE id = :id \
                RETURNING id, title, description, questions, is_active, created_at, updated_at",
                named_params! {
                    ":id": survey_id,
                    ":title": update.title.clone(),
                    ":description": update.description.clone(),
                    ":questions": questions,
                    ":is_active": update.is_active.map(i64::from),
                    ":updated_at": to_nanos(now),
                },
            )
            .await;

        match result {
            Ok(row) => read_survey(&row).map(Some),
            Err(StatementError::ExecuteError(libsql::Error::QueryReturnedNoRows)) => Ok(None),
            Err(error) => Err(QueryError::StatementError(error)),
        }
    }

    /// Returns the number of deleted surveys, zero if it did not exist
    pub(crate) async fn delete_survey(&self, survey_id: &str) -> Result<usize, QueryError> {
        let deleted = self
            .execute(
                "DELETE FROM surveys WHERE id = :id",
                named_params![":id": survey_id],
            )
            .await?;

        Ok(deleted)
    }

    pub(crate) async fn delete_survey_responses(
        &self,
        survey_id: &str,
    ) -> Result<usize, QueryError> {
        let deleted = self
            .execute(
                "DELETE FROM responses WHERE survey_id = :survey_id",
                named_params![":survey_id": survey_id],
            )
            .await?;

        Ok(deleted)
    }

    pub(crate) async fn insert_response(&self, response: &SurveyResponse) -> Result<(), QueryError> {
        let answers = encode(&response.answers)?;

        self.execute(
            "INSERT INTO responses (id, survey_id, answers, submitted_at) \
            VALUES (:id, :survey_id, :answers, :submitted_at)",
            named_params! {
                ":id": &*response.id,
                ":survey_id": &*response.survey_id,
                ":answers": answers,
                ":submitted_at": to_nanos(response.submitted_at),
            },
        )
        .await?;

        Ok(())
    }

    /// Responses to a survey with the most recently submitted first
    pub(crate) async fn get_survey_responses(
        &self,
        survey_id: &str,
    ) -> Result<Vec<SurveyResponse>, QueryError> {
        self.query_all(
            "SELECT id, survey_id, answers, submitted_at \
            FROM responses \
            WHERE survey_id = :survey_id \
            ORDER BY submitted_at DESC, rowid DESC",
            named_params![":survey_id": survey_id],
            read_response,
        )
        .await
    }

    pub(crate) async fn count_survey_responses(&self, survey_id: &str) -> Result<u64, QueryError> {
        let row = self
            .query_row(
                "SELECT COUNT(*) FROM responses WHERE survey_id = :survey_id",
                named_params![":survey_id": survey_id],
            )
            .await?;

        count(&row)
    }

    pub(crate) async fn get_totals(&self) -> Result<Totals, QueryError> {
        let surveys = self.query_row("SELECT COUNT(*) FROM surveys", ()).await?;
        let active_surveys = self
            .query_row("SELECT COUNT(*) FROM surveys WHERE is_active = 1", ())
            .await?;
        let responses = self.query_row("SELECT COUNT(*) FROM responses", ()).await?;

        Ok(Totals {
            surveys: count(&surveys)?,
            active_surveys: count(&active_surveys)?,
            responses: count(&responses)?,
        })
    }
}

#[cfg(test)]
impl Database {
    pub(crate) async fn memory() -> Database {
        Database::initialize(":memory:", String::new())
            .await
            .expect("Failed to open in memory database")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::Duration;

    use super::*;
    use crate::survey::QuestionType;

    fn survey(title: &str, is_active: bool, created_at: OffsetDateTime) -> Survey {
        Survey {
            id: crate::id::generate(),
            title: title.to_owned(),
            description: None,
            questions: vec![
                Question {
                    id: Some("q1".to_owned()),
                    kind: Some(QuestionType::Rating),
                    question: "How was it?".to_owned(),
                    options: Vec::new(),
                    required: Some(true),
                },
                Question {
                    id: Some("q2".to_owned()),
                    kind: Some(QuestionType::Checkbox),
                    question: "What did you like?".to_owned(),
                    options: vec!["Food".to_owned(), "Music".to_owned()],
                    required: None,
                },
            ],
            is_active,
            created_at,
            updated_at: created_at,
        }
    }

    fn response(survey_id: &str, submitted_at: OffsetDateTime) -> SurveyResponse {
        let mut answers = Answers::new();
        answers.insert("q1".to_owned(), json!(5));
        SurveyResponse {
            id: crate::id::generate(),
            survey_id: survey_id.into(),
            answers,
            submitted_at,
        }
    }

    #[test]
    fn detects_remote_urls() {
        assert!(is_remote("libsql://surveys.turso.io"));
        assert!(is_remote("https://surveys.example.com"));
        assert!(!is_remote("surveyapp.db"));
        assert!(!is_remote(":memory:"));
    }

    #[tokio::test]
    async fn stores_surveys_with_question_order() {
        let database = Database::memory().await;
        let survey = survey("Festival", true, OffsetDateTime::now_utc());
        database.insert_survey(&survey).await.unwrap();

        let stored = database.get_survey(&survey.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Festival");
        assert_eq!(stored.questions, survey.questions);
        assert_eq!(stored.created_at, survey.created_at);

        assert!(database.get_survey("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lists_newest_surveys_first() {
        let database = Database::memory().await;
        let now = OffsetDateTime::now_utc();
        let older = survey("Older", true, now - Duration::minutes(5));
        let newer = survey("Newer", false, now);
        database.insert_survey(&older).await.unwrap();
        database.insert_survey(&newer).await.unwrap();

        let titles: Vec<_> = database
            .get_surveys()
            .await
            .unwrap()
            .into_iter()
            .map(|survey| survey.title)
            .collect();
        assert_eq!(titles, ["Newer", "Older"]);

        let active = database.get_active_surveys().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, older.id);
    }

    #[tokio::test]
    async fn update_keeps_unsupplied_fields() {
        let database = Database::memory().await;
        let created_at = OffsetDateTime::now_utc();
        let survey = survey("Festival", true, created_at);
        database.insert_survey(&survey).await.unwrap();

        let update = SurveyUpdate {
            description: Some("Tell us about the weekend".to_owned()),
            ..Default::default()
        };
        // A clock that did not move still produces a later update timestamp
        let updated = database
            .update_survey(&survey.id, &update, created_at)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, survey.title);
        assert_eq!(updated.questions, survey.questions);
        assert_eq!(updated.description.as_deref(), Some("Tell us about the weekend"));
        assert!(updated.updated_at > survey.updated_at);
        assert_eq!(updated.created_at, survey.created_at);

        let missing = database
            .update_survey("missing", &update, created_at)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_statements_do_not_hide_updated_surveys() {
        let database = Database::memory().await;
        let survey = survey("Festival", true, OffsetDateTime::now_utc());
        database.insert_survey(&survey).await.unwrap();

        let mut tasks = Vec::new();
        for index in 0..2000 {
            let updater = database.clone();
            let survey_id = survey.id.clone();
            tasks.push(tokio::spawn(async move {
                let update = SurveyUpdate {
                    description: Some(format!("Revision {index}")),
                    ..Default::default()
                };
                updater
                    .update_survey(&survey_id, &update, OffsetDateTime::now_utc())
                    .await
                    .unwrap()
                    .is_some()
            }));

            let database = database.clone();
            tasks.push(tokio::spawn(async move {
                database.delete_survey("nonexistent").await.unwrap();
                true
            }));
        }

        let mut missing_updates = 0;
        for task in tasks {
            if !task.await.unwrap() {
                missing_updates += 1;
            }
        }
        assert_eq!(missing_updates, 0);
    }

    #[tokio::test]
    async fn deleting_responses_only_touches_one_survey() {
        let database = Database::memory().await;
        let now = OffsetDateTime::now_utc();
        let kept = survey("Kept", true, now);
        let deleted = survey("Deleted", true, now);
        database.insert_survey(&kept).await.unwrap();
        database.insert_survey(&deleted).await.unwrap();

        for _ in 0..3 {
            database.insert_response(&response(&deleted.id, now)).await.unwrap();
        }
        database.insert_response(&response(&kept.id, now)).await.unwrap();

        assert_eq!(database.delete_survey(&deleted.id).await.unwrap(), 1);
        assert_eq!(database.delete_survey_responses(&deleted.id).await.unwrap(), 3);
        assert_eq!(database.count_survey_responses(&deleted.id).await.unwrap(), 0);
        assert_eq!(database.count_survey_responses(&kept.id).await.unwrap(), 1);
        assert_eq!(database.delete_survey(&deleted.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn responses_are_listed_newest_first() {
        let database = Database::memory().await;
        let now = OffsetDateTime::now_utc();
        let first = response("survey", now - Duration::seconds(10));
        let second = response("survey", now);
        database.insert_response(&first).await.unwrap();
        database.insert_response(&second).await.unwrap();

        let responses = database.get_survey_responses("survey").await.unwrap();
        let ids: Vec<_> = responses.iter().map(|response| response.id.clone()).collect();
        assert_eq!(ids, [second.id, first.id]);
        assert_eq!(responses[0].answers["q1"], json!(5));
    }

    #[tokio::test]
    async fn totals_count_everything() {
        let database = Database::memory().await;
        let now = OffsetDateTime::now_utc();
        database.insert_survey(&survey("A", true, now)).await.unwrap();
        database.insert_survey(&survey("B", false, now)).await.unwrap();
        database.insert_response(&response("orphan", now)).await.unwrap();

        let totals = database.get_totals().await.unwrap();
        assert_eq!(
            totals,
            Totals {
                surveys: 2,
                active_surveys: 1,
                responses: 1,
            }
        );
    }
}

//! PostgreSQL-backed registration store.
//!
//! Each write runs in one transaction: the root row is locked with `SELECT ... FOR UPDATE`,
//! the transition rules are applied in Rust, and the step upsert, root update, and history
//! append commit together. Dropping the transaction on any error rolls everything back.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{debug, info, warn};

use super::domain::{
    CompletedSteps, DocumentUploads, EmploymentInfo, HistoryAction, HistoryEntry,
    NewHistoryEntry, PersonalInfo, Registration, RegistrationAggregate, RegistrationFilter,
    RegistrationId, RegistrationStatus, RegistrationStep, StepRecord, VerificationData,
};
use super::repository::{RegistrationStore, RepositoryError};
use super::transition::TransitionCommand;
use crate::config::DatabaseConfig;

/// Idempotent schema statements, applied in order by [`PgRegistrationStore::migrate`].
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS registrations (
        id BIGSERIAL PRIMARY KEY,
        registration_id TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL DEFAULT 'draft',
        current_step TEXT NOT NULL DEFAULT 'verification',
        completed_steps SMALLINT NOT NULL DEFAULT 0,
        declaration BOOLEAN NOT NULL DEFAULT FALSE,
        review_note TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        submitted_at TIMESTAMPTZ,
        approved_at TIMESTAMPTZ,
        rejected_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS registrations_status_created_idx
        ON registrations (status, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS verification_data (
        id BIGSERIAL PRIMARY KEY,
        registration_id TEXT NOT NULL UNIQUE
            REFERENCES registrations (registration_id) ON DELETE CASCADE,
        bvn TEXT NOT NULL,
        bvn_verified BOOLEAN NOT NULL DEFAULT FALSE,
        nin TEXT NOT NULL,
        nin_verified BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS personal_info (
        id BIGSERIAL PRIMARY KEY,
        registration_id TEXT NOT NULL UNIQUE
            REFERENCES registrations (registration_id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        first_name TEXT NOT NULL,
        middle_name TEXT,
        last_name TEXT NOT NULL,
        date_of_birth DATE NOT NULL,
        gender TEXT NOT NULL,
        marital_status TEXT NOT NULL,
        phone_number TEXT NOT NULL,
        email TEXT NOT NULL,
        residential_address TEXT NOT NULL,
        state_of_origin TEXT NOT NULL,
        local_government_area TEXT NOT NULL,
        next_of_kin_name TEXT NOT NULL,
        next_of_kin_phone TEXT NOT NULL,
        next_of_kin_relationship TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS employment_info (
        id BIGSERIAL PRIMARY KEY,
        registration_id TEXT NOT NULL UNIQUE
            REFERENCES registrations (registration_id) ON DELETE CASCADE,
        ministry TEXT NOT NULL,
        department TEXT NOT NULL,
        designation TEXT NOT NULL,
        grade_level SMALLINT NOT NULL,
        grade_step SMALLINT NOT NULL,
        employment_type TEXT NOT NULL,
        date_of_first_appointment DATE NOT NULL,
        date_of_confirmation DATE,
        salary_structure TEXT NOT NULL,
        bank_name TEXT NOT NULL,
        account_number TEXT NOT NULL,
        pension_administrator TEXT NOT NULL,
        pension_pin TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS document_uploads (
        id BIGSERIAL PRIMARY KEY,
        registration_id TEXT NOT NULL UNIQUE
            REFERENCES registrations (registration_id) ON DELETE CASCADE,
        passport_photograph TEXT NOT NULL,
        birth_certificate TEXT NOT NULL,
        appointment_letter TEXT NOT NULL,
        educational_certificates TEXT[] NOT NULL DEFAULT '{}',
        other_documents TEXT[] NOT NULL DEFAULT '{}',
        upload_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS registration_history (
        id BIGSERIAL PRIMARY KEY,
        registration_id TEXT NOT NULL
            REFERENCES registrations (registration_id) ON DELETE CASCADE,
        action TEXT NOT NULL,
        details TEXT NOT NULL DEFAULT '',
        performed_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS registration_history_registration_idx
        ON registration_history (registration_id, id)
    "#,
];

const REGISTRATION_COLUMNS: &str = "registration_id, status, current_step, completed_steps, \
    declaration, review_note, created_at, updated_at, submitted_at, approved_at, rejected_at";

const VERIFICATION_COLUMNS: &str =
    "registration_id, bvn, bvn_verified, nin, nin_verified, created_at, updated_at";

const PERSONAL_COLUMNS: &str = "registration_id, title, first_name, middle_name, last_name, \
    date_of_birth, gender, marital_status, phone_number, email, residential_address, \
    state_of_origin, local_government_area, next_of_kin_name, next_of_kin_phone, \
    next_of_kin_relationship, created_at, updated_at";

const EMPLOYMENT_COLUMNS: &str = "registration_id, ministry, department, designation, \
    grade_level, grade_step, employment_type, date_of_first_appointment, date_of_confirmation, \
    salary_structure, bank_name, account_number, pension_administrator, pension_pin, \
    created_at, updated_at";

const DOCUMENT_COLUMNS: &str = "registration_id, passport_photograph, birth_certificate, \
    appointment_letter, educational_certificates, other_documents, upload_date, created_at, \
    updated_at";

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return RepositoryError::Conflict;
            }
            if db.is_foreign_key_violation() {
                return RepositoryError::NotFound;
            }
        }

        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                RepositoryError::Unavailable(err.to_string())
            }
            sqlx::Error::RowNotFound => RepositoryError::NoRowReturned("query"),
            other => RepositoryError::Database(other),
        }
    }
}

#[derive(Debug, FromRow)]
struct RegistrationRow {
    registration_id: String,
    status: String,
    current_step: String,
    completed_steps: i16,
    declaration: bool,
    review_note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = RepositoryError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        let status = RegistrationStatus::parse(&row.status)
            .ok_or_else(|| RepositoryError::Corrupt(format!("status '{}'", row.status)))?;
        let current_step = RegistrationStep::parse(&row.current_step).ok_or_else(|| {
            RepositoryError::Corrupt(format!("current_step '{}'", row.current_step))
        })?;

        Ok(Registration {
            registration_id: RegistrationId(row.registration_id),
            status,
            current_step,
            completed_steps: CompletedSteps::from_bits(row.completed_steps),
            declaration: row.declaration,
            review_note: row.review_note,
            created_at: row.created_at,
            updated_at: row.updated_at,
            submitted_at: row.submitted_at,
            approved_at: row.approved_at,
            rejected_at: row.rejected_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: i64,
    registration_id: String,
    action: String,
    details: String,
    performed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = RepositoryError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let action = HistoryAction::parse(&row.action)
            .ok_or_else(|| RepositoryError::Corrupt(format!("history action '{}'", row.action)))?;
        Ok(HistoryEntry {
            id: row.id,
            registration_id: RegistrationId(row.registration_id),
            action,
            details: row.details,
            performed_at: row.performed_at,
        })
    }
}

/// Registration store over a pooled PostgreSQL connection.
#[derive(Clone)]
pub struct PgRegistrationStore {
    pool: PgPool,
}

impl PgRegistrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration. TLS is required when `require_tls` is set.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        let url = config.url.as_deref().ok_or_else(|| {
            RepositoryError::Unavailable("DATABASE_URL is not configured".to_string())
        })?;

        let ssl_mode = if config.require_tls {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        let options = PgConnectOptions::from_str(url)?.ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|err| {
                warn!(error = %err, "failed to connect to registration database");
                RepositoryError::from(err)
            })?;

        info!(
            max_connections = config.max_connections,
            tls_required = config.require_tls,
            "registration database pool ready"
        );
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA.iter().copied() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!(statements = SCHEMA.len(), "registration schema is up to date");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn lock_registration(
    conn: &mut PgConnection,
    registration_id: &RegistrationId,
) -> Result<Registration, RepositoryError> {
    let sql = format!(
        "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE registration_id = $1 FOR UPDATE"
    );
    let row = sqlx::query_as::<_, RegistrationRow>(&sql)
        .bind(registration_id.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    Registration::try_from(row)
}

async fn write_registration(
    conn: &mut PgConnection,
    registration: &Registration,
) -> Result<Registration, RepositoryError> {
    let sql = format!(
        "UPDATE registrations SET status = $2, current_step = $3, completed_steps = $4, \
         declaration = $5, review_note = $6, updated_at = $7, submitted_at = $8, \
         approved_at = $9, rejected_at = $10 \
         WHERE registration_id = $1 RETURNING {REGISTRATION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, RegistrationRow>(&sql)
        .bind(registration.registration_id.as_str())
        .bind(registration.status.label())
        .bind(registration.current_step.label())
        .bind(registration.completed_steps.bits())
        .bind(registration.declaration)
        .bind(registration.review_note.as_deref())
        .bind(registration.updated_at)
        .bind(registration.submitted_at)
        .bind(registration.approved_at)
        .bind(registration.rejected_at)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(RepositoryError::NoRowReturned("update registration"))?;
    Registration::try_from(row)
}

async fn append_history(
    conn: &mut PgConnection,
    registration_id: &RegistrationId,
    entry: &NewHistoryEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO registration_history (registration_id, action, details) VALUES ($1, $2, $3)",
    )
    .bind(registration_id.as_str())
    .bind(entry.action.label())
    .bind(&entry.details)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_step(
    conn: &mut PgConnection,
    record: &StepRecord,
) -> Result<StepRecord, RepositoryError> {
    match record {
        StepRecord::Verification(data) => {
            let sql = format!(
                "INSERT INTO verification_data \
                 (registration_id, bvn, bvn_verified, nin, nin_verified, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $6) \
                 ON CONFLICT (registration_id) DO UPDATE SET \
                 bvn = EXCLUDED.bvn, bvn_verified = EXCLUDED.bvn_verified, \
                 nin = EXCLUDED.nin, nin_verified = EXCLUDED.nin_verified, \
                 updated_at = EXCLUDED.updated_at \
                 RETURNING {VERIFICATION_COLUMNS}"
            );
            let details = &data.details;
            let stored = sqlx::query_as::<_, VerificationData>(&sql)
                .bind(&data.registration_id)
                .bind(&details.bvn)
                .bind(details.bvn_verified)
                .bind(&details.nin)
                .bind(details.nin_verified)
                .bind(data.updated_at)
                .fetch_one(&mut *conn)
                .await?;
            Ok(StepRecord::Verification(stored))
        }
        StepRecord::PersonalInfo(data) => {
            let sql = format!(
                "INSERT INTO personal_info \
                 (registration_id, title, first_name, middle_name, last_name, date_of_birth, \
                  gender, marital_status, phone_number, email, residential_address, \
                  state_of_origin, local_government_area, next_of_kin_name, next_of_kin_phone, \
                  next_of_kin_relationship, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                  $17, $17) \
                 ON CONFLICT (registration_id) DO UPDATE SET \
                 title = EXCLUDED.title, first_name = EXCLUDED.first_name, \
                 middle_name = EXCLUDED.middle_name, last_name = EXCLUDED.last_name, \
                 date_of_birth = EXCLUDED.date_of_birth, gender = EXCLUDED.gender, \
                 marital_status = EXCLUDED.marital_status, phone_number = EXCLUDED.phone_number, \
                 email = EXCLUDED.email, residential_address = EXCLUDED.residential_address, \
                 state_of_origin = EXCLUDED.state_of_origin, \
                 local_government_area = EXCLUDED.local_government_area, \
                 next_of_kin_name = EXCLUDED.next_of_kin_name, \
                 next_of_kin_phone = EXCLUDED.next_of_kin_phone, \
                 next_of_kin_relationship = EXCLUDED.next_of_kin_relationship, \
                 updated_at = EXCLUDED.updated_at \
                 RETURNING {PERSONAL_COLUMNS}"
            );
            let details = &data.details;
            let stored = sqlx::query_as::<_, PersonalInfo>(&sql)
                .bind(&data.registration_id)
                .bind(&details.title)
                .bind(&details.first_name)
                .bind(details.middle_name.as_deref())
                .bind(&details.last_name)
                .bind(details.date_of_birth)
                .bind(&details.gender)
                .bind(&details.marital_status)
                .bind(&details.phone_number)
                .bind(&details.email)
                .bind(&details.residential_address)
                .bind(&details.state_of_origin)
                .bind(&details.local_government_area)
                .bind(&details.next_of_kin_name)
                .bind(&details.next_of_kin_phone)
                .bind(&details.next_of_kin_relationship)
                .bind(data.updated_at)
                .fetch_one(&mut *conn)
                .await?;
            Ok(StepRecord::PersonalInfo(stored))
        }
        StepRecord::EmploymentInfo(data) => {
            let sql = format!(
                "INSERT INTO employment_info \
                 (registration_id, ministry, department, designation, grade_level, grade_step, \
                  employment_type, date_of_first_appointment, date_of_confirmation, \
                  salary_structure, bank_name, account_number, pension_administrator, \
                  pension_pin, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15) \
                 ON CONFLICT (registration_id) DO UPDATE SET \
                 ministry = EXCLUDED.ministry, department = EXCLUDED.department, \
                 designation = EXCLUDED.designation, grade_level = EXCLUDED.grade_level, \
                 grade_step = EXCLUDED.grade_step, employment_type = EXCLUDED.employment_type, \
                 date_of_first_appointment = EXCLUDED.date_of_first_appointment, \
                 date_of_confirmation = EXCLUDED.date_of_confirmation, \
                 salary_structure = EXCLUDED.salary_structure, bank_name = EXCLUDED.bank_name, \
                 account_number = EXCLUDED.account_number, \
                 pension_administrator = EXCLUDED.pension_administrator, \
                 pension_pin = EXCLUDED.pension_pin, updated_at = EXCLUDED.updated_at \
                 RETURNING {EMPLOYMENT_COLUMNS}"
            );
            let details = &data.details;
            let stored = sqlx::query_as::<_, EmploymentInfo>(&sql)
                .bind(&data.registration_id)
                .bind(&details.ministry)
                .bind(&details.department)
                .bind(&details.designation)
                .bind(details.grade_level)
                .bind(details.grade_step)
                .bind(&details.employment_type)
                .bind(details.date_of_first_appointment)
                .bind(details.date_of_confirmation)
                .bind(&details.salary_structure)
                .bind(&details.bank_name)
                .bind(&details.account_number)
                .bind(&details.pension_administrator)
                .bind(details.pension_pin.as_deref())
                .bind(data.updated_at)
                .fetch_one(&mut *conn)
                .await?;
            Ok(StepRecord::EmploymentInfo(stored))
        }
        StepRecord::Documents(data) => {
            let sql = format!(
                "INSERT INTO document_uploads \
                 (registration_id, passport_photograph, birth_certificate, appointment_letter, \
                  educational_certificates, other_documents, upload_date, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
                 ON CONFLICT (registration_id) DO UPDATE SET \
                 passport_photograph = EXCLUDED.passport_photograph, \
                 birth_certificate = EXCLUDED.birth_certificate, \
                 appointment_letter = EXCLUDED.appointment_letter, \
                 educational_certificates = EXCLUDED.educational_certificates, \
                 other_documents = EXCLUDED.other_documents, \
                 upload_date = EXCLUDED.upload_date, updated_at = EXCLUDED.updated_at \
                 RETURNING {DOCUMENT_COLUMNS}"
            );
            let documents = &data.documents;
            let stored = sqlx::query_as::<_, DocumentUploads>(&sql)
                .bind(&data.registration_id)
                .bind(&documents.passport_photograph)
                .bind(&documents.birth_certificate)
                .bind(&documents.appointment_letter)
                .bind(&documents.educational_certificates)
                .bind(&documents.other_documents)
                .bind(data.upload_date)
                .bind(data.updated_at)
                .fetch_one(&mut *conn)
                .await?;
            Ok(StepRecord::Documents(stored))
        }
    }
}

async fn fetch_section<T>(
    conn: &mut PgConnection,
    table: &str,
    columns: &str,
    registration_id: &RegistrationId,
) -> Result<Option<T>, RepositoryError>
where
    T: for<'r> FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
{
    let sql = format!("SELECT {columns} FROM {table} WHERE registration_id = $1");
    let row = sqlx::query_as::<_, T>(&sql)
        .bind(registration_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

async fn fetch_history(
    conn: &mut PgConnection,
    registration_id: &RegistrationId,
) -> Result<Vec<HistoryEntry>, RepositoryError> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        "SELECT id, registration_id, action, details, performed_at \
         FROM registration_history WHERE registration_id = $1 ORDER BY id",
    )
    .bind(registration_id.as_str())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(HistoryEntry::try_from).collect()
}

#[async_trait]
impl RegistrationStore for PgRegistrationStore {
    async fn insert_registration(
        &self,
        registration: &Registration,
        history: &NewHistoryEntry,
    ) -> Result<Registration, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let sql = format!(
            "INSERT INTO registrations \
             (registration_id, status, current_step, completed_steps, declaration, created_at, \
              updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {REGISTRATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(registration.registration_id.as_str())
            .bind(registration.status.label())
            .bind(registration.current_step.label())
            .bind(registration.completed_steps.bits())
            .bind(registration.declaration)
            .bind(registration.created_at)
            .bind(registration.updated_at)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepositoryError::NoRowReturned("insert registration"))?;
        let stored = Registration::try_from(row)?;

        append_history(&mut tx, &stored.registration_id, history).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn save_step(
        &self,
        record: StepRecord,
        command: &TransitionCommand,
    ) -> Result<(StepRecord, Registration), RepositoryError> {
        let registration_id = record.registration_id().clone();
        let mut tx = self.pool.begin().await?;

        let current = lock_registration(&mut tx, &registration_id).await?;
        let updated = command.apply(&current)?;
        let stored = upsert_step(&mut tx, &record).await?;
        let registration = write_registration(&mut tx, &updated).await?;
        append_history(&mut tx, &registration_id, &command.history).await?;

        tx.commit().await?;
        debug!(
            registration_id = %registration_id,
            step = %stored.kind(),
            current_step = %registration.current_step,
            "step committed"
        );
        Ok((stored, registration))
    }

    async fn transition(
        &self,
        registration_id: &RegistrationId,
        command: &TransitionCommand,
    ) -> Result<Registration, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = lock_registration(&mut tx, registration_id).await?;
        let updated = command.apply(&current)?;
        let registration = write_registration(&mut tx, &updated).await?;
        append_history(&mut tx, registration_id, &command.history).await?;

        tx.commit().await?;
        Ok(registration)
    }

    async fn fetch_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Option<Registration>, RepositoryError> {
        let sql =
            format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE registration_id = $1");
        let row = sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(registration_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Registration::try_from).transpose()
    }

    async fn fetch_aggregate(
        &self,
        registration_id: &RegistrationId,
        include_history: bool,
    ) -> Result<RegistrationAggregate, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let sql =
            format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE registration_id = $1");
        let registration = sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(registration_id.as_str())
            .fetch_optional(&mut *tx)
            .await?
            .map(Registration::try_from)
            .transpose()?;

        let Some(registration) = registration else {
            tx.commit().await?;
            return Ok(RegistrationAggregate::default());
        };

        let verification = fetch_section::<VerificationData>(
            &mut tx,
            "verification_data",
            VERIFICATION_COLUMNS,
            registration_id,
        )
        .await?;
        let personal_info = fetch_section::<PersonalInfo>(
            &mut tx,
            "personal_info",
            PERSONAL_COLUMNS,
            registration_id,
        )
        .await?;
        let employment_info = fetch_section::<EmploymentInfo>(
            &mut tx,
            "employment_info",
            EMPLOYMENT_COLUMNS,
            registration_id,
        )
        .await?;
        let documents = fetch_section::<DocumentUploads>(
            &mut tx,
            "document_uploads",
            DOCUMENT_COLUMNS,
            registration_id,
        )
        .await?;
        let history = if include_history {
            Some(fetch_history(&mut tx, registration_id).await?)
        } else {
            None
        };
        tx.commit().await?;

        Ok(RegistrationAggregate {
            registration: Some(registration),
            verification,
            personal_info,
            employment_info,
            documents,
            history,
        })
    }

    async fn history(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_history(&mut conn, registration_id).await
    }

    async fn list(&self, filter: &RegistrationFilter) -> Result<Vec<Registration>, RepositoryError> {
        let sql = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations \
             WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY created_at DESC, registration_id DESC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(filter.status.map(RegistrationStatus::label))
            .bind(filter.effective_limit() as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Registration::try_from).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("registration database pool closed");
    }
}

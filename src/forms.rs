//! Write paths behind the CRUD subcommands.
//!
//! Each input is a clap `Args` struct so the command line maps straight onto
//! it. `validate` trims text, strips masks and rejects incomplete records
//! before anything reaches the database.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::Args;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::format::unformat;
use crate::models::{Course, Enrollment, EnrollmentStatus, HealthRecordType, Shift, Student};
use crate::session::AuthSession;

const CPF_DIGITS: usize = 11;

fn required(value: &str, field: &str) -> anyhow::Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{field} is required");
    }
    Ok(trimmed.to_string())
}

/// Trims entries, drops blanks and repeated values. First occurrence wins.
pub fn clean_list(values: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !cleaned.iter().any(|v| v == value) {
            cleaned.push(value.to_string());
        }
    }
    cleaned
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct StudentInput {
    #[arg(long = "name")]
    pub full_name: String,
    #[arg(long)]
    pub birth_date: NaiveDate,
    #[arg(long)]
    pub cpf: String,
    #[arg(long)]
    pub phone: String,
    #[arg(long)]
    pub address: String,
    #[arg(long, default_value = "")]
    pub nis: String,
    #[arg(long, default_value = "")]
    pub email: String,
}

impl StudentInput {
    pub fn validate(self, today: NaiveDate) -> anyhow::Result<Self> {
        let cpf = unformat(&self.cpf);
        if cpf.len() != CPF_DIGITS {
            bail!("CPF must have {CPF_DIGITS} digits, got {}", cpf.len());
        }
        let phone = unformat(&self.phone);
        if !(10..=11).contains(&phone.len()) {
            bail!("phone must have 10 or 11 digits, got {}", phone.len());
        }
        if self.birth_date > today {
            bail!("birth date {} is in the future", self.birth_date);
        }
        let email = self.email.trim().to_string();
        if !email.is_empty() && !email.contains('@') {
            bail!("invalid e-mail: {email}");
        }

        Ok(Self {
            full_name: required(&self.full_name, "full name")?,
            birth_date: self.birth_date,
            cpf,
            phone,
            address: required(&self.address, "address")?,
            nis: unformat(&self.nis),
            email,
        })
    }
}

/// Fields to change on an existing student; unset ones keep their value.
#[derive(Debug, Clone, Default, Args)]
pub struct StudentChanges {
    #[arg(long = "name")]
    pub full_name: Option<String>,
    #[arg(long)]
    pub birth_date: Option<NaiveDate>,
    #[arg(long)]
    pub cpf: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub nis: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
}

impl StudentChanges {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.birth_date.is_none()
            && self.cpf.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.nis.is_none()
            && self.email.is_none()
    }

    pub fn apply(self, current: &Student) -> StudentInput {
        StudentInput {
            full_name: self.full_name.unwrap_or_else(|| current.full_name.clone()),
            birth_date: self.birth_date.unwrap_or(current.birth_date),
            cpf: self.cpf.unwrap_or_else(|| current.cpf.clone()),
            phone: self.phone.unwrap_or_else(|| current.phone.clone()),
            address: self.address.unwrap_or_else(|| current.address.clone()),
            nis: self.nis.unwrap_or_else(|| current.nis.clone()),
            email: self.email.unwrap_or_else(|| current.email.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct CourseInput {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub workload_hours: i32,
    #[arg(long)]
    pub shift: Shift,
    #[arg(long)]
    pub available_spots: i32,
    #[arg(long)]
    pub executive_manager: String,
    #[arg(long, default_value = "")]
    pub description: String,
}

impl CourseInput {
    pub fn validate(self) -> anyhow::Result<Self> {
        if self.workload_hours <= 0 {
            bail!("workload must be positive, got {}h", self.workload_hours);
        }
        if self.available_spots < 0 {
            bail!("available spots cannot be negative, got {}", self.available_spots);
        }

        Ok(Self {
            name: required(&self.name, "course name")?,
            workload_hours: self.workload_hours,
            shift: self.shift,
            available_spots: self.available_spots,
            executive_manager: required(&self.executive_manager, "executive manager")?,
            description: self.description.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct CourseChanges {
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub workload_hours: Option<i32>,
    #[arg(long)]
    pub shift: Option<Shift>,
    #[arg(long)]
    pub available_spots: Option<i32>,
    #[arg(long)]
    pub executive_manager: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

impl CourseChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.workload_hours.is_none()
            && self.shift.is_none()
            && self.available_spots.is_none()
            && self.executive_manager.is_none()
            && self.description.is_none()
    }

    pub fn apply(self, current: &Course) -> CourseInput {
        CourseInput {
            name: self.name.unwrap_or_else(|| current.name.clone()),
            workload_hours: self.workload_hours.unwrap_or(current.workload_hours),
            shift: self.shift.unwrap_or(current.shift),
            available_spots: self.available_spots.unwrap_or(current.available_spots),
            executive_manager: self
                .executive_manager
                .unwrap_or_else(|| current.executive_manager.clone()),
            description: self.description.unwrap_or_else(|| current.description.clone()),
        }
    }
}

/// Fails when `student_id` already holds an enrollment, in any status, among `enrollments`.
pub fn ensure_not_enrolled(enrollments: &[Enrollment], student_id: Uuid) -> anyhow::Result<()> {
    if let Some(existing) = enrollments.iter().find(|e| e.student_id == student_id) {
        bail!(
            "{} is already enrolled in {} ({})",
            existing.student_name,
            existing.course_name,
            existing.status.label()
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Args)]
pub struct SocialInput {
    #[arg(long = "student")]
    pub student_id: Uuid,
    /// Identified need, repeatable
    #[arg(long = "need")]
    pub needs: Vec<String>,
    /// Service the family was referred to, repeatable
    #[arg(long = "referral")]
    pub referrals: Vec<String>,
    #[arg(long, default_value = "")]
    pub notes: String,
    /// Defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

impl SocialInput {
    pub fn validate(self) -> anyhow::Result<Self> {
        let needs = clean_list(&self.needs);
        if needs.is_empty() {
            bail!("at least one identified need is required");
        }
        Ok(Self {
            needs,
            referrals: clean_list(&self.referrals),
            notes: self.notes.trim().to_string(),
            ..self
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct HealthInput {
    #[arg(long = "student")]
    pub student_id: Uuid,
    #[arg(long = "type")]
    pub record_type: HealthRecordType,
    #[arg(long = "professional")]
    pub professional_name: String,
    #[arg(long, default_value = "")]
    pub notes: String,
    /// Defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

impl HealthInput {
    pub fn validate(self) -> anyhow::Result<Self> {
        Ok(Self {
            professional_name: required(&self.professional_name, "professional name")?,
            notes: self.notes.trim().to_string(),
            ..self
        })
    }
}

pub async fn create_student(
    pool: &PgPool,
    session: &AuthSession,
    input: StudentInput,
    today: NaiveDate,
) -> anyhow::Result<Uuid> {
    session.require(session.can_manage_registry(), "student registry")?;
    let input = input.validate(today)?;
    let id = db::insert_student(pool, &input, today).await?;
    info!(user = session.display_name(), user_id = %session.user_id, %id, "student created");
    Ok(id)
}

pub async fn update_student(
    pool: &PgPool,
    session: &AuthSession,
    id: Uuid,
    changes: StudentChanges,
    today: NaiveDate,
) -> anyhow::Result<()> {
    session.require(session.can_manage_registry(), "student registry")?;
    if changes.is_empty() {
        bail!("nothing to update for student {id}");
    }
    let current = db::fetch_student(pool, id).await?;
    let input = changes.apply(&current).validate(today)?;
    db::update_student(pool, id, &input, today).await?;
    info!(user = session.display_name(), user_id = %session.user_id, %id, "student updated");
    Ok(())
}

pub async fn delete_student(pool: &PgPool, session: &AuthSession, id: Uuid) -> anyhow::Result<()> {
    session.require(session.can_manage_registry(), "student registry")?;
    db::delete_student(pool, id).await?;
    info!(user = session.display_name(), user_id = %session.user_id, %id, "student deleted");
    Ok(())
}

pub async fn create_course(
    pool: &PgPool,
    session: &AuthSession,
    input: CourseInput,
) -> anyhow::Result<Uuid> {
    session.require(session.can_manage_registry(), "course registry")?;
    let input = input.validate()?;
    let id = db::insert_course(pool, &input).await?;
    info!(user = session.display_name(), user_id = %session.user_id, %id, "course created");
    Ok(id)
}

pub async fn update_course(
    pool: &PgPool,
    session: &AuthSession,
    id: Uuid,
    changes: CourseChanges,
) -> anyhow::Result<()> {
    session.require(session.can_manage_registry(), "course registry")?;
    if changes.is_empty() {
        bail!("nothing to update for course {id}");
    }
    let current = db::fetch_course(pool, id).await?;
    let input = changes.apply(&current).validate()?;
    db::update_course(pool, id, &input).await?;
    info!(user = session.display_name(), user_id = %session.user_id, %id, "course updated");
    Ok(())
}

pub async fn delete_course(pool: &PgPool, session: &AuthSession, id: Uuid) -> anyhow::Result<()> {
    session.require(session.can_manage_registry(), "course registry")?;
    db::delete_course(pool, id).await?;
    info!(user = session.display_name(), user_id = %session.user_id, %id, "course deleted");
    Ok(())
}

pub async fn enroll(
    pool: &PgPool,
    session: &AuthSession,
    student_id: Uuid,
    course_id: Uuid,
    date: NaiveDate,
) -> anyhow::Result<Uuid> {
    session.require(session.can_manage_registry(), "enrollments")?;
    let existing = db::fetch_enrollments(pool, Some(course_id), None).await?;
    ensure_not_enrolled(&existing, student_id)?;

    let id = db::insert_enrollment(pool, student_id, course_id, date)
        .await
        .with_context(|| format!("failed to enroll student {student_id} in course {course_id}"))?;
    info!(
        user = session.display_name(),
        user_id = %session.user_id,
        %student_id,
        %course_id,
        "student enrolled"
    );
    Ok(id)
}

pub async fn lock_enrollment(pool: &PgPool, session: &AuthSession, id: Uuid) -> anyhow::Result<()> {
    session.require(session.can_manage_registry(), "enrollments")?;
    db::set_enrollment_status(pool, id, EnrollmentStatus::Locked).await?;
    info!(user = session.display_name(), user_id = %session.user_id, %id, "enrollment locked");
    Ok(())
}

pub async fn create_social_record(
    pool: &PgPool,
    session: &AuthSession,
    input: SocialInput,
    today: NaiveDate,
) -> anyhow::Result<Uuid> {
    session.require(session.can_view_social(), "social assistance records")?;
    let input = input.validate()?;
    let date = input.date.unwrap_or(today);
    let id = db::insert_social_record(
        pool,
        input.student_id,
        date,
        &input.needs,
        &input.referrals,
        &input.notes,
    )
    .await?;
    info!(
        user = session.display_name(),
        user_id = %session.user_id,
        %id,
        needs = input.needs.len(),
        "social assistance recorded"
    );
    Ok(id)
}

pub async fn create_health_record(
    pool: &PgPool,
    session: &AuthSession,
    input: HealthInput,
    today: NaiveDate,
) -> anyhow::Result<Uuid> {
    session.require(session.can_view_health(), "health records")?;
    let input = input.validate()?;
    let date = input.date.unwrap_or(today);
    let id = db::insert_health_record(
        pool,
        input.student_id,
        input.record_type,
        date,
        &input.professional_name,
        &input.notes,
    )
    .await?;
    info!(
        user = session.display_name(),
        user_id = %session.user_id,
        %id,
        record_type = input.record_type.as_str(),
        "health record created"
    );
    Ok(id)
}

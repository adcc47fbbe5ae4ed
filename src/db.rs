use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::format::{age_on, format_cpf, unformat};
use crate::forms::{CourseInput, StudentInput};
use crate::models::{
    Activity, AttendanceEntry, AttendanceMark, Course, Enrollment, EnrollmentStatus,
    HealthRecord, HealthRecordType, SocialAssistanceRecord, Student,
};

const STUDENT_COLUMNS: &str = "id, full_name, birth_date, age, cpf, nis, phone, email, address";
const COURSE_COLUMNS: &str =
    "id, name, description, workload_hours, shift, available_spots, executive_manager";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool, today: NaiveDate) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("5b1f3c8e-1d2a-4f6b-9c7e-2a4d6f8b0c11")?,
            "Ana Clara Souza",
            NaiveDate::from_ymd_opt(2014, 3, 12).context("invalid date")?,
            "12345678901",
            "11987654321",
        ),
        (
            Uuid::parse_str("7c2e4d9f-3b5a-4e8c-8d1f-4b6e8a0c2d22")?,
            "Bruno Henrique Lima",
            NaiveDate::from_ymd_opt(2010, 9, 30).context("invalid date")?,
            "23456789012",
            "1134567890",
        ),
        (
            Uuid::parse_str("9d3f5e0a-4c6b-4f9d-9e2a-5c7f9b1d3e33")?,
            "Carla Mendes",
            NaiveDate::from_ymd_opt(2006, 1, 5).context("invalid date")?,
            "34567890123",
            "11912345678",
        ),
    ];

    for &(id, name, birth_date, cpf, phone) in &students {
        sqlx::query(
            r#"
            INSERT INTO ong.students (id, full_name, birth_date, age, cpf, phone)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (cpf) DO UPDATE
            SET full_name = EXCLUDED.full_name, age = EXCLUDED.age, updated_at = now()
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(birth_date)
        .bind(age_on(birth_date, today))
        .bind(cpf)
        .bind(phone)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        (
            Uuid::parse_str("1a2b3c4d-5e6f-4a7b-8c9d-0e1f2a3b4c55")?,
            "Informática Básica",
            "Introdução ao computador, internet e pacote de escritório",
            60,
            "morning",
            20,
        ),
        (
            Uuid::parse_str("2b3c4d5e-6f7a-4b8c-9d0e-1f2a3b4c5d66")?,
            "Violão",
            "Iniciação musical com violão popular",
            40,
            "afternoon",
            12,
        ),
    ];

    for &(id, name, description, workload_hours, shift, spots) in &courses {
        sqlx::query(
            r#"
            INSERT INTO ong.courses (id, name, description, workload_hours, shift, available_spots)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(workload_hours)
        .bind(shift)
        .bind(spots)
        .execute(pool)
        .await?;
    }

    let (informatica, violao) = (courses[0].0, courses[1].0);
    let enrollments = vec![
        (students[0].0, informatica, "active"),
        (students[1].0, informatica, "active"),
        (students[2].0, informatica, "completed"),
        (students[1].0, violao, "active"),
        (students[2].0, violao, "locked"),
    ];

    for (student_id, course_id, status) in enrollments {
        let enrollment_id: Uuid = sqlx::query(
            r#"
            INSERT INTO ong.enrollments (id, student_id, course_id, enrollment_date, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, course_id) DO UPDATE SET status = EXCLUDED.status
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(course_id)
        .bind(today)
        .bind(status)
        .fetch_one(pool)
        .await?
        .try_get("id")?;

        if status == "active" {
            sqlx::query(
                r#"
                INSERT INTO ong.attendance_students (id, enrollment_id, date, status)
                VALUES ($1, $2, $3, 'present')
                ON CONFLICT (enrollment_id, date) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(enrollment_id)
            .bind(today)
            .execute(pool)
            .await?;
        }
    }

    sqlx::query(
        r#"
        INSERT INTO ong.social_assistance_records (id, student_id, date, identified_needs, referrals, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("3c4d5e6f-7a8b-4c9d-8e0f-2a3b4c5d6e77")?)
    .bind(students[1].0)
    .bind(today)
    .bind(vec!["Alimentação".to_string(), "Transporte".to_string()])
    .bind(vec!["CRAS".to_string()])
    .bind("Família solicitou apoio com passe escolar")
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO ong.health_records (id, student_id, record_type, date, professional_name, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(Uuid::parse_str("4d5e6f7a-8b9c-4d0e-9f1a-3b4c5d6e7f88")?)
    .bind(students[0].0)
    .bind("dental")
    .bind(today)
    .bind("Dra. Paula Ramos")
    .bind("Avaliação odontológica de rotina")
    .execute(pool)
    .await?;

    info!(
        students = students.len(),
        courses = courses.len(),
        "seed data upserted"
    );
    Ok(())
}

fn student_from_row(row: &PgRow) -> anyhow::Result<Student> {
    Ok(Student {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        birth_date: row.try_get("birth_date")?,
        age: row.try_get("age")?,
        cpf: row.try_get("cpf")?,
        nis: row.try_get("nis")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        address: row.try_get("address")?,
    })
}

pub async fn fetch_students(pool: &PgPool) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query(&format!(
        "SELECT {STUDENT_COLUMNS} FROM ong.students ORDER BY full_name"
    ))
    .fetch_all(pool)
    .await
    .context("failed to load students")?;

    rows.iter().map(student_from_row).collect()
}

pub async fn fetch_student(pool: &PgPool, id: Uuid) -> anyhow::Result<Student> {
    let row = sqlx::query(&format!("SELECT {STUDENT_COLUMNS} FROM ong.students WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to load student")?
        .with_context(|| format!("student {id} not found"))?;

    student_from_row(&row)
}

fn course_from_row(row: &PgRow) -> anyhow::Result<Course> {
    Ok(Course {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        workload_hours: row.try_get("workload_hours")?,
        shift: row.try_get::<String, _>("shift")?.parse()?,
        available_spots: row.try_get("available_spots")?,
        executive_manager: row.try_get("executive_manager")?,
    })
}

pub async fn fetch_courses(pool: &PgPool) -> anyhow::Result<Vec<Course>> {
    let rows = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM ong.courses ORDER BY name"))
        .fetch_all(pool)
        .await
        .context("failed to load courses")?;

    rows.iter().map(course_from_row).collect()
}

pub async fn fetch_course(pool: &PgPool, id: Uuid) -> anyhow::Result<Course> {
    let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM ong.courses WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to load course")?
        .with_context(|| format!("course {id} not found"))?;

    course_from_row(&row)
}

pub async fn fetch_enrollments(
    pool: &PgPool,
    course_id: Option<Uuid>,
    status: Option<EnrollmentStatus>,
) -> anyhow::Result<Vec<Enrollment>> {
    let mut query = String::from(
        "SELECT e.id, e.student_id, st.full_name AS student_name, e.course_id, \
         c.name AS course_name, e.enrollment_date, e.status \
         FROM ong.enrollments e \
         JOIN ong.students st ON st.id = e.student_id \
         JOIN ong.courses c ON c.id = e.course_id \
         WHERE TRUE",
    );

    let mut position = 0;
    if course_id.is_some() {
        position += 1;
        query.push_str(&format!(" AND e.course_id = ${position}"));
    }
    if status.is_some() {
        position += 1;
        query.push_str(&format!(" AND e.status = ${position}"));
    }
    query.push_str(" ORDER BY c.name, st.full_name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = course_id {
        rows = rows.bind(value);
    }
    if let Some(value) = status {
        rows = rows.bind(value.as_str());
    }

    let records = rows
        .fetch_all(pool)
        .await
        .context("failed to load enrollments")?;
    let mut enrollments = Vec::with_capacity(records.len());

    for row in records {
        enrollments.push(Enrollment {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            student_name: row.try_get("student_name")?,
            course_id: row.try_get("course_id")?,
            course_name: row.try_get("course_name")?,
            enrollment_date: row.try_get("enrollment_date")?,
            status: row.try_get::<String, _>("status")?.parse()?,
        });
    }

    Ok(enrollments)
}

pub async fn fetch_attendance(
    pool: &PgPool,
    since: Option<NaiveDate>,
) -> anyhow::Result<Vec<AttendanceEntry>> {
    let mut query = String::from(
        "SELECT a.id, a.enrollment_id, st.full_name AS student_name, c.id AS course_id, \
         c.name AS course_name, a.date, a.status, a.absence_reason \
         FROM ong.attendance_students a \
         JOIN ong.enrollments e ON e.id = a.enrollment_id \
         JOIN ong.students st ON st.id = e.student_id \
         JOIN ong.courses c ON c.id = e.course_id",
    );
    if since.is_some() {
        query.push_str(" WHERE a.date >= $1");
    }
    query.push_str(" ORDER BY a.date DESC, c.name, st.full_name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = since {
        rows = rows.bind(value);
    }

    let records = rows
        .fetch_all(pool)
        .await
        .context("failed to load attendance")?;
    let mut entries = Vec::with_capacity(records.len());

    for row in records {
        entries.push(AttendanceEntry {
            id: row.try_get("id")?,
            enrollment_id: row.try_get("enrollment_id")?,
            student_name: row.try_get("student_name")?,
            course_id: row.try_get("course_id")?,
            course_name: row.try_get("course_name")?,
            date: row.try_get("date")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            absence_reason: row.try_get("absence_reason")?,
        });
    }

    Ok(entries)
}

pub async fn fetch_social_records(pool: &PgPool) -> anyhow::Result<Vec<SocialAssistanceRecord>> {
    let rows = sqlx::query(
        "SELECT s.id, s.student_id, st.full_name AS student_name, s.date, \
         s.identified_needs, s.referrals, s.notes \
         FROM ong.social_assistance_records s \
         JOIN ong.students st ON st.id = s.student_id \
         ORDER BY s.date DESC",
    )
    .fetch_all(pool)
    .await
    .context("failed to load social assistance records")?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(SocialAssistanceRecord {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            student_name: row.try_get("student_name")?,
            date: row.try_get("date")?,
            identified_needs: row.try_get("identified_needs")?,
            referrals: row.try_get("referrals")?,
            notes: row.try_get("notes")?,
        });
    }

    Ok(records)
}

pub async fn fetch_health_records(pool: &PgPool) -> anyhow::Result<Vec<HealthRecord>> {
    let rows = sqlx::query(
        "SELECT h.id, h.student_id, st.full_name AS student_name, h.record_type, h.date, \
         h.professional_name, h.notes \
         FROM ong.health_records h \
         JOIN ong.students st ON st.id = h.student_id \
         ORDER BY h.date DESC",
    )
    .fetch_all(pool)
    .await
    .context("failed to load health records")?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(HealthRecord {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            student_name: row.try_get("student_name")?,
            record_type: row.try_get::<String, _>("record_type")?.parse()?,
            date: row.try_get("date")?,
            professional_name: row.try_get("professional_name")?,
            notes: row.try_get("notes")?,
        });
    }

    Ok(records)
}

/// Upserts one mark per enrollment for `date`. Returns the number of rows written.
pub async fn record_attendance(
    pool: &PgPool,
    date: NaiveDate,
    marks: &[AttendanceMark],
) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;
    let mut written = 0usize;

    for mark in marks {
        let result = sqlx::query(
            r#"
            INSERT INTO ong.attendance_students (id, enrollment_id, date, status, absence_reason)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (enrollment_id, date) DO UPDATE
            SET status = EXCLUDED.status, absence_reason = EXCLUDED.absence_reason, updated_at = now()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(mark.enrollment_id)
        .bind(date)
        .bind(mark.status.as_str())
        .bind(mark.absence_reason.as_deref())
        .execute(&mut *tx)
        .await?;

        written += result.rows_affected() as usize;
    }

    tx.commit().await?;
    debug!(%date, written, "attendance saved");
    Ok(written)
}

fn ensure_found(result: PgQueryResult, what: &str, id: Uuid) -> anyhow::Result<()> {
    if result.rows_affected() == 0 {
        anyhow::bail!("{what} {id} not found");
    }
    Ok(())
}

pub async fn insert_student(
    pool: &PgPool,
    student: &StudentInput,
    today: NaiveDate,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO ong.students
        (id, full_name, birth_date, age, cpf, nis, phone, email, address)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(&student.full_name)
    .bind(student.birth_date)
    .bind(age_on(student.birth_date, today))
    .bind(&student.cpf)
    .bind(&student.nis)
    .bind(&student.phone)
    .bind(&student.email)
    .bind(&student.address)
    .execute(pool)
    .await
    .with_context(|| format!("failed to save student with CPF {}", format_cpf(&student.cpf)))?;

    Ok(id)
}

pub async fn update_student(
    pool: &PgPool,
    id: Uuid,
    student: &StudentInput,
    today: NaiveDate,
) -> anyhow::Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE ong.students
        SET full_name = $2, birth_date = $3, age = $4, cpf = $5, nis = $6,
            phone = $7, email = $8, address = $9, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&student.full_name)
    .bind(student.birth_date)
    .bind(age_on(student.birth_date, today))
    .bind(&student.cpf)
    .bind(&student.nis)
    .bind(&student.phone)
    .bind(&student.email)
    .bind(&student.address)
    .execute(pool)
    .await
    .context("failed to update student")?;

    ensure_found(result, "student", id)
}

/// Enrollments, attendance and records go with the student.
pub async fn delete_student(pool: &PgPool, id: Uuid) -> anyhow::Result<()> {
    let result = sqlx::query("DELETE FROM ong.students WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete student")?;

    ensure_found(result, "student", id)
}

pub async fn insert_course(pool: &PgPool, course: &CourseInput) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO ong.courses
        (id, name, description, workload_hours, shift, available_spots, executive_manager)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(&course.name)
    .bind(&course.description)
    .bind(course.workload_hours)
    .bind(course.shift.as_str())
    .bind(course.available_spots)
    .bind(&course.executive_manager)
    .execute(pool)
    .await
    .with_context(|| format!("failed to save course {}", course.name))?;

    Ok(id)
}

pub async fn update_course(pool: &PgPool, id: Uuid, course: &CourseInput) -> anyhow::Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE ong.courses
        SET name = $2, description = $3, workload_hours = $4, shift = $5,
            available_spots = $6, executive_manager = $7, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&course.name)
    .bind(&course.description)
    .bind(course.workload_hours)
    .bind(course.shift.as_str())
    .bind(course.available_spots)
    .bind(&course.executive_manager)
    .execute(pool)
    .await
    .context("failed to update course")?;

    ensure_found(result, "course", id)
}

pub async fn delete_course(pool: &PgPool, id: Uuid) -> anyhow::Result<()> {
    let result = sqlx::query("DELETE FROM ong.courses WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete course")?;

    ensure_found(result, "course", id)
}

pub async fn insert_enrollment(
    pool: &PgPool,
    student_id: Uuid,
    course_id: Uuid,
    date: NaiveDate,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO ong.enrollments (id, student_id, course_id, enrollment_date, status)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(student_id)
    .bind(course_id)
    .bind(date)
    .bind(EnrollmentStatus::Active.as_str())
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn set_enrollment_status(
    pool: &PgPool,
    id: Uuid,
    status: EnrollmentStatus,
) -> anyhow::Result<()> {
    let result = sqlx::query(
        "UPDATE ong.enrollments SET status = $2, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(status.as_str())
    .execute(pool)
    .await
    .context("failed to update enrollment")?;

    ensure_found(result, "enrollment", id)
}

pub async fn insert_social_record(
    pool: &PgPool,
    student_id: Uuid,
    date: NaiveDate,
    needs: &[String],
    referrals: &[String],
    notes: &str,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO ong.social_assistance_records
        (id, student_id, date, identified_needs, referrals, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(student_id)
    .bind(date)
    .bind(needs)
    .bind(referrals)
    .bind(notes)
    .execute(pool)
    .await
    .with_context(|| format!("failed to save social assistance for student {student_id}"))?;

    Ok(id)
}

pub async fn insert_health_record(
    pool: &PgPool,
    student_id: Uuid,
    record_type: HealthRecordType,
    date: NaiveDate,
    professional_name: &str,
    notes: &str,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO ong.health_records
        (id, student_id, record_type, date, professional_name, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(student_id)
    .bind(record_type.as_str())
    .bind(date)
    .bind(professional_name)
    .bind(notes)
    .execute(pool)
    .await
    .with_context(|| format!("failed to save health record for student {student_id}"))?;

    Ok(id)
}

/// Latest enrollments, social assistance records and absences, `per_kind` of each.
pub async fn fetch_recent_activities(
    pool: &PgPool,
    per_kind: i64,
) -> anyhow::Result<Vec<Activity>> {
    let rows = sqlx::query(
        r#"
        (SELECT e.id, 'enrollment' AS kind, st.full_name AS name, c.name AS details,
                e.enrollment_date AS date
         FROM ong.enrollments e
         JOIN ong.students st ON st.id = e.student_id
         JOIN ong.courses c ON c.id = e.course_id
         ORDER BY e.created_at DESC
         LIMIT $1)
        UNION ALL
        (SELECT s.id, 'social', st.full_name, 'Assistência Social', s.date
         FROM ong.social_assistance_records s
         JOIN ong.students st ON st.id = s.student_id
         ORDER BY s.created_at DESC
         LIMIT $1)
        UNION ALL
        (SELECT a.id, 'absence', st.full_name, 'Falta', a.date
         FROM ong.attendance_students a
         JOIN ong.enrollments e ON e.id = a.enrollment_id
         JOIN ong.students st ON st.id = e.student_id
         WHERE a.status = 'absent'
         ORDER BY a.created_at DESC
         LIMIT $1)
        "#,
    )
    .bind(per_kind)
    .fetch_all(pool)
    .await
    .context("failed to load recent activities")?;

    let mut activities = Vec::with_capacity(rows.len());
    for row in rows {
        activities.push(Activity {
            id: row.try_get("id")?,
            kind: row.try_get::<String, _>("kind")?.parse()?,
            name: row.try_get("name")?,
            details: row.try_get("details")?,
            date: row.try_get("date")?,
        });
    }

    Ok(activities)
}

pub async fn import_students(
    pool: &PgPool,
    csv_path: &std::path::Path,
    today: NaiveDate,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        birth_date: NaiveDate,
        cpf: String,
        nis: Option<String>,
        phone: Option<String>,
        email: Option<String>,
        address: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let result = sqlx::query(
            r#"
            INSERT INTO ong.students
            (id, full_name, birth_date, age, cpf, nis, phone, email, address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (cpf) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                birth_date = EXCLUDED.birth_date,
                age = EXCLUDED.age,
                nis = EXCLUDED.nis,
                phone = EXCLUDED.phone,
                email = EXCLUDED.email,
                address = EXCLUDED.address,
                updated_at = now()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&row.full_name)
        .bind(row.birth_date)
        .bind(age_on(row.birth_date, today))
        .bind(unformat(&row.cpf))
        .bind(row.nis.unwrap_or_default())
        .bind(unformat(&row.phone.unwrap_or_default()))
        .bind(row.email.unwrap_or_default())
        .bind(row.address.unwrap_or_default())
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            imported += 1;
        }
    }

    Ok(imported)
}

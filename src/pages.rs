use std::fmt::Write;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregate::{aggregate, GroupSummary};
use crate::db;
use crate::format::{format_cpf, format_phone};
use crate::models::{
    AttendanceEntry, AttendanceMark, AttendanceSheet, AttendanceStatus, Course, Enrollment,
    EnrollmentStatus, HealthRecord, SocialAssistanceRecord, Student,
};
use crate::session::AuthSession;
use crate::table::{Column, DisplayValue, Record, Table, TableView};

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub search: Option<String>,
    pub select: Option<String>,
}

/// A rendered list plus the detail of the row picked with `--select`.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    #[serde(flatten)]
    pub view: TableView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
}

impl From<TableView> for Page {
    fn from(view: TableView) -> Self {
        Page {
            view,
            selected: None,
        }
    }
}

impl Page {
    pub fn to_text(&self) -> String {
        match &self.selected {
            Some(detail) => format!("{detail}\n{}", self.view.to_text()),
            None => self.view.to_text(),
        }
    }
}

/// Case-insensitive substring match against any of `fields`. No term matches everything.
pub fn matches_search(fields: &[&str], term: Option<&str>) -> bool {
    let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
        return true;
    };
    let needle = term.to_lowercase();
    fields
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max_chars).collect();
    short.push_str("...");
    short
}

pub fn student_table() -> Table<Student> {
    Table::new(
        vec![
            Column::derive("Nome", |s: &Student| {
                DisplayValue::lines([s.full_name.clone(), format_cpf(&s.cpf)])
            }),
            Column::field("Idade", "age"),
            Column::derive("Contato", |s: &Student| {
                DisplayValue::lines([format_phone(&s.phone), s.email.clone()])
            }),
        ],
        |s: &Student| s.id.to_string(),
    )
    .empty_message("Nenhum aluno encontrado")
}

pub fn student_detail(student: &Student) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# {}", student.full_name);
    for (label, key) in [
        ("Nascimento", "birth_date"),
        ("Idade", "age"),
        ("CPF", "cpf"),
        ("NIS", "nis"),
        ("Telefone", "phone"),
        ("E-mail", "email"),
        ("Endereço", "address"),
    ] {
        let _ = writeln!(output, "{label}: {}", student.field(key).unwrap_or_default());
    }
    output
}

pub fn course_table() -> Table<Course> {
    Table::new(
        vec![
            Column::derive("Nome", |c: &Course| {
                DisplayValue::lines([c.name.clone(), truncate(&c.description, 50)])
            }),
            Column::derive("Carga Horária", |c: &Course| {
                format!("{}h", c.workload_hours).into()
            }),
            Column::field("Turno", "shift"),
            Column::field("Vagas", "available_spots"),
        ],
        |c: &Course| c.id.to_string(),
    )
    .empty_message("Nenhum curso encontrado")
}

pub fn course_detail(course: &Course) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# {}", course.name);
    let _ = writeln!(output, "{}", course.description);
    let _ = writeln!(output, "Carga horária: {}h", course.workload_hours);
    let _ = writeln!(output, "Turno: {}", course.shift.label());
    let _ = writeln!(output, "Vagas: {}", course.available_spots);
    if !course.executive_manager.is_empty() {
        let _ = writeln!(output, "Gestor executivo: {}", course.executive_manager);
    }
    output
}

pub fn enrollment_table() -> Table<Enrollment> {
    Table::new(
        vec![
            Column::field("Aluno", "student_name"),
            Column::field("Curso", "course_name"),
            Column::field("Matrícula", "enrollment_date"),
            Column::field("Status", "status"),
        ],
        |e: &Enrollment| e.id.to_string(),
    )
    .empty_message("Nenhuma matrícula encontrada")
}

pub fn attendance_sheet_table() -> Table<AttendanceSheet> {
    Table::new(
        vec![
            Column::field("Curso", "course_name"),
            Column::field("Data", "date"),
            Column::field("Alunos", "student_count"),
            Column::derive("Presentes", |s: &AttendanceSheet| {
                format!("{}/{}", s.present_count, s.student_count).into()
            }),
        ],
        |s: &AttendanceSheet| format!("{}:{}", s.course_id, s.date),
    )
    .empty_message("Nenhuma frequência registrada nos últimos dias")
}

pub fn social_table() -> Table<SocialAssistanceRecord> {
    Table::new(
        vec![
            Column::field("Aluno", "student_name"),
            Column::field("Data", "date"),
            Column::field("Necessidades", "identified_needs"),
            Column::field("Encaminhamentos", "referrals"),
        ],
        |r: &SocialAssistanceRecord| r.id.to_string(),
    )
    .empty_message("Nenhum atendimento social registrado")
}

pub fn health_table() -> Table<HealthRecord> {
    Table::new(
        vec![
            Column::field("Aluno", "student_name"),
            Column::field("Tipo", "record_type"),
            Column::field("Profissional", "professional_name"),
            Column::field("Data", "date"),
        ],
        |r: &HealthRecord| r.id.to_string(),
    )
    .empty_message("Nenhum prontuário encontrado")
}

/// Key / count / percentage columns for any grouped summary.
pub fn summary_table(key_header: &str) -> Table<GroupSummary> {
    Table::new(
        vec![
            Column::field(key_header, "key"),
            Column::field("Quantidade", "count"),
            Column::field("Percentual", "percentage"),
        ],
        |g: &GroupSummary| g.key.clone(),
    )
}

fn sheet_key(entry: &AttendanceEntry) -> String {
    format!("{}:{}", entry.course_id, entry.date)
}

/// Groups saved attendance into one sheet per course and day, newest first.
pub fn attendance_sheets(entries: &[AttendanceEntry]) -> Vec<AttendanceSheet> {
    let mut sheets: Vec<AttendanceSheet> = aggregate(entries, sheet_key)
        .into_iter()
        .filter_map(|group| {
            let first = entries.iter().find(|e| sheet_key(e) == group.key)?;
            let present_count = entries
                .iter()
                .filter(|e| e.status == AttendanceStatus::Present && sheet_key(e) == group.key)
                .count();
            Some(AttendanceSheet {
                course_id: first.course_id,
                course_name: first.course_name.clone(),
                date: first.date,
                student_count: group.count,
                present_count,
            })
        })
        .collect();

    sheets.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.course_name.cmp(&b.course_name))
    });
    sheets
}

/// Everyone enrolled is present unless listed in `absent`, by enrollment or
/// student id. Ids matching no active enrollment are an error.
pub fn attendance_marks(
    enrollments: &[Enrollment],
    absent: &[Uuid],
    reason: Option<&str>,
) -> anyhow::Result<Vec<AttendanceMark>> {
    let active: Vec<&Enrollment> = enrollments
        .iter()
        .filter(|e| e.status == EnrollmentStatus::Active)
        .collect();

    let unknown: Vec<String> = absent
        .iter()
        .filter(|id| !active.iter().any(|e| e.id == **id || e.student_id == **id))
        .map(Uuid::to_string)
        .collect();
    if !unknown.is_empty() {
        anyhow::bail!(
            "absent ids match no active enrollment in this course: {}",
            unknown.join(", ")
        );
    }

    let marks = active
        .into_iter()
        .map(|e| {
            let is_absent = absent.contains(&e.id) || absent.contains(&e.student_id);
            AttendanceMark {
                enrollment_id: e.id,
                status: if is_absent {
                    AttendanceStatus::Absent
                } else {
                    AttendanceStatus::Present
                },
                absence_reason: if is_absent {
                    reason.map(str::to_string)
                } else {
                    None
                },
            }
        })
        .collect();
    Ok(marks)
}

/// First day of an attendance window of `days` (at least one) ending at `today`.
pub fn window_start(today: NaiveDate, days: i64) -> anyhow::Result<NaiveDate> {
    Duration::try_days(days.max(1))
        .and_then(|span| today.checked_sub_signed(span))
        .with_context(|| format!("an attendance window of {days} days is out of range"))
}

/// Renders `data`; the row keyed `select` is activated and its handler
/// captures `detail` for it.
fn render_page<T, D>(table: Table<T>, data: &[T], select: Option<&str>, detail: D) -> Page
where
    T: Record,
    D: Fn(&T) -> String + Send + Sync + 'static,
{
    let captured = Arc::new(Mutex::new(None::<String>));
    let sink = Arc::clone(&captured);
    let table = table.on_row_click(move |item| {
        if let Ok(mut slot) = sink.lock() {
            *slot = Some(detail(item));
        }
    });

    if let Some(key) = select {
        if !table.activate(data, key) {
            warn!(key, "no row matches the selected key");
        }
    }

    let view = table.render(data);
    let selected = captured.lock().ok().and_then(|mut slot| slot.take());
    Page { view, selected }
}

pub async fn students_page(
    pool: &PgPool,
    session: &AuthSession,
    options: &ListOptions,
) -> anyhow::Result<Page> {
    let search = options.search.as_deref();
    let students: Vec<Student> = db::fetch_students(pool)
        .await?
        .into_iter()
        .filter(|s| {
            let masked = format_cpf(&s.cpf);
            matches_search(&[s.full_name.as_str(), s.cpf.as_str(), masked.as_str()], search)
        })
        .collect();

    info!(
        user = session.display_name(),
        user_id = %session.user_id,
        count = students.len(),
        "students listed"
    );
    Ok(render_page(
        student_table(),
        &students,
        options.select.as_deref(),
        student_detail,
    ))
}

pub async fn courses_page(
    pool: &PgPool,
    session: &AuthSession,
    options: &ListOptions,
) -> anyhow::Result<Page> {
    let search = options.search.as_deref();
    let courses: Vec<Course> = db::fetch_courses(pool)
        .await?
        .into_iter()
        .filter(|c| matches_search(&[c.name.as_str(), c.description.as_str()], search))
        .collect();

    info!(
        user = session.display_name(),
        user_id = %session.user_id,
        count = courses.len(),
        "courses listed"
    );
    Ok(render_page(
        course_table(),
        &courses,
        options.select.as_deref(),
        course_detail,
    ))
}

pub async fn enrollments_page(
    pool: &PgPool,
    session: &AuthSession,
    course_id: Option<Uuid>,
    status: Option<EnrollmentStatus>,
    options: &ListOptions,
) -> anyhow::Result<Page> {
    let search = options.search.as_deref();
    let enrollments: Vec<Enrollment> = db::fetch_enrollments(pool, course_id, status)
        .await?
        .into_iter()
        .filter(|e| {
            matches_search(&[e.student_name.as_str(), e.course_name.as_str()], search)
        })
        .collect();

    info!(
        user = session.display_name(),
        user_id = %session.user_id,
        count = enrollments.len(),
        "enrollments listed"
    );
    Ok(enrollment_table().render(&enrollments).into())
}

pub async fn attendance_page(
    pool: &PgPool,
    session: &AuthSession,
    today: NaiveDate,
    days: i64,
    options: &ListOptions,
) -> anyhow::Result<Page> {
    let since = window_start(today, days)?;
    let search = options.search.as_deref();
    let entries: Vec<AttendanceEntry> = db::fetch_attendance(pool, Some(since))
        .await?
        .into_iter()
        .filter(|e| matches_search(&[e.course_name.as_str()], search))
        .collect();

    let sheets = attendance_sheets(&entries);
    info!(
        user = session.display_name(),
        user_id = %session.user_id,
        %since,
        sheets = sheets.len(),
        "attendance listed"
    );
    Ok(attendance_sheet_table().render(&sheets).into())
}

pub async fn record_attendance(
    pool: &PgPool,
    session: &AuthSession,
    course_id: Uuid,
    date: NaiveDate,
    absent: &[Uuid],
    reason: Option<&str>,
) -> anyhow::Result<usize> {
    session.require(session.can_write_attendance(), "attendance registration")?;

    let enrollments =
        db::fetch_enrollments(pool, Some(course_id), Some(EnrollmentStatus::Active)).await?;
    if enrollments.is_empty() {
        anyhow::bail!("course {course_id} has no active enrollments");
    }

    let marks = attendance_marks(&enrollments, absent, reason)?;
    let written = db::record_attendance(pool, date, &marks).await?;
    info!(
        user = session.display_name(),
        user_id = %session.user_id,
        %course_id,
        %date,
        written,
        "attendance recorded"
    );
    Ok(written)
}

pub async fn social_page(
    pool: &PgPool,
    session: &AuthSession,
    options: &ListOptions,
) -> anyhow::Result<Page> {
    session.require(session.can_view_social(), "social assistance records")?;

    let search = options.search.as_deref();
    let records: Vec<SocialAssistanceRecord> = db::fetch_social_records(pool)
        .await?
        .into_iter()
        .filter(|r| matches_search(&[r.student_name.as_str()], search))
        .collect();

    info!(
        user = session.display_name(),
        user_id = %session.user_id,
        count = records.len(),
        "social records listed"
    );
    Ok(social_table().render(&records).into())
}

pub async fn health_page(
    pool: &PgPool,
    session: &AuthSession,
    options: &ListOptions,
) -> anyhow::Result<Page> {
    session.require(session.can_view_health(), "health records")?;

    let search = options.search.as_deref();
    let records: Vec<HealthRecord> = db::fetch_health_records(pool)
        .await?
        .into_iter()
        .filter(|r| {
            matches_search(
                &[r.student_name.as_str(), r.professional_name.as_str()],
                search,
            )
        })
        .collect();

    info!(
        user = session.display_name(),
        user_id = %session.user_id,
        count = records.len(),
        "health records listed"
    );
    Ok(health_table().render(&records).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Shift;
    use crate::table::TableBody;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn student(name: &str) -> Student {
        Student {
            id: Uuid::new_v4(),
            full_name: name.to_string(),
            birth_date: date(2012, 4, 1),
            age: 14,
            cpf: "98765432100".to_string(),
            nis: String::new(),
            phone: "1133334444".to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            address: String::new(),
        }
    }

    fn entry(
        course: Uuid,
        course_name: &str,
        day: NaiveDate,
        status: AttendanceStatus,
    ) -> AttendanceEntry {
        AttendanceEntry {
            id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            student_name: "Aluno".to_string(),
            course_id: course,
            course_name: course_name.to_string(),
            date: day,
            status,
            absence_reason: None,
        }
    }

    fn enrollment(status: EnrollmentStatus) -> Enrollment {
        Enrollment {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            student_name: "Aluno".to_string(),
            course_id: Uuid::nil(),
            course_name: "Violão".to_string(),
            enrollment_date: date(2026, 2, 1),
            status,
        }
    }

    #[test]
    fn search_is_case_insensitive_and_optional() {
        assert!(matches_search(&["Ana Clara"], Some("ana")));
        assert!(matches_search(&["Ana Clara"], None));
        assert!(matches_search(&["Ana Clara"], Some("   ")));
        assert!(!matches_search(&["Ana Clara"], Some("bruno")));
    }

    #[test]
    fn student_rows_combine_name_and_cpf() {
        let view = student_table().render(&[student("Ana"), student("Bruno")]);
        assert_eq!(view.headers, vec!["Nome", "Idade", "Contato"]);
        let first = &view.rows()[0];
        assert_eq!(first.cells[0].to_plain(), "Ana / 987.654.321-00");
        assert_eq!(first.cells[1], DisplayValue::Integer(14));
        assert_eq!(first.cells[2].to_plain(), "(11) 3333-4444 / ana@example.com");
    }

    #[test]
    fn empty_student_list_uses_page_message() {
        let view = student_table().render(&[]);
        match view.body {
            TableBody::Empty { message, span } => {
                assert_eq!(message, "Nenhum aluno encontrado");
                assert_eq!(span, 3);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn course_rows_show_hours_and_shift_badge() {
        let course = Course {
            id: Uuid::new_v4(),
            name: "Informática".to_string(),
            description: "x".repeat(60),
            workload_hours: 40,
            shift: Shift::Evening,
            available_spots: 15,
            executive_manager: String::new(),
        };
        let view = course_table().render(&[course]);
        let cells = &view.rows()[0].cells;
        assert!(cells[0].to_plain().ends_with("..."));
        assert_eq!(cells[1].to_plain(), "40h");
        assert_eq!(cells[2].to_plain(), "Noite");
        assert_eq!(cells[3], DisplayValue::Integer(15));
    }

    #[test]
    fn sheets_group_by_course_and_day_newest_first() {
        let violao = Uuid::new_v4();
        let info = Uuid::new_v4();
        let entries = vec![
            entry(violao, "Violão", date(2026, 3, 1), AttendanceStatus::Present),
            entry(violao, "Violão", date(2026, 3, 1), AttendanceStatus::Absent),
            entry(info, "Informática", date(2026, 3, 2), AttendanceStatus::Present),
            entry(violao, "Violão", date(2026, 3, 2), AttendanceStatus::Present),
        ];
        let sheets = attendance_sheets(&entries);

        assert_eq!(sheets.len(), 3);
        assert_eq!(sheets[0].course_name, "Informática");
        assert_eq!(sheets[0].date, date(2026, 3, 2));
        assert_eq!(sheets[1].course_name, "Violão");
        assert_eq!(sheets[2].student_count, 2);
        assert_eq!(sheets[2].present_count, 1);
        assert_eq!(
            sheets.iter().map(|s| s.student_count).sum::<usize>(),
            entries.len()
        );
    }

    #[test]
    fn marks_default_to_present_for_active_enrollments() {
        let active = enrollment(EnrollmentStatus::Active);
        let absent = enrollment(EnrollmentStatus::Active);
        let locked = enrollment(EnrollmentStatus::Locked);
        let enrollments = vec![active.clone(), absent.clone(), locked];

        let marks =
            attendance_marks(&enrollments, &[absent.student_id], Some("Consulta médica")).unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].status, AttendanceStatus::Present);
        assert_eq!(marks[0].absence_reason, None);
        assert_eq!(marks[1].enrollment_id, absent.id);
        assert_eq!(marks[1].status, AttendanceStatus::Absent);
        assert_eq!(marks[1].absence_reason.as_deref(), Some("Consulta médica"));
    }

    #[test]
    fn unknown_absent_ids_abort_before_any_mark() {
        let active = enrollment(EnrollmentStatus::Active);
        let locked = enrollment(EnrollmentStatus::Locked);
        let stranger = Uuid::new_v4();

        let err = attendance_marks(
            &[active.clone(), locked.clone()],
            &[active.id, stranger, locked.student_id],
            Some("doente"),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&stranger.to_string()));
        assert!(message.contains(&locked.student_id.to_string()));
        assert!(!message.contains(&active.id.to_string()));
    }

    #[test]
    fn window_start_goes_back_at_least_one_day() {
        let today = date(2026, 3, 10);
        assert_eq!(window_start(today, 30).unwrap(), date(2026, 2, 8));
        assert_eq!(window_start(today, 0).unwrap(), date(2026, 3, 9));
        assert_eq!(window_start(today, -5).unwrap(), date(2026, 3, 9));
    }

    #[test]
    fn oversized_window_is_an_error() {
        let today = date(2026, 3, 10);
        assert!(window_start(today, 1_000_000_000).is_err());
        assert!(window_start(today, i64::MAX).is_err());
    }

    #[test]
    fn selected_detail_stays_out_of_the_view() {
        let ana = student("Ana");
        let students = vec![ana.clone(), student("Bruno")];
        let key = ana.id.to_string();

        let page = render_page(student_table(), &students, Some(key.as_str()), student_detail);
        let detail = page.selected.clone().unwrap();
        assert!(detail.starts_with("# Ana"));
        assert_eq!(page.view.row_count(), 2);
        assert!(!page.view.to_text().contains("# Ana"));

        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["selected"], detail.as_str());
        assert_eq!(json["body"]["state"], "rows");
        assert!(page.to_text().starts_with("# Ana"));
    }

    #[test]
    fn page_without_selection_serializes_as_plain_view() {
        let page = render_page(student_table(), &[student("Ana")], None, student_detail);
        let json = serde_json::to_value(&page).unwrap();
        assert!(json.get("selected").is_none());
        assert_eq!(json["headers"][0], "Nome");

        let missing = render_page(student_table(), &[student("Ana")], Some("nope"), student_detail);
        assert_eq!(missing.selected, None);
    }

    #[test]
    fn student_detail_lists_masked_fields() {
        let detail = student_detail(&student("Ana"));
        assert!(detail.starts_with("# Ana"));
        assert!(detail.contains("CPF: 987.654.321-00"));
        assert!(detail.contains("Nascimento: 01/04/2012"));
    }
}

use std::fmt::Write;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::Serialize;
use sqlx::PgPool;

use crate::aggregate::{
    aggregate, aggregate_many, percentage, rate, total_count, with_zero_groups, GroupSummary,
};
use crate::dashboard::students_per_course;
use crate::db;
use crate::models::{
    AttendanceEntry, AttendanceStatus, Enrollment, EnrollmentStatus, HealthRecord,
    HealthRecordType, SocialAssistanceRecord, Student,
};
use crate::pages::{enrollment_table, summary_table};
use crate::session::AuthSession;
use crate::table::{Column, DisplayValue, Record, Table, TableView};

const AGE_BUCKETS: [&str; 3] = ["Até 12 anos", "13 a 17 anos", "18 anos ou mais"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    StudentStatus,
    CourseDistribution,
    AgeDistribution,
    AttendanceCourse,
    SocialNeeds,
    SocialReferrals,
    HealthSpecialty,
}

impl ReportKind {
    pub fn title(self) -> &'static str {
        match self {
            ReportKind::StudentStatus => "Situação dos Alunos",
            ReportKind::CourseDistribution => "Alunos por Curso",
            ReportKind::AgeDistribution => "Distribuição por Idade",
            ReportKind::AttendanceCourse => "Frequência por Curso",
            ReportKind::SocialNeeds => "Necessidades Identificadas",
            ReportKind::SocialReferrals => "Encaminhamentos Sociais",
            ReportKind::HealthSpecialty => "Atendimentos de Saúde por Especialidade",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ReportKind::StudentStatus => "Matrículas por status e faixa etária dos alunos",
            ReportKind::CourseDistribution => "Alunos com matrícula ativa em cada curso",
            ReportKind::AgeDistribution => "Alunos cadastrados por faixa etária",
            ReportKind::AttendanceCourse => "Presenças e faltas registradas por curso",
            ReportKind::SocialNeeds => "Necessidades apontadas nos atendimentos sociais",
            ReportKind::SocialReferrals => "Encaminhamentos feitos a serviços da rede",
            ReportKind::HealthSpecialty => "Prontuários por tipo de atendimento",
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            ReportKind::StudentStatus => "student_status",
            ReportKind::CourseDistribution => "course_distribution",
            ReportKind::AgeDistribution => "age_distribution",
            ReportKind::AttendanceCourse => "attendance_course",
            ReportKind::SocialNeeds => "social_needs",
            ReportKind::SocialReferrals => "social_referrals",
            ReportKind::HealthSpecialty => "health_specialty",
        }
    }

    pub fn default_file_name(self, generated_on: NaiveDate) -> String {
        format!("{}_{}.md", self.slug(), generated_on.format("%Y-%m-%d"))
    }
}

/// Records a report reads. Only the sets its kind needs are loaded.
#[derive(Debug, Clone, Default)]
pub struct ReportData {
    pub students: Vec<Student>,
    pub enrollments: Vec<Enrollment>,
    pub attendance: Vec<AttendanceEntry>,
    pub social: Vec<SocialAssistanceRecord>,
    pub health: Vec<HealthRecord>,
}

impl ReportData {
    pub async fn load(
        pool: &PgPool,
        session: &AuthSession,
        kind: ReportKind,
    ) -> anyhow::Result<Self> {
        let mut data = ReportData::default();
        match kind {
            ReportKind::StudentStatus => {
                data.students = db::fetch_students(pool).await?;
                data.enrollments = db::fetch_enrollments(pool, None, None).await?;
            }
            ReportKind::CourseDistribution => {
                data.enrollments =
                    db::fetch_enrollments(pool, None, Some(EnrollmentStatus::Active)).await?;
            }
            ReportKind::AgeDistribution => {
                data.students = db::fetch_students(pool).await?;
            }
            ReportKind::AttendanceCourse => {
                data.attendance = db::fetch_attendance(pool, None).await?;
            }
            ReportKind::SocialNeeds | ReportKind::SocialReferrals => {
                session.require(session.can_view_social(), "social assistance reports")?;
                data.social = db::fetch_social_records(pool).await?;
            }
            ReportKind::HealthSpecialty => {
                session.require(session.can_view_health(), "health reports")?;
                data.health = db::fetch_health_records(pool).await?;
            }
        }
        Ok(data)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSection {
    pub heading: String,
    pub table: TableView,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    pub description: String,
    pub generated_by: String,
    pub generated_on: NaiveDate,
    pub summary: Vec<(String, String)>,
    pub sections: Vec<ReportSection>,
}

/// Presence tally for one course.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAttendance {
    pub course_name: String,
    pub present: usize,
    pub absent: usize,
    pub rate: u32,
}

impl Record for CourseAttendance {
    fn field(&self, key: &str) -> Option<DisplayValue> {
        let value = match key {
            "course_name" => self.course_name.as_str().into(),
            "present" => self.present.into(),
            "absent" => self.absent.into(),
            "rate" => format!("{}%", self.rate).into(),
            _ => return None,
        };
        Some(value)
    }
}

pub fn age_bucket(age: i32) -> &'static str {
    match age {
        i32::MIN..=12 => AGE_BUCKETS[0],
        13..=17 => AGE_BUCKETS[1],
        _ => AGE_BUCKETS[2],
    }
}

pub fn age_distribution(students: &[Student]) -> Vec<GroupSummary> {
    with_zero_groups(
        aggregate(students, |s| age_bucket(s.age).to_string()),
        &AGE_BUCKETS,
    )
}

pub fn enrollment_status_summary(enrollments: &[Enrollment]) -> Vec<GroupSummary> {
    let labels: Vec<&str> = EnrollmentStatus::ALL.iter().map(|s| s.label()).collect();
    with_zero_groups(
        aggregate(enrollments, |e| e.status.label().to_string()),
        &labels,
    )
}

/// Courses ordered by recorded attendance volume.
pub fn attendance_by_course(attendance: &[AttendanceEntry]) -> Vec<CourseAttendance> {
    aggregate(attendance, |a| a.course_name.clone())
        .into_iter()
        .map(|group| {
            let present = attendance
                .iter()
                .filter(|a| a.course_name == group.key && a.status == AttendanceStatus::Present)
                .count();
            CourseAttendance {
                rate: percentage(present, group.count),
                course_name: group.key,
                present,
                absent: group.count - present,
            }
        })
        .collect()
}

pub fn health_by_specialty(health: &[HealthRecord]) -> Vec<GroupSummary> {
    let labels: Vec<&str> = HealthRecordType::ALL.iter().map(|t| t.label()).collect();
    with_zero_groups(
        aggregate(health, |h| h.record_type.label().to_string()),
        &labels,
    )
}

fn course_attendance_table() -> Table<CourseAttendance> {
    Table::new(
        vec![
            Column::field("Curso", "course_name"),
            Column::field("Presenças", "present"),
            Column::field("Faltas", "absent"),
            Column::field("Frequência", "rate"),
        ],
        |c: &CourseAttendance| c.course_name.clone(),
    )
    .empty_message("Nenhuma frequência registrada")
}

fn section(heading: &str, table: TableView) -> ReportSection {
    ReportSection {
        heading: heading.to_string(),
        table,
    }
}

fn grouped(heading: &str, key_header: &str, groups: &[GroupSummary]) -> ReportSection {
    section(heading, summary_table(key_header).render(groups))
}

pub fn build_report(
    kind: ReportKind,
    session: &AuthSession,
    generated_on: NaiveDate,
    data: &ReportData,
) -> Report {
    let mut summary: Vec<(String, String)> = Vec::new();
    let mut sections = Vec::new();
    let mut line = |label: &str, value: String| summary.push((label.to_string(), value));

    match kind {
        ReportKind::StudentStatus => {
            let statuses = enrollment_status_summary(&data.enrollments);
            line("Total de matrículas", data.enrollments.len().to_string());
            for status in &statuses {
                line(status.key.as_str(), status.count.to_string());
            }
            sections.push(grouped("Matrículas por status", "Status", &statuses));
            sections.push(grouped(
                "Distribuição por idade",
                "Faixa etária",
                &age_distribution(&data.students),
            ));
            let detail = Table::new(
                vec![
                    Column::field("Aluno", "student_name"),
                    Column::field("Curso", "course_name"),
                    Column::field("Status", "status"),
                ],
                |e: &Enrollment| e.id.to_string(),
            );
            sections.push(section("Dados detalhados", detail.render(&data.enrollments)));
        }
        ReportKind::CourseDistribution => {
            let groups = students_per_course(&data.enrollments);
            let total_students = total_count(&groups);
            let average = if groups.is_empty() {
                0
            } else {
                (total_students as f64 / groups.len() as f64).round() as usize
            };
            line("Total de alunos", total_students.to_string());
            line("Total de cursos", groups.len().to_string());
            line("Média de alunos por curso", average.to_string());
            if let (Some(max), Some(min)) = (groups.first(), groups.last()) {
                line("Maior turma", format!("{} ({})", max.key, max.count));
                line("Menor turma", format!("{} ({})", min.key, min.count));
            }
            sections.push(grouped("Distribuição de alunos por curso", "Curso", &groups));
            sections.push(section(
                "Matrículas ativas",
                enrollment_table().render(&data.enrollments),
            ));
        }
        ReportKind::AgeDistribution => {
            line("Total de alunos", data.students.len().to_string());
            sections.push(grouped(
                "Alunos por faixa etária",
                "Faixa etária",
                &age_distribution(&data.students),
            ));
        }
        ReportKind::AttendanceCourse => {
            let overall = rate(&data.attendance, |a| a.status == AttendanceStatus::Present);
            line("Registros de frequência", data.attendance.len().to_string());
            line("Frequência média", format!("{overall}%"));
            sections.push(section(
                "Frequência por curso",
                course_attendance_table().render(&attendance_by_course(&data.attendance)),
            ));
        }
        ReportKind::SocialNeeds => {
            let needs = aggregate_many(&data.social, |r| r.identified_needs.clone());
            line("Atendimentos", data.social.len().to_string());
            line("Necessidades registradas", total_count(&needs).to_string());
            sections.push(grouped("Necessidades por tipo", "Necessidade", &needs));
        }
        ReportKind::SocialReferrals => {
            let referrals = aggregate_many(&data.social, |r| r.referrals.clone());
            line("Total de encaminhamentos", total_count(&referrals).to_string());
            sections.push(grouped("Encaminhamentos por serviço", "Serviço", &referrals));
        }
        ReportKind::HealthSpecialty => {
            let specialties = health_by_specialty(&data.health);
            line("Total de prontuários", data.health.len().to_string());
            sections.push(grouped(
                "Prontuários por especialidade",
                "Especialidade",
                &specialties,
            ));
        }
    }

    Report {
        title: kind.title().to_string(),
        description: kind.description().to_string(),
        generated_by: session.display_name().to_string(),
        generated_on,
        summary,
        sections,
    }
}

impl Report {
    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        let _ = writeln!(output, "# {}", self.title);
        let _ = writeln!(output);
        let _ = writeln!(output, "{}", self.description);
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Data de geração: {}",
            self.generated_on.format("%d/%m/%Y")
        );
        let _ = writeln!(output, "Gerado por: {}", self.generated_by);

        let _ = writeln!(output);
        let _ = writeln!(output, "## Resumo");
        let _ = writeln!(output);
        if self.summary.is_empty() {
            let _ = writeln!(output, "Nenhum dado para resumir.");
        } else {
            for (label, value) in &self.summary {
                let _ = writeln!(output, "- {label}: {value}");
            }
        }

        for section in &self.sections {
            let _ = writeln!(output);
            let _ = writeln!(output, "## {}", section.heading);
            let _ = writeln!(output);
            output.push_str(&section.table.to_markdown());
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session() -> AuthSession {
        AuthSession {
            user_id: Uuid::nil(),
            email: "coordenacao@amarsemlimites.org".to_string(),
            role: Role::Admin,
        }
    }

    fn student(age: i32) -> Student {
        Student {
            id: Uuid::new_v4(),
            full_name: format!("Aluno {age}"),
            birth_date: date(2026 - age, 1, 1),
            age,
            cpf: String::new(),
            nis: String::new(),
            phone: String::new(),
            email: String::new(),
            address: String::new(),
        }
    }

    fn enrollment(course: &str, status: EnrollmentStatus) -> Enrollment {
        Enrollment {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            student_name: "Aluno".to_string(),
            course_id: Uuid::nil(),
            course_name: course.to_string(),
            enrollment_date: date(2026, 2, 1),
            status,
        }
    }

    fn attendance(course: &str, status: AttendanceStatus) -> AttendanceEntry {
        AttendanceEntry {
            id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            student_name: "Aluno".to_string(),
            course_id: Uuid::nil(),
            course_name: course.to_string(),
            date: date(2026, 3, 1),
            status,
            absence_reason: None,
        }
    }

    fn social(needs: &[&str], referrals: &[&str]) -> SocialAssistanceRecord {
        SocialAssistanceRecord {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            student_name: "Aluno".to_string(),
            date: date(2026, 3, 1),
            identified_needs: needs.iter().map(|n| n.to_string()).collect(),
            referrals: referrals.iter().map(|r| r.to_string()).collect(),
            notes: String::new(),
        }
    }

    #[test]
    fn age_buckets_cover_every_age() {
        assert_eq!(age_bucket(5), "Até 12 anos");
        assert_eq!(age_bucket(12), "Até 12 anos");
        assert_eq!(age_bucket(13), "13 a 17 anos");
        assert_eq!(age_bucket(17), "13 a 17 anos");
        assert_eq!(age_bucket(18), "18 anos ou mais");
    }

    #[test]
    fn age_distribution_uses_actual_ages() {
        let students = vec![student(8), student(15), student(16), student(30)];
        let groups = age_distribution(&students);
        assert_eq!(groups[0].key, "13 a 17 anos");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].percentage, 50);
        assert_eq!(total_count(&groups), students.len());
    }

    #[test]
    fn status_summary_lists_every_status() {
        let enrollments = vec![
            enrollment("Violão", EnrollmentStatus::Active),
            enrollment("Violão", EnrollmentStatus::Active),
        ];
        let groups = enrollment_status_summary(&enrollments);
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["Ativo", "Trancado", "Concluído"]);
        assert_eq!(groups[0].percentage, 100);
        assert_eq!(groups[2].count, 0);
    }

    #[test]
    fn attendance_by_course_splits_present_and_absent() {
        let records = vec![
            attendance("Violão", AttendanceStatus::Present),
            attendance("Informática", AttendanceStatus::Absent),
            attendance("Violão", AttendanceStatus::Absent),
            attendance("Violão", AttendanceStatus::Present),
        ];
        let courses = attendance_by_course(&records);
        assert_eq!(
            courses[0],
            CourseAttendance {
                course_name: "Violão".to_string(),
                present: 2,
                absent: 1,
                rate: 67,
            }
        );
        assert_eq!(courses[1].rate, 0);
    }

    #[test]
    fn health_summary_includes_empty_specialties() {
        let groups = health_by_specialty(&[]);
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.count == 0 && g.percentage == 0));
    }

    #[test]
    fn course_distribution_report_summarizes_active_enrollments() {
        let data = ReportData {
            enrollments: vec![
                enrollment("Violão", EnrollmentStatus::Active),
                enrollment("Informática", EnrollmentStatus::Active),
                enrollment("Informática", EnrollmentStatus::Active),
            ],
            ..ReportData::default()
        };
        let report = build_report(
            ReportKind::CourseDistribution,
            &session(),
            date(2026, 3, 5),
            &data,
        );
        let summary: Vec<(&str, &str)> = report
            .summary
            .iter()
            .map(|(l, v)| (l.as_str(), v.as_str()))
            .collect();

        assert!(summary.contains(&("Total de alunos", "3")));
        assert!(summary.contains(&("Média de alunos por curso", "2")));
        assert!(summary.contains(&("Maior turma", "Informática (2)")));
        assert_eq!(report.sections[0].table.row_count(), 2);
    }

    #[test]
    fn social_needs_report_counts_each_need() {
        let data = ReportData {
            social: vec![
                social(&["Alimentação", "Transporte"], &["CRAS"]),
                social(&["Alimentação"], &[]),
            ],
            ..ReportData::default()
        };
        let report = build_report(
            ReportKind::SocialNeeds,
            &session(),
            date(2026, 3, 5),
            &data,
        );
        let rows = report.sections[0].table.rows();
        assert_eq!(rows[0].cells[0].to_plain(), "Alimentação");
        assert_eq!(rows[0].cells[1].to_plain(), "2");
        assert_eq!(rows[0].cells[2].to_plain(), "67%");
    }

    #[test]
    fn markdown_has_header_summary_and_tables() {
        let data = ReportData::default();
        let report = build_report(
            ReportKind::SocialReferrals,
            &session(),
            date(2026, 3, 5),
            &data,
        );
        let markdown = report.to_markdown();

        assert!(markdown.starts_with("# Encaminhamentos Sociais\n"));
        assert!(markdown.contains("Data de geração: 05/03/2026"));
        assert!(markdown.contains("Gerado por: coordenacao@amarsemlimites.org"));
        assert!(markdown.contains("- Total de encaminhamentos: 0"));
        assert!(markdown.contains("| Serviço | Quantidade | Percentual |"));
        assert!(markdown.contains("| Nenhum dado encontrado |  |  |"));
    }

    #[test]
    fn default_file_name_uses_slug_and_iso_date() {
        assert_eq!(
            ReportKind::AttendanceCourse.default_file_name(date(2026, 10, 16)),
            "attendance_course_2026-10-16.md"
        );
    }
}

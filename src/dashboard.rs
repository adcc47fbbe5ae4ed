use std::fmt::Write;

use serde::Serialize;
use sqlx::PgPool;

use crate::aggregate::{aggregate, rate, GroupSummary};
use crate::db;
use crate::models::{
    Activity, ActivityKind, AttendanceEntry, AttendanceStatus, Course, Enrollment,
    EnrollmentStatus, SocialAssistanceRecord, Student,
};
use crate::pages::summary_table;
use crate::session::AuthSession;
use crate::table::{Column, Table};

const RECENT_PER_KIND: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_students: usize,
    pub total_courses: usize,
    pub average_attendance: u32,
    pub social_assistance: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub greeting: String,
    pub stats: DashboardStats,
    pub students_per_course: Vec<GroupSummary>,
    pub recent_activities: Vec<Activity>,
}

pub fn compute_stats(
    students: &[Student],
    courses: &[Course],
    attendance: &[AttendanceEntry],
    social: &[SocialAssistanceRecord],
) -> DashboardStats {
    DashboardStats {
        total_students: students.len(),
        total_courses: courses.len(),
        average_attendance: rate(attendance, |a| a.status == AttendanceStatus::Present),
        social_assistance: social.len(),
    }
}

/// Only active enrollments are counted; locked and completed ones are dropped first.
pub fn students_per_course(enrollments: &[Enrollment]) -> Vec<GroupSummary> {
    let active: Vec<&Enrollment> = enrollments
        .iter()
        .filter(|e| e.status == EnrollmentStatus::Active)
        .collect();
    aggregate(&active, |e| e.course_name.clone())
}

/// Newest first; social assistance is dropped for roles that cannot see it.
pub fn recent_activities(mut activities: Vec<Activity>, session: &AuthSession) -> Vec<Activity> {
    if !session.can_view_social() {
        activities.retain(|a| a.kind != ActivityKind::SocialAssistance);
    }
    activities.sort_by(|a, b| b.date.cmp(&a.date));
    activities
}

pub fn activity_table() -> Table<Activity> {
    Table::new(
        vec![
            Column::field("Tipo", "kind"),
            Column::field("Aluno", "name"),
            Column::field("Detalhes", "details"),
            Column::field("Data", "date"),
        ],
        |a: &Activity| format!("{}-{}", a.kind.as_str(), a.id),
    )
    .empty_message("Nenhuma atividade recente")
}

pub async fn load(pool: &PgPool, session: &AuthSession) -> anyhow::Result<Dashboard> {
    let students = db::fetch_students(pool).await?;
    let courses = db::fetch_courses(pool).await?;
    let attendance = db::fetch_attendance(pool, None).await?;
    let social = db::fetch_social_records(pool).await?;
    let enrollments = db::fetch_enrollments(pool, None, Some(EnrollmentStatus::Active)).await?;
    let activities = db::fetch_recent_activities(pool, RECENT_PER_KIND).await?;

    Ok(Dashboard {
        greeting: format!("Olá, {}", session.display_name()),
        stats: compute_stats(&students, &courses, &attendance, &social),
        students_per_course: students_per_course(&enrollments),
        recent_activities: recent_activities(activities, session),
    })
}

impl Dashboard {
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "{}", self.greeting);
        let _ = writeln!(output);
        let _ = writeln!(output, "Alunos cadastrados: {}", self.stats.total_students);
        let _ = writeln!(output, "Cursos: {}", self.stats.total_courses);
        let _ = writeln!(output, "Frequência média: {}%", self.stats.average_attendance);
        let _ = writeln!(output, "Atendimentos sociais: {}", self.stats.social_assistance);
        let _ = writeln!(output);
        let _ = writeln!(output, "Alunos por curso");
        let table = summary_table("Curso").empty_message("Nenhuma matrícula ativa");
        output.push_str(&table.render(&self.students_per_course).to_text());
        let _ = writeln!(output);
        let _ = writeln!(output, "Atividades recentes");
        output.push_str(&activity_table().render(&self.recent_activities).to_text());
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn activity(kind: ActivityKind, day: u32) -> Activity {
        Activity {
            id: Uuid::new_v4(),
            kind,
            name: "Aluno".to_string(),
            details: "Violão".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
        }
    }

    fn session(role: Role) -> AuthSession {
        AuthSession {
            user_id: Uuid::nil(),
            email: "equipe@amarsemlimites.org".to_string(),
            role,
        }
    }

    fn enrollment(course: &str, status: EnrollmentStatus) -> Enrollment {
        Enrollment {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            student_name: "Aluno".to_string(),
            course_id: Uuid::nil(),
            course_name: course.to_string(),
            enrollment_date: NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            status,
        }
    }

    fn mark(status: AttendanceStatus) -> AttendanceEntry {
        AttendanceEntry {
            id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            student_name: "Aluno".to_string(),
            course_id: Uuid::nil(),
            course_name: "Violão".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            status,
            absence_reason: None,
        }
    }

    #[test]
    fn average_attendance_is_rounded_presence_rate() {
        let attendance = vec![
            mark(AttendanceStatus::Present),
            mark(AttendanceStatus::Present),
            mark(AttendanceStatus::Absent),
        ];
        let stats = compute_stats(&[], &[], &attendance, &[]);
        assert_eq!(stats.average_attendance, 67);
        assert_eq!(stats.total_students, 0);
    }

    #[test]
    fn no_attendance_means_zero_percent() {
        let stats = compute_stats(&[], &[], &[], &[]);
        assert_eq!(stats.average_attendance, 0);
    }

    #[test]
    fn students_per_course_ignores_inactive_enrollments() {
        let enrollments = vec![
            enrollment("Violão", EnrollmentStatus::Active),
            enrollment("Informática", EnrollmentStatus::Active),
            enrollment("Informática", EnrollmentStatus::Active),
            enrollment("Violão", EnrollmentStatus::Completed),
        ];
        let groups = students_per_course(&enrollments);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "Informática");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].percentage, 67);
        assert_eq!(groups[1].key, "Violão");
        assert_eq!(groups[1].count, 1);
    }

    #[test]
    fn text_includes_stats_and_course_table() {
        let dashboard = Dashboard {
            greeting: "Olá, equipe".to_string(),
            stats: DashboardStats {
                total_students: 3,
                total_courses: 2,
                average_attendance: 80,
                social_assistance: 1,
            },
            students_per_course: students_per_course(&[enrollment(
                "Violão",
                EnrollmentStatus::Active,
            )]),
            recent_activities: vec![activity(ActivityKind::Absence, 4)],
        };
        let text = dashboard.to_text();
        assert!(text.contains("Frequência média: 80%"));
        assert!(text.contains("Violão | 1          | 100%"));
        assert!(text.contains("Atividades recentes"));
        assert!(text.contains("Frequência | Aluno | Violão   | 04/03/2026"));
    }

    #[test]
    fn recent_activities_are_newest_first() {
        let feed = recent_activities(
            vec![
                activity(ActivityKind::Enrollment, 1),
                activity(ActivityKind::SocialAssistance, 5),
                activity(ActivityKind::Absence, 3),
            ],
            &session(Role::Admin),
        );
        let kinds: Vec<ActivityKind> = feed.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActivityKind::SocialAssistance,
                ActivityKind::Absence,
                ActivityKind::Enrollment
            ]
        );
    }

    #[test]
    fn social_activity_is_hidden_from_teachers() {
        let feed = recent_activities(
            vec![
                activity(ActivityKind::SocialAssistance, 5),
                activity(ActivityKind::Enrollment, 1),
            ],
            &session(Role::Teacher),
        );
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, ActivityKind::Enrollment);
    }
}

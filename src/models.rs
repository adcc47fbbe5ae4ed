use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::format::{format_cpf, format_phone};
use crate::table::{DisplayValue, Record, Tone};

/// String-backed enums stored as TEXT columns.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $db:literal, $label:literal, $tone:ident;)+ }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $db,)+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }

            pub fn badge(self) -> DisplayValue {
                let tone = match self {
                    $($name::$variant => Tone::$tone,)+
                };
                DisplayValue::badge(self.label(), tone)
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|variant| variant.as_str() == value)
                    .ok_or_else(|| {
                        let expected: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        anyhow::anyhow!(
                            "unknown {} value: {value} (expected one of: {})",
                            stringify!($name),
                            expected.join(", ")
                        )
                    })
            }
        }
    };
}

text_enum!(Shift {
    Morning => "morning", "Manhã", Info;
    Afternoon => "afternoon", "Tarde", Warning;
    Evening => "evening", "Noite", Neutral;
});

text_enum!(EnrollmentStatus {
    Active => "active", "Ativo", Success;
    Locked => "locked", "Trancado", Warning;
    Completed => "completed", "Concluído", Info;
});

text_enum!(AttendanceStatus {
    Present => "present", "Presente", Success;
    Absent => "absent", "Ausente", Danger;
});

text_enum!(HealthRecordType {
    Dental => "dental", "Odontológico", Info;
    Psychological => "psychological", "Psicológico", Info;
    Nutritional => "nutritional", "Nutricional", Info;
    Medical => "medical", "Médico", Info;
});

text_enum!(ActivityKind {
    Enrollment => "enrollment", "Matrícula", Success;
    SocialAssistance => "social", "Atendimento", Info;
    Absence => "absence", "Frequência", Danger;
});

#[derive(Debug, Clone, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub age: i32,
    pub cpf: String,
    pub nis: String,
    pub phone: String,
    pub email: String,
    pub address: String,
}

impl Record for Student {
    fn field(&self, key: &str) -> Option<DisplayValue> {
        let value = match key {
            "id" => self.id.to_string().into(),
            "full_name" => self.full_name.as_str().into(),
            "birth_date" => self.birth_date.into(),
            "age" => self.age.into(),
            "cpf" => format_cpf(&self.cpf).into(),
            "nis" => self.nis.as_str().into(),
            "phone" => format_phone(&self.phone).into(),
            "email" => self.email.as_str().into(),
            "address" => self.address.as_str().into(),
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub workload_hours: i32,
    pub shift: Shift,
    pub available_spots: i32,
    pub executive_manager: String,
}

impl Record for Course {
    fn field(&self, key: &str) -> Option<DisplayValue> {
        let value = match key {
            "id" => self.id.to_string().into(),
            "name" => self.name.as_str().into(),
            "description" => self.description.as_str().into(),
            "workload_hours" => self.workload_hours.into(),
            "shift" => self.shift.badge(),
            "available_spots" => self.available_spots.into(),
            "executive_manager" => self.executive_manager.as_str().into(),
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub course_id: Uuid,
    pub course_name: String,
    pub enrollment_date: NaiveDate,
    pub status: EnrollmentStatus,
}

impl Record for Enrollment {
    fn field(&self, key: &str) -> Option<DisplayValue> {
        let value = match key {
            "id" => self.id.to_string().into(),
            "student_name" => self.student_name.as_str().into(),
            "course_name" => self.course_name.as_str().into(),
            "enrollment_date" => self.enrollment_date.into(),
            "status" => self.status.badge(),
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceEntry {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub student_name: String,
    pub course_id: Uuid,
    pub course_name: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub absence_reason: Option<String>,
}

impl Record for AttendanceEntry {
    fn field(&self, key: &str) -> Option<DisplayValue> {
        let value = match key {
            "student_name" => self.student_name.as_str().into(),
            "course_name" => self.course_name.as_str().into(),
            "date" => self.date.into(),
            "status" => self.status.badge(),
            "absence_reason" => self.absence_reason.clone().into(),
            _ => return None,
        };
        Some(value)
    }
}

/// Attendance saved for one course on one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSheet {
    pub course_id: Uuid,
    pub course_name: String,
    pub date: NaiveDate,
    pub student_count: usize,
    pub present_count: usize,
}

impl Record for AttendanceSheet {
    fn field(&self, key: &str) -> Option<DisplayValue> {
        let value = match key {
            "course_name" => self.course_name.as_str().into(),
            "date" => self.date.into(),
            "student_count" => self.student_count.into(),
            "present_count" => self.present_count.into(),
            _ => return None,
        };
        Some(value)
    }
}

/// One mark to save for an enrollment on a given day.
#[derive(Debug, Clone)]
pub struct AttendanceMark {
    pub enrollment_id: Uuid,
    pub status: AttendanceStatus,
    pub absence_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SocialAssistanceRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub date: NaiveDate,
    pub identified_needs: Vec<String>,
    pub referrals: Vec<String>,
    pub notes: String,
}

impl Record for SocialAssistanceRecord {
    fn field(&self, key: &str) -> Option<DisplayValue> {
        let value = match key {
            "student_name" => self.student_name.as_str().into(),
            "date" => self.date.into(),
            "identified_needs" => self.identified_needs.clone().into(),
            "referrals" => self.referrals.clone().into(),
            "notes" => self.notes.as_str().into(),
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthRecord {
    pub id: Uuid,
    pub student_id: Uuid,
    pub student_name: String,
    pub record_type: HealthRecordType,
    pub date: NaiveDate,
    pub professional_name: String,
    pub notes: String,
}

impl Record for HealthRecord {
    fn field(&self, key: &str) -> Option<DisplayValue> {
        let value = match key {
            "student_name" => self.student_name.as_str().into(),
            "record_type" => self.record_type.badge(),
            "date" => self.date.into(),
            "professional_name" => self.professional_name.as_str().into(),
            "notes" => self.notes.as_str().into(),
            _ => return None,
        };
        Some(value)
    }
}

/// One line of the dashboard's recent activity feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub name: String,
    pub details: String,
    pub date: NaiveDate,
}

impl Record for Activity {
    fn field(&self, key: &str) -> Option<DisplayValue> {
        let value = match key {
            "kind" => self.kind.badge(),
            "name" => self.name.as_str().into(),
            "details" => self.details.as_str().into(),
            "date" => self.date.into(),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_parse_their_database_values() {
        for status in EnrollmentStatus::ALL {
            assert_eq!(status.as_str().parse::<EnrollmentStatus>().unwrap(), *status);
        }
        assert_eq!("evening".parse::<Shift>().unwrap(), Shift::Evening);
        assert!("weekend".parse::<Shift>().is_err());
    }

    #[test]
    fn unknown_text_value_lists_the_accepted_ones() {
        let err = "sometimes".parse::<AttendanceStatus>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown AttendanceStatus value: sometimes (expected one of: present, absent)"
        );
    }

    #[test]
    fn badges_carry_portuguese_labels() {
        assert_eq!(EnrollmentStatus::Locked.badge().to_plain(), "Trancado");
        assert_eq!(
            AttendanceStatus::Absent.badge(),
            DisplayValue::badge("Ausente", Tone::Danger)
        );
    }

    #[test]
    fn student_fields_are_masked_for_display() {
        let student = Student {
            id: Uuid::nil(),
            full_name: "Ana Souza".to_string(),
            birth_date: NaiveDate::from_ymd_opt(2014, 5, 2).unwrap(),
            age: 12,
            cpf: "12345678901".to_string(),
            nis: "".to_string(),
            phone: "11987654321".to_string(),
            email: "ana@example.com".to_string(),
            address: "Rua A".to_string(),
        };
        assert_eq!(student.field("cpf").unwrap().to_plain(), "123.456.789-01");
        assert_eq!(student.field("phone").unwrap().to_plain(), "(11) 9 8765-4321");
        assert_eq!(student.field("age"), Some(DisplayValue::Integer(12)));
        assert_eq!(student.field("unknown"), None);
    }
}

use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::domain::{cost::CostLine, PhaseState};
use crate::services::events::Identified;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub start_date: String,
    pub current_phase: i64,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Editable details of one phase slot. Rows exist only once something was
/// edited; absent rows mean "no details".
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhaseDetails {
    pub project_id: String,
    pub phase_number: i64,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub notes: String,
    pub manual_state: Option<PhaseState>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChecklistItem {
    pub id: String,
    pub project_id: String,
    pub phase_number: i64,
    pub label: String,
    pub required: bool,
    pub checked: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    pub email: String,
    pub roles: Json<Vec<String>>,
    pub phone: Option<String>,
    pub start_date: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "entry_source", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntrySource {
    #[default]
    Manual,
    Generated,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Material {
    pub id: String,
    pub project_id: String,
    pub phase_number: i64,
    pub name: String,
    pub category: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_cost: f64,
    pub vat_percentage: f64,
    pub source: EntrySource,
    pub created_at: String,
}

impl CostLine for Material {
    fn quantity(&self) -> f64 {
        self.quantity
    }
    fn unit_cost(&self) -> f64 {
        self.unit_cost
    }
    fn vat_percentage(&self) -> f64 {
        self.vat_percentage
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Labour {
    pub id: String,
    pub project_id: String,
    pub phase_number: i64,
    pub description: String,
    pub worker_name: String,
    pub hours: f64,
    pub hourly_rate: f64,
    pub vat_percentage: f64,
    pub source: EntrySource,
    pub created_at: String,
}

impl CostLine for Labour {
    fn quantity(&self) -> f64 {
        self.hours
    }
    fn unit_cost(&self) -> f64 {
        self.hourly_rate
    }
    fn vat_percentage(&self) -> f64 {
        self.vat_percentage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "file_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Photo,
    Document,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectFile {
    pub id: String,
    pub project_id: String,
    pub phase_number: Option<i64>,
    pub kind: FileKind,
    pub file_name: String,
    #[serde(skip_serializing, default)]
    pub path: String,
    pub caption: String,
    pub uploaded_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub assignee_id: Option<String>,
    pub due_date: Option<String>,
    pub completed: bool,
    pub created_by: String,
    pub created_at: String,
}

macro_rules! identified {
    ($($ty:ty),+ $(,)?) => {
        $(impl Identified for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })+
    };
}

identified!(Project, ChecklistItem, TeamMember, Material, Labour, ProjectFile, Task);

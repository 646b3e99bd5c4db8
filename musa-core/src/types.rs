//! Core domain types for musa
//!
//! These mirror the farm backend's JSON contract (camelCase on the wire).
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Guest** | Unauthenticated user identified only by a local device id |
//! | **Planting** | A tracked cultivation unit (plot) with tasks and a lifecycle stage |
//! | **Stage** | One phase of the ordered banana lifecycle, see [`crate::stage::Stage`] |
//! | **Task** | A unit of field work owned by a planting, tagged with a stage category |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::stage::{Stage, StageKey};

/// Number of free analyses a guest gets per category.
pub const GUEST_ATTEMPT_LIMIT: u32 = 3;

// ============================================
// Analysis categories
// ============================================

/// What kind of image analysis is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisCategory {
    /// Disease detection (`/api/diagnoses/...`)
    Disease,
    /// Variety identification (`/api/varieties/...`)
    Variety,
}

impl AnalysisCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisCategory::Disease => "disease",
            AnalysisCategory::Variety => "variety",
        }
    }

    /// Path segment of the analysis resource
    pub fn resource(&self) -> &'static str {
        match self {
            AnalysisCategory::Disease => "diagnoses",
            AnalysisCategory::Variety => "varieties",
        }
    }
}

impl std::fmt::Display for AnalysisCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disease" => Ok(AnalysisCategory::Disease),
            "variety" => Ok(AnalysisCategory::Variety),
            _ => Err(format!("unknown analysis category: {}", s)),
        }
    }
}

// ============================================
// Guest usage
// ============================================

/// Guest usage for one device and category, recomputed from the backend on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuestUsageState {
    pub device_id: String,
    pub category: AnalysisCategory,
    pub attempts: u32,
    /// Trusted as reported; the client never checks it against `attempts`
    pub limit_reached: bool,
    pub requires_signup: bool,
}

impl GuestUsageState {
    /// Usage of a device the backend has never seen.
    pub fn fresh(device_id: impl Into<String>, category: AnalysisCategory) -> Self {
        Self {
            device_id: device_id.into(),
            category,
            attempts: 0,
            limit_reached: false,
            requires_signup: false,
        }
    }

    pub fn remaining(&self) -> u32 {
        GUEST_ATTEMPT_LIMIT.saturating_sub(self.attempts)
    }
}

// ============================================
// Tasks
// ============================================

/// Task lifecycle. PENDING -> COMPLETED is the only transition users can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::High => "HIGH",
            TaskPriority::Medium => "MEDIUM",
            TaskPriority::Low => "LOW",
        }
    }
}

/// A unit of field work belonging to a planting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "wire_date::deserialize")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Free-text stage name; see [`Task::stage_key`]
    #[serde(default)]
    pub category: String,
    pub planting_id: Option<i64>,
    pub plot_identifier: Option<String>,
    pub stage: Option<String>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Stage this task belongs to; unknown categories are `Unassigned`.
    pub fn stage_key(&self) -> StageKey {
        StageKey::from_category(&self.category)
    }

    /// True when the task belongs to `stage`
    pub fn in_stage(&self, stage: Stage) -> bool {
        self.stage_key() == StageKey::Stage(stage)
    }
}

// ============================================
// Plantings
// ============================================

/// A tracked cultivation unit with its tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Planting {
    pub id: i64,
    pub plot_identifier: String,
    #[serde(default, deserialize_with = "wire_date::deserialize")]
    pub planting_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "wire_date::deserialize")]
    pub expected_harvest_date: Option<NaiveDate>,
    pub current_stage: Stage,
    #[serde(default)]
    pub number_of_plants: u32,
    #[serde(default)]
    pub banana_variety: String,
    #[serde(default)]
    pub completed_tasks_count: u32,
    #[serde(default)]
    pub total_tasks_count: u32,
    #[serde(default)]
    pub progress_percentage: f64,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// Dates arrive as `YYYY-MM-DD` or as a full ISO date-time. Anything else
/// becomes `None` so one odd field does not sink the whole planting.
mod wire_date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let parsed = parse(raw.trim());
        if parsed.is_none() && !raw.trim().is_empty() {
            tracing::warn!(value = %raw, "Ignoring unparseable date");
        }
        Ok(parsed)
    }

    fn parse(raw: &str) -> Option<NaiveDate> {
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(date);
        }
        if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
            return Some(datetime.date_naive());
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|datetime| datetime.date())
    }
}

impl Planting {
    /// Recompute task counters and progress from `tasks`.
    pub fn recount(&mut self, tasks: &[Task]) {
        let total = tasks.len() as u32;
        let completed = tasks.iter().filter(|t| t.is_completed()).count() as u32;
        self.total_tasks_count = total;
        self.completed_tasks_count = completed;
        self.progress_percentage = if total == 0 {
            0.0
        } else {
            (completed as f64 / total as f64 * 100.0).round()
        };
    }
}

/// Body for creating a planting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlanting {
    pub plot_identifier: String,
    pub planting_date: NaiveDate,
    pub number_of_plants: u32,
    pub banana_variety: String,
}

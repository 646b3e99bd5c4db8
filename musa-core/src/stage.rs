//! Banana planting lifecycle stages
//!
//! One canonical, totally ordered list of seven stages. Older payloads that
//! say `HARVESTING` decode as [`Stage::Harvest`].

use serde::{Deserialize, Serialize};

use crate::types::Task;

/// Label used for tasks whose category is not a known stage.
pub const UNASSIGNED: &str = "UNASSIGNED";

/// Lifecycle stage of a planting. Declaration order is lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    LandPreparation,
    Planting,
    VegetativeGrowth,
    Flowering,
    FruitDevelopment,
    #[serde(alias = "HARVESTING")]
    Harvest,
    PostHarvest,
}

impl Stage {
    /// All stages in lifecycle order
    pub const ALL: [Stage; 7] = [
        Stage::LandPreparation,
        Stage::Planting,
        Stage::VegetativeGrowth,
        Stage::Flowering,
        Stage::FruitDevelopment,
        Stage::Harvest,
        Stage::PostHarvest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LandPreparation => "LAND_PREPARATION",
            Stage::Planting => "PLANTING",
            Stage::VegetativeGrowth => "VEGETATIVE_GROWTH",
            Stage::Flowering => "FLOWERING",
            Stage::FruitDevelopment => "FRUIT_DEVELOPMENT",
            Stage::Harvest => "HARVEST",
            Stage::PostHarvest => "POST_HARVEST",
        }
    }

    /// Human-friendly name, e.g. "Land Preparation"
    pub fn label(&self) -> &'static str {
        match self {
            Stage::LandPreparation => "Land Preparation",
            Stage::Planting => "Planting",
            Stage::VegetativeGrowth => "Vegetative Growth",
            Stage::Flowering => "Flowering",
            Stage::FruitDevelopment => "Fruit Development",
            Stage::Harvest => "Harvest",
            Stage::PostHarvest => "Post Harvest",
        }
    }

    /// Position in the lifecycle, starting at 0
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The stage after this one, or `None` for the final stage
    pub fn next(&self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn is_last(&self) -> bool {
        self.next().is_none()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "LAND_PREPARATION" => Ok(Stage::LandPreparation),
            "PLANTING" => Ok(Stage::Planting),
            "VEGETATIVE_GROWTH" => Ok(Stage::VegetativeGrowth),
            "FLOWERING" => Ok(Stage::Flowering),
            "FRUIT_DEVELOPMENT" => Ok(Stage::FruitDevelopment),
            "HARVEST" | "HARVESTING" => Ok(Stage::Harvest),
            "POST_HARVEST" => Ok(Stage::PostHarvest),
            _ => Err(format!("unknown stage: {}", s)),
        }
    }
}

/// Grouping key for tasks: a known stage, or unassigned (sorted last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKey {
    Stage(Stage),
    Unassigned,
}

impl StageKey {
    /// Coerce a free-text task category
    pub fn from_category(category: &str) -> Self {
        category
            .parse::<Stage>()
            .map(StageKey::Stage)
            .unwrap_or(StageKey::Unassigned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKey::Stage(stage) => stage.as_str(),
            StageKey::Unassigned => UNASSIGNED,
        }
    }
}

/// Group tasks by stage, in lifecycle order with unassigned tasks last.
pub fn group_by_stage(tasks: &[Task]) -> Vec<(StageKey, Vec<&Task>)> {
    let mut groups: std::collections::BTreeMap<StageKey, Vec<&Task>> =
        std::collections::BTreeMap::new();
    for task in tasks {
        groups.entry(task.stage_key()).or_default().push(task);
    }
    groups.into_iter().collect()
}

/// Which tasks a view lets the user act on.
///
/// The planting detail view lets every task be completed; the task list
/// view locks tasks that belong to stages after the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actionability {
    All,
    UpToCurrentStage,
}

impl Actionability {
    pub fn is_actionable(&self, task: &Task, current: Stage) -> bool {
        match self {
            Actionability::All => true,
            Actionability::UpToCurrentStage => match task.stage_key() {
                StageKey::Stage(stage) => stage <= current,
                StageKey::Unassigned => true,
            },
        }
    }
}

/// True when `stage` has at least one task and every one of them is completed.
pub fn stage_complete(tasks: &[Task], stage: Stage) -> bool {
    let mut in_stage = tasks.iter().filter(|t| t.in_stage(stage)).peekable();
    in_stage.peek().is_some() && in_stage.all(|t| t.is_completed())
}

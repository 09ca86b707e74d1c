//! L-T-P-S component weighting.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Weight applied to labels that match none of the known components.
pub const FALLBACK_WEIGHT: u32 = 1;

/// The attendance component a free-text label refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    Lecture,
    Practical,
    Tutorial,
    Skilling,
    Other,
}

impl ComponentKind {
    /// Classifies a label as it appears in the ERP table.
    ///
    /// The ERP is inconsistent about these (`"L"`, `"Lecture"`, `"Skilling"`,
    /// `"Skill"`...), so single letters match exactly and anything longer is a
    /// substring match. Checked in order Lecture > Practical > Tutorial > Skilling.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();

        if label == "l" || label.contains("lecture") {
            ComponentKind::Lecture
        } else if label == "p" || label.contains("practical") {
            ComponentKind::Practical
        } else if label == "t" || label.contains("tutorial") {
            ComponentKind::Tutorial
        } else if label == "s" || label.contains("skill") {
            ComponentKind::Skilling
        } else {
            ComponentKind::Other
        }
    }
}

/// Per-component weights. Admin tooling may ship a different table, so this is
/// always passed in rather than read from constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTable {
    pub lecture: u32,
    pub practical: u32,
    pub tutorial: u32,
    pub skilling: u32,
}

impl WeightTable {
    /// Loads a weight table from a JSON file such as
    /// `{"lecture": 100, "practical": 50, "tutorial": 25, "skilling": 25}`.
    ///
    /// # Returns
    /// * `Ok(WeightTable)` - The validated table
    /// * `Err` - If the file can't be read, parsed, or contains a zero weight
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let table: WeightTable = serde_json::from_str(&content)?;
        table.validate()?;
        Ok(table)
    }

    /// Rejects tables with a zero weight; a zero would silently erase a
    /// component from the aggregate.
    pub fn validate(&self) -> Result<(), String> {
        for (name, weight) in [
            ("lecture", self.lecture),
            ("practical", self.practical),
            ("tutorial", self.tutorial),
            ("skilling", self.skilling),
        ] {
            if weight == 0 {
                return Err(format!("weight for {} must be positive", name));
            }
        }
        Ok(())
    }

    /// Weight for an already classified component.
    pub fn weight_for(&self, kind: ComponentKind) -> u32 {
        let weight = match kind {
            ComponentKind::Lecture => self.lecture,
            ComponentKind::Practical => self.practical,
            ComponentKind::Tutorial => self.tutorial,
            ComponentKind::Skilling => self.skilling,
            ComponentKind::Other => FALLBACK_WEIGHT,
        };
        weight.max(1)
    }

    /// Weight for a raw label. Unknown labels get [`FALLBACK_WEIGHT`] and a warning,
    /// since a new upstream component type would otherwise skew aggregates unnoticed.
    pub fn weight_of(&self, label: &str) -> u32 {
        let kind = ComponentKind::from_label(label);
        if kind == ComponentKind::Other {
            warn!(label = %label, "Unrecognized component label, using fallback weight");
        }
        self.weight_for(kind)
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            lecture: 100,
            practical: 50,
            tutorial: 25,
            skilling: 25,
        }
    }
}

/// `attended / conducted * 100`, rounded to 2 decimals. Zero when nothing was
/// conducted.
pub fn percent(attended: u64, conducted: u64) -> f64 {
    if conducted == 0 {
        return 0.0;
    }
    round2(attended as f64 / conducted as f64 * 100.0)
}

/// Rounds for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

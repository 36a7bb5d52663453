use crate::models::RuleSet;
use serde::{Deserialize, Serialize};

/// User configuration from DocFlow Config.yaml
///
/// Contains tuning knobs and defaults for the three batch jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub settings: DocFlowSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocFlowSettings {
    /// Worker pool size; 0 means host parallelism
    pub max_workers: usize,

    /// Upper bound for one DOCX → PDF conversion
    pub conversion_timeout_secs: u64,

    /// LibreOffice executable used for conversions
    pub soffice_path: String,

    /// Root for per-task temporary folders; empty means the system temp dir
    pub temp_dir: String,

    /// Separator between the invoice key and the rest of a document name
    pub key_separator: String,

    /// Only process files whose name contains this text (empty = all)
    pub name_filter: String,

    pub debug_mode: bool,

    pub log_dir: String,

    pub font: FontSettings,
}

impl Default for DocFlowSettings {
    fn default() -> Self {
        Self {
            max_workers: 0,
            conversion_timeout_secs: 120,
            soffice_path: "soffice".to_string(),
            temp_dir: String::new(),
            key_separator: " - ".to_string(),
            name_filter: String::new(),
            debug_mode: false,
            log_dir: "logs".to_string(),
            font: FontSettings::default(),
        }
    }
}

impl DocFlowSettings {
    /// Resolved worker pool size (never zero)
    pub fn pool_size(&self) -> usize {
        if self.max_workers > 0 {
            self.max_workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// The name filter, or None when it is blank
    pub fn name_filter(&self) -> Option<&str> {
        let filter = self.name_filter.trim();
        (!filter.is_empty()).then_some(filter)
    }
}

/// Target font for the font normalization job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSettings {
    pub family: String,
    pub body_size_pt: f32,
    pub footer_size_pt: f32,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            family: "Calibri".to_string(),
            body_size_pt: 12.0,
            footer_size_pt: 8.0,
        }
    }
}

impl FontSettings {
    /// Body size in WordprocessingML half-points
    pub fn body_half_points(&self) -> u32 {
        to_half_points(self.body_size_pt)
    }

    /// Footer size in WordprocessingML half-points
    pub fn footer_half_points(&self) -> u32 {
        to_half_points(self.footer_size_pt)
    }
}

fn to_half_points(size_pt: f32) -> u32 {
    (size_pt * 2.0).round().max(1.0) as u32
}

/// Replacement rule table from DocFlow Rules.yaml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub rules: RuleSet,
}

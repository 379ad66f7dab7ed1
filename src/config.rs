//! Loading application configuration (prompts, problem bank, sync/store/identity
//! settings) from TOML.
//!
//! See `AppConfig` and `Prompts` for expected schema. Every section is optional.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Difficulty;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub problems: Vec<ProblemCfg>,
  #[serde(default)]
  pub sync: SyncCfg,
  #[serde(default)]
  pub store: StoreCfg,
  #[serde(default)]
  pub identity: IdentityCfg,
}

/// Extra library problem accepted in TOML configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ProblemCfg {
  pub id: String,
  pub title: String,
  pub difficulty: Difficulty,
  #[serde(default)] pub description: String,
  #[serde(default)] pub initial_code: String,
}

/// Debounce window and stats shape for the progress synchronizer.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SyncCfg {
  pub debounce_ms: u64,
  pub recent_limit: usize,
}
impl Default for SyncCfg {
  fn default() -> Self { Self { debounce_ms: 2000, recent_limit: 5 } }
}
impl SyncCfg {
  pub fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
  #[default]
  Memory,
  Fs,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreCfg {
  pub kind: StoreKind,
  pub data_dir: PathBuf,
}
impl Default for StoreCfg {
  fn default() -> Self { Self { kind: StoreKind::Memory, data_dir: PathBuf::from("./data") } }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct IdentityCfg {
  pub enabled: bool,
  /// Email domains allowed to sign in. Empty means any.
  pub allowed_domains: Vec<String>,
}
impl Default for IdentityCfg {
  fn default() -> Self { Self { enabled: true, allowed_domains: Vec::new() } }
}

/// Prompts used by the OpenAI client. Defaults target Verilog interview practice.
/// Override them in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  // Problem generation
  pub generate_system: String,
  pub generate_user_template: String,
  // Grading
  pub verify_system: String,
  pub verify_user_template: String,
  // Tutor chat
  pub tutor_system_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      generate_system: "You write Verilog interview problems. Respond ONLY with strict JSON.".into(),
      generate_user_template: "Generate a unique Verilog interview question.\nDifficulty: {difficulty}.\nFocus on digital logic design concepts common in FPGA/ASIC interviews (FSMs, counters, FIFOs, clock domain crossing, arithmetic).\nThe description should be clear and concise Markdown including the IO ports.\nThe initialCode must be a valid Verilog module definition with an empty body or comments showing where to write code.\nReturn JSON with fields: title, difficulty, description, initialCode.".into(),
      verify_system: "You are a Senior FPGA Engineer interviewing a candidate. Reply as compact JSON.".into(),
      verify_user_template: "**Problem Statement:**\n{description}\n\n**Module Interface (Reference):**\n{initial_code}\n\n**Candidate's Solution:**\n{code}\n\n**Task:**\n1. Check for Verilog syntax errors.\n2. Verify functional correctness against the problem statement.\n3. Check for common pitfalls (latches vs flip-flops, blocking vs non-blocking assignments).\n4. If correct, return true. If incorrect, explain why clearly.\n\nReturn JSON {\"isCorrect\": boolean, \"feedback\": string, \"optimizationTips\": string}. Use Markdown inside strings.".into(),
      tutor_system_template: "You are an expert Verilog Tutor and FPGA Design Engineer.\nThe user is a student solving a coding interview problem.\n\n**Current Problem:**\nTitle: {title}\nDescription: {description}\n\n**User's Current Code:**\n```verilog\n{code}\n```\n\n**Guidelines:**\n1. Be helpful, encouraging, and concise.\n2. Do NOT provide the full solution code immediately. Guide the user to the answer.\n3. Explain concepts (blocking vs non-blocking, FSM state encoding, ...) if the user seems stuck.\n4. If the user asks to debug, look at their Current Code provided above.".into(),
    }
  }
}

/// Parse a TOML document into `AppConfig`.
pub fn parse_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str::<AppConfig>(s)
}

/// Attempt to load `AppConfig` from VERICODE_CONFIG_PATH. On any parsing/IO error, returns None.
/// VERICODE_DATA_DIR overrides `[store].data_dir` either way.
pub fn load_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("VERICODE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_config(&s) {
      Ok(cfg) => {
        info!(target: "vericode_backend", %path, problems = cfg.problems.len(), "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "vericode_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "vericode_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

/// Config from env with defaults and env overrides applied.
pub fn resolve_config() -> AppConfig {
  let mut cfg = load_config_from_env().unwrap_or_default();
  if let Ok(dir) = std::env::var("VERICODE_DATA_DIR") {
    cfg.store.data_dir = PathBuf::from(dir);
  }
  cfg
}

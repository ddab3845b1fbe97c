// SPDX-License-Identifier: CEPL-1.0
use lumen_render_vk::{MatchPolicy, PresentPreference, VkOptions};
use serde::Deserialize;
use std::{fs, io, path::Path};

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicyCfg {
    #[default]
    First,
    Last,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            title: "lumen".into(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub present_mode: PresentModeCfg,
    #[serde(default)]
    pub match_policy: MatchPolicyCfg,
    #[serde(default = "default_validation")]
    pub validation: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            clear_color: default_clear(),
            present_mode: PresentModeCfg::default(),
            match_policy: MatchPolicyCfg::default(),
            validation: default_validation(),
        }
    }
}

impl RenderCfg {
    pub fn vk_options(&self) -> VkOptions {
        VkOptions {
            present: match self.present_mode {
                PresentModeCfg::Fifo => PresentPreference::Fifo,
                PresentModeCfg::Mailbox => PresentPreference::Mailbox,
            },
            match_policy: match self.match_policy {
                MatchPolicyCfg::First => MatchPolicy::First,
                MatchPolicyCfg::Last => MatchPolicy::Last,
            },
            validation: self.validation,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AppCfg {
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
}

fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}
fn default_validation() -> bool {
    cfg!(debug_assertions)
}

/// Missing file means defaults; so does a malformed one. The second value
/// describes what went wrong, for logging once a subscriber is installed.
pub fn load_cfg(path: &Path) -> (AppCfg, Option<String>) {
    match fs::read_to_string(path) {
        Ok(s) => match parse_cfg(&s) {
            Ok(cfg) => (cfg, None),
            Err(e) => (
                AppCfg::default(),
                Some(format!("{}: {e}; using defaults", path.display())),
            ),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => (AppCfg::default(), None),
        Err(e) => (
            AppCfg::default(),
            Some(format!("reading {}: {e}; using defaults", path.display())),
        ),
    }
}

pub fn parse_cfg(s: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(s)
}

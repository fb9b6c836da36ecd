//! Pre-flight checks for `.backbrief/` layout and configuration.
//!
//! Every problem is collected so the operator sees the whole list at once;
//! no phase runs while any remain.

use std::path::Path;

use crate::io::config::{BackbriefConfig, read_config};
use crate::io::init::{FrameworkPaths, ProjectPaths};

/// One-run overrides from the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub max_budget_usd: Option<f64>,
}

impl ConfigOverrides {
    pub fn apply(&self, cfg: &mut BackbriefConfig) {
        if let Some(model) = &self.model {
            cfg.agent.model = Some(model.clone());
        }
        if let Some(budget) = self.max_budget_usd {
            cfg.agent.max_budget_usd = Some(budget);
        }
    }
}

/// Result of checking a project root.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectCheck {
    /// Layout is complete; config has overrides applied.
    Ready(BackbriefConfig),
    Invalid(Vec<String>),
}

/// Check the project layout, rule documents and configuration.
pub fn check_project(root: &Path, overrides: &ConfigOverrides) -> ProjectCheck {
    let paths = ProjectPaths::new(root);
    let mut problems = Vec::new();

    if !paths.data_dir.is_dir() {
        problems.push(format!(
            "missing project directory {} (run `backbrief init`)",
            paths.data_dir.display()
        ));
        return ProjectCheck::Invalid(problems);
    }

    let mut cfg = match read_config(&paths.config_path) {
        Ok(cfg) => cfg,
        Err(err) => {
            problems.push(format!("{err:#}"));
            return ProjectCheck::Invalid(problems);
        }
    };
    overrides.apply(&mut cfg);
    problems.extend(cfg.problems());

    let framework = FrameworkPaths::resolve(&paths, &cfg);
    if !framework.dir.is_dir() {
        problems.push(format!(
            "missing framework directory {}",
            framework.dir.display()
        ));
    } else {
        for rules in [&framework.agent_rules_path, &framework.review_rules_path] {
            if !rules.is_file() {
                problems.push(format!("missing {}", rules.display()));
            }
        }
    }

    if problems.is_empty() {
        ProjectCheck::Ready(cfg)
    } else {
        ProjectCheck::Invalid(problems)
    }
}

// src/scheduler/report.rs

//! Outcome records of one full run.

use serde::Serialize;

/// Outcome of one instance within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub name: String,
    /// Task that failed or was stopped, if the run got that far.
    pub task_name: Option<String>,
    pub success: bool,
    pub error: String,
}

impl RunResult {
    pub fn succeeded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            task_name: None,
            success: true,
            error: String::new(),
        }
    }

    pub fn failed(
        name: impl Into<String>,
        task_name: Option<&str>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            task_name: task_name.map(str::to_string),
            success: false,
            error: error.into(),
        }
    }
}

/// Aggregate of every [`RunResult`] produced by one full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub total_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub failed_names: Vec<String>,
    pub results: Vec<RunResult>,
}

impl RunReport {
    pub fn from_results(results: Vec<RunResult>) -> Self {
        let failed_names: Vec<String> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.name.clone())
            .collect();
        let failed_count = failed_names.len();

        Self {
            success: failed_count == 0,
            total_count: results.len(),
            success_count: results.len() - failed_count,
            failed_count,
            failed_names,
            results,
        }
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::from_results(Vec::new())
    }
}

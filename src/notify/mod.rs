// src/notify/mod.rs

//! Run-report notifications.
//!
//! - [`serverchan`] pushes the report through the ServerChan service.

pub mod serverchan;

use std::fmt::{Debug, Write as _};
use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::scheduler::RunReport;

pub use serverchan::ServerChanNotifier;

/// Receives the aggregated report at the end of every full run.
///
/// Failures are logged by the caller and never fail the run.
pub trait Notifier: Send + Sync + Debug {
    fn send<'a>(
        &'a self,
        report: &'a RunReport,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// One-line summary: the success ratio, or the failed instance names.
pub fn build_title(report: &RunReport) -> String {
    if report.success {
        return format!(
            "DaCapo run succeeded ({}/{})",
            report.success_count, report.total_count
        );
    }
    if !report.failed_names.is_empty() {
        return format!("DaCapo run failed - {}", report.failed_names.join(", "));
    }
    format!(
        "DaCapo run failed ({}/{})",
        report.failed_count, report.total_count
    )
}

/// Markdown body: counts, succeeded instances, then every failure with its
/// task and error in a fenced block.
pub fn build_content(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str("## Summary\n\n");
    let _ = writeln!(out, "- **Total**: {}", report.total_count);
    let _ = writeln!(out, "- **Succeeded**: {}", report.success_count);
    let _ = writeln!(out, "- **Failed**: {}", report.failed_count);
    out.push_str("\n---\n\n");

    if report.success_count > 0 {
        out.push_str("## Succeeded\n\n");
        for r in report.results.iter().filter(|r| r.success) {
            let _ = writeln!(out, "- **{}**", r.name);
        }
        out.push('\n');
    }

    if report.failed_count > 0 {
        out.push_str("## Failed\n\n");
        for r in report.results.iter().filter(|r| !r.success) {
            match r.task_name.as_deref() {
                Some(task) => {
                    let _ = writeln!(out, "### {} - task: {}\n", r.name, task);
                }
                None => {
                    let _ = writeln!(out, "### {}\n", r.name);
                }
            }
            out.push_str("```\n");
            out.push_str(if r.error.is_empty() {
                "unknown error"
            } else {
                &r.error
            });
            out.push_str("\n```\n\n");
        }
    }

    out
}

//! Maintenance commands: the nightly sweep and turn-count reconciliation.

use anyhow::Result;
use console::style;

use tutorlab_types::session::SessionId;

use crate::state::AppState;

/// Close yesterday's open sessions now, exactly as the scheduler would.
pub async fn sweep(state: &AppState, json: bool) -> Result<()> {
    let report = state.scheduler.execute_now().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Sweep for {}",
        style("🧹").bold(),
        style(report.target_date).bold()
    );
    println!("  Closed:  {}", style(report.reset_count).green());
    println!("  Skipped: {}", report.skipped_count);
    if report.error_count > 0 {
        println!("  Failed:  {}", style(report.error_count).red());
        for failure in &report.errors {
            println!(
                "    {} session {}: {}",
                style("✗").red(),
                failure.session_id,
                style(&failure.error).dim()
            );
        }
    }
    println!("  {}", style(format!("{} ms", report.elapsed_ms)).dim());
    println!();

    if !report.success() {
        anyhow::bail!("{} session(s) could not be closed", report.error_count);
    }
    Ok(())
}

/// Recount a session from its message log, clearing any active override.
pub async fn reconcile(state: &AppState, session_id: i64, json: bool) -> Result<()> {
    let result = state.ledger.force_reconcile(SessionId(session_id)).await?;

    if json {
        let out = serde_json::json!({
            "session_id": session_id,
            "progress": result.progress,
            "changed": result.changed,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let verdict = if result.changed {
        style("updated").yellow()
    } else {
        style("already consistent").green()
    };
    println!();
    println!(
        "  Session {}: {} turn(s), {} ({verdict})",
        style(session_id).bold(),
        result.progress.turn_count,
        if result.progress.completed { "completed" } else { "open" },
    );
    println!();
    Ok(())
}

//! Study status dashboard command.

use anyhow::Result;
use console::style;

use tutorlab_infra::filesystem::database_path;
use tutorlab_types::session::UserProgress;

use crate::state::AppState;

/// Display today's topic, participant progress, and system info.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let today = state.clock.today();
    let topic = state.calendar.topic_for(today);
    let participants = state.progress_service.list_users_with_progress().await?;

    let started = participants.iter().filter(|p| p.session_id.is_some()).count();
    let completed = participants.iter().filter(|p| p.progress.completed).count();

    if json {
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "date": today,
            "topic": topic,
            "participants": {
                "total": participants.len(),
                "started": started,
                "completed": completed,
            },
            "admin_login": state.auth_service.admin_enabled(),
            "sweep_at": state.scheduler.at().format("%H:%M").to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} tutorlab v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("  {}", style("── Today ──").dim());
    println!("  Date:  {}", style(today).bold());
    println!("  Topic: {} ({})", style(&topic.name).cyan(), topic.topic_id);
    println!();

    println!("  {}", style("── Participants ──").dim());
    println!("  Total:     {}", style(participants.len()).bold());
    println!("  Started:   {}", started);
    println!("  Completed: {}", style(completed).green());
    println!();

    for p in &participants {
        println!("  {}", format_participant(p));
    }
    if !participants.is_empty() {
        println!();
    }

    println!("  {}", style("── System ──").dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!(
        "  Database: {}",
        style(database_path(&state.data_dir, &state.config.store).display()).dim()
    );
    println!(
        "  Sweep at: {}",
        style(state.scheduler.at().format("%H:%M")).dim()
    );
    let admin = if state.auth_service.admin_enabled() {
        style("enabled").green()
    } else {
        style("disabled").yellow()
    };
    println!("  Admin:    {admin}");
    println!();

    Ok(())
}

fn format_participant(p: &UserProgress) -> String {
    let mark = if p.progress.completed {
        style("✓").green().to_string()
    } else if p.session_id.is_some() {
        style("…").yellow().to_string()
    } else {
        style("·").dim().to_string()
    };
    let turns = match p.user.quota().threshold() {
        Some(n) => format!("{}/{}", p.progress.turn_count, n),
        None => p.progress.turn_count.to_string(),
    };
    format!("{mark} {:<20} {:<7} {turns}", p.user.student_id, p.user.group.to_string())
}

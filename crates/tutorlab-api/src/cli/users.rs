//! Participant management commands.

use anyhow::{Result, bail};
use console::style;

use tutorlab_types::user::{ExperimentGroup, NewUser};

use crate::state::AppState;

/// Seed the participants listed in `config.toml`.
pub async fn seed_configured(state: &AppState) -> Result<()> {
    if state.config.users.is_empty() {
        return Ok(());
    }
    let summary = state.auth_service.seed_users(&state.config.users).await?;
    tracing::info!(
        inserted = summary.inserted,
        existing = summary.existing,
        "configured participants seeded"
    );
    Ok(())
}

/// Add participants from the command line.
///
/// Without `--group`, the group is read from a `groupN` marker in each
/// student ID.
pub async fn seed_users(
    state: &AppState,
    students: Vec<String>,
    group: Option<ExperimentGroup>,
    json: bool,
) -> Result<()> {
    let mut new_users = Vec::with_capacity(students.len());
    for student_id in students {
        let student_id = student_id.trim().to_string();
        if student_id.is_empty() {
            continue;
        }
        let Some(group) = group.or_else(|| ExperimentGroup::infer_from_username(&student_id)) else {
            bail!("cannot infer a group for '{student_id}'; pass --group");
        };
        new_users.push(NewUser {
            student_id,
            group,
            max_turns: None,
            target_turns: None,
            password: None,
        });
    }

    let summary = state.auth_service.seed_users(&new_users).await?;

    if json {
        let out = serde_json::json!({
            "inserted": summary.inserted,
            "existing": summary.existing,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    for user in &new_users {
        println!(
            "  {} {} ({})",
            style("+").green(),
            style(&user.student_id).bold(),
            user.group
        );
    }
    println!(
        "\n  {} added, {} already present",
        style(summary.inserted).green().bold(),
        summary.existing
    );
    println!();
    Ok(())
}

/// Replace a participant's quota columns.
pub async fn set_quota(
    state: &AppState,
    student_id: &str,
    max_turns: Option<u32>,
    target_turns: Option<u32>,
    json: bool,
) -> Result<()> {
    let user = state
        .progress_service
        .set_quota(student_id, max_turns, target_turns)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
        return Ok(());
    }

    let describe = |v: Option<u32>| v.map_or_else(|| "-".to_string(), |n| n.to_string());
    println!();
    println!(
        "  {} {}: max turns {}, target turns {}",
        style("✓").green(),
        style(&user.student_id).bold(),
        describe(user.max_turns),
        describe(user.target_turns)
    );
    println!();
    Ok(())
}

//! Session inspection and deletion commands.

use anyhow::{Context, Result};
use console::{Style, style};

use storyforge::config::StoryforgeConfig;
use storyforge::state::PipelineState;
use storyforge::store::{Session, SessionStatus};

fn status_style(status: SessionStatus) -> Style {
    match status {
        SessionStatus::Running => Style::new().cyan(),
        SessionStatus::Paused => Style::new().yellow(),
        SessionStatus::Completed => Style::new().green(),
        SessionStatus::Failed => Style::new().red(),
    }
}

pub fn cmd_sessions(
    config: &StoryforgeConfig,
    status: Option<SessionStatus>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let store = config.open_store()?;
    let sessions = store.list_sessions(status, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        match status {
            Some(status) => println!("No {} sessions found.", status),
            None => println!("No sessions found in {}", config.db_path().display()),
        }
        println!();
        return Ok(());
    }

    println!();
    println!(
        "{:<36}  {:<10} {:<18} {:<17} Description",
        "Session", "Status", "Phase", "Updated"
    );
    println!(
        "{:<36}  {:<10} {:<18} {:<17} -----------",
        "-".repeat(36),
        "------",
        "-----",
        "-------"
    );
    for session in &sessions {
        // Pad before styling so escape codes don't break alignment.
        let status = format!("{:<10}", session.status.as_str());
        println!(
            "{:<36}  {} {:<18} {:<17} {}",
            session.session_id,
            status_style(session.status).apply_to(status),
            session.current_phase.as_str(),
            session.updated_at.format("%Y-%m-%d %H:%M"),
            truncate(&session.description, 50)
        );
    }
    println!();
    println!("{} session(s)", sessions.len());
    println!();
    Ok(())
}

pub fn cmd_show(config: &StoryforgeConfig, session_id: &str) -> Result<()> {
    let store = config.open_store()?;
    let session = store
        .get_session(session_id)
        .with_context(|| format!("Failed to load session {}", session_id))?;
    let checkpoints = store.list_checkpoints(session_id)?;

    println!();
    print_session(&session);

    match store.load_state(session_id) {
        Ok(state) => print_state_summary(&state),
        Err(e) => {
            println!();
            println!("{} {}", style("State:").bold(), style(e).dim());
        }
    }

    println!();
    println!("{} {}", style("Checkpoints:").bold(), checkpoints.len());
    if let Some(last) = checkpoints.last() {
        println!(
            "  last: {} at {} ({})",
            last.step,
            last.phase,
            last.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    println!();
    Ok(())
}

pub fn cmd_state(config: &StoryforgeConfig, session_id: &str) -> Result<()> {
    let store = config.open_store()?;
    let state = store
        .load_state(session_id)
        .with_context(|| format!("Failed to load state for session {}", session_id))?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

pub fn cmd_checkpoints(config: &StoryforgeConfig, session_id: &str, details: bool) -> Result<()> {
    let store = config.open_store()?;
    store
        .get_session(session_id)
        .with_context(|| format!("Failed to load session {}", session_id))?;
    let checkpoints = store.list_checkpoints(session_id)?;

    println!();
    if checkpoints.is_empty() {
        println!("No checkpoints recorded for {}", session_id);
        println!();
        return Ok(());
    }

    println!("{:<6} {:<18} {:<18} Created", "Id", "Step", "Phase");
    println!("{:<6} {:<18} {:<18} -------", "--", "----", "-----");
    for checkpoint in &checkpoints {
        println!(
            "{:<6} {:<18} {:<18} {}",
            checkpoint.id,
            checkpoint.step.as_str(),
            checkpoint.phase.as_str(),
            checkpoint.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        if details {
            println!("       input:  {}", style(&checkpoint.input_summary).dim());
            println!("       output: {}", style(&checkpoint.output_summary).dim());
        }
    }
    println!();
    Ok(())
}

pub fn cmd_delete(config: &StoryforgeConfig, session_id: &str, force: bool) -> Result<()> {
    use dialoguer::Confirm;

    let store = config.open_store()?;
    let session = store
        .get_session(session_id)
        .with_context(|| format!("Failed to load session {}", session_id))?;

    if !force {
        let confirm = Confirm::new()
            .with_prompt(format!(
                "Delete session {} ({}) and all its checkpoints?",
                session.session_id,
                truncate(&session.description, 40)
            ))
            .default(false)
            .interact()
            .unwrap_or(false);

        if !confirm {
            println!("Delete cancelled");
            return Ok(());
        }
    }

    // Refuse while another process is driving the session.
    let guard = config.session_locks().acquire(session_id)?;
    store.delete_session(session_id)?;
    guard.remove_lock_file()?;
    tracing::info!(session_id, "Session deleted");
    println!("Deleted session {}", session_id);
    Ok(())
}

fn print_session(session: &Session) {
    println!("{} {}", style("Session:").bold(), session.session_id);
    println!("  description: {}", session.description);
    println!("  mode:        {}", session.mode);
    println!("  phase:       {}", session.current_phase);
    println!(
        "  status:      {}",
        status_style(session.status).apply_to(session.status.as_str())
    );
    if let Some(error) = &session.error_message {
        println!("  error:       {}", style(error).red());
    }
    println!(
        "  created:     {}",
        session.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  updated:     {}",
        session.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_state_summary(state: &PipelineState) {
    let summary = state.summary();
    println!();
    println!("{}", style("State:").bold());
    if !summary.project_name.is_empty() {
        println!("  project:     {}", summary.project_name);
    }
    if let Some(kind) = summary.approval_type {
        println!("  awaiting:    {}", style(kind).yellow());
    }
    if summary.retry_count > 0 {
        println!("  retries:     {}", summary.retry_count);
    }
    println!(
        "  artifacts:   {} characters, {} episodes, {} shots, {} prompts, {} video tasks",
        summary.num_characters,
        summary.num_episodes,
        summary.num_shots,
        summary.num_prompts,
        summary.num_video_tasks
    );
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", head)
    }
}

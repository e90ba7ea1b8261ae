use std::path::PathBuf;

const HISTORY_LIMIT: usize = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".breathcam"));

    let app = breathcam::bootstrap(&data_dir).await?;

    println!("Routines:");
    for action in app.catalog.sorted() {
        println!(
            "  {:<20} {:<24} {:>3}s x{}",
            action.id(),
            action.label(),
            action.total_duration_seconds() / action.repetitions(),
            action.repetitions()
        );
    }

    let history = app.db.list_completed_sessions(HISTORY_LIMIT).await?;
    println!("\nRecent sessions ({}):", history.len());
    for record in history {
        let change = match record.improvement() {
            Some(delta) => format!("{delta:+}"),
            None => "-".to_string(),
        };
        println!(
            "  {}  {:<18} {:<10} {}",
            record.started_at.format("%Y-%m-%d %H:%M"),
            record.action_id.as_deref().unwrap_or("-"),
            record.analysis_state.as_deref().unwrap_or("-"),
            change
        );
    }

    Ok(())
}

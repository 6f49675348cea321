use super::{instant, Store};
use crate::output::print_json;

pub fn run(store: &Store, user_id: &str, at: Option<&str>, json: bool) -> anyhow::Result<()> {
    let now = instant(at)?;
    let tracker = store.tracker()?;
    let state = tracker.get_state(user_id, now)?;
    let session = tracker.get_session(user_id, now)?;

    if json {
        print_json(&serde_json::json!({
            "user_id": user_id,
            "state": state.state,
            "session_id": state.session_id,
            "last_seen_at": state.last_seen_at,
            "inside_work_window": state.inside_work_window,
            "session": session,
        }))?;
        return Ok(());
    }

    let label = state.state.map_or("none", |s| s.as_str());
    println!("{user_id}: {label}");
    println!(
        "  inside work window: {}",
        if state.inside_work_window { "yes" } else { "no" }
    );
    if let Some(seen) = state.last_seen_at {
        println!("  last seen: {}", seen.to_rfc3339());
    }
    if let Some(s) = session {
        println!("  session {} started {}", s.id, s.started_at.to_rfc3339());
        if s.late_start {
            println!("  late start");
        }
        if let Some(ends) = s.window_ends_at {
            println!("  window ends: {}", ends.to_rfc3339());
        }
        if let Some(ended) = s.ended_at {
            println!("  ended: {}", ended.to_rfc3339());
        }
    }
    Ok(())
}

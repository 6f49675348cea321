use super::{instant, Store};
use crate::output::print_json;

pub fn run(store: &Store, at: Option<&str>, json: bool) -> anyhow::Result<()> {
    let now = instant(at)?;
    let tracker = store.tracker()?;
    let report = tracker.run_sweep(now);

    if json {
        print_json(&report)?;
    } else {
        println!(
            "soft_away: {}  away: {}  missed pings: {}  errors: {}",
            report.soft_away, report.away, report.missed_pings, report.errors
        );
    }
    if report.errors > 0 {
        anyhow::bail!("sweep finished with {} error(s)", report.errors);
    }
    Ok(())
}

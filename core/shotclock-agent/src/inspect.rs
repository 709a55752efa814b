//! Debug utility printing the shared registry and today's attributed time.

use chrono::Local;
use shotclock_core::{DataPaths, DesktopProbe, ProcessRegistry, SystemProbe, TrackerStore};

pub fn run(paths: &DataPaths) {
    let registry = ProcessRegistry::new(paths);
    let tracker = TrackerStore::new(paths);
    let probe = SystemProbe::new();

    println!("═══════════════════════════════════════════════════════════");
    println!("  shotclock inspect");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!("Data root: {}", paths.root().display());
    println!();

    println!("── Tracked processes ─────────────────────────────────────");
    let processes = registry.read_all();
    if processes.is_empty() {
        println!("  (no tracked processes)");
    }
    for (pid, record) in &processes {
        let liveness = if probe.pid_alive(*pid) {
            "✓ ALIVE"
        } else {
            "✗ DEAD"
        };
        println!(
            "  {} PID {} [{}] {}s → {}",
            liveness,
            pid,
            record.status.as_str(),
            record.seconds,
            record.path
        );
        println!(
            "      owner {} · started {} · executable {}",
            record.owner, record.first_seen, record.executable
        );
    }
    println!();

    let data = tracker.load();
    println!("── Current week ──────────────────────────────────────────");
    if data.week.is_empty() {
        println!("  (ledger is empty)");
    } else {
        println!(
            "  week {} of {} ({}), user {}",
            data.week, data.year, data.week_description, data.user_id
        );
    }
    println!();

    println!("── Today ─────────────────────────────────────────────────");
    match data.day(Local::now().date_naive()) {
        None => println!("  (nothing attributed today)"),
        Some(day) => {
            for project in &day.projects {
                println!("  {}", project.project_name);
                for session in &project.project_sessions {
                    println!(
                        "    {}/{} · {} across {} session(s)",
                        session.asset_name,
                        session.department,
                        session.total_time,
                        session.asset_sessions.len()
                    );
                }
            }
        }
    }
    println!();

    let index = tracker.load_backup_index();
    println!("── Archived weeks ────────────────────────────────────────");
    if index.backups.is_empty() {
        println!("  (no archives yet)");
    }
    for backup in index.backups.iter().take(5) {
        println!(
            "  week {} of {} ({}) → {}",
            backup.week, backup.year, backup.week_description, backup.path
        );
    }
    if index.backups.len() > 5 {
        println!("  … and {} more", index.backups.len() - 5);
    }
}

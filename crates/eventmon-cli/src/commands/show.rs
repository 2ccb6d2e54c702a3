//! Show command - print the recorded issuance history.

use std::path::Path;

use anyhow::{Context, bail};
use eventmon_config::Config;
use eventmon_recorder::{
    Clock, CredentialKind, IssuanceRecord, Snapshot, SystemClock, load_history, retention_cutoff,
};

use crate::theme::{Theme, format_lifetime, format_timestamp};

/// Per-user totals for the summary table.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct UserSummary {
    pub(crate) records: usize,
    pub(crate) ssh: usize,
    pub(crate) x509: usize,
    pub(crate) newest: Option<u64>,
}

impl UserSummary {
    /// Summarize a newest-first record list.
    pub(crate) fn from_records(records: &[IssuanceRecord]) -> Self {
        let mut summary = Self {
            records: records.len(),
            newest: records.first().map(|r| r.create_time),
            ..Self::default()
        };
        for record in records {
            match record.kind() {
                Some(CredentialKind::Ssh) => summary.ssh = summary.ssh.saturating_add(1),
                Some(CredentialKind::X509) => summary.x509 = summary.x509.saturating_add(1),
                None => {},
            }
        }
        summary
    }
}

/// Print the history stored at `file` (or the configured history file).
pub(crate) fn run_show(
    config: &Config,
    file: Option<&Path>,
    user: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let path = match file {
        Some(path) => path.to_path_buf(),
        None => config.recorder.history_path()?,
    };

    let now = SystemClock.now_secs();
    let cutoff = retention_cutoff(now, config.recorder.retention());
    let store = match load_history(&path, cutoff) {
        Ok(store) => store,
        Err(e) if e.is_not_found() => {
            if json {
                println!("{}", empty_json(user));
            } else {
                println!(
                    "{}",
                    Theme::info(&format!("No history recorded yet at {}", path.display()))
                );
            }
            return Ok(());
        },
        Err(e) => {
            return Err(e).with_context(|| format!("loading {}", path.display()));
        },
    };
    let snapshot = Snapshot::build(&store, now);

    match (user, json) {
        (Some(name), true) => {
            let Some(records) = snapshot.user(name) else {
                bail!("no history for user '{name}'");
            };
            println!("{}", serde_json::to_string_pretty(records)?);
        },
        (None, true) => println!("{}", serde_json::to_string_pretty(&snapshot.users)?),
        (Some(name), false) => {
            let Some(records) = snapshot.user(name) else {
                bail!("no history for user '{name}'");
            };
            print_user(name, records);
        },
        (None, false) => print_summary(&snapshot),
    }
    Ok(())
}

/// JSON printed when no history file exists yet, shaped like the output for
/// an existing file.
fn empty_json(user: Option<&str>) -> &'static str {
    if user.is_some() { "[]" } else { "{}" }
}

// Columns are padded before colouring; escape codes would otherwise count
// toward the width.

fn summary_heading() -> String {
    format!(
        "{} {} {} {}  {}",
        Theme::column(&format!("{:<32}", "USER")),
        Theme::column(&format!("{:>8}", "RECORDS")),
        Theme::column(&format!("{:>6}", "SSH")),
        Theme::column(&format!("{:>6}", "X509")),
        Theme::column("NEWEST"),
    )
}

fn summary_row(name: &str, summary: &UserSummary) -> String {
    let newest = summary
        .newest
        .map_or_else(|| "-".to_owned(), Theme::timestamp);
    format!(
        "{} {:>8} {:>6} {:>6}  {}",
        Theme::user(&format!("{name:<32}")),
        summary.records,
        summary.ssh,
        summary.x509,
        newest,
    )
}

fn user_heading() -> String {
    format!(
        "{} {} {}  {}",
        Theme::column(&format!("{:<18}", "ISSUED")),
        Theme::column(&format!("{:<6}", "KIND")),
        Theme::column(&format!("{:>10}", "LIFETIME")),
        Theme::column("EXPIRES"),
    )
}

fn user_row(record: &IssuanceRecord) -> String {
    let kind = record
        .kind()
        .map_or_else(|| "?".to_owned(), |k| k.to_string());
    format!(
        "{} {} {:>10}  {}",
        Theme::column(&format!("{:<18}", format_timestamp(record.create_time))),
        Theme::kind(&kind, 6),
        format_lifetime(record.lifetime_seconds),
        Theme::timestamp(record.expires_at()),
    )
}

fn print_summary(snapshot: &Snapshot) {
    if snapshot.is_empty() {
        println!("{}", Theme::info("No users in the retention window"));
        return;
    }

    println!("\n{}", Theme::header("Issuance History"));
    println!("{}", summary_heading());
    println!("{}", Theme::separator());

    for (name, records) in &snapshot.users {
        println!("{}", summary_row(name, &UserSummary::from_records(records)));
    }

    println!(
        "\n{} users, {} records\n",
        snapshot.users.len(),
        snapshot.total_records()
    );
}

fn print_user(name: &str, records: &[IssuanceRecord]) {
    println!("\n{} {}", Theme::header("Issuance History for"), Theme::user(name));
    if records.is_empty() {
        println!("{}", Theme::info("All records have expired"));
        return;
    }

    println!("{}", user_heading());
    println!("{}", Theme::separator());

    for record in records {
        println!("{}", user_row(record));
    }
    println!();
}

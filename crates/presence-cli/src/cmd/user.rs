use super::Store;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use presence_core::clock;
use presence_core::config::clamp_score;
use presence_core::types::{Role, User};

#[derive(Subcommand)]
pub enum UserSubcommand {
    /// Create or update a user
    Add {
        /// Stable user id (as forwarded by the auth proxy)
        id: String,
        #[arg(long)]
        name: String,
        /// admin or employee
        #[arg(long, default_value = "employee")]
        role: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        team: Option<String>,
        /// Local work start, 24h HH:mm
        #[arg(long)]
        start: Option<String>,
        /// Local work end, 24h HH:mm (before start = overnight shift)
        #[arg(long)]
        end: Option<String>,
        /// IANA timezone, e.g. Europe/Berlin
        #[arg(long)]
        timezone: Option<String>,
        /// Reliability score in [0, 1]
        #[arg(long)]
        score: Option<f64>,
        /// Mark the user inactive
        #[arg(long)]
        inactive: bool,
    },

    /// List users
    List,
}

pub fn run(store: &Store, subcmd: UserSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        UserSubcommand::Add {
            id,
            name,
            role,
            email,
            team,
            start,
            end,
            timezone,
            score,
            inactive,
        } => {
            let role: Role = role.parse()?;
            for t in start.iter().chain(end.iter()) {
                clock::parse_hhmm(t)?;
            }
            if let Some(tz) = &timezone {
                clock::parse_timezone(tz)?;
            }

            let db = store.db()?;
            let existing = db.get_user(&id).context("failed to read user")?;
            let mut user = existing.unwrap_or_else(|| User::new(id.clone(), name.clone(), role));
            user.name = name;
            user.role = role;
            user.active = !inactive;
            if email.is_some() {
                user.email = email;
            }
            if team.is_some() {
                user.team_id = team;
            }
            if start.is_some() {
                user.work_start_time = start;
            }
            if end.is_some() {
                user.work_end_time = end;
            }
            if timezone.is_some() {
                user.timezone = timezone;
            }
            if let Some(s) = score {
                user.reliability_score = clamp_score(s);
            }
            db.upsert_user(&user).context("failed to save user")?;

            if json {
                print_json(&user)?;
            } else {
                println!("Saved user '{}' ({})", user.id, user.role.as_str());
            }
            Ok(())
        }
        UserSubcommand::List => {
            let users = store.db()?.list_users()?;
            if json {
                print_json(&users)?;
                return Ok(());
            }
            if users.is_empty() {
                println!("No users.");
                return Ok(());
            }
            let rows = users
                .iter()
                .map(|u| {
                    vec![
                        u.id.clone(),
                        u.name.clone(),
                        u.role.as_str().to_string(),
                        u.team_id.clone().unwrap_or_else(|| "-".into()),
                        match (&u.work_start_time, &u.work_end_time) {
                            (Some(s), Some(e)) => format!("{s}-{e}"),
                            _ => "any".into(),
                        },
                        u.timezone_name().to_string(),
                        format!("{:.2}", u.reliability_score),
                        if u.active { "yes" } else { "no" }.to_string(),
                    ]
                })
                .collect();
            print_table(
                &["ID", "NAME", "ROLE", "TEAM", "HOURS", "TZ", "SCORE", "ACTIVE"],
                rows,
            );
            Ok(())
        }
    }
}

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use clinic_records_core::{
    format_reference, Database, DateRange, PageRequest, PatientFilters,
};

use crate::config::ClinicConfig;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or migrate the store and report what it holds
    Init,
    /// Print the next free reference number
    NextRef,
    /// Search patients by name or reference number
    Search(SearchArgs),
    /// List logged visits
    Visits(VisitArgs),
    /// Copy the store file
    Backup {
        /// Destination file; a timestamped file in the backup directory otherwise
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Merge patients and visits from another store file
    Merge {
        source: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Export every visit with its patient to CSV
    ExportCsv { output: PathBuf },
    /// Manage the admin account
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Name fragment or reference digits; recent patients when omitted
    pub query: Option<String>,
    #[arg(long)]
    pub sex: Option<String>,
    #[arg(long)]
    pub civil_status: Option<String>,
    #[arg(long)]
    pub age_min: Option<u32>,
    #[arg(long)]
    pub age_max: Option<u32>,
    #[arg(long)]
    pub last_visit_from: Option<String>,
    #[arg(long)]
    pub last_visit_to: Option<String>,
    #[arg(long)]
    pub registered_from: Option<String>,
    #[arg(long)]
    pub registered_to: Option<String>,
    #[arg(long)]
    pub last_name_prefix: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub page: i64,
    /// Defaults to `search.per_page`
    #[arg(long)]
    pub per_page: Option<i64>,
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    fn has_filters(&self) -> bool {
        self.sex.is_some()
            || self.civil_status.is_some()
            || self.age_min.is_some()
            || self.age_max.is_some()
            || self.last_visit_from.is_some()
            || self.last_visit_to.is_some()
            || self.registered_from.is_some()
            || self.registered_to.is_some()
            || self.last_name_prefix.is_some()
    }

    fn filters(&self) -> PatientFilters {
        PatientFilters {
            sex: self.sex.clone(),
            civil_status: self.civil_status.clone(),
            age_min: self.age_min,
            age_max: self.age_max,
            last_visit: DateRange::new(
                self.last_visit_from.as_deref(),
                self.last_visit_to.as_deref(),
            ),
            registered: DateRange::new(
                self.registered_from.as_deref(),
                self.registered_to.as_deref(),
            ),
            last_name_prefix: self.last_name_prefix.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct VisitArgs {
    /// Only this patient's visits
    #[arg(long)]
    pub patient: Option<i64>,
    /// Name fragment or reference digits
    #[arg(long, default_value = "")]
    pub query: String,
    #[arg(long)]
    pub from: Option<String>,
    #[arg(long)]
    pub to: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub page: i64,
    #[arg(long)]
    pub per_page: Option<i64>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Show the admin username
    Show,
    /// Create the admin account
    Create {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Check a username and password
    Verify {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Rename the admin account
    Rename { old: String, new: String },
    /// Set a new password
    Password {
        username: String,
        #[arg(long)]
        password: String,
    },
}

pub fn execute(
    command: Command,
    db: &Database,
    config: &ClinicConfig,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::Init => {
            let location = db
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".into());
            writeln!(out, "Store: {}", location)?;
            writeln!(out, "Patients: {}", db.patient_count()?)?;
            writeln!(out, "Visits: {}", db.visit_count()?)?;
            writeln!(
                out,
                "Next reference: {}",
                format_reference(db.next_reference_number()?)
            )?;
            if !db.admin_exists()? {
                writeln!(out, "No admin account yet; create one with `admin create`")?;
            }
        }
        Command::NextRef => {
            let next = db.next_reference_number()?;
            writeln!(out, "{} ({})", next, format_reference(next))?;
        }
        Command::Search(args) => search(&args, db, config, out)?,
        Command::Visits(args) => visits(&args, db, config, out)?,
        Command::Backup { out: target } => {
            let written = match (target, &config.backup.directory) {
                (Some(target), _) => db.backup(Some(&target))?,
                (None, Some(dir)) => db.backup_to_dir(dir)?,
                (None, None) => db.backup(None)?,
            };
            writeln!(out, "Backup written to {}", written.display())?;
        }
        Command::Merge { source, json } => {
            let report = db
                .merge_database(&source)
                .with_context(|| format!("merging {}", source.display()))?;
            if json {
                writeln!(out, "{}", report.to_json()?)?;
            } else {
                writeln!(
                    out,
                    "Patients: {} added, {} skipped",
                    report.patients_added, report.patients_skipped
                )?;
                writeln!(
                    out,
                    "Visits: {} added, {} skipped",
                    report.visits_added, report.visits_skipped
                )?;
                for error in &report.errors {
                    writeln!(out, "  {}", error)?;
                }
            }
        }
        Command::ExportCsv { output } => {
            let rows = db
                .export_csv(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            writeln!(out, "Exported {} visits to {}", rows, output.display())?;
        }
        Command::Admin { command } => admin(command, db, out)?,
    }
    Ok(())
}

fn search(
    args: &SearchArgs,
    db: &Database,
    config: &ClinicConfig,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let query = args.query.as_deref().unwrap_or("");

    let rows = if args.has_filters() || args.page > 1 || args.per_page.is_some() {
        let page = PageRequest::new(
            args.page,
            args.per_page.unwrap_or(config.search.per_page as i64),
        );
        let page = db.search_patients_filtered(query, &args.filters(), page)?;
        if args.json {
            writeln!(out, "{}", serde_json::to_string_pretty(&page)?)?;
            return Ok(());
        }
        writeln!(
            out,
            "Page {} of {} ({} patients)",
            page.page,
            page.total_pages(),
            page.total
        )?;
        page.rows
    } else {
        let rows = db.search_patients(query)?;
        if args.json {
            writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
            return Ok(());
        }
        rows
    };

    for summary in rows {
        let patient = &summary.patient;
        writeln!(
            out,
            "{:>9}  {:<32}  {:>3} visits  last {}",
            patient
                .reference_number
                .map(format_reference)
                .unwrap_or_else(|| "-".into()),
            patient.full_name(),
            summary.visit_count,
            summary.last_visit.as_deref().unwrap_or("never"),
        )?;
    }
    Ok(())
}

fn visits(
    args: &VisitArgs,
    db: &Database,
    config: &ClinicConfig,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let request = PageRequest::new(
        args.page,
        args.per_page.unwrap_or(config.search.per_page as i64),
    );
    let dates = DateRange::new(args.from.as_deref(), args.to.as_deref());

    if let Some(patient_id) = args.patient {
        if !args.query.is_empty() {
            bail!("--query cannot be combined with --patient");
        }
        let page = db.get_patient_visits_paginated(patient_id, request, &dates)?;
        if args.json {
            writeln!(out, "{}", serde_json::to_string_pretty(&page)?)?;
            return Ok(());
        }
        writeln!(out, "Page {} of {}", page.page, page.total_pages())?;
        for visit in page.rows {
            writeln!(
                out,
                "{:>9}  {} {}  #{}",
                format_reference(visit.reference_number),
                visit.visit_date,
                visit.visit_time.as_deref().unwrap_or("--:--:--"),
                visit.visit_id
            )?;
        }
        return Ok(());
    }

    let page = db.get_visits_paginated(request, &args.query, &dates)?;
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&page)?)?;
        return Ok(());
    }
    writeln!(out, "Page {} of {}", page.page, page.total_pages())?;
    for row in page.rows {
        writeln!(
            out,
            "{:>9}  {} {}  {}",
            format_reference(row.display_reference()),
            row.visit.visit_date,
            row.visit.visit_time.as_deref().unwrap_or("--:--:--"),
            row.full_name()
        )?;
    }
    Ok(())
}

fn admin(command: AdminCommand, db: &Database, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        AdminCommand::Show => match db.admin_username()? {
            Some(username) => writeln!(out, "{}", username)?,
            None => writeln!(out, "No admin account")?,
        },
        AdminCommand::Create { username, password } => {
            let account = db.create_admin(&username, &password)?;
            writeln!(out, "Created admin {}", account.username)?;
        }
        AdminCommand::Verify { username, password } => {
            if !db.verify_admin(&username, &password)? {
                bail!("invalid username or password");
            }
            writeln!(out, "OK")?;
        }
        AdminCommand::Rename { old, new } => {
            if !db.update_admin_username(&old, &new)? {
                bail!("no admin named {}", old);
            }
            writeln!(out, "Renamed {} to {}", old, new)?;
        }
        AdminCommand::Password { username, password } => {
            if !db.update_admin_password(&username, &password)? {
                bail!("no admin named {}", username);
            }
            writeln!(out, "Password updated")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_records_core::{PatientInput, VisitInput};

    fn run(command: Command, db: &Database) -> anyhow::Result<String> {
        let mut out = Vec::new();
        execute(command, db, &ClinicConfig::default(), &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn search_args(query: Option<&str>) -> SearchArgs {
        SearchArgs {
            query: query.map(String::from),
            sex: None,
            civil_status: None,
            age_min: None,
            age_max: None,
            last_visit_from: None,
            last_visit_to: None,
            registered_from: None,
            registered_to: None,
            last_name_prefix: None,
            page: 1,
            per_page: None,
            json: false,
        }
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        let mut input = PatientInput::new("Cruz", "Juan");
        input.sex = Some("Male".into());
        let juan = db.create_patient(&input).unwrap();
        db.add_visit(juan.patient_id, &VisitInput::new("2024-01-10", "09:00"))
            .unwrap();
        db.create_patient(&PatientInput::new("Reyes", "Ana")).unwrap();
        db
    }

    #[test]
    fn test_next_ref() {
        let db = seeded();
        assert_eq!(run(Command::NextRef, &db).unwrap(), "3 (00-00-03)\n");
    }

    #[test]
    fn test_init_reports_missing_admin() {
        let db = seeded();
        let output = run(Command::Init, &db).unwrap();
        assert!(output.contains("Patients: 2"));
        assert!(output.contains("Visits: 1"));
        assert!(output.contains("admin create"));
    }

    #[test]
    fn test_search_plain_and_json() {
        let db = seeded();
        let output = run(Command::Search(search_args(Some("cruz"))), &db).unwrap();
        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("Cruz, Juan"));
        assert!(output.contains("00-00-01"));

        let mut args = search_args(None);
        args.sex = Some("Male".into());
        args.json = true;
        let output = run(Command::Search(args), &db).unwrap();
        let page: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(page["total"], 1);
        assert_eq!(page["rows"][0]["patient"]["last_name"], "Cruz");
    }

    #[test]
    fn test_visits_rejects_query_with_patient() {
        let db = seeded();
        let args = VisitArgs {
            patient: Some(1),
            query: "cruz".into(),
            from: None,
            to: None,
            page: 1,
            per_page: None,
            json: false,
        };
        assert!(run(Command::Visits(args), &db).is_err());
    }

    #[test]
    fn test_admin_lifecycle() {
        let db = seeded();
        run(
            Command::Admin {
                command: AdminCommand::Create {
                    username: "nurse".into(),
                    password: "secret".into(),
                },
            },
            &db,
        )
        .unwrap();

        let verify = |password: &str| {
            run(
                Command::Admin {
                    command: AdminCommand::Verify {
                        username: "nurse".into(),
                        password: password.into(),
                    },
                },
                &db,
            )
        };
        assert!(verify("secret").is_ok());
        assert!(verify("wrong").is_err());

        let output = run(
            Command::Admin {
                command: AdminCommand::Show,
            },
            &db,
        )
        .unwrap();
        assert_eq!(output, "nurse\n");
    }

    #[test]
    fn test_backup_and_export_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.db");
        {
            let db = Database::open(&path).unwrap();
            let juan = db.create_patient(&PatientInput::new("Cruz", "Juan")).unwrap();
            db.add_visit(juan.patient_id, &VisitInput::new("2024-01-10", "09:00"))
                .unwrap();
        }
        let db = Database::open(&path).unwrap();

        let mut config = ClinicConfig::default();
        config.backup.directory = Some(dir.path().join("backups"));
        let mut out = Vec::new();
        execute(Command::Backup { out: None }, &db, &config, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("backups"));

        let csv = dir.path().join("visits.csv");
        let output = run(Command::ExportCsv { output: csv.clone() }, &db).unwrap();
        assert!(output.starts_with("Exported 1 visits"));
        assert!(csv.exists());
    }
}

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::SqlitePool;

use ekklesia_lib::{
    attendance, commands,
    config::Config,
    logging, migrate,
    error::{VALIDATION_PAYMENT_METHOD, VALIDATION_STATUS},
    model::{PaymentFilter, PledgeFilter},
    money::Money,
    reports,
    time::{parse_date, DateRange},
    AppError, NewPayment, NewPledge, PaymentMethod, PledgePaymentInput, PledgeStatus,
};

#[derive(Debug, Parser)]
#[command(name = "ekklesia", about = "Church administration: members, giving, pledges, attendance", version)]
struct Cli {
    /// Database file; overrides EKKLESIA_DB.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines; overrides EKKLESIA_LOG_JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance.
    #[command(subcommand)]
    Db(DbCommand),
    /// Member registry.
    #[command(subcommand)]
    Member(MemberCommand),
    /// Contribution categories.
    #[command(subcommand)]
    Category(CategoryCommand),
    /// Pledges and payments made against them.
    #[command(subcommand)]
    Pledge(PledgeCommand),
    /// Standalone contributions.
    #[command(subcommand)]
    Payment(PaymentCommand),
    /// Services and other gatherings.
    #[command(subcommand)]
    Event(EventCommand),
    /// Check-ins and headcounts.
    #[command(subcommand)]
    Attendance(AttendanceCommand),
    /// Summaries over the ledger and attendance.
    #[command(subcommand)]
    Report(ReportCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply pending migrations.
    Migrate,
    /// List migrations and whether each is applied.
    Status,
}

#[derive(Debug, Args)]
struct MemberFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    email: Option<String>,
    /// member, treasurer, secretary, pastor or admin.
    #[arg(long)]
    role: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    joined_on: Option<String>,
}

impl MemberFields {
    fn into_map(self) -> Map<String, Value> {
        let mut data = Map::new();
        let fields = [
            ("full_name", self.name),
            ("phone", self.phone),
            ("email", self.email),
            ("role", self.role),
            ("joined_on", self.joined_on),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                data.insert(key.into(), Value::String(value));
            }
        }
        data
    }
}

#[derive(Debug, Subcommand)]
enum MemberCommand {
    Add {
        #[command(flatten)]
        fields: MemberFields,
    },
    List {
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        offset: Option<i64>,
    },
    Get {
        id: String,
    },
    Update {
        id: String,
        #[command(flatten)]
        fields: MemberFields,
    },
    /// Soft-delete a member; history is kept.
    Remove {
        id: String,
    },
    Restore {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
enum CategoryCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Explicit id, e.g. `missions`; generated when omitted.
        #[arg(long)]
        id: Option<String>,
    },
    List,
}

#[derive(Debug, Subcommand)]
enum PledgeCommand {
    Create {
        #[arg(long)]
        member: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        amount: Money,
        /// YYYY-MM-DD
        #[arg(long)]
        due: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Record a payment against a pledge.
    Pay {
        pledge_id: String,
        #[arg(long)]
        amount: Money,
        #[arg(long)]
        method: String,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Token that makes a retried attempt fail instead of paying twice.
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    Show {
        pledge_id: String,
    },
    List {
        #[arg(long)]
        member: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    Cancel {
        pledge_id: String,
    },
}

#[derive(Debug, Args)]
struct RangeArgs {
    /// YYYY-MM-DD, inclusive
    #[arg(long)]
    from: Option<String>,
    /// YYYY-MM-DD, inclusive
    #[arg(long)]
    to: Option<String>,
}

impl RangeArgs {
    fn to_range(&self) -> Result<DateRange> {
        let from = self.from.as_deref().map(parse_date).transpose()?;
        let to = self.to.as_deref().map(parse_date).transpose()?;
        let range = DateRange::new(from, to);
        range.validate()?;
        Ok(range)
    }
}

#[derive(Debug, Subcommand)]
enum PaymentCommand {
    Record {
        #[arg(long)]
        member: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        amount: Money,
        #[arg(long)]
        method: String,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// YYYY-MM-DD; today when omitted.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    List {
        #[arg(long)]
        member: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(Debug, Subcommand)]
enum EventCommand {
    Add {
        #[arg(long)]
        title: String,
        /// YYYY-MM-DD
        #[arg(long)]
        on: String,
        #[arg(long, default_value = "service")]
        kind: String,
        #[arg(long)]
        location: Option<String>,
    },
    List,
}

#[derive(Debug, Subcommand)]
enum AttendanceCommand {
    /// Check a member in, or record visitors with --headcount.
    Record {
        event_id: String,
        #[arg(long, conflicts_with = "headcount")]
        member: Option<String>,
        #[arg(long)]
        headcount: Option<i64>,
    },
    List {
        event_id: String,
    },
}

#[derive(Debug, Subcommand)]
enum ReportCommand {
    Contributions {
        #[command(flatten)]
        range: RangeArgs,
    },
    Statement {
        member: String,
        #[command(flatten)]
        range: RangeArgs,
    },
    Pledges,
    Attendance {
        #[command(flatten)]
        range: RangeArgs,
    },
}

fn parse_method(value: &str) -> Result<PaymentMethod> {
    value.parse::<PaymentMethod>().map_err(|err| {
        anyhow::Error::from(
            AppError::new(VALIDATION_PAYMENT_METHOD, err.to_string())
                .with_context("payment_method", value.to_string()),
        )
    })
}

fn parse_status(value: &str) -> Result<PledgeStatus> {
    value.parse::<PledgeStatus>().map_err(|err| {
        anyhow::Error::from(
            AppError::new(VALIDATION_STATUS, err.to_string())
                .with_context("status", value.to_string()),
        )
    })
}

struct Printer {
    json: bool,
}

impl Printer {
    fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T) -> String) -> Result<()> {
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(value).context("serialize output")?
            );
        } else {
            println!("{}", human(value));
        }
        Ok(())
    }
}

fn row_line(row: &Value, fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| match row.get(*f) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "-".to_string(),
            Some(other) => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn rows_table(rows: &[Value], fields: &[&str]) -> String {
    rows.iter()
        .map(|row| row_line(row, fields))
        .collect::<Vec<_>>()
        .join("\n")
}

fn pledge_line(p: &ekklesia_lib::Pledge) -> String {
    format!(
        "{}  {}  {}  {}/{}  {}",
        p.id, p.user_id, p.category_id, p.fulfilled_amount, p.amount, p.status
    )
}

fn payment_line(p: &ekklesia_lib::Payment) -> String {
    format!(
        "{}  {}  {}  {}  {}  {}",
        p.payment_date,
        p.id,
        p.user_id,
        p.category_id,
        p.amount,
        p.payment_method
    )
}

async fn run(command: Commands, pool: &SqlitePool, out: &Printer) -> Result<()> {
    match command {
        Commands::Db(DbCommand::Migrate) => {
            migrate::apply_migrations(pool).await?;
            println!("Migrations applied.");
        }
        Commands::Db(DbCommand::Status) => {
            let applied = migrate::applied_versions(pool).await?;
            for (file, _) in migrate::MIGRATIONS {
                let state = if applied.contains_key(*file) { "applied" } else { "pending" };
                println!("{file:<32} {state}");
            }
        }
        Commands::Member(cmd) => match cmd {
            MemberCommand::Add { fields } => {
                let row = commands::create_command(pool, "members", fields.into_map()).await?;
                out.emit(&row, |r| row_line(r, &["id", "full_name", "role"]))?;
            }
            MemberCommand::List { limit, offset } => {
                let rows = commands::list_command(pool, "members", None, limit, offset).await?;
                out.emit(&rows, |r| rows_table(r, &["id", "full_name", "phone", "role"]))?;
            }
            MemberCommand::Get { id } => {
                let row = commands::get_command(pool, "members", &id)
                    .await?
                    .ok_or_else(|| AppError::member_not_found(&id))?;
                out.emit(&row, |r| row_line(r, &["id", "full_name", "phone", "email", "role", "joined_on"]))?;
            }
            MemberCommand::Update { id, fields } => {
                let row = commands::update_command(pool, "members", &id, fields.into_map()).await?;
                out.emit(&row, |r| row_line(r, &["id", "full_name", "role"]))?;
            }
            MemberCommand::Remove { id } => {
                commands::delete_command(pool, "members", &id).await?;
                println!("Member {id} removed.");
            }
            MemberCommand::Restore { id } => {
                commands::restore_command(pool, "members", &id).await?;
                println!("Member {id} restored.");
            }
        },
        Commands::Category(cmd) => match cmd {
            CategoryCommand::Add { name, description, id } => {
                let mut data = Map::new();
                data.insert("name".into(), Value::String(name));
                if let Some(description) = description {
                    data.insert("description".into(), Value::String(description));
                }
                if let Some(id) = id {
                    data.insert("id".into(), Value::String(id));
                }
                let row = commands::create_command(pool, "categories", data).await?;
                out.emit(&row, |r| row_line(r, &["id", "name"]))?;
            }
            CategoryCommand::List => {
                let rows = commands::list_command(pool, "categories", None, None, None).await?;
                out.emit(&rows, |r| rows_table(r, &["id", "name", "description"]))?;
            }
        },
        Commands::Pledge(cmd) => match cmd {
            PledgeCommand::Create { member, category, amount, due, description } => {
                let due_date = due.as_deref().map(parse_date).transpose()?;
                let pledge = ekklesia_lib::create_pledge(
                    pool,
                    NewPledge {
                        user_id: member,
                        category_id: category,
                        amount,
                        due_date,
                        description,
                    },
                )
                .await?;
                out.emit(&pledge, pledge_line)?;
            }
            PledgeCommand::Pay {
                pledge_id,
                amount,
                method,
                reference,
                description,
                idempotency_key,
            } => {
                let input = PledgePaymentInput {
                    pledge_id,
                    amount,
                    payment_method: parse_method(&method)?,
                    reference_number: reference,
                    description,
                    idempotency_key,
                };
                let pledge = ekklesia_lib::record_pledge_payment(pool, input).await?;
                let progress = ekklesia_lib::pledge_progress(&pledge);
                out.emit(&progress, |p| {
                    format!(
                        "{}  paid {} of {} ({}%)  remaining {}  {}",
                        p.pledge_id, p.fulfilled_amount, p.amount, p.percent, p.remaining, p.status
                    )
                })?;
            }
            PledgeCommand::Show { pledge_id } => {
                let pledge = ekklesia_lib::require_pledge(pool, &pledge_id).await?;
                let progress = ekklesia_lib::pledge_progress(&pledge);
                out.emit(&(pledge, progress), |(p, g)| {
                    format!("{}\nremaining {}  overpaid {}  {}%", pledge_line(p), g.remaining, g.overpaid, g.percent)
                })?;
            }
            PledgeCommand::List { member, category, status } => {
                let filter = PledgeFilter {
                    user_id: member,
                    category_id: category,
                    status: status.as_deref().map(parse_status).transpose()?,
                };
                let pledges = ekklesia_lib::list_pledges(pool, &filter).await?;
                out.emit(&pledges, |ps| {
                    ps.iter().map(pledge_line).collect::<Vec<_>>().join("\n")
                })?;
            }
            PledgeCommand::Cancel { pledge_id } => {
                let pledge = ekklesia_lib::cancel_pledge(pool, &pledge_id).await?;
                out.emit(&pledge, pledge_line)?;
            }
        },
        Commands::Payment(cmd) => match cmd {
            PaymentCommand::Record {
                member,
                category,
                amount,
                method,
                reference,
                description,
                date,
                idempotency_key,
            } => {
                let payment = ekklesia_lib::record_contribution(
                    pool,
                    NewPayment {
                        user_id: member,
                        category_id: category,
                        amount,
                        payment_method: parse_method(&method)?,
                        reference_number: reference,
                        description,
                        payment_date: date.as_deref().map(parse_date).transpose()?,
                        idempotency_key,
                    },
                )
                .await?;
                out.emit(&payment, payment_line)?;
            }
            PaymentCommand::List { member, category, range } => {
                let filter = PaymentFilter {
                    user_id: member,
                    category_id: category,
                    range: range.to_range()?,
                };
                let payments = ekklesia_lib::list_payments(pool, &filter).await?;
                out.emit(&payments, |ps| {
                    ps.iter().map(payment_line).collect::<Vec<_>>().join("\n")
                })?;
            }
        },
        Commands::Event(cmd) => match cmd {
            EventCommand::Add { title, on, kind, location } => {
                let mut data = Map::new();
                data.insert("title".into(), Value::String(title));
                data.insert("starts_on".into(), Value::String(on));
                data.insert("kind".into(), Value::String(kind));
                if let Some(location) = location {
                    data.insert("location".into(), Value::String(location));
                }
                let row = commands::create_command(pool, "events", data).await?;
                out.emit(&row, |r| row_line(r, &["id", "starts_on", "title"]))?;
            }
            EventCommand::List => {
                let rows = commands::list_command(pool, "events", None, None, None).await?;
                out.emit(&rows, |r| rows_table(r, &["id", "starts_on", "kind", "title"]))?;
            }
        },
        Commands::Attendance(cmd) => match cmd {
            AttendanceCommand::Record { event_id, member, headcount } => {
                let record = attendance::record_attendance(
                    pool,
                    &event_id,
                    member.as_deref(),
                    headcount.unwrap_or(1),
                )
                .await?;
                out.emit(&record, |r| {
                    format!("{}  {}  {}", r.event_id, r.member_id.as_deref().unwrap_or("visitors"), r.headcount)
                })?;
            }
            AttendanceCommand::List { event_id } => {
                let records = attendance::list_attendance(pool, &event_id).await?;
                let total = attendance::event_headcount(pool, &event_id).await?;
                out.emit(&records, |rs| {
                    let mut lines: Vec<String> = rs
                        .iter()
                        .map(|r| format!("{}  {}", r.member_id.as_deref().unwrap_or("visitors"), r.headcount))
                        .collect();
                    lines.push(format!("total {total}"));
                    lines.join("\n")
                })?;
            }
        },
        Commands::Report(cmd) => match cmd {
            ReportCommand::Contributions { range } => {
                let totals = reports::contributions_by_category(pool, range.to_range()?).await?;
                out.emit(&totals, |ts| {
                    ts.iter()
                        .map(|t| format!("{:<24} {:>14} ({} payments)", t.category_name, t.total, t.payments))
                        .collect::<Vec<_>>()
                        .join("\n")
                })?;
            }
            ReportCommand::Statement { member, range } => {
                let statement = reports::member_statement(pool, &member, range.to_range()?).await?;
                out.emit(&statement, |s| {
                    let mut lines = vec![format!("{} ({})", s.full_name, s.user_id)];
                    lines.extend(s.payments.iter().map(payment_line));
                    lines.push(format!("total {}", s.total));
                    lines.join("\n")
                })?;
            }
            ReportCommand::Pledges => {
                let summary = reports::pledge_summary(pool).await?;
                out.emit(&summary, |lines| {
                    lines
                        .iter()
                        .map(|l| {
                            format!(
                                "{:<10} {:>4}  committed {}  fulfilled {}  outstanding {}",
                                l.status, l.pledges, l.committed, l.fulfilled, l.outstanding
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                })?;
            }
            ReportCommand::Attendance { range } => {
                let rows = reports::attendance_by_event(pool, range.to_range()?).await?;
                out.emit(&rows, |rs| {
                    rs.iter()
                        .map(|r| format!("{}  {:<32} members {}  total {}", r.starts_on, r.title, r.members, r.headcount))
                        .collect::<Vec<_>>()
                        .join("\n")
                })?;
            }
        },
    }
    Ok(())
}

async fn execute(command: Commands, config: &Config, out: &Printer) -> Result<()> {
    let pool = ekklesia_lib::open_database(&config.db_path)
        .await
        .with_context(|| format!("open database {}", config.db_path.display()))?;
    let outcome = run(command, &pool, out).await;
    pool.close().await;
    outcome
}

fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<AppError>() {
        Some(app) => {
            app.log_with_event("command_failed");
            eprintln!("Error: [{}] {}", app.code(), app.message());
        }
        None => eprintln!("Error: {err:#}"),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config.with_overrides(cli.db.clone(), cli.log_json),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    };
    let guard = match logging::init(&config) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    };

    let printer = Printer { json: cli.json };
    let code = match execute(cli.command, &config, &printer).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };
    drop(guard);
    process::exit(code);
}

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sheet_tools::diff::{DEFAULT_KEY_COLUMN, DEFAULT_LEFT_SHEET, DEFAULT_RIGHT_SHEET};
use sheet_tools::reconcile::{
    ComparisonPolicy, DuplicatePolicy, MissingKeyPolicy, ReconcileConfig, ReconcileReport,
};
use sheet_tools::sync::{self, ReconcileOutputs, SheetSource};
use sheet_tools::title::{
    DEFAULT_DATE_COLUMN, DEFAULT_DATE_FORMAT, DEFAULT_SEPARATOR, DEFAULT_TARGET_COLUMN,
    DEFAULT_TITLE_SHEET, TitleOptions,
};
use sheet_tools::{Result, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ToolError::Logging(err.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Reconcile(args) => execute_reconcile(args),
        Command::ComposeTitle(args) => execute_compose_title(args),
        Command::DiffTitles(args) => execute_diff_titles(args),
    }
}

fn execute_reconcile(args: ReconcileArgs) -> Result<()> {
    for path in [&args.old, &args.new] {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.clone()));
        }
    }

    let config = args.resolve_config()?;
    let old = SheetSource::new(&args.old, &args.old_sheet);
    let new = SheetSource::new(&args.new, &args.new_sheet);
    let outputs = ReconcileOutputs {
        changes: args.changes_output.clone(),
        all: args.all_output.clone(),
        rejected: args.rejected_output.clone(),
    };

    let report = sync::reconcile_workbooks(&old, &new, config, &outputs)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, &outputs);
    }
    Ok(())
}

fn print_summary(report: &ReconcileReport, outputs: &ReconcileOutputs) {
    let summary = &report.summary;
    println!(
        "new: {}, updated: {}, unchanged: {}, old: {}, rejected: {}",
        summary.new, summary.updated, summary.unchanged, summary.old, summary.rejected
    );
    println!("new and updated rows: {}", outputs.changes.display());
    println!("all rows: {}", outputs.all.display());
    if let Some(path) = &outputs.rejected {
        println!("rejected rows: {}", path.display());
    }
}

fn execute_compose_title(args: ComposeTitleArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(ToolError::MissingInput(args.input));
    }

    let options = TitleOptions {
        part_columns: args.part,
        date_column: if args.no_date {
            None
        } else {
            Some(args.date_column)
        },
        separator: args.separator,
        target: args.target,
        date_format: args.date_format,
    };

    let stats = sync::compose_title(&args.input, &args.sheet, &options)?;
    println!(
        "column '{}' written to sheet '{}' ({} rows, {} without a date)",
        options.target, args.sheet, stats.rows, stats.undated
    );
    Ok(())
}

fn execute_diff_titles(args: DiffTitlesArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(ToolError::MissingInput(args.input));
    }

    let diff = sync::diff_titles(&args.input, &args.left_sheet, &args.right_sheet, &args.column)?;
    println!(
        "{} rows written to '{}', {} rows written to '{}'",
        diff.missing_from_right.rows.len(),
        diff.missing_from_right.sheet_name,
        diff.missing_from_left.rows.len(),
        diff.missing_from_left.sheet_name
    );
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Compare, reconcile, and derive columns in Excel workbooks."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify rows of an old and a new sheet as new, updated, unchanged, or old.
    Reconcile(ReconcileArgs),
    /// Derive a composite title column from name and date columns.
    ComposeTitle(ComposeTitleArgs),
    /// List rows whose title exists in only one of two sheets.
    DiffTitles(DiffTitlesArgs),
}

#[derive(clap::Args)]
struct ReconcileArgs {
    /// Workbook holding the old data.
    #[arg(long)]
    old: PathBuf,

    /// Sheet holding the old data.
    #[arg(long, default_value = "old")]
    old_sheet: String,

    /// Workbook holding the new data.
    #[arg(long)]
    new: PathBuf,

    /// Sheet holding the new data.
    #[arg(long, default_value = "new")]
    new_sheet: String,

    /// TOML file with reconcile options. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Key column (repeatable).
    #[arg(long = "key")]
    keys: Vec<String>,

    /// Tracked column, compared in the given order (repeatable).
    #[arg(long = "track")]
    tracked: Vec<String>,

    /// Column copied to the output without comparison (repeatable).
    #[arg(long = "passthrough")]
    passthrough: Vec<String>,

    /// Key column that may carry `:00.0` or `.0` suffixes (repeatable).
    #[arg(long = "identifier")]
    identifiers: Vec<String>,

    /// Handling of rows whose key is empty.
    #[arg(long, value_enum)]
    missing_keys: Option<MissingKeysArg>,

    /// Handling of repeated keys within one sheet.
    #[arg(long, value_enum)]
    duplicates: Option<DuplicatesArg>,

    /// Default comparison of tracked values.
    #[arg(long, value_enum)]
    comparison: Option<ComparisonArg>,

    /// Output workbook for new and updated rows.
    #[arg(long, default_value = "comparison_result.xlsx")]
    changes_output: PathBuf,

    /// Output workbook for every row.
    #[arg(long, default_value = "comparison_result_all.xlsx")]
    all_output: PathBuf,

    /// Output workbook for rows rejected for an empty key.
    #[arg(long)]
    rejected_output: Option<PathBuf>,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

impl ReconcileArgs {
    fn resolve_config(&self) -> Result<ReconcileConfig> {
        let mut config = match &self.config {
            Some(path) => ReconcileConfig::from_path(path)?,
            None => ReconcileConfig::default(),
        };

        override_list(&mut config.key_columns, &self.keys);
        override_list(&mut config.tracked_columns, &self.tracked);
        override_list(&mut config.passthrough_columns, &self.passthrough);
        override_list(&mut config.identifier_columns, &self.identifiers);

        if let Some(policy) = self.missing_keys {
            config.missing_keys = policy.into();
        }
        if let Some(policy) = self.duplicates {
            config.duplicates = policy.into();
        }
        if let Some(policy) = self.comparison {
            config.comparison = policy.into();
        }

        config.validate()?;
        Ok(config)
    }
}

fn override_list(target: &mut Vec<String>, values: &[String]) {
    if !values.is_empty() {
        *target = values.to_vec();
    }
}

#[derive(clap::Args)]
struct ComposeTitleArgs {
    /// Workbook to update in place.
    #[arg(long)]
    input: PathBuf,

    /// Sheet receiving the new column.
    #[arg(long, default_value = DEFAULT_TITLE_SHEET)]
    sheet: String,

    /// Text column joined into the title, in order (repeatable).
    #[arg(long, default_values_t = ["firstname".to_string(), "lastname".to_string()])]
    part: Vec<String>,

    /// Date column appended as the last component.
    #[arg(long, default_value = DEFAULT_DATE_COLUMN)]
    date_column: String,

    /// Build the title from the text columns only.
    #[arg(long)]
    no_date: bool,

    /// Separator placed between components.
    #[arg(long, default_value = DEFAULT_SEPARATOR)]
    separator: String,

    /// Name of the derived column.
    #[arg(long, default_value = DEFAULT_TARGET_COLUMN)]
    target: String,

    /// chrono format of the date component.
    #[arg(long, default_value = DEFAULT_DATE_FORMAT)]
    date_format: String,
}

#[derive(clap::Args)]
struct DiffTitlesArgs {
    /// Workbook holding both sheets; result sheets are written back into it.
    #[arg(long)]
    input: PathBuf,

    #[arg(long, default_value = DEFAULT_LEFT_SHEET)]
    left_sheet: String,

    #[arg(long, default_value = DEFAULT_RIGHT_SHEET)]
    right_sheet: String,

    /// Column compared between the sheets, matched case-insensitively.
    #[arg(long, default_value = DEFAULT_KEY_COLUMN)]
    column: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MissingKeysArg {
    Reject,
    Join,
}

impl From<MissingKeysArg> for MissingKeyPolicy {
    fn from(kind: MissingKeysArg) -> Self {
        match kind {
            MissingKeysArg::Reject => MissingKeyPolicy::Reject,
            MissingKeysArg::Join => MissingKeyPolicy::Join,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DuplicatesArg {
    Error,
    KeepFirst,
}

impl From<DuplicatesArg> for DuplicatePolicy {
    fn from(kind: DuplicatesArg) -> Self {
        match kind {
            DuplicatesArg::Error => DuplicatePolicy::Error,
            DuplicatesArg::KeepFirst => DuplicatePolicy::KeepFirst,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ComparisonArg {
    Canonical,
    Strict,
}

impl From<ComparisonArg> for ComparisonPolicy {
    fn from(kind: ComparisonArg) -> Self {
        match kind {
            ComparisonArg::Canonical => ComparisonPolicy::Canonical,
            ComparisonArg::Strict => ComparisonPolicy::Strict,
        }
    }
}

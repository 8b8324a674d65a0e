// xlst CLI - render xlsx reports from xlsx templates

mod exit_codes;

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use xlst_config::{ConfigError, Settings};
use xlst_engine::{scan_sheet, Directive, DirectiveInfo, RenderOptions, TemplateError, Templater, Value};

use exit_codes::{template_exit_code, EXIT_CONTEXT, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "xlst")]
#[command(about = "Render xlsx reports from xlsx templates and JSON data")]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template against JSON data
    #[command(after_help = "\
Data is a JSON object applied to every sheet, or an array with one object
per sheet. Without --data the template renders against an empty object.

Examples:
  xlst render invoice.xlsx --data invoice.json
  cat rows.json | xlst render list.xlsx --data - -o out.xlsx")]
    Render {
        /// Template workbook (.xlsx)
        template: PathBuf,

        /// JSON data file, or - for stdin
        #[arg(short, long)]
        data: Option<String>,

        /// Report path [default: <template>_report.xlsx]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force word-wrap on every output cell
        #[arg(long)]
        wrap_text: bool,

        /// Replace an existing report
        #[arg(long)]
        force: bool,

        /// Settings file [default: <config dir>/xlst/settings.toml]
        #[arg(long, env = "XLST_CONFIG")]
        config: Option<PathBuf>,

        /// No summary line
        #[arg(short, long)]
        quiet: bool,
    },

    /// List the directives found in a template
    #[command(after_help = "\
Shows range starts and ends with their nesting depth, list rows, and
tags that carry attributes (merge, header).")]
    Inspect {
        /// Template workbook (.xlsx)
        template: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Render { template, data, output, wrap_text, force, config, quiet } => {
            cmd_render(template, data, output, wrap_text, force, config, quiet)
        }
        Commands::Inspect { template, json } => cmd_inspect(template, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn context(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONTEXT, message: msg.into(), hint: None }
    }

    /// Create error from a template error with proper exit code.
    pub fn template(err: TemplateError) -> Self {
        let hint = match &err {
            TemplateError::Io(_) => Some("is the template a readable .xlsx workbook?".to_string()),
            TemplateError::RangeContext { name, .. } => {
                Some(format!("the data must bind \"{}\" to an array of objects", name))
            }
            TemplateError::UnclosedRange { .. } | TemplateError::UnexpectedEnd { .. } => {
                Some("every {{range NAME}} row needs a matching {{end}} row".to_string())
            }
            _ => None,
        };
        Self { code: template_exit_code(&err), message: err.to_string(), hint }
    }

    pub fn config(err: ConfigError) -> Self {
        Self::args(err.to_string()).with_hint(format!("settings live in {}", Settings::config_path_display()))
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// render
// ============================================================================

fn cmd_render(
    template: PathBuf,
    data: Option<String>,
    output: Option<PathBuf>,
    wrap_text: bool,
    force: bool,
    config: Option<PathBuf>,
    quiet: bool,
) -> Result<(), CliError> {
    let settings = match &config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(CliError::config)?;

    let output = output.unwrap_or_else(|| default_output(&template));
    if output.exists() && !(force || settings.output.overwrite) {
        return Err(CliError::args(format!("{} already exists", output.display()))
            .with_hint("pass --force or set output.overwrite = true in settings"));
    }

    let context = read_context(data.as_deref())?;
    let options = RenderOptions {
        wrap_text_in_all_cells: wrap_text || settings.render.wrap_text_in_all_cells,
    };

    let templater = Templater::from_path(&template).map_err(CliError::template)?;
    templater.render_with_options(&context, &options).map_err(CliError::template)?;
    let report = templater.save(&output).map_err(CliError::template)?;

    if !quiet {
        println!("{} -> {}: {}", template.display(), output.display(), report.summary());
    }
    Ok(())
}

/// `reports/invoice.xlsx` -> `reports/invoice_report.xlsx`
fn default_output(template: &Path) -> PathBuf {
    let stem = template.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    template.with_file_name(format!("{}_report.xlsx", stem))
}

fn read_context(source: Option<&str>) -> Result<Value, CliError> {
    let (name, text) = match source {
        None => return Ok(Value::Mapping(Default::default())),
        Some("-") => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| CliError::io(format!("cannot read stdin: {}", e)))?;
            ("stdin".to_string(), text)
        }
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| CliError::io(format!("cannot read {}: {}", path, e)))?;
            (path.to_string(), text)
        }
    };

    serde_json::from_str(&text).map_err(|e| {
        CliError::context(format!("invalid JSON in {}: {}", name, e))
            .with_hint("data must be a JSON object, or an array with one object per sheet")
    })
}

// ============================================================================
// inspect
// ============================================================================

#[derive(Serialize)]
struct SheetDirectives {
    sheet: String,
    rows: usize,
    directives: Vec<DirectiveInfo>,
}

fn cmd_inspect(template: PathBuf, json: bool) -> Result<(), CliError> {
    let workbook = xlst_io::read_workbook(&template).map_err(|e| CliError::template(e.into()))?;
    let sheets: Vec<SheetDirectives> = workbook
        .sheets()
        .iter()
        .map(|sheet| SheetDirectives {
            sheet: sheet.name.clone(),
            rows: sheet.rows.len(),
            directives: scan_sheet(sheet),
        })
        .collect();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let write_err = |e: io::Error| CliError::io(e.to_string());

    if json {
        let text = serde_json::to_string_pretty(&sheets).map_err(|e| CliError::io(e.to_string()))?;
        writeln!(out, "{}", text).map_err(write_err)?;
        return Ok(());
    }

    for entry in &sheets {
        writeln!(out, "{} ({} rows)", entry.sheet, entry.rows).map_err(write_err)?;
        if entry.directives.is_empty() {
            writeln!(out, "  no directives").map_err(write_err)?;
        }
        for info in &entry.directives {
            writeln!(out, "  row {:<5} {}", info.row, describe(&info.directive)).map_err(write_err)?;
        }
    }
    Ok(())
}

fn describe(directive: &Directive) -> String {
    match directive {
        Directive::RangeStart { name, depth } => format!("{}range {}", indent(*depth), name),
        Directive::RangeEnd { depth } => format!("{}end", indent(*depth)),
        Directive::List { name } => format!("list {}", name),
        Directive::Tag { cell, name, merge, header } => {
            let mut flags = Vec::new();
            if *merge {
                flags.push("merge");
            }
            if *header {
                flags.push("header");
            }
            if flags.is_empty() {
                format!("tag {} {}", cell, name)
            } else {
                format!("tag {} {} [{}]", cell, name, flags.join(", "))
            }
        }
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_next_to_template() {
        assert_eq!(default_output(Path::new("dir/invoice.xlsx")), PathBuf::from("dir/invoice_report.xlsx"));
        assert_eq!(default_output(Path::new("plain")), PathBuf::from("plain_report.xlsx"));
    }

    #[test]
    fn describe_directives() {
        assert_eq!(describe(&Directive::RangeStart { name: "items".into(), depth: 1 }), "  range items");
        assert_eq!(describe(&Directive::RangeEnd { depth: 0 }), "end");
        let tag = Directive::Tag { cell: "B3".into(), name: "dept".into(), merge: true, header: false };
        assert_eq!(describe(&tag), "tag B3 dept [merge]");
    }

    #[test]
    fn missing_data_is_empty_object() {
        let value = read_context(None).unwrap();
        assert!(value.as_mapping().is_some_and(|m| m.is_empty()));
    }
}

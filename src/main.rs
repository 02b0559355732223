use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{CommandFactory, Parser};

use docx_comment_merge::config::{init_default_config, MergeSettings, CONFIG_ENV, CONFIG_FILENAME};
use docx_comment_merge::error::merge_error;
use docx_comment_merge::merge::{parse_records, CommentMerger};
use docx_comment_merge::progress::ConsoleProgress;

/// Exit status when the docx or the records cannot be merged at all.
const EXIT_INVALID_INPUT: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "docx-comment-merge")]
#[command(about = "Attach reviewer comments to the matching text of an existing .docx", long_about = None)]
struct Args {
    /// Generate a default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file to (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Input .docx
    #[arg(value_name = "DOCX")]
    input: Option<PathBuf>,

    /// JSON array of comment records (anchor_text, comment_text, author, edit_type_label)
    #[arg(short, long, value_name = "JSON")]
    comments: Option<PathBuf>,

    /// Output .docx (default: <input_stem>_merged.docx)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Config file path (default: search for docx-comment-merge.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Author for records that carry none (overrides config)
    #[arg(long)]
    author: Option<String>,

    /// Minimum paragraph match score 0-100 (overrides config)
    #[arg(long)]
    min_score: Option<f64>,

    /// Also write the merge report as JSON
    #[arg(long, value_name = "JSON")]
    report_json: Option<PathBuf>,

    /// No progress output on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let progress = ConsoleProgress::new(!args.quiet);

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let (Some(input), Some(comments)) = (args.input.clone(), args.comments.clone()) else {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        eprintln!(
            "\n\nUSAGE:\n  docx-comment-merge <input.docx> --comments <records.json>\n\nTIPS:\n  - Default config search: {CONFIG_FILENAME} (upwards), or set {CONFIG_ENV}.\n  - Exit status {EXIT_INVALID_INPUT} means the docx or the records are invalid; a partial merge still exits 0.\n"
        );
        return Ok(ExitCode::SUCCESS);
    };

    let settings = settings_from_args(&args, &input)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| settings.default_output_for(&input));

    let docx = std::fs::read(&input).with_context(|| format!("read docx: {}", input.display()))?;
    let json = std::fs::read_to_string(&comments)
        .with_context(|| format!("read comments json: {}", comments.display()))?;

    let merger = CommentMerger::new(settings, progress.clone());
    let result = parse_records(&json).and_then(|records| {
        progress.info(format!("{} comment records from {}", records.len(), comments.display()));
        merger.merge(&docx, &records)
    });
    let out = match result {
        Ok(out) => out,
        Err(err) if merge_error(&err).is_some_and(|e| e.is_input_problem()) => {
            eprintln!("Nothing merged, the input is invalid: {err:#}");
            return Ok(ExitCode::from(EXIT_INVALID_INPUT));
        }
        Err(err) => return Err(err),
    };

    std::fs::write(&output, &out.docx)
        .with_context(|| format!("write docx: {}", output.display()))?;
    if let Some(path) = args.report_json.as_ref() {
        std::fs::write(path, out.report.to_json()?)
            .with_context(|| format!("write report: {}", path.display()))?;
    }

    if !out.report.is_complete() {
        for d in out.report.details.iter().filter(|d| !d.merged) {
            progress.info(format!(
                "unmatched record {} (best score {:.1}): \"{}\"",
                d.index, d.score, d.anchor_preview
            ));
        }
    }
    println!("{} -> {}", out.report.summary(), output.display());
    Ok(ExitCode::SUCCESS)
}

fn settings_from_args(args: &Args, input: &Path) -> anyhow::Result<MergeSettings> {
    let workdir = input
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let workdir = workdir.canonicalize().unwrap_or(workdir);
    let (mut settings, cfg_path) =
        MergeSettings::resolve(args.config.clone(), &workdir).context("load config")?;
    if let Some(p) = cfg_path {
        if !args.quiet {
            eprintln!("Using config: {}", p.display());
        }
    }
    if let Some(author) = args.author.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        settings.default_author = author.to_string();
    }
    if let Some(score) = args.min_score {
        if !(0.0..=100.0).contains(&score) {
            return Err(anyhow::anyhow!("--min-score must be within 0..=100, got {score}"));
        }
        settings.min_match_score = score;
    }
    Ok(settings)
}

use anyhow::{bail, Context, Result};
use clap::Parser;
use safegate::evaluator::LocalEvaluator;
use safegate::gate::{ApprovalProvider, ConsoleApprovalProvider, ScriptedApprovals};
use safegate::pipeline;
use safegate::plan::{GitDiffPlanner, PlanFilePlanner, Planner};
use safegate::policy;
use safegate::report;
use safegate::risk::RiskLevel;
use safegate::task::{Modes, PolicySource, Task};
use safegate::{audit, report::RunResult};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "safegate",
    about = "A review gate between an automated code editor and your files",
    version
)]
struct Args {
    /// Task description shown in reports and the audit trail
    task: Option<String>,

    /// Read the task description from a file
    #[arg(short, long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Read candidate edits from a JSON plan file
    #[arg(long, value_name = "PATH")]
    plan: Option<PathBuf>,

    /// Derive candidate edits from the git worktree (diff gate)
    #[arg(long)]
    diff: bool,

    /// Working directory root (defaults to current directory)
    #[arg(short, long, default_value = ".", value_name = "DIR")]
    workdir: PathBuf,

    /// Skip the prompt for low-risk edits
    #[arg(long)]
    auto_approve_low: bool,

    /// Preview only, execute nothing
    #[arg(long)]
    dry_run: bool,

    /// Run without prompts (CI-friendly)
    #[arg(long)]
    non_interactive: bool,

    /// Exit non-zero if any evaluated edit meets or exceeds this risk level
    #[arg(long, value_name = "LEVEL")]
    fail_on_risk: Option<String>,

    /// Policy file (JSON or TOML) inside the working directory
    #[arg(long, value_name = "PATH")]
    policy: Option<PathBuf>,

    /// Use a bundled policy preset (see --list-policy-presets)
    #[arg(long, value_name = "ID")]
    policy_preset: Option<String>,

    /// List available policy presets and exit
    #[arg(long)]
    list_policy_presets: bool,

    /// Strict compliance mode: every approval must be explicit
    #[arg(long)]
    compliance_mode: bool,

    /// Export the audit trail to a JSON file
    #[arg(long, value_name = "PATH")]
    audit_export: Option<PathBuf>,

    /// Print a markdown CI summary block
    #[arg(long)]
    ci_summary: bool,

    /// Write the CI summary markdown to a file
    #[arg(long, value_name = "PATH")]
    ci_summary_file: Option<PathBuf>,

    /// Write the machine-readable policy report JSON to a file
    #[arg(long, value_name = "PATH")]
    policy_report: Option<PathBuf>,

    /// Print a markdown safety scorecard block
    #[arg(long)]
    safety_scorecard: bool,

    /// Write the safety scorecard markdown to a file
    #[arg(long, value_name = "PATH")]
    safety_scorecard_file: Option<PathBuf>,

    /// Write the compact machine report JSON to a file
    #[arg(long, value_name = "PATH")]
    machine_report: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.list_policy_presets {
        println!("Available policy presets:");
        for preset in policy::PRESETS {
            println!("- {}: {} - {}", preset.id, preset.name, preset.description);
        }
        return ExitCode::SUCCESS;
    }

    match run(args) {
        Ok(run_result) => {
            if run_result.overall_success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<RunResult> {
    let description =
        safegate::task::description_from(args.task.as_deref(), args.file.as_deref())?;

    let non_interactive = safegate::task::infer_non_interactive(
        args.non_interactive,
        std::env::var_os("CI").is_some(),
        std::io::stdin().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    let modes = Modes {
        dry_run: args.dry_run,
        non_interactive,
        auto_approve_low: args.auto_approve_low,
        compliance_mode: args.compliance_mode,
    };

    let fail_on_risk = args
        .fail_on_risk
        .as_deref()
        .map(|raw| {
            RiskLevel::from_flag(raw).ok_or_else(|| {
                anyhow::anyhow!(
                    "invalid --fail-on-risk level '{}' (expected low, medium, high, or critical)",
                    raw
                )
            })
        })
        .transpose()?;

    let policy_source = match (&args.policy, &args.policy_preset) {
        (Some(_), Some(_)) => bail!("--policy and --policy-preset are mutually exclusive"),
        (Some(path), None) => PolicySource::File(path.clone()),
        (None, Some(id)) => PolicySource::Preset(id.clone()),
        (None, None) => PolicySource::Builtin,
    };

    let task = Task::new(
        description,
        &args.workdir,
        modes,
        fail_on_risk,
        policy_source,
    )?;

    let planner: Box<dyn Planner> = match (&args.plan, args.diff) {
        (Some(_), true) => bail!("--plan and --diff are mutually exclusive"),
        (Some(path), false) => Box::new(PlanFilePlanner::new(path.clone())),
        (None, true) => Box::new(GitDiffPlanner),
        (None, false) => bail!("no edit source: pass --plan <file> or --diff"),
    };

    println!("Task: {}", task.description);
    println!("Policy: {}", task.policy_label);
    if task.modes.dry_run {
        println!("Dry run: no files will be changed");
    }

    let evaluator = LocalEvaluator::new(&task);
    let mut provider: Box<dyn ApprovalProvider> = if task.modes.non_interactive {
        // Never consulted; non-interactive decisions come from thresholds.
        Box::new(ScriptedApprovals::unreachable())
    } else {
        Box::new(ConsoleApprovalProvider)
    };

    let run = pipeline::run(&task, planner.as_ref(), &evaluator, provider.as_mut())?;

    println!("{}", report::render_summary(&task, &run));

    write_artifacts(&args, &task, &run)?;

    Ok(run)
}

fn write_artifacts(args: &Args, task: &Task, run: &RunResult) -> Result<()> {
    if let Some(path) = &args.audit_export {
        audit::export_trail(task, run, path)?;
        println!("Audit trail written to: {}", path.display());
    }

    if args.ci_summary || args.ci_summary_file.is_some() {
        let summary = report::render_ci_summary(task, run);
        if args.ci_summary {
            println!();
            println!("{}", summary);
        }
        if let Some(path) = &args.ci_summary_file {
            write_text(path, &summary)?;
            println!("CI summary written to: {}", path.display());
        }
    }

    if let Some(path) = &args.policy_report {
        let json = serde_json::to_string_pretty(&report::render_policy_report(task, run))?;
        write_text(path, &json)?;
        println!("Policy report written to: {}", path.display());
    }

    if args.safety_scorecard || args.safety_scorecard_file.is_some() {
        let scorecard = report::render_scorecard(task, run);
        if args.safety_scorecard {
            println!();
            println!("{}", scorecard);
        }
        if let Some(path) = &args.safety_scorecard_file {
            write_text(path, &scorecard)?;
            println!("Safety scorecard written to: {}", path.display());
        }
    }

    if let Some(path) = &args.machine_report {
        let json = serde_json::to_string_pretty(&report::render_machine_report(task, run))?;
        write_text(path, &json)?;
        println!("Machine report written to: {}", path.display());
    }

    Ok(())
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, format!("{}\n", content))
        .with_context(|| format!("failed to write {}", path.display()))
}

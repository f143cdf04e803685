// crates/gait-cli/src/main.rs
// ============================================================================
// Module: GAIT CLI Entry Point
// Description: Command dispatcher for gate, runpack, regress, and pack flows.
// Purpose: Provide the offline operator surface with stable exit codes.
// Dependencies: clap, gait-core, gait-runpack, gait-regress, gait-guard,
// gait-scout, tracing-subscriber
// ============================================================================

//! ## Overview
//! The `gait` binary wraps the library crates with a thin, deterministic
//! surface: every command supports `--json` for machine output and
//! `--explain` for a one-line description, and every failure maps to a
//! stable exit code. The CLI performs no network calls; all inputs are
//! local files and environment variables.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod demo;
mod gateway;
mod ticket;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use gait_core::gate::policy;
use gait_core::gate::policytest;
use gait_core::gate::ratelimit;
use gait_core::jcs;
use gait_core::schema::gate::IntentRequest;
use gait_core::schema::gate::Verdict;
use gait_core::sign::KeyConfig;
use gait_core::sign::KeyMode;
use gait_core::sign::SIGNING_KEY_ENV;
use gait_core::sign::SIGNING_PUBLIC_KEY_ENV;
use gait_core::sign::load_signing_key;
use gait_core::sign::load_verifying_key;
use gait_guard::ENCRYPTION_KEY_ENV;
use gait_regress::harness;
use gait_runpack::ReplayOptions;
use gait_runpack::VerifyOptions;
use gait_runpack::replay_stub;
use gait_runpack::verify_zip;
use gait_runpack::write::write_runpack_signed;
use gait_scout::TopActionsInput;
use gait_scout::TopActionsOptions;
use serde::Serialize;
use time::Duration;

use crate::demo::DEMO_RUN_ID;
use crate::demo::build_demo_bundle;
use crate::gateway::GatewaySource;
use crate::gateway::IngestOptions;
use crate::gateway::ingest_logs;
use crate::ticket::format_ticket_footer;
use crate::ticket::ticket_footer_matches_contract;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

const EXIT_OK: u8 = 0;
const EXIT_INTERNAL: u8 = 1;
const EXIT_APPROVAL_REQUIRED: u8 = 3;
const EXIT_POLICY_BLOCKED: u8 = 4;
const EXIT_REGRESSION_FAILED: u8 = 5;
const EXIT_INVALID_INPUT: u8 = 6;
const EXIT_VERIFY_FAILED: u8 = 7;
const EXIT_UNSAFE_REPLAY: u8 = 8;

/// Default output directory for generated artifacts.
const OUT_DIR: &str = "gait-out";
/// Producer version stamped into generated records.
const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "gait", version, disable_help_subcommand = true)]
struct Cli {
    /// Emit JSON output.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,
    /// Print a one-line description of the command and exit.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    explain: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the fully offline deterministic demo and emit a runpack receipt.
    Demo(DemoCommand),
    /// Verify a runpack's files, manifest digest, and signatures.
    Verify(VerifyCommand),
    /// Runpack replay and receipt utilities.
    Run {
        /// Selected run subcommand.
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Policy gate utilities.
    Gate {
        /// Selected gate subcommand.
        #[command(subcommand)]
        command: GateCommands,
    },
    /// Policy scaffolding and validation workflows.
    Policy {
        /// Selected policy subcommand.
        #[command(subcommand)]
        command: PolicyCommands,
    },
    /// Risk reporting utilities.
    Report {
        /// Selected report subcommand.
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Regression harness workflows.
    Regress {
        /// Selected regress subcommand.
        #[command(subcommand)]
        command: RegressCommands,
    },
    /// Gateway log ingestion.
    Gateway {
        /// Selected gateway subcommand.
        #[command(subcommand)]
        command: GatewayCommands,
    },
    /// Evidence pack workflows.
    Pack {
        /// Selected pack subcommand.
        #[command(subcommand)]
        command: PackCommands,
    },
    /// Sweep aged traces and packs by TTL.
    Retention(RetentionCommand),
}

/// Arguments for `demo`.
#[derive(Args, Debug)]
struct DemoCommand {
    /// Output directory for the demo runpack.
    #[arg(long, value_name = "DIR", default_value = OUT_DIR)]
    out_dir: PathBuf,
}

/// Arguments for `verify`.
#[derive(Args, Debug)]
struct VerifyCommand {
    /// Run id or runpack path to verify.
    target: String,
    /// Public key path (raw 32 bytes or base64).
    #[arg(long = "public-key", value_name = "PATH")]
    public_key: Option<PathBuf>,
    /// Environment variable holding a base64 public key.
    #[arg(long = "public-key-env", value_name = "VAR")]
    public_key_env: Option<String>,
    /// Treat an absent or unverifiable signature as an error.
    #[arg(long, action = ArgAction::SetTrue)]
    require_signature: bool,
}

/// Run subcommands.
#[derive(Subcommand, Debug)]
enum RunCommands {
    /// Extract the deterministic ticket footer from an existing runpack.
    Receipt(ReceiptCommand),
    /// Replay a runpack offline without executing any tool.
    Replay(ReplayCommand),
}

/// Arguments for `run receipt`.
#[derive(Args, Debug)]
struct ReceiptCommand {
    /// Run id or runpack path.
    #[arg(long = "from", value_name = "RUN_ID|PATH")]
    from: String,
}

/// Arguments for `run replay`.
#[derive(Args, Debug)]
struct ReplayCommand {
    /// Run id or runpack path.
    target: String,
    /// Attempt real tool execution.
    #[arg(long = "real-tools", action = ArgAction::SetTrue)]
    real_tools: bool,
    /// Allow real tool execution (required with --real-tools).
    #[arg(long = "unsafe-real-tools", action = ArgAction::SetTrue)]
    unsafe_real_tools: bool,
    /// Synthesize deterministic stub results for classifiable tools.
    #[arg(long = "synthesize-stubs", action = ArgAction::SetTrue)]
    synthesize_stubs: bool,
}

/// Gate subcommands.
#[derive(Subcommand, Debug)]
enum GateCommands {
    /// Evaluate one intent fixture against one policy.
    Eval(GateEvalCommand),
}

/// Arguments for `gate eval`.
#[derive(Args, Debug)]
struct GateEvalCommand {
    /// Policy YAML path.
    #[arg(long, value_name = "PATH")]
    policy: PathBuf,
    /// Intent request JSON path.
    #[arg(long, value_name = "PATH")]
    intent: PathBuf,
    /// Rate-limit state file; enforces the matched rule's rate limit.
    #[arg(long = "rate-limit-state", value_name = "PATH")]
    rate_limit_state: Option<PathBuf>,
}

/// Policy subcommands.
#[derive(Subcommand, Debug)]
enum PolicyCommands {
    /// Write a starter policy scaffold.
    Init(PolicyInitCommand),
    /// Evaluate one intent fixture and report the verdict with digests.
    Test(PolicyTestCommand),
}

/// Arguments for `policy init`.
#[derive(Args, Debug)]
struct PolicyInitCommand {
    /// Template name (baseline-lowrisk, baseline-mediumrisk,
    /// baseline-highrisk, or the low/medium/high aliases).
    template: String,
    /// Output path for the generated policy.
    #[arg(long, value_name = "PATH", default_value = "gait.policy.yaml")]
    out: PathBuf,
    /// Overwrite an existing output path.
    #[arg(long, action = ArgAction::SetTrue)]
    force: bool,
}

/// Arguments for `policy test`.
#[derive(Args, Debug)]
struct PolicyTestCommand {
    /// Policy YAML path.
    policy: PathBuf,
    /// Intent fixture JSON path.
    intent: PathBuf,
}

/// Report subcommands.
#[derive(Subcommand, Debug)]
enum ReportCommands {
    /// Rank the highest-risk actions from runpacks and traces.
    Top(ReportTopCommand),
}

/// Arguments for `report top`.
#[derive(Args, Debug)]
struct ReportTopCommand {
    /// Runpack paths or run ids.
    #[arg(long = "runs", value_name = "PATH|RUN_ID", value_delimiter = ',')]
    runs: Vec<String>,
    /// Trace sidecar paths.
    #[arg(long = "traces", value_name = "PATH", value_delimiter = ',')]
    traces: Vec<PathBuf>,
    /// Maximum number of top actions to emit (1-20).
    #[arg(long, default_value_t = 5)]
    limit: usize,
    /// Output path for the report JSON.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

/// Regress subcommands.
#[derive(Subcommand, Debug)]
enum RegressCommands {
    /// Seed a fixture from a baseline runpack.
    Init(RegressInitCommand),
    /// Grade every fixture and write the result record.
    Run(RegressRunCommand),
    /// Seed a fixture set from the offline demo runpack.
    Bootstrap(RegressBootstrapCommand),
}

/// Arguments for `regress init`.
#[derive(Args, Debug)]
struct RegressInitCommand {
    /// Baseline runpack path.
    #[arg(long = "from", value_name = "PATH")]
    from: PathBuf,
    /// Harness working directory.
    #[arg(long = "work-dir", value_name = "DIR", default_value = ".")]
    work_dir: PathBuf,
}

/// Arguments for `regress run`.
#[derive(Args, Debug)]
struct RegressRunCommand {
    /// Harness config path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Output path for the result record.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
    /// Optional JUnit XML output path.
    #[arg(long, value_name = "PATH")]
    junit: Option<PathBuf>,
    /// Harness working directory.
    #[arg(long = "work-dir", value_name = "DIR", default_value = ".")]
    work_dir: PathBuf,
}

/// Arguments for `regress bootstrap`.
#[derive(Args, Debug)]
struct RegressBootstrapCommand {
    /// Harness working directory.
    #[arg(long = "work-dir", value_name = "DIR", default_value = ".")]
    work_dir: PathBuf,
}

/// Gateway subcommands.
#[derive(Subcommand, Debug)]
enum GatewayCommands {
    /// Ingest gateway audit logs into signed proof records.
    Ingest(GatewayIngestCommand),
}

/// Arguments for `gateway ingest`.
#[derive(Args, Debug)]
struct GatewayIngestCommand {
    /// Gateway source: kong, docker, or mintmcp.
    #[arg(long, value_name = "SOURCE")]
    source: String,
    /// Gateway log path.
    #[arg(long = "log-path", value_name = "PATH")]
    log_path: PathBuf,
    /// Output path for proof record JSONL.
    #[arg(long = "proof-out", value_name = "PATH")]
    proof_out: Option<PathBuf>,
    /// Signing key mode: dev or prod.
    #[arg(long = "key-mode", value_name = "MODE", default_value = "dev")]
    key_mode: String,
    /// Path to a base64 private signing key.
    #[arg(long = "private-key", value_name = "PATH")]
    private_key: Option<PathBuf>,
    /// Environment variable holding a base64 private signing key.
    #[arg(long = "private-key-env", value_name = "VAR")]
    private_key_env: Option<String>,
}

/// Pack subcommands.
#[derive(Subcommand, Debug)]
enum PackCommands {
    /// Build an evidence pack (or an incident pack with --incident).
    Build(PackBuildCommand),
    /// Verify an evidence pack's entries and signatures.
    Verify(PackVerifyCommand),
    /// Encrypt an artifact into a .gaitenc envelope.
    Encrypt(PackEncryptCommand),
    /// Decrypt a .gaitenc envelope.
    Decrypt(PackDecryptCommand),
}

/// Arguments for `pack build`.
#[derive(Args, Debug)]
struct PackBuildCommand {
    /// Source runpack path or run id.
    #[arg(long = "run", value_name = "PATH|RUN_ID")]
    run: String,
    /// Output pack path.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
    /// Operator case identifier.
    #[arg(long = "case-id", value_name = "CASE_ID")]
    case_id: String,
    /// Compliance template (soc2, pci, incident_response).
    #[arg(long, value_name = "TEMPLATE", default_value = "")]
    template: String,
    /// Trace sidecar paths to include.
    #[arg(long = "traces", value_name = "PATH", value_delimiter = ',')]
    traces: Vec<PathBuf>,
    /// Regression result paths to include.
    #[arg(long = "regress", value_name = "PATH", value_delimiter = ',')]
    regress: Vec<PathBuf>,
    /// Approval audit paths to include.
    #[arg(long = "approvals", value_name = "PATH", value_delimiter = ',')]
    approvals: Vec<PathBuf>,
    /// Credential evidence paths to include.
    #[arg(long = "credentials", value_name = "PATH", value_delimiter = ',')]
    credentials: Vec<PathBuf>,
    /// Render the summary.pdf cover sheet.
    #[arg(long, action = ArgAction::SetTrue)]
    pdf: bool,
    /// Select sidecars by incident window instead of explicit paths.
    #[arg(long, action = ArgAction::SetTrue)]
    incident: bool,
    /// Incident half-window in hours.
    #[arg(long = "window-hours", value_name = "HOURS", default_value_t = 24)]
    window_hours: i64,
    /// Sign the pack manifest.
    #[arg(long, action = ArgAction::SetTrue)]
    sign: bool,
    /// Path to a base64 private signing key.
    #[arg(long = "private-key", value_name = "PATH")]
    private_key: Option<PathBuf>,
    /// Environment variable holding a base64 private signing key.
    #[arg(long = "private-key-env", value_name = "VAR")]
    private_key_env: Option<String>,
}

/// Arguments for `pack verify`.
#[derive(Args, Debug)]
struct PackVerifyCommand {
    /// Evidence pack path.
    target: PathBuf,
    /// Public key path (raw 32 bytes or base64).
    #[arg(long = "public-key", value_name = "PATH")]
    public_key: Option<PathBuf>,
    /// Environment variable holding a base64 public key.
    #[arg(long = "public-key-env", value_name = "VAR")]
    public_key_env: Option<String>,
    /// Treat an absent or unverifiable signature as an error.
    #[arg(long, action = ArgAction::SetTrue)]
    require_signature: bool,
}

/// Arguments for `pack encrypt`.
#[derive(Args, Debug)]
struct PackEncryptCommand {
    /// Plaintext artifact path.
    input: PathBuf,
    /// Envelope output path.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
    /// Environment variable holding the base64 AES-256 key.
    #[arg(long = "key-env", value_name = "VAR")]
    key_env: Option<String>,
    /// Operator command whose stdout is the base64 key (opt-in).
    #[arg(long = "key-command", value_name = "CMD")]
    key_command: Option<String>,
    /// Arguments for the key command.
    #[arg(long = "key-command-arg", value_name = "ARG")]
    key_command_args: Vec<String>,
}

/// Arguments for `pack decrypt`.
#[derive(Args, Debug)]
struct PackDecryptCommand {
    /// Envelope path.
    input: PathBuf,
    /// Plaintext output path.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
    /// Environment variable holding the base64 AES-256 key.
    #[arg(long = "key-env", value_name = "VAR")]
    key_env: Option<String>,
    /// Operator command whose stdout is the base64 key (opt-in).
    #[arg(long = "key-command", value_name = "CMD")]
    key_command: Option<String>,
    /// Arguments for the key command.
    #[arg(long = "key-command-arg", value_name = "ARG")]
    key_command_args: Vec<String>,
}

/// Arguments for `retention`.
#[derive(Args, Debug)]
struct RetentionCommand {
    /// Root directory to sweep.
    #[arg(long, value_name = "DIR", default_value = OUT_DIR)]
    root: PathBuf,
    /// Trace TTL in hours; 0 keeps all traces.
    #[arg(long = "trace-ttl-hours", value_name = "HOURS", default_value_t = 0)]
    trace_ttl_hours: i64,
    /// Pack TTL in hours; 0 keeps all packs.
    #[arg(long = "pack-ttl-hours", value_name = "HOURS", default_value_t = 0)]
    pack_ttl_hours: i64,
    /// Report decisions without deleting.
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
    /// Optional report output path.
    #[arg(long = "report-out", value_name = "PATH")]
    report_out: Option<PathBuf>,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    install_tracing();
    let cli = Cli::parse();
    let json = cli.json;
    if cli.explain {
        println!("{}", explain_for(&cli.command));
        return ExitCode::from(EXIT_OK);
    }
    let code = match cli.command {
        Commands::Demo(command) => run_demo(&command, json),
        Commands::Verify(command) => run_verify(&command, json),
        Commands::Run {
            command: RunCommands::Receipt(command),
        } => run_receipt(&command, json),
        Commands::Run {
            command: RunCommands::Replay(command),
        } => run_replay(&command, json),
        Commands::Gate {
            command: GateCommands::Eval(command),
        } => run_gate_eval(&command, json),
        Commands::Policy {
            command: PolicyCommands::Init(command),
        } => run_policy_init(&command, json),
        Commands::Policy {
            command: PolicyCommands::Test(command),
        } => run_policy_test(&command, json),
        Commands::Report {
            command: ReportCommands::Top(command),
        } => run_report_top(&command, json),
        Commands::Regress {
            command: RegressCommands::Init(command),
        } => run_regress_init(&command, json),
        Commands::Regress {
            command: RegressCommands::Run(command),
        } => run_regress_run(&command, json),
        Commands::Regress {
            command: RegressCommands::Bootstrap(command),
        } => run_regress_bootstrap(&command, json),
        Commands::Gateway {
            command: GatewayCommands::Ingest(command),
        } => run_gateway_ingest(&command, json),
        Commands::Pack {
            command: PackCommands::Build(command),
        } => run_pack_build(&command, json),
        Commands::Pack {
            command: PackCommands::Verify(command),
        } => run_pack_verify(&command, json),
        Commands::Pack {
            command: PackCommands::Encrypt(command),
        } => run_pack_encrypt(&command, json),
        Commands::Pack {
            command: PackCommands::Decrypt(command),
        } => run_pack_decrypt(&command, json),
        Commands::Retention(command) => run_retention(&command, json),
    };
    ExitCode::from(code)
}

fn install_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("GAIT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn explain_for(command: &Commands) -> &'static str {
    match command {
        Commands::Demo(_) => {
            "Run a fully offline deterministic demo and emit a shareable runpack receipt for verification."
        }
        Commands::Verify(_) => {
            "Verify a runpack's file hashes, manifest digest, and signatures without network access."
        }
        Commands::Run {
            command: RunCommands::Receipt(_),
        } => {
            "Extract the deterministic ticket footer from an existing runpack without rerunning it."
        }
        Commands::Run {
            command: RunCommands::Replay(_),
        } => "Replay a runpack's recorded results offline; no tool is ever executed.",
        Commands::Gate {
            ..
        } => "Evaluate one intent against one policy and return a deterministic verdict.",
        Commands::Policy {
            command: PolicyCommands::Init(_),
        } => "Write a starter policy scaffold for low, medium, or high risk tool-control rollouts.",
        Commands::Policy {
            command: PolicyCommands::Test(_),
        } => {
            "Evaluate one intent fixture against one policy and return a verdict with reason codes."
        }
        Commands::Report {
            ..
        } => {
            "Rank the highest-risk actions from runpacks/traces and emit a deterministic triage report."
        }
        Commands::Regress {
            ..
        } => "Replay fixtures and grade exit codes, diffs, and trajectories against expectations.",
        Commands::Gateway {
            ..
        } => "Ingest gateway audit logs and emit signed policy_enforcement proof records.",
        Commands::Pack {
            ..
        } => "Assemble, verify, or encrypt tamper-evident evidence packs under a compliance template.",
        Commands::Retention(_) => "Sweep aged traces and packs by TTL with a dry-run mode.",
    }
}

// ============================================================================
// SECTION: Demo and Verify
// ============================================================================

#[derive(Serialize, Default)]
struct DemoOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    run_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    bundle: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    ticket_footer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    verify: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_demo(command: &DemoCommand, json: bool) -> u8 {
    let zip_path = command.out_dir.join(format!("runpack_{DEMO_RUN_ID}.zip"));
    let outcome = || -> Result<DemoOutput, (String, u8)> {
        let bundle = build_demo_bundle(VERSION).map_err(internal)?;
        let written = write_runpack_signed(&zip_path, bundle, None).map_err(invalid)?;
        let verified = verify_zip(&zip_path, &VerifyOptions::default()).map_err(invalid)?;
        if !verified.ok() {
            return Err(("verification failed".to_string(), EXIT_VERIFY_FAILED));
        }
        Ok(DemoOutput {
            ok: true,
            run_id: DEMO_RUN_ID.to_string(),
            bundle: zip_path.display().to_string(),
            ticket_footer: format_ticket_footer(DEMO_RUN_ID, &written.manifest.manifest_digest),
            verify: "ok".to_string(),
            error: String::new(),
        })
    }();

    match outcome {
        Ok(output) => {
            let text = format!(
                "run_id={}\nbundle={}\nticket_footer={}\nverify=ok",
                output.run_id, output.bundle, output.ticket_footer
            );
            emit(json, &output, &text);
            EXIT_OK
        }
        Err((error, code)) => {
            emit_error(json, &format!("demo error: {error}"), &error);
            code
        }
    }
}

#[derive(Serialize)]
struct VerifyOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    run_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    manifest_digest: String,
    signature_status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    hash_mismatches: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    signature_errors: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_verify(command: &VerifyCommand, json: bool) -> u8 {
    let path = match resolve_runpack_path(&command.target) {
        Ok(path) => path,
        Err(error) => {
            emit_error(json, &format!("verify error: {error}"), &error);
            return EXIT_INVALID_INPUT;
        }
    };
    let public_key = match load_verify_key(command.public_key.as_deref(), command.public_key_env.as_deref()) {
        Ok(key) => key,
        Err(error) => {
            emit_error(json, &format!("verify error: {error}"), &error);
            return EXIT_INVALID_INPUT;
        }
    };
    let result = match verify_zip(
        &path,
        &VerifyOptions {
            public_key,
            require_signature: command.require_signature,
        },
    ) {
        Ok(result) => result,
        Err(error) => {
            let message = error.to_string();
            emit_error(json, &format!("verify error: {message}"), &message);
            return EXIT_INVALID_INPUT;
        }
    };

    let ok = result.ok();
    let output = VerifyOutput {
        ok,
        run_id: result.run_id.clone(),
        manifest_digest: result.manifest_digest.clone(),
        signature_status: result.signature_status.as_str().to_string(),
        missing_files: result.missing_files.clone(),
        hash_mismatches: result.hash_mismatches.iter().map(|m| m.path.clone()).collect(),
        signature_errors: result.signature_errors.clone(),
        error: String::new(),
    };
    let text = if ok {
        format!("verify ok: {} signature={}", result.run_id, result.signature_status.as_str())
    } else {
        format!(
            "verify failed: {} missing={} mismatched={} signature={}",
            result.run_id,
            result.missing_files.len(),
            result.hash_mismatches.len(),
            result.signature_status.as_str()
        )
    };
    emit(json, &output, &text);
    if ok { EXIT_OK } else { EXIT_VERIFY_FAILED }
}

// ============================================================================
// SECTION: Run Receipt and Replay
// ============================================================================

#[derive(Serialize)]
struct ReceiptOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    run_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    manifest_digest: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    ticket_footer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_receipt(command: &ReceiptCommand, json: bool) -> u8 {
    let outcome = || -> Result<ReceiptOutput, (String, u8)> {
        let path = resolve_runpack_path(&command.from).map_err(|e| (e, EXIT_INVALID_INPUT))?;
        let result = verify_zip(&path, &VerifyOptions::default()).map_err(invalid)?;
        if !result.ok() {
            return Err(("runpack verification failed".to_string(), EXIT_VERIFY_FAILED));
        }
        let footer = format_ticket_footer(&result.run_id, &result.manifest_digest);
        if !ticket_footer_matches_contract(&footer) {
            return Err(("ticket footer contract validation failed".to_string(), EXIT_INTERNAL));
        }
        Ok(ReceiptOutput {
            ok: true,
            run_id: result.run_id,
            path: path.display().to_string(),
            manifest_digest: result.manifest_digest,
            ticket_footer: footer,
            error: String::new(),
        })
    }();

    match outcome {
        Ok(output) => {
            let footer = output.ticket_footer.clone();
            emit(json, &output, &footer);
            EXIT_OK
        }
        Err((error, code)) => {
            emit_error(json, &format!("receipt error: {error}"), &error);
            code
        }
    }
}

#[derive(Serialize)]
struct ReplayOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    run_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    mode: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    steps: Vec<gait_runpack::ReplayStep>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing_results: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    requested_unsafe: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_replay(command: &ReplayCommand, json: bool) -> u8 {
    if command.real_tools && !command.unsafe_real_tools {
        let error = "real tool execution requires --unsafe-real-tools";
        emit_error(json, &format!("replay error: {error}"), error);
        return EXIT_UNSAFE_REPLAY;
    }
    let path = match resolve_runpack_path(&command.target) {
        Ok(path) => path,
        Err(error) => {
            emit_error(json, &format!("replay error: {error}"), &error);
            return EXIT_INVALID_INPUT;
        }
    };

    let mut warnings = Vec::new();
    if command.real_tools && command.unsafe_real_tools {
        warnings.push("real tools not implemented; replaying stubs".to_string());
    }
    let result = match replay_stub(
        &path,
        ReplayOptions {
            synthesize_stubs: command.synthesize_stubs,
        },
    ) {
        Ok(result) => result,
        Err(error) => {
            let message = error.to_string();
            emit_error(json, &format!("replay error: {message}"), &message);
            return EXIT_INVALID_INPUT;
        }
    };

    let ok = result.missing_results.is_empty();
    let output = ReplayOutput {
        ok,
        run_id: result.run_id.clone(),
        mode: result.mode.clone(),
        steps: result.steps.clone(),
        missing_results: result.missing_results.clone(),
        warnings: warnings.clone(),
        requested_unsafe: command.unsafe_real_tools,
        error: String::new(),
    };
    let text = if ok {
        format!("replay ok: {} ({})", result.run_id, result.mode)
    } else {
        format!(
            "replay failed: {} missing results: {}",
            result.run_id,
            result.missing_results.join(", ")
        )
    };
    emit(json, &output, &text);
    if ok { EXIT_OK } else { EXIT_VERIFY_FAILED }
}

// ============================================================================
// SECTION: Gate and Policy
// ============================================================================

#[derive(Serialize)]
struct GateEvalOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    verdict: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reason_codes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    matched_rule: String,
    rate_limited: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_gate_eval(command: &GateEvalCommand, json: bool) -> u8 {
    let outcome = || -> Result<GateEvalOutput, (String, u8)> {
        let loaded_policy = policy::load_policy_file(&command.policy).map_err(invalid)?;
        let intent = read_intent_request(&command.intent).map_err(|e| (e, EXIT_INVALID_INPUT))?;
        let mut outcome = policy::evaluate_policy_detailed(
            &loaded_policy,
            &intent,
            &policy::EvalOptions {
                producer_version: VERSION.to_string(),
            },
        )
        .map_err(invalid)?;

        let mut rate_limited = false;
        if let Some(state_path) = &command.rate_limit_state {
            rate_limited = enforce_rate_limit(&mut outcome, &intent, state_path)
                .map_err(|e| (e, EXIT_INTERNAL))?;
        }

        Ok(GateEvalOutput {
            ok: true,
            verdict: outcome.result.verdict.as_str().to_string(),
            reason_codes: outcome.result.reason_codes,
            violations: outcome.result.violations,
            matched_rule: outcome.matched_rule,
            rate_limited,
            error: String::new(),
        })
    }();

    match outcome {
        Ok(output) => {
            let mut text = format!("gate eval: verdict={}", output.verdict);
            if !output.reason_codes.is_empty() {
                text.push_str(&format!("\nreasons: {}", output.reason_codes.join(",")));
            }
            if !output.violations.is_empty() {
                text.push_str(&format!("\nviolations: {}", output.violations.join(",")));
            }
            emit(json, &output, &text);
            EXIT_OK
        }
        Err((error, code)) => {
            emit_error(json, &format!("gate eval error: {error}"), &error);
            code
        }
    }
}

/// Enforces the matched rule's rate limit against the state file; on deny,
/// the verdict hardens to block.
fn enforce_rate_limit(
    outcome: &mut policy::EvalOutcome,
    intent: &IntentRequest,
    state_path: &Path,
) -> Result<bool, String> {
    if outcome.rate_limit.requests <= 0 {
        return Ok(false);
    }
    let scope = ratelimit::RateLimitScope::from_str(&outcome.rate_limit.scope)
        .unwrap_or(ratelimit::RateLimitScope::ToolIdentity);
    let window = ratelimit::RateLimitWindow::from_str(&outcome.rate_limit.window)
        .unwrap_or(ratelimit::RateLimitWindow::Minute);
    let key = scope.key(&intent.tool_name, &intent.context.identity);
    let decision = ratelimit::acquire(
        state_path,
        &key,
        outcome.rate_limit.requests,
        window,
        time::OffsetDateTime::now_utc(),
    )
    .map_err(|err| err.to_string())?;
    if decision.allowed {
        return Ok(false);
    }
    outcome.result.verdict = Verdict::Block;
    outcome.result.reason_codes = policy::unique_sorted(
        &[outcome.result.reason_codes.clone(), vec!["rate_limit_exceeded".to_string()]].concat(),
    );
    outcome.result.violations = policy::unique_sorted(
        &[outcome.result.violations.clone(), vec!["rate_limit".to_string()]].concat(),
    );
    Ok(true)
}

/// Embedded starter policies keyed by template name.
fn policy_template(template: &str) -> Option<(&'static str, &'static str)> {
    let resolved = match template {
        "baseline-lowrisk" | "baseline_low_risk" | "low" => "baseline-lowrisk",
        "baseline-mediumrisk" | "baseline_medium_risk" | "medium" => "baseline-mediumrisk",
        "baseline-highrisk" | "baseline_high_risk" | "high" => "baseline-highrisk",
        _ => return None,
    };
    let body = match resolved {
        "baseline-lowrisk" => include_str!("../policy_templates/baseline-lowrisk.yaml"),
        "baseline-mediumrisk" => include_str!("../policy_templates/baseline-mediumrisk.yaml"),
        _ => include_str!("../policy_templates/baseline-highrisk.yaml"),
    };
    Some((resolved, body))
}

#[derive(Serialize)]
struct PolicyInitOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    template: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    policy_path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    next_commands: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_policy_init(command: &PolicyInitCommand, json: bool) -> u8 {
    let outcome = || -> Result<PolicyInitOutput, (String, u8)> {
        let key = command.template.trim().to_lowercase();
        let (resolved, body) = policy_template(&key)
            .ok_or_else(|| (format!("unknown template: {key}"), EXIT_INVALID_INPUT))?;
        if !command.force && command.out.exists() {
            return Err((
                format!(
                    "output path already exists (use --force to overwrite): {}",
                    command.out.display()
                ),
                EXIT_INVALID_INPUT,
            ));
        }
        if let Some(parent) = command.out.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(invalid)?;
        }
        std::fs::write(&command.out, body).map_err(invalid)?;
        let out = command.out.display();
        Ok(PolicyInitOutput {
            ok: true,
            template: resolved.to_string(),
            policy_path: out.to_string(),
            next_commands: vec![
                format!("gait policy test {out} intent_read.json --json"),
                format!("gait policy test {out} intent_write.json --json"),
                format!("gait policy test {out} intent_delete.json --json"),
            ],
            error: String::new(),
        })
    }();

    match outcome {
        Ok(output) => {
            let text = format!(
                "policy init ok: template={} output={}\nnext: {}",
                output.template,
                output.policy_path,
                output.next_commands.join(" | ")
            );
            emit(json, &output, &text);
            EXIT_OK
        }
        Err((error, code)) => {
            emit_error(json, &format!("policy init error: {error}"), &error);
            code
        }
    }
}

#[derive(Serialize)]
struct PolicyTestOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    schema_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    schema_version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    created_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    policy_digest: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    intent_digest: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    verdict: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    reason_codes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_policy_test(command: &PolicyTestCommand, json: bool) -> u8 {
    let outcome = || -> Result<(PolicyTestOutput, u8), (String, u8)> {
        let loaded_policy = policy::load_policy_file(&command.policy).map_err(invalid)?;
        let intent = read_intent_request(&command.intent).map_err(|e| (e, EXIT_INVALID_INPUT))?;
        let run = policytest::run(
            &loaded_policy,
            &intent,
            &policytest::RunOptions {
                producer_version: VERSION.to_string(),
            },
        )
        .map_err(invalid)?;

        let mut warnings = Vec::new();
        if policy::policy_has_high_risk_unbrokered_actions(&loaded_policy) {
            warnings.push(
                "policy permits high-risk actions without broker credentials".to_string(),
            );
        }

        let result = &run.outcome.result;
        let exit_code = match result.verdict {
            Verdict::Block => EXIT_POLICY_BLOCKED,
            Verdict::RequireApproval => EXIT_APPROVAL_REQUIRED,
            Verdict::Allow | Verdict::DryRun => EXIT_OK,
        };
        let created_at = result
            .created_at
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Ok((
            PolicyTestOutput {
                ok: true,
                schema_id: result.schema_id.clone(),
                schema_version: result.schema_version.clone(),
                created_at,
                policy_digest: result.policy_digest.clone(),
                intent_digest: result.intent_digest.clone(),
                verdict: result.verdict.as_str().to_string(),
                reason_codes: result.reason_codes.clone(),
                violations: result.violations.clone(),
                summary: run.summary.clone(),
                warnings,
                error: String::new(),
            },
            exit_code,
        ))
    }();

    match outcome {
        Ok((output, code)) => {
            let summary = output.summary.clone();
            emit(json, &output, &summary);
            code
        }
        Err((error, code)) => {
            emit_error(json, &format!("policy test error: {error}"), &error);
            code
        }
    }
}

// ============================================================================
// SECTION: Report
// ============================================================================

#[derive(Serialize)]
struct ReportTopOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    output_path: String,
    run_count: usize,
    trace_count: usize,
    action_count: usize,
    top_actions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<gait_scout::TopActionsReport>,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_report_top(command: &ReportTopCommand, json: bool) -> u8 {
    let outcome = || -> Result<ReportTopOutput, (String, u8)> {
        if command.limit < 1 {
            return Err(("--limit must be >= 1".to_string(), EXIT_INVALID_INPUT));
        }
        if command.runs.is_empty() && command.traces.is_empty() {
            return Err(("missing --runs and/or --traces sources".to_string(), EXIT_INVALID_INPUT));
        }
        let mut runpack_paths = Vec::with_capacity(command.runs.len());
        for source in &command.runs {
            runpack_paths
                .push(resolve_runpack_path(source).map_err(|e| (e, EXIT_INVALID_INPUT))?);
        }

        let report = gait_scout::build_top_actions_report(
            &TopActionsInput {
                runpack_paths,
                trace_paths: command.traces.clone(),
                limit: command.limit,
            },
            &TopActionsOptions {
                producer_version: VERSION.to_string(),
                now: None,
            },
        )
        .map_err(invalid)?;

        let out_path = command
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(OUT_DIR).join("report_top_actions.json"));
        write_canonical_json(&out_path, &report).map_err(|e| (e, EXIT_INTERNAL))?;

        Ok(ReportTopOutput {
            ok: true,
            output_path: out_path.display().to_string(),
            run_count: report.run_count,
            trace_count: report.trace_count,
            action_count: report.action_count,
            top_actions: report.top_actions.len(),
            report: Some(report),
            error: String::new(),
        })
    }();

    match outcome {
        Ok(output) => {
            let text = format!(
                "report top: runs={} traces={} actions={} out={}",
                output.run_count, output.trace_count, output.action_count, output.output_path
            );
            emit(json, &output, &text);
            EXIT_OK
        }
        Err((error, code)) => {
            emit_error(json, &format!("report top error: {error}"), &error);
            code
        }
    }
}

// ============================================================================
// SECTION: Regress
// ============================================================================

#[derive(Serialize)]
struct RegressInitOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    fixture_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    fixture_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    config_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_regress_init(command: &RegressInitCommand, json: bool) -> u8 {
    match harness::init_fixture(&harness::InitOptions {
        source_runpack_path: command.from.clone(),
        work_dir: command.work_dir.clone(),
    }) {
        Ok(result) => {
            let output = RegressInitOutput {
                ok: true,
                fixture_id: result.fixture_id.clone(),
                fixture_path: result.fixture_path.display().to_string(),
                config_path: result.config_path.display().to_string(),
                error: String::new(),
            };
            let text = format!(
                "regress init ok: fixture={} config={}",
                output.fixture_id, output.config_path
            );
            emit(json, &output, &text);
            EXIT_OK
        }
        Err(error) => {
            let message = error.to_string();
            emit_error(json, &format!("regress init error: {message}"), &message);
            EXIT_INVALID_INPUT
        }
    }
}

#[derive(Serialize)]
struct RegressRunOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    status: String,
    fixture_count: usize,
    failed_graders: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    output_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_regress_run(command: &RegressRunCommand, json: bool) -> u8 {
    let config_path = command
        .config
        .clone()
        .unwrap_or_else(|| command.work_dir.join(gait_regress::DEFAULT_CONFIG_NAME));
    let output_path =
        command.out.clone().unwrap_or_else(|| command.work_dir.join("regress_result.json"));
    match harness::run(&harness::RunOptions {
        config_path,
        output_path,
        work_dir: command.work_dir.clone(),
        producer_version: VERSION.to_string(),
        junit_path: command.junit.clone(),
        now: Some(time::OffsetDateTime::now_utc()),
    }) {
        Ok(outcome) => {
            let passed = outcome.failed_graders == 0;
            let output = RegressRunOutput {
                ok: passed,
                status: outcome.result.status.as_str().to_string(),
                fixture_count: outcome.result.fixture_count,
                failed_graders: outcome.failed_graders,
                output_path: outcome.output_path.display().to_string(),
                error: String::new(),
            };
            let text = format!(
                "regress {}: fixtures={} failed_graders={} out={}",
                output.status, output.fixture_count, output.failed_graders, output.output_path
            );
            emit(json, &output, &text);
            if passed { EXIT_OK } else { EXIT_REGRESSION_FAILED }
        }
        Err(error) => {
            let message = error.to_string();
            emit_error(json, &format!("regress run error: {message}"), &message);
            EXIT_INVALID_INPUT
        }
    }
}

fn run_regress_bootstrap(command: &RegressBootstrapCommand, json: bool) -> u8 {
    let outcome = || -> Result<RegressInitOutput, (String, u8)> {
        let bundle = build_demo_bundle(VERSION).map_err(internal)?;
        let runpack_path = command.work_dir.join(format!("runpack_{DEMO_RUN_ID}.zip"));
        write_runpack_signed(&runpack_path, bundle, None).map_err(invalid)?;
        let result = harness::init_fixture(&harness::InitOptions {
            source_runpack_path: runpack_path,
            work_dir: command.work_dir.clone(),
        })
        .map_err(invalid)?;
        Ok(RegressInitOutput {
            ok: true,
            fixture_id: result.fixture_id,
            fixture_path: result.fixture_path.display().to_string(),
            config_path: result.config_path.display().to_string(),
            error: String::new(),
        })
    }();

    match outcome {
        Ok(output) => {
            let text = format!(
                "regress bootstrap ok: fixture={} config={}",
                output.fixture_id, output.config_path
            );
            emit(json, &output, &text);
            EXIT_OK
        }
        Err((error, code)) => {
            emit_error(json, &format!("regress bootstrap error: {error}"), &error);
            code
        }
    }
}

// ============================================================================
// SECTION: Gateway
// ============================================================================

#[derive(Serialize)]
struct GatewayOutput {
    schema_id: String,
    schema_version: String,
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    operation: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    source: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    log_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    proof_records_out: String,
    input_events: usize,
    output_records: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_gateway_ingest(command: &GatewayIngestCommand, json: bool) -> u8 {
    let outcome = || -> Result<GatewayOutput, (String, u8)> {
        let source = GatewaySource::from_str(&command.source).map_err(|e| (e, EXIT_INVALID_INPUT))?;
        let mode = KeyMode::from_str(&command.key_mode).map_err(|e| (e, EXIT_INVALID_INPUT))?;
        let (keypair, mut warnings) = load_signing_key(&KeyConfig {
            mode,
            private_key_path: command
                .private_key
                .as_ref()
                .map(|path| path.display().to_string()),
            private_key_env: command
                .private_key_env
                .clone()
                .or_else(|| Some(SIGNING_KEY_ENV.to_string())),
        })
        .map_err(invalid)?;

        let output_path = command
            .proof_out
            .clone()
            .unwrap_or_else(|| PathBuf::from(OUT_DIR).join("policy_enforcement.jsonl"));
        let result = ingest_logs(&IngestOptions {
            source,
            log_path: &command.log_path,
            output_path: &output_path,
            producer_version: VERSION,
            keypair: &keypair,
        })
        .map_err(invalid)?;
        warnings.extend(result.warnings.clone());

        Ok(GatewayOutput {
            schema_id: "gait.gateway.output".to_string(),
            schema_version: "1.0.0".to_string(),
            ok: true,
            operation: "ingest".to_string(),
            source: result.source,
            log_path: result.log_path,
            proof_records_out: result.proof_records_out,
            input_events: result.input_events,
            output_records: result.output_records,
            warnings,
            error: String::new(),
        })
    }();

    match outcome {
        Ok(output) => {
            let mut text = format!(
                "gateway ingest: source={} input={} output={} proof={}",
                output.source, output.input_events, output.output_records, output.proof_records_out
            );
            if !output.warnings.is_empty() {
                text.push_str(&format!("\nwarnings: {}", output.warnings.join("; ")));
            }
            emit(json, &output, &text);
            EXIT_OK
        }
        Err((error, code)) => {
            emit_error(json, &format!("gateway ingest error: {error}"), &error);
            code
        }
    }
}

// ============================================================================
// SECTION: Pack
// ============================================================================

#[derive(Serialize)]
struct PackBuildOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    run_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    template_id: String,
    entries: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    policy_digests: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_pack_build(command: &PackBuildCommand, json: bool) -> u8 {
    let outcome = || -> Result<PackBuildOutput, (String, u8)> {
        let runpack_path = resolve_runpack_path(&command.run).map_err(|e| (e, EXIT_INVALID_INPUT))?;
        let keypair = if command.sign {
            let (pair, _) = load_signing_key(&KeyConfig {
                mode: KeyMode::Dev,
                private_key_path: command
                    .private_key
                    .as_ref()
                    .map(|path| path.display().to_string()),
                private_key_env: command
                    .private_key_env
                    .clone()
                    .or_else(|| Some(SIGNING_KEY_ENV.to_string())),
            })
            .map_err(invalid)?;
            Some(pair)
        } else {
            None
        };

        if command.incident {
            let result = gait_guard::build_incident_pack(
                &gait_guard::IncidentPackOptions {
                    runpack_path,
                    output_path: command.out.clone(),
                    case_id: command.case_id.clone(),
                    window: Some(Duration::hours(command.window_hours)),
                    template_id: command.template.clone(),
                    render_pdf: command.pdf,
                    producer_version: VERSION.to_string(),
                    now: None,
                },
                keypair.as_ref(),
            )
            .map_err(invalid)?;
            return Ok(PackBuildOutput {
                ok: true,
                path: result.build.path.display().to_string(),
                run_id: result.build.manifest.run_id.clone(),
                template_id: result.build.manifest.template_id.clone(),
                entries: result.build.manifest.contents.len(),
                policy_digests: result.policy_digests,
                error: String::new(),
            });
        }

        let result = gait_guard::build_pack(
            &gait_guard::BuildOptions {
                runpack_path,
                output_path: command.out.clone(),
                case_id: command.case_id.clone(),
                template_id: command.template.clone(),
                trace_paths: command.traces.clone(),
                regress_paths: command.regress.clone(),
                approval_audit_paths: command.approvals.clone(),
                credential_evidence_paths: command.credentials.clone(),
                extra_evidence_files: BTreeMap::new(),
                render_pdf: command.pdf,
                incident_window: None,
                producer_version: VERSION.to_string(),
                now: None,
            },
            keypair.as_ref(),
        )
        .map_err(invalid)?;
        Ok(PackBuildOutput {
            ok: true,
            path: result.path.display().to_string(),
            run_id: result.manifest.run_id.clone(),
            template_id: result.manifest.template_id.clone(),
            entries: result.manifest.contents.len(),
            policy_digests: Vec::new(),
            error: String::new(),
        })
    }();

    match outcome {
        Ok(output) => {
            let text = format!(
                "pack build ok: run={} template={} entries={} path={}",
                output.run_id, output.template_id, output.entries, output.path
            );
            emit(json, &output, &text);
            EXIT_OK
        }
        Err((error, code)) => {
            emit_error(json, &format!("pack build error: {error}"), &error);
            code
        }
    }
}

#[derive(Serialize)]
struct PackVerifyOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    case_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    run_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    manifest_digest: String,
    signature_status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    missing_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    hash_mismatches: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_pack_verify(command: &PackVerifyCommand, json: bool) -> u8 {
    let public_key = match load_verify_key(command.public_key.as_deref(), command.public_key_env.as_deref()) {
        Ok(key) => key,
        Err(error) => {
            emit_error(json, &format!("pack verify error: {error}"), &error);
            return EXIT_INVALID_INPUT;
        }
    };
    match gait_guard::verify_pack(&command.target, public_key.as_ref(), command.require_signature) {
        Ok(result) => {
            let ok = result.ok();
            let output = PackVerifyOutput {
                ok,
                case_id: result.case_id.clone(),
                run_id: result.run_id.clone(),
                manifest_digest: result.manifest_digest.clone(),
                signature_status: result.signature_status.as_str().to_string(),
                missing_files: result.missing_files.clone(),
                hash_mismatches: result.hash_mismatches.clone(),
                error: String::new(),
            };
            let text = if ok {
                format!(
                    "pack verify ok: {} signature={}",
                    result.run_id,
                    result.signature_status.as_str()
                )
            } else {
                format!(
                    "pack verify failed: {} missing={} mismatched={} signature={}",
                    result.run_id,
                    result.missing_files.len(),
                    result.hash_mismatches.len(),
                    result.signature_status.as_str()
                )
            };
            emit(json, &output, &text);
            if ok { EXIT_OK } else { EXIT_VERIFY_FAILED }
        }
        Err(error) => {
            let message = error.to_string();
            emit_error(json, &format!("pack verify error: {message}"), &message);
            EXIT_INVALID_INPUT
        }
    }
}

#[derive(Serialize)]
struct PackCryptOutput {
    ok: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    plain_sha256: String,
    plain_size: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_pack_encrypt(command: &PackEncryptCommand, json: bool) -> u8 {
    let key_env = command
        .key_env
        .clone()
        .or_else(|| command.key_command.is_none().then(|| ENCRYPTION_KEY_ENV.to_string()));
    match gait_guard::encrypt_artifact(&gait_guard::EncryptOptions {
        input_path: command.input.clone(),
        output_path: command.out.clone(),
        key_env,
        key_command: command.key_command.clone(),
        key_command_args: command.key_command_args.clone(),
        producer_version: VERSION.to_string(),
        now: Some(time::OffsetDateTime::now_utc()),
    }) {
        Ok(result) => {
            let output = PackCryptOutput {
                ok: true,
                path: result.path.display().to_string(),
                plain_sha256: result.artifact.plain_sha256.clone(),
                plain_size: result.artifact.plain_size,
                error: String::new(),
            };
            let text = format!("pack encrypt ok: {}", output.path);
            emit(json, &output, &text);
            EXIT_OK
        }
        Err(error) => {
            let message = error.to_string();
            emit_error(json, &format!("pack encrypt error: {message}"), &message);
            EXIT_INVALID_INPUT
        }
    }
}

fn run_pack_decrypt(command: &PackDecryptCommand, json: bool) -> u8 {
    let key_env = command
        .key_env
        .clone()
        .or_else(|| command.key_command.is_none().then(|| ENCRYPTION_KEY_ENV.to_string()));
    match gait_guard::decrypt_artifact(&gait_guard::DecryptOptions {
        input_path: command.input.clone(),
        output_path: command.out.clone(),
        key_env,
        key_command: command.key_command.clone(),
        key_command_args: command.key_command_args.clone(),
    }) {
        Ok(result) => {
            let output = PackCryptOutput {
                ok: true,
                path: result.path.display().to_string(),
                plain_sha256: result.plain_sha256.clone(),
                plain_size: result.plain_size,
                error: String::new(),
            };
            let text = format!("pack decrypt ok: {}", output.path);
            emit(json, &output, &text);
            EXIT_OK
        }
        Err(error) => {
            let message = error.to_string();
            emit_error(json, &format!("pack decrypt error: {message}"), &message);
            EXIT_VERIFY_FAILED
        }
    }
}

// ============================================================================
// SECTION: Retention
// ============================================================================

#[derive(Serialize)]
struct RetentionOutput {
    ok: bool,
    dry_run: bool,
    scanned: usize,
    deleted: usize,
    kept: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    error: String,
}

fn run_retention(command: &RetentionCommand, json: bool) -> u8 {
    match gait_guard::apply_retention(&gait_guard::RetentionOptions {
        root_path: command.root.clone(),
        trace_ttl: Duration::hours(command.trace_ttl_hours),
        pack_ttl: Duration::hours(command.pack_ttl_hours),
        dry_run: command.dry_run,
        report_output: command.report_out.clone(),
        now: None,
        producer_version: VERSION.to_string(),
    }) {
        Ok(report) => {
            let output = RetentionOutput {
                ok: true,
                dry_run: report.dry_run,
                scanned: report.scanned_files,
                deleted: report.deleted_files.len(),
                kept: report.kept_files.len(),
                error: String::new(),
            };
            let text = format!(
                "retention ok: scanned={} deleted={} kept={} dry_run={}",
                output.scanned, output.deleted, output.kept, output.dry_run
            );
            emit(json, &output, &text);
            EXIT_OK
        }
        Err(error) => {
            let message = error.to_string();
            emit_error(json, &format!("retention error: {message}"), &message);
            EXIT_INVALID_INPUT
        }
    }
}

// ============================================================================
// SECTION: Shared Helpers
// ============================================================================

/// Resolves a run id or path to a runpack archive path.
fn resolve_runpack_path(target: &str) -> Result<PathBuf, String> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err("missing run_id or runpack path".to_string());
    }
    let direct = PathBuf::from(trimmed);
    if direct.is_file() {
        return Ok(direct);
    }
    let by_id = PathBuf::from(OUT_DIR).join(format!("runpack_{trimmed}.zip"));
    if by_id.is_file() {
        return Ok(by_id);
    }
    Err(format!("runpack not found for {trimmed}"))
}

fn read_intent_request(path: &Path) -> Result<IntentRequest, String> {
    let raw = std::fs::read(path).map_err(|err| format!("read intent: {err}"))?;
    serde_json::from_slice(&raw).map_err(|err| format!("parse intent json: {err}"))
}

fn load_verify_key(
    path: Option<&Path>,
    env: Option<&str>,
) -> Result<Option<ed25519_dalek::VerifyingKey>, String> {
    let path_text = path.map(|p| p.display().to_string());
    load_verifying_key(path_text.as_deref(), env.or(Some(SIGNING_PUBLIC_KEY_ENV)))
        .map_err(|err| err.to_string())
}

fn write_canonical_json<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|err| err.to_string())?;
    }
    let bytes = jcs::canonical_json_bytes(value).map_err(|err| err.to_string())?;
    std::fs::write(path, bytes).map_err(|err| err.to_string())
}

fn emit<T: Serialize>(json: bool, output: &T, text: &str) {
    if json {
        match serde_json::to_string(output) {
            Ok(encoded) => println!("{encoded}"),
            Err(_) => println!(r#"{{"ok":false,"error":"failed to encode output"}}"#),
        }
        return;
    }
    println!("{text}");
}

fn emit_error(json: bool, text: &str, error: &str) {
    #[derive(Serialize)]
    struct ErrorOutput<'a> {
        ok: bool,
        error: &'a str,
    }
    emit(
        json,
        &ErrorOutput {
            ok: false,
            error,
        },
        text,
    );
}

fn invalid<E: std::fmt::Display>(error: E) -> (String, u8) {
    (error.to_string(), EXIT_INVALID_INPUT)
}

fn internal<E: std::fmt::Display>(error: E) -> (String, u8) {
    (error.to_string(), EXIT_INTERNAL)
}

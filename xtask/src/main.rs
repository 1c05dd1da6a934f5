use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the Lambda bootstrap workspace",
    long_about = "A unified CLI for building the bootstrap binaries, running them\n\
                  locally, and running CI checks in the Lambda bootstrap workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the `bootstrap` and `local_runtime` binaries
    Build {
        /// Compilation target triple
        #[arg(long, env = "BOOTSTRAP_TARGET")]
        target: Option<String>,
        /// Build profile used for binaries
        #[arg(value_enum, long, default_value_t = BuildProfile::Release)]
        profile: BuildProfile,
    },
    /// Run the polling runtime against a Runtime API endpoint
    Serve {
        /// Runtime API endpoint as host:port
        #[arg(long, env = "AWS_LAMBDA_RUNTIME_API")]
        runtime_api: String,
        /// Built-in handler to serve
        #[arg(long, default_value = "echo")]
        handler: String,
    },
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and unit tests
    Check,
    /// Integration tests against the fake Runtime API
    Integration,
    /// Run check + integration
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildProfile {
    Debug,
    Release,
}

impl BuildProfile {
    fn as_cargo_flag(self) -> Option<&'static str> {
        match self {
            Self::Debug => None,
            Self::Release => Some("--release"),
        }
    }
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn build_binaries(target: Option<&str>, profile: BuildProfile) {
    if let Some(target) = target {
        ensure_rust_target_installed(target);
    }

    step("Build bootstrap binaries");
    let mut cargo_args = vec!["build", "-p", "lambda_bootstrap", "--bins"];
    if let Some(target) = target {
        cargo_args.extend(["--target", target]);
    }
    if let Some(flag) = profile.as_cargo_flag() {
        cargo_args.push(flag);
    }
    run_cargo(&cargo_args);
}

fn ensure_rust_target_installed(target: &str) {
    let output = Command::new("rustup")
        .args(["target", "list", "--installed"])
        .output();

    let output = match output {
        Ok(value) => value,
        Err(error) => {
            eprintln!(
                "warning: failed to run `rustup target list --installed` ({error}); continuing without target preflight"
            );
            return;
        }
    };

    let installed = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() || !installed.lines().any(|line| line.trim() == target) {
        eprintln!(
            "required rust target `{target}` is not installed. install it with `rustup target add {target}` and re-run `cargo run -p xtask -- build`"
        );
        exit(1);
    }
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test lambda_bootstrap_core");
    run_cargo(&["test", "-p", "lambda_bootstrap_core"]);

    step("Unit test lambda_bootstrap");
    run_cargo(&["test", "-p", "lambda_bootstrap", "--lib", "--bins"]);
}

fn ci_integration() {
    step("Integration test lambda_bootstrap");
    run_cargo(&["test", "-p", "lambda_bootstrap", "--tests"]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { target, profile } => {
            build_binaries(target.as_deref(), profile);
        }
        Commands::Serve {
            runtime_api,
            handler,
        } => {
            run_cargo(&[
                "run",
                "-p",
                "lambda_bootstrap",
                "--bin",
                "bootstrap",
                "--",
                "--runtime-api",
                &runtime_api,
                "--handler",
                &handler,
            ]);
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Integration => ci_integration(),
                CiJob::All => {
                    ci_check();
                    ci_integration();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}

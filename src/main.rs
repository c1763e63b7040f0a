use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gtk_bundle::{absolute_path, verify_bundle, BundleConfig, Bundler, Profile, Runtime, XcodeTools};

/// Bundle the GTK libraries.
#[derive(Debug, Parser)]
#[command(name = "gtk-bundle", version, about)]
struct Args {
    /// The dotnet runtime id, e.g. osx-x64 or osx-arm64.
    #[arg(long)]
    runtime: Runtime,

    /// Directory to copy extra resources to (the bundle's Contents/Resources).
    #[arg(long, alias = "resource_dir")]
    resource_dir: PathBuf,

    /// Package prefix to bundle from. Defaults to the runtime's Homebrew prefix.
    #[arg(long)]
    prefix: Option<PathBuf>,

    /// Built-in layout of libraries, plugins and resources.
    #[arg(long, value_enum, default_value_t = Profile::Adwaita)]
    profile: Profile,

    /// TOML layout overriding the built-in profile.
    #[arg(long, conflicts_with = "profile")]
    config: Option<PathBuf>,

    /// Check that every load path in the bundle resolves inside it.
    #[arg(long)]
    verify: bool,

    /// Show debug output.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Log to stderr. `RUST_LOG` overrides the level chosen on the command line.
fn setup_logging(args: &Args) -> Result<()> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else if args.quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env()
        .context("Invalid RUST_LOG directives")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let prefix = args
        .prefix
        .clone()
        .unwrap_or_else(|| args.runtime.default_prefix());
    // otool prints absolute install names; a relative prefix would match none of them.
    let prefix = absolute_path(&prefix)?;
    let config = match &args.config {
        Some(path) => BundleConfig::from_toml_file(path)?,
        None => args.profile.config(),
    };
    info!(
        "Bundling {} libraries from {} into {}",
        args.runtime,
        prefix.display(),
        args.resource_dir.display()
    );

    let tools = XcodeTools;
    let bundler = Bundler::new(&tools, &prefix, &args.resource_dir, config)?;
    let report = bundler.run()?;
    info!(
        "Bundled {} libraries, patched {} plugins, copied {} bytes of resources",
        report.libraries, report.plugins, report.resource_bytes
    );

    if args.verify {
        let violations = verify_bundle(&tools, &args.resource_dir, &prefix)?;
        if !violations.is_empty() {
            for violation in &violations {
                error!("{}", violation);
            }
            anyhow::bail!("{} load path(s) do not resolve inside the bundle", violations.len());
        }
        info!("All load paths resolve inside the bundle");
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = setup_logging(&args) {
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

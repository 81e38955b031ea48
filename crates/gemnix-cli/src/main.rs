mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_FAILURE, EXIT_LOCKFILE_ERROR, EXIT_RESOLVE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "gemnix",
    version,
    about = "Convert Bundler lockfiles into content-addressed Nix gemsets"
)]
struct Cli {
    /// Path to a gemnix.toml project config (default: ./gemnix.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Only report errors; no progress output.
    #[arg(short, long, default_value_t = false, global = true)]
    quiet: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where to read the lockfile and previous gemset from.
#[derive(Debug, Clone, Default, Args)]
pub struct PathArgs {
    /// Gemset to reuse entries from and overwrite [default: ./gemset.nix].
    #[arg(long)]
    gemset: Option<PathBuf>,
    /// Bundler lockfile to convert [default: ./Gemfile.lock].
    #[arg(long)]
    lockfile: Option<PathBuf>,
    /// How to read the previous gemset: "nix" (nix-instantiate) or "native".
    #[arg(long)]
    loader: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ConvertArgs {
    #[command(flatten)]
    paths: PathArgs,
    /// Record each gem's runtime dependencies in the gemset.
    #[arg(long, default_value_t = false)]
    deps: bool,
    /// Resolve up to this many gems in parallel.
    #[arg(short, long)]
    jobs: Option<usize>,
    /// Source resolver: "prefetch" (nix-prefetch-url/git) or "mock".
    #[arg(long)]
    resolver: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert the lockfile and write the gemset.
    Convert(ConvertArgs),
    /// Show which gems would be reused or re-resolved, without fetching anything.
    Plan(PathArgs),
    /// Check that the external tools and input files are usable.
    Doctor(ConvertArgs),
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GEMNIX_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let output = commands::Output {
        json: cli.json,
        quiet: cli.quiet,
    };
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Convert(args) => commands::convert::run(config, &args, output),
        Commands::Plan(paths) => commands::plan::run(config, &paths, output),
        Commands::Doctor(args) => commands::doctor::run(config, &args, output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("lockfile error:") {
                EXIT_LOCKFILE_ERROR
            } else if msg.starts_with("failed to resolve") {
                EXIT_RESOLVE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

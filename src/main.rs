use clap::{ArgGroup, Parser, Subcommand};
use newline_tools::cli::{
    count_file, dedupe_file, describe_report, show_count, shuffle_file, Sample, SampleMethod,
    Split,
};
use newline_tools::config::{parse_byte_size, DEFAULT_MAX_DEPTH, DEFAULT_SLACK};
use newline_tools::shuffle::ShuffleOptions;
use newline_tools::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Version info from build.rs
const VERSION: &str = env!("NEWLINE_TOOLS_VERSION");
const BUILD: &str = env!("NEWLINE_TOOLS_BUILD");
const PROFILE: &str = env!("NEWLINE_TOOLS_PROFILE");
const GIT_HASH: &str = env!("NEWLINE_TOOLS_GIT_HASH");

fn get_version() -> &'static str {
    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<String> = OnceLock::new();
    VERSION_STRING.get_or_init(|| {
        format!("{} {} build {} ({})", PROFILE, VERSION, BUILD, GIT_HASH)
    })
}

#[derive(Parser)]
#[command(name = "newline-tools")]
#[command(author, about = "Shuffle, split, dedupe, sample and count lines in large files", long_about = None)]
struct Cli {
    /// Print version
    #[arg(short = 'V', long)]
    version: bool,

    /// Log filter used when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Shuffle lines using a bounded amount of memory
    #[command(alias = "sh")]
    Shuffle {
        /// Input file
        input: PathBuf,

        /// Output file (replaced atomically)
        output: PathBuf,

        /// Memory budget for line data, e.g. 512K, 64M, 2G
        #[arg(short, long, default_value = "64M", value_parser = parse_size)]
        buffer_size: u64,

        /// Seed for a reproducible shuffle
        #[arg(long)]
        seed: Option<u64>,

        /// How far a bucket may exceed the budget before it is re-bucketed
        #[arg(long, default_value_t = DEFAULT_SLACK)]
        slack: f64,

        /// Maximum re-bucketing depth
        #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: usize,

        /// Directory for temporary bucket files
        #[arg(long)]
        temp_dir: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Split a file into numbered parts
    #[command(group(
        ArgGroup::new("mode")
            .required(true)
            .args(["parts", "size", "proportions"])
    ))]
    Split {
        /// Input file
        input: PathBuf,

        /// Output prefix (defaults to the input path without its extension)
        #[arg(long)]
        prefix: Option<PathBuf>,

        /// Number of parts of equal size
        #[arg(long)]
        parts: Option<usize>,

        /// Lines per part
        #[arg(long)]
        size: Option<u64>,

        /// Relative part sizes, e.g. 0.8,0.1,0.1
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        proportions: Option<Vec<f64>>,
    },

    /// Remove repeated lines, keeping the first occurrence
    #[command(alias = "d")]
    Dedupe {
        /// Input file
        input: PathBuf,

        /// Output file
        output: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a uniform random sample of lines
    Sample {
        /// Input file
        input: PathBuf,

        /// Output file
        output: PathBuf,

        /// Number of lines to keep
        #[arg(short = 'n', long)]
        size: u64,

        /// Sampling method (reservoir or index)
        #[arg(long, default_value = "reservoir", value_parser = parse_method)]
        method: SampleMethod,

        /// Seed for a reproducible sample
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Count lines and bytes
    #[command(alias = "c")]
    Count {
        /// File to inspect
        file: PathBuf,

        /// Print the counts as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_size(s: &str) -> std::result::Result<u64, String> {
    parse_byte_size(s).map_err(|e| format!("{}", e))
}

fn parse_method(s: &str) -> std::result::Result<SampleMethod, String> {
    s.parse().map_err(|e| format!("{}", e))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Shuffle {
            input,
            output,
            buffer_size,
            seed,
            slack,
            max_depth,
            temp_dir,
            json,
        } => {
            let options = ShuffleOptions {
                buffer_size,
                seed,
                slack,
                max_depth,
                temp_dir,
                ..Default::default()
            };

            let report = shuffle_file(&input, &output, &options)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", describe_report(&report));
                println!("Wrote {}", output.display());
            }
        }

        Commands::Split {
            input,
            prefix,
            parts,
            size,
            proportions,
        } => {
            let splitter = Split::new(&input, prefix.as_deref())?;
            let created = match (parts, size, proportions) {
                (Some(n), _, _) => splitter.split_by_parts(n)?,
                (_, Some(size), _) => splitter.split_by_size(size)?,
                (_, _, Some(proportions)) => splitter.split_by_proportion(&proportions)?,
                (None, None, None) => Vec::new(),
            };

            println!(
                "Split {} lines into {} files",
                splitter.total_lines(),
                created.len()
            );
            for path in created {
                println!("  {}", path.display());
            }
        }

        Commands::Dedupe {
            input,
            output,
            json,
        } => {
            let report = dedupe_file(&input, &output)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Kept {} of {} lines ({} duplicates) in {}",
                    report.lines_written,
                    report.lines_read,
                    report.duplicates(),
                    output.display()
                );
            }
        }

        Commands::Sample {
            input,
            output,
            size,
            method,
            seed,
        } => {
            let written = Sample::new(&input, &output, size).sample(method, seed)?;
            println!("Sampled {} lines to {}", written, output.display());
        }

        Commands::Count { file, json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&count_file(&file)?)?);
            } else {
                print!("{}", show_count(&file)?);
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Handle --version flag
    if cli.version {
        println!("newline-tools {}", get_version());
        return ExitCode::SUCCESS;
    }

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            use clap::CommandFactory;
            let _ = Cli::command().print_help();
            println!();
            return ExitCode::SUCCESS;
        }
    };

    init_logging(&cli.log_level);

    match run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write as _;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use maskasm_tool::{hex_dump, intel_hex, Project, Report};

#[derive(Parser, Debug)]
#[command(author, version, about = "Table-driven assembler", long_about = None)]
struct Cli {
    /// Instruction catalog (JSON)
    #[arg(long, value_name = "FILE")]
    catalog: PathBuf,
    /// Assembler settings (JSON); defaults apply when omitted
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a source file
    Assemble {
        #[arg(value_name = "SOURCE")]
        input: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Hex)]
        format: OutputFormat,
        /// Write output to file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Encode one instruction line
    Encode {
        text: String,
        /// Print the placed fields instead of the bytes
        #[arg(long)]
        fields: bool,
    },
    /// Load the catalog and list its instructions
    Check,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Raw image bytes
    Bin,
    /// Address-prefixed hex rows
    Hex,
    /// Intel HEX records
    Ihex,
    /// Units and symbols as JSON
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let project = Project::open(&cli.catalog, cli.config.as_deref())?;

    match cli.cmd {
        Command::Assemble { input, format, output } => {
            let source = std::fs::read_to_string(&input).with_context(|| format!("reading {}", input.display()))?;
            let assembly = project.assembler().assemble(&source)?;
            info!(base = assembly.base(), bytes = assembly.len(), "assembled {}", input.display());
            let bytes = match format {
                OutputFormat::Bin => assembly.image(),
                OutputFormat::Hex => hex_dump(&assembly).into_bytes(),
                OutputFormat::Ihex => intel_hex(&assembly).into_bytes(),
                OutputFormat::Json => serde_json::to_vec_pretty(&Report::new(&assembly))?,
            };
            match output {
                Some(path) => std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?,
                None => std::io::stdout().write_all(&bytes)?,
            }
        }
        Command::Encode { text, fields } => {
            if fields {
                for f in project.encoder.describe(&text)? {
                    println!("{:<10} offset {:>2} width {:>2} value {:#x}", f.name, f.offset, f.width, f.value);
                }
            } else {
                let bytes = project.encoder.encode(&text)?;
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
                println!("{}", hex.join(" "));
            }
        }
        Command::Check => {
            let catalog = project.encoder.catalog();
            for spec in catalog.specs() {
                println!("{:<24} {:>2} bytes  {}", spec.signature(), spec.byte_width(), spec.description());
            }
            println!("{} instructions", catalog.specs().len());
        }
    }
    Ok(())
}

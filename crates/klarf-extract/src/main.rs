use clap::Parser;
use klarf_extract::{into_single_klarf_content, parse_file, ParseOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "klarf-extract", about = "Extract KLARF inspection data to JSON")]
struct Cli {
    /// Input KLARF file
    input: PathBuf,

    /// Output JSON file (stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Skip SummaryList sections
    #[arg(long)]
    no_summary: bool,

    /// Emit only the wafer at this index
    #[arg(long)]
    wafer: Option<usize>,

    /// Wafer-level record keyword to capture (repeatable)
    #[arg(long = "wafer-column")]
    wafer_columns: Vec<String>,

    /// Extra defect column to capture (repeatable)
    #[arg(long = "defect-column")]
    defect_columns: Vec<String>,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let opts = ParseOptions {
        custom_columns_wafer: cli.wafer_columns,
        custom_columns_defect: cli.defect_columns,
        parse_summary: !cli.no_summary,
        defects_as_stream: false,
    };

    let content = match parse_file(&cli.input, &opts) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let json = match cli.wafer {
        Some(index) => match into_single_klarf_content(content, index) {
            Ok(single) => to_json(&single, cli.pretty),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        None => to_json(&content, cli.pretty),
    };

    if let Some(output_path) = cli.output {
        std::fs::write(&output_path, &json).expect("Failed to write output file");
        eprintln!("Written to {}", output_path.display());
    } else {
        println!("{json}");
    }
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .expect("JSON serialization failed")
}

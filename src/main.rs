use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use platenorm::{
    BBox, CandidateBuilder, GeometricRectifier, PipelineConfig, RecognizedLine, Region,
    VariantGenerator, VariantMethod,
};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "platenorm")]
#[command(about = "Vehicle plate normalization: rectification, variants and plate grammar", long_about = None)]
struct Cli {
    /// Pipeline configuration (JSON); missing fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Correct, classify and format recognizer lines given in reading order
    Normalize {
        /// One recognized text line; repeat for multi-row plates
        #[arg(long = "line", required = true)]
        lines: Vec<String>,

        /// Confidence assigned to every line
        #[arg(long, default_value_t = 1.0)]
        confidence: f32,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Rectify a plate crop and write every preprocessing variant as PNG
    Variants {
        /// Cropped plate image
        crop: PathBuf,

        /// Directory receiving `NN_<method>.png`
        #[arg(long)]
        out_dir: PathBuf,

        /// Skip perspective correction
        #[arg(long)]
        no_rectify: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    /// JSON output with full details
    Json,
    /// Formatted plate and vehicle class on one line
    Text,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Normalize { lines, confidence, format } => {
            let reading: Vec<RecognizedLine> = lines
                .iter()
                .map(|text| RecognizedLine::new(text.as_str(), confidence))
                .collect();

            let builder = CandidateBuilder::new(config.grammar);
            let Some(candidate) = builder.build(&reading, VariantMethod::Gray, 0) else {
                return Err("no text to normalize".into());
            };

            match format {
                OutputFormat::Json => {
                    let json_output = serde_json::json!({
                        "formatted_text": candidate.formatted_text,
                        "clean_text": candidate.clean_text,
                        "raw_text": candidate.raw_text,
                        "vehicle_class": candidate.vehicle_class,
                        "is_50cc": candidate.is_50cc,
                        "province_valid": candidate.province_valid,
                        "valid": candidate.is_valid(),
                        "confidence": candidate.confidence,
                    });
                    println!("{}", serde_json::to_string_pretty(&json_output)?);
                }
                OutputFormat::Text => {
                    println!("{}\t{}", candidate.formatted_text, candidate.vehicle_class);
                }
            }
        }
        Command::Variants { crop, out_dir, no_rectify } => {
            let image = image::open(&crop)?.to_rgb8();
            let (w, h) = image.dimensions();
            if w == 0 || h == 0 {
                return Err(format!("{}: empty image", crop.display()).into());
            }
            let region = Region::new(image, BBox::new(0, 0, w - 1, h - 1));

            let generator =
                VariantGenerator::new(GeometricRectifier::new(config.rectify), config.variants);
            let rectified = if no_rectify || !generator.rectifier().config().enabled {
                None
            } else {
                Some(generator.rectifier().rectify(&region))
            };
            let variants = match &rectified {
                Some(r) => generator.generate_from(&region, r),
                None => generator.generate(&region, false),
            };

            let method = rectified.as_ref().map_or("skipped", |r| r.method.as_str());
            println!("rectification: {}", method);

            fs::create_dir_all(&out_dir)?;
            for (i, variant) in variants.iter().enumerate() {
                let path = out_dir.join(format!("{:02}_{}.png", i, variant.method));
                variant.image.save(&path)?;
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}

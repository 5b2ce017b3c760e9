use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

use consensus::{MaskStore, SegmentationService, merge};
use mask_codec::publish_mask;
use tilemark_common::{ImageDirSource, SegmentationConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON segmentation configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Root directory of the per-user mask store
    #[arg(short, long)]
    store: PathBuf,

    /// Directory holding one image file per image id
    #[arg(long, default_value = "images")]
    images: PathBuf,

    /// File extension of the image files
    #[arg(long, default_value = "png")]
    extension: String,

    /// Number of bands the images decode to
    #[arg(long, default_value = "4")]
    bands: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive prediction and write the per-pixel class ids
    Predict {
        /// Image id to predict over
        #[arg(short, long)]
        image: String,
        /// Path to the JSON predict request
        #[arg(short, long)]
        request: PathBuf,
        /// Where to write the prediction response bytes
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Save one annotator's wire-format mask and recompute the consensus
    SaveMask {
        #[arg(short, long)]
        image: String,
        #[arg(short, long)]
        user: String,
        /// Path to the wire-format mask payload
        #[arg(long)]
        input: PathBuf,
    },
    /// Write one annotator's stored mask back out as wire bytes
    LoadMask {
        #[arg(short, long)]
        image: String,
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Recompute and publish the consensus mask for an image
    Merge {
        #[arg(short, long)]
        image: String,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = SegmentationConfig::from_json_file(&cli.config)?;

    match &cli.command {
        Commands::Predict {
            image,
            request,
            output,
        } => {
            let service = service(&cli, config)?;
            let request_json = std::fs::read_to_string(request)?;
            let response = service.predict_mask(image, &request_json)?;
            std::fs::write(output, &response)?;
            info!("Wrote {} response bytes to {:?}", response.len(), output);
        }
        Commands::SaveMask { image, user, input } => {
            let service = service(&cli, config)?;
            let wire_bytes = std::fs::read(input)?;
            let outcome = service.save_mask(image, user, &wire_bytes)?;
            print_scores(&outcome)?;
        }
        Commands::LoadMask {
            image,
            user,
            output,
        } => {
            let service = service(&cli, config)?;
            match service.load_mask(image, user)? {
                Some(wire_bytes) => {
                    std::fs::write(output, &wire_bytes)?;
                    info!("Wrote {} wire bytes to {:?}", wire_bytes.len(), output);
                }
                None => info!("No stored mask for user '{user}' on image '{image}'"),
            }
        }
        Commands::Merge { image } => {
            merge_image(&cli.store, &config, image)?;
        }
    }

    Ok(())
}

fn service(cli: &Cli, config: SegmentationConfig) -> Result<SegmentationService> {
    let rasters = ImageDirSource::new(&cli.images, cli.extension.clone(), cli.bands);
    Ok(SegmentationService::new(
        config,
        MaskStore::new(&cli.store),
        Box::new(rasters),
    ))
}

fn merge_image(store_root: &Path, config: &SegmentationConfig, image: &str) -> Result<()> {
    let store = MaskStore::new(store_root);
    let area = &config.mask_area;
    let contributions = store.contributions(image, &config.classes, area.height(), area.width())?;

    let Some(outcome) = merge(&contributions, config) else {
        info!("No contributions for image '{image}', nothing to merge");
        return Ok(());
    };

    let extension = match config.mask_format {
        tilemark_common::MaskFormat::Msk => "msk",
        tilemark_common::MaskFormat::Png => "png",
        tilemark_common::MaskFormat::Jpeg => "jpg",
    };
    let merged_path = store.image_dir(image).join(format!("merged.{extension}"));
    publish_mask(
        &merged_path,
        &outcome.merged,
        config.mask_encoding,
        config.mask_format,
        &config.classes,
    )?;
    info!(
        "Merged {} contributions (agreement {:.2}) -> {:?}",
        contributions.len(),
        outcome.agreement,
        merged_path
    );
    print_scores(&outcome)?;
    Ok(())
}

fn print_scores(outcome: &consensus::MergeOutcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome.scores)?);
    Ok(())
}

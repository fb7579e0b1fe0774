use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use netmd_core::{AppConfig, Disc, DiscImage, EmulatedDevice, NetMdDevice, Upload};
use tracing_subscriber::EnvFilter;

type Device = NetMdDevice<EmulatedDevice>;

fn main() -> netmd_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let image = cli.image.as_path();

    match cli.command {
        Commands::Init { title, tracks } => run_init(image, &title, tracks),
        Commands::Show => {
            let (mut device, disc) = open(image, config)?;
            show(&mut device, &disc)
        }
        Commands::RenameGroup { group, name } => edit(image, config, |device, disc| {
            disc.rename_group(device, group, &name)
        }),
        Commands::CreateGroup { name } => edit(image, config, |device, disc| {
            let index = disc.create_group(device, &name)?;
            tracing::info!(index, %name, "created group");
            Ok(())
        }),
        Commands::Assign { track, group } => edit(image, config, |device, disc| {
            disc.assign_track_to_group(device, track, group)
        }),
        Commands::MoveGroup { group, track } => edit(image, config, |device, disc| {
            disc.move_group(device, track, group)
        }),
        Commands::DeleteGroup { group } => {
            edit(image, config, |device, disc| disc.delete_group(device, group))
        }
        Commands::DeleteTrack { track } => {
            edit(image, config, |device, _| device.delete_track(track))
        }
        Commands::Upload { file, title } => {
            edit(image, config, |device, _| run_upload(device, &file, &title))
        }
    }
}

/// Opens the disc image and reads its table of contents.
fn open(path: &Path, config: AppConfig) -> netmd_core::Result<(Device, Disc)> {
    let image = DiscImage::load(path)?;
    let mut device = NetMdDevice::with_config(EmulatedDevice::from_image(image), config);
    let disc = Disc::load(&mut device)?;
    Ok((device, disc))
}

/// Runs one mutating command and writes the image back.
fn edit<F>(path: &Path, config: AppConfig, command: F) -> netmd_core::Result<()>
where
    F: FnOnce(&mut Device, &mut Disc) -> netmd_core::Result<()>,
{
    let (mut device, mut disc) = open(path, config)?;
    command(&mut device, &mut disc)?;
    device.into_transport().into_image().save(path)?;
    tracing::info!(?path, "saved disc image");
    Ok(())
}

fn run_init(path: &Path, title: &str, tracks: u8) -> netmd_core::Result<()> {
    DiscImage::blank(title, tracks).save(path)?;
    tracing::info!(?path, tracks, "created disc image");
    Ok(())
}

fn show(device: &mut Device, disc: &Disc) -> netmd_core::Result<()> {
    println!("Disc: {}", disc.title());
    for (index, group) in disc.groups().iter().enumerate().skip(1) {
        match (group.start, group.finish) {
            (0, _) => println!("  Group {index} '{}': empty", group.name),
            (start, 0) => println!("  Group {index} '{}': track {start}", group.name),
            (start, finish) => {
                println!("  Group {index} '{}': tracks {start}-{finish}", group.name)
            }
        }
    }

    let count = device.transport().image().tracks.len().max(usize::from(disc.track_count()));
    let count = u16::try_from(count).unwrap_or(u16::MAX);
    for info in device.list_tracks(count)? {
        println!(
            "  {:>3} {} {:<6} {:<6} {}",
            info.index,
            info.time,
            info.encoding.label(),
            info.protection.label(),
            info.title.as_deref().unwrap_or("<Untitled>"),
        );
    }
    Ok(())
}

fn run_upload(device: &mut Device, file: &Path, title: &str) -> netmd_core::Result<()> {
    let payload = std::fs::read(file)?;
    tracing::info!(?file, bytes = payload.len(), "uploading");
    let report = Upload::new(device, &payload, title)?.run()?;
    println!(
        "Recorded track {} ({} bytes on the wire, {} splices)",
        report.track,
        report.wire_bytes,
        report.splices.len()
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Edit groups and record tracks on a NetMD disc", long_about = None)]
struct Cli {
    /// JSON disc image standing in for the recorder.
    #[arg(short, long, default_value = "disc.json")]
    image: PathBuf,
    /// Optional JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a disc image from a raw title string.
    Init {
        /// Raw disc title, e.g. "0;My Disc//1-2;Side A//".
        #[arg(short, long, default_value = "")]
        title: String,
        /// Number of blank tracks on the disc.
        #[arg(short = 'n', long, default_value_t = 0)]
        tracks: u8,
    },
    /// Print groups and tracks.
    Show,
    /// Rename a group; group 0 is the disc title.
    RenameGroup { group: usize, name: String },
    /// Append an empty group.
    CreateGroup { name: String },
    /// Move a track (0-based) into a group.
    Assign { track: u8, group: usize },
    /// Move a group's tracks so the block starts at a track (0-based).
    MoveGroup { group: usize, track: u8 },
    /// Remove a group label, leaving its tracks in place.
    DeleteGroup { group: usize },
    /// Delete a track from the disc.
    DeleteTrack { track: u8 },
    /// Record a raw audio payload as a new track.
    Upload {
        /// File holding the audio payload.
        file: PathBuf,
        /// Title of the new track.
        #[arg(short, long, default_value = "")]
        title: String,
    },
}

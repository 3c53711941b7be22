use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use soundstore::{CorruptSnapshotPolicy, Song, SongDatabase, StoreConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "soundstore")]
#[command(about = "Manage the song catalog snapshot")]
struct Cli {
    /// Snapshot file to read and write
    #[arg(long, global = true, env = "SOUNDSTORE_SNAPSHOT", default_value = soundstore::facade::DEFAULT_SNAPSHOT_PATH)]
    snapshot: PathBuf,

    /// Reject `add` for an identifier that already exists
    #[arg(long, global = true)]
    strict: bool,

    /// Start from an empty catalog if the snapshot cannot be parsed
    #[arg(long, global = true)]
    ignore_corrupt: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all songs
    List,
    /// Show one song
    Show { id: String },
    /// Add a song
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        path: Option<String>,
        /// Use this identifier instead of generating one
        #[arg(long)]
        id: Option<String>,
    },
    /// Record where a song's sound file is stored
    Attach { id: String, path: String },
    /// Delete a song
    Delete { id: String },
    /// Print catalog statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let policy = if cli.ignore_corrupt {
        CorruptSnapshotPolicy::StartEmpty
    } else {
        CorruptSnapshotPolicy::Fail
    };
    let config = StoreConfig::new()
        .snapshot_path(&cli.snapshot)
        .strict_inserts(cli.strict)
        .corrupt_snapshot_policy(policy);

    let db = SongDatabase::open(config)
        .await
        .with_context(|| format!("Failed to open snapshot '{}'", cli.snapshot.display()))?;

    match cli.command {
        Command::List => {
            for song in db.list_songs()? {
                println!("{}\t{}\t{}", song.id, song.title, song.path);
            }
            Ok(())
        }
        Command::Show { id } => {
            let song = db.get_song(&id)?;
            println!("{}", serde_json::to_string_pretty(&song)?);
            Ok(())
        }
        Command::Add {
            title,
            description,
            path,
            id,
        } => {
            let mut song = match id {
                Some(id) => Song::with_id(id, title, description),
                None => Song::new(title, description),
            };
            if let Some(path) = path {
                song = song.path(path);
            }
            let song = db.create_song(song).await?;
            println!("{}", song.id);
            save(&db)
        }
        Command::Attach { id, path } => {
            db.attach_path(&id, &path).await?;
            save(&db)
        }
        Command::Delete { id } => {
            db.delete_song(&id).await?;
            save(&db)
        }
        Command::Stats => {
            println!("songs: {}", db.song_count()?);
            println!("snapshot: {}", db.snapshots().path().display());
            println!("snapshot exists: {}", db.snapshots().exists());
            Ok(())
        }
    }
}

fn save(db: &SongDatabase) -> Result<()> {
    let status = db.save_status();
    if let soundstore::SnapshotStatus::Failed { error } = status {
        bail!("Error saving database: {}", error);
    }
    Ok(())
}

use std::path::Path;

use likes_dl::paths::DEFAULT_OUTPUT_DIR;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: likes_dl <likes_url> [new_song_limit]";

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().skip(1).any(|a| a == "-h" || a == "--help") {
        print_help();
        return;
    }

    let Some(likes_url) = args.get(1) else {
        println!("{USAGE}");
        std::process::exit(1);
    };

    // 0 = no limit
    let new_song_limit = match args.get(2) {
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(v) => v,
            Err(_) => {
                println!("new_song_limit must be a non-negative integer, got {raw:?}");
                println!("{USAGE}");
                std::process::exit(1);
            }
        },
        None => 0,
    };

    let output_dir = Path::new(DEFAULT_OUTPUT_DIR);
    if let Err(e) = likes_dl::download_likes(likes_url, new_song_limit, output_dir) {
        println!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_help() {
    println!(
        r#"likes_dl

Downloads every liked track from a listing as a tagged audio file, skipping
tracks already recorded in downloads/seen.jsonl and tracks over 15 minutes.

{USAGE}

Arguments:
  <likes_url>         Listing URL, e.g. https://soundcloud.com/<user>/likes
  [new_song_limit]    Stop after this many new downloads (default 0 = no limit)

Files (under ./downloads):
  seen.jsonl              one JSON record per downloaded track
  download_log.txt        "<title> - <uploader> (<key>)" per saved track
  download_log_ERROR.txt  "<title> - <error>" per failed track
  config.json             optional overrides for pacing, codec, duration limit
"#
    );
}

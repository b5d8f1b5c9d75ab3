//! webdav-fuse daemon entry point

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use webdav_fuse::config::Config;
use webdav_fuse::mount::MountManager;
use webdav_fuse::provider::WebdavFs;
use webdav_fuse::registry::ClientRegistry;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: webdav-fuse <config.yaml> <command> [args]");
    eprintln!();
    eprintln!("webdav-fuse - Mount WebDAV servers as local filesystems");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  connect <dir>       Pick a configured server interactively and mount it");
    eprintln!("  mount <id> <dir>    Mount the server with the given identifier");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  webdav-fuse /etc/webdav-fuse/config.yaml mount myserver /mnt/dav");
}

/// One listing line for the `connect` picker: the identifier labeled
/// with its host, or "no host" for entries still missing one.
fn server_label(identifier: &str, entry: &webdav_fuse::config::ServerEntry) -> String {
    format!("{} ({})", identifier, entry.host.as_deref().unwrap_or("no host"))
}

/// Ask the user to pick one of the configured servers.
fn pick_server(config: &Config) -> Result<String, Box<dyn std::error::Error>> {
    let entries: Vec<(&String, &webdav_fuse::config::ServerEntry)> =
        config.servers.iter().collect();

    println!("Select the server to connect to:");
    for (idx, (identifier, entry)) in entries.iter().enumerate() {
        println!("  {}) {}", idx + 1, server_label(identifier, entry));
    }
    print!("> ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let choice: usize = line.trim().parse()?;
    let (identifier, _) = entries
        .get(choice.wrapping_sub(1))
        .ok_or("selection out of range")?;

    Ok(identifier.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);

    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("webdav-fuse starting");
    info!("Loaded configuration from {:?}", config_path);

    let (identifier, mountpoint) = match args[2].as_str() {
        "connect" => {
            if args.len() != 4 {
                print_usage();
                std::process::exit(1);
            }
            let identifier = pick_server(&config)?;
            (identifier, PathBuf::from(&args[3]))
        }
        "mount" => {
            if args.len() != 5 {
                print_usage();
                std::process::exit(1);
            }
            (args[3].clone(), PathBuf::from(&args[4]))
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    let registry = ClientRegistry::new(Arc::new(config));
    let fs = Arc::new(WebdavFs::new(registry));
    let manager = Arc::new(MountManager::new(fs));

    // Graceful shutdown on Ctrl+C
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let m = manager.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
        m.unmount_all();
    })?;

    println!("Adding workspace folder webdav://{}", identifier);
    if let Err(e) = manager.mount(&identifier, mountpoint) {
        eprintln!("Failed to mount webdav://{}: {}", identifier, e);
        std::process::exit(1);
    }

    info!("webdav://{} mounted, press Ctrl+C to unmount and exit", identifier);

    while running.load(Ordering::SeqCst) && manager.count() > 0 {
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }

    info!("Shutting down");
    manager.unmount_all();
    info!("All filesystems unmounted, exiting");

    Ok(())
}

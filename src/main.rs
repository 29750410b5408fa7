use std::env;
use std::process;
use tail_follow::{Tail, TailConfig};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    let (follow, file_path) = match args.as_slice() {
        [_, path] => (false, path),
        [_, flag, path] if flag == "-f" => (true, path),
        _ => {
            let program = args.first().map(String::as_str).unwrap_or("tail-follow");
            eprintln!("Usage: {} [-f] <file_path>", program);
            process::exit(1);
        }
    };

    let config = TailConfig::new().follow(follow).allow_missing(follow);

    match Tail::with_config(file_path, config).await {
        Ok(tail) => {
            let mut lines = tail.lines();
            while let Some(line) = lines.next().await {
                match line {
                    Ok(line) => println!("{}", line),
                    Err(e) => eprintln!("Error reading file: {}", e),
                }
            }
        }
        Err(e) => {
            eprintln!("Error setting up file watcher: {}", e);
            process::exit(1);
        }
    }
}

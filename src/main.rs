use std::path::PathBuf;

fn main() {
    let opts = match handle_cli_flags() {
        Some(opts) => opts,
        None => return,
    };

    if let Err(err) = reels_tui::run(opts) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

/// Returns `None` when a flag was handled and the app should not start.
fn handle_cli_flags() -> Option<reels_tui::app::RunOptions> {
    let mut opts = reels_tui::app::RunOptions::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Reels-TUI {}", reels_tui::VERSION);
                return None;
            }
            "--help" | "-h" => {
                println!(
                    "Reels-TUI - Swipe through a short-form video feed from the terminal.\n\n  --config <path>      Read settings from this YAML file\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message"
                );
                return None;
            }
            "--config" => match args.next() {
                Some(path) => opts.config_file = Some(PathBuf::from(path)),
                None => {
                    eprintln!("error: --config requires a path");
                    std::process::exit(2);
                }
            },
            other => {
                eprintln!("error: unknown argument {other}");
                std::process::exit(2);
            }
        }
    }
    Some(opts)
}

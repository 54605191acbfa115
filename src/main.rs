use anyhow::Result;
use midicatcher_lib::config::{get_config_path, Config};
use std::env;
use std::path::PathBuf;

fn print_usage() {
    println!("Midicatcher - records every phrase played on a MIDI keyboard");
    println!();
    println!("Usage: midicatcher [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <PATH>   Read configuration from PATH");
    println!("                    (default: {})", get_config_path().display());
    println!("  --list-ports      List MIDI input ports that would be recorded");
    println!("  --print-config    Print the effective configuration as TOML");
    println!("  --help            Show this help message");
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(path) => PathBuf::from(path),
            None => {
                eprintln!("Error: --config requires a path");
                std::process::exit(1);
            }
        },
        None => get_config_path(),
    };
    let config = Config::load_or_default(&config_path);

    if args.iter().any(|a| a == "--print-config") {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    if args.iter().any(|a| a == "--list-ports") {
        return midicatcher_lib::list_ports(&config);
    }

    midicatcher_lib::run(config)
}

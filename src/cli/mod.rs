use anyhow::Result;
use console::style;

use crate::core::config::Paths;
use crate::core::terminal::{self, GuideSection};
use crate::interfaces::web::ApiServer;

const DEFAULT_API_HOST: &str = "127.0.0.1";
const DEFAULT_API_PORT: u16 = 18790;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("serve", "Start the command center API (default)")
        .command("paths", "Show resolved external file locations")
        .command("help", "Show this help")
        .print();

    GuideSection::new("Serve flags")
        .command("--api-host", "Bind address (default 127.0.0.1)")
        .command("--api-port", "Bind port (default 18790)")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("clawdeck").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServeArgs {
    pub api_host: String,
    pub api_port: u16,
}

pub(crate) fn parse_serve_args(args: &[String], start: usize) -> ServeArgs {
    let mut api_host = DEFAULT_API_HOST.to_string();
    let mut api_port = DEFAULT_API_PORT;
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--api-host" => {
                if i + 1 < args.len() {
                    api_host = args[i + 1].clone();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-port" => {
                if i + 1 < args.len() {
                    api_port = args[i + 1].parse().unwrap_or(DEFAULT_API_PORT);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    ServeArgs { api_host, api_port }
}

fn print_paths(paths: &Paths) {
    GuideSection::new("Resolved paths")
        .status("Data dir", &paths.data_dir.display().to_string())
        .status("Agent config", &paths.agent_config.display().to_string())
        .status("Cron jobs", &paths.cron_jobs.display().to_string())
        .status("Agents dir", &paths.agents_dir.display().to_string())
        .status("Market file", &paths.market_file.display().to_string())
        .status("Gateway bin", &paths.gateway_bin)
        .print();
}

async fn serve(args: ServeArgs) -> Result<()> {
    crate::logging::init();
    let paths = Paths::resolve();

    terminal::print_banner();
    terminal::print_status("API", &format!("http://{}:{}", args.api_host, args.api_port));
    terminal::print_status("Data dir", &paths.data_dir.display().to_string());
    terminal::print_status("Agent config", &paths.agent_config.display().to_string());
    println!();

    ApiServer::new(paths, args.api_host, args.api_port)
        .serve()
        .await
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        None | Some("serve") => serve(parse_serve_args(&args, 2)).await,
        Some("paths") => {
            print_paths(&Paths::resolve());
            Ok(())
        }
        Some("help") | Some("-h") | Some("--help") => {
            print_help();
            Ok(())
        }
        Some(other) => {
            terminal::print_error(&format!("Unknown command: {}", other));
            print_help();
            std::process::exit(1);
        }
    }
}

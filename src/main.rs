//!
//! pantry CLI binary
//! -----------------
//! Thin command-line front end over the client library. The session lives in a JSON file
//! (`session_file` in the config, `PANTRY_SESSION_FILE`, or `pantry_session.json` in the
//! working directory) so a login carries over to later invocations.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pantry_client::models::{CategoryRequest, LoginRequest, RegisterRequest};
use pantry_client::{AuthService, ClientConfig, NormalizedError, ProductService, RequestPipeline};

const DEFAULT_SESSION_FILE: &str = "pantry_session.json";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--config <file>] [--api <url>] <command> [args]\n\nCommands:\n  login <user> <password>            authenticate and store the session\n  register <user> <password> <email> create an account\n  logout                             forget the stored session\n  whoami                             show the signed-in user\n  products                           list products\n  product <id>                       show one product\n  delete-product <id>                delete a product\n  categories                         list categories\n  add-category <name>                create a category\n\nFlags:\n  --config <file>   JSON client config (PANTRY_* environment variables still override it)\n  --api <url>       API base URL (overrides config and PANTRY_API_URL)\n  -h, --help        Show this help\n\nLogging goes to stderr and is controlled by RUST_LOG (default: info)."
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn id_arg(rest: &[String], cmd: &str) -> Result<i64> {
    let raw = rest.first().ok_or_else(|| anyhow!("{} requires an id", cmd))?;
    raw.parse().map_err(|_| anyhow!("{} expects a numeric id, got '{}'", cmd, raw))
}

fn arg<'a>(rest: &'a [String], idx: usize, what: &str) -> Result<&'a str> {
    rest.get(idx).map(|s| s.as_str()).ok_or_else(|| anyhow!("missing {}", what))
}

// argv may legitimately be empty when spawned by exec with no arguments.
fn split_program(argv: &[String]) -> (String, &[String]) {
    let program = argv.first().cloned().unwrap_or_else(|| "pantry".into());
    (program, argv.get(1..).unwrap_or_default())
}

// Failures from the API are shown as the normalized message, not a debug dump.
fn api(e: NormalizedError) -> anyhow::Error { anyhow!("{} ({})", e.display_message(), e.kind) }

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let argv: Vec<String> = env::args().collect();
    let (program, args) = split_program(&argv);

    let mut config_path: Option<PathBuf> = None;
    let mut api_url: Option<String> = None;
    let mut command: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 >= args.len() { eprintln!("--config requires a path"); print_usage(&program); std::process::exit(2); }
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2; continue;
            }
            "--api" => {
                if i + 1 >= args.len() { eprintln!("--api requires a URL"); print_usage(&program); std::process::exit(2); }
                api_url = Some(args[i + 1].clone());
                i += 2; continue;
            }
            "-h" | "--help" => {
                print_usage(&program);
                return Ok(());
            }
            _ => {
                command = args[i..].to_vec();
                break;
            }
        }
    }
    if command.is_empty() {
        print_usage(&program);
        std::process::exit(2);
    }

    let mut cfg = ClientConfig::load(config_path.as_deref())?;
    if let Some(url) = api_url { cfg.api_url = url; }
    if cfg.session_file.is_none() { cfg.session_file = Some(PathBuf::from(DEFAULT_SESSION_FILE)); }
    info!(target: "config", "pantry CLI: api={} session={:?}", cfg.api_url, cfg.session_file);

    let pipeline = RequestPipeline::from_config(&cfg)?;
    let auth = AuthService::new(pipeline.clone());
    let products = ProductService::new(pipeline);

    let (cmd, rest) = (command[0].as_str(), &command[1..]);
    match cmd {
        "login" => {
            let req = LoginRequest { username: arg(rest, 0, "username")?.to_string(), password: arg(rest, 1, "password")?.to_string() };
            let who = auth.login(&req).await.map_err(api)?;
            print_json(&who)?;
        }
        "register" => {
            let req = RegisterRequest {
                username: arg(rest, 0, "username")?.to_string(),
                password: arg(rest, 1, "password")?.to_string(),
                email: arg(rest, 2, "email")?.to_string(),
            };
            auth.register(&req).await.map_err(api)?;
            println!("registered {}", req.username);
        }
        "logout" => {
            auth.logout();
            println!("logged out");
        }
        "whoami" => match auth.current_user() {
            Some(who) if auth.is_authenticated() => print_json(&who)?,
            _ => println!("not logged in"),
        },
        "products" => print_json(&products.get_products().await.map_err(api)?)?,
        "product" => print_json(&products.get_product(id_arg(rest, cmd)?).await.map_err(api)?)?,
        "delete-product" => {
            let id = id_arg(rest, cmd)?;
            products.delete_product(id).await.map_err(api)?;
            println!("deleted product {}", id);
        }
        "categories" => print_json(&products.get_categories().await.map_err(api)?)?,
        "add-category" => {
            let req = CategoryRequest { name: arg(rest, 0, "category name")?.to_string() };
            print_json(&products.create_category(&req).await.map_err(api)?)?;
        }
        other => {
            eprintln!("Unrecognized command: {}", other);
            print_usage(&program);
            std::process::exit(2);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_argv_falls_back_to_default_program_name() {
        let (program, rest) = split_program(&[]);
        assert_eq!(program, "pantry");
        assert!(rest.is_empty());

        let argv = vec!["/usr/bin/pantry".to_string(), "whoami".to_string()];
        let (program, rest) = split_program(&argv);
        assert_eq!(program, "/usr/bin/pantry");
        assert_eq!(rest, ["whoami".to_string()]);
    }
}

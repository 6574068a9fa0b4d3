mod viewer;

use log::error;
use std::env;
use std::path::PathBuf;

use basket_lib::{ItemId, DEFAULT_VIEWER_CONFIG_PATH};

use crate::viewer::{run_command, ViewerCommand, ViewerRunOptions};

fn usage() -> String {
    format!(
        "usage: basket-viewer [--config <path>] <command>\n\
         commands:\n\
         clusters                                   list clusters\n\
         resolve <item_id> [--index <n>]            print the image url of an item\n\
         show <cluster> [--page <n>] [--out <dir>]  fetch and print one page of a cluster\n\
         defaults:\n\
         --config {}",
        DEFAULT_VIEWER_CONFIG_PATH
    )
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("missing value for {}", flag))?;
    value
        .parse::<T>()
        .map_err(|_| format!("invalid value for {}: {}", flag, value))
}

fn parse_args(args: &[String]) -> Result<ViewerRunOptions, String> {
    if args.is_empty() || args[0] == "-h" || args[0] == "--help" {
        return Err(usage());
    }

    let mut config_path = PathBuf::from(DEFAULT_VIEWER_CONFIG_PATH);
    let mut positional: Vec<String> = Vec::new();
    let mut page = 1usize;
    let mut image_index: Option<u32> = None;
    let mut out_dir: Option<PathBuf> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --config".to_string())?;
                config_path = PathBuf::from(value);
            }
            "--page" => {
                i += 1;
                page = parse_value("--page", args.get(i))?;
                if page == 0 {
                    return Err("--page starts at 1".to_string());
                }
            }
            "--index" => {
                i += 1;
                image_index = Some(parse_value("--index", args.get(i))?);
            }
            "--out" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --out".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown argument: {}\n{}", other, usage()));
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(|s| s.as_str()) {
        Some("clusters") if positional.len() == 1 => ViewerCommand::Clusters,
        Some("resolve") if positional.len() == 2 => {
            let item_id: ItemId = parse_value("item_id", positional.get(1))?;
            ViewerCommand::Resolve {
                item_id,
                image_index,
            }
        }
        // cluster labels contain spaces, so the rest of the words form the selector
        Some("show") if positional.len() >= 2 => ViewerCommand::Show {
            cluster: positional[1..].join(" "),
            page: page - 1,
            out_dir,
        },
        _ => return Err(usage()),
    };

    Ok(ViewerRunOptions {
        config_path,
        command,
    })
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = env::args().skip(1).collect::<Vec<String>>();
    let options = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
    };

    if let Err(err) = run_command(options).await {
        error!("basket-viewer failed: {}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_clusters() {
        let options = parse_args(&args(&["--config", "cfg.json", "clusters"])).unwrap();
        assert_eq!(options.config_path, PathBuf::from("cfg.json"));
        assert_eq!(options.command, ViewerCommand::Clusters);
    }

    #[test]
    fn test_parse_resolve() {
        let options = parse_args(&args(&["resolve", "1050000", "--index", "3"])).unwrap();
        assert_eq!(options.config_path, PathBuf::from(DEFAULT_VIEWER_CONFIG_PATH));
        assert_eq!(
            options.command,
            ViewerCommand::Resolve {
                item_id: 1_050_000,
                image_index: Some(3)
            }
        );
        assert!(parse_args(&args(&["resolve", "-5"])).is_err());
        assert!(parse_args(&args(&["resolve"])).is_err());
    }

    #[test]
    fn test_parse_show() {
        let options =
            parse_args(&args(&["show", "2.", "Dresses", "--page", "2", "--out", "/tmp/x"])).unwrap();
        assert_eq!(
            options.command,
            ViewerCommand::Show {
                cluster: "2. Dresses".to_string(),
                page: 1,
                out_dir: Some(PathBuf::from("/tmp/x")),
            }
        );
        assert!(parse_args(&args(&["show", "2", "--page", "0"])).is_err());
        assert!(parse_args(&args(&["show", "2", "--page"])).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["--help"])).is_err());
        assert!(parse_args(&args(&["clusters", "--verbose"])).is_err());
        assert!(parse_args(&args(&["delete"])).is_err());
    }
}

use rustaccio_uplink::{
    config::{Config, DEFAULT_UPLINK},
    headers::{HeaderResolver, RequestHeaders},
    observability,
    upstream::build_upstreams,
};
use std::path::PathBuf;

const USAGE: &str = "\
Usage: rustaccio-headers [OPTIONS]

Prints the headers sent to an uplink, with credentials redacted.

Options:
  -c, --config <path>     Path to Verdaccio-style YAML config file
  -u, --uplink <name>     Uplink to resolve (default: \"default\")
  -H, --header <header>   Incoming header as 'Name: value' (repeatable)
  -h, --help              Print help
";

#[derive(Debug, Default, PartialEq, Eq)]
struct CliOptions {
    config_path: Option<PathBuf>,
    uplink: Option<String>,
    headers: Vec<(String, String)>,
    help: bool,
}

fn parse_cli_args<I>(args: I) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                options.help = true;
            }
            "-c" | "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --config".to_string())?;
                options.config_path = Some(PathBuf::from(value));
            }
            _ if arg.starts_with("--config=") => {
                let value = arg.trim_start_matches("--config=");
                if value.is_empty() {
                    return Err("missing value for --config".to_string());
                }
                options.config_path = Some(PathBuf::from(value));
            }
            "-u" | "--uplink" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --uplink".to_string())?;
                options.uplink = Some(value);
            }
            "-H" | "--header" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --header".to_string())?;
                options.headers.push(parse_header(&value)?);
            }
            _ => return Err(format!("unknown argument: {arg}")),
        }
    }
    Ok(options)
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("invalid header '{raw}', expected 'Name: value'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid header '{raw}', expected 'Name: value'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn main() {
    let options = match parse_cli_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if options.help {
        println!("{USAGE}");
        return;
    }

    let config = match options.config_path {
        Some(config_path) => Config::from_env_with_config_file(config_path),
        None => Config::from_env(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(2);
        }
    };

    let tracing_settings = observability::init_from_env(&config.log_level);
    tracing::debug!(
        log_filter = tracing_settings.filter,
        log_format = tracing_settings.log_format.as_str(),
        "initialized tracing subscriber"
    );

    let uplink_name = options.uplink.as_deref().unwrap_or(DEFAULT_UPLINK);
    let upstreams = build_upstreams(&config, &HeaderResolver::default());
    let Some(upstream) = upstreams.get(uplink_name) else {
        eprintln!("unknown uplink: {uplink_name}");
        std::process::exit(2);
    };

    let incoming = options.headers.into_iter().collect::<RequestHeaders>();
    match upstream.headers(&incoming) {
        Ok(headers) => {
            for (name, value) in headers.redacted() {
                println!("{name}: {value}");
            }
        }
        Err(err) => {
            eprintln!("uplink {}: {err}", upstream.name());
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::parse_cli_args;
    use std::path::PathBuf;

    #[test]
    fn parses_config_flag_with_space_delimited_value() {
        let parsed = parse_cli_args(vec!["--config".to_string(), "./config.yml".to_string()])
            .expect("parse args");
        assert_eq!(parsed.config_path, Some(PathBuf::from("./config.yml")));
        assert!(!parsed.help);
    }

    #[test]
    fn parses_config_flag_with_equals_value() {
        let parsed = parse_cli_args(vec!["--config=./config.yml".to_string()]).expect("parse args");
        assert_eq!(parsed.config_path, Some(PathBuf::from("./config.yml")));
    }

    #[test]
    fn parses_uplink_and_repeated_headers() {
        let parsed = parse_cli_args(vec![
            "-u".to_string(),
            "npmjs".to_string(),
            "-H".to_string(),
            "authorization: Bearer abc".to_string(),
            "--header".to_string(),
            "x-npm-session:s1".to_string(),
        ])
        .expect("parse args");
        assert_eq!(parsed.uplink.as_deref(), Some("npmjs"));
        assert_eq!(
            parsed.headers,
            vec![
                ("authorization".to_string(), "Bearer abc".to_string()),
                ("x-npm-session".to_string(), "s1".to_string()),
            ]
        );
    }

    #[test]
    fn errors_on_header_without_colon() {
        let err = parse_cli_args(vec!["-H".to_string(), "nocolon".to_string()])
            .expect_err("bad header");
        assert_eq!(err, "invalid header 'nocolon', expected 'Name: value'");
    }

    #[test]
    fn errors_when_config_value_is_missing() {
        let err = parse_cli_args(vec!["--config".to_string()]).expect_err("missing value");
        assert_eq!(err, "missing value for --config");
    }

    #[test]
    fn errors_on_unknown_flag() {
        let err = parse_cli_args(vec!["--wat".to_string()]).expect_err("unknown arg");
        assert_eq!(err, "unknown argument: --wat");
    }
}

//! Command line and `.env` handling.
//!
//! `fleet-supplies [--env-file PATH] [run|sync|report|export|seed] [--customer NAME] [--output PATH] [--seed N]`

use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    /// Sync and export on the configured interval.
    #[default]
    Run,
    Sync,
    Report,
    Export,
    Seed,
}

impl Command {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "run" => Some(Command::Run),
            "sync" => Some(Command::Sync),
            "report" => Some(Command::Report),
            "export" => Some(Command::Export),
            "seed" => Some(Command::Seed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cli {
    pub command: Command,
    pub env_file: Option<PathBuf>,
    /// `report`: restrict to one customer.
    pub customer: Option<String>,
    /// `report`: also write the rows as CSV here.
    pub output: Option<PathBuf>,
    /// `seed`: generator seed.
    pub seed: Option<u64>,
}

#[derive(Debug)]
pub struct LoadedEnvFile {
    pub path: PathBuf,
    pub explicit: bool,
}

/// Parse arguments, program name excluded. Options accept both `--opt value`
/// and `--opt=value`.
pub fn parse_args(args: impl IntoIterator<Item = OsString>) -> Result<Cli, String> {
    let mut cli = Cli::default();
    let mut command: Option<Command> = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let arg = arg
            .into_string()
            .map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String, String> {
            let v = match inline.clone() {
                Some(v) => v,
                None => args
                    .next()
                    .and_then(|v| v.into_string().ok())
                    .ok_or_else(|| format!("`{}` requires a value", name))?,
            };
            if v.is_empty() {
                return Err(format!("`{}` requires a value", name));
            }
            Ok(v)
        };

        match flag.as_str() {
            "--env-file" => set_once(&mut cli.env_file, "--env-file", PathBuf::from(value("--env-file")?))?,
            "--customer" => set_once(&mut cli.customer, "--customer", value("--customer")?)?,
            "--output" => set_once(&mut cli.output, "--output", PathBuf::from(value("--output")?))?,
            "--seed" => {
                let raw = value("--seed")?;
                let seed = parse_seed(&raw).ok_or_else(|| format!("`--seed` must be an integer, got {}", raw))?;
                set_once(&mut cli.seed, "--seed", seed)?;
            }
            "--" => break,
            word if !word.starts_with('-') => {
                let parsed = Command::parse(word).ok_or_else(|| format!("unknown command: {}", word))?;
                if command.replace(parsed).is_some() {
                    return Err("only one command may be given".to_string());
                }
            }
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }

    cli.command = command.unwrap_or_default();
    if cli.command != Command::Report && (cli.customer.is_some() || cli.output.is_some()) {
        return Err("`--customer` and `--output` only apply to `report`".to_string());
    }
    if cli.command != Command::Seed && cli.seed.is_some() {
        return Err("`--seed` only applies to `seed`".to_string());
    }
    Ok(cli)
}

fn set_once<T>(slot: &mut Option<T>, name: &str, value: T) -> Result<(), String> {
    if slot.replace(value).is_some() {
        return Err(format!("`{}` provided more than once", name));
    }
    Ok(())
}

fn parse_seed(raw: &str) -> Option<u64> {
    match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

/// Load the env file named on the command line, or `./.env` when present.
/// Variables already set in the process win.
pub fn load_env(cli: &Cli) -> Result<Option<LoadedEnvFile>, String> {
    let (path, explicit) = match &cli.env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            (path.clone(), true)
        }
        None => {
            let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
            let path = cwd.join(".env");
            if !path.is_file() {
                return Ok(None);
            }
            (path, false)
        }
    };

    for (key, value) in read_env_file(&path)? {
        if std::env::var_os(&key).is_none() {
            // Mutating the process environment is unsafe once threads exist; this runs before any are spawned.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(Some(LoadedEnvFile { path, explicit }))
}

pub fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, String> {
    let contents = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_env(&contents).map_err(|(line, e)| format!("{}:{}: {}", path.display(), line, e))
}

/// Parse dotenv text into assignments, in file order. Errors carry the
/// 1-based line number.
pub fn parse_env(contents: &str) -> Result<Vec<(String, String)>, (usize, String)> {
    let mut out = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);
        let (key, raw) = line
            .split_once('=')
            .ok_or_else(|| (index + 1, "missing '=' in assignment".to_string()))?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err((index + 1, format!("invalid variable name {:?}", key)));
        }
        let value = parse_env_value(raw.trim()).map_err(|e| (index + 1, e))?;
        out.push((key.to_string(), value));
    }
    Ok(out)
}

fn parse_env_value(raw: &str) -> Result<String, String> {
    let quote = match raw.chars().next() {
        Some(q @ ('"' | '\'')) => q,
        _ => {
            // unquoted: an inline comment needs a space before '#'
            let value = raw.split(" #").next().unwrap_or_default();
            return Ok(value.trim_end().to_string());
        }
    };

    let mut value = String::new();
    let mut chars = raw[1..].char_indices();
    while let Some((at, ch)) = chars.next() {
        if ch == quote {
            let rest = raw[1 + at + 1..].trim();
            if !rest.is_empty() && !rest.starts_with('#') {
                return Err(format!("unexpected text after closing {}", quote));
            }
            return Ok(value);
        }
        if ch == '\\' && quote == '"' {
            let (_, escaped) = chars
                .next()
                .ok_or_else(|| "unterminated escape sequence".to_string())?;
            value.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => other,
            });
            continue;
        }
        value.push(ch);
    }
    Err(format!("unterminated {} quoted value", quote))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Cli, String> {
        parse_args(list.iter().map(OsString::from))
    }

    #[test]
    fn no_arguments_means_run() {
        assert_eq!(args(&[]).unwrap(), Cli::default());
    }

    #[test]
    fn parses_command_and_options() {
        let cli = args(&["--env-file=prod.env", "report", "--customer", "Acme Andina", "--output", "out.csv"]).unwrap();
        assert_eq!(cli.command, Command::Report);
        assert_eq!(cli.env_file, Some(PathBuf::from("prod.env")));
        assert_eq!(cli.customer.as_deref(), Some("Acme Andina"));
        assert_eq!(cli.output, Some(PathBuf::from("out.csv")));

        let cli = args(&["seed", "--seed", "0x2a"]).unwrap();
        assert_eq!((cli.command, cli.seed), (Command::Seed, Some(42)));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(args(&["launch"]).is_err());
        assert!(args(&["sync", "export"]).is_err());
        assert!(args(&["--env-file"]).is_err());
        assert!(args(&["--env-file="]).is_err());
        assert!(args(&["--env-file", "a", "--env-file", "b"]).is_err());
        assert!(args(&["sync", "--customer", "Acme"]).is_err());
        assert!(args(&["seed", "--seed", "lots"]).is_err());
        assert!(args(&["-v"]).is_err());
    }

    #[test]
    fn parses_dotenv_lines() {
        let parsed = parse_env(
            "# comment\n\
             DATABASE_URL=postgres://localhost/sds\n\
             export API_URL = https://sds.example.com # prod\n\
             TO_ADDRS=\"ops@example.com, noc@example.com\"\n\
             ENCODED_KEY='a#b'\n\
             BANNER=\"line\\none\"\n\
             EMPTY=\n",
        )
        .unwrap();
        assert_eq!(
            parsed,
            vec![
                ("DATABASE_URL".to_string(), "postgres://localhost/sds".to_string()),
                ("API_URL".to_string(), "https://sds.example.com".to_string()),
                ("TO_ADDRS".to_string(), "ops@example.com, noc@example.com".to_string()),
                ("ENCODED_KEY".to_string(), "a#b".to_string()),
                ("BANNER".to_string(), "line\none".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn dotenv_errors_name_the_line() {
        assert_eq!(parse_env("A=1\nnot an assignment").unwrap_err().0, 2);
        assert!(parse_env("BAD KEY=1").is_err());
        assert!(parse_env("A=\"open").is_err());
        assert!(parse_env("A='x' y").is_err());
    }

    #[test]
    fn reads_env_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "SYNC_ENABLED=false\n").unwrap();
        assert_eq!(
            read_env_file(&path).unwrap(),
            vec![("SYNC_ENABLED".to_string(), "false".to_string())]
        );
        assert!(read_env_file(&dir.path().join("missing.env")).is_err());
    }
}

//! CLI probe and monthly recap report.
//!
//! # Responsibility
//! - Verify `attendance_core` linkage with deterministic ping/version output.
//! - Print a monthly recap as JSON for a configured database.
//!
//! Usage:
//! `attendance_cli [--config <file>] recap <YYYY-MM> [--students|--teachers] [--class N] [--detail]`

use attendance_core::db::{open_db, open_db_in_memory};
use attendance_core::{
    is_class_option, CoreConfig, EntityCatalog, LogNotifier, MonthlyAggregator, PersonKind,
    RecapOptions, SqliteDocumentStore, YearMonth, CLASS_OPTIONS,
};
use log::warn;
use std::process::ExitCode;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Probe,
    Recap {
        config_path: Option<String>,
        month: YearMonth,
        kind: PersonKind,
        class: Option<u8>,
        detail: bool,
    },
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::from(2);
        }
    };

    match command {
        Command::Probe => {
            println!("attendance_core ping={}", attendance_core::ping());
            println!("attendance_core version={}", attendance_core::core_version());
            ExitCode::SUCCESS
        }
        recap => match run_recap(recap) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(message) => {
                eprintln!("error: {message}");
                ExitCode::FAILURE
            }
        },
    }
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut config_path = None;
    let mut month = None;
    let mut kind = PersonKind::Teacher;
    let mut class = None;
    let mut detail = false;
    let mut recap = false;
    let mut has_options = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        has_options |= arg.starts_with("--");
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a file path")?;
                config_path = Some(path.clone());
            }
            "recap" => {
                recap = true;
                let value = iter.next().ok_or("recap needs a month (YYYY-MM)")?;
                month = Some(value.parse::<YearMonth>().map_err(|err| err.to_string())?);
            }
            "--students" => kind = PersonKind::Student,
            "--teachers" => kind = PersonKind::Teacher,
            "--class" => {
                let value = iter.next().ok_or("--class needs a number")?;
                let number = value
                    .parse::<u8>()
                    .ok()
                    .filter(|number| is_class_option(*number))
                    .ok_or_else(|| {
                        format!("invalid class `{value}`; expected one of {CLASS_OPTIONS:?}")
                    })?;
                class = Some(number);
            }
            "--detail" => detail = true,
            other => return Err(format!("unknown argument `{other}`")),
        }
    }

    match (recap, month) {
        (false, _) if !has_options => Ok(Command::Probe),
        (true, Some(month)) => Ok(Command::Recap {
            config_path,
            month,
            kind,
            class,
            detail,
        }),
        _ => Err("options require the `recap <YYYY-MM>` command".to_string()),
    }
}

fn run_recap(command: Command) -> Result<String, String> {
    let Command::Recap {
        config_path,
        month,
        kind,
        class,
        detail,
    } = command
    else {
        return Err("not a recap command".to_string());
    };

    let config = match config_path {
        Some(path) => CoreConfig::load(path).map_err(|err| err.to_string())?,
        None => CoreConfig::default(),
    };
    attendance_core::init_from_config(&config)?;

    let conn = match &config.db_path {
        Some(path) => open_db(path),
        None => open_db_in_memory(),
    }
    .map_err(|err| err.to_string())?;
    let store = SqliteDocumentStore::new(conn);

    let mut catalog = EntityCatalog::new();
    if let Err(err) = catalog.reload(&store) {
        warn!("event=cli_recap module=cli status=error error={err}");
        eprintln!("warning: {err}");
    }

    let options = match kind {
        PersonKind::Teacher => RecapOptions::teachers(),
        PersonKind::Student => RecapOptions::students(class),
    }
    .with_detail(detail)
    .with_batch_limit(config.query_batch_limit);
    let population = catalog.population(kind, options.class);

    let mut aggregator = MonthlyAggregator::new(&store, LogNotifier);
    let recaps = aggregator
        .aggregate(&catalog, &population, month, &options)
        .map_err(|err| err.to_string())?;
    serde_json::to_string_pretty(&recaps).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse_args, Command};
    use attendance_core::{PersonKind, YearMonth};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn no_arguments_run_the_probe() {
        assert_eq!(parse_args(&[]), Ok(Command::Probe));
    }

    #[test]
    fn recap_arguments_parse() {
        let command = parse_args(&args(&[
            "--config", "school.json", "recap", "2024-08", "--students", "--class", "3",
            "--detail",
        ]))
        .unwrap();
        assert_eq!(
            command,
            Command::Recap {
                config_path: Some("school.json".to_string()),
                month: YearMonth::new(2024, 8).unwrap(),
                kind: PersonKind::Student,
                class: Some(3),
                detail: true,
            }
        );
    }

    #[test]
    fn malformed_arguments_are_rejected() {
        assert!(parse_args(&args(&["recap", "August"])).is_err());
        assert!(parse_args(&args(&["--detail"])).is_err());
        assert!(parse_args(&args(&["--students"])).is_err());
        assert!(parse_args(&args(&["recap", "2024-08", "--class", "x"])).is_err());
        let unknown_class = parse_args(&args(&["recap", "2024-08", "--class", "9"])).unwrap_err();
        assert!(unknown_class.contains("[0, 1, 2, 3, 4, 5, 6]"));
        assert!(parse_args(&args(&["export"])).is_err());
    }
}

use super::*;
use clap::error::ErrorKind;

fn parse(args: &[&str]) -> Result<Command, clap::Error> {
    Cli::try_parse_from(std::iter::once("tapsync").chain(args.iter().copied()))
        .map(|cli| cli.command)
}

#[test]
fn test_serve_without_flags() {
    assert_eq!(
        parse(&["serve"]).unwrap(),
        Command::Serve(ServeArgs::default())
    );
}

#[test]
fn test_serve_flags_override_config() {
    let command = parse(&["serve", "--bind", "0.0.0.0:9000", "--data-dir", "/tmp/ts"]).unwrap();
    let mut config = AppConfig::default();
    command.apply(&mut config);
    assert_eq!(config.server.bind, "0.0.0.0:9000");
    assert_eq!(config.server.data_dir, PathBuf::from("/tmp/ts"));
    // Relay settings untouched
    assert_eq!(config.relay, AppConfig::default().relay);
}

#[test]
fn test_screen_flags_override_config() {
    let command = parse(&["screen", "--room", "lab2", "--api-base", "http://host:8787/api/"]).unwrap();
    let mut config = AppConfig::default();
    command.apply(&mut config);
    assert_eq!(config.relay.room_id, "lab2");
    assert_eq!(config.relay.api_base, "http://host:8787/api");
}

#[test]
fn test_task_requires_participant() {
    assert_eq!(
        parse(&["task"]).unwrap_err().kind(),
        ErrorKind::MissingRequiredArgument
    );
    assert_eq!(
        parse(&["task", "-p", "P07"]).unwrap(),
        Command::Task(TaskArgs {
            participant: "P07".to_string(),
            ..TaskArgs::default()
        })
    );
}

#[test]
fn test_task_flags_override_relay_config() {
    let command = parse(&[
        "task",
        "--participant",
        "P07",
        "--room",
        "lab3",
        "--api-base",
        "http://host:8787/api/",
    ])
    .unwrap();
    let mut config = AppConfig::default();
    command.apply(&mut config);
    assert_eq!(config.relay.room_id, "lab3");
    assert_eq!(config.relay.api_base, "http://host:8787/api");
    assert_eq!(config.server, AppConfig::default().server);
}

#[test]
fn test_missing_and_unknown_commands() {
    assert!(parse(&[]).is_err());
    assert_eq!(
        parse(&["record"]).unwrap_err().kind(),
        ErrorKind::InvalidSubcommand
    );
}

#[test]
fn test_flag_errors() {
    assert!(parse(&["serve", "--bind"]).is_err());
    assert_eq!(
        parse(&["screen", "--bind", "x"]).unwrap_err().kind(),
        ErrorKind::UnknownArgument
    );
}

//! `Cli`/`Commands` argument parsing, grounded on the teacher's
//! `Cli::try_parse_from` convention for exercising clap derive output without
//! a real process boundary.

use chintai_orchestrator::cli::{Cli, Commands, ScheduleCommands};
use clap::Parser;

#[test]
fn start_serial_parses_comma_separated_scrapers_and_areas() {
    let cli = Cli::try_parse_from([
        "chintai-orchestrator",
        "start-serial",
        "--scrapers",
        "suumo,homes",
        "--areas",
        "minato,shibuya",
        "--max-properties",
        "50",
    ])
    .unwrap();

    match cli.command {
        Commands::StartSerial(args) => {
            assert_eq!(args.scrapers, vec!["suumo".to_string(), "homes".to_string()]);
            assert_eq!(args.areas, vec!["minato".to_string(), "shibuya".to_string()]);
            assert_eq!(args.max_properties, 50);
            assert!(!args.force_detail_fetch);
        }
        other => panic!("expected StartSerial, got {other:?}"),
    }
}

#[test]
fn global_json_and_actor_flags_apply_regardless_of_position() {
    let cli = Cli::try_parse_from([
        "chintai-orchestrator",
        "--json",
        "--actor",
        "ops-bot",
        "list",
        "--active-only",
    ])
    .unwrap();
    assert!(cli.json);
    assert_eq!(cli.actor, "ops-bot");
    assert!(matches!(cli.command, Commands::List { active_only: true }));
}

#[test]
fn actor_defaults_to_cli_when_not_supplied() {
    let cli = Cli::try_parse_from(["chintai-orchestrator", "force-cleanup"]).unwrap();
    assert_eq!(cli.actor, "cli");
    assert!(matches!(cli.command, Commands::ForceCleanup));
}

#[test]
fn status_and_pause_require_a_task_id() {
    assert!(Cli::try_parse_from(["chintai-orchestrator", "status"]).is_err());
    let task_id = uuid::Uuid::new_v4();
    let cli = Cli::try_parse_from(["chintai-orchestrator", "pause", &task_id.to_string()]).unwrap();
    assert!(matches!(cli.command, Commands::Pause { task_id: id } if id == task_id));
}

#[test]
fn logs_since_defaults_to_none_and_parses_rfc3339_when_given() {
    let task_id = uuid::Uuid::new_v4();
    let cli = Cli::try_parse_from(["chintai-orchestrator", "logs", &task_id.to_string()]).unwrap();
    match cli.command {
        Commands::Logs { since, .. } => assert!(since.is_none()),
        other => panic!("expected Logs, got {other:?}"),
    }

    let cli = Cli::try_parse_from([
        "chintai-orchestrator",
        "logs",
        &task_id.to_string(),
        "--since",
        "2026-01-01T00:00:00Z",
    ])
    .unwrap();
    match cli.command {
        Commands::Logs { since: Some(since), .. } => {
            assert_eq!(since.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        }
        other => panic!("expected Logs with a cursor, got {other:?}"),
    }
}

#[test]
fn schedule_create_parses_an_interval_schedule() {
    let cli = Cli::try_parse_from([
        "chintai-orchestrator",
        "schedule",
        "create",
        "--name",
        "nightly-suumo",
        "--scrapers",
        "suumo",
        "--areas",
        "minato,shibuya",
        "--interval-minutes",
        "60",
    ])
    .unwrap();

    match cli.command {
        Commands::Schedule(ScheduleCommands::Create(args)) => {
            assert_eq!(args.name, "nightly-suumo");
            assert_eq!(args.scrapers, vec!["suumo".to_string()]);
            assert_eq!(args.areas, vec!["minato".to_string(), "shibuya".to_string()]);
            assert_eq!(args.interval_minutes, Some(60));
            assert!(args.daily_hour.is_none());
        }
        other => panic!("expected Schedule(Create), got {other:?}"),
    }
}

#[test]
fn schedule_create_parses_a_daily_schedule() {
    let cli = Cli::try_parse_from([
        "chintai-orchestrator",
        "schedule",
        "create",
        "--name",
        "morning-sweep",
        "--scrapers",
        "homes",
        "--areas",
        "13103",
        "--daily-hour",
        "6",
        "--daily-minute",
        "30",
    ])
    .unwrap();

    match cli.command {
        Commands::Schedule(ScheduleCommands::Create(args)) => {
            let schedule_type = args.into_schedule_type().unwrap();
            match schedule_type {
                chintai_orchestrator::domain::models::schedule::ScheduleType::Daily { hour, minute } => {
                    assert_eq!(hour, 6);
                    assert_eq!(minute, 30);
                }
                other => panic!("expected a Daily schedule type, got {other:?}"),
            }
        }
        other => panic!("expected Schedule(Create), got {other:?}"),
    }
}

#[test]
fn schedule_create_rejects_both_interval_and_daily_flags() {
    let cli = Cli::try_parse_from([
        "chintai-orchestrator",
        "schedule",
        "create",
        "--name",
        "conflicting",
        "--scrapers",
        "suumo",
        "--areas",
        "13103",
        "--interval-minutes",
        "60",
        "--daily-hour",
        "6",
    ])
    .unwrap();

    match cli.command {
        Commands::Schedule(ScheduleCommands::Create(args)) => {
            assert!(args.into_schedule_type().is_err());
        }
        other => panic!("expected Schedule(Create), got {other:?}"),
    }
}

#[test]
fn schedule_list_and_delete_parse() {
    let cli = Cli::try_parse_from(["chintai-orchestrator", "schedule", "list", "--active-only"]).unwrap();
    assert!(matches!(cli.command, Commands::Schedule(ScheduleCommands::List { active_only: true })));

    let schedule_id = uuid::Uuid::new_v4();
    let cli = Cli::try_parse_from(["chintai-orchestrator", "schedule", "delete", &schedule_id.to_string()]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Schedule(ScheduleCommands::Delete { schedule_id: id }) if id == schedule_id
    ));
}

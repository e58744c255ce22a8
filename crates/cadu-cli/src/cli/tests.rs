use super::*;
use clap::Parser;

#[test]
fn update_takes_two_version_names() {
    let cli = Cli::try_parse_from(["cadu", "update", "/srv/tree", "--update", "1.0", "1.1"])
        .unwrap();
    match cli.command {
        CliCommand::Update {
            root,
            update,
            check,
            backup_dir,
        } => {
            assert_eq!(root, std::path::PathBuf::from("/srv/tree"));
            assert_eq!(update.as_deref(), Some(&["1.0".to_string(), "1.1".to_string()][..]));
            assert!(!check);
            assert!(backup_dir.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn update_rejects_a_single_version_name() {
    assert!(Cli::try_parse_from(["cadu", "update", "/srv/tree", "--update", "1.0"]).is_err());
}

#[test]
fn check_flag_parses_without_versions() {
    let cli = Cli::try_parse_from(["cadu", "update", "/srv/tree", "--check"]).unwrap();
    match cli.command {
        CliCommand::Update { check, update, .. } => {
            assert!(check);
            assert!(update.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn backup_dir_is_optional_and_typed() {
    let cli = Cli::try_parse_from([
        "cadu",
        "update",
        "/srv/tree",
        "--update",
        "1.0",
        "1.1",
        "--backup-dir",
        "/var/backups/cadu",
    ])
    .unwrap();
    match cli.command {
        CliCommand::Update { backup_dir, .. } => {
            assert_eq!(
                backup_dir,
                Some(std::path::PathBuf::from("/var/backups/cadu"))
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn index_takes_tree_and_output() {
    let cli = Cli::try_parse_from(["cadu", "index", "/srv/tree", "/tmp/out.json.xz"]).unwrap();
    match cli.command {
        CliCommand::Index { path, out } => {
            assert_eq!(path, std::path::PathBuf::from("/srv/tree"));
            assert_eq!(out, std::path::PathBuf::from("/tmp/out.json.xz"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn versions_needs_no_arguments() {
    let cli = Cli::try_parse_from(["cadu", "versions"]).unwrap();
    assert!(matches!(cli.command, CliCommand::Versions));
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::*;

/// Parse with a scrubbed environment so ambient PORT/HOST/etc. don't leak
/// into assertions. Tests touching the environment are serialized.
fn parse(args: &[&str]) -> anyhow::Result<Config> {
    for var in [
        "PORT", "HOST", "DATABASE_PATH", "JWT_SECRET", "ENCRYPTION_KEY",
        "ADMIN_USERNAME", "ADMIN_PASSWORD", "DATA_DIR", "AUTO_START_TRAEFIK",
        "TRAEFIK_PORT_MIN", "TRAEFIK_PORT_MAX",
    ] {
        std::env::remove_var(var);
    }
    let mut argv = vec!["berth"];
    argv.extend_from_slice(args);
    Config::try_parse_from(argv).map_err(|e| anyhow::anyhow!("{e}"))
}

#[test]
#[serial_test::serial]
fn defaults_validate() -> anyhow::Result<()> {
    let config = parse(&[])?;
    config.validate()?;
    assert_eq!(config.port, 8080);
    assert_eq!(config.traefik_port_min, 20000);
    Ok(())
}

#[test]
#[serial_test::serial]
fn inverted_port_range_rejected() -> anyhow::Result<()> {
    let config = parse(&["--traefik-port-min", "21000", "--traefik-port-max", "20000"])?;
    assert!(config.validate().is_err());
    Ok(())
}

#[test]
#[serial_test::serial]
fn bad_log_format_rejected() -> anyhow::Result<()> {
    let config = parse(&["--log-format", "xml"])?;
    assert!(config.validate().is_err());
    Ok(())
}

#[test]
#[serial_test::serial]
fn database_path_defaults_under_data_dir() -> anyhow::Result<()> {
    let config = parse(&["--data-dir", "/srv/berth"])?;
    assert_eq!(config.database_path(), std::path::PathBuf::from("/srv/berth/berth.db"));
    assert_eq!(config.workspace_root(), std::path::PathBuf::from("/srv/berth/workspaces"));
    Ok(())
}

#[test]
#[serial_test::serial]
fn missing_secrets_are_generated() -> anyhow::Result<()> {
    let config = parse(&[])?;
    let secrets = config.resolve_secrets();
    assert!(!secrets.jwt_secret.is_empty());
    assert!(!secrets.encryption_key.is_empty());
    assert_eq!(secrets.admin_username, "admin");
    // Generated password is 16 random bytes hex-encoded.
    assert_eq!(secrets.admin_password.len(), 32);
    Ok(())
}

#[test]
#[serial_test::serial]
fn supplied_secrets_win() -> anyhow::Result<()> {
    let config = parse(&[
        "--jwt-secret", "sekrit",
        "--admin-username", "ops",
        "--admin-password", "hunter2",
    ])?;
    let secrets = config.resolve_secrets();
    assert_eq!(secrets.jwt_secret, "sekrit");
    assert_eq!(secrets.admin_username, "ops");
    assert_eq!(secrets.admin_password, "hunter2");
    Ok(())
}

#[test]
fn random_hex_length_and_charset() {
    let hex = random_hex(32);
    assert_eq!(hex.len(), 64);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
}

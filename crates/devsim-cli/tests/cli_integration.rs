use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn devsim() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_devsim"));
    // Keep discovery away from the developer's own configuration.
    cmd.env_remove("DEVSIM_CONFIG");
    cmd.env("HOME", std::env::temp_dir());
    cmd
}

fn write_config(temp_dir: &TempDir, content: &str) -> String {
    let path = temp_dir.path().join("devsim.yaml");
    fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

fn write_named(dir: &std::path::Path, name: &str, base_url: &str) -> String {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, format!("api:\n  base_url: {}\n", base_url)).unwrap();
    path.to_str().unwrap().to_string()
}

fn effective_base_url(cmd: &mut Command) -> String {
    let output = cmd.arg("config").output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let yaml: serde_yaml::Value = serde_yaml::from_slice(&output.stdout).unwrap();
    yaml["api"]["base_url"].as_str().unwrap().to_string()
}

#[test]
fn test_config_env_var_beats_cwd_file() {
    let cwd = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    write_named(cwd.path(), "devsim.yaml", "http://cwd:8000");
    let env_config = write_named(other.path(), "env.yaml", "http://env:8000");

    let url = effective_base_url(
        devsim()
            .current_dir(cwd.path())
            .env("DEVSIM_CONFIG", &env_config),
    );
    assert_eq!(url, "http://env:8000");

    // A DEVSIM_CONFIG pointing nowhere falls through to ./devsim.yaml.
    let url = effective_base_url(
        devsim()
            .current_dir(cwd.path())
            .env("DEVSIM_CONFIG", other.path().join("missing.yaml")),
    );
    assert_eq!(url, "http://cwd:8000");
}

#[test]
fn test_config_flag_beats_env_var() {
    let temp_dir = TempDir::new().unwrap();
    let flag_config = write_named(temp_dir.path(), "flag.yaml", "http://flag:8000");
    let env_config = write_named(temp_dir.path(), "env.yaml", "http://env:8000");

    let url = effective_base_url(
        devsim()
            .current_dir(temp_dir.path())
            .env("DEVSIM_CONFIG", &env_config)
            .args(["--config", &flag_config]),
    );
    assert_eq!(url, "http://flag:8000");
}

#[test]
fn test_cwd_file_beats_home_config() {
    let home = TempDir::new().unwrap();
    let cwd = TempDir::new().unwrap();
    let empty = TempDir::new().unwrap();
    write_named(home.path(), ".config/devsim/config.yaml", "http://home:8000");
    write_named(cwd.path(), "devsim.yaml", "http://cwd:8000");

    let url = effective_base_url(devsim().current_dir(cwd.path()).env("HOME", home.path()));
    assert_eq!(url, "http://cwd:8000");

    let url = effective_base_url(devsim().current_dir(empty.path()).env("HOME", home.path()));
    assert_eq!(url, "http://home:8000");
}

#[test]
fn test_config_prints_effective_yaml() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(
        &temp_dir,
        "api:\n  base_url: http://sim.local:9000/\nplayback:\n  default_speed: 5\npolling:\n  interval: 500ms\n",
    );

    let output = devsim().args(["--config", &config, "config"]).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let yaml: serde_yaml::Value = serde_yaml::from_slice(&output.stdout).unwrap();
    assert_eq!(yaml["api"]["base_url"].as_str(), Some("http://sim.local:9000"));
    assert_eq!(yaml["playback"]["default_speed"].as_u64(), Some(5));
    assert_eq!(yaml["polling"]["interval"].as_str(), Some("500ms"));
}

#[test]
fn test_defaults_without_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let output = devsim()
        .current_dir(temp_dir.path())
        .arg("config")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("http://localhost:8000"));
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "playback:\n  default_speed: 3\n");
    let output = devsim().args(["--config", &config, "config"]).output().unwrap();
    assert!(!output.status.success());

    let output = devsim()
        .current_dir(temp_dir.path())
        .args(["--url", "ftp://sim", "--config", &config, "devices"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_unknown_speed_flag_is_rejected() {
    let output = devsim().args(["replay", "d1", "--speed", "3"]).output().unwrap();
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
}

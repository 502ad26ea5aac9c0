use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Write `contents` to `config.yaml` in a fresh temporary directory.
#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Config that launches the bundled stdio test server.
#[allow(dead_code)]
pub fn stdio_test_server_config() -> String {
    format!(
        "server:\n  transport: stdio\n  command: \"{}\"\nclient:\n  request_timeout_seconds: 10\n",
        env!("CARGO_BIN_EXE_mcp_test_server")
    )
}

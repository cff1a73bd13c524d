use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::anyhow;
use argument_parser::Parser;
use sd_step_executor::{Build, ExecutorConfig, LoggingApi, Supervisor, WriterEmitter};

fn main() -> anyhow::Result<()> {
    let mut parser = Parser::from_env();

    let mut build_path = None::<PathBuf>;
    let mut work_dir = std::env::current_dir()?;
    let mut source_dir = None::<PathBuf>;
    let mut shell_bin = PathBuf::from("/bin/sh");
    let mut timeout_secs: u64 = 3600;
    let mut build_id = "local".to_string();
    let mut env_file_prefix = std::env::temp_dir().join("sdrun");

    while let Some(param) = parser.param()? {
        match param {
            p if p.is_long("build") => {
                build_path = Some(parser.value()?);
            }
            p if p.is_long("work-dir") => {
                work_dir = parser.value()?;
            }
            p if p.is_long("source-dir") => {
                source_dir = Some(parser.value()?);
            }
            p if p.is_long("shell") => {
                shell_bin = parser.value()?;
            }
            p if p.is_long("timeout") => {
                let secs: String = parser.value()?;
                timeout_secs = secs
                    .parse()
                    .map_err(|_| anyhow!("Invalid timeout seconds: {secs}"))?;
            }
            p if p.is_long("build-id") => {
                build_id = parser.value()?;
            }
            p if p.is_long("env-file-prefix") => {
                env_file_prefix = parser.value()?;
            }
            _ => {}
        }
    }

    let build_path = build_path.ok_or_else(|| anyhow!("--build <path> is required"))?;
    let build: Build = serde_json::from_str(&fs::read_to_string(&build_path)?)?;
    let source_dir = source_dir.unwrap_or_else(|| work_dir.clone());

    let config = ExecutorConfig::new(
        work_dir,
        std::env::vars().collect(),
        build_id,
        shell_bin,
        Duration::from_secs(timeout_secs),
        env_file_prefix,
        source_dir,
    );

    let emitter = WriterEmitter::new(io::stdout());
    let api = LoggingApi;
    let supervisor = Supervisor::new(config, &emitter, &api);

    println!("running {} command(s)", build.len());
    supervisor.run(&build)?;
    println!("build succeeded");
    Ok(())
}

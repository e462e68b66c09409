use std::path::Path;

use anyhow::Result;
use tts_benchmarks::controller::tool_available;
use tts_benchmarks::monitoring::GpuQuery;
use tts_benchmarks::preflight;
use tts_benchmarks::{HarnessConfig, HarnessError};

use crate::output::{OutputManager, ToolCheck};

pub async fn run(config_path: Option<&Path>, output: &OutputManager) -> Result<()> {
    let config = HarnessConfig::load(config_path).map_err(HarnessError::from)?;

    let tools = vec![
        ToolCheck {
            name: "docker".to_string(),
            available: tool_available("docker", &["compose", "version"]).await,
            note: "needed to start services unless --external is used".to_string(),
        },
        ToolCheck {
            name: config.sampling.gpu_command.clone(),
            available: GpuQuery::detect(&config.sampling.gpu_command).await.is_available(),
            note: "GPU metrics read as zero without it".to_string(),
        },
        ToolCheck {
            name: config.runner.script_interpreter.clone(),
            available: tool_available(&config.runner.script_interpreter, &["--version"]).await,
            note: format!("runs each service's {} when present", config.runner.test_script),
        },
    ];

    output.print_config_overview(&config, &tools);

    let ports = preflight::check_ports(&config.services).await;
    let disk = preflight::check_disk_space(Path::new("."));
    output.print_preflight(&ports, &disk, config.runner.external_services);
    Ok(())
}

use std::path::Path;

use anyhow::Result;
use tts_benchmarks::{HarnessConfig, HarnessError};

use crate::output::OutputManager;

pub fn run(config_path: Option<&Path>, output: &OutputManager) -> Result<()> {
    let config = HarnessConfig::load(config_path).map_err(HarnessError::from)?;

    output.print_success(&format!(
        "Configuration is valid: {} services, {} tests",
        config.services.len(),
        config.tests.len()
    ));

    for service in config.services.iter().filter(|s| !s.directory.is_dir()) {
        output.print_warning(&format!(
            "Service {} directory {} does not exist (fine with --external)",
            service.id,
            service.directory.display()
        ));
    }

    Ok(())
}

//! Laying out captured audio next to the report

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::report::ComparisonReport;
use crate::utils::format::file_safe;

pub const AUDIO_DIR: &str = "audio";

/// One artifact and the name it gets in the audio directory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedCopy {
    pub service_id: String,
    pub test_id: String,
    pub source: PathBuf,
    pub file_name: String,
}

/// Path of a copied file relative to the report, as used by the HTML audio elements
pub fn relative_path(file_name: &str) -> String {
    format!("{}/{}", AUDIO_DIR, file_name)
}

/// Name every existing artifact of the completed services
///
/// Names are `{seq:02}_{service}_{test}.{ext}` with `seq` counting from 1 over
/// completed services in report order, skipping artifacts whose source file is
/// gone.
pub fn plan_copies(report: &ComparisonReport) -> Vec<PlannedCopy> {
    let mut plan = Vec::new();

    for entry in report.completed() {
        let service = file_safe(&entry.id);

        for result in &entry.results {
            let Some(artifact) = &result.artifact else {
                continue;
            };
            if !artifact.path.is_file() {
                debug!(path = %artifact.path.display(), "Artifact source missing, skipping");
                continue;
            }

            let ext = artifact
                .path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("wav");
            let seq = plan.len() + 1;

            plan.push(PlannedCopy {
                service_id: entry.id.clone(),
                test_id: result.test_id.clone(),
                source: artifact.path.clone(),
                file_name: format!("{:02}_{}_{}.{}", seq, service, result.test_id, ext),
            });
        }
    }

    plan
}

/// Copy planned artifacts into `audio_dir`, returning the ones that landed
pub fn copy_artifacts(plan: &[PlannedCopy], audio_dir: &Path) -> Result<Vec<PlannedCopy>> {
    if plan.is_empty() {
        return Ok(Vec::new());
    }

    fs::create_dir_all(audio_dir)?;

    let mut copied = Vec::with_capacity(plan.len());
    for item in plan {
        let target = audio_dir.join(&item.file_name);
        match fs::copy(&item.source, &target) {
            Ok(_) => copied.push(item.clone()),
            Err(e) => warn!(source = %item.source.display(), "Failed to copy artifact: {}", e),
        }
    }

    debug!(copied = copied.len(), "Audio artifacts copied");
    Ok(copied)
}

/// Record each copy's name on the artifact it came from
pub fn annotate_copies(report: &mut ComparisonReport, copied: &[PlannedCopy]) {
    for copy in copied {
        let artifact = report
            .services
            .iter_mut()
            .filter(|e| e.id == copy.service_id)
            .flat_map(|e| e.results.iter_mut())
            .filter(|r| r.test_id == copy.test_id)
            .filter_map(|r| r.artifact.as_mut())
            .find(|a| a.path == copy.source && a.copied_file.is_none());

        match artifact {
            Some(artifact) => artifact.copied_file = Some(copy.file_name.clone()),
            None => debug!(file = %copy.file_name, "Copied artifact has no matching result"),
        }
    }
}

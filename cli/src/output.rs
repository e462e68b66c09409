use console::{style, Style};
use tts_benchmarks::config::HarnessConfig;
use tts_benchmarks::preflight::{DiskCheck, PortCheck, SpaceStatus, MINIMUM_FREE_GB, RECOMMENDED_FREE_GB};
use tts_benchmarks::report::ReportPaths;
use tts_benchmarks::utils::format::seconds_or_na;
use tts_benchmarks::{ComparisonReport, ServiceStatus};

pub struct OutputManager {
    colored: bool,
}

/// Availability of a host tool the harness relies on
pub struct ToolCheck {
    pub name: String,
    pub available: bool,
    pub note: String,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn print_success(&self, message: &str) {
        if self.colored {
            println!("{} {}", style("✓").green().bold(), message);
        } else {
            println!("✓ {}", message);
        }
    }

    pub fn print_warning(&self, message: &str) {
        if self.colored {
            println!("{} {}", style("⚠").yellow().bold(), message);
        } else {
            println!("⚠ {}", message);
        }
    }

    pub fn print_error(&self, message: &str) {
        if self.colored {
            eprintln!("{} {}", style("✗").red().bold(), message);
        } else {
            eprintln!("✗ {}", message);
        }
    }

    pub fn print_info(&self, message: &str) {
        if self.colored {
            println!("{} {}", style("ℹ").blue().bold(), message);
        } else {
            println!("ℹ {}", message);
        }
    }

    fn heading(&self, text: &str) {
        if self.colored {
            println!("\n{}", style(text).bold().underlined());
        } else {
            println!("\n{}", text);
        }
    }

    fn status_style(&self, ok: bool) -> Style {
        match (self.colored, ok) {
            (false, _) => Style::new(),
            (true, true) => Style::new().green(),
            (true, false) => Style::new().red(),
        }
    }

    /// Services and tests a run is about to cover
    pub fn print_plan(&self, config: &HarnessConfig) {
        let services: Vec<&str> = config.services.iter().map(|s| s.id.as_str()).collect();
        let tests: Vec<&str> = config.tests.iter().map(|t| t.id.as_str()).collect();

        self.print_info(&format!("Services: {}", services.join(", ")));
        self.print_info(&format!("Tests: {}", tests.join(", ")));
        match config.runner.parallel_workers {
            Some(workers) if workers > 1 => self.print_info(&format!("Parallel workers: {}", workers)),
            _ => {}
        }
        if config.runner.external_services {
            self.print_info("External mode: services are expected to be running already");
        }
        if !config.report.include_audio {
            self.print_info("Audio files will not be copied into the report");
        }
        if !config.report.write_html {
            self.print_info("HTML report disabled: only the JSON data is written");
        }
    }

    pub fn print_config_overview(&self, config: &HarnessConfig, tools: &[ToolCheck]) {
        self.heading("Services");
        println!("{:<10} {:<16} {:<28} {}", "ID", "NAME", "URL", "DIRECTORY");
        for service in &config.services {
            let dir = service.directory.display().to_string();
            let dir = if service.directory.is_dir() {
                dir
            } else {
                format!("{} (missing)", dir)
            };
            println!("{:<10} {:<16} {:<28} {}", service.id, service.name, service.base_url, dir);
        }

        self.heading("Tests");
        println!("{:<10} {:<16} {:>6}  {}", "ID", "CATEGORY", "CHARS", "LANG");
        for test in &config.tests {
            println!(
                "{:<10} {:<16} {:>6}  {}",
                test.id,
                test.category,
                test.text.chars().count(),
                test.language
            );
        }

        self.heading("Host tools");
        for tool in tools {
            let mark = if tool.available { "available" } else { "missing" };
            println!(
                "{:<12} {}  {}",
                tool.name,
                self.status_style(tool.available).apply_to(format!("{:<9}", mark)),
                tool.note
            );
        }
    }

    /// Port and disk checks; busy ports only matter when the harness starts the services
    pub fn print_preflight(&self, ports: &[PortCheck], disk: &DiskCheck, external: bool) {
        self.heading("Preflight");
        for check in ports {
            let target = format!("{} ({}:{})", check.service_id, check.host, check.port);
            match (check.in_use, external) {
                (false, false) => self.print_success(&format!("{} port free", target)),
                (true, true) => self.print_success(&format!("{} is answering", target)),
                (true, false) => self.print_warning(&format!(
                    "{} port already in use; a previous container may still be running",
                    target
                )),
                (false, true) => self.print_warning(&format!(
                    "{} is not answering but external mode expects it running",
                    target
                )),
            }
        }

        let location = disk.path.display();
        match (disk.available_gb(), disk.status()) {
            (Some(gb), Some(SpaceStatus::Plenty)) => {
                self.print_success(&format!("{:.1} GB free at {}", gb, location))
            }
            (Some(gb), Some(SpaceStatus::Low)) => self.print_warning(&format!(
                "Only {:.1} GB free at {}; at least {:.0} GB is recommended",
                gb, location, RECOMMENDED_FREE_GB
            )),
            (Some(gb), _) => self.print_error(&format!(
                "{:.1} GB free at {}; below the {:.0} GB minimum",
                gb, location, MINIMUM_FREE_GB
            )),
            (None, _) => self.print_warning(&format!("Could not determine free disk space at {}", location)),
        }
    }

    pub fn print_summary(&self, report: &ComparisonReport) {
        self.heading("Results");
        println!(
            "{:<16} {:<16} {:>7} {:>10} {:>10} {:>10} {:>10}",
            "SERVICE", "STATUS", "PASSED", "AVG TIME", "MAX TIME", "CPU AVG", "MEM PEAK"
        );

        for entry in &report.services {
            let summary = entry.summary();
            let ok = entry.status == ServiceStatus::Completed;
            let (cpu, mem) = if entry.resources.has_data() {
                (
                    format!("{:.1}%", entry.resources.cpu.avg),
                    format!("{:.2}GB", entry.resources.memory.peak_gb),
                )
            } else {
                ("N/A".to_string(), "N/A".to_string())
            };

            println!(
                "{:<16} {} {:>7} {:>10} {:>10} {:>10} {:>10}",
                entry.name,
                self.status_style(ok).apply_to(format!("{:<16}", entry.status.as_str())),
                format!("{}/{}", summary.successful_tests, summary.total_tests),
                seconds_or_na(summary.avg_synthesis_time, 2),
                seconds_or_na(summary.max_synthesis_time, 2),
                cpu,
                mem
            );

            if let Some(error) = &entry.error {
                println!("    {}", self.status_style(false).apply_to(error));
            }
            if let Some(script) = entry.test_script.as_ref().filter(|s| s.available) {
                let verdict = if script.success { "passed" } else { "failed" };
                println!(
                    "    test script {}",
                    self.status_style(script.success).apply_to(verdict)
                );
            }
        }

        if let Some(by_test) = report.summary.as_ref().map(|s| &s.by_test_type).filter(|t| !t.is_empty()) {
            println!();
            println!("{:<16} {:<16} {:>7} {:>10}", "TEST", "CATEGORY", "PASSED", "AVG TIME");
            for test in by_test {
                println!(
                    "{:<16} {:<16} {:>7} {:>10}",
                    test.test_id,
                    test.category,
                    format!("{}/{}", test.successful_tests, test.total_tests),
                    seconds_or_na(test.avg_synthesis_time, 2)
                );
            }
        }

        if let Some(summary) = &report.summary {
            println!();
            let message = format!(
                "{}/{} services completed, {}/{} tests passed ({:.1}%)",
                summary.completed_services,
                summary.total_services,
                summary.successful_tests,
                summary.total_tests,
                summary.success_rate
            );
            if summary.failed_services == 0 && summary.successful_tests == summary.total_tests {
                self.print_success(&message);
            } else {
                self.print_warning(&message);
            }
        }
    }

    pub fn print_report_paths(&self, paths: &ReportPaths) {
        if let Some(html) = &paths.html {
            self.print_success(&format!("HTML report: {}", html.display()));
        }
        if let Some(charts) = &paths.charts {
            self.print_success(&format!("Charts:      {}", charts.display()));
        }
        self.print_success(&format!("JSON data:   {}", paths.json.display()));
        if paths.audio_files > 0 {
            self.print_success(&format!(
                "Audio files: {} in {}",
                paths.audio_files,
                paths.audio_dir.display()
            ));
        }
    }
}

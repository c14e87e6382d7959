//! `conform run`

use crate::report::{RunReport, TestRecord};
use crate::suite::Suite;
use conform_core::{
    CommandCompiler, CompilerUnderTest, HarnessConfig, ProcessVerifierFactory, ReferenceRegistry,
    ReleaseTier, RuntimeCache, TestOrchestrator, VerifierFactory, WaiverRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct RunArgs {
    pub config_path: Option<PathBuf>,
    pub suite: PathBuf,
    pub compiler: String,
    pub compare: bool,
    pub roots: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub runtime: Option<PathBuf>,
    pub compliance: Option<ReleaseTier>,
    pub report: Option<PathBuf>,
}

impl RunArgs {
    /// Command-line flags win over the loaded configuration
    fn apply_to(&self, config: &mut HarnessConfig) {
        if self.compare {
            config.run_reference = true;
        }
        if !self.roots.is_empty() {
            config.reference_roots = self.roots.clone();
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(tier) = self.compliance {
            config.compliance = tier;
        }
    }
}

pub async fn run_command(args: RunArgs) -> anyhow::Result<()> {
    let mut config = super::load_config(args.config_path.as_deref())?;
    args.apply_to(&mut config);

    let suite = Suite::load(&args.suite)?;
    info!("Loaded suite {} ({} tests)", suite.name, suite.tests.len());

    let compiler: Arc<dyn CompilerUnderTest> =
        Arc::new(CommandCompiler::new(&args.compiler, config.runner())?);
    let waivers = Arc::new(WaiverRegistry::from_config(&config)?);

    let references = if config.run_reference {
        if config.reference_roots.is_empty() {
            anyhow::bail!(
                "comparison requested but no reference installation given; pass --root or set CONFORM_REFERENCE_ROOTS"
            );
        }
        ReferenceRegistry::global()
            .resolve(&config.reference_roots, &config.runner())
            .await?
    } else {
        Vec::new()
    };

    let runtime = args.runtime.clone().or_else(|| {
        references
            .first()
            .map(|compiler| RuntimeCache::global().runtime_for(compiler).executable().to_path_buf())
    });

    let mut report = RunReport::new(
        suite.name.clone(),
        compiler.name().to_string(),
        references.iter().map(|r| r.raw_version().to_string()).collect(),
    );

    let runner = config.runner();
    let mut orchestrator = TestOrchestrator::new(config, compiler)
        .with_waivers(waivers)
        .with_references(references);
    match runtime {
        Some(runtime) => {
            info!("Executing compiled programs with {}", runtime.display());
            let factory: Arc<dyn VerifierFactory> =
                Arc::new(ProcessVerifierFactory::new(runtime, runner));
            orchestrator = orchestrator.with_verifier_factory(factory);
        }
        None => warn!("No runtime available, compiled programs will not be executed"),
    }

    orchestrator.begin_class(suite.name.clone(), suite.tests.len())?;

    for entry in suite.tests {
        let name = entry.case.name.clone();
        let start = Instant::now();
        let result = entry.run(&mut orchestrator).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(outcome) => {
                println!("PASS {name}");
                if let Some(statistics) = &outcome.class_statistics {
                    report.statistics = Some(statistics.clone());
                }
            }
            Err(e) => {
                println!("FAIL {name}");
                eprintln!("{e}");
            }
        }
        report.add_result(TestRecord::from_result(name, &result, duration_ms));
    }

    orchestrator.shut_down().await;
    report.full_log = orchestrator
        .full_log_path()
        .map(|path| path.display().to_string());

    if let Some(dir) = &args.report {
        report.save(dir)?;
        info!("Report written to {}", dir.display());
    }

    println!(
        "\n{} passed, {} failed, {} total ({:.2}%)",
        report.passed_tests, report.failed_tests, report.total_tests, report.pass_percent
    );

    if report.has_failures() {
        anyhow::bail!("{} of {} test(s) failed", report.failed_tests, report.total_tests);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = RunArgs {
            config_path: None,
            suite: PathBuf::from("suite.toml"),
            compiler: "ecj {files}".into(),
            compare: true,
            roots: vec![PathBuf::from("/opt/jdk-17")],
            output: Some(PathBuf::from("/tmp/out")),
            runtime: None,
            compliance: Some(ReleaseTier::Jdk11),
            report: None,
        };
        let mut config = HarnessConfig::default();
        args.apply_to(&mut config);

        assert!(config.run_reference);
        assert_eq!(config.reference_roots, vec![PathBuf::from("/opt/jdk-17")]);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.compliance, ReleaseTier::Jdk11);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = RunArgs {
            config_path: None,
            suite: PathBuf::from("suite.toml"),
            compiler: "ecj {files}".into(),
            compare: false,
            roots: Vec::new(),
            output: None,
            runtime: None,
            compliance: None,
            report: None,
        };
        let mut config = HarnessConfig::default();
        config.run_reference = true;
        args.apply_to(&mut config);
        assert!(config.run_reference);
        assert_eq!(config, {
            let mut expected = HarnessConfig::default();
            expected.run_reference = true;
            expected
        });
    }
}

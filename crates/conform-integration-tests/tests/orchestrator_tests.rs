//! Compiler under test expectations, without reference installations

use conform_core::under_test::options::COMPLIANCE;
use conform_core::{ErrorKind, HarnessError, Problem, ReleaseTier, TestCase, TestOrchestrator};
use conform_integration_tests::{
    expected_log, test_config, ScriptedCompiler, ScriptedVerifierFactory,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

fn zork() -> Problem {
    Problem::error("X.java", 1, "Zork cannot be resolved to a type")
}

fn dead_code() -> Problem {
    Problem::warning("X.java", 3, "Dead code")
}

fn sample(name: &str) -> TestCase {
    TestCase::new(name).source(
        "X.java",
        "public class X { public static void main(String[] a) { System.out.println(\"SUCCESS\"); } }",
    )
}

fn orchestrator(output: &Path, compiler: &Arc<ScriptedCompiler>) -> TestOrchestrator {
    TestOrchestrator::new(test_config(output, false), compiler.clone())
}

fn expectation_message(err: HarnessError) -> String {
    assert_eq!(err.kind(), ErrorKind::Expectation, "unexpected error: {err}");
    err.to_string()
}

#[tokio::test]
async fn test_clean_compile_runs_program() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean());
    let factory = ScriptedVerifierFactory::printing("SUCCESS\n", "");
    let counters = factory.counters();
    let mut orchestrator = orchestrator(dir.path(), &compiler).with_verifier_factory(Arc::new(factory));

    let outcome = orchestrator
        .run_conform_test(sample("test001").expected_output("SUCCESS"))
        .await
        .unwrap();

    assert!(!outcome.has_errors);
    assert_eq!(outcome.problem_log, "");
    assert_eq!(outcome.execution.unwrap().stdout, "SUCCESS\n");
    assert!(outcome.comparisons.is_empty());
    assert_eq!(counters.runs(), 1);
    assert!(orchestrator.config().under_test_dir().join("X.class").is_file());
}

#[tokio::test]
async fn test_negative_test_without_errors_is_unexpected_success() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean());
    let mut orchestrator = orchestrator(dir.path(), &compiler);

    let err = orchestrator.run_negative_test(sample("test002")).await.unwrap_err();
    assert!(expectation_message(err).contains("Unexpected success"));
}

#[tokio::test]
async fn test_conform_test_with_errors_is_unexpected_failure() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean().with_problem(zork()));
    let mut orchestrator = orchestrator(dir.path(), &compiler);

    let message = expectation_message(
        orchestrator.run_conform_test(sample("test003")).await.unwrap_err(),
    );
    assert!(message.contains("Unexpected failure"));
    assert!(message.contains("Zork cannot be resolved to a type"));
}

#[tokio::test]
async fn test_negative_test_with_matching_log() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean().with_problem(zork()));
    let factory = ScriptedVerifierFactory::printing("SUCCESS", "");
    let counters = factory.counters();
    let mut orchestrator = orchestrator(dir.path(), &compiler).with_verifier_factory(Arc::new(factory));

    let log = expected_log("X.java", &[zork()]).unwrap();
    assert!(log.contains("1. ERROR in X.java (at line 1)"));

    let outcome = orchestrator
        .run_negative_test(sample("test004").expected_log(log).expected_output("SUCCESS"))
        .await
        .unwrap();

    assert!(outcome.has_errors);
    assert!(outcome.execution.is_none());
    assert_eq!(counters.runs(), 0);
    assert!(!orchestrator.config().under_test_dir().join("X.class").exists());
}

#[tokio::test]
async fn test_negative_test_with_other_log() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean().with_problem(zork()));
    let mut orchestrator = orchestrator(dir.path(), &compiler);

    let log = expected_log(
        "X.java",
        &[Problem::error("X.java", 1, "Zork2 cannot be resolved to a type")],
    )
    .unwrap();
    let message = expectation_message(
        orchestrator
            .run_negative_test(sample("test005").expected_log(log))
            .await
            .unwrap_err(),
    );
    assert!(message.contains("Invalid problem log"));
}

#[tokio::test]
async fn test_alternate_log_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean().with_problem(zork()));
    let mut orchestrator = orchestrator(dir.path(), &compiler);

    let other = expected_log(
        "X.java",
        &[Problem::error("X.java", 1, "Zork2 cannot be resolved to a type")],
    )
    .unwrap();
    let actual = expected_log("X.java", &[zork()]).unwrap();
    orchestrator
        .run_negative_test(sample("test006").expected_log(other).alternate_log(actual))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_warning_only_log_expects_success() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean().with_problem(dead_code()));
    let mut orchestrator = orchestrator(dir.path(), &compiler);

    let log = expected_log("X.java", &[dead_code()]).unwrap();
    assert!(!log.contains("ERROR"));
    let outcome = orchestrator
        .run_negative_test(sample("test007").expected_log(log))
        .await
        .unwrap();
    assert!(!outcome.has_errors);
    assert!(outcome.problem_log.contains("WARNING"));
}

#[tokio::test]
async fn test_wrong_program_output_fails() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean());
    let factory = ScriptedVerifierFactory::printing("FAILURE", "");
    let mut orchestrator = orchestrator(dir.path(), &compiler).with_verifier_factory(Arc::new(factory));

    let message = expectation_message(
        orchestrator
            .run_conform_test(sample("test008").expected_output("SUCCESS"))
            .await
            .unwrap_err(),
    );
    assert!(message.contains("Standard output does not match"));
}

#[tokio::test]
async fn test_expected_error_output_is_a_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean());
    let factory = ScriptedVerifierFactory::printing("", "java.lang.RuntimeException: boom\n\tat X.main");
    let mut orchestrator = orchestrator(dir.path(), &compiler).with_verifier_factory(Arc::new(factory));

    orchestrator
        .run_conform_test(
            sample("test009")
                .expected_output("")
                .expected_error_output("java.lang.RuntimeException: boom"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_custom_vm_arguments_get_their_own_verifier() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean());
    let factory = ScriptedVerifierFactory::printing("SUCCESS", "");
    let counters = factory.counters();
    let mut orchestrator = orchestrator(dir.path(), &compiler).with_verifier_factory(Arc::new(factory));

    orchestrator
        .run_conform_test(sample("test010").expected_output("SUCCESS"))
        .await
        .unwrap();
    orchestrator
        .run_conform_test(
            sample("test011")
                .expected_output("SUCCESS")
                .vm_arguments(["-Xmx64m"]),
        )
        .await
        .unwrap();
    assert_eq!(counters.created(), 2);
    assert_eq!(counters.shut_down(), 2);

    orchestrator
        .run_conform_test(sample("test012").expected_output("SUCCESS"))
        .await
        .unwrap();
    orchestrator
        .run_conform_test(sample("test013").expected_output("SUCCESS"))
        .await
        .unwrap();
    orchestrator.shut_down().await;

    assert_eq!(counters.created(), 3);
    assert_eq!(counters.runs(), 4);
    assert_eq!(counters.shut_down(), 3);
    assert_eq!(
        counters.vm_arguments(),
        vec![Vec::<String>::new(), vec!["-Xmx64m".to_string()], Vec::new()]
    );
}

#[tokio::test]
async fn test_compliance_option() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean());
    let mut orchestrator = orchestrator(dir.path(), &compiler);

    orchestrator.run_conform_test(sample("test014")).await.unwrap();
    orchestrator
        .run_conform_test(sample("test015").compliance(ReleaseTier::Jdk11))
        .await
        .unwrap();

    let seen = compiler.seen_options();
    assert_eq!(compiler.calls(), 2);
    assert_eq!(seen[0].get(COMPLIANCE), Some("17"));
    assert_eq!(seen[1].get(COMPLIANCE), Some("11"));
}

#[tokio::test]
async fn test_test_without_sources_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean());
    let mut orchestrator = orchestrator(dir.path(), &compiler);

    let message = expectation_message(
        orchestrator.run_conform_test(TestCase::new("test016")).await.unwrap_err(),
    );
    assert!(message.contains("no source files"));
    assert_eq!(compiler.calls(), 0);
}

#[tokio::test]
async fn test_diagnostic_sink_sees_every_problem() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean().with_problem(zork()).with_problem(dead_code()));
    let mut orchestrator = orchestrator(dir.path(), &compiler);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = seen.clone();
    orchestrator
        .run_test_with_sink(
            sample("test017").expect_errors(true),
            Some(Box::new(move |problem: &Problem| {
                sink_seen.lock().unwrap().push(problem.message.clone());
            })),
        )
        .await
        .unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["Zork cannot be resolved to a type", "Dead code"]
    );
}

#[tokio::test]
async fn test_output_directory_flush() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean());
    let mut orchestrator = orchestrator(dir.path(), &compiler);
    let output = orchestrator.config().under_test_dir();

    orchestrator.run_conform_test(sample("test018")).await.unwrap();
    assert!(output.join("X.class").is_file());

    orchestrator
        .run_conform_test(
            TestCase::new("test019")
                .source("Y.java", "public class Y extends X {}")
                .keep_output_directory(),
        )
        .await
        .unwrap();
    assert!(output.join("X.class").is_file());
    assert!(output.join("Y.class").is_file());

    orchestrator
        .run_conform_test(TestCase::new("test020").source("Z.java", "public class Z {}"))
        .await
        .unwrap();
    assert!(!output.join("X.class").exists());
    assert!(output.join("Z.class").is_file());
}

#[tokio::test]
async fn test_class_session_reports_statistics_on_last_test() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(ScriptedCompiler::clean());
    let mut orchestrator = orchestrator(dir.path(), &compiler);

    orchestrator.begin_class("SampleTest", 2).unwrap();
    let first = orchestrator.run_conform_test(sample("test001")).await.unwrap();
    let second = orchestrator.run_conform_test(sample("test002")).await.unwrap();

    assert_eq!(first.name, "SampleTest test001");
    assert!(first.class_statistics.is_none());
    assert!(second.class_statistics.unwrap().is_clean());
    assert!(orchestrator.full_log_path().is_none());
}

//! End-to-end engine behaviour against a scripted sandbox runtime

use pretty_assertions::assert_eq;
use snipverify_cache::FingerprintCache;
use snipverify_core::{ExpectedOutput, InfraErrorKind, Snippet, Verdict};
use snipverify_engine::{CancelToken, EngineConfig, VerificationEngine};
use snipverify_test_utils::{
    python_snippet, python_spec, python_spec_with_deadline, shared, ProvisionScript, Script,
    ScriptedRuntime,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn engine(runtime: ScriptedRuntime, config: EngineConfig) -> (Arc<ScriptedRuntime>, Arc<VerificationEngine>) {
    let (scripted, dyn_runtime) = shared(runtime);
    let engine = VerificationEngine::new(dyn_runtime, config).unwrap();
    (scripted, Arc::new(engine))
}

async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn repeated_submission_runs_once() {
    let (runtime, engine) = engine(ScriptedRuntime::with_default(Script::ok("hello\n")), EngineConfig::default());
    let snippet = python_snippet("print('hello')");

    let first = engine.submit(snippet.clone(), python_spec()).await;
    let second = engine.submit(snippet, python_spec()).await;

    assert_eq!(first.verdict, Verdict::Verified);
    assert_eq!(first, second);
    assert_eq!(runtime.provision_calls(), 1);
    assert_eq!(runtime.execute_calls(), 1);

    let stats = engine.stats();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.executions, 1);
}

#[tokio::test]
async fn line_ending_variants_share_a_fingerprint() {
    let (runtime, engine) = engine(ScriptedRuntime::new(), EngineConfig::default());

    engine.submit(python_snippet("print(1)\r\n"), python_spec()).await;
    engine.submit(python_snippet("print(1)\n\n  \n"), python_spec()).await;
    engine.submit(python_snippet("print(2)"), python_spec()).await;

    assert_eq!(runtime.execute_calls(), 2);
}

#[tokio::test]
async fn whitespace_inside_a_string_literal_is_a_different_program() {
    let runtime = ScriptedRuntime::with_default(Script::ok("a\nb\n"))
        .on_source("'a   \nb'", Script::fail(1, "AssertionError"));
    let (runtime, engine) = engine(runtime, EngineConfig::default());
    let good = "s = 'a\nb'\nassert s == 'a' + chr(10) + 'b'";
    let bad = "s = 'a   \nb'\nassert s == 'a' + chr(10) + 'b'";

    let first = engine.submit(python_snippet(good), python_spec()).await;
    let second = engine.submit(python_snippet(bad), python_spec()).await;

    assert_eq!(first.verdict, Verdict::Verified);
    assert_eq!(second.verdict, Verdict::Failed);
    assert_eq!(runtime.execute_calls(), 2);
    assert_eq!(engine.stats().cache_hits, 0);
}

#[cfg(unix)]
#[tokio::test]
async fn cached_verdict_matches_what_the_shell_runs() {
    use snipverify_core::{ExecutionSpec, Language, ResourceCeiling, RuntimeProfile};
    use snipverify_sandbox::ProcessRuntime;

    let runtime: snipverify_sandbox::SharedRuntime = Arc::new(ProcessRuntime::new());
    let engine = VerificationEngine::new(runtime, EngineConfig::default()).unwrap();
    let spec = ExecutionSpec::new(
        RuntimeProfile::new(Language::Bash, "", ["sh"], "snippet.sh"),
        ResourceCeiling::default(),
    );
    let good = "s='a\nb'\n[ \"$s\" = \"$(printf 'a\\nb')\" ]\r\n";
    let bad = "s='a   \nb'\n[ \"$s\" = \"$(printf 'a\\nb')\" ]\r\n";

    let good_result = engine.submit(Snippet::new(good, Language::Bash), spec.clone()).await;
    let bad_result = engine.submit(Snippet::new(bad, Language::Bash), spec).await;

    assert_eq!(good_result.verdict, Verdict::Verified);
    assert_eq!(bad_result.verdict, Verdict::Failed);
    assert_eq!(bad_result.exit_code, Some(1));
    assert_eq!(engine.stats().cache_hits, 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_snippet_times_out_and_is_torn_down_once() {
    let (runtime, engine) = engine(ScriptedRuntime::with_default(Script::Hang), EngineConfig::default());
    let spec = python_spec_with_deadline(Duration::from_secs(2));
    let snippet = python_snippet("while True: pass");

    let start = tokio::time::Instant::now();
    let result = engine.submit(snippet.clone(), spec.clone()).await;
    let waited = start.elapsed();

    assert_eq!(result.verdict, Verdict::TimedOut);
    assert!(waited >= Duration::from_secs(2));
    assert!(waited <= Duration::from_millis(2_500), "took {waited:?}");
    assert_eq!(runtime.teardown_calls(), 1);
    assert_eq!(runtime.live_environments(), 0);
    assert_eq!(engine.running_jobs(), 0);

    let fingerprint = VerificationEngine::fingerprint(&snippet, &spec);
    assert_eq!(engine.lookup(&fingerprint).await, Some(result));
}

#[tokio::test(start_paused = true)]
async fn concurrent_sandboxes_never_exceed_pool_capacity() {
    let (runtime, engine) = engine(
        ScriptedRuntime::with_default(Script::sleep(Duration::from_millis(50))),
        EngineConfig::default().with_max_sandboxes(3),
    );

    let submissions = (0..10).map(|i| {
        let engine = Arc::clone(&engine);
        async move { engine.submit(python_snippet(&format!("print({i})")), python_spec()).await }
    });
    let results = futures::future::join_all(submissions).await;

    assert!(results.iter().all(|r| r.is_verified()));
    assert_eq!(runtime.execute_calls(), 10);
    assert!(runtime.peak_running() <= 3, "peak {}", runtime.peak_running());
    assert!(engine.stats().peak_running <= 3);
    assert_eq!(runtime.teardown_calls(), 10);
    assert_eq!(runtime.max_teardowns_per_environment(), 1);
    assert_eq!(engine.stats().pool.in_use, 0);
}

#[tokio::test]
async fn expired_entry_is_recomputed() {
    let (runtime, engine) = engine(ScriptedRuntime::new(), EngineConfig::default());
    let engine = Arc::try_unwrap(engine)
        .unwrap()
        .with_cache(FingerprintCache::new(100, Duration::from_millis(200)));
    let snippet = python_snippet("print(42)");

    engine.submit(snippet.clone(), python_spec()).await;
    engine.submit(snippet.clone(), python_spec()).await;
    assert_eq!(runtime.execute_calls(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    engine.submit(snippet, python_spec()).await;
    assert_eq!(runtime.execute_calls(), 2);
}

#[tokio::test]
async fn classification_follows_exit_code_and_stderr() {
    let traceback = "Traceback (most recent call last):\n  File \"/sandbox/snippet.py\", line 1, in <module>\nZeroDivisionError: division by zero\n";
    let runtime = ScriptedRuntime::with_default(Script::ok("hi\n"))
        .on_source("1/0", Script::fail(1, traceback))
        .on_source("sys.exit", Script::fail(1, ""));
    let (_, engine) = engine(runtime, EngineConfig::default());

    let ok = engine.submit(python_snippet("print('hi')"), python_spec()).await;
    assert_eq!(ok.verdict, Verdict::Verified);
    assert_eq!(ok.exit_code, Some(0));
    assert_eq!(ok.stdout.as_str(), "hi\n");

    let div = engine.submit(python_snippet("print(1/0)"), python_spec()).await;
    assert_eq!(div.verdict, Verdict::Failed);
    assert_eq!(div.exit_code, Some(1));
    assert!(div.detail.unwrap().contains("ZeroDivisionError: division by zero"));

    let quiet = engine
        .submit(python_snippet("import sys; sys.exit(1)"), python_spec())
        .await;
    assert_eq!(quiet.verdict, Verdict::Failed);
    assert_eq!(quiet.detail.as_deref(), Some("exited with code 1"));
}

#[tokio::test]
async fn expected_output_mismatch_fails() {
    let (_, engine) = engine(ScriptedRuntime::with_default(Script::ok("4\n")), EngineConfig::default());
    let snippet = python_snippet("print(2 + 2)").with_expected(ExpectedOutput::Exact("5".into()));

    let result = engine.submit(snippet, python_spec()).await;
    assert_eq!(result.verdict, Verdict::Failed);
    assert!(result.detail.unwrap().starts_with("output mismatch"));
}

#[tokio::test(start_paused = true)]
async fn provisioning_gives_up_after_configured_attempts() {
    let config = EngineConfig::default().with_provision_retry(3, Duration::from_millis(10));
    let (runtime, engine) = engine(
        ScriptedRuntime::new().with_provision(ProvisionScript::FailAlways),
        config,
    );
    let snippet = python_snippet("print(1)");

    let result = engine.submit(snippet.clone(), python_spec()).await;
    assert_eq!(result.verdict, Verdict::InfraError(InfraErrorKind::ProvisionFailed));
    assert!(result.detail.as_deref().unwrap().contains("after 3 attempt(s)"));
    assert_eq!(runtime.provision_calls(), 3);
    assert_eq!(runtime.execute_calls(), 0);
    assert_eq!(runtime.teardown_calls(), 0);
    assert_eq!(engine.stats().provision_retries, 2);

    // Infra errors are not cached: a resubmission tries again
    let fingerprint = VerificationEngine::fingerprint(&snippet, &python_spec());
    assert!(engine.lookup(&fingerprint).await.is_none());
    engine.submit(snippet, python_spec()).await;
    assert_eq!(runtime.provision_calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn transient_provision_failure_is_retried() {
    let (runtime, engine) = engine(
        ScriptedRuntime::new().with_provision(ProvisionScript::FailFirst(1)),
        EngineConfig::default(),
    );

    let result = engine.submit(python_snippet("print(1)"), python_spec()).await;
    assert_eq!(result.verdict, Verdict::Verified);
    assert_eq!(runtime.provision_calls(), 2);
    assert_eq!(engine.stats().provision_retries, 1);
}

#[tokio::test]
async fn permanent_provision_failure_is_not_retried() {
    let config = EngineConfig::default().with_provision_retry(5, Duration::from_millis(1));
    let (runtime, engine) = engine(ScriptedRuntime::new().with_provision(ProvisionScript::Reject), config);

    let result = engine.submit(python_snippet("print(1)"), python_spec()).await;
    assert_eq!(result.verdict, Verdict::InfraError(InfraErrorKind::ProvisionFailed));
    assert_eq!(runtime.provision_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_provision_is_bounded() {
    let config = EngineConfig::default()
        .with_provision_retry(2, Duration::from_millis(10))
        .with_provision_timeout(Duration::from_secs(1));
    let (runtime, engine) = engine(ScriptedRuntime::new().with_provision(ProvisionScript::Hang), config);

    let result = engine.submit(python_snippet("print(1)"), python_spec()).await;
    assert_eq!(result.verdict, Verdict::InfraError(InfraErrorKind::ProvisionFailed));
    assert_eq!(runtime.provision_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn saturated_pool_reports_infra_error() {
    let gate = Arc::new(Semaphore::new(0));
    let config = EngineConfig::default()
        .with_max_sandboxes(1)
        .with_queue_timeout(Duration::from_millis(100));
    let (runtime, engine) = engine(ScriptedRuntime::with_default(Script::Gate(Arc::clone(&gate))), config);

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.submit(python_snippet("print('a')"), python_spec()).await })
    };
    wait_until(|| runtime.running() == 1).await;

    let second = engine.submit(python_snippet("print('b')"), python_spec()).await;
    assert_eq!(second.verdict, Verdict::InfraError(InfraErrorKind::PoolSaturated));
    assert_eq!(runtime.provision_calls(), 1);

    gate.add_permits(1);
    assert!(first.await.unwrap().is_verified());
    assert_eq!(engine.stats().infra_errors, 1);
}

#[tokio::test]
async fn cancel_while_queued() {
    let gate = Arc::new(Semaphore::new(0));
    let config = EngineConfig::default().with_max_sandboxes(1);
    let (runtime, engine) = engine(ScriptedRuntime::with_default(Script::Gate(Arc::clone(&gate))), config);

    let holder = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.submit(python_snippet("print('a')"), python_spec()).await })
    };
    wait_until(|| runtime.running() == 1).await;

    let token = CancelToken::new();
    let queued = {
        let engine = Arc::clone(&engine);
        let token = token.clone();
        tokio::spawn(async move {
            engine
                .submit_with_cancel(python_snippet("print('b')"), python_spec(), &token)
                .await
        })
    };
    wait_until(|| engine.stats().queued == 1).await;
    token.cancel();

    let cancelled = queued.await.unwrap();
    assert_eq!(cancelled.verdict, Verdict::InfraError(InfraErrorKind::Cancelled));
    assert_eq!(runtime.provision_calls(), 1);

    gate.add_permits(1);
    assert!(holder.await.unwrap().is_verified());
}

#[tokio::test]
async fn isolation_fault_is_not_cached() {
    let (runtime, engine) = engine(
        ScriptedRuntime::with_default(Script::Fault("daemon went away".into())),
        EngineConfig::default(),
    );
    let snippet = python_snippet("print(1)");

    let result = engine.submit(snippet.clone(), python_spec()).await;
    assert_eq!(result.verdict, Verdict::InfraError(InfraErrorKind::ExecutionFault));
    assert_eq!(runtime.teardown_calls(), 1);

    engine.submit(snippet, python_spec()).await;
    assert_eq!(runtime.execute_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropped_caller_still_tears_down() {
    let (runtime, engine) = engine(
        ScriptedRuntime::with_default(Script::sleep(Duration::from_millis(100))),
        EngineConfig::default(),
    );
    let snippet = python_snippet("print('slow')");

    let caller = {
        let engine = Arc::clone(&engine);
        let snippet = snippet.clone();
        tokio::spawn(async move { engine.submit(snippet, python_spec()).await })
    };
    wait_until(|| runtime.running() == 1).await;
    caller.abort();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(runtime.teardown_calls(), 1);
    assert_eq!(runtime.live_environments(), 0);
    assert_eq!(engine.stats().pool.in_use, 0);

    let fingerprint = VerificationEngine::fingerprint(&snippet, &python_spec());
    assert!(engine.lookup(&fingerprint).await.is_some());
}

#[tokio::test]
async fn language_resolution_uses_registry() {
    let (runtime, engine) = engine(ScriptedRuntime::new(), EngineConfig::default());

    let python = engine.submit_for_language(Snippet::new("print(1)", "py")).await;
    assert!(python.is_verified());

    let cobol = engine
        .submit_for_language(Snippet::new("DISPLAY 'HI'.", "cobol"))
        .await;
    assert_eq!(cobol.verdict, Verdict::InfraError(InfraErrorKind::UnsupportedLanguage));
    assert_eq!(runtime.provision_calls(), 1);
}

#[tokio::test]
async fn shutdown_refuses_new_work() {
    let (runtime, engine) = engine(ScriptedRuntime::new(), EngineConfig::default());
    engine.shutdown();

    let result = engine.submit(python_snippet("print(1)"), python_spec()).await;
    assert!(result.is_infra_error());
    assert_eq!(runtime.provision_calls(), 0);
}

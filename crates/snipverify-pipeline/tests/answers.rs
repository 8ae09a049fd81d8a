//! Answer HTML through extraction, block iteration and the full pipeline

use snipverify_core::{Language, Snippet, Verdict};
use snipverify_engine::{EngineConfig, VerificationEngine};
use snipverify_pipeline::{
    extract_code_blocks, BlockOutcome, Explanation, NoExplanation, PipelineConfig, QueryPipeline,
    SnippetChecker, StaticSource,
};
use snipverify_test_utils::{shared, Script, ScriptedRuntime};
use std::sync::Arc;

const ANSWER_HTML: &str = r#"
<p>You can slice with a negative step:</p>
<pre class="lang-py s-code-block"><code>s = &quot;hello&quot;
print(s[::-1])
</code></pre>
<p>Or <code>reversed()</code>, but beware of <code>x</code>:</p>
<pre><code>print(&quot;&quot;.join(reversed(&quot;hello&quot;))</code></pre>
"#;

fn engine(runtime: ScriptedRuntime) -> (Arc<ScriptedRuntime>, Arc<VerificationEngine>) {
    let (scripted, dyn_runtime) = shared(runtime);
    (scripted, Arc::new(VerificationEngine::new(dyn_runtime, EngineConfig::default()).unwrap()))
}

#[tokio::test]
async fn html_answer_to_verified_block() {
    let blocks = extract_code_blocks(ANSWER_HTML);
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0], "s = \"hello\"\nprint(s[::-1])");

    // The second block has an unbalanced paren and fails
    let runtime = ScriptedRuntime::with_default(Script::ok("olleh\n"))
        .on_source("join", Script::fail(1, "SyntaxError: '(' was never closed"));
    let (scripted, engine) = engine(runtime);
    let checker = SnippetChecker::new(engine);

    let reversed: Vec<String> = blocks.into_iter().rev().collect();
    let report = checker.verify_blocks(&reversed, &Language::Python).await;

    assert_eq!(report.verified.as_ref().map(|v| v.index), Some(1));
    match &report.tried[0].outcome {
        BlockOutcome::Checked { result } => {
            assert_eq!(result.verdict, Verdict::Failed);
            assert!(result.detail.as_deref().unwrap().contains("SyntaxError"));
        }
        BlockOutcome::TooShort => panic!("block 0 should have run"),
    }
    assert_eq!(scripted.execute_calls(), 2);
}

#[tokio::test]
async fn pipeline_without_explainer_still_answers() {
    let (_, engine) = engine(ScriptedRuntime::with_default(Script::ok("olleh\n")));
    let candidates = extract_code_blocks(ANSWER_HTML)
        .into_iter()
        .map(|code| Snippet::new(code, Language::Python))
        .collect();
    let pipeline = QueryPipeline::new(
        engine,
        Arc::new(StaticSource::new(candidates)),
        Arc::new(NoExplanation),
        PipelineConfig::default(),
    );

    let outcome = pipeline.run("reverse a string in python").await.unwrap();
    let best = outcome.best().unwrap();
    assert_eq!(best.rank, 0);
    assert_eq!(best.result.stdout.as_str(), "olleh\n");
    assert!(matches!(best.explanation, Explanation::Unavailable(_)));
}

#[tokio::test]
async fn repeated_queries_hit_the_cache() {
    let (scripted, engine) = engine(ScriptedRuntime::new());
    let candidates = vec![Snippet::new("print('cached')", Language::Python)];
    let pipeline = QueryPipeline::new(
        engine,
        Arc::new(StaticSource::new(candidates)),
        Arc::new(NoExplanation),
        PipelineConfig::default(),
    );

    pipeline.run("q").await.unwrap();
    pipeline.run("q").await.unwrap();
    assert_eq!(scripted.execute_calls(), 1);
}

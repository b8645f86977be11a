//! Reports rendered from real validation runs
use xvalid::cli::{OutputFormat, VerbosityLevel};
use xvalid::output::Output;

use crate::common::test_helpers::{SEQUENCE_DTD, TestFiles, engine_for};

async fn mixed_run(files: &TestFiles) -> Vec<xvalid::diagnostics::RunResult> {
    let schema = files.dtd("seq.dtd", SEQUENCE_DTD, "root");
    let inputs = vec![
        files.write("good.xml", "<root><a/><b/></root>"),
        files.write("swapped.xml", "<root><b/><a/></root>"),
        files.write("broken.xml", "<root><a></root>"),
        files.path().join("absent.xml"),
    ];
    engine_for(Some(schema)).validate_files(&inputs).await
}

#[tokio::test]
async fn test_json_report_of_a_mixed_run() {
    let files = TestFiles::new();
    let results = mixed_run(&files).await;

    let json = Output::new(VerbosityLevel::Normal)
        .with_colors(false)
        .with_format(OutputFormat::Json)
        .format_results(&results);
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["exit_code"], 2);
    assert_eq!(value["summary"]["total_files"], 4);
    assert_eq!(value["summary"]["valid_files"], 1);
    assert_eq!(value["summary"]["invalid_files"], 2);
    assert_eq!(value["summary"]["skipped_files"], 1);
    assert_eq!(value["results"][3]["verdict"], "SkippedNotFound");
}

#[tokio::test]
async fn test_human_report_keeps_input_order() {
    let files = TestFiles::new();
    let results = mixed_run(&files).await;

    let text = Output::new(VerbosityLevel::Normal)
        .with_colors(false)
        .format_results(&results);

    let positions: Vec<usize> = ["good.xml", "swapped.xml", "broken.xml", "absent.xml"]
        .iter()
        .map(|name| text.find(name).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(text.contains("Success rate: 25.0%"));
}

#[tokio::test]
async fn test_debug_summary_lists_schemas() {
    let files = TestFiles::new();
    let results = mixed_run(&files).await;

    let text = Output::new(VerbosityLevel::Debug)
        .with_colors(false)
        .with_format(OutputFormat::Summary)
        .format_results(&results);

    assert!(text.contains("Schemas used: 1"));
    assert!(text.contains("seq.dtd"));
}

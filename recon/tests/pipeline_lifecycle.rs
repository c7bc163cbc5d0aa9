//! End-to-end runs of steering files against real event files.
//!
//! Each test lays out a temp directory with JSON Lines input, a conditions
//! store and a steering file, then drives `run_steering` the way `recon run`
//! does.

use std::fs;
use std::path::Path;

use recon::core::histogram::HistogramBook;
use recon::core::stats::{RunStatistics, StopReason};
use recon::io::config::SteeringConfig;
use recon::io::event_file::EventRecord;
use recon::launch::{Overrides, run_steering};
use recon::runner::RunError;

/// Ten events; runs 1 (events 1-6) and 2 (events 7-10). Odd events carry a
/// track passing the KLM selection, even events only a soft track.
fn write_events(dir: &Path) {
    let mut lines = Vec::new();
    for event in 1..=10u64 {
        let run = if event <= 6 { 1 } else { 2 };
        let (px, bklm) = if event % 2 == 1 { (5.0, 2) } else { (1.0, 4) };
        lines.push(format!(
            concat!(
                r#"{{"meta":{{"experiment":12,"run":{run},"event":{event}}},"#,
                r#""tracks":[{{"fits":[{{"hypothesis":"muon","momentum":{{"x":{px},"y":0.0,"z":0.0}},"p_value":0.5}}],"#,
                r#""reco":{{"cdc":20,"bklm":{bklm},"eklm":1}}}}],"#,
                r#""RawKLM":{{"digits":{event}}}}}"#
            ),
            run = run,
            event = event,
            px = px,
            bklm = bklm,
        ));
    }
    fs::create_dir_all(dir.join("data")).expect("data dir");
    fs::write(dir.join("data/muons.jsonl"), lines.join("\n")).expect("write events");
}

fn write_conditions(dir: &Path) {
    let store = dir.join("conditions");
    fs::create_dir_all(&store).expect("conditions dir");
    fs::write(store.join("online.toml"), "beam_energy = 5.28\n").expect("online");
    fs::write(store.join("release-06-00-07.toml"), "beam_energy = 5.29\n").expect("release");
}

fn steering(dir: &Path, extra_run: &str) -> SteeringConfig {
    let root = dir.display();
    let src = format!(
        r#"
[run]
{extra_run}
statistics_file = '{root}/stats{{{{ iteration }}}}.json'

[conditions]
globaltags = ["online"]
prepend = ["release-06-00-07"]
store = '{root}/conditions'

[templates]
iteration = 1

[[path]]
module = "EventInput"
params = {{ input_files = ['{root}/data/*.jsonl'], branch_names = ["RawKLM"] }}

[[path]]
module = "HistoManager"
params = {{ histo_file_name = '{root}/test{{{{ iteration }}}}.json' }}

[[path]]
module = "Conditions"
params = {{ required = ["beam_energy"] }}

[[path]]
module = "KLMCDCTrack"

[[path.condition_path]]
module = "EventOutput"
name = "selected"
params = {{ output_file_name = '{root}/selected.jsonl', branch_names = ["RawKLM"] }}

[[path]]
module = "Progress"
"#
    );
    let cfg: SteeringConfig = toml::from_str(&src).expect("parse steering");
    cfg.validate().expect("valid steering");
    cfg
}

fn read_statistics(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).expect("read stats")).expect("parse stats")
}

#[test]
fn skip_and_cap_select_filter_and_histogram() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    write_events(root);
    write_conditions(root);
    let cfg = steering(root, "skip_events = 2\nmax_events = 5");

    let report = run_steering(&cfg).expect("run");
    let stats: &RunStatistics = &report.statistics;
    assert_eq!(stats.available, 10);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.requested, 7);
    assert_eq!(stats.stop, StopReason::CapReached);
    assert!(stats.is_consistent());

    // Events 3..=7 processed; 3, 5 and 7 pass the selection.
    let klm = stats.module("KLMCDCTrack").expect("klm stats");
    assert_eq!(klm.calls, 5);
    assert_eq!(klm.condition_false, 2);
    assert_eq!(stats.module("selected").expect("selected").calls, 3);
    assert_eq!(stats.module("Progress").expect("progress").calls, 5);

    let selected = fs::read_to_string(root.join("selected.jsonl")).expect("selected");
    let events: Vec<u64> = selected
        .lines()
        .map(|line| serde_json::from_str::<EventRecord>(line).expect("record").meta.event)
        .collect();
    assert_eq!(events, vec![3, 5, 7]);

    // Profiles reset when run 2 begins at event 7, leaving one entry each.
    let book: HistogramBook = serde_json::from_str(
        &fs::read_to_string(root.join("test1.json")).expect("histograms"),
    )
    .expect("parse histograms");
    let profiles = book.directory("KLM").expect("KLM directory");
    assert_eq!(profiles.len(), 6);
    assert!(profiles.iter().all(|profile| profile.entries() == 1));

    let written: Vec<_> = report
        .outputs
        .written
        .iter()
        .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
        .collect();
    assert_eq!(written, vec!["selected.jsonl", "test1.json"]);

    let saved = read_statistics(&root.join("stats1.json"));
    assert_eq!(saved["processed"], 5);
    assert_eq!(saved["stop"], "cap_reached");
}

#[test]
fn overrides_change_cap_and_template_variables() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    write_events(root);
    write_conditions(root);
    let mut cfg = steering(root, "");
    Overrides {
        max_events: None,
        skip_events: Some(8),
        vars: vec![("iteration".to_string(), 7i64.into())],
    }
    .apply(&mut cfg)
    .expect("overrides");

    let report = run_steering(&cfg).expect("run");
    assert_eq!(report.statistics.processed, 2);
    assert_eq!(report.statistics.stop, StopReason::Exhausted);
    assert!(root.join("test7.json").is_file());
    assert!(root.join("stats7.json").is_file());
}

#[test]
fn unknown_global_tag_fails_before_any_event() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    write_events(root);
    write_conditions(root);
    let mut cfg = steering(root, "");
    cfg.conditions.globaltags.push("data_reprocessing_proc13".to_string());

    let err = run_steering(&cfg).err().expect("unknown tag");
    let run_err = err.downcast_ref::<RunError>().expect("run error");
    assert!(matches!(run_err, RunError::Conditions(_)));
    assert!(!root.join("selected.jsonl").exists());
    assert!(!root.join("stats1.json").exists());
}

#[test]
fn histograms_without_an_earlier_collector_fail_assembly() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    write_events(root);
    write_conditions(root);

    let mut collector_last = steering(root, "");
    let histo = collector_last.path.remove(1);
    assert_eq!(histo.module, "HistoManager");
    collector_last.path.push(histo);

    let mut no_collector = steering(root, "");
    no_collector.path.remove(1);

    for cfg in [collector_last, no_collector] {
        let err = run_steering(&cfg).err().expect("assembly failure");
        match err.downcast_ref::<RunError>() {
            Some(RunError::Assembly(path_err)) => assert!(
                path_err
                    .to_string()
                    .contains("KLMCDCTrack: deposits histograms but no earlier module collects them")
            ),
            other => panic!("expected assembly failure, got {other:?}"),
        }
    }
    assert!(!root.join("test1.json").exists());
    assert!(!root.join("selected.jsonl").exists());
}

#[test]
fn malformed_event_aborts_and_still_finalizes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    write_events(root);
    write_conditions(root);
    let input = root.join("data/muons.jsonl");
    let mut lines: Vec<String> = fs::read_to_string(&input)
        .expect("read events")
        .lines()
        .map(str::to_string)
        .collect();
    lines[3] = "{\"meta\": 4".to_string();
    fs::write(&input, lines.join("\n")).expect("rewrite events");
    let cfg = steering(root, "");

    let err = run_steering(&cfg).err().expect("processing failure");
    match err.downcast_ref::<RunError>() {
        Some(RunError::Processing {
            module,
            event,
            statistics,
            ..
        }) => {
            assert_eq!(module, "EventInput");
            assert_eq!(*event, 3);
            assert_eq!(statistics.processed, 3);
            assert_eq!(statistics.failed, 1);
            assert_eq!(statistics.unvisited, 6);
            assert!(statistics.is_consistent());
        }
        other => panic!("expected processing failure, got {other:?}"),
    }

    // Finalize still ran: the selected events and histograms were written.
    let selected = fs::read_to_string(root.join("selected.jsonl")).expect("selected");
    assert_eq!(selected.lines().count(), 2);
    assert!(root.join("test1.json").is_file());
    let saved = read_statistics(&root.join("stats1.json"));
    assert_eq!(saved["stop"], "processing_failed");
}

#[test]
fn missing_condition_key_aborts_initialization() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();
    write_events(root);
    write_conditions(root);
    let mut cfg = steering(root, "");
    cfg.path[2]
        .params
        .insert("required".to_string(), toml::Value::from("klm.alignment"));

    let err = run_steering(&cfg).err().expect("init failure");
    match err.downcast_ref::<RunError>() {
        Some(RunError::Initialization {
            module, statistics, ..
        }) => {
            assert_eq!(module, "Conditions");
            assert_eq!(statistics.processed, 0);
            assert_eq!(statistics.stop, StopReason::InitializationFailed);
        }
        other => panic!("expected initialization failure, got {other:?}"),
    }
    assert!(!root.join("selected.jsonl").exists());
}

#[test]
fn demo_steering_loads_and_lists() {
    let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/steering.toml");
    let cfg = recon::io::config::load_steering(&demo).expect("demo steering");
    let listing = recon::launch::print_path(&cfg).expect("listing");
    assert!(listing.starts_with(
        "global tags: release-06-00-07, data_reprocessing_proc13, online\n"
    ));
    assert!(listing.contains("[4.1] KLMSelected (EventOutput)"));
}

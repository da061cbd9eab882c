// CLI integration tests: features, train, predict, evaluate, rollup

mod common;

use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_punches(dir: &Path) -> PathBuf {
    let path = dir.join("punches.csv");
    fs::write(&path, common::punch_csv(4, 15)).unwrap();
    path
}

fn train(dir: &Path) -> PathBuf {
    let input = write_punches(dir);
    let model = dir.join("model.apr");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("train")
        .arg("--input")
        .arg(&input)
        .arg("--model")
        .arg(&model)
        .arg("--quick");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Training Summary"))
        .stdout(predicate::str::contains("Held-out Evaluation"));

    model
}

// ============================================================================
// features
// ============================================================================

#[test]
fn test_features_to_stdout() {
    let tmp = TempDir::new().unwrap();
    let input = write_punches(tmp.path());

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("features").arg("-i").arg(&input);
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with(
            "dia_semana,es_viernes,es_lunes,es_fin_semana,mes,anio,dia_mes,semana_anio,tardanza_min,tarde,muy_tarde,ausencia\n",
        ));
}

#[test]
fn test_features_unlabeled_to_file() {
    let tmp = TempDir::new().unwrap();
    let input = write_punches(tmp.path());
    let output = tmp.path().join("features.csv");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("features")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--unlabeled");
    cmd.assert().success();

    let text = fs::read_to_string(&output).unwrap();
    let header = text.lines().next().unwrap();
    assert!(!header.contains("ausencia"));
    assert_eq!(text.lines().count(), 61);
}

#[test]
fn test_missing_required_column_fails() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("bad.csv");
    fs::write(&input, "employee_id,fecha\n1,05/03/2024\n").unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("features").arg("-i").arg(&input);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Missing required columns"))
        .stderr(predicate::str::contains("hora_entrada_real"));
}

// ============================================================================
// train / predict / evaluate / rollup
// ============================================================================

#[test]
fn test_train_writes_model() {
    let tmp = TempDir::new().unwrap();
    let model = train(tmp.path());
    assert!(model.exists());
    assert!(fs::metadata(&model).unwrap().len() > 0);
}

#[test]
fn test_train_from_feature_table() {
    let tmp = TempDir::new().unwrap();
    let input = write_punches(tmp.path());
    let features = tmp.path().join("features.csv");
    let model = tmp.path().join("from_features.apr");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("features").arg("-i").arg(&input).arg("-o").arg(&features);
    cmd.assert().success();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("train")
        .arg("--features")
        .arg("-i")
        .arg(&features)
        .arg("-m")
        .arg(&model)
        .arg("--quick")
        .arg("--workers")
        .arg("1");
    cmd.assert().success();
    assert!(model.exists());
}

#[test]
fn test_train_with_config_file() {
    let tmp = TempDir::new().unwrap();
    let input = write_punches(tmp.path());
    let config = tmp.path().join("trainer.toml");
    fs::write(
        &config,
        "seed = 3\ncv_folds = 3\n\n[grid]\nn_estimators = [10]\nmax_depth = [0]\nmin_samples_split = [2]\nmin_samples_leaf = [1]\ncriterion = [\"entropy\"]\nmax_features = [\"all\"]\n",
    )
    .unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("train")
        .arg("-i")
        .arg(&input)
        .arg("-m")
        .arg(tmp.path().join("m.apr"))
        .arg("--config")
        .arg(&config);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Combinations searched: 1"))
        .stdout(predicate::str::contains("criterion=entropy"));
}

#[test]
fn test_train_writes_json_report() {
    let tmp = TempDir::new().unwrap();
    let input = write_punches(tmp.path());
    let report = tmp.path().join("report.json");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("train")
        .arg("-i")
        .arg(&input)
        .arg("-m")
        .arg(tmp.path().join("m.apr"))
        .arg("--quick")
        .arg("--report")
        .arg(&report);
    cmd.assert().success();

    let text = fs::read_to_string(&report).unwrap();
    assert!(text.contains("\"cv_results\""));
    assert!(text.contains("\"feature_importances\""));
}

#[test]
fn test_train_rejects_invalid_config() {
    let tmp = TempDir::new().unwrap();
    let input = write_punches(tmp.path());
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "test_fraction = 1.5\n").unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("train")
        .arg("-i")
        .arg(&input)
        .arg("-m")
        .arg(tmp.path().join("m.apr"))
        .arg("--config")
        .arg(&config);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("test_fraction"));
}

#[test]
fn test_train_requires_labels() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("unlabeled.csv");
    fs::write(&input, common::unlabeled_punch_csv(2, 10)).unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("train")
        .arg("-i")
        .arg(&input)
        .arg("-m")
        .arg(tmp.path().join("m.apr"))
        .arg("--quick");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("ausencia"));
}

#[test]
fn test_predict() {
    let tmp = TempDir::new().unwrap();
    let model = train(tmp.path());
    let input = tmp.path().join("new.csv");
    fs::write(&input, common::unlabeled_punch_csv(2, 5)).unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("predict").arg("-m").arg(&model).arg("-i").arg(&input);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).unwrap();

    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "employee_id,fecha,predicted_class,prob_present,prob_absent,prob_late"
    );
    assert_eq!(lines.len(), 11);
    assert!(lines[1].starts_with("100,04/03/2024,"));

    for line in &lines[1..] {
        let class: usize = line.split(',').nth(2).unwrap().parse().unwrap();
        assert!(class <= 2, "predicted_class {class} out of range");
    }
}

#[test]
fn test_predict_missing_model() {
    let tmp = TempDir::new().unwrap();
    let input = write_punches(tmp.path());

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("predict")
        .arg("-m")
        .arg(tmp.path().join("nope.apr"))
        .arg("-i")
        .arg(&input);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Model file not found"));
}

#[test]
fn test_evaluate_by_date() {
    let tmp = TempDir::new().unwrap();
    let model = train(tmp.path());
    let input = tmp.path().join("punches.csv");
    let output = tmp.path().join("metrics.csv");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("evaluate")
        .arg("-m")
        .arg(&model)
        .arg("-i")
        .arg(&input)
        .arg("--by")
        .arg("date")
        .arg("-o")
        .arg(&output);
    cmd.assert().success();

    let text = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("group,total,correct,"));
    // 15 dates plus the global row
    assert_eq!(lines.len(), 17);
    assert!(lines[1].starts_with("2024-03-04,4,"));
    assert!(lines[16].starts_with("global,60,"));
}

#[test]
fn test_evaluate_requires_status_column() {
    let tmp = TempDir::new().unwrap();
    let model = train(tmp.path());
    let input = tmp.path().join("unlabeled.csv");
    fs::write(&input, common::unlabeled_punch_csv(2, 5)).unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("evaluate").arg("-m").arg(&model).arg("-i").arg(&input);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("nothing to evaluate against"));
}

#[test]
fn test_rollup() {
    let tmp = TempDir::new().unwrap();
    let model = train(tmp.path());
    let input = tmp.path().join("punches.csv");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.arg("rollup").arg("-m").arg(&model).arg("-i").arg(&input);
    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with(
            "employee_id,employee_name,year,month,days,",
        ))
        .stdout(predicate::str::contains(",Empleado 101,2024,3,"));
}

#[test]
fn test_requires_subcommand() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("asistencia");
    cmd.assert().failure();
}

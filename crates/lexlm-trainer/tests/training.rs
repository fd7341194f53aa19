use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use lexlm_trainer::{Split, TrainArgs, TrainConfig, TrainOutcome, Trainer};
use serde_json::json;

const WORDS: [&str; 10] = [
    "the", "cat", "sat", "on", "mat", "dog", "hot", "cold", "animal", "tail",
];

fn write_split(path: &Path, rows: usize, offset: usize) {
    let lines: Vec<String> = (0..rows)
        .map(|i| {
            let text: Vec<&str> = (0..4).map(|j| WORDS[(i + j + offset) % WORDS.len()]).collect();
            let target: Vec<&str> = (0..4).map(|j| WORDS[(i + j + offset + 1) % WORDS.len()]).collect();
            let hypernyms: &[&str] = if i % 2 == 0 { &["cat,animal", "dog,animal"] } else { &[] };
            json!({
                "text": text,
                "target": target,
                "synonyms": ["cat,dog"],
                "antonyms": ["hot,cold"],
                "hypernyms": hypernyms,
                "meronyms": ["tail,cat"],
            })
            .to_string()
        })
        .collect();
    std::fs::write(path, lines.join("\n")).unwrap();
}

fn write_corpus(root: &Path) {
    let dir = root.join("data/tiny/annotated_4_2");
    std::fs::create_dir_all(&dir).unwrap();
    write_split(&dir.join("train.txt"), 6, 0);
    write_split(&dir.join("valid.txt"), 3, 3);
    write_split(&dir.join("test.txt"), 3, 5);
}

fn config(root: &Path, extra: &[&str]) -> TrainConfig {
    write_corpus(root);
    let data_root = root.join("data");
    let save = root.join("models");
    let save_emb = root.join("embeddings");
    let mut args = vec![
        "train".to_string(),
        "--data".into(),
        "tiny".into(),
        "--data-root".into(),
        data_root.display().to_string(),
        "--save".into(),
        save.display().to_string(),
        "--save-emb".into(),
        save_emb.display().to_string(),
        "--bptt".into(),
        "4".into(),
        "--batch-size".into(),
        "2".into(),
        "--emsize".into(),
        "8".into(),
        "--nhid".into(),
        "8".into(),
        "--wn-hid".into(),
        "4".into(),
        "--nlayers".into(),
        "1".into(),
        "--lr".into(),
        "0.5".into(),
        "--log-interval".into(),
        "1".into(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    TrainArgs::try_parse_from(args).unwrap().resolve().unwrap()
}

fn no_interrupt() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

#[test]
fn test_joint_run_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["--epochs", "2", "--lex", "syn", "-l", "hyp", "-l", "mer"]);
    let artifacts = config.artifacts.clone();

    let mut trainer = Trainer::new(config, no_interrupt()).unwrap();
    let vocab_len = trainer.vocab().len();
    let summary = trainer.run().unwrap();

    assert_eq!(summary.outcome, TrainOutcome::Completed);
    assert_eq!(summary.epochs_completed, 2);
    assert!(summary.best_valid.is_some());
    let test = summary.test.unwrap();
    assert!(test.primary.is_finite());
    assert_eq!(test.batches, 2);

    assert!(artifacts.vocab.exists());
    assert!(artifacts.model.exists());
    assert!(artifacts.embeddings_bin.exists());
    assert!(
        artifacts
            .model
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("model_tiny_syn_hyp_mer_8_8_4_pairwise_false")
    );

    let text = std::fs::read_to_string(&artifacts.embeddings_txt).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), vocab_len);
    assert!(lines[0].starts_with("<pad> "));
    assert!(lines[1].starts_with("<unk> "));
    for line in lines {
        assert_eq!(line.split(' ').count(), 1 + 8);
    }
}

#[test]
fn test_evaluation_alone_keeps_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["--lex", "syn"]);
    let model_path = config.artifacts.model.clone();

    let mut trainer = Trainer::new(config, no_interrupt()).unwrap();
    assert!(trainer.train_epoch(1).unwrap());
    let first = trainer.evaluate(Split::Valid).unwrap();
    assert!(trainer.observe_validation(first.primary).unwrap());
    let saved = std::fs::read(&model_path).unwrap();

    let again = trainer.evaluate(Split::Valid).unwrap();
    assert_eq!(again.primary, first.primary);
    assert!(!trainer.observe_validation(again.primary).unwrap());
    assert_eq!(std::fs::read(&model_path).unwrap(), saved);
    assert_eq!(trainer.checkpoint().patience(), 1);
}

#[test]
fn test_learning_rate_decays_at_milestone() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["--epochs", "3", "--milestones", "2", "--gamma", "0.5"]);

    let mut trainer = Trainer::new(config, no_interrupt()).unwrap();
    trainer.run().unwrap();
    assert!((trainer.learning_rate() - 0.25).abs() < 1e-12);
}

#[test]
fn test_interrupt_skips_to_export() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &["--epochs", "5"]);
    let artifacts = config.artifacts.clone();

    let mut trainer = Trainer::new(config, Arc::new(AtomicBool::new(true))).unwrap();
    let summary = trainer.run().unwrap();

    assert_eq!(summary.outcome, TrainOutcome::Interrupted);
    assert_eq!(summary.epochs_completed, 0);
    assert!(summary.best_valid.is_none());
    assert!(!artifacts.model.exists());
    assert!(artifacts.embeddings_txt.exists());
}

#[test]
fn test_early_stop_with_zero_learning_rate() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(
        dir.path(),
        &["--epochs", "10", "--lr", "0", "--early-stop", "2", "--dropout", "0"],
    );

    let mut trainer = Trainer::new(config, no_interrupt()).unwrap();
    let summary = trainer.run().unwrap();
    assert_eq!(summary.outcome, TrainOutcome::EarlyStopped);
    assert_eq!(summary.epochs_completed, 3);
}

#[test]
fn test_segregated_adam_cosine() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(
        dir.path(),
        &[
            "--seg", "--epochs", "2", "--optim", "adam", "--lr", "0.01", "--distance", "cosine", "--reg", "--wn-hid",
            "12", "-l", "ant", "-l", "hyp",
        ],
    );
    let artifacts = config.artifacts.clone();

    let mut trainer = Trainer::new(config, no_interrupt()).unwrap();
    let summary = trainer.run().unwrap();
    assert_eq!(summary.outcome, TrainOutcome::Completed);
    assert!(
        artifacts
            .model
            .to_string_lossy()
            .ends_with("model_tiny_ant_hyp_8_8_12_cosine_false.safetensors")
    );
}

#[test]
fn test_retrofit_saves_every_epoch_without_test_eval() {
    let dir = tempfile::tempdir().unwrap();
    let vectors = dir.path().join("vectors.txt");
    let rows: Vec<String> = WORDS
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let values: Vec<String> = (0..8).map(|j| format!("{}", (i * 8 + j) as f32 / 100.0)).collect();
            format!("{w} {}", values.join(" "))
        })
        .collect();
    std::fs::write(&vectors, rows.join("\n")).unwrap();

    let vectors_arg = vectors.display().to_string();
    let config = config(
        dir.path(),
        &["--retro", "--vectors", &vectors_arg, "--epochs", "2", "--lex", "syn"],
    );
    let artifacts = config.artifacts.clone();

    let mut trainer = Trainer::new(config, no_interrupt()).unwrap();
    let summary = trainer.run().unwrap();
    assert_eq!(summary.outcome, TrainOutcome::Completed);
    assert!(summary.test.is_none());
    assert!(summary.best_valid.is_none());
    assert!(artifacts.model.exists());
    assert!(artifacts.embeddings_txt.exists());
}

#[test]
fn test_second_run_reads_cache() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), &[]);
    let cache = config.splits.cache_path();

    Trainer::new(config.clone(), no_interrupt()).unwrap();
    assert!(cache.exists());

    // With the cache in place the raw splits are no longer needed.
    std::fs::remove_file(&config.splits.train).unwrap();
    let trainer = Trainer::new(config, no_interrupt()).unwrap();
    assert!(trainer.vocab().len() > 2);
}

#[test]
fn test_interrupted_run_ignores_checkpoint_from_earlier_run() {
    let dir = tempfile::tempdir().unwrap();
    let earlier = config(dir.path(), &["--epochs", "1", "--seed", "1"]);
    let artifacts = earlier.artifacts.clone();
    Trainer::new(earlier, no_interrupt()).unwrap().run().unwrap();
    assert!(artifacts.model.exists());
    let earlier_text = std::fs::read_to_string(&artifacts.embeddings_txt).unwrap();

    let later = config(dir.path(), &["--epochs", "1", "--seed", "999"]);
    assert_eq!(later.artifacts, artifacts);
    let mut trainer = Trainer::new(later, Arc::new(AtomicBool::new(true))).unwrap();
    let summary = trainer.run().unwrap();

    assert_eq!(summary.outcome, TrainOutcome::Interrupted);
    assert!(!trainer.checkpoint().is_written());
    let later_text = std::fs::read_to_string(&artifacts.embeddings_txt).unwrap();
    assert_ne!(later_text, earlier_text);
}
